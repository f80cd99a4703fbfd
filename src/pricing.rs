use serde::{Deserialize, Serialize};

use crate::amount::Credit;
use crate::config::{LedgerConfig, PlanPriceTable};
use crate::currency::{Currency, CurrencyConverter};
use crate::errors::{FundingError, Result};
use crate::types::{PlanPriceType, PlanProductType};

/// a price quoted in a specific currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub currency: Currency,
    /// minor units
    pub amount: i64,
}

/// prices plans and credit purchases in any supported currency
#[derive(Debug, Clone)]
pub struct PriceCatalog {
    prices: PlanPriceTable,
    converter: CurrencyConverter,
}

impl PriceCatalog {
    pub fn new(prices: PlanPriceTable, converter: CurrencyConverter) -> Self {
        Self { prices, converter }
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            config.prices.clone(),
            CurrencyConverter::new(&config.exchange)?,
        ))
    }

    pub fn converter(&self) -> &CurrencyConverter {
        &self.converter
    }

    /// price of one billing period of a plan
    pub fn plan_price(
        &self,
        plan: PlanProductType,
        price_type: PlanPriceType,
        currency: Currency,
    ) -> Result<Quote> {
        let reference_amount = self.prices.price(plan, price_type).ok_or_else(|| {
            FundingError::InvalidConfiguration {
                message: format!("no {:?} price for {:?}", price_type, plan),
            }
        })?;

        self.quote(reference_amount, currency)
    }

    /// price of buying `credits` one-off
    pub fn credit_price(&self, credits: Credit, currency: Currency) -> Result<Quote> {
        if !credits.is_positive() {
            return Err(FundingError::InvalidAmount {
                amount: credits.units(),
            });
        }

        let reference_amount = self
            .prices
            .credit_unit
            .checked_mul(credits.units())
            .ok_or(FundingError::InvalidAmount {
                amount: credits.units(),
            })?;

        self.quote(reference_amount, currency)
    }

    fn quote(&self, reference_amount: i64, currency: Currency) -> Result<Quote> {
        let amount = self
            .converter
            .convert(reference_amount, self.converter.reference(), currency)?;
        Ok(Quote { currency, amount })
    }
}
