use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::amount::Credit;
use crate::currency::Currency;
use crate::errors::{FundingError, Result};
use crate::types::{PlanPriceType, PlanProductType, ProductType};

/// ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub plan_credits: PlanCreditTable,
    pub exchange: ExchangeConfig,
    pub prices: PlanPriceTable,
}

/// fixed credit granted by one paid line of each plan
///
/// This is the only place product types are mapped to credit; the ledger
/// and the plan lookup both go through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCreditTable {
    pub individual: Credit,
    pub start_up: Credit,
    pub scale_up: Credit,
    pub enterprise: Credit,
}

/// exchange rates pivoted on one reference currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub reference: Currency,
    /// units of each currency per unit of the reference currency
    pub base_rates: BTreeMap<Currency, Decimal>,
}

/// reference-currency prices, in minor units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPriceTable {
    pub monthly: BTreeMap<PlanProductType, i64>,
    pub annually: BTreeMap<PlanProductType, i64>,
    /// price of a single credit
    pub credit_unit: i64,
}

impl PlanCreditTable {
    pub fn plan_credit(&self, plan: PlanProductType) -> Credit {
        match plan {
            PlanProductType::Individual => self.individual,
            PlanProductType::StartUp => self.start_up,
            PlanProductType::ScaleUp => self.scale_up,
            PlanProductType::Enterprise => self.enterprise,
        }
    }

    /// credit contributed by one paid stripe line, `None` if the quantity overflows
    pub fn credit_equivalent(&self, product_type: ProductType, quantity: u64) -> Option<Credit> {
        match product_type {
            ProductType::Credit => Credit::ONE.checked_times(quantity),
            ProductType::Donation => Some(Credit::ZERO),
            plan => Some(match plan.plan() {
                Some(plan) => self.plan_credit(plan),
                None => Credit::ZERO,
            }),
        }
    }
}

impl Default for PlanCreditTable {
    fn default() -> Self {
        Self {
            individual: Credit::new(500),
            start_up: Credit::new(1_000),
            scale_up: Credit::new(2_500),
            enterprise: Credit::new(5_000),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        let mut base_rates = BTreeMap::new();
        base_rates.insert(Currency::Usd, dec!(1));
        base_rates.insert(Currency::Eur, dec!(0.92));
        base_rates.insert(Currency::Gbp, dec!(0.79));
        base_rates.insert(Currency::Chf, dec!(0.88));

        Self {
            reference: Currency::Usd,
            base_rates,
        }
    }
}

impl PlanPriceTable {
    pub fn price(&self, plan: PlanProductType, price_type: PlanPriceType) -> Option<i64> {
        let table = match price_type {
            PlanPriceType::Monthly => &self.monthly,
            PlanPriceType::Annually => &self.annually,
        };
        table.get(&plan).copied()
    }
}

impl Default for PlanPriceTable {
    fn default() -> Self {
        let monthly = BTreeMap::from([
            (PlanProductType::Individual, 6_900),
            (PlanProductType::StartUp, 12_900),
            (PlanProductType::ScaleUp, 29_900),
            (PlanProductType::Enterprise, 56_900),
        ]);
        // two months free on annual billing
        let annually = monthly
            .iter()
            .map(|(plan, price)| (*plan, price * 10))
            .collect();

        Self {
            monthly,
            annually,
            credit_unit: 100,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            plan_credits: PlanCreditTable::default(),
            exchange: ExchangeConfig::default(),
            prices: PlanPriceTable::default(),
        }
    }
}

impl LedgerConfig {
    /// parse and validate a json configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LedgerConfig =
            serde_json::from_str(json).map_err(|e| FundingError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| FundingError::InvalidConfiguration {
            message: e.to_string(),
        })
    }

    /// check internal consistency
    pub fn validate(&self) -> Result<()> {
        for plan in PlanProductType::ALL {
            let credit = self.plan_credits.plan_credit(plan);
            if credit.is_negative() {
                return Err(FundingError::InvalidConfiguration {
                    message: format!("negative plan credit for {:?}: {}", plan, credit),
                });
            }

            for price_type in [PlanPriceType::Monthly, PlanPriceType::Annually] {
                match self.prices.price(plan, price_type) {
                    Some(price) if price >= 0 => {}
                    Some(price) => {
                        return Err(FundingError::InvalidConfiguration {
                            message: format!("negative price for {:?} {:?}: {}", plan, price_type, price),
                        });
                    }
                    None => {
                        return Err(FundingError::InvalidConfiguration {
                            message: format!("missing price for {:?} {:?}", plan, price_type),
                        });
                    }
                }
            }
        }

        if self.prices.credit_unit < 0 {
            return Err(FundingError::InvalidConfiguration {
                message: format!("negative credit unit price: {}", self.prices.credit_unit),
            });
        }

        // rate bounds are checked by the converter itself
        crate::currency::CurrencyConverter::new(&self.exchange)?;

        Ok(())
    }
}
