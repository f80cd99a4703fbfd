use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ExchangeConfig;
use crate::errors::{FundingError, Result};

/// supported currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Chf,
}

impl Currency {
    pub const ALL: [Currency; 4] = [Currency::Usd, Currency::Eur, Currency::Gbp, Currency::Chf];

    fn index(&self) -> usize {
        match self {
            Currency::Usd => 0,
            Currency::Eur => 1,
            Currency::Gbp => 2,
            Currency::Chf => 3,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Chf => "CHF",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

const N: usize = Currency::ALL.len();

/// lowest and highest pairwise factor the converter accepts
pub const MIN_PAIR_FACTOR: Decimal = dec!(0.5);
pub const MAX_PAIR_FACTOR: Decimal = dec!(2);

/// converts integer minor-unit amounts between currencies
///
/// Every `from -> to` factor is computed once at construction. Results are
/// rounded to the nearest minor unit with ties away from zero, so a
/// round-trip `a -> b -> a` can drift by at most one minor unit. That bound
/// only holds while each pairwise factor lies within
/// [`MIN_PAIR_FACTOR`, `MAX_PAIR_FACTOR`], which `new` enforces.
#[derive(Debug, Clone)]
pub struct CurrencyConverter {
    reference: Currency,
    factors: [[Decimal; N]; N],
}

impl CurrencyConverter {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let mut rates = [Decimal::ZERO; N];
        for currency in Currency::ALL {
            let rate = config.base_rates.get(&currency).copied().ok_or_else(|| {
                FundingError::InvalidConfiguration {
                    message: format!("missing base rate for {}", currency),
                }
            })?;
            if rate <= Decimal::ZERO {
                return Err(FundingError::InvalidConfiguration {
                    message: format!("base rate for {} must be positive, got {}", currency, rate),
                });
            }
            rates[currency.index()] = rate;
        }

        if rates[config.reference.index()] != Decimal::ONE {
            return Err(FundingError::InvalidConfiguration {
                message: format!(
                    "reference currency {} must have a base rate of 1, got {}",
                    config.reference,
                    rates[config.reference.index()]
                ),
            });
        }

        let mut factors = [[Decimal::ONE; N]; N];
        for from in Currency::ALL {
            for to in Currency::ALL {
                let factor = rates[to.index()] / rates[from.index()];
                if factor < MIN_PAIR_FACTOR || factor > MAX_PAIR_FACTOR {
                    return Err(FundingError::InvalidConfiguration {
                        message: format!(
                            "{} -> {} factor {} is outside [{}, {}]",
                            from, to, factor, MIN_PAIR_FACTOR, MAX_PAIR_FACTOR
                        ),
                    });
                }
                factors[from.index()][to.index()] = factor;
            }
        }

        Ok(Self {
            reference: config.reference,
            factors,
        })
    }

    pub fn reference(&self) -> Currency {
        self.reference
    }

    /// units of `to` per unit of `from`
    pub fn factor(&self, from: Currency, to: Currency) -> Decimal {
        self.factors[from.index()][to.index()]
    }

    /// convert `amount` minor units of `from` into `to`
    pub fn convert(&self, amount: i64, from: Currency, to: Currency) -> Result<i64> {
        if amount < 0 {
            return Err(FundingError::InvalidAmount { amount });
        }
        if from == to {
            return Ok(amount);
        }

        Decimal::from(amount)
            .checked_mul(self.factor(from, to))
            .map(|d| d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|d| d.to_i64())
            .ok_or(FundingError::InvalidAmount { amount })
    }

    /// `amount` expressed in every supported currency
    pub fn convert_all(&self, amount: i64, from: Currency) -> Result<BTreeMap<Currency, i64>> {
        Currency::ALL
            .iter()
            .map(|to| Ok((*to, self.convert(amount, from, *to)?)))
            .collect()
    }
}
