use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// credit amount in the smallest credit unit (a "DoW")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Credit(i64);

impl Credit {
    pub const ZERO: Credit = Credit(0);
    pub const ONE: Credit = Credit(1);

    pub const fn new(units: i64) -> Self {
        Credit(units)
    }

    /// raw smallest-unit value
    pub const fn units(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// multiply by a line quantity, `None` on overflow
    pub fn checked_times(&self, quantity: u64) -> Option<Self> {
        let quantity = i64::try_from(quantity).ok()?;
        self.0.checked_mul(quantity).map(Credit)
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Credit)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Credit)
    }

    /// total of `amounts`, `None` if any partial sum overflows
    ///
    /// Ledger totals go through here rather than `Sum`, which saturates.
    pub fn checked_sum<I>(amounts: I) -> Option<Self>
    where
        I: IntoIterator<Item = Credit>,
    {
        amounts
            .into_iter()
            .try_fold(Credit::ZERO, |acc, amount| acc.checked_add(amount))
    }

    pub fn min(self, other: Self) -> Self {
        Credit(self.0.min(other.0))
    }

    pub fn max(self, other: Self) -> Self {
        Credit(self.0.max(other.0))
    }
}

impl fmt::Display for Credit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} DoW", self.0)
    }
}

impl From<i64> for Credit {
    fn from(units: i64) -> Self {
        Credit(units)
    }
}

impl From<i32> for Credit {
    fn from(units: i32) -> Self {
        Credit(units as i64)
    }
}

impl From<u32> for Credit {
    fn from(units: u32) -> Self {
        Credit(units as i64)
    }
}

impl Add for Credit {
    type Output = Credit;

    fn add(self, other: Credit) -> Credit {
        Credit(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Credit {
    fn add_assign(&mut self, other: Credit) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Credit {
    type Output = Credit;

    fn sub(self, other: Credit) -> Credit {
        Credit(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Credit {
    fn sub_assign(&mut self, other: Credit) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Neg for Credit {
    type Output = Credit;

    fn neg(self) -> Credit {
        Credit(self.0.saturating_neg())
    }
}

impl Sum for Credit {
    fn sum<I: Iterator<Item = Credit>>(iter: I) -> Credit {
        iter.fold(Credit::ZERO, |acc, c| acc + c)
    }
}

impl<'a> Sum<&'a Credit> for Credit {
    fn sum<I: Iterator<Item = &'a Credit>>(iter: I) -> Credit {
        iter.copied().sum()
    }
}
