use std::fmt;

/// Amount in the smallest currency unit, stored as a plain integer.
///
/// Construction does not enforce positivity: a transfer amount is validated by the
/// engine so a bad request can still be reported as such.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn new(value: i64) -> Self {
        Amount(value)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Signed delta applied to the debited account.
    pub fn debit_delta(self) -> i64 {
        -self.0
    }

    /// Signed delta applied to the credited account.
    pub fn credit_delta(self) -> i64 {
        self.0
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Amount(value)
    }
}

impl From<i32> for Amount {
    fn from(value: i32) -> Self {
        Amount(i64::from(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
