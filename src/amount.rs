//! Fixed-point [`Amount`] and network-qualified [`Address`] value types.
//!
//! Amounts are carried as an integer number of sompi so that summing many
//! small transfers never drifts the way binary floats do.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of sompi in one KAS.
pub const SOMPI_PER_KAS: u64 = 100_000_000;

const FRACTION_DIGITS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount must not be negative: {0}")]
    Negative(String),
    #[error("amount has more than 8 fractional digits: {0}")]
    TooPrecise(String),
    #[error("amount is not a decimal number: {0}")]
    NotNumeric(String),
    #[error("amount is too large: {0}")]
    Overflow(String),
}

/// A non-negative quantity of KAS with sompi precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_sompi(sompi: u64) -> Self {
        Self(sompi)
    }

    pub const fn sompi(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_mul(self, factor: u64) -> Option<Amount> {
        self.0.checked_mul(factor).map(Amount)
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// Distance between two amounts, regardless of order.
    pub fn abs_diff(self, other: Amount) -> Amount {
        Amount(self.0.abs_diff(other.0))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parse decimal text such as `12`, `0.5` or `1,234.00000001`.
    ///
    /// Thousands separators are accepted because the wallet shell prints
    /// balances with them.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(AmountError::Empty);
        }
        if text.starts_with('-') {
            return Err(AmountError::Negative(text.to_string()));
        }
        let cleaned: String = text
            .strip_prefix('+')
            .unwrap_or(text)
            .chars()
            .filter(|c| *c != ',')
            .collect();

        let (whole, fraction) = cleaned.split_once('.').unwrap_or((&cleaned, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(AmountError::NotNumeric(text.to_string()));
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AmountError::NotNumeric(text.to_string()));
        }
        if fraction.len() > FRACTION_DIGITS {
            return Err(AmountError::TooPrecise(text.to_string()));
        }

        let overflow = || AmountError::Overflow(text.to_string());
        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let fraction: u64 = if fraction.is_empty() {
            0
        } else {
            format!("{fraction:0<8}")
                .parse()
                .map_err(|_| overflow())?
        };

        whole
            .checked_mul(SOMPI_PER_KAS)
            .and_then(|w| w.checked_add(fraction))
            .map(Amount)
            .ok_or_else(overflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SOMPI_PER_KAS;
        let fraction = self.0 % SOMPI_PER_KAS;
        if fraction == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{fraction:08}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// A destination address carrying its network prefix (`kaspa:` / `kaspatest:`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wrap an address that has already been validated for its network.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The network prefix, including the trailing colon, if present.
    pub fn prefix(&self) -> Option<&str> {
        self.0.find(':').map(|idx| &self.0[..=idx])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
