use std::{fmt, iter::Sum};

use serde::{Deserialize, Deserializer, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ProductId);
id_newtype!(CategoryId);
id_newtype!(SubCategoryId);
id_newtype!(CartLineId);

/// Integral amount in the store currency's minor unit.
///
/// Wire amounts may arrive as floats or numeric strings; they are truncated
/// toward zero on decode so client-side subtotals agree with the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Money(pub u64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Truncating conversion from a wire amount. Negative and non-finite
    /// inputs collapse to zero.
    pub fn from_wire(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Self::ZERO;
        }
        Self(value.floor() as u64)
    }

    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(u64::from(quantity)))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        Money(iter.fold(0u64, |acc, m| acc.saturating_add(m.0)))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireAmount {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let amount = match WireAmount::deserialize(deserializer)? {
            WireAmount::Unsigned(v) => Money(v),
            WireAmount::Signed(_) => Money::ZERO,
            WireAmount::Float(v) => Money::from_wire(v),
            WireAmount::Text(raw) => {
                let parsed = raw.trim().parse::<f64>().map_err(|_| {
                    serde::de::Error::custom(format!("invalid amount: {raw:?}"))
                })?;
                Money::from_wire(parsed)
            }
        };
        Ok(amount)
    }
}
