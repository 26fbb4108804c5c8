//! Monetary amounts sent as currency-prefixed strings, e.g. `"$19.99"`

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid price format")]
pub struct InvalidPriceFormat;

/// A price decoded from a string whose first character is a currency
/// symbol. The symbol is dropped; the remainder must parse as a float.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Price(pub f64);

impl From<Price> for f64 {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl FromStr for Price {
    type Err = InvalidPriceFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        chars.next().ok_or(InvalidPriceFormat)?;

        let amount: f64 = chars.as_str().parse().map_err(|_| InvalidPriceFormat)?;
        if !amount.is_finite() {
            return Err(InvalidPriceFormat);
        }
        Ok(Price(amount))
    }
}

struct PriceVisitor;

impl<'de> Visitor<'de> for PriceVisitor {
    type Value = Price;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a currency-prefixed price string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Price, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<Price, E> {
        Err(E::custom(InvalidPriceFormat))
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<Price, E> {
        Err(E::custom(InvalidPriceFormat))
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Price, E> {
        Err(E::custom(InvalidPriceFormat))
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Price, E> {
        Err(E::custom(InvalidPriceFormat))
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PriceVisitor)
    }
}
