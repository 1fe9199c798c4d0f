//! Decimal price strings to integer ticks
//!
//! A tick is `price * 10^scale` as an `i64`, computed with `rust_decimal` so
//! `"0.1"` and `"0.10000000"` land on the same key with no float drift.

use crate::error::DepthError;
use rust_decimal::Decimal;
use std::str::FromStr;

pub const DEFAULT_PRICE_SCALE: u32 = 8;

/// Largest scale `rust_decimal` can represent
const MAX_PRICE_SCALE: u32 = 28;

/// Fixed decimal scale used to key price levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceScale(u32);

impl Default for PriceScale {
    fn default() -> Self {
        Self(DEFAULT_PRICE_SCALE)
    }
}

impl PriceScale {
    pub fn new(scale: u32) -> Result<Self, DepthError> {
        if scale > MAX_PRICE_SCALE {
            return Err(DepthError::Config(format!(
                "price scale {} exceeds {}",
                scale, MAX_PRICE_SCALE
            )));
        }
        Ok(Self(scale))
    }

    pub fn decimals(self) -> u32 {
        self.0
    }

    /// Parse a non-negative price string into ticks
    ///
    /// Prices with more significant decimals than the scale are rejected.
    pub fn to_ticks(self, price: &str) -> Result<i64, DepthError> {
        let value = Decimal::from_str(price.trim())
            .map_err(|e| DepthError::Malformed(format!("price {:?}: {}", price, e)))?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DepthError::Malformed(format!("negative price {:?}", price)));
        }

        let mut scaled = value.normalize();
        if scaled.scale() > self.0 {
            return Err(DepthError::Malformed(format!(
                "price {:?} has more than {} decimals",
                price, self.0
            )));
        }
        scaled.rescale(self.0);

        i64::try_from(scaled.mantissa())
            .map_err(|_| DepthError::Malformed(format!("price {:?} out of range", price)))
    }

    /// Ticks back to a normalized decimal price
    pub fn to_price(self, ticks: i64) -> Decimal {
        Decimal::new(ticks, self.0).normalize()
    }
}

/// Parse a quantity string; must be a finite, non-negative number
pub fn parse_quantity(quantity: &str) -> Result<f64, DepthError> {
    let value: f64 = quantity
        .trim()
        .parse()
        .map_err(|_| DepthError::Malformed(format!("quantity {:?}", quantity)))?;
    if !value.is_finite() || value < 0.0 {
        return Err(DepthError::Malformed(format!("quantity {:?}", quantity)));
    }
    Ok(value)
}
