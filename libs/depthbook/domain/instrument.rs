//! Venue-neutral instrument naming

use crate::error::DepthError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Venue-neutral symbol, `BASE-QUOTE` (e.g. `BTC-USDT`)
///
/// Each venue maps it onto its own wire symbol (`btcusdt`, `BTCUSDT`, `BTC_USDT`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentKey {
    base: String,
    quote: String,
}

impl InstrumentKey {
    pub fn new(base: impl AsRef<str>, quote: impl AsRef<str>) -> Self {
        Self {
            base: base.as_ref().trim().to_uppercase(),
            quote: quote.as_ref().trim().to_uppercase(),
        }
    }

    /// Parse `BTC-USDT`, `BTC/USDT` or `BTC_USDT` (case-insensitive)
    pub fn parse(symbol: &str) -> Result<Self, DepthError> {
        let mut parts = symbol.trim().split(&['-', '/', '_'][..]);
        let (base, quote) = match (parts.next(), parts.next(), parts.next()) {
            (Some(b), Some(q), None) => (b, q),
            _ => return Err(DepthError::UnknownInstrument(symbol.to_string())),
        };

        let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid(base) || !valid(quote) {
            return Err(DepthError::UnknownInstrument(symbol.to_string()));
        }
        Ok(Self::new(base, quote))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// `btcusdt`
    pub fn concat_lower(&self) -> String {
        format!("{}{}", self.base, self.quote).to_lowercase()
    }

    /// `BTCUSDT`
    pub fn concat_upper(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// `BTC_USDT` for `joined('_')`
    pub fn joined(&self, separator: char) -> String {
        format!("{}{}{}", self.base, separator, self.quote)
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for InstrumentKey {
    type Err = DepthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for InstrumentKey {
    type Error = DepthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InstrumentKey> for String {
    fn from(key: InstrumentKey) -> Self {
        key.to_string()
    }
}
