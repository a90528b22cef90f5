use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Currency every rate is quoted against.
pub const BASE_CURRENCY: Currency = Currency::Usd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Currency {
    Aud,
    Cad,
    Chf,
    Cny,
    Eur,
    Gbp,
    Jpy,
    Nzd,
    Sek,
    Usd,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Currency code '{code}' is not supported. Supported currencies: {}", supported_codes().join(", "))]
pub struct UnsupportedCurrency {
    pub code: String,
}

impl Currency {
    /// Sorted by code.
    pub const ALL: [Currency; 10] = [
        Currency::Aud,
        Currency::Cad,
        Currency::Chf,
        Currency::Cny,
        Currency::Eur,
        Currency::Gbp,
        Currency::Jpy,
        Currency::Nzd,
        Currency::Sek,
        Currency::Usd,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Currency::Aud => "AUD",
            Currency::Cad => "CAD",
            Currency::Chf => "CHF",
            Currency::Cny => "CNY",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Nzd => "NZD",
            Currency::Sek => "SEK",
            Currency::Usd => "USD",
        }
    }

    /// Simulated snapshot rate: units of this currency per one USD.
    pub fn simulated_rate(self) -> Decimal {
        match self {
            Currency::Usd => Decimal::new(1_0000, 4),
            Currency::Eur => Decimal::new(8523, 4),
            Currency::Gbp => Decimal::new(7891, 4),
            Currency::Jpy => Decimal::new(110_4500, 4),
            Currency::Aud => Decimal::new(1_3456, 4),
            Currency::Cad => Decimal::new(1_2567, 4),
            Currency::Chf => Decimal::new(9234, 4),
            Currency::Cny => Decimal::new(6_4521, 4),
            Currency::Sek => Decimal::new(8_7654, 4),
            Currency::Nzd => Decimal::new(1_4321, 4),
        }
    }

    pub fn is_base(self) -> bool {
        self == BASE_CURRENCY
    }
}

pub fn supported_codes() -> Vec<&'static str> {
    Currency::ALL.iter().map(|c| c.code()).collect()
}

impl FromStr for Currency {
    type Err = UnsupportedCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();

        Currency::ALL
            .into_iter()
            .find(|c| c.code() == normalized)
            .ok_or_else(|| UnsupportedCurrency {
                code: s.to_string(),
            })
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}
