use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::currency::Currency;

pub const RATE_SCALE: u32 = 6;
pub const AMOUNT_SCALE: u32 = 2;
/// Exclusive upper bound on stored amounts, matching `NUMERIC(15, 2)`.
pub const AMOUNT_LIMIT: i64 = 10_000_000_000_000;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("Amount must be greater than zero, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("Amount {0} exceeds the supported precision")]
    AmountOverflow(Decimal),

    #[error("Amount {0} is too large, must be less than {AMOUNT_LIMIT}")]
    AmountTooLarge(Decimal),
}

/// Result of one conversion against a [`RateTable`] snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub amount: Decimal,
    pub from: Currency,
    pub to: Currency,
    pub converted_amount: Decimal,
    pub exchange_rate: Decimal,
    pub rate_timestamp: DateTime<Utc>,
}

/// Immutable snapshot of rates relative to the base currency.
#[derive(Debug, Clone)]
pub struct RateTable {
    rates: BTreeMap<Currency, Decimal>,
    updated_at: DateTime<Utc>,
}

impl RateTable {
    pub fn simulated() -> Self {
        Self::simulated_at(Utc::now())
    }

    pub fn simulated_at(updated_at: DateTime<Utc>) -> Self {
        let rates = Currency::ALL
            .into_iter()
            .map(|c| (c, c.simulated_rate()))
            .collect();

        Self { rates, updated_at }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn rate(&self, currency: Currency) -> Decimal {
        self.rates
            .get(&currency)
            .copied()
            .unwrap_or_else(|| currency.simulated_rate())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Currency, Decimal)> + '_ {
        self.rates.iter().map(|(c, r)| (*c, *r))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Cross rate `from -> to`, rounded to six places with banker's rounding.
    pub fn exchange_rate(&self, from: Currency, to: Currency) -> Decimal {
        if from == to {
            return Decimal::ONE;
        }

        (self.rate(to) / self.rate(from))
            .round_dp_with_strategy(RATE_SCALE, RoundingStrategy::MidpointNearestEven)
    }

    /// Converts with the unrounded cross rate and rounds only the final amount.
    pub fn convert(
        &self,
        amount: Decimal,
        from: Currency,
        to: Currency,
    ) -> Result<Conversion, ConversionError> {
        if amount <= Decimal::ZERO {
            return Err(ConversionError::NonPositiveAmount(amount));
        }
        let limit = Decimal::from(AMOUNT_LIMIT);
        if amount >= limit {
            return Err(ConversionError::AmountTooLarge(amount));
        }

        let converted_amount = if from == to {
            amount
        } else {
            amount
                .checked_mul(self.rate(to))
                .and_then(|v| v.checked_div(self.rate(from)))
                .ok_or(ConversionError::AmountOverflow(amount))?
        }
        .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointNearestEven);
        if converted_amount >= limit {
            return Err(ConversionError::AmountTooLarge(converted_amount));
        }

        Ok(Conversion {
            amount,
            from,
            to,
            converted_amount,
            exchange_rate: self.exchange_rate(from, to),
            rate_timestamp: self.updated_at,
        })
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::simulated()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn same_currency_rate_is_one() {
        let table = RateTable::simulated();
        for c in Currency::ALL {
            assert_eq!(table.exchange_rate(c, c), Decimal::ONE);
        }
    }

    #[test]
    fn usd_to_eur_uses_quoted_rate() {
        let table = RateTable::simulated();
        assert_eq!(table.exchange_rate(Currency::Usd, Currency::Eur), dec("0.8523"));
    }

    #[test]
    fn eur_to_usd_is_rounded_to_six_places() {
        let table = RateTable::simulated();
        // 1 / 0.8523 = 1.17329578...
        assert_eq!(table.exchange_rate(Currency::Eur, Currency::Usd), dec("1.173296"));
    }

    #[test]
    fn cross_rate_goes_through_base() {
        let table = RateTable::simulated();
        // 0.7891 / 0.8523 = 0.925847706...
        assert_eq!(table.exchange_rate(Currency::Eur, Currency::Gbp), dec("0.925848"));
    }

    #[test]
    fn converts_and_rounds_to_cents() {
        let table = RateTable::simulated();
        let conversion = table
            .convert(dec("100"), Currency::Usd, Currency::Eur)
            .unwrap();
        assert_eq!(conversion.converted_amount, dec("85.23"));
        assert_eq!(conversion.exchange_rate, dec("0.8523"));
        assert_eq!(conversion.rate_timestamp, table.updated_at());
    }

    #[test]
    fn rounding_is_bankers() {
        let table = RateTable::simulated();
        // 0.05 USD -> EUR = 0.042615 -> 0.04
        let c = table.convert(dec("0.05"), Currency::Usd, Currency::Eur).unwrap();
        assert_eq!(c.converted_amount, dec("0.04"));
        // 0.125 same currency rounds half to even -> 0.12
        let c = table.convert(dec("0.125"), Currency::Usd, Currency::Usd).unwrap();
        assert_eq!(c.converted_amount, dec("0.12"));
    }

    #[test]
    fn rejects_non_positive_amounts() {
        let table = RateTable::simulated();
        assert_eq!(
            table.convert(Decimal::ZERO, Currency::Usd, Currency::Eur),
            Err(ConversionError::NonPositiveAmount(Decimal::ZERO))
        );
        assert!(table.convert(dec("-5"), Currency::Usd, Currency::Eur).is_err());
    }

    #[test]
    fn rejects_amounts_that_overflow() {
        let table = RateTable::simulated();
        let result = table.convert(Decimal::MAX, Currency::Usd, Currency::Jpy);
        assert_eq!(result, Err(ConversionError::AmountTooLarge(Decimal::MAX)));
    }

    #[test]
    fn rejects_amounts_beyond_storage_range() {
        let table = RateTable::simulated();
        let limit = Decimal::from(AMOUNT_LIMIT);
        assert!(matches!(
            table.convert(limit, Currency::Usd, Currency::Usd),
            Err(ConversionError::AmountTooLarge(_))
        ));

        // Fits as input but not once converted into yen.
        let amount = dec("1000000000000");
        assert!(matches!(
            table.convert(amount, Currency::Usd, Currency::Jpy),
            Err(ConversionError::AmountTooLarge(_))
        ));
        assert!(table.convert(amount, Currency::Usd, Currency::Eur).is_ok());
    }

    fn currency() -> impl Strategy<Value = Currency> {
        prop::sample::select(Currency::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn round_trip_stays_within_rounding_error(
            cents in 100i64..100_000_000,
            from in currency(),
            to in currency(),
        ) {
            let table = RateTable::simulated();
            let amount = Decimal::new(cents, 2);

            let there = table.convert(amount, from, to).unwrap();
            prop_assume!(there.converted_amount > Decimal::ZERO);
            let back = table.convert(there.converted_amount, to, from).unwrap();

            // one cent of the target currency, expressed back in the source currency
            let cent = Decimal::new(1, 2);
            let tolerance = cent + cent * table.rate(from) / table.rate(to);
            let diff = (back.converted_amount - amount).abs();
            prop_assert!(diff <= tolerance, "{amount} {from}->{to}->{from} = {}", back.converted_amount);
        }
    }
}
