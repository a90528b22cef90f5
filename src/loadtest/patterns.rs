//! Weighted catalogue of realistic conversion traffic.
use std::collections::BTreeMap;

use rand::{Rng, seq::SliceRandom};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::LoadTestConfig;
use crate::{currency::Currency, models::ConversionRequest};

use Currency::*;

/// Pair weights; higher is more common.
const PAIR_WEIGHTS: [((Currency, Currency), u32); 24] = [
    ((Usd, Eur), 25),
    ((Usd, Gbp), 20),
    ((Eur, Gbp), 15),
    ((Usd, Jpy), 18),
    ((Eur, Usd), 25),
    ((Gbp, Usd), 20),
    ((Gbp, Eur), 15),
    ((Jpy, Usd), 18),
    ((Eur, Jpy), 8),
    ((Gbp, Jpy), 8),
    ((Jpy, Eur), 8),
    ((Jpy, Gbp), 8),
    ((Usd, Cad), 6),
    ((Usd, Aud), 5),
    ((Usd, Chf), 4),
    ((Cad, Usd), 6),
    ((Aud, Usd), 5),
    ((Chf, Usd), 4),
    ((Eur, Cad), 3),
    ((Eur, Aud), 3),
    ((Eur, Chf), 3),
    ((Gbp, Cad), 2),
    ((Gbp, Aud), 2),
    ((Gbp, Chf), 2),
];

const INVALID_CODES: [&str; 4] = ["XXX", "ABC", "ZZZ", "INVALID"];

/// Typical transaction sizes in whole units of the source currency.
fn typical_amounts(currency: Currency) -> &'static [i64] {
    match currency {
        Usd => &[100, 250, 500, 1000, 2500, 5000, 10000],
        Eur => &[100, 250, 500, 750, 1000, 2000, 5000],
        Gbp => &[75, 150, 300, 500, 1000, 2500, 5000],
        Jpy => &[10000, 25000, 50000, 100_000, 250_000, 500_000, 1_000_000],
        Cad | Aud => &[100, 200, 500, 1000, 2000, 5000],
        Chf => &[100, 200, 500, 1000, 2500, 5000],
        _ => typical_amounts(Usd),
    }
}

fn pair_code((from, to): (Currency, Currency)) -> String {
    format!("{}_{}", from.code(), to.code())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CurrencyPatterns;

impl CurrencyPatterns {
    /// Every catalogue pair as `FROM_TO`.
    pub fn all_pairs() -> Vec<String> {
        PAIR_WEIGHTS.iter().map(|(pair, _)| pair_code(*pair)).collect()
    }

    /// Distinct typical amounts of every source currency in `pairs`, ascending.
    pub fn amounts_for_pairs(pairs: &[String]) -> Vec<Decimal> {
        let mut amounts: Vec<Decimal> = pairs
            .iter()
            .filter_map(|p| super::parse_pair(p).ok())
            .flat_map(|(from, _)| typical_amounts(from).iter().map(|a| Decimal::from(*a)))
            .collect();

        amounts.sort();
        amounts.dedup();
        amounts
    }

    /// Share of each catalogue pair in percent.
    pub fn pair_distribution() -> BTreeMap<String, f64> {
        let total: u32 = PAIR_WEIGHTS.iter().map(|(_, w)| w).sum();

        PAIR_WEIGHTS
            .iter()
            .map(|(pair, weight)| (pair_code(*pair), f64::from(*weight) / f64::from(total) * 100.0))
            .collect()
    }

    fn weight(pair: (Currency, Currency)) -> u32 {
        PAIR_WEIGHTS
            .iter()
            .find(|(p, _)| *p == pair)
            .map_or(1, |(_, w)| *w)
    }

    /// Request drawn from the whole catalogue.
    pub fn random_request<R: Rng>(rng: &mut R) -> ConversionRequest {
        let ((from, to), _) = *PAIR_WEIGHTS
            .choose_weighted(rng, |(_, w)| *w)
            .unwrap_or(&PAIR_WEIGHTS[0]);
        let amount = typical_amounts(from)
            .choose(rng)
            .map_or(Decimal::ONE_HUNDRED, |a| Decimal::from(*a));

        request(amount, from.code(), to.code())
    }

    /// Request limited to the pairs and amounts of `config`. Pairs keep their
    /// catalogue weight; pairs outside the catalogue weigh 1.
    pub fn request_for<R: Rng>(config: &LoadTestConfig, rng: &mut R) -> ConversionRequest {
        let pairs = config.pairs();
        let Ok(&(from, to)) = pairs.choose_weighted(rng, |p| Self::weight(*p)) else {
            return Self::random_request(rng);
        };

        let amount = match config.amounts.choose(rng) {
            Some(amount) => *amount,
            None => typical_amounts(from)
                .choose(rng)
                .map_or(Decimal::ONE_HUNDRED, |a| Decimal::from(*a)),
        };

        request(amount, from.code(), to.code())
    }

    /// Request the API must reject: unknown currency or non-positive amount.
    pub fn invalid_request<R: Rng>(rng: &mut R) -> ConversionRequest {
        let mut valid = Self::random_request(rng);
        let code = INVALID_CODES.choose(rng).copied().unwrap_or("XXX");

        match rng.gen_range(0..4) {
            0 => valid.from_currency = code.to_string(),
            1 => valid.to_currency = code.to_string(),
            2 => valid.amount = -valid.amount,
            _ => valid.amount = Decimal::ZERO,
        }

        valid
    }
}

fn request(amount: Decimal, from: &str, to: &str) -> ConversionRequest {
    ConversionRequest {
        amount,
        from_currency: from.to_string(),
        to_currency: to.to_string(),
        request_id: Some(Uuid::now_v7()),
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::exchange_rate::RateTable;

    #[test]
    fn distribution_sums_to_hundred() {
        let distribution = CurrencyPatterns::pair_distribution();
        let total: f64 = distribution.values().sum();
        assert!((total - 100.0).abs() < 1e-9);
        assert!(distribution["USD_EUR"] > distribution["GBP_CHF"]);
    }

    #[test]
    fn random_requests_are_valid() {
        let table = RateTable::simulated();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..200 {
            let request = CurrencyPatterns::random_request(&mut rng);
            let from: Currency = request.from_currency.parse().unwrap();
            let to: Currency = request.to_currency.parse().unwrap();
            assert!(table.convert(request.amount, from, to).is_ok());
            assert!(request.request_id.is_some());
        }
    }

    #[test]
    fn configured_requests_stay_in_config() {
        let mut config = LoadTestConfig::with_rps(1.0);
        config.currency_pairs = vec!["GBP_JPY".to_string(), "EUR_USD".to_string()];
        config.amounts = vec![Decimal::new(42, 0)];
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..100 {
            let request = CurrencyPatterns::request_for(&config, &mut rng);
            let pair = format!("{}_{}", request.from_currency, request.to_currency);
            assert!(config.currency_pairs.contains(&pair));
            assert_eq!(request.amount, Decimal::new(42, 0));
        }
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let table = RateTable::simulated();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..100 {
            let request = CurrencyPatterns::invalid_request(&mut rng);
            let rejected = match (
                request.from_currency.parse::<Currency>(),
                request.to_currency.parse::<Currency>(),
            ) {
                (Ok(from), Ok(to)) => table.convert(request.amount, from, to).is_err(),
                _ => true,
            };
            assert!(rejected, "{request:?} should be rejected");
        }
    }

    #[test]
    fn amounts_follow_source_currency() {
        let amounts = CurrencyPatterns::amounts_for_pairs(&["JPY_USD".to_string()]);
        assert_eq!(amounts.first(), Some(&Decimal::from(10000)));
        assert!(CurrencyPatterns::amounts_for_pairs(&["XXX_YYY".to_string()]).is_empty());
    }
}
