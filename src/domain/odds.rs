use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{OddsError, Result};

/// Decimal places kept for implied probabilities
pub const PROBABILITY_DP: u32 = 4;

/// Decimal places kept for margins and stakes
pub const MONEY_DP: u32 = 2;

/// One of the two sides of a market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeSide {
    T1,
    T2,
}

impl OutcomeSide {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OutcomeSide::T1 => OutcomeSide::T2,
            OutcomeSide::T2 => OutcomeSide::T1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeSide::T1 => "t1",
            OutcomeSide::T2 => "t2",
        }
    }
}

impl std::fmt::Display for OutcomeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutcomeSide {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "t1" | "1" | "team1" => Ok(OutcomeSide::T1),
            "t2" | "2" | "team2" => Ok(OutcomeSide::T2),
            other => Err(format!("unknown side '{}', expected t1 or t2", other)),
        }
    }
}

/// Odds text exactly as rendered on the page for one market
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOdds {
    pub market_name: String,
    pub values: Vec<String>,
}

/// One published snapshot of a two-sided market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsRecord {
    /// Capture time, fractional Unix seconds on the wire
    #[serde(with = "epoch_seconds")]
    pub timestamp: DateTime<Utc>,
    pub market_name: String,
    /// Display strings, returned verbatim
    pub odds_t1: String,
    pub odds_t2: String,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub probability_t1: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub probability_t2: Option<Decimal>,
}

impl OddsRecord {
    /// Build a record from scraped text.
    ///
    /// Fails unless the market shows exactly two values that both parse as
    /// positive decimals; partial records are never produced.
    pub fn from_raw(raw: RawOdds, timestamp: DateTime<Utc>) -> Result<Self> {
        let [odds_t1, odds_t2]: [String; 2] = raw.values.try_into().map_err(|v: Vec<String>| {
            OddsError::Parse(format!(
                "expected two odds values for '{}', found {}",
                raw.market_name,
                v.len()
            ))
        })?;

        let t1 = parse_odds(&odds_t1)?;
        let t2 = parse_odds(&odds_t2)?;

        Ok(Self {
            timestamp,
            market_name: raw.market_name,
            odds_t1: odds_t1.trim().to_string(),
            odds_t2: odds_t2.trim().to_string(),
            probability_t1: implied_probability(t1),
            probability_t2: implied_probability(t2),
        })
    }

    /// Numeric odds for one side
    pub fn odds(&self, side: OutcomeSide) -> Result<Decimal> {
        match side {
            OutcomeSide::T1 => parse_odds(&self.odds_t1),
            OutcomeSide::T2 => parse_odds(&self.odds_t2),
        }
    }

    /// Bookmaker margin in percent
    pub fn margin(&self) -> Option<Decimal> {
        let t1 = self.odds(OutcomeSide::T1).ok()?;
        let t2 = self.odds(OutcomeSide::T2).ok()?;
        Some(bookmaker_margin(t1, t2))
    }
}

/// Parse a displayed decimal odds value. Zero and negative odds are rejected.
pub fn parse_odds(raw: &str) -> Result<Decimal> {
    let value = Decimal::from_str(raw.trim())
        .map_err(|e| OddsError::Parse(format!("'{}' is not a decimal: {}", raw, e)))?;
    if value <= Decimal::ZERO {
        return Err(OddsError::Parse(format!("'{}' is not a positive price", raw)));
    }
    Ok(value)
}

/// 1 / odds rounded to four places, `None` for zero odds
pub fn implied_probability(odds: Decimal) -> Option<Decimal> {
    if odds.is_zero() {
        return None;
    }
    Some((Decimal::ONE / odds).round_dp(PROBABILITY_DP))
}

/// (1/o1 + 1/o2 - 1) * 100, two places
pub fn bookmaker_margin(odds_t1: Decimal, odds_t2: Decimal) -> Decimal {
    let overround = Decimal::ONE / odds_t1 + Decimal::ONE / odds_t2 - Decimal::ONE;
    (overround * Decimal::ONE_HUNDRED).round_dp(MONEY_DP)
}

mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(ts.timestamp_micros() as f64 / 1_000_000.0)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn raw(values: &[&str]) -> RawOdds {
        RawOdds {
            market_name: "Winner".to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(OutcomeSide::T1.opposite(), OutcomeSide::T2);
        assert_eq!(OutcomeSide::T2.opposite(), OutcomeSide::T1);
        assert_eq!("T2".parse::<OutcomeSide>().unwrap(), OutcomeSide::T2);
        assert!("draw".parse::<OutcomeSide>().is_err());
    }

    #[test]
    fn test_probabilities_are_rounded_inverse_odds() {
        for (odds, expected) in [
            (dec!(1.64), dec!(0.6098)),
            (dec!(2.50), dec!(0.4)),
            (dec!(2.10), dec!(0.4762)),
            (dec!(3), dec!(0.3333)),
            (dec!(1.01), dec!(0.9901)),
        ] {
            let p = implied_probability(odds).unwrap();
            assert_eq!(p, expected, "odds {}", odds);
            assert!(p > Decimal::ZERO);
        }
        assert_eq!(implied_probability(Decimal::ZERO), None);
    }

    #[test]
    fn test_record_keeps_display_strings() {
        let record = OddsRecord::from_raw(raw(&["1.64", " 2.50 "]), Utc::now()).unwrap();
        assert_eq!(record.market_name, "Winner");
        assert_eq!(record.odds_t1, "1.64");
        assert_eq!(record.odds_t2, "2.50");
        assert_eq!(record.probability_t1, Some(dec!(0.6098)));
        assert_eq!(record.probability_t2, Some(dec!(0.4)));
    }

    #[test]
    fn test_malformed_odds_are_rejected() {
        for values in [
            vec!["abc", "2.50"],
            vec!["1.64", "0"],
            vec!["-1.5", "2.0"],
            vec!["1.64"],
            vec!["1.64", "2.50", "3.10"],
            vec![],
        ] {
            let result = OddsRecord::from_raw(raw(&values), Utc::now());
            assert!(
                matches!(result, Err(OddsError::Parse(_))),
                "{:?} should not parse",
                values
            );
        }
    }

    #[test]
    fn test_margin() {
        assert_eq!(bookmaker_margin(dec!(1.90), dec!(1.90)), dec!(5.26));
        let record = OddsRecord::from_raw(raw(&["1.64", "2.50"]), Utc::now()).unwrap();
        assert_eq!(record.margin(), Some(dec!(0.98)));
    }

    #[test]
    fn test_wire_format() {
        let ts = DateTime::from_timestamp(1_700_000_000, 500_000_000).unwrap();
        let record = OddsRecord::from_raw(raw(&["1.64", "2.50"]), ts).unwrap();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["timestamp"], serde_json::json!(1_700_000_000.5));
        assert_eq!(json["odds_t1"], "1.64");
        assert_eq!(json["probability_t1"], serde_json::json!(0.6098));
        assert_eq!(json["probability_t2"], serde_json::json!(0.4));

        let back: OddsRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.timestamp, ts);
        assert_eq!(back.odds_t2, "2.50");
    }
}
