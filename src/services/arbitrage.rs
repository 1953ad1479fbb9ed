//! One-shot arbitrage alert
//!
//! Given a bet already placed at fixed odds on one side, watch the other
//! side's price until backing it as well guarantees a profit, i.e. until
//! `1/locked + 1/current < 1`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::domain::{OddsRecord, OutcomeSide, MONEY_DP};
use crate::error::{OddsError, Result};

/// Where the evaluator reads current odds from
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OddsFeed: Send + Sync {
    /// Latest record, `None` while the source has nothing yet
    async fn latest(&self) -> Result<Option<OddsRecord>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArbitrageCheck {
    /// Sum of implied probabilities of both bets
    pub combined: Decimal,
    pub is_arbitrage: bool,
}

/// `1/locked + 1/current`, arbitrage when strictly below 1
pub fn check_arbitrage(locked_odds: Decimal, current_odds: Decimal) -> Result<ArbitrageCheck> {
    if locked_odds <= Decimal::ZERO || current_odds <= Decimal::ZERO {
        return Err(OddsError::Parse(format!(
            "odds must be positive (locked {}, current {})",
            locked_odds, current_odds
        )));
    }

    let combined = Decimal::ONE / locked_odds + Decimal::ONE / current_odds;
    Ok(ArbitrageCheck {
        combined,
        is_arbitrage: combined < Decimal::ONE,
    })
}

/// A bet already placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockedBet {
    pub side: OutcomeSide,
    pub odds: Decimal,
    pub stake: Decimal,
}

impl LockedBet {
    /// Stake on the other side that pays the same as the locked bet
    pub fn hedge_stake(&self, hedge_odds: Decimal) -> Decimal {
        (self.stake * self.odds / hedge_odds).round_dp(MONEY_DP)
    }

    /// Profit common to both outcomes once hedged
    pub fn hedged_profit(&self, hedge_odds: Decimal) -> Decimal {
        let payout = self.stake * self.odds;
        (payout - self.stake - self.hedge_stake(hedge_odds)).round_dp(MONEY_DP)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbitrageOpportunity {
    pub locked: LockedBet,
    pub hedge_side: OutcomeSide,
    pub hedge_odds: Decimal,
    pub combined: Decimal,
    pub hedge_stake: Decimal,
    pub guaranteed_profit: Decimal,
    pub detected_at: DateTime<Utc>,
}

pub struct ArbitrageEvaluator {
    feed: Arc<dyn OddsFeed>,
    bet: LockedBet,
    check_interval: Duration,
}

impl ArbitrageEvaluator {
    pub fn new(feed: Arc<dyn OddsFeed>, bet: LockedBet, check_interval: Duration) -> Self {
        Self {
            feed,
            bet,
            check_interval,
        }
    }

    /// Check one record against the locked bet
    pub fn evaluate(&self, record: &OddsRecord) -> Result<Option<ArbitrageOpportunity>> {
        let hedge_side = self.bet.side.opposite();
        let hedge_odds = record.odds(hedge_side)?;
        let check = check_arbitrage(self.bet.odds, hedge_odds)?;

        if !check.is_arbitrage {
            debug!(
                "No arbitrage: 1/{} + 1/{} = {}",
                self.bet.odds,
                hedge_odds,
                check.combined.round_dp(4)
            );
            return Ok(None);
        }

        Ok(Some(ArbitrageOpportunity {
            locked: self.bet,
            hedge_side,
            hedge_odds,
            combined: check.combined,
            hedge_stake: self.bet.hedge_stake(hedge_odds),
            guaranteed_profit: self.bet.hedged_profit(hedge_odds),
            detected_at: Utc::now(),
        }))
    }

    /// Poll until the first opportunity, then stop.
    ///
    /// Returns `None` if cancelled before one appears.
    pub async fn run(&self, cancel: CancellationToken) -> Result<Option<ArbitrageOpportunity>> {
        info!(
            "Tracking arbitrage for {} stake {} at {}",
            self.bet.side, self.bet.stake, self.bet.odds
        );
        let mut ticker = interval(self.check_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = ticker.tick() => {}
            }

            let record = match self.feed.latest().await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!("Odds not available yet");
                    continue;
                }
                Err(e) => {
                    error!("Error fetching odds: {}", e);
                    continue;
                }
            };
            info!(
                "Fetched odds - t1: {}, t2: {}",
                record.odds_t1, record.odds_t2
            );

            match self.evaluate(&record) {
                Ok(Some(opportunity)) => {
                    notify(&opportunity);
                    return Ok(Some(opportunity));
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping unusable odds: {}", e),
            }
        }
    }
}

fn notify(opportunity: &ArbitrageOpportunity) {
    info!(
        locked_side = %opportunity.locked.side,
        locked_odds = %opportunity.locked.odds,
        hedge_side = %opportunity.hedge_side,
        hedge_odds = %opportunity.hedge_odds,
        hedge_stake = %opportunity.hedge_stake,
        profit = %opportunity.guaranteed_profit,
        "Arbitrage opportunity found"
    );
}
