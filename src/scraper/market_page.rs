use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{wait_for_all, ElementHandle, OddsSource, PageSession, RetryPolicy};
use crate::config::{ScraperConfig, SelectorConfig};
use crate::domain::RawOdds;
use crate::error::{OddsError, Result};
use crate::services::Metrics;

/// `OddsSource` for the event page layout: a list of market items, each with
/// a title button and animated odds spans.
pub struct MarketPageSource {
    selectors: SelectorConfig,
    market_wait_timeout: Duration,
    element_poll: Duration,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl MarketPageSource {
    pub fn new(config: &ScraperConfig, retry: RetryPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            selectors: config.selectors.clone(),
            market_wait_timeout: config.market_wait_timeout(),
            element_poll: config.element_poll(),
            retry,
            metrics,
        }
    }

    async fn market_items(&self, session: &dyn PageSession) -> Result<Vec<ElementHandle>> {
        wait_for_all(
            session,
            &self.selectors.market_item,
            self.market_wait_timeout,
            self.element_poll,
        )
        .await
    }

    async fn title_of(&self, session: &dyn PageSession, market: &ElementHandle) -> Result<String> {
        let titles = session
            .find_all_within(market, &self.selectors.market_title)
            .await?;
        let title = titles.first().ok_or_else(|| {
            OddsError::NotFound(format!("market {} has no title element", market.id()))
        })?;
        Ok(session.text(title).await?.trim().to_string())
    }

    /// One pass over the rendered markets.
    async fn scan(&self, session: &dyn PageSession, market_title: &str) -> Result<RawOdds> {
        let markets = self.market_items(session).await?;

        let mut target = None;
        for market in &markets {
            match self.title_of(session, market).await {
                Ok(title) if title == market_title => {
                    target = Some(market);
                    break;
                }
                Ok(_) => {}
                // Items detach while we walk the list; skip them
                Err(e) if e.is_stale() || matches!(e, OddsError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        let target = target.ok_or_else(|| {
            OddsError::NotFound(format!("market '{}' is not rendered", market_title))
        })?;

        let odds_elements = session
            .find_all_within(target, &self.selectors.odds_value)
            .await?;
        let mut values = Vec::with_capacity(odds_elements.len());
        for element in &odds_elements {
            values.push(session.text(element).await?.trim().to_string());
        }

        Ok(RawOdds {
            market_name: market_title.to_string(),
            values,
        })
    }
}

#[async_trait]
impl OddsSource for MarketPageSource {
    async fn locate_market(&self, session: &dyn PageSession, index: usize) -> Result<String> {
        let markets = self.market_items(session).await?;

        if index == 0 || index > markets.len() {
            return Err(OddsError::NotFound(format!(
                "market index {} out of range ({} rendered)",
                index,
                markets.len()
            )));
        }

        self.title_of(session, &markets[index - 1]).await
    }

    async fn read_market_odds(
        &self,
        session: &dyn PageSession,
        market_title: &str,
    ) -> Result<RawOdds> {
        let mut attempts = 0u32;

        loop {
            let err = match self.scan(session, market_title).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_stale() => {
                    self.metrics.inc_render_retries();
                    warn!("Market element went stale or disappeared: {}", e);
                    OddsError::TransientRender(e.to_string())
                }
                Err(e @ OddsError::NotFound(_)) => {
                    warn!("{}, retrying", e);
                    e
                }
                Err(e) => return Err(e),
            };

            attempts += 1;
            if !self.retry.allows(attempts) {
                return Err(err);
            }

            let delay = self.retry.backoff(attempts - 1);
            debug!("Rescanning '{}' in {:?} (attempt {})", market_title, delay, attempts + 1);
            tokio::time::sleep(delay).await;
        }
    }
}
