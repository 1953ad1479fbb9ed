//! Per-event extraction loop
//!
//! `Init` opens a rendering session, loads the event page and picks the market
//! to follow; any failure there is terminal. `Monitoring` then reads the
//! market's odds every poll interval and publishes whole records into the
//! store. Every await point races the loop's cancellation token.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ScraperConfig;
use crate::domain::{LoopLease, LoopPhase, OddsRecord};
use crate::error::{OddsError, Result};
use crate::scraper::{wait_for_all, OddsSource, PageSession, SessionFactory};
use crate::services::{Metrics, OddsStore};

/// Shared dependencies of every extraction loop
#[derive(Clone)]
pub struct LoopContext {
    pub store: Arc<OddsStore>,
    pub source: Arc<dyn OddsSource>,
    pub sessions: Arc<dyn SessionFactory>,
    pub metrics: Arc<Metrics>,
    pub scraper: ScraperConfig,
    pub poll_interval: Duration,
}

/// Starts loops for freshly activated events
pub trait LoopLauncher: Send + Sync {
    fn launch(&self, lease: LoopLease);
}

/// Launcher that runs each loop as its own tokio task
pub struct ExtractionLauncher {
    ctx: LoopContext,
}

impl ExtractionLauncher {
    pub fn new(ctx: LoopContext) -> Self {
        Self { ctx }
    }
}

impl LoopLauncher for ExtractionLauncher {
    fn launch(&self, lease: LoopLease) {
        self.ctx.metrics.inc_loops_spawned();
        ExtractionLoop::new(self.ctx.clone(), lease).spawn();
    }
}

pub struct ExtractionLoop {
    ctx: LoopContext,
    lease: LoopLease,
}

impl ExtractionLoop {
    pub fn new(ctx: LoopContext, lease: LoopLease) -> Self {
        Self { ctx, lease }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        let span = info_span!(
            "extraction",
            event = %self.lease.event_id,
            generation = self.lease.generation
        );
        tokio::spawn(self.run().instrument(span))
    }

    /// Run until cancelled or until setup fails.
    pub async fn run(self) -> Result<()> {
        let cancel = self.lease.cancel.clone();
        info!("Starting extraction loop");

        let opened = tokio::select! {
            _ = cancel.cancelled() => Err(OddsError::Cancelled),
            r = self.ctx.sessions.open() => r,
        };
        let session = match opened {
            Ok(session) => session,
            Err(e) => return Err(self.fail_setup(None, e).await),
        };

        let discovered = tokio::select! {
            _ = cancel.cancelled() => Err(OddsError::Cancelled),
            r = self.discover_market(session.as_ref()) => r,
        };
        let market_title = match discovered {
            Ok(title) => title,
            Err(e) => return Err(self.fail_setup(Some(session), e).await),
        };

        self.ctx
            .store
            .set_phase(&self.lease.event_id, self.lease.generation, LoopPhase::Monitoring)
            .await;
        info!("Monitoring market: {}", market_title);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.cycle(session.as_ref(), &market_title) => self.record_outcome(result),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.ctx.poll_interval) => {}
            }
        }

        info!("Extraction loop cancelled");
        self.terminate(Some(session)).await;
        Ok(())
    }

    /// Init: load the page and resolve the configured market title
    async fn discover_market(&self, session: &dyn PageSession) -> Result<String> {
        discover_market(&self.ctx, session, &self.lease.event_id).await
    }

    /// One Monitoring pass; true when a record was stored
    async fn cycle(&self, session: &dyn PageSession, market_title: &str) -> Result<bool> {
        let raw = self.ctx.source.read_market_odds(session, market_title).await?;
        let record = OddsRecord::from_raw(raw, Utc::now())?;
        let summary = format!(
            "{} / {} ({:?} / {:?})",
            record.odds_t1, record.odds_t2, record.probability_t1, record.probability_t2
        );

        let stored = self
            .ctx
            .store
            .publish(&self.lease.event_id, self.lease.generation, record)
            .await;
        if stored {
            info!("Updated odds: {}", summary);
        }
        Ok(stored)
    }

    fn record_outcome(&self, result: Result<bool>) {
        match result {
            Ok(true) => self.ctx.metrics.inc_records_published(),
            Ok(false) => debug!("Record not stored"),
            Err(OddsError::Parse(msg)) => {
                self.ctx.metrics.inc_parse_failures();
                warn!("Invalid odds format, skipping cycle: {}", msg);
            }
            Err(e @ OddsError::NotFound(_)) => {
                self.ctx.metrics.inc_market_not_found();
                warn!("Market unavailable this cycle: {}", e);
            }
            Err(e) if e.is_recoverable() => warn!("Page kept re-rendering, skipping cycle: {}", e),
            Err(e) => error!("Unexpected error extracting market data: {}", e),
        }
    }

    async fn fail_setup(&self, session: Option<Box<dyn PageSession>>, cause: OddsError) -> OddsError {
        self.terminate(session).await;

        if matches!(cause, OddsError::Cancelled) {
            info!("Extraction loop cancelled during setup");
            return cause;
        }

        self.ctx.metrics.inc_setup_failures();
        error!("Could not set up market monitoring, exiting loop: {}", cause);
        OddsError::SetupFailure {
            event_id: self.lease.event_id.clone(),
            reason: cause.to_string(),
        }
    }

    /// Terminated: release the session and hand the event back
    async fn terminate(&self, session: Option<Box<dyn PageSession>>) {
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                warn!("Failed to close rendering session: {}", e);
            }
        }
        self.ctx
            .store
            .mark_inactive(&self.lease.event_id, self.lease.generation)
            .await;
    }
}

async fn discover_market(
    ctx: &LoopContext,
    session: &dyn PageSession,
    event_id: &str,
) -> Result<String> {
    let url = ctx.scraper.event_url(event_id);
    session.navigate(&url).await?;
    wait_for_all(
        session,
        "body",
        ctx.scraper.page_load_timeout(),
        ctx.scraper.element_poll(),
    )
    .await?;

    ctx.source
        .locate_market(session, ctx.scraper.market_index)
        .await
}

/// Scrape an event once without registering it in the store
pub async fn probe_event(ctx: &LoopContext, event_id: &str) -> Result<OddsRecord> {
    let session = ctx.sessions.open().await?;

    let result = async {
        let title = discover_market(ctx, session.as_ref(), event_id).await?;
        let raw = ctx.source.read_market_odds(session.as_ref(), &title).await?;
        OddsRecord::from_raw(raw, Utc::now())
    }
    .await;

    if let Err(e) = session.close().await {
        warn!("Failed to close rendering session: {}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::scraper::testing::{FakeFactory, FakeMarket, FakePage};
    use crate::scraper::{MarketPageSource, RetryPolicy};
    use std::sync::atomic::Ordering;

    const EVENT: &str = "punjab-legends-v-rajasthan-legends-v-12962641";

    fn context(factory: FakeFactory) -> LoopContext {
        let config = AppConfig::default_config();
        let metrics = Arc::new(Metrics::new());
        let retry = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        LoopContext {
            store: Arc::new(OddsStore::new(100)),
            source: Arc::new(MarketPageSource::new(
                &config.scraper,
                retry,
                Arc::clone(&metrics),
            )),
            sessions: Arc::new(factory),
            metrics,
            scraper: config.scraper,
            poll_interval: Duration::from_secs(2),
        }
    }

    fn winner(odds: &[&str]) -> Vec<FakeMarket> {
        vec![FakeMarket::new("Winner", odds), FakeMarket::new("Toss", &["1.90", "1.90"])]
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_and_follows_updates() {
        let page = Arc::new(FakePage::new(winner(&["1.64", "2.50"])));
        let ctx = context(FakeFactory::new(Arc::clone(&page)));
        let lease = ctx.store.mark_active(EVENT).await.unwrap();
        let handle = ExtractionLoop::new(ctx.clone(), lease.clone()).spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let first = ctx.store.get(EVENT).await.unwrap();
        assert_eq!(first.market_name, "Winner");
        assert_eq!(first.odds_t1, "1.64");
        assert_eq!(ctx.store.phase(EVENT).await, Some(LoopPhase::Monitoring));
        assert_eq!(
            page.navigations.lock().unwrap().clone(),
            vec![format!("https://pari-matchin.com/en/events/{}?tab=all", EVENT)]
        );

        page.set_odds("Winner", &["1.70", "2.30"]);
        tokio::time::sleep(Duration::from_secs(3)).await;
        let second = ctx.store.get(EVENT).await.unwrap();
        assert_eq!(second.odds_t1, "1.70");
        assert!(second.timestamp >= first.timestamp);

        lease.cancel.cancel();
        handle.await.unwrap().unwrap();
        assert!(page.is_closed());
        assert!(!ctx.store.is_active(EVENT).await);
        assert_eq!(ctx.store.phase(EVENT).await, Some(LoopPhase::Terminated));
        assert!(ctx.metrics.records_published.load(Ordering::Relaxed) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_failure_is_terminal() {
        let ctx = context(FakeFactory::failing());
        let lease = ctx.store.mark_active(EVENT).await.unwrap();

        let result = ExtractionLoop::new(ctx.clone(), lease).run().await;
        assert!(matches!(result, Err(OddsError::SetupFailure { .. })));
        assert!(!ctx.store.is_active(EVENT).await);
        assert_eq!(ctx.metrics.setup_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_market_fails_setup_and_closes_session() {
        let page = Arc::new(FakePage::new(Vec::new()));
        let ctx = context(FakeFactory::new(Arc::clone(&page)));
        let lease = ctx.store.mark_active(EVENT).await.unwrap();

        let result = ExtractionLoop::new(ctx.clone(), lease).run().await;
        assert!(matches!(result, Err(OddsError::SetupFailure { .. })));
        assert!(page.is_closed());
        assert!(!ctx.store.is_active(EVENT).await);
        assert!(ctx.store.get(EVENT).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_odds_keep_previous_record() {
        let page = Arc::new(FakePage::new(winner(&["1.64", "2.50"])));
        let ctx = context(FakeFactory::new(Arc::clone(&page)));
        let lease = ctx.store.mark_active(EVENT).await.unwrap();
        let handle = ExtractionLoop::new(ctx.clone(), lease.clone()).spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = ctx.store.get(EVENT).await.unwrap();

        page.set_odds("Winner", &["SUSPENDED", "2.50"]);
        tokio::time::sleep(Duration::from_secs(5)).await;
        page.set_odds("Winner", &["0", "2.50"]);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(ctx.store.get(EVENT).await.unwrap(), before);
        assert!(ctx.metrics.parse_failures.load(Ordering::Relaxed) >= 2);
        assert!(ctx.store.is_active(EVENT).await);

        lease.cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanished_market_skips_cycles_without_exiting() {
        let page = Arc::new(FakePage::new(winner(&["1.64", "2.50"])));
        let ctx = context(FakeFactory::new(Arc::clone(&page)));
        let lease = ctx.store.mark_active(EVENT).await.unwrap();
        let handle = ExtractionLoop::new(ctx.clone(), lease.clone()).spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        page.set_markets(vec![FakeMarket::new("Toss", &["1.90", "1.90"])]);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(ctx.metrics.market_not_found.load(Ordering::Relaxed) >= 1);
        assert!(ctx.store.is_active(EVENT).await);
        assert_eq!(ctx.store.get(EVENT).await.unwrap().odds_t1, "1.64");

        page.set_markets(winner(&["1.55", "2.70"]));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ctx.store.get(EVENT).await.unwrap().odds_t1, "1.55");

        lease.cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicted_loop_does_not_release_its_successor() {
        let page = Arc::new(FakePage::new(winner(&["1.64", "2.50"])));
        let ctx = context(FakeFactory::new(Arc::clone(&page)));
        let first = ctx.store.mark_active(EVENT).await.unwrap();
        let first_handle = ExtractionLoop::new(ctx.clone(), first.clone()).spawn();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let later = Utc::now() + chrono::Duration::seconds(600);
        ctx.store.evict_idle(later, chrono::Duration::seconds(60)).await;
        let second = ctx.store.mark_active(EVENT).await.unwrap();
        let second_handle = ExtractionLoop::new(ctx.clone(), second.clone()).spawn();

        first_handle.await.unwrap().unwrap();
        assert!(ctx.store.is_active(EVENT).await);
        assert!(ctx.store.mark_active(EVENT).await.is_none());
        assert_eq!(ctx.store.counts().await, (1, 1));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(ctx.store.phase(EVENT).await, Some(LoopPhase::Monitoring));
        assert_eq!(ctx.store.get(EVENT).await.unwrap().odds_t1, "1.64");

        second.cancel.cancel();
        second_handle.await.unwrap().unwrap();
        assert!(!ctx.store.is_active(EVENT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_reads_once_without_registering() {
        let page = Arc::new(FakePage::new(winner(&["1.64", "2.50"])));
        let ctx = context(FakeFactory::new(Arc::clone(&page)));

        let record = probe_event(&ctx, EVENT).await.unwrap();
        assert_eq!(record.odds_t2, "2.50");
        assert!(page.is_closed());
        assert!(ctx.store.get(EVENT).await.is_none());
        assert!(!ctx.store.is_active(EVENT).await);
    }
}
