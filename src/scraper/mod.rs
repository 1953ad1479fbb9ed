//! Page scraping seams
//!
//! `PageSession` is the minimal surface of a rendering browser the extraction
//! loop needs, `SessionFactory` opens one session per monitored event, and
//! `OddsSource` turns a session into market titles and raw odds text.

pub mod market_page;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::RawOdds;
use crate::error::{OddsError, Result};

pub use market_page::MarketPageSource;
pub use retry::RetryPolicy;

/// Opaque reference to an element on the rendered page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// A live, page-rendering browser session
#[async_trait]
pub trait PageSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// All elements matching a CSS selector, possibly empty
    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>>;

    /// All descendants of `parent` matching a CSS selector
    async fn find_all_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>>;

    /// Visible text of an element
    async fn text(&self, element: &ElementHandle) -> Result<String>;

    /// Release the session; safe to call more than once
    async fn close(&self) -> Result<()>;
}

/// Opens fresh sessions, one per extraction loop
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn PageSession>>;
}

/// Reads market data for one event page
#[async_trait]
pub trait OddsSource: Send + Sync {
    /// Title of the market at a 1-based position
    async fn locate_market(&self, session: &dyn PageSession, index: usize) -> Result<String>;

    /// Current odds text of the market with exactly this title
    async fn read_market_odds(
        &self,
        session: &dyn PageSession,
        market_title: &str,
    ) -> Result<RawOdds>;
}

/// Poll until at least one element matches or the timeout elapses.
///
/// Stale errors during polling are swallowed; the page is mid re-render.
pub async fn wait_for_all(
    session: &dyn PageSession,
    selector: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<Vec<ElementHandle>> {
    let deadline = Instant::now() + timeout;

    loop {
        match session.find_all(selector).await {
            Ok(found) if !found.is_empty() => return Ok(found),
            Ok(_) => {}
            Err(e) if e.is_stale() => {}
            Err(e) => return Err(e),
        }

        if Instant::now() >= deadline {
            return Err(OddsError::NotFound(format!(
                "no element matched '{}' within {:?}",
                selector, timeout
            )));
        }
        tokio::time::sleep(poll).await;
    }
}
