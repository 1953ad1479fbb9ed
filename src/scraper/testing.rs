//! In-memory page doubles for scraper and loop tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{ElementHandle, PageSession, SessionFactory};
use crate::config::SelectorConfig;
use crate::error::{OddsError, Result};

#[derive(Debug, Clone)]
pub struct FakeMarket {
    pub title: String,
    pub odds: Vec<String>,
}

impl FakeMarket {
    pub fn new(title: &str, odds: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            odds: odds.iter().map(|o| o.to_string()).collect(),
        }
    }
}

/// Page whose markets can be swapped while a loop is reading it.
///
/// Element ids: `body`, `m{i}`, `m{i}/title`, `m{i}/odds{j}`.
pub struct FakePage {
    selectors: SelectorConfig,
    markets: Mutex<Vec<FakeMarket>>,
    stale_odds_reads: AtomicU32,
    pub navigations: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl FakePage {
    pub fn new(markets: Vec<FakeMarket>) -> Self {
        Self {
            selectors: SelectorConfig::default(),
            markets: Mutex::new(markets),
            stale_odds_reads: AtomicU32::new(0),
            navigations: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn set_markets(&self, markets: Vec<FakeMarket>) {
        *self.markets.lock().unwrap() = markets;
    }

    pub fn set_odds(&self, title: &str, odds: &[&str]) {
        let mut markets = self.markets.lock().unwrap();
        if let Some(market) = markets.iter_mut().find(|m| m.title == title) {
            market.odds = odds.iter().map(|o| o.to_string()).collect();
        }
    }

    /// Make the next `n` odds text reads fail as detached elements
    pub fn fail_next_reads(&self, n: u32) {
        self.stale_odds_reads.store(n, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn stale() -> OddsError {
        OddsError::WebDriver {
            code: "stale element reference".to_string(),
            message: "element is not attached to the page document".to_string(),
        }
    }

    fn market_index(id: &str) -> Option<usize> {
        id.strip_prefix('m')?.split('/').next()?.parse().ok()
    }
}

#[async_trait]
impl PageSession for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        if selector == "body" {
            return Ok(vec![ElementHandle("body".to_string())]);
        }
        if selector == self.selectors.market_item {
            let count = self.markets.lock().unwrap().len();
            return Ok((0..count).map(|i| ElementHandle(format!("m{}", i))).collect());
        }
        Ok(Vec::new())
    }

    async fn find_all_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        let markets = self.markets.lock().unwrap();
        let Some(market) = Self::market_index(parent.id()).and_then(|i| markets.get(i)) else {
            return Err(Self::stale());
        };

        if selector == self.selectors.market_title {
            Ok(vec![ElementHandle(format!("{}/title", parent.id()))])
        } else if selector == self.selectors.odds_value {
            Ok((0..market.odds.len())
                .map(|j| ElementHandle(format!("{}/odds{}", parent.id(), j)))
                .collect())
        } else {
            Ok(Vec::new())
        }
    }

    async fn text(&self, element: &ElementHandle) -> Result<String> {
        let id = element.id();
        let markets = self.markets.lock().unwrap();
        let market = Self::market_index(id)
            .and_then(|i| markets.get(i))
            .ok_or_else(Self::stale)?;

        if id.ends_with("/title") {
            return Ok(format!(" {} ", market.title));
        }

        let remaining = self.stale_odds_reads.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.stale_odds_reads.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(Self::stale());
        }

        let j: usize = id
            .rsplit("/odds")
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(Self::stale)?;
        market.odds.get(j).cloned().ok_or_else(Self::stale)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl PageSession for Arc<FakePage> {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.as_ref().navigate(url).await
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        self.as_ref().find_all(selector).await
    }

    async fn find_all_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        self.as_ref().find_all_within(parent, selector).await
    }

    async fn text(&self, element: &ElementHandle) -> Result<String> {
        self.as_ref().text(element).await
    }

    async fn close(&self) -> Result<()> {
        self.as_ref().close().await
    }
}

/// Hands out the same shared page; optionally refuses to open
pub struct FakeFactory {
    pub page: Arc<FakePage>,
    pub fail_open: bool,
    pub opened: AtomicUsize,
}

impl FakeFactory {
    pub fn new(page: Arc<FakePage>) -> Self {
        Self {
            page,
            fail_open: false,
            opened: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(Arc::new(FakePage::new(Vec::new())))
        }
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self) -> Result<Box<dyn PageSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(OddsError::WebDriver {
                code: "session not created".to_string(),
                message: "chrome not reachable".to_string(),
            });
        }
        Ok(Box::new(Arc::clone(&self.page)))
    }
}
