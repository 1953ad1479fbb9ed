use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::domain::OutcomeSide;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub scraper: ScraperConfig,
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub arbitrage: ArbitrageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which flavour of the odds endpoint to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    /// Loops are started on demand for any queried event
    Multi,
    /// One event fixed at startup; the query parameter is ignored
    Single,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub mode: ServeMode,
    /// Event monitored in single mode
    #[serde(default)]
    pub event: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// WebDriver endpoint (chromedriver)
    pub webdriver_url: String,
    /// Run the browser without a window
    pub headless: bool,
    /// Event page URL, `{event}` is replaced with the event slug
    pub event_url_template: String,
    /// 1-based index of the market to follow
    pub market_index: usize,
    /// Max wait for the page root after navigation
    pub page_load_timeout_secs: u64,
    /// Max wait for market items to render
    pub market_wait_timeout_secs: u64,
    /// Polling step while waiting for elements
    pub element_poll_ms: u64,
    #[serde(default)]
    pub selectors: SelectorConfig,
}

impl ScraperConfig {
    pub fn event_url(&self, event_id: &str) -> String {
        self.event_url_template
            .replace("{event}", &urlencoding::encode(event_id))
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn market_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.market_wait_timeout_secs)
    }

    pub fn element_poll(&self) -> Duration {
        Duration::from_millis(self.element_poll_ms)
    }
}

/// CSS selectors for the event page layout
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    pub market_item: String,
    pub market_title: String,
    pub odds_value: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            market_item: r#"div[data-id="market-item"]"#.to_string(),
            market_title: r#"div[role="button"]"#.to_string(),
            odds_value: r#"span[data-id="animated-odds-value"]"#.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Sleep between polling cycles in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_poll_interval() -> u64 {
    2000
}

impl ExtractionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff policy for re-scanning a re-rendering page
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: u32,
    /// 0 = retry until the loop is cancelled
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 2000,
            max_backoff_ms: 16_000,
            multiplier: 2,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Records kept per event for the dashboard
    pub history_capacity: usize,
    /// Evict events not queried for this long (0 = never)
    pub idle_timeout_secs: u64,
    pub reap_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            history_capacity: 500,
            idle_timeout_secs: 0,
            reap_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArbitrageConfig {
    /// Base URL of the odds endpoint to poll
    pub endpoint: String,
    #[serde(default)]
    pub event: Option<String>,
    pub locked_side: OutcomeSide,
    pub locked_odds: Decimal,
    pub stake: Decimal,
    pub check_interval_secs: u64,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        use rust_decimal_macros::dec;

        Self {
            endpoint: "http://127.0.0.1:5000".to_string(),
            event: None,
            locked_side: OutcomeSide::T1,
            locked_odds: dec!(1.64),
            stake: dec!(55),
            check_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Also write daily rolling log files into this directory
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("server.mode", "multi")?
            .set_default("scraper.webdriver_url", "http://127.0.0.1:9515")?
            .set_default("scraper.headless", true)?
            .set_default(
                "scraper.event_url_template",
                "https://pari-matchin.com/en/events/{event}?tab=all",
            )?
            .set_default("scraper.market_index", 1)?
            .set_default("scraper.page_load_timeout_secs", 10)?
            .set_default("scraper.market_wait_timeout_secs", 10)?
            .set_default("scraper.element_poll_ms", 250)?
            .set_default("extraction.poll_interval_ms", 2000)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("ODDSFEED_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (ODDSFEED__SERVER__PORT, etc.)
            .add_source(
                Environment::with_prefix("ODDSFEED")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage and tests
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                mode: ServeMode::Multi,
                event: None,
            },
            scraper: ScraperConfig {
                webdriver_url: "http://127.0.0.1:9515".to_string(),
                headless: true,
                event_url_template: "https://pari-matchin.com/en/events/{event}?tab=all"
                    .to_string(),
                market_index: 1,
                page_load_timeout_secs: 10,
                market_wait_timeout_secs: 10,
                element_poll_ms: 250,
                selectors: SelectorConfig::default(),
            },
            extraction: ExtractionConfig::default(),
            registry: RegistryConfig::default(),
            arbitrage: ArbitrageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.mode == ServeMode::Single
            && self
                .server
                .event
                .as_deref()
                .map(str::trim)
                .map_or(true, str::is_empty)
        {
            errors.push("server.event is required in single mode".to_string());
        }

        if !self.scraper.event_url_template.contains("{event}") {
            errors.push("scraper.event_url_template must contain {event}".to_string());
        }

        if self.scraper.market_index == 0 {
            errors.push("scraper.market_index is 1-based and must be at least 1".to_string());
        }

        if self.scraper.element_poll_ms == 0 {
            errors.push("scraper.element_poll_ms must be positive".to_string());
        }

        if self.extraction.retry.multiplier == 0 {
            errors.push("extraction.retry.multiplier must be at least 1".to_string());
        }

        if self.extraction.retry.initial_backoff_ms > self.extraction.retry.max_backoff_ms {
            errors.push("extraction.retry.initial_backoff_ms exceeds max_backoff_ms".to_string());
        }

        if self.registry.history_capacity == 0 {
            errors.push("registry.history_capacity must be positive".to_string());
        }

        if self.registry.idle_timeout_secs > 0 && self.registry.reap_interval_secs == 0 {
            errors.push("registry.reap_interval_secs must be positive when eviction is on".to_string());
        }

        if self.arbitrage.locked_odds <= Decimal::ONE {
            errors.push("arbitrage.locked_odds must be greater than 1".to_string());
        }

        if self.arbitrage.stake <= Decimal::ZERO {
            errors.push("arbitrage.stake must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Checks for the arbitrage client on top of `validate`.
    ///
    /// A multi-mode server answers 400 without an event, so one is required
    /// unless the polled server watches a single fixed event.
    pub fn validate_arbitrage(&self) -> Result<(), Vec<String>> {
        let mut errors = self.validate().err().unwrap_or_default();

        if self.server.mode == ServeMode::Multi
            && self
                .arbitrage
                .event
                .as_deref()
                .map(str::trim)
                .map_or(true, str::is_empty)
        {
            errors.push("arbitrage.event is required unless the server runs in single mode".to_string());
        }

        if self.arbitrage.check_interval_secs == 0 {
            errors.push("arbitrage.check_interval_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
