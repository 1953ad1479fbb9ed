use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Metrics collector for observability
pub struct Metrics {
    /// Odds queries served
    pub queries: AtomicU64,
    /// Extraction loops started
    pub loops_spawned: AtomicU64,
    /// Loops that failed during Init
    pub setup_failures: AtomicU64,
    /// Records written to the store
    pub records_published: AtomicU64,
    /// Cycles dropped for unparseable odds
    pub parse_failures: AtomicU64,
    /// Cycles dropped because the market was absent
    pub market_not_found: AtomicU64,
    /// Rescans caused by detached elements
    pub render_retries: AtomicU64,
    /// Events removed by the idle reaper
    pub events_reaped: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            queries: AtomicU64::new(0),
            loops_spawned: AtomicU64::new(0),
            setup_failures: AtomicU64::new(0),
            records_published: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            market_not_found: AtomicU64::new(0),
            render_retries: AtomicU64::new(0),
            events_reaped: AtomicU64::new(0),
        }
    }

    pub fn inc_queries(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_loops_spawned(&self) {
        self.loops_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_setup_failures(&self) {
        self.setup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_records_published(&self) {
        self.records_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_parse_failures(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_market_not_found(&self) {
        self.market_not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_render_retries(&self) {
        self.render_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_events_reaped(&self, n: u64) {
        self.events_reaped.fetch_add(n, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self, events: usize, active_loops: usize, uptime_secs: i64) -> String {
        format!(
            r#"# HELP oddsfeed_uptime_seconds Uptime in seconds
# TYPE oddsfeed_uptime_seconds counter
oddsfeed_uptime_seconds {}

# HELP oddsfeed_events Registered events
# TYPE oddsfeed_events gauge
oddsfeed_events {}

# HELP oddsfeed_active_loops Extraction loops currently running
# TYPE oddsfeed_active_loops gauge
oddsfeed_active_loops {}

# HELP oddsfeed_queries_total Odds queries served
# TYPE oddsfeed_queries_total counter
oddsfeed_queries_total {}

# HELP oddsfeed_loops_spawned_total Extraction loops started
# TYPE oddsfeed_loops_spawned_total counter
oddsfeed_loops_spawned_total {}

# HELP oddsfeed_setup_failures_total Loops that failed to find their market
# TYPE oddsfeed_setup_failures_total counter
oddsfeed_setup_failures_total {}

# HELP oddsfeed_records_published_total Odds records published
# TYPE oddsfeed_records_published_total counter
oddsfeed_records_published_total {}

# HELP oddsfeed_parse_failures_total Cycles dropped for malformed odds
# TYPE oddsfeed_parse_failures_total counter
oddsfeed_parse_failures_total {}

# HELP oddsfeed_market_not_found_total Cycles dropped for a missing market
# TYPE oddsfeed_market_not_found_total counter
oddsfeed_market_not_found_total {}

# HELP oddsfeed_render_retries_total Rescans after stale elements
# TYPE oddsfeed_render_retries_total counter
oddsfeed_render_retries_total {}

# HELP oddsfeed_events_reaped_total Idle events evicted
# TYPE oddsfeed_events_reaped_total counter
oddsfeed_events_reaped_total {}
"#,
            uptime_secs,
            events,
            active_loops,
            self.queries.load(Ordering::Relaxed),
            self.loops_spawned.load(Ordering::Relaxed),
            self.setup_failures.load(Ordering::Relaxed),
            self.records_published.load(Ordering::Relaxed),
            self.parse_failures.load(Ordering::Relaxed),
            self.market_not_found.load(Ordering::Relaxed),
            self.render_retries.load(Ordering::Relaxed),
            self.events_reaped.load(Ordering::Relaxed),
        )
    }

    /// Log periodic status
    pub fn log_status(&self) {
        info!(
            queries = self.queries.load(Ordering::Relaxed),
            loops = self.loops_spawned.load(Ordering::Relaxed),
            published = self.records_published.load(Ordering::Relaxed),
            parse_failures = self.parse_failures.load(Ordering::Relaxed),
            render_retries = self.render_retries.load(Ordering::Relaxed),
            "odds feed status"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
