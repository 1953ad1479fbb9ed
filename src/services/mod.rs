pub mod arbitrage;
pub mod extraction;
pub mod metrics;
pub mod query;
pub mod reaper;
pub mod store;

pub use arbitrage::{
    check_arbitrage, ArbitrageCheck, ArbitrageEvaluator, ArbitrageOpportunity, LockedBet,
    OddsFeed,
};
pub use extraction::{probe_event, ExtractionLauncher, ExtractionLoop, LoopContext, LoopLauncher};
pub use metrics::Metrics;
pub use query::{QueryMode, QueryResponse, QueryService};
pub use reaper::IdleReaper;
pub use store::OddsStore;
