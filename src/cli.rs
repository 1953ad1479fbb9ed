use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use crate::domain::OutcomeSide;

#[derive(Parser)]
#[command(name = "oddsfeed")]
#[command(version = "0.1.0")]
#[command(about = "Live betting odds scraper and JSON odds endpoint", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory (default.toml plus $ODDSFEED_ENV overrides)
    #[arg(short, long, default_value = "config", env = "ODDSFEED_CONFIG_DIR")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve odds for any event, starting a scraper on first request
    Serve {
        /// Bind address override
        #[arg(long)]
        host: Option<String>,
        /// Port override
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Serve odds for a single event monitored from startup
    Watch {
        /// Event slug, e.g. punjab-legends-v-rajasthan-legends-v-12962641
        #[arg(short, long)]
        event: String,
        /// Port override
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Wait for an arbitrage against a bet already placed
    Arb {
        /// Event to query on the odds endpoint
        #[arg(short, long)]
        event: Option<String>,
        /// Side of the locked bet (t1 or t2)
        #[arg(long)]
        side: Option<OutcomeSide>,
        /// Odds the bet was placed at
        #[arg(long)]
        odds: Option<Decimal>,
        /// Stake of the locked bet
        #[arg(long)]
        stake: Option<Decimal>,
        /// Odds endpoint base URL
        #[arg(long)]
        endpoint: Option<String>,
        /// Seconds between checks
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Scrape an event once and print the record as JSON
    Probe {
        #[arg(short, long)]
        event: String,
    },
}
