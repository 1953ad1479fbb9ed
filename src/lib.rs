pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod scraper;
pub mod services;

pub use config::AppConfig;
pub use domain::{OddsRecord, OutcomeSide};
pub use error::{OddsError, Result};
pub use services::{OddsStore, QueryMode, QueryResponse, QueryService};
