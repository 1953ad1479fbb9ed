use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::domain::OddsRecord;
use crate::error::{OddsError, Result};
use crate::services::OddsFeed;

/// Reads the latest record from a running odds endpoint
pub struct HttpOddsFeed {
    http: Client,
    url: String,
}

impl HttpOddsFeed {
    pub fn new(endpoint: &str, event_id: Option<&str>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OddsError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: odds_url(endpoint, event_id),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn odds_url(endpoint: &str, event_id: Option<&str>) -> String {
    let base = format!("{}/odds", endpoint.trim_end_matches('/'));
    match event_id {
        Some(event_id) => format!("{}?event={}", base, urlencoding::encode(event_id)),
        None => base,
    }
}

#[async_trait]
impl OddsFeed for HttpOddsFeed {
    async fn latest(&self) -> Result<Option<OddsRecord>> {
        let response = self.http.get(&self.url).send().await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.json::<OddsRecord>().await?)),
            StatusCode::ACCEPTED | StatusCode::SERVICE_UNAVAILABLE => {
                debug!("Odds endpoint has no data yet ({})", response.status());
                Ok(None)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(OddsError::Internal(format!(
                    "odds endpoint returned {}: {}",
                    status, body
                )))
            }
        }
    }
}
