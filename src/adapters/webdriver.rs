//! W3C WebDriver client (chromedriver) over plain HTTP.
//!
//! Only the handful of commands the scraper needs: new session, navigate,
//! find elements (page-wide and scoped), element text, delete session.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::config::ScraperConfig;
use crate::error::{OddsError, Result};
use crate::scraper::{ElementHandle, PageSession, SessionFactory};

/// Key under which WebDriver returns element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const CSS_SELECTOR: &str = "css selector";

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Clone)]
pub struct WebDriverClient {
    http: Client,
    base_url: String,
    headless: bool,
    page_load_timeout: Duration,
}

impl WebDriverClient {
    pub fn new(base_url: &str, headless: bool, page_load_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent("oddsfeed-webdriver/0.1")
            .build()
            .map_err(|e| OddsError::Internal(format!("failed to build WebDriver client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            headless,
            page_load_timeout,
        })
    }

    pub fn from_config(config: &ScraperConfig) -> Result<Self> {
        Self::new(
            &config.webdriver_url,
            config.headless,
            config.page_load_timeout(),
        )
    }

    fn capabilities(&self) -> Value {
        let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage"];
        if self.headless {
            args.push("--headless");
        }

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args },
                    "timeouts": { "pageLoad": self.page_load_timeout.as_millis() as u64 }
                }
            }
        })
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        decode_response(status, &text)
    }
}

#[async_trait]
impl SessionFactory for WebDriverClient {
    #[instrument(skip(self))]
    async fn open(&self) -> Result<Box<dyn PageSession>> {
        let value = self
            .command(Method::POST, "/session", Some(self.capabilities()))
            .await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| OddsError::WebDriver {
                code: "invalid response".to_string(),
                message: "new session response has no sessionId".to_string(),
            })?
            .to_string();

        info!("Opened WebDriver session {}", session_id);
        Ok(Box::new(WebDriverSession {
            client: self.clone(),
            session_id,
            closed: AtomicBool::new(false),
        }))
    }
}

/// One browser window driven through WebDriver
pub struct WebDriverSession {
    client: WebDriverClient,
    session_id: String,
    closed: AtomicBool,
}

impl WebDriverSession {
    fn path(&self, suffix: &str) -> String {
        format!("/session/{}{}", self.session_id, suffix)
    }
}

#[async_trait]
impl PageSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.client
            .command(Method::POST, &self.path("/url"), Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let value = self
            .client
            .command(
                Method::POST,
                &self.path("/elements"),
                Some(json!({ "using": CSS_SELECTOR, "value": selector })),
            )
            .await?;
        decode_elements(value)
    }

    async fn find_all_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        let value = self
            .client
            .command(
                Method::POST,
                &self.path(&format!("/element/{}/elements", parent.id())),
                Some(json!({ "using": CSS_SELECTOR, "value": selector })),
            )
            .await?;
        decode_elements(value)
    }

    async fn text(&self, element: &ElementHandle) -> Result<String> {
        let value = self
            .client
            .command(
                Method::GET,
                &self.path(&format!("/element/{}/text", element.id())),
                None,
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.client
            .command(Method::DELETE, &self.path(""), None)
            .await?;
        info!("Closed WebDriver session {}", self.session_id);
        Ok(())
    }
}

fn decode_response(status: StatusCode, body: &str) -> Result<Value> {
    let parsed: WireResponse = serde_json::from_str(body).map_err(|e| OddsError::WebDriver {
        code: "invalid response".to_string(),
        message: format!("HTTP {}: {}", status, e),
    })?;

    if status.is_success() {
        return Ok(parsed.value);
    }

    match serde_json::from_value::<WireError>(parsed.value) {
        Ok(err) => Err(OddsError::WebDriver {
            code: err.error,
            message: err.message,
        }),
        Err(_) => Err(OddsError::WebDriver {
            code: "unknown error".to_string(),
            message: format!("HTTP {}", status),
        }),
    }
}

fn decode_elements(value: Value) -> Result<Vec<ElementHandle>> {
    let items = value.as_array().ok_or_else(|| OddsError::WebDriver {
        code: "invalid response".to_string(),
        message: "expected an array of elements".to_string(),
    })?;

    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| ElementHandle(id.to_string()))
                .ok_or_else(|| OddsError::WebDriver {
                    code: "invalid response".to_string(),
                    message: format!("element reference missing in {}", item),
                })
        })
        .collect()
}
