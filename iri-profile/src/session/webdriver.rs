//! W3C WebDriver session backend
//!
//! Talks to a WebDriver endpoint (chromedriver or compatible) over HTTP with
//! `reqwest`. One [`WebDriverSession`] maps to one remote browser session; it
//! is deleted on [`InteractiveSession::close`], and as a fallback on drop.
//!
//! Protocol reference: <https://www.w3.org/TR/webdriver2/>

use super::{InteractiveSession, Locator, SessionFactory, SessionResult};
use crate::error::SessionError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// W3C web element identifier key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Timeout for ordinary automation commands
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra allowance on top of the page-load timeout for navigation commands
const NAVIGATION_SLACK: Duration = Duration::from_secs(10);

/// Sets an input through the native value setter so framework-controlled
/// inputs observe the change, then fires `input` and `change`.
const SET_FIELD_SCRIPT: &str = r#"
const el = arguments[0];
const value = arguments[1];
const setter = Object.getOwnPropertyDescriptor(window.HTMLInputElement.prototype, 'value').set;
setter.call(el, value);
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
"#;

/// Selects the option whose visible text matches; returns false if absent.
const SELECT_OPTION_SCRIPT: &str = r#"
const select = arguments[0];
const text = arguments[1];
const option = Array.from(select.options).find(o => o.text.trim() === text);
if (!option) { return false; }
select.value = option.value;
select.dispatchEvent(new Event('input', { bubbles: true }));
select.dispatchEvent(new Event('change', { bubbles: true }));
return true;
"#;

const CLICK_SCRIPT: &str = "arguments[0].click();";

const SUBMIT_SCRIPT: &str =
    "arguments[0].dispatchEvent(new Event('submit', { bubbles: true, cancelable: true }));";

const TEXT_SCRIPT: &str = "return arguments[0].textContent;";

/// Returns the href of the first link whose text contains one of the labels.
const LINK_HREF_SCRIPT: &str = r#"
const labels = arguments[0].map(l => l.toLowerCase());
const link = Array.from(document.querySelectorAll('a'))
    .find(a => labels.some(l => a.textContent.toLowerCase().includes(l)));
return link ? link.getAttribute('href') : null;
"#;

/// Opens WebDriver sessions against one endpoint
pub struct WebDriverFactory {
    http_client: Client,
    endpoint: String,
    browser_args: Vec<String>,
}

impl WebDriverFactory {
    /// Create a factory for `endpoint` (e.g. `http://localhost:9515`)
    pub fn new(endpoint: impl Into<String>, browser_args: Vec<String>) -> SessionResult<Self> {
        let http_client = Client::builder()
            .build()
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            browser_args,
        })
    }

    fn capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": self.browser_args },
                }
            }
        })
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    type Session = WebDriverSession;

    async fn open(&self, page_load_timeout: Duration) -> SessionResult<WebDriverSession> {
        let url = format!("{}/session", self.endpoint);
        debug!(url = %url, "Opening WebDriver session");

        let value = send(
            &self.http_client,
            Method::POST,
            &url,
            Some(self.capabilities()),
            COMMAND_TIMEOUT,
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::Protocol(format!("No sessionId in {}", value)))?
            .to_string();

        let mut session = WebDriverSession {
            http_client: self.http_client.clone(),
            base_url: format!("{}/session/{}", self.endpoint, session_id),
            session_id,
            page_load_timeout,
            closed: false,
        };

        let timeouts = json!({ "pageLoad": page_load_timeout.as_millis() as u64 });
        if let Err(e) = session.command(Method::POST, "timeouts", Some(timeouts)).await {
            // Do not leak the browser if configuration fails
            let _ = session.close().await;
            return Err(e);
        }

        debug!(session_id = %session.session_id, "WebDriver session ready");
        Ok(session)
    }
}

/// One remote browser session
pub struct WebDriverSession {
    http_client: Client,
    session_id: String,
    base_url: String,
    page_load_timeout: Duration,
    closed: bool,
}

impl WebDriverSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> SessionResult<Value> {
        let url = format!("{}/{}", self.base_url, path);
        send(&self.http_client, method, &url, body, COMMAND_TIMEOUT).await
    }

    async fn find_all(&self, target: &Locator) -> SessionResult<Vec<String>> {
        let (using, value) = match target {
            Locator::XPath(expr) => ("xpath", expr.clone()),
            other => ("css selector", other.to_css().unwrap_or_default()),
        };

        let found = self
            .command(
                Method::POST,
                "elements",
                Some(json!({ "using": using, "value": value })),
            )
            .await?;

        let elements = found
            .as_array()
            .ok_or_else(|| SessionError::Protocol(format!("Expected element list, got {}", found)))?;

        elements
            .iter()
            .map(|el| {
                el.get(ELEMENT_KEY)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| SessionError::Protocol(format!("Bad element reference {}", el)))
            })
            .collect()
    }

    async fn find_first(&self, target: &Locator) -> SessionResult<String> {
        self.find_all(target)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SessionError::NoSuchElement(target.to_string()))
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> SessionResult<Value> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }
}

fn element_ref(element_id: &str) -> Value {
    let mut map = Map::new();
    map.insert(ELEMENT_KEY.to_string(), Value::String(element_id.to_string()));
    Value::Object(map)
}

#[async_trait]
impl InteractiveSession for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> SessionResult<()> {
        let endpoint = format!("{}/url", self.base_url);
        send(
            &self.http_client,
            Method::POST,
            &endpoint,
            Some(json!({ "url": url })),
            self.page_load_timeout + NAVIGATION_SLACK,
        )
        .await?;
        Ok(())
    }

    async fn set_field(&mut self, name: &str, value: &str) -> SessionResult<()> {
        let element = self.find_first(&Locator::name(name)).await?;
        self.execute(
            SET_FIELD_SCRIPT,
            vec![element_ref(&element), Value::String(value.to_string())],
        )
        .await?;
        Ok(())
    }

    async fn select_option(&mut self, target: &Locator, visible_text: &str) -> SessionResult<()> {
        let element = self.find_first(target).await?;
        let selected = self
            .execute(
                SELECT_OPTION_SCRIPT,
                vec![element_ref(&element), Value::String(visible_text.to_string())],
            )
            .await?;

        if selected.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(SessionError::NoSuchElement(format!(
                "option '{}' in {}",
                visible_text, target
            )))
        }
    }

    async fn click(&mut self, target: &Locator) -> SessionResult<bool> {
        let Some(element) = self.find_all(target).await?.into_iter().next() else {
            return Ok(false);
        };
        self.execute(CLICK_SCRIPT, vec![element_ref(&element)]).await?;
        Ok(true)
    }

    async fn dispatch_submit(&mut self, target: &Locator) -> SessionResult<()> {
        let element = self.find_first(target).await?;
        self.execute(SUBMIT_SCRIPT, vec![element_ref(&element)]).await?;
        Ok(())
    }

    async fn count(&mut self, target: &Locator) -> SessionResult<usize> {
        Ok(self.find_all(target).await?.len())
    }

    async fn is_enabled(&mut self, target: &Locator) -> SessionResult<bool> {
        let element = self.find_first(target).await?;
        let enabled = self
            .command(Method::GET, &format!("element/{}/enabled", element), None)
            .await?;
        enabled
            .as_bool()
            .ok_or_else(|| SessionError::Protocol(format!("Expected bool, got {}", enabled)))
    }

    async fn rendered_text(&mut self, target: &Locator) -> SessionResult<Option<String>> {
        let Some(element) = self.find_all(target).await?.into_iter().next() else {
            return Ok(None);
        };
        let text = self.execute(TEXT_SCRIPT, vec![element_ref(&element)]).await?;
        Ok(text.as_str().map(str::to_string))
    }

    async fn link_href(&mut self, labels: &[&str]) -> SessionResult<Option<String>> {
        let href = self.execute(LINK_HREF_SCRIPT, vec![json!(labels)]).await?;
        Ok(href
            .as_str()
            .filter(|h| !h.trim().is_empty())
            .map(str::to_string))
    }

    async fn fetch(&mut self, url: &str, timeout: Duration) -> SessionResult<String> {
        let response = self
            .http_client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| SessionError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Fetch(format!("{} returned {}", url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| SessionError::Fetch(e.to_string()))
    }

    async fn close(&mut self) -> SessionResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        send(
            &self.http_client,
            Method::DELETE,
            &self.base_url,
            None,
            COMMAND_TIMEOUT,
        )
        .await?;
        debug!(session_id = %self.session_id, "WebDriver session closed");
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        warn!(session_id = %self.session_id, "WebDriver session dropped without close");

        // Best effort: the browser process would otherwise outlive us
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let client = self.http_client.clone();
            let url = self.base_url.clone();
            handle.spawn(async move {
                let _ = send(&client, Method::DELETE, &url, None, COMMAND_TIMEOUT).await;
            });
        }
    }
}

/// Send one WebDriver command and unwrap the `{"value": ...}` envelope
async fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
    timeout: Duration,
) -> SessionResult<Value> {
    let mut request = client.request(method, url).timeout(timeout);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await?;
    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| SessionError::Protocol(format!("Invalid JSON from {}: {}", url, e)))?;

    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        Ok(value)
    } else {
        Err(classify_error(&value, status.as_u16()))
    }
}

/// Map a W3C error object to a session error
fn classify_error(value: &Value, status: u16) -> SessionError {
    let code = value.get("error").and_then(Value::as_str).unwrap_or("");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    match code {
        "no such element" | "stale element reference" => SessionError::NoSuchElement(message),
        "javascript error" => SessionError::Script(message),
        "timeout" | "script timeout" => SessionError::Timeout(message),
        "" => SessionError::Protocol(format!("HTTP {}: {}", status, value)),
        other => SessionError::Protocol(format!("{}: {}", other, message)),
    }
}
