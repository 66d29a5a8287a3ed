use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

/// W3C key under which element references are serialized.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("webdriver request {method} {path} failed: {source}")]
    Transport {
        method: Method,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("webdriver error `{error}`: {message}")]
    Protocol { error: String, message: String },

    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("unexpected webdriver response: {0}")]
    Malformed(String),
}

impl BrowserError {
    /// Conditions that polling waits keep retrying through.
    fn is_transient(&self) -> bool {
        match self {
            Self::NoSuchElement(_) => true,
            Self::Protocol { error, .. } => {
                error == "stale element reference" || error == "element not interactable"
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum By<'a> {
    Css(&'a str),
    XPath(&'a str),
    Id(&'a str),
}

impl By<'_> {
    fn strategy(&self) -> (&'static str, String) {
        match self {
            Self::Css(selector) => ("css selector", selector.to_string()),
            Self::XPath(path) => ("xpath", path.to_string()),
            Self::Id(id) => ("css selector", format!("[id=\"{id}\"]")),
        }
    }
}

impl fmt::Display for By<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(selector) => write!(f, "css `{selector}`"),
            Self::XPath(path) => write!(f, "xpath `{path}`"),
            Self::Id(id) => write!(f, "id `{id}`"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(String);

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
}

/// Blocking client for one WebDriver session (chromedriver or compatible).
pub struct WebDriver {
    http: Client,
    endpoint: String,
    session_id: String,
    closed: bool,
}

impl WebDriver {
    pub fn connect(endpoint: &str, options: &BrowserOptions) -> Result<Self, BrowserError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|source| BrowserError::Transport {
                method: Method::POST,
                path: "/session".to_string(),
                source,
            })?;
        let endpoint = endpoint.trim_end_matches('/').to_string();

        let value = send(
            &http,
            Method::POST,
            &format!("{endpoint}/session"),
            "/session",
            Some(session_capabilities(options)),
        )?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Malformed(format!("new session without id: {value}")))?
            .to_string();

        debug!(session_id = %session_id, "webdriver session started");
        Ok(Self {
            http,
            endpoint,
            session_id,
            closed: false,
        })
    }

    fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let url = format!("{}/session/{}{}", self.endpoint, self.session_id, path);
        send(&self.http, method, &url, path, body)
    }

    pub fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .map(drop)
    }

    pub fn current_url(&self) -> Result<String, BrowserError> {
        let value = self.command(Method::GET, "/url", None)?;
        as_string(value)
    }

    pub fn refresh(&self) -> Result<(), BrowserError> {
        self.command(Method::POST, "/refresh", Some(json!({}))).map(drop)
    }

    pub fn find(&self, by: By<'_>) -> Result<ElementRef, BrowserError> {
        let (using, value) = by.strategy();
        let found = self.command(
            Method::POST,
            "/element",
            Some(json!({ "using": using, "value": value })),
        )?;
        element_ref(&found)
    }

    pub fn find_all(&self, by: By<'_>) -> Result<Vec<ElementRef>, BrowserError> {
        let (using, value) = by.strategy();
        let found = self.command(
            Method::POST,
            "/elements",
            Some(json!({ "using": using, "value": value })),
        )?;
        match found {
            Value::Array(items) => items.iter().map(element_ref).collect(),
            other => Err(BrowserError::Malformed(format!("expected element list: {other}"))),
        }
    }

    pub fn click(&self, element: &ElementRef) -> Result<(), BrowserError> {
        self.command(Method::POST, &format!("/element/{}/click", element.0), Some(json!({})))
            .map(drop)
    }

    pub fn clear(&self, element: &ElementRef) -> Result<(), BrowserError> {
        self.command(Method::POST, &format!("/element/{}/clear", element.0), Some(json!({})))
            .map(drop)
    }

    pub fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), BrowserError> {
        self.command(
            Method::POST,
            &format!("/element/{}/value", element.0),
            Some(json!({ "text": text })),
        )
        .map(drop)
    }

    /// DOM property, so `href` comes back absolute.
    pub fn property(&self, element: &ElementRef, name: &str) -> Result<Option<String>, BrowserError> {
        let value = self.command(
            Method::GET,
            &format!("/element/{}/property/{name}", element.0),
            None,
        )?;
        Ok(value.as_str().map(ToOwned::to_owned))
    }

    pub fn text(&self, element: &ElementRef) -> Result<String, BrowserError> {
        let value = self.command(Method::GET, &format!("/element/{}/text", element.0), None)?;
        as_string(value)
    }

    fn is_clickable(&self, element: &ElementRef) -> Result<bool, BrowserError> {
        let displayed = self.command(
            Method::GET,
            &format!("/element/{}/displayed", element.0),
            None,
        )?;
        let enabled = self.command(Method::GET, &format!("/element/{}/enabled", element.0), None)?;
        Ok(displayed.as_bool().unwrap_or(false) && enabled.as_bool().unwrap_or(false))
    }

    pub fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
    }

    /// Clicks through JavaScript, for buttons covered by sticky toolbars.
    pub fn js_click(&self, element: &ElementRef) -> Result<(), BrowserError> {
        self.execute("arguments[0].click();", vec![element.to_json()])
            .map(drop)
    }

    pub fn scroll_into_view(&self, element: &ElementRef) -> Result<(), BrowserError> {
        self.execute("arguments[0].scrollIntoView(true);", vec![element.to_json()])
            .map(drop)
    }

    pub fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
        let value = self.command(Method::GET, "/screenshot", None)?;
        let encoded = as_string(value)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|err| BrowserError::Malformed(format!("screenshot is not base64: {err}")))
    }

    /// Polls `probe` until it yields a value, an error that is not transient,
    /// or the timeout elapses.
    pub fn wait_until<T>(
        &self,
        timeout: Duration,
        what: &str,
        mut probe: impl FnMut(&Self) -> Result<Option<T>, BrowserError>,
    ) -> Result<T, BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            match probe(self) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) if err.is_transient() => {}
                Err(err) => return Err(err),
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: what.to_string(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn wait_for(&self, by: By<'_>, timeout: Duration) -> Result<ElementRef, BrowserError> {
        self.wait_until(timeout, &by.to_string(), |driver| driver.find(by).map(Some))
    }

    pub fn wait_for_all(&self, by: By<'_>, timeout: Duration) -> Result<Vec<ElementRef>, BrowserError> {
        self.wait_until(timeout, &by.to_string(), |driver| {
            let found = driver.find_all(by)?;
            Ok((!found.is_empty()).then_some(found))
        })
    }

    pub fn wait_for_clickable(&self, by: By<'_>, timeout: Duration) -> Result<ElementRef, BrowserError> {
        self.wait_until(timeout, &format!("clickable {by}"), |driver| {
            let element = driver.find(by)?;
            Ok(driver.is_clickable(&element)?.then_some(element))
        })
    }

    pub fn wait_for_url(
        &self,
        timeout: Duration,
        what: &str,
        predicate: impl Fn(&str) -> bool,
    ) -> Result<String, BrowserError> {
        self.wait_until(timeout, what, |driver| {
            let url = driver.current_url()?;
            Ok(predicate(&url).then_some(url))
        })
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let url = format!("{}/session/{}", self.endpoint, self.session_id);
        match send(&self.http, Method::DELETE, &url, "/session", None) {
            Ok(_) => debug!(session_id = %self.session_id, "webdriver session closed"),
            Err(err) => warn!(error = %err, "failed to close webdriver session"),
        }
    }
}

impl Drop for WebDriver {
    fn drop(&mut self) {
        self.close();
    }
}

impl ElementRef {
    fn to_json(&self) -> Value {
        json!({ ELEMENT_KEY: self.0 })
    }
}

fn session_capabilities(options: &BrowserOptions) -> Value {
    let mut args = vec!["--disable-blink-features=AutomationControlled".to_string()];
    if options.headless {
        args.push("--headless=new".to_string());
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": {
                    "args": args,
                    "excludeSwitches": ["enable-automation"],
                }
            }
        }
    })
}

fn send(
    http: &Client,
    method: Method,
    url: &str,
    path: &str,
    body: Option<Value>,
) -> Result<Value, BrowserError> {
    let transport = |source| BrowserError::Transport {
        method: method.clone(),
        path: path.to_string(),
        source,
    };

    let mut request = http.request(method.clone(), url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().map_err(transport)?;
    let status = response.status();
    let mut payload: Value = response.json().map_err(transport)?;
    let value = payload
        .get_mut("value")
        .map(Value::take)
        .unwrap_or(Value::Null);

    if status.is_success() {
        Ok(value)
    } else {
        Err(protocol_error(&value))
    }
}

fn protocol_error(value: &Value) -> BrowserError {
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();

    if error == "no such element" {
        BrowserError::NoSuchElement(message)
    } else {
        BrowserError::Protocol {
            error: error.to_string(),
            message,
        }
    }
}

fn element_ref(value: &Value) -> Result<ElementRef, BrowserError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
        .ok_or_else(|| BrowserError::Malformed(format!("expected element reference: {value}")))
}

fn as_string(value: Value) -> Result<String, BrowserError> {
    match value {
        Value::String(text) => Ok(text),
        other => Err(BrowserError::Malformed(format!("expected string: {other}"))),
    }
}
