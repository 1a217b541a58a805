//! W3C WebDriver client (chromedriver, geckodriver, selenium server).

use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{Browser, BrowserError, By, ElementRef};

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Attributes read through the property endpoint so URLs come back absolute.
const URL_PROPERTIES: &[&str] = &["href", "src"];

pub struct WebDriver {
    client: Client,
    server: String,
    session: Option<String>,
}

impl WebDriver {
    /// Open a new `browser` session (`chrome`, `firefox`, ...) on the driver
    /// at `server`.
    pub async fn connect(server: &str, browser: &str, headless: bool) -> Result<Self, BrowserError> {
        let server = server.trim_end_matches('/').to_string();
        let client = Client::new();
        let response = client
            .post(format!("{server}/session"))
            .json(&capabilities(browser, headless))
            .send()
            .await?;
        let value = unwrap_value(response).await?;
        let session = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol("new session response has no sessionId".into()))?
            .to_string();

        info!(%session, %server, browser, headless, "Opened WebDriver session");
        Ok(Self {
            client,
            server,
            session: Some(session),
        })
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let session = self
            .session
            .as_deref()
            .ok_or_else(|| BrowserError::Protocol("session already closed".into()))?;
        let url = format!("{}/session/{}{}", self.server, session, path);
        debug!(%method, %url, "WebDriver command");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        unwrap_value(request.send().await?).await
    }

    async fn locate(&self, path: &str, by: &By) -> Result<Value, BrowserError> {
        let (using, value) = strategy(by);
        self.command(Method::POST, path, Some(json!({ "using": using, "value": value })))
            .await
            .map_err(|e| lookup_error(by, e))
    }
}

/// New-session body. Headless flags are vendor options, so browsers other
/// than chrome and firefox only get `browserName`.
fn capabilities(browser: &str, headless: bool) -> Value {
    let mut always = json!({ "browserName": browser });
    match browser {
        "chrome" => {
            let args: Vec<&str> = if headless { vec!["--headless"] } else { vec![] };
            always["goog:chromeOptions"] = json!({ "args": args });
        }
        "firefox" => {
            let args: Vec<&str> = if headless { vec!["-headless"] } else { vec![] };
            always["moz:firefoxOptions"] = json!({ "args": args });
        }
        _ => {}
    }
    json!({ "capabilities": { "alwaysMatch": always } })
}

/// A failed lookup is reported as `NoSuchElement`; anything else passes through.
fn lookup_error(by: &By, e: BrowserError) -> BrowserError {
    match e {
        BrowserError::Driver { ref kind, .. } if kind == "no such element" => {
            BrowserError::NoSuchElement(by.clone())
        }
        other => other,
    }
}

/// Map a locator onto the W3C strategies (no native id/class lookup).
fn strategy(by: &By) -> (&'static str, String) {
    match by {
        By::Id(id) => ("css selector", format!("[id=\"{id}\"]")),
        By::XPath(xpath) => ("xpath", xpath.clone()),
        By::LinkText(text) => ("link text", text.clone()),
        By::ClassName(class) => ("css selector", format!(".{class}")),
    }
}

fn element_ref(value: &Value) -> Result<ElementRef, BrowserError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
        .ok_or_else(|| BrowserError::Protocol(format!("not an element reference: {value}")))
}

fn element_json(element: &ElementRef) -> Value {
    json!({ ELEMENT_KEY: element.0 })
}

async fn unwrap_value(response: reqwest::Response) -> Result<Value, BrowserError> {
    let success = response.status().is_success();
    let payload: Value = response.json().await?;
    read_value(success, payload)
}

/// Pull `value` out of a response body, turning W3C error payloads into errors.
fn read_value(success: bool, payload: Value) -> Result<Value, BrowserError> {
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if success {
        return Ok(value);
    }
    let kind = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(BrowserError::Driver { kind, message })
}

impl Browser for WebDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url }))).await?;
        Ok(())
    }

    async fn find(&mut self, by: &By) -> Result<ElementRef, BrowserError> {
        let value = self.locate("/element", by).await?;
        element_ref(&value)
    }

    async fn find_all(&mut self, by: &By) -> Result<Vec<ElementRef>, BrowserError> {
        let value = self.locate("/elements", by).await?;
        value
            .as_array()
            .ok_or_else(|| BrowserError::Protocol(format!("expected element list, got {value}")))?
            .iter()
            .map(element_ref)
            .collect()
    }

    async fn click(&mut self, element: &ElementRef) -> Result<(), BrowserError> {
        let path = format!("/element/{}/click", element.0);
        self.command(Method::POST, &path, Some(json!({}))).await?;
        Ok(())
    }

    async fn attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        let kind = if URL_PROPERTIES.contains(&name) { "property" } else { "attribute" };
        let path = format!("/element/{}/{}/{}", element.0, kind, name);
        let value = self.command(Method::GET, &path, None).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn text(&mut self, element: &ElementRef) -> Result<String, BrowserError> {
        let path = format!("/element/{}/text", element.0);
        let value = self.command(Method::GET, &path, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn switch_to_frame(&mut self, name: &str) -> Result<(), BrowserError> {
        let selector = By::XPath(format!("//iframe[@name='{name}' or @id='{name}']"));
        let frame = match self.find(&selector).await {
            Ok(frame) => frame,
            Err(e) if e.is_not_found() => return Err(BrowserError::NoSuchFrame(name.to_string())),
            Err(e) => return Err(e),
        };
        self.command(Method::POST, "/frame", Some(json!({ "id": element_json(&frame) })))
            .await?;
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), BrowserError> {
        if self.session.is_none() {
            return Ok(());
        }
        self.command(Method::DELETE, "", None).await?;
        if let Some(session) = self.session.take() {
            info!(%session, "Closed WebDriver session");
        }
        Ok(())
    }
}
