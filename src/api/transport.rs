use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;

use super::error::ApiError;
use crate::logging::{log, obj, v_str, Domain, Level, RequestTimer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the API base, starting with `/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>, query: Vec<(String, String)>) -> Self {
        Self { method: Method::Get, path: path.into(), query, body: None }
    }

    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self { method: Method::Post, path: path.into(), query: Vec::new(), body }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self { method: Method::Delete, path: path.into(), query: Vec::new(), body: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            body: body.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the server answered with a web page instead of the API,
    /// which happens when the base URL points at the frontend host.
    pub fn looks_like_html(&self) -> bool {
        if let Some(ct) = &self.content_type {
            if ct.to_ascii_lowercase().starts_with("text/html") {
                return true;
            }
        }
        let head: String = self.body.trim_start().chars().take(15).collect::<String>().to_ascii_lowercase();
        head.starts_with("<!doctype") || head.starts_with("<html")
    }

    /// Message for a non-2xx response: the envelope message if there is one,
    /// else a truncated body.
    fn failure_message(&self) -> String {
        serde_json::from_str::<Value>(&self.body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| self.body.chars().take(200).collect())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, base: &str, request: &HttpRequest) -> Result<RawResponse, ApiError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(format!("client setup: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, base: &str, request: &HttpRequest) -> Result<RawResponse, ApiError> {
        let url = format!("{}{}", base.trim_end_matches('/'), request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        builder = builder.header(ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await?;
        Ok(RawResponse { status, content_type, body })
    }
}

/// Where requests go: the primary base, then the fallback base once if the
/// primary served an HTML page. The fallback answer is final.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseResolution {
    pub primary: String,
    pub fallback: Option<String>,
}

impl BaseResolution {
    pub fn new(primary: impl Into<String>, fallback: Option<String>) -> Self {
        Self { primary: primary.into(), fallback }
    }
}

/// Sends `request`, applying base fallback, and returns the final raw response.
pub async fn resolve(
    transport: &dyn Transport,
    bases: &BaseResolution,
    request: &HttpRequest,
) -> Result<RawResponse, ApiError> {
    let timer = RequestTimer::start(request.method.as_str(), &request.path);
    let primary = transport.send(&bases.primary, request).await?;
    if !primary.looks_like_html() {
        timer.finish(&bases.primary, primary.status);
        return Ok(primary);
    }
    let Some(fallback) = &bases.fallback else {
        timer.finish(&bases.primary, primary.status);
        return Ok(primary);
    };
    log(
        Level::Warn,
        Domain::Api,
        "html_from_primary",
        obj(&[("endpoint", v_str(&request.path)), ("fallback", v_str(fallback))]),
    );
    let secondary = transport.send(fallback, request).await?;
    timer.finish(fallback, secondary.status);
    Ok(secondary)
}

pub fn check_status(response: &RawResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::Status {
        status: response.status,
        message: response.failure_message(),
    })
}

/// Checks HTTP status and parses the body as JSON.
pub fn into_json(response: RawResponse) -> Result<Value, ApiError> {
    check_status(&response)?;
    if response.looks_like_html() {
        return Err(ApiError::Decode("expected JSON, got an HTML page".to_string()));
    }
    Ok(serde_json::from_str(&response.body)?)
}
