//! In-memory transport for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adflow_client::api::{ApiError, BaseResolution, HttpRequest, Method, RawResponse, Transport};
use adflow_client::{ApiClient, ManualClock, RequestCache};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const PRIMARY: &str = "http://dashboard.local/api/v1";
pub const FALLBACK: &str = "http://localhost:4000/api/v1";

#[derive(Debug, Clone)]
pub struct Call {
    pub base: String,
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// Replies from per-route queues. The last reply on a route repeats once the
/// queue is down to one. Unscripted routes answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(String, String), VecDeque<RawResponse>>>,
    calls: Mutex<Vec<Call>>,
    delay: Mutex<Option<Duration>>,
}

fn route_key(base: &str, method: Method, path: &str) -> (String, String) {
    (base.to_string(), format!("{} {}", method.as_str(), path))
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, path: &str, response: RawResponse) {
        self.on_base(PRIMARY, method, path, response);
    }

    pub fn on_base(&self, base: &str, method: Method, path: &str, response: RawResponse) {
        self.routes
            .lock()
            .unwrap()
            .entry(route_key(base, method, path))
            .or_default()
            .push_back(response);
    }

    /// Shorthand for a `{code: 0, data}` reply.
    pub fn ok(&self, method: Method, path: &str, data: Value) {
        self.on(method, path, RawResponse::json(200, &json!({"code": 0, "message": "ok", "data": data})));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn last_body(&self, path: &str) -> Option<Value> {
        self.calls().into_iter().rev().find(|c| c.path == path).and_then(|c| c.body)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, base: &str, request: &HttpRequest) -> Result<RawResponse, ApiError> {
        self.calls.lock().unwrap().push(Call {
            base: base.to_string(),
            method: request.method,
            path: request.path.clone(),
            query: request.query.clone(),
            body: request.body.clone(),
        });
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let mut routes = self.routes.lock().unwrap();
        let reply = match routes.get_mut(&route_key(base, request.method, &request.path)) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(reply.unwrap_or_else(|| RawResponse::json(404, &json!({"code": 404, "message": "not found"}))))
    }
}

pub fn client_with(transport: Arc<ScriptedTransport>, clock: Arc<ManualClock>) -> ApiClient {
    ApiClient::with_transport(
        transport,
        BaseResolution::new(PRIMARY, Some(FALLBACK.to_string())),
        Arc::new(RequestCache::new(Duration::from_secs(60), clock)),
    )
}

pub fn html_page() -> RawResponse {
    RawResponse {
        status: 200,
        content_type: Some("text/html".to_string()),
        body: "<!doctype html><html><body>dashboard</body></html>".to_string(),
    }
}

pub fn tasks_page(items: Value) -> Value {
    json!({"tasks": items, "total": 1, "page": 1, "page_size": 20, "total_pages": 1})
}
