//! Warmup endpoints answer in more than one shape depending on the backend
//! version: bare stats, enveloped stats, a message-only error, or (behind
//! some proxies) a JSON string containing any of those.

use serde_json::Value;

use super::envelope::ApiResponse;
use super::types::WarmupStats;

const MAX_NESTING: usize = 2;

pub fn normalize_warmup(body: &str) -> ApiResponse<WarmupStats> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => normalize_value(value, 0),
        Err(_) => ApiResponse::failure(-1, body.trim().to_string()),
    }
}

fn normalize_value(value: Value, depth: usize) -> ApiResponse<WarmupStats> {
    if let Value::String(inner) = &value {
        if depth < MAX_NESTING {
            if let Ok(parsed) = serde_json::from_str::<Value>(inner) {
                return normalize_value(parsed, depth + 1);
            }
        }
        return ApiResponse::failure(-1, inner.clone());
    }

    if let Some(stats) = extract_stats(&value) {
        return ApiResponse::ok(stats);
    }

    if let Some(data) = value.get("data") {
        if let Some(stats) = extract_stats(data) {
            let code = match value.get("code") {
                Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
                Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
                _ => 0,
            };
            return ApiResponse {
                code,
                message: value.get("message").and_then(Value::as_str).map(str::to_string),
                data: Some(stats),
            };
        }
    }

    if let Some(message) = value.get("message").and_then(Value::as_str) {
        let code = value
            .get("code")
            .and_then(Value::as_i64)
            .filter(|c| *c != 0)
            .unwrap_or(-1);
        return ApiResponse::failure(code, message);
    }

    ApiResponse::failure(-1, "invalid warmup response")
}

fn extract_stats(value: &Value) -> Option<WarmupStats> {
    let obj = value.as_object()?;
    if !obj.contains_key("runs") && !obj.contains_key("recent") {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}
