//! Structured JSON-lines logging.
//!
//! Every record carries a run id, a process-wide sequence number, a level and
//! a domain, so a session can be filtered (`LOG_LEVEL`, `LOG_DOMAINS`) and
//! replayed in order. Records go to stderr; when `LOG_DIR` is set they are
//! also appended to `<LOG_DIR>/<run_id>/events.jsonl` (trace/debug records
//! to `trace.jsonl`).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Cache,      // Hits, misses, expiry, invalidation
    Api,        // Requests, envelopes, base fallback
    Workflow,   // Creative generation steps
    Experiment, // Drafts, status changes, tracking
    Metrics,    // Aggregated experiment statistics
    System,     // Startup, configuration
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Cache => "cache",
            Domain::Api => "api",
            Domain::Workflow => "workflow",
            Domain::Experiment => "experiment",
            Domain::Metrics => "metrics",
            Domain::System => "system",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    sink: Option<RunSink>,
}

/// File sink for one run: `events.jsonl` and `trace.jsonl` under a run directory.
#[derive(Debug)]
pub struct RunSink {
    dir: PathBuf,
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
}

impl RunSink {
    pub fn open(base: &Path, run_id: &str) -> std::io::Result<Self> {
        let dir = base.join(run_id);
        create_dir_all(&dir)?;
        std::fs::write(
            dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
            })
            .to_string(),
        )?;
        let events = File::create(dir.join("events.jsonl"))?;
        let trace = File::create(dir.join("trace.jsonl"))?;
        Ok(Self {
            dir,
            events: Mutex::new(BufWriter::new(events)),
            trace: Mutex::new(BufWriter::new(trace)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, level: Level, line: &str) {
        let writer = match level {
            Level::Trace | Level::Debug => &self.trace,
            _ => &self.events,
        };
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let sink = std::env::var("LOG_DIR").ok().and_then(|base| {
            RunSink::open(Path::new(&base), &run_id)
                .map_err(|err| eprintln!("[log] failed to open run dir: {}", err))
                .ok()
        });
        RunContext { run_id, sink }
    })
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["authorization", "Authorization", "user_key", "cookie"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["task_id", "experiment_id", "endpoint", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    let ctx = ensure_run_context();
    let line = render_record(&ctx.run_id, level, domain, event, fields);
    if let Some(sink) = &ctx.sink {
        sink.write(level, &line);
    }
    eprintln!("{}", line);
}

fn render_record(
    run_id: &str,
    level: Level,
    domain: Domain,
    event: &str,
    fields: Map<String, Value>,
) -> String {
    let (mut top, data) = split_fields(sanitize_fields(fields));

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(run_id));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(domain.as_str()));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry).to_string()
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_cache(event: &str, key: &str, extra: &[(&str, Value)]) {
    let mut fields = obj(extra);
    fields.insert("key_digest".to_string(), v_str(&key_digest(key)));
    log(Level::Debug, Domain::Cache, event, fields);
}

pub fn log_request(method: &str, endpoint: &str, base: &str, status: u16, elapsed_ms: f64) {
    log(
        Level::Debug,
        Domain::Api,
        "request",
        obj(&[
            ("method", v_str(method)),
            ("endpoint", v_str(endpoint)),
            ("base", v_str(base)),
            ("status", json!(status)),
            ("elapsed_ms", v_num(elapsed_ms)),
        ]),
    );
}

pub fn log_api_failure(endpoint: &str, kind: &str, message: &str) {
    log(
        Level::Warn,
        Domain::Api,
        "request_failed",
        obj(&[
            ("endpoint", v_str(endpoint)),
            ("kind", v_str(kind)),
            ("msg", v_str(message)),
        ]),
    );
}

pub fn log_transition(task_id: Option<&str>, from: &str, to: &str) {
    log(
        Level::Info,
        Domain::Workflow,
        "transition",
        obj(&[
            ("task_id", task_id.map(v_str).unwrap_or(Value::Null)),
            ("from", v_str(from)),
            ("to", v_str(to)),
        ]),
    );
}

pub fn log_guard(step: &str, reason: &str) {
    log(
        Level::Info,
        Domain::Workflow,
        "guard_rejected",
        obj(&[("step", v_str(step)), ("msg", v_str(reason))]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Short stable digest of a cache key, so logs never carry raw query values.
pub fn key_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..6])
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Request timing
// =============================================================================

/// Measures one request; `finish` emits the timing record.
pub struct RequestTimer {
    method: &'static str,
    endpoint: String,
    started: Instant,
}

impl RequestTimer {
    pub fn start(method: &'static str, endpoint: &str) -> Self {
        Self {
            method,
            endpoint: endpoint.to_string(),
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    pub fn finish(self, base: &str, status: u16) {
        let elapsed = self.elapsed_ms();
        log_request(self.method, &self.endpoint, base, status, elapsed);
    }
}

// =============================================================================
// Tests
// =============================================================================
