use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::cache::{QueryParams, RequestCache};
use crate::config::Config;
use crate::logging::{log, log_api_failure, obj, v_str, Domain, Level};

pub mod envelope;
mod error;
pub mod transport;
pub mod types;
pub mod warmup;

pub use envelope::ApiResponse;
pub use error::{ApiError, ErrorKind};
pub use transport::{BaseResolution, HttpRequest, HttpTransport, Method, RawResponse, Transport};

use envelope::{check_envelope, decode};
use transport::{check_status, into_json, resolve};
use types::*;

/// Typed access to the backend. Reads go through the shared [`RequestCache`];
/// every write clears it once the write has completed, whatever its outcome.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    bases: BaseResolution,
    cache: Arc<RequestCache<Value>>,
}

impl ApiClient {
    pub fn new(cfg: &Config) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(cfg.timeout())?;
        Ok(Self::with_transport(
            Arc::new(transport),
            BaseResolution::new(cfg.api_base.clone(), cfg.api_base_fallback.clone()),
            Arc::new(RequestCache::with_system_clock(cfg.cache_ttl())),
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        bases: BaseResolution,
        cache: Arc<RequestCache<Value>>,
    ) -> Self {
        Self { transport, bases, cache }
    }

    pub fn cache(&self) -> &RequestCache<Value> {
        &self.cache
    }

    // -------------------------------------------------------------------------
    // Plumbing
    // -------------------------------------------------------------------------

    async fn cached_get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: QueryParams,
    ) -> Result<ApiResponse<T>, ApiError> {
        let transport = self.transport.clone();
        let bases = self.bases.clone();
        let request = HttpRequest::get(endpoint, params.to_query_pairs());
        let value = self
            .cache
            .get(endpoint, &params, move || async move {
                let value = into_json(resolve(transport.as_ref(), &bases, &request).await?)?;
                check_envelope(&value)?;
                Ok(value)
            })
            .await
            .map_err(|e| failed(endpoint, e))?;
        decode(value).map_err(|e| failed(endpoint, e))
    }

    async fn write<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<ApiResponse<T>, ApiError> {
        let body = body.map(serde_json::to_value).transpose()?;
        let request = match method {
            Method::Delete => HttpRequest::delete(endpoint),
            _ => HttpRequest::post(endpoint, body),
        };
        // The write may have landed even if the response was unusable or the
        // caller dropped this future mid-request.
        let guard = InvalidateOnDrop(&self.cache);
        let outcome = resolve(self.transport.as_ref(), &self.bases, &request).await;
        drop(guard);
        let value = outcome.and_then(into_json).map_err(|e| failed(endpoint, e))?;
        decode(value).map_err(|e| failed(endpoint, e))
    }

    async fn uncached_get(&self, endpoint: &str) -> Result<RawResponse, ApiError> {
        resolve(self.transport.as_ref(), &self.bases, &HttpRequest::get(endpoint, Vec::new()))
            .await
            .map_err(|e| failed(endpoint, e))
    }

    // -------------------------------------------------------------------------
    // Creative tasks
    // -------------------------------------------------------------------------

    pub async fn generate_copywriting(
        &self,
        req: &GenerateCopywritingRequest,
    ) -> Result<CopywritingCandidates, ApiError> {
        self.write(Method::Post, "/copywriting/generate", Some(req))
            .await?
            .into_data()
            .map_err(|e| failed("/copywriting/generate", e))
    }

    pub async fn confirm_copywriting(
        &self,
        req: &ConfirmCopywritingRequest,
    ) -> Result<TaskData, ApiError> {
        self.write(Method::Post, "/copywriting/confirm", Some(req))
            .await?
            .into_data()
            .map_err(|e| failed("/copywriting/confirm", e))
    }

    pub async fn start_creative(&self, req: &StartCreativeRequest) -> Result<TaskData, ApiError> {
        self.write(Method::Post, "/creative/start", Some(req))
            .await?
            .into_data()
            .map_err(|e| failed("/creative/start", e))
    }

    /// Single-request generation used before the copywriting workflow existed.
    pub async fn generate_legacy(&self, req: &GenerateRequest) -> Result<TaskData, ApiError> {
        self.write(Method::Post, "/creative/generate", Some(req))
            .await?
            .into_data()
            .map_err(|e| failed("/creative/generate", e))
    }

    pub async fn get_task(&self, task_id: &str) -> Result<TaskDetailData, ApiError> {
        let endpoint = format!("/creative/task/{}", task_id);
        self.cached_get(&endpoint, QueryParams::new())
            .await?
            .into_data()
            .map_err(|e| failed(&endpoint, e))
    }

    pub async fn list_tasks(&self, params: &ListTasksParams) -> Result<TasksListData, ApiError> {
        self.cached_get("/creative/tasks", QueryParams::from_serializable(params)?)
            .await?
            .into_data()
            .map_err(|e| failed("/creative/tasks", e))
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<DeleteTaskResponse, ApiError> {
        let endpoint = format!("/creative/task/{}", task_id);
        self.write::<Value, _>(Method::Delete, &endpoint, None)
            .await?
            .into_data()
            .map_err(|e| failed(&endpoint, e))
    }

    pub async fn list_assets(&self, params: &ListAssetsParams) -> Result<AssetsListData, ApiError> {
        self.cached_get("/creative/assets", QueryParams::from_serializable(params)?)
            .await?
            .into_data()
            .map_err(|e| failed("/creative/assets", e))
    }

    // -------------------------------------------------------------------------
    // Experiments
    // -------------------------------------------------------------------------

    pub async fn create_experiment(
        &self,
        req: &CreateExperimentRequest,
    ) -> Result<CreatedExperiment, ApiError> {
        let created: CreatedExperiment = self
            .write(Method::Post, "/experiments", Some(req))
            .await?
            .into_data()
            .map_err(|e| failed("/experiments", e))?;
        log(
            Level::Info,
            Domain::Experiment,
            "created",
            obj(&[
                ("experiment_id", v_str(&created.experiment_id)),
                ("variants", json!(req.variants.len())),
            ]),
        );
        Ok(created)
    }

    pub async fn list_experiments(
        &self,
        params: &ListExperimentsParams,
    ) -> Result<ExperimentsListData, ApiError> {
        self.cached_get("/experiments", QueryParams::from_serializable(params)?)
            .await?
            .into_data()
            .map_err(|e| failed("/experiments", e))
    }

    pub async fn update_experiment_status(
        &self,
        experiment_id: &str,
        status: ExperimentStatus,
    ) -> Result<(), ApiError> {
        let endpoint = format!("/experiments/{}/status", experiment_id);
        self.write::<_, Value>(Method::Post, &endpoint, Some(&json!({ "status": status })))
            .await?
            .into_unit()
            .map_err(|e| failed(&endpoint, e))?;
        log(
            Level::Info,
            Domain::Experiment,
            "status_changed",
            obj(&[("experiment_id", v_str(experiment_id)), ("status", v_str(status.as_str()))]),
        );
        Ok(())
    }

    /// Previews which variant a user would be bucketed into.
    pub async fn assign_variant(
        &self,
        experiment_id: &str,
        user_key: Option<&str>,
    ) -> Result<ExperimentAssignData, ApiError> {
        let endpoint = format!("/experiments/{}/assign", experiment_id);
        let params = QueryParams::new().with_opt("user_key", user_key);
        self.cached_get(&endpoint, params)
            .await?
            .into_data()
            .map_err(|e| failed(&endpoint, e))
    }

    pub async fn record_impression(&self, experiment_id: &str, creative_id: u64) -> Result<(), ApiError> {
        let endpoint = format!("/experiments/{}/hit", experiment_id);
        self.write::<_, Value>(Method::Post, &endpoint, Some(&json!({ "creative_id": creative_id })))
            .await?
            .into_unit()
            .map_err(|e| failed(&endpoint, e))
    }

    pub async fn record_click(&self, experiment_id: &str, creative_id: u64) -> Result<(), ApiError> {
        let endpoint = format!("/experiments/{}/click", experiment_id);
        self.write::<_, Value>(Method::Post, &endpoint, Some(&json!({ "creative_id": creative_id })))
            .await?
            .into_unit()
            .map_err(|e| failed(&endpoint, e))
    }

    pub async fn experiment_metrics(&self, experiment_id: &str) -> Result<ExperimentMetrics, ApiError> {
        let endpoint = format!("/experiments/{}/metrics", experiment_id);
        self.cached_get(&endpoint, QueryParams::new())
            .await?
            .into_data()
            .map_err(|e| failed(&endpoint, e))
    }

    // -------------------------------------------------------------------------
    // Traces
    // -------------------------------------------------------------------------

    pub async fn list_traces(&self, params: &ListTracesParams) -> Result<TraceListData, ApiError> {
        self.cached_get("/model_traces", QueryParams::from_serializable(params)?)
            .await?
            .into_data()
            .map_err(|e| failed("/model_traces", e))
    }

    pub async fn trace_detail(&self, trace_id: &str) -> Result<TraceItem, ApiError> {
        let endpoint = format!("/model_traces/{}", trace_id);
        self.cached_get(&endpoint, QueryParams::new())
            .await?
            .into_data()
            .map_err(|e| failed(&endpoint, e))
    }

    // -------------------------------------------------------------------------
    // Warmup and health
    // -------------------------------------------------------------------------

    pub async fn warmup_status(&self) -> Result<WarmupStats, ApiError> {
        let raw = self.uncached_get("/warmup/status").await?;
        warmup_stats("/warmup/status", raw)
    }

    pub async fn run_warmup(&self) -> Result<WarmupStats, ApiError> {
        let guard = InvalidateOnDrop(&self.cache);
        let outcome =
            resolve(self.transport.as_ref(), &self.bases, &HttpRequest::post("/warmup/run", None)).await;
        drop(guard);
        let raw = outcome.map_err(|e| failed("/warmup/run", e))?;
        warmup_stats("/warmup/run", raw)
    }

    pub async fn ping(&self) -> Result<(), ApiError> {
        let raw = self.uncached_get("/ping").await?;
        let value = into_json(raw).map_err(|e| failed("/ping", e))?;
        decode::<Value>(value)?.into_unit().map_err(|e| failed("/ping", e))
    }
}

/// Clears the cache when dropped, whether the write completed or was abandoned.
struct InvalidateOnDrop<'a>(&'a RequestCache<Value>);

impl Drop for InvalidateOnDrop<'_> {
    fn drop(&mut self) {
        self.0.invalidate_all();
    }
}

fn warmup_stats(endpoint: &str, raw: RawResponse) -> Result<WarmupStats, ApiError> {
    check_status(&raw).map_err(|e| failed(endpoint, e))?;
    warmup::normalize_warmup(&raw.body)
        .into_data()
        .map_err(|e| failed(endpoint, e))
}

fn failed(endpoint: &str, err: ApiError) -> ApiError {
    log_api_failure(endpoint, err.kind().as_str(), &err.to_string());
    err
}
