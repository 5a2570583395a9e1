use async_trait::async_trait;
use serde::Serialize;

use super::state::{parse_lines, CreativeConfig, GenerationTask, Step};
use crate::api::types::{
    ConfirmCopywritingRequest, CopywritingCandidates, GenerateCopywritingRequest, Language,
    StartCreativeRequest, TaskData,
};
use crate::api::{ApiClient, ApiError};
use crate::cancel::CancelToken;
use crate::logging::{log, log_guard, log_transition, obj, v_str, Domain, Level};
use crate::resolver::{resolve_cta, resolve_selling_points};

/// Shown in summaries for content that has not been generated yet.
pub const PENDING_PLACEHOLDER: &str = "pending";

const PREVIEW_POINTS: usize = 3;

/// The three generation endpoints the workflow drives.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate_copywriting(
        &self,
        req: &GenerateCopywritingRequest,
    ) -> Result<CopywritingCandidates, ApiError>;
    async fn confirm_copywriting(&self, req: &ConfirmCopywritingRequest) -> Result<TaskData, ApiError>;
    async fn start_creative(&self, req: &StartCreativeRequest) -> Result<TaskData, ApiError>;
}

#[async_trait]
impl GenerationBackend for ApiClient {
    async fn generate_copywriting(
        &self,
        req: &GenerateCopywritingRequest,
    ) -> Result<CopywritingCandidates, ApiError> {
        ApiClient::generate_copywriting(self, req).await
    }

    async fn confirm_copywriting(&self, req: &ConfirmCopywritingRequest) -> Result<TaskData, ApiError> {
        ApiClient::confirm_copywriting(self, req).await
    }

    async fn start_creative(&self, req: &StartCreativeRequest) -> Result<TaskData, ApiError> {
        ApiClient::start_creative(self, req).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOp {
    Generate,
    Confirm,
    Submit,
}

impl StepOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOp::Generate => "generate",
            StepOp::Confirm => "confirm",
            StepOp::Submit => "submit",
        }
    }
}

/// Issued by a `begin_*` call. Its result is applied only while it is the
/// machine's current ticket; any later `begin_*`, `back`, `start_over` or
/// `cancel_pending` makes it stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTicket {
    id: u64,
    op: StepOp,
}

impl StepTicket {
    pub fn op(&self) -> StepOp {
        self.op
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Applied<T> {
    Applied(T),
    /// The call failed; state is unchanged and the error is in `last_error`.
    Failed(ApiError),
    /// The ticket was stale or the call was cancelled; nothing changed.
    Discarded,
}

impl<T> Applied<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Applied::Applied(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Applied::Applied(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSummary {
    pub step: Step,
    pub product_name: String,
    pub language: Language,
    /// Edited CTA, else the selected candidate; empty when neither exists
    pub cta: String,
    pub cta_preview: String,
    pub selling_points: Vec<String>,
    pub selling_points_preview: String,
    pub num_variants: u32,
    pub formats: Vec<String>,
    pub style: Option<String>,
    pub product_image_url: Option<String>,
}

/// Product input -> copywriting selection -> creative config.
///
/// Forward moves happen only when the backend call behind them succeeds.
/// `back` moves one step and keeps everything entered so far.
#[derive(Debug, Clone)]
pub struct WorkflowStateMachine {
    step: Step,
    product_name: String,
    language: Language,
    task: Option<GenerationTask>,
    config: CreativeConfig,
    last_error: Option<ApiError>,
    ticket_seq: u64,
    pending: Option<StepTicket>,
}

impl Default for WorkflowStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowStateMachine {
    pub fn new() -> Self {
        Self {
            step: Step::ProductInput,
            product_name: String::new(),
            language: Language::Auto,
            task: None,
            config: CreativeConfig::default(),
            last_error: None,
            ticket_seq: 0,
            pending: None,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn task(&self) -> Option<&GenerationTask> {
        self.task.as_ref()
    }

    pub fn config(&self) -> &CreativeConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut CreativeConfig {
        &mut self.config
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    pub fn pending(&self) -> Option<StepTicket> {
        self.pending
    }

    pub fn can_generate(&self) -> bool {
        !self.product_name.trim().is_empty()
    }

    // -------------------------------------------------------------------------
    // Inputs
    // -------------------------------------------------------------------------

    pub fn set_product_name(&mut self, name: &str) {
        self.product_name = name.to_string();
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn set_num_variants(&mut self, n: u32) {
        self.config.set_num_variants(n);
    }

    pub fn select_cta(&mut self, index: usize) -> Result<(), ApiError> {
        let task = self.task_mut("select_cta")?;
        if index >= task.candidates.cta_candidates.len() {
            return Err(ApiError::validation(format!("no CTA candidate at index {}", index)));
        }
        task.selected_cta_index = index;
        Ok(())
    }

    /// Selects or deselects a selling point candidate; selection order is kept.
    pub fn toggle_selling_point(&mut self, index: usize) -> Result<(), ApiError> {
        let task = self.task_mut("toggle_selling_point")?;
        if index >= task.candidates.selling_point_candidates.len() {
            return Err(ApiError::validation(format!("no selling point candidate at index {}", index)));
        }
        if let Some(pos) = task.selected_sp_indexes.iter().position(|&i| i == index) {
            task.selected_sp_indexes.remove(pos);
        } else {
            task.selected_sp_indexes.push(index);
        }
        Ok(())
    }

    /// A blank edit clears it, so the selected candidate applies again.
    pub fn set_edited_cta(&mut self, text: &str) -> Result<(), ApiError> {
        let task = self.task_mut("set_edited_cta")?;
        task.edited_cta = (!text.trim().is_empty()).then(|| text.to_string());
        Ok(())
    }

    pub fn set_edited_sps(&mut self, points: Vec<String>) -> Result<(), ApiError> {
        let task = self.task_mut("set_edited_sps")?;
        task.edited_sps = points
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Ok(())
    }

    /// One selling point per line.
    pub fn set_edited_sps_text(&mut self, text: &str) -> Result<(), ApiError> {
        self.set_edited_sps(parse_lines(text))
    }

    fn task_mut(&mut self, action: &str) -> Result<&mut GenerationTask, ApiError> {
        self.task
            .as_mut()
            .ok_or_else(|| ApiError::validation(format!("{}: no copywriting candidates yet", action)))
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    pub fn begin_generate(&mut self) -> Result<(StepTicket, GenerateCopywritingRequest), ApiError> {
        if self.step != Step::ProductInput {
            return Err(self.reject(StepOp::Generate, "generation starts from product input"));
        }
        let product_name = self.product_name.trim().to_string();
        if product_name.is_empty() {
            return Err(self.reject(StepOp::Generate, "product name is required"));
        }
        let req = GenerateCopywritingRequest {
            product_name,
            language: self.language,
        };
        Ok((self.issue(StepOp::Generate), req))
    }

    pub fn apply_generated(
        &mut self,
        ticket: StepTicket,
        result: Result<CopywritingCandidates, ApiError>,
    ) -> Applied<()> {
        if !self.redeem(ticket, StepOp::Generate) {
            return Applied::Discarded;
        }
        match result {
            Ok(candidates) => {
                let task = GenerationTask::new(self.product_name.trim().to_string(), self.language, candidates);
                self.advance(Step::CopywritingSelection, &task.task_id);
                self.task = Some(task);
                Applied::Applied(())
            }
            Err(e) => self.fail(ticket, e),
        }
    }

    pub fn begin_confirm(&mut self) -> Result<(StepTicket, ConfirmCopywritingRequest), ApiError> {
        if self.step != Step::CopywritingSelection {
            return Err(self.reject(StepOp::Confirm, "confirm requires copywriting selection"));
        }
        if self.summary().selling_points.is_empty() {
            return Err(self.reject(StepOp::Confirm, "select at least one selling point"));
        }
        let Some(task) = &self.task else {
            return Err(self.reject(StepOp::Confirm, "no copywriting candidates yet"));
        };
        let req = ConfirmCopywritingRequest {
            task_id: task.task_id.clone(),
            selected_cta_index: task.selected_cta_index,
            selected_sp_indexes: task.selected_sp_indexes.clone(),
            edited_cta: task.edited_cta.clone(),
            edited_sps: (!task.edited_sps.is_empty()).then(|| task.edited_sps.clone()),
            product_image_url: self.config.image_url(),
            style: self.config.style_value(),
            num_variants: Some(self.config.num_variants()),
            formats: Some(self.config.formats.clone()),
            variant_configs: None,
        };
        Ok((self.issue(StepOp::Confirm), req))
    }

    pub fn apply_confirmed(
        &mut self,
        ticket: StepTicket,
        result: Result<TaskData, ApiError>,
    ) -> Applied<TaskData> {
        if !self.redeem(ticket, StepOp::Confirm) {
            return Applied::Discarded;
        }
        match result {
            Ok(data) => {
                self.advance(Step::CreativeConfig, &data.task_id);
                Applied::Applied(data)
            }
            Err(e) => self.fail(ticket, e),
        }
    }

    pub fn begin_submit(&mut self) -> Result<(StepTicket, StartCreativeRequest), ApiError> {
        if self.step != Step::CreativeConfig {
            return Err(self.reject(StepOp::Submit, "submit requires creative config"));
        }
        let Some(task) = &self.task else {
            return Err(self.reject(StepOp::Submit, "confirm copywriting first"));
        };
        let req = StartCreativeRequest {
            task_id: task.task_id.clone(),
            product_image_url: self.config.image_url(),
            style: self.config.style_value(),
            num_variants: Some(self.config.num_variants()),
            formats: Some(self.config.formats.clone()),
            variant_configs: Some(self.config.variant_overrides()),
        };
        Ok((self.issue(StepOp::Submit), req))
    }

    /// Submission does not move the workflow; the started task is returned.
    pub fn apply_submitted(
        &mut self,
        ticket: StepTicket,
        result: Result<TaskData, ApiError>,
    ) -> Applied<TaskData> {
        if !self.redeem(ticket, StepOp::Submit) {
            return Applied::Discarded;
        }
        match result {
            Ok(data) => {
                self.last_error = None;
                log(
                    Level::Info,
                    Domain::Workflow,
                    "creative_started",
                    obj(&[("task_id", v_str(&data.task_id)), ("status", v_str(data.status.as_str()))]),
                );
                Applied::Applied(data)
            }
            Err(e) => self.fail(ticket, e),
        }
    }

    /// Moves one step back, keeping all entered data. Returns the new step.
    pub fn back(&mut self) -> Step {
        if let Some(prev) = self.step.previous() {
            self.cancel_pending();
            let task_id = self.task.as_ref().map(|t| t.task_id.as_str());
            log_transition(task_id, self.step.as_str(), prev.as_str());
            self.step = prev;
        }
        self.step
    }

    /// Drops every input and returns to product input.
    pub fn start_over(&mut self) {
        let ticket_seq = self.ticket_seq;
        let from = self.step;
        *self = Self::new();
        // Keep issuing fresh ids so tickets from before the reset stay stale.
        self.ticket_seq = ticket_seq;
        log_transition(None, from.as_str(), self.step.as_str());
    }

    pub fn cancel_pending(&mut self) {
        if let Some(ticket) = self.pending.take() {
            log(
                Level::Debug,
                Domain::Workflow,
                "pending_cancelled",
                obj(&[("op", v_str(ticket.op.as_str()))]),
            );
        }
    }

    pub fn summary(&self) -> WorkflowSummary {
        let (cta, selling_points) = match &self.task {
            Some(t) => (
                resolve_cta(t.edited_cta.as_deref(), t.selected_cta()),
                resolve_selling_points(Some(t.edited_sps.as_slice()), &t.selected_selling_points()),
            ),
            None => (String::new(), Vec::new()),
        };
        let cta_preview = if cta.is_empty() { PENDING_PLACEHOLDER.to_string() } else { cta.clone() };
        let selling_points_preview = if selling_points.is_empty() {
            PENDING_PLACEHOLDER.to_string()
        } else {
            selling_points.iter().take(PREVIEW_POINTS).cloned().collect::<Vec<_>>().join(" / ")
        };
        WorkflowSummary {
            step: self.step,
            product_name: self.product_name.clone(),
            language: self.language,
            cta,
            cta_preview,
            selling_points,
            selling_points_preview,
            num_variants: self.config.num_variants(),
            formats: self.config.formats.clone(),
            style: self.config.style_value(),
            product_image_url: self.config.image_url(),
        }
    }

    // -------------------------------------------------------------------------
    // Begin + call + apply
    // -------------------------------------------------------------------------

    pub async fn generate(
        &mut self,
        backend: &dyn GenerationBackend,
        cancel: &CancelToken,
    ) -> Result<Applied<()>, ApiError> {
        let (ticket, req) = self.begin_generate()?;
        let result = cancel.run(backend.generate_copywriting(&req)).await;
        Ok(self.apply_generated(ticket, result))
    }

    pub async fn confirm(
        &mut self,
        backend: &dyn GenerationBackend,
        cancel: &CancelToken,
    ) -> Result<Applied<TaskData>, ApiError> {
        let (ticket, req) = self.begin_confirm()?;
        let result = cancel.run(backend.confirm_copywriting(&req)).await;
        Ok(self.apply_confirmed(ticket, result))
    }

    pub async fn submit(
        &mut self,
        backend: &dyn GenerationBackend,
        cancel: &CancelToken,
    ) -> Result<Applied<TaskData>, ApiError> {
        let (ticket, req) = self.begin_submit()?;
        let result = cancel.run(backend.start_creative(&req)).await;
        Ok(self.apply_submitted(ticket, result))
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn issue(&mut self, op: StepOp) -> StepTicket {
        self.ticket_seq += 1;
        let ticket = StepTicket { id: self.ticket_seq, op };
        if let Some(old) = self.pending.replace(ticket) {
            log(
                Level::Debug,
                Domain::Workflow,
                "superseded",
                obj(&[("op", v_str(old.op.as_str())), ("by", v_str(op.as_str()))]),
            );
        }
        self.last_error = None;
        ticket
    }

    fn redeem(&mut self, ticket: StepTicket, op: StepOp) -> bool {
        if ticket.op == op && self.pending == Some(ticket) {
            self.pending = None;
            return true;
        }
        log(
            Level::Debug,
            Domain::Workflow,
            "stale_result_discarded",
            obj(&[("op", v_str(ticket.op.as_str()))]),
        );
        false
    }

    fn reject(&mut self, op: StepOp, reason: &str) -> ApiError {
        log_guard(op.as_str(), reason);
        let err = ApiError::validation(reason);
        self.last_error = Some(err.clone());
        err
    }

    fn fail<T>(&mut self, ticket: StepTicket, err: ApiError) -> Applied<T> {
        if err == ApiError::Cancelled {
            log(
                Level::Info,
                Domain::Workflow,
                "cancelled",
                obj(&[("op", v_str(ticket.op.as_str()))]),
            );
            return Applied::Discarded;
        }
        log(
            Level::Warn,
            Domain::Workflow,
            "step_failed",
            obj(&[
                ("op", v_str(ticket.op.as_str())),
                ("step", v_str(self.step.as_str())),
                ("msg", v_str(&err.to_string())),
            ]),
        );
        self.last_error = Some(err.clone());
        Applied::Failed(err)
    }

    fn advance(&mut self, to: Step, task_id: &str) {
        log_transition(Some(task_id), self.step.as_str(), to.as_str());
        self.step = to;
        self.last_error = None;
    }
}
