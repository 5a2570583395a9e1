//! Three-step creative generation: pick copy for a product, confirm it, then
//! start image generation with per-variant settings.

mod machine;
mod state;

pub use machine::{
    Applied, GenerationBackend, StepOp, StepTicket, WorkflowStateMachine, WorkflowSummary,
    PENDING_PLACEHOLDER,
};
pub use state::{
    parse_lines, CreativeConfig, GenerationTask, Step, DEFAULT_FORMAT, DEFAULT_VARIANTS, MAX_VARIANTS,
    MIN_VARIANTS,
};
