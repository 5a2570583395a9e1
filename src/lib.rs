//! Client-side data access and workflow resolution for the ad-creative
//! generation backend.

pub mod api;
pub mod cache;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod experiment;
pub mod logging;
pub mod metrics;
pub mod resolver;
pub mod workflow;

pub use api::{ApiClient, ApiError, ErrorKind};
pub use cache::{Clock, ManualClock, RequestCache, SystemClock};
pub use config::Config;
