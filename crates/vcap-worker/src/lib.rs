//! Caption pipeline orchestration.
//!
//! This crate provides:
//! - The `CaptionPipeline` orchestrator and its state machine
//! - Per-content-id single-flight locking
//! - Environment-driven configuration
//! - Structured lifecycle logging and pipeline metrics

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod single_flight;
pub mod state;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use logging::{init_tracing, PipelineLogger};
pub use pipeline::{CaptionPipeline, PipelineOutput};
pub use single_flight::{SingleFlight, SingleFlightGuard};
pub use state::PipelineState;
