//! Step Batch Module
//!
//! Provides data structures and utilities for defining, parsing, and
//! validating the batch of steps to run concurrently.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Step, StepBatch)
//! - [`parser`]: YAML parsing and loading
//! - [`validator`]: Validation rules for the steps input
//! - [`render`]: Engine workflow and interceptor action rendering
//! - [`state`]: Run state shared between stage processes

pub mod model;
pub mod parser;
pub mod render;
pub mod state;
pub mod validator;

pub use model::{Step, StepBatch};
pub use parser::{load_steps, parse_steps};
pub use render::{render_workflow, RenderError};
pub use state::{EngineRecord, FailedSteps};
pub use validator::ValidationError;
