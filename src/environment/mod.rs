//! Environment Module
//!
//! Runner configuration and the host the stage results are reported to.

pub mod config;
pub mod host;

pub use config::{ConfigError, EngineConfig, RunnerConfig};
pub use host::{GithubHost, HostCall, HostError, HostOutputs, RecordingHost};
