//! perfmon-core — shared types for the perfmon workspace.
//!
//! Holds the value types that identify a counter sample, the scale
//! normalizer applied to raw provider values, and the `perfmon.toml`
//! monitor configuration.

pub mod config;
pub mod scale;
pub mod types;

pub use config::{MeasureConfig, MonitorConfig, SqlServerConfig};
pub use scale::normalize;
pub use types::*;
