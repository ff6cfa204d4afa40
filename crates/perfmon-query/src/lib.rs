//! perfmon-query — counter-query registry and poll engine.
//!
//! Keeps the set of subscribed counters for one provider session, drives
//! poll cycles against a [`CounterSource`], and tracks per-instance
//! failure state so a recurring error is logged once per streak.
//!
//! # Architecture
//!
//! ```text
//! PerformanceMonitor<S: CounterSource>
//!   ├── ConnectionHandle (live session, None after disconnect)
//!   ├── QueryRegistry
//!   │   └── PerfObject → PerfCounter (scale) → PerfInstance
//!   │         (initialized, last error, LogGate)
//!   ├── subscribe()      merge + prime new leaves
//!   ├── run_poll_cycle() resample → ensure subscribed → fetch all → normalize
//!   └── detailed_errors() → diagnostics report
//! ```
//!
//! Everything is synchronous; a session is driven by one caller at a time.

pub mod diagnostics;
pub mod error;
pub mod gate;
pub mod poll;
pub mod registry;
pub mod scripted;
pub mod session;
pub mod source;

pub use diagnostics::detailed_error_report;
pub use error::{PerfmonError, PerfmonResult, SourceError};
pub use gate::LogGate;
pub use poll::{CycleOutcome, MetricValue, PollReport};
pub use registry::{PerfCounter, PerfInstance, PerfObject, QueryRegistry, SubscriptionRequest};
pub use scripted::{CounterScript, ScriptedSource};
pub use session::{PerformanceMonitor, Reading};
pub use source::{ConnectionHandle, CounterSource, Sample};
