//! perfmon-agent — monitor host for counter sessions.
//!
//! Wraps a [`perfmon_query::PerformanceMonitor`] in the three-phase
//! lifecycle a monitoring host drives:
//!
//! ```text
//! CounterMonitor
//!   ├── setup()    connect + subscribe every configured measure
//!   ├── execute()  one poll cycle → measurements + Status
//!   └── teardown() clear query + disconnect (idempotent)
//! ```
//!
//! Object names get the SQL Server prefix (`SQLServer:` or
//! `MSSQL$<INSTANCE>:`) when the config has a `[sql_server]` table.

pub mod agent;
pub mod status;

pub use agent::{CounterMonitor, ExecuteReport, Measurement};
pub use status::{Status, StatusCode};
