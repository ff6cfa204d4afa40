//! The counter source port.
//!
//! Everything the registry and poll engine need from a native counter
//! provider. Implementations block; the session calls them one at a time.

use perfmon_core::{MetricIdentity, ScaleMode};

use crate::error::SourceError;

/// Opaque session handle returned by [`CounterSource::connect`].
///
/// Not `Clone`: the session owns the only copy and gives it back on
/// disconnect, after which no call can be made with it.
#[derive(Debug, PartialEq, Eq)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Outcome of sampling one counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sample {
    /// Raw value in the requested format.
    Value(i64),
    /// The counter exists but has no valid sample this cycle, e.g. a
    /// delta counter still waiting for its baseline.
    Transient,
    /// The counter could not be read.
    Failure(String),
}

pub trait CounterSource {
    /// Open a provider session against `host`.
    fn connect(&mut self, host: &str, translate: bool) -> Result<ConnectionHandle, SourceError>;

    /// Release a provider session.
    fn disconnect(&mut self, handle: ConnectionHandle) -> Result<(), SourceError>;

    /// Drop every counter the provider has opened for this session.
    fn clear_all(&mut self, handle: &ConnectionHandle) -> Result<bool, SourceError>;

    /// Prime or fetch one counter.
    ///
    /// The first call for an identity opens the counter and establishes
    /// its baseline; later calls return the value captured by the most
    /// recent [`resample`](CounterSource::resample).
    fn sample(
        &mut self,
        handle: &ConnectionHandle,
        host: &str,
        identity: &MetricIdentity,
        scale: ScaleMode,
    ) -> Result<Sample, SourceError>;

    /// Capture a fresh sample of every open counter.
    fn resample(&mut self, handle: &ConnectionHandle) -> Result<bool, SourceError>;
}
