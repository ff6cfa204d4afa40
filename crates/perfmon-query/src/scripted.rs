//! Scripted counter source.
//!
//! An in-memory [`CounterSource`] driven by per-counter scripts, loadable
//! from a TOML replay file. Used as the provider for `perfmon poll` and as
//! the test double for the session and poll engine.
//!
//! ```toml
//! [[counter]]
//! object = "Processor"
//! counter = "% Processor Time"
//! instance = "_Total"
//! samples = [4500, 4700]
//! warmup = 1
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use perfmon_core::{MetricIdentity, ScaleMode};
use serde::Deserialize;
use tracing::debug;

use crate::error::SourceError;
use crate::source::{ConnectionHandle, CounterSource, Sample};

/// Behaviour of one scripted counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CounterScript {
    /// Raw values, served in order and cycled.
    #[serde(default)]
    pub samples: Vec<i64>,
    /// Number of leading calls answered with [`Sample::Transient`].
    #[serde(default)]
    pub warmup: u32,
    /// If set, every call fails with this message.
    pub failure: Option<String>,
}

impl CounterScript {
    pub fn values(samples: &[i64]) -> Self {
        Self {
            samples: samples.to_vec(),
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_warmup(mut self, warmup: u32) -> Self {
        self.warmup = warmup;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ReplayFile {
    #[serde(rename = "counter", default)]
    counters: Vec<ReplayCounter>,
}

#[derive(Debug, Deserialize)]
struct ReplayCounter {
    object: String,
    counter: String,
    instance: Option<String>,
    #[serde(flatten)]
    script: CounterScript,
}

#[derive(Debug, Default)]
struct ScriptState {
    script: CounterScript,
    calls: usize,
    served: usize,
}

#[derive(Debug, Default)]
pub struct ScriptedSource {
    counters: BTreeMap<MetricIdentity, ScriptState>,
    next_handle: u64,
    live: Option<u64>,
    connect_failure: Option<String>,
    resample_fails: bool,
    clear_fails: bool,
    resamples: usize,
    clears: usize,
    last_host: Option<String>,
    last_format: Option<u32>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load counter scripts from a replay file.
    pub fn from_replay_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading replay file {}", path.display()))?;
        Self::from_replay_str(&content)
            .with_context(|| format!("parsing replay file {}", path.display()))
    }

    pub fn from_replay_str(content: &str) -> anyhow::Result<Self> {
        let replay: ReplayFile = toml::from_str(content)?;
        let mut source = Self::new();
        for entry in replay.counters {
            let instance = entry.instance.as_deref().filter(|i| !i.is_empty());
            let id = MetricIdentity::new(&entry.object, &entry.counter, instance);
            source.set_script(id, entry.script);
        }
        Ok(source)
    }

    pub fn with_counter(mut self, id: MetricIdentity, script: CounterScript) -> Self {
        self.set_script(id, script);
        self
    }

    /// Replace the script for `id`. Call counts are kept.
    pub fn set_script(&mut self, id: MetricIdentity, script: CounterScript) {
        self.counters.entry(id).or_default().script = script;
    }

    pub fn fail_connect(&mut self, message: &str) {
        self.connect_failure = Some(message.to_string());
    }

    pub fn fail_resample(&mut self, fail: bool) {
        self.resample_fails = fail;
    }

    pub fn fail_clear(&mut self, fail: bool) {
        self.clear_fails = fail;
    }

    /// Number of `sample` calls made for `id`.
    pub fn sample_calls(&self, id: &MetricIdentity) -> usize {
        self.counters.get(id).map(|s| s.calls).unwrap_or(0)
    }

    pub fn resample_calls(&self) -> usize {
        self.resamples
    }

    pub fn clear_calls(&self) -> usize {
        self.clears
    }

    pub fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    /// Host passed to the most recent `sample` call.
    pub fn last_host(&self) -> Option<&str> {
        self.last_host.as_deref()
    }

    /// Format flag passed to the most recent `sample` call.
    pub fn last_format(&self) -> Option<u32> {
        self.last_format
    }

    fn check(&self, handle: &ConnectionHandle) -> Result<(), SourceError> {
        match self.live {
            Some(id) if id == handle.id() => Ok(()),
            _ => Err(SourceError::InvalidHandle),
        }
    }
}

impl CounterSource for ScriptedSource {
    fn connect(&mut self, host: &str, translate: bool) -> Result<ConnectionHandle, SourceError> {
        if let Some(message) = &self.connect_failure {
            return Err(SourceError::Provider(message.clone()));
        }
        self.next_handle += 1;
        self.live = Some(self.next_handle);
        debug!(%host, translate, handle = self.next_handle, "scripted source connected");
        Ok(ConnectionHandle::new(self.next_handle))
    }

    fn disconnect(&mut self, handle: ConnectionHandle) -> Result<(), SourceError> {
        self.check(&handle)?;
        self.live = None;
        Ok(())
    }

    fn clear_all(&mut self, handle: &ConnectionHandle) -> Result<bool, SourceError> {
        self.check(handle)?;
        self.clears += 1;
        Ok(!self.clear_fails)
    }

    fn sample(
        &mut self,
        handle: &ConnectionHandle,
        host: &str,
        identity: &MetricIdentity,
        scale: ScaleMode,
    ) -> Result<Sample, SourceError> {
        self.check(handle)?;
        self.last_host = Some(host.to_string());
        self.last_format = Some(scale.format_flag());

        let Some(state) = self.counters.get_mut(identity) else {
            return Ok(Sample::Failure("counter not found".to_string()));
        };
        state.calls += 1;

        if let Some(message) = &state.script.failure {
            return Ok(Sample::Failure(message.clone()));
        }
        if state.calls <= state.script.warmup as usize {
            return Ok(Sample::Transient);
        }
        if state.script.samples.is_empty() {
            return Ok(Sample::Failure("no data".to_string()));
        }
        let value = state.script.samples[state.served % state.script.samples.len()];
        state.served += 1;
        Ok(Sample::Value(value))
    }

    fn resample(&mut self, handle: &ConnectionHandle) -> Result<bool, SourceError> {
        self.check(handle)?;
        self.resamples += 1;
        Ok(!self.resample_fails)
    }
}
