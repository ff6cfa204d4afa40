//! PerformanceMonitor — one provider session and its query registry.
//!
//! Lifecycle: `connect` → any number of `subscribe` / `query` /
//! `run_poll_cycle` calls → `disconnect`. Every operation except
//! `disconnect` fails with [`PerfmonError::NotConnected`] outside a live
//! session.

use std::collections::BTreeMap;

use perfmon_core::{MetricIdentity, ScaleMode};
use tracing::{debug, info, warn};

use crate::diagnostics::detailed_error_report;
use crate::error::{PerfmonError, PerfmonResult};
use crate::registry::{PerfObject, QueryRegistry, SubscriptionRequest};
use crate::source::{ConnectionHandle, CounterSource, Sample};

const LOCALHOST: &str = "localhost";
const LOCAL_IP: &str = "127.0.0.1";

/// A raw value captured for one registered instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub raw: i64,
    /// Scale mode of the counter the value belongs to.
    pub scale: ScaleMode,
}

pub struct PerformanceMonitor<S> {
    source: S,
    handle: Option<ConnectionHandle>,
    host: String,
    registry: QueryRegistry,
}

impl<S: CounterSource> PerformanceMonitor<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            handle: None,
            host: String::new(),
            registry: QueryRegistry::new(),
        }
    }

    /// Open a provider session against `host`.
    ///
    /// `localhost` is rewritten to `127.0.0.1`; some providers fail to
    /// resolve the name.
    pub fn connect(&mut self, host: &str, translation: bool) -> PerfmonResult<()> {
        if self.handle.is_some() {
            return Err(PerfmonError::AlreadyConnected);
        }
        let host = fix_hostname(host);
        let handle = self
            .source
            .connect(&host, translation)
            .map_err(|e| PerfmonError::ProviderInit(e.to_string()))?;
        info!(%host, translation, "perfmon session connected");
        self.host = host;
        self.handle = Some(handle);
        Ok(())
    }

    /// Close the session. Safe to call at any time, any number of times.
    pub fn disconnect(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Err(e) = self.source.disconnect(handle) {
            warn!(error = %e, "failed to uninitialize perfmon library");
        }
        self.registry.clear();
        info!(host = %self.host, "perfmon session disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Host the session is connected to, after rewriting.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Ensure every instance in `request` is registered.
    ///
    /// New instances are primed once. A transient or failed prime leaves
    /// the instance uninitialized; only session-level source errors abort.
    /// Instances that already exist are not touched.
    pub fn subscribe(&mut self, request: &SubscriptionRequest) -> PerfmonResult<&PerfObject> {
        if self.handle.is_none() {
            return Err(PerfmonError::NotConnected);
        }
        let created = self.registry.merge(request)?;
        for id in &created {
            self.prime(id, request.scale)?;
        }
        self.registry
            .lookup(&request.object)
            .ok_or_else(|| PerfmonError::Subscribe(format!("object {} vanished", request.object)))
    }

    /// Prime `id` again if it is registered but not initialized.
    pub fn reprime(&mut self, id: &MetricIdentity) -> PerfmonResult<()> {
        if self.handle.is_none() {
            return Err(PerfmonError::NotConnected);
        }
        let Some(scale) = self.registry.scale_of(id) else {
            return Ok(());
        };
        let needs_prime = self
            .registry
            .instance(id)
            .is_some_and(|instance| !instance.is_initialized());
        if needs_prime {
            self.prime(id, scale)
        } else {
            Ok(())
        }
    }

    fn prime(&mut self, id: &MetricIdentity, scale: ScaleMode) -> PerfmonResult<()> {
        let handle = self.handle.as_ref().ok_or(PerfmonError::NotConnected)?;
        let sample = self.source.sample(handle, &self.host, id, scale)?;
        let Some(instance) = self.registry.instance_mut(id) else {
            return Ok(());
        };
        match sample {
            Sample::Value(_) => {
                instance.record_prime_success();
                debug!(metric = %id, "counter primed");
            }
            Sample::Transient => {}
            Sample::Failure(message) => {
                debug!(metric = %id, error = %message, "counter prime failed");
                instance.record_prime_failure(message);
            }
        }
        Ok(())
    }

    /// Drop every counter from the provider and empty the registry.
    ///
    /// On failure the registry is left as it was.
    pub fn clear_query(&mut self) -> PerfmonResult<()> {
        let handle = self.handle.as_ref().ok_or(PerfmonError::NotConnected)?;
        match self.source.clear_all(handle) {
            Ok(true) => {
                self.registry.clear();
                info!("perfmon query cleared");
                Ok(())
            }
            Ok(false) | Err(_) => Err(PerfmonError::ClearQuery),
        }
    }

    /// Ask the provider for a fresh sample of every open counter.
    pub(crate) fn resample(&mut self) -> PerfmonResult<()> {
        let handle = self.handle.as_ref().ok_or(PerfmonError::NotConnected)?;
        match self.source.resample(handle) {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(PerfmonError::Resample),
        }
    }

    /// Fetch the current value of every registered instance.
    ///
    /// Updates each instance's failure state. A failure is logged once per
    /// streak; transient samples are skipped silently. Source errors that
    /// invalidate the session abort the fetch.
    pub(crate) fn fetch_all(&mut self) -> PerfmonResult<BTreeMap<MetricIdentity, Reading>> {
        let handle = self.handle.as_ref().ok_or(PerfmonError::NotConnected)?;
        let mut readings = BTreeMap::new();

        for (id, scale) in self.registry.leaves() {
            let sample = self.source.sample(handle, &self.host, &id, scale)?;
            let Some(instance) = self.registry.instance_mut(&id) else {
                continue;
            };
            match sample {
                Sample::Value(raw) => {
                    instance.record_success();
                    readings.insert(id, Reading { raw, scale });
                }
                Sample::Transient => {
                    debug!(metric = %id, "no valid sample yet");
                }
                Sample::Failure(message) => {
                    if instance.record_fetch_failure(message.clone()) {
                        warn!(
                            object = %id.object,
                            counter = %id.counter,
                            instance = %id.instance_label(),
                            error = %message,
                            "failed to retrieve value"
                        );
                    }
                }
            }
        }
        Ok(readings)
    }

    /// Resample, then fetch every registered instance.
    pub fn query(&mut self) -> PerfmonResult<BTreeMap<MetricIdentity, Reading>> {
        self.resample()?;
        self.fetch_all()
    }

    /// Look up a registered object by name.
    pub fn performance_object(&self, name: &str) -> Option<&PerfObject> {
        self.registry.lookup(name)
    }

    pub fn registry(&self) -> &QueryRegistry {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut QueryRegistry {
        &mut self.registry
    }

    /// Multi-line report of every instance currently in error.
    pub fn detailed_errors(&self) -> String {
        detailed_error_report(&self.registry)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

fn fix_hostname(host: &str) -> String {
    if host.eq_ignore_ascii_case(LOCALHOST) {
        LOCAL_IP.to_string()
    } else {
        host.to_string()
    }
}
