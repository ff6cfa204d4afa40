//! The query registry: object → counter → instance.
//!
//! The tree only grows. Nodes are created by [`QueryRegistry::merge`] and
//! removed all at once by [`QueryRegistry::clear`]; nothing else changes
//! topology. `merge` never talks to the counter source: it reports which
//! leaves are new and the session primes them afterwards.

use std::collections::BTreeMap;

use perfmon_core::{MetricIdentity, ScaleMode};

use crate::error::{PerfmonError, PerfmonResult};
use crate::gate::LogGate;

/// State of one instance leaf.
#[derive(Debug, Clone, Default)]
pub struct PerfInstance {
    name: Option<String>,
    initialized: bool,
    last_error: Option<String>,
    log_gate: LogGate,
}

impl PerfInstance {
    fn new(name: Option<String>) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Instance name; `None` for counters without instances.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn log_gate(&self) -> LogGate {
        self.log_gate
    }

    /// A fetch returned a value. Ends any failure streak.
    pub(crate) fn record_success(&mut self) {
        self.initialized = true;
        self.last_error = None;
        self.log_gate.rearm();
    }

    /// A prime returned a value. Only a fetched value re-arms the gate.
    pub(crate) fn record_prime_success(&mut self) {
        self.initialized = true;
        self.last_error = None;
    }

    /// A prime failed. Priming never logs, so the gate is left alone.
    pub(crate) fn record_prime_failure(&mut self, message: String) {
        self.initialized = false;
        self.last_error = Some(message);
    }

    /// A fetch failed. Returns true if the failure should be logged.
    pub(crate) fn record_fetch_failure(&mut self, message: String) -> bool {
        self.initialized = false;
        self.last_error = Some(message);
        self.log_gate.fire()
    }

    /// Consume the gate for a failure noticed outside the fetch loop.
    pub(crate) fn fire_gate(&mut self) -> bool {
        self.log_gate.fire()
    }
}

#[derive(Debug, Clone)]
pub struct PerfCounter {
    name: String,
    scale: ScaleMode,
    instances: BTreeMap<Option<String>, PerfInstance>,
}

impl PerfCounter {
    fn new(name: &str, scale: ScaleMode) -> Self {
        Self {
            name: name.to_string(),
            scale,
            instances: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scale mode, fixed when the counter was first subscribed.
    pub fn scale(&self) -> ScaleMode {
        self.scale
    }

    pub fn instance(&self, name: Option<&str>) -> Option<&PerfInstance> {
        self.instances.get(&name.map(str::to_string))
    }

    pub fn instances(&self) -> impl Iterator<Item = &PerfInstance> {
        self.instances.values()
    }

    pub fn error_occurred(&self) -> bool {
        self.instances.values().any(|i| i.last_error.is_some())
    }
}

#[derive(Debug, Clone)]
pub struct PerfObject {
    name: String,
    counters: BTreeMap<String, PerfCounter>,
}

impl PerfObject {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            counters: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn counter(&self, name: &str) -> Option<&PerfCounter> {
        self.counters.get(name)
    }

    pub fn counters(&self) -> impl Iterator<Item = &PerfCounter> {
        self.counters.values()
    }

    pub fn error_occurred(&self) -> bool {
        self.counters.values().any(PerfCounter::error_occurred)
    }
}

/// A requested subtree: one counter of one object, with its instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub object: String,
    pub counter: String,
    /// `None` entries stand for "all instances".
    pub instances: Vec<Option<String>>,
    pub scale: ScaleMode,
}

impl SubscriptionRequest {
    pub fn new(object: &str, counter: &str, instances: &[Option<&str>], scale: ScaleMode) -> Self {
        Self {
            object: object.to_string(),
            counter: counter.to_string(),
            instances: instances.iter().map(|i| i.map(str::to_string)).collect(),
            scale,
        }
    }

    /// Request for a single identity.
    pub fn for_identity(identity: &MetricIdentity, scale: ScaleMode) -> Self {
        Self {
            object: identity.object.clone(),
            counter: identity.counter.clone(),
            instances: vec![identity.instance.clone()],
            scale,
        }
    }

    fn validate(&self) -> PerfmonResult<()> {
        if self.object.is_empty() {
            return Err(PerfmonError::Subscribe("empty object name".into()));
        }
        if self.counter.is_empty() {
            return Err(PerfmonError::Subscribe(format!(
                "empty counter name in object {}",
                self.object
            )));
        }
        if self.instances.is_empty() {
            return Err(PerfmonError::Subscribe(format!(
                "no instances requested for {}/{}",
                self.object, self.counter
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryRegistry {
    objects: BTreeMap<String, PerfObject>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a requested subtree into the registry.
    ///
    /// Creates whatever object, counter, and instance nodes are missing
    /// and returns the identities of the instance leaves that were created.
    /// Existing nodes keep their state, and an existing counter keeps its
    /// scale mode.
    pub fn merge(&mut self, request: &SubscriptionRequest) -> PerfmonResult<Vec<MetricIdentity>> {
        request.validate()?;

        let object = self
            .objects
            .entry(request.object.clone())
            .or_insert_with(|| PerfObject::new(&request.object));
        let counter = object
            .counters
            .entry(request.counter.clone())
            .or_insert_with(|| PerfCounter::new(&request.counter, request.scale));

        let mut created = Vec::new();
        for name in &request.instances {
            if counter.instances.contains_key(name) {
                continue;
            }
            counter
                .instances
                .insert(name.clone(), PerfInstance::new(name.clone()));
            created.push(MetricIdentity {
                object: request.object.clone(),
                counter: request.counter.clone(),
                instance: name.clone(),
            });
        }
        Ok(created)
    }

    pub fn lookup(&self, object: &str) -> Option<&PerfObject> {
        self.objects.get(object)
    }

    pub fn objects(&self) -> impl Iterator<Item = &PerfObject> {
        self.objects.values()
    }

    pub fn instance(&self, id: &MetricIdentity) -> Option<&PerfInstance> {
        self.objects
            .get(&id.object)?
            .counters
            .get(&id.counter)?
            .instances
            .get(&id.instance)
    }

    pub(crate) fn instance_mut(&mut self, id: &MetricIdentity) -> Option<&mut PerfInstance> {
        self.objects
            .get_mut(&id.object)?
            .counters
            .get_mut(&id.counter)?
            .instances
            .get_mut(&id.instance)
    }

    /// Scale mode of the counter `id` belongs to.
    pub fn scale_of(&self, id: &MetricIdentity) -> Option<ScaleMode> {
        self.objects
            .get(&id.object)?
            .counters
            .get(&id.counter)
            .map(PerfCounter::scale)
    }

    /// Every registered leaf with its counter's scale mode, in iteration order.
    pub fn leaves(&self) -> Vec<(MetricIdentity, ScaleMode)> {
        let mut leaves = Vec::new();
        for object in self.objects.values() {
            for counter in object.counters.values() {
                for name in counter.instances.keys() {
                    leaves.push((
                        MetricIdentity {
                            object: object.name.clone(),
                            counter: counter.name.clone(),
                            instance: name.clone(),
                        },
                        counter.scale,
                    ));
                }
            }
        }
        leaves
    }

    /// Number of instance leaves.
    pub fn len(&self) -> usize {
        self.objects
            .values()
            .flat_map(|o| o.counters.values())
            .map(|c| c.instances.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}
