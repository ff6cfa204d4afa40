//! Poll engine — one synchronous resample-then-fetch-all cycle.

use perfmon_core::{normalize, MetricIdentity, MetricRequest};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::PerfmonResult;
use crate::registry::SubscriptionRequest;
use crate::session::PerformanceMonitor;
use crate::source::CounterSource;

/// Classification of a poll cycle by how many requested metrics resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleOutcome {
    Success,
    PartialFailure,
    AllFailed,
}

impl CycleOutcome {
    /// Classify `resolved` values out of `requested` metrics.
    pub fn classify(requested: usize, resolved: usize) -> Self {
        if requested == 0 || resolved == requested {
            CycleOutcome::Success
        } else if resolved == 0 {
            CycleOutcome::AllFailed
        } else {
            CycleOutcome::PartialFailure
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
    pub identity: MetricIdentity,
    pub value: f64,
}

/// Values and outcome of one poll cycle.
#[derive(Debug, Clone, Serialize)]
pub struct PollReport {
    /// Normalized values, in request order.
    pub values: Vec<MetricValue>,
    /// Requested metrics that produced no value.
    pub failed: Vec<MetricIdentity>,
    pub outcome: CycleOutcome,
}

impl PollReport {
    pub fn value_of(&self, id: &MetricIdentity) -> Option<f64> {
        self.values
            .iter()
            .find(|v| &v.identity == id)
            .map(|v| v.value)
    }
}

impl<S: CounterSource> PerformanceMonitor<S> {
    /// Run one poll cycle for `requests`.
    ///
    /// Only a failed resample (or a lost session) fails the cycle. Every
    /// other problem is confined to the metric it affects and shows up in
    /// [`PollReport::failed`].
    pub fn run_poll_cycle(&mut self, requests: &[MetricRequest]) -> PerfmonResult<PollReport> {
        self.resample()?;

        for request in requests {
            self.ensure_subscribed(request);
        }

        let readings = self.fetch_all()?;

        let mut values = Vec::with_capacity(requests.len());
        let mut failed = Vec::new();
        for request in requests {
            let id = &request.identity;
            match readings.get(id) {
                Some(reading) => values.push(MetricValue {
                    identity: id.clone(),
                    value: normalize(reading.raw, reading.scale, request.scale_hint.as_deref()),
                }),
                None => {
                    // Shares the instance's gate with the fetch loop, so a
                    // streak logs once across both.
                    let gated_error = self.registry_mut().instance_mut(id).and_then(|instance| {
                        let error = instance.last_error()?.to_string();
                        instance.fire_gate().then_some(error)
                    });
                    match gated_error {
                        Some(error) => {
                            warn!(metric = %id, %error, "failed to retrieve measurement");
                        }
                        None => debug!(metric = %id, "no measurement this cycle"),
                    }
                    failed.push(id.clone());
                }
            }
        }

        let outcome = CycleOutcome::classify(requests.len(), values.len());
        debug!(
            requested = requests.len(),
            resolved = values.len(),
            registered = self.registry().len(),
            ?outcome,
            "poll cycle complete"
        );
        Ok(PollReport {
            values,
            failed,
            outcome,
        })
    }

    /// Subscribe a requested metric that is missing, or re-prime one that
    /// is registered but not initialized.
    fn ensure_subscribed(&mut self, request: &MetricRequest) {
        let id = &request.identity;
        let initialized = self.registry().instance(id).map(|i| i.is_initialized());
        let result = match initialized {
            Some(true) => return,
            Some(false) => self.reprime(id),
            None => self
                .subscribe(&SubscriptionRequest::for_identity(id, request.scale_mode()))
                .map(|_| ()),
        };

        if let Err(e) = result {
            let should_log = self
                .registry_mut()
                .instance_mut(id)
                .map_or(true, |instance| instance.fire_gate());
            if should_log {
                warn!(metric = %id, error = %e, "query of perfmon measure failed");
            }
        }
    }
}
