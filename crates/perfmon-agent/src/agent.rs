//! CounterMonitor — setup / execute / teardown over one counter session.
//!
//! The host calls `setup` once, `execute` once per monitoring interval,
//! and `teardown` when the monitor is removed. Each phase reports a
//! [`Status`]; partial and failed phases carry the diagnostics report.

use perfmon_core::{MetricIdentity, MetricRequest, MonitorConfig};
use perfmon_query::{CounterSource, CycleOutcome, PerformanceMonitor, SubscriptionRequest};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::status::{Status, StatusCode};

/// One measure's value from an `execute` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub name: String,
    pub identity: MetricIdentity,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteReport {
    pub status: Status,
    pub measurements: Vec<Measurement>,
}

impl ExecuteReport {
    fn failed(status: Status) -> Self {
        Self {
            status,
            measurements: Vec::new(),
        }
    }

    pub fn value_of(&self, measure: &str) -> Option<f64> {
        self.measurements
            .iter()
            .find(|m| m.name == measure)
            .map(|m| m.value)
    }
}

pub struct CounterMonitor<S> {
    config: MonitorConfig,
    /// Measure name and resolved request, in config order.
    requests: Vec<(String, MetricRequest)>,
    session: PerformanceMonitor<S>,
}

impl<S: CounterSource> CounterMonitor<S> {
    pub fn new(config: MonitorConfig, source: S) -> Self {
        let requests = config
            .measures
            .iter()
            .map(|m| (m.name.clone(), config.request_for(m)))
            .collect();
        Self {
            config,
            requests,
            session: PerformanceMonitor::new(source),
        }
    }

    /// Connect to the configured host and subscribe every measure.
    pub fn setup(&mut self) -> Status {
        let host = &self.config.host;
        if let Err(e) = self.session.connect(host, self.config.translation) {
            return Status::new(
                StatusCode::ErrorInfrastructure,
                "Connection problem",
                format!("Connecting to the host '{host}' caused exception: {e}"),
            );
        }

        let mut partial = false;
        for (name, request) in &self.requests {
            let subscription =
                SubscriptionRequest::for_identity(&request.identity, request.scale_mode());
            if let Err(e) = self.session.subscribe(&subscription) {
                partial = true;
                warn!(
                    measure = %name,
                    metric = %request.identity,
                    error = %e,
                    "registering of perfmon measure failed"
                );
            }
        }

        let errors = self.session.detailed_errors();
        info!(
            host = %self.session.host(),
            measures = self.requests.len(),
            registered = self.session.registry().len(),
            "perfmon monitor set up"
        );
        if partial || !errors.is_empty() {
            return Status::new(
                StatusCode::PartialSuccess,
                "Initializing performance queries caused errors",
                errors,
            );
        }
        Status::success()
    }

    /// Run one poll cycle and collect the configured measures.
    pub fn execute(&mut self) -> ExecuteReport {
        let requests: Vec<MetricRequest> = self.requests.iter().map(|(_, r)| r.clone()).collect();
        let report = match self.session.run_poll_cycle(&requests) {
            Ok(report) => report,
            Err(e) => {
                return ExecuteReport::failed(Status::new(
                    StatusCode::ErrorInternal,
                    "Executing performance query failed with exception",
                    format!("Executing performance query failed with exception: {e}"),
                ));
            }
        };

        let mut measurements = Vec::with_capacity(report.values.len());
        for (name, request) in &self.requests {
            if let Some(value) = report.value_of(&request.identity) {
                debug!(measure = %name, value, "measurement");
                measurements.push(Measurement {
                    name: name.clone(),
                    identity: request.identity.clone(),
                    value,
                });
            }
        }

        let status = match report.outcome {
            CycleOutcome::Success => Status::success(),
            CycleOutcome::PartialFailure => Status::new(
                StatusCode::PartialSuccess,
                "Executing some performance queries caused errors",
                self.session.detailed_errors(),
            ),
            CycleOutcome::AllFailed => Status::new(
                StatusCode::ErrorInternal,
                "Executing all performance queries caused errors",
                self.session.detailed_errors(),
            ),
        };
        ExecuteReport {
            status,
            measurements,
        }
    }

    /// Clear the query and disconnect. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if !self.session.is_connected() {
            return;
        }
        if let Err(e) = self.session.clear_query() {
            warn!(error = %e, "failed to clear performance query");
        }
        self.session.disconnect();
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn session(&self) -> &PerformanceMonitor<S> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut PerformanceMonitor<S> {
        &mut self.session
    }
}
