//! Poll cycle regression tests.
//!
//! Drives full sessions against the scripted source: subscription,
//! normalization, outcome classification, log suppression, and the
//! diagnostics report.

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

use perfmon_core::{MetricIdentity, MetricRequest, ScaleMode};
use perfmon_query::*;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with WARN-level logs captured.
fn with_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, logs.contents())
}

/// Answers each `sample` call for a counter from a fixed sequence,
/// repeating the last entry once the rest are used up.
#[derive(Default)]
struct SequencedSource {
    sequences: BTreeMap<MetricIdentity, VecDeque<Sample>>,
}

impl SequencedSource {
    fn with_sequence(mut self, id: MetricIdentity, samples: &[Sample]) -> Self {
        self.sequences.insert(id, samples.iter().cloned().collect());
        self
    }
}

impl CounterSource for SequencedSource {
    fn connect(&mut self, _host: &str, _translate: bool) -> Result<ConnectionHandle, SourceError> {
        Ok(ConnectionHandle::new(1))
    }

    fn disconnect(&mut self, _handle: ConnectionHandle) -> Result<(), SourceError> {
        Ok(())
    }

    fn clear_all(&mut self, _handle: &ConnectionHandle) -> Result<bool, SourceError> {
        Ok(true)
    }

    fn sample(
        &mut self,
        _handle: &ConnectionHandle,
        _host: &str,
        identity: &MetricIdentity,
        _scale: ScaleMode,
    ) -> Result<Sample, SourceError> {
        let Some(queue) = self.sequences.get_mut(identity) else {
            return Ok(Sample::Failure("counter not found".into()));
        };
        let sample = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(sample.unwrap_or(Sample::Transient))
    }

    fn resample(&mut self, _handle: &ConnectionHandle) -> Result<bool, SourceError> {
        Ok(true)
    }
}

fn cpu() -> MetricIdentity {
    MetricIdentity::new("Processor", "% Processor Time", Some("_Total"))
}

fn memory() -> MetricIdentity {
    MetricIdentity::new("Memory", "Available MBytes", None)
}

fn disk() -> MetricIdentity {
    MetricIdentity::new("LogicalDisk", "% Free Space", Some("Z:"))
}

fn session(source: ScriptedSource) -> PerformanceMonitor<ScriptedSource> {
    let mut monitor = PerformanceMonitor::new(source);
    monitor.connect("db01", false).unwrap();
    monitor
}

#[test]
fn no_scale_value_is_reported_as_is() {
    let mut monitor = session(ScriptedSource::new().with_counter(cpu(), CounterScript::values(&[4500])));
    monitor
        .subscribe(&SubscriptionRequest::for_identity(&cpu(), ScaleMode::NoScale))
        .unwrap();

    let report = monitor.run_poll_cycle(&[MetricRequest::new(cpu(), None)]).unwrap();
    assert_eq!(report.value_of(&cpu()), Some(4500.0));
    assert_eq!(report.outcome, CycleOutcome::Success);
}

#[test]
fn scale_1000_counter_is_divided() {
    let mut monitor = session(ScriptedSource::new().with_counter(cpu(), CounterScript::values(&[4500])));
    monitor
        .subscribe(&SubscriptionRequest::for_identity(&cpu(), ScaleMode::Scale1000))
        .unwrap();

    let report = monitor.run_poll_cycle(&[MetricRequest::new(cpu(), None)]).unwrap();
    assert_eq!(report.value_of(&cpu()), Some(4.5));
}

#[test]
fn scale_hint_overrides_no_scale_metadata() {
    let mut monitor = session(ScriptedSource::new().with_counter(disk(), CounterScript::values(&[73250])));
    monitor
        .subscribe(&SubscriptionRequest::for_identity(&disk(), ScaleMode::NoScale))
        .unwrap();

    let report = monitor
        .run_poll_cycle(&[MetricRequest::new(disk(), Some("1000"))])
        .unwrap();
    assert_eq!(report.value_of(&disk()), Some(73.25));
}

#[test]
fn outcome_classification_over_real_cycles() {
    let source = ScriptedSource::new()
        .with_counter(cpu(), CounterScript::values(&[1]))
        .with_counter(memory(), CounterScript::values(&[2]))
        .with_counter(disk(), CounterScript::values(&[3]));
    let mut monitor = session(source);
    let all = [
        MetricRequest::new(cpu(), None),
        MetricRequest::new(memory(), None),
        MetricRequest::new(disk(), None),
    ];

    let report = monitor.run_poll_cycle(&[]).unwrap();
    assert_eq!(report.outcome, CycleOutcome::Success);

    let report = monitor.run_poll_cycle(&all).unwrap();
    assert_eq!(report.outcome, CycleOutcome::Success);
    assert_eq!(report.values.len(), 3);

    monitor.source_mut().set_script(memory(), CounterScript::failing("gone"));
    monitor.source_mut().set_script(disk(), CounterScript::failing("gone"));
    let report = monitor.run_poll_cycle(&all).unwrap();
    assert_eq!(report.outcome, CycleOutcome::PartialFailure);
    assert_eq!(report.failed, vec![memory(), disk()]);

    monitor.source_mut().set_script(cpu(), CounterScript::failing("gone"));
    let report = monitor.run_poll_cycle(&all).unwrap();
    assert_eq!(report.outcome, CycleOutcome::AllFailed);
    assert!(report.values.is_empty());
}

#[test]
fn repeated_failures_log_once_per_streak() {
    let mut monitor = session(ScriptedSource::new().with_counter(disk(), CounterScript::values(&[10])));
    let requests = [MetricRequest::new(disk(), None)];
    monitor.run_poll_cycle(&requests).unwrap();

    monitor
        .source_mut()
        .set_script(disk(), CounterScript::failing("instance not found"));
    let (_, logs) = with_logs(|| {
        for _ in 0..3 {
            monitor.run_poll_cycle(&requests).unwrap();
        }
    });
    assert_eq!(logs.matches("failed to retrieve value").count(), 1, "{logs}");
    assert!(!monitor.registry().instance(&disk()).unwrap().log_gate().is_armed());

    // A success re-arms the gate; the next streak logs once more.
    monitor.source_mut().set_script(disk(), CounterScript::values(&[10]));
    let report = monitor.run_poll_cycle(&requests).unwrap();
    assert_eq!(report.outcome, CycleOutcome::Success);
    let instance = monitor.registry().instance(&disk()).unwrap();
    assert!(instance.log_gate().is_armed());
    assert!(instance.is_initialized());
    assert_eq!(instance.last_error(), None);

    monitor
        .source_mut()
        .set_script(disk(), CounterScript::failing("instance not found"));
    let (_, logs) = with_logs(|| {
        monitor.run_poll_cycle(&requests).unwrap();
        monitor.run_poll_cycle(&requests).unwrap();
    });
    assert_eq!(logs.matches("failed to retrieve value").count(), 1, "{logs}");
}

#[test]
fn successful_reprime_does_not_rearm_the_gate() {
    // Every prime opens the counter, every fetch fails.
    let mut samples = Vec::new();
    for _ in 0..5 {
        samples.push(Sample::Value(1));
        samples.push(Sample::Failure("no sample".into()));
    }
    let mut monitor = PerformanceMonitor::new(SequencedSource::default().with_sequence(cpu(), &samples));
    monitor.connect("db01", false).unwrap();
    monitor
        .subscribe(&SubscriptionRequest::for_identity(&cpu(), ScaleMode::NoScale))
        .unwrap();

    let requests = [MetricRequest::new(cpu(), None)];
    let (outcomes, logs) = with_logs(|| {
        (0..4)
            .map(|_| monitor.run_poll_cycle(&requests).unwrap().outcome)
            .collect::<Vec<_>>()
    });
    assert_eq!(outcomes, vec![CycleOutcome::AllFailed; 4]);
    assert_eq!(logs.matches("WARN").count(), 1, "{logs}");
    assert!(logs.contains("failed to retrieve value"));
    assert!(!monitor.registry().instance(&cpu()).unwrap().log_gate().is_armed());
}

#[test]
fn missing_measurement_with_error_warns_once() {
    // The prime fails and every later sample is transient, so the fetch
    // loop never logs the recorded error itself.
    let source = SequencedSource::default().with_sequence(
        disk(),
        &[Sample::Failure("access denied".into()), Sample::Transient],
    );
    let mut monitor = PerformanceMonitor::new(source);
    monitor.connect("db01", false).unwrap();
    monitor
        .subscribe(&SubscriptionRequest::for_identity(&disk(), ScaleMode::NoScale))
        .unwrap();

    let requests = [MetricRequest::new(disk(), None)];
    let (_, logs) = with_logs(|| {
        for _ in 0..3 {
            let report = monitor.run_poll_cycle(&requests).unwrap();
            assert_eq!(report.failed, vec![disk()]);
        }
    });
    assert_eq!(logs.matches("failed to retrieve measurement").count(), 1, "{logs}");
    assert!(logs.contains("access denied"));
    assert_eq!(monitor.registry().instance(&disk()).unwrap().last_error(), Some("access denied"));
}

#[test]
fn transient_samples_are_silent_and_not_errors() {
    // Prime and the first fetch both land in the warm-up window.
    let source = ScriptedSource::new().with_counter(cpu(), CounterScript::values(&[4500]).with_warmup(3));
    let mut monitor = session(source);

    let (subscribed, logs) = with_logs(|| {
        monitor
            .subscribe(&SubscriptionRequest::for_identity(&cpu(), ScaleMode::NoScale))
            .map(|_| ())
    });
    assert!(subscribed.is_ok());
    assert!(logs.is_empty(), "{logs}");
    assert!(!monitor.registry().instance(&cpu()).unwrap().is_initialized());

    let requests = [MetricRequest::new(cpu(), None)];
    let (report, logs) = with_logs(|| monitor.run_poll_cycle(&requests).unwrap());
    assert!(logs.is_empty(), "{logs}");
    assert_eq!(report.failed, vec![cpu()]);
    let instance = monitor.registry().instance(&cpu()).unwrap();
    assert_eq!(instance.last_error(), None);
    assert!(instance.log_gate().is_armed());
    assert_eq!(monitor.detailed_errors(), "");

    let report = monitor.run_poll_cycle(&requests).unwrap();
    assert_eq!(report.value_of(&cpu()), Some(4500.0));
    assert!(monitor.registry().instance(&cpu()).unwrap().is_initialized());
}

#[test]
fn resample_failure_fails_whole_cycle() {
    let mut monitor = session(ScriptedSource::new().with_counter(cpu(), CounterScript::values(&[1])));
    monitor
        .subscribe(&SubscriptionRequest::for_identity(&cpu(), ScaleMode::NoScale))
        .unwrap();
    monitor.source_mut().fail_resample(true);

    let err = monitor
        .run_poll_cycle(&[MetricRequest::new(cpu(), None)])
        .unwrap_err();
    assert!(matches!(err, PerfmonError::Resample));
    // Only the subscription prime reached the source.
    assert_eq!(monitor.source().sample_calls(&cpu()), 1);
}

#[test]
fn unrequested_registry_entries_are_still_fetched() {
    let source = ScriptedSource::new()
        .with_counter(cpu(), CounterScript::values(&[1]))
        .with_counter(memory(), CounterScript::values(&[2048]));
    let mut monitor = session(source);
    monitor
        .subscribe(&SubscriptionRequest::for_identity(&memory(), ScaleMode::NoScale))
        .unwrap();

    let report = monitor.run_poll_cycle(&[MetricRequest::new(cpu(), None)]).unwrap();
    assert_eq!(report.values.len(), 1);
    assert_eq!(report.value_of(&memory()), None);
    // One prime at subscribe, one fetch in the cycle.
    assert_eq!(monitor.source().sample_calls(&memory()), 2);
}

#[test]
fn missing_metric_is_subscribed_lazily_with_hint_scale() {
    let mut monitor = session(ScriptedSource::new().with_counter(cpu(), CounterScript::values(&[4500])));

    let report = monitor
        .run_poll_cycle(&[MetricRequest::new(cpu(), Some("1000"))])
        .unwrap();
    assert_eq!(report.value_of(&cpu()), Some(4.5));
    assert_eq!(monitor.registry().scale_of(&cpu()), Some(ScaleMode::Scale1000));

    monitor.run_poll_cycle(&[MetricRequest::new(cpu(), Some("1000"))]).unwrap();
    assert_eq!(monitor.registry().len(), 1);
}

#[test]
fn failed_instance_recovers_on_later_cycle() {
    let mut monitor = session(ScriptedSource::new().with_counter(disk(), CounterScript::failing("access denied")));
    monitor
        .subscribe(&SubscriptionRequest::for_identity(&disk(), ScaleMode::NoScale))
        .unwrap();
    let requests = [MetricRequest::new(disk(), None)];

    let report = monitor.run_poll_cycle(&requests).unwrap();
    assert_eq!(report.outcome, CycleOutcome::AllFailed);
    // Re-prime in step 2, fetch in step 3, on top of the subscription prime.
    assert_eq!(monitor.source().sample_calls(&disk()), 3);

    monitor.source_mut().set_script(disk(), CounterScript::values(&[50]));
    let report = monitor.run_poll_cycle(&requests).unwrap();
    assert_eq!(report.outcome, CycleOutcome::Success);
    assert_eq!(report.value_of(&disk()), Some(50.0));
    assert_eq!(monitor.detailed_errors(), "");
}

#[test]
fn diagnostics_report_lists_only_failing_nodes() {
    let all_disks = MetricIdentity::new("LogicalDisk", "Disk Reads/sec", None);
    let source = ScriptedSource::new()
        .with_counter(cpu(), CounterScript::values(&[1]))
        .with_counter(disk(), CounterScript::failing("instance not found"))
        .with_counter(all_disks.clone(), CounterScript::failing("access denied"));
    let mut monitor = session(source);
    for id in [cpu(), disk(), all_disks] {
        monitor
            .subscribe(&SubscriptionRequest::for_identity(&id, ScaleMode::NoScale))
            .unwrap();
    }

    let report = monitor.detailed_errors();
    assert_eq!(
        report,
        "LogicalDisk\n  % Free Space\n    Z::instance not found\n  Disk Reads/sec\n    all instances:access denied\n"
    );
    assert!(!report.contains("Processor"));
}

#[test]
fn healthy_registry_has_empty_report() {
    let mut monitor = session(ScriptedSource::new().with_counter(cpu(), CounterScript::values(&[1])));
    monitor
        .subscribe(&SubscriptionRequest::for_identity(&cpu(), ScaleMode::NoScale))
        .unwrap();
    monitor.run_poll_cycle(&[MetricRequest::new(cpu(), None)]).unwrap();
    assert_eq!(monitor.detailed_errors(), "");
}

#[test]
fn poll_report_serializes_to_json() {
    let mut monitor = session(ScriptedSource::new().with_counter(cpu(), CounterScript::values(&[4500])));
    let report = monitor
        .run_poll_cycle(&[MetricRequest::new(cpu(), Some("1000"))])
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"], "Success");
    assert_eq!(json["values"][0]["value"], 4.5);
    assert_eq!(json["values"][0]["identity"]["instance"], "_Total");
}
