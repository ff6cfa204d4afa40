//! `perfmon poll` — run poll cycles against a replayed counter source.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::bail;
use perfmon_agent::{CounterMonitor, ExecuteReport, Status};
use perfmon_core::MonitorConfig;
use perfmon_query::{CounterSource, ScriptedSource};
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

pub fn poll(config_path: &str, replay_path: &str, cycles: u64, format: &str) -> anyhow::Result<()> {
    let config = MonitorConfig::from_file(Path::new(config_path))?;
    let source = ScriptedSource::from_replay_file(Path::new(replay_path))?;
    let interval = config.poll_interval();
    let mut monitor = CounterMonitor::new(config, source);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(true);
            }
        });
        run_cycles(
            &mut monitor,
            interval,
            cycles,
            format,
            shutdown_rx,
            &mut std::io::stdout(),
        )
        .await
    })
}

/// Set up, run `cycles` poll cycles (0 = until shutdown), and tear down.
pub async fn run_cycles<S: CounterSource>(
    monitor: &mut CounterMonitor<S>,
    interval: Duration,
    cycles: u64,
    format: &str,
    mut shutdown: watch::Receiver<bool>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let status = monitor.setup();
    write_status(out, format, "setup", &status)?;
    if status.code.is_error() {
        monitor.teardown();
        bail!("setup failed: {status}");
    }

    info!(interval_ms = interval.as_millis() as u64, cycles, "poll loop started");
    let mut cycle = 0u64;
    loop {
        cycle += 1;
        let report = monitor.execute();
        write_report(out, format, cycle, &report)?;

        if cycles != 0 && cycle >= cycles {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            Ok(()) = shutdown.changed() => {
                info!(cycle, "poll loop interrupted");
                break;
            }
        }
    }

    monitor.teardown();
    Ok(())
}

fn write_status(out: &mut impl Write, format: &str, phase: &str, status: &Status) -> anyhow::Result<()> {
    match format {
        "json" => {
            writeln!(out, "{}", json!({ "phase": phase, "status": status }))?;
        }
        _ => {
            writeln!(out, "{phase}: {status}")?;
            write_detail(out, status)?;
        }
    }
    Ok(())
}

fn write_report(out: &mut impl Write, format: &str, cycle: u64, report: &ExecuteReport) -> anyhow::Result<()> {
    match format {
        "json" => {
            writeln!(
                out,
                "{}",
                json!({
                    "cycle": cycle,
                    "status": report.status,
                    "measurements": report.measurements,
                })
            )?;
        }
        _ => {
            writeln!(out, "cycle {cycle}: {}", report.status)?;
            for m in &report.measurements {
                writeln!(out, "  {} = {}", m.name, m.value)?;
            }
            write_detail(out, &report.status)?;
        }
    }
    Ok(())
}

fn write_detail(out: &mut impl Write, status: &Status) -> anyhow::Result<()> {
    if let Some(detail) = status.detail.as_deref().filter(|d| !d.is_empty()) {
        for line in detail.lines() {
            writeln!(out, "  | {line}")?;
        }
    }
    Ok(())
}
