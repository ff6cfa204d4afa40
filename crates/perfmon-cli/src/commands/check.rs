use std::io::Write;
use std::path::Path;

use perfmon_core::MonitorConfig;

/// Validate a monitor config and print what each measure resolves to.
pub fn check(path: &str) -> anyhow::Result<()> {
    let config = MonitorConfig::from_file(Path::new(path))?;
    write_summary(&mut std::io::stdout(), &config)
}

fn write_summary(out: &mut impl Write, config: &MonitorConfig) -> anyhow::Result<()> {
    writeln!(out, "host: {}", config.host)?;
    writeln!(out, "interval: {:?}", config.poll_interval())?;
    writeln!(out, "measures: {}", config.measures.len())?;
    for measure in &config.measures {
        let request = config.request_for(measure);
        write!(out, "  {} → {}", measure.name, request.identity)?;
        if let Some(scale) = &request.scale_hint {
            write!(out, " [scale {scale}]")?;
        }
        writeln!(out)?;
    }
    Ok(())
}
