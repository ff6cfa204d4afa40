//! perfmon.toml configuration parser.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::types::{MetricIdentity, MetricRequest};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub host: String,
    #[serde(default)]
    pub translation: bool,
    pub interval: Option<String>,
    pub sql_server: Option<SqlServerConfig>,
    #[serde(rename = "measure", default)]
    pub measures: Vec<MeasureConfig>,
}

/// Enables the SQL Server object-name prefix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlServerConfig {
    /// Named instance; empty or absent means the default instance.
    pub instance: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureConfig {
    pub name: String,
    pub object: String,
    pub counter: String,
    pub instance: Option<String>,
    pub scale: Option<String>,
}

impl MonitorConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: MonitorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.trim().is_empty() {
            bail!("host must not be empty");
        }
        if let Some(interval) = &self.interval {
            match parse_duration(interval) {
                None => bail!("invalid interval: {interval:?}"),
                Some(d) if d.is_zero() => bail!("interval must be greater than zero"),
                Some(_) => {}
            }
        }
        let mut names = HashSet::new();
        for measure in &self.measures {
            if measure.object.is_empty() || measure.counter.is_empty() {
                bail!("measure {:?} needs both object and counter", measure.name);
            }
            if !names.insert(measure.name.as_str()) {
                bail!("duplicate measure name: {:?}", measure.name);
            }
        }
        Ok(())
    }

    /// Prefix prepended to every configured object name.
    ///
    /// SQL Server publishes its objects as `SQLServer:<object>` for the
    /// default instance and `MSSQL$<INSTANCE>:<object>` for named ones.
    pub fn object_prefix(&self) -> String {
        match &self.sql_server {
            None => String::new(),
            Some(sql) => match sql.instance.as_deref().map(str::trim) {
                None | Some("") => "SQLServer:".to_string(),
                Some(name) => format!("MSSQL${}:", name.to_uppercase()),
            },
        }
    }

    /// Resolve a measure to the identity it is registered under.
    pub fn identity_for(&self, measure: &MeasureConfig) -> MetricIdentity {
        let object = format!("{}{}", self.object_prefix(), measure.object);
        let instance = measure.instance.as_deref().filter(|i| !i.is_empty());
        MetricIdentity::new(&object, &measure.counter, instance)
    }

    pub fn request_for(&self, measure: &MeasureConfig) -> MetricRequest {
        MetricRequest::new(self.identity_for(measure), measure.scale.as_deref())
    }

    /// Poll interval, defaulting to 10s.
    pub fn poll_interval(&self) -> Duration {
        self.interval
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_INTERVAL)
    }
}

/// Parse an interval like "500ms", "5s", or "2m". A bare number is seconds.
///
/// Returns `None` for unknown units and for values that overflow.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(n)),
        "" | "s" => Some(Duration::from_secs(n)),
        "m" => n.checked_mul(60).map(Duration::from_secs),
        _ => None,
    }
}
