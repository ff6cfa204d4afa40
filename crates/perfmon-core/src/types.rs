//! Shared types used across perfmon crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Label used for counters without an instance dimension.
pub const ALL_INSTANCES: &str = "all instances";

/// Identifies one counter sample: object, counter, and optional instance.
///
/// `instance == None` means the counter has no instance dimension.
/// Ordering is by the exact string triple, so identities can key both
/// the registry lookups and the poll result maps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetricIdentity {
    pub object: String,
    pub counter: String,
    pub instance: Option<String>,
}

impl MetricIdentity {
    pub fn new(object: &str, counter: &str, instance: Option<&str>) -> Self {
        Self {
            object: object.to_string(),
            counter: counter.to_string(),
            instance: instance.map(str::to_string),
        }
    }

    /// Instance name, or [`ALL_INSTANCES`] for singleton counters.
    pub fn instance_label(&self) -> &str {
        self.instance.as_deref().unwrap_or(ALL_INSTANCES)
    }
}

impl fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}({})", self.object, self.counter, self.instance_label())
    }
}

/// Reporting convention of a counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScaleMode {
    /// Raw value is reported as-is.
    #[default]
    NoScale,
    /// Raw value is pre-multiplied by 1000.
    Scale1000,
}

impl ScaleMode {
    /// Native format flag passed to the provider with each sample request.
    pub fn format_flag(self) -> u32 {
        match self {
            ScaleMode::NoScale => 0x0000_1400,
            ScaleMode::Scale1000 => 0x0000_2400,
        }
    }

    /// Scale mode requested by a measure's `scale` parameter.
    ///
    /// Only the literal `"1000"` selects [`ScaleMode::Scale1000`].
    pub fn from_hint(hint: Option<&str>) -> Self {
        if hint == Some(SCALE_HINT_1000) {
            ScaleMode::Scale1000
        } else {
            ScaleMode::NoScale
        }
    }
}

/// The only scale hint value with a meaning.
pub const SCALE_HINT_1000: &str = "1000";

/// A metric the caller wants a value for in a poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRequest {
    pub identity: MetricIdentity,
    /// The measure's raw `scale` parameter, if any.
    pub scale_hint: Option<String>,
}

impl MetricRequest {
    pub fn new(identity: MetricIdentity, scale_hint: Option<&str>) -> Self {
        Self {
            identity,
            scale_hint: scale_hint.map(str::to_string),
        }
    }

    /// Scale mode used when this request has to (re-)subscribe its metric.
    pub fn scale_mode(&self) -> ScaleMode {
        ScaleMode::from_hint(self.scale_hint.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_display_uses_all_instances_label() {
        let id = MetricIdentity::new("Memory", "Available MBytes", None);
        assert_eq!(id.to_string(), "Memory/Available MBytes(all instances)");

        let id = MetricIdentity::new("Processor", "% Processor Time", Some("_Total"));
        assert_eq!(id.instance_label(), "_Total");
    }

    #[test]
    fn identity_orders_by_string_triple() {
        let a = MetricIdentity::new("A", "x", Some("1"));
        let b = MetricIdentity::new("A", "x", Some("2"));
        let c = MetricIdentity::new("B", "a", None);
        let none = MetricIdentity::new("A", "x", None);
        assert!(a < b);
        assert!(b < c);
        assert!(none < a);
    }

    #[test]
    fn scale_hint_is_exact_match() {
        assert_eq!(ScaleMode::from_hint(Some("1000")), ScaleMode::Scale1000);
        assert_eq!(ScaleMode::from_hint(Some("1000.0")), ScaleMode::NoScale);
        assert_eq!(ScaleMode::from_hint(Some(" 1000")), ScaleMode::NoScale);
        assert_eq!(ScaleMode::from_hint(None), ScaleMode::NoScale);
    }

    #[test]
    fn format_flags_match_provider_constants() {
        assert_eq!(ScaleMode::NoScale.format_flag(), 0x1400);
        assert_eq!(ScaleMode::Scale1000.format_flag(), 0x2400);
    }
}
