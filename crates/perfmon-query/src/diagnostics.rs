//! Detailed error report over the query registry.

use std::fmt::Write;

use perfmon_core::ALL_INSTANCES;

use crate::registry::QueryRegistry;

/// Render every instance with a recorded error, grouped by object and
/// counter. Nodes without errors are skipped; a healthy registry renders
/// as an empty string.
///
/// ```text
/// LogicalDisk
///   % Free Space
///     Z::instance not found
/// ```
pub fn detailed_error_report(registry: &QueryRegistry) -> String {
    let mut report = String::new();
    for object in registry.objects().filter(|o| o.error_occurred()) {
        let _ = writeln!(report, "{}", object.name());
        for counter in object.counters().filter(|c| c.error_occurred()) {
            let _ = writeln!(report, "  {}", counter.name());
            for instance in counter.instances() {
                if let Some(error) = instance.last_error() {
                    let name = instance.name().unwrap_or(ALL_INSTANCES);
                    let _ = writeln!(report, "    {name}:{error}");
                }
            }
        }
    }
    report
}
