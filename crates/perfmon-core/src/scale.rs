//! Scale normalizer for raw counter values.

use crate::types::{ScaleMode, SCALE_HINT_1000};

/// Map a raw provider sample to the value reported for a measure.
///
/// Divides by 1000 when the counter is registered as [`ScaleMode::Scale1000`]
/// or when the measure's own scale hint is `"1000"`. Some providers report
/// `NoScale` metadata for counters that still deliver 1000× values (free
/// disk percentage, for one), so the hint wins over the metadata.
pub fn normalize(raw: i64, mode: ScaleMode, scale_hint: Option<&str>) -> f64 {
    let value = raw as f64;
    if mode == ScaleMode::Scale1000 || scale_hint == Some(SCALE_HINT_1000) {
        value / 1000.0
    } else {
        value
    }
}
