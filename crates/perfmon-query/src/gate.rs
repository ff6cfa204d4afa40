//! Log-once-per-failure-streak gate.

/// Decides whether a failure gets logged.
///
/// Starts `Armed`. The first failure fires the gate and suppresses the
/// rest of the streak; a success re-arms it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogGate {
    #[default]
    Armed,
    Suppressed,
}

impl LogGate {
    /// Record a failure. Returns true if this one should be logged.
    pub fn fire(&mut self) -> bool {
        match self {
            LogGate::Armed => {
                *self = LogGate::Suppressed;
                true
            }
            LogGate::Suppressed => false,
        }
    }

    /// Record a success.
    pub fn rearm(&mut self) {
        *self = LogGate::Armed;
    }

    pub fn is_armed(self) -> bool {
        self == LogGate::Armed
    }
}
