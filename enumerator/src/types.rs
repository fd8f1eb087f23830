use serde::{Deserialize, Serialize};

pub const DEFAULT_TAP_PREFIX: &str = "tpvm-";
pub const DEFAULT_BRIDGE_PREFIX: &str = "brvm-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Tap,
    Bridge,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Tap => write!(f, "tap"),
            DeviceKind::Bridge => write!(f, "bridge"),
        }
    }
}

/// Persisted enumerator state. Counters hold the last issued value, so a
/// fresh manifest starts at 0 and the first name carries suffix 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumeratorManifest {
    pub tap_prefix: String,
    pub bridge_prefix: String,
    pub tap_counter: u32,
    pub bridge_counter: u32,
}

impl Default for EnumeratorManifest {
    fn default() -> Self {
        Self {
            tap_prefix: DEFAULT_TAP_PREFIX.to_string(),
            bridge_prefix: DEFAULT_BRIDGE_PREFIX.to_string(),
            tap_counter: 0,
            bridge_counter: 0,
        }
    }
}

impl EnumeratorManifest {
    pub fn counter(&self, kind: DeviceKind) -> u32 {
        match kind {
            DeviceKind::Tap => self.tap_counter,
            DeviceKind::Bridge => self.bridge_counter,
        }
    }

    pub fn prefix(&self, kind: DeviceKind) -> &str {
        match kind {
            DeviceKind::Tap => &self.tap_prefix,
            DeviceKind::Bridge => &self.bridge_prefix,
        }
    }

    pub fn name(&self, kind: DeviceKind, number: u32) -> String {
        format!("{}{}", self.prefix(kind), number)
    }

    pub(crate) fn counter_mut(&mut self, kind: DeviceKind) -> &mut u32 {
        match kind {
            DeviceKind::Tap => &mut self.tap_counter,
            DeviceKind::Bridge => &mut self.bridge_counter,
        }
    }
}
