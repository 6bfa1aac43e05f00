//! Process-wide tracing setup shared by every binary.

pub mod tracing;

/// Install the JSON log subscriber. Later calls are no-ops.
pub fn init() {
    tracing::init();
}
