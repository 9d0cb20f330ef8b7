use receipt_core::event::{EventKind, StatusEvent};
use tracing::warn;

/// Keeps delivered progress from going backwards within one job.
///
/// A regressing value is raised to the high-water mark. `error` events are
/// passed through with whatever progress the server sent.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    high_water: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn high_water(&self) -> u8 {
        self.high_water
    }

    pub fn observe(&mut self, event: &mut StatusEvent) {
        if event.kind == EventKind::Error {
            return;
        }
        if event.progress < self.high_water {
            warn!(
                kind = event.kind.as_str(),
                reported = event.progress,
                high_water = self.high_water,
                "progress went backwards, clamping"
            );
            event.progress = self.high_water;
        } else {
            self.high_water = event.progress;
        }
    }
}
