use crate::models::ProjectId;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Hands out millisecond timestamps as project ids, bumping past the last
/// issued value when two creations land in the same millisecond.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> ProjectId {
        let now = Utc::now().timestamp_millis();
        let mut current = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now.max(current + 1);
            match self
                .last
                .compare_exchange_weak(current, candidate, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return ProjectId(candidate),
                Err(observed) => current = observed,
            }
        }
    }

    /// Never issue an id at or below `floor`, e.g. the largest id already stored.
    pub fn observe(&self, floor: ProjectId) {
        self.last.fetch_max(floor.0, Ordering::AcqRel);
    }
}
