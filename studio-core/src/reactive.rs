//! Deferred invalidation.
//!
//! Updates only record what became stale. The owner drains the queue on its
//! next turn with [`Scheduler::take`], so a write never re-renders from inside
//! itself.

use std::sync::Mutex;

/// Something that makes the current render stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Invalidation {
    /// A whole document was loaded.
    Document,
    /// Instances were added, changed or removed.
    Instances,
    /// Prop bindings changed.
    Props,
    /// Data source declarations or values changed.
    DataSources,
    /// A component library was registered.
    Registry,
    /// A different page was selected.
    SelectedPage,
    /// Render mode changed.
    Mode,
}

/// Queue of pending invalidations, deduplicated, in first-seen order.
#[derive(Debug, Default)]
pub struct Scheduler {
    pending: Mutex<Vec<Invalidation>>,
}

impl Scheduler {
    /// Create an idle scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an invalidation. Returns `true` if the queue was idle, i.e. the
    /// caller should arrange a flush.
    pub fn schedule(&self, invalidation: Invalidation) -> bool {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let was_idle = pending.is_empty();
        if !pending.contains(&invalidation) {
            pending.push(invalidation);
        }
        was_idle
    }

    /// Drain everything pending.
    #[must_use]
    pub fn take(&self) -> Vec<Invalidation> {
        std::mem::take(
            &mut *self
                .pending
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_empty()
    }
}
