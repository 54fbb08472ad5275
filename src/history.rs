// =============================================================================
// History Cache — bounded FIFO of completed-day level sets
// =============================================================================
//
// The current day's set is held outside the queue and stays mutable until
// its day ends; archiving freezes it and trims the queue to the retention
// budget, oldest first. Single-writer, single-reader, no locking.
// =============================================================================

use std::collections::VecDeque;

use tracing::debug;

use crate::types::LevelSet;

/// Bounded FIFO of archived [`LevelSet`]s plus the mutable current-day set.
#[derive(Debug, Clone)]
pub struct HistoryCache {
    days_to_retain: usize,
    archived: VecDeque<LevelSet>,
    current: Option<LevelSet>,
}

impl HistoryCache {
    /// `days_to_retain` must be positive; the engine validates this at
    /// construction.
    pub fn new(days_to_retain: usize) -> Self {
        debug_assert!(days_to_retain > 0, "retention must be positive");
        Self {
            days_to_retain,
            archived: VecDeque::with_capacity(days_to_retain + 1),
            current: None,
        }
    }

    /// Install a fresh current-day set, replacing any existing one.
    pub fn set_current(&mut self, set: LevelSet) {
        self.current = Some(set);
    }

    pub fn current(&self) -> Option<&LevelSet> {
        self.current.as_ref()
    }

    /// Mutable access to the current set (the engine advances its end
    /// boundary as bars arrive).
    pub fn current_mut(&mut self) -> Option<&mut LevelSet> {
        self.current.as_mut()
    }

    /// Remove and return the current set, typically to archive it once its
    /// day has ended.
    pub fn take_current(&mut self) -> Option<LevelSet> {
        self.current.take()
    }

    /// Push a completed set into the archive, evicting the oldest entries
    /// beyond the retention budget.
    pub fn archive(&mut self, set: LevelSet) {
        self.archived.push_back(set);
        while self.archived.len() > self.days_to_retain {
            if let Some(evicted) = self.archived.pop_front() {
                debug!(day = %evicted.day, "level set evicted from history");
            }
        }
    }

    /// Archived sets, oldest to newest. Does not include the current set.
    pub fn all(&self) -> impl Iterator<Item = &LevelSet> {
        self.archived.iter()
    }

    pub fn oldest(&self) -> Option<&LevelSet> {
        self.archived.front()
    }

    pub fn newest(&self) -> Option<&LevelSet> {
        self.archived.back()
    }

    /// Number of archived sets.
    pub fn len(&self) -> usize {
        self.archived.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archived.is_empty()
    }
}
