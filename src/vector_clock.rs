use crate::thread::{construct_thread_id, ThreadId};
use crate::{event::Event, indexed_map::IndexedMap};

use serde::{Deserialize, Serialize};

/// Per-thread replay progress: for each thread, the number of its events
/// already replayed (equivalently, the next position to replay).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(crate) struct VectorClock {
    clock: IndexedMap<u32>,
}

impl VectorClock {
    pub(crate) fn new() -> Self {
        Self {
            clock: IndexedMap::new(),
        }
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (ThreadId, u32)> + '_ {
        self.clock
            .enumerate()
            .map(|(tid, &n)| (construct_thread_id(tid as u32), n))
    }

    pub(crate) fn get(&self, i: ThreadId) -> Option<u32> {
        self.clock.get(usize::from(i)).copied()
    }

    // Populate tid with no replayed events yet
    pub(crate) fn set_tid(&mut self, tid: ThreadId) {
        self.clock.set(usize::from(tid), 0);
    }

    /// The next position to replay on `tid`.
    pub(crate) fn next_index(&self, tid: ThreadId) -> u32 {
        self.get(tid).unwrap_or(0)
    }

    /// Whether the event is below the replay frontier. The virtual
    /// initialization event is below every frontier.
    pub(crate) fn contains(&self, e: Event) -> bool {
        e.is_init() || self.get(e.thread).is_some_and(|n| e.index < n)
    }

    /// Record that `count` more events of `tid` have been replayed.
    pub(crate) fn advance(&mut self, tid: ThreadId, count: u32) {
        let cur = self.next_index(tid);
        self.clock.set(usize::from(tid), cur + count);
    }
}
