//! An event position in a recorded execution.

use crate::thread::{init_thread_id, ThreadId};
use serde::{Deserialize, Serialize};

/// Identifies a single event: a thread and a 0-based position within that
/// thread's event sequence. The label itself lives in the execution store.
#[derive(PartialEq, Copy, Clone, Debug, Hash, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Event {
    pub(crate) thread: ThreadId,
    pub(crate) index: u32,
}

impl Event {
    pub(crate) fn new(t: ThreadId, i: u32) -> Self {
        Self {
            thread: t,
            index: i,
        }
    }

    /// The virtual initialization event, root of every execution. It lives
    /// outside all thread sequences on a reserved pseudo-thread.
    pub fn init() -> Self {
        Self::new(init_thread_id(), 0)
    }

    pub fn is_init(&self) -> bool {
        self.thread == init_thread_id()
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn prev(&self) -> Self {
        Self {
            thread: self.thread,
            index: self.index - 1,
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_init() {
            write!(f, "(init)")
        } else {
            write!(f, "({}, {})", self.thread, self.index)
        }
    }
}
