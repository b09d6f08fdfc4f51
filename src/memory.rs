//! Sequentially consistent memory snapshots.
//!
//! A tracker models the single global memory after some prefix of a
//! total order: one current value per location, no per-thread views, no
//! reordering buffers. The checker clones a tracker whenever the replay
//! search branches.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::event_label::LabelEnum;
use crate::loc::Loc;
use crate::thread::ThreadId;
use crate::value::{Val, ValueClass};

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MemoryTracker {
    cells: HashMap<Loc, Val>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self {
            cells: HashMap::new(),
        }
    }

    /// The current value at `loc`, or the class default when the
    /// location has never been written.
    ///
    /// Thread ids are accepted throughout for future relaxations; under
    /// sequential consistency memory is global and they are unused.
    pub fn read_value(&self, _tid: ThreadId, loc: &Loc, class: &ValueClass) -> Val {
        self.cells
            .get(loc)
            .cloned()
            .unwrap_or_else(|| class.default_value())
    }

    pub fn write_value(&mut self, _tid: ThreadId, loc: Loc, value: Val) {
        self.cells.insert(loc, value);
    }

    /// Atomically installs `new` at `loc` when the current value equals
    /// `expected`. Returns whether the exchange took place.
    pub fn compare_and_set(
        &mut self,
        tid: ThreadId,
        loc: &Loc,
        expected: &Val,
        new: Val,
        class: &ValueClass,
    ) -> bool {
        if &self.read_value(tid, loc, class) == expected {
            self.write_value(tid, loc.clone(), new);
            true
        } else {
            false
        }
    }

    /// Deep clone for branching during the replay search.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Advances this snapshot past a total label, or reports that the
    /// label contradicts memory: a read total must see the stored value,
    /// a write stores, an atomic update exchanges, and everything else
    /// (thread events, mutex events, the initialization) is identity.
    pub(crate) fn replay_label(&mut self, lab: &LabelEnum) -> bool {
        let tid = lab.thread();
        match lab {
            LabelEnum::ReadAccess(r) => match r.value() {
                Some(v) => &self.read_value(tid, r.loc(), r.class()) == v,
                // A request that never got its response observes nothing.
                None => true,
            },
            LabelEnum::WriteAccess(w) => {
                self.write_value(tid, w.loc().clone(), w.value().clone());
                true
            }
            LabelEnum::ReadModifyWrite(u) => {
                let expected = u
                    .read()
                    .value()
                    .expect("an aggregated read always carries its value");
                self.compare_and_set(
                    tid,
                    u.write().loc(),
                    expected,
                    u.write().value().clone(),
                    u.write().class(),
                )
            }
            _ => true,
        }
    }
}

// States are keyed by (replay clock, memory); the memory half hashes as
// an order-independent combination of its cells so equal maps hash equal
// regardless of insertion order.
impl Hash for MemoryTracker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut acc: u64 = 0;
        for cell in &self.cells {
            let mut h = DefaultHasher::new();
            cell.hash(&mut h);
            acc ^= h.finish();
        }
        state.write_u64(acc);
        state.write_usize(self.cells.len());
    }
}
