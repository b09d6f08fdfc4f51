//! What must already be replayed before an event may be replayed.
//!
//! A covering maps an event to the set of events required in its past.
//! Different coverings encode different consistency models; the
//! sequential-consistency checker replays under [`ExternalCausality`].

use smallvec::SmallVec;

use crate::event::Event;
use crate::execution::Execution;

pub trait Covering {
    /// The events that must be replayed before `e`. Total and acyclic
    /// over the events of a well-formed execution.
    fn covering(&self, exec: &Execution, e: Event) -> SmallVec<[Event; 2]>;
}

/// Same-thread predecessors only. Since the checker replays each thread
/// in order, the immediate predecessor covers all earlier ones.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProgramOrder;

impl Covering for ProgramOrder {
    fn covering(&self, _exec: &Execution, e: Event) -> SmallVec<[Event; 2]> {
        let mut deps = SmallVec::new();
        if !e.is_init() && e.index() > 0 {
            deps.push(e.prev());
        }
        deps
    }
}

/// Program order plus the cross-thread edges already recorded in the
/// execution: the fork covers the spawned thread's start, the write its
/// read responses, the unlock the next acquisition, the notify the woken
/// wait, and the finishes the join that waited for them.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExternalCausality;

impl Covering for ExternalCausality {
    fn covering(&self, exec: &Execution, e: Event) -> SmallVec<[Event; 2]> {
        let mut deps = ProgramOrder.covering(exec, e);
        for &src in exec.label(e).sources() {
            if !src.is_init() {
                deps.push(src);
            }
        }
        deps
    }
}
