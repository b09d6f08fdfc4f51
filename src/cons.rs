//! Sequential-consistency checking by replaying recorded executions.
//!
//! The checker searches for a total order interleaving the per-thread
//! sequences that respects program order, the configured covering, and
//! the read-from relation realized against a sequentially consistent
//! memory. Reaching a state where every thread is fully replayed proves
//! the execution consistent; exhausting the state space refutes it.

use std::collections::HashSet;
use std::fmt;

use log::{debug, info};

use crate::covering::{Covering, ExternalCausality};
use crate::event::Event;
use crate::execution::Execution;
use crate::memory::MemoryTracker;
use crate::replay::ReplayPolicy;
use crate::thread::ThreadId;
use crate::vector_clock::VectorClock;
use crate::Config;

/// Why an execution was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inconsistency {
    SequentialConsistency(SequentialConsistencyViolation),
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::SequentialConsistency(v) => write!(f, "{}", v),
        }
    }
}

/// The execution admits no total order. Carries the deepest replay
/// prefix any branch of the search reached, to aid debugging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequentialConsistencyViolation {
    /// The longest replay prefix found, in replay order.
    pub witness: Vec<Event>,
    /// The per-thread frontier at which that prefix got stuck.
    pub stuck: Vec<Event>,
    /// A recorded (response, source) pair that fails validation, if any.
    pub mismatched: Option<(Event, Event)>,
}

impl fmt::Display for SequentialConsistencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((rsp, src)) = &self.mismatched {
            return write!(
                f,
                "response at {} is not a legal synchronization with its recorded source {}",
                rsp, src
            );
        }
        let stuck: Vec<String> = self.stuck.iter().map(|e| format!("{}", e)).collect();
        write!(
            f,
            "no total order replays the execution; the deepest attempt replayed {} events and got stuck before [{}]",
            self.witness.len(),
            stuck.join(", ")
        )
    }
}

/// One state of the replay search: how far each thread has been
/// replayed, and the memory those replays produced.
#[derive(Clone, PartialEq, Eq, Hash)]
struct SearchState {
    clock: VectorClock,
    memory: MemoryTracker,
}

/// Decides whether an execution is consistent with some total order.
/// Pluggable by covering; the default replays under external causality.
pub struct SequentialConsistencyChecker<C: Covering = ExternalCausality> {
    covering: C,
    policy: ReplayPolicy,
    capture_witness: bool,
    verbose: usize,
}

impl SequentialConsistencyChecker<ExternalCausality> {
    pub fn new(config: &Config) -> Self {
        Self::with_covering(config, ExternalCausality)
    }
}

impl<C: Covering> SequentialConsistencyChecker<C> {
    pub fn with_covering(config: &Config, covering: C) -> Self {
        Self {
            covering,
            policy: config.replay_policy(),
            capture_witness: config.capture_witness(),
            verbose: config.verbose(),
        }
    }

    /// `None` when some total order replays the execution, otherwise the
    /// violation. Deterministic: equal inputs take equal search paths.
    pub fn check(&self, exec: &Execution) -> Option<Inconsistency> {
        if let Some((rsp, src)) = self.validate_sources(exec) {
            return Some(Inconsistency::SequentialConsistency(
                SequentialConsistencyViolation {
                    witness: Vec::new(),
                    stuck: vec![rsp],
                    mismatched: Some((rsp, src)),
                },
            ));
        }

        let tids: Vec<ThreadId> = exec.thread_ids().into_iter().collect();
        let mut clock = VectorClock::new();
        for &t in &tids {
            clock.set_tid(t);
        }

        let mut search = Search {
            exec,
            tids: &tids,
            covering: &self.covering,
            visited: HashSet::new(),
            path: Vec::new(),
            best: Vec::new(),
            stuck: Vec::new(),
            capture_witness: self.capture_witness,
        };
        let initial_frontier = search.frontier(&clock);
        search.stuck = initial_frontier;

        let consistent = search.replay(SearchState {
            clock,
            memory: MemoryTracker::new(),
        });
        debug!(
            "sequential consistency search visited {} states",
            search.visited.len()
        );

        if consistent {
            None
        } else {
            if self.verbose > 0 {
                info!("no total order for execution:\n{}", exec);
            }
            Some(Inconsistency::SequentialConsistency(
                SequentialConsistencyViolation {
                    witness: search.best,
                    stuck: search.stuck,
                    mismatched: None,
                },
            ))
        }
    }

    /// Every recorded (response, source) pair must be a synchronization
    /// the label algebra permits.
    fn validate_sources(&self, exec: &Execution) -> Option<(Event, Event)> {
        for tid in exec.thread_ids() {
            for i in 0..exec.thread_size(tid) {
                let e = Event::new(tid, i as u32);
                let lab = exec.label(e);
                for &src in lab.sources() {
                    if !lab.synchronized_from(exec.label(src), &self.policy) {
                        return Some((e, src));
                    }
                }
            }
        }
        None
    }
}

struct Search<'a, C: Covering> {
    exec: &'a Execution,
    tids: &'a [ThreadId],
    covering: &'a C,
    visited: HashSet<SearchState>,
    path: Vec<Event>,
    best: Vec<Event>,
    stuck: Vec<Event>,
    capture_witness: bool,
}

impl<C: Covering> Search<'_, C> {
    fn terminal(&self, clock: &VectorClock) -> bool {
        self.tids
            .iter()
            .all(|&t| clock.next_index(t) as usize == self.exec.thread_size(t))
    }

    /// All covering dependencies of the aggregate's members must be
    /// below the frontier; members cover each other.
    fn coverable(&self, members: &[Event], clock: &VectorClock) -> bool {
        members.iter().all(|&e| {
            self.covering
                .covering(self.exec, e)
                .iter()
                .all(|d| clock.contains(*d) || members.contains(d))
        })
    }

    fn frontier(&self, clock: &VectorClock) -> Vec<Event> {
        clock
            .entries()
            .filter_map(|(t, n)| {
                ((n as usize) < self.exec.thread_size(t)).then(|| Event::new(t, n))
            })
            .collect()
    }

    fn replay(&mut self, state: SearchState) -> bool {
        if self.terminal(&state.clock) {
            return true;
        }
        if !self.visited.insert(state.clone()) {
            return false;
        }
        if self.capture_witness && self.path.len() > self.best.len() {
            self.best = self.path.clone();
            self.stuck = self.frontier(&state.clock);
        }

        // Threads are tried in ascending id order; branching explores
        // every thread choice.
        for i in 0..self.tids.len() {
            let tid = self.tids[i];
            let next = state.clock.next_index(tid) as usize;
            if next >= self.exec.thread_size(tid) {
                continue;
            }
            let (agg, len) = self.exec.aggregated(tid, next);
            let members: Vec<Event> = (next..next + len)
                .map(|p| Event::new(tid, p as u32))
                .collect();
            if !self.coverable(&members, &state.clock) {
                continue;
            }
            let mut succ = state.clone();
            if !succ.memory.replay_label(&agg) {
                continue;
            }
            succ.clock.advance(tid, len as u32);

            if self.capture_witness {
                self.path.extend(&members);
            }
            if self.replay(succ) {
                return true;
            }
            if self.capture_witness {
                self.path.truncate(self.path.len() - members.len());
            }
        }
        false
    }
}
