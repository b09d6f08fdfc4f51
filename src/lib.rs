//! An event-structure engine for checking recorded concurrent
//! executions against sequential consistency.
//!
//! Instrumentation records each observed program action as a labelled
//! event on its thread through [`ExecutionBuilder`]; the resulting
//! [`Execution`] is then handed to a [`SequentialConsistencyChecker`],
//! which searches for a total order interleaving the per-thread
//! sequences that respects program order, the recorded synchronization
//! (the covering), and a sequentially consistent memory.

pub mod cons;
pub mod covering;
mod event;
pub mod event_label;
pub mod execution;
mod indexed_map;
pub mod loc;
pub mod memory;
pub mod replay;
pub mod thread;
pub mod value;
mod vector_clock;

pub use cons::{Inconsistency, SequentialConsistencyChecker, SequentialConsistencyViolation};
pub use event::Event;
pub use event_label::{BarrierRace, LabelEnum, LabelKind, SyncType};
pub use execution::{BuildError, Execution, ExecutionBuilder};
pub use loc::Loc;
pub use memory::MemoryTracker;
pub use replay::ReplayPolicy;
pub use thread::ThreadId;
pub use value::{Val, ValueClass};

/// Configuration of a consistency check.
///
/// Use the [`ConfigBuilder`] class to construct a `Config` struct.
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) relaxed_locations: bool,
    pub(crate) capture_witness: bool,
    pub(crate) verbose: usize,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub(crate) fn replay_policy(&self) -> ReplayPolicy {
        if self.relaxed_locations {
            ReplayPolicy::relaxed()
        } else {
            ReplayPolicy::strict()
        }
    }

    pub(crate) fn capture_witness(&self) -> bool {
        self.capture_witness
    }

    pub(crate) fn verbose(&self) -> usize {
        self.verbose
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

pub struct ConfigBuilder(Config);

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> ConfigBuilder {
        ConfigBuilder(Config {
            relaxed_locations: false,
            capture_witness: true,
            verbose: 0,
        })
    }

    /// Validate recorded synchronization under location-insensitive
    /// matching. Needed when replaying a recording against labels from a
    /// fresh run, where object identities differ.
    pub fn with_relaxed_locations(mut self, b: bool) -> Self {
        self.0.relaxed_locations = b;
        self
    }

    /// Keep the deepest replay prefix found so a violation can report
    /// where the search got stuck.
    pub fn with_witness_capture(mut self, b: bool) -> Self {
        self.0.capture_witness = b;
        self
    }

    pub fn with_verbose(mut self, v: usize) -> Self {
        self.0.verbose = v;
        self
    }

    pub fn build(self) -> Config {
        self.0
    }
}

/// Check an execution under the default configuration and the
/// external-causality covering.
pub fn check(exec: &Execution) -> Option<Inconsistency> {
    SequentialConsistencyChecker::new(&Config::default()).check(exec)
}
