//! Recorded executions: per-thread event sequences and their builder.

use std::collections::BTreeSet;
use std::fmt;

use log::trace;

use crate::event::Event;
use crate::event_label::{
    BarrierRace, LabelEnum, LabelKind, ThreadFinish, ThreadStart,
};
use crate::indexed_map::IndexedMap;
use crate::thread::{main_thread_id, ThreadId};

/// The event sequence of a single recorded thread.
#[derive(Clone, Debug)]
pub(crate) struct ThreadInfo {
    tid: ThreadId,
    pub(crate) labels: Vec<LabelEnum>,
}

/// A recorded execution: for every thread, the ordered sequence of its
/// events, plus the virtual initialization event addressed by
/// [`Event::init`]. Immutable for the duration of a consistency check.
#[derive(Clone, Debug)]
pub struct Execution {
    threads: IndexedMap<ThreadInfo>,
    init: LabelEnum,
    stamp: usize,
}

impl Execution {
    pub(crate) fn new() -> Execution {
        Execution {
            threads: IndexedMap::new(),
            init: LabelEnum::Init(crate::event_label::Init::new()),
            stamp: 0,
        }
    }

    /// Find the ThreadInfo structure for a thread, or panic with an error
    /// message.
    fn get_thr(&self, tid: &ThreadId) -> &ThreadInfo {
        self.get_thr_opt(tid).unwrap_or_else(|| {
            panic!(
                "Can't find thread {} in execution with thread ids {:?}",
                *tid,
                self.thread_ids()
            )
        })
    }

    fn get_thr_opt(&self, tid: &ThreadId) -> Option<&ThreadInfo> {
        self.threads.get(usize::from(*tid))
    }

    fn get_thr_mut(&mut self, tid: &ThreadId) -> &mut ThreadInfo {
        self.threads
            .get_mut(usize::from(*tid))
            .unwrap_or_else(|| panic!("Can't find thread {}", *tid))
    }

    pub fn thread_ids(&self) -> BTreeSet<ThreadId> {
        self.threads.iter().map(|t| t.tid).collect()
    }

    pub fn has_thread(&self, tid: ThreadId) -> bool {
        self.get_thr_opt(&tid).is_some()
    }

    pub fn thread_size(&self, tid: ThreadId) -> usize {
        self.get_thr(&tid).labels.len()
    }

    pub(crate) fn thread_last(&self, tid: ThreadId) -> Option<&LabelEnum> {
        self.get_thr(&tid).labels.last()
    }

    pub fn is_thread_finished(&self, tid: ThreadId) -> bool {
        matches!(self.thread_last(tid), Some(LabelEnum::ThreadFinish(_)))
    }

    pub fn contains(&self, e: Event) -> bool {
        e.is_init()
            || self
                .get_thr_opt(&e.thread())
                .is_some_and(|t| (e.index() as usize) < t.labels.len())
    }

    pub fn label(&self, e: Event) -> &LabelEnum {
        if e.is_init() {
            &self.init
        } else {
            &self.get_thr(&e.thread()).labels[e.index() as usize]
        }
    }

    pub(crate) fn label_mut(&mut self, e: Event) -> &mut LabelEnum {
        if e.is_init() {
            &mut self.init
        } else {
            &mut self.get_thr_mut(&e.thread()).labels[e.index() as usize]
        }
    }

    fn next_stamp(&mut self) -> usize {
        self.stamp += 1;
        self.stamp
    }

    pub(crate) fn add_thread(&mut self, tid: ThreadId) {
        assert!(self.get_thr_opt(&tid).is_none());
        self.threads.set(
            usize::from(tid),
            ThreadInfo {
                tid,
                labels: vec![],
            },
        );
    }

    /// Append a label to a thread, assigning its position and stamp.
    pub(crate) fn add_label(&mut self, tid: ThreadId, mut lab: LabelEnum) -> Event {
        let pos = Event::new(tid, self.thread_size(tid) as u32);
        lab.set_pos(pos);
        let stamp = self.next_stamp();
        lab.set_stamp(stamp);
        trace!("recording {}", lab);
        self.get_thr_mut(&tid).labels.push(lab);
        pos
    }

    /// Returns the largest prefix of a thread's sequence starting at
    /// `index` that aggregates into a single total label, together with
    /// the number of member events.
    ///
    /// Invariant (aggregation alignment): advancing by aggregate sizes
    /// from position 0 partitions every thread's sequence, so the checker
    /// replays in aggregate-sized steps.
    pub fn aggregated(&self, tid: ThreadId, index: usize) -> (LabelEnum, usize) {
        let labels = &self.get_thr(&tid).labels;
        let mut agg = labels[index].clone();
        let mut len = 1;
        while index + len < labels.len() {
            match agg.aggregate(&labels[index + len]) {
                Some(next) => {
                    agg = next;
                    len += 1;
                }
                None => break,
            }
        }
        (agg, len)
    }

    /// Rewrite the run-specific identities (locations, values, mutexes)
    /// of the event at `e` from a label observed in a fresh run of the
    /// same program. The shapes must match.
    pub fn rebind(&mut self, e: Event, observed: &LabelEnum) -> Result<(), String> {
        self.label_mut(e).replay_from(observed)
    }
}

impl fmt::Display for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.init)?;
        for thread_info in self.threads.iter() {
            writeln!(f, "thread {}:", thread_info.tid)?;
            for lab in thread_info.labels.iter() {
                writeln!(f, "\t{}", lab)?;
            }
        }
        Ok(())
    }
}

/// Error raised while recording an execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildError {
    /// Structurally impossible barrier synchronization; the recording is
    /// malformed beyond repair.
    BarrierRace(BarrierRace),
    /// The recording violates well-formedness (responses without
    /// requests, appends to finished threads, unsourced responses).
    IllFormed(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::BarrierRace(race) => write!(f, "barrier race: {}", race),
            BuildError::IllFormed(msg) => write!(f, "ill-formed execution: {}", msg),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<BarrierRace> for BuildError {
    fn from(race: BarrierRace) -> Self {
        BuildError::BarrierRace(race)
    }
}

/// Records an execution while enforcing its well-formedness:
///
/// - every thread begins with its start request, answered by a response
///   sourced from the fork that spawned it (the initialization event for
///   the main thread);
/// - a request is immediately followed by its matching response or stays
///   last in its thread (a thread blocked forever);
/// - responses record the events they synchronized with, which must
///   already exist;
/// - thread finishes merge into one barrier, so duplicated finishes
///   surface as [`BarrierRace`]s.
pub struct ExecutionBuilder {
    exec: Execution,
    current: Option<ThreadId>,
    finish_barrier: Option<LabelEnum>,
    policy: crate::replay::ReplayPolicy,
}

impl ExecutionBuilder {
    pub fn new() -> Self {
        ExecutionBuilder {
            exec: Execution::new(),
            current: None,
            finish_barrier: None,
            policy: crate::replay::ReplayPolicy::strict(),
        }
    }

    fn current(&self) -> Result<ThreadId, BuildError> {
        self.current
            .ok_or_else(|| BuildError::IllFormed("no thread is being recorded".to_string()))
    }

    fn check_appendable(&self, tid: ThreadId) -> Result<(), BuildError> {
        if self.exec.is_thread_finished(tid) {
            return Err(BuildError::IllFormed(format!(
                "thread {} has already finished",
                tid
            )));
        }
        if self
            .exec
            .thread_last(tid)
            .is_some_and(|lab| lab.is_request())
        {
            return Err(BuildError::IllFormed(format!(
                "thread {} has a pending request that must be answered first",
                tid
            )));
        }
        Ok(())
    }

    /// Switch recording to `tid`, registering the thread (and appending
    /// its start request) on first use.
    pub fn begin_thread(&mut self, tid: ThreadId) -> Result<(), BuildError> {
        if !self.exec.has_thread(tid) {
            self.exec.add_thread(tid);
            let start = ThreadStart::request(tid, tid == main_thread_id());
            self.exec
                .add_label(tid, LabelEnum::ThreadStart(start));
        } else if self.exec.is_thread_finished(tid) {
            return Err(BuildError::IllFormed(format!(
                "thread {} has already finished",
                tid
            )));
        }
        self.current = Some(tid);
        Ok(())
    }

    /// Record a send event on the current thread.
    pub fn append_send(&mut self, label: LabelEnum) -> Result<Event, BuildError> {
        let tid = self.current()?;
        self.check_appendable(tid)?;
        if label.kind() != LabelKind::Send {
            return Err(BuildError::IllFormed(format!(
                "append_send expects a send label, got {}",
                label
            )));
        }
        Ok(self.exec.add_label(tid, label))
    }

    /// Record a request event on the current thread.
    pub fn append_request(&mut self, label: LabelEnum) -> Result<Event, BuildError> {
        let tid = self.current()?;
        self.check_appendable(tid)?;
        if label.kind() != LabelKind::Request {
            return Err(BuildError::IllFormed(format!(
                "append_request expects a request label, got {}",
                label
            )));
        }
        Ok(self.exec.add_label(tid, label))
    }

    /// Record a response on the current thread, answering the request
    /// right before it and naming the events it synchronized with.
    pub fn append_response(
        &mut self,
        mut label: LabelEnum,
        sources: &[Event],
    ) -> Result<Event, BuildError> {
        let tid = self.current()?;
        if self.exec.is_thread_finished(tid) {
            return Err(BuildError::IllFormed(format!(
                "thread {} has already finished",
                tid
            )));
        }
        let request = match self.exec.thread_last(tid) {
            Some(req) if req.is_request() => req.clone(),
            _ => {
                return Err(BuildError::IllFormed(format!(
                    "response {} has no pending request on thread {}",
                    label, tid
                )))
            }
        };
        if !label.synchronized_from(&request, &self.policy) {
            return Err(BuildError::IllFormed(format!(
                "response {} does not answer the pending request {}",
                label, request
            )));
        }
        for src in sources {
            if !self.exec.contains(*src) {
                return Err(BuildError::IllFormed(format!(
                    "response {} names a source {} that does not exist",
                    label, src
                )));
            }
        }
        self.validate_sources(&label, &request, sources)?;
        label
            .set_sources(sources)
            .map_err(BuildError::IllFormed)?;
        Ok(self.exec.add_label(tid, label))
    }

    fn validate_sources(
        &self,
        label: &LabelEnum,
        request: &LabelEnum,
        sources: &[Event],
    ) -> Result<(), BuildError> {
        match label {
            // Barrier responses synchronize with every source at once:
            // fold the finish sends together, then into the request.
            LabelEnum::ThreadJoin(rsp) => {
                let rq = match request {
                    LabelEnum::ThreadJoin(rq) => rq,
                    _ => {
                        return Err(BuildError::IllFormed(format!(
                            "response {} does not answer a join request",
                            label
                        )))
                    }
                };
                let remaining = if sources.is_empty() {
                    rq.join_tids().clone()
                } else {
                    let source_labels: Vec<&LabelEnum> =
                        sources.iter().map(|&e| self.exec.label(e)).collect();
                    let fins = LabelEnum::synchronize_all(source_labels.iter().copied())?;
                    let folded = match fins {
                        Some(fin) => fin.synchronize(request)?,
                        None => None,
                    };
                    match folded {
                        Some(LabelEnum::ThreadJoin(folded)) => folded.join_tids().clone(),
                        _ => {
                            return Err(BuildError::IllFormed(format!(
                                "sources of {} do not synchronize with {}",
                                label, request
                            )))
                        }
                    }
                };
                if remaining == *rsp.join_tids() {
                    Ok(())
                } else {
                    Err(BuildError::IllFormed(format!(
                        "response {} disagrees with its sources",
                        label
                    )))
                }
            }
            // Binary responses have exactly one source.
            _ => {
                if sources.len() != 1 {
                    return Err(BuildError::IllFormed(format!(
                        "response {} must name exactly one source, got {}",
                        label,
                        sources.len()
                    )));
                }
                let src = self.exec.label(sources[0]);
                if label.synchronized_from(src, &self.policy) {
                    Ok(())
                } else {
                    Err(BuildError::IllFormed(format!(
                        "response {} is not a synchronization with {}",
                        label, src
                    )))
                }
            }
        }
    }

    /// Close the current thread with its finish barrier.
    pub fn end_thread(&mut self) -> Result<Event, BuildError> {
        let tid = self.current()?;
        if self
            .exec
            .thread_last(tid)
            .is_some_and(|lab| lab.is_request())
        {
            return Err(BuildError::IllFormed(format!(
                "thread {} cannot finish on a pending request",
                tid
            )));
        }
        let fin = LabelEnum::ThreadFinish(ThreadFinish::new([tid].into_iter().collect()));
        // Merging into the running barrier surfaces duplicate finishes.
        self.finish_barrier = Some(match self.finish_barrier.take() {
            None => fin.clone(),
            Some(acc) => acc
                .synchronize(&fin)?
                .expect("disjoint finish barriers always merge"),
        });
        let e = self.exec.add_label(tid, fin);
        self.current = None;
        Ok(e)
    }

    pub fn build(self) -> Execution {
        self.exec
    }
}

impl Default for ExecutionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_label::{ReadAccess, ThreadFork, ThreadJoin, WriteAccess};
    use crate::loc::Loc;
    use crate::thread::construct_thread_id;
    use crate::value::{Val, ValueClass};

    fn tid(n: u32) -> ThreadId {
        construct_thread_id(n)
    }

    fn int_class() -> ValueClass {
        ValueClass::of::<i32>()
    }

    #[test]
    fn threads_begin_with_their_start_request() {
        let mut b = ExecutionBuilder::new();
        b.begin_thread(main_thread_id()).unwrap();
        let start = b
            .append_response(
                LabelEnum::ThreadStart(crate::event_label::ThreadStart::response(
                    main_thread_id(),
                    true,
                )),
                &[Event::init()],
            )
            .unwrap();
        let exec = b.build();
        assert_eq!(exec.thread_size(main_thread_id()), 2);
        assert!(exec.label(start).is_response());
        let (agg, len) = exec.aggregated(main_thread_id(), 0);
        assert_eq!(len, 2);
        assert_eq!(agg.kind(), LabelKind::Total);
    }

    #[test]
    fn response_must_answer_a_request() {
        let mut b = ExecutionBuilder::new();
        b.begin_thread(main_thread_id()).unwrap();
        b.append_response(
            LabelEnum::ThreadStart(crate::event_label::ThreadStart::response(
                main_thread_id(),
                true,
            )),
            &[Event::init()],
        )
        .unwrap();
        let err = b.append_response(
            LabelEnum::ReadAccess(ReadAccess::response(
                Loc::new("x"),
                Val::new(0i32),
                int_class(),
                false,
            )),
            &[Event::init()],
        );
        assert!(matches!(err, Err(BuildError::IllFormed(_))));
    }

    #[test]
    fn appends_after_a_pending_request_are_rejected() {
        let mut b = ExecutionBuilder::new();
        b.begin_thread(main_thread_id()).unwrap();
        // The start request is still pending.
        let err = b.append_send(LabelEnum::WriteAccess(WriteAccess::new(
            Loc::new("x"),
            Val::new(1i32),
            int_class(),
            false,
        )));
        assert!(matches!(err, Err(BuildError::IllFormed(_))));
    }

    /// Sets up main having forked t1 and t2, both finished, with main
    /// sitting on a pending join request for `scope`.
    fn forked_pair_pending_join(scope: &[u32]) -> (ExecutionBuilder, Event, Event) {
        let mut b = ExecutionBuilder::new();
        b.begin_thread(main_thread_id()).unwrap();
        b.append_response(
            LabelEnum::ThreadStart(crate::event_label::ThreadStart::response(
                main_thread_id(),
                true,
            )),
            &[Event::init()],
        )
        .unwrap();
        let fork = b
            .append_send(LabelEnum::ThreadFork(ThreadFork::new(
                [tid(1), tid(2)].into_iter().collect(),
            )))
            .unwrap();

        let mut fins = Vec::new();
        for t in [tid(1), tid(2)] {
            b.begin_thread(t).unwrap();
            b.append_response(
                LabelEnum::ThreadStart(crate::event_label::ThreadStart::response(t, false)),
                &[fork],
            )
            .unwrap();
            fins.push(b.end_thread().unwrap());
        }

        b.begin_thread(main_thread_id()).unwrap();
        b.append_request(LabelEnum::ThreadJoin(ThreadJoin::request(
            scope.iter().map(|&n| tid(n)).collect(),
        )))
        .unwrap();
        (b, fins[0], fins[1])
    }

    #[test]
    fn duplicated_finish_source_is_a_barrier_race() {
        let (mut b, fin1, _) = forked_pair_pending_join(&[1, 2]);
        let err = b.append_response(
            LabelEnum::ThreadJoin(ThreadJoin::response([tid(2)].into_iter().collect())),
            &[fin1, fin1],
        );
        assert!(matches!(err, Err(BuildError::BarrierRace(_))));
    }

    #[test]
    fn finish_outside_join_scope_is_a_barrier_race() {
        let (mut b, fin1, fin2) = forked_pair_pending_join(&[1]);
        let err = b.append_response(
            LabelEnum::ThreadJoin(ThreadJoin::response(Default::default())),
            &[fin1, fin2],
        );
        assert!(matches!(err, Err(BuildError::BarrierRace(_))));
    }

    #[test]
    fn join_sources_fold_through_the_barrier() {
        let mut b = ExecutionBuilder::new();
        b.begin_thread(main_thread_id()).unwrap();
        b.append_response(
            LabelEnum::ThreadStart(crate::event_label::ThreadStart::response(
                main_thread_id(),
                true,
            )),
            &[Event::init()],
        )
        .unwrap();
        let fork = b
            .append_send(LabelEnum::ThreadFork(ThreadFork::new(
                [tid(1)].into_iter().collect(),
            )))
            .unwrap();

        b.begin_thread(tid(1)).unwrap();
        b.append_response(
            LabelEnum::ThreadStart(crate::event_label::ThreadStart::response(tid(1), false)),
            &[fork],
        )
        .unwrap();
        let fin = b.end_thread().unwrap();

        b.begin_thread(main_thread_id()).unwrap();
        b.append_request(LabelEnum::ThreadJoin(ThreadJoin::request(
            [tid(1)].into_iter().collect(),
        )))
        .unwrap();
        b.append_response(
            LabelEnum::ThreadJoin(ThreadJoin::response(Default::default())),
            &[fin],
        )
        .unwrap();
        b.end_thread().unwrap();

        let exec = b.build();
        assert!(exec.is_thread_finished(main_thread_id()));
        assert!(exec.is_thread_finished(tid(1)));
    }

    #[test]
    fn rebind_rewrites_recorded_identities() {
        let mut b = ExecutionBuilder::new();
        b.begin_thread(main_thread_id()).unwrap();
        b.append_response(
            LabelEnum::ThreadStart(crate::event_label::ThreadStart::response(
                main_thread_id(),
                true,
            )),
            &[Event::init()],
        )
        .unwrap();
        let w = b
            .append_send(LabelEnum::WriteAccess(WriteAccess::new(
                Loc::new("x"),
                Val::new(1i32),
                int_class(),
                false,
            )))
            .unwrap();
        let mut exec = b.build();

        let observed = LabelEnum::WriteAccess(WriteAccess::new(
            Loc::new(0x7fe0_usize),
            Val::new(1i32),
            int_class(),
            false,
        ));
        exec.rebind(w, &observed).unwrap();
        if let LabelEnum::WriteAccess(wl) = exec.label(w) {
            assert_eq!(wl.loc(), &Loc::new(0x7fe0_usize));
        } else {
            panic!("expected a write at {}", w);
        }
    }
}
