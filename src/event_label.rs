//! Labels of execution events and the synchronization algebra over them.
//!
//! A label describes what an event means: a memory access, a mutex
//! operation, a thread lifecycle step. Labels compose through three
//! partial operations:
//!
//! - [`LabelEnum::synchronize`] pairs a send-like label with a request
//!   and produces the resulting response (a partial, commutative,
//!   associative operation; the missing partner is its neutral element);
//! - [`LabelEnum::aggregate`] fuses adjacent same-thread events into a
//!   single total label the checker replays as one atomic step;
//! - [`LabelEnum::replay_from`] rewrites the run-specific identities
//!   (locations, values, mutexes) of a label from a label observed in a
//!   fresh run with the same shape.

use std::collections::BTreeSet;
use std::fmt;

use smallvec::SmallVec;

use crate::event::Event;
use crate::loc::Loc;
use crate::replay::ReplayPolicy;
use crate::thread::ThreadId;
use crate::value::{Val, ValueClass};

/// How a label participates in synchronization. `Total` is the kind of an
/// aggregated request/response pair; a `Send` is already a total step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LabelKind {
    Send,
    Request,
    Response,
    Total,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SyncType {
    /// Exactly two participants (send and request).
    Binary,
    /// Any number of participants (thread finishes, joins).
    Barrier,
}

pub(crate) type SourceList = SmallVec<[Event; 2]>;

fn fmt_tids(tids: &BTreeSet<ThreadId>) -> String {
    let strs: Vec<String> = tids.iter().map(|t| format!("{}", t)).collect();
    format!("{{{}}}", strs.join(", "))
}

/// Structurally impossible barrier synchronization. Unlike an undefined
/// synchronization (which is simply absent), a barrier race means the
/// recorded execution itself is malformed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BarrierRace {
    /// The same thread participates twice in a finish barrier.
    DuplicateThreadFinish { thread: ThreadId },
    /// A finish set overlaps a join scope without being contained in it.
    FinishOutsideJoinScope {
        finished: BTreeSet<ThreadId>,
        join_scope: BTreeSet<ThreadId>,
    },
}

impl fmt::Display for BarrierRace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarrierRace::DuplicateThreadFinish { thread } => {
                write!(f, "thread {} finished more than once", thread)
            }
            BarrierRace::FinishOutsideJoinScope {
                finished,
                join_scope,
            } => write!(
                f,
                "finished threads {} overlap join scope {} without being contained in it",
                fmt_tids(finished),
                fmt_tids(join_scope)
            ),
        }
    }
}

impl std::error::Error for BarrierRace {}

/// Fields shared by every label: the position of the event carrying it
/// and its global id (the stamp, assigned on insertion into an
/// execution).
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct EventLabel {
    pos: Event,
    stamp: Option<usize>,
}

impl EventLabel {
    /// A label not yet placed in an execution. The position is assigned
    /// when the execution stores it.
    fn detached() -> Self {
        Self {
            pos: Event::init(),
            stamp: None,
        }
    }

    fn init() -> Self {
        Self {
            pos: Event::init(),
            stamp: Some(0),
        }
    }

    pub(crate) fn pos(&self) -> Event {
        self.pos
    }

    pub(crate) fn thread(&self) -> ThreadId {
        self.pos.thread()
    }

    pub(crate) fn stamp(&self) -> usize {
        self.stamp.unwrap()
    }

    pub(crate) fn set_stamp(&mut self, s: usize) {
        self.stamp = Some(s)
    }

    pub(crate) fn set_pos(&mut self, p: Event) {
        self.pos = p
    }
}

impl fmt::Display for EventLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pos)
    }
}

pub(crate) trait AsEventLabel {
    fn as_event_label(&self) -> &EventLabel;
    fn as_event_label_mut(&mut self) -> &mut EventLabel;
}

macro_rules! as_label {
    ($t:ty) => {
        impl AsEventLabel for $t {
            fn as_event_label(&self) -> &EventLabel {
                &self.label
            }
            fn as_event_label_mut(&mut self) -> &mut EventLabel {
                &mut self.label
            }
        }
    };
}

fn kind_marker(kind: LabelKind) -> &'static str {
    match kind {
        LabelKind::Send => "",
        LabelKind::Request => "^req",
        LabelKind::Response => "^rsp",
        LabelKind::Total => "^tot",
    }
}

/// The virtual root of every execution. It supplies class defaults to
/// first reads, starts the main thread and hands out initial lock
/// acquisitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Init {
    label: EventLabel,
}

impl Init {
    pub fn new() -> Self {
        Self {
            label: EventLabel::init(),
        }
    }
}

impl Default for Init {
    fn default() -> Self {
        Self::new()
    }
}

as_label!(Init);

impl fmt::Display for Init {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: INIT", self.as_event_label())
    }
}

/// A thread spawning one or more child threads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadFork {
    label: EventLabel,
    fork_tids: BTreeSet<ThreadId>,
}

impl ThreadFork {
    pub fn new(fork_tids: BTreeSet<ThreadId>) -> Self {
        Self {
            label: EventLabel::detached(),
            fork_tids,
        }
    }

    pub fn fork_tids(&self) -> &BTreeSet<ThreadId> {
        &self.fork_tids
    }
}

as_label!(ThreadFork);

impl fmt::Display for ThreadFork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: FORK({})",
            self.as_event_label(),
            fmt_tids(&self.fork_tids)
        )
    }
}

/// The first step of a thread, synchronizing with the fork that spawned
/// it (or with the initialization event for the main thread).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadStart {
    label: EventLabel,
    kind: LabelKind,
    tid: ThreadId,
    is_main: bool,
    sources: SourceList,
}

impl ThreadStart {
    pub fn request(tid: ThreadId, is_main: bool) -> Self {
        Self {
            label: EventLabel::detached(),
            kind: LabelKind::Request,
            tid,
            is_main,
            sources: SourceList::new(),
        }
    }

    pub fn response(tid: ThreadId, is_main: bool) -> Self {
        Self {
            kind: LabelKind::Response,
            ..Self::request(tid, is_main)
        }
    }

    fn responded(&self) -> Self {
        Self::response(self.tid, self.is_main)
    }

    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    pub fn is_main(&self) -> bool {
        self.is_main
    }
}

as_label!(ThreadStart);

impl fmt::Display for ThreadStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: START{}({})",
            self.as_event_label(),
            kind_marker(self.kind),
            self.tid
        )
    }
}

/// A barrier send announcing that a set of threads has finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadFinish {
    label: EventLabel,
    finished: BTreeSet<ThreadId>,
}

impl ThreadFinish {
    pub fn new(finished: BTreeSet<ThreadId>) -> Self {
        Self {
            label: EventLabel::detached(),
            finished,
        }
    }

    pub fn finished(&self) -> &BTreeSet<ThreadId> {
        &self.finished
    }
}

as_label!(ThreadFinish);

impl fmt::Display for ThreadFinish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: FINISH({})",
            self.as_event_label(),
            fmt_tids(&self.finished)
        )
    }
}

/// A barrier request waiting for a set of threads to finish; the
/// remaining set shrinks as finishes synchronize into it, and the label
/// unblocks once the set is empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadJoin {
    label: EventLabel,
    kind: LabelKind,
    join_tids: BTreeSet<ThreadId>,
    sources: SourceList,
}

impl ThreadJoin {
    pub fn request(join_tids: BTreeSet<ThreadId>) -> Self {
        Self {
            label: EventLabel::detached(),
            kind: LabelKind::Request,
            join_tids,
            sources: SourceList::new(),
        }
    }

    pub fn response(remaining: BTreeSet<ThreadId>) -> Self {
        Self {
            kind: LabelKind::Response,
            ..Self::request(remaining)
        }
    }

    fn responded_minus(&self, finished: &BTreeSet<ThreadId>) -> Self {
        Self::response(self.join_tids.difference(finished).copied().collect())
    }

    pub fn join_tids(&self) -> &BTreeSet<ThreadId> {
        &self.join_tids
    }
}

as_label!(ThreadJoin);

impl fmt::Display for ThreadJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: JOIN{}({})",
            self.as_event_label(),
            kind_marker(self.kind),
            fmt_tids(&self.join_tids)
        )
    }
}

/// A read of a shared memory location. The request carries no value; the
/// response and total carry the value supplied by the synchronizing
/// write (or the class default from the initialization event).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadAccess {
    label: EventLabel,
    kind: LabelKind,
    loc: Loc,
    value: Option<Val>,
    class: ValueClass,
    exclusive: bool,
    sources: SourceList,
}

impl ReadAccess {
    pub fn request(loc: Loc, class: ValueClass, exclusive: bool) -> Self {
        Self {
            label: EventLabel::detached(),
            kind: LabelKind::Request,
            loc,
            value: None,
            class,
            exclusive,
            sources: SourceList::new(),
        }
    }

    pub fn response(loc: Loc, value: Val, class: ValueClass, exclusive: bool) -> Self {
        Self {
            kind: LabelKind::Response,
            value: Some(value),
            ..Self::request(loc, class, exclusive)
        }
    }

    fn responded_with(&self, value: Val, class: ValueClass) -> Self {
        Self {
            label: EventLabel::detached(),
            kind: LabelKind::Response,
            loc: self.loc.clone(),
            value: Some(value),
            class,
            exclusive: self.exclusive,
            sources: SourceList::new(),
        }
    }

    pub fn loc(&self) -> &Loc {
        &self.loc
    }

    pub fn value(&self) -> Option<&Val> {
        self.value.as_ref()
    }

    pub fn class(&self) -> &ValueClass {
        &self.class
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

as_label!(ReadAccess);

impl fmt::Display for ReadAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            None => write!(
                f,
                "{}: READ{}({})",
                self.as_event_label(),
                kind_marker(self.kind),
                self.loc
            ),
            Some(v) => write!(
                f,
                "{}: READ{}({}, {})",
                self.as_event_label(),
                kind_marker(self.kind),
                self.loc,
                v
            ),
        }
    }
}

/// A write to a shared memory location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteAccess {
    label: EventLabel,
    loc: Loc,
    value: Val,
    class: ValueClass,
    exclusive: bool,
}

impl WriteAccess {
    pub fn new(loc: Loc, value: Val, class: ValueClass, exclusive: bool) -> Self {
        Self {
            label: EventLabel::detached(),
            loc,
            value,
            class,
            exclusive,
        }
    }

    pub fn loc(&self) -> &Loc {
        &self.loc
    }

    pub fn value(&self) -> &Val {
        &self.value
    }

    pub fn class(&self) -> &ValueClass {
        &self.class
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

as_label!(WriteAccess);

impl fmt::Display for WriteAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: WRITE({}, {}){}",
            self.as_event_label(),
            self.loc,
            self.value,
            if self.exclusive { " [excl]" } else { "" }
        )
    }
}

/// An exclusive read fused with the exclusive write it gates: the shape
/// of compare-and-set and kindred atomic updates. Replayed as a single
/// atomic step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadModifyWrite {
    label: EventLabel,
    read: ReadAccess,
    write: WriteAccess,
}

impl ReadModifyWrite {
    pub fn read(&self) -> &ReadAccess {
        &self.read
    }

    pub fn write(&self) -> &WriteAccess {
        &self.write
    }
}

as_label!(ReadModifyWrite);

impl fmt::Display for ReadModifyWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: RMW({}, {} -> {})",
            self.as_event_label(),
            self.write.loc,
            self.read
                .value
                .as_ref()
                .map(|v| format!("{}", v))
                .unwrap_or_else(|| "?".to_string()),
            self.write.value
        )
    }
}

/// A mutex acquisition. `depth` counts the reentrance depth of the
/// acquisition, `count` the number of releases still pending at it; only
/// the outermost acquisition (`depth == count`) synchronizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lock {
    label: EventLabel,
    kind: LabelKind,
    mutex: Loc,
    depth: u32,
    count: u32,
    sources: SourceList,
}

impl Lock {
    pub fn request(mutex: Loc, depth: u32, count: u32) -> Self {
        Self {
            label: EventLabel::detached(),
            kind: LabelKind::Request,
            mutex,
            depth,
            count,
            sources: SourceList::new(),
        }
    }

    pub fn response(mutex: Loc, depth: u32, count: u32) -> Self {
        Self {
            kind: LabelKind::Response,
            ..Self::request(mutex, depth, count)
        }
    }

    fn responded(&self) -> Self {
        Self::response(self.mutex.clone(), self.depth, self.count)
    }

    pub fn mutex(&self) -> &Loc {
        &self.mutex
    }

    pub fn is_acquiring(&self) -> bool {
        self.depth == self.count
    }
}

as_label!(Lock);

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: LOCK{}({})",
            self.as_event_label(),
            kind_marker(self.kind),
            self.mutex
        )
    }
}

/// A mutex release; only the outermost release (`depth == count`)
/// synchronizes with a pending acquisition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unlock {
    label: EventLabel,
    mutex: Loc,
    depth: u32,
    count: u32,
}

impl Unlock {
    pub fn new(mutex: Loc, depth: u32, count: u32) -> Self {
        Self {
            label: EventLabel::detached(),
            mutex,
            depth,
            count,
        }
    }

    pub fn mutex(&self) -> &Loc {
        &self.mutex
    }

    pub fn is_releasing(&self) -> bool {
        self.depth == self.count
    }
}

as_label!(Unlock);

impl fmt::Display for Unlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: UNLOCK({})", self.as_event_label(), self.mutex)
    }
}

/// A wait on a mutex's condition; the response synchronizes with a
/// notify on the same mutex. An initialization never wakes a waiter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wait {
    label: EventLabel,
    kind: LabelKind,
    mutex: Loc,
    sources: SourceList,
}

impl Wait {
    pub fn request(mutex: Loc) -> Self {
        Self {
            label: EventLabel::detached(),
            kind: LabelKind::Request,
            mutex,
            sources: SourceList::new(),
        }
    }

    pub fn response(mutex: Loc) -> Self {
        Self {
            kind: LabelKind::Response,
            ..Self::request(mutex)
        }
    }

    fn responded(&self) -> Self {
        Self::response(self.mutex.clone())
    }

    pub fn mutex(&self) -> &Loc {
        &self.mutex
    }
}

as_label!(Wait);

impl fmt::Display for Wait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: WAIT{}({})",
            self.as_event_label(),
            kind_marker(self.kind),
            self.mutex
        )
    }
}

/// A notification of waiters on a mutex.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notify {
    label: EventLabel,
    mutex: Loc,
    broadcast: bool,
}

impl Notify {
    pub fn new(mutex: Loc, broadcast: bool) -> Self {
        Self {
            label: EventLabel::detached(),
            mutex,
            broadcast,
        }
    }

    pub fn mutex(&self) -> &Loc {
        &self.mutex
    }

    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }
}

as_label!(Notify);

impl fmt::Display for Notify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}({})",
            self.as_event_label(),
            if self.broadcast {
                "NOTIFYALL"
            } else {
                "NOTIFY"
            },
            self.mutex
        )
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum LabelEnum {
    Init(Init),
    ThreadFork(ThreadFork),
    ThreadStart(ThreadStart),
    ThreadFinish(ThreadFinish),
    ThreadJoin(ThreadJoin),
    ReadAccess(ReadAccess),
    WriteAccess(WriteAccess),
    ReadModifyWrite(ReadModifyWrite),
    Lock(Lock),
    Unlock(Unlock),
    Wait(Wait),
    Notify(Notify),
}

macro_rules! match_and_run {
    ( $lab:expr, $name:ident $( , $arg:ident )* ) => {
        match $lab {
            LabelEnum::Init(l) => l.as_event_label().$name($($arg),*),
            LabelEnum::ThreadFork(l) => l.as_event_label().$name($($arg),*),
            LabelEnum::ThreadStart(l) => l.as_event_label().$name($($arg),*),
            LabelEnum::ThreadFinish(l) => l.as_event_label().$name($($arg),*),
            LabelEnum::ThreadJoin(l) => l.as_event_label().$name($($arg),*),
            LabelEnum::ReadAccess(l) => l.as_event_label().$name($($arg),*),
            LabelEnum::WriteAccess(l) => l.as_event_label().$name($($arg),*),
            LabelEnum::ReadModifyWrite(l) => l.as_event_label().$name($($arg),*),
            LabelEnum::Lock(l) => l.as_event_label().$name($($arg),*),
            LabelEnum::Unlock(l) => l.as_event_label().$name($($arg),*),
            LabelEnum::Wait(l) => l.as_event_label().$name($($arg),*),
            LabelEnum::Notify(l) => l.as_event_label().$name($($arg),*),
        }
    };
}

macro_rules! match_and_run_mut {
    ( $lab:expr, $name:ident $( , $arg:ident )* ) => {
        match $lab {
            LabelEnum::Init(l) => l.as_event_label_mut().$name($($arg),*),
            LabelEnum::ThreadFork(l) => l.as_event_label_mut().$name($($arg),*),
            LabelEnum::ThreadStart(l) => l.as_event_label_mut().$name($($arg),*),
            LabelEnum::ThreadFinish(l) => l.as_event_label_mut().$name($($arg),*),
            LabelEnum::ThreadJoin(l) => l.as_event_label_mut().$name($($arg),*),
            LabelEnum::ReadAccess(l) => l.as_event_label_mut().$name($($arg),*),
            LabelEnum::WriteAccess(l) => l.as_event_label_mut().$name($($arg),*),
            LabelEnum::ReadModifyWrite(l) => l.as_event_label_mut().$name($($arg),*),
            LabelEnum::Lock(l) => l.as_event_label_mut().$name($($arg),*),
            LabelEnum::Unlock(l) => l.as_event_label_mut().$name($($arg),*),
            LabelEnum::Wait(l) => l.as_event_label_mut().$name($($arg),*),
            LabelEnum::Notify(l) => l.as_event_label_mut().$name($($arg),*),
        }
    };
}

impl LabelEnum {
    pub fn pos(&self) -> Event {
        match_and_run!(self, pos)
    }

    pub(crate) fn thread(&self) -> ThreadId {
        match_and_run!(self, thread)
    }

    /// The global id assigned when the label entered its execution.
    pub fn stamp(&self) -> usize {
        match_and_run!(self, stamp)
    }

    pub(crate) fn set_stamp(&mut self, s: usize) {
        match_and_run_mut!(self, set_stamp, s)
    }

    pub(crate) fn set_pos(&mut self, p: Event) {
        match_and_run_mut!(self, set_pos, p)
    }

    pub fn kind(&self) -> LabelKind {
        match self {
            LabelEnum::Init(_)
            | LabelEnum::ThreadFork(_)
            | LabelEnum::ThreadFinish(_)
            | LabelEnum::WriteAccess(_)
            | LabelEnum::Unlock(_)
            | LabelEnum::Notify(_) => LabelKind::Send,
            LabelEnum::ThreadStart(s) => s.kind,
            LabelEnum::ThreadJoin(j) => j.kind,
            LabelEnum::ReadAccess(r) => r.kind,
            LabelEnum::Lock(l) => l.kind,
            LabelEnum::Wait(w) => w.kind,
            LabelEnum::ReadModifyWrite(_) => LabelKind::Total,
        }
    }

    pub fn sync_type(&self) -> SyncType {
        match self {
            LabelEnum::ThreadFinish(_) | LabelEnum::ThreadJoin(_) => SyncType::Barrier,
            _ => SyncType::Binary,
        }
    }

    /// Whether the thread may be suspended at this label.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            LabelEnum::ThreadFinish(_)
                | LabelEnum::ThreadJoin(_)
                | LabelEnum::Lock(_)
                | LabelEnum::Wait(_)
        )
    }

    /// Whether a blocking label has been satisfied.
    pub fn is_unblocked(&self) -> bool {
        match self {
            LabelEnum::ThreadJoin(j) => j.join_tids.is_empty(),
            LabelEnum::Lock(l) => l.kind != LabelKind::Request,
            LabelEnum::Wait(w) => w.kind != LabelKind::Request,
            _ => true,
        }
    }

    pub fn is_request(&self) -> bool {
        self.kind() == LabelKind::Request
    }

    pub fn is_response(&self) -> bool {
        self.kind() == LabelKind::Response
    }

    /// The recorded synchronization sources of a response label.
    pub fn sources(&self) -> &[Event] {
        match self {
            LabelEnum::ThreadStart(s) => &s.sources,
            LabelEnum::ThreadJoin(j) => &j.sources,
            LabelEnum::ReadAccess(r) => &r.sources,
            LabelEnum::Lock(l) => &l.sources,
            LabelEnum::Wait(w) => &w.sources,
            LabelEnum::ReadModifyWrite(u) => &u.read.sources,
            _ => &[],
        }
    }

    pub(crate) fn set_sources(&mut self, src: &[Event]) -> Result<(), String> {
        let slot = match self {
            LabelEnum::ThreadStart(s) => &mut s.sources,
            LabelEnum::ThreadJoin(j) => &mut j.sources,
            LabelEnum::ReadAccess(r) => &mut r.sources,
            LabelEnum::Lock(l) => &mut l.sources,
            LabelEnum::Wait(w) => &mut w.sources,
            other => {
                return Err(format!(
                    "only response labels record synchronization sources, got one that {}",
                    other.get_action_descr()
                ))
            }
        };
        *slot = SourceList::from_slice(src);
        Ok(())
    }

    // ==== synchronization ====

    /// Composes two labels into the response their meeting produces.
    /// Commutative; `Ok(None)` when the pair does not synchronize;
    /// `Err` when the pair is structurally impossible.
    pub fn synchronize(&self, other: &LabelEnum) -> Result<Option<LabelEnum>, BarrierRace> {
        if let Some(lab) = self.synchronize_directed(other)? {
            return Ok(Some(lab));
        }
        other.synchronize_directed(self)
    }

    /// Folds `synchronize` over a sequence of labels. The empty fold is
    /// the neutral element: a singleton folds to itself unchanged.
    pub fn synchronize_all<'a, I>(labels: I) -> Result<Option<LabelEnum>, BarrierRace>
    where
        I: IntoIterator<Item = &'a LabelEnum>,
    {
        let mut acc: Option<LabelEnum> = None;
        for lab in labels {
            acc = match acc {
                None => Some(lab.clone()),
                Some(cur) => match cur.synchronize(lab)? {
                    Some(next) => Some(next),
                    None => return Ok(None),
                },
            };
        }
        Ok(acc)
    }

    /// Directed half of `synchronize`: `self` acts as the send-like
    /// participant, `req` as the request.
    fn synchronize_directed(&self, req: &LabelEnum) -> Result<Option<LabelEnum>, BarrierRace> {
        let lab = match (self, req) {
            (LabelEnum::Init(_), LabelEnum::ThreadStart(s))
                if s.kind == LabelKind::Request && s.is_main =>
            {
                Some(LabelEnum::ThreadStart(s.responded()))
            }
            (LabelEnum::ThreadFork(fork), LabelEnum::ThreadStart(s))
                if s.kind == LabelKind::Request && fork.fork_tids.contains(&s.tid) =>
            {
                Some(LabelEnum::ThreadStart(s.responded()))
            }
            (LabelEnum::ThreadFinish(a), LabelEnum::ThreadFinish(b)) => {
                if let Some(&dup) = a.finished.intersection(&b.finished).next() {
                    return Err(BarrierRace::DuplicateThreadFinish { thread: dup });
                }
                let union = a.finished.union(&b.finished).copied().collect();
                Some(LabelEnum::ThreadFinish(ThreadFinish::new(union)))
            }
            (LabelEnum::ThreadFinish(fin), LabelEnum::ThreadJoin(join))
                if join.kind == LabelKind::Request || join.kind == LabelKind::Response =>
            {
                if fin.finished.is_subset(&join.join_tids) {
                    Some(LabelEnum::ThreadJoin(join.responded_minus(&fin.finished)))
                } else if fin.finished.is_disjoint(&join.join_tids) {
                    None
                } else {
                    return Err(BarrierRace::FinishOutsideJoinScope {
                        finished: fin.finished.clone(),
                        join_scope: join.join_tids.clone(),
                    });
                }
            }
            (LabelEnum::WriteAccess(w), LabelEnum::ReadAccess(r))
                if r.kind == LabelKind::Request && w.loc == r.loc =>
            {
                // Value and class come from the write, exclusivity from
                // the read.
                Some(LabelEnum::ReadAccess(
                    r.responded_with(w.value.clone(), w.class.clone()),
                ))
            }
            (LabelEnum::ReadModifyWrite(u), LabelEnum::ReadAccess(r))
                if r.kind == LabelKind::Request && u.write.loc == r.loc =>
            {
                Some(LabelEnum::ReadAccess(
                    r.responded_with(u.write.value.clone(), u.write.class.clone()),
                ))
            }
            (LabelEnum::Init(_), LabelEnum::ReadAccess(r)) if r.kind == LabelKind::Request => {
                Some(LabelEnum::ReadAccess(
                    r.responded_with(r.class.default_value(), r.class.clone()),
                ))
            }
            (LabelEnum::Unlock(u), LabelEnum::Lock(l))
                if l.kind == LabelKind::Request
                    && u.is_releasing()
                    && l.is_acquiring()
                    && u.mutex == l.mutex =>
            {
                Some(LabelEnum::Lock(l.responded()))
            }
            (LabelEnum::Init(_), LabelEnum::Lock(l))
                if l.kind == LabelKind::Request && l.is_acquiring() =>
            {
                Some(LabelEnum::Lock(l.responded()))
            }
            (LabelEnum::Notify(n), LabelEnum::Wait(w))
                if w.kind == LabelKind::Request && n.mutex == w.mutex =>
            {
                Some(LabelEnum::Wait(w.responded()))
            }
            // An initialization never wakes a waiter: spurious wake-ups
            // are not modeled.
            _ => None,
        };
        Ok(lab)
    }

    // ==== aggregation ====

    /// Fuses this label with the next same-thread label into a single
    /// total label, when the pair is aggregable. Lossless: the total
    /// exposes every observable value of the pair.
    pub fn aggregate(&self, next: &LabelEnum) -> Option<LabelEnum> {
        match (self, next) {
            (LabelEnum::ReadAccess(rq), LabelEnum::ReadAccess(rs))
                if rq.kind == LabelKind::Request
                    && rs.kind == LabelKind::Response
                    && rq.loc == rs.loc
                    && rq.class == rs.class
                    && rq.exclusive == rs.exclusive =>
            {
                let mut total = rs.clone();
                total.kind = LabelKind::Total;
                // The aggregate sits at the first member's position.
                total.label = rq.label.clone();
                Some(LabelEnum::ReadAccess(total))
            }
            (LabelEnum::ReadAccess(rt), LabelEnum::WriteAccess(w))
                if rt.kind == LabelKind::Total && rt.exclusive && w.exclusive && rt.loc == w.loc =>
            {
                Some(LabelEnum::ReadModifyWrite(ReadModifyWrite {
                    label: rt.label.clone(),
                    read: rt.clone(),
                    write: w.clone(),
                }))
            }
            (LabelEnum::ThreadStart(rq), LabelEnum::ThreadStart(rs))
                if rq.kind == LabelKind::Request
                    && rs.kind == LabelKind::Response
                    && rq.tid == rs.tid =>
            {
                let mut total = rs.clone();
                total.kind = LabelKind::Total;
                total.label = rq.label.clone();
                Some(LabelEnum::ThreadStart(total))
            }
            (LabelEnum::ThreadJoin(rq), LabelEnum::ThreadJoin(rs))
                if rq.kind == LabelKind::Request
                    && rs.kind == LabelKind::Response
                    && rs.join_tids.is_empty() =>
            {
                let mut total = rs.clone();
                total.kind = LabelKind::Total;
                total.label = rq.label.clone();
                Some(LabelEnum::ThreadJoin(total))
            }
            _ => None,
        }
    }

    // ==== replay ====

    /// Shape comparison up to the fields replay may rewrite (locations,
    /// values, mutex identities).
    fn compare_shape(&self, other: &LabelEnum) -> Result<(), String> {
        match (self, other) {
            (LabelEnum::Init(_), LabelEnum::Init(_)) => Ok(()),
            (LabelEnum::ThreadFork(s), LabelEnum::ThreadFork(o)) => {
                if s.fork_tids == o.fork_tids {
                    Ok(())
                } else {
                    Err(format!(
                        "Expected to fork threads {} but forked {}",
                        fmt_tids(&s.fork_tids),
                        fmt_tids(&o.fork_tids)
                    ))
                }
            }
            (LabelEnum::ThreadStart(s), LabelEnum::ThreadStart(o)) => {
                if s.kind == o.kind && s.tid == o.tid && s.is_main == o.is_main {
                    Ok(())
                } else {
                    Err(format!(
                        "Expected thread {} to start but thread {} started",
                        s.tid, o.tid
                    ))
                }
            }
            (LabelEnum::ThreadFinish(s), LabelEnum::ThreadFinish(o)) => {
                if s.finished == o.finished {
                    Ok(())
                } else {
                    Err(format!(
                        "Expected threads {} to finish but {} finished",
                        fmt_tids(&s.finished),
                        fmt_tids(&o.finished)
                    ))
                }
            }
            (LabelEnum::ThreadJoin(s), LabelEnum::ThreadJoin(o)) => {
                if s.kind == o.kind && s.join_tids == o.join_tids {
                    Ok(())
                } else {
                    Err(format!(
                        "Expected to join threads {} but joined {}",
                        fmt_tids(&s.join_tids),
                        fmt_tids(&o.join_tids)
                    ))
                }
            }
            (LabelEnum::ReadAccess(s), LabelEnum::ReadAccess(o)) => {
                if s.kind == o.kind && s.class == o.class && s.exclusive == o.exclusive {
                    Ok(())
                } else {
                    Err(format!(
                        "Expected a {:?} read of a {} but got a {:?} read of a {}",
                        s.kind, s.class, o.kind, o.class
                    ))
                }
            }
            (LabelEnum::WriteAccess(s), LabelEnum::WriteAccess(o)) => {
                if s.class == o.class && s.exclusive == o.exclusive {
                    Ok(())
                } else {
                    Err(format!(
                        "Expected a write of a {} but got a write of a {}",
                        s.class, o.class
                    ))
                }
            }
            (LabelEnum::ReadModifyWrite(s), LabelEnum::ReadModifyWrite(o)) => {
                LabelEnum::ReadAccess(s.read.clone())
                    .compare_shape(&LabelEnum::ReadAccess(o.read.clone()))?;
                LabelEnum::WriteAccess(s.write.clone())
                    .compare_shape(&LabelEnum::WriteAccess(o.write.clone()))
            }
            (LabelEnum::Lock(s), LabelEnum::Lock(o)) => {
                if s.kind == o.kind && s.depth == o.depth && s.count == o.count {
                    Ok(())
                } else {
                    Err(format!(
                        "Expected a lock at reentrance depth {} but got depth {}",
                        s.depth, o.depth
                    ))
                }
            }
            (LabelEnum::Unlock(s), LabelEnum::Unlock(o)) => {
                if s.depth == o.depth && s.count == o.count {
                    Ok(())
                } else {
                    Err(format!(
                        "Expected an unlock at reentrance depth {} but got depth {}",
                        s.depth, o.depth
                    ))
                }
            }
            (LabelEnum::Wait(s), LabelEnum::Wait(o)) => {
                if s.kind == o.kind {
                    Ok(())
                } else {
                    Err(format!(
                        "Expected a {:?} wait but got a {:?} wait",
                        s.kind, o.kind
                    ))
                }
            }
            (LabelEnum::Notify(s), LabelEnum::Notify(o)) => {
                if s.broadcast == o.broadcast {
                    Ok(())
                } else {
                    Err("Expected a notify with a different broadcast flag".to_string())
                }
            }
            _ => Err(format!(
                "At this point in the thread, it should have {} but it {} instead.",
                self.get_action_descr(),
                other.get_action_descr()
            )),
        }
    }

    /// Shape-preserving equality: same label up to locations, values and
    /// mutex identities.
    pub fn equal_up_to_replay(&self, other: &LabelEnum) -> bool {
        self.compare_shape(other).is_ok()
    }

    /// Rewrites this label's run-specific identities from `other`.
    /// Fails when the shapes differ; callers assert the result eagerly.
    pub fn replay_from(&mut self, other: &LabelEnum) -> Result<(), String> {
        self.compare_shape(other)?;
        match (self, other) {
            (LabelEnum::ReadAccess(s), LabelEnum::ReadAccess(o)) => {
                s.loc = o.loc.clone();
                s.value = o.value.clone();
            }
            (LabelEnum::WriteAccess(s), LabelEnum::WriteAccess(o)) => {
                s.loc = o.loc.clone();
                s.value = o.value.clone();
            }
            (LabelEnum::ReadModifyWrite(s), LabelEnum::ReadModifyWrite(o)) => {
                s.read.loc = o.read.loc.clone();
                s.read.value = o.read.value.clone();
                s.write.loc = o.write.loc.clone();
                s.write.value = o.write.value.clone();
            }
            (LabelEnum::Lock(s), LabelEnum::Lock(o)) => s.mutex = o.mutex.clone(),
            (LabelEnum::Unlock(s), LabelEnum::Unlock(o)) => s.mutex = o.mutex.clone(),
            (LabelEnum::Wait(s), LabelEnum::Wait(o)) => s.mutex = o.mutex.clone(),
            (LabelEnum::Notify(s), LabelEnum::Notify(o)) => s.mutex = o.mutex.clone(),
            _ => { /* thread labels carry no run-specific identities */ }
        }
        Ok(())
    }

    /// Validates that this label is a legal result of synchronizing with
    /// `source`: whenever `synchronize(source, x) == self` for some `x`,
    /// this predicate holds for both `source` and `x`.
    pub fn synchronized_from(&self, source: &LabelEnum, policy: &ReplayPolicy) -> bool {
        match self {
            LabelEnum::ThreadStart(s) if s.kind != LabelKind::Request => match source {
                LabelEnum::Init(_) => s.is_main,
                LabelEnum::ThreadFork(fork) => fork.fork_tids.contains(&s.tid),
                LabelEnum::ThreadStart(req) => {
                    req.kind == LabelKind::Request && req.tid == s.tid && req.is_main == s.is_main
                }
                _ => false,
            },
            LabelEnum::ThreadJoin(j) if j.kind != LabelKind::Request => match source {
                LabelEnum::ThreadFinish(fin) => {
                    !fin.finished.is_empty() && fin.finished.is_disjoint(&j.join_tids)
                }
                LabelEnum::ThreadJoin(req) => {
                    req.kind == LabelKind::Request && j.join_tids.is_subset(&req.join_tids)
                }
                _ => false,
            },
            LabelEnum::ThreadFinish(fin) => match source {
                LabelEnum::ThreadFinish(part) => part.finished.is_subset(&fin.finished),
                _ => false,
            },
            LabelEnum::ReadAccess(r) if r.kind != LabelKind::Request => match source {
                LabelEnum::Init(_) => r.value == Some(r.class.default_value()),
                LabelEnum::WriteAccess(w) => {
                    policy.locs_match(&w.loc, &r.loc)
                        && w.class == r.class
                        && r.value.as_ref() == Some(&w.value)
                }
                LabelEnum::ReadModifyWrite(u) => {
                    policy.locs_match(&u.write.loc, &r.loc)
                        && u.write.class == r.class
                        && r.value.as_ref() == Some(&u.write.value)
                }
                LabelEnum::ReadAccess(req) => {
                    req.kind == LabelKind::Request
                        && policy.locs_match(&req.loc, &r.loc)
                        && req.class == r.class
                        && req.exclusive == r.exclusive
                }
                _ => false,
            },
            LabelEnum::Lock(l) if l.kind != LabelKind::Request => match source {
                LabelEnum::Init(_) => l.is_acquiring(),
                LabelEnum::Unlock(u) => policy.locs_match(&u.mutex, &l.mutex) && u.is_releasing(),
                LabelEnum::Lock(req) => {
                    req.kind == LabelKind::Request
                        && policy.locs_match(&req.mutex, &l.mutex)
                        && req.depth == l.depth
                        && req.count == l.count
                }
                _ => false,
            },
            LabelEnum::Wait(w) if w.kind != LabelKind::Request => match source {
                LabelEnum::Notify(n) => policy.locs_match(&n.mutex, &w.mutex),
                LabelEnum::Wait(req) => {
                    req.kind == LabelKind::Request && policy.locs_match(&req.mutex, &w.mutex)
                }
                _ => false,
            },
            _ => false,
        }
    }

    pub(crate) fn get_action_descr(&self) -> String {
        match self {
            LabelEnum::Init(_) => "initialized the execution".to_string(),
            LabelEnum::ThreadFork(_) => "forked threads".to_string(),
            LabelEnum::ThreadStart(_) => "started".to_string(),
            LabelEnum::ThreadFinish(_) => "finished".to_string(),
            LabelEnum::ThreadJoin(_) => "joined threads".to_string(),
            LabelEnum::ReadAccess(_) => "read a memory location".to_string(),
            LabelEnum::WriteAccess(_) => "wrote a memory location".to_string(),
            LabelEnum::ReadModifyWrite(_) => "performed an atomic update".to_string(),
            LabelEnum::Lock(_) => "acquired a mutex".to_string(),
            LabelEnum::Unlock(_) => "released a mutex".to_string(),
            LabelEnum::Wait(_) => "waited on a mutex".to_string(),
            LabelEnum::Notify(_) => "notified a mutex".to_string(),
        }
    }
}

impl fmt::Display for LabelEnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelEnum::Init(lab) => write!(f, "{}", lab),
            LabelEnum::ThreadFork(lab) => write!(f, "{}", lab),
            LabelEnum::ThreadStart(lab) => write!(f, "{}", lab),
            LabelEnum::ThreadFinish(lab) => write!(f, "{}", lab),
            LabelEnum::ThreadJoin(lab) => write!(f, "{}", lab),
            LabelEnum::ReadAccess(lab) => write!(f, "{}", lab),
            LabelEnum::WriteAccess(lab) => write!(f, "{}", lab),
            LabelEnum::ReadModifyWrite(lab) => write!(f, "{}", lab),
            LabelEnum::Lock(lab) => write!(f, "{}", lab),
            LabelEnum::Unlock(lab) => write!(f, "{}", lab),
            LabelEnum::Wait(lab) => write!(f, "{}", lab),
            LabelEnum::Notify(lab) => write!(f, "{}", lab),
        }
    }
}

impl fmt::Debug for LabelEnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
