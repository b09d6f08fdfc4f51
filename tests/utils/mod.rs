use log::LevelFilter;
use simplelog::{CombinedLogger, SimpleLogger};
use std::sync::Once;

use tracelin::event_label::{
    LabelEnum, Lock, ReadAccess, ThreadFork, ThreadStart, Unlock, WriteAccess,
};
use tracelin::thread::{construct_thread_id, main_thread_id};
use tracelin::{Event, ExecutionBuilder, Loc, ThreadId, Val, ValueClass};

static INIT_LOG: Once = Once::new();

#[allow(dead_code)] // Only used in tests
pub fn init_log() {
    INIT_LOG.call_once(|| {
        CombinedLogger::init(vec![SimpleLogger::new(
            LevelFilter::Trace,
            simplelog::Config::default(),
        )])
        .unwrap()
    });
}

#[allow(dead_code)]
pub fn t(n: u32) -> ThreadId {
    construct_thread_id(n)
}

#[allow(dead_code)]
pub fn int_class() -> ValueClass {
    ValueClass::of::<i32>()
}

#[allow(dead_code)]
pub fn iv(n: i32) -> Val {
    Val::new(n)
}

/// Record the main thread's start pair, sourced from initialization.
#[allow(dead_code)]
pub fn begin_main(b: &mut ExecutionBuilder) {
    b.begin_thread(main_thread_id()).unwrap();
    b.append_response(
        LabelEnum::ThreadStart(ThreadStart::response(main_thread_id(), true)),
        &[Event::init()],
    )
    .unwrap();
}

/// Record a spawned thread's start pair, sourced from its fork event.
#[allow(dead_code)]
pub fn begin_spawned(b: &mut ExecutionBuilder, tid: ThreadId, fork: Event) {
    b.begin_thread(tid).unwrap();
    b.append_response(
        LabelEnum::ThreadStart(ThreadStart::response(tid, false)),
        &[fork],
    )
    .unwrap();
}

/// Record a main thread that forks workers t1..=tn and finishes.
#[allow(dead_code)]
pub fn fork_workers(b: &mut ExecutionBuilder, n: u32) -> Event {
    begin_main(b);
    let fork = b
        .append_send(LabelEnum::ThreadFork(ThreadFork::new(
            (1..=n).map(construct_thread_id).collect(),
        )))
        .unwrap();
    b.end_thread().unwrap();
    fork
}

#[allow(dead_code)]
pub fn write(b: &mut ExecutionBuilder, loc: &'static str, val: i32) -> Event {
    b.append_send(LabelEnum::WriteAccess(WriteAccess::new(
        Loc::new(loc),
        iv(val),
        int_class(),
        false,
    )))
    .unwrap()
}

/// Record a read request/response pair observing `val` from `src`.
/// Returns the response event.
#[allow(dead_code)]
pub fn read(b: &mut ExecutionBuilder, loc: &'static str, val: i32, src: Event) -> Event {
    b.append_request(LabelEnum::ReadAccess(ReadAccess::request(
        Loc::new(loc),
        int_class(),
        false,
    )))
    .unwrap();
    b.append_response(
        LabelEnum::ReadAccess(ReadAccess::response(
            Loc::new(loc),
            iv(val),
            int_class(),
            false,
        )),
        &[src],
    )
    .unwrap()
}

/// Record a compare-and-set: an exclusive read observing `expect` from
/// `src`, followed by the exclusive write installing `new`. Returns the
/// write event (the one later reads synchronize with).
#[allow(dead_code)]
pub fn rmw(b: &mut ExecutionBuilder, loc: &'static str, expect: i32, new: i32, src: Event) -> Event {
    b.append_request(LabelEnum::ReadAccess(ReadAccess::request(
        Loc::new(loc),
        int_class(),
        true,
    )))
    .unwrap();
    b.append_response(
        LabelEnum::ReadAccess(ReadAccess::response(
            Loc::new(loc),
            iv(expect),
            int_class(),
            true,
        )),
        &[src],
    )
    .unwrap();
    b.append_send(LabelEnum::WriteAccess(WriteAccess::new(
        Loc::new(loc),
        iv(new),
        int_class(),
        true,
    )))
    .unwrap()
}

/// Record a lock request/response pair acquiring from `src` (an unlock
/// event, or the initialization event for the first acquisition).
#[allow(dead_code)]
pub fn lock(b: &mut ExecutionBuilder, mutex: &'static str, src: Event) -> Event {
    b.append_request(LabelEnum::Lock(Lock::request(Loc::new(mutex), 0, 0)))
        .unwrap();
    b.append_response(
        LabelEnum::Lock(Lock::response(Loc::new(mutex), 0, 0)),
        &[src],
    )
    .unwrap()
}

#[allow(dead_code)]
pub fn unlock(b: &mut ExecutionBuilder, mutex: &'static str) -> Event {
    b.append_send(LabelEnum::Unlock(Unlock::new(Loc::new(mutex), 0, 0)))
        .unwrap()
}
