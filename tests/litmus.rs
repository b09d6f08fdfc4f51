//! Litmus-style checks of the sequential-consistency verdict.
//!
//! Test names describe the threads of the recorded execution: `w` is a
//! write, `r` a read (request plus response), `u` an atomic update,
//! with underscores separating threads. The trailing identifier states
//! the recorded outcome under test.

use tracelin::event_label::{LabelEnum, ReadAccess, WriteAccess};
use tracelin::{Event, ExecutionBuilder, Inconsistency, Loc};

mod utils;
use utils::*;

#[test]
fn w_r_reads_from_the_write() {
    let mut b = ExecutionBuilder::new();
    let fork = fork_workers(&mut b, 2);

    begin_spawned(&mut b, t(1), fork);
    let w = write(&mut b, "x", 1);
    b.end_thread().unwrap();

    begin_spawned(&mut b, t(2), fork);
    read(&mut b, "x", 1, w);
    b.end_thread().unwrap();

    assert_eq!(tracelin::check(&b.build()), None);
}

#[test]
fn w_r_reads_the_default() {
    let mut b = ExecutionBuilder::new();
    let fork = fork_workers(&mut b, 2);

    begin_spawned(&mut b, t(1), fork);
    write(&mut b, "x", 1);
    b.end_thread().unwrap();

    begin_spawned(&mut b, t(2), fork);
    read(&mut b, "x", 0, Event::init());
    b.end_thread().unwrap();

    assert_eq!(tracelin::check(&b.build()), None);
}

#[test]
fn w_r_rebound_to_a_stale_value_is_refuted() {
    let mut b = ExecutionBuilder::new();
    let fork = fork_workers(&mut b, 2);

    begin_spawned(&mut b, t(1), fork);
    let w = write(&mut b, "x", 1);
    b.end_thread().unwrap();

    begin_spawned(&mut b, t(2), fork);
    let rsp = read(&mut b, "x", 1, w);
    b.end_thread().unwrap();

    // A fresh run observed a different value at the same shape; after
    // rebinding, the recorded source no longer justifies the response.
    let mut exec = b.build();
    exec.rebind(
        rsp,
        &LabelEnum::ReadAccess(ReadAccess::response(
            Loc::new("x"),
            iv(2),
            int_class(),
            false,
        )),
    )
    .unwrap();

    match tracelin::check(&exec) {
        Some(Inconsistency::SequentialConsistency(v)) => {
            assert_eq!(v.mismatched, Some((rsp, w)));
        }
        other => panic!("expected a source mismatch, got {:?}", other),
    }
}

/// Store buffer: each thread writes one location and reads the other.
fn store_buffer(v1: i32, v2: i32) -> tracelin::Execution {
    let mut b = ExecutionBuilder::new();
    let fork = fork_workers(&mut b, 2);

    begin_spawned(&mut b, t(1), fork);
    let wx = write(&mut b, "x", 1);
    begin_spawned(&mut b, t(2), fork);
    let wy = write(&mut b, "y", 1);

    b.begin_thread(t(1)).unwrap();
    read(&mut b, "y", v1, if v1 == 0 { Event::init() } else { wy });
    b.end_thread().unwrap();

    b.begin_thread(t(2)).unwrap();
    read(&mut b, "x", v2, if v2 == 0 { Event::init() } else { wx });
    b.end_thread().unwrap();

    b.build()
}

#[test]
fn wr_wr_store_buffer_00_is_inconsistent() {
    match tracelin::check(&store_buffer(0, 0)) {
        Some(Inconsistency::SequentialConsistency(v)) => {
            assert_eq!(v.mismatched, None);
            assert!(!v.witness.is_empty());
            assert!(!v.stuck.is_empty());
        }
        None => panic!("store buffer (0, 0) must not be sequentially consistent"),
    }
}

#[test]
fn wr_wr_store_buffer_other_outcomes_are_consistent() {
    for (v1, v2) in [(1, 0), (0, 1), (1, 1)] {
        assert_eq!(
            tracelin::check(&store_buffer(v1, v2)),
            None,
            "store buffer ({}, {}) should be consistent",
            v1,
            v2
        );
    }
}

#[test]
fn u_r_cas_before_read() {
    let mut b = ExecutionBuilder::new();
    let fork = fork_workers(&mut b, 2);

    begin_spawned(&mut b, t(1), fork);
    let upd = rmw(&mut b, "x", 0, 1, Event::init());
    b.end_thread().unwrap();

    begin_spawned(&mut b, t(2), fork);
    read(&mut b, "x", 1, upd);
    b.end_thread().unwrap();

    assert_eq!(tracelin::check(&b.build()), None);
}

#[test]
fn u_r_read_before_cas() {
    let mut b = ExecutionBuilder::new();
    let fork = fork_workers(&mut b, 2);

    begin_spawned(&mut b, t(1), fork);
    rmw(&mut b, "x", 0, 1, Event::init());
    b.end_thread().unwrap();

    begin_spawned(&mut b, t(2), fork);
    read(&mut b, "x", 0, Event::init());
    b.end_thread().unwrap();

    assert_eq!(tracelin::check(&b.build()), None);
}

#[test]
fn w_u_failed_cas_records_only_the_read() {
    let mut b = ExecutionBuilder::new();
    let fork = fork_workers(&mut b, 2);

    begin_spawned(&mut b, t(1), fork);
    let w = write(&mut b, "x", 2);
    b.end_thread().unwrap();

    // The update lost: its exclusive read observed 2, and no exclusive
    // write follows.
    begin_spawned(&mut b, t(2), fork);
    b.append_request(LabelEnum::ReadAccess(ReadAccess::request(
        Loc::new("x"),
        int_class(),
        true,
    )))
    .unwrap();
    b.append_response(
        LabelEnum::ReadAccess(ReadAccess::response(Loc::new("x"), iv(2), int_class(), true)),
        &[w],
    )
    .unwrap();
    b.end_thread().unwrap();

    assert_eq!(tracelin::check(&b.build()), None);
}

#[test]
fn wu_same_thread_stale_cas_is_inconsistent() {
    let mut b = ExecutionBuilder::new();
    let fork = fork_workers(&mut b, 1);

    // Program order puts the update after the write, so its exclusive
    // read can no longer observe the initial value.
    begin_spawned(&mut b, t(1), fork);
    write(&mut b, "x", 2);
    rmw(&mut b, "x", 0, 1, Event::init());
    b.end_thread().unwrap();

    assert!(tracelin::check(&b.build()).is_some());
}

#[test]
fn exclusive_write_serves_later_plain_reads() {
    let mut b = ExecutionBuilder::new();
    let fork = fork_workers(&mut b, 2);

    begin_spawned(&mut b, t(1), fork);
    let upd = rmw(&mut b, "x", 0, 1, Event::init());
    b.end_thread().unwrap();

    begin_spawned(&mut b, t(2), fork);
    read(&mut b, "x", 1, upd);
    // A second read of the same location keeps observing it.
    read(&mut b, "x", 1, upd);
    b.end_thread().unwrap();

    assert_eq!(tracelin::check(&b.build()), None);
}

#[test]
fn program_order_covering_is_pluggable() {
    use tracelin::covering::ProgramOrder;
    use tracelin::{Config, SequentialConsistencyChecker};

    let checker = SequentialConsistencyChecker::with_covering(&Config::default(), ProgramOrder);
    assert_eq!(checker.check(&store_buffer(1, 1)), None);
    assert!(checker.check(&store_buffer(0, 0)).is_some());
}

#[test]
fn relaxed_locations_tolerate_rebound_addresses() {
    use tracelin::{Config, SequentialConsistencyChecker};

    let mut b = ExecutionBuilder::new();
    let fork = fork_workers(&mut b, 2);

    begin_spawned(&mut b, t(1), fork);
    let w = write(&mut b, "x", 0);
    b.end_thread().unwrap();

    begin_spawned(&mut b, t(2), fork);
    let req = b
        .append_request(LabelEnum::ReadAccess(ReadAccess::request(
            Loc::new("x"),
            int_class(),
            false,
        )))
        .unwrap();
    let rsp = b
        .append_response(
            LabelEnum::ReadAccess(ReadAccess::response(
                Loc::new("x"),
                iv(0),
                int_class(),
                false,
            )),
            &[w],
        )
        .unwrap();
    b.end_thread().unwrap();
    let mut exec = b.build();

    // In a fresh run the field lives at a different address; rebind the
    // read pair to it while its recorded source keeps the old identity.
    exec.rebind(
        req,
        &LabelEnum::ReadAccess(ReadAccess::request(Loc::new("x2"), int_class(), false)),
    )
    .unwrap();
    exec.rebind(
        rsp,
        &LabelEnum::ReadAccess(ReadAccess::response(
            Loc::new("x2"),
            iv(0),
            int_class(),
            false,
        )),
    )
    .unwrap();

    let strict = SequentialConsistencyChecker::new(&Config::default());
    assert!(strict.check(&exec).is_some());

    let relaxed = SequentialConsistencyChecker::new(
        &Config::builder().with_relaxed_locations(true).build(),
    );
    assert_eq!(relaxed.check(&exec), None);
}

#[test]
fn determinism_of_the_verdict() {
    let first = tracelin::check(&store_buffer(0, 0));
    let second = tracelin::check(&store_buffer(0, 0));
    assert_eq!(first, second);
}

#[test]
fn writes_alone_are_always_consistent() {
    let mut b = ExecutionBuilder::new();
    let fork = fork_workers(&mut b, 2);

    begin_spawned(&mut b, t(1), fork);
    b.append_send(LabelEnum::WriteAccess(WriteAccess::new(
        Loc::new("x"),
        iv(1),
        int_class(),
        false,
    )))
    .unwrap();
    b.end_thread().unwrap();

    begin_spawned(&mut b, t(2), fork);
    write(&mut b, "x", 2);
    b.end_thread().unwrap();

    assert_eq!(tracelin::check(&b.build()), None);
}
