/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */
//! End-to-end readiness multiplexing over real sockets.

use ocall_abi::InterestFlags;
use ocall_host::poll::{PollRegistry, WaitTarget};
use ocall_host::Error;
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const READABLE_TOKEN: u64 = 1;
const WRITABLE_TOKEN: u64 = 2;
const LIVE_TOKEN: u64 = 4;

fn registry() -> PollRegistry {
    let _ = env_logger::builder().is_test(true).try_init();
    PollRegistry::new().unwrap()
}

#[test]
fn socket_becomes_ready_when_peer_writes() {
    let registry = registry();
    let (mut tx, rx) = UnixStream::pair().unwrap();
    let set = registry.create().unwrap();
    registry
        .add(
            set,
            WaitTarget::Socket(rx.as_raw_fd()),
            InterestFlags::READABLE,
            READABLE_TOKEN,
        )
        .unwrap();

    // nothing written yet: the wait must time out, not spin or misfire
    let events = registry
        .wait(set, 8, Some(Duration::from_millis(100)))
        .unwrap();
    assert!(events.is_empty());

    tx.write_all(b"ping").unwrap();
    let events = registry.wait(set, 8, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, READABLE_TOKEN);
    assert_eq!(events[0].mask, InterestFlags::READABLE.bits());
    drop(rx);
}

#[test]
fn readiness_is_level_triggered_until_drained() {
    let registry = registry();
    let (mut tx, mut rx) = UnixStream::pair().unwrap();
    let set = registry.create().unwrap();
    registry
        .add(
            set,
            WaitTarget::Socket(rx.as_raw_fd()),
            InterestFlags::READABLE,
            READABLE_TOKEN,
        )
        .unwrap();

    tx.write_all(b"data").unwrap();
    // the condition persists across waits while unconsumed
    for _ in 0..3 {
        let events = registry.wait(set, 8, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, READABLE_TOKEN);
    }
    let mut buf = [0u8; 4];
    rx.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"data");
}

#[test]
fn one_event_per_wait_lowest_registration_first() {
    let registry = registry();
    let (mut tx, rx) = UnixStream::pair().unwrap();
    let (wr, _wr_peer) = UnixStream::pair().unwrap();
    let set = registry.create().unwrap();
    registry
        .add(
            set,
            WaitTarget::Socket(rx.as_raw_fd()),
            InterestFlags::READABLE,
            READABLE_TOKEN,
        )
        .unwrap();
    registry
        .add(
            set,
            WaitTarget::Socket(wr.as_raw_fd()),
            InterestFlags::WRITABLE,
            WRITABLE_TOKEN,
        )
        .unwrap();

    tx.write_all(b"x").unwrap();
    // give the background poll a moment to latch both conditions
    thread::sleep(Duration::from_millis(100));
    // both registrations are ready; exactly one is reported per call, and
    // the earlier registration wins the tie
    let events = registry.wait(set, 8, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, READABLE_TOKEN);

    registry.delete(set, rx.as_raw_fd()).unwrap();
    let events = registry.wait(set, 8, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, WRITABLE_TOKEN);
    assert_eq!(events[0].mask, InterestFlags::WRITABLE.bits());
}

#[test]
fn full_interest_mask_is_reported_for_a_partially_ready_handle() {
    let registry = registry();
    let (mut tx, rx) = UnixStream::pair().unwrap();
    let set = registry.create().unwrap();
    let mask = InterestFlags::READABLE | InterestFlags::HANGUP;
    registry
        .add(set, WaitTarget::Socket(rx.as_raw_fd()), mask, READABLE_TOKEN)
        .unwrap();

    tx.write_all(b"y").unwrap();
    let events = registry.wait(set, 8, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(events.len(), 1);
    // no hangup occurred, but the native primitive cannot split the mask
    assert_eq!(events[0].mask, mask.bits());
}

#[test]
fn wake_interrupts_exactly_one_of_several_blocked_waits() {
    let registry = Arc::new(registry());
    let mut handles = Vec::new();
    for _ in 0..4 {
        let registry = registry.clone();
        let set = registry.create().unwrap();
        handles.push(thread::spawn(move || {
            registry.wait(set, 8, Some(Duration::from_millis(600)))
        }));
    }
    thread::sleep(Duration::from_millis(100));
    registry.wake().unwrap();

    let mut interrupted = 0;
    let mut timed_out = 0;
    for h in handles {
        match h.join().unwrap() {
            Err(Error::Interrupted) => interrupted += 1,
            Ok(events) => {
                assert!(events.is_empty());
                timed_out += 1;
            }
            other => panic!("unexpected wait outcome: {:?}", other),
        }
    }
    assert_eq!(interrupted, 1);
    assert_eq!(timed_out, 3);
}

#[test]
fn wake_interrupts_a_wait_blocked_on_an_unready_registration() {
    let registry = Arc::new(registry());
    let (_tx, rx) = UnixStream::pair().unwrap();
    let set = registry.create().unwrap();
    registry
        .add(
            set,
            WaitTarget::Socket(rx.as_raw_fd()),
            InterestFlags::READABLE,
            READABLE_TOKEN,
        )
        .unwrap();
    let registry2 = registry.clone();
    let t = thread::spawn(move || registry2.wait(set, 8, Some(Duration::from_secs(5))));
    thread::sleep(Duration::from_millis(100));
    registry.wake().unwrap();
    assert_eq!(t.join().unwrap(), Err(Error::Interrupted));
    drop(rx);
}

#[test]
fn ready_registration_wins_over_a_latched_wake() {
    let registry = registry();
    let (mut tx, rx) = UnixStream::pair().unwrap();
    let set = registry.create().unwrap();
    registry
        .add(
            set,
            WaitTarget::Socket(rx.as_raw_fd()),
            InterestFlags::READABLE,
            READABLE_TOKEN,
        )
        .unwrap();
    tx.write_all(b"w").unwrap();
    thread::sleep(Duration::from_millis(100)); // let the readiness latch
    registry.wake().unwrap();
    // the registration occupies a lower wait slot than the wake object
    let events = registry.wait(set, 8, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, READABLE_TOKEN);
    // with the registration gone the latched wake is finally consumed
    registry.delete(set, rx.as_raw_fd()).unwrap();
    assert_eq!(
        registry.wait(set, 8, Some(Duration::from_secs(5))),
        Err(Error::Interrupted)
    );
}

fn process_cpu_ticks() -> u64 {
    let stat = std::fs::read_to_string("/proc/self/stat").unwrap();
    // utime and stime are the 14th and 15th fields; skip past the
    // parenthesized command name first
    let rest = stat.rsplit(')').next().unwrap();
    let fields: Vec<&str> = rest.split_whitespace().collect();
    fields[11].parse::<u64>().unwrap() + fields[12].parse::<u64>().unwrap()
}

#[test]
fn watch_on_a_closed_fd_is_dropped_without_spinning() {
    let registry = registry();
    let set = registry.create().unwrap();
    let (tx, rx) = UnixStream::pair().unwrap();
    registry
        .add(
            set,
            WaitTarget::Socket(rx.as_raw_fd()),
            InterestFlags::READABLE,
            READABLE_TOKEN,
        )
        .unwrap();
    // both ends closed with no delete: the fd can never become ready
    drop((tx, rx));
    thread::sleep(Duration::from_millis(100));

    let before = process_cpu_ticks();
    thread::sleep(Duration::from_secs(1));
    let spent = process_cpu_ticks() - before;
    // a loop re-polling the dead fd would burn roughly a full second here
    assert!(spent < 50, "burned {} cpu ticks while idle", spent);

    // the binder still serves live sockets afterwards
    let (mut tx2, rx2) = UnixStream::pair().unwrap();
    registry
        .add(
            set,
            WaitTarget::Socket(rx2.as_raw_fd()),
            InterestFlags::READABLE,
            LIVE_TOKEN,
        )
        .unwrap();
    tx2.write_all(b"z").unwrap();
    let events = registry.wait(set, 8, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, LIVE_TOKEN);
    drop(rx2);
}

#[test]
fn close_releases_registrations_and_invalidates_the_handle() {
    let registry = registry();
    let (tx, rx) = UnixStream::pair().unwrap();
    let set = registry.create().unwrap();
    registry
        .add(
            set,
            WaitTarget::Socket(rx.as_raw_fd()),
            InterestFlags::READABLE,
            READABLE_TOKEN,
        )
        .unwrap();
    registry.close(set).unwrap();
    assert_eq!(registry.close(set), Err(Error::InvalidArgument));
    assert_eq!(
        registry.delete(set, rx.as_raw_fd()),
        Err(Error::InvalidArgument)
    );
    drop((tx, rx));
}

#[test]
fn file_targets_are_tracked_but_never_spuriously_ready() {
    let registry = registry();
    let set = registry.create().unwrap();
    registry
        .add(set, WaitTarget::File(0), InterestFlags::READABLE, 9)
        .unwrap();
    let events = registry
        .wait(set, 8, Some(Duration::from_millis(100)))
        .unwrap();
    assert!(events.is_empty());
    let regs = registry.registrations(set).unwrap();
    assert_eq!(regs.len(), 1);
    assert_eq!(regs[0].target, WaitTarget::File(0));
}
