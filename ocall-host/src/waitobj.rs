/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */
//! Host-native wait primitive emulation.
//!
//! The multiplexer is written against the wait model of the original host
//! platform: manual-reset/auto-reset event objects and a bounded
//! wait-for-any-of-many call. [`WaitEvent`] and [`wait_any`] reproduce that
//! model portably. Signal and wait may be called from any thread without
//! external locking.
//!
//! An auto-reset event delivers each signal to exactly one waiter: if a
//! waiter is blocked, it is woken and the event clears; otherwise the signal
//! latches until the next wait begins. A manual-reset event stays signaled
//! until [`WaitEvent::reset`] and wakes every waiter.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Upper bound of the native wait-for-any primitive.
///
/// A readiness set may hold at most `WAIT_MAX_OBJECTS - 1` registrations,
/// since the wake object always occupies the last slot.
pub const WAIT_MAX_OBJECTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitAny {
    /// The object at this index (into the slice passed to [`wait_any`])
    /// was signaled. Lowest index wins when several are signaled.
    Signaled(usize),
    TimedOut,
}

#[derive(Default)]
struct Waiter {
    slot: Mutex<Option<usize>>,
    cond: Condvar,
}

impl Waiter {
    /// Delivers `idx` if this waiter has not been satisfied yet.
    fn offer(&self, idx: usize) -> bool {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_none() {
            *slot = Some(idx);
            self.cond.notify_one();
            true
        } else {
            false
        }
    }
}

struct EventState {
    signaled: bool,
    waiters: VecDeque<(Arc<Waiter>, usize)>,
}

pub struct WaitEvent {
    mode: ResetMode,
    state: Mutex<EventState>,
}

impl WaitEvent {
    pub fn new(mode: ResetMode) -> WaitEvent {
        WaitEvent {
            mode,
            state: Mutex::new(EventState {
                signaled: false,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Signals the event.
    ///
    /// Auto-reset: wakes the longest-blocked waiter, or latches if none is
    /// blocked. Manual-reset: latches and wakes every blocked waiter.
    pub fn signal(&self) {
        let mut st = self.state.lock().unwrap();
        match self.mode {
            ResetMode::Auto => {
                while let Some((waiter, idx)) = st.waiters.pop_front() {
                    if waiter.offer(idx) {
                        return;
                    }
                    // Waiter was already satisfied by another object; it will
                    // deregister itself. Try the next one.
                }
                st.signaled = true;
            }
            ResetMode::Manual => {
                st.signaled = true;
                for (waiter, idx) in st.waiters.drain(..) {
                    let _ = waiter.offer(idx);
                }
            }
        }
    }

    /// Clears a manual-reset event. No effect needed for auto-reset events,
    /// but permitted: it discards a latched signal.
    pub fn reset(&self) {
        self.state.lock().unwrap().signaled = false;
    }

    pub fn is_signaled(&self) -> bool {
        self.state.lock().unwrap().signaled
    }

    /// Consumes a latched signal, if any.
    fn try_consume(&self) -> bool {
        let mut st = self.state.lock().unwrap();
        if st.signaled {
            if self.mode == ResetMode::Auto {
                st.signaled = false;
            }
            true
        } else {
            false
        }
    }

    /// Registers a waiter, or reports (and for auto-reset, consumes) an
    /// already-latched signal. Returns `false` if the event was signaled.
    fn register(&self, waiter: &Arc<Waiter>, idx: usize) -> bool {
        let mut st = self.state.lock().unwrap();
        if st.signaled {
            if self.mode == ResetMode::Auto {
                st.signaled = false;
            }
            false
        } else {
            st.waiters.push_back((waiter.clone(), idx));
            true
        }
    }

    fn deregister(&self, waiter: &Arc<Waiter>) {
        let mut st = self.state.lock().unwrap();
        st.waiters.retain(|(w, _)| !Arc::ptr_eq(w, waiter));
    }
}

/// Blocks until any of `objects` is signaled or `timeout` elapses
/// (`None` waits indefinitely).
///
/// At most one signal is consumed per call. When several objects are already
/// signaled on entry, the lowest index is reported; there is no fairness
/// guarantee beyond that.
///
/// # Panics
/// Panics if `objects` is empty or longer than [`WAIT_MAX_OBJECTS`]; the
/// registry enforces both bounds before calling.
pub fn wait_any(objects: &[Arc<WaitEvent>], timeout: Option<Duration>) -> WaitAny {
    assert!(!objects.is_empty());
    assert!(objects.len() <= WAIT_MAX_OBJECTS);

    for (idx, ev) in objects.iter().enumerate() {
        if ev.try_consume() {
            return WaitAny::Signaled(idx);
        }
    }

    let waiter = Arc::new(Waiter::default());
    let mut registered = 0;
    let mut latched = None;
    for (idx, ev) in objects.iter().enumerate() {
        if ev.register(&waiter, idx) {
            registered = idx + 1;
        } else {
            latched = Some(idx);
            registered = idx;
            break;
        }
    }

    if let Some(idx) = latched {
        for ev in objects.iter().take(registered) {
            ev.deregister(&waiter);
        }
        // A delivery that raced in before deregistration takes precedence;
        // restore the latch we consumed so its signal is not lost.
        return match waiter.slot.lock().unwrap().take() {
            Some(delivered) => {
                objects[idx].signal();
                WaitAny::Signaled(delivered)
            }
            None => WaitAny::Signaled(idx),
        };
    }

    let start = Instant::now();
    let mut slot = waiter.slot.lock().unwrap();
    loop {
        if let Some(idx) = *slot {
            drop(slot);
            for ev in objects {
                ev.deregister(&waiter);
            }
            return WaitAny::Signaled(idx);
        }
        match timeout {
            None => slot = waiter.cond.wait(slot).unwrap(),
            Some(limit) => {
                let elapsed = start.elapsed();
                if elapsed >= limit {
                    break;
                }
                slot = waiter.cond.wait_timeout(slot, limit - elapsed).unwrap().0;
            }
        }
    }
    drop(slot);
    for ev in objects {
        ev.deregister(&waiter);
    }
    // A signal delivered between the timeout decision and deregistration must
    // not be dropped.
    let late = *waiter.slot.lock().unwrap();
    match late {
        Some(idx) => WaitAny::Signaled(idx),
        None => WaitAny::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn ev(mode: ResetMode) -> Arc<WaitEvent> {
        Arc::new(WaitEvent::new(mode))
    }

    #[test]
    fn latched_signal_satisfies_next_wait() {
        let e = ev(ResetMode::Auto);
        e.signal();
        assert_eq!(wait_any(&[e.clone()], Some(Duration::from_millis(0))), WaitAny::Signaled(0));
        // auto-reset: consumed by delivery
        assert_eq!(wait_any(&[e], Some(Duration::from_millis(10))), WaitAny::TimedOut);
    }

    #[test]
    fn manual_reset_persists_until_reset() {
        let e = ev(ResetMode::Manual);
        e.signal();
        assert_eq!(wait_any(&[e.clone()], None), WaitAny::Signaled(0));
        assert_eq!(wait_any(&[e.clone()], None), WaitAny::Signaled(0));
        e.reset();
        assert_eq!(wait_any(&[e], Some(Duration::from_millis(10))), WaitAny::TimedOut);
    }

    #[test]
    fn lowest_index_wins() {
        let a = ev(ResetMode::Auto);
        let b = ev(ResetMode::Auto);
        a.signal();
        b.signal();
        assert_eq!(wait_any(&[a.clone(), b.clone()], None), WaitAny::Signaled(0));
        assert_eq!(wait_any(&[a, b], None), WaitAny::Signaled(1));
    }

    #[test]
    fn timeout_without_signal() {
        let e = ev(ResetMode::Auto);
        let start = Instant::now();
        assert_eq!(wait_any(&[e], Some(Duration::from_millis(50))), WaitAny::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn cross_thread_signal_wakes_blocked_waiter() {
        let e = ev(ResetMode::Auto);
        let e2 = e.clone();
        let t = thread::spawn(move || wait_any(&[e2], Some(Duration::from_secs(5))));
        thread::sleep(Duration::from_millis(50));
        e.signal();
        assert_eq!(t.join().unwrap(), WaitAny::Signaled(0));
    }

    #[test]
    fn auto_reset_wakes_exactly_one_of_many() {
        let e = ev(ResetMode::Auto);
        let results = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let e = e.clone();
                    scope.spawn(move |_| wait_any(&[e], Some(Duration::from_millis(500))))
                })
                .collect();
            thread::sleep(Duration::from_millis(100));
            e.signal();
            handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
        })
        .unwrap();
        let woken = results.iter().filter(|r| **r == WaitAny::Signaled(0)).count();
        let timed_out = results.iter().filter(|r| **r == WaitAny::TimedOut).count();
        assert_eq!(woken, 1);
        assert_eq!(timed_out, 3);
    }
}
