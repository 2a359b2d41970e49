/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */
//! Level-triggered readiness multiplexing emulated over wait objects.
//!
//! A [`PollRegistry`] is the process-wide table of readiness sets. Each set
//! owns index-parallel lists of registrations and native wait objects; a
//! `wait` blocks on all of the set's wait objects plus the registry's wake
//! object (always the last slot) using the bounded wait-for-any primitive.
//!
//! Two fidelity limitations of that primitive are deliberately preserved and
//! part of the contract:
//!
//! * one ready registration is reported per `wait` call, lowest index first;
//!   callers wanting fan-out call `wait` again, and
//! * the reported mask is the registration's full interest mask, because the
//!   primitive cannot say which condition fired.
//!
//! Structural registry mutation is serialized by one lock held only for slot
//! scan and growth; each set has its own lock, never held across a blocking
//! wait.

use log::debug;
use ocall_abi::{CtlOp, InterestFlags, ReadyEvent};
use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::translate;
use crate::waitobj::{wait_any, ResetMode, WaitAny, WaitEvent, WAIT_MAX_OBJECTS};
use crate::{Error, Result};

mod binder;
use self::binder::ReadinessBinder;

/// Registry and per-set storage grow by fixed chunks, never shrink.
const SET_TABLE_CHUNK: usize = 16;
const REGISTRATION_CHUNK: usize = 16;

/// Identity of one readiness set, valid from `create` until `close`.
/// Slot numbers are reused after an explicit close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetId(usize);

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A watched native resource.
///
/// Sockets are bound to the readiness binder; plain files are waitable
/// resources the shim does not own, so they get a bound (never signaled)
/// wait object purely to keep the lists index-parallel, matching the host
/// platform contract where only sockets can drive event objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    File(RawFd),
    Socket(RawFd),
}

impl WaitTarget {
    pub fn fd(&self) -> RawFd {
        match *self {
            WaitTarget::File(fd) | WaitTarget::Socket(fd) => fd,
        }
    }
}

/// One watched handle within a readiness set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub target: WaitTarget,
    pub interest: InterestFlags,
    pub data: u64,
}

struct SetState {
    // Invariant: registrations and wait_objects are index-parallel at all
    // times; the native multi-wait requires a contiguous object list, so
    // deletion compacts both in lockstep.
    registrations: Vec<Registration>,
    wait_objects: Vec<Arc<WaitEvent>>,
}

impl SetState {
    fn new() -> SetState {
        SetState {
            registrations: Vec::new(),
            wait_objects: Vec::new(),
        }
    }

    fn push(&mut self, reg: Registration, event: Arc<WaitEvent>) -> Result<()> {
        if self.registrations.len() == self.registrations.capacity() {
            self.registrations
                .try_reserve_exact(REGISTRATION_CHUNK)
                .map_err(|_| Error::OutOfMemory)?;
            self.wait_objects
                .try_reserve_exact(REGISTRATION_CHUNK)
                .map_err(|_| Error::OutOfMemory)?;
        }
        self.registrations.push(reg);
        self.wait_objects.push(event);
        debug_assert_eq!(self.registrations.len(), self.wait_objects.len());
        Ok(())
    }

    fn remove(&mut self, idx: usize) -> (Registration, Arc<WaitEvent>) {
        let reg = self.registrations.remove(idx);
        let event = self.wait_objects.remove(idx);
        debug_assert_eq!(self.registrations.len(), self.wait_objects.len());
        (reg, event)
    }

    fn position(&self, handle: RawFd) -> Option<usize> {
        self.registrations
            .iter()
            .position(|r| r.target.fd() == handle)
    }
}

type SetSlot = Option<Arc<Mutex<SetState>>>;

/// Process-wide table of readiness sets.
///
/// One instance per host process, created at startup and shared by reference
/// with every OCALL dispatch thread. Creation failure is fatal to the host:
/// without the wake object the multiplexer would be permanently
/// uninterruptible.
pub struct PollRegistry {
    slots: Mutex<Vec<SetSlot>>,
    wake: Arc<WaitEvent>,
    binder: ReadinessBinder,
}

impl PollRegistry {
    pub fn new() -> io::Result<PollRegistry> {
        Ok(PollRegistry {
            slots: Mutex::new(Vec::new()),
            wake: Arc::new(WaitEvent::new(ResetMode::Auto)),
            binder: ReadinessBinder::new()?,
        })
    }

    /// Allocates a new, empty readiness set.
    ///
    /// Slot search is linear; the table grows by a fixed chunk when full.
    /// Only allocation exhaustion fails.
    pub fn create(&self) -> Result<SetId> {
        let mut slots = self.slots.lock().unwrap();
        let idx = match slots.iter().position(|s| s.is_none()) {
            Some(idx) => idx,
            None => {
                slots
                    .try_reserve_exact(SET_TABLE_CHUNK)
                    .map_err(|_| Error::OutOfMemory)?;
                let base = slots.len();
                for _ in 0..SET_TABLE_CHUNK {
                    slots.push(None);
                }
                base
            }
        };
        slots[idx] = Some(Arc::new(Mutex::new(SetState::new())));
        debug!("created readiness set {}", idx);
        Ok(SetId(idx))
    }

    fn checked(&self, set: SetId) -> Result<Arc<Mutex<SetState>>> {
        let slots = self.slots.lock().unwrap();
        slots
            .get(set.0)
            .and_then(|s| s.clone())
            .ok_or(Error::InvalidArgument)
    }

    /// Registration control as a single boundary operation, dispatching on
    /// the portable [`CtlOp`] selector.
    pub fn ctl(
        &self,
        set: SetId,
        op: CtlOp,
        target: WaitTarget,
        interest: InterestFlags,
        data: u64,
    ) -> Result<()> {
        match op {
            CtlOp::Add => self.add(set, target, interest, data),
            CtlOp::Delete => self.delete(set, target.fd()),
            CtlOp::Modify => self.modify(set, target.fd(), interest),
        }
    }

    /// Registers `target` in `set`.
    ///
    /// A handle may be registered at most once per set; a duplicate add is
    /// rejected. The set is bounded by the native primitive: at most
    /// [`WAIT_MAX_OBJECTS`]` - 1` registrations.
    pub fn add(
        &self,
        set: SetId,
        target: WaitTarget,
        interest: InterestFlags,
        data: u64,
    ) -> Result<()> {
        let state = self.checked(set)?;
        let mut st = state.lock().unwrap();
        if st.registrations.len() + 1 >= WAIT_MAX_OBJECTS {
            return Err(Error::InvalidArgument);
        }
        if st.position(target.fd()).is_some() {
            return Err(Error::InvalidArgument);
        }
        let event = Arc::new(WaitEvent::new(ResetMode::Auto));
        if let WaitTarget::Socket(fd) = target {
            self.binder
                .watch(fd, translate::interest_to_poll(interest), event.clone());
        }
        st.push(
            Registration {
                target,
                interest,
                data,
            },
            event,
        )
    }

    /// Deregisters `handle` from `set`.
    ///
    /// Deleting a handle that is not registered is a no-op success; callers
    /// must be able to double-delete safely.
    pub fn delete(&self, set: SetId, handle: RawFd) -> Result<()> {
        let state = self.checked(set)?;
        let mut st = state.lock().unwrap();
        match st.position(handle) {
            Some(idx) => {
                let (reg, event) = st.remove(idx);
                if let WaitTarget::Socket(fd) = reg.target {
                    self.binder.unwatch(fd, &event);
                }
                Ok(())
            }
            None => {
                debug!("delete of unregistered handle {} on set {}", handle, set);
                Ok(())
            }
        }
    }

    /// Replaces the interest mask of an existing registration.
    ///
    /// Implemented as delete + re-add so the native binding is rebuilt for
    /// the new mask; the registration moves to the end of the set's list.
    pub fn modify(&self, set: SetId, handle: RawFd, interest: InterestFlags) -> Result<()> {
        let state = self.checked(set)?;
        let mut st = state.lock().unwrap();
        let idx = st.position(handle).ok_or(Error::InvalidArgument)?;
        let (reg, event) = st.remove(idx);
        if let WaitTarget::Socket(fd) = reg.target {
            self.binder.unwatch(fd, &event);
        }
        let event = Arc::new(WaitEvent::new(ResetMode::Auto));
        if let WaitTarget::Socket(fd) = reg.target {
            self.binder
                .watch(fd, translate::interest_to_poll(interest), event.clone());
        }
        st.push(
            Registration {
                target: reg.target,
                interest,
                data: reg.data,
            },
            event,
        )
    }

    /// Blocks until a watched handle in `set` is ready, the timeout elapses,
    /// or [`wake`](Self::wake) is called.
    ///
    /// Returns at most one event per call (see the module docs); an empty
    /// vector means the timeout elapsed. An externally woken wait is the
    /// distinct [`Error::Interrupted`] outcome. A set with no registrations
    /// still blocks on the wake object alone, so an idle caller stays
    /// interruptible.
    pub fn wait(
        &self,
        set: SetId,
        max_events: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<ReadyEvent>> {
        if max_events == 0 {
            return Err(Error::InvalidArgument);
        }
        let state = self.checked(set)?;
        let (mut objects, snapshot) = {
            let st = state.lock().unwrap();
            let snapshot: Vec<(InterestFlags, u64)> = st
                .registrations
                .iter()
                .map(|r| (r.interest, r.data))
                .collect();
            (st.wait_objects.clone(), snapshot)
        };
        objects.push(self.wake.clone());

        match wait_any(&objects, timeout) {
            WaitAny::TimedOut => Ok(Vec::new()),
            WaitAny::Signaled(idx) if idx == objects.len() - 1 => Err(Error::Interrupted),
            WaitAny::Signaled(idx) => {
                // The fd may still be ready; let the binder re-signal so the
                // next wait sees it again (level-triggered).
                self.binder.rearm();
                let (interest, data) = snapshot[idx];
                Ok(vec![ReadyEvent {
                    mask: interest.bits(),
                    data,
                }])
            }
        }
    }

    /// Interrupts one blocked `wait` on any set. If none is blocked, the
    /// signal latches and is consumed by the next wait that finds no
    /// registration ready: the wake object occupies the last wait slot, so
    /// an already-ready registration wins the lowest-index tie-break over a
    /// latched wake.
    pub fn wake(&self) -> Result<()> {
        self.wake.signal();
        Ok(())
    }

    /// Destroys `set`, releasing every wait object it owns. Closing an
    /// already-closed or never-created handle is an error.
    pub fn close(&self, set: SetId) -> Result<()> {
        let state = {
            let mut slots = self.slots.lock().unwrap();
            match slots.get_mut(set.0) {
                Some(slot) if slot.is_some() => slot.take().unwrap(),
                _ => return Err(Error::InvalidArgument),
            }
        };
        let mut st = state.lock().unwrap();
        for (reg, event) in st.registrations.iter().zip(st.wait_objects.iter()) {
            if let WaitTarget::Socket(fd) = reg.target {
                self.binder.unwatch(fd, event);
            }
        }
        st.registrations.clear();
        st.wait_objects.clear();
        debug!("closed readiness set {}", set);
        Ok(())
    }

    /// Snapshot of the set's current registrations, in registration order.
    pub fn registrations(&self, set: SetId) -> Result<Vec<Registration>> {
        let state = self.checked(set)?;
        let st = state.lock().unwrap();
        Ok(st.registrations.clone())
    }
}
