/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */
//! Background thread binding watched sockets to their wait objects.
//!
//! The native wait primitive only knows event objects, not file descriptors.
//! This thread multiplexes every watched socket through poll(2) and signals
//! the bound [`WaitEvent`] whenever the socket's readiness intersects the
//! registration's translated interest (error and hangup conditions are always
//! reported). A self-pipe interrupts the poll when the watch list changes,
//! when a consumed event needs rearming, or at shutdown.

use fnv::FnvHashMap;
use log::warn;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags};
use nix::unistd;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::waitobj::WaitEvent;

struct Watch {
    flags: PollFlags,
    event: Arc<WaitEvent>,
}

struct Shared {
    // The same fd may be watched by registrations in different sets.
    watches: Mutex<FnvHashMap<RawFd, Vec<Watch>>>,
    shutdown: AtomicBool,
}

pub(super) struct ReadinessBinder {
    shared: Arc<Shared>,
    notify_wr: RawFd,
    thread: Option<thread::JoinHandle<()>>,
}

impl ReadinessBinder {
    pub(super) fn new() -> io::Result<ReadinessBinder> {
        let (notify_rd, notify_wr) = unistd::pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let shared = Arc::new(Shared {
            watches: Mutex::new(FnvHashMap::default()),
            shutdown: AtomicBool::new(false),
        });
        let shared2 = shared.clone();
        let thread = thread::Builder::new()
            .name("readiness-binder".into())
            .spawn(move || run(shared2, notify_rd))?;
        Ok(ReadinessBinder {
            shared,
            notify_wr,
            thread: Some(thread),
        })
    }

    pub(super) fn watch(&self, fd: RawFd, flags: PollFlags, event: Arc<WaitEvent>) {
        self.shared
            .watches
            .lock()
            .unwrap()
            .entry(fd)
            .or_insert_with(Vec::new)
            .push(Watch { flags, event });
        self.kick();
    }

    pub(super) fn unwatch(&self, fd: RawFd, event: &Arc<WaitEvent>) {
        let mut watches = self.shared.watches.lock().unwrap();
        if let Some(list) = watches.get_mut(&fd) {
            list.retain(|w| !Arc::ptr_eq(&w.event, event));
            if list.is_empty() {
                watches.remove(&fd);
            }
        }
        drop(watches);
        self.kick();
    }

    /// Called after a wait consumed an event: the fd may still be ready and,
    /// level-triggered, must be reported again on the next wait.
    pub(super) fn rearm(&self) {
        self.kick();
    }

    fn kick(&self) {
        // The pipe is non-blocking; a full pipe already guarantees a pending
        // wakeup, so EAGAIN is ignored.
        let _ = unistd::write(self.notify_wr, &[0u8]);
    }
}

impl Drop for ReadinessBinder {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.kick();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        let _ = unistd::close(self.notify_wr);
    }
}

fn run(shared: Arc<Shared>, notify_rd: RawFd) {
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        let mut fds = vec![PollFd::new(notify_rd, PollFlags::POLLIN)];
        let mut order = Vec::new();
        {
            let watches = shared.watches.lock().unwrap();
            for (&fd, list) in watches.iter() {
                // Skip fds whose every event is still latched: the readiness
                // has been reported and not yet consumed, and re-polling a
                // ready fd would spin.
                if list.iter().all(|w| w.event.is_signaled()) {
                    continue;
                }
                let mut mask = PollFlags::empty();
                for w in list {
                    if !w.event.is_signaled() {
                        mask |= w.flags;
                    }
                }
                fds.push(PollFd::new(fd, mask));
                order.push(fd);
            }
        }

        if let Err(e) = poll(&mut fds, -1) {
            if e == nix::Error::from(Errno::EINTR) {
                continue;
            }
            warn!("readiness binder poll failed: {}", e);
            thread::sleep(std::time::Duration::from_millis(10));
            continue;
        }

        if let Some(revents) = fds[0].revents() {
            if revents.contains(PollFlags::POLLIN) {
                let mut buf = [0u8; 64];
                while let Ok(n) = unistd::read(notify_rd, &mut buf) {
                    if n < buf.len() {
                        break;
                    }
                }
            }
        }

        let mut watches = shared.watches.lock().unwrap();
        for (i, fd) in order.iter().enumerate() {
            let revents = match fds[i + 1].revents() {
                Some(r) if !r.is_empty() => r,
                _ => continue,
            };
            // The fd was closed out from under the watch (no prior delete);
            // it can never become ready again, so keep it out of the poll
            // set or the loop re-polls it forever.
            if revents.contains(PollFlags::POLLNVAL) {
                warn!("dropping watch on closed fd {}", fd);
                watches.remove(fd);
                continue;
            }
            if let Some(list) = watches.get(fd) {
                for w in list {
                    let wanted = w.flags | PollFlags::POLLERR | PollFlags::POLLHUP;
                    if revents.intersects(wanted) && !w.event.is_signaled() {
                        w.event.signal();
                    }
                }
            }
        }
    }
    let _ = unistd::close(notify_rd);
}
