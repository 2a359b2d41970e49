/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */
//! Untrusted host side of the TEE POSIX shim.
//!
//! The enclave delegates POSIX-style I/O to this crate through an opaque
//! call/return marshaling layer. Every operation here takes portable
//! arguments, performs the real OS work, and answers in the portable
//! vocabulary of [`ocall_abi`]: native error codes never cross the trust
//! boundary.
//!
//! The centerpiece is [`poll::PollRegistry`], which reproduces Linux-style
//! level-triggered readiness multiplexing on top of auto-reset wait objects
//! and a bounded wait-for-any primitive (see [`waitobj`]). File and socket
//! passthrough lives in [`io`].

#![deny(warnings)]

use ocall_abi::errno;

pub mod io;
pub mod poll;
pub mod translate;
pub mod waitobj;

/// Error taxonomy crossing back to the enclave.
///
/// `Interrupted` is not a failure: it is the distinct outcome of a wait that
/// was woken externally, mirroring a signal-interrupted blocking syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Bad handle or malformed argument.
    #[error("invalid argument")]
    InvalidArgument,
    /// Table growth failed; fatal to the requesting call, not the process.
    #[error("out of memory")]
    OutOfMemory,
    /// The host has no native equivalent for the requested option.
    #[error("not supported by the host")]
    Unsupported,
    /// A blocked wait was woken externally before any handle became ready.
    #[error("interrupted")]
    Interrupted,
    /// The host primitive failed; carries the translated portable errno.
    #[error("host failure (errno {0})")]
    NativeFailure(i32),
}

impl Error {
    /// The portable errno reported to the enclave for this condition.
    pub fn errno(&self) -> i32 {
        match *self {
            Error::InvalidArgument => errno::EINVAL,
            Error::OutOfMemory => errno::ENOMEM,
            Error::Unsupported => errno::ENOTSUP,
            Error::Interrupted => errno::EINTR,
            Error::NativeFailure(e) => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
