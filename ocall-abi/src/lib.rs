/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */
//! Portable vocabulary shared across the trust boundary.
//!
//! Code running inside the enclave issues OCALLs against the types in this
//! crate; the untrusted host answers in the same vocabulary. Nothing in here
//! is host-OS specific: native error codes, socket option identifiers and
//! readiness conditions are translated to and from these portable values at
//! the host edge, so raw host codes never cross the boundary.
//!
//! The readiness vocabulary follows the Linux epoll model because that is
//! what enclave-side libc expects. The host may implement it with whatever
//! native primitive it has; see the `ocall-host` crate.

#![deny(warnings)]

use bitflags::bitflags;

bitflags! {
    /// Readiness conditions a watched handle can be registered for.
    ///
    /// Bit values match the Linux `EPOLL*` constants. Bits with no host
    /// equivalent are accepted and stored, but have no native effect.
    pub struct InterestFlags: u32 {
        const READABLE       = 0x0000_0001;
        const PRIORITY       = 0x0000_0002;
        const WRITABLE       = 0x0000_0004;
        const ERROR          = 0x0000_0008;
        const HANGUP         = 0x0000_0010;
        const READ_NORMAL    = 0x0000_0040;
        const READ_OOB       = 0x0000_0080;
        const WRITE_NORMAL   = 0x0000_0100;
        const WRITE_OOB      = 0x0000_0200;
        const MESSAGE        = 0x0000_0400;
        const READ_HANGUP    = 0x0000_2000;
        const EXCLUSIVE      = 0x1000_0000;
        const WAKEUP         = 0x2000_0000;
        const ONESHOT        = 0x4000_0000;
        const EDGE_TRIGGERED = 0x8000_0000;
    }
}

/// One readiness report returned by `mux_wait`.
///
/// `data` is the opaque token supplied at registration time, returned
/// verbatim. `mask` is the registration's full interest mask: the host's
/// native wait primitive cannot report *which* condition fired, so the mask
/// may over-report (a write-ready registration that also asked for errors is
/// reported with both bits set). Callers must treat the mask as "at least one
/// of these conditions holds".
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEvent {
    pub mask: u32,
    pub data: u64,
}

/// Registration-control operation selector for `mux_ctl`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtlOp {
    Add = 1,
    Delete = 2,
    Modify = 3,
}

/// Outcome of the attestation evidence verification boundary call.
///
/// `result_code` is the verification library's result (0 means the quote
/// verified successfully). `supplemental_data`, when present, is owned by the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub result_code: u32,
    pub supplemental_data: Option<Vec<u8>>,
}

/// Portable errno values, numbered as on Linux.
///
/// Only the codes the host translation tables can produce are defined here.
/// Codes 199 and up are synthetic: they stand in for host socket stack
/// conditions that have no POSIX equivalent.
pub mod errno {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const ESRCH: i32 = 3;
    pub const EINTR: i32 = 4;
    pub const EIO: i32 = 5;
    pub const ENXIO: i32 = 6;
    pub const ENOEXEC: i32 = 8;
    pub const EBADF: i32 = 9;
    pub const ECHILD: i32 = 10;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EACCES: i32 = 13;
    pub const EFAULT: i32 = 14;
    pub const EBUSY: i32 = 16;
    pub const EEXIST: i32 = 17;
    pub const EXDEV: i32 = 18;
    pub const ENODEV: i32 = 19;
    pub const ENOTDIR: i32 = 20;
    pub const EISDIR: i32 = 21;
    pub const EINVAL: i32 = 22;
    pub const ENFILE: i32 = 23;
    pub const EMFILE: i32 = 24;
    pub const EFBIG: i32 = 27;
    pub const ENOSPC: i32 = 28;
    pub const EROFS: i32 = 30;
    pub const EMLINK: i32 = 31;
    pub const EPIPE: i32 = 32;
    pub const EDEADLOCK: i32 = 35;
    pub const ENAMETOOLONG: i32 = 36;
    pub const ENOLCK: i32 = 37;
    pub const ENOSYS: i32 = 38;
    pub const ENOTEMPTY: i32 = 39;
    pub const ELOOP: i32 = 40;
    pub const EWOULDBLOCK: i32 = EAGAIN;
    pub const EBADRQC: i32 = 56;
    pub const ENODATA: i32 = 61;
    pub const ENONET: i32 = 64;
    pub const EREMOTE: i32 = 66;
    pub const ENOLINK: i32 = 67;
    pub const ECOMM: i32 = 70;
    pub const ENOTUNIQ: i32 = 76;
    pub const ELIBBAD: i32 = 80;
    pub const EUSERS: i32 = 87;
    pub const ENOTSOCK: i32 = 88;
    pub const EDESTADDRREQ: i32 = 89;
    pub const EMSGSIZE: i32 = 90;
    pub const EPROTOTYPE: i32 = 91;
    pub const ENOPROTOOPT: i32 = 92;
    pub const EPROTONOSUPPORT: i32 = 93;
    pub const ESOCKTNOSUPPORT: i32 = 94;
    pub const EOPNOTSUPP: i32 = 95;
    pub const ENOTSUP: i32 = EOPNOTSUPP;
    pub const EPFNOSUPPORT: i32 = 96;
    pub const EAFNOSUPPORT: i32 = 97;
    pub const EADDRINUSE: i32 = 98;
    pub const EADDRNOTAVAIL: i32 = 99;
    pub const ENETDOWN: i32 = 100;
    pub const ENETUNREACH: i32 = 101;
    pub const ENETRESET: i32 = 102;
    pub const ECONNABORTED: i32 = 103;
    pub const ECONNRESET: i32 = 104;
    pub const ENOBUFS: i32 = 105;
    pub const EISCONN: i32 = 106;
    pub const ENOTCONN: i32 = 107;
    pub const ESHUTDOWN: i32 = 108;
    pub const ETOOMANYREFS: i32 = 109;
    pub const ETIMEDOUT: i32 = 110;
    pub const ECONNREFUSED: i32 = 111;
    pub const EHOSTDOWN: i32 = 112;
    pub const EHOSTUNREACH: i32 = 113;
    pub const EALREADY: i32 = 114;
    pub const EINPROGRESS: i32 = 115;
    pub const ESTALE: i32 = 116;
    pub const EDQUOT: i32 = 122;
    pub const ENOMEDIUM: i32 = 123;

    // Synthetic codes for host socket stack states without a POSIX analogue.
    pub const EDISCON: i32 = 199;
    pub const EPROCLIM: i32 = 200;
    pub const ESYSNOTREADY: i32 = 201;
    pub const EVERNOTSUPPORTED: i32 = 202;
    pub const ENOTINITIALISED: i32 = 203;
}

/// Portable socket option identifiers, numbered as on Linux (`SO_*`).
///
/// The host maps each to a native option or reports it unsupported; see the
/// translation layer in `ocall-host`.
pub mod sockopt {
    pub const SOL_SOCKET: i32 = 1;

    pub const SO_DEBUG: i32 = 1;
    pub const SO_REUSEADDR: i32 = 2;
    pub const SO_TYPE: i32 = 3;
    pub const SO_ERROR: i32 = 4;
    pub const SO_DONTROUTE: i32 = 5;
    pub const SO_BROADCAST: i32 = 6;
    pub const SO_SNDBUF: i32 = 7;
    pub const SO_RCVBUF: i32 = 8;
    pub const SO_KEEPALIVE: i32 = 9;
    pub const SO_OOBINLINE: i32 = 10;
    pub const SO_NO_CHECK: i32 = 11;
    pub const SO_PRIORITY: i32 = 12;
    pub const SO_LINGER: i32 = 13;
    pub const SO_BSDCOMPAT: i32 = 14;
    pub const SO_REUSEPORT: i32 = 15;
    pub const SO_PASSCRED: i32 = 16;
    pub const SO_PEERCRED: i32 = 17;
    pub const SO_RCVLOWAT: i32 = 18;
    pub const SO_SNDLOWAT: i32 = 19;
    pub const SO_RCVTIMEO: i32 = 20;
    pub const SO_SNDTIMEO: i32 = 21;
    pub const SO_SECURITY_AUTHENTICATION: i32 = 22;
    pub const SO_SECURITY_ENCRYPTION_TRANSPORT: i32 = 23;
    pub const SO_SECURITY_ENCRYPTION_NETWORK: i32 = 24;
    pub const SO_BINDTODEVICE: i32 = 25;
    pub const SO_ATTACH_FILTER: i32 = 26;
    pub const SO_DETACH_FILTER: i32 = 27;
    pub const SO_PEERNAME: i32 = 28;
    pub const SO_TIMESTAMP: i32 = 29;
    pub const SO_ACCEPTCONN: i32 = 30;
    pub const SO_PEERSEC: i32 = 31;
    pub const SO_SNDBUFFORCE: i32 = 32;
    pub const SO_RCVBUFFORCE: i32 = 33;
    pub const SO_PASSSEC: i32 = 34;
}
