/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */
//! Translation between the portable vocabulary and the host OS.
//!
//! Pure, stateless, table-driven. Every table is a linear scan with a
//! deterministic fallback: an unmapped host code becomes the portable
//! `EINVAL` rather than leaking across the trust boundary, and an unmapped
//! portable code becomes the host's `EINVAL`.

use libc::c_int;
use nix::poll::PollFlags;
use ocall_abi::{errno, sockopt, InterestFlags};
use std::io;

/// Host OS error <-> portable errno.
///
/// First match wins in both directions, so codes that alias (for example
/// `EWOULDBLOCK`/`EAGAIN`) map to a single canonical entry.
static ERRNO_TABLE: &[(c_int, i32)] = &[
    (libc::EPERM, errno::EPERM),
    (libc::ENOENT, errno::ENOENT),
    (libc::ESRCH, errno::ESRCH),
    (libc::EINTR, errno::EINTR),
    (libc::EIO, errno::EIO),
    (libc::ENXIO, errno::ENXIO),
    (libc::ENOEXEC, errno::ENOEXEC),
    (libc::EBADF, errno::EBADF),
    (libc::ECHILD, errno::ECHILD),
    (libc::EAGAIN, errno::EAGAIN),
    (libc::ENOMEM, errno::ENOMEM),
    (libc::EACCES, errno::EACCES),
    (libc::EFAULT, errno::EFAULT),
    (libc::EBUSY, errno::EBUSY),
    (libc::EEXIST, errno::EEXIST),
    (libc::EXDEV, errno::EXDEV),
    (libc::ENODEV, errno::ENODEV),
    (libc::ENOTDIR, errno::ENOTDIR),
    (libc::EISDIR, errno::EISDIR),
    (libc::EINVAL, errno::EINVAL),
    (libc::ENFILE, errno::ENFILE),
    (libc::EMFILE, errno::EMFILE),
    (libc::EFBIG, errno::EFBIG),
    (libc::ENOSPC, errno::ENOSPC),
    (libc::EROFS, errno::EROFS),
    (libc::EMLINK, errno::EMLINK),
    (libc::EPIPE, errno::EPIPE),
    (libc::EDEADLK, errno::EDEADLOCK),
    (libc::ENAMETOOLONG, errno::ENAMETOOLONG),
    (libc::ENOLCK, errno::ENOLCK),
    (libc::ENOSYS, errno::ENOSYS),
    (libc::ENOTEMPTY, errno::ENOTEMPTY),
    (libc::ELOOP, errno::ELOOP),
    (libc::ENODATA, errno::ENODATA),
    (libc::ENONET, errno::ENONET),
    (libc::EREMOTE, errno::EREMOTE),
    (libc::ENOLINK, errno::ENOLINK),
    (libc::ECOMM, errno::ECOMM),
    (libc::ENOTUNIQ, errno::ENOTUNIQ),
    (libc::ELIBBAD, errno::ELIBBAD),
    (libc::EUSERS, errno::EUSERS),
    (libc::EBADRQC, errno::EBADRQC),
    (libc::EDQUOT, errno::EDQUOT),
    (libc::ESTALE, errno::ESTALE),
    (libc::ENOMEDIUM, errno::ENOMEDIUM),
];

/// Host socket stack error <-> portable errno.
///
/// Kept separate from the general OS table: the original host platform has a
/// distinct socket error namespace, and the portable side assigns synthetic
/// codes (199..=203) to its states without a POSIX analogue.
static SOCK_ERRNO_TABLE: &[(c_int, i32)] = &[
    (libc::EINTR, errno::EINTR),
    (libc::EBADF, errno::EBADF),
    (libc::EACCES, errno::EACCES),
    (libc::EFAULT, errno::EFAULT),
    (libc::EINVAL, errno::EINVAL),
    (libc::EMFILE, errno::EMFILE),
    (libc::EWOULDBLOCK, errno::EWOULDBLOCK),
    (libc::EINPROGRESS, errno::EINPROGRESS),
    (libc::EALREADY, errno::EALREADY),
    (libc::ENOTSOCK, errno::ENOTSOCK),
    (libc::EDESTADDRREQ, errno::EDESTADDRREQ),
    (libc::EMSGSIZE, errno::EMSGSIZE),
    (libc::EPROTOTYPE, errno::EPROTOTYPE),
    (libc::ENOPROTOOPT, errno::ENOPROTOOPT),
    (libc::EPROTONOSUPPORT, errno::EPROTONOSUPPORT),
    (libc::ESOCKTNOSUPPORT, errno::ESOCKTNOSUPPORT),
    (libc::EOPNOTSUPP, errno::EOPNOTSUPP),
    (libc::EPFNOSUPPORT, errno::EPFNOSUPPORT),
    (libc::EAFNOSUPPORT, errno::EAFNOSUPPORT),
    (libc::EADDRINUSE, errno::EADDRINUSE),
    (libc::EADDRNOTAVAIL, errno::EADDRNOTAVAIL),
    (libc::ENETDOWN, errno::ENETDOWN),
    (libc::ENETUNREACH, errno::ENETUNREACH),
    (libc::ENETRESET, errno::ENETRESET),
    (libc::ECONNABORTED, errno::ECONNABORTED),
    (libc::ECONNRESET, errno::ECONNRESET),
    (libc::ENOBUFS, errno::ENOBUFS),
    (libc::EISCONN, errno::EISCONN),
    (libc::ENOTCONN, errno::ENOTCONN),
    (libc::ESHUTDOWN, errno::ESHUTDOWN),
    (libc::ETOOMANYREFS, errno::ETOOMANYREFS),
    (libc::ETIMEDOUT, errno::ETIMEDOUT),
    (libc::ECONNREFUSED, errno::ECONNREFUSED),
    (libc::ELOOP, errno::ELOOP),
    (libc::ENAMETOOLONG, errno::ENAMETOOLONG),
    (libc::EHOSTDOWN, errno::EHOSTDOWN),
    (libc::EHOSTUNREACH, errno::EHOSTUNREACH),
    (libc::ENOTEMPTY, errno::ENOTEMPTY),
    (libc::EUSERS, errno::EUSERS),
    (libc::EDQUOT, errno::EDQUOT),
    (libc::ESTALE, errno::ESTALE),
    (libc::EREMOTE, errno::EREMOTE),
];

pub fn host_to_errno(host: c_int) -> i32 {
    ERRNO_TABLE
        .iter()
        .find(|(h, _)| *h == host)
        .map(|(_, e)| *e)
        .unwrap_or(errno::EINVAL)
}

pub fn errno_to_host(portable: i32) -> c_int {
    ERRNO_TABLE
        .iter()
        .find(|(_, e)| *e == portable)
        .map(|(h, _)| *h)
        .unwrap_or(libc::EINVAL)
}

pub fn host_sock_to_errno(host: c_int) -> i32 {
    SOCK_ERRNO_TABLE
        .iter()
        .find(|(h, _)| *h == host)
        .map(|(_, e)| *e)
        .unwrap_or(errno::EINVAL)
}

pub fn errno_to_host_sock(portable: i32) -> c_int {
    SOCK_ERRNO_TABLE
        .iter()
        .find(|(_, e)| *e == portable)
        .map(|(h, _)| *h)
        .unwrap_or(libc::EINVAL)
}

/// Portable socket option id -> host option, indexed by portable id.
/// `None` means the host has no equivalent; the caller answers `Unsupported`.
static SOCKOPT_TABLE: &[Option<c_int>] = &[
    None,                      // 0
    Some(libc::SO_DEBUG),      // SO_DEBUG
    Some(libc::SO_REUSEADDR),  // SO_REUSEADDR
    Some(libc::SO_TYPE),       // SO_TYPE
    Some(libc::SO_ERROR),      // SO_ERROR
    Some(libc::SO_DONTROUTE),  // SO_DONTROUTE
    Some(libc::SO_BROADCAST),  // SO_BROADCAST
    Some(libc::SO_SNDBUF),     // SO_SNDBUF
    Some(libc::SO_RCVBUF),     // SO_RCVBUF
    Some(libc::SO_KEEPALIVE),  // SO_KEEPALIVE
    Some(libc::SO_OOBINLINE),  // SO_OOBINLINE
    None,                      // SO_NO_CHECK
    None,                      // SO_PRIORITY
    Some(libc::SO_LINGER),     // SO_LINGER
    None,                      // SO_BSDCOMPAT
    None,                      // SO_REUSEPORT
    None,                      // SO_PASSCRED
    None,                      // SO_PEERCRED
    Some(libc::SO_RCVLOWAT),   // SO_RCVLOWAT
    Some(libc::SO_SNDLOWAT),   // SO_SNDLOWAT
    Some(libc::SO_RCVTIMEO),   // SO_RCVTIMEO
    Some(libc::SO_SNDTIMEO),   // SO_SNDTIMEO
    None,                      // SO_SECURITY_AUTHENTICATION
    None,                      // SO_SECURITY_ENCRYPTION_TRANSPORT
    None,                      // SO_SECURITY_ENCRYPTION_NETWORK
    None,                      // SO_BINDTODEVICE
    None,                      // SO_ATTACH_FILTER
    None,                      // SO_DETACH_FILTER
    None,                      // SO_PEERNAME
    None,                      // SO_TIMESTAMP
    Some(libc::SO_ACCEPTCONN), // SO_ACCEPTCONN
    None,                      // SO_PEERSEC
    None,                      // SO_SNDBUFFORCE
    None,                      // SO_RCVBUFFORCE
    None,                      // SO_PASSSEC
];

pub fn sockopt_to_host(portable: i32) -> Option<c_int> {
    if portable < 0 {
        return None;
    }
    SOCKOPT_TABLE.get(portable as usize).copied().flatten()
}

pub fn sockopt_level_to_host(level: i32) -> Option<c_int> {
    match level {
        sockopt::SOL_SOCKET => Some(libc::SOL_SOCKET),
        _ => None,
    }
}

/// Portable interest mask -> native poll flag set for the readiness binder.
///
/// Error and hangup conditions are always monitored by the binder regardless
/// of the mask, so `ERROR`/`HANGUP`/`READ_HANGUP` contribute nothing here.
/// `MESSAGE`, `EXCLUSIVE`, `WAKEUP`, `ONESHOT` and `EDGE_TRIGGERED` are
/// accepted but have no native effect.
pub fn interest_to_poll(interest: InterestFlags) -> PollFlags {
    let mut flags = PollFlags::empty();
    if interest.intersects(InterestFlags::READABLE | InterestFlags::READ_NORMAL) {
        flags |= PollFlags::POLLIN;
    }
    if interest.contains(InterestFlags::PRIORITY) {
        flags |= PollFlags::POLLIN | PollFlags::POLLOUT | PollFlags::POLLPRI;
    }
    if interest.intersects(InterestFlags::WRITABLE | InterestFlags::WRITE_NORMAL) {
        flags |= PollFlags::POLLOUT;
    }
    if interest.contains(InterestFlags::READ_OOB) {
        flags |= PollFlags::POLLIN | PollFlags::POLLPRI;
    }
    if interest.contains(InterestFlags::WRITE_OOB) {
        flags |= PollFlags::POLLOUT | PollFlags::POLLPRI;
    }
    flags
}

/// Maps an `io::Error` from the host standard library onto the portable
/// errno vocabulary.
pub fn io_error_to_errno(err: &io::Error) -> i32 {
    match err.raw_os_error() {
        Some(code) => host_to_errno(code),
        None => match err.kind() {
            io::ErrorKind::NotFound => errno::ENOENT,
            io::ErrorKind::PermissionDenied => errno::EACCES,
            io::ErrorKind::ConnectionRefused => errno::ECONNREFUSED,
            io::ErrorKind::ConnectionReset => errno::ECONNRESET,
            io::ErrorKind::ConnectionAborted => errno::ECONNABORTED,
            io::ErrorKind::NotConnected => errno::ENOTCONN,
            io::ErrorKind::AddrInUse => errno::EADDRINUSE,
            io::ErrorKind::AddrNotAvailable => errno::EADDRNOTAVAIL,
            io::ErrorKind::BrokenPipe => errno::EPIPE,
            io::ErrorKind::AlreadyExists => errno::EEXIST,
            io::ErrorKind::WouldBlock => errno::EWOULDBLOCK,
            io::ErrorKind::TimedOut => errno::ETIMEDOUT,
            io::ErrorKind::Interrupted => errno::EINTR,
            _ => errno::EINVAL,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_errno_round_trips() {
        for (host, portable) in ERRNO_TABLE {
            assert_eq!(host_to_errno(*host), *portable);
        }
        assert_eq!(errno_to_host(errno::ENOENT), libc::ENOENT);
        assert_eq!(errno_to_host(errno::EPIPE), libc::EPIPE);
    }

    #[test]
    fn unmapped_codes_fall_back_deterministically() {
        assert_eq!(host_to_errno(-1), errno::EINVAL);
        assert_eq!(host_to_errno(9999), errno::EINVAL);
        assert_eq!(errno_to_host(errno::EDISCON), libc::EINVAL);
        assert_eq!(host_sock_to_errno(9999), errno::EINVAL);
    }

    #[test]
    fn socket_errors_use_the_socket_table() {
        assert_eq!(host_sock_to_errno(libc::ECONNRESET), errno::ECONNRESET);
        assert_eq!(host_sock_to_errno(libc::EWOULDBLOCK), errno::EWOULDBLOCK);
        assert_eq!(errno_to_host_sock(errno::ENOTSOCK), libc::ENOTSOCK);
    }

    #[test]
    fn unsupported_sockopts_translate_to_none() {
        assert_eq!(sockopt_to_host(sockopt::SO_REUSEADDR), Some(libc::SO_REUSEADDR));
        assert_eq!(sockopt_to_host(sockopt::SO_SNDBUFFORCE), None);
        assert_eq!(sockopt_to_host(sockopt::SO_PEERCRED), None);
        assert_eq!(sockopt_to_host(-1), None);
        assert_eq!(sockopt_to_host(1000), None);
    }

    #[test]
    fn sockopt_level_translation() {
        assert_eq!(sockopt_level_to_host(sockopt::SOL_SOCKET), Some(libc::SOL_SOCKET));
        assert_eq!(sockopt_level_to_host(41), None);
    }

    #[test]
    fn interest_mask_to_poll_flags() {
        assert_eq!(
            interest_to_poll(InterestFlags::READABLE),
            PollFlags::POLLIN
        );
        assert_eq!(
            interest_to_poll(InterestFlags::WRITABLE | InterestFlags::READ_OOB),
            PollFlags::POLLOUT | PollFlags::POLLIN | PollFlags::POLLPRI
        );
        // bits with no native effect
        assert_eq!(
            interest_to_poll(InterestFlags::ONESHOT | InterestFlags::EDGE_TRIGGERED),
            PollFlags::empty()
        );
        // error interest is implicit, contributes nothing
        assert_eq!(interest_to_poll(InterestFlags::ERROR), PollFlags::empty());
    }
}
