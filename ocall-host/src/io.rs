/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */
//! Host-side POSIX passthrough for file and socket OCALLs.
//!
//! Each function is a thin wrapper over the host call it names. The error
//! contract is the crate-wide one: no raw host error code ever escapes, every
//! native failure is translated to the portable errno numbering first (socket
//! calls through the socket table, everything else through the general one).

use libc::{c_int, c_void, off_t, socklen_t};
use ocall_abi::errno;
use std::ffi::CString;
use std::mem;
use std::os::unix::io::RawFd;

use crate::translate;
use crate::{Error, Result};

/// Portable subset of `struct stat` crossing the OCALL boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    pub atime_sec: i64,
    pub mtime_sec: i64,
    pub ctime_sec: i64,
}

fn last_errno() -> Error {
    Error::NativeFailure(translate::io_error_to_errno(&std::io::Error::last_os_error()))
}

fn last_sock_errno() -> Error {
    let raw = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
    Error::NativeFailure(translate::host_sock_to_errno(raw))
}

fn cvt(ret: isize) -> Result<isize> {
    if ret < 0 {
        Err(last_errno())
    } else {
        Ok(ret)
    }
}

fn cvt_fd(ret: c_int) -> Result<RawFd> {
    if ret < 0 {
        Err(last_errno())
    } else {
        Ok(ret)
    }
}

fn cvt_sock(ret: isize) -> Result<isize> {
    if ret < 0 {
        Err(last_sock_errno())
    } else {
        Ok(ret)
    }
}

fn c_path(path: &str) -> Result<CString> {
    CString::new(path).map_err(|_| Error::InvalidArgument)
}

/// Opens `path`.
///
/// The `/dev/std*` pseudo-paths are resolved to duplicates of the process
/// standard descriptors, with the access mode validated against the
/// direction of the stream; a mismatched mode is an `EINVAL` failure rather
/// than a descriptor that cannot be used.
pub fn open(path: &str, flags: i32, mode: u32) -> Result<RawFd> {
    let accmode = flags & libc::O_ACCMODE;
    match path {
        "/dev/stdin" => {
            if accmode != libc::O_RDONLY {
                return Err(Error::NativeFailure(errno::EINVAL));
            }
            return dup(libc::STDIN_FILENO);
        }
        "/dev/stdout" => {
            if accmode != libc::O_WRONLY {
                return Err(Error::NativeFailure(errno::EINVAL));
            }
            return dup(libc::STDOUT_FILENO);
        }
        "/dev/stderr" => {
            if accmode != libc::O_WRONLY {
                return Err(Error::NativeFailure(errno::EINVAL));
            }
            return dup(libc::STDERR_FILENO);
        }
        _ => {}
    }
    let path = c_path(path)?;
    cvt_fd(unsafe { libc::open(path.as_ptr(), flags, mode as libc::mode_t) })
}

pub fn read(fd: RawFd, buf: &mut [u8]) -> Result<usize> {
    // Output-only standard streams cannot be read through the shim.
    if fd == libc::STDOUT_FILENO || fd == libc::STDERR_FILENO {
        return Err(Error::NativeFailure(errno::EBADF));
    }
    let n = cvt(unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) })?;
    Ok(n as usize)
}

pub fn write(fd: RawFd, buf: &[u8]) -> Result<usize> {
    if fd == libc::STDIN_FILENO {
        return Err(Error::NativeFailure(errno::EBADF));
    }
    let n = cvt(unsafe { libc::write(fd, buf.as_ptr() as *const c_void, buf.len()) })?;
    Ok(n as usize)
}

pub fn lseek(fd: RawFd, offset: i64, whence: i32) -> Result<i64> {
    let pos = unsafe { libc::lseek(fd, offset as off_t, whence) };
    if pos < 0 {
        Err(last_errno())
    } else {
        Ok(pos as i64)
    }
}

pub fn close(fd: RawFd) -> Result<()> {
    cvt(unsafe { libc::close(fd) } as isize).map(drop)
}

pub fn dup(fd: RawFd) -> Result<RawFd> {
    cvt_fd(unsafe { libc::dup(fd) })
}

pub fn stat(path: &str) -> Result<FileStat> {
    let path = c_path(path)?;
    let mut st: libc::stat = unsafe { mem::zeroed() };
    cvt(unsafe { libc::stat(path.as_ptr(), &mut st) } as isize)?;
    Ok(FileStat {
        dev: st.st_dev as u64,
        ino: st.st_ino as u64,
        mode: st.st_mode as u32,
        nlink: st.st_nlink as u64,
        uid: st.st_uid as u32,
        gid: st.st_gid as u32,
        rdev: st.st_rdev as u64,
        size: st.st_size as i64,
        atime_sec: st.st_atime as i64,
        mtime_sec: st.st_mtime as i64,
        ctime_sec: st.st_ctime as i64,
    })
}

pub fn mkdir(path: &str, mode: u32) -> Result<()> {
    let path = c_path(path)?;
    cvt(unsafe { libc::mkdir(path.as_ptr(), mode as libc::mode_t) } as isize).map(drop)
}

pub fn rmdir(path: &str) -> Result<()> {
    let path = c_path(path)?;
    cvt(unsafe { libc::rmdir(path.as_ptr()) } as isize).map(drop)
}

pub fn unlink(path: &str) -> Result<()> {
    let path = c_path(path)?;
    cvt(unsafe { libc::unlink(path.as_ptr()) } as isize).map(drop)
}

pub fn rename(oldpath: &str, newpath: &str) -> Result<()> {
    let oldpath = c_path(oldpath)?;
    let newpath = c_path(newpath)?;
    cvt(unsafe { libc::rename(oldpath.as_ptr(), newpath.as_ptr()) } as isize).map(drop)
}

pub fn truncate(path: &str, length: i64) -> Result<()> {
    let path = c_path(path)?;
    cvt(unsafe { libc::truncate(path.as_ptr(), length as off_t) } as isize).map(drop)
}

pub fn socket(domain: i32, ty: i32, protocol: i32) -> Result<RawFd> {
    let fd = unsafe { libc::socket(domain, ty, protocol) };
    if fd < 0 {
        Err(last_sock_errno())
    } else {
        Ok(fd)
    }
}

pub fn connect(fd: RawFd, addr: &[u8]) -> Result<()> {
    cvt_sock(unsafe {
        libc::connect(fd, addr.as_ptr() as *const libc::sockaddr, addr.len() as socklen_t)
    } as isize)
    .map(drop)
}

pub fn bind(fd: RawFd, addr: &[u8]) -> Result<()> {
    cvt_sock(unsafe {
        libc::bind(fd, addr.as_ptr() as *const libc::sockaddr, addr.len() as socklen_t)
    } as isize)
    .map(drop)
}

pub fn listen(fd: RawFd, backlog: i32) -> Result<()> {
    cvt_sock(unsafe { libc::listen(fd, backlog) } as isize).map(drop)
}

/// Accepts a connection, returning the new descriptor and the peer address
/// truncated to the caller's buffer as `accept(2)` does.
pub fn accept(fd: RawFd, addr: &mut [u8]) -> Result<(RawFd, usize)> {
    let mut len = addr.len() as socklen_t;
    let conn = unsafe {
        libc::accept(fd, addr.as_mut_ptr() as *mut libc::sockaddr, &mut len)
    };
    if conn < 0 {
        Err(last_sock_errno())
    } else {
        Ok((conn, len as usize))
    }
}

pub fn send(fd: RawFd, buf: &[u8], flags: i32) -> Result<usize> {
    let n = cvt_sock(unsafe {
        libc::send(fd, buf.as_ptr() as *const c_void, buf.len(), flags)
    })?;
    Ok(n as usize)
}

pub fn recv(fd: RawFd, buf: &mut [u8], flags: i32) -> Result<usize> {
    let n = cvt_sock(unsafe {
        libc::recv(fd, buf.as_mut_ptr() as *mut c_void, buf.len(), flags)
    })?;
    Ok(n as usize)
}

pub fn sendto(fd: RawFd, buf: &[u8], flags: i32, addr: &[u8]) -> Result<usize> {
    let n = cvt_sock(unsafe {
        libc::sendto(
            fd,
            buf.as_ptr() as *const c_void,
            buf.len(),
            flags,
            addr.as_ptr() as *const libc::sockaddr,
            addr.len() as socklen_t,
        )
    })?;
    Ok(n as usize)
}

pub fn recvfrom(
    fd: RawFd,
    buf: &mut [u8],
    flags: i32,
    addr: &mut [u8],
) -> Result<(usize, usize)> {
    let mut len = addr.len() as socklen_t;
    let n = cvt_sock(unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr() as *mut c_void,
            buf.len(),
            flags,
            addr.as_mut_ptr() as *mut libc::sockaddr,
            &mut len,
        )
    })?;
    Ok((n as usize, len as usize))
}

pub fn shutdown(fd: RawFd, how: i32) -> Result<()> {
    cvt_sock(unsafe { libc::shutdown(fd, how) } as isize).map(drop)
}

/// Sets a socket option identified by portable level and option ids.
///
/// Options the host has no equivalent for are a distinct [`Error::Unsupported`]
/// outcome so the enclave-side caller can degrade instead of misconfiguring.
pub fn setsockopt(fd: RawFd, level: i32, optname: i32, optval: &[u8]) -> Result<()> {
    let host_level = translate::sockopt_level_to_host(level).ok_or(Error::Unsupported)?;
    let host_opt = translate::sockopt_to_host(optname).ok_or(Error::Unsupported)?;
    cvt_sock(unsafe {
        libc::setsockopt(
            fd,
            host_level,
            host_opt,
            optval.as_ptr() as *const c_void,
            optval.len() as socklen_t,
        )
    } as isize)
    .map(drop)
}

pub fn getsockopt(fd: RawFd, level: i32, optname: i32, optval: &mut [u8]) -> Result<usize> {
    let host_level = translate::sockopt_level_to_host(level).ok_or(Error::Unsupported)?;
    let host_opt = translate::sockopt_to_host(optname).ok_or(Error::Unsupported)?;
    let mut len = optval.len() as socklen_t;
    cvt_sock(unsafe {
        libc::getsockopt(
            fd,
            host_level,
            host_opt,
            optval.as_mut_ptr() as *mut c_void,
            &mut len,
        )
    } as isize)?;
    Ok(len as usize)
}

pub fn getsockname(fd: RawFd, addr: &mut [u8]) -> Result<usize> {
    let mut len = addr.len() as socklen_t;
    cvt_sock(unsafe {
        libc::getsockname(fd, addr.as_mut_ptr() as *mut libc::sockaddr, &mut len)
    } as isize)?;
    Ok(len as usize)
}

pub fn getpeername(fd: RawFd, addr: &mut [u8]) -> Result<usize> {
    let mut len = addr.len() as socklen_t;
    cvt_sock(unsafe {
        libc::getpeername(fd, addr.as_mut_ptr() as *mut libc::sockaddr, &mut len)
    } as isize)?;
    Ok(len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocall_abi::{errno, sockopt};

    fn temp_path(name: &str) -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("ocall-host-io-{}-{}", std::process::id(), name));
        p.to_str().unwrap().to_owned()
    }

    #[test]
    fn open_missing_file_reports_portable_enoent() {
        let err = open("/definitely/not/here", libc::O_RDONLY, 0).unwrap_err();
        assert_eq!(err, Error::NativeFailure(errno::ENOENT));
    }

    #[test]
    fn open_dev_stdout_requires_write_access() {
        assert_eq!(
            open("/dev/stdout", libc::O_RDONLY, 0),
            Err(Error::NativeFailure(errno::EINVAL))
        );
        let fd = open("/dev/stdout", libc::O_WRONLY, 0).unwrap();
        assert!(fd > 2);
        close(fd).unwrap();
    }

    #[test]
    fn open_dev_stdin_requires_read_access() {
        assert_eq!(
            open("/dev/stdin", libc::O_WRONLY, 0),
            Err(Error::NativeFailure(errno::EINVAL))
        );
    }

    #[test]
    fn read_of_output_streams_is_rejected() {
        let mut buf = [0u8; 4];
        assert_eq!(
            read(libc::STDOUT_FILENO, &mut buf),
            Err(Error::NativeFailure(errno::EBADF))
        );
        assert_eq!(
            read(libc::STDERR_FILENO, &mut buf),
            Err(Error::NativeFailure(errno::EBADF))
        );
        assert_eq!(
            write(libc::STDIN_FILENO, &buf),
            Err(Error::NativeFailure(errno::EBADF))
        );
    }

    #[test]
    fn file_write_read_seek_roundtrip() {
        let path = temp_path("rw");
        let fd = open(
            &path,
            libc::O_CREAT | libc::O_TRUNC | libc::O_RDWR,
            0o600,
        )
        .unwrap();
        assert_eq!(write(fd, b"hello world").unwrap(), 11);
        assert_eq!(lseek(fd, 6, libc::SEEK_SET).unwrap(), 6);
        let mut buf = [0u8; 5];
        assert_eq!(read(fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        close(fd).unwrap();

        let st = stat(&path).unwrap();
        assert_eq!(st.size, 11);
        truncate(&path, 5).unwrap();
        assert_eq!(stat(&path).unwrap().size, 5);
        unlink(&path).unwrap();
        assert_eq!(
            stat(&path).unwrap_err(),
            Error::NativeFailure(errno::ENOENT)
        );
    }

    #[test]
    fn mkdir_rename_rmdir_roundtrip() {
        let a = temp_path("dir-a");
        let b = temp_path("dir-b");
        mkdir(&a, 0o700).unwrap();
        rename(&a, &b).unwrap();
        assert_eq!(stat(&a).unwrap_err(), Error::NativeFailure(errno::ENOENT));
        rmdir(&b).unwrap();
    }

    #[test]
    fn path_with_interior_nul_is_invalid() {
        assert_eq!(stat("bad\0path"), Err(Error::InvalidArgument));
    }

    #[test]
    fn socket_errors_use_the_socket_table() {
        let mut buf = [0u8; 4];
        // not a socket at all
        let err = recv(-1, &mut buf, 0).unwrap_err();
        assert_eq!(err, Error::NativeFailure(errno::EBADF));
    }

    #[test]
    fn setsockopt_reuseaddr_roundtrip() {
        let fd = socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        let on = 1i32.to_ne_bytes();
        setsockopt(fd, sockopt::SOL_SOCKET, sockopt::SO_REUSEADDR, &on).unwrap();
        let mut out = [0u8; 4];
        let len = getsockopt(fd, sockopt::SOL_SOCKET, sockopt::SO_REUSEADDR, &mut out).unwrap();
        assert_eq!(len, 4);
        assert_ne!(i32::from_ne_bytes(out), 0);
        close(fd).unwrap();
    }

    #[test]
    fn unsupported_sockopt_is_distinct_from_native_failure() {
        let fd = socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        let val = 1i32.to_ne_bytes();
        assert_eq!(
            setsockopt(fd, sockopt::SOL_SOCKET, sockopt::SO_SNDBUFFORCE, &val),
            Err(Error::Unsupported)
        );
        close(fd).unwrap();
    }
}
