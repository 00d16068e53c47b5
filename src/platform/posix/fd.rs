use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};

use libc::{self, fcntl, F_GETFL, F_SETFL, O_NONBLOCK};

/// POSIX file descriptor support for `io` traits.
pub(crate) struct Fd {
    pub(crate) inner: RawFd,
}

impl Fd {
    pub fn new_unchecked(value: RawFd) -> Self {
        Fd { inner: value }
    }

    /// Enable non-blocking mode
    pub fn set_nonblock(&self) -> io::Result<()> {
        unsafe {
            let flags = fcntl(self.inner, F_GETFL);
            if flags == -1 {
                return Err(io::Error::last_os_error());
            }
            if flags & O_NONBLOCK != 0 {
                return Ok(());
            }
            match fcntl(self.inner, F_SETFL, flags | O_NONBLOCK) {
                0 => Ok(()),
                _ => Err(io::Error::last_os_error()),
            }
        }
    }
    /// Releases the descriptor, reporting the result of `close(2)`.
    pub fn close(self) -> io::Result<()> {
        let fd = self.into_raw_fd();
        if unsafe { libc::close(fd) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[inline]
pub(crate) fn read(fd: BorrowedFd<'_>, buf: &mut [u8]) -> io::Result<usize> {
    let amount = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr() as *mut _, buf.len()) };
    if amount < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(amount as usize)
}

#[inline]
pub(crate) fn write(fd: BorrowedFd<'_>, buf: &[u8]) -> io::Result<usize> {
    let amount = unsafe { libc::write(fd.as_raw_fd(), buf.as_ptr() as *const _, buf.len()) };
    if amount < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(amount as usize)
}

impl From<OwnedFd> for Fd {
    fn from(fd: OwnedFd) -> Self {
        Fd::new_unchecked(fd.into_raw_fd())
    }
}

impl AsRawFd for Fd {
    fn as_raw_fd(&self) -> RawFd {
        self.inner
    }
}

impl AsFd for Fd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        unsafe { BorrowedFd::borrow_raw(self.inner) }
    }
}

impl IntoRawFd for Fd {
    fn into_raw_fd(mut self) -> RawFd {
        let fd = self.inner;
        self.inner = -1;
        fd
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        if self.inner >= 0 {
            unsafe { libc::close(self.inner) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixDatagram;

    fn pair() -> (Fd, Fd) {
        let (a, b) = UnixDatagram::pair().unwrap();
        (Fd::from(OwnedFd::from(a)), Fd::from(OwnedFd::from(b)))
    }

    #[test]
    fn nonblocking_read_would_block() {
        let (a, _b) = pair();
        a.set_nonblock().unwrap();
        // idempotent
        a.set_nonblock().unwrap();
        let mut buf = [0u8; 16];
        let err = read(a.as_fd(), &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn datagram_boundaries() {
        let (a, b) = pair();
        assert_eq!(write(a.as_fd(), b"hello").unwrap(), 5);
        assert_eq!(write(a.as_fd(), b"world!").unwrap(), 6);
        let mut buf = [0u8; 64];
        assert_eq!(read(b.as_fd(), &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(read(b.as_fd(), &mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"world!");
    }

    #[test]
    fn explicit_close() {
        let (a, b) = pair();
        a.close().unwrap();
        // the peer observes the closed end
        assert!(write(b.as_fd(), b"x").is_err());
    }
}
