//! A file descriptor with absolute deadlines and close-initiated wakeup.
//!
//! The descriptor is switched to non-blocking mode on adoption, so a reader or
//! writer never parks inside `read(2)`/`write(2)`. It parks in `poll(2)` on the
//! descriptor plus two eventfds: one signalled once by [`PollFile::close`] and
//! never drained, and one per direction that is signalled when that
//! direction's deadline changes while a caller is parked on it. Changing a
//! deadline nobody waits on only stores the new value.
//!
//! `close` marks the file closed, wakes every waiter and releases the
//! descriptor only after the last in-flight operation has left it, so a
//! concurrent operation can never touch a recycled descriptor number.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use libc::{c_int, c_short, POLLIN, POLLOUT};

use crate::error::{Error, Result};
use crate::platform::posix::{read, write, Fd};

pub(crate) struct PollFile {
    raw: RawFd,
    label: String,
    state: Mutex<State>,
    idle: Condvar,
    closing: EventFd,
    read_deadline: Deadline,
    write_deadline: Deadline,
}

struct State {
    closed: bool,
    active: usize,
    fd: Option<Fd>,
}

#[derive(Copy, Clone, Debug)]
enum Direction {
    Read,
    Write,
}

impl Direction {
    fn events(self) -> c_short {
        match self {
            Direction::Read => POLLIN,
            Direction::Write => POLLOUT,
        }
    }
}

impl PollFile {
    /// Takes ownership of `fd`. On failure the descriptor is closed.
    pub(crate) fn new(fd: OwnedFd, label: &str) -> Result<Self> {
        let fd = Fd::from(fd);
        fd.set_nonblock().map_err(Error::Adopt)?;
        let closing = EventFd::new().map_err(Error::Adopt)?;
        let read_deadline = Deadline::new().map_err(Error::Adopt)?;
        let write_deadline = Deadline::new().map_err(Error::Adopt)?;
        log::trace!("adopted fd {} ({label})", fd.as_raw_fd());
        Ok(PollFile {
            raw: fd.as_raw_fd(),
            label: label.to_string(),
            state: Mutex::new(State {
                closed: false,
                active: 0,
                fd: Some(fd),
            }),
            idle: Condvar::new(),
            closing,
            read_deadline,
            write_deadline,
        })
    }

    pub(crate) fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.io(Direction::Read, |raw| read(raw, buf))
    }

    pub(crate) fn write(&self, buf: &[u8]) -> Result<usize> {
        self.io(Direction::Write, |raw| write(raw, buf))
    }

    /// Only fails with [`Error::Closed`].
    pub(crate) fn set_deadline(&self, at: Option<SystemTime>) -> Result<()> {
        let _op = self.acquire()?;
        self.read_deadline.set(at);
        self.write_deadline.set(at);
        Ok(())
    }

    pub(crate) fn set_read_deadline(&self, at: Option<SystemTime>) -> Result<()> {
        let _op = self.acquire()?;
        self.read_deadline.set(at);
        Ok(())
    }

    pub(crate) fn set_write_deadline(&self, at: Option<SystemTime>) -> Result<()> {
        let _op = self.acquire()?;
        self.write_deadline.set(at);
        Ok(())
    }

    /// Closes the file, waking all blocked readers and writers.
    ///
    /// Returns once the descriptor has been released. A second call returns
    /// [`Error::Closed`].
    pub(crate) fn close(&self) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        state.closed = true;
        let woken = self.closing.wake();
        while state.active > 0 {
            state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        let fd = state.fd.take();
        drop(state);
        woken?;
        if let Some(fd) = fd {
            fd.close()?;
        }
        log::trace!("closed fd {} ({})", self.raw, self.label);
        Ok(())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn io<F>(&self, direction: Direction, mut op: F) -> Result<usize>
    where
        F: FnMut(BorrowedFd<'_>) -> io::Result<usize>,
    {
        let guard = self.acquire()?;
        let deadline = match direction {
            Direction::Read => &self.read_deadline,
            Direction::Write => &self.write_deadline,
        };
        loop {
            if self.is_closed() {
                return Err(Error::Closed);
            }
            let parked = deadline.park();
            let timeout = remaining(parked.at)?;
            match op(guard.fd()) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::Io(err)),
            }
            self.wait(guard.fd(), direction, timeout, &parked.changed)?;
        }
    }

    /// Parks until the descriptor is ready, the file is closed, the deadline
    /// for `direction` is changed or `timeout` elapses. The caller re-checks
    /// all conditions afterwards.
    fn wait(
        &self,
        fd: BorrowedFd<'_>,
        direction: Direction,
        timeout: Option<Duration>,
        changed: &EventFd,
    ) -> Result<()> {
        let mut fds = [
            libc::pollfd {
                fd: fd.as_raw_fd(),
                events: direction.events(),
                revents: 0,
            },
            libc::pollfd {
                fd: self.closing.as_raw_fd(),
                events: POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: changed.as_raw_fd(),
                events: POLLIN,
                revents: 0,
            },
        ];
        let rc = unsafe {
            libc::poll(
                fds.as_mut_ptr(),
                fds.len() as libc::nfds_t,
                poll_timeout(timeout),
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(Error::Io(err));
            }
        }
        Ok(())
    }

    fn acquire(&self) -> Result<OpGuard<'_>> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        state.active += 1;
        Ok(OpGuard { file: self })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AsRawFd for PollFile {
    /// The adopted descriptor number. Meaningless once the file is closed.
    fn as_raw_fd(&self) -> RawFd {
        self.raw
    }
}

impl fmt::Debug for PollFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollFile")
            .field("fd", &self.raw)
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Keeps the descriptor alive for the duration of one operation.
struct OpGuard<'a> {
    file: &'a PollFile,
}

impl OpGuard<'_> {
    fn fd(&self) -> BorrowedFd<'_> {
        // `close` does not release the descriptor while a guard is alive.
        unsafe { BorrowedFd::borrow_raw(self.file.raw) }
    }
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.file.lock();
        state.active -= 1;
        if state.closed && state.active == 0 {
            self.file.idle.notify_all();
        }
    }
}

struct Deadline(Mutex<Timer>);

struct Timer {
    at: Option<SystemTime>,
    changed: Arc<EventFd>,
    /// Callers that read `at` and may be blocked on `changed`.
    parked: usize,
    /// `changed` was signalled in place and must be drained once nobody is
    /// parked on it.
    dirty: bool,
}

/// A caller's view of a deadline, held from reading `at` until it stops
/// waiting on `changed`.
struct Parked<'a> {
    deadline: &'a Deadline,
    at: Option<SystemTime>,
    changed: Arc<EventFd>,
}

impl Deadline {
    fn new() -> io::Result<Self> {
        Ok(Deadline(Mutex::new(Timer {
            at: None,
            changed: Arc::new(EventFd::new()?),
            parked: 0,
            dirty: false,
        })))
    }

    fn lock(&self) -> MutexGuard<'_, Timer> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn park(&self) -> Parked<'_> {
        let mut timer = self.lock();
        timer.parked += 1;
        Parked {
            deadline: self,
            at: timer.at,
            changed: timer.changed.clone(),
        }
    }

    fn set(&self, at: Option<SystemTime>) {
        self.set_with(at, EventFd::new)
    }

    /// Stores the new deadline. Parked callers are woken by signalling the
    /// eventfd they hold, which is first swapped for a `fresh` one so that
    /// later callers do not see the stale signal. Without a fresh eventfd the
    /// current one is signalled and drained by the last caller to unpark.
    fn set_with<F>(&self, at: Option<SystemTime>, fresh: F)
    where
        F: FnOnce() -> io::Result<EventFd>,
    {
        let mut timer = self.lock();
        timer.at = at;
        if timer.parked == 0 {
            return;
        }
        let signalled = match fresh() {
            Ok(fresh) => std::mem::replace(&mut timer.changed, Arc::new(fresh)),
            Err(err) => {
                log::trace!("signalling deadline change in place: {err}");
                timer.dirty = true;
                timer.changed.clone()
            }
        };
        // under the lock, so an unparking caller cannot drain before the signal
        if let Err(err) = signalled.wake() {
            log::warn!("failed to signal deadline change: {err}");
        }
    }
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        let mut timer = self.deadline.lock();
        timer.parked -= 1;
        if timer.parked == 0 && timer.dirty {
            timer.dirty = false;
            if let Err(err) = timer.changed.drain() {
                log::warn!("failed to reset deadline signal: {err}");
            }
        }
    }
}

fn remaining(at: Option<SystemTime>) -> Result<Option<Duration>> {
    match at {
        None => Ok(None),
        Some(at) => match at.duration_since(SystemTime::now()) {
            Ok(left) if !left.is_zero() => Ok(Some(left)),
            _ => Err(Error::Timeout),
        },
    }
}

/// Rounds up so that a timed-out `poll(2)` always lands past the deadline.
fn poll_timeout(timeout: Option<Duration>) -> c_int {
    match timeout {
        None => -1,
        Some(left) => left
            .as_nanos()
            .div_ceil(1_000_000)
            .min(c_int::MAX as u128) as c_int,
    }
}

struct EventFd(File);

impl EventFd {
    fn new() -> io::Result<Self> {
        let event_fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if event_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let file = unsafe { File::from_raw_fd(event_fd) };
        Ok(Self(file))
    }
    fn wake(&self) -> io::Result<()> {
        let buf: [u8; 8] = 1u64.to_ne_bytes();
        match (&self.0).write_all(&buf) {
            Ok(_) => Ok(()),
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(err),
        }
    }
    /// Resets the counter so the eventfd is no longer readable.
    fn drain(&self) -> io::Result<()> {
        let mut buf = [0u8; 8];
        match (&self.0).read(&mut buf) {
            Ok(_) => Ok(()),
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl AsRawFd for EventFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixDatagram;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn pair() -> (PollFile, UnixDatagram) {
        let (a, b) = UnixDatagram::pair().unwrap();
        (PollFile::new(OwnedFd::from(a), "socketpair").unwrap(), b)
    }

    fn after(ms: u64) -> Option<SystemTime> {
        Some(SystemTime::now() + Duration::from_millis(ms))
    }

    #[test]
    fn round_trip() {
        let (file, peer) = pair();
        peer.send(b"\x45\x00\x00\x14payload").unwrap();
        let mut buf = [0u8; 1500];
        let n = file.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"\x45\x00\x00\x14payload");

        assert_eq!(file.write(b"reply").unwrap(), 5);
        let n = peer.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"reply");
    }

    #[test]
    fn past_deadline_fails_without_blocking() {
        let (file, peer) = pair();
        peer.send(b"queued").unwrap();
        file.set_read_deadline(Some(SystemTime::now() - Duration::from_secs(1)))
            .unwrap();
        let mut buf = [0u8; 64];
        assert!(file.read(&mut buf).unwrap_err().is_timeout());

        // recoverable: clearing the deadline delivers the queued datagram
        file.set_read_deadline(None).unwrap();
        assert_eq!(file.read(&mut buf).unwrap(), 6);
    }

    #[test]
    fn deadline_expires_while_blocked() {
        let (file, _peer) = pair();
        file.set_deadline(after(50)).unwrap();
        let start = Instant::now();
        let mut buf = [0u8; 64];
        let err = file.read(&mut buf).unwrap_err();
        assert!(err.is_timeout(), "{err:?}");
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn deadline_change_reaches_blocked_reader() {
        let (file, _peer) = pair();
        let file = Arc::new(file);
        let reader = {
            let file = file.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 64];
                file.read(&mut buf)
            })
        };
        thread::sleep(Duration::from_millis(50));
        file.set_read_deadline(after(20)).unwrap();
        let err = reader.join().unwrap().unwrap_err();
        assert!(err.is_timeout(), "{err:?}");
    }

    #[test]
    fn extending_deadline_lets_data_through() {
        let (file, peer) = pair();
        let file = Arc::new(file);
        file.set_read_deadline(after(100)).unwrap();
        let reader = {
            let file = file.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 64];
                file.read(&mut buf)
            })
        };
        file.set_read_deadline(after(10_000)).unwrap();
        thread::sleep(Duration::from_millis(200));
        peer.send(b"late").unwrap();
        assert_eq!(reader.join().unwrap().unwrap(), 4);
    }

    #[test]
    fn close_wakes_blocked_reader() {
        let (file, _peer) = pair();
        let file = Arc::new(file);
        let reader = {
            let file = file.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 64];
                file.read(&mut buf)
            })
        };
        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        file.close().unwrap();
        let err = reader.join().unwrap().unwrap_err();
        assert!(err.is_closed(), "{err:?}");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn close_wins_over_pending_deadline() {
        let (file, _peer) = pair();
        let file = Arc::new(file);
        file.set_read_deadline(after(60_000)).unwrap();
        let reader = {
            let file = file.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 64];
                file.read(&mut buf)
            })
        };
        thread::sleep(Duration::from_millis(50));
        file.close().unwrap();
        assert!(reader.join().unwrap().unwrap_err().is_closed());
    }

    #[test]
    fn write_deadline_when_peer_is_full() {
        let (file, _peer) = pair();
        file.set_write_deadline(after(100)).unwrap();
        let frame = [0u8; 1024];
        let err = loop {
            match file.write(&frame) {
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert!(err.is_timeout(), "{err:?}");
    }

    fn fill(file: &PollFile) {
        file.set_write_deadline(after(100)).unwrap();
        let frame = [0u8; 1024];
        while file.write(&frame).is_ok() {}
        file.set_write_deadline(None).unwrap();
    }

    #[test]
    fn close_wakes_blocked_writer() {
        let (file, _peer) = pair();
        fill(&file);
        let file = Arc::new(file);
        let writer = {
            let file = file.clone();
            thread::spawn(move || file.write(&[0u8; 1024]))
        };
        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        file.close().unwrap();
        let err = writer.join().unwrap().unwrap_err();
        assert!(err.is_closed(), "{err:?}");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    fn signalled(event: &EventFd) -> bool {
        let mut fds = [libc::pollfd {
            fd: event.as_raw_fd(),
            events: POLLIN,
            revents: 0,
        }];
        unsafe { libc::poll(fds.as_mut_ptr(), 1, 0) == 1 }
    }

    #[test]
    fn unwatched_deadline_keeps_its_eventfd() {
        let deadline = Deadline::new().unwrap();
        let before = deadline.park().changed.clone();
        for i in 0..1000 {
            deadline.set(after(i));
        }
        deadline.set(None);
        let parked = deadline.park();
        assert!(Arc::ptr_eq(&before, &parked.changed));
        assert_eq!(parked.at, None);
        assert!(!signalled(&parked.changed));
    }

    #[test]
    fn watched_deadline_swaps_and_signals() {
        let deadline = Deadline::new().unwrap();
        let parked = deadline.park();
        deadline.set(after(10));
        assert!(signalled(&parked.changed));
        let next = deadline.park();
        assert!(!Arc::ptr_eq(&parked.changed, &next.changed));
        assert!(!signalled(&next.changed));
        assert!(next.at.is_some());
    }

    #[test]
    fn in_place_signal_is_reset_after_last_waiter() {
        let deadline = Deadline::new().unwrap();
        let first = deadline.park();
        let second = deadline.park();
        deadline.set_with(after(10), || Err(io::Error::from_raw_os_error(libc::EMFILE)));
        assert!(Arc::ptr_eq(&first.changed, &second.changed));
        assert!(signalled(&first.changed));
        let event = first.changed.clone();
        drop(first);
        assert!(signalled(&event));
        drop(second);
        assert!(!signalled(&event));
        assert!(Arc::ptr_eq(&event, &deadline.park().changed));
    }

    #[test]
    fn closed_is_terminal() {
        let (file, _peer) = pair();
        file.close().unwrap();
        let mut buf = [0u8; 64];
        assert!(file.read(&mut buf).unwrap_err().is_closed());
        assert!(file.write(b"x").unwrap_err().is_closed());
        assert!(file.set_deadline(None).unwrap_err().is_closed());
        assert!(file.set_read_deadline(None).unwrap_err().is_closed());
        assert!(file.set_write_deadline(None).unwrap_err().is_closed());
        assert!(file.close().unwrap_err().is_closed());
        assert!(file.is_closed());
    }

    #[test]
    fn concurrent_close_releases_once() {
        let (file, _peer) = pair();
        let file = Arc::new(file);
        let closers: Vec<_> = (0..8)
            .map(|_| {
                let file = file.clone();
                thread::spawn(move || file.close())
            })
            .collect();
        let ok = closers
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(ok, 1);
    }

    #[test]
    fn reader_and_writer_are_independent() {
        let (file, peer) = pair();
        let file = Arc::new(file);
        let reader = {
            let file = file.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 64];
                file.read(&mut buf).map(|n| buf[..n].to_vec())
            })
        };
        thread::sleep(Duration::from_millis(20));
        file.write(b"ping").unwrap();
        let mut buf = [0u8; 64];
        let n = peer.recv(&mut buf).unwrap();
        peer.send(&buf[..n]).unwrap();
        assert_eq!(reader.join().unwrap().unwrap(), b"ping");
    }

    #[test]
    fn timeout_rounding() {
        assert_eq!(poll_timeout(None), -1);
        assert_eq!(poll_timeout(Some(Duration::from_micros(1))), 1);
        assert_eq!(poll_timeout(Some(Duration::from_millis(7))), 7);
        assert_eq!(poll_timeout(Some(Duration::from_secs(u64::MAX))), c_int::MAX);
        assert!(remaining(Some(SystemTime::UNIX_EPOCH)).unwrap_err().is_timeout());
        assert_eq!(remaining(None).unwrap(), None);
    }
}
