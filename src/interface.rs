use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::time::SystemTime;

use crate::builder::{DeviceBuilder, DeviceConfig, Layer};
use crate::error::Result;
use crate::platform::{self, posix::PollFile};
use crate::DEVICE_PATH;

/// An open TUN or TAP interface.
///
/// All methods take `&self`; share the interface between threads through an
/// `Arc`. [`close`](Interface::close) may be called while other threads are
/// blocked in [`recv`](Interface::recv) or [`send`](Interface::send): they
/// return [`Error::Closed`](crate::Error::Closed).
pub struct Interface {
    layer: Layer,
    name: String,
    file: PollFile,
}

impl Interface {
    /// Creates a TUN interface named `name`.
    /// If `name` is empty the kernel assigns one (tun0, tun1, ...).
    /// `name` must not exceed 16 bytes.
    pub fn new_tun(name: &str) -> Result<Self> {
        DeviceBuilder::new().name(name).layer(Layer::L3).build()
    }

    /// Creates a TAP interface named `name`.
    /// If `name` is empty the kernel assigns one (tap0, tap1, ...).
    /// `name` must not exceed 16 bytes.
    pub fn new_tap(name: &str) -> Result<Self> {
        DeviceBuilder::new().name(name).layer(Layer::L2).build()
    }

    pub(crate) fn create(config: DeviceConfig) -> Result<Self> {
        let (fd, name) = platform::create(&config)?;
        let file = PollFile::new(fd, DEVICE_PATH)?;
        log::debug!("created {:?} interface {name}", config.layer);
        Ok(Interface {
            layer: config.layer,
            name,
            file,
        })
    }

    /// Returns true if this is a TUN interface.
    pub fn is_tun(&self) -> bool {
        self.layer == Layer::L3
    }

    /// Returns true if this is a TAP interface.
    pub fn is_tap(&self) -> bool {
        self.layer == Layer::L2
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// The interface name as reported by the kernel, e.g. `tun0`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads one packet (TUN) or frame (TAP) into `buf`.
    ///
    /// Blocks until data arrives, the read deadline passes
    /// ([`Error::Timeout`](crate::Error::Timeout)) or the interface is closed
    /// ([`Error::Closed`](crate::Error::Closed)).
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.file.read(buf)
    }

    /// Writes one packet (TUN) or frame (TAP).
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        self.file.write(buf)
    }

    /// Closes the interface. All threads blocked in `recv`/`send` are woken.
    pub fn close(&self) -> Result<()> {
        self.file.close()?;
        log::debug!("closed interface {}", self.name);
        Ok(())
    }

    /// Sets both the read and write deadline. `None` blocks indefinitely.
    pub fn set_deadline(&self, deadline: Option<SystemTime>) -> Result<()> {
        self.file.set_deadline(deadline)
    }

    /// Sets the read deadline, including for a `recv` already in progress.
    pub fn set_read_deadline(&self, deadline: Option<SystemTime>) -> Result<()> {
        self.file.set_read_deadline(deadline)
    }

    /// Sets the write deadline, including for a `send` already in progress.
    pub fn set_write_deadline(&self, deadline: Option<SystemTime>) -> Result<()> {
        self.file.set_write_deadline(deadline)
    }
}

impl io::Read for &Interface {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.recv(buf)?)
    }
}

impl io::Write for &Interface {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.send(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for Interface {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self).read(buf)
    }
}

impl io::Write for Interface {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsRawFd for Interface {
    /// The descriptor backing the interface. Only meaningful until
    /// [`close`](Interface::close).
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.name)
            .field("layer", &self.layer)
            .field("file", &self.file)
            .finish()
    }
}
