use std::fmt;
use std::io;
use std::os::fd::{AsFd, AsRawFd, RawFd};

use ::tokio::io::unix::AsyncFd;
use ::tokio::io::Interest;

use crate::builder::{DeviceBuilder, DeviceConfig, Layer};
use crate::error::{Error, Result};
use crate::platform::{self, posix};
use crate::platform::posix::Fd;

/// A TUN/TAP interface driven by the tokio reactor.
///
/// There are no deadlines here: wrap calls in `tokio::time::timeout`, and
/// cancel by dropping the future. Dropping the interface closes it.
pub struct AsyncInterface {
    layer: Layer,
    name: String,
    inner: AsyncFd<Fd>,
}

impl AsyncInterface {
    /// Must be called from within a tokio runtime.
    pub fn new_tun(name: &str) -> Result<Self> {
        DeviceBuilder::new().name(name).layer(Layer::L3).build_async()
    }
    /// Must be called from within a tokio runtime.
    pub fn new_tap(name: &str) -> Result<Self> {
        DeviceBuilder::new().name(name).layer(Layer::L2).build_async()
    }
    pub(crate) fn create(config: DeviceConfig) -> Result<Self> {
        let (fd, name) = platform::create(&config)?;
        let fd = Fd::from(fd);
        fd.set_nonblock().map_err(Error::Adopt)?;
        let inner = AsyncFd::new(fd).map_err(Error::Adopt)?;
        log::debug!("created async {:?} interface {name}", config.layer);
        Ok(AsyncInterface {
            layer: config.layer,
            name,
            inner,
        })
    }
    pub fn is_tun(&self) -> bool {
        self.layer == Layer::L3
    }
    pub fn is_tap(&self) -> bool {
        self.layer == Layer::L2
    }
    pub fn layer(&self) -> Layer {
        self.layer
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Recv a packet from the interface
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner
            .async_io(Interest::READABLE, |fd| posix::read(fd.as_fd(), buf))
            .await
    }
    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        posix::read(self.inner.get_ref().as_fd(), buf)
    }
    /// Send a packet to the interface
    pub async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .async_io(Interest::WRITABLE, |fd| posix::write(fd.as_fd(), buf))
            .await
    }
    pub fn try_send(&self, buf: &[u8]) -> io::Result<usize> {
        posix::write(self.inner.get_ref().as_fd(), buf)
    }
}

impl AsRawFd for AsyncInterface {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.get_ref().as_raw_fd()
    }
}

impl fmt::Debug for AsyncInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncInterface")
            .field("name", &self.name)
            .field("layer", &self.layer)
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}
