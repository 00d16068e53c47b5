/*!
Linux TUN/TAP interfaces with deadline-bounded, close-cancellable I/O.

# Example:
```no_run
use std::time::{Duration, SystemTime};
use tuntap_poll::Interface;

let tun = Interface::new_tun("")?;
println!("created {}", tun.name());
tun.set_read_deadline(Some(SystemTime::now() + Duration::from_secs(1)))?;
let mut buf = [0; 65535];
match tun.recv(&mut buf) {
    Ok(len) => println!("buf= {:?}", &buf[..len]),
    Err(err) if err.is_timeout() => println!("no traffic"),
    Err(err) => return Err(err),
}
tun.close()?;
# Ok::<(), tuntap_poll::Error>(())
```
Another thread may call [`Interface::close`] while a `recv` or `send` is
blocked; the blocked call returns [`Error::Closed`].
*/

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use crate::builder::{DeviceBuilder, Layer};
pub use crate::error::{BoxError, Error, Result};
pub use crate::interface::Interface;
pub use crate::platform::{create_interface, open_device, validate_name, IfFlags};

mod builder;
mod error;
mod interface;
mod platform;

#[cfg_attr(docsrs, doc(cfg(feature = "async_tokio")))]
#[cfg(feature = "async_tokio")]
mod async_device;
#[cfg(feature = "async_tokio")]
pub use async_device::AsyncInterface;

/// The shared tun/tap clone device.
pub const DEVICE_PATH: &str = "/dev/net/tun";
pub(crate) const DEVICE_PATH_C: &std::ffi::CStr = c"/dev/net/tun";

/// Longest interface name accepted, the size of the kernel's name field.
/// A name of exactly this length is cut to `MAX_NAME_LEN - 1` bytes by the
/// kernel.
pub const MAX_NAME_LEN: usize = libc::IFNAMSIZ;

