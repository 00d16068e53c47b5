use crate::builder::{DeviceConfig, Layer};
use crate::error::{Error, Result};
use crate::platform::linux::sys::tunsetiff;
use crate::{DEVICE_PATH, DEVICE_PATH_C, MAX_NAME_LEN};
use libc::{c_int, c_short, ifreq, IFF_NO_PI, IFF_TAP, IFF_TUN, IFNAMSIZ, O_CLOEXEC, O_RDWR};
use std::mem;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

bitflags::bitflags! {
    /// Mode flags carried in the `TUNSETIFF` request.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct IfFlags: c_short {
        /// IP-layer device, frames are raw IPv4/IPv6 packets.
        const TUN = IFF_TUN as c_short;
        /// Ethernet-layer device.
        const TAP = IFF_TAP as c_short;
        /// Do not prefix frames with the 4-byte packet information header.
        const NO_PI = IFF_NO_PI as c_short;
    }
}

impl From<Layer> for IfFlags {
    fn from(layer: Layer) -> Self {
        match layer {
            Layer::L2 => IfFlags::TAP,
            Layer::L3 => IfFlags::TUN,
        }
    }
}

const IFREQ_PAD: usize = mem::size_of::<ifreq>() - IFNAMSIZ - mem::size_of::<c_short>();

/// The name + flags view of `struct ifreq` that `TUNSETIFF` reads and
/// overwrites.
#[repr(C)]
#[derive(Clone)]
pub(crate) struct IfReq {
    name: [u8; IFNAMSIZ],
    flags: c_short,
    _pad: [u8; IFREQ_PAD],
}

const _: () = assert!(mem::size_of::<IfReq>() == mem::size_of::<ifreq>());
const _: () = assert!(mem::offset_of!(IfReq, flags) == mem::offset_of!(ifreq, ifr_ifru));

impl IfReq {
    /// `name` must already have passed [`validate_name`]. A name of exactly
    /// `IFNAMSIZ` bytes is stored without a terminator; the kernel then keeps
    /// the first `IFNAMSIZ - 1` bytes.
    pub(crate) fn new(name: &str, flags: IfFlags) -> Self {
        let mut req = IfReq {
            name: [0; IFNAMSIZ],
            flags: flags.bits(),
            _pad: [0; IFREQ_PAD],
        };
        let len = name.len().min(IFNAMSIZ);
        req.name[..len].copy_from_slice(&name.as_bytes()[..len]);
        req
    }

    /// The name field up to the first NUL byte.
    pub(crate) fn name(&self) -> String {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(IFNAMSIZ);
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }

    pub(crate) fn flags(&self) -> IfFlags {
        IfFlags::from_bits_retain(self.flags)
    }
}

/// Checks a requested interface name before anything is sent to the driver.
///
/// The empty name asks the kernel to pick one (`tun0`, `tap3`, ...).
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(Error::NameTooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }
    if name.bytes().any(|b| b == 0) {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Opens the shared tun/tap device node read/write.
pub fn open_device() -> Result<OwnedFd> {
    let fd = unsafe { libc::open(DEVICE_PATH_C.as_ptr(), O_RDWR | O_CLOEXEC) };
    if fd < 0 {
        return Err(Error::Open {
            path: DEVICE_PATH,
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Issues `TUNSETIFF` on `fd`, creating or attaching to the interface `name`
/// (or a kernel-chosen one when `name` is empty), and returns the name the
/// kernel wrote back.
///
/// `name` is validated again here, so a direct caller gets the same
/// `NameTooLong`/`InvalidName` errors without a round trip to the driver.
/// The descriptor is never closed here, even on failure.
pub fn create_interface(fd: BorrowedFd<'_>, name: &str, flags: IfFlags) -> Result<String> {
    validate_name(name)?;
    let mut req = IfReq::new(name, flags);
    unsafe { tunsetiff(fd.as_raw_fd(), &mut req as *mut IfReq as *const c_int) }
        .map_err(|err| Error::ioctl("TUNSETIFF", err))?;
    let name = req.name();
    log::debug!("TUNSETIFF {:?} -> {name}", req.flags());
    Ok(name)
}

/// Opens the device node and configures it from `config`. `IFF_NO_PI` is
/// always requested.
pub(crate) fn create(config: &DeviceConfig) -> Result<(OwnedFd, String)> {
    let name = config.dev_name.as_deref().unwrap_or("");
    validate_name(name)?;
    let fd = open_device()?;
    let flags = IfFlags::from(config.layer) | IfFlags::NO_PI;
    let name = create_interface(fd.as_fd(), name, flags)?;
    Ok((fd, name))
}
