//! Platform glue: the Linux tun/tap driver and the POSIX descriptor layer it
//! is read and written through.

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        pub use self::linux::{create_interface, open_device, validate_name, IfFlags};
        pub(crate) use self::linux::create;
    } else {
        compile_error!("tuntap-poll drives the Linux tun/tap driver (/dev/net/tun) only");
    }
}

pub(crate) mod posix;
