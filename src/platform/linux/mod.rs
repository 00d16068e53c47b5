pub(crate) mod sys;

mod device;

pub use self::device::{create_interface, open_device, validate_name, IfFlags};
pub(crate) use self::device::create;
