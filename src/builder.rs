use crate::error::Result;
use crate::interface::Interface;

/// TUN interface OSI layer of operation.
#[derive(Clone, Copy, Default, Debug, Eq, PartialEq, Hash)]
pub enum Layer {
    /// TAP: Ethernet frames.
    L2,
    /// TUN: IP packets.
    #[default]
    L3,
}

/// Configuration for a TUN/TAP interface.
#[derive(Clone, Default, Debug)]
pub(crate) struct DeviceConfig {
    pub dev_name: Option<String>,
    pub layer: Layer,
}

/// Builder for a TUN/TAP interface.
///
/// ```no_run
/// use tuntap_poll::{DeviceBuilder, Layer};
///
/// let tap = DeviceBuilder::new().name("tap7").layer(Layer::L2).build()?;
/// assert!(tap.is_tap());
/// # Ok::<(), tuntap_poll::Error>(())
/// ```
#[derive(Default, Debug)]
pub struct DeviceBuilder {
    dev_name: Option<String>,
    layer: Option<Layer>,
}

impl DeviceBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    /// Requested interface name, at most [`MAX_NAME_LEN`](crate::MAX_NAME_LEN)
    /// bytes. An empty name lets the kernel choose.
    pub fn name<S: Into<String>>(mut self, dev_name: S) -> Self {
        let dev_name = dev_name.into();
        self.dev_name = if dev_name.is_empty() {
            None
        } else {
            Some(dev_name)
        };
        self
    }
    pub fn layer(mut self, layer: Layer) -> Self {
        self.layer = Some(layer);
        self
    }
    pub(crate) fn build_config(&mut self) -> DeviceConfig {
        DeviceConfig {
            dev_name: self.dev_name.take(),
            layer: self.layer.take().unwrap_or_default(),
        }
    }
    /// Creates the interface and wraps it in a blocking, deadline-aware
    /// [`Interface`].
    pub fn build(mut self) -> Result<Interface> {
        Interface::create(self.build_config())
    }
    #[cfg(feature = "async_tokio")]
    pub fn build_async(mut self) -> Result<crate::AsyncInterface> {
        crate::AsyncInterface::create(self.build_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_kernel_named_tun() {
        let config = DeviceBuilder::new().build_config();
        assert_eq!(config.dev_name, None);
        assert_eq!(config.layer, Layer::L3);
    }

    #[test]
    fn empty_name_is_unset() {
        let config = DeviceBuilder::new().name("").layer(Layer::L2).build_config();
        assert_eq!(config.dev_name, None);
        assert_eq!(config.layer, Layer::L2);
        let config = DeviceBuilder::new().name("tap0").build_config();
        assert_eq!(config.dev_name.as_deref(), Some("tap0"));
    }

    #[test]
    fn long_name_rejected_before_open() {
        let err = DeviceBuilder::new()
            .name("x".repeat(crate::MAX_NAME_LEN + 1))
            .build()
            .unwrap_err();
        assert!(matches!(err, crate::Error::NameTooLong { len: 17, .. }), "{err:?}");
    }
}
