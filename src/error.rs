use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The tun/tap device node could not be opened.
    #[error("open {path}: {source}")]
    Open {
        path: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("device tun name too long: {name:?} ({len} > {max} bytes)", max = crate::MAX_NAME_LEN)]
    NameTooLong { name: String, len: usize },

    #[error("invalid device tun name: {0:?}")]
    InvalidName(String),

    /// The mode-configuration control call was rejected by the driver.
    #[error("ioctl {name} failed: {source}")]
    Ioctl {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// The descriptor could not be adopted into a pollable file.
    #[error("adopt descriptor: {0}")]
    Adopt(#[source] io::Error),

    #[error("i/o timeout")]
    Timeout,

    #[error("use of closed interface")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn ioctl(name: &'static str, source: impl Into<io::Error>) -> Self {
        Error::Ioctl {
            name,
            source: source.into(),
        }
    }
    /// Returns true if a read or write deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
    /// Returns true if the interface was closed before or during the call.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }
    /// The OS error code behind this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Open { source, .. } | Error::Ioctl { source, .. } => source.raw_os_error(),
            Error::Adopt(err) | Error::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(err) => err,
            Error::Timeout => io::Error::new(io::ErrorKind::TimedOut, value),
            Error::Closed => io::Error::new(io::ErrorKind::NotConnected, value),
            Error::NameTooLong { .. } | Error::InvalidName(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, value)
            }
            Error::Open { .. } | Error::Ioctl { .. } | Error::Adopt(_) => {
                let kind = match &value {
                    Error::Open { source, .. } | Error::Ioctl { source, .. } => source.kind(),
                    Error::Adopt(source) => source.kind(),
                    _ => io::ErrorKind::Other,
                };
                io::Error::new(kind, value)
            }
        }
    }
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = Error> = ::std::result::Result<T, E>;
