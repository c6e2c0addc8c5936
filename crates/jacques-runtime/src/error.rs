use jacques_types::ErrorKind;
use std::fmt;

/// Result type for jacques-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer
#[derive(Debug)]
pub enum Error {
    /// Core-type layer error
    Core(jacques_types::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// Filesystem watcher error
    Watch(notify::Error),

    /// Socket already owned by a live process
    SocketBusy(String),

    /// Invalid operation or state
    InvalidOperation(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Core(err) => err.kind(),
            Error::Io(_) | Error::Watch(_) => ErrorKind::Io,
            Error::SocketBusy(_) => ErrorKind::Conflict,
            Error::InvalidOperation(_) => ErrorKind::Invariant,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Core(err) => write!(f, "{}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Watch(err) => write!(f, "Watcher error: {}", err),
            Error::SocketBusy(msg) => write!(f, "Socket busy: {}", msg),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Core(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Watch(err) => Some(err),
            Error::SocketBusy(_) | Error::InvalidOperation(_) => None,
        }
    }
}

impl From<jacques_types::Error> for Error {
    fn from(err: jacques_types::Error) -> Self {
        Error::Core(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Watch(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Core(jacques_types::Error::Json(err))
    }
}
