use std::fmt;

/// Result type shared by the jacques library crates
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classification used across component boundaries.
///
/// Every `Error` maps onto exactly one kind; API handlers and the CLI pick
/// status codes and exit codes from the kind, never from the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Filesystem or socket I/O
    Io,
    /// Malformed JSON or structural mismatch
    Parse,
    /// Referenced session/plan/manifest absent
    NotFound,
    /// Port in use, socket held by a live process, PID-file liveness
    Conflict,
    /// Cooperative cancellation
    Cancelled,
    /// Violated precondition; always a bug
    Invariant,
}

/// Error types shared by the jacques library crates
#[derive(Debug)]
pub enum Error {
    /// IO operation failed
    Io(std::io::Error),

    /// JSON parsing or serialization failed
    Json(serde_json::Error),

    /// Structural mismatch in otherwise well-formed data
    Parse(String),

    /// Referenced entity does not exist
    NotFound(String),

    /// Resource held by another live process
    Conflict(String),

    /// Operation was cancelled cooperatively
    Cancelled,

    /// Broken internal precondition
    Invariant(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::Json(_) | Error::Parse(_) => ErrorKind::Parse,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Invariant(_) => ErrorKind::Invariant,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Error::Conflict(what.into())
    }

    pub fn invariant(what: impl Into<String>) -> Self {
        Error::Invariant(what.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
            Error::Parse(msg) => write!(f, "Parse error: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Invariant(msg) => write!(f, "Invariant violated: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Parse(_)
            | Error::NotFound(_)
            | Error::Conflict(_)
            | Error::Cancelled
            | Error::Invariant(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "x"));
        assert_eq!(io.kind(), ErrorKind::Io);

        assert_eq!(Error::Parse("bad".into()).kind(), ErrorKind::Parse);
        assert_eq!(Error::not_found("session abc").kind(), ErrorKind::NotFound);
        assert_eq!(Error::conflict("port 4473").kind(), ErrorKind::Conflict);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(Error::invariant("dangling ref").kind(), ErrorKind::Invariant);
    }

    #[test]
    fn test_display_includes_detail() {
        let err = Error::not_found("manifest 1234");
        assert_eq!(err.to_string(), "Not found: manifest 1234");
    }
}
