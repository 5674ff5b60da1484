use std::fmt;

/// Enumerates all the errors that can be reported by the edge device
/// manager. Every collaborator (metadata store, datastore, bus adapter,
/// coordinator, HTTP façade) maps its own failures into one of these
/// kinds rather than leaking a foreign error type across a module
/// boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller supplied a malformed or incomplete request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The requested protocol, product, or device does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An entity with this id already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A back-end time-series operation failed (connect, write, query,
    /// export, or an unsupported dialect/format was requested).
    #[error("datastore error: {0}")]
    DataStore(String),

    /// A message bus operation failed (subscribe, publish, or the
    /// peer end of a request/reply channel went away).
    #[error("bus error: {0}")]
    Bus(String),

    /// Anything else: config parsing, metadata file I/O, serialization.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn bad_request(msg: impl fmt::Display) -> Self {
        Error::BadRequest(msg.to_string())
    }

    pub fn not_found(msg: impl fmt::Display) -> Self {
        Error::NotFound(msg.to_string())
    }

    pub fn conflict(msg: impl fmt::Display) -> Self {
        Error::Conflict(msg.to_string())
    }

    pub fn data_store(msg: impl fmt::Display) -> Self {
        Error::DataStore(msg.to_string())
    }

    pub fn bus(msg: impl fmt::Display) -> Self {
        Error::Bus(msg.to_string())
    }

    pub fn internal(msg: impl fmt::Display) -> Self {
        Error::Internal(msg.to_string())
    }

    /// The HTTP status code this error kind maps to, per the external
    /// interface's status-code table.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::BadRequest(_) => 400,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::DataStore(_) | Error::Bus(_) | Error::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// Every RPC in the operations layer (C5) is built on an `mpsc` request
// channel paired with a `oneshot` reply channel. If either peer has
// dropped its end, that's a bus failure from the caller's point of
// view, not a distinct error family.

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::Bus("request channel is closed".into())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::Bus("reply dropped before a response was sent".into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("serialization error: {e}"))
    }
}
