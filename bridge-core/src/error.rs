use std::fmt;

/// All bridge-local error conditions, tagged with the gRPC status code they
/// are surfaced as (§7 of the design spec).
///
/// Errors that originate from a *live* backend call are carried as
/// `tonic::Status` directly and never pass through this type — only errors
/// that occur before or outside of an actual gRPC call do.
#[derive(Debug)]
pub enum BridgeError {
    /// Malformed frame, bad method syntax, bad `binaryFields` hint, etc.
    InvalidArgument(String),

    /// Second `start` with a still-live `callId`.
    AlreadyExists(String),

    /// Unknown `callId`, or unresolvable package/service/method.
    NotFound(String),

    /// `write`/`end` on a call shape that doesn't support it.
    FailedPrecondition(String),

    /// Local exception: marshalling, channel construction, transport setup.
    Unknown(String),

    /// An I/O error (proto file read, TLS cert read).
    Io(std::io::Error),

    /// A `.proto` compilation error.
    Proto(String),
}

impl BridgeError {
    /// The gRPC status code this error is reported under.
    pub fn code(&self) -> i32 {
        match self {
            BridgeError::InvalidArgument(_) => 3,
            BridgeError::AlreadyExists(_) => 6,
            BridgeError::NotFound(_) => 5,
            BridgeError::FailedPrecondition(_) => 9,
            BridgeError::Unknown(_) => 2,
            BridgeError::Io(_) => 2,
            BridgeError::Proto(_) => 2,
        }
    }

    /// The human-readable detail string placed on the outbound `error` frame.
    pub fn details(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            BridgeError::AlreadyExists(id) => write!(f, "call already exists: {id}"),
            BridgeError::NotFound(msg) => write!(f, "not found: {msg}"),
            BridgeError::FailedPrecondition(msg) => write!(f, "failed precondition: {msg}"),
            BridgeError::Unknown(msg) => write!(f, "unknown error: {msg}"),
            BridgeError::Io(err) => write!(f, "I/O error: {err}"),
            BridgeError::Proto(msg) => write!(f, "proto error: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err)
    }
}

/// Convenience type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;
