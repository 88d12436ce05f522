use thiserror::Error;

/// Failure taxonomy for a transfer.  Every fallible operation in this crate
/// reports one of these four kinds; collaborator-specific errors (reqwest,
/// the S3 SDK) are mapped into them at the boundary where they occur.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A missing or invalid input: bad method token, unknown ACL or storage
    /// class, incomplete auth credentials.  Raised before any network I/O
    /// and never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// The network leg failed: no response at all, or a retriable status
    /// after retries were exhausted (or with retries disabled).
    #[error("network error: {message}")]
    Network {
        message: String,
        /// HTTP status of the last attempt, when a response was received.
        status: Option<u16>,
    },

    /// The origin answered with a status this tool does not retry.
    #[error("HTTP {status} {text}")]
    HttpStatus { status: u16, text: String },

    /// The destination store failed at existence-check, write, or finalize
    /// time.  Never retried; a fresh invocation is required.
    #[error("storage error for {dest}: {message}")]
    Storage { dest: String, message: String },
}

impl TransferError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn network(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Network {
            message: message.into(),
            status,
        }
    }

    pub fn storage(dest: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            dest: dest.into(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = TransferError> = std::result::Result<T, E>;
