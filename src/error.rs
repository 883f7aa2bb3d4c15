use thiserror::Error;

/// Library error type for the control plane.
#[derive(Debug, Error)]
pub enum Error {
    /// The control socket could not be prepared or its consumer went away.
    #[error("control socket error: {0}")]
    Socket(String),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed control command.
    #[error(transparent)]
    Command(#[from] serde_json::Error),
}
