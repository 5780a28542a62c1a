//! Error types for the capture engine

use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing and stitching a region
#[derive(Error, Debug)]
pub enum Error {
    /// The host could not rasterize the viewport, or returned no data
    #[error("Viewport capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// The raster returned by the host could not be decoded
    #[error("Failed to decode captured frame: {0}")]
    DecodeError(String),

    /// The destination buffer exceeds platform limits even after scale-down
    #[error("Destination buffer allocation failed: {0}")]
    BufferAllocationError(String),

    /// The composited buffer could not be encoded
    #[error("Failed to encode image: {0}")]
    EncodeError(String),

    /// The selection is unusable (too small, negative or non-finite)
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The session was dismissed before it finished
    #[error("Capture cancelled")]
    Cancelled,

    /// The session ran past its deadline
    #[error("Capture timed out after {0}ms")]
    Timeout(u64),

    /// The delivery surface rejected the final image
    #[error("Failed to deliver image: {0}")]
    DeliveryError(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Terminal failure of a capture session, wrapping the underlying cause
    #[error("Capture failed: {0}")]
    CaptureFailed(#[source] Box<Error>),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap this error as the terminal failure of a session.
    ///
    /// Cancellation is reported as-is, and an already wrapped failure is not
    /// wrapped twice.
    pub fn into_capture_failed(self) -> Self {
        match self {
            Error::Cancelled | Error::CaptureFailed(_) => self,
            other => Error::CaptureFailed(Box::new(other)),
        }
    }

    /// The underlying cause when this is a `CaptureFailed`, otherwise `self`.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::CaptureFailed(inner) => inner.root_cause(),
            other => other,
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::DecodeError(err.to_string())
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}
