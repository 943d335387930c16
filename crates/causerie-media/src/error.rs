use thiserror::Error;

/// Errors produced by the media layer.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("No input device available")]
    NoInputDevice,

    #[error("No output device available")]
    NoOutputDevice,

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Call transport error: {0}")]
    Transport(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MediaError>;
