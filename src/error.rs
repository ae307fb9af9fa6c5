// Error types for the playback facade

use thiserror::Error;

/// Errors a playback cycle can end with.
///
/// Nothing here is returned synchronously from the control surface; a
/// failed cycle delivers its error through the finish callback.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The source string could not be understood
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// Local file I/O failed
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A remote source could not be fetched
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The media could not be probed or decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// The audio output device could not be opened or driven
    #[error("audio output error: {0}")]
    Output(String),

    /// Engine-level failure
    #[error("engine error: {0}")]
    Engine(String),
}

/// Convenience Result type using [`PlayerError`].
pub type Result<T> = std::result::Result<T, PlayerError>;
