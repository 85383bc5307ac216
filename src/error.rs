// Error taxonomy for a playback session
// Everything here is terminal to the current attempt, never to the process

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The host's focus arbiter refused to let us produce audio.
    #[error("audio focus denied")]
    FocusDenied,

    /// Binding the playback resource to the stream URI failed before prepare.
    #[error("failed to bind stream: {0}")]
    Bind(String),

    /// The resource reported a playback failure after it was bound.
    #[error("playback failed (code {0})")]
    Playback(i32),

    /// The station metadata fetch came back with a transport error.
    #[error("metadata fetch failed: {0}")]
    Fetch(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
