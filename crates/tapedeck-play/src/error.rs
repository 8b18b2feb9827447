use thiserror::Error;

pub type PlayResult<T> = Result<T, PlayError>;

/// Centralized error type for tapedeck-play.
#[derive(Debug, Error, Clone)]
pub enum PlayError {
    #[error("a listener is already installed")]
    ListenerAlreadySet,

    #[error("player is closed")]
    Closed,
}
