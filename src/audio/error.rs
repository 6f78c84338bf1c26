//! Audio subsystem errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to open audio file: {0}")]
    FileOpen(String),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("audio decode error: {0}")]
    Decode(String),

    #[error("no audio track in source")]
    NoAudioTrack,

    #[error("audio output error: {0}")]
    Output(String),

    #[error("failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("failed to start audio stream: {0}")]
    StreamPlay(String),
}
