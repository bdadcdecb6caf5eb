use std::io;

use rodio::decoder::DecoderError;
use rodio::{DevicesError, PlayError, StreamError};
use thiserror::Error;

/// Coarse classification of [`ClipError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input stream is unreadable, malformed or in an unsupported format.
    Decode,
    /// No audio output could be acquired.
    Resource,
    /// Operation on a clip that was already closed.
    InvalidState,
}

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("failed to read audio stream: {0}")]
    Read(#[from] io::Error),
    #[error("failed to decode audio stream: {0}")]
    Decode(#[from] DecoderError),
    #[error("malformed wav data: {0}")]
    Wav(#[from] hound::Error),
    #[error("audio clip too long: {0} samples")]
    TooLong(usize),
    #[error("failed to list output devices: {0}")]
    Devices(#[from] DevicesError),
    #[error("output device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open output stream: {0}")]
    Stream(#[from] StreamError),
    #[error("failed to create sink: {0}")]
    Play(#[from] PlayError),
    #[error("audio clip is closed")]
    Closed,
}

impl ClipError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClipError::Read(_)
            | ClipError::Decode(_)
            | ClipError::Wav(_)
            | ClipError::TooLong(_) => ErrorKind::Decode,
            ClipError::Devices(_)
            | ClipError::DeviceNotFound(_)
            | ClipError::Stream(_)
            | ClipError::Play(_) => ErrorKind::Resource,
            ClipError::Closed => ErrorKind::InvalidState,
        }
    }
}
