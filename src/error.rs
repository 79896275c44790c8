//! Top-level error for the `rollcam` binary.

use std::path::PathBuf;

use thiserror::Error;

use crate::camera::CameraError;
use crate::config::ConfigError;
use crate::convert::ConvertError;
use crate::deck::DeckError;
use crate::ffmpeg::EncoderError;
use crate::headshot::HeadshotError;
use crate::matcher::MatchError;
use crate::recording::RecordingError;
use crate::roster::RosterError;
use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Deck(#[from] DeckError),
    #[error(transparent)]
    Headshot(#[from] HeadshotError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
