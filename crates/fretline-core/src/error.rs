//! Crate-level error type

use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::audio::AudioError;
use crate::decoder::DecodeError;
use crate::engine::EngineError;

/// Any error surfaced by the [`Player`](crate::player::Player) facade
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

pub type Result<T> = std::result::Result<T, Error>;
