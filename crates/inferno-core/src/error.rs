use thiserror::Error;

use crate::bridge::GatewayError;
use crate::player::PlayerError;

#[derive(Debug, Error)]
pub enum InfernoError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),
    #[error("bridge error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("player error: {0}")]
    Player(#[from] PlayerError),
    #[error("kv backend error: {0}")]
    Kv(String),
    #[error("invalid input: {0}")]
    Input(String),
}

pub type Result<T, E = InfernoError> = std::result::Result<T, E>;
