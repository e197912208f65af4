//! Error types for tile grid construction

use thiserror::Error;

/// Result type alias for the tiling library
pub type Result<T> = std::result::Result<T, TilingError>;

/// Errors raised while setting up a tiling pass
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TilingError {
    #[error("Invalid tiling configuration: {0}")]
    InvalidConfig(String),
}

impl TilingError {
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
