//! Error variants for the delta decoder so callers can surface friendly failures.

use thiserror::Error;

/// Delta decoder error kinds exposed to callers.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GitDeltaError {
    /// Failure while applying delta instructions.
    #[error("Delta decoder error: {0}")]
    DeltaDecoderError(String),
}
