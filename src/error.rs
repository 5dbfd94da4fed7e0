use thiserror::Error;

use crate::{config::LoadError, infra::error::InfraError};

/// Top-level failure of the `pagecache` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
}
