use std::path::PathBuf;

use forge_orm::ModelError;

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model definition error: {0}")]
    Model(#[from] ModelError),

    #[error("Template error: {0}")]
    Template(#[from] tinytemplate::error::Error),

    #[error("Invalid marker in {path}: {message}")]
    Marker { path: PathBuf, message: String },
}

pub type CodegenResult<T> = Result<T, CodegenError>;
