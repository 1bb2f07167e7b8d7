use thiserror::Error;

#[derive(Error, Debug)]
pub enum VantageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Linking error: {0}")]
    Linking(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Collector not found: {0}")]
    CollectorNotFound(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
