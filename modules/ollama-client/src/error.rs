use thiserror::Error;

#[derive(Error, Debug)]
pub enum OllamaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected embedding dimensions: expected {expected}, got {actual}")]
    Dimensions { expected: usize, actual: usize },
}
