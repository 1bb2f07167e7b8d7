use thiserror::Error;

#[derive(Error, Debug)]
pub enum QdrantError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vector store returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Unexpected response shape: {0}")]
    Shape(String),
}
