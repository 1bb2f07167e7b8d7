use thiserror::Error;

#[derive(Error, Debug)]
pub enum NerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("NER service returned {status}: {message}")]
    Api { status: u16, message: String },
}
