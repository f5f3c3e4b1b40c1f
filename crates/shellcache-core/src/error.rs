use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Cache store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache metadata: {0}")]
    CorruptEntry(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Precache of {url} failed: {reason}")]
    Precache { url: String, reason: String },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Worker state error: {0}")]
    State(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
