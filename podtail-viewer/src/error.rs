use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported relay scheme: {0} (expected ws, wss, http or https)")]
    UnsupportedScheme(String),

    #[error("Invalid workload: {0}")]
    InvalidWorkload(#[from] podtail_core::Error),

    #[error("Failed to connect to relay: {0}")]
    Connect(#[from] Box<tungstenite::Error>),
}

impl From<tungstenite::Error> for ViewerError {
    fn from(e: tungstenite::Error) -> Self {
        Self::Connect(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, ViewerError>;
