use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid workload: {0}")]
    InvalidWorkload(String),

    #[error("Workload not found: {0}")]
    WorkloadNotFound(String),

    #[error("Log source unavailable: {0}")]
    SourceUnavailable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
