pub mod config;
pub mod error;
pub mod logging;
pub mod shutdown;
pub mod source;
pub mod workload;

pub use config::Config;
pub use error::{Error, Result};
pub use source::{LogSourceProvider, LogStream};
pub use workload::{LogRequest, WorkloadId};
