// podtail API library
//
// HTTP entry point and the relay loop bridging log sources to WebSockets

pub mod http;
pub mod relay;

// Re-export commonly used types
pub use http::{create_router, AppState};
