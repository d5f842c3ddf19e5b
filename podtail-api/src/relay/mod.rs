//! Relay between a log source and a WebSocket
//!
//! One session per connection. The source is read by the session task, chunks
//! pass through a bounded queue to a single writer task, and a watcher task
//! notices the viewer going away so a blocked source read can be abandoned.

pub mod close;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use close::EndReason;
pub use session::{run_session, SessionContext, SessionReport, SessionSettings, SessionState};
