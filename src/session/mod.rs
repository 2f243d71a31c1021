// Build sessions: status, logs and the store that holds them

pub mod store;
pub mod types;

pub use store::{InMemorySessionStore, SessionError, SessionReporter, SessionStore};
pub use types::{BuildSession, BuildStatus, LogEntry};
