//! Event Module - audit trail of an execution
//!
//! Key types:
//! - `Event`: envelope with id + timestamp + kind
//! - `EventKind`: execution / step / rollback variants
//! - `EventLog`: thread-safe, append-only log
//! - `EventEmitter`: trait for dependency injection, `NoopEmitter` when unused

mod emitter;
mod log;

pub use emitter::{EventEmitter, NoopEmitter};
pub use log::{Event, EventKind, EventLog};
