//! Runtime Module - plan execution
//!
//! - `engine`: `Engine` (submission) and `ExecutionHandle` (poll / cancel / wait)
//! - `scheduler`: DAG Scheduler, bounded dispatch over a tokio `JoinSet`
//! - `step`: Step Runner (resolve, invoke, retry)
//! - `rollback`: Rollback Coordinator (compensations for mutating steps)
//!
//! For static structure, see the `ast` and `dag` modules.

mod engine;
mod rollback;
mod scheduler;
mod step;

pub use engine::{Engine, ExecutionHandle};
