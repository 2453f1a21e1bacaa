//! Project schedule import engine.
//!
//! Turns a flat, outline-ordered schedule export into a project hierarchy,
//! derives milestone status against a caller-supplied as-of date, and diffs
//! the result against the last committed snapshot. Every detected change
//! needs a reason before the snapshot for its project is replaced.

pub mod classify;
pub mod cli;
pub mod codes;
pub mod config;
pub mod db;
pub mod diff;
pub mod engine;
pub mod error;
pub mod format;
pub mod input;
pub mod locks;
pub mod logging;
pub mod outline;
pub mod session;
pub mod status;
pub mod store;
pub mod types;

pub use engine::{CommittedResult, ImportEngine};
pub use error::{ImportError, ImportResult};
pub use session::SessionState;
pub use store::{MemoryStore, SnapshotStore};
