//! Durable state for the session tracker.
//!
//! This module provides:
//! - A key-value backend port with file and in-memory implementations
//! - A typed store for the open-session slot and the bounded history log
//! - A per-directory lock that keeps a single writing process

pub mod backend;
pub mod lock;
pub mod state;

// Re-export commonly used types
pub use backend::{FileBackend, KeyValueBackend, MemoryBackend, StoreError};
pub use lock::{LockError, StateLock, LOCK_FILE_NAME};
pub use state::{StateStore, HISTORY_CAP, STORE_NAMESPACE};
