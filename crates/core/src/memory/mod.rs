//! In-memory implementations of every capability trait.
//!
//! Used by unit and integration tests, and for running the worker
//! locally without cloud services. Each fake supports failure injection
//! so tests can exercise the error paths of the worker.

mod executor;
mod notify;
mod queue;
mod storage;
mod store;

pub use executor::{StubBehavior, StubExecutor};
pub use notify::MemoryNotifier;
pub use queue::MemoryQueue;
pub use storage::MemoryObjectStore;
pub use store::MemoryJobStore;
