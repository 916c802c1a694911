//! `gas-core`: domain model and capability traits for the annotation
//! job worker.
//!
//! Nothing in this crate talks to a network service or a database. The
//! traits in [`store`], [`storage`], [`queue`], and [`notify`] are
//! implemented by `gas-db` and `gas-cloud` for production, and by the
//! [`memory`] module for tests and local runs.

pub mod envelope;
pub mod error;
pub mod job;
pub mod memory;
pub mod naming;
pub mod notify;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod storage;
pub mod store;
pub mod submit;
pub mod types;
