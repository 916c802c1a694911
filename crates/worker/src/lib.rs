//! `gas-worker`: the annotation job worker.
//!
//! Consumes job requests from the request queue and, per message, stages
//! the input, claims the job, runs the annotation pipeline, publishes the
//! results, and records the terminal status. See [`dispatcher::Dispatcher`]
//! for the loop and [`processor::JobProcessor`] for the per-message steps.

pub mod config;
pub mod dispatcher;
pub mod processor;
pub mod publisher;
pub mod state;
pub mod workspace;

pub use config::WorkerConfig;
pub use dispatcher::Dispatcher;
pub use processor::JobProcessor;
