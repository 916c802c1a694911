//! Annotation pipeline execution.
//!
//! The annotation tool is an opaque external program. [`Executor`] is the
//! seam the worker depends on; [`annotator::AnnotatorExecutor`] runs the
//! real tool as a child process and [`crate::memory::StubExecutor`]
//! stands in for it in tests. All subprocess management is pure (no
//! network, no store access).

pub mod annotator;
pub mod executor;
pub mod subprocess;

pub use annotator::AnnotatorExecutor;
pub use executor::{Executor, PipelineError, PipelineRun};
