//! Shared primitives for the cellfate trajectory-inference toolkit.
//!
//! `cellfate-core` provides the foundation the other cellfate crates build on:
//!
//! - **Error types** — [`CellfateError`] and [`Result`] for structured error handling
//! - **Traits** — [`Summarizable`] for one-line descriptions of containers
//! - **Work splitting** — [`parallelize`] splits a collection into ordered chunks,
//!   runs them on a bounded worker pool and reassembles the results in order

pub mod error;
pub mod parallel;
pub mod traits;

pub use error::{CellfateError, Result};
pub use parallel::{
    chunk_ranges, concatenate, panic_message, parallelize, parallelize_with, Chunk, ParallelConfig,
    ProgressFn, Splittable,
};
pub use traits::*;
