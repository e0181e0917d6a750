//! Core types and trait definitions for the deviation lifecycle.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the status graph, the validation rules that run before any write, and the
//! [`store::DeviationStore`] abstraction every backend implements.

pub mod approval;
pub mod assessment;
pub mod cft;
pub mod deviation;
pub mod error;
pub mod investigation;
pub mod lifecycle;
pub mod report;
pub mod status;
pub mod store;

pub use error::{Classify, Error, ErrorKind, Result};
