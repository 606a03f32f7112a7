//! Resilient image upload pipeline for the bike rental admin app
//!
//! Reads image bytes from local references through a chain of fallback
//! strategies, stores them in an S3-compatible bucket with verification and
//! bounded retries, and fans batches out under a concurrency cap.

pub mod app;
pub mod error;
pub mod mime;
pub mod models;
pub mod reader;
pub mod store;
pub mod upload;

pub use error::{Error, ErrorKind, Result};
