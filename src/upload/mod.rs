//! Upload orchestration
//!
//! Wraps the binary reader and the object store into the retrying
//! single-image upload and the bounded-concurrency batch upload.

pub mod batch;
pub mod key;
pub mod orchestrator;
pub mod retry;

pub use batch::{BatchUploader, DEFAULT_BATCH_CONCURRENCY};
pub use key::KeyGenerator;
pub use orchestrator::UploadOrchestrator;
pub use retry::LinearBackoff;
