//! Sequence file uploads.

pub mod buffer;
pub mod endpoint;

pub use buffer::UploadBuffer;
pub use endpoint::{ChunkOutcome, UploadEndpoint, UploadError, UploadReport};
