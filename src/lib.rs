//! Client for the ScreenApp files API upload endpoints.
//!
//! Large files go through a multipart session: the file is read in fixed-size
//! chunks, each chunk is PUT to its own pre-signed URL, and the session is
//! finalized into a stored file once every part is in. Small files can use
//! the single-shot path instead.

pub mod chunks;
pub mod client;
pub mod config;
pub mod error;
pub mod rest_types;
mod serde_utils;
pub mod transport;
pub mod upload;

#[cfg(test)]
mod testing;

pub use chunks::{ChunkReader, DEFAULT_CHUNK_SIZE_BYTES, part_count};
pub use client::{FileMetadata, PartDestination, UploadClient, UploadSession};
pub use config::{Config, Destination, UploadMode};
pub use error::{ConfigError, Phase, TransportError, UploadError};
pub use rest_types::StoredObject;
pub use transport::{ByteStream, HttpTransport, Reply, Transport};
pub use upload::{PartProgress, UploadEvent, UploadOptions, UploadState};
