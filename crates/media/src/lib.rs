//! Media pipeline: bounded download, image normalization, object storage,
//! and the canonical stored-media result handed back to ingestion.

pub mod download;
pub mod error;
pub mod image_ops;
pub mod mime;
pub mod pipeline;
pub mod store;

pub use {
    error::{Error, Result},
    pipeline::{IngestMeta, MediaLimits, MediaPipeline, StoredMedia},
    store::{FsObjectStore, ObjectStore},
};
