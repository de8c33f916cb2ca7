//! Core domain types and shared logic for the ThrowPro client.
//!
//! This crate defines the pieces every front-end shares:
//! - Resumable chunked uploads (cursor, content ranges, the upload loop)
//! - Feature curves and timestamp-aligned merging
//! - Peak, band, phase and badge annotations
//! - Typed backend payloads and client configuration

pub mod abort;
pub mod annotate;
pub mod cache;
pub mod compare;
pub mod config;
pub mod curve;
pub mod error;
pub mod features;
mod lenient;
pub mod progress;
pub mod transfer;
pub mod upload;

pub use abort::{AbortHandle, AbortSignal};
pub use annotate::{Badge, BandFit, EnvelopeBand, Phase};
pub use cache::{FeatureCache, FeatureQuery};
pub use compare::ComparisonView;
pub use config::{ClientConfig, Profile, UploadPolicy, validate_filename};
pub use curve::{Curve, CurveKind, CurvePoint, MergedRow, merge_curves};
pub use error::{Error, Result};
pub use features::FeatureCurves;
pub use progress::{ProgressItem, ProgressPage, ProgressQuery};
pub use transfer::{ByteSource, ChunkResponse, ChunkSink, FileSource, MemorySource};
pub use upload::{ChunkRange, UploadReport, UploadTask};

/// Default chunk size: 8 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Maximum accepted upload size: 200 MiB
pub const MAX_UPLOAD_BYTES: u64 = 200 * 1024 * 1024;

/// Content type used when the source does not report one.
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Status returned by resumable-upload endpoints for "chunk received, send more".
pub const RESUME_INCOMPLETE: u16 = 308;
