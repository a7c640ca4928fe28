//! sc-core: Transfer engine for the s3-client CLI
//!
//! This crate provides the SDK-independent parts of s3-client:
//! - Piece planning for chunked downloads and multipart uploads
//! - A bounded worker pool with shared, lock-free progress tracking
//! - Pre-sized destination files with positional writes
//! - Multipart session lifecycle control
//! - Configuration management and S3 URI parsing
//!
//! All storage access goes through the [`ObjectStore`] trait so the engine
//! can be driven by any backend, including in-memory fakes in tests.

pub mod config;
pub mod download;
pub mod error;
pub mod path;
pub mod plan;
pub mod pool;
pub mod progress;
pub mod session;
pub mod traits;
pub mod upload;
pub mod writer;

pub use config::{Config, ConfigManager, ConnectionOptions};
pub use download::{DownloadReport, DownloadRequest, run_download};
pub use error::{Error, Result, SessionStage};
pub use path::{S3Uri, parse_s3_uri};
pub use plan::{Direction, MAX_PARTS, Piece, TransferJob, fit_part_size, plan_pieces};
pub use pool::{FailurePolicy, PieceWorker, WorkerPool};
pub use progress::{
    PieceState, ProgressCallback, ProgressSnapshot, ProgressTracker, StateHistogram,
};
pub use session::MultipartSession;
pub use traits::{CompletedPart, ObjectMetadata, ObjectStore};
pub use upload::{UploadReport, UploadRequest, run_upload};
pub use writer::DestinationWriter;
