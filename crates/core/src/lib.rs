//! bcp-core: Core library for the bucketcp copy tool
//!
//! This crate provides everything except the network client:
//! - Location parsing (`s3://bucket/key` vs local paths)
//! - Recursive directory walking
//! - Destination key mapping
//! - The copy orchestrator and its failure policy
//! - Configuration and retry helpers
//! - The `TransferBackend` trait implemented by object store adapters
//!
//! The crate is independent of any specific S3 SDK so the orchestrator can
//! be tested against in-memory backends.

pub mod config;
pub mod copy;
pub mod error;
pub mod keymap;
pub mod path;
pub mod retry;
pub mod traits;
pub mod walk;

pub use config::{Config, ConfigManager, RetryConfig};
pub use copy::{
    CopyEvent, CopyOutcome, CopyPlan, CopyReport, CopyRequest, Copier, Direction,
    TransferRecord, classify,
};
pub use error::{Error, Result};
pub use keymap::{KeyLayout, map_key};
pub use path::{ParsedPath, RemotePath, parse_path, validate_local_source};
pub use retry::{is_retryable_error, retry_with_backoff};
pub use traits::{ByteSink, ByteSource, TransferBackend, TransferOptions, UploadBody};
pub use walk::walk;
