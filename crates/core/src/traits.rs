//! Transfer backend abstraction
//!
//! The copy orchestrator talks to object storage only through
//! [`TransferBackend`], so it can be driven by the S3 adapter in production
//! and by in-memory fakes in tests.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::path::RemotePath;

/// Byte stream read by an upload
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Byte stream written by a download
pub type ByteSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Per-transfer tuning. Zero means "use the backend default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferOptions {
    /// Number of parts in flight for one object
    pub concurrency: usize,
    /// Size of each part in bytes
    pub part_size: u64,
}

/// Content handed to [`TransferBackend::upload`]
pub struct UploadBody {
    pub reader: ByteSource,
    /// Total length when known, lets the backend size its parts
    pub size: Option<u64>,
}

impl UploadBody {
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static, size: Option<u64>) -> Self {
        Self {
            reader: Box::new(reader),
            size,
        }
    }
}

/// Chunked, concurrent object transfer
///
/// Implementations own the stream passed to them and must flush and release
/// it before returning. A missing object on download is reported as
/// [`Error::NotFound`](crate::Error::NotFound); every other failure uses a
/// different variant.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Upload `body` to `target`, returning the number of bytes sent
    async fn upload(
        &self,
        target: &RemotePath,
        body: UploadBody,
        options: TransferOptions,
    ) -> Result<u64>;

    /// Download `source` into `sink`, returning the number of bytes written
    async fn download(
        &self,
        source: &RemotePath,
        sink: ByteSink,
        options: TransferOptions,
    ) -> Result<u64>;
}
