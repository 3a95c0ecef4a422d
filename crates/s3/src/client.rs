//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the `TransferBackend` trait from bcp-core.
//! Uploads are split into parts sent concurrently through the multipart API;
//! downloads are split into ranged GETs fetched concurrently and written to
//! the sink in order.

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_smithy_types::byte_stream::ByteStream;
use bcp_core::{
    ByteSink, ByteSource, Config, Error, RemotePath, Result, RetryConfig, TransferBackend,
    TransferOptions, UploadBody, is_retryable_error, retry_with_backoff,
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Parts in flight per object when the caller passes 0
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Part size when the caller passes 0 (5 MiB)
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Smallest part S3 accepts for all but the last part of a multipart upload
pub const MIN_UPLOAD_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum number of parts in one multipart upload
pub const MAX_UPLOAD_PARTS: u64 = 10_000;

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    retry: RetryConfig,
}

impl S3Client {
    /// Create a new S3 client from resolved configuration
    ///
    /// Credentials come from the ambient AWS provider chain (environment,
    /// profile, instance metadata).
    pub async fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        tracing::debug!(
            region = %config.region,
            endpoint = ?config.endpoint,
            force_path_style = config.force_path_style,
            "Created S3 client"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            retry: config.retry.clone(),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    /// Format AWS SDK error into a detailed error message
    fn format_sdk_error<E>(error: &SdkError<E>) -> String
    where
        E: ProvideErrorMetadata + std::fmt::Display,
    {
        match error {
            SdkError::ServiceError(service_err) => {
                let err = service_err.err();
                let mut msg = format!("Service error: {err}");
                if let Some(code) = err.code() {
                    msg.push_str(&format!(" (code: {code})"));
                }
                msg.push_str(&format!(
                    " (status: {})",
                    service_err.raw().status().as_u16()
                ));
                msg
            }
            SdkError::ConstructionFailure(err) => {
                format!("Request construction failed: {err:?}")
            }
            SdkError::TimeoutError(_) => "Request timeout".to_string(),
            SdkError::DispatchFailure(err) => {
                format!("Network dispatch error: {err:?}")
            }
            SdkError::ResponseError(err) => {
                format!("Response error: {err:?}")
            }
            _ => error.to_string(),
        }
    }

    /// Map a failed request; never reports "not found"
    fn request_error<E>(error: &SdkError<E>) -> Error
    where
        E: ProvideErrorMetadata + std::fmt::Display,
    {
        Error::Network(Self::format_sdk_error(error))
    }

    /// Map a failed read of `path`, recognising a missing object
    fn lookup_error<E>(error: &SdkError<E>, path: &RemotePath) -> Error
    where
        E: ProvideErrorMetadata + std::fmt::Display,
    {
        let status = error.raw_response().map(|r| r.status().as_u16());
        if is_missing_object(status, error.code()) {
            Error::NotFound(path.to_string())
        } else {
            Self::request_error(error)
        }
    }

    async fn put_single(
        &self,
        target: &RemotePath,
        data: Bytes,
        content_type: &str,
    ) -> Result<u64> {
        let len = data.len() as u64;

        retry_with_backoff(
            &self.retry,
            || {
                let request = self
                    .inner
                    .put_object()
                    .bucket(&target.bucket)
                    .key(&target.key)
                    .content_type(content_type)
                    .body(ByteStream::from(data.clone()));
                async move { request.send().await.map_err(|e| Self::request_error(&e)) }
            },
            is_retryable_error,
        )
        .await?;

        tracing::debug!(bucket = %target.bucket, key = %target.key, bytes = len, "Put object");
        Ok(len)
    }

    async fn put_multipart(
        &self,
        target: &RemotePath,
        reader: ByteSource,
        first: Bytes,
        part_size: u64,
        concurrency: usize,
        content_type: &str,
    ) -> Result<u64> {
        let create = retry_with_backoff(
            &self.retry,
            || {
                let request = self
                    .inner
                    .create_multipart_upload()
                    .bucket(&target.bucket)
                    .key(&target.key)
                    .content_type(content_type);
                async move { request.send().await.map_err(|e| Self::request_error(&e)) }
            },
            is_retryable_error,
        )
        .await?;

        let upload_id = create
            .upload_id()
            .ok_or_else(|| Error::Network("CreateMultipartUpload returned no upload id".into()))?
            .to_string();

        tracing::debug!(
            bucket = %target.bucket,
            key = %target.key,
            upload_id = %upload_id,
            part_size,
            concurrency,
            "Started multipart upload"
        );

        let upload_id = upload_id.as_str();
        abort_on_error(
            async {
                let (mut parts, bytes) = self
                    .upload_parts(target, upload_id, reader, first, part_size, concurrency)
                    .await?;

                parts.sort_by_key(|p| p.part_number());
                let part_count = parts.len();
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();

                retry_with_backoff(
                    &self.retry,
                    || {
                        let request = self
                            .inner
                            .complete_multipart_upload()
                            .bucket(&target.bucket)
                            .key(&target.key)
                            .upload_id(upload_id)
                            .multipart_upload(completed.clone());
                        async move { request.send().await.map_err(|e| Self::request_error(&e)) }
                    },
                    is_retryable_error,
                )
                .await?;

                tracing::debug!(key = %target.key, parts = part_count, bytes, "Completed multipart upload");
                Ok(bytes)
            },
            |error| async move {
                // Abort so no orphaned parts are left behind
                tracing::warn!(key = %target.key, %error, "Multipart upload failed, aborting");
                if let Err(abort_err) = self
                    .inner
                    .abort_multipart_upload()
                    .bucket(&target.bucket)
                    .key(&target.key)
                    .upload_id(upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        upload_id = %upload_id,
                        error = %Self::format_sdk_error(&abort_err),
                        "Failed to abort multipart upload"
                    );
                }
            },
        )
        .await
    }

    /// Read parts off `reader` and send up to `concurrency` of them at once
    async fn upload_parts(
        &self,
        target: &RemotePath,
        upload_id: &str,
        reader: ByteSource,
        first: Bytes,
        part_size: u64,
        concurrency: usize,
    ) -> Result<(Vec<CompletedPart>, u64)> {
        let chunks = stream::try_unfold(
            (reader, Some(first), 1i32),
            move |(mut reader, pending, number)| async move {
                let chunk = match pending {
                    Some(chunk) => chunk,
                    None => read_chunk(&mut reader, part_size).await?,
                };
                if chunk.is_empty() {
                    return Ok(None);
                }
                if (number as u64) > MAX_UPLOAD_PARTS {
                    return Err(Error::Config(format!(
                        "upload exceeds {MAX_UPLOAD_PARTS} parts, increase the part size"
                    )));
                }
                Ok(Some(((number, chunk), (reader, None, number + 1))))
            },
        )
        .boxed();

        let uploaded: Vec<(CompletedPart, u64)> = chunks
            .map_ok(|(number, chunk)| self.upload_part(target, upload_id, number, chunk))
            .try_buffer_unordered(concurrency)
            .try_collect()
            .await?;

        let bytes = uploaded.iter().map(|(_, len)| len).sum();
        let parts = uploaded.into_iter().map(|(part, _)| part).collect();
        Ok((parts, bytes))
    }

    async fn upload_part(
        &self,
        target: &RemotePath,
        upload_id: &str,
        part_number: i32,
        chunk: Bytes,
    ) -> Result<(CompletedPart, u64)> {
        let len = chunk.len() as u64;

        let response = retry_with_backoff(
            &self.retry,
            || {
                let request = self
                    .inner
                    .upload_part()
                    .bucket(&target.bucket)
                    .key(&target.key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .content_length(len as i64)
                    .body(ByteStream::from(chunk.clone()));
                async move { request.send().await.map_err(|e| Self::request_error(&e)) }
            },
            is_retryable_error,
        )
        .await?;

        tracing::trace!(key = %target.key, part_number, bytes = len, "Uploaded part");

        let part = CompletedPart::builder()
            .set_e_tag(response.e_tag().map(str::to_string))
            .part_number(part_number)
            .build();
        Ok((part, len))
    }

    async fn get_range(
        &self,
        source: &RemotePath,
        if_match: Option<&str>,
        start: u64,
        end: u64,
    ) -> Result<Bytes> {
        retry_with_backoff(
            &self.retry,
            || {
                let request = self
                    .inner
                    .get_object()
                    .bucket(&source.bucket)
                    .key(&source.key)
                    .range(format!("bytes={start}-{end}"))
                    .set_if_match(if_match.map(str::to_string));
                async move {
                    let response = request
                        .send()
                        .await
                        .map_err(|e| Self::lookup_error(&e, source))?;
                    let data = response.body.collect().await.map_err(|e| {
                        Error::Network(format!("Failed to read response body: {e}"))
                    })?;
                    Ok(data.into_bytes())
                }
            },
            is_retryable_error,
        )
        .await
    }

    async fn write_ranges(
        &self,
        source: &RemotePath,
        sink: &mut ByteSink,
        if_match: Option<&str>,
        size: u64,
        part_size: u64,
        concurrency: usize,
    ) -> Result<u64> {
        let mut parts = stream::iter(byte_ranges(size, part_size))
            .map(|(start, end)| self.get_range(source, if_match, start, end))
            .buffered(concurrency);

        let mut written = 0u64;
        while let Some(chunk) = parts.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        Ok(written)
    }
}

#[async_trait]
impl TransferBackend for S3Client {
    async fn upload(
        &self,
        target: &RemotePath,
        body: UploadBody,
        options: TransferOptions,
    ) -> Result<u64> {
        let concurrency = effective_concurrency(options.concurrency);
        let part_size = upload_part_size(options.part_size, body.size)?;
        let content_type = mime_guess::from_path(&target.key)
            .first_or_octet_stream()
            .to_string();

        tracing::info!(
            bucket = %target.bucket,
            key = %target.key,
            concurrency,
            part_size,
            "Starting upload"
        );

        let mut reader = body.reader;
        let first = read_chunk(&mut reader, part_size).await?;
        let first_len = first.len() as u64;

        if first_len < part_size || body.size == Some(first_len) {
            return self.put_single(target, first, &content_type).await;
        }

        self.put_multipart(target, reader, first, part_size, concurrency, &content_type)
            .await
    }

    async fn download(
        &self,
        source: &RemotePath,
        mut sink: ByteSink,
        options: TransferOptions,
    ) -> Result<u64> {
        let concurrency = effective_concurrency(options.concurrency);
        let part_size = if options.part_size == 0 {
            DEFAULT_PART_SIZE
        } else {
            options.part_size
        };

        let head = retry_with_backoff(
            &self.retry,
            || {
                let request = self
                    .inner
                    .head_object()
                    .bucket(&source.bucket)
                    .key(&source.key);
                async move {
                    request
                        .send()
                        .await
                        .map_err(|e| Self::lookup_error(&e, source))
                }
            },
            is_retryable_error,
        )
        .await;

        let head = match head {
            Ok(head) => head,
            Err(e) => {
                // Release the sink before reporting
                let _ = sink.shutdown().await;
                return Err(e);
            }
        };

        let size = head.content_length().unwrap_or(0).max(0) as u64;
        let etag = head.e_tag().map(str::to_string);

        tracing::info!(
            bucket = %source.bucket,
            key = %source.key,
            size,
            concurrency,
            part_size,
            "Starting download"
        );

        let result = self
            .write_ranges(
                source,
                &mut sink,
                etag.as_deref(),
                size,
                part_size,
                concurrency,
            )
            .await;
        let closed = sink.shutdown().await;

        let written = result?;
        closed?;
        Ok(written)
    }
}

/// Whether a failed lookup means the object (or its bucket) does not exist
fn is_missing_object(status: Option<u16>, code: Option<&str>) -> bool {
    status == Some(404) || matches!(code, Some("NoSuchKey" | "NotFound"))
}

/// Await `work`; if it fails, await `on_error` with the error message
/// before returning the error
async fn abort_on_error<T, W, A, AF>(work: W, on_error: A) -> Result<T>
where
    W: std::future::Future<Output = Result<T>>,
    A: FnOnce(String) -> AF,
    AF: std::future::Future<Output = ()>,
{
    match work.await {
        Ok(value) => Ok(value),
        Err(e) => {
            on_error(e.to_string()).await;
            Err(e)
        }
    }
}

fn effective_concurrency(requested: usize) -> usize {
    if requested == 0 {
        DEFAULT_CONCURRENCY
    } else {
        requested
    }
}

/// Part size for an upload of `size` bytes (when known)
///
/// Zero selects [`DEFAULT_PART_SIZE`]. Sizes below [`MIN_UPLOAD_PART_SIZE`]
/// are rejected. The part size grows when the known size would otherwise
/// need more than [`MAX_UPLOAD_PARTS`] parts.
pub fn upload_part_size(requested: u64, size: Option<u64>) -> Result<u64> {
    let part_size = if requested == 0 {
        DEFAULT_PART_SIZE
    } else {
        requested
    };

    if part_size < MIN_UPLOAD_PART_SIZE {
        return Err(Error::Config(format!(
            "part size must be at least {MIN_UPLOAD_PART_SIZE} bytes, got {part_size}"
        )));
    }

    match size {
        Some(total) if total / part_size >= MAX_UPLOAD_PARTS => Ok(total / MAX_UPLOAD_PARTS + 1),
        _ => Ok(part_size),
    }
}

/// Inclusive byte ranges covering `size` bytes in `part_size` steps
fn byte_ranges(size: u64, part_size: u64) -> impl Iterator<Item = (u64, u64)> {
    (0..size)
        .step_by(part_size.max(1) as usize)
        .map(move |start| (start, (start + part_size).min(size) - 1))
}

/// Read up to `limit` bytes; a short result means the reader is exhausted
async fn read_chunk<R>(reader: &mut R, limit: u64) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(limit.min(64 * 1024 * 1024) as usize);
    reader.take(limit).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}
