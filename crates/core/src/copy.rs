//! Copy orchestration
//!
//! A copy moves one local file, one local directory tree, or one remote
//! object across the local/object-storage boundary. Files are processed one
//! at a time; parallelism only happens inside a single backend transfer.

use std::collections::HashMap;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::keymap::{KeyLayout, map_key};
use crate::path::{ParsedPath, RemotePath, parse_path, validate_local_source};
use crate::traits::{TransferBackend, TransferOptions, UploadBody};
use crate::walk::walk;

/// Top-level input of one copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub source: String,
    pub destination: String,
    /// Parts in flight per file, 0 = backend default
    pub concurrency: usize,
    /// Part size in bytes, 0 = backend default
    pub part_size: u64,
}

impl CopyRequest {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            concurrency: 0,
            part_size: 0,
        }
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn part_size(mut self, bytes: u64) -> Self {
        self.part_size = bytes;
        self
    }

    fn options(&self) -> TransferOptions {
        TransferOptions {
            concurrency: self.concurrency,
            part_size: self.part_size,
        }
    }
}

/// Which way the bytes move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local filesystem to object storage
    Upload,
    /// Object storage to local filesystem
    Download,
}

/// A classified copy: one local side, one remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyPlan {
    pub direction: Direction,
    pub local: PathBuf,
    pub remote: RemotePath,
}

/// Parse both locations and require exactly one of them to be remote
pub fn classify(source: &str, destination: &str) -> Result<CopyPlan> {
    let source = parse_path(source)?;
    let destination = parse_path(destination)?;

    match (source, destination) {
        (ParsedPath::Local(local), ParsedPath::Remote(remote)) => Ok(CopyPlan {
            direction: Direction::Upload,
            local,
            remote,
        }),
        (ParsedPath::Remote(remote), ParsedPath::Local(local)) => Ok(CopyPlan {
            direction: Direction::Download,
            local,
            remote,
        }),
        (ParsedPath::Remote(_), ParsedPath::Remote(_)) => Err(Error::InvalidUsage(
            "copying between two object locations is not supported; one side must be a local path"
                .into(),
        )),
        (ParsedPath::Local(_), ParsedPath::Local(_)) => Err(Error::InvalidUsage(
            "one side must be an object location (s3://<bucket>/<key>)".into(),
        )),
    }
}

/// One file moved successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRecord {
    pub source: String,
    pub target: String,
    pub bytes: u64,
}

/// How a successful copy ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyOutcome {
    Completed,
    /// Download source did not exist; nothing was written
    ObjectNotFound,
}

/// Result of a successful copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    pub direction: Direction,
    pub outcome: CopyOutcome,
    pub transfers: Vec<TransferRecord>,
    pub elapsed_ms: u64,
}

impl CopyReport {
    pub fn total_bytes(&self) -> u64 {
        self.transfers.iter().map(|t| t.bytes).sum()
    }
}

/// Progress notifications emitted while a copy runs
#[derive(Debug)]
pub enum CopyEvent<'a> {
    /// A file transfer is about to start
    Started { source: &'a str, target: &'a str },
    /// A file transfer finished
    Finished(&'a TransferRecord),
    /// The download source does not exist
    ObjectNotFound(&'a RemotePath),
    /// Two walked files map to the same key; `file` overwrites `previous`
    KeyCollision {
        target: &'a RemotePath,
        previous: &'a Path,
        file: &'a Path,
    },
}

type Observer = Arc<dyn Fn(&CopyEvent<'_>) + Send + Sync>;

/// Drives copies through a [`TransferBackend`]
pub struct Copier<B> {
    backend: B,
    layout: KeyLayout,
    observer: Option<Observer>,
}

impl<B: TransferBackend> Copier<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            layout: KeyLayout::default(),
            observer: None,
        }
    }

    /// Set how directory uploads map files to keys
    pub fn with_layout(mut self, layout: KeyLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Register a callback receiving [`CopyEvent`]s
    pub fn with_observer(mut self, observer: impl Fn(&CopyEvent<'_>) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one copy to completion or to the first unrecoverable error
    pub async fn copy(&self, request: &CopyRequest) -> Result<CopyReport> {
        let started = Instant::now();
        let plan = classify(&request.source, &request.destination)?;
        let options = request.options();

        tracing::debug!(
            direction = ?plan.direction,
            local = %plan.local.display(),
            remote = %plan.remote,
            concurrency = options.concurrency,
            part_size = options.part_size,
            "Starting copy"
        );

        let (outcome, transfers) = match plan.direction {
            Direction::Upload => {
                let is_dir = validate_local_source(&plan.local)?;
                let transfers = self
                    .upload(&plan.local, &plan.remote, is_dir, options)
                    .await?;
                (CopyOutcome::Completed, transfers)
            }
            Direction::Download => self.download(&plan.remote, &plan.local, options).await?,
        };

        Ok(CopyReport {
            direction: plan.direction,
            outcome,
            transfers,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn emit(&self, event: CopyEvent<'_>) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &RemotePath,
        is_dir: bool,
        options: TransferOptions,
    ) -> Result<Vec<TransferRecord>> {
        if !is_dir {
            let target = map_key(local, local, remote, false, self.layout);
            let record = self
                .upload_file(local, &target, options)
                .await
                .map_err(|e| Error::transfer(local.display().to_string(), 0, e))?;
            return Ok(vec![record]);
        }

        let mut transfers = Vec::new();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();

        for entry in walk(local) {
            let file = entry?;
            let target = map_key(&file, local, remote, true, self.layout);

            if let Some(previous) = seen.insert(target.key.clone(), file.clone()) {
                tracing::warn!(
                    key = %target,
                    previous = %previous.display(),
                    file = %file.display(),
                    "Destination key collision, later file overwrites earlier one"
                );
                self.emit(CopyEvent::KeyCollision {
                    target: &target,
                    previous: &previous,
                    file: &file,
                });
            }

            match self.upload_file(&file, &target, options).await {
                Ok(record) => transfers.push(record),
                Err(e) => {
                    tracing::warn!(
                        file = %file.display(),
                        completed = transfers.len(),
                        error = %e,
                        "Upload failed, abandoning remaining files"
                    );
                    return Err(Error::transfer(
                        file.display().to_string(),
                        transfers.len(),
                        e,
                    ));
                }
            }
        }

        if transfers.is_empty() {
            tracing::warn!(dir = %local.display(), "No files found to upload");
        }

        Ok(transfers)
    }

    async fn upload_file(
        &self,
        file: &Path,
        target: &RemotePath,
        options: TransferOptions,
    ) -> Result<TransferRecord> {
        let source = file.display().to_string();
        let target_str = target.to_string();

        let handle = tokio::fs::File::open(file).await?;
        let size = handle.metadata().await?.len();

        tracing::info!(
            file = %source,
            bucket = %target.bucket,
            key = %target.key,
            size,
            "Uploading file"
        );
        self.emit(CopyEvent::Started {
            source: &source,
            target: &target_str,
        });

        let bytes = self
            .backend
            .upload(target, UploadBody::new(handle, Some(size)), options)
            .await?;

        let record = TransferRecord {
            source,
            target: target_str,
            bytes,
        };
        tracing::info!(key = %record.target, bytes, "Successfully uploaded");
        self.emit(CopyEvent::Finished(&record));

        Ok(record)
    }

    async fn download(
        &self,
        remote: &RemotePath,
        local: &Path,
        options: TransferOptions,
    ) -> Result<(CopyOutcome, Vec<TransferRecord>)> {
        let dest = download_target(local, remote)?;
        let source = remote.to_string();
        let target = dest.display().to_string();
        let dest = resolve_link(dest)?;

        let pre_existed = tokio::fs::try_exists(&dest).await?;

        tracing::info!(
            bucket = %remote.bucket,
            key = %remote.key,
            file = %target,
            pre_existed,
            "Downloading object"
        );

        // Bytes land in a sibling staging file that only replaces `dest` once
        // the transfer succeeded, so a failed or missing download never
        // leaves a new file behind and never clobbers an existing one.
        let (staging_file, staging_path) = create_staging(&dest, pre_existed)
            .map_err(|e| Error::transfer(target.clone(), 0, e))?;

        self.emit(CopyEvent::Started {
            source: &source,
            target: &target,
        });

        let sink = tokio::fs::File::from_std(staging_file);
        match self.backend.download(remote, Box::new(sink), options).await {
            Ok(bytes) => {
                staging_path
                    .persist(&dest)
                    .map_err(|e| Error::transfer(target.clone(), 0, Error::Io(e.error)))?;

                let record = TransferRecord {
                    source,
                    target,
                    bytes,
                };
                tracing::info!(file = %record.target, bytes, "Successfully downloaded");
                self.emit(CopyEvent::Finished(&record));

                Ok((CopyOutcome::Completed, vec![record]))
            }
            Err(e) if e.is_not_found() => {
                drop(staging_path);
                tracing::warn!(
                    object = %remote,
                    file = %target,
                    pre_existed,
                    "Object does not exist, nothing downloaded"
                );
                self.emit(CopyEvent::ObjectNotFound(remote));

                Ok((CopyOutcome::ObjectNotFound, Vec::new()))
            }
            Err(e) => {
                drop(staging_path);
                Err(Error::transfer(source, 0, e))
            }
        }
    }
}

/// Local file a download writes to
///
/// An existing directory, or a path spelled with a trailing separator,
/// receives the object's base name.
fn download_target(local: &Path, remote: &RemotePath) -> Result<PathBuf> {
    let spelled_as_dir = local
        .as_os_str()
        .to_string_lossy()
        .ends_with(['/', MAIN_SEPARATOR]);

    if !spelled_as_dir && !local.is_dir() {
        return Ok(local.to_path_buf());
    }

    let name = remote.base_name();
    if name.is_empty() {
        return Err(Error::InvalidUsage(format!(
            "cannot derive a file name from {remote} for directory {}",
            local.display()
        )));
    }

    Ok(local.join(name))
}

/// Follow a symlinked destination so the data lands in the file it names
///
/// A dangling link resolves to the path it points at, which is then created.
fn resolve_link(dest: PathBuf) -> Result<PathBuf> {
    match std::fs::symlink_metadata(&dest) {
        Ok(meta) if meta.file_type().is_symlink() => match std::fs::canonicalize(&dest) {
            Ok(resolved) => Ok(resolved),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let link = std::fs::read_link(&dest)?;
                Ok(match dest.parent() {
                    Some(parent) => parent.join(link),
                    None => link,
                })
            }
            Err(e) => Err(e.into()),
        },
        _ => Ok(dest),
    }
}

fn create_staging(dest: &Path, pre_existed: bool) -> Result<(std::fs::File, tempfile::TempPath)> {
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = format!(".{name}.");

    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(".bcp-part");

    // Replacements keep the existing file's mode, new files get 0644
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if pre_existed {
            std::fs::metadata(dest)?.permissions().mode()
        } else {
            0o644
        };
        builder.permissions(std::fs::Permissions::from_mode(mode));
    }
    #[cfg(not(unix))]
    let _ = pre_existed;

    let staging = builder.tempfile_in(parent)?;
    Ok(staging.into_parts())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ByteSink, MockTransferBackend};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    type Objects = Arc<Mutex<BTreeMap<(String, String), Vec<u8>>>>;

    /// Object store kept in memory; can fail the n-th upload (0-based)
    #[derive(Clone, Default)]
    struct MemoryBackend {
        objects: Objects,
        uploads: Arc<AtomicUsize>,
        fail_upload_at: Option<usize>,
    }

    impl MemoryBackend {
        fn failing_at(n: usize) -> Self {
            Self {
                fail_upload_at: Some(n),
                ..Default::default()
            }
        }

        fn put(&self, bucket: &str, key: &str, data: &[u8]) {
            self.objects
                .lock()
                .unwrap()
                .insert((bucket.to_string(), key.to_string()), data.to_vec());
        }

        fn keys(&self) -> Vec<String> {
            self.objects
                .lock()
                .unwrap()
                .keys()
                .map(|(_, k)| k.clone())
                .collect()
        }

        fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
        }
    }

    #[async_trait]
    impl TransferBackend for MemoryBackend {
        async fn upload(
            &self,
            target: &RemotePath,
            mut body: UploadBody,
            _options: TransferOptions,
        ) -> Result<u64> {
            let n = self.uploads.fetch_add(1, Ordering::SeqCst);
            if self.fail_upload_at == Some(n) {
                return Err(Error::Network("injected failure".into()));
            }

            let mut data = Vec::new();
            body.reader.read_to_end(&mut data).await?;
            let len = data.len() as u64;
            self.put(&target.bucket, &target.key, &data);
            Ok(len)
        }

        async fn download(
            &self,
            source: &RemotePath,
            mut sink: ByteSink,
            _options: TransferOptions,
        ) -> Result<u64> {
            let data = self
                .get(&source.bucket, &source.key)
                .ok_or_else(|| Error::NotFound(source.to_string()))?;
            sink.write_all(&data).await?;
            sink.shutdown().await?;
            Ok(data.len() as u64)
        }
    }

    fn s(p: &Path) -> String {
        p.display().to_string()
    }

    #[test]
    fn test_classify_directions() {
        let plan = classify("/tmp/report.csv", "s3://bucket1/out/").unwrap();
        assert_eq!(plan.direction, Direction::Upload);
        assert_eq!(plan.remote, RemotePath::new("bucket1", "out/"));

        let plan = classify("s3://bucket1/out/report.csv", "/tmp/report.csv").unwrap();
        assert_eq!(plan.direction, Direction::Download);
        assert_eq!(plan.local, PathBuf::from("/tmp/report.csv"));
    }

    #[test]
    fn test_classify_rejects_same_side() {
        assert!(matches!(
            classify("s3://a/x", "s3://b/y"),
            Err(Error::InvalidUsage(_))
        ));
        assert!(matches!(
            classify("/tmp/a", "/tmp/b"),
            Err(Error::InvalidUsage(_))
        ));
        assert!(matches!(
            classify("s3://", "/tmp/b"),
            Err(Error::IllegalObjectPath(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_single_file_into_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.csv");
        std::fs::write(&file, b"a,b\n1,2\n").unwrap();

        let backend = MemoryBackend::default();
        let copier = Copier::new(backend.clone());
        let report = copier
            .copy(&CopyRequest::new(s(&file), "s3://bucket1/out/"))
            .await
            .unwrap();

        assert_eq!(report.direction, Direction::Upload);
        assert_eq!(report.outcome, CopyOutcome::Completed);
        assert_eq!(report.transfers.len(), 1);
        assert_eq!(report.transfers[0].target, "s3://bucket1/out/report.csv");
        assert_eq!(report.total_bytes(), 8);
        assert_eq!(
            backend.get("bucket1", "out/report.csv").unwrap(),
            b"a,b\n1,2\n"
        );
    }

    #[tokio::test]
    async fn test_upload_single_file_bucket_only() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.csv");
        std::fs::write(&file, b"x").unwrap();

        let backend = MemoryBackend::default();
        Copier::new(backend.clone())
            .copy(&CopyRequest::new(s(&file), "s3://bucket1"))
            .await
            .unwrap();

        assert_eq!(backend.keys(), vec!["report.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_upload_repeat_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.csv");
        std::fs::write(&file, b"x").unwrap();

        let backend = MemoryBackend::default();
        let copier = Copier::new(backend.clone());
        let request = CopyRequest::new(s(&file), "s3://bucket1/out/");

        let first = copier.copy(&request).await.unwrap();
        let second = copier.copy(&request).await.unwrap();

        assert_eq!(first.transfers[0].target, second.transfers[0].target);
        assert_eq!(backend.keys(), vec!["out/report.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_upload_directory_flattens() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"b").unwrap();

        let backend = MemoryBackend::default();
        let report = Copier::new(backend.clone())
            .copy(&CopyRequest::new(s(dir.path()), "s3://bucket1/out/"))
            .await
            .unwrap();

        assert_eq!(report.transfers.len(), 2);
        assert_eq!(
            backend.keys(),
            vec!["out/a.txt".to_string(), "out/b.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn test_upload_directory_preserve_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"b").unwrap();

        let backend = MemoryBackend::default();
        Copier::new(backend.clone())
            .with_layout(KeyLayout::Preserve)
            .copy(&CopyRequest::new(s(dir.path()), "s3://bucket1/out"))
            .await
            .unwrap();

        assert_eq!(
            backend.keys(),
            vec!["out/a.txt".to_string(), "out/sub/b.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn test_upload_directory_reports_collisions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("x")).unwrap();
        std::fs::create_dir_all(dir.path().join("y")).unwrap();
        std::fs::write(dir.path().join("x/same.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("y/same.txt"), b"2").unwrap();

        let collisions = Arc::new(Mutex::new(Vec::new()));
        let sink = collisions.clone();

        let backend = MemoryBackend::default();
        let report = Copier::new(backend.clone())
            .with_observer(move |event| {
                if let CopyEvent::KeyCollision { target, .. } = event {
                    sink.lock().unwrap().push(target.key.clone());
                }
            })
            .copy(&CopyRequest::new(s(dir.path()), "s3://bucket1/out/"))
            .await
            .unwrap();

        assert_eq!(report.transfers.len(), 2);
        assert_eq!(backend.keys(), vec!["out/same.txt".to_string()]);
        assert_eq!(*collisions.lock().unwrap(), vec!["out/same.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_upload_directory_partial_failure() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["1.txt", "2.txt", "3.txt", "4.txt"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }

        let backend = MemoryBackend::failing_at(2);
        let err = Copier::new(backend.clone())
            .copy(&CopyRequest::new(s(dir.path()), "s3://bucket1/out/"))
            .await
            .unwrap_err();

        match err {
            Error::Transfer { completed, .. } => assert_eq!(completed, 2),
            other => panic!("expected transfer error, got {other:?}"),
        }
        assert_eq!(backend.keys().len(), 2);
        // Remaining files were abandoned after the failure
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_upload_empty_directory() {
        let dir = tempfile::tempdir().unwrap();

        let report = Copier::new(MemoryBackend::default())
            .copy(&CopyRequest::new(s(dir.path()), "s3://bucket1/out/"))
            .await
            .unwrap();

        assert_eq!(report.outcome, CopyOutcome::Completed);
        assert!(report.transfers.is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_never_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.csv");

        let mut backend = MockTransferBackend::new();
        backend.expect_upload().never();
        backend.expect_download().never();

        let err = Copier::new(backend)
            .copy(&CopyRequest::new(s(&missing), "s3://bucket1/out/"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_usage_never_reaches_backend() {
        let mut backend = MockTransferBackend::new();
        backend.expect_upload().never();
        backend.expect_download().never();

        let err = Copier::new(backend)
            .copy(&CopyRequest::new("s3://a/x", "s3://b/y"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidUsage(_)));
    }

    #[tokio::test]
    async fn test_tuning_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.bin");
        std::fs::write(&file, vec![0u8; 16]).unwrap();

        let mut backend = MockTransferBackend::new();
        backend
            .expect_upload()
            .withf(|target, body, options| {
                target.key == "in/big.bin"
                    && body.size == Some(16)
                    && options.concurrency == 7
                    && options.part_size == 8 * 1024 * 1024
            })
            .times(1)
            .returning(|_, _, _| Ok(16));

        Copier::new(backend)
            .copy(
                &CopyRequest::new(s(&file), "s3://bucket1/in/")
                    .concurrency(7)
                    .part_size(8 * 1024 * 1024),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.csv");

        let backend = MemoryBackend::default();
        backend.put("bucket1", "out/report.csv", b"hello");

        let report = Copier::new(backend)
            .copy(&CopyRequest::new("s3://bucket1/out/report.csv", s(&dest)))
            .await
            .unwrap();

        assert_eq!(report.direction, Direction::Download);
        assert_eq!(report.outcome, CopyOutcome::Completed);
        assert_eq!(report.total_bytes(), 5);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
        // No staging leftovers
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_download_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.csv");
        std::fs::write(&dest, b"old content that is longer").unwrap();

        let backend = MemoryBackend::default();
        backend.put("bucket1", "report.csv", b"new");

        Copier::new(backend)
            .copy(&CopyRequest::new("s3://bucket1/report.csv", s(&dest)))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_download_into_directory() {
        let dir = tempfile::tempdir().unwrap();

        let backend = MemoryBackend::default();
        backend.put("bucket1", "out/report.csv", b"data");

        let report = Copier::new(backend)
            .copy(&CopyRequest::new("s3://bucket1/out/report.csv", s(dir.path())))
            .await
            .unwrap();

        let expected = dir.path().join("report.csv");
        assert_eq!(report.transfers[0].target, s(&expected));
        assert_eq!(std::fs::read(expected).unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_download_missing_object_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.csv");

        let missing = Arc::new(AtomicUsize::new(0));
        let counter = missing.clone();

        let report = Copier::new(MemoryBackend::default())
            .with_observer(move |event| {
                if matches!(event, CopyEvent::ObjectNotFound(_)) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .copy(&CopyRequest::new("s3://bucket1/out/report.csv", s(&dest)))
            .await
            .unwrap();

        assert_eq!(report.outcome, CopyOutcome::ObjectNotFound);
        assert!(report.transfers.is_empty());
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(missing.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_download_missing_object_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.csv");
        std::fs::write(&dest, b"keep me").unwrap();

        let report = Copier::new(MemoryBackend::default())
            .copy(&CopyRequest::new("s3://bucket1/out/report.csv", s(&dest)))
            .await
            .unwrap();

        assert_eq!(report.outcome, CopyOutcome::ObjectNotFound);
        assert_eq!(std::fs::read(&dest).unwrap(), b"keep me");
    }

    #[tokio::test]
    async fn test_download_failure_propagates_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("fresh.csv");
        let existing = dir.path().join("existing.csv");
        std::fs::write(&existing, b"original").unwrap();

        let mut backend = MockTransferBackend::new();
        backend
            .expect_download()
            .times(2)
            .returning(|_, _, _| Err(Error::Network("Service error: AccessDenied".into())));
        let copier = Copier::new(backend);

        let err = copier
            .copy(&CopyRequest::new("s3://bucket1/a.csv", s(&fresh)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transfer { .. }));
        assert!(!err.is_not_found());
        assert!(!fresh.exists());

        copier
            .copy(&CopyRequest::new("s3://bucket1/a.csv", s(&existing)))
            .await
            .unwrap_err();
        assert_eq!(std::fs::read(&existing).unwrap(), b"original");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_writes_through_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("v3.csv");
        let link = dir.path().join("current.csv");
        std::fs::write(&real, b"old").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let backend = MemoryBackend::default();
        backend.put("bucket1", "report.csv", b"new");

        let report = Copier::new(backend)
            .copy(&CopyRequest::new("s3://bucket1/report.csv", s(&link)))
            .await
            .unwrap();

        assert_eq!(report.transfers[0].target, s(&link));
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read(&real).unwrap(), b"new");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_through_dangling_symlink_creates_target() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("current.csv");
        std::os::unix::fs::symlink("v4.csv", &link).unwrap();

        let backend = MemoryBackend::default();
        backend.put("bucket1", "report.csv", b"fresh");

        Copier::new(backend)
            .copy(&CopyRequest::new("s3://bucket1/report.csv", s(&link)))
            .await
            .unwrap();

        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read(dir.path().join("v4.csv")).unwrap(), b"fresh");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_walk_failure_aborts_directory_upload() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("z")).unwrap();

        let backend = MemoryBackend::default();
        let err = Copier::new(backend.clone())
            .copy(&CopyRequest::new(s(dir.path()), "s3://bucket1/out/"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Walk(_)), "got {err:?}");
        // Files walked before the failure stay uploaded
        assert_eq!(backend.keys(), vec!["out/a.txt".to_string()]);
    }

    #[test]
    fn test_download_target_for_prefix_needs_name() {
        let dir = tempfile::tempdir().unwrap();
        let err = download_target(dir.path(), &RemotePath::new("b", "")).unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));

        let target = download_target(Path::new("out/"), &RemotePath::new("b", "x/y.bin")).unwrap();
        assert_eq!(target, PathBuf::from("out/y.bin"));
    }
}
