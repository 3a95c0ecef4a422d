//! Location parsing and resolution
//!
//! A location string is either an object location (`s3://bucket/key`) or a
//! local filesystem path. Anything that does not use the `s3` scheme is
//! treated as a local path, relative to the working directory when it is
//! not absolute.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Scheme identifying object storage locations
pub const S3_SCHEME: &str = "s3";

const SCHEME_SEPARATOR: &str = "://";

/// A (bucket, key) pair in object storage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePath {
    /// Bucket name
    pub bucket: String,
    /// Object key, possibly empty or ending with `/`
    pub key: String,
}

impl RemotePath {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// True when the key names a prefix rather than an object
    pub fn is_prefix(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }

    /// Last `/`-separated segment of the key
    pub fn base_name(&self) -> &str {
        self.key
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{S3_SCHEME}://{}/{}", self.bucket, self.key)
    }
}

/// A classified location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPath {
    /// Local filesystem path, kept exactly as given
    Local(PathBuf),
    /// Object storage location
    Remote(RemotePath),
}

impl ParsedPath {
    pub fn is_remote(&self) -> bool {
        matches!(self, ParsedPath::Remote(_))
    }
}

impl fmt::Display for ParsedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedPath::Local(p) => write!(f, "{}", p.display()),
            ParsedPath::Remote(r) => write!(f, "{r}"),
        }
    }
}

/// Parse a location string
///
/// `s3://bucket/some/key` yields a [`RemotePath`] with bucket `bucket` and key
/// `some/key`. The key is everything after the first `/` of the remainder,
/// unchanged. Any other string is returned as a local path.
pub fn parse_path(location: &str) -> Result<ParsedPath> {
    if location.is_empty() {
        return Err(Error::MalformedLocation("location cannot be empty".into()));
    }

    if location.chars().any(char::is_control) {
        return Err(Error::MalformedLocation(format!(
            "'{}' contains control characters",
            location.escape_debug()
        )));
    }

    if let Some((scheme, remainder)) = location.split_once(SCHEME_SEPARATOR) {
        if scheme.is_empty() {
            return Err(Error::MalformedLocation(format!(
                "'{location}' is missing a scheme"
            )));
        }
        if scheme.eq_ignore_ascii_case(S3_SCHEME) {
            return parse_remote(location, remainder).map(ParsedPath::Remote);
        }
    } else if let Some((scheme, _)) = location.split_once(':')
        && scheme.eq_ignore_ascii_case(S3_SCHEME)
    {
        return Err(Error::MalformedLocation(format!(
            "'{location}' must use the form {S3_SCHEME}://<bucket>/<key>"
        )));
    }

    Ok(ParsedPath::Local(PathBuf::from(location)))
}

fn parse_remote(location: &str, remainder: &str) -> Result<RemotePath> {
    let (bucket, key) = remainder.split_once('/').unwrap_or((remainder, ""));

    if bucket.is_empty() {
        return Err(Error::IllegalObjectPath(format!(
            "'{location}' does not name a bucket"
        )));
    }

    Ok(RemotePath::new(bucket, key))
}

/// Check that a local source exists and report whether it is a directory
///
/// Symlinks are followed to decide directory-ness, but a dangling symlink
/// still counts as existing; the transfer itself will then fail to open it.
pub fn validate_local_source(path: &Path) -> Result<bool> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::SourceNotFound(path.display().to_string()));
        }
        Err(e) => return Err(Error::Io(e)),
    };

    if meta.file_type().is_symlink() {
        return Ok(std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false));
    }

    Ok(meta.is_dir())
}
