//! Source archives normalized into zip streams
//!
//! A source reference is either a local directory or archive, an HTTP(S) URL or a git URL.
//! Whatever the source, the fetcher hands back a [`ZipStream`] backed by a file on disk.

pub mod compress;
pub mod detect;
pub mod git;
pub mod http;
pub mod ignore;
pub mod local;

use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, ReadBuf};
use tracing::{debug, warn};

use crate::errors::EngineError;

/// Bytes read from the head of an archive to compute its content hash
pub const HASH_CHUNK_SIZE: usize = 5 * 1024;

type Cleanup = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// Readable zip archive with a known size. Temp files backing it are removed on
/// [`close`](ZipStream::close), or on drop if never closed.
pub struct ZipStream {
    file: tokio::fs::File,
    size: u64,
    name: String,
    cleanup: Option<Cleanup>,
}

impl ZipStream {
    /// Stream an existing zip file, left in place on close
    pub fn open(path: &Path, name: &str) -> Result<Self, EngineError> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: tokio::fs::File::from_std(file),
            size,
            name: name.to_string(),
            cleanup: None,
        })
    }

    /// Stream a temp file, deleted on close
    pub fn from_temp(temp: NamedTempFile, name: &str) -> Result<Self, EngineError> {
        let (mut file, path) = temp.into_parts();
        file.seek(SeekFrom::Start(0))?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: tokio::fs::File::from_std(file),
            size,
            name: name.to_string(),
            cleanup: Some(Box::new(move || path.close())),
        })
    }

    /// Exact size of the archive in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Name of the source the archive was built from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hex SHA-256 of the first [`HASH_CHUNK_SIZE`] bytes. The read position is reset afterwards.
    pub async fn content_hash(&mut self) -> Result<String, EngineError> {
        self.file.seek(SeekFrom::Start(0)).await?;
        let mut head = Vec::with_capacity(HASH_CHUNK_SIZE);
        (&mut self.file)
            .take(HASH_CHUNK_SIZE as u64)
            .read_to_end(&mut head)
            .await?;
        self.file.seek(SeekFrom::Start(0)).await?;

        Ok(crate::utils::sha256_hash(&head))
    }

    /// Release the stream and run its cleanup exactly once
    pub fn close(mut self) -> Result<(), EngineError> {
        match self.cleanup.take() {
            Some(cleanup) => Ok(cleanup()?),
            None => Ok(()),
        }
    }
}

impl AsyncRead for ZipStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl Drop for ZipStream {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            if let Err(e) = cleanup() {
                warn!("Failed to remove temporary archive for {}: {}", self.name, e);
            }
        }
    }
}

impl std::fmt::Debug for ZipStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipStream")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

pub fn is_web_url(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Local path a `file://` reference points to
fn local_path(path: &str) -> PathBuf {
    PathBuf::from(path.strip_prefix("file://").unwrap_or(path))
}

/// Resolves source references into zip streams
#[derive(Clone)]
pub struct ArchiveFetcher {
    http: reqwest::Client,
}

impl ArchiveFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Zip stream for a local path, an HTTP(S) URL or a git URL
    pub async fn fetch(&self, path: &str) -> Result<ZipStream, EngineError> {
        if git::is_git_url(path) {
            debug!("Fetching git source {}", crate::http::logger::redact_url(path));
            return git::fetch(path).await;
        }
        if is_web_url(path) {
            debug!("Fetching http source {}", crate::http::logger::redact_url(path));
            return http::fetch(&self.http, path).await;
        }

        let local = local_path(path);
        debug!("Zipping local source {}", local.display());
        tokio::task::spawn_blocking(move || local::fetch(&local))
            .await
            .map_err(|e| EngineError::Internal(format!("archive task failed: {}", e)))?
    }

    /// Change detection token for a source. Git sources resolve to the commit the reference
    /// points to; other sources hash the head of their zip.
    pub async fn content_hash(&self, path: &str) -> Result<String, EngineError> {
        if git::is_git_url(path) {
            return git::commit_hash(path).await;
        }
        let mut stream = self.fetch(path).await?;
        let hash = stream.content_hash().await?;
        stream.close()?;
        Ok(hash)
    }
}
