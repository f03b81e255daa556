//! Archives downloaded over HTTP(S)

use std::sync::LazyLock;

use futures::StreamExt;
use http::header::CONTENT_DISPOSITION;
use regex::Regex;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use super::compress::{self, EXEC_MODE, FILE_MODE};
use super::detect::{self, ArchiveKind};
use super::ZipStream;
use crate::errors::EngineError;

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\*?\s*=\s*(?:UTF-8'')?"?([^";]+)"?"#)
        .expect("content disposition pattern is valid")
});

/// File name advertised by a `Content-Disposition` header
pub fn disposition_filename(header: &str) -> Option<String> {
    let captures = FILENAME_RE.captures(header)?;
    let name = crate::utils::basename(captures.get(1)?.as_str().trim());
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Split user info out of `raw`, returning the cleaned URL and the credentials
fn split_credentials(raw: &str) -> Result<(Url, Option<(String, String)>), EngineError> {
    let mut url = Url::parse(raw)?;
    if url.username().is_empty() {
        return Ok((url, None));
    }
    let user = url.username().to_string();
    let password = url.password().unwrap_or_default().to_string();
    let _ = url.set_username("");
    let _ = url.set_password(None);
    Ok((url, Some((user, password))))
}

/// Turn a downloaded file into a zip stream
fn normalize(download: NamedTempFile, name: &str) -> Result<ZipStream, EngineError> {
    match detect::detect_file(download.path(), name)? {
        Some(ArchiveKind::Zip) => ZipStream::from_temp(download, name),
        Some(kind) => ZipStream::from_temp(compress::rewrap(download.path(), kind)?, name),
        None => {
            let head = detect::read_head(std::fs::File::open(download.path())?, 8)?;
            let mode = if detect::is_executable(&head) {
                EXEC_MODE
            } else {
                FILE_MODE
            };
            debug!("Wrapping {} as a single zip entry with mode {:o}", name, mode);
            ZipStream::from_temp(compress::wrap_single_file(download.path(), name, mode)?, name)
        }
    }
}

/// Download `raw_url` and normalize it to a zip
pub async fn fetch(client: &reqwest::Client, raw_url: &str) -> Result<ZipStream, EngineError> {
    let (url, credentials) = split_credentials(raw_url)?;
    let mut name = crate::utils::basename(url.path()).to_string();

    let mut request = client.get(url);
    if let Some((user, password)) = credentials {
        request = request.basic_auth(user, Some(password));
    }
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EngineError::Archive(format!(
            "Error occurred when downloading file: {} {}: \n{}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
            body
        )));
    }

    if let Some(filename) = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(disposition_filename)
    {
        name = filename;
    }

    let download = NamedTempFile::new()?;
    let mut file = tokio::fs::File::from_std(download.reopen()?);
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::task::spawn_blocking(move || normalize(download, &name))
        .await
        .map_err(|e| EngineError::Internal(format!("archive task failed: {}", e)))?
}
