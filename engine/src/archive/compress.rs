//! Rewrapping tar variants and single files into zip archives

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Component, Path};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::detect::ArchiveKind;
use crate::errors::EngineError;

pub const FILE_MODE: u32 = 0o644;
pub const EXEC_MODE: u32 = 0o755;
pub const DIR_MODE: u32 = 0o755;

/// Deflated entry with a fixed modification time so identical inputs give identical bytes
pub fn entry_options(mode: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(mode)
}

/// Slash separated relative path, `.` and leading `/` removed
fn normalize(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Copy the entries of a tar stream into `writer` as a zip.
///
/// When the first entry is a directory it is treated as a wrapping root: it is not emitted and
/// its name is stripped from the following entries.
pub fn tar_to_zip<R: Read, W: Write + Seek>(reader: R, writer: W) -> Result<W, EngineError> {
    let mut archive = tar::Archive::new(reader);
    let mut zip = ZipWriter::new(writer);
    let mut root: Option<String> = None;
    let mut first = true;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_type = entry.header().entry_type();
        let path = normalize(&entry.path()?);

        if first {
            first = false;
            if entry_type.is_dir() && !path.is_empty() {
                debug!("Stripping root directory {} from tar entries", path);
                root = Some(path);
                continue;
            }
        }

        let name = match &root {
            Some(root) => path
                .strip_prefix(root.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .map(str::to_string)
                .unwrap_or_else(|| if path == *root { String::new() } else { path.clone() }),
            None => path,
        };
        if name.is_empty() {
            continue;
        }

        let mode = entry.header().mode().map(|m| m & 0o777).unwrap_or(FILE_MODE);
        if entry_type.is_dir() {
            zip.add_directory(format!("{}/", name), entry_options(mode))?;
        } else if entry_type.is_file() {
            zip.start_file(name, entry_options(mode))?;
            io::copy(&mut entry, &mut zip)?;
        }
    }

    Ok(zip.finish()?)
}

/// Turn a tar, tar.gz or tar.bz2 file into a zip held in a temp file
pub fn rewrap(path: &Path, kind: ArchiveKind) -> Result<NamedTempFile, EngineError> {
    let reader = BufReader::new(File::open(path)?);
    let target = NamedTempFile::new()?;
    let writer = BufWriter::new(target.reopen()?);

    let writer = match kind {
        ArchiveKind::Tar => tar_to_zip(reader, writer)?,
        ArchiveKind::TarGz => tar_to_zip(GzDecoder::new(reader), writer)?,
        ArchiveKind::TarBz2 => tar_to_zip(BzDecoder::new(reader), writer)?,
        ArchiveKind::Zip => {
            return Err(EngineError::Internal(format!(
                "{} is already a zip",
                path.display()
            )))
        }
    };
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(target)
}

/// Zip holding `path` as a single entry called `name`
pub fn wrap_single_file(path: &Path, name: &str, mode: u32) -> Result<NamedTempFile, EngineError> {
    let target = NamedTempFile::new()?;
    let mut zip = ZipWriter::new(BufWriter::new(target.reopen()?));
    zip.start_file(name, entry_options(mode))?;
    io::copy(&mut File::open(path)?, &mut zip)?;
    zip.finish()?.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(target)
}
