//! Local files and directories

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;
use zip::ZipWriter;

use super::compress::{self, entry_options, DIR_MODE, FILE_MODE};
use super::detect::{self, ArchiveKind};
use super::ignore::IgnoreRules;
use super::ZipStream;
use crate::errors::EngineError;

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    FILE_MODE
}

/// Deflated zip of `dir`, honoring its ignore files. Entries are sorted by path and carry a
/// fixed modification time.
pub fn zip_dir(dir: &Path) -> Result<NamedTempFile, EngineError> {
    if std::fs::read_dir(dir)?.next().is_none() {
        return Err(EngineError::Archive(format!("{} is empty", dir.display())));
    }

    let rules = IgnoreRules::load(dir);
    let target = NamedTempFile::new()?;
    let mut zip = ZipWriter::new(BufWriter::new(target.reopen()?));

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match relative_name(dir, entry.path()) {
            Some(name) => !rules.is_ignored(&name),
            None => true,
        });

    let mut count = 0usize;
    for entry in walker {
        let entry = entry.map_err(|e| EngineError::IoError(io::Error::other(e)))?;
        let Some(name) = relative_name(dir, entry.path()) else {
            continue;
        };
        let file_type = entry.file_type();
        if file_type.is_dir() {
            zip.add_directory(format!("{}/", name), entry_options(DIR_MODE))?;
        } else if file_type.is_file() {
            let mode = entry
                .metadata()
                .map(|m| file_mode(&m))
                .unwrap_or(FILE_MODE);
            zip.start_file(name, entry_options(mode))?;
            io::copy(&mut File::open(entry.path())?, &mut zip)?;
        } else {
            debug!("Skipping {}: not a regular file", entry.path().display());
            continue;
        }
        count += 1;
    }

    zip.finish()?
        .into_inner()
        .map_err(|e| e.into_error())?
        .sync_all()?;
    debug!("Zipped {} entries from {}", count, dir.display());
    Ok(target)
}

/// Zip stream for a local directory or archive file
pub fn fetch(path: &Path) -> Result<ZipStream, EngineError> {
    let metadata = std::fs::metadata(path)?;
    let name = crate::utils::basename(&path.to_string_lossy()).to_string();

    if metadata.is_dir() {
        return ZipStream::from_temp(zip_dir(path)?, &name);
    }

    match detect::detect_file(path, &name)? {
        Some(ArchiveKind::Zip) => ZipStream::open(path, &name),
        Some(kind) => ZipStream::from_temp(compress::rewrap(path, kind)?, &name),
        None => Err(EngineError::Archive(format!(
            "{} is not a directory or a supported archive",
            path.display()
        ))),
    }
}
