//! Archive format detection by extension and magic bytes

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;

const ZIP_EXT: &[&str] = &["zip", "jar", "war"];
const TAR_EXT: &[&str] = &["tar"];
const GZIP_EXT: &[&str] = &["gz", "gzip"];
const TGZ_EXT: &[&str] = &["tgz"];
const BZ2_EXT: &[&str] = &["bz2"];

/// Offset of the `ustar` magic in a tar header block
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_BLOCK: usize = 512;

/// Archive layouts the fetcher can normalize into a zip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
    TarBz2,
}

/// Lowercased last extension of `path`, without the dot
fn extension(path: &str) -> Option<String> {
    let name = crate::utils::basename(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn has_ext(path: &str, candidates: &[&str]) -> bool {
    extension(path)
        .map(|ext| candidates.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// `bundle.tar.gz` -> true for the `.tar` before the compression suffix
fn has_inner_tar_ext(path: &str) -> bool {
    let name = crate::utils::basename(path);
    match name.rsplit_once('.') {
        Some((stem, _)) => has_ext(stem, TAR_EXT),
        None => false,
    }
}

/// Kind implied by the file name alone
pub fn kind_from_extension(path: &str) -> Option<ArchiveKind> {
    if has_ext(path, ZIP_EXT) {
        return Some(ArchiveKind::Zip);
    }
    if has_ext(path, TAR_EXT) {
        return Some(ArchiveKind::Tar);
    }
    if has_ext(path, TGZ_EXT) || (has_ext(path, GZIP_EXT) && has_inner_tar_ext(path)) {
        return Some(ArchiveKind::TarGz);
    }
    if has_ext(path, BZ2_EXT) && has_inner_tar_ext(path) {
        return Some(ArchiveKind::TarBz2);
    }
    None
}

/// Whether the name carries one of the accepted archive extensions
pub fn is_archive_path(path: &str) -> bool {
    kind_from_extension(path).is_some() || has_ext(path, GZIP_EXT) || has_ext(path, BZ2_EXT)
}

pub fn is_zip_magic(head: &[u8]) -> bool {
    head.len() >= 4
        && head[0] == 0x50
        && head[1] == 0x4b
        && matches!(head[2], 0x03 | 0x05 | 0x07)
        && matches!(head[3], 0x04 | 0x06 | 0x08)
}

pub fn is_tar_magic(block: &[u8]) -> bool {
    block.len() >= TAR_MAGIC_OFFSET + 5 && &block[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar"
}

pub fn is_gzip_magic(head: &[u8]) -> bool {
    head.len() >= 2 && head[0] == 0x1f && head[1] == 0x8b
}

pub fn is_bzip2_magic(head: &[u8]) -> bool {
    head.len() >= 2 && head[0] == b'B' && head[1] == b'Z'
}

/// ELF, PE, shebang or Mach-O (thin or fat, either byte order)
pub fn is_executable(head: &[u8]) -> bool {
    if head.len() < 4 {
        return false;
    }
    if &head[..4] == b"\x7fELF" || &head[..2] == b"MZ" || &head[..2] == b"#!" {
        return true;
    }
    let word = [head[0], head[1], head[2], head[3]];
    let le = u32::from_le_bytes(word);
    let be = u32::from_be_bytes(word);
    [0xfeed_face_u32, 0xfeed_facf, 0xcafe_babe]
        .iter()
        .any(|magic| *magic == le || *magic == be)
}

/// Read at most `limit` bytes
pub fn read_head<R: Read>(reader: R, limit: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(limit);
    reader.take(limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Detect the archive kind of a file on disk. `name_hint` is used for the extension check and
/// may differ from the on-disk name (downloads keep the remote file name).
pub fn detect_file(path: &Path, name_hint: &str) -> io::Result<Option<ArchiveKind>> {
    if let Some(kind) = kind_from_extension(name_hint) {
        return Ok(Some(kind));
    }

    let head = read_head(File::open(path)?, TAR_BLOCK)?;
    if is_zip_magic(&head) {
        return Ok(Some(ArchiveKind::Zip));
    }
    if is_tar_magic(&head) {
        return Ok(Some(ArchiveKind::Tar));
    }
    if is_gzip_magic(&head) {
        let block = read_head(GzDecoder::new(File::open(path)?), TAR_BLOCK).unwrap_or_default();
        if is_tar_magic(&block) {
            return Ok(Some(ArchiveKind::TarGz));
        }
    }
    if is_bzip2_magic(&head) {
        let block = read_head(BzDecoder::new(File::open(path)?), TAR_BLOCK).unwrap_or_default();
        if is_tar_magic(&block) {
            return Ok(Some(ArchiveKind::TarBz2));
        }
    }
    Ok(None)
}
