// eb-aio/src/extract.rs
// Unpacks source archives into a build directory.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use eb_common::error::{EbError, Result};
use flate2::read::GzDecoder;
use tracing::{debug, error, warn};
use xz2::read::XzDecoder;
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    TarBz2,
    TarXz,
    Tar,
    Zip,
}

impl ArchiveKind {
    /// Infers the archive type from the file name.
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz") || name.ends_with(".tbz2") {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

pub fn is_archive(path: &Path) -> bool {
    ArchiveKind::detect(path).is_some()
}

fn archive_err(path: &Path, msg: impl Into<String>) -> EbError {
    EbError::Archive(path.to_path_buf(), msg.into())
}

/// Joins `entry_path` minus its first `strip_components` components onto `target_dir`.
/// `None` if nothing is left after stripping.
fn safe_target_path(
    target_dir: &Path,
    entry_path: &Path,
    strip_components: usize,
    archive: &Path,
) -> Result<Option<PathBuf>> {
    let stripped: Vec<_> = entry_path.components().skip(strip_components).collect();
    if stripped.is_empty() {
        return Ok(None);
    }
    let mut target_path = target_dir.to_path_buf();
    for comp in stripped {
        match comp {
            Component::Normal(p) => target_path.push(p),
            Component::CurDir => {}
            _ => {
                error!(
                    "Disallowed component {:?} in path {} within {}",
                    comp,
                    entry_path.display(),
                    archive.display()
                );
                return Err(archive_err(
                    archive,
                    format!("unsafe path component in {}", entry_path.display()),
                ));
            }
        }
    }
    if target_path == target_dir {
        return Ok(None);
    }
    Ok(Some(target_path))
}

/// Extracts `archive_path` into `target_dir`, dropping the first `strip_components`
/// components of every entry path.
pub fn extract_archive(archive_path: &Path, target_dir: &Path, strip_components: usize) -> Result<()> {
    let kind = ArchiveKind::detect(archive_path).ok_or_else(|| {
        archive_err(archive_path, "unsupported archive type")
    })?;
    debug!(
        "Extracting archive '{}' ({:?}) to '{}' (strip_components={})",
        archive_path.display(),
        kind,
        target_dir.display(),
        strip_components
    );
    fs::create_dir_all(target_dir)?;
    let file = BufReader::new(File::open(archive_path)?);
    match kind {
        ArchiveKind::TarGz => extract_tar(GzDecoder::new(file), archive_path, target_dir, strip_components),
        ArchiveKind::TarBz2 => extract_tar(BzDecoder::new(file), archive_path, target_dir, strip_components),
        ArchiveKind::TarXz => extract_tar(XzDecoder::new(file), archive_path, target_dir, strip_components),
        ArchiveKind::Tar => extract_tar(file, archive_path, target_dir, strip_components),
        ArchiveKind::Zip => extract_zip(archive_path, target_dir, strip_components),
    }
}

fn extract_tar<R: Read>(
    reader: R,
    archive_path: &Path,
    target_dir: &Path,
    strip_components: usize,
) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    let entries = archive
        .entries()
        .map_err(|e| archive_err(archive_path, format!("failed to read entries: {e}")))?;
    let mut count = 0usize;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| archive_err(archive_path, format!("failed to read entry: {e}")))?;
        let entry_path = entry
            .path()
            .map_err(|e| archive_err(archive_path, format!("invalid entry path: {e}")))?
            .into_owned();
        let Some(target_path) =
            safe_target_path(target_dir, &entry_path, strip_components, archive_path)?
        else {
            continue;
        };
        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target_path).map_err(|e| {
            archive_err(
                archive_path,
                format!("failed to unpack {}: {e}", entry_path.display()),
            )
        })?;
        count += 1;
    }
    debug!(
        "Unpacked {} entries from {}",
        count,
        archive_path.display()
    );
    Ok(())
}

fn extract_zip(archive_path: &Path, target_dir: &Path, strip_components: usize) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| archive_err(archive_path, format!("failed to open ZIP: {e}")))?;
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| archive_err(archive_path, format!("failed to access ZIP entry: {e}")))?;
        let Some(entry_path) = file.enclosed_name() else {
            warn!("Skipping ZIP entry with unsafe name: {}", file.name());
            continue;
        };
        let Some(target_path) =
            safe_target_path(target_dir, &entry_path, strip_components, archive_path)?
        else {
            continue;
        };
        if file.is_dir() {
            fs::create_dir_all(&target_path)?;
            continue;
        }
        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&target_path)?;
        std::io::copy(&mut file, &mut outfile)?;
        #[cfg(unix)]
        {
            if let Some(mode) = file.unix_mode() {
                crate::fs::set_permissions(&target_path, mode)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    fn make_tar_gz(path: &Path) {
        let file = File::create(path).unwrap();
        let enc = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(enc);
        let data = b"int main() { return 0; }\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "pkg-1.0/src/main.c", &data[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap().flush().unwrap();
    }

    #[test]
    fn detects_archive_kinds() {
        assert_eq!(ArchiveKind::detect(Path::new("a-1.tar.gz")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("a-1.TBZ2")), Some(ArchiveKind::TarBz2));
        assert_eq!(ArchiveKind::detect(Path::new("a-1.tar.xz")), Some(ArchiveKind::TarXz));
        assert_eq!(ArchiveKind::detect(Path::new("a.zip")), Some(ArchiveKind::Zip));
        assert!(!is_archive(Path::new("fix.patch")));
    }

    #[test]
    fn extracts_tar_gz_with_and_without_strip() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("pkg-1.0.tar.gz");
        make_tar_gz(&archive);

        let full = tmp.path().join("full");
        extract_archive(&archive, &full, 0).unwrap();
        assert!(full.join("pkg-1.0/src/main.c").is_file());

        let stripped = tmp.path().join("stripped");
        extract_archive(&archive, &stripped, 1).unwrap();
        assert!(stripped.join("src/main.c").is_file());
    }

    #[test]
    fn rejects_unknown_archive_type() {
        let tmp = tempfile::tempdir().unwrap();
        let err = extract_archive(&tmp.path().join("x.rar"), tmp.path(), 0).unwrap_err();
        assert!(matches!(err, EbError::Archive(_, _)));
    }
}
