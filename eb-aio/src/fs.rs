// eb-aio/src/fs.rs
//! Filesystem operations used while installing software.
use std::fs;
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;
use std::sync::Arc;

use eb_common::error::{EbError, Result};
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

pub fn create_dir_all(path: &Path) -> Result<()> {
    debug!("Creating directory recursively: {}", path.display());
    fs::create_dir_all(path).map_err(|e| {
        error!("Failed create dir {}: {}", path.display(), e);
        EbError::from(e)
    })
}

/// Removes a directory tree; a missing directory is not an error.
pub fn remove_directory_recursive(path: &Path) -> Result<()> {
    debug!("Removing directory recursively: {}", path.display());
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            error!("Failed remove dir_all {}: {}", path.display(), e);
            Err(e.into())
        }
    }
}

/// Copies `src` to `dest`, creating the parent directory of `dest`.
pub fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    debug!("Copying {} to {}", src.display(), dest.display());
    if let Some(parent) = dest.parent() {
        create_dir_all(parent)?;
    }
    fs::copy(src, dest).map_err(|e| {
        error!("Failed copy {} -> {}: {}", src.display(), dest.display(), e);
        EbError::from(e)
    })?;
    Ok(())
}

/// Copies the contents of directory `src` into `dest`, keeping symlinks as symlinks.
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    debug!("Copying directory {} to {}", src.display(), dest.display());
    create_dir_all(dest)?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| EbError::Generic(format!("Failed to relativize path: {e}")))?;
        let target = dest.join(rel);
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            if target.symlink_metadata().is_ok() {
                fs::remove_file(&target)?;
            }
            create_symlink(&link_target, &target)?;
        } else if file_type.is_dir() {
            create_dir_all(&target)?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    debug!("Creating symlink {} -> {}", link.display(), target.display());
    symlink(target, link).map_err(|e| {
        error!(
            "Failed create symlink {} -> {}: {}",
            link.display(),
            target.display(),
            e
        );
        EbError::from(e)
    })
}

#[cfg(not(unix))]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    warn!(
        "Symlink creation not supported on this platform: {} -> {}",
        link.display(),
        target.display()
    );
    Err(EbError::Generic(
        "Symlinks not supported on this platform".to_string(),
    ))
}

#[cfg(unix)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    debug!("Setting permissions on {}: {:o}", path.display(), mode);
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
        error!("Failed set permissions on {}: {}", path.display(), e);
        EbError::from(e)
    })
}

#[cfg(not(unix))]
pub fn set_permissions(path: &Path, _mode: u32) -> Result<()> {
    warn!(
        "Setting permissions not supported on this platform: {}",
        path.display()
    );
    Ok(())
}

/// Makes an installation readable (and, where the owner may execute, executable) for
/// group and others. Symlinks are left alone.
#[cfg(unix)]
pub fn make_world_readable(root: &Path) -> Result<usize> {
    let mut changed = 0;
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_symlink() {
            continue;
        }
        let mode = entry.metadata()?.permissions().mode();
        let mut wanted = mode | 0o044;
        if entry.file_type().is_dir() || mode & 0o100 != 0 {
            wanted |= 0o011;
        }
        if wanted != mode {
            set_permissions(entry.path(), wanted)?;
            changed += 1;
        }
    }
    debug!("Adjusted permissions of {} paths below {}", changed, root.display());
    Ok(changed)
}

#[cfg(not(unix))]
pub fn make_world_readable(root: &Path) -> Result<usize> {
    warn!("Permission adjustment not supported on this platform: {}", root.display());
    Ok(0)
}

/// Writes `content` through a temporary file in the same directory, then renames it
/// into place.
pub fn atomic_write_file(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        EbError::Generic(format!("Cannot get parent directory for {}", path.display()))
    })?;
    create_dir_all(dir)?;

    let mut temp_file = NamedTempFile::new_in(dir)?;
    debug!(
        "Atomically writing {} bytes to {} via temp file {}",
        content.len(),
        path.display(),
        temp_file.path().display()
    );
    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| {
        error!(
            "Failed to persist temporary file over {}: {}",
            path.display(),
            e.error
        );
        EbError::Io(Arc::new(e.error))
    })?;
    #[cfg(unix)]
    {
        if let Err(e) = set_permissions(path, 0o644) {
            warn!("Failed to set permissions on {}: {}", path.display(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_directory_trees() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("lib")).unwrap();
        fs::write(src.join("lib/libz.so.1.2.13"), "elf").unwrap();
        create_symlink(Path::new("libz.so.1.2.13"), &src.join("lib/libz.so")).unwrap();

        let dest = tmp.path().join("dest");
        copy_dir_recursive(&src, &dest).unwrap();
        assert!(dest.join("lib/libz.so.1.2.13").is_file());
        assert_eq!(
            fs::read_link(dest.join("lib/libz.so")).unwrap(),
            Path::new("libz.so.1.2.13")
        );
    }

    #[test]
    fn world_readable_permissions() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("tool");
        fs::write(&file, "#!/bin/sh\n").unwrap();
        set_permissions(&file, 0o700).unwrap();
        make_world_readable(tmp.path()).unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn atomic_write_replaces_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sub/file.txt");
        atomic_write_file(&path, b"one").unwrap();
        atomic_write_file(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        assert!(remove_directory_recursive(&tmp.path().join("missing")).is_ok());
    }
}
