// ABOUTME: Filesystem seam for release directories, shared links, and activation.
// ABOUTME: `activate` swaps the `current` link by renaming a fresh symlink over it.

use std::io;
use std::path::{Path, PathBuf};

/// Filesystem operations used by the advanced strategy.
pub trait ReleaseFs: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create one directory. Fails with `AlreadyExists` if anything is there.
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Remove a file, symlink, or directory tree. Missing paths are fine.
    fn remove_path(&self, path: &Path) -> io::Result<()>;

    /// True for anything present, including dangling symlinks.
    fn exists(&self, path: &Path) -> bool;

    /// Create an empty file unless one exists.
    fn touch(&self, path: &Path) -> io::Result<()>;

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Total size in bytes of regular files below `path`, not following symlinks.
    fn dir_size(&self, path: &Path) -> io::Result<u64>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl ReleaseFs for LocalFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir(path)
    }

    fn remove_path(&self, path: &Path) -> io::Result<()> {
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
            Ok(_) => std::fs::remove_file(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path).is_ok()
    }

    fn touch(&self, path: &Path) -> io::Result<()> {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(|_| ())
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(not(unix))]
    fn symlink(&self, _target: &Path, _link: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "symlinks are only supported on unix",
        ))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn dir_size(&self, path: &Path) -> io::Result<u64> {
        let meta = std::fs::symlink_metadata(path)?;
        if !meta.is_dir() {
            return Ok(if meta.is_file() { meta.len() } else { 0 });
        }
        let mut total = 0;
        for entry in std::fs::read_dir(path)? {
            total += self.dir_size(&entry?.path())?;
        }
        Ok(total)
    }
}

/// Activation did not happen; `current` still points where it did.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct ActivationError {
    #[source]
    pub source: io::Error,
    /// Staging link left behind, with the reason it could not be removed.
    pub leftover: Option<(PathBuf, io::Error)>,
}

impl From<io::Error> for ActivationError {
    fn from(source: io::Error) -> Self {
        Self {
            source,
            leftover: None,
        }
    }
}

/// Point `current` at `release` atomically.
///
/// A symlink is created under a temporary name next to `current` and renamed
/// over it, so readers see either the old or the new target.
pub fn activate(fs: &dyn ReleaseFs, release: &Path, current: &Path) -> Result<(), ActivationError> {
    let file_name = current
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "current".to_string());
    let staging = current.with_file_name(format!(".{file_name}.next"));

    fs.remove_path(&staging)?;
    fs.symlink(release, &staging)?;
    if let Err(source) = fs.rename(&staging, current) {
        let leftover = fs.remove_path(&staging).err().map(|e| (staging, e));
        return Err(ActivationError { source, leftover });
    }
    Ok(())
}
