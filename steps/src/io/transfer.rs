//! Raw file transfer capability.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument};

pub trait Uploader {
    /// Transfer `local` to `dest`, replacing whatever is there.
    fn upload(&self, local: &Path, dest: &Path) -> Result<()>;
}

/// Uploader that copies within the local filesystem.
pub struct CopyUploader;

impl Uploader for CopyUploader {
    #[instrument(skip_all, fields(local = %local.display(), dest = %dest.display()))]
    fn upload(&self, local: &Path, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let bytes = fs::copy(local, dest)
            .with_context(|| format!("copy {} to {}", local.display(), dest.display()))?;
        debug!(bytes, "copied");
        Ok(())
    }
}

/// Expand a leading `~` to the current user's home directory.
///
/// Paths without a leading `~`, or when no home directory is known, are
/// returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match home::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_creates_parent_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let local = temp.path().join("halide.tgz");
        fs::write(&local, "payload").expect("write");
        let dest = temp.path().join("artifacts/nested/halide.tgz");

        CopyUploader.upload(&local, &dest).expect("upload");
        assert_eq!(fs::read_to_string(&dest).expect("read"), "payload");
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home(Path::new("/srv/a")), PathBuf::from("/srv/a"));
        assert_eq!(expand_home(Path::new("a/~b")), PathBuf::from("a/~b"));
    }

    #[test]
    fn expand_home_replaces_tilde() {
        let Some(home) = home::home_dir() else {
            return;
        };
        assert_eq!(
            expand_home(Path::new("~/artifacts/x.tgz")),
            home.join("artifacts/x.tgz")
        );
    }
}
