//! Orchestration for the `upload` step: transfer an artifact unless a
//! non-empty copy already exists at the destination.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::types::{NamedLog, StepResult};
use crate::io::logs::LogSink;
use crate::io::transfer::{Uploader, expand_home};

pub const STDIO_LOG: &str = "stdio";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    Skipped { reason: String },
}

/// Upload `local` to `dest` unless `dest` is already a non-empty file.
///
/// An empty file at `dest` counts as a failed earlier transfer and is
/// overwritten.
pub fn upload_if_absent<U: Uploader>(
    local: &Path,
    dest: &Path,
    uploader: &U,
) -> Result<UploadOutcome> {
    if destination_populated(dest)? {
        return Ok(UploadOutcome::Skipped {
            reason: format!(
                "File '{}' already exists on dest, skipping upload!",
                dest.display()
            ),
        });
    }
    uploader
        .upload(local, dest)
        .with_context(|| format!("upload {} to {}", local.display(), dest.display()))?;
    Ok(UploadOutcome::Uploaded)
}

fn destination_populated(dest: &Path) -> Result<bool> {
    match fs::metadata(dest) {
        Ok(meta) => Ok(meta.is_file() && meta.len() > 0),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("stat {}", dest.display())),
    }
}

#[derive(Debug, Clone)]
pub struct UploadStep {
    pub local: PathBuf,
    /// Destination path; a leading `~` is expanded to the home directory.
    pub dest: PathBuf,
}

#[instrument(skip_all, fields(local = %step.local.display(), dest = %step.dest.display()))]
pub fn run_upload<U: Uploader, L: LogSink>(
    step: &UploadStep,
    uploader: &U,
    logs: &mut L,
) -> Result<StepResult> {
    let dest = expand_home(&step.dest);
    let mut log = NamedLog::new(STDIO_LOG);
    match upload_if_absent(&step.local, &dest, uploader)? {
        UploadOutcome::Uploaded => {
            info!(dest = %dest.display(), "uploaded");
            log.add_stdout(format!(
                "Uploaded {} to {}\n",
                step.local.display(),
                dest.display()
            ));
        }
        UploadOutcome::Skipped { reason } => {
            info!(dest = %dest.display(), "destination populated, skipped");
            log.add_stdout(format!("{reason}\n"));
        }
    }
    logs.publish(log).context("publish stdio log")?;
    Ok(StepResult::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::transfer::CopyUploader;

    #[test]
    fn uploads_when_destination_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let local = temp.path().join("halide.tgz");
        fs::write(&local, "payload").expect("write");
        let dest = temp.path().join("dist/halide.tgz");

        let outcome = upload_if_absent(&local, &dest, &CopyUploader).expect("upload");
        assert_eq!(outcome, UploadOutcome::Uploaded);
        assert_eq!(fs::read_to_string(&dest).expect("read"), "payload");
    }

    #[test]
    fn skips_populated_destination() {
        let temp = tempfile::tempdir().expect("tempdir");
        let local = temp.path().join("new.tgz");
        fs::write(&local, "new").expect("write");
        let dest = temp.path().join("old.tgz");
        fs::write(&dest, "old").expect("write");

        let outcome = upload_if_absent(&local, &dest, &CopyUploader).expect("upload");
        let UploadOutcome::Skipped { reason } = outcome else {
            panic!("expected skip");
        };
        assert_eq!(
            reason,
            format!("File '{}' already exists on dest, skipping upload!", dest.display())
        );
        assert_eq!(fs::read_to_string(&dest).expect("read"), "old");
    }

    #[test]
    fn empty_destination_is_replaced() {
        let temp = tempfile::tempdir().expect("tempdir");
        let local = temp.path().join("new.tgz");
        fs::write(&local, "new").expect("write");
        let dest = temp.path().join("partial.tgz");
        fs::write(&dest, "").expect("write");

        let outcome = upload_if_absent(&local, &dest, &CopyUploader).expect("upload");
        assert_eq!(outcome, UploadOutcome::Uploaded);
        assert_eq!(fs::read_to_string(&dest).expect("read"), "new");
    }
}
