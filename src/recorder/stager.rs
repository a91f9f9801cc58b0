//! Upload staging: rename every sealed log file into upload-ready form,
//! leaving the file that is currently being written alone.

#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use crate::core::errors::{DlgError, Result};
use crate::writer::naming;

/// What one staging pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Paths after renaming, in name order.
    pub staged: Vec<PathBuf>,
    /// Entries left alone: the active file, hidden files, already-staged
    /// files and anything that is not a regular file.
    pub skipped: usize,
}

/// Renames sealed files in one log directory.
#[derive(Debug, Clone)]
pub struct UploadStager {
    dir: PathBuf,
}

impl UploadStager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Stage every eligible file except `active_name`.
    ///
    /// Renames that fail are reported together after all others were tried.
    pub fn stage(&self, active_name: &str) -> Result<StageReport> {
        let entries = fs::read_dir(&self.dir).map_err(|e| DlgError::Rotate {
            details: format!("cannot list {}: {e}", self.dir.display()),
        })?;

        let mut candidates = Vec::new();
        let mut report = StageReport::default();
        for entry in entries {
            let entry = entry.map_err(|e| DlgError::Rotate {
                details: format!("cannot list {}: {e}", self.dir.display()),
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_file = entry.file_type().is_ok_and(|t| t.is_file());
            if !is_file || name == active_name || name.starts_with('.') || naming::is_staged(&name)
            {
                report.skipped += 1;
                continue;
            }
            candidates.push(name);
        }
        candidates.sort();

        let mut failures = Vec::new();
        for name in candidates {
            let from = self.dir.join(&name);
            let to = naming::staged_path(&self.dir, &name);
            match fs::rename(&from, &to) {
                Ok(()) => report.staged.push(to),
                Err(e) => failures.push(format!("{name}: {e}")),
            }
        }

        if failures.is_empty() {
            tracing::debug!(
                staged = report.staged.len(),
                active = active_name,
                "log files staged for upload"
            );
            Ok(report)
        } else {
            Err(DlgError::Rotate {
                details: format!("failed to stage {}", failures.join("; ")),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x\n").unwrap();
    }

    #[test]
    fn stages_everything_but_the_active_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "2026-10-14");
        touch(dir.path(), "2026-10-15-mmap");
        touch(dir.path(), "2026-10-16-mmap.1");
        touch(dir.path(), "2026-10-16-mmap");

        let report = UploadStager::new(dir.path()).stage("2026-10-16-mmap").unwrap();

        assert_eq!(
            report.staged,
            vec![
                dir.path().join("2026-10-14-up"),
                dir.path().join("2026-10-15-mmap-up"),
                dir.path().join("2026-10-16-mmap.1-up"),
            ]
        );
        assert!(dir.path().join("2026-10-16-mmap").exists());
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn staged_hidden_and_directories_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "2026-10-13-up");
        touch(dir.path(), ".mapped-disabled");
        fs::create_dir(dir.path().join("sub")).unwrap();

        let report = UploadStager::new(dir.path()).stage("2026-10-16").unwrap();
        assert!(report.staged.is_empty());
        assert_eq!(report.skipped, 3);
        assert!(dir.path().join("2026-10-13-up").exists());
    }

    #[test]
    fn second_pass_does_not_restage() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "2026-10-15");
        let stager = UploadStager::new(dir.path());
        assert_eq!(stager.stage("2026-10-16").unwrap().staged.len(), 1);
        assert!(stager.stage("2026-10-16").unwrap().staged.is_empty());
    }

    #[test]
    fn missing_directory_is_a_rotate_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = UploadStager::new(dir.path().join("absent"))
            .stage("x")
            .unwrap_err();
        assert_eq!(err.code(), "DLG-2003");
    }
}
