//! Plain append-only writer: the backend of last resort.
//!
//! Each line is assembled in memory and handed to the file with one
//! `write_all`, then flushed, so a reader tailing the file never sees a
//! partial line and a crash loses at most the line in flight.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::core::errors::{DlgError, Result};
use crate::writer::cipher::{LineCipher, encode_for_disk};
use crate::writer::{
    ActiveFile, BackendKind, WriterBackend, ensure_dir, naming, open_append, seal_file,
};

const BACKEND: &str = "plain";

/// Date source; swapped in tests to exercise day rollover.
pub type DateSource = fn() -> NaiveDate;

/// Sequential file appender.
pub struct PlainWriter {
    dir: PathBuf,
    header: String,
    cipher: Option<LineCipher>,
    active: Option<ActiveFile>,
    writer: Option<BufWriter<File>>,
    today: DateSource,
}

impl Default for PlainWriter {
    fn default() -> Self {
        Self::with_date_source(naming::today)
    }
}

impl PlainWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_date_source(today: DateSource) -> Self {
        Self {
            dir: PathBuf::new(),
            header: String::new(),
            cipher: None,
            active: None,
            writer: None,
            today,
        }
    }

    fn open_for(&mut self, date: NaiveDate) -> Result<()> {
        let active = ActiveFile::new(&self.dir, BackendKind::Plain, date);
        let (file, size) = open_append(&active.path)?;
        let mut writer = BufWriter::with_capacity(16 * 1024, file);
        if size == 0 && !self.header.is_empty() {
            let line = format!("{}\n", self.header);
            writer
                .write_all(line.as_bytes())
                .and_then(|()| writer.flush())
                .map_err(|source| DlgError::io(&active.path, source))?;
        }
        self.writer = Some(writer);
        self.active = Some(active);
        Ok(())
    }

    fn close_current(&mut self) -> Result<()> {
        if let Some(mut w) = self.writer.take() {
            let path = self.active.as_ref().map(|a| a.path.clone()).unwrap_or_default();
            w.flush().map_err(|source| DlgError::io(&path, source))?;
            w.get_ref()
                .sync_data()
                .map_err(|source| DlgError::io(&path, source))?;
        }
        Ok(())
    }

    /// Reopen when the date changed since the file was opened.
    fn roll_if_needed(&mut self) -> Result<()> {
        let today = (self.today)();
        let stale = self.active.as_ref().is_none_or(|a| a.date != today);
        if stale || self.writer.is_none() {
            self.close_current()?;
            self.open_for(today)?;
        }
        Ok(())
    }
}

impl WriterBackend for PlainWriter {
    fn kind(&self) -> BackendKind {
        BackendKind::Plain
    }

    fn init(&mut self, header: &str, dir: &Path, cipher_key: &str) -> Result<()> {
        header.clone_into(&mut self.header);
        self.dir = dir.to_path_buf();
        self.cipher = LineCipher::from_key(cipher_key);
        ensure_dir(dir).map_err(|e| e.into_init(BACKEND))?;
        let today = (self.today)();
        self.open_for(today).map_err(|e| e.into_init(BACKEND))
    }

    fn write(&mut self, content: &str, encrypt: bool) -> Result<()> {
        self.roll_if_needed().map_err(|e| e.into_write(BACKEND))?;
        let mut line = encode_for_disk(self.cipher.as_ref(), content, encrypt)?;
        line.push('\n');

        let path = self.active.as_ref().map(|a| a.path.clone()).unwrap_or_default();
        let Some(w) = self.writer.as_mut() else {
            return Err(DlgError::Write {
                backend: BACKEND,
                details: "writer not initialized".to_string(),
            });
        };
        let appended = w.write_all(line.as_bytes()).and_then(|()| w.flush());
        if let Err(source) = appended {
            // Drop the handle; the next write reopens the file from scratch.
            self.writer = None;
            return Err(DlgError::io(&path, source).into_write(BACKEND));
        }
        Ok(())
    }

    fn refresh_header(&mut self, header: &str) -> Result<()> {
        header.clone_into(&mut self.header);
        Ok(())
    }

    fn close_and_renew(&mut self) -> Result<ActiveFile> {
        self.close_current()?;
        if let Some(active) = self.active.take() {
            seal_file(&active)?;
        }
        let today = (self.today)();
        self.open_for(today)?;
        self.active.clone().ok_or_else(|| DlgError::Rotate {
            details: "plain writer has no active file after renew".to_string(),
        })
    }

    fn active_file(&self) -> Option<&ActiveFile> {
        self.active.as_ref()
    }

    fn flush(&mut self) -> Result<()> {
        if let (Some(w), Some(active)) = (self.writer.as_mut(), self.active.as_ref()) {
            w.flush().map_err(|source| DlgError::io(&active.path, source))?;
        }
        Ok(())
    }
}

impl Drop for PlainWriter {
    fn drop(&mut self) {
        let _ = self.close_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn day_one() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
    }

    fn writer_in(dir: &Path) -> PlainWriter {
        let mut w = PlainWriter::with_date_source(day_one);
        w.init("HEADER", dir, "").unwrap();
        w
    }

    #[test]
    fn init_creates_file_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");
        let w = writer_in(&logs);
        let active = w.active_file().unwrap().clone();
        assert_eq!(active.path, logs.join("2026-05-01"));
        assert_eq!(fs::read_to_string(&active.path).unwrap(), "HEADER\n");
    }

    #[test]
    fn writes_append_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer_in(dir.path());
        for i in 0..5 {
            w.write(&format!("line-{i}"), false).unwrap();
        }
        let contents = fs::read_to_string(dir.path().join("2026-05-01")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["HEADER", "line-0", "line-1", "line-2", "line-3", "line-4"]);
    }

    #[test]
    fn reopening_existing_file_does_not_repeat_header() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut w = writer_in(dir.path());
            w.write("first", false).unwrap();
        }
        let mut w = writer_in(dir.path());
        w.write("second", false).unwrap();
        let contents = fs::read_to_string(dir.path().join("2026-05-01")).unwrap();
        assert_eq!(contents, "HEADER\nfirst\nsecond\n");
    }

    #[test]
    fn close_and_renew_seals_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer_in(dir.path());
        w.write("before", false).unwrap();
        w.refresh_header("HEADER-2").unwrap();

        let renewed = w.close_and_renew().unwrap();
        assert_eq!(renewed.name(), "2026-05-01");
        w.write("after", false).unwrap();

        let sealed = fs::read_to_string(dir.path().join("2026-05-01.1")).unwrap();
        assert_eq!(sealed, "HEADER\nbefore\n");
        let fresh = fs::read_to_string(dir.path().join("2026-05-01")).unwrap();
        assert_eq!(fresh, "HEADER-2\nafter\n");
    }

    #[test]
    fn encrypted_lines_are_not_clear_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = PlainWriter::with_date_source(day_one);
        w.init("H", dir.path(), "key").unwrap();
        w.write("top secret", true).unwrap();
        let contents = fs::read_to_string(dir.path().join("2026-05-01")).unwrap();
        assert!(!contents.contains("top secret"));
        assert!(contents.contains(crate::writer::cipher::ENCRYPTED_PREFIX));
    }

    #[test]
    fn init_fails_when_directory_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let mut w = PlainWriter::new();
        let err = w.init("H", &blocker.join("logs"), "").unwrap_err();
        assert_eq!(err.code(), "DLG-2001");
    }
}
