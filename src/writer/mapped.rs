//! Memory-mapped append writer: the low-latency fast path.
//!
//! File layout:
//!
//! ```text
//! [magic "DLM1": 4B][committed data length: u32 LE][data ...][unused capacity]
//! ```
//!
//! Lines are copied straight into the mapping and the committed length is
//! bumped afterwards, so a reader (or the next process) only ever sees whole
//! lines. The file grows by one region whenever the next line does not fit,
//! and is truncated to its committed length when sealed or dropped.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use memmap2::{MmapMut, MmapOptions};

use crate::core::config::MIN_MAPPED_REGION_BYTES;
use crate::core::errors::{DlgError, Result};
use crate::writer::cipher::{LineCipher, encode_for_disk};
use crate::writer::plain::DateSource;
use crate::writer::{ActiveFile, BackendKind, WriterBackend, ensure_dir, naming, seal_file};

/// Magic bytes at the start of every mapped file.
pub const MAPPED_MAGIC: &[u8; 4] = b"DLM1";
/// Bytes before the data area.
pub const MAPPED_HEADER_LEN: usize = 8;

const BACKEND: &str = "mapped";

struct MappedRegion {
    file: File,
    map: MmapMut,
    /// Committed data bytes after the header.
    used: usize,
}

impl MappedRegion {
    fn open(path: &Path, region_bytes: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| DlgError::io(path, source))?;
        let len = file
            .metadata()
            .map_err(|source| DlgError::io(path, source))?
            .len();

        if len == 0 {
            file.set_len(region_bytes)
                .map_err(|source| DlgError::io(path, source))?;
            let mut map = map_file(&file).map_err(|source| DlgError::io(path, source))?;
            map[..4].copy_from_slice(MAPPED_MAGIC);
            map[4..MAPPED_HEADER_LEN].copy_from_slice(&0u32.to_le_bytes());
            return Ok(Self { file, map, used: 0 });
        }

        if len < MAPPED_HEADER_LEN as u64 {
            return Err(DlgError::CorruptMapFile {
                path: path.to_path_buf(),
                reason: format!("{len} bytes is shorter than the header"),
            });
        }
        let map = map_file(&file).map_err(|source| DlgError::io(path, source))?;
        let used = committed_len(&map).map_err(|reason| DlgError::CorruptMapFile {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(Self { file, map, used })
    }

    fn capacity(&self) -> usize {
        self.map.len()
    }

    fn append(&mut self, path: &Path, bytes: &[u8], region_bytes: u64) -> Result<()> {
        let end = MAPPED_HEADER_LEN + self.used + bytes.len();
        let committed = u32::try_from(self.used + bytes.len()).map_err(|_| DlgError::Write {
            backend: BACKEND,
            details: format!("{} exceeds the mapped file size limit", path.display()),
        })?;
        if end > self.capacity() {
            self.grow(path, end, region_bytes)?;
        }
        let start = MAPPED_HEADER_LEN + self.used;
        self.map[start..end].copy_from_slice(bytes);
        self.map[4..MAPPED_HEADER_LEN].copy_from_slice(&committed.to_le_bytes());
        self.used += bytes.len();
        Ok(())
    }

    fn grow(&mut self, path: &Path, required: usize, region_bytes: u64) -> Result<()> {
        self.map
            .flush()
            .map_err(|source| DlgError::io(path, source))?;
        let shortfall = (required - self.capacity()) as u64;
        let new_len = self.capacity() as u64 + shortfall.max(region_bytes);
        self.file
            .set_len(new_len)
            .map_err(|source| DlgError::io(path, source))?;
        self.map = map_file(&self.file).map_err(|source| DlgError::io(path, source))?;
        Ok(())
    }

    /// Flush, then trim unused capacity so the file ends at its last line.
    fn finish(self, path: &Path) -> Result<()> {
        self.map
            .flush()
            .map_err(|source| DlgError::io(path, source))?;
        let Self { file, map, used } = self;
        drop(map);
        file.set_len((MAPPED_HEADER_LEN + used) as u64)
            .and_then(|()| file.sync_data())
            .map_err(|source| DlgError::io(path, source))
    }
}

#[allow(unsafe_code)]
fn map_file(file: &File) -> io::Result<MmapMut> {
    // SAFETY: the file is opened read-write by this writer alone and only
    // resized through `MappedRegion`, which remaps right after every resize.
    // Other processes are expected to read it only after it has been sealed.
    unsafe { MmapOptions::new().map_mut(file) }
}

/// Committed data length recorded in a mapped file's header.
pub fn committed_len(bytes: &[u8]) -> std::result::Result<usize, String> {
    if bytes.len() < MAPPED_HEADER_LEN {
        return Err("missing header".to_string());
    }
    if &bytes[..4] != MAPPED_MAGIC {
        return Err(format!("bad magic {:?}", &bytes[..4]));
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[4..MAPPED_HEADER_LEN]);
    let used = u32::from_le_bytes(raw) as usize;
    if MAPPED_HEADER_LEN + used > bytes.len() {
        return Err(format!(
            "committed length {used} exceeds file size {}",
            bytes.len()
        ));
    }
    Ok(used)
}

/// Writer appending into a memory-mapped, growable file.
pub struct MappedWriter {
    dir: PathBuf,
    header: String,
    cipher: Option<LineCipher>,
    region_bytes: u64,
    active: Option<ActiveFile>,
    region: Option<MappedRegion>,
    today: DateSource,
}

impl MappedWriter {
    /// `region_bytes` is clamped to at least one page.
    #[must_use]
    pub fn new(region_bytes: u64) -> Self {
        Self::with_date_source(region_bytes, naming::today)
    }

    #[must_use]
    pub fn with_date_source(region_bytes: u64, today: DateSource) -> Self {
        Self {
            dir: PathBuf::new(),
            header: String::new(),
            cipher: None,
            region_bytes: region_bytes.max(MIN_MAPPED_REGION_BYTES),
            active: None,
            region: None,
            today,
        }
    }

    fn open_for(&mut self, date: NaiveDate) -> Result<()> {
        let active = ActiveFile::new(&self.dir, BackendKind::Mapped, date);
        let mut region = MappedRegion::open(&active.path, self.region_bytes)?;
        if region.used == 0 && !self.header.is_empty() {
            let line = format!("{}\n", self.header);
            region.append(&active.path, line.as_bytes(), self.region_bytes)?;
        }
        self.region = Some(region);
        self.active = Some(active);
        Ok(())
    }

    fn close_current(&mut self) -> Result<()> {
        if let Some(region) = self.region.take() {
            let path = self.active.as_ref().map(|a| a.path.clone()).unwrap_or_default();
            region.finish(&path)?;
        }
        Ok(())
    }

    fn roll_if_needed(&mut self) -> Result<()> {
        let today = (self.today)();
        let stale = self.active.as_ref().is_none_or(|a| a.date != today);
        if stale || self.region.is_none() {
            self.close_current()?;
            self.open_for(today)?;
        }
        Ok(())
    }
}

impl WriterBackend for MappedWriter {
    fn kind(&self) -> BackendKind {
        BackendKind::Mapped
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

        let region_bytes = self.region_bytes;
        let (Some(region), Some(active)) = (self.region.as_mut(), self.active.as_ref()) else {
            return Err(DlgError::Write {
                backend: BACKEND,
                details: "writer not initialized".to_string(),
            });
        };
        region
            .append(&active.path, line.as_bytes(), region_bytes)
            .map_err(|e| e.into_write(BACKEND))
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
            details: "mapped writer has no active file after renew".to_string(),
        })
    }

    fn active_file(&self) -> Option<&ActiveFile> {
        self.active.as_ref()
    }

    fn flush(&mut self) -> Result<()> {
        if let (Some(region), Some(active)) = (self.region.as_ref(), self.active.as_ref()) {
            region
                .map
                .flush()
                .map_err(|source| DlgError::io(&active.path, source))?;
        }
        Ok(())
    }
}

impl Drop for MappedWriter {
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

    fn day_two() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 2).unwrap()
    }

    fn data_of(path: &Path) -> String {
        let bytes = fs::read(path).unwrap();
        let used = committed_len(&bytes).unwrap();
        String::from_utf8(bytes[MAPPED_HEADER_LEN..MAPPED_HEADER_LEN + used].to_vec()).unwrap()
    }

    #[test]
    fn init_preallocates_one_region_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = MappedWriter::with_date_source(8192, day_one);
        w.init("HEADER", dir.path(), "").unwrap();
        let path = dir.path().join("2026-05-01-mmap");
        assert_eq!(fs::metadata(&path).unwrap().len(), 8192);
        assert_eq!(data_of(&path), "HEADER\n");
    }

    #[test]
    fn lines_are_committed_in_order_and_file_grows() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = MappedWriter::with_date_source(4096, day_one);
        w.init("H", dir.path(), "").unwrap();
        let long = "x".repeat(1000);
        for _ in 0..10 {
            w.write(&long, false).unwrap();
        }
        let path = dir.path().join("2026-05-01-mmap");
        assert!(fs::metadata(&path).unwrap().len() > 4096);
        let data = data_of(&path);
        assert_eq!(data.lines().count(), 11);
        assert!(data.lines().skip(1).all(|l| l == long));
    }

    #[test]
    fn drop_trims_unused_capacity() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut w = MappedWriter::with_date_source(8192, day_one);
            w.init("H", dir.path(), "").unwrap();
            w.write("a", false).unwrap();
        }
        let path = dir.path().join("2026-05-01-mmap");
        assert_eq!(
            fs::metadata(&path).unwrap().len(),
            (MAPPED_HEADER_LEN + "H\na\n".len()) as u64
        );
    }

    #[test]
    fn reopen_continues_after_committed_data() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut w = MappedWriter::with_date_source(4096, day_one);
            w.init("H", dir.path(), "").unwrap();
            w.write("first", false).unwrap();
        }
        let mut w = MappedWriter::with_date_source(4096, day_one);
        w.init("H", dir.path(), "").unwrap();
        w.write("second", false).unwrap();
        drop(w);
        assert_eq!(data_of(&dir.path().join("2026-05-01-mmap")), "H\nfirst\nsecond\n");
    }

    #[test]
    fn corrupt_existing_file_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("2026-05-01-mmap"), b"garbage-not-a-map").unwrap();
        let mut w = MappedWriter::with_date_source(4096, day_one);
        let err = w.init("H", dir.path(), "").unwrap_err();
        assert_eq!(err.code(), "DLG-2001");
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn close_and_renew_seals_and_restarts_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = MappedWriter::with_date_source(4096, day_one);
        w.init("H", dir.path(), "").unwrap();
        w.write("old", false).unwrap();
        let renewed = w.close_and_renew().unwrap();
        assert_eq!(renewed.name(), "2026-05-01-mmap");
        w.write("new", false).unwrap();
        drop(w);

        assert_eq!(data_of(&dir.path().join("2026-05-01-mmap.1")), "H\nold\n");
        assert_eq!(data_of(&dir.path().join("2026-05-01-mmap")), "H\nnew\n");
    }

    #[test]
    fn date_change_opens_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = MappedWriter::with_date_source(4096, day_one);
        w.init("H", dir.path(), "").unwrap();
        w.write("monday", false).unwrap();
        w.today = day_two;
        w.write("tuesday", false).unwrap();
        assert_eq!(w.active_file().unwrap().name(), "2026-05-02-mmap");
        drop(w);
        assert_eq!(data_of(&dir.path().join("2026-05-01-mmap")), "H\nmonday\n");
        assert_eq!(data_of(&dir.path().join("2026-05-02-mmap")), "H\ntuesday\n");
    }
}
