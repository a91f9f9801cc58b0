//! Reading persisted log files back: plain or mapped, clear or encrypted.

#![allow(missing_docs)]

use std::fs;
use std::path::Path;

use crate::core::errors::{DlgError, Result};
use crate::format::line::{ParsedLine, parse_line};
use crate::writer::cipher::{LineCipher, is_encrypted};
use crate::writer::mapped::{MAPPED_HEADER_LEN, MAPPED_MAGIC, committed_len};

/// One stored line after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredLine {
    /// Parsed successfully (decrypted first if it was encrypted).
    Parsed(ParsedLine),
    /// Encrypted and no cipher (or the wrong one) was available.
    Sealed(String),
    /// Not a line this crate produced.
    Unparseable { raw: String, reason: String },
}

/// Raw text lines of a log file, whichever backend wrote it.
pub fn read_raw_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).map_err(|source| DlgError::io(path, source))?;
    let data = if bytes.starts_with(MAPPED_MAGIC) {
        let used = committed_len(&bytes).map_err(|reason| DlgError::CorruptMapFile {
            path: path.to_path_buf(),
            reason,
        })?;
        &bytes[MAPPED_HEADER_LEN..MAPPED_HEADER_LEN + used]
    } else {
        &bytes[..]
    };
    Ok(split_lines(data))
}

fn split_lines(data: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;
    for end in memchr::memchr_iter(b'\n', data) {
        lines.push(String::from_utf8_lossy(&data[start..end]).into_owned());
        start = end + 1;
    }
    if start < data.len() {
        lines.push(String::from_utf8_lossy(&data[start..]).into_owned());
    }
    lines
}

/// Decode one stored line.
pub fn decode_line(raw: &str, cipher: Option<&LineCipher>) -> StoredLine {
    let clear = if is_encrypted(raw) {
        match cipher.map(|c| c.open(raw)) {
            Some(Ok(clear)) => clear,
            Some(Err(_)) | None => return StoredLine::Sealed(raw.to_string()),
        }
    } else {
        raw.to_string()
    };
    match parse_line(&clear) {
        Ok(parsed) => StoredLine::Parsed(parsed),
        Err(e) => StoredLine::Unparseable {
            raw: clear,
            reason: e.to_string(),
        },
    }
}

/// Read and decode every line of a log file.
pub fn read_log_file(path: &Path, cipher: Option<&LineCipher>) -> Result<Vec<StoredLine>> {
    Ok(read_raw_lines(path)?
        .iter()
        .map(|raw| decode_line(raw, cipher))
        .collect())
}
