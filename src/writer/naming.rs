//! File naming: `<date>` for plain files, `<date>-mmap` for mapped files,
//! `<name>.<n>` for files sealed by rotation and `<name>-up` once staged.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};

/// Suffix distinguishing mapped files.
pub const MAPPED_SUFFIX: &str = "-mmap";
/// Suffix of upload-ready files.
pub const UPLOAD_SUFFIX: &str = "-up";
/// Marker recording that the mapped backend failed in an earlier process.
pub const MAPPED_DISABLED_MARKER: &str = ".mapped-disabled";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Today's local date.
#[must_use]
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `2026-10-16` / `2026-10-16-mmap`.
#[must_use]
pub fn file_name(date: NaiveDate, mapped: bool) -> String {
    let mut name = date.format(DATE_FORMAT).to_string();
    if mapped {
        name.push_str(MAPPED_SUFFIX);
    }
    name
}

/// Whether a file name is already in upload-ready form.
#[must_use]
pub fn is_staged(name: &str) -> bool {
    name.ends_with(UPLOAD_SUFFIX) || name.contains(&format!("{UPLOAD_SUFFIX}."))
}

/// First free `<dir>/<name><infix><n>` for n = 1, 2, ...
///
/// `also_free` lets callers reserve the name under a second suffix too.
fn first_free(dir: &Path, stem: &str, also_free: impl Fn(&str) -> Option<String>) -> PathBuf {
    (1u32..)
        .map(|n| format!("{stem}.{n}"))
        .find(|candidate| {
            !dir.join(candidate).exists()
                && also_free(candidate).is_none_or(|other| !dir.join(other).exists())
        })
        .map_or_else(|| dir.join(stem), |name| dir.join(name))
}

/// Name for an active file being sealed by rotation. Avoids clashing both
/// with earlier sealed files and with their staged forms.
#[must_use]
pub fn sealed_path(dir: &Path, active_name: &str) -> PathBuf {
    first_free(dir, active_name, |candidate| {
        Some(format!("{candidate}{UPLOAD_SUFFIX}"))
    })
}

/// Upload-ready path for `name`: `<name>-up`, or `<name>-up.<n>` on clash.
#[must_use]
pub fn staged_path(dir: &Path, name: &str) -> PathBuf {
    let primary = format!("{name}{UPLOAD_SUFFIX}");
    if !dir.join(&primary).exists() {
        return dir.join(primary);
    }
    first_free(dir, &primary, |_| None)
}
