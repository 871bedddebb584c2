//! Source discovery, backups and writes.

use crate::error::{PilotError, PilotResult};
use chrono::{DateTime, Local};
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Extension (case-insensitive) of source documents.
pub const SQL_EXTENSION: &str = "sql";

/// Timestamp layout used in backup names.
pub const BACKUP_STAMP: &str = "%Y%m%d_%H%M%S";

static BACKUP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\.\d{8}_\d{6}(_\d+)?\.bak|\.bak\.sql)$").expect("backup name pattern is valid")
});

/// Directories never descended into.
const SKIPPED_DIRS: [&str; 3] = [".git", "target", "node_modules"];

/// Collision suffixes tried before a backup is given up on.
const MAX_BACKUP_ATTEMPTS: u32 = 99;

/// True when `path` has the SQL extension and is not a backup.
pub fn is_source_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if BACKUP_NAME.is_match(name) {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(SQL_EXTENSION))
}

/// Result of a directory scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    /// Source files, sorted and unique.
    pub files: Vec<PathBuf>,
    /// Directories that could not be listed. Files below them are missing
    /// from `files`.
    pub unreadable: Vec<PathBuf>,
}

/// List source files under `dir`. Subdirectories are only visited when
/// `recursive` is set, and symlinked directories are never entered.
pub fn scan_directory(dir: &Path, recursive: bool) -> Scan {
    let mut scan = Scan::default();
    scan_into(dir, recursive, &mut scan);
    scan.files.sort();
    scan.files.dedup();
    scan
}

fn scan_into(dir: &Path, recursive: bool, scan: &mut Scan) {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "cannot read directory");
            scan.unreadable.push(dir.to_path_buf());
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        // file_type() does not follow links.
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if recursive && !SKIPPED_DIRS.contains(&name) {
                scan_into(&path, recursive, scan);
            }
        } else if file_type.is_symlink() && path.is_dir() {
            debug!(path = %path.display(), "not following directory symlink");
        } else if is_source_file(&path) {
            scan.files.push(path);
        }
    }
}

/// Read a source document. Invalid UTF-8 is replaced rather than rejected.
pub fn read_source(path: &Path) -> PilotResult<String> {
    let bytes = fs::read(path).map_err(|e| PilotError::input(path, e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// `<name>.<YYYYMMDD_HHMMSS>.bak` next to the original.
pub fn backup_path(path: &Path, at: DateTime<Local>) -> PathBuf {
    backup_candidate(path, at, 0)
}

/// Backup name for the `attempt`-th try; later attempts get a `_<n>` suffix
/// after the timestamp.
fn backup_candidate(path: &Path, at: DateTime<Local>, attempt: u32) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    if attempt == 0 {
        name.push(format!(".{}.bak", at.format(BACKUP_STAMP)));
    } else {
        name.push(format!(".{}_{}.bak", at.format(BACKUP_STAMP), attempt));
    }
    path.with_file_name(name)
}

/// Copy `path` to a timestamped backup and return the backup location.
pub fn backup(path: &Path) -> PilotResult<PathBuf> {
    backup_at(path, Local::now())
}

/// Copy `path` to a new backup stamped with `at`. An existing backup is
/// never overwritten; a name collision picks the next free suffix.
pub fn backup_at(path: &Path, at: DateTime<Local>) -> PilotResult<PathBuf> {
    let mut source = File::open(path).map_err(|e| PilotError::filesystem(path, e))?;

    let mut attempt = 0;
    let (target, mut file) = loop {
        let target = backup_candidate(path, at, attempt);
        match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(file) => break (target, file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_BACKUP_ATTEMPTS => {
                attempt += 1;
            }
            Err(e) => return Err(PilotError::filesystem(&target, e)),
        }
    };

    if let Err(e) = io::copy(&mut source, &mut file) {
        drop(file);
        let _ = fs::remove_file(&target);
        return Err(PilotError::filesystem(&target, e));
    }
    info!(path = %path.display(), backup = %target.display(), "backup created");
    Ok(target)
}

/// Write `content` to `path` through a sibling temp file and a rename, so a
/// failed write never leaves a half-written destination.
pub fn write_output(path: &Path, content: &str) -> PilotResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| PilotError::filesystem(parent, e))?;
    }

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".sqlpilot.tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, content).map_err(|e| PilotError::filesystem(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(PilotError::filesystem(path, e));
    }
    Ok(())
}
