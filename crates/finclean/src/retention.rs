//! Log-file housekeeping for the CLI.
//!
//! Keeps a log directory bounded: the newest `max_files` files survive and
//! anything older than `max_age_days` goes regardless of count.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub max_files: usize,
    pub max_age_days: u64,
    /// Only files with this extension are considered.
    pub extension: String,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_files: 300,
            max_age_days: 30,
            extension: "log".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RetentionReport {
    pub kept: usize,
    pub deleted: Vec<PathBuf>,
    /// Files that matched the policy but could not be removed.
    pub failed: Vec<PathBuf>,
}

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

struct LogFile {
    path: PathBuf,
    modified: SystemTime,
}

/// Apply `policy` to the files directly inside `dir`.
///
/// A missing directory is not an error. Failures to delete single files are
/// logged and reported, not raised.
pub fn prune_logs(dir: impl AsRef<Path>, policy: &RetentionPolicy) -> io::Result<RetentionReport> {
    let dir = dir.as_ref();
    if !dir.exists() {
        debug!("Log directory {} does not exist", dir.display());
        return Ok(RetentionReport::default());
    }

    let mut files = collect_files(dir, &policy.extension)?;
    // Newest first.
    files.sort_by(|a, b| b.modified.cmp(&a.modified));

    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(
            policy.max_age_days.saturating_mul(SECONDS_PER_DAY),
        ))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut report = RetentionReport::default();
    for (position, file) in files.into_iter().enumerate() {
        if position < policy.max_files && file.modified >= cutoff {
            report.kept += 1;
            continue;
        }
        match fs::remove_file(&file.path) {
            Ok(()) => {
                debug!("Deleted {}", file.path.display());
                report.deleted.push(file.path);
            }
            Err(e) => {
                warn!("Could not delete {}: {}", file.path.display(), e);
                report.failed.push(file.path);
            }
        }
    }

    info!(
        "Log retention in {}: kept {}, deleted {}",
        dir.display(),
        report.kept,
        report.deleted.len()
    );
    Ok(report)
}

fn collect_files(dir: &Path, extension: &str) -> io::Result<Vec<LogFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let metadata = fs::metadata(&path)?;
        if !metadata.is_file() {
            continue;
        }
        files.push(LogFile {
            modified: metadata.modified()?,
            path,
        });
    }
    Ok(files)
}
