//! Content records on disk, plus the retention sweep that prunes them.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::images::ImageResult;
use crate::script::ScriptResult;

/// Prefix of every record file name.
pub const RECORD_PREFIX: &str = "content_";

/// Overall status stored in a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// At least one image was produced
    Generated,
    /// The script exists but every image failed
    PartialFailure,
}

impl RecordStatus {
    /// Status for a run with these image results.
    pub fn for_images(images: &[ImageResult]) -> Self {
        if images.iter().any(|image| image.succeeded) {
            Self::Generated
        } else {
            Self::PartialFailure
        }
    }
}

/// Everything one run produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Run start, `YYYYMMDD_HHMMSS` local time
    pub timestamp: String,
    /// Topic the script was asked about
    pub topic: String,
    /// The lesson text
    pub script: ScriptResult,
    /// One entry per image attempt, in prompt order
    pub images: Vec<ImageResult>,
    /// Overall outcome
    pub status: RecordStatus,
    /// Image generator description
    pub generator: String,
    /// Image API host
    pub api_used: String,
}

/// Formats a run timestamp the way record names expect.
pub fn run_timestamp(at: chrono::DateTime<chrono::Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Writes `record` as pretty JSON under `dir` and returns the file name.
///
/// The name is `content_<timestamp>.json`. If that name is taken (two runs in
/// the same second) a numeric suffix is added rather than overwriting.
pub async fn write_record(dir: &Path, record: &ContentRecord) -> Result<String, PipelineError> {
    tokio::fs::create_dir_all(dir).await?;
    let body = serde_json::to_vec_pretty(record)?;

    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("{RECORD_PREFIX}{}.json", record.timestamp)
        } else {
            format!("{RECORD_PREFIX}{}_{attempt}.json", record.timestamp)
        };
        let path = dir.join(&name);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                file.write_all(&body).await?;
                file.flush().await?;
                info!("Content saved to {}", path.display());
                return Ok(name);
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists && attempt < 100 => {
                debug!("{} already exists, trying another name", path.display());
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Reads a record back by file name.
pub async fn read_record(dir: &Path, name: &str) -> Result<ContentRecord, PipelineError> {
    let bytes = tokio::fs::read(dir.join(name)).await?;
    serde_json::from_slice(&bytes).map_err(|err| PipelineError::Parse(format!("{name}: {err}")))
}

/// Record file names in `dir`, newest first.
pub async fn list_records(dir: &Path) -> Result<Vec<String>, PipelineError> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(names),
        Err(err) => return Err(err.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with(RECORD_PREFIX) && name.ends_with(".json") {
            names.push(name);
        }
    }
    // timestamps sort lexically
    names.sort_unstable_by(|a, b| b.cmp(a));
    Ok(names)
}

/// Deletes regular files in `dir` last modified more than `max_age` ago.
///
/// Returns the removed file names. Files that cannot be inspected or removed
/// are logged and skipped.
pub async fn sweep_older_than(dir: &Path, max_age: Duration) -> Result<Vec<String>, PipelineError> {
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut removed = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(removed),
        Err(err) => return Err(err.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path: PathBuf = entry.path();
        let modified = match entry.metadata().await {
            Ok(meta) if meta.is_file() => match meta.modified() {
                Ok(modified) => modified,
                Err(err) => {
                    warn!("Cannot read mtime of {}: {err}", path.display());
                    continue;
                }
            },
            Ok(_) => continue,
            Err(err) => {
                warn!("Cannot stat {}: {err}", path.display());
                continue;
            }
        };
        if modified >= cutoff {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Removed old file {}", path.display());
                removed.push(entry.file_name().to_string_lossy().into_owned());
            }
            Err(err) => warn!("Failed to remove {}: {err}", path.display()),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptSource;

    fn image(prompt: &str, succeeded: bool) -> ImageResult {
        ImageResult {
            prompt: prompt.to_string(),
            remote_url: succeeded.then(|| format!("https://img/{prompt}")),
            local_path: None,
            label: "image_1".to_string(),
            succeeded,
            error: None,
        }
    }

    fn record(timestamp: &str, images: Vec<ImageResult>) -> ContentRecord {
        ContentRecord {
            timestamp: timestamp.to_string(),
            topic: "Fibonacci no day trade".to_string(),
            script: ScriptResult {
                text: "Gerenciamento de risco é essencial — sempre!".to_string(),
                source: ScriptSource::Generated,
                fallback_reason: None,
            },
            status: RecordStatus::for_images(&images),
            images,
            generator: "test".to_string(),
            api_used: "localhost".to_string(),
        }
    }

    #[test]
    fn status_depends_on_any_success() {
        assert_eq!(
            RecordStatus::for_images(&[image("a", false), image("b", true)]),
            RecordStatus::Generated
        );
        assert_eq!(
            RecordStatus::for_images(&[image("a", false), image("b", false)]),
            RecordStatus::PartialFailure
        );
    }

    #[test]
    fn timestamp_format() {
        use chrono::TimeZone;
        let at = chrono::Local
            .with_ymd_and_hms(2026, 3, 9, 14, 5, 7)
            .single()
            .expect("valid date");
        assert_eq!(run_timestamp(at), "20260309_140507");
    }

    #[tokio::test]
    async fn writes_readable_utf8_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let original = record("20260101_120000", vec![image("candles", true)]);
        let name = write_record(dir.path(), &original).await.expect("write");
        assert_eq!(name, "content_20260101_120000.json");

        let raw = std::fs::read_to_string(dir.path().join(&name)).expect("read");
        assert!(raw.contains("é essencial — sempre!"), "non-ASCII kept verbatim");
        assert!(raw.contains("\"status\": \"generated\""));

        let back = read_record(dir.path(), &name).await.expect("read back");
        assert_eq!(back, original);
    }

    #[tokio::test]
    async fn same_timestamp_does_not_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = write_record(dir.path(), &record("20260101_120000", vec![]))
            .await
            .expect("first");
        let second = write_record(dir.path(), &record("20260101_120000", vec![]))
            .await
            .expect("second");
        assert_ne!(first, second);
        assert_eq!(second, "content_20260101_120000_1.json");

        let listed = list_records(dir.path()).await.expect("list");
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn list_records_missing_dir_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let listed = list_records(&dir.path().join("nope")).await.expect("list");
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_only_old_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let old = dir.path().join("content_20200101_000000.json");
        let fresh = dir.path().join("content_20260101_000000.json");
        std::fs::write(&old, b"{}").expect("write old");
        std::fs::write(&fresh, b"{}").expect("write fresh");
        std::fs::create_dir(dir.path().join("subdir")).expect("mkdir");

        let ten_days_ago = SystemTime::now() - Duration::from_secs(10 * 24 * 60 * 60);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .expect("open old")
            .set_modified(ten_days_ago)
            .expect("set mtime");

        let removed = sweep_older_than(dir.path(), Duration::from_secs(7 * 24 * 60 * 60))
            .await
            .expect("sweep");
        assert_eq!(removed, vec!["content_20200101_000000.json".to_string()]);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(dir.path().join("subdir").exists());
    }
}
