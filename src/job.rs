//! JSON record of one scan run, kept next to the database.

use exn::ResultExt;
use omni_library::ScanResult;
use serde::Serialize;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{ErrorKind, Result};

const JOBS_DIR: &str = "jobs";

#[derive(Debug, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub root: PathBuf,
    pub user_id: String,
    pub category_id: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: String,
    pub result: JobSummary,
}

#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub total: u64,
    pub processed: u64,
    pub skipped: u64,
    pub errored: u64,
    pub deleted: u64,
    pub duration_ms: u128,
    pub errors: Vec<JobError>,
    pub failure: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobError {
    pub path: PathBuf,
    pub reason: String,
}

fn timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

impl JobRecord {
    pub fn new(root: &Path, user_id: &str, category_id: &str, started: OffsetDateTime, result: &ScanResult) -> Self {
        Self {
            id: format!("scan-{}", started.unix_timestamp_nanos()),
            root: root.to_path_buf(),
            user_id: user_id.to_string(),
            category_id: category_id.to_string(),
            status: result.status.to_string(),
            started_at: timestamp(started),
            finished_at: timestamp(OffsetDateTime::now_utc()),
            result: JobSummary {
                total: result.total,
                processed: result.processed,
                skipped: result.skipped,
                errored: result.errored,
                deleted: result.deleted,
                duration_ms: result.duration.as_millis(),
                errors: result
                    .errors
                    .iter()
                    .map(|error| JobError { path: error.path.clone(), reason: error.reason.to_string() })
                    .collect(),
                failure: result.failure.as_ref().map(|failure| format!("{failure:?}")),
            },
        }
    }

    /// Write the record as `jobs/<id>.json` inside `dir`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let dir = dir.join(JOBS_DIR);
        let path = dir.join(format!("{}.json", self.id));
        std::fs::create_dir_all(&dir).or_raise(|| ErrorKind::Job(path.clone()))?;
        let json = serde_json::to_vec_pretty(self).or_raise(|| ErrorKind::Job(path.clone()))?;
        std::fs::write(&path, json).or_raise(|| ErrorKind::Job(path.clone()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omni_library::ScanStatus;
    use std::time::Duration;
    use tempfile::TempDir;

    fn result() -> ScanResult {
        ScanResult {
            total: 3,
            processed: 1,
            skipped: 1,
            errored: 1,
            deleted: 0,
            errors: vec![omni_library::FileError {
                path: PathBuf::from("/srv/tv/empty.mp4"),
                reason: omni_library::FileErrorKind::CorruptFile("empty file".to_string()),
            }],
            duration: Duration::from_millis(1500),
            status: ScanStatus::Partial,
            failure: None,
        }
    }

    #[test]
    fn test_record_is_written_as_json() {
        let dir = TempDir::new().unwrap();
        let started = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let record = JobRecord::new(Path::new("/srv/tv"), "u1", "tv", started, &result());
        let path = record.save(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("jobs").join("scan-1700000000000000000.json"));

        let json: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(json["status"], "partial");
        assert_eq!(json["started_at"], "2023-11-14T22:13:20Z");
        assert_eq!(json["result"]["errored"], 1);
        assert_eq!(json["result"]["duration_ms"], 1500);
        assert_eq!(json["result"]["errors"][0]["reason"], "corrupt file: empty file");
        assert!(json["result"]["failure"].is_null());
    }
}
