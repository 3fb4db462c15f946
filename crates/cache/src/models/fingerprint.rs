use crate::error::{Error, ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use omni_storage::file::ContentHash;
use std::path::PathBuf;
use std::str::FromStr;
use time::UtcDateTime;

/// Outcome of the last scan of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileState {
    #[default]
    Ok,
    /// Extraction (or reading) failed; the file is reprocessed on every scan
    /// until it succeeds.
    Errored,
}
impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Errored => "errored",
        }
    }
}
impl FromStr for FileState {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "ok" => Self::Ok,
            "errored" => Self::Errored,
            _ => exn::bail!(ErrorKind::InvalidData("file state")),
        })
    }
}

/// Everything remembered about a file between scans.
///
/// Unique per `(user_id, path)`. `id` is assigned by the datastore on first
/// upsert and is `None` until then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub id: Option<i64>,
    pub user_id: String,
    pub category_id: String,
    /// Absolute path.
    pub path: PathBuf,
    pub hash: Option<ContentHash>,
    pub size: u64,
    pub modified: UtcDateTime,
    pub scanned_at: UtcDateTime,
    pub state: FileState,
}

#[derive(sqlx::FromRow)]
pub(crate) struct FingerprintRow {
    pub(crate) id: i64,
    pub(crate) user_id: String,
    pub(crate) category_id: String,
    pub(crate) path: String,
    pub(crate) hash: Option<String>,
    pub(crate) hash_kind: Option<String>,
    pub(crate) size: i64,
    pub(crate) modified_ns: i64,
    pub(crate) scanned_at: i64,
    pub(crate) state: String,
}
impl TryFrom<&Fingerprint> for FingerprintRow {
    type Error = Error;
    fn try_from(fingerprint: &Fingerprint) -> Result<Self> {
        Ok(Self {
            id: fingerprint.id.unwrap_or_default(),
            user_id: fingerprint.user_id.clone(),
            category_id: fingerprint.category_id.clone(),
            path: fingerprint.path.to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string(),
            hash: fingerprint.hash.as_ref().map(|hash| hash.value.clone()),
            hash_kind: fingerprint.hash.as_ref().map(|hash| hash.kind.as_str().to_string()),
            size: i64::try_from(fingerprint.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            modified_ns: i64::try_from(fingerprint.modified.unix_timestamp_nanos())
                .or_raise(|| ErrorKind::InvalidData("modification time"))?,
            scanned_at: fingerprint.scanned_at.unix_timestamp(),
            state: fingerprint.state.as_str().to_string(),
        })
    }
}
impl TryFrom<FingerprintRow> for Fingerprint {
    type Error = Error;
    fn try_from(row: FingerprintRow) -> Result<Self> {
        let hash = match (row.hash, row.hash_kind) {
            (Some(value), Some(kind)) => {
                Some(ContentHash::new(kind.parse().ok().ok_or_raise(|| ErrorKind::InvalidData("hash kind"))?, value))
            },
            (None, None) => None,
            _ => exn::bail!(ErrorKind::InvalidData("hash without kind")),
        };
        Ok(Self {
            id: Some(row.id),
            user_id: row.user_id,
            category_id: row.category_id,
            path: PathBuf::from(row.path),
            hash,
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            modified: UtcDateTime::from_unix_timestamp_nanos(i128::from(row.modified_ns))
                .or_raise(|| ErrorKind::InvalidData("modification time"))?,
            scanned_at: UtcDateTime::from_unix_timestamp(row.scanned_at)
                .or_raise(|| ErrorKind::InvalidData("scan time"))?,
            state: row.state.parse()?,
        })
    }
}
