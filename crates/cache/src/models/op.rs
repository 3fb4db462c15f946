use super::Fingerprint;
use omni_extract::models::MediaRecord;
use std::path::PathBuf;

/// One pending change, applied as part of a [`batch_write`](crate::Datastore::batch_write).
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or update a fingerprint.
    ///
    /// With a record, the record replaces whatever was stored for the file.
    /// Without one, the stored record is kept when the fingerprint is
    /// [`Ok`](super::FileState::Ok) (the file was unchanged) and removed when
    /// it is [`Errored`](super::FileState::Errored).
    Upsert { fingerprint: Fingerprint, record: Option<MediaRecord> },
    /// Remove a fingerprint and its record.
    Delete { user_id: String, path: PathBuf },
}
impl WriteOp {
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Upsert { fingerprint, .. } => &fingerprint.path,
            Self::Delete { path, .. } => path,
        }
    }
}
