mod fingerprint;
mod media;
mod op;

pub(crate) use self::fingerprint::FingerprintRow;
pub use self::fingerprint::{FileState, Fingerprint};
pub use omni_storage::file::{ContentHash, HashKind};
pub(crate) use self::media::MediaRow;
pub use self::op::WriteOp;
