use tracing::instrument;

use super::riff::{self, RiffForm};
use super::{Extractor, Source, isobmff, matroska, read_at};
use crate::error::{ErrorKind, Result};
use crate::models::Extracted;

/// Container-level video metadata: MP4/MOV, Matroska/WebM and AVI.
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoExtractor;

impl Extractor for VideoExtractor {
    fn name(&self) -> &'static str {
        "video"
    }

    #[instrument(level = "trace", skip(self, source))]
    fn extract(&self, source: &mut dyn Source, size: u64) -> Result<Extracted> {
        let head = read_at(source, 0, 16)?;
        if head.len() < 12 {
            exn::bail!(ErrorKind::corrupt("file too short for a video container"));
        }
        if isobmff::sniff(&head) {
            isobmff::extract(source, size)
        } else if matroska::sniff(&head) {
            matroska::extract(source, size)
        } else if riff::sniff(&head) == Some(RiffForm::Avi) {
            riff::extract_avi(source, size)
        } else {
            exn::bail!(ErrorKind::UnsupportedFormat("unrecognised video container".to_string()))
        }
    }
}
