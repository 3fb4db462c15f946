//! Typed table of extractors, one per media type.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::{ErrorKind, Result};
use crate::extractors::{AudioExtractor, Extractor, ImageExtractor, Source, VideoExtractor};
use crate::models::{Classification, MediaRecord, MediaType};

/// Maps every [`MediaType`] to the [`Extractor`] that handles it.
///
/// Built once at startup with the default extractors. Because every media
/// type has a slot, lookup never fails; replacing an extractor (in tests, or
/// to plug in an external tool) is done with [`Registry::with`].
///
/// # Examples
///
/// ```
/// use omni_extract::models::MediaType;
/// use omni_extract::{Registry, extractors::ImageExtractor};
///
/// let registry = Registry::default().with(MediaType::Image, ImageExtractor);
/// assert_eq!(registry.get(MediaType::Image).name(), "image");
/// ```
#[derive(Clone)]
pub struct Registry {
    video: Arc<dyn Extractor>,
    audio: Arc<dyn Extractor>,
    image: Arc<dyn Extractor>,
}

impl Registry {
    pub fn new() -> Self {
        Self { video: Arc::new(VideoExtractor), audio: Arc::new(AudioExtractor), image: Arc::new(ImageExtractor) }
    }

    /// Replace the extractor for one media type.
    pub fn with(mut self, media_type: MediaType, extractor: impl Extractor + 'static) -> Self {
        let extractor: Arc<dyn Extractor> = Arc::new(extractor);
        match media_type {
            MediaType::Video => self.video = extractor,
            MediaType::Audio => self.audio = extractor,
            MediaType::Image => self.image = extractor,
        }
        self
    }

    pub fn get(&self, media_type: MediaType) -> &Arc<dyn Extractor> {
        match media_type {
            MediaType::Video => &self.video,
            MediaType::Audio => &self.audio,
            MediaType::Image => &self.image,
        }
    }

    /// Run the extractor for `classification.media_type` over `source`, and
    /// merge its output with the classification.
    ///
    /// Blocking: call from the blocking pool. Empty files are rejected as
    /// [`CorruptFile`](ErrorKind::CorruptFile) without running an extractor.
    #[instrument(level = "debug", skip_all, fields(media_type = %classification.media_type, size = size))]
    pub fn extract(&self, classification: Classification, source: &mut dyn Source, size: u64) -> Result<MediaRecord> {
        if size == 0 {
            exn::bail!(ErrorKind::corrupt("empty file"));
        }
        let extractor = self.get(classification.media_type);
        let extracted = extractor.extract(source, size)?;
        debug!(extractor = extractor.name(), container = ?extracted.technical.container, "extracted");
        Ok(MediaRecord::build(classification, extracted, size))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("video", &self.video.name())
            .field("audio", &self.audio.name())
            .field("image", &self.image.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify;
    use crate::extractors::fixtures::mp4;
    use crate::models::{Extracted, MediaKind};
    use std::io::Cursor;
    use std::path::Path;

    struct Fixed;
    impl Extractor for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn extract(&self, _source: &mut dyn Source, _size: u64) -> Result<Extracted> {
            Ok(Extracted { title: Some("From Tags".to_string()), ..Default::default() })
        }
    }

    #[test]
    fn test_default_extractors() {
        let registry = Registry::default();
        assert_eq!(registry.get(MediaType::Video).name(), "video");
        assert_eq!(registry.get(MediaType::Audio).name(), "audio");
        assert_eq!(registry.get(MediaType::Image).name(), "image");
    }

    #[test]
    fn test_override_one_type() {
        let registry = Registry::new().with(MediaType::Audio, Fixed);
        assert_eq!(registry.get(MediaType::Audio).name(), "fixed");
        assert_eq!(registry.get(MediaType::Video).name(), "video");

        let classification = classify(Path::new("/music/01 - Filename Title.mp3")).unwrap();
        let record = registry.extract(classification, &mut Cursor::new(vec![1u8; 8]), 8).unwrap();
        assert_eq!(record.kind, MediaKind::Music);
        assert_eq!(record.title, "From Tags");
        assert_eq!(record.track, Some(1));
    }

    #[test]
    fn test_tv_episode_record() {
        let data = mp4(120, Some((1280, 720)));
        let size = data.len() as u64;
        let classification = classify(Path::new("/tv/ShowName.S01E02.mp4")).unwrap();
        let record = Registry::default().extract(classification, &mut Cursor::new(data), size).unwrap();
        assert_eq!(record.kind, MediaKind::TvEpisode);
        assert_eq!(record.title, "ShowName");
        assert_eq!((record.season, record.episode), (Some(1), Some(2)));
        assert_eq!(record.technical.duration_ms, Some(120_000));
        assert_eq!(record.technical.video_codec.as_deref(), Some("h264"));
    }

    #[test]
    fn test_empty_file_is_corrupt() {
        let classification = classify(Path::new("/tv/Empty.S01E01.mkv")).unwrap();
        let err = Registry::default().extract(classification, &mut Cursor::new(Vec::new()), 0).unwrap_err();
        assert!(matches!(&*err, ErrorKind::CorruptFile(_)));
    }
}
