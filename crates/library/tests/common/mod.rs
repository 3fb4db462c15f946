#![allow(dead_code)]

use omni_cache::{Datastore, MemoryStore};
use omni_config::ScannerConfig;
use omni_extract::error::Result as ExtractResult;
use omni_extract::extractors::VideoExtractor;
use omni_extract::models::{Extracted, MediaType};
use omni_extract::{Extractor, Registry, Source};
use omni_library::Scanner;
use omni_storage::BackendHandle;
use omni_storage::backend::MockBackend;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const ROOT: &str = "/mock";

/// Settings with short timers, so tests don't wait on flushes or backoff.
pub fn settings() -> ScannerConfig {
    ScannerConfig { flush_interval_ms: 10, retry_backoff_ms: 1, progress_interval_ms: 0, ..ScannerConfig::default() }
}

pub fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut data = u32::try_from(payload.len() + 8).unwrap().to_be_bytes().to_vec();
    data.extend_from_slice(kind);
    data.extend_from_slice(payload);
    data
}

/// Minimal MP4: `ftyp` and a `moov` holding only an `mvhd` with a 1 kHz
/// timescale. Files with different durations have the same size.
pub fn mp4(duration_secs: u32) -> Vec<u8> {
    let mut mvhd = vec![0u8; 100];
    mvhd[12..16].copy_from_slice(&1000u32.to_be_bytes());
    mvhd[16..20].copy_from_slice(&(duration_secs * 1000).to_be_bytes());
    let mut data = mp4_box(b"ftyp", b"isom\0\0\x02\0isomiso2avc1mp41");
    data.extend(mp4_box(b"moov", &mp4_box(b"mvhd", &mvhd)));
    data
}

/// Video extractor that counts its calls.
#[derive(Clone, Default)]
pub struct Counting(pub Arc<AtomicUsize>);

impl Counting {
    pub fn calls(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl Extractor for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn extract(&self, source: &mut dyn Source, size: u64) -> ExtractResult<Extracted> {
        self.0.fetch_add(1, Ordering::SeqCst);
        VideoExtractor.extract(source, size)
    }
}

pub struct Harness {
    pub backend: Arc<MockBackend>,
    pub store: Arc<MemoryStore>,
    pub extractions: Counting,
    pub scanner: Scanner,
}

impl Harness {
    pub fn new(files: impl IntoIterator<Item = (&'static str, Vec<u8>)>) -> Self {
        Self::with_settings(files, settings())
    }

    pub fn with_settings(files: impl IntoIterator<Item = (&'static str, Vec<u8>)>, settings: ScannerConfig) -> Self {
        let backend = Arc::new(MockBackend::with_files(files));
        let store = Arc::new(MemoryStore::new());
        let extractions = Counting::default();
        let registry = Registry::default().with(MediaType::Video, extractions.clone());
        let scanner = scanner(Arc::clone(&backend) as BackendHandle, Arc::clone(&store) as Arc<dyn Datastore>, registry, settings);
        Self { backend, store, extractions, scanner }
    }
}

pub fn scanner(backend: BackendHandle, store: Arc<dyn Datastore>, registry: Registry, settings: ScannerConfig) -> Scanner {
    Scanner::new(backend, store, registry, settings)
}
