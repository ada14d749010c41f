//! Shared test harness for integration tests.
//!
//! Provides fixture-file writers for the supported containers plus a
//! metadata source that counts lookups, so debounce and single-flight
//! behavior can be asserted.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use reelvault::meta::source::{LiteralSource, Source};
use reelvault::meta::{Metadata, Query};
use reelvault::repo::CrudRepository;

/// Write a fake Matroska file: EBML magic followed by `filler`.
pub fn write_mkv(dir: &Path, name: &str, filler: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let mut bytes = vec![0x1A, 0x45, 0xDF, 0xA3];
    bytes.extend_from_slice(filler);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Write a fake MP4 file: an `ftyp isom` box followed by `filler`.
pub fn write_mp4(dir: &Path, name: &str, filler: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let mut bytes = vec![0x00, 0x00, 0x00, 0x20];
    bytes.extend_from_slice(b"ftypisom");
    bytes.extend_from_slice(filler);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// A metadata source that counts `from_file` calls and otherwise behaves
/// like the literal source.
#[derive(Default)]
pub struct CountingSource {
    hits: AtomicUsize,
}

impl CountingSource {
    pub fn file_hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for CountingSource {
    async fn from_file(&self, path: &Path) -> reelvault::Result<Option<Metadata>> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        LiteralSource.from_file(path).await
    }

    async fn from_query(&self, query: &Query) -> reelvault::Result<Option<Metadata>> {
        LiteralSource.from_query(query).await
    }
}

/// A base repository over a scratch directory with a literal source.
pub fn literal_repo(id: &str, dir: &Path) -> Arc<CrudRepository> {
    Arc::new(CrudRepository::new(id, id, dir, Arc::new(LiteralSource)).unwrap())
}
