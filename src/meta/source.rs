//! Metadata sources.
//!
//! A [`Source`] resolves metadata for media files and free-form queries;
//! either operation may return `None` without error to mean "no match".
//! Sources compose: the file-analysis source turns a release file name into a
//! query and delegates it, the composite source chains children in order.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::error::Result;
use crate::meta::{Common, Episode, Kind, Metadata, MovieOrSeries, Query};

/// A source of metadata.
#[async_trait]
pub trait Source: Send + Sync {
    /// Try to resolve metadata for a media file.
    async fn from_file(&self, path: &Path) -> Result<Option<Metadata>>;

    /// Try to resolve metadata for a custom query.
    async fn from_query(&self, query: &Query) -> Result<Option<Metadata>>;
}

/// The file name without its extension.
fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

// ---------------------------------------------------------------------------
// Dummy
// ---------------------------------------------------------------------------

/// A source that discovers nothing.
#[derive(Debug, Default)]
pub struct DummySource;

#[async_trait]
impl Source for DummySource {
    async fn from_file(&self, _path: &Path) -> Result<Option<Metadata>> {
        Ok(None)
    }

    async fn from_query(&self, _query: &Query) -> Result<Option<Metadata>> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Literal
// ---------------------------------------------------------------------------

/// A source that builds rough metadata out of the input itself.
#[derive(Debug, Default)]
pub struct LiteralSource;

fn bare(title: &str) -> Common {
    Common {
        title: title.to_string(),
        original_title: title.to_string(),
        vote_rating: 1.0,
        ..Common::default()
    }
}

#[async_trait]
impl Source for LiteralSource {
    async fn from_file(&self, path: &Path) -> Result<Option<Metadata>> {
        let stem = file_stem(path);
        Ok(Some(Metadata::Unknown(bare(&stem))))
    }

    async fn from_query(&self, query: &Query) -> Result<Option<Metadata>> {
        if let Some((season, episode)) = query.episode_pair() {
            let label = format!("S{season:02}E{episode:02}");
            return Ok(Some(Metadata::Episode(Episode {
                common: bare(&label),
                series: MovieOrSeries {
                    common: bare(&query.text),
                    ..MovieOrSeries::default()
                },
                season,
                episode,
            })));
        }

        let meta = match query.kind {
            Kind::Movie => Metadata::Movie(MovieOrSeries {
                common: bare(&query.text),
                ..MovieOrSeries::default()
            }),
            Kind::Series => Metadata::Series(MovieOrSeries {
                common: bare(&query.text),
                ..MovieOrSeries::default()
            }),
            _ => Metadata::Unknown(bare(&query.text)),
        };

        Ok(Some(meta))
    }
}

// ---------------------------------------------------------------------------
// Composite
// ---------------------------------------------------------------------------

/// A source that tries its children in order and returns the first match.
/// Any child error short-circuits.
pub struct CompositeSource {
    sources: Vec<Arc<dyn Source>>,
}

impl CompositeSource {
    pub fn new(sources: Vec<Arc<dyn Source>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl Source for CompositeSource {
    async fn from_file(&self, path: &Path) -> Result<Option<Metadata>> {
        for source in &self.sources {
            if let Some(meta) = source.from_file(path).await? {
                return Ok(Some(meta));
            }
        }

        Ok(None)
    }

    async fn from_query(&self, query: &Query) -> Result<Option<Metadata>> {
        for source in &self.sources {
            if let Some(meta) = source.from_query(query).await? {
                return Ok(Some(meta));
            }
        }

        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// File analysis
// ---------------------------------------------------------------------------

fn episode_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)S(\d+) ?[EX](\d+)").unwrap())
}

fn encoding_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)[Hx]\.?26\d|HEVC|MPEG(?:-\d)?|DivX|VP\d|AV\d").unwrap())
}

fn resolution_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(2160|1440|1080|720|480|360|240|144)[pi]").unwrap())
}

/// A source that analyzes release-style file names, builds a [`Query`] out of
/// the remainder and delegates resolution to the wrapped source.
pub struct FileAnalysisSource {
    delegate: Arc<dyn Source>,
}

impl FileAnalysisSource {
    pub fn new(delegate: Arc<dyn Source>) -> Self {
        Self { delegate }
    }

    /// Build the lookup query for a file name.
    pub fn analyze(stem: &str) -> Query {
        let mut query = Query {
            text: stem.to_string(),
            ..Query::default()
        };

        if let Some(caps) = episode_pattern().captures(stem) {
            let m = caps.get(0).unwrap();
            query.text = stem[..m.start()].to_string();
            query.kind = Kind::Episode;
            query.season = caps[1].parse().ok();
            query.episode = caps[2].parse().ok();
        } else {
            let text = resolution_pattern().replace_all(stem, "");
            let text = encoding_pattern().replace_all(&text, "");
            query.text = strip_bracketed(&text);
        }

        query.text = query
            .text
            .replace(['-', '_', '.'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        query
    }
}

/// Drop `(...)`, `[...]` and `{...}` segments.
fn strip_bracketed(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut scrub_until = None;

    for c in s.chars() {
        match (c, scrub_until) {
            ('(', None) => scrub_until = Some(')'),
            ('[', None) => scrub_until = Some(']'),
            ('{', None) => scrub_until = Some('}'),
            (c, Some(close)) if c == close => scrub_until = None,
            (c, None) => out.push(c),
            _ => {}
        }
    }

    out
}

#[async_trait]
impl Source for FileAnalysisSource {
    async fn from_file(&self, path: &Path) -> Result<Option<Metadata>> {
        let query = Self::analyze(&file_stem(path));
        self.delegate.from_query(&query).await
    }

    async fn from_query(&self, query: &Query) -> Result<Option<Metadata>> {
        self.delegate.from_query(query).await
    }
}
