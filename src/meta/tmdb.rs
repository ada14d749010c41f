//! TMDB (The Movie Database) metadata source.
//!
//! Implements [`Source`] against the TMDB v3 REST API:
//! search (multi/movie/tv) -> details -> credits -> configuration, with the
//! configured language attached to every call.
//!
//! Features:
//! - Token-bucket rate limiting at 4 requests / second via [`governor`].
//! - Automatic retry on HTTP 429 with `Retry-After` header support (max 3 retries).
//! - In-memory detail caches with a configurable TTL (default 5 minutes).
//! - A 404 on an episode lookup maps to `None`; any other non-2xx is an error.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{Quota, RateLimiter};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::meta::source::Source;
use crate::meta::{
    CastMember, Common, Episode, Image, ImageKind, Kind, Metadata, MovieOrSeries, Query,
};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/";
/// Default language preference (BCP-47).
pub const DEFAULT_LANGUAGE: &str = "en-US";
/// Default detail cache TTL.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// TMDB API response types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct MultiResult {
    id: Option<u64>,
    media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdResult {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct GenreEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LanguageEntry {
    iso_639_1: String,
}

#[derive(Debug, Deserialize)]
struct CountryEntry {
    iso_3166_1: String,
}

#[derive(Debug, Deserialize)]
struct MovieDetail {
    title: Option<String>,
    original_title: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    vote_average: Option<f64>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    genres: Option<Vec<GenreEntry>>,
    spoken_languages: Option<Vec<LanguageEntry>>,
    production_countries: Option<Vec<CountryEntry>>,
}

#[derive(Debug, Deserialize)]
struct TvDetail {
    name: Option<String>,
    original_name: Option<String>,
    overview: Option<String>,
    first_air_date: Option<String>,
    vote_average: Option<f64>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    genres: Option<Vec<GenreEntry>>,
    spoken_languages: Option<Vec<LanguageEntry>>,
    production_countries: Option<Vec<CountryEntry>>,
}

#[derive(Debug, Deserialize)]
struct EpisodeDetail {
    name: Option<String>,
    overview: Option<String>,
    air_date: Option<String>,
    vote_average: Option<f64>,
    still_path: Option<String>,
    season_number: Option<u32>,
    episode_number: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CreditsResponse {
    #[serde(default = "Vec::new")]
    cast: Vec<CastEntry>,
}

#[derive(Debug, Deserialize)]
struct CastEntry {
    name: String,
    character: Option<String>,
    profile_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigurationResponse {
    images: ImageConfiguration,
}

#[derive(Debug, Deserialize)]
struct ImageConfiguration {
    secure_base_url: String,
}

// ---------------------------------------------------------------------------
// Source implementation
// ---------------------------------------------------------------------------

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

struct CacheEntry {
    at: Instant,
    value: MovieOrSeries,
}

struct EpisodeCacheEntry {
    at: Instant,
    value: Episode,
}

/// A metadata source backed by The Movie Database.
pub struct TmdbSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    language: String,
    cache_ttl: Duration,
    limiter: DirectLimiter,

    image_base: Mutex<Option<Arc<String>>>,
    detail_cache: Mutex<HashMap<(Kind, u64), CacheEntry>>,
    episode_cache: Mutex<HashMap<(u64, u32, u32), EpisodeCacheEntry>>,
}

impl TmdbSource {
    /// Create a new source with the given API key and language preference.
    pub fn new(api_key: impl Into<String>, language: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        let quota = Quota::per_second(NonZeroU32::new(4).unwrap());

        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            language: language.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            limiter: RateLimiter::direct(quota),
            image_base: Mutex::new(None),
            detail_cache: Mutex::new(HashMap::new()),
            episode_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the detail cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/3/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Execute a GET request with the API key and language attached, rate
    /// limited and retried on 429. Status codes are left to the caller.
    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<reqwest::Response> {
        let url = self.url(path);
        let mut retries = 0u32;
        loop {
            self.limiter.until_ready().await;

            let resp = self
                .client
                .get(&url)
                .query(&[
                    ("api_key", self.api_key.as_str()),
                    ("language", self.language.as_str()),
                ])
                .query(params)
                .send()
                .await
                .map_err(|e| Error::Source(format!("request to {path} failed: {e}")))?;

            if resp.status() == StatusCode::TOO_MANY_REQUESTS && retries < MAX_RETRIES {
                retries += 1;
                let wait = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1);
                warn!(retry = retries, wait_secs = wait, "TMDB returned 429, backing off");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            return Ok(resp);
        }
    }

    /// Execute a GET request and deserialize a 2xx JSON body.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let resp = self.get(path, params).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Source(format!("non-2xx status {status} from {path}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| Error::Source(format!("malformed response from {path}: {e}")))
    }

    /// The image base URL from the configuration endpoint, fetched once.
    async fn image_base(&self) -> Result<Arc<String>> {
        if let Some(base) = self.image_base.lock().clone() {
            return Ok(base);
        }

        let config: ConfigurationResponse = self.get_json("configuration", &[]).await?;
        let base = Arc::new(format!("{}original", config.images.secure_base_url));
        *self.image_base.lock() = Some(base.clone());
        Ok(base)
    }

    fn cached_detail(&self, key: (Kind, u64)) -> Option<MovieOrSeries> {
        let cache = self.detail_cache.lock();
        cache
            .get(&key)
            .filter(|e| e.at.elapsed() < self.cache_ttl)
            .map(|e| e.value.clone())
    }

    fn cache_detail(&self, key: (Kind, u64), value: &MovieOrSeries) {
        self.detail_cache.lock().insert(
            key,
            CacheEntry {
                at: Instant::now(),
                value: value.clone(),
            },
        );
    }

    async fn search_multi(&self, text: &str) -> Result<Option<Metadata>> {
        let res: SearchResponse<MultiResult> =
            self.get_json("search/multi", &[("query", text)]).await?;

        for result in res.results {
            let Some(id) = result.id else { continue };
            match result.media_type.as_deref() {
                Some("movie") => return Ok(Some(Metadata::Movie(self.fetch_movie(id).await?))),
                Some("tv") => return Ok(Some(Metadata::Series(self.fetch_series(id).await?))),
                _ => continue,
            }
        }

        Ok(None)
    }

    async fn search_movie(&self, text: &str) -> Result<Option<Metadata>> {
        let res: SearchResponse<IdResult> =
            self.get_json("search/movie", &[("query", text)]).await?;

        match res.results.first() {
            Some(first) => Ok(Some(Metadata::Movie(self.fetch_movie(first.id).await?))),
            None => Ok(None),
        }
    }

    async fn search_series(
        &self,
        text: &str,
        episode: Option<(u32, u32)>,
    ) -> Result<Option<Metadata>> {
        let res: SearchResponse<IdResult> = self.get_json("search/tv", &[("query", text)]).await?;

        let Some(first) = res.results.first() else {
            return Ok(None);
        };

        match episode {
            Some((season, episode)) => self.fetch_episode(first.id, season, episode).await,
            None => Ok(Some(Metadata::Series(self.fetch_series(first.id).await?))),
        }
    }

    async fn fetch_movie(&self, id: u64) -> Result<MovieOrSeries> {
        if let Some(cached) = self.cached_detail((Kind::Movie, id)) {
            return Ok(cached);
        }

        let detail: MovieDetail = self.get_json(&format!("movie/{id}"), &[]).await?;
        let credits: CreditsResponse = self.get_json(&format!("movie/{id}/credits"), &[]).await?;
        let image_base = self.image_base().await?;

        let meta = MovieOrSeries {
            common: Common {
                title: detail.title.unwrap_or_default(),
                original_title: detail.original_title.unwrap_or_default(),
                overview: detail.overview.unwrap_or_default(),
                release_date: parse_date(detail.release_date.as_deref()),
                vote_rating: normalize_rating(detail.vote_average),
                images: poster_backdrop(
                    &image_base,
                    detail.poster_path.as_deref(),
                    detail.backdrop_path.as_deref(),
                ),
            },
            genres: detail
                .genres
                .unwrap_or_default()
                .into_iter()
                .map(|g| g.name)
                .collect(),
            cast: map_cast(&image_base, credits.cast),
            languages: detail
                .spoken_languages
                .unwrap_or_default()
                .into_iter()
                .map(|l| l.iso_639_1)
                .collect(),
            countries: detail
                .production_countries
                .unwrap_or_default()
                .into_iter()
                .map(|c| c.iso_3166_1)
                .collect(),
        };

        self.cache_detail((Kind::Movie, id), &meta);
        Ok(meta)
    }

    async fn fetch_series(&self, id: u64) -> Result<MovieOrSeries> {
        if let Some(cached) = self.cached_detail((Kind::Series, id)) {
            return Ok(cached);
        }

        let detail: TvDetail = self.get_json(&format!("tv/{id}"), &[]).await?;
        let credits: CreditsResponse = self.get_json(&format!("tv/{id}/credits"), &[]).await?;
        let image_base = self.image_base().await?;

        let meta = MovieOrSeries {
            common: Common {
                title: detail.name.unwrap_or_default(),
                original_title: detail.original_name.unwrap_or_default(),
                overview: detail.overview.unwrap_or_default(),
                release_date: parse_date(detail.first_air_date.as_deref()),
                vote_rating: normalize_rating(detail.vote_average),
                images: poster_backdrop(
                    &image_base,
                    detail.poster_path.as_deref(),
                    detail.backdrop_path.as_deref(),
                ),
            },
            genres: detail
                .genres
                .unwrap_or_default()
                .into_iter()
                .map(|g| g.name)
                .collect(),
            cast: map_cast(&image_base, credits.cast),
            languages: detail
                .spoken_languages
                .unwrap_or_default()
                .into_iter()
                .map(|l| l.iso_639_1)
                .collect(),
            countries: detail
                .production_countries
                .unwrap_or_default()
                .into_iter()
                .map(|c| c.iso_3166_1)
                .collect(),
        };

        self.cache_detail((Kind::Series, id), &meta);
        Ok(meta)
    }

    async fn fetch_episode(&self, id: u64, season: u32, episode: u32) -> Result<Option<Metadata>> {
        {
            let cache = self.episode_cache.lock();
            if let Some(entry) = cache.get(&(id, season, episode)) {
                if entry.at.elapsed() < self.cache_ttl {
                    return Ok(Some(Metadata::Episode(entry.value.clone())));
                }
            }
        }

        let series = self.fetch_series(id).await?;

        let path = format!("tv/{id}/season/{season}/episode/{episode}");
        let resp = self.get(&path, &[]).await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            // No such season/episode combination for this series.
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::Source(format!("non-2xx status {status} from {path}")));
        }

        let detail: EpisodeDetail = resp
            .json()
            .await
            .map_err(|e| Error::Source(format!("malformed response from {path}: {e}")))?;
        let image_base = self.image_base().await?;

        let mut images = Vec::new();
        if let Some(still) = detail.still_path.as_deref() {
            images.push(remote_image(&image_base, ImageKind::Still, still, "Still"));
        }

        let value = Episode {
            common: Common {
                title: detail.name.unwrap_or_default(),
                original_title: String::new(),
                overview: detail.overview.unwrap_or_default(),
                release_date: parse_date(detail.air_date.as_deref()),
                vote_rating: normalize_rating(detail.vote_average),
                images,
            },
            series,
            season: detail.season_number.unwrap_or(season),
            episode: detail.episode_number.unwrap_or(episode),
        };

        self.episode_cache.lock().insert(
            (id, season, episode),
            EpisodeCacheEntry {
                at: Instant::now(),
                value: value.clone(),
            },
        );

        Ok(Some(Metadata::Episode(value)))
    }
}

#[async_trait]
impl Source for TmdbSource {
    async fn from_file(&self, path: &Path) -> Result<Option<Metadata>> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        self.from_query(&Query {
            text: stem.to_string(),
            ..Query::default()
        })
        .await
    }

    async fn from_query(&self, query: &Query) -> Result<Option<Metadata>> {
        match query.kind {
            Kind::Movie => self.search_movie(&query.text).await,
            Kind::Series | Kind::Episode => {
                self.search_series(&query.text, query.episode_pair()).await
            }
            Kind::Unknown => self.search_multi(&query.text).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Mapping helpers
// ---------------------------------------------------------------------------

fn parse_date(s: Option<&str>) -> Option<NaiveDate> {
    s.filter(|s| !s.is_empty())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

/// TMDB rates on a 0-10 scale; the model uses [0, 1]. Unrated entries count
/// as fully rated.
fn normalize_rating(vote_average: Option<f64>) -> f32 {
    (vote_average.unwrap_or(10.0) / 10.0).clamp(0.0, 1.0) as f32
}

fn remote_image(base: &str, kind: ImageKind, path: &str, description: &str) -> Image {
    Image {
        kind,
        path: format!("{base}{path}"),
        remote: true,
        description: description.to_string(),
    }
}

fn poster_backdrop(base: &str, poster: Option<&str>, backdrop: Option<&str>) -> Vec<Image> {
    let mut images = Vec::new();
    if let Some(p) = poster {
        images.push(remote_image(base, ImageKind::Poster, p, "Poster"));
    }
    if let Some(b) = backdrop {
        images.push(remote_image(base, ImageKind::Backdrop, b, "Backdrop"));
    }
    images
}

fn map_cast(base: &str, cast: Vec<CastEntry>) -> Vec<CastMember> {
    cast.into_iter()
        .map(|c| {
            // Cast portraits are described by the member's name.
            let image = c
                .profile_path
                .as_deref()
                .map(|p| remote_image(base, ImageKind::Avatar, p, &c.name));

            CastMember {
                name: c.name,
                role: c.character.unwrap_or_default(),
                image,
            }
        })
        .collect()
}
