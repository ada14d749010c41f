//! HTTP server: repository composition and the REST surface.

pub mod error;
pub mod routes;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::av::{FfmpegRemuxer, ToolRegistry};
use crate::config::{CapabilityId, Config, SourcesConfig};
use crate::meta::source::{CompositeSource, DummySource, FileAnalysisSource, LiteralSource, Source};
use crate::meta::tmdb::TmdbSource;
use crate::repo::index::IndexedRepository;
use crate::repo::mux::MuxRepository;
use crate::repo::watch::WatchedRepository;
use crate::repo::{Capability, CrudRepository, Repository};
use crate::server::error::AppError;

/// Shared state of the REST surface: the composed repositories.
#[derive(Clone)]
pub struct AppState {
    pub repos: Arc<HashMap<String, Arc<dyn Repository>>>,
}

impl AppState {
    pub fn new(repos: HashMap<String, Arc<dyn Repository>>) -> Self {
        Self {
            repos: Arc::new(repos),
        }
    }

    fn repo(&self, id: &str) -> Result<&Arc<dyn Repository>, AppError> {
        self.repos
            .get(id)
            .ok_or_else(|| AppError::not_found("repository"))
    }

    /// Close every repository exactly once, logging failures.
    pub async fn close_all(&self) {
        for (id, repo) in self.repos.iter() {
            if let Err(e) = repo.close().await {
                error!(repo = %id, error = %e, "failed to close repository");
            }
        }
    }
}

/// Build the composed metadata source for a source table.
///
/// Children compose most-specific-first: analysis, tmdb, literal. An empty
/// table yields the dummy source.
pub fn build_source(config: &SourcesConfig) -> Arc<dyn Source> {
    let mut sources: Vec<Arc<dyn Source>> = Vec::new();

    if let Some(nested) = &config.analysis {
        sources.push(Arc::new(FileAnalysisSource::new(build_source(nested))));
    }
    if let Some(tmdb) = &config.tmdb {
        sources.push(Arc::new(
            TmdbSource::new(&tmdb.key, &tmdb.lang)
                .with_base_url(&tmdb.url)
                .with_cache_ttl(Duration::from_secs(tmdb.cache_exp_seconds)),
        ));
    }
    if config.literal.is_some() {
        sources.push(Arc::new(LiteralSource));
    }

    match sources.len() {
        0 => Arc::new(DummySource),
        1 => sources.remove(0),
        _ => Arc::new(CompositeSource::new(sources)),
    }
}

/// Compose every configured repository (base, then mux, index and watch
/// layers as configured) and run its initial scan.
pub async fn build_repositories(
    config: &Config,
    tools: &ToolRegistry,
) -> anyhow::Result<HashMap<String, Arc<dyn Repository>>> {
    let mut repos: HashMap<String, Arc<dyn Repository>> = HashMap::new();

    for (id, repo_config) in &config.repos {
        let source = build_source(&repo_config.sources);
        let name = if repo_config.name.is_empty() {
            id.clone()
        } else {
            repo_config.name.clone()
        };

        let mut repo: Arc<dyn Repository> = Arc::new(
            CrudRepository::new(id.clone(), name, &repo_config.path, source)
                .with_context(|| format!("failed to create repository {id}"))?,
        );

        let mut mux_caps = Capability::NONE;
        if repo_config.capable(CapabilityId::Remux) {
            mux_caps |= Capability::REMUX;
        }
        if repo_config.capable(CapabilityId::Transcode) {
            mux_caps |= Capability::TRANSCODE;
        }
        if mux_caps != Capability::NONE {
            let Some(cache_path) = &repo_config.cache_path else {
                bail!("repository {id} has mux capabilities but no cache_path");
            };

            let remuxer = Arc::new(FfmpegRemuxer::new(tools.clone()));
            repo = Arc::new(
                MuxRepository::new(repo, mux_caps, cache_path, remuxer)
                    .with_context(|| format!("failed to create mux repository {id}"))?,
            );
        }

        if let Some(index_path) = &repo_config.index_path {
            repo = Arc::new(
                IndexedRepository::open(repo, index_path)
                    .await
                    .with_context(|| format!("failed to create indexed repository {id}"))?,
            );
        }

        if repo_config.capable(CapabilityId::Watch) {
            repo = WatchedRepository::new(repo)
                .with_context(|| format!("failed to create watched repository {id}"))?;
        }

        repo.scan()
            .await
            .with_context(|| format!("failed to scan repository {id}"))?;

        info!(
            repo = %id,
            path = %repo.root().display(),
            capabilities = %repo.capabilities(),
            "configured repository"
        );
        repos.insert(id.clone(), repo);
    }

    Ok(repos)
}

/// Build the REST router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/repos", get(routes::list_repos))
        .route("/repos/:id", get(routes::get_repo))
        .route("/repos/:id/media", get(routes::list_media))
        .route("/repos/:repo_id/media/:media_id", get(routes::get_media))
        .route(
            "/repos/:repo_id/media/:media_id/stream/:format",
            get(routes::stream_media),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
