//! Tests for the TMDB source against a mock API server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use reelvault::meta::source::Source;
use reelvault::meta::tmdb::TmdbSource;
use reelvault::meta::{Kind, Metadata};

#[derive(Clone, Default)]
struct MockState {
    detail_hits: Arc<AtomicUsize>,
}

async fn configuration() -> Json<serde_json::Value> {
    Json(json!({"images": {"secure_base_url": "https://img.example/t/p/"}}))
}

async fn search_multi(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    assert!(params.contains_key("api_key"));
    assert!(params.contains_key("language"));

    if params["query"].contains("Matrix") {
        Json(json!({"results": [
            {"id": 42, "media_type": "person"},
            {"id": 603, "media_type": "movie"}
        ]}))
    } else {
        Json(json!({"results": []}))
    }
}

async fn search_tv(Query(params): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    if params["query"].contains("chicago") {
        Json(json!({"results": [{"id": 100}]}))
    } else {
        Json(json!({"results": []}))
    }
}

async fn movie_detail(State(state): State<MockState>, Path(id): Path<u64>) -> Json<serde_json::Value> {
    state.detail_hits.fetch_add(1, Ordering::SeqCst);
    assert_eq!(id, 603);

    Json(json!({
        "id": 603,
        "title": "The Matrix",
        "original_title": "The Matrix",
        "overview": "A hacker learns the truth.",
        "release_date": "1999-03-30",
        "vote_average": 8.7,
        "poster_path": "/poster.jpg",
        "backdrop_path": "/backdrop.jpg",
        "genres": [{"id": 28, "name": "Action"}, {"id": 878, "name": "Science Fiction"}],
        "spoken_languages": [{"iso_639_1": "en"}],
        "production_countries": [{"iso_3166_1": "US"}]
    }))
}

async fn movie_credits() -> Json<serde_json::Value> {
    Json(json!({"cast": [
        {"name": "Keanu Reeves", "character": "Neo", "profile_path": "/keanu.jpg"},
        {"name": "Carrie-Anne Moss", "character": "Trinity", "profile_path": null}
    ]}))
}

async fn tv_detail(State(state): State<MockState>) -> Json<serde_json::Value> {
    state.detail_hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "id": 100,
        "name": "Chicago Med",
        "original_name": "Chicago Med",
        "overview": "Emergency department drama.",
        "first_air_date": "2015-11-17",
        "vote_average": 8.2,
        "poster_path": "/med.jpg",
        "genres": [{"id": 18, "name": "Drama"}]
    }))
}

async fn tv_credits() -> Json<serde_json::Value> {
    Json(json!({"cast": []}))
}

async fn episode_detail(
    Path((id, season, episode)): Path<(u64, u32, u32)>,
) -> impl IntoResponse {
    assert_eq!(id, 100);
    if (season, episode) != (6, 9) {
        return (StatusCode::NOT_FOUND, Json(json!({"status_code": 34}))).into_response();
    }

    Json(json!({
        "name": "For the Want of a Nail",
        "overview": "An ethics dilemma.",
        "air_date": "2021-01-06",
        "vote_average": 7.8,
        "still_path": "/still.jpg",
        "season_number": 6,
        "episode_number": 9
    }))
    .into_response()
}

async fn mock_server() -> (SocketAddr, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/3/configuration", get(configuration))
        .route("/3/search/multi", get(search_multi))
        .route("/3/search/tv", get(search_tv))
        .route("/3/movie/:id", get(movie_detail))
        .route("/3/movie/:id/credits", get(movie_credits))
        .route("/3/tv/:id", get(tv_detail))
        .route("/3/tv/:id/credits", get(tv_credits))
        .route("/3/tv/:id/season/:season/episode/:episode", get(episode_detail))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    (addr, state)
}

fn source(addr: SocketAddr) -> TmdbSource {
    TmdbSource::new("test-key", "en-US").with_base_url(format!("http://{addr}/"))
}

#[tokio::test]
async fn multi_search_resolves_movies() {
    let (addr, _state) = mock_server().await;
    let source = source(addr);

    let meta = source
        .from_file(std::path::Path::new("/media/The Matrix.mkv"))
        .await
        .unwrap()
        .expect("expected a match");

    let Metadata::Movie(movie) = meta else {
        panic!("expected movie metadata");
    };
    assert_eq!(movie.common.title, "The Matrix");
    assert_eq!(
        movie.common.release_date,
        chrono::NaiveDate::from_ymd_opt(1999, 3, 30)
    );
    assert!((movie.common.vote_rating - 0.87).abs() < 1e-6);
    assert_eq!(movie.genres, vec!["Action", "Science Fiction"]);
    assert_eq!(movie.languages, vec!["en"]);
    assert_eq!(movie.countries, vec!["US"]);

    // Images resolve against the configured image base.
    assert_eq!(movie.common.images.len(), 2);
    assert_eq!(
        movie.common.images[0].path,
        "https://img.example/t/p/original/poster.jpg"
    );
    assert!(movie.common.images[0].remote);
    assert_eq!(movie.common.images[0].description, "Poster");
    assert_eq!(movie.common.images[1].description, "Backdrop");

    // Cast portraits are optional and described by the member's name.
    assert_eq!(movie.cast.len(), 2);
    assert_eq!(movie.cast[0].role, "Neo");
    let portrait = movie.cast[0].image.as_ref().unwrap();
    assert_eq!(portrait.description, "Keanu Reeves");
    assert!(movie.cast[1].image.is_none());
}

#[tokio::test]
async fn no_results_is_none() {
    let (addr, _state) = mock_server().await;
    let source = source(addr);

    let meta = source
        .from_query(&reelvault::meta::Query {
            text: "completely unknown".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(meta.is_none());
}

#[tokio::test]
async fn episode_lookup_wraps_the_series() {
    let (addr, _state) = mock_server().await;
    let source = source(addr);

    let meta = source
        .from_query(&reelvault::meta::Query {
            text: "chicago med".into(),
            kind: Kind::Episode,
            season: Some(6),
            episode: Some(9),
        })
        .await
        .unwrap()
        .expect("expected a match");

    let Metadata::Episode(episode) = meta else {
        panic!("expected episode metadata");
    };
    assert_eq!(episode.common.title, "For the Want of a Nail");
    assert_eq!((episode.season, episode.episode), (6, 9));
    assert_eq!(episode.series.common.title, "Chicago Med");
    assert_eq!(episode.common.images.len(), 1);
    assert_eq!(
        episode.common.images[0].path,
        "https://img.example/t/p/original/still.jpg"
    );
    assert_eq!(episode.common.images[0].description, "Still");
}

#[tokio::test]
async fn missing_episode_is_none_not_an_error() {
    let (addr, _state) = mock_server().await;
    let source = source(addr);

    let meta = source
        .from_query(&reelvault::meta::Query {
            text: "chicago med".into(),
            kind: Kind::Episode,
            season: Some(6),
            episode: Some(99),
        })
        .await
        .unwrap();
    assert!(meta.is_none());
}

#[tokio::test]
async fn details_are_cached_within_the_ttl() {
    let (addr, state) = mock_server().await;
    let source = source(addr);

    let query = reelvault::meta::Query {
        text: "The Matrix".into(),
        ..Default::default()
    };

    source.from_query(&query).await.unwrap().unwrap();
    source.from_query(&query).await.unwrap().unwrap();

    assert_eq!(
        state.detail_hits.load(Ordering::SeqCst),
        1,
        "the second lookup must come from the cache"
    );
}
