//! Integration tests for the index decorator: persistence round-trips and
//! crash safety.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use reelvault::repo::index::IndexedRepository;
use reelvault::repo::{Capability, Repository};

use common::{literal_repo, write_mkv};

async fn indexed(
    repo_dir: &std::path::Path,
    index_path: &std::path::Path,
) -> Arc<IndexedRepository> {
    let base = literal_repo("test", repo_dir);
    Arc::new(IndexedRepository::open(base, index_path).await.unwrap())
}

#[tokio::test]
async fn capability_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let repo = indexed(&dir.path().join("media"), &dir.path().join("index.json")).await;
    assert!(repo.capabilities().has(Capability::INDEX));
}

#[tokio::test]
async fn save_and_reload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let media_dir = dir.path().join("media");
    std::fs::create_dir(&media_dir).unwrap();
    write_mkv(&media_dir, "One.mkv", &[1u8; 16]);
    write_mkv(&media_dir, "Two.mkv", &[2u8; 16]);

    let index_path = dir.path().join("index.json");

    let repo = indexed(&media_dir, &index_path).await;
    repo.scan().await.unwrap();
    let before: HashSet<String> = repo.items().await.into_iter().map(|m| m.id).collect();
    assert_eq!(before.len(), 2);
    assert!(index_path.exists());

    // A fresh base repository hydrated purely from the index file.
    let reloaded = indexed(&media_dir, &index_path).await;
    let after: HashSet<String> = reloaded.items().await.into_iter().map(|m| m.id).collect();
    assert_eq!(before, after);

    let one = reloaded.get("one-mkv").await.unwrap();
    assert!(one.path.is_absolute());
    assert_eq!(one.path, media_dir.join("One.mkv"));
    assert_eq!(one.meta.as_ref().unwrap().title(), "One");
}

#[tokio::test]
async fn index_file_stores_relative_paths() {
    let dir = tempfile::tempdir().unwrap();
    let media_dir = dir.path().join("media");
    let nested = media_dir.join("shows");
    std::fs::create_dir_all(&nested).unwrap();
    write_mkv(&nested, "Ep.mkv", &[1u8; 16]);

    let index_path = dir.path().join("index.json");
    let repo = indexed(&media_dir, &index_path).await;
    repo.scan().await.unwrap();

    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&index_path).unwrap()).unwrap();
    let items = json["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["path"], "shows/Ep.mkv");
    assert_eq!(items[0]["mime"], "video/x-matroska");
    assert_eq!(items[0]["meta"]["type"], "unknown");
}

#[tokio::test]
async fn missing_files_are_skipped_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let media_dir = dir.path().join("media");
    std::fs::create_dir(&media_dir).unwrap();
    write_mkv(&media_dir, "Keep.mkv", &[1u8; 16]);
    let gone = write_mkv(&media_dir, "Gone.mkv", &[2u8; 16]);

    let index_path = dir.path().join("index.json");
    let repo = indexed(&media_dir, &index_path).await;
    repo.scan().await.unwrap();
    assert_eq!(repo.items().await.len(), 2);

    std::fs::remove_file(&gone).unwrap();

    let reloaded = indexed(&media_dir, &index_path).await;
    let ids: Vec<String> = reloaded.items().await.into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["keep-mkv".to_string()]);
}

#[tokio::test]
async fn old_file_is_the_previous_committed_version() {
    let dir = tempfile::tempdir().unwrap();
    let media_dir = dir.path().join("media");
    std::fs::create_dir(&media_dir).unwrap();
    write_mkv(&media_dir, "One.mkv", &[1u8; 16]);

    let index_path = dir.path().join("index.json");
    let old_path = dir.path().join("index.json.old");

    let repo = indexed(&media_dir, &index_path).await;
    repo.scan().await.unwrap();
    let first_save = std::fs::read(&index_path).unwrap();
    assert!(!old_path.exists(), "no backup before the second save");

    let two = write_mkv(&media_dir, "Two.mkv", &[2u8; 16]);
    repo.add_path(&two).await.unwrap();

    // Both generations parse, and .old is exactly the previous version.
    let current: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&index_path).unwrap()).unwrap();
    assert_eq!(current["items"].as_array().unwrap().len(), 2);
    assert_eq!(std::fs::read(&old_path).unwrap(), first_save);

    // Crash recovery: promote the backup back into place.
    std::fs::remove_file(&index_path).unwrap();
    std::fs::rename(&old_path, &index_path).unwrap();

    let recovered = indexed(&media_dir, &index_path).await;
    let ids: Vec<String> = recovered.items().await.into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["one-mkv".to_string()]);
}

#[tokio::test]
async fn mutations_save_eagerly() {
    let dir = tempfile::tempdir().unwrap();
    let media_dir = dir.path().join("media");
    std::fs::create_dir(&media_dir).unwrap();
    let one = write_mkv(&media_dir, "One.mkv", &[1u8; 16]);

    let index_path = dir.path().join("index.json");
    let repo = indexed(&media_dir, &index_path).await;

    repo.add_path(&one).await.unwrap();
    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&index_path).unwrap()).unwrap();
    assert_eq!(json["items"].as_array().unwrap().len(), 1);

    repo.remove_path(&one).await.unwrap();
    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&index_path).unwrap()).unwrap();
    assert_eq!(json["items"].as_array().unwrap().len(), 0);
}
