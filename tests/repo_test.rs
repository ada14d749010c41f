//! Integration tests for the base repository: scanning, lookup, mutation.

mod common;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use reelvault::media::Media;
use reelvault::meta::source::LiteralSource;
use reelvault::repo::{Capability, CrudRepository, Repository};
use reelvault::Error;

use common::{literal_repo, write_mkv};

#[tokio::test]
async fn scan_and_list() {
    let dir = tempfile::tempdir().unwrap();
    write_mkv(dir.path(), "Bocchi.mkv", &[1u8; 64]);
    std::fs::write(dir.path().join("notes.txt"), "just notes").unwrap();

    let repo = literal_repo("test", dir.path());
    repo.scan().await.unwrap();

    let items = repo.items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "bocchi-mkv");
    assert_eq!(items[0].mime, "video/x-matroska");

    let media = repo.get("bocchi-mkv").await.unwrap();
    assert_eq!(media.meta.as_ref().unwrap().title(), "Bocchi");
}

#[tokio::test]
async fn scan_skips_dot_entries() {
    let dir = tempfile::tempdir().unwrap();
    write_mkv(dir.path(), "visible.mkv", &[1u8; 16]);
    write_mkv(dir.path(), ".hidden.mkv", &[2u8; 16]);

    let nested = dir.path().join(".cache");
    std::fs::create_dir(&nested).unwrap();
    write_mkv(&nested, "inner.mkv", &[3u8; 16]);

    let repo = literal_repo("test", dir.path());
    repo.scan().await.unwrap();

    let items = repo.items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "visible-mkv");
}

#[tokio::test]
async fn scan_descends_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    let season = dir.path().join("Season 1");
    std::fs::create_dir(&season).unwrap();
    write_mkv(&season, "Episode 1.mkv", &[1u8; 16]);

    let repo = literal_repo("test", dir.path());
    repo.scan().await.unwrap();

    let media = repo.get("episode-1-mkv").await.unwrap();
    assert_eq!(media.path, season.join("Episode 1.mkv"));
}

#[tokio::test]
async fn scan_skips_colliding_ids() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    std::fs::create_dir_all(&a).unwrap();
    std::fs::create_dir_all(&b).unwrap();
    write_mkv(&a, "Same.mkv", &[1u8; 16]);
    write_mkv(&b, "Same.mkv", &[2u8; 16]);

    let repo = literal_repo("test", dir.path());
    repo.scan().await.unwrap();

    // One of the two wins; both indices stay consistent.
    let items = repo.items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "same-mkv");
}

#[tokio::test]
async fn scan_is_incremental() {
    let dir = tempfile::tempdir().unwrap();
    write_mkv(dir.path(), "First.mkv", &[1u8; 16]);

    let repo = literal_repo("test", dir.path());
    repo.scan().await.unwrap();
    assert_eq!(repo.items().await.len(), 1);

    write_mkv(dir.path(), "Second.mkv", &[2u8; 16]);
    repo.scan().await.unwrap();

    let ids: HashSet<String> = repo.items().await.into_iter().map(|m| m.id).collect();
    assert_eq!(ids, HashSet::from(["first-mkv".into(), "second-mkv".into()]));
}

#[tokio::test]
async fn find_accepts_absolute_and_relative() {
    let dir = tempfile::tempdir().unwrap();
    let abs = write_mkv(dir.path(), "Bocchi.mkv", &[1u8; 16]);

    let repo = literal_repo("test", dir.path());
    repo.scan().await.unwrap();

    assert!(repo.find(&abs).await.is_some());
    assert!(repo.find(Path::new("Bocchi.mkv")).await.is_some());
    assert!(repo.find(Path::new("/elsewhere/Bocchi.mkv")).await.is_none());
    assert!(repo.find(Path::new("Missing.mkv")).await.is_none());
}

#[tokio::test]
async fn add_validates() {
    let dir = tempfile::tempdir().unwrap();
    let repo = literal_repo("test", dir.path());

    let err = repo
        .add(Media::new(
            "Bad ID",
            dir.path().join("a.mkv"),
            "video/x-matroska",
            None,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidId { .. }));

    let err = repo
        .add(Media::new(
            "a",
            dir.path().join("a.txt"),
            "text/plain",
            None,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidMediaType { .. }));

    let err = repo
        .add(Media::new(
            "a",
            Path::new("/outside/a.mkv"),
            "video/x-matroska",
            None,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidMediaPath { .. }));
}

#[tokio::test]
async fn add_rejects_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let repo = literal_repo("test", dir.path());

    repo.add(Media::new(
        "a",
        dir.path().join("a.mkv"),
        "video/x-matroska",
        None,
    ))
    .await
    .unwrap();

    let err = repo
        .add(Media::new(
            "a",
            dir.path().join("other.mkv"),
            "video/x-matroska",
            None,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateId { .. }));

    let err = repo
        .add(Media::new(
            "b",
            dir.path().join("a.mkv"),
            "video/x-matroska",
            None,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicatePath { .. }));
}

#[tokio::test]
async fn add_path_reports_invalid_type() {
    let dir = tempfile::tempdir().unwrap();
    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "plain text").unwrap();

    let repo = literal_repo("test", dir.path());
    let err = repo.add_path(&notes).await.unwrap_err();
    assert!(matches!(err, Error::InvalidMediaType { .. }));
}

#[tokio::test]
async fn remove_restores_prior_set() {
    let dir = tempfile::tempdir().unwrap();
    write_mkv(dir.path(), "Keep.mkv", &[1u8; 16]);

    let repo = literal_repo("test", dir.path());
    repo.scan().await.unwrap();
    let before: HashSet<String> = repo.items().await.into_iter().map(|m| m.id).collect();

    let added = write_mkv(dir.path(), "Extra.mkv", &[2u8; 16]);
    repo.add_path(&added).await.unwrap();
    assert_eq!(repo.items().await.len(), 2);

    let media = repo.get("extra-mkv").await.unwrap();
    repo.remove(&media).await.unwrap();

    let after: HashSet<String> = repo.items().await.into_iter().map(|m| m.id).collect();
    assert_eq!(before, after);

    // Removal is idempotent.
    repo.remove(&media).await.unwrap();
    repo.remove_path(&added).await.unwrap();
    assert_eq!(repo.items().await.len(), 1);
}

#[tokio::test]
async fn base_has_no_capabilities() {
    let dir = tempfile::tempdir().unwrap();
    let repo = literal_repo("test", dir.path());

    assert_eq!(repo.capabilities(), Capability::NONE);
    let err = repo
        .remux("anything", &reelvault::media::format::MKV)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation { .. }));
}

#[tokio::test]
async fn invalid_repo_id_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = CrudRepository::new("Bad Repo", "Bad", dir.path(), Arc::new(LiteralSource))
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidId { .. }));
}
