use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stagecraft_store::{HistoryStoreConfig, MediaBlob, ResultsHistoryStore, StoredResult};
use tempfile::TempDir;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct ScanResult {
    score: u32,
    label: String,
}

fn scan_result(score: u32) -> ScanResult {
    ScanResult { score, label: format!("score {score}") }
}

fn config(dir: &TempDir, max_results: usize) -> HistoryStoreConfig {
    HistoryStoreConfig::new(dir.path().join("history"), "scan").with_max_results(max_results)
}

async fn open(dir: &TempDir, max_results: usize) -> ResultsHistoryStore<ScanResult> {
    ResultsHistoryStore::open(config(dir, max_results)).await.expect("open history store")
}

fn scores(results: &[StoredResult<ScanResult>]) -> Vec<u32> {
    results.iter().map(|entry| entry.result.score).collect()
}

#[tokio::test]
async fn newest_first_with_eviction_of_the_oldest() {
    let dir = TempDir::new().expect("temp dir");
    let store = open(&dir, 2).await;

    let mut saved = Vec::new();
    for score in [70, 80, 90] {
        let blob = MediaBlob::image(format!("photo-{score}")).with_thumbnail("thumb");
        saved.push(store.save(scan_result(score), vec![blob]).await.expect("saved"));
    }

    assert_eq!(scores(&store.results().await), vec![90, 80]);
    for name in saved[0].media_file_names() {
        assert!(!store.media_file_exists(name), "{name} should be gone");
    }
    for name in saved[1].media_file_names().chain(saved[2].media_file_names()) {
        assert!(store.media_file_exists(name), "{name} should remain");
    }
    assert_eq!(store.latest().await.map(|entry| entry.result.score), Some(90));
}

#[tokio::test]
async fn cap_holds_after_many_saves_and_reopen() {
    let dir = TempDir::new().expect("temp dir");
    let max_results = 4;
    let store = open(&dir, max_results).await;

    let mut saved = Vec::new();
    for score in 0..(max_results as u32 + 5) {
        let blob = MediaBlob::image(vec![score as u8]);
        saved.push(store.save(scan_result(score), vec![blob]).await.expect("saved"));
    }

    assert_eq!(store.len().await, max_results);
    assert_eq!(scores(&store.results().await), vec![8, 7, 6, 5]);
    for evicted in &saved[..5] {
        for name in evicted.media_file_names() {
            assert!(!store.media_file_exists(name));
        }
    }
    drop(store);

    let reopened = open(&dir, max_results).await;
    assert_eq!(scores(&reopened.results().await), vec![8, 7, 6, 5]);
    let newest = reopened.latest().await.expect("latest");
    assert_eq!(reopened.load_media(&newest, 0).await, Some(vec![8]));
}

#[tokio::test]
async fn delete_removes_entry_and_media() {
    let dir = TempDir::new().expect("temp dir");
    let store = open(&dir, 10).await;

    let kept = store.save(scan_result(60), Vec::new()).await.expect("saved");
    let doomed = store
        .save(scan_result(75), vec![MediaBlob::video("clip").with_thumbnail("poster")])
        .await
        .expect("saved");
    assert_eq!(store.load_thumbnail(&doomed, 0).await, Some(b"poster".to_vec()));
    assert!(doomed.media[0].file_name.ends_with(".mov"));

    assert!(store.delete(doomed.id).await);
    assert!(!store.delete(doomed.id).await);
    assert!(store.get(doomed.id).await.is_none());
    assert_eq!(store.get(kept.id).await.map(|entry| entry.result.score), Some(60));
    for name in doomed.media_file_names() {
        assert!(!store.media_file_exists(name));
    }
    assert_eq!(store.load_media(&doomed, 0).await, None);
}

#[tokio::test]
async fn clear_all_empties_index_and_media() {
    let dir = TempDir::new().expect("temp dir");
    let store = open(&dir, 10).await;
    let entry = store.save(scan_result(50), vec![MediaBlob::image("a")]).await.expect("saved");

    assert!(store.clear_all().await);
    assert!(store.is_empty().await);
    assert!(!store.media_file_exists(&entry.media[0].file_name));
    drop(store);

    assert!(open(&dir, 10).await.is_empty().await);
}

#[tokio::test]
async fn interrupted_index_write_keeps_previous_index() {
    let dir = TempDir::new().expect("temp dir");
    let store = open(&dir, 10).await;
    store.save(scan_result(70), Vec::new()).await.expect("saved");
    store.save(scan_result(80), Vec::new()).await.expect("saved");
    drop(store);

    let category_dir = dir.path().join("history").join("scan");
    let stray = category_dir.join(".index.json.5f0e7c1d.tmp");
    std::fs::write(&stray, b"{\"schema_version\":1,\"results\":[{\"id\":").expect("partial temp");

    let reopened = open(&dir, 10).await;
    assert_eq!(scores(&reopened.results().await), vec![80, 70]);
    assert!(!stray.exists());
}

#[tokio::test]
async fn corrupt_index_starts_empty_and_recovers_on_next_save() {
    let dir = TempDir::new().expect("temp dir");
    let category_dir = dir.path().join("history").join("scan");
    std::fs::create_dir_all(&category_dir).expect("category dir");
    std::fs::write(category_dir.join("index.json"), b"not json").expect("corrupt index");

    let store = open(&dir, 10).await;
    assert!(store.is_empty().await);

    store.save(scan_result(88), Vec::new()).await.expect("saved");
    drop(store);
    assert_eq!(scores(&open(&dir, 10).await.results().await), vec![88]);
}

#[tokio::test]
async fn failed_media_write_leaves_history_unchanged() {
    let dir = TempDir::new().expect("temp dir");
    let store = open(&dir, 10).await;
    store.save(scan_result(40), Vec::new()).await.expect("saved");

    let media_root = store.media().root().to_path_buf();
    std::fs::remove_dir_all(&media_root).expect("remove media dir");
    std::fs::write(&media_root, b"not a directory").expect("block media dir");

    assert!(store.save(scan_result(99), vec![MediaBlob::image("x")]).await.is_none());
    assert_eq!(scores(&store.results().await), vec![40]);
}

#[tokio::test]
async fn missing_media_is_reported_lazily() {
    let dir = TempDir::new().expect("temp dir");
    let store = open(&dir, 10).await;
    let entry = store.save(scan_result(65), vec![MediaBlob::image("full")]).await.expect("saved");

    std::fs::remove_file(store.media().root().join(&entry.media[0].file_name)).expect("remove");
    drop(store);

    let reopened = open(&dir, 10).await;
    let loaded = reopened.get(entry.id).await.expect("entry is kept");
    assert_eq!(reopened.load_media(&loaded, 0).await, None);
    assert_eq!(reopened.load_thumbnail(&loaded, 0).await, None);
    assert_eq!(reopened.load_media(&loaded, 5).await, None);
}

#[tokio::test]
async fn category_must_be_a_plain_name() {
    let dir = TempDir::new().expect("temp dir");
    let result =
        ResultsHistoryStore::<ScanResult>::open(HistoryStoreConfig::new(dir.path(), "../escape"))
            .await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_are_serialized_against_the_cap() {
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(open(&dir, 5).await);

    let tasks: Vec<_> = (0..20u32)
        .map(|score| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let blob = MediaBlob::image(vec![score as u8]).with_thumbnail(vec![0u8]);
                store.save(scan_result(score), vec![blob]).await.is_some()
            })
        })
        .collect();
    for task in tasks {
        assert!(task.await.expect("save task"));
    }

    let in_memory = store.results().await;
    assert_eq!(in_memory.len(), 5);

    let expected_files: BTreeSet<String> =
        in_memory.iter().flat_map(|entry| entry.media_file_names()).map(str::to_owned).collect();
    assert_eq!(expected_files.len(), 10);
    let on_disk: BTreeSet<String> = std::fs::read_dir(store.media().root())
        .expect("media dir")
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str().map(str::to_owned))
        .collect();
    assert_eq!(on_disk, expected_files);

    let ids: Vec<_> = in_memory.iter().map(|entry| entry.id).collect();
    drop(store);
    let reopened = open(&dir, 5).await;
    let reopened_ids: Vec<_> = reopened.results().await.iter().map(|entry| entry.id).collect();
    assert_eq!(reopened_ids, ids);
}
