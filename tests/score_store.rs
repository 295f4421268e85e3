// Score store behaviour against real files on disk.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use button_game_backend::store::{CorruptPolicy, ScoreRecord, ScoreStore, StoreError};

#[test]
fn test_records_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scores.json");

    let written: Vec<ScoreRecord> = {
        let store = ScoreStore::open(&path, CorruptPolicy::Strict);
        (0..5)
            .map(|i| store.append(ScoreRecord::new(i * 30, i)).unwrap())
            .collect()
    };

    let reopened = ScoreStore::open(&path, CorruptPolicy::Strict);
    assert_eq!(reopened.list().unwrap(), written);
}

#[test]
fn test_document_is_pretty_printed_array() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scores.json");
    let store = ScoreStore::open(&path, CorruptPolicy::Lenient);
    store.append(ScoreRecord::new(12, 3)).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.lines().count() > 1);
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let records = value.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["time"], 12);
    assert_eq!(records[0]["clicks"], 3);
    assert!(records[0]["timestamp"].is_string());
}

#[test]
fn test_reads_documents_written_by_older_servers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scores.json");
    fs::write(
        &path,
        r#"[
  {"time": 120, "clicks": 3, "timestamp": "2024-05-01T10:00:00.000001"},
  {"time": 95, "clicks": 1, "timestamp": "2024-05-01T10:05:00.000001"}
]"#,
    )
    .unwrap();

    let store = ScoreStore::open(&path, CorruptPolicy::Strict);
    let stats = store.stats().unwrap();
    assert_eq!(stats.total_games, 2);
    assert_eq!(stats.best_time, 120);
    assert_eq!(stats.average_time, 107.5);
    assert_eq!(stats.total_clicks, 4);
}

#[test]
fn test_corrupt_file_policies() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scores.json");
    fs::write(&path, "[{\"time\": 1, ").unwrap();

    let strict = ScoreStore::open(&path, CorruptPolicy::Strict);
    assert!(matches!(strict.list(), Err(StoreError::Corrupt { .. })));

    let lenient = ScoreStore::open(&path, CorruptPolicy::Lenient);
    assert!(lenient.list().unwrap().is_empty());
    lenient.append(ScoreRecord::new(3, 0)).unwrap();
    assert_eq!(strict.list().unwrap().len(), 1);
}

#[test]
fn test_concurrent_appends_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(ScoreStore::open(
        dir.path().join("scores.json"),
        CorruptPolicy::Strict,
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            std::thread::spawn(move || {
                for j in 0..5 {
                    store.append(ScoreRecord::new(i * 5 + j, 0)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let all = store.list().unwrap();
    assert_eq!(all.len(), 40);
    let mut times: Vec<u32> = all.iter().map(|r| r.time).collect();
    times.sort_unstable();
    assert_eq!(times, (0..40).collect::<Vec<u32>>());
}
