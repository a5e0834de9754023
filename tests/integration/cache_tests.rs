use std::fs;

use hifirate::cache::{CacheStore, Metric, CACHE_FILE_NAME};
use tempfile::tempdir;

use super::fixtures::{default_scheduler, write_corrupt, write_library};

#[test]
fn test_cache_survives_reopen() {
    let dir = tempdir().unwrap();
    let library = dir.path().join("library");
    write_library(&library, 2);
    write_corrupt(&library.join("broken.mp3"));
    let cache_path = dir.path().join(CACHE_FILE_NAME);

    let mut store = CacheStore::open(&cache_path).unwrap();
    default_scheduler(2).run(&library, &mut store).unwrap();
    store.save().unwrap();

    let reopened = CacheStore::open(&cache_path).unwrap();
    assert_eq!(reopened.len(), 3);
    assert_eq!(
        reopened.records().cloned().collect::<Vec<_>>(),
        store.records().cloned().collect::<Vec<_>>()
    );

    // Failures are persisted as markers, keyed by content hash.
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&cache_path).unwrap()).unwrap();
    let object = json.as_object().unwrap();
    assert!(object.keys().all(|k| k.len() == 64));
    let broken = object
        .values()
        .find(|r| r["path"].as_str().unwrap().ends_with("broken.mp3"))
        .unwrap();
    assert_eq!(broken["max_reliable_frequency_hz"], "ERROR");
    assert_eq!(broken["bitrate_bps"], "N/A");
    assert_eq!(broken["metadata_failed"], true);
}

#[test]
fn test_corrupt_cache_is_backed_up_and_rebuilt() {
    let dir = tempdir().unwrap();
    let library = dir.path().join("library");
    write_library(&library, 2);
    let cache_path = dir.path().join(CACHE_FILE_NAME);
    fs::write(&cache_path, "{ this is not json").unwrap();

    let mut store = CacheStore::open(&cache_path).unwrap();
    assert!(store.is_empty());
    assert!(dir
        .path()
        .join(format!("{CACHE_FILE_NAME}.corrupt"))
        .exists());

    let summary = default_scheduler(2).run(&library, &mut store).unwrap();
    assert_eq!(summary.analyzed, 2);
    store.save().unwrap();

    assert_eq!(CacheStore::open(&cache_path).unwrap().len(), 2);
}

#[test]
fn test_hand_edited_unknown_values_are_kept() {
    let dir = tempdir().unwrap();
    let library = dir.path().join("library");
    write_library(&library, 1);
    let cache_path = dir.path().join(CACHE_FILE_NAME);

    let mut store = CacheStore::open(&cache_path).unwrap();
    default_scheduler(1).run(&library, &mut store).unwrap();
    store.save().unwrap();

    // "N/A" is not a failure, so the record stays fresh.
    let content = fs::read_to_string(&cache_path).unwrap();
    let edited = content.replace("\"bit_depth\": 16", "\"bit_depth\": \"N/A\"");
    assert_ne!(content, edited);
    fs::write(&cache_path, edited).unwrap();

    let mut store = CacheStore::open(&cache_path).unwrap();
    let summary = default_scheduler(1).run(&library, &mut store).unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(store.records().next().unwrap().bit_depth, Metric::Unknown);
}

#[test]
fn test_save_into_unwritable_location_fails() {
    let dir = tempdir().unwrap();
    let cache_dir = dir.path().join("cache");

    let mut store = CacheStore::open(&cache_dir.join(CACHE_FILE_NAME)).unwrap();
    let library = dir.path().join("library");
    write_library(&library, 1);
    default_scheduler(1).run(&library, &mut store).unwrap();

    // A regular file now sits where the cache directory should be created.
    fs::write(&cache_dir, b"x").unwrap();

    assert!(store.save().is_err());
    assert!(store.is_dirty());
}
