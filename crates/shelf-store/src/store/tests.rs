use super::*;
use shelf_core::types::{Constraint, METADATA_JSON};
use std::time::Duration;
use tempfile::tempdir;

fn open_store() -> (TempDir, CookbookStore) {
    let temp_dir = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp_dir.path().join("cookbooks")).unwrap();
    let store = CookbookStore::open(root).unwrap();
    (temp_dir, store)
}

fn metadata(name: &str, version: &str) -> CookbookMetadata {
    CookbookMetadata::new(name, Version::from_str(version).unwrap())
}

/// Write a cookbook into a fresh staging directory
fn stage(store: &CookbookStore, meta: CookbookMetadata, marker: &str) -> (StagingDir, CachedPackage) {
    let staging = store.staging_dir(&meta.name).unwrap();
    let dir = staging.path().to_path_buf();
    fs::write(dir.join(METADATA_JSON), meta.to_json_pretty().unwrap()).unwrap();
    fs::write(dir.join("marker.txt"), marker).unwrap();
    (staging, CachedPackage::new(dir, meta))
}

#[test]
fn test_open_creates_root() {
    let (_temp, store) = open_store();
    assert!(store.root().is_dir());
    assert!(store.packages().unwrap().is_empty());
}

#[test]
fn test_insert_then_lookup() {
    let (_temp, store) = open_store();
    let meta = metadata("nginx", "2.7.1").depends("ohai", Constraint::any());
    let (_staging, package) = stage(&store, meta.clone(), "first");

    let stored = store.insert(package).unwrap();
    assert_eq!(stored.local_path, store.root().join("nginx-2.7.1"));
    assert!(stored.local_path.join(ENTRY_RECORD).is_file());

    let found = store.lookup("nginx", &Version::new(2, 7, 1)).unwrap().unwrap();
    assert_eq!(found, stored);
    assert_eq!(found.metadata, meta);
}

#[test]
fn test_lookup_survives_reopen() {
    let temp_dir = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp_dir.path().join("cookbooks")).unwrap();

    {
        let store = CookbookStore::open(root.clone()).unwrap();
        let (_staging, package) = stage(&store, metadata("apt", "7.0.0"), "x");
        store.insert(package.with_revision(Some("r1".into()))).unwrap();
    }

    let reopened = CookbookStore::open(root).unwrap();
    let found = reopened.lookup("apt", &Version::new(7, 0, 0)).unwrap().unwrap();
    assert_eq!(found.revision.as_deref(), Some("r1"));
}

#[test]
fn test_insert_is_first_writer_wins() {
    let (_temp, store) = open_store();

    let (_first_staging, first) = stage(&store, metadata("app", "1.0.0"), "first");
    let stored = store.insert(first).unwrap();

    let (second_staging, second) = stage(&store, metadata("app", "1.0.0"), "second");
    let again = store.insert(second).unwrap();

    assert_eq!(again, stored);
    assert_eq!(fs::read_to_string(stored.local_path.join("marker.txt")).unwrap(), "first");
    assert!(!second_staging.path().exists());
}

#[test]
fn test_insert_from_outside_store_links_and_keeps_source() {
    let (temp, store) = open_store();
    let source = Utf8PathBuf::from_path_buf(temp.path().join("local/app")).unwrap();
    fs::create_dir_all(&source).unwrap();
    let meta = metadata("app", "0.1.0");
    fs::write(source.join(METADATA_JSON), meta.to_json_pretty().unwrap()).unwrap();

    let stored = store.insert(CachedPackage::new(source.clone(), meta)).unwrap();

    assert!(source.join(METADATA_JSON).is_file());
    assert!(!source.join(ENTRY_RECORD).exists());
    assert!(stored.local_path.join(METADATA_JSON).is_file());
}

#[test]
fn test_insert_rejects_mismatched_metadata() {
    let (_temp, store) = open_store();
    let (_staging, mut package) = stage(&store, metadata("app", "1.0.0"), "x");
    package.identity.version = Version::new(2, 0, 0);

    assert!(matches!(store.insert(package), Err(ShelfError::MetadataParse { .. })));
}

#[test]
fn test_insert_requires_metadata_file() {
    let (_temp, store) = open_store();
    let staging = store.staging_dir("bare").unwrap();
    let package = CachedPackage::new(staging.path().to_path_buf(), metadata("bare", "1.0.0"));

    assert!(matches!(store.insert(package), Err(ShelfError::MetadataParse { .. })));
}

#[test]
fn test_versions_for() {
    let (_temp, store) = open_store();
    for (name, version) in [("build", "1.0.0"), ("build", "1.2.0"), ("build-essential", "8.0.0")] {
        let (_staging, package) = stage(&store, metadata(name, version), "x");
        store.insert(package).unwrap();
    }

    let versions: Vec<String> = store.versions_for("build").unwrap().iter().map(|v| v.to_string()).collect();
    assert_eq!(versions, vec!["1.0.0", "1.2.0"]);
    assert_eq!(store.versions_for("build-essential").unwrap().len(), 1);
    assert!(store.versions_for("missing").unwrap().is_empty());
    assert!(store.versions_for("../etc").unwrap().is_empty());
}

#[test]
fn test_evict() {
    let (_temp, store) = open_store();
    let (_staging, package) = stage(&store, metadata("app", "1.0.0"), "x");
    store.insert(package).unwrap();

    assert!(store.evict("app", &Version::new(1, 0, 0)).unwrap());
    assert!(store.lookup("app", &Version::new(1, 0, 0)).unwrap().is_none());
    assert!(!store.evict("app", &Version::new(1, 0, 0)).unwrap());
}

#[test]
fn test_supersede_replaces_changed_revision() {
    let (_temp, store) = open_store();

    let (_a, first) = stage(&store, metadata("app", "1.0.0"), "old");
    store.insert(first.with_revision(Some("aaa".into()))).unwrap();

    let (_b, same) = stage(&store, metadata("app", "1.0.0"), "ignored");
    let kept = store.supersede(same.with_revision(Some("aaa".into()))).unwrap();
    assert_eq!(fs::read_to_string(kept.local_path.join("marker.txt")).unwrap(), "old");

    let (_c, moved) = stage(&store, metadata("app", "1.0.0"), "new");
    let replaced = store.supersede(moved.with_revision(Some("bbb".into()))).unwrap();
    assert_eq!(replaced.revision.as_deref(), Some("bbb"));
    assert_eq!(fs::read_to_string(replaced.local_path.join("marker.txt")).unwrap(), "new");
}

#[test]
fn test_packages_lists_everything() {
    let (_temp, store) = open_store();
    for (name, version) in [("b", "1.0.0"), ("a", "2.0.0"), ("a", "1.0.0")] {
        let (_staging, package) = stage(&store, metadata(name, version), "x");
        store.insert(package).unwrap();
    }
    // Incomplete directories are not entries
    fs::create_dir_all(store.root().join("c-1.0.0")).unwrap();

    let ids: Vec<String> = store.packages().unwrap().iter().map(|p| p.identity.to_string()).collect();
    assert_eq!(ids, vec!["a@1.0.0", "a@2.0.0", "b@1.0.0"]);
}

#[test]
fn test_open_cleans_staging() {
    let temp_dir = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp_dir.path().join("cookbooks")).unwrap();
    fs::create_dir_all(root.join(STAGING_DIR).join("app-orphan")).unwrap();

    let store = CookbookStore::open(root.clone()).unwrap();
    assert!(!root.join(STAGING_DIR).join("app-orphan").exists());
    assert_eq!(store.clean_staging().unwrap(), 0);
}

#[test]
fn test_corrupt_entry_is_replaced_on_insert() {
    let (_temp, store) = open_store();
    let broken = store.root().join("app-1.0.0");
    fs::create_dir_all(&broken).unwrap();
    EntryRecord::new(&PackageIdentity::new("app", Version::new(1, 0, 0)), None)
        .write(&broken)
        .unwrap();
    fs::write(broken.join(METADATA_JSON), "{broken").unwrap();

    let (_staging, package) = stage(&store, metadata("app", "1.0.0"), "fixed");
    let stored = store.insert(package).unwrap();
    assert_eq!(fs::read_to_string(stored.local_path.join("marker.txt")).unwrap(), "fixed");
}

#[tokio::test]
async fn test_lock_is_exclusive_per_identity() {
    let (_temp, store) = open_store();
    let store = Arc::new(store);
    let app = PackageIdentity::new("app", Version::new(1, 0, 0));
    let other = PackageIdentity::new("other", Version::new(1, 0, 0));

    let guard = store.lock(&app).await;

    // A different key is not blocked
    let other_guard = tokio::time::timeout(Duration::from_millis(100), store.lock(&other)).await;
    assert!(other_guard.is_ok());

    let blocked = tokio::time::timeout(Duration::from_millis(50), store.lock(&app)).await;
    assert!(blocked.is_err());

    drop(guard);
    let acquired = tokio::time::timeout(Duration::from_millis(100), store.lock(&app)).await;
    assert!(acquired.is_ok());
}
