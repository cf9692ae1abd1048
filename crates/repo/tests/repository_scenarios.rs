//! End-to-end repository scenarios
//!
//! Drives the facade the way an archival crawler would: ingest, commit,
//! enumerate, delete, re-add, and reopen. Assertions follow the
//! repository's observable contract: contiguous versions, committed-only
//! enumeration in URL order, AU sizes over latest committed versions, and
//! idempotent commit/delete.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::time::Duration;
use tempfile::tempdir;
use warcstore_core::{ArtifactData, HttpResponseHead, Payload};
use warcstore_repo::Repository;
use warcstore_storage::StoreConfig;

fn make_data(collection: &str, auid: &str, uri: &str, body: &[u8]) -> ArtifactData {
    ArtifactData::new(
        collection,
        auid,
        uri,
        HttpResponseHead::ok()
            .with_header("key1", "val1")
            .with_header("key2", "val2"),
        Payload::from_bytes(body.to_vec()),
        chrono::Utc::now(),
    )
}

fn sha256_tag(body: &[u8]) -> String {
    let hex: String = Sha256::digest(body)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("sha256:{hex}")
}

fn add_and_commit(repo: &Repository, collection: &str, auid: &str, uri: &str, body: &[u8]) -> warcstore_core::Artifact {
    let artifact = repo.add_artifact(make_data(collection, auid, uri, body)).unwrap();
    repo.commit_artifact(collection, &artifact.id)
        .unwrap()
        .wait()
        .unwrap()
        .unwrap()
}

#[test]
fn test_round_trip() {
    let dir = tempdir().unwrap();
    let repo = Repository::open(StoreConfig::for_testing([dir.path()])).unwrap();
    assert!(repo.wait_until_ready(Duration::from_secs(5)));

    let body = b"content string 1";
    let added = repo
        .add_artifact(make_data("c1", "a1", "http://h/p", body))
        .unwrap();
    assert_eq!(added.version, 1);
    assert!(!added.committed);

    let committed = repo
        .commit_artifact("c1", &added.id)
        .unwrap()
        .wait()
        .unwrap()
        .unwrap();
    assert!(committed.committed);
    assert_eq!(committed.content_length, 16);
    assert_eq!(committed.content_digest, sha256_tag(body));
    assert!(!committed.storage_url.is_under(&dir.path().join("tmp")));

    let data = repo.artifact_data("c1", &added.id).unwrap();
    assert_eq!(data.response().status_code, 200);
    assert_eq!(data.response().header("key1"), Some("val1"));
    assert_eq!(data.response().header("key2"), Some("val2"));

    let mut read_back = Vec::new();
    data.payload()
        .consume()
        .unwrap()
        .read_to_end(&mut read_back)
        .unwrap();
    assert_eq!(read_back, body);

    assert!(repo.artifact_exists(&added.id).unwrap());
    assert!(repo.is_artifact_committed(&added.id).unwrap());
}

#[test]
fn test_versioning_with_uncommitted_gap() {
    let dir = tempdir().unwrap();
    let repo = Repository::open(StoreConfig::for_testing([dir.path()])).unwrap();

    let v1 = repo
        .add_artifact(make_data("c1", "a1", "u1", &[b'x'; 10]))
        .unwrap();
    let v2 = repo
        .add_artifact(make_data("c1", "a1", "u1", &[b'x'; 20]))
        .unwrap();
    let v3 = repo
        .add_artifact(make_data("c1", "a1", "u1", &[b'x'; 30]))
        .unwrap();
    assert_eq!((v1.version, v2.version, v3.version), (1, 2, 3));

    // Commit only the first and third
    repo.commit_artifact("c1", &v1.id).unwrap().wait().unwrap();
    repo.commit_artifact("c1", &v3.id).unwrap().wait().unwrap();

    let latest = repo.latest_artifact("c1", "a1", "u1").unwrap().unwrap();
    assert_eq!(latest.version, 3);

    let versions: Vec<u32> = repo
        .artifact_versions("c1", "a1", "u1")
        .unwrap()
        .map(|a| a.version)
        .collect();
    assert_eq!(versions, vec![3, 1], "uncommitted v2 is invisible");

    assert_eq!(repo.au_size("c1", "a1").unwrap(), 30);
    assert_eq!(repo.au_artifact_count("c1", "a1").unwrap(), 1);

    // v2 is reachable only when uncommitted entries are requested
    assert!(repo
        .artifact_version("c1", "a1", "u1", 2, false)
        .unwrap()
        .is_none());
    assert_eq!(
        repo.artifact_version("c1", "a1", "u1", 2, true)
            .unwrap()
            .unwrap()
            .id,
        v2.id
    );
}

#[test]
fn test_prefix_scan() {
    let dir = tempdir().unwrap();
    let repo = Repository::open(StoreConfig::for_testing([dir.path()])).unwrap();

    add_and_commit(&repo, "c1", "a1", "http://h/a", b"aa");
    add_and_commit(&repo, "c1", "a1", "http://h/aa", b"bb");
    add_and_commit(&repo, "c1", "a1", "http://h/b", b"cc");

    let hits: Vec<String> = repo
        .artifacts_with_prefix("c1", "a1", "http://h/a")
        .unwrap()
        .map(|a| a.uri)
        .collect();
    assert_eq!(hits, vec!["http://h/a", "http://h/aa"]);

    assert_eq!(
        repo.artifacts_with_prefix("c1", "a1", "http://h/z")
            .unwrap()
            .count(),
        0
    );
}

#[test]
fn test_delete_then_re_add_advances_version() {
    let dir = tempdir().unwrap();
    let repo = Repository::open(StoreConfig::for_testing([dir.path()])).unwrap();

    let v1 = add_and_commit(&repo, "c1", "a1", "u1", b"original");
    repo.delete_artifact("c1", &v1.id).unwrap();
    assert!(!repo.artifact_exists(&v1.id).unwrap());

    let v2 = repo.add_artifact(make_data("c1", "a1", "u1", b"xyz")).unwrap();
    assert_eq!(v2.version, 2, "deleted version numbers are not reused");
    repo.commit_artifact("c1", &v2.id).unwrap().wait().unwrap();

    let latest = repo.latest_artifact("c1", "a1", "u1").unwrap().unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(repo.au_size("c1", "a1").unwrap(), 3);

    let versions: Vec<u32> = repo
        .artifact_versions("c1", "a1", "u1")
        .unwrap()
        .map(|a| a.version)
        .collect();
    assert_eq!(versions, vec![2]);
}

#[test]
fn test_commit_and_delete_are_idempotent() {
    let dir = tempdir().unwrap();
    let repo = Repository::open(StoreConfig::for_testing([dir.path()])).unwrap();

    let artifact = add_and_commit(&repo, "c1", "a1", "u1", b"steady");

    let again = repo
        .commit_artifact("c1", &artifact.id)
        .unwrap()
        .wait()
        .unwrap()
        .unwrap();
    assert_eq!(again.storage_url, artifact.storage_url);

    repo.delete_artifact("c1", &artifact.id).unwrap();
    repo.delete_artifact("c1", &artifact.id).unwrap();
    assert!(repo.artifact("c1", &artifact.id).unwrap().is_none());
}

#[test]
fn test_collection_and_au_enumeration() {
    let dir = tempdir().unwrap();
    let repo = Repository::open(StoreConfig::for_testing([dir.path()])).unwrap();

    add_and_commit(&repo, "c2", "au-x", "u1", b"1");
    add_and_commit(&repo, "c1", "au-y", "u1", b"2");
    add_and_commit(&repo, "c1", "au-x", "u1", b"3");
    // Uncommitted artifacts do not surface collections
    repo.add_artifact(make_data("c3", "au-z", "u1", b"4")).unwrap();

    let collections: Vec<String> = repo.collection_ids().unwrap().collect();
    assert_eq!(collections, vec!["c1", "c2"]);

    let aus: Vec<String> = repo.au_ids("c1").unwrap().collect();
    assert_eq!(aus, vec!["au-x", "au-y"]);
}

#[test]
fn test_enumeration_order_within_au() {
    let dir = tempdir().unwrap();
    let repo = Repository::open(StoreConfig::for_testing([dir.path()])).unwrap();

    add_and_commit(&repo, "c1", "a1", "http://h/b", b"1");
    add_and_commit(&repo, "c1", "a1", "http://h/a", b"2");
    add_and_commit(&repo, "c1", "a1", "http://h/a", b"3");

    let order: Vec<(String, u32)> = repo
        .artifact_versions_with_prefix("c1", "a1", "http://h/")
        .unwrap()
        .map(|a| (a.uri, a.version))
        .collect();
    assert_eq!(
        order,
        vec![
            ("http://h/a".to_string(), 2),
            ("http://h/a".to_string(), 1),
            ("http://h/b".to_string(), 1),
        ],
        "URL ascending, version descending"
    );
}

#[test]
fn test_unknown_artifacts_are_not_found() {
    let dir = tempdir().unwrap();
    let repo = Repository::open(StoreConfig::for_testing([dir.path()])).unwrap();

    assert!(repo.artifact("c1", "no-such-id").unwrap().is_none());
    assert!(repo.artifact_data("c1", "no-such-id").unwrap_err().is_not_found());
    assert!(repo.is_artifact_committed("no-such-id").unwrap_err().is_not_found());
    assert!(repo
        .commit_artifact("c1", "no-such-id")
        .unwrap_err()
        .is_not_found());

    // Wrong collection is indistinguishable from absent
    let artifact = add_and_commit(&repo, "c1", "a1", "u1", b"here");
    assert!(repo.artifact("c2", &artifact.id).unwrap().is_none());
}

#[test]
fn test_add_rejects_empty_identifier_components() {
    let dir = tempdir().unwrap();
    let repo = Repository::open(StoreConfig::for_testing([dir.path()])).unwrap();

    let err = repo
        .add_artifact(make_data("", "a1", "u1", b"x"))
        .unwrap_err();
    assert!(err.is_invalid_argument());

    let err = repo
        .add_artifact(make_data("c1", "a1", "", b"x"))
        .unwrap_err();
    assert!(err.is_invalid_argument());
}

#[test]
fn test_reopen_recovers_temp_resident_state() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::for_testing([dir.path()]);

    let (committed_id, pending_id) = {
        let repo = Repository::open(config.clone()).unwrap();
        let committed = add_and_commit(&repo, "c1", "a1", "http://h/done", b"done");
        let pending = repo
            .add_artifact(make_data("c1", "a1", "http://h/pending", b"pending"))
            .unwrap();
        repo.shutdown();
        (committed.id, pending.id)
    };

    // Reopening reloads temp WARCs: the committed artifact resolves to
    // its permanent location, the pending one is indexed uncommitted.
    let repo = Repository::open(config).unwrap();
    assert!(repo.is_artifact_committed(&committed_id).unwrap());
    assert!(!repo.is_artifact_committed(&pending_id).unwrap());

    let latest = repo
        .latest_artifact("c1", "a1", "http://h/done")
        .unwrap()
        .unwrap();
    assert!(!latest.storage_url.is_under(&dir.path().join("tmp")));

    let data = repo.artifact_data("c1", &pending_id).unwrap();
    let mut read_back = Vec::new();
    data.payload()
        .consume()
        .unwrap()
        .read_to_end(&mut read_back)
        .unwrap();
    assert_eq!(read_back, b"pending");
}

#[test]
fn test_rebuild_after_gc_recovers_from_permanent_storage() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::for_testing([dir.path()]);

    let artifact_id = {
        let repo = Repository::open(config.clone()).unwrap();
        let artifact = add_and_commit(&repo, "c1", "a1", "http://h/p", b"archival copy");
        // Reclaim the temp WARC so only permanent storage remains
        let stats = repo.run_gc();
        assert_eq!(stats.files_removed, 1);
        repo.shutdown();
        artifact.id
    };

    let repo = Repository::open(config).unwrap();
    // Nothing in temp to reload; a rebuild restores the index
    assert!(repo.artifact("c1", &artifact_id).unwrap().is_none());
    repo.rebuild_index().unwrap();

    let recovered = repo.artifact("c1", &artifact_id).unwrap().unwrap();
    assert!(recovered.committed);

    let data = repo.artifact_data("c1", &artifact_id).unwrap();
    let mut read_back = Vec::new();
    data.payload()
        .consume()
        .unwrap()
        .read_to_end(&mut read_back)
        .unwrap();
    assert_eq!(read_back, b"archival copy");
}

#[test]
fn test_storage_info() {
    let dir = tempdir().unwrap();
    let repo = Repository::open(StoreConfig::for_testing([dir.path()])).unwrap();
    let info = repo.storage_info().unwrap();
    assert!(info.total > 0);
    assert_eq!(info.used, info.total - info.available);
    assert!((0.0..=100.0).contains(&info.percent_used));
}
