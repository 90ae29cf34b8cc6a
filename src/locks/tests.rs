//! Tests for the locks subsystem.

use super::*;
use crate::clock::to_datetime;
use crate::config::Config;
use crate::context::SessionContext;
use crate::error::LeaseError;
use crate::storage::{Operation, ResourceInfo, ResourceRef, Status};
use crate::test_support::{
    T0, einstein, marie, memory_session, memory_session_with, shared_fixtures,
};
use std::collections::BTreeMap;

fn stat(ctx: &SessionContext, path: &str) -> ResourceInfo {
    ctx.backend.stat(&ResourceRef::path(path)).unwrap()
}

// ============================================================================
// Record encoding
// ============================================================================

#[test]
fn test_record_round_trip() {
    let record = LockRecord::new(&einstein(), T0, T0 + 12.5);
    let encoded = record.encode();

    assert_eq!(LockRecord::decode(&encoded).unwrap(), record);
}

#[test]
fn test_record_uses_shared_json_keys() {
    let record = LockRecord::new(&einstein(), 10.0, 20.0);
    let json = crate::storage::unquote(&record.encode()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["username"], "einstein");
    assert_eq!(value["idp"], "cernbox.cern.ch");
    assert_eq!(value["opaque_id"], "4c510ada-c86b-4815-8820-42cdf82c3d51");
    assert_eq!(value["created"], 10.0);
    assert_eq!(value["updated"], 20.0);
}

#[test]
fn test_record_encoding_is_url_quoted() {
    let encoded = LockRecord::new(&einstein(), 1.0, 2.0).encode();
    assert!(encoded.starts_with("%7B%22"));
    assert!(!encoded.contains('"'));
    assert!(!encoded.contains(' '));
}

#[test]
fn test_record_decodes_values_written_by_the_extension() {
    // json.dumps output with spaces, then urllib.parse.quote
    let value = "%7B%22username%22%3A%20%22marie%22%2C%20%22idp%22%3A%20%22cesnet.cz%22%2C%20\
                 %22opaque_id%22%3A%20%22abc%22%2C%20%22updated%22%3A%201700000000.5%2C%20\
                 %22created%22%3A%201700000000.25%7D";
    let record = LockRecord::decode(value).unwrap();

    assert_eq!(record.owner_username, "marie");
    assert_eq!(record.owner_idp, "cesnet.cz");
    assert_eq!(record.owner_opaque_id, "abc");
    assert_eq!(record.created_at, 1_700_000_000.25);
    assert_eq!(record.updated_at, 1_700_000_000.5);
}

#[test]
fn test_malformed_values_decode_to_none() {
    assert!(LockRecord::decode("").is_none());
    assert!(LockRecord::decode("not json").is_none());
    assert!(LockRecord::decode("%FF%FE").is_none());
    assert!(LockRecord::decode("%7B%7D").is_none());
    assert!(LockRecord::decode("%7B%22username%22%3A%22a%22%7D").is_none());

    // created after updated breaks the record invariant
    let backwards = LockRecord::new(&einstein(), 20.0, 10.0).encode();
    assert!(LockRecord::decode(&backwards).is_none());
}

#[test]
fn test_from_metadata_reads_fixed_key() {
    let record = LockRecord::new(&einstein(), 1.0, 2.0);
    let mut metadata = BTreeMap::new();
    assert!(LockRecord::from_metadata(&metadata).is_none());

    metadata.insert("other".to_string(), record.encode());
    assert!(LockRecord::from_metadata(&metadata).is_none());

    metadata.insert(LOCK_METADATA_KEY.to_string(), record.encode());
    assert_eq!(LockRecord::from_metadata(&metadata).unwrap(), record);
}

#[test]
fn test_record_ownership_and_age() {
    let record = LockRecord::new(&einstein(), 100.0, 200.0);

    assert!(record.is_owned_by(&einstein()));
    assert!(!record.is_owned_by(&marie()));
    assert_eq!(record.identity(), einstein());
    assert_eq!(record.age(260.0), 60.0);
    assert_eq!(record.age(150.0), 0.0);
    assert_eq!(record.age_string(205.0), "5s");
    assert_eq!(record.age_string(325.0), "2m 5s");
    assert_eq!(record.age_string(200.0 + 3_700.0), "1h 1m");
}

// ============================================================================
// Decisions
// ============================================================================

#[test]
fn test_decide_without_lock_is_no_lock() {
    let (store, clock) = shared_fixtures();
    store.put_file("/doc.txt", b"x");
    let a = memory_session(&store, &clock, einstein());

    let info = stat(&a.ctx, "/doc.txt");
    assert_eq!(a.ctx.locks().decide(&info).unwrap(), LockDecision::NoLock);
    assert!(a.ctx.locks().inspect(&info).is_none());
}

#[test]
fn test_decide_malformed_lock_is_no_lock() {
    let (store, clock) = shared_fixtures();
    store.put_file("/doc.txt", b"x");
    store.put_metadata("/doc.txt", LOCK_METADATA_KEY, "%7Bgarbage");
    let b = memory_session(&store, &clock, marie());

    let info = stat(&b.ctx, "/doc.txt");
    assert!(b.ctx.locks().inspect(&info).is_none());
    assert_eq!(b.ctx.locks().decide(&info).unwrap(), LockDecision::NoLock);
}

#[test]
fn test_decide_own_lock_even_when_expired() {
    let (store, clock) = shared_fixtures();
    store.put_file("/doc.txt", b"x");
    let a = memory_session(&store, &clock, einstein());

    a.ctx
        .locks()
        .acquire_or_refresh(&stat(&a.ctx, "/doc.txt"))
        .unwrap();
    clock.advance(10_000.0);

    let info = stat(&a.ctx, "/doc.txt");
    assert_eq!(
        a.ctx.locks().decide(&info).unwrap(),
        LockDecision::OwnedByCaller
    );
}

#[test]
fn test_foreign_lock_held_then_expires() {
    let (store, clock) = shared_fixtures();
    store.put_file("/doc.txt", b"x");
    let a = memory_session(&store, &clock, einstein());
    let b = memory_session(&store, &clock, marie());

    let record = a
        .ctx
        .locks()
        .acquire_or_refresh(&stat(&a.ctx, "/doc.txt"))
        .unwrap();

    clock.set(T0 + 10.0);
    assert_eq!(
        b.ctx.locks().decide(&stat(&b.ctx, "/doc.txt")).unwrap(),
        LockDecision::HeldByOther(record.clone())
    );

    // Exactly at the TTL the lease still holds
    clock.set(T0 + 150.0);
    assert!(
        b.ctx
            .locks()
            .decide(&stat(&b.ctx, "/doc.txt"))
            .unwrap()
            .is_held_by_other()
    );

    clock.set(T0 + 200.0);
    assert_eq!(
        b.ctx.locks().decide(&stat(&b.ctx, "/doc.txt")).unwrap(),
        LockDecision::NoLock
    );
}

#[test]
fn test_expired_lock_is_taken_over_silently() {
    let (store, clock) = shared_fixtures();
    store.put_file("/doc.txt", b"x");
    let a = memory_session(&store, &clock, einstein());
    let b = memory_session(&store, &clock, marie());

    a.ctx
        .locks()
        .acquire_or_refresh(&stat(&a.ctx, "/doc.txt"))
        .unwrap();
    clock.set(T0 + 500.0);

    let taken = b.ctx.locks().try_acquire(&stat(&b.ctx, "/doc.txt")).unwrap();
    assert!(taken.is_owned_by(&marie()));
    assert_eq!(taken.created_at, T0 + 500.0);

    // A now sees B's lock; nothing told A in between
    assert_eq!(
        a.ctx.locks().decide(&stat(&a.ctx, "/doc.txt")).unwrap(),
        LockDecision::HeldByOther(taken)
    );
}

// ============================================================================
// Acquire / refresh
// ============================================================================

#[test]
fn test_refresh_preserves_created_at() {
    let (store, clock) = shared_fixtures();
    store.put_file("/doc.txt", b"x");
    let a = memory_session(&store, &clock, einstein());

    let first = a
        .ctx
        .locks()
        .acquire_or_refresh(&stat(&a.ctx, "/doc.txt"))
        .unwrap();
    assert_eq!(first.created_at, T0);
    assert_eq!(first.updated_at, T0);

    clock.advance(42.0);
    let second = a
        .ctx
        .locks()
        .acquire_or_refresh(&stat(&a.ctx, "/doc.txt"))
        .unwrap();
    assert_eq!(second.created_at, T0);
    assert_eq!(second.updated_at, T0 + 42.0);

    let stored = a
        .ctx
        .locks()
        .inspect_ref(&ResourceRef::path("/doc.txt"))
        .unwrap()
        .unwrap();
    assert_eq!(stored, second);
}

#[test]
fn test_acquire_writes_metadata_once() {
    let (store, clock) = shared_fixtures();
    store.put_file("/doc.txt", b"x");
    let a = memory_session(&store, &clock, einstein());

    let info = stat(&a.ctx, "/doc.txt");
    a.ctx.locks().acquire_or_refresh(&info).unwrap();

    assert_eq!(store.metadata_writes(), 1);
    assert!(store.metadata_value("/doc.txt", LOCK_METADATA_KEY).is_some());
}

#[test]
fn test_acquire_failure_is_transport_failure() {
    let (store, clock) = shared_fixtures();
    store.put_file("/doc.txt", b"x");
    store.fail(Operation::SetMetadata, Status::not_found("gone"));
    let a = memory_session(&store, &clock, einstein());

    let err = a
        .ctx
        .locks()
        .acquire_or_refresh(&stat(&a.ctx, "/doc.txt"))
        .unwrap_err();
    assert!(matches!(err, LeaseError::TransportFailure(_)));
}

#[test]
fn test_try_acquire_refuses_live_foreign_lock() {
    let (store, clock) = shared_fixtures();
    store.put_file("/doc.txt", b"x");
    let a = memory_session(&store, &clock, einstein());
    let b = memory_session(&store, &clock, marie());

    a.ctx.locks().try_acquire(&stat(&a.ctx, "/doc.txt")).unwrap();
    clock.advance(30.0);

    let err = b
        .ctx
        .locks()
        .try_acquire(&stat(&b.ctx, "/doc.txt"))
        .unwrap_err();
    assert!(matches!(err, LeaseError::LockConflict(_)));
    assert!(err.to_string().contains("einstein"));
    assert_eq!(store.metadata_writes(), 1);
}

#[test]
fn test_inspect_ref_stats_once() {
    let (store, clock) = shared_fixtures();
    store.put_file("/doc.txt", b"x");
    let a = memory_session(&store, &clock, einstein());

    assert!(
        a.ctx
            .locks()
            .inspect_ref(&ResourceRef::path("/doc.txt"))
            .unwrap()
            .is_none()
    );
    assert_eq!(store.stat_calls(), 1);

    let err = a
        .ctx
        .locks()
        .inspect_ref(&ResourceRef::path("/missing.txt"))
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_identity_is_resolved_once_per_session() {
    let (store, clock) = shared_fixtures();
    store.put_file("/doc.txt", b"x");
    let a = memory_session(&store, &clock, einstein());

    for _ in 0..3 {
        let info = stat(&a.ctx, "/doc.txt");
        a.ctx.locks().decide(&info).unwrap();
        a.ctx.locks().acquire_or_refresh(&info).unwrap();
    }
    assert_eq!(a.identity_service.who_am_i_calls(), 1);
}

#[test]
fn test_status_reports_remaining_lease() {
    let (store, clock) = shared_fixtures();
    store.put_file("/doc.txt", b"x");
    let a = memory_session(&store, &clock, einstein());
    let b = memory_session(&store, &clock, marie());

    let unlocked = b.ctx.locks().status(&stat(&b.ctx, "/doc.txt")).unwrap();
    assert!(unlocked.record.is_none());
    assert_eq!(unlocked.to_string(), "/doc.txt: not locked");

    a.ctx
        .locks()
        .acquire_or_refresh(&stat(&a.ctx, "/doc.txt"))
        .unwrap();
    clock.advance(50.0);

    let held = b.ctx.locks().status(&stat(&b.ctx, "/doc.txt")).unwrap();
    assert!(held.decision.is_held_by_other());
    assert_eq!(held.age_secs, Some(50.0));
    assert_eq!(held.remaining_secs, Some(100.0));
    assert!(!held.expired);
    assert!(held.to_string().contains("expires in 100s"));

    clock.advance(200.0);
    let lapsed = b.ctx.locks().status(&stat(&b.ctx, "/doc.txt")).unwrap();
    assert_eq!(lapsed.decision, LockDecision::NoLock);
    assert_eq!(lapsed.remaining_secs, Some(0.0));
    assert!(lapsed.expired);
    assert!(lapsed.to_string().ends_with("EXPIRED)"));
}

// ============================================================================
// Conflict copies
// ============================================================================

#[test]
fn test_conflict_file_name() {
    let at = to_datetime(T0);

    assert_eq!(
        conflict_file_name("report.ipynb", "alice", at),
        "report-alice.2024-01-02_03_04_05-conflict.ipynb"
    );
    assert_eq!(
        conflict_file_name("Makefile", "alice", at),
        "Makefile-alice.2024-01-02_03_04_05-conflict"
    );
    assert_eq!(
        conflict_file_name("archive.tar.gz", "alice", at),
        "archive.tar-alice.2024-01-02_03_04_05-conflict.gz"
    );
    assert_eq!(
        conflict_file_name(".bashrc", "alice", at),
        "-alice.2024-01-02_03_04_05-conflict.bashrc"
    );
}

#[test]
fn test_resolver_keeps_existing_directory() {
    let (store, clock) = shared_fixtures();
    store.put_file("/home/report.ipynb", b"{}");
    let b = memory_session(&store, &clock, marie());

    let path = b
        .ctx
        .conflicts()
        .resolve("/home/report.ipynb", "marie", to_datetime(T0))
        .unwrap();
    assert_eq!(
        path,
        "/home/report-marie.2024-01-02_03_04_05-conflict.ipynb"
    );
}

#[test]
fn test_resolver_top_level_file() {
    let (store, clock) = shared_fixtures();
    let b = memory_session(&store, &clock, marie());

    let path = b
        .ctx
        .conflicts()
        .resolve("/doc.txt", "marie", to_datetime(T0))
        .unwrap();
    assert_eq!(path, "/doc-marie.2024-01-02_03_04_05-conflict.txt");
}

#[test]
fn test_resolver_falls_back_to_mount_dir() {
    let (store, clock) = shared_fixtures();
    let config = Config {
        mount_dir: "/reva/einstein".to_string(),
        ..Config::default()
    };
    let b = memory_session_with(config, &store, &clock, marie());

    let path = b
        .ctx
        .conflicts()
        .resolve("/gone/report.ipynb", "marie", to_datetime(T0))
        .unwrap();
    assert_eq!(
        path,
        "/reva/einstein/report-marie.2024-01-02_03_04_05-conflict.ipynb"
    );
}

#[test]
fn test_resolver_propagates_unexpected_errors() {
    let (store, clock) = shared_fixtures();
    store.put_file("/home/report.ipynb", b"{}");
    store.fail(Operation::Stat, Status::internal("backend down"));
    let b = memory_session(&store, &clock, marie());

    let err = b
        .ctx
        .conflicts()
        .resolve("/home/report.ipynb", "marie", to_datetime(T0))
        .unwrap_err();
    assert!(matches!(err, LeaseError::TransportFailure(_)));
}
