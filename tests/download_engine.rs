//! Integration tests for single-file transfers
//!
//! These run the download engine against a local file host and check what
//! ends up on disk and in the hash index.

mod common;

use std::path::Path;
use std::time::Duration;

use hb_fetcher::app::download::temp_path_for;
use hb_fetcher::app::{
    create_shutdown_channel, ContentHash, DownloadOutcome, EventSink, FileIdentity, FileRequest,
    HashAlgorithm, HashPolicy, HashStore, ShutdownSignal,
};
use hb_fetcher::errors::DownloadError;
use tempfile::TempDir;

use common::{content, download_config, engine, Canned, FileServer, ScriptedServer};

const SIZE: usize = 1000;

async fn setup() -> (FileServer, TempDir, Vec<u8>) {
    let server = FileServer::start().await;
    let body = content(SIZE);
    server.add_file("/files/game.zip", body.clone());
    (server, TempDir::new().unwrap(), body)
}

fn request(server: &FileServer, root: &Path, body: &[u8]) -> FileRequest {
    FileRequest {
        url: server.url("/files/game.zip"),
        destination: root.join("bundle").join("game.zip"),
        declared_size: Some(body.len() as u64),
        declared_hash: Some(ContentHash::of_bytes(HashAlgorithm::Md5, body)),
    }
}

#[tokio::test]
async fn test_fresh_download_is_verified_and_recorded() {
    let (server, dir, body) = setup().await;
    let engine = engine(dir.path(), download_config(HashPolicy::default())).await;
    let request = request(&server, dir.path(), &body);

    let outcome = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();

    match outcome {
        DownloadOutcome::Complete {
            bytes_transferred,
            size,
            hash,
        } => {
            assert_eq!(bytes_transferred, SIZE as u64);
            assert_eq!(size, SIZE as u64);
            assert_eq!(hash, request.declared_hash);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    assert_eq!(tokio::fs::read(&request.destination).await.unwrap(), body);
    assert!(!temp_path_for(&request.destination).exists());

    let identity = FileIdentity::for_destination(dir.path(), &request.destination);
    let record = engine.store().lookup(&identity).await.unwrap();
    assert_eq!(record.size, SIZE as u64);
    assert_eq!(Some(record.hash), request.declared_hash);
}

#[tokio::test]
async fn test_second_run_fetches_nothing() {
    let (server, dir, body) = setup().await;
    let engine = engine(dir.path(), download_config(HashPolicy::default())).await;
    let request = request(&server, dir.path(), &body);

    engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();
    let gets = server.gets();

    let outcome = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();
    assert_eq!(outcome, DownloadOutcome::AlreadyUpToDate);
    assert_eq!(server.gets(), gets);
}

#[tokio::test]
async fn test_modified_file_is_fetched_again() {
    let (server, dir, body) = setup().await;
    let engine = engine(dir.path(), download_config(HashPolicy::default().with_force(true))).await;
    let request = request(&server, dir.path(), &body);

    engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();

    // Same size, different content: only a rehash notices.
    let mut tampered = body.clone();
    tampered[10] ^= 0xff;
    tokio::fs::write(&request.destination, &tampered).await.unwrap();

    let outcome = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();
    assert!(matches!(outcome, DownloadOutcome::Complete { .. }));
    assert_eq!(tokio::fs::read(&request.destination).await.unwrap(), body);
}

#[tokio::test]
async fn test_interrupted_transfer_fails_after_retry_budget() {
    let (server, dir, body) = setup().await;
    server.set_cut_at(Some(600));
    let engine = engine(dir.path(), download_config(HashPolicy::default())).await;
    let request = request(&server, dir.path(), &body);

    let err = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap_err();

    match err {
        DownloadError::TransferFailed {
            offset, attempts, ..
        } => {
            assert_eq!(offset, 600);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error {:?}", other),
    }

    let temp = temp_path_for(&request.destination);
    assert_eq!(tokio::fs::metadata(&temp).await.unwrap().len(), 600);
    assert!(!request.destination.exists());
    assert_eq!(server.ranges(), vec![None, Some(600), Some(600)]);
}

#[tokio::test]
async fn test_resume_fetches_only_the_remainder() {
    let (server, dir, body) = setup().await;
    server.set_cut_at(Some(600));
    let engine = engine(dir.path(), download_config(HashPolicy::default())).await;
    let request = request(&server, dir.path(), &body);

    assert!(engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .is_err());

    server.set_cut_at(None);
    let outcome = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();

    match outcome {
        DownloadOutcome::Complete {
            bytes_transferred,
            size,
            ..
        } => {
            assert_eq!(bytes_transferred, 400);
            assert_eq!(size, SIZE as u64);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(tokio::fs::read(&request.destination).await.unwrap(), body);
    assert_eq!(server.ranges().last(), Some(&Some(600)));
}

#[tokio::test]
async fn test_ignored_range_restarts_from_zero() {
    let (server, dir, body) = setup().await;
    let engine = engine(dir.path(), download_config(HashPolicy::default())).await;
    let request = request(&server, dir.path(), &body);

    tokio::fs::create_dir_all(request.destination.parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(temp_path_for(&request.destination), &body[..600])
        .await
        .unwrap();
    server.set_ignore_range(true);

    let outcome = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        DownloadOutcome::Complete {
            bytes_transferred: 1000,
            ..
        }
    ));
    assert_eq!(tokio::fs::read(&request.destination).await.unwrap(), body);
}

#[tokio::test]
async fn test_integrity_mismatch_keeps_partial_file() {
    let (server, dir, body) = setup().await;
    let engine = engine(dir.path(), download_config(HashPolicy::default())).await;
    let mut request = request(&server, dir.path(), &body);
    request.declared_hash = Some(ContentHash::of_bytes(HashAlgorithm::Md5, b"something else"));

    let err = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::IntegrityMismatch { .. }));
    assert_eq!(err.kind(), "integrity-mismatch");
    assert!(!request.destination.exists());
    assert!(temp_path_for(&request.destination).exists());
    assert!(engine.store().is_empty().await);
}

#[tokio::test]
async fn test_unverified_hash_is_recorded_only_with_write_policy() {
    for write in [false, true] {
        let (server, dir, body) = setup().await;
        let engine = engine(
            dir.path(),
            download_config(HashPolicy::default().with_write(write)),
        )
        .await;
        let mut request = request(&server, dir.path(), &body);
        request.declared_hash = None;

        engine
            .download(&request, &EventSink::disabled(), ShutdownSignal::never())
            .await
            .unwrap();

        assert_eq!(engine.store().len().await, usize::from(write));
        assert_eq!(tokio::fs::read(&request.destination).await.unwrap(), body);
    }
}

#[tokio::test]
async fn test_rejected_status_is_not_retried() {
    let (server, dir, body) = setup().await;
    let engine = engine(dir.path(), download_config(HashPolicy::default())).await;
    let mut request = request(&server, dir.path(), &body);
    request.url = server.url("/files/missing.zip");

    let err = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Rejected { status: 404 }));
    assert_eq!(server.gets(), 1);
}

#[tokio::test]
async fn test_transient_statuses_are_retried() {
    let body = content(SIZE);
    let server = ScriptedServer::start(vec![
        Canned::status(503),
        Canned::status(429).header("Retry-After", "0"),
        Canned::ok(body.clone()),
    ])
    .await;
    let dir = TempDir::new().unwrap();
    let engine = engine(dir.path(), download_config(HashPolicy::default())).await;
    let request = FileRequest {
        url: server.url("/files/game.zip"),
        destination: dir.path().join("game.zip"),
        declared_size: Some(SIZE as u64),
        declared_hash: Some(ContentHash::of_bytes(HashAlgorithm::Md5, &body)),
    };

    let outcome = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();

    assert!(matches!(outcome, DownloadOutcome::Complete { .. }));
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn test_cancelled_before_start_keeps_nothing() {
    let (server, dir, body) = setup().await;
    let engine = engine(dir.path(), download_config(HashPolicy::default())).await;
    let request = request(&server, dir.path(), &body);

    let (trigger, shutdown) = create_shutdown_channel();
    trigger.trigger();
    let err = engine
        .download(&request, &EventSink::disabled(), shutdown)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Cancelled { offset: 0 }));
    assert_eq!(server.gets(), 0);
}

#[tokio::test]
async fn test_cancel_mid_transfer_leaves_resumable_file() {
    let (server, dir, body) = setup().await;
    server.set_stall_at(Some(600));
    let engine = engine(dir.path(), download_config(HashPolicy::default())).await;
    let request = request(&server, dir.path(), &body);

    let (trigger, shutdown) = create_shutdown_channel();
    let events = EventSink::disabled();
    let download = engine.download(&request, &events, shutdown);
    let cancel = async {
        server.wait_for_stall().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.trigger();
    };
    let (result, ()) = tokio::join!(download, cancel);

    let offset = match result {
        Err(DownloadError::Cancelled { offset }) => offset,
        other => panic!("unexpected result {:?}", other),
    };
    assert!(offset > 0);
    let temp = temp_path_for(&request.destination);
    assert_eq!(tokio::fs::metadata(&temp).await.unwrap().len(), offset);
    assert!(!request.destination.exists());

    server.set_stall_at(None);
    let outcome = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();

    match outcome {
        DownloadOutcome::Complete {
            bytes_transferred, ..
        } => assert_eq!(bytes_transferred, SIZE as u64 - offset),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(tokio::fs::read(&request.destination).await.unwrap(), body);
    assert_eq!(server.ranges().last(), Some(&Some(offset)));
}

#[tokio::test]
async fn test_ignore_policy_checks_size_only() {
    let (server, dir, body) = setup().await;
    let engine = engine(
        dir.path(),
        download_config(HashPolicy::default().with_ignore(true)),
    )
    .await;
    let mut request = request(&server, dir.path(), &body);
    request.declared_hash = Some(ContentHash::of_bytes(HashAlgorithm::Md5, b"not the content"));

    let outcome = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        DownloadOutcome::Complete { hash: None, .. }
    ));
    assert!(engine.store().is_empty().await);

    let mut tampered = body.clone();
    tampered[0] ^= 0xff;
    tokio::fs::write(&request.destination, &tampered).await.unwrap();
    let gets = server.gets();

    let outcome = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();
    assert_eq!(outcome, DownloadOutcome::AlreadyUpToDate);
    assert_eq!(server.gets(), gets);
    assert_eq!(tokio::fs::read(&request.destination).await.unwrap(), tampered);
}

#[tokio::test]
async fn test_read_policy_trusts_stored_record() {
    for read in [true, false] {
        let (server, dir, body) = setup().await;
        let engine = engine(
            dir.path(),
            download_config(HashPolicy::default().with_read(read)),
        )
        .await;
        let request = request(&server, dir.path(), &body);

        engine
            .download(&request, &EventSink::disabled(), ShutdownSignal::never())
            .await
            .unwrap();

        // Same size, so only reading the file can tell.
        let mut tampered = body.clone();
        tampered[500] ^= 0xff;
        tokio::fs::write(&request.destination, &tampered).await.unwrap();

        let outcome = engine
            .download(&request, &EventSink::disabled(), ShutdownSignal::never())
            .await
            .unwrap();
        let on_disk = tokio::fs::read(&request.destination).await.unwrap();
        if read {
            assert_eq!(outcome, DownloadOutcome::AlreadyUpToDate);
            assert_eq!(on_disk, tampered);
        } else {
            assert!(matches!(outcome, DownloadOutcome::Complete { .. }));
            assert_eq!(on_disk, body);
        }
    }
}

#[tokio::test]
async fn test_bad_partial_prefix_is_refetched_from_zero() {
    let (server, dir, body) = setup().await;
    let engine = engine(dir.path(), download_config(HashPolicy::default())).await;
    let request = request(&server, dir.path(), &body);

    let mut prefix = body[..600].to_vec();
    prefix[42] ^= 0xff;
    tokio::fs::create_dir_all(request.destination.parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(temp_path_for(&request.destination), &prefix)
        .await
        .unwrap();

    let outcome = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();

    assert!(matches!(outcome, DownloadOutcome::Complete { .. }));
    assert_eq!(tokio::fs::read(&request.destination).await.unwrap(), body);
    assert_eq!(server.ranges(), vec![Some(600), None]);
    assert!(!temp_path_for(&request.destination).exists());
}

#[tokio::test]
async fn test_sha1_declared_hash_survives_resume_and_is_recorded() {
    let (server, dir, body) = setup().await;
    server.set_cut_at(Some(600));
    let engine = engine(dir.path(), download_config(HashPolicy::default())).await;
    let mut request = request(&server, dir.path(), &body);
    let sha1 = ContentHash::of_bytes(HashAlgorithm::Sha1, &body);
    request.declared_hash = Some(sha1.clone());

    assert!(engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .is_err());
    server.set_cut_at(None);

    let outcome = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();
    match outcome {
        DownloadOutcome::Complete {
            bytes_transferred,
            hash,
            ..
        } => {
            assert_eq!(bytes_transferred, 400);
            assert_eq!(hash, Some(sha1.clone()));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let identity = FileIdentity::for_destination(dir.path(), &request.destination);
    let record = engine.store().lookup(&identity).await.unwrap();
    assert_eq!(record.hash, sha1);
    assert_eq!(record.hash.algorithm(), HashAlgorithm::Sha1);

    let reopened = HashStore::open(HashStore::default_index_path(dir.path()))
        .await
        .unwrap();
    assert_eq!(reopened.lookup(&identity).await, Some(record));

    let outcome = engine
        .download(&request, &EventSink::disabled(), ShutdownSignal::never())
        .await
        .unwrap();
    assert_eq!(outcome, DownloadOutcome::AlreadyUpToDate);
}
