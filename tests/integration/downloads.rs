//! Model download flows through the composition root: completion, cancel
//! and resume over real HTTP, retry after failure, delete fallback.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mica::download::resume;
use mica::{App, Catalog, DownloadState, ProgressEvent, ScriptedEngine};
use tokio::sync::Notify;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{ETAG, descriptor, stalling_server, test_config};

const BODY: &[u8] = b"GGUF-integration-weights-0123456789abcdefghijklmnopqrstuvwxyz";

#[tokio::test]
async fn completed_download_matches_content_length() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/small.gguf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = App::with_catalog(
        test_config(dir.path()),
        Catalog::new(vec![descriptor(&server.uri(), "small")]),
    )
    .unwrap();

    let path = app.downloads().start_download("small").await.unwrap();
    assert_eq!(app.downloads().state("small"), DownloadState::Downloaded);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), BODY.len() as u64);
    assert_eq!(app.active_model().get().as_deref(), Some("small"));

    // The selection survives a restart.
    drop(app);
    let reopened = App::with_catalog(
        test_config(dir.path()),
        Catalog::new(vec![descriptor(&server.uri(), "small")]),
    )
    .unwrap();
    assert_eq!(reopened.active_model().get().as_deref(), Some("small"));
    assert!(reopened.downloads().is_downloaded("small"));
}

#[tokio::test]
async fn cancelled_download_resumes_from_acquired_bytes() {
    let server = stalling_server(BODY, 16).await;
    let dir = tempfile::tempdir().unwrap();
    let app = App::with_catalog(
        test_config(dir.path()),
        Catalog::new(vec![descriptor(&server.base_url, "big")]),
    )
    .unwrap();
    let downloads = app.downloads().clone();

    let first_chunk = Arc::new(Notify::new());
    let notify = Arc::clone(&first_chunk);
    downloads.set_progress_callback(Box::new(move |event| {
        if let ProgressEvent::DownloadProgress {
            bytes_downloaded: 16,
            ..
        } = event
        {
            notify.notify_one();
        }
    }));

    let task = {
        let downloads = downloads.clone();
        tokio::spawn(async move { downloads.start_download("big").await })
    };
    tokio::time::timeout(Duration::from_secs(5), first_chunk.notified())
        .await
        .expect("first chunk never arrived");
    downloads.cancel_download("big").unwrap();

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.code(), "CANCELLED");
    assert_eq!(downloads.state("big"), DownloadState::NotDownloaded);
    assert_eq!(downloads.resume_offset("big"), 16);

    let path = downloads.start_download("big").await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), BODY);
    assert!(!resume::partial_path(&path).exists());

    let requests = server.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].contains("range: bytes="));
    assert!(requests[1].contains("range: bytes=16-"), "{}", requests[1]);
    assert!(requests[1].contains(&format!("if-range: {ETAG}")), "{}", requests[1]);
}

#[tokio::test]
async fn failed_download_is_retryable_without_delete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = App::with_catalog(
        test_config(dir.path()),
        Catalog::new(vec![descriptor(&server.uri(), "flaky")]),
    )
    .unwrap();

    let err = app.downloads().start_download("flaky").await.unwrap_err();
    assert_eq!(err.code(), "TRANSFER_FAILED");
    assert!(err.is_retryable());
    assert!(matches!(
        app.downloads().state("flaky"),
        DownloadState::Failed { .. }
    ));

    app.downloads().start_download("flaky").await.unwrap();
    assert_eq!(app.downloads().state("flaky"), DownloadState::Downloaded);
}

#[tokio::test]
async fn deleting_active_model_falls_back_and_unloads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = App::with_catalog(
        test_config(dir.path()),
        Catalog::new(vec![
            descriptor(&server.uri(), "first"),
            descriptor(&server.uri(), "second"),
        ]),
    )
    .unwrap();
    app.downloads().start_download("first").await.unwrap();
    app.downloads().start_download("second").await.unwrap();
    assert_eq!(app.active_model().get().as_deref(), Some("first"));

    let mut chat = app.orchestrator(Arc::new(ScriptedEngine::new()));
    chat.sync_active_model().await.unwrap();
    assert_eq!(chat.lifecycle().loaded_model(), Some("first"));

    chat.lifecycle_mut().delete_model("first").await.unwrap();
    assert_eq!(chat.lifecycle().loaded_model(), None);
    assert_eq!(app.active_model().get().as_deref(), Some("second"));
    assert_eq!(app.downloads().state("first"), DownloadState::NotDownloaded);

    // The orchestrator picks up the fallback selection.
    assert!(chat.active_model_changed());
    chat.sync_active_model().await.unwrap();
    assert_eq!(chat.lifecycle().loaded_model(), Some("second"));
}

#[tokio::test]
async fn progress_events_are_ordered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = App::with_catalog(
        test_config(dir.path()),
        Catalog::new(vec![descriptor(&server.uri(), "small")]),
    )
    .unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    app.downloads()
        .set_progress_callback(Box::new(move |event| sink.lock().unwrap().push(event)));

    app.downloads().start_download("small").await.unwrap();
    let events = events.lock().unwrap();
    assert!(matches!(
        events.first(),
        Some(ProgressEvent::DownloadStarted { resumed_from: 0, .. })
    ));
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::DownloadComplete { .. })
    ));
    assert!(events.iter().all(|e| e.model_id() == "small"));
}
