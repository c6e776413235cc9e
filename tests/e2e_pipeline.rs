//! End-to-end tests: registry → dispatcher → pipeline → local storage over HTTP
//!
//! Remote media is served by a wiremock server, files land in a temp directory.

mod common;

use common::{
    fast_config, files_under, files_with_extension, registry_with_album, serve, serve_status,
    trip_item, wait_for_event,
};
use media_dumper::{Config, Event, Pipeline, Social};
use std::time::Duration;
use wiremock::MockServer;

#[tokio::test]
async fn test_duplicate_urls_in_one_album_yield_one_file() {
    let server = MockServer::start().await;
    serve(&server, "/a.jpg", b"jpeg-bytes").await;
    let url = format!("{}/a.jpg", server.uri());

    let config = fast_config();
    let registry = registry_with_album(
        &config,
        vec![
            trip_item(&url, "https://vk.com/photo1_1"),
            trip_item(&url, "https://vk.com/photo1_2"),
        ],
    );
    let pipeline = Pipeline::start(&config, registry.resolve_storage(None).unwrap()).unwrap();
    let social = Social::from_registry(&registry, "mock", "token", pipeline.handle()).unwrap();

    let temp_dir = tempfile::tempdir().unwrap();
    let out = temp_dir.path().join("out");
    let report = social.download_all_albums(&out).await.unwrap().wait().await;
    pipeline.handle().wait_idle().await;

    assert!(report.is_success());
    assert_eq!(report.items_queued, 2);
    let files = files_under(&out.join("Trip"));
    assert_eq!(files.len(), 1, "got {files:?}");
    assert_eq!(std::fs::read(&files[0]).unwrap(), b"jpeg-bytes");
    assert!(
        files[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("a.jpg_")
    );

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_media_leaves_failure_record() {
    let server = MockServer::start().await;
    serve_status(&server, "/gone.jpg", 404).await;
    serve(&server, "/ok.jpg", b"ok").await;

    let config = fast_config();
    let registry = registry_with_album(
        &config,
        vec![
            trip_item(&format!("{}/gone.jpg", server.uri()), "https://vk.com/photo5_9"),
            trip_item(&format!("{}/ok.jpg", server.uri()), "https://vk.com/photo5_10"),
        ],
    );
    let pipeline = Pipeline::start(&config, registry.resolve_storage(None).unwrap()).unwrap();
    let mut events = pipeline.subscribe();
    let social = Social::from_registry(&registry, "mock", "", pipeline.handle()).unwrap();

    let temp_dir = tempfile::tempdir().unwrap();
    social
        .download_all_albums(temp_dir.path())
        .await
        .unwrap()
        .wait()
        .await;
    pipeline.handle().wait_idle().await;

    let records = files_with_extension(temp_dir.path(), "txt");
    assert_eq!(records, vec![temp_dir.path().join("Trip").join("photo5_9.txt")]);
    assert_eq!(
        std::fs::read_to_string(&records[0]).unwrap(),
        "https://vk.com/photo5_9"
    );
    assert_eq!(files_with_extension(temp_dir.path(), "jpg").len(), 1);

    let failed = wait_for_event(&mut events, Duration::from_secs(1), |e| {
        matches!(e, Event::ItemFailed { .. })
    })
    .await;
    assert!(failed.is_some());

    // 404 is terminal: exactly one request for the missing file
    let gone_requests = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/gone.jpg")
        .count();
    assert_eq!(gone_requests, 1);
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_server_errors_are_retried_to_success() {
    let server = MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path("/flaky.jpg"))
        .respond_with(wiremock::ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    serve(&server, "/flaky.jpg", b"finally").await;

    let config = fast_config();
    let registry = registry_with_album(
        &config,
        vec![trip_item(&format!("{}/flaky.jpg", server.uri()), "p")],
    );
    let pipeline = Pipeline::start(&config, registry.resolve_storage(None).unwrap()).unwrap();
    let social = Social::from_registry(&registry, "mock", "", pipeline.handle()).unwrap();

    let temp_dir = tempfile::tempdir().unwrap();
    social
        .download_all_albums(temp_dir.path())
        .await
        .unwrap()
        .wait()
        .await;
    pipeline.handle().wait_idle().await;

    let files = files_under(temp_dir.path());
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0]).unwrap(), b"finally");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_config_file_drives_pipeline() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("config.json");
    std::fs::write(
        &config_path,
        r#"{
            "pipeline": { "workers": 2, "queue_capacity": 8 },
            "retry": { "schedule": [0.01, 0.01] },
            "metadata": { "enabled": false }
        }"#,
    )
    .unwrap();

    let config = Config::from_json_file(&config_path).await.unwrap();
    assert_eq!(config.pipeline.workers, 2);
    assert_eq!(config.pipeline.queue_capacity(), 8);
    assert_eq!(config.pipeline.conversation_concurrency, 5);
    assert_eq!(config.retry.schedule.len(), 2);

    let server = MockServer::start().await;
    serve(&server, "/b.jpg", b"b").await;
    let registry = registry_with_album(&config, vec![trip_item(&format!("{}/b.jpg", server.uri()), "p")]);
    let pipeline = Pipeline::start(&config, registry.resolve_storage(Some("fs")).unwrap()).unwrap();
    let social = Social::from_registry(&registry, "mock", "", pipeline.handle()).unwrap();

    let out = temp_dir.path().join("out");
    social.download_all_albums(&out).await.unwrap().wait().await;
    pipeline.handle().wait_idle().await;

    assert_eq!(files_under(&out).len(), 1);
    pipeline.shutdown().await.unwrap();
}
