//! End-to-end publish runs against a local mock file host.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use quant_publisher::config::{FileHostConfig, UploadConfig, UploadTarget};
use quant_publisher::models::error::{UploadError, UploadErrorCategory};
use quant_publisher::{ArchiveUploader, FileHostUploader, PublishOutcome, PublishPipeline};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const TOKEN: &str = "raw-upload-token";

#[derive(Debug, Clone)]
struct SeenRequest {
    authorization: Option<String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

#[derive(Clone)]
struct MockHost {
    status: StatusCode,
    reply: &'static str,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockHost {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> SeenRequest {
        self.seen.lock().unwrap().last().cloned().expect("no request recorded")
    }
}

async fn handle_upload(
    State(host): State<MockHost>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    host.hits.fetch_add(1, Ordering::SeqCst);

    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    host.seen.lock().unwrap().push(SeenRequest {
        authorization: header_str(header::AUTHORIZATION),
        content_type: header_str(header::CONTENT_TYPE),
        body: body.to_vec(),
    });

    (host.status, host.reply)
}

/// Serve `reply` with `status` on an ephemeral port; returns `host:port`.
async fn spawn_host(status: StatusCode, reply: &'static str) -> (String, MockHost) {
    let host = MockHost {
        status,
        reply,
        hits: Arc::new(AtomicUsize::new(0)),
        seen: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/api/upload", post(handle_upload))
        .with_state(host.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr.to_string(), host)
}

fn zipline(domain: &str, token: &str) -> UploadConfig {
    UploadConfig {
        enabled: true,
        target: UploadTarget::Zipline(FileHostConfig::new(domain, token).with_scheme("http")),
    }
}

fn write_artifact(temp: &TempDir) -> PathBuf {
    let dir = temp.path().join("tiny-llm-4bit");
    std::fs::create_dir_all(dir.join("weights")).unwrap();
    std::fs::write(dir.join("config.json"), br#"{"quantization_config":{"bits":4}}"#).unwrap();
    std::fs::write(dir.join("weights/model.safetensors"), vec![42u8; 8192]).unwrap();
    dir
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn archive_of(dir: &Path) -> PathBuf {
    dir.with_file_name("tiny-llm-4bit.tar.gz")
}

#[tokio::test]
async fn test_successful_upload_returns_url_and_removes_archive() {
    let (domain, host) = spawn_host(StatusCode::OK, r#"{"files":[{"url":"https://x/y"}]}"#).await;
    let temp = TempDir::new().unwrap();
    let dir = write_artifact(&temp);

    let report = PublishPipeline::from_config(&zipline(&domain, TOKEN))
        .run(&dir)
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        PublishOutcome::Uploaded {
            url: "https://x/y".to_string(),
            archive_removed: true
        }
    );
    assert!(!archive_of(&dir).exists());
    assert!(dir.join("config.json").is_file());
    assert_eq!(host.hits(), 1);
}

#[tokio::test]
async fn test_request_shape() {
    let (domain, host) = spawn_host(StatusCode::OK, r#"{"files":[{"url":"https://x/y"}]}"#).await;
    let temp = TempDir::new().unwrap();
    let dir = write_artifact(&temp);

    let archive = quant_publisher::ArtifactCompressor::compress(&dir).await.unwrap();
    let archive_bytes = std::fs::read(&archive.path).unwrap();

    let uploader = FileHostUploader::new(FileHostConfig::new(&domain, TOKEN).with_scheme("http")).unwrap();
    let url = uploader.upload(&archive.path).await.unwrap();
    assert_eq!(url, "https://x/y");

    let request = host.last_request();
    assert_eq!(request.authorization.as_deref(), Some(TOKEN));
    assert!(request
        .content_type
        .as_deref()
        .unwrap_or_default()
        .starts_with("multipart/form-data"));
    assert!(contains(&request.body, br#"name="file""#));
    assert!(contains(&request.body, br#"filename="tiny-llm-4bit.tar.gz""#));
    assert!(contains(&request.body, &archive_bytes));

    // Uploading alone never deletes the archive
    assert!(archive.path.is_file());
}

#[tokio::test]
async fn test_server_error_keeps_archive_unchanged() {
    let (domain, host) = spawn_host(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").await;
    let temp = TempDir::new().unwrap();
    let dir = write_artifact(&temp);

    let report = PublishPipeline::from_config(&zipline(&domain, TOKEN))
        .run(&dir)
        .await
        .unwrap();

    match &report.outcome {
        PublishOutcome::UploadFailed { category, message } => {
            assert_eq!(*category, UploadErrorCategory::Transport);
            assert!(message.contains("500"));
            assert!(message.contains("upstream exploded"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let kept = std::fs::read(archive_of(&dir)).unwrap();
    assert_eq!(kept.len() as u64, report.archive.size);
    assert!(contains(&host.last_request().body, &kept));
}

#[tokio::test]
async fn test_empty_files_is_protocol_failure() {
    let (domain, host) = spawn_host(StatusCode::OK, r#"{"files":[]}"#).await;
    let temp = TempDir::new().unwrap();
    let dir = write_artifact(&temp);

    let report = PublishPipeline::from_config(&zipline(&domain, TOKEN))
        .run(&dir)
        .await
        .unwrap();

    assert!(matches!(
        report.outcome,
        PublishOutcome::UploadFailed {
            category: UploadErrorCategory::Protocol,
            ..
        }
    ));
    assert!(archive_of(&dir).is_file());
    assert_eq!(host.hits(), 1);
}

#[tokio::test]
async fn test_extra_file_entries_do_not_fail_upload() {
    let (domain, host) = spawn_host(StatusCode::OK, r#"{"files":[{"url":"https://x/y"}, 5]}"#).await;
    let temp = TempDir::new().unwrap();
    let dir = write_artifact(&temp);

    let report = PublishPipeline::from_config(&zipline(&domain, TOKEN))
        .run(&dir)
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        PublishOutcome::Uploaded {
            url: "https://x/y".to_string(),
            archive_removed: true
        }
    );
    assert!(!archive_of(&dir).exists());
    assert_eq!(host.hits(), 1);
}

#[tokio::test]
async fn test_non_json_body_is_protocol_failure() {
    let (domain, _host) = spawn_host(StatusCode::OK, "<html>ok</html>").await;
    let temp = TempDir::new().unwrap();
    let dir = write_artifact(&temp);
    let archive = quant_publisher::ArtifactCompressor::compress(&dir).await.unwrap();

    let err = FileHostUploader::new(FileHostConfig::new(&domain, TOKEN).with_scheme("http"))
        .unwrap()
        .upload(&archive.path)
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Protocol { .. }));
    assert!(err.to_string().contains("<html>ok</html>"));
}

#[tokio::test]
async fn test_disabled_upload_makes_no_requests() {
    let (domain, host) = spawn_host(StatusCode::OK, r#"{"files":[{"url":"https://x/y"}]}"#).await;
    let temp = TempDir::new().unwrap();
    let dir = write_artifact(&temp);

    let mut config = zipline(&domain, TOKEN);
    config.enabled = false;
    let report = PublishPipeline::from_config(&config).run(&dir).await.unwrap();

    assert_eq!(report.outcome, PublishOutcome::Disabled);
    assert!(archive_of(&dir).is_file());
    assert_eq!(host.hits(), 0);
}

#[tokio::test]
async fn test_empty_token_makes_no_requests() {
    let (domain, host) = spawn_host(StatusCode::OK, r#"{"files":[{"url":"https://x/y"}]}"#).await;
    let temp = TempDir::new().unwrap();
    let dir = write_artifact(&temp);

    let report = PublishPipeline::from_config(&zipline(&domain, ""))
        .run(&dir)
        .await
        .unwrap();

    assert!(matches!(
        report.outcome,
        PublishOutcome::UploadFailed {
            category: UploadErrorCategory::Configuration,
            ..
        }
    ));
    assert!(archive_of(&dir).is_file());
    assert_eq!(host.hits(), 0);
}

#[tokio::test]
async fn test_unreachable_host_is_transport_failure() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let domain = listener.local_addr().unwrap().to_string();
    drop(listener);

    let temp = TempDir::new().unwrap();
    let dir = write_artifact(&temp);

    let report = PublishPipeline::from_config(&zipline(&domain, TOKEN))
        .run(&dir)
        .await
        .unwrap();

    assert!(matches!(
        report.outcome,
        PublishOutcome::UploadFailed {
            category: UploadErrorCategory::Transport,
            ..
        }
    ));
    assert!(archive_of(&dir).is_file());
}
