use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stagefs::commands::{self, DownloadArgs, UploadArgs};
use stagefs::config::ConfigStore;
use stagefs::context::CommandContext;
use stagefs::error::EngineError;
use stagefs::job::PollSettings;
use stagefs::transfer::chunk::MIB;
use stagefs::transfer::session::multipart_upload;
use stagefs_core::StagingClient;
use tempfile::{TempDir, tempdir};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context(server: &MockServer) -> (CommandContext, TempDir) {
    let dir = tempdir().unwrap();
    let client = StagingClient::with_base_url(&format!("{}/api/v20.1", server.uri())).unwrap();
    client.set_session("test-session");
    let config = ConfigStore::open(dir.path().join("config.json")).unwrap();
    let ctx = CommandContext::new(client, config).with_poll_settings(PollSettings {
        initial_delay: Duration::from_millis(1),
        interval: Duration::from_millis(5),
        timeout: Duration::from_secs(5),
    });
    (ctx, dir)
}

fn write_file(path: &Path, len: u64) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(path, bytes).unwrap();
}

fn success(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "responseStatus": "SUCCESS", "data": data }))
}

async fn mount_part(server: &MockServer, part: u64, expected: u64) {
    Mock::given(method("PUT"))
        .and(path("/api/v20.1/services/file_staging/upload/s1"))
        .and(header("X-VaultAPI-FilePartNumber", part.to_string().as_str()))
        .respond_with(success(json!({ "part_number": part, "size": 1 })))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_commit_and_job(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v20.1/services/file_staging/upload/s1"))
        .respond_with(success(json!({ "job_id": 77, "url": "/api/v20.1/services/jobs/77" })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/jobs/77"))
        .respond_with(success(json!({ "status": "SUCCESS", "links": [] })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn resumed_session_skips_confirmed_parts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/upload"))
        .respond_with(success(json!([
            { "id": "other", "path": "/Big/other.bin", "size": 1 },
            {
                "id": "s1",
                "path": "/Big/file.bin",
                "size": 12 * MIB,
                "uploaded": 5 * MIB,
                "uploaded_parts": 1
            }
        ])))
        .mount(&server)
        .await;
    mount_part(&server, 1, 0).await;
    mount_part(&server, 2, 1).await;
    mount_part(&server, 3, 1).await;
    mount_commit_and_job(&server).await;

    let (ctx, dir) = context(&server);
    let local = dir.path().join("file.bin");
    write_file(&local, 12 * MIB);

    multipart_upload(&ctx, &local, "/Big/file.bin", false)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let part_sizes: Vec<usize> = requests
        .iter()
        .filter(|request| request.method.as_str() == "PUT")
        .map(|request| request.body.len())
        .collect();
    assert_eq!(part_sizes, [5 * MIB as usize, 2 * MIB as usize]);
    assert!(!ctx.jobs().contains(77));
    assert_eq!(
        ctx.with_config(|config| config.settings().upload_session_id.clone()),
        Some("s1".to_string())
    );
}

#[tokio::test]
async fn new_session_uploads_every_part() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/upload"))
        .respond_with(success(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v20.1/services/file_staging/upload"))
        .and(body_string_contains("/Big/file.bin"))
        .respond_with(success(json!({ "id": "s1", "path": "/Big/file.bin", "size": 6 * MIB })))
        .expect(1)
        .mount(&server)
        .await;
    mount_part(&server, 1, 1).await;
    mount_part(&server, 2, 1).await;
    mount_commit_and_job(&server).await;

    let (ctx, dir) = context(&server);
    let local = dir.path().join("file.bin");
    write_file(&local, 6 * MIB);

    multipart_upload(&ctx, &local, "/Big/file.bin", true)
        .await
        .unwrap();
}

#[tokio::test]
async fn small_files_are_rejected_for_multipart() {
    let server = MockServer::start().await;
    let (ctx, dir) = context(&server);
    let local = dir.path().join("small.bin");
    write_file(&local, 2 * MIB);

    let err = multipart_upload(&ctx, &local, "/small.bin", false)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_part_aborts_before_commit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/upload"))
        .respond_with(success(json!([
            { "id": "s1", "path": "/Big/file.bin", "size": 6 * MIB }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v20.1/services/file_staging/upload/s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseStatus": "FAILURE",
            "errors": [{ "type": "OPERATION_NOT_ALLOWED", "message": "session closed" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (ctx, dir) = context(&server);
    let local = dir.path().join("file.bin");
    write_file(&local, 6 * MIB);

    let err = multipart_upload(&ctx, &local, "/Big/file.bin", false)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Transfer { part_number: Some(1), .. }));
    let commits = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == "POST")
        .count();
    assert_eq!(commits, 0);
}

#[tokio::test]
async fn directory_upload_creates_folders_and_sends_files() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v20.1/services/file_staging/items"))
        .respond_with(success(json!({ "path": "/Remote", "name": "Remote", "kind": "folder" })))
        .mount(&server)
        .await;

    let (ctx, dir) = context(&server);
    let root = dir.path().join("tree");
    write_file(&root.join("c.txt"), 3);
    write_file(&root.join("a/b.txt"), 4);

    let args = UploadArgs {
        local: root,
        remote: "/Remote/".to_string(),
        overwrite: false,
        threads: 2,
    };
    commands::upload(Arc::new(ctx), &args).await.unwrap();

    let bodies: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| String::from_utf8_lossy(&request.body).into_owned())
        .collect();
    assert_eq!(bodies.len(), 4);
    let folders = bodies.iter().filter(|body| body.contains("folder")).count();
    assert_eq!(folders, 2);
    assert!(bodies.iter().any(|body| body.contains("/Remote/a/b.txt")));
    assert!(bodies.iter().any(|body| body.contains("/Remote/c.txt")));
}

#[tokio::test]
async fn download_mirrors_remote_tree_and_skips_folders() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/items/Docs"))
        .respond_with(success(json!([
            { "path": "/Docs/sub", "name": "sub", "kind": "folder" },
            { "path": "/Docs/a.txt", "name": "a.txt", "kind": "file", "size": 5,
              "file_content_md5": "5d41402abc4b2a76b9719d911017c592" },
            { "path": "/Docs/sub/b.txt", "name": "b.txt", "kind": "file", "size": 3 }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/items/content/Docs/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/items/content/Docs/sub/b.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"bye".to_vec()))
        .mount(&server)
        .await;

    let (ctx, dir) = context(&server);
    let local = dir.path().join("out");
    let args = DownloadArgs {
        remote: "/Docs".to_string(),
        local: local.clone(),
        recursive: true,
        threads: 3,
    };
    commands::download(Arc::new(ctx), &args).await.unwrap();

    assert_eq!(std::fs::read(local.join("a.txt")).unwrap(), b"hello");
    assert_eq!(std::fs::read(local.join("sub/b.txt")).unwrap(), b"bye");
}

#[tokio::test]
async fn failed_download_is_reported_after_the_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/items/Docs"))
        .respond_with(success(json!([
            { "path": "/Docs/good.txt", "name": "good.txt", "kind": "file" },
            { "path": "/Docs/gone.txt", "name": "gone.txt", "kind": "file" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/items/content/Docs/good.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/items/content/Docs/gone.txt"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "responseStatus": "FAILURE",
            "errors": [{ "type": "MALFORMED_URL", "message": "not found" }]
        })))
        .mount(&server)
        .await;

    let (ctx, dir) = context(&server);
    let local = dir.path().join("out");
    let args = DownloadArgs {
        remote: "/Docs".to_string(),
        local: local.clone(),
        recursive: false,
        threads: 1,
    };
    let err = commands::download(Arc::new(ctx), &args).await.unwrap_err();

    assert!(err.to_string().contains("1 of 2"));
    assert_eq!(std::fs::read(local.join("good.txt")).unwrap(), b"ok");
}
