use serde_json::json;
use stagefs_core::{ItemKind, StagingClient, StagingError};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> StagingClient {
    let client = StagingClient::with_base_url(&format!("{}/api/v20.1", server.uri())).unwrap();
    client.set_session("test-session");
    client
}

#[tokio::test]
async fn list_items_sends_bearer_token_and_reads_next_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/items/Docs"))
        .and(query_param("recursive", "true"))
        .and(query_param("limit", "2"))
        .and(header("authorization", "Bearer test-session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseStatus": "SUCCESS",
            "responseDetails": {
                "next_page": "/api/v20.1/services/file_staging/items/cursor/abc"
            },
            "data": [
                { "path": "/Docs/A.txt", "name": "A.txt", "kind": "file", "size": 12 },
                { "path": "/Docs/B", "name": "B", "kind": "folder" }
            ]
        })))
        .mount(&server)
        .await;

    let page = client_for(&server)
        .list_items("/Docs", true, 2)
        .await
        .unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].size, 12);
    assert_eq!(page.items[1].kind, ItemKind::Folder);
    assert_eq!(
        page.next_page.as_deref(),
        Some("/api/v20.1/services/file_staging/items/cursor/abc")
    );
}

#[tokio::test]
async fn list_items_next_follows_server_relative_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/items/cursor/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseStatus": "SUCCESS",
            "data": [
                { "path": "/Docs/C.txt", "name": "C.txt", "kind": "file", "size": 3 }
            ]
        })))
        .mount(&server)
        .await;

    let page = client_for(&server)
        .list_items_next("/api/v20.1/services/file_staging/items/cursor/abc")
        .await
        .unwrap();

    assert_eq!(page.items[0].path, "/Docs/C.txt");
    assert!(page.is_last());
}

#[tokio::test]
async fn remote_errors_win_over_payload() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/items/Missing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseStatus": "FAILURE",
            "data": [],
            "errors": [
                { "type": "INVALID_DATA", "message": "Item does not exist" },
                { "type": "OTHER", "message": "ignored" }
            ]
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .list_items("/Missing", false, 100)
        .await
        .unwrap_err();

    match err {
        StagingError::Remote { kind, message } => {
            assert_eq!(kind, "INVALID_DATA");
            assert_eq!(message, "Item does not exist");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn create_folder_posts_multipart_form() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v20.1/services/file_staging/items"))
        .and(body_string_contains("name=\"kind\"\r\n\r\nfolder"))
        .and(body_string_contains("/Docs/New"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseStatus": "SUCCESS",
            "data": { "path": "/Docs/New", "name": "New", "kind": "folder" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .create_folder("/Docs/New", false)
        .await
        .unwrap();
}

#[tokio::test]
async fn move_item_returns_job() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v20.1/services/file_staging/items/Docs/A.txt"))
        .and(body_string_contains("parent=%2FArchive"))
        .and(body_string_contains("name=B.txt"))
        .and(body_string_contains("overwrite=true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseStatus": "SUCCESS",
            "data": { "job_id": 42, "url": "/api/v20.1/services/jobs/42" }
        })))
        .mount(&server)
        .await;

    let job = client_for(&server)
        .move_item("/Docs/A.txt", "/Archive", "B.txt", true)
        .await
        .unwrap();

    assert_eq!(job.job_id, 42);
}

#[tokio::test]
async fn delete_item_sends_recursive_flag() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v20.1/services/file_staging/items/Old"))
        .and(query_param("recursive", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseStatus": "SUCCESS",
            "data": { "job_id": 7 }
        })))
        .mount(&server)
        .await;

    let job = client_for(&server).delete_item("/Old", true).await.unwrap();
    assert_eq!(job.job_id, 7);
}

#[tokio::test]
async fn upload_part_sends_part_number_header() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v20.1/services/file_staging/upload/s-1"))
        .and(header("X-VaultAPI-FilePartNumber", "3"))
        .and(header("content-type", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseStatus": "SUCCESS",
            "data": { "part_number": 3, "size": 4, "part_content_md5": "abcd" }
        })))
        .mount(&server)
        .await;

    let part = client_for(&server)
        .upload_part("s-1", 3, b"data".to_vec())
        .await
        .unwrap();

    assert_eq!(part.part_number, 3);
    assert_eq!(part.size, 4);
}

#[tokio::test]
async fn list_upload_sessions_parses_progress() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseStatus": "SUCCESS",
            "data": [{
                "id": "s-9",
                "path": "/big.bin",
                "name": "big.bin",
                "size": 104857600,
                "uploaded": 10485760,
                "uploaded_parts": 2,
                "created_date": "2024-01-01T00:00:00.000Z",
                "expiration_date": "2024-01-03T00:00:00.000Z"
            }]
        })))
        .mount(&server)
        .await;

    let sessions = client_for(&server).list_upload_sessions().await.unwrap();

    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].uploaded_parts, 2);
    assert_eq!(sessions[0].uploaded_size, 10485760);
    assert_eq!(
        sessions[0].expires_at.as_deref(),
        Some("2024-01-03T00:00:00.000Z")
    );
}

#[tokio::test]
async fn job_status_exposes_results_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/jobs/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseStatus": "SUCCESS",
            "data": {
                "status": "SUCCESS",
                "links": [
                    { "rel": "self", "href": "/api/v20.1/services/jobs/42", "method": "GET" },
                    { "rel": "results", "href": "/api/v20.1/services/jobs/42/results", "method": "GET" }
                ]
            }
        })))
        .mount(&server)
        .await;

    let status = client_for(&server).job_status(42).await.unwrap();

    assert!(status.is_success());
    assert_eq!(
        status.link("results").map(|link| link.href.as_str()),
        Some("/api/v20.1/services/jobs/42/results")
    );
}

#[tokio::test]
async fn non_json_error_keeps_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/jobs/1"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client_for(&server).job_status(1).await.unwrap_err();

    assert!(matches!(err, StagingError::Api { ref body, .. } if body == "bad gateway"));
}

#[tokio::test]
async fn download_content_streams_raw_bytes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v20.1/services/file_staging/items/content/Docs/A.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
        .mount(&server)
        .await;

    let response = client_for(&server)
        .download_content("/Docs/A.txt")
        .await
        .unwrap();

    assert_eq!(response.bytes().await.unwrap().as_ref(), b"hello");
}

#[tokio::test]
async fn delete_item_keeps_reserved_characters_in_path() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v20.1/services/file_staging/items/Docs/a%23b%3Fc.txt"))
        .and(query_param("recursive", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseStatus": "SUCCESS",
            "data": { "job_id": 5 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let job = client_for(&server)
        .delete_item("/Docs/a#b?c.txt", false)
        .await
        .unwrap();

    assert_eq!(job.job_id, 5);
}
