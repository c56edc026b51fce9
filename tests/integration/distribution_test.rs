//! Integration tests for download requests, pulls, and blob transfer.

mod helpers;

use axum::http::{StatusCode, header};
use serde_json::json;

use helpers::{TestApp, hash_of, parse_frames, payload_of};

#[tokio::test]
async fn test_pull_streams_available_blobs_in_order() {
    let app = TestApp::main().await;
    let token = app.user_token("alice");
    let first = app.seed(1).await;
    let second = app.seed(2).await;
    let missing = hash_of(9);
    let third = app.seed(3).await;

    let request_id = app
        .enqueue(&token, &[&first, &second, &missing, &third])
        .await;
    app.wait_for_state(&token, &request_id, "active").await;

    let response = app
        .request(
            "GET",
            &format!("/cache/get?requestId={}", request_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.headers[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    let declared: usize = response.headers[header::CONTENT_LENGTH]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(declared, response.body.len());

    let frames = parse_frames(&response.body);
    let expected: Vec<(String, Vec<u8>)> = [&first, &second, &third]
        .into_iter()
        .map(|h| (h.to_string(), payload_of(h)))
        .collect();
    assert_eq!(frames, expected);

    // A completed request leaves the queue.
    let after = app.check(&token, &request_id).await;
    assert_eq!(after.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.state.queue.stats().completed_total, 1);
}

#[tokio::test]
async fn test_enqueue_requires_token() {
    let app = TestApp::main().await;
    let hash = app.seed(1).await;

    let response = app
        .request(
            "POST",
            "/request/enqueue",
            None,
            Some(json!([hash.to_string()])),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "AUTHENTICATION");

    let response = app
        .request(
            "POST",
            "/request/enqueue",
            Some("not-a-jwt"),
            Some(json!([hash.to_string()])),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_enqueue_rejects_bad_file_lists() {
    let app = TestApp::main().await;
    let token = app.user_token("alice");

    let response = app
        .request("POST", "/request/enqueue", Some(&token), Some(json!([])))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "VALIDATION");

    let response = app
        .request(
            "POST",
            "/request/enqueue",
            Some(&token),
            Some(json!(["not-a-hash"])),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_queued_request() {
    let app = TestApp::main().await;
    let alice = app.user_token("alice");
    let bob = app.user_token("bob");
    let hash = app.seed(1).await;

    let holding = app.enqueue(&alice, &[&hash]).await;
    app.wait_for_state(&alice, &holding, "active").await;

    let waiting = app.enqueue(&bob, &[&hash]).await;
    let response = app.check(&bob, &waiting).await;
    assert_eq!(response.json()["state"], "queued");

    let response = app
        .request(
            "GET",
            &format!("/request/cancel?requestId={}", waiting),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["state"], "queued");

    let response = app.check(&bob, &waiting).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "ADMISSION_REJECTED");
}

#[tokio::test]
async fn test_finished_pull_admits_next_request() {
    let app = TestApp::main().await;
    let alice = app.user_token("alice");
    let bob = app.user_token("bob");
    let hash = app.seed(1).await;

    let first = app.enqueue(&alice, &[&hash]).await;
    app.wait_for_state(&alice, &first, "active").await;
    let second = app.enqueue(&bob, &[&hash]).await;
    assert_eq!(app.check(&bob, &second).await.json()["state"], "queued");

    let response = app
        .request(
            "GET",
            &format!("/cache/get?requestId={}", first),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    app.wait_for_state(&bob, &second, "active").await;
}

#[tokio::test]
async fn test_priority_lane_admits_past_full_normal_lane() {
    let app = TestApp::main().await;
    let alice = app.user_token("alice");
    let bob = app.user_token("bob");
    let vip = app.priority_token("carol", "Carol");
    let hash = app.seed(1).await;

    let holding = app.enqueue(&alice, &[&hash]).await;
    app.wait_for_state(&alice, &holding, "active").await;

    let normal = app.enqueue(&bob, &[&hash]).await;
    let priority = app.enqueue(&vip, &[&hash]).await;

    app.wait_for_state(&vip, &priority, "active").await;
    assert_eq!(app.check(&bob, &normal).await.json()["state"], "queued");

    let stats = app.state.queue.stats();
    assert_eq!(stats.active_normal, 1);
    assert_eq!(stats.active_priority, 1);
    assert_eq!(stats.queued_normal, 1);
}

#[tokio::test]
async fn test_check_reenqueues_unknown_request_with_file_list() {
    let app = TestApp::main().await;
    let token = app.user_token("alice");
    let hash = app.seed(1).await;
    let request_id = uuid::Uuid::new_v4().to_string();

    let response = app.check(&token, &request_id).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .request(
            "POST",
            &format!("/request/check?requestId={}", request_id),
            Some(&token),
            Some(json!([hash.to_string()])),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let state = response.json()["state"].as_str().unwrap().to_string();
    assert!(state == "queued" || state == "active", "unexpected state {state}");

    app.wait_for_state(&token, &request_id, "active").await;
}

#[tokio::test]
async fn test_requests_are_private_to_their_owner() {
    let app = TestApp::main().await;
    let alice = app.user_token("alice");
    let mallory = app.user_token("mallory");
    let hash = app.seed(1).await;

    let request_id = app.enqueue(&alice, &[&hash]).await;
    app.wait_for_state(&alice, &request_id, "active").await;

    assert_eq!(
        app.check(&mallory, &request_id).await.status,
        StatusCode::BAD_REQUEST
    );
    let response = app
        .request(
            "GET",
            &format!("/cache/get?requestId={}", request_id),
            Some(&mallory),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "ADMISSION_REJECTED");

    // Still pullable by its owner.
    assert_eq!(app.check(&alice, &request_id).await.json()["state"], "active");
}

#[tokio::test]
async fn test_pull_of_queued_request_is_rejected() {
    let app = TestApp::main().await;
    let alice = app.user_token("alice");
    let bob = app.user_token("bob");
    let hash = app.seed(1).await;

    let holding = app.enqueue(&alice, &[&hash]).await;
    app.wait_for_state(&alice, &holding, "active").await;
    let waiting = app.enqueue(&bob, &[&hash]).await;

    let response = app
        .request(
            "GET",
            &format!("/cache/get?requestId={}", waiting),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.check(&bob, &waiting).await.json()["state"], "queued");
}

#[tokio::test]
async fn test_distribution_get_requires_service_token() {
    let app = TestApp::main().await;
    let hash = app.seed(4).await;
    let uri = format!("/distribution/get?file={}", hash);

    let response = app.request("GET", &uri, None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let user = app.user_token("alice");
    let response = app.request("GET", &uri, Some(&user), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let service = app.service_token();
    let response = app.request("GET", &uri, Some(&service), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_ref(), payload_of(&hash).as_slice());

    let response = app
        .request(
            "GET",
            &format!("/distribution/get?file={}", hash_of(5)),
            Some(&service),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app
        .request("GET", "/distribution/get?file=zz", Some(&service), None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::main().await;

    let response = app.request("GET", "/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);

    let body = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["role"], "main");
    assert_eq!(body["data"]["hub"]["shard"], "main");
    assert_eq!(body["data"]["queue"]["max_active"], 2);
    assert_eq!(body["data"]["queue"]["priority_lane"], 1);
}

#[tokio::test]
async fn test_distribution_process_has_no_hub() {
    let app = TestApp::distribution("http://127.0.0.1:9").await;

    let response = app.request("GET", "/health", None, None).await;
    assert_eq!(response.json()["data"]["role"], "distribution");
    assert!(response.json()["data"]["hub"].is_null());

    let service = app.service_token();
    let response = app
        .request(
            "GET",
            &format!(
                "/main/sendReady?uid=alice&requestId={}",
                uuid::Uuid::new_v4()
            ),
            Some(&service),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.request("GET", "/hub", None, None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
