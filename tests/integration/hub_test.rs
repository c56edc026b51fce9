//! Integration tests for the hub WebSocket and the ready bridge.

mod helpers;

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use helpers::TestApp;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect_with_query(addr: SocketAddr, token: &str) -> Socket {
    let url = format!("ws://{}/hub?token={}", addr, token);
    let (socket, _) = connect_async(url).await.expect("WebSocket connect failed");
    socket
}

async fn connect_with_header(addr: SocketAddr, token: &str) -> Socket {
    let mut request = format!("ws://{}/hub", addr)
        .into_client_request()
        .unwrap();
    request.headers_mut().insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    let (socket, _) = connect_async(request).await.expect("WebSocket connect failed");
    socket
}

/// Next JSON message, skipping control frames.
async fn next_json(socket: &mut Socket) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a hub message")?;
        match frame {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Read until a message of `kind` arrives.
async fn wait_for(socket: &mut Socket, kind: &str) -> Value {
    loop {
        let msg = next_json(socket)
            .await
            .unwrap_or_else(|| panic!("socket closed while waiting for {kind}"));
        if msg["type"] == kind {
            return msg;
        }
    }
}

/// Send a call and wait for its response.
async fn call(socket: &mut Socket, id: u64, method: &str, params: Option<Value>) -> Value {
    let mut frame = json!({"id": id, "method": method});
    if let Some(params) = params {
        frame["params"] = params;
    }
    socket
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
    loop {
        let msg = wait_for(socket, "response").await;
        if msg["id"] == id {
            return msg;
        }
    }
}

#[tokio::test]
async fn test_upgrade_without_token_is_rejected() {
    let app = TestApp::main().await;
    let addr = app.serve().await;

    let url = format!("ws://{}/hub", addr);
    assert!(connect_async(url).await.is_err());

    let url = format!("ws://{}/hub?token=garbage", addr);
    assert!(connect_async(url).await.is_err());

    // A service token is not a client identity.
    let url = format!("ws://{}/hub?token={}", addr, app.service_token());
    assert!(connect_async(url).await.is_err());
}

#[tokio::test]
async fn test_welcome_and_system_info() {
    let app = TestApp::main().await;
    let addr = app.serve().await;

    let mut socket = connect_with_query(addr, &app.user_token("alice")).await;
    let info = wait_for(&mut socket, "system_info").await;
    assert_eq!(info["online_users"], 1);

    let welcome = wait_for(&mut socket, "server_message").await;
    assert_eq!(welcome["severity"], "information");
    assert!(welcome["message"].as_str().unwrap().contains("main"));

    let response = call(&mut socket, 1, "get_connection_info", None).await;
    assert_eq!(response["ok"], true);
    assert_eq!(response["result"]["user"]["uid"], "alice");
}

#[tokio::test]
async fn test_header_token_and_heartbeat() {
    let app = TestApp::main().await;
    let addr = app.serve().await;

    let mut socket = connect_with_header(addr, &app.user_token("alice")).await;
    let response = call(&mut socket, 7, "heartbeat", None).await;
    assert_eq!(response["ok"], true);
    assert_eq!(response["result"]["registered"], true);

    let response = call(&mut socket, 8, "no_such_method", None).await;
    assert_eq!(response["ok"], false);
    assert_eq!(response["error"]["code"], "VALIDATION");
}

#[tokio::test]
async fn test_pairing_announces_presence_and_relays() {
    let app = TestApp::main().await;
    let addr = app.serve().await;

    let mut alice = connect_with_query(addr, &app.user_token("alice")).await;
    let mut bob = connect_with_query(addr, &app.user_token("bob")).await;
    wait_for(&mut alice, "server_message").await;
    wait_for(&mut bob, "server_message").await;

    let response = call(&mut alice, 1, "pair_add", Some(json!({"uid": "bob"}))).await;
    assert_eq!(response["ok"], true);
    let response = call(&mut bob, 1, "pair_add", Some(json!({"uid": "alice"}))).await;
    assert_eq!(response["ok"], true);

    let online = wait_for(&mut alice, "user_online").await;
    assert_eq!(online["peer"]["user"]["uid"], "bob");

    let response = call(
        &mut alice,
        2,
        "send_payload",
        Some(json!({"recipients": ["bob", "stranger"], "payload": {"hello": "world"}})),
    )
    .await;
    assert_eq!(response["ok"], true);
    assert_eq!(response["result"]["delivered"], 1);

    let relayed = wait_for(&mut bob, "payload").await;
    assert_eq!(relayed["from"]["uid"], "alice");
    assert_eq!(relayed["payload"]["hello"], "world");

    bob.close(None).await.unwrap();
    let offline = wait_for(&mut alice, "user_offline").await;
    assert_eq!(offline["user"]["uid"], "bob");
}

#[tokio::test]
async fn test_second_connection_supersedes_first() {
    let app = TestApp::main().await;
    let addr = app.serve().await;
    let token = app.user_token("alice");

    let mut first = connect_with_query(addr, &token).await;
    wait_for(&mut first, "server_message").await;

    let mut second = connect_with_query(addr, &token).await;
    let warning = wait_for(&mut first, "server_message").await;
    assert_eq!(warning["severity"], "warning");
    while next_json(&mut first).await.is_some() {}

    let response = call(&mut second, 1, "heartbeat", None).await;
    assert_eq!(response["ok"], true);
    assert_eq!(app.engine().connections.len(), 1);
}

#[tokio::test]
async fn test_send_ready_reaches_connected_owner() {
    let app = TestApp::main().await;
    let addr = app.serve().await;

    let mut socket = connect_with_query(addr, &app.user_token("alice")).await;
    wait_for(&mut socket, "server_message").await;

    let request_id = uuid::Uuid::new_v4();
    let uri = format!("/main/sendReady?uid=alice&requestId={}", request_id);

    let user = app.user_token("alice");
    let response = app.request("GET", &uri, Some(&user), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let service = app.service_token();
    let response = app.request("GET", &uri, Some(&service), None).await;
    assert_eq!(response.status, StatusCode::OK);

    let ready = wait_for(&mut socket, "download_ready").await;
    assert_eq!(ready["request_id"], request_id.to_string());

    // An offline owner is not an error.
    let response = app
        .request(
            "GET",
            &format!("/main/sendReady?uid=nobody&requestId={}", request_id),
            Some(&service),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_local_admission_notifies_hub_client() {
    let app = TestApp::main().await;
    let addr = app.serve().await;
    let token = app.user_token("alice");

    let mut socket = connect_with_query(addr, &token).await;
    wait_for(&mut socket, "server_message").await;

    let hash = app.seed(1).await;
    let request_id = app.enqueue(&token, &[&hash]).await;

    let ready = wait_for(&mut socket, "download_ready").await;
    assert_eq!(ready["request_id"], request_id);
}

#[tokio::test]
async fn test_distribution_readiness_is_forwarded_to_main() {
    let main = TestApp::main().await;
    let main_addr = main.serve().await;
    let distribution = TestApp::distribution(&format!("http://{}", main_addr)).await;

    let mut socket = connect_with_query(main_addr, &main.user_token("alice")).await;
    wait_for(&mut socket, "server_message").await;

    // Both processes share the signing secret, so the client token works on
    // the distribution process too.
    let token = distribution.user_token("alice");
    let hash = distribution.seed(1).await;
    let request_id = distribution.enqueue(&token, &[&hash]).await;

    let ready = wait_for(&mut socket, "download_ready").await;
    assert_eq!(ready["request_id"], request_id);
}

#[tokio::test]
async fn test_departed_owner_requests_are_cancelled() {
    let app = TestApp::main().await;
    let addr = app.serve().await;
    let token = app.user_token("alice");
    let bob = app.user_token("bob");
    let hash = app.seed(1).await;

    let holding = app.enqueue(&bob, &[&hash]).await;
    app.wait_for_state(&bob, &holding, "active").await;

    let mut socket = connect_with_query(addr, &token).await;
    wait_for(&mut socket, "server_message").await;
    let waiting = app.enqueue(&token, &[&hash]).await;
    assert_eq!(app.check(&token, &waiting).await.json()["state"], "queued");

    socket.close(None).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if app.check(&token, &waiting).await.status == StatusCode::BAD_REQUEST {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "request was not cancelled");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(app.check(&bob, &holding).await.json()["state"], "active");
}

#[tokio::test]
async fn test_reaped_idle_owner_requests_are_cancelled() {
    let app = TestApp::main_with(|config| config.realtime.client_timeout_seconds = 0).await;
    let addr = app.serve().await;
    let alice = app.user_token("alice");
    let bob = app.user_token("bob");
    let hash = app.seed(1).await;

    let holding = app.enqueue(&bob, &[&hash]).await;
    app.wait_for_state(&bob, &holding, "active").await;

    let mut socket = connect_with_query(addr, &alice).await;
    wait_for(&mut socket, "server_message").await;
    let waiting = app.enqueue(&alice, &[&hash]).await;
    assert_eq!(app.check(&alice, &waiting).await.json()["state"], "queued");

    tokio::time::sleep(Duration::from_millis(10)).await;
    let report = app.engine().sweep().await;
    assert_eq!(report.reaped, 1);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if app.check(&alice, &waiting).await.status == StatusCode::BAD_REQUEST {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "request outlived its owner");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(app.check(&bob, &holding).await.json()["state"], "active");
}
