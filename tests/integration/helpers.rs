//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use futures::stream;
use serde_json::Value;
use tokio::sync::watch;
use tower::ServiceExt;
use uuid::Uuid;

use terasync_api::AppState;
use terasync_auth::{JwtDecoder, JwtEncoder, PasswordHasher};
use terasync_cache::StoreManager;
use terasync_core::config::AppConfig;
use terasync_core::config::app::ServerRole;
use terasync_core::traits::ReadyNotifier;
use terasync_core::traits::storage::{BlobStore, ByteStream};
use terasync_core::types::ContentHash;
use terasync_queue::{AdmissionController, HttpReadyNotifier, QueueLimits, RequestQueue};
use terasync_realtime::bridge::MemoryShardBus;
use terasync_realtime::{HubReadyNotifier, RealtimeEngine, RealtimeServices};
use terasync_service::MemoryDirectory;
use terasync_storage::origin::TokenSource;
use terasync_storage::{LocalBlobStore, StorageManager};

/// Test application context
pub struct TestApp {
    /// The Axum app for making test requests
    pub router: Router,
    /// Shared state, for reaching the queue and engine directly
    pub state: AppState,
    /// Mints client and service tokens
    pub encoder: Arc<JwtEncoder>,
    /// Cold storage behind the local origin
    pub origin: LocalBlobStore,
    root: PathBuf,
    _shutdown: watch::Sender<bool>,
}

/// A buffered response
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }
}

/// Configuration pointing every directory into `root`.
pub fn test_config(role: ServerRole, root: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.role = role;
    config.auth.jwt_secret = "integration-test-secret".to_string();
    config.files.cache_directory = root.join("cache").to_string_lossy().into_owned();
    config.files.origin.directory = root.join("origin").to_string_lossy().into_owned();
    config.files.max_active_requests = 2;
    config.files.priority_lane_size = 1;
    config.files.admission_interval_ms = 20;
    config.realtime.shard_name = match role {
        ServerRole::Main => "main".to_string(),
        ServerRole::Distribution => "distribution-1".to_string(),
    };
    config.realtime.ping_interval_seconds = 60;
    config
}

fn temp_root() -> PathBuf {
    std::env::temp_dir().join(format!("terasync-it-{}", Uuid::new_v4()))
}

impl TestApp {
    /// A main process: hub engine, local ready notifier.
    pub async fn main() -> Self {
        let root = temp_root();
        Self::build(test_config(ServerRole::Main, &root), root).await
    }

    /// A main process with adjusted configuration.
    pub async fn main_with(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let root = temp_root();
        let mut config = test_config(ServerRole::Main, &root);
        configure(&mut config);
        Self::build(config, root).await
    }

    /// A distribution process forwarding readiness to `main_url`.
    pub async fn distribution(main_url: &str) -> Self {
        let root = temp_root();
        let mut config = test_config(ServerRole::Distribution, &root);
        config.files.notifier.kind = "http".to_string();
        config.files.notifier.main_url = main_url.to_string();
        Self::build(config, root).await
    }

    async fn build(config: AppConfig, root: PathBuf) -> Self {
        config.validate().expect("invalid test config");
        let config = Arc::new(config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let encoder = Arc::new(JwtEncoder::new(&config.auth));
        let token: TokenSource = {
            let encoder = Arc::clone(&encoder);
            let shard = config.realtime.shard_name.clone();
            Arc::new(move || encoder.issue_service_token(&shard))
        };

        let storage = Arc::new(
            StorageManager::from_config(&config.files, Arc::clone(&token))
                .await
                .expect("Failed to init storage"),
        );
        let origin = LocalBlobStore::new(&config.files.origin.directory)
            .await
            .expect("Failed to open origin directory");
        let queue = RequestQueue::new(QueueLimits::from(&config.files));

        let engine = match config.server.role {
            ServerRole::Main => {
                let stores = StoreManager::new(&config.presence)
                    .await
                    .expect("Failed to init presence store");
                let directory = Arc::new(MemoryDirectory::new());
                let engine = RealtimeEngine::new(
                    &config,
                    RealtimeServices {
                        store: stores.store(),
                        bus: Arc::new(MemoryShardBus::new(config.realtime.channel_buffer_size)),
                        directory: directory.clone(),
                        uploads: directory,
                        hasher: Arc::new(PasswordHasher::new()),
                    },
                );
                engine
                    .start_background(shutdown_rx.clone())
                    .await
                    .expect("Failed to start realtime loops");
                Some(engine)
            }
            ServerRole::Distribution => None,
        };

        let notifier: Arc<dyn ReadyNotifier> = match &engine {
            Some(engine) => Arc::new(HubReadyNotifier::new(engine.clone())),
            None => Arc::new(
                HttpReadyNotifier::new(
                    &config.files.notifier.main_url,
                    Duration::from_secs(2),
                    Arc::clone(&token),
                )
                .expect("Failed to build notifier"),
            ),
        };
        let admission = AdmissionController::new(
            queue.clone(),
            notifier,
            Duration::from_millis(config.files.admission_interval_ms),
        );
        tokio::spawn(async move { admission.run(shutdown_rx).await });

        let state = AppState::new(
            Arc::clone(&config),
            Arc::new(JwtDecoder::new(&config.auth)),
            storage,
            queue,
            engine,
        );
        let router = terasync_api::build_app(state.clone());

        Self {
            router,
            state,
            encoder,
            origin,
            root,
            _shutdown: shutdown_tx,
        }
    }

    pub fn engine(&self) -> &RealtimeEngine {
        self.state.realtime.as_ref().expect("not a main process")
    }

    /// Token for a regular client.
    pub fn user_token(&self, uid: &str) -> String {
        self.encoder
            .issue_user_token(uid, None, 3600)
            .expect("Failed to mint token")
    }

    /// Token for a client with an alias, served from the priority lane.
    pub fn priority_token(&self, uid: &str, alias: &str) -> String {
        self.encoder
            .issue_user_token(uid, Some(alias), 3600)
            .expect("Failed to mint token")
    }

    /// Token another TeraSync process would present.
    pub fn service_token(&self) -> String {
        self.encoder
            .issue_service_token("distribution-test")
            .expect("Failed to mint token")
    }

    /// Put a blob on the origin and return its hash.
    pub async fn seed(&self, n: u8) -> ContentHash {
        let hash = hash_of(n);
        let body: ByteStream = Box::pin(stream::iter(vec![Ok(Bytes::from(payload_of(&hash)))]));
        self.origin
            .write_stream(&hash, body)
            .await
            .expect("Failed to seed origin");
        hash
    }

    /// Make a request against the app.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("Failed to build request"))
            .await
            .expect("Request failed");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Enqueue `hashes` and return the request id.
    pub async fn enqueue(&self, token: &str, hashes: &[&ContentHash]) -> String {
        let files: Vec<String> = hashes.iter().map(|h| h.to_string()).collect();
        let response = self
            .request("POST", "/request/enqueue", Some(token), Some(serde_json::json!(files)))
            .await;
        assert_eq!(response.status, StatusCode::OK, "enqueue failed: {:?}", response.body);
        response
            .json()
            .as_str()
            .expect("request id is a string")
            .to_string()
    }

    /// Current state of a request as reported by `/request/check`.
    pub async fn check(&self, token: &str, request_id: &str) -> TestResponse {
        self.request(
            "GET",
            &format!("/request/check?requestId={}", request_id),
            Some(token),
            None,
        )
        .await
    }

    /// Poll until the request reaches `expected`.
    pub async fn wait_for_state(&self, token: &str, request_id: &str, expected: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let response = self.check(token, request_id).await;
            if response.status == StatusCode::OK && response.json()["state"] == expected {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "request {} never became {}",
                request_id,
                expected
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Serve the app on an ephemeral port.
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("no local addr");
        let app = self.router.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

pub fn hash_of(n: u8) -> ContentHash {
    ContentHash::parse(&format!("{n:02X}").repeat(20)).expect("valid hash")
}

pub fn payload_of(hash: &ContentHash) -> Vec<u8> {
    format!("blob body of {hash}").into_bytes()
}

/// Split a pull body into `(hash, body)` frames.
pub fn parse_frames(mut body: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut frames = Vec::new();
    while !body.is_empty() {
        assert_eq!(body[0], b'#', "frame must start with '#'");
        let end = body[1..]
            .iter()
            .position(|b| *b == b'#')
            .expect("unterminated frame header")
            + 1;
        let header = std::str::from_utf8(&body[1..end]).expect("header is utf-8");
        let (hash, len) = header.split_once(':').expect("header has a length");
        let len: usize = len.parse().expect("length is numeric");
        let start = end + 1;
        frames.push((hash.to_string(), body[start..start + len].to_vec()));
        body = &body[start + len..];
    }
    frames
}
