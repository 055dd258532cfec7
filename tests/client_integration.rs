//! End-to-end tests of the client against an in-process mock backend.
//!
//! The mock speaks the same REST/SSE surface as the real service, checks
//! bearer tokens, and records every request so tests can assert on order
//! and count.

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use jsonwebtoken::{EncodingKey, Header};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use ragchat::admin::{self, NewUser};
use ragchat::auth;
use ragchat::chat::{ChatRequest, ChatSession};
use ragchat::client::ApiClient;
use ragchat::config::{ChatConfig, UploadConfig};
use ragchat::documents::ProcessRequest;
use ragchat::error::{ApiError, ChatError};
use ragchat::markdown::RenderMode;
use ragchat::progress::{UploadProgressEvent, UploadProgressReporter};
use ragchat::session::{Credentials, SessionData, SessionStore};
use ragchat::stream::HtmlTranscript;
use ragchat::tasks::{self, TaskPoller, TaskQuery};
use ragchat::upload::{UploadOptions, UploadQueue, Uploader};

// ─── Mock backend ───────────────────────────────────────────────────

#[derive(Default)]
struct Mock {
    /// Token the server currently accepts.
    valid_token: Mutex<String>,
    refresh_ok: Mutex<bool>,
    /// Reject every authenticated request, even with a fresh token.
    reject_all: Mutex<bool>,
    log: Mutex<Vec<String>>,
    chat_bodies: Mutex<Vec<Value>>,
    upload_fields: Mutex<HashMap<String, String>>,
    refreshes: Mutex<u32>,
    /// Streamed chat answers send an id and one chunk, then hang.
    stall_stream: Mutex<bool>,
}

type Shared = Arc<Mock>;

impl Mock {
    fn record(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|e| e.starts_with(prefix)).count()
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        if *self.reject_all.lock().unwrap() {
            return false;
        }
        let expected = format!("Bearer {}", self.valid_token.lock().unwrap());
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            == Some(expected.as_str())
    }
}

fn mint(expires_in: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + expires_in;
    let claims = json!({ "sub": "alice", "exp": exp, "nonce": uuid::Uuid::new_v4().to_string() });
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test")).unwrap()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Could not validate credentials" })),
    )
        .into_response()
}

async fn token(State(mock): State<Shared>, Form(form): Form<HashMap<String, String>>) -> Response {
    mock.record(format!("token:{}", form.get("username").cloned().unwrap_or_default()));
    if form.get("password").map(String::as_str) != Some("secret") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Incorrect username or password" })),
        )
            .into_response();
    }
    let access = mint(3600);
    *mock.valid_token.lock().unwrap() = access.clone();
    Json(json!({ "access_token": access, "refresh_token": "r1", "token_type": "bearer" }))
        .into_response()
}

async fn refresh(State(mock): State<Shared>, Json(body): Json<Value>) -> Response {
    mock.record("refresh");
    *mock.refreshes.lock().unwrap() += 1;
    if !*mock.refresh_ok.lock().unwrap() || body["refresh_token"] != "r1" {
        return unauthorized();
    }
    let access = mint(3600);
    *mock.valid_token.lock().unwrap() = access.clone();
    Json(json!({ "access_token": access, "token_type": "bearer" })).into_response()
}

async fn me(State(mock): State<Shared>, headers: HeaderMap) -> Response {
    if !mock.authorized(&headers) {
        mock.record("me:401");
        return unauthorized();
    }
    mock.record("me");
    Json(json!({ "username": "alice", "email": "alice@example.com", "is_admin": true }))
        .into_response()
}

async fn chat_query(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    mock.record("chat");
    mock.chat_bodies.lock().unwrap().push(body.clone());
    if body["stream"] == true && *mock.stall_stream.lock().unwrap() {
        let head = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(
                b"event: conversation_id\ndata: server-conv\n\n",
            )),
            Ok(Bytes::from_static(b"data: {\"chunk\":\"partial\"}\n\n")),
        ]);
        let body = Body::from_stream(head.chain(futures::stream::pending()));
        return ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response();
    }
    if body["stream"] == true {
        let frames = concat!(
            "event: conversation_id\ndata: conv-9\n\n",
            "data: {\"chunk\":\"Hi\"}\n\n",
            "event: conversation_id\ndata: conv-other\n\n",
            "data: {\"chunk\":\" there\"}\n\n",
            "data: [DONE]\n\n",
        );
        ([(header::CONTENT_TYPE, "text/event-stream")], frames).into_response()
    } else {
        Json(json!({
            "response": "Plain answer",
            "conversation_id": "conv-9",
            "sources": [{ "filename": "handbook.md" }]
        }))
        .into_response()
    }
}

async fn upload_one(
    State(mock): State<Shared>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    let files = read_parts(&mock, multipart, "file").await;
    let (name, _) = &files[0];
    mock.record(format!("upload:{}", name));
    Json(json!({ "document_id": format!("doc-{}", name), "filename": name })).into_response()
}

async fn upload_many(
    State(mock): State<Shared>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    let files = read_parts(&mock, multipart, "files").await;
    mock.record(format!("upload-multiple:{}", files.len()));
    let docs: Vec<Value> = files
        .iter()
        .map(|(name, _)| json!({ "id": format!("doc-{}", name), "filename": name }))
        .collect();
    Json(json!({ "documents": docs })).into_response()
}

/// Collect file parts named `file_field`; text fields go to `upload_fields`.
async fn read_parts(mock: &Mock, mut multipart: Multipart, file_field: &str) -> Vec<(String, usize)> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.unwrap();
        match file_name {
            Some(file_name) if name == file_field => files.push((file_name, data.len())),
            _ => {
                mock.upload_fields
                    .lock()
                    .unwrap()
                    .insert(name, String::from_utf8_lossy(&data).into_owned());
            }
        }
    }
    files
}

async fn process(State(mock): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    let ids = body["document_ids"].as_array().map(|a| a.len()).unwrap_or(0);
    mock.record(format!("process:{}:{}", ids, body["chunking_strategy"].as_str().unwrap_or("")));
    Json(json!({ "status": "processing", "task_id": "t-1" })).into_response()
}

async fn list_tasks(State(mock): State<Shared>, headers: HeaderMap) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    mock.record("tasks");
    Json(json!([
        { "id": "t-run", "name": "reindex", "task_type": "index", "status": "running", "priority": 2, "progress": 40 },
        { "id": "t-done", "name": "import", "task_type": "import", "status": "completed", "priority": "low" }
    ]))
    .into_response()
}

async fn get_task(State(mock): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    mock.record(format!("task:{}", id));
    let status = if id == "t-done" { "completed" } else { "running" };
    Json(json!({ "id": id, "name": "x", "task_type": "index", "status": status })).into_response()
}

async fn cancel_task(State(mock): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    mock.record(format!("cancel:{}", id));
    Json(json!({ "cancelled": true })).into_response()
}

async fn users(State(mock): State<Shared>, headers: HeaderMap) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    mock.record("users");
    Json(json!({
        "users": [
            { "username": "alice", "is_admin": true },
            { "username": "bob", "is_active": false }
        ],
        "total": 2
    }))
    .into_response()
}

async fn create_user(State(mock): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    mock.record("create-user");
    (StatusCode::CREATED, Json(json!({ "username": body["username"], "email": body["email"] })))
        .into_response()
}

async fn start_mock(mock: Shared) -> String {
    let app = Router::new()
        .route("/api/auth/token", post(token))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/me", get(me))
        .route("/api/chat/query", post(chat_query))
        .route("/api/documents/upload", post(upload_one))
        .route("/api/documents/upload-multiple", post(upload_many))
        .route("/api/documents/process", post(process))
        .route("/api/v1/tasks", get(list_tasks))
        .route("/api/v1/tasks/{id}", get(get_task))
        .route("/api/v1/tasks/{id}/cancel", post(cancel_task))
        .route("/api/admin/users", get(users).post(create_user))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{}", addr)
}

/// Mock plus a client whose session holds `access` and refresh token `r1`.
async fn setup(access: Option<String>) -> (Shared, ApiClient) {
    let mock = Arc::new(Mock::default());
    *mock.refresh_ok.lock().unwrap() = true;
    let base = start_mock(mock.clone()).await;

    let data = SessionData {
        credentials: access.map(|access_token| Credentials {
            access_token,
            refresh_token: Some("r1".into()),
            username: Some("alice".into()),
        }),
        ..SessionData::default()
    };
    let client = ApiClient::with_http(
        reqwest::Client::new(),
        &base,
        SessionStore::in_memory(data),
        300,
    );
    (mock, client)
}

/// Mock and client that are already signed in with a long-lived token.
async fn signed_in() -> (Shared, ApiClient) {
    let token = mint(3600);
    let (mock, client) = setup(Some(token.clone())).await;
    *mock.valid_token.lock().unwrap() = token;
    (mock, client)
}

#[derive(Default)]
struct Recorder(Mutex<Vec<UploadProgressEvent>>);

impl UploadProgressReporter for Recorder {
    fn report(&self, event: UploadProgressEvent) {
        self.0.lock().unwrap().push(event);
    }
}

// ─── Auth ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_stores_credentials() {
    let (mock, client) = setup(None).await;

    let err = auth::login(&client, "alice", "wrong").await.unwrap_err();
    assert_eq!(err.to_string(), "Incorrect username or password");
    assert!(client.session().credentials().await.is_none());

    auth::login(&client, "alice", "secret").await.unwrap();
    let creds = client.session().credentials().await.unwrap();
    assert_eq!(creds.refresh_token.as_deref(), Some("r1"));
    assert_eq!(creds.username.as_deref(), Some("alice"));

    let user = auth::current_user(&client).await.unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(mock.count("me"), 1);
}

#[tokio::test]
async fn test_expiring_token_refreshed_before_request() {
    let stale = mint(60);
    let (mock, client) = setup(Some(stale.clone())).await;
    // Stale token would still be accepted; the refresh must happen anyway.
    *mock.valid_token.lock().unwrap() = stale.clone();

    // The refresh handler swaps the accepted token, so "me" only succeeds
    // if the client sends the refreshed one.
    let user = auth::current_user(&client).await.unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(mock.log(), vec!["refresh", "me"]);

    let creds = client.session().credentials().await.unwrap();
    assert_ne!(creds.access_token, stale);
    assert_eq!(creds.refresh_token.as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_401_triggers_single_refresh_and_retry() {
    // Long-lived token the server no longer accepts.
    let (mock, client) = setup(Some(mint(3600))).await;
    *mock.valid_token.lock().unwrap() = "revoked".into();

    let user = auth::current_user(&client).await.unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(mock.log(), vec!["me:401", "refresh", "me"]);
}

#[tokio::test]
async fn test_second_401_clears_credentials_and_requires_login() {
    let (mock, client) = signed_in().await;
    *mock.reject_all.lock().unwrap() = true;

    let err = auth::current_user(&client).await.unwrap_err();
    match &err {
        ApiError::LoginRequired { login_url } => {
            assert!(login_url.ends_with("/login?redirect=%2Fapi%2Fauth%2Fme"), "{}", login_url);
        }
        other => panic!("expected LoginRequired, got {:?}", other),
    }
    assert_eq!(*mock.refreshes.lock().unwrap(), 1);
    assert_eq!(mock.count("me:401"), 2);
    assert!(client.session().credentials().await.is_none());
}

#[tokio::test]
async fn test_failed_refresh_clears_credentials() {
    let (mock, client) = setup(Some(mint(3600))).await;
    *mock.valid_token.lock().unwrap() = "revoked".into();
    *mock.refresh_ok.lock().unwrap() = false;

    let err = auth::current_user(&client).await.unwrap_err();
    assert!(matches!(err, ApiError::LoginRequired { .. }), "{:?}", err);
    assert_eq!(mock.log(), vec!["me:401", "refresh"]);
    assert!(client.session().credentials().await.is_none());
}

// ─── Chat ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_streaming_chat_assembles_text_and_adopts_conversation_id() {
    let (mock, client) = signed_in().await;
    let session = ChatSession::new(client.clone(), Duration::from_secs(10));

    let mut sink = HtmlTranscript::new(RenderMode::Markdown);
    let reply = session
        .send(ChatRequest::new("hello", &ChatConfig::default()), &mut sink)
        .await
        .unwrap();

    assert_eq!(reply.text, "Hi there");
    assert!(reply.streamed);
    assert_eq!(reply.conversation_id, "conv-9");
    assert!(sink.is_complete());
    assert_eq!(sink.html(), "<p>Hi there</p>\n");

    let body = mock.chat_bodies.lock().unwrap()[0].clone();
    assert_eq!(body["message"], "hello");
    assert_eq!(body["stream"], true);
    assert!(body["conversation_id"].is_string());

    let conv = client.session().conversation().await.unwrap();
    assert_eq!(conv.id, "conv-9");
    assert_eq!(conv.messages.len(), 2);
    assert_eq!(conv.messages[1].content, "Hi there");

    // Follow-up messages reuse the adopted id.
    let mut sink = HtmlTranscript::new(RenderMode::Raw);
    session
        .send(ChatRequest::new("again", &ChatConfig::default()), &mut sink)
        .await
        .unwrap();
    let body = mock.chat_bodies.lock().unwrap()[1].clone();
    assert_eq!(body["conversation_id"], "conv-9");
    assert_eq!(client.session().conversation().await.unwrap().messages.len(), 4);
}

#[tokio::test]
async fn test_non_streaming_chat() {
    let (_mock, client) = signed_in().await;
    let session = ChatSession::new(client, Duration::from_secs(10));
    let config = ChatConfig {
        stream: false,
        ..ChatConfig::default()
    };

    let mut sink = HtmlTranscript::new(RenderMode::Markdown);
    let reply = session
        .send(ChatRequest::new("hello", &config), &mut sink)
        .await
        .unwrap();
    assert_eq!(reply.text, "Plain answer");
    assert!(!reply.streamed);
    assert_eq!(reply.sources.len(), 1);
    assert_eq!(sink.renders(), 1);
}

#[tokio::test]
async fn test_stream_timeout_keeps_server_conversation_id() {
    let (mock, client) = signed_in().await;
    *mock.stall_stream.lock().unwrap() = true;
    let session = ChatSession::new(client.clone(), Duration::from_millis(500));

    let mut sink = HtmlTranscript::new(RenderMode::Markdown);
    let err = session
        .send(ChatRequest::new("hello", &ChatConfig::default()), &mut sink)
        .await
        .unwrap_err();
    let retry = match err {
        ChatError::Timeout { retry, .. } => retry,
        other => panic!("expected Timeout, got {:?}", other),
    };
    assert!(!retry.stream);
    assert_eq!(retry.message, "hello");
    assert_eq!(retry.conversation_id.as_deref(), Some("server-conv"));

    // The id is stored even though no answer arrived.
    let conv = client.session().conversation().await.unwrap();
    assert_eq!(conv.id, "server-conv");
    assert!(conv.messages.is_empty());

    // Resending the retry continues the same server conversation.
    let mut sink = HtmlTranscript::new(RenderMode::Markdown);
    let reply = session.send(*retry, &mut sink).await.unwrap();
    assert_eq!(reply.text, "Plain answer");
    let body = mock.chat_bodies.lock().unwrap()[1].clone();
    assert_eq!(body["stream"], false);
    assert_eq!(body["conversation_id"], "server-conv");
}

#[tokio::test]
async fn test_cancelled_chat_leaves_transcript_unchanged() {
    let (mock, client) = signed_in().await;
    *mock.stall_stream.lock().unwrap() = true;
    let session = ChatSession::new(client.clone(), Duration::from_secs(30));

    let mut sink = HtmlTranscript::new(RenderMode::Markdown);
    let err = session
        .send_until(
            ChatRequest::new("hello", &ChatConfig::default()),
            &mut sink,
            std::future::ready(()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Cancelled), "got {:?}", err);
    assert!(!sink.is_complete());
    assert!(client.session().conversation().await.is_none());
}

// ─── Uploads ────────────────────────────────────────────────────────

fn write_files(tmp: &TempDir) -> UploadQueue {
    let a = tmp.path().join("alpha.md");
    let b = tmp.path().join("beta.txt");
    std::fs::write(&a, "# Alpha\n\nfirst").unwrap();
    std::fs::write(&b, "second file body").unwrap();

    let mut queue = UploadQueue::new();
    queue.add_path(&a).unwrap();
    queue.add_path(&b).unwrap();
    // Same name and size again is not queued twice.
    assert!(queue.add_path(&a).is_err());
    assert_eq!(queue.len(), 2);
    queue
}

#[tokio::test]
async fn test_batch_upload_then_process() {
    let (mock, client) = signed_in().await;
    let tmp = TempDir::new().unwrap();
    let queue = write_files(&tmp);

    let recorder = Arc::new(Recorder::default());
    let uploader = Uploader::new(client, recorder.clone());
    let options = UploadOptions {
        tags: vec!["hr".into(), "policy".into(), "hr".into()],
        folder: Some("handbook".into()),
        batch: true,
        process: Some(ProcessRequest::new(Vec::new(), &UploadConfig::default())),
    };
    let summary = uploader.upload(&queue, &options).await.unwrap();

    assert_eq!(summary.uploaded.len(), 2);
    assert!(summary.failed.is_empty());
    assert!(summary.processed.is_some());
    assert_eq!(mock.log(), vec!["upload-multiple:2", "process:2:sentence"]);

    let fields = mock.upload_fields.lock().unwrap().clone();
    assert_eq!(fields.get("tags").map(String::as_str), Some("hr,policy"));
    assert_eq!(fields.get("folder").map(String::as_str), Some("handbook"));

    let events = recorder.0.lock().unwrap();
    let last_sending = events
        .iter()
        .rev()
        .find_map(|e| match e {
            UploadProgressEvent::Sending {
                overall_sent,
                overall_total,
                ..
            } => Some((*overall_sent, *overall_total)),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_sending, (queue.total_bytes(), queue.total_bytes()));
    assert!(events
        .iter()
        .any(|e| matches!(e, UploadProgressEvent::Processing { documents: 2, .. })));
}

#[tokio::test]
async fn test_sequential_upload_one_request_per_file() {
    let (mock, client) = signed_in().await;
    let tmp = TempDir::new().unwrap();
    let queue = write_files(&tmp);

    let uploader = Uploader::new(client, Arc::new(Recorder::default()));
    let options = UploadOptions {
        batch: false,
        ..UploadOptions::default()
    };
    let summary = uploader.upload(&queue, &options).await.unwrap();

    assert_eq!(summary.uploaded.len(), 2);
    assert_eq!(summary.uploaded[0].id, "doc-alpha.md");
    assert!(summary.processed.is_none());
    assert_eq!(mock.log(), vec!["upload:alpha.md", "upload:beta.txt"]);
}

#[tokio::test]
async fn test_invalid_chunking_rejected_before_upload() {
    let (mock, client) = signed_in().await;
    let tmp = TempDir::new().unwrap();
    let queue = write_files(&tmp);

    let mut process = ProcessRequest::new(Vec::new(), &UploadConfig::default());
    process.chunk_overlap = process.chunk_size;
    let uploader = Uploader::new(client, Arc::new(Recorder::default()));
    let err = uploader
        .upload(
            &queue,
            &UploadOptions {
                batch: true,
                process: Some(process),
                ..UploadOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert!(mock.log().is_empty());
}

// ─── Tasks ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_task_list_and_cancel() {
    let (mock, client) = signed_in().await;

    let list = tasks::list_tasks(&client, &TaskQuery::default()).await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].progress_percent(), 40);

    let err = tasks::cancel_task(&client, "t-done").await.unwrap_err();
    assert!(err.to_string().contains("already completed"));
    assert_eq!(mock.count("cancel:"), 0);

    tasks::cancel_task(&client, "t-run").await.unwrap();
    assert_eq!(mock.count("cancel:t-run"), 1);
}

#[tokio::test]
async fn test_stopped_poller_issues_no_requests() {
    let (mock, client) = signed_in().await;
    let updates = Arc::new(Mutex::new(0usize));
    let counter = updates.clone();

    let poller = TaskPoller::start(
        client,
        TaskQuery::default(),
        Duration::from_millis(20),
        move |result| {
            assert!(result.is_ok());
            *counter.lock().unwrap() += 1;
        },
    );

    for _ in 0..100 {
        if *updates.lock().unwrap() >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(poller.is_running());
    poller.stop().await;

    let after_stop = mock.count("tasks");
    assert!(after_stop >= 3);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(mock.count("tasks"), after_stop);
}

// ─── Admin ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_admin_users() {
    let (mock, client) = signed_in().await;

    let users = admin::list_users(&client).await.unwrap();
    assert_eq!(users.len(), 2);
    assert!(!users[1].is_active);

    let new_user = NewUser {
        username: "carol".into(),
        password: "pw-123456".into(),
        email: Some("carol@example.com".into()),
        full_name: None,
        is_admin: false,
    };
    let err = admin::create_user(&client, &new_user, "different").await.unwrap_err();
    assert_eq!(err.to_string(), "Passwords do not match");
    assert_eq!(mock.count("create-user"), 0);

    let created = admin::create_user(&client, &new_user, "pw-123456").await.unwrap();
    assert_eq!(created.username, "carol");
    assert_eq!(mock.count("create-user"), 1);
}
