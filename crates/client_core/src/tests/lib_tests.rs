use super::*;
use axum::{
    extract::{Multipart, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use fallback_store::EmptyCatalog;
use serde_json::json;
use shared::{
    domain::{LessonId, Material, SectionKind},
    error::ErrorCode,
};
use tokio::net::TcpListener;

#[derive(Clone, Copy, PartialEq, Eq)]
enum SaveReply {
    Empty,
    Canonical,
    Malformed,
}

#[derive(Clone)]
struct StoreState {
    save_reply: Arc<Mutex<SaveReply>>,
    saved: Arc<Mutex<Vec<(String, PageRecord)>>>,
    uploads: Arc<Mutex<Vec<RecordedUpload>>>,
    deletes: Arc<Mutex<Vec<DeleteFileRequest>>>,
    accept_headers: Arc<Mutex<Vec<Option<String>>>>,
}

#[derive(Debug, Clone)]
struct RecordedUpload {
    page_id: Option<String>,
    file_name: Option<String>,
    bytes: Vec<u8>,
    content_type: Option<String>,
}

impl StoreState {
    fn new(save_reply: SaveReply) -> Self {
        Self {
            save_reply: Arc::new(Mutex::new(save_reply)),
            saved: Arc::new(Mutex::new(Vec::new())),
            uploads: Arc::new(Mutex::new(Vec::new())),
            deletes: Arc::new(Mutex::new(Vec::new())),
            accept_headers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn record_accept(&self, headers: &HeaderMap) {
        self.accept_headers.lock().await.push(
            headers
                .get(header::ACCEPT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        );
    }
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn remote_lessons() -> Vec<Lesson> {
    serde_json::from_value(json!([{
        "id": "remote-lesson",
        "title": "Remote Lesson",
        "sections": [
            { "id": "remote-page", "type": "Grammar", "title": "Remote Grammar" }
        ]
    }]))
    .expect("lessons")
}

async fn list_lessons(
    State(state): State<StoreState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    state.record_accept(&headers).await;
    if query.get("l").map(String::as_str) != Some("all") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    Json(remote_lessons()).into_response()
}

async fn get_page(
    State(state): State<StoreState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    state.record_accept(&headers).await;
    match query.get("p").map(String::as_str) {
        Some("remote-page") => Json(json!({
            "id": "remote-page",
            "lesson_id": "remote-lesson",
            "content": "# Remote body",
            "images": ["https://cdn/remote.png"],
            "audios": []
        }))
        .into_response(),
        Some("section-1-1") => Json(json!({
            "id": "section-1-1",
            "markdown": "# Served remotely",
            "images": [],
            "audios": []
        }))
        .into_response(),
        Some("garbled") => (StatusCode::OK, "{not json").into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": "not_found", "message": "no such page" })),
        )
            .into_response(),
    }
}

async fn save_page(
    State(state): State<StoreState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(record): Json<PageRecord>,
) -> impl IntoResponse {
    state.record_accept(&headers).await;
    let page_id = query.get("q").cloned().unwrap_or_default();
    state.saved.lock().await.push((page_id, record.clone()));
    match *state.save_reply.lock().await {
        SaveReply::Empty => StatusCode::OK.into_response(),
        SaveReply::Canonical => {
            let mut canonical = record;
            canonical.title = Some("Canonical Title".into());
            Json(canonical).into_response()
        }
        SaveReply::Malformed => (StatusCode::OK, "<html>oops</html>").into_response(),
    }
}

async fn upload(
    State(state): State<StoreState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> impl IntoResponse {
    state.record_accept(&headers).await;
    let mut recorded = RecordedUpload {
        page_id: None,
        file_name: None,
        bytes: Vec::new(),
        content_type: header_value(&headers, header::CONTENT_TYPE),
    };
    while let Some(field) = multipart.next_field().await.expect("field") {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                recorded.file_name = field.file_name().map(str::to_string);
                recorded.bytes = field.bytes().await.expect("file bytes").to_vec();
            }
            Some("pageId") => recorded.page_id = Some(field.text().await.expect("page id")),
            _ => {}
        }
    }
    let url = format!(
        "https://cdn.example/{}",
        recorded.file_name.clone().unwrap_or_default()
    );
    state.uploads.lock().await.push(recorded);
    Json(json!({ "url": url }))
}

async fn delete_file(
    State(state): State<StoreState>,
    headers: HeaderMap,
    Json(request): Json<DeleteFileRequest>,
) -> StatusCode {
    state.record_accept(&headers).await;
    state.deletes.lock().await.push(request);
    StatusCode::NO_CONTENT
}

async fn spawn_content_store(save_reply: SaveReply) -> (String, StoreState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = StoreState::new(save_reply);
    let app = Router::new()
        .route("/lessons", get(list_lessons))
        .route("/pages", get(get_page).patch(save_page))
        .route("/upload", post(upload))
        .route("/files", delete(delete_file))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

async fn spawn_failing_store(status: StatusCode) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().fallback(move || async move {
        (
            status,
            Json(json!({ "code": "internal", "message": "store is down" })),
        )
    });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn spawn_hanging_store() -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().fallback(|| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        StatusCode::OK
    });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

/// Base url of a port nothing listens on.
async fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}

fn offline_client(base_url: String) -> RemoteContentClient {
    RemoteContentClient::new(base_url).expect("client")
}

fn sample_record(id: &str) -> PageRecord {
    PageRecord {
        id: PageId::new(id),
        lesson_id: Some(LessonId::new("lesson-1")),
        markdown: Some("# Edited offline".into()),
        images: vec!["https://cdn/edited.png".into()],
        ..PageRecord::default()
    }
}

#[tokio::test]
async fn fetch_lessons_returns_remote_tree_verbatim() {
    let (base_url, state) = spawn_content_store(SaveReply::Empty).await;
    let client = RemoteContentClient::new(base_url).expect("client");

    let lessons = client.fetch_lessons().await;

    assert!(lessons.is_remote());
    assert_eq!(lessons.value, remote_lessons());
    assert_eq!(
        state.accept_headers.lock().await.as_slice(),
        &[Some(JSON.to_string())]
    );
}

#[tokio::test]
async fn fetch_lessons_serves_seed_catalog_when_offline() {
    let client = offline_client(unreachable_base_url().await);

    let lessons = client.fetch_lessons().await;

    assert!(lessons.fallback_reason().is_some());
    assert_eq!(lessons.value, SeedCatalog::default().lessons());
    assert!(!lessons.value.is_empty());
}

#[tokio::test]
async fn fetch_lessons_falls_back_on_error_status() {
    let client = offline_client(spawn_failing_store(StatusCode::SERVICE_UNAVAILABLE).await);

    let lessons = client.fetch_lessons().await;

    let reason = lessons.fallback_reason().expect("fallback").to_string();
    assert!(reason.contains("503"), "unexpected reason: {reason}");
    assert!(reason.contains("store is down"), "unexpected reason: {reason}");
    assert_eq!(lessons.value.len(), 3);
}

#[tokio::test]
async fn fetch_page_passes_legacy_record_through_untouched() {
    let (base_url, _state) = spawn_content_store(SaveReply::Empty).await;
    let client = RemoteContentClient::new(base_url).expect("client");

    let page = client
        .fetch_page(&PageId::new("remote-page"))
        .await
        .expect("page");

    assert!(page.is_remote());
    assert_eq!(page.value.markdown, None);
    assert_eq!(page.value.content.as_deref(), Some("# Remote body"));
    assert_eq!(page.value.normalize().markdown, "# Remote body");
}

#[tokio::test]
async fn fetch_page_never_fails_for_seeded_ids_while_offline() {
    let client = offline_client(unreachable_base_url().await);
    let catalog = SeedCatalog::default();

    for page_id in catalog.page_ids() {
        let page = client.fetch_page(page_id).await.expect("seeded page");
        assert_eq!(&page.value.id, page_id);
        assert!(!page.is_remote());
    }
}

#[tokio::test]
async fn fetch_page_falls_back_when_store_does_not_know_the_page() {
    let (base_url, _state) = spawn_content_store(SaveReply::Empty).await;
    let client = RemoteContentClient::new(base_url).expect("client");

    let page = client
        .fetch_page(&PageId::new("section-2-1"))
        .await
        .expect("fallback page");

    assert!(page.fallback_reason().expect("fallback").contains("404"));
    assert!(page
        .value
        .markdown
        .as_deref()
        .unwrap_or_default()
        .starts_with("# Numbers 1-10"));
}

#[tokio::test]
async fn fetch_page_treats_garbled_body_like_an_outage() {
    let (base_url, _state) = spawn_content_store(SaveReply::Empty).await;
    let client = RemoteContentClient::new_with_fallback(
        base_url,
        Duration::from_secs(5),
        Arc::new(EmptyCatalog),
    )
    .expect("client");

    let err = client
        .fetch_page(&PageId::new("garbled"))
        .await
        .expect_err("no fallback entry");

    assert_eq!(err, ContentError::NotFound(PageId::new("garbled")));
}

#[tokio::test]
async fn fetch_page_unknown_everywhere_is_not_found() {
    let client = offline_client(unreachable_base_url().await);

    let err = client
        .fetch_page(&PageId::new("section-9-9"))
        .await
        .expect_err("unknown page");

    assert_eq!(err, ContentError::NotFound(PageId::new("section-9-9")));
}

#[tokio::test]
async fn save_page_with_empty_reply_echoes_sent_record() {
    let (base_url, state) = spawn_content_store(SaveReply::Empty).await;
    let client = RemoteContentClient::new(base_url).expect("client");
    let record = sample_record("section-1-1");

    let saved = client
        .save_page(&record.id.clone(), record.clone())
        .await
        .expect("save");

    assert!(saved.is_remote());
    assert_eq!(saved.value, record);
    let sent = state.saved.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "section-1-1");
    assert_eq!(sent[0].1, record);
}

#[tokio::test]
async fn save_page_adopts_canonical_reply() {
    let (base_url, _state) = spawn_content_store(SaveReply::Canonical).await;
    let client = RemoteContentClient::new(base_url).expect("client");
    let record = sample_record("section-1-1");

    let saved = client
        .save_page(&record.id.clone(), record)
        .await
        .expect("save");

    assert_eq!(saved.value.title.as_deref(), Some("Canonical Title"));
}

#[tokio::test]
async fn save_page_surfaces_malformed_reply() {
    let (base_url, _state) = spawn_content_store(SaveReply::Malformed).await;
    let client = RemoteContentClient::new(base_url).expect("client");
    let record = sample_record("section-1-1");

    let err = client
        .save_page(&record.id.clone(), record)
        .await
        .expect_err("malformed");

    assert!(matches!(err, ContentError::MalformedResponse(_)));
}

#[tokio::test]
async fn save_page_offline_merges_record_over_seed_entry() {
    let client = offline_client(unreachable_base_url().await);
    let mut record = sample_record("section-1-2");
    record.lesson_id = None;
    record.section_title = Some("Particles".into());

    let saved = client
        .save_page(&record.id.clone(), record)
        .await
        .expect("local echo");

    assert!(saved.fallback_reason().is_some());
    assert_eq!(saved.value.markdown.as_deref(), Some("# Edited offline"));
    assert_eq!(saved.value.images, vec!["https://cdn/edited.png".to_string()]);
    assert_eq!(saved.value.section_title.as_deref(), Some("Particles"));
    // Not sent by the caller, so the seed entry's value survives.
    assert_eq!(saved.value.lesson_id, Some(LessonId::new("lesson-1")));
}

#[tokio::test]
async fn save_page_offline_without_seed_entry_is_not_found() {
    let client = offline_client(unreachable_base_url().await);
    let record = sample_record("brand-new");

    let err = client
        .save_page(&record.id.clone(), record)
        .await
        .expect_err("nothing to merge over");

    assert_eq!(err, ContentError::NotFound(PageId::new("brand-new")));
}

#[tokio::test]
async fn requests_time_out_into_fallback() {
    let client = RemoteContentClient::new_with_fallback(
        spawn_hanging_store().await,
        Duration::from_millis(200),
        Arc::new(SeedCatalog::default()),
    )
    .expect("client");

    let page = client
        .fetch_page(&PageId::new("section-1-1"))
        .await
        .expect("fallback page");

    assert!(!page.is_remote());
}

#[tokio::test]
async fn create_lesson_patches_page_under_its_own_id() {
    let (base_url, state) = spawn_content_store(SaveReply::Empty).await;
    let client = RemoteContentClient::new(base_url).expect("client");
    let mut lesson = shared::domain::NewLesson::new("Intro", "Greetings");
    lesson.section_kind = SectionKind::Grammar;
    let page = lesson.into_page().expect("valid");
    let record = PageRecord::from(&page);

    let created = client.create_lesson(record.clone()).await.expect("create");

    assert_eq!(created.value, record);
    let sent = state.saved.lock().await;
    assert_eq!(sent[0].0, page.id.to_string());
    assert_eq!(sent[0].1.kind, Some(SectionKind::Grammar));
}

#[tokio::test]
async fn create_lesson_offline_fails_without_seed_entry() {
    let client = offline_client(unreachable_base_url().await);
    let page = shared::domain::NewLesson::new("Intro", "Greetings")
        .into_page()
        .expect("valid");

    let err = client
        .create_lesson(PageRecord::from(&page))
        .await
        .expect_err("offline create");

    assert!(matches!(err, ContentError::NotFound(_)));
}

#[tokio::test]
async fn upload_sends_multipart_file_and_page_id() {
    let (base_url, state) = spawn_content_store(SaveReply::Empty).await;
    let client = RemoteContentClient::new(base_url).expect("client");
    let file = UploadFile::new("kana.png", b"png-bytes".to_vec()).with_mime_type("image/png");

    let uploaded = client
        .upload_file(file, &PageId::new("section-1-1"))
        .await
        .expect("upload");

    assert!(uploaded.is_remote());
    assert_eq!(uploaded.value.url, "https://cdn.example/kana.png");
    let uploads = state.uploads.lock().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].page_id.as_deref(), Some("section-1-1"));
    assert_eq!(uploads[0].file_name.as_deref(), Some("kana.png"));
    assert_eq!(uploads[0].bytes, b"png-bytes".to_vec());
    let content_type = uploads[0].content_type.clone().unwrap_or_default();
    assert!(
        content_type.starts_with("multipart/form-data; boundary="),
        "unexpected content type: {content_type}"
    );
}

#[tokio::test]
async fn upload_offline_registers_session_local_blob() {
    let client = offline_client(unreachable_base_url().await);
    let file = UploadFile::new("notes.pdf", b"pdf".to_vec());

    let uploaded = client
        .upload_file(file, &PageId::new("section-1-1"))
        .await
        .expect("local url");

    assert!(uploaded.fallback_reason().is_some());
    assert!(LocalBlobs::is_local_url(&uploaded.value.url));
    let blob = client
        .local_blob(&uploaded.value.url)
        .await
        .expect("registered blob");
    assert_eq!(blob.file_name, "notes.pdf");
    assert_eq!(blob.bytes, b"pdf".to_vec());
}

#[tokio::test]
async fn upload_with_invalid_mime_type_is_a_caller_error() {
    let client = offline_client(unreachable_base_url().await);
    let file = UploadFile::new("notes.pdf", b"pdf".to_vec()).with_mime_type("definitely not a mime");

    let err = client
        .upload_file(file, &PageId::new("section-1-1"))
        .await
        .expect_err("caller error");

    assert!(matches!(err, ContentError::InvalidRequest(_)));
    assert!(!err.is_transport());
}

#[tokio::test]
async fn delete_sends_url_and_page_id() {
    let (base_url, state) = spawn_content_store(SaveReply::Empty).await;
    let client = RemoteContentClient::new(base_url).expect("client");

    client
        .delete_file("https://cdn.example/kana.png", &PageId::new("section-1-1"))
        .await
        .expect("delete");

    let deletes = state.deletes.lock().await;
    assert_eq!(
        deletes.as_slice(),
        &[DeleteFileRequest {
            url: "https://cdn.example/kana.png".into(),
            page_id: PageId::new("section-1-1"),
        }]
    );
}

#[tokio::test]
async fn delete_reports_transport_error_when_offline() {
    let client = offline_client(unreachable_base_url().await);

    let err = client
        .delete_file("https://cdn.example/kana.png", &PageId::new("section-1-1"))
        .await
        .expect_err("offline delete");

    assert!(err.is_transport());
}

#[tokio::test]
async fn delete_of_local_blob_never_touches_network() {
    let client = offline_client(unreachable_base_url().await);
    let uploaded = client
        .upload_file(UploadFile::new("a.txt", b"a".to_vec()), &PageId::new("p"))
        .await
        .expect("local url");

    client
        .delete_file(&uploaded.value.url, &PageId::new("p"))
        .await
        .expect("revoked locally");

    assert!(client.local_blob(&uploaded.value.url).await.is_none());
}

#[test]
fn merge_keeps_base_fields_the_overlay_omits() {
    let base = PageRecord {
        id: PageId::new("p"),
        lesson_id: Some(LessonId::new("lesson-1")),
        markdown: Some("seed".into()),
        title: Some("Seed title".into()),
        materials: vec![Material::from_legacy_url("https://cdn/seed.pdf")],
        ..PageRecord::default()
    };
    let overlay = PageRecord {
        id: PageId::new("p"),
        markdown: Some("edited".into()),
        ..PageRecord::default()
    };

    let merged = merge_records(base, overlay).expect("merge");

    assert_eq!(merged.markdown.as_deref(), Some("edited"));
    assert_eq!(merged.title.as_deref(), Some("Seed title"));
    assert_eq!(merged.lesson_id, Some(LessonId::new("lesson-1")));
    // Lists are always sent, so the overlay's empty list wins.
    assert!(merged.materials.is_empty());
}

#[test]
fn failure_description_includes_api_error_body() {
    let body = serde_json::to_string(&ApiError::new(ErrorCode::NotFound, "gone")).expect("encode");
    let described = describe_failure(StatusCode::NOT_FOUND, &body);
    assert_eq!(described, "404 Not Found: NotFound gone");
    assert_eq!(
        describe_failure(StatusCode::BAD_GATEWAY, "<html/>"),
        "502 Bad Gateway"
    );
}

#[test]
fn synced_map_keeps_origin() {
    let synced = Synced::fallback(2, "offline").map(|n| n * 2);
    assert_eq!(synced.value, 4);
    assert_eq!(synced.fallback_reason(), Some("offline"));
}
