use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use fallback_store::{FallbackCatalog, SeedCatalog};
use reqwest::{
    header::ACCEPT,
    multipart::{Form, Part},
    Client, RequestBuilder, StatusCode,
};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Lesson, PageId},
    error::ApiError,
    protocol::{
        DeleteFileRequest, LessonListQuery, PageFetchQuery, PageRecord, PageSaveQuery,
        UploadResponse,
    },
};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod session;

pub use config::Settings;
pub use error::ContentError;
pub use session::{
    Completion, ContentSession, Phase, SessionError, SessionEvent, SessionOptions,
    SessionSnapshot,
};

const JSON: &str = "application/json";
const LOCAL_BLOB_PREFIX: &str = "blob:local/";

/// Where a soft-fallback result came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Remote,
    /// Locally synthesized because the remote call failed; `reason` is the
    /// swallowed transport error.
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synced<T> {
    pub value: T,
    pub origin: Origin,
}

impl<T> Synced<T> {
    pub fn remote(value: T) -> Self {
        Self {
            value,
            origin: Origin::Remote,
        }
    }

    pub fn fallback(value: T, reason: impl fmt::Display) -> Self {
        Self {
            value,
            origin: Origin::Fallback {
                reason: reason.to_string(),
            },
        }
    }

    pub fn is_remote(&self) -> bool {
        self.origin == Origin::Remote
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match &self.origin {
            Origin::Remote => None,
            Origin::Fallback { reason } => Some(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Synced<U> {
        Synced {
            value: f(self.value),
            origin: self.origin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Wire contract of the content store. None of these retry.
#[async_trait]
pub trait ContentClient: Send + Sync {
    /// Total: serves the fallback catalog when the store is unreachable.
    async fn fetch_lessons(&self) -> Synced<Vec<Lesson>>;

    /// Fails with [`ContentError::NotFound`] only when neither the store nor
    /// the fallback catalog knows the page.
    async fn fetch_page(&self, page_id: &PageId) -> Result<Synced<PageRecord>, ContentError>;

    /// Sends the complete record. An empty response body echoes `record`.
    async fn save_page(
        &self,
        page_id: &PageId,
        record: PageRecord,
    ) -> Result<Synced<PageRecord>, ContentError>;

    async fn upload_file(
        &self,
        file: UploadFile,
        page_id: &PageId,
    ) -> Result<Synced<UploadResponse>, ContentError>;

    async fn delete_file(&self, url: &str, page_id: &PageId) -> Result<(), ContentError>;

    /// Persists a record produced by the lesson-authoring form.
    async fn create_lesson(&self, record: PageRecord) -> Result<Synced<PageRecord>, ContentError> {
        let page_id = record.id.clone();
        self.save_page(&page_id, record).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBlob {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Session-scoped stand-ins for uploads that never reached the store.
///
/// The urls handed out here mean nothing outside this process.
#[derive(Default)]
pub struct LocalBlobs {
    blobs: Mutex<HashMap<String, LocalBlob>>,
}

impl LocalBlobs {
    pub fn is_local_url(url: &str) -> bool {
        url.starts_with(LOCAL_BLOB_PREFIX)
    }

    pub async fn register(&self, file: UploadFile) -> String {
        let url = format!("{LOCAL_BLOB_PREFIX}{}", Uuid::new_v4());
        self.blobs.lock().await.insert(
            url.clone(),
            LocalBlob {
                file_name: file.file_name,
                mime_type: file.mime_type,
                bytes: file.bytes,
            },
        );
        url
    }

    pub async fn get(&self, url: &str) -> Option<LocalBlob> {
        self.blobs.lock().await.get(url).cloned()
    }

    pub async fn revoke(&self, url: &str) -> bool {
        self.blobs.lock().await.remove(url).is_some()
    }
}

pub struct RemoteContentClient {
    http: Client,
    base_url: String,
    fallback: Arc<dyn FallbackCatalog>,
    blobs: LocalBlobs,
}

impl RemoteContentClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ContentError> {
        Self::new_with_fallback(
            base_url,
            Settings::default().request_timeout,
            Arc::new(SeedCatalog::default()),
        )
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ContentError> {
        Self::new_with_fallback(
            settings.api_base_url.clone(),
            settings.request_timeout,
            Arc::new(SeedCatalog::default()),
        )
    }

    pub fn new_with_fallback(
        base_url: impl Into<String>,
        request_timeout: Duration,
        fallback: Arc<dyn FallbackCatalog>,
    ) -> Result<Self, ContentError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| ContentError::Transport(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url: config::normalize_base_url(&base_url.into()),
            fallback,
            blobs: LocalBlobs::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bytes behind a url synthesized by a failed upload.
    pub async fn local_blob(&self, url: &str) -> Option<LocalBlob> {
        self.blobs.get(url).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends `request` and returns the raw body of a 2xx response.
    async fn send(&self, request: RequestBuilder) -> Result<String, ContentError> {
        let response = request.header(ACCEPT, JSON).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ContentError::Transport(describe_failure(status, &body)));
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ContentError> {
        let body = self.send(request).await?;
        decode(&body)
    }

    async fn remote_upload(
        &self,
        file: &UploadFile,
        page_id: &PageId,
    ) -> Result<UploadResponse, ContentError> {
        let mut part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
        if let Some(mime_type) = &file.mime_type {
            part = part.mime_str(mime_type).map_err(|err| {
                ContentError::InvalidRequest(format!("invalid mime type '{mime_type}': {err}"))
            })?;
        }
        let form = Form::new()
            .part("file", part)
            .text("pageId", page_id.to_string());

        // reqwest writes the multipart content type and boundary itself.
        self.send_json(self.http.post(self.url("/upload")).multipart(form))
            .await
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ContentError> {
    serde_json::from_str(body).map_err(|err| ContentError::MalformedResponse(err.to_string()))
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(api_error) => format!("{status}: {:?} {}", api_error.code, api_error.message),
        Err(_) => format!("{status}"),
    }
}

/// Lays `overlay` over `base` field by field; fields present in `overlay` win.
fn merge_records(base: PageRecord, overlay: PageRecord) -> Result<PageRecord, ContentError> {
    let to_value = |record: &PageRecord| {
        serde_json::to_value(record).map_err(|err| ContentError::MalformedResponse(err.to_string()))
    };
    let mut merged = to_value(&base)?;
    if let (Some(merged_fields), serde_json::Value::Object(overlay_fields)) =
        (merged.as_object_mut(), to_value(&overlay)?)
    {
        merged_fields.extend(overlay_fields);
    }
    serde_json::from_value(merged).map_err(|err| ContentError::MalformedResponse(err.to_string()))
}

#[async_trait]
impl ContentClient for RemoteContentClient {
    async fn fetch_lessons(&self) -> Synced<Vec<Lesson>> {
        let request = self
            .http
            .get(self.url("/lessons"))
            .query(&LessonListQuery::ALL);
        match self.send_json::<Vec<Lesson>>(request).await {
            Ok(lessons) => {
                info!(count = lessons.len(), "fetched lessons");
                Synced::remote(lessons)
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch lessons; serving fallback catalog");
                Synced::fallback(self.fallback.lessons(), err)
            }
        }
    }

    async fn fetch_page(&self, page_id: &PageId) -> Result<Synced<PageRecord>, ContentError> {
        let request = self.http.get(self.url("/pages")).query(&PageFetchQuery {
            p: page_id.clone(),
        });
        match self.send_json::<PageRecord>(request).await {
            Ok(record) => {
                info!(page_id = %page_id, "fetched page");
                Ok(Synced::remote(record))
            }
            Err(err) => {
                warn!(page_id = %page_id, error = %err, "failed to fetch page; trying fallback catalog");
                self.fallback
                    .page(page_id)
                    .map(|record| Synced::fallback(record, err))
                    .ok_or_else(|| ContentError::NotFound(page_id.clone()))
            }
        }
    }

    async fn save_page(
        &self,
        page_id: &PageId,
        record: PageRecord,
    ) -> Result<Synced<PageRecord>, ContentError> {
        let request = self
            .http
            .patch(self.url("/pages"))
            .query(&PageSaveQuery { q: page_id.clone() })
            .json(&record);
        match self.send(request).await {
            Ok(body) if body.trim().is_empty() => {
                info!(page_id = %page_id, "saved page; store echoed nothing");
                Ok(Synced::remote(record))
            }
            Ok(body) => {
                let saved = decode::<PageRecord>(&body)?;
                info!(page_id = %page_id, "saved page");
                Ok(Synced::remote(saved))
            }
            Err(err) if err.is_transport() => {
                warn!(page_id = %page_id, error = %err, "failed to save page; echoing over fallback catalog");
                let base = self
                    .fallback
                    .page(page_id)
                    .ok_or_else(|| ContentError::NotFound(page_id.clone()))?;
                Ok(Synced::fallback(merge_records(base, record)?, err))
            }
            Err(err) => Err(err),
        }
    }

    async fn upload_file(
        &self,
        file: UploadFile,
        page_id: &PageId,
    ) -> Result<Synced<UploadResponse>, ContentError> {
        match self.remote_upload(&file, page_id).await {
            Ok(uploaded) => {
                info!(page_id = %page_id, url = %uploaded.url, "uploaded file");
                Ok(Synced::remote(uploaded))
            }
            Err(err) if err.is_transport() => {
                let url = self.blobs.register(file).await;
                warn!(page_id = %page_id, error = %err, url = %url, "failed to upload file; using session-local url");
                Ok(Synced::fallback(UploadResponse { url }, err))
            }
            Err(err) => Err(err),
        }
    }

    async fn delete_file(&self, url: &str, page_id: &PageId) -> Result<(), ContentError> {
        if LocalBlobs::is_local_url(url) {
            self.blobs.revoke(url).await;
            info!(page_id = %page_id, url, "revoked session-local file");
            return Ok(());
        }

        let request = self.http.delete(self.url("/files")).json(&DeleteFileRequest {
            url: url.to_string(),
            page_id: page_id.clone(),
        });
        self.send(request).await?;
        info!(page_id = %page_id, url, "deleted file");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
