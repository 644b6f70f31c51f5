use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use chrono::{DateTime, Utc};
use docflow::config::AppConfig;
use docflow::converter::{ConversionError, ConversionRequest, ConvertedArtifact, Converter};
use docflow::models::{Document, Finalization, NewDocument};
use docflow::repository::{
    DocumentRepository, MemoryDocumentRepository, RepositoryError, RepositoryResult,
};
use docflow::routes;
use docflow::state::AppState;
use docflow::storage::{MemoryStorage, ObjectStorage};
use http_body_util::BodyExt;
use serde::Deserialize;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const FAST_OPTIONS: &str = r#"{"ocr_enabled":false,"mode":"fast"}"#;

/// What the stub converter does with each request.
#[allow(dead_code)]
#[derive(Clone)]
pub enum Behavior {
    Succeed { markdown: String, delay: Duration },
    Fail(ConversionError),
    Hang,
}

pub struct StubConverter {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl StubConverter {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    #[allow(dead_code)]
    pub fn succeeding(markdown: &str) -> Self {
        Self::new(Behavior::Succeed {
            markdown: markdown.to_string(),
            delay: Duration::ZERO,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Converter for StubConverter {
    async fn convert(
        &self,
        _request: ConversionRequest,
    ) -> Result<ConvertedArtifact, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed { markdown, delay } => {
                tokio::time::sleep(*delay).await;
                Ok(ConvertedArtifact {
                    markdown: markdown.clone(),
                })
            }
            Behavior::Fail(err) => Err(err.clone()),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

/// Delegates to the in-memory repository but refuses every insert.
#[derive(Default)]
pub struct RejectingInserts {
    inner: MemoryDocumentRepository,
}

#[async_trait]
impl DocumentRepository for RejectingInserts {
    async fn insert(&self, _document: NewDocument) -> RepositoryResult<Document> {
        Err(RepositoryError::Unavailable("insert refused".into()))
    }

    async fn find(&self, id: Uuid) -> RepositoryResult<Option<Document>> {
        self.inner.find(id).await
    }

    async fn begin_processing(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Document>> {
        self.inner.begin_processing(id, started_at).await
    }

    async fn finalize(
        &self,
        id: Uuid,
        outcome: Finalization,
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Document>> {
        self.inner.finalize(id, outcome, completed_at).await
    }

    async fn list_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Document>> {
        self.inner.list_stale_processing(cutoff).await
    }

    async fn ping(&self) -> RepositoryResult<()> {
        self.inner.ping().await
    }
}

/// Memory storage that refuses every write under `processed/`.
pub struct RejectingResults {
    inner: Arc<MemoryStorage>,
}

#[async_trait]
impl ObjectStorage for RejectingResults {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()> {
        if key.starts_with("processed/") {
            bail!("bucket quota exceeded for {key}");
        }
        self.inner.put_object(key, bytes, content_type).await
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get_object(key).await
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.inner.delete_object(key).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct UploadBody {
    pub id: Uuid,
    pub filename: String,
    pub status: String,
    pub processing_started: bool,
    pub message: String,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct StatusErrorBody {
    pub code: String,
    pub message: String,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub id: Uuid,
    pub filename: String,
    pub status: String,
    pub error: Option<StatusErrorBody>,
    pub progress: u8,
    pub progress_stage: String,
    pub completed_at: Option<String>,
    pub download_url: Option<String>,
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<MemoryStorage>,
    converter: Arc<StubConverter>,
}

impl TestApp {
    pub fn new(behavior: Behavior) -> Self {
        Self::build(
            test_config(Duration::from_secs(5)),
            Arc::new(MemoryDocumentRepository::new()),
            behavior,
        )
    }

    #[allow(dead_code)]
    pub fn with_deadline(behavior: Behavior, deadline: Duration) -> Self {
        Self::build(
            test_config(deadline),
            Arc::new(MemoryDocumentRepository::new()),
            behavior,
        )
    }

    #[allow(dead_code)]
    pub fn with_repository(documents: Arc<dyn DocumentRepository>, behavior: Behavior) -> Self {
        Self::build(test_config(Duration::from_secs(5)), documents, behavior)
    }

    #[allow(dead_code)]
    pub fn with_config(behavior: Behavior, configure: impl FnOnce(&mut AppConfig)) -> Self {
        let mut config = test_config(Duration::from_secs(5));
        configure(&mut config);
        Self::build(config, Arc::new(MemoryDocumentRepository::new()), behavior)
    }

    /// Result writes fail; raw uploads still land in [`TestApp::storage`].
    #[allow(dead_code)]
    pub fn rejecting_results(behavior: Behavior) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(RejectingResults {
            inner: storage.clone(),
        });
        Self::assemble(
            test_config(Duration::from_secs(5)),
            Arc::new(MemoryDocumentRepository::new()),
            storage,
            backend,
            behavior,
        )
    }

    fn build(
        config: AppConfig,
        documents: Arc<dyn DocumentRepository>,
        behavior: Behavior,
    ) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let backend: Arc<dyn ObjectStorage> = storage.clone();
        Self::assemble(config, documents, storage, backend, behavior)
    }

    fn assemble(
        config: AppConfig,
        documents: Arc<dyn DocumentRepository>,
        storage: Arc<MemoryStorage>,
        storage_for_state: Arc<dyn ObjectStorage>,
        behavior: Behavior,
    ) -> Self {
        let converter = Arc::new(StubConverter::new(behavior));
        let state = AppState::new(config, documents, storage_for_state, converter.clone());
        let router = routes::create_router(state.clone());
        Self {
            state,
            router,
            storage,
            converter,
        }
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<MemoryStorage> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn converter(&self) -> Arc<StubConverter> {
        self.converter.clone()
    }

    pub async fn get(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn post(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn upload(
        &self,
        filename: &str,
        content_type: &str,
        data: &[u8],
        options: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let fields: Vec<(&str, &str)> = options
            .map(|options| ("processing_options", options))
            .into_iter()
            .collect();
        self.upload_with_fields(filename, content_type, data, &fields)
            .await
    }

    /// Uploads `data` as the `file` part followed by plain text `fields`.
    pub async fn upload_with_fields(
        &self,
        filename: &str,
        content_type: &str,
        data: &[u8],
        fields: &[(&str, &str)],
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend(data);
        body.extend(b"\r\n");

        for (name, value) in fields {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend(value.as_bytes());
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    /// Uploads a small PDF with fast options and returns its id.
    #[allow(dead_code)]
    pub async fn upload_pdf(&self, filename: &str) -> Result<Uuid> {
        let response = self
            .upload(filename, "application/pdf", b"%PDF-1.7 test", Some(FAST_OPTIONS))
            .await?;
        if response.status() != axum::http::StatusCode::CREATED {
            bail!("upload failed with status {}", response.status());
        }
        let body: UploadBody = json_body(response).await?;
        Ok(body.id)
    }

    #[allow(dead_code)]
    pub async fn status(&self, id: Uuid) -> Result<StatusBody> {
        let response = self.get(&format!("/api/status/{id}")).await?;
        json_body(response).await
    }

    /// Polls the status endpoint until the document is complete or failed.
    #[allow(dead_code)]
    pub async fn wait_for_terminal(&self, id: Uuid, within: Duration) -> Result<StatusBody> {
        let started = Instant::now();
        loop {
            let status = self.status(id).await?;
            if status.status == "complete" || status.status == "failed" {
                return Ok(status);
            }
            if started.elapsed() > within {
                bail!("document {id} still {} after {within:?}", status.status);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

fn test_config(deadline: Duration) -> AppConfig {
    let mut config = AppConfig::local("http://converter.invalid");
    config.processing_timeout = deadline;
    config
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn json_body<T: for<'de> Deserialize<'de>>(response: hyper::Response<Body>) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}
