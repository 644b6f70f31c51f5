use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    config::AppConfig,
    converter::{Converter, HttpConverter},
    db,
    orchestrator::Orchestrator,
    repository::{DocumentRepository, MemoryDocumentRepository, PgDocumentRepository},
    s3,
    status::StatusService,
    storage::{ArtifactStore, ObjectStorage},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub documents: Arc<dyn DocumentRepository>,
    pub artifacts: ArtifactStore,
    pub orchestrator: Arc<Orchestrator>,
    pub status: StatusService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        documents: Arc<dyn DocumentRepository>,
        storage: Arc<dyn ObjectStorage>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        let artifacts = ArtifactStore::new(storage);
        let orchestrator = Arc::new(Orchestrator::new(
            documents.clone(),
            artifacts.clone(),
            converter,
            config.processing_timeout,
        ));
        Self {
            status: StatusService::new(documents.clone()),
            config: Arc::new(config),
            documents,
            artifacts,
            orchestrator,
        }
    }

    /// Wires the production collaborators described by `config`.
    pub async fn connect(config: AppConfig) -> anyhow::Result<Self> {
        let documents: Arc<dyn DocumentRepository> = match &config.database_url {
            Some(url) => {
                let pool = db::init_pool_with_size(url, config.database_max_pool_size)?;
                db::run_migrations(&pool).await?;
                info!(database_url = %config.redacted_database_url(), "using PostgreSQL metadata store");
                Arc::new(PgDocumentRepository::new(pool))
            }
            None => {
                warn!("DATABASE_URL not set; document metadata is kept in memory and lost on restart");
                Arc::new(MemoryDocumentRepository::new())
            }
        };
        let storage = s3::build_object_storage(&config).await?;
        let converter = Arc::new(HttpConverter::new(&config.converter_url));
        Ok(Self::new(config, documents, storage, converter))
    }
}
