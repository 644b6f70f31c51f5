use std::sync::Arc;

use anyhow::Result;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::storage::{MemoryStorage, ObjectStorage, S3Storage};

pub async fn build_client(config: &AppConfig) -> Result<S3Client> {
    let region = Region::new(config.aws_region.clone());
    let region_provider = RegionProviderChain::first_try(Some(region))
        .or_default_provider()
        .or_else("us-east-1");

    #[allow(deprecated)]
    let mut loader = aws_config::from_env().region(region_provider);

    if let Some(endpoint) = &config.aws_endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (
        config.aws_access_key_id.clone(),
        config.aws_secret_access_key.clone(),
    ) {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");
        loader = loader.credentials_provider(credentials);
    }

    let base_config = loader.load().await;
    let s3_config = S3ConfigBuilder::from(&base_config)
        .force_path_style(true)
        .build();

    Ok(S3Client::from_conf(s3_config))
}

/// S3 when a bucket is configured, otherwise a process-local store.
pub async fn build_object_storage(config: &AppConfig) -> Result<Arc<dyn ObjectStorage>> {
    match &config.s3_bucket {
        Some(bucket) => {
            let client = build_client(config).await?;
            info!(s3_bucket = %bucket, endpoint = ?config.aws_endpoint_url, "using S3 object storage");
            Ok(Arc::new(S3Storage::new(client, bucket.clone())))
        }
        None => {
            warn!("S3_BUCKET not set; artifacts are kept in memory and lost on restart");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}
