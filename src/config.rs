use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;
use crate::validation::{UploadPolicy, DEFAULT_MAX_FILE_SIZE};

pub const DEFAULT_PROCESSING_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origin: Option<String>,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    pub s3_bucket: Option<String>,
    pub converter_url: String,
    pub max_file_size: usize,
    pub processing_timeout: Duration,
    pub auto_process_uploads: bool,
    pub stale_processing_after: Duration,
    pub sweep_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let aws_endpoint_url = env::var("AWS_ENDPOINT_URL").ok();
        let aws_access_key_id = env::var("AWS_ACCESS_KEY_ID").ok();
        let aws_secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok();
        let aws_region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let s3_bucket = env::var("S3_BUCKET").ok().filter(|v| !v.trim().is_empty());
        let converter_url = env::var("CONVERTER_URL").context("CONVERTER_URL must be set")?;
        Url::parse(&converter_url).context("CONVERTER_URL must be a valid URL")?;
        let max_file_size = env::var("MAX_FILE_SIZE")
            .unwrap_or_else(|_| DEFAULT_MAX_FILE_SIZE.to_string())
            .parse()
            .context("MAX_FILE_SIZE must be a byte count")?;
        let timeout_secs: u64 = env::var("PROCESSING_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_PROCESSING_TIMEOUT_SECS.to_string())
            .parse()
            .context("PROCESSING_TIMEOUT_SECS must be an integer")?;
        let auto_process_uploads = env::var("AUTO_PROCESS_UPLOADS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let stale_after_secs: u64 = match env::var("STALE_PROCESSING_AFTER_SECS") {
            Ok(value) => value
                .parse()
                .context("STALE_PROCESSING_AFTER_SECS must be an integer")?,
            Err(_) => timeout_secs.saturating_mul(2),
        };
        let sweep_interval_secs: u64 = env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| DEFAULT_SWEEP_INTERVAL_SECS.to_string())
            .parse()
            .context("SWEEP_INTERVAL_SECS must be an integer")?;

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            cors_allowed_origin,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            s3_bucket,
            converter_url,
            max_file_size,
            processing_timeout: Duration::from_secs(timeout_secs),
            auto_process_uploads,
            stale_processing_after: Duration::from_secs(stale_after_secs),
            sweep_interval: Duration::from_secs(sweep_interval_secs.max(1)),
        })
    }

    /// Defaults suitable for in-memory runs; the converter URL is still needed
    /// by [`crate::converter::HttpConverter`] but unused by other converters.
    pub fn local(converter_url: impl Into<String>) -> Self {
        Self {
            database_url: None,
            database_max_pool_size: DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: None,
            converter_url: converter_url.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            processing_timeout: Duration::from_secs(DEFAULT_PROCESSING_TIMEOUT_SECS),
            auto_process_uploads: false,
            stale_processing_after: Duration::from_secs(DEFAULT_PROCESSING_TIMEOUT_SECS * 2),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_file_size: self.max_file_size,
        }
    }

    pub fn redacted_database_url(&self) -> String {
        match &self.database_url {
            Some(raw) => redact_database_url(raw),
            None => "in-memory".to_string(),
        }
    }
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
