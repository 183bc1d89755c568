//! OpenDAL Operator factory for strongbox storage backends

use std::path::Path;

use anyhow::{Context, Result};
use opendal::Operator;
use sbx_core::config::{expand_tilde, StorageBackend, StorageConfig};

/// Connection settings for an S3-compatible object store
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

fn finish(op: Operator) -> Operator {
    op.layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
}

/// Build an operator for an S3-compatible endpoint (AWS, MinIO, SeaweedFS).
///
/// Path-style addressing is the opendal default, which MinIO needs.
pub fn build_s3_operator(cfg: &S3Config) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .finish();
    Ok(finish(op))
}

/// Build an operator rooted at a local directory.
pub fn build_fs_operator(root: &Path) -> Result<Operator> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("creating storage root: {}", root.display()))?;
    let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
    let op = Operator::new(builder)
        .context("creating OpenDAL fs operator")?
        .finish();
    Ok(finish(op))
}

/// In-process store; contents vanish with the operator.
pub fn build_memory_operator() -> Result<Operator> {
    let op = Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .finish();
    Ok(op)
}

/// Build the operator selected by `[storage]` in sbx.toml.
///
/// S3 credentials come from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
/// If `enforce_tls` is true and the endpoint uses HTTP, this returns an error.
pub fn build_from_core_config(storage: &StorageConfig) -> Result<Operator> {
    match storage.backend {
        StorageBackend::S3 => {
            check_endpoint_tls(storage)?;
            let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
                .context("AWS_ACCESS_KEY_ID not set (required for the s3 backend)")?;
            let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
                .context("AWS_SECRET_ACCESS_KEY not set (required for the s3 backend)")?;
            build_s3_operator(&S3Config {
                endpoint: storage.endpoint.clone(),
                region: storage.region.clone(),
                bucket: storage.bucket.clone(),
                access_key_id,
                secret_access_key,
            })
        }
        StorageBackend::Fs => build_fs_operator(&expand_tilde(&storage.root)),
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; nothing will persist past this process");
            build_memory_operator()
        }
    }
}

fn check_endpoint_tls(storage: &StorageConfig) -> Result<()> {
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }
    Ok(())
}
