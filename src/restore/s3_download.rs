// pgopstool/src/restore/s3_download.rs
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::backup::s3_upload::s3_client;
use crate::config::SpacesConfig;

/// Splits `s3://bucket/key` into bucket and key.
pub fn parse_s3_uri(s3_uri: &str) -> Result<(String, String)> {
    let uri = url::Url::parse(s3_uri).with_context(|| format!("Invalid S3 URI format: {}", s3_uri))?;
    if uri.scheme() != "s3" {
        anyhow::bail!("S3 URI must start with s3://");
    }
    let bucket = uri.host_str().context("S3 URI missing bucket name")?.to_string();
    let key = uri.path().trim_start_matches('/').to_string();
    if key.is_empty() {
        anyhow::bail!("S3 URI missing key (object path)");
    }
    Ok((bucket, key))
}

/// Downloads `s3_uri` into `download_dir`, keeping the object's file name.
pub async fn download_artifact(
    spaces_config: &SpacesConfig,
    s3_uri: &str,
    download_dir: &Path,
) -> Result<PathBuf> {
    let (bucket, key) = parse_s3_uri(s3_uri)?;
    let file_name = key
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .with_context(|| format!("S3 key {} does not name a file", key))?;
    let destination_path = download_dir.join(file_name);

    tokio::fs::create_dir_all(download_dir)
        .await
        .with_context(|| format!("Failed to create download directory {}", download_dir.display()))?;

    info!(uri = %s3_uri, path = %destination_path.display(), "downloading artifact");

    let client = s3_client(spaces_config).await;
    let mut object = client
        .get_object()
        .bucket(&bucket)
        .key(&key)
        .send()
        .await
        .with_context(|| format!("Failed to get object s3://{}/{}", bucket, key))?;

    let mut output_file = File::create(&destination_path)
        .await
        .with_context(|| format!("Failed to create destination file {}", destination_path.display()))?;

    let mut total_bytes = 0usize;
    while let Some(chunk) = object
        .body
        .try_next()
        .await
        .with_context(|| format!("Failed to read object body s3://{}/{}", bucket, key))?
    {
        output_file
            .write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", destination_path.display()))?;
        total_bytes += chunk.len();
    }
    output_file
        .flush()
        .await
        .with_context(|| format!("Failed to flush {}", destination_path.display()))?;

    info!(bytes = total_bytes, path = %destination_path.display(), "✓ artifact downloaded");
    Ok(destination_path)
}
