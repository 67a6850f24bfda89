// pgopstool/src/backup/s3_upload.rs
use anyhow::{Context, Result};
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use tracing::info;

use super::planner::ExportArtifact;
use crate::config::SpacesConfig;

/// Client for an S3-compatible endpoint (DigitalOcean Spaces, MinIO, AWS).
pub(crate) async fn s3_client(spaces_config: &SpacesConfig) -> s3::Client {
    let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
        .endpoint_url(&spaces_config.endpoint_url)
        .region(Region::new(spaces_config.region.clone()))
        .credentials_provider(s3::config::Credentials::new(
            &spaces_config.access_key_id,
            &spaces_config.secret_access_key,
            None, // session_token
            None, // expiry
            "Static",
        ))
        .load()
        .await;
    s3::Client::new(&sdk_config)
}

/// `{prefix}/{host_label}/{file_name}`, or `{host_label}/{file_name}` without a prefix.
pub fn object_key(folder_prefix: Option<&str>, host_label: &str, file_name: &str) -> String {
    let host = host_label.replace(['/', '\\'], "_");
    match folder_prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}/{}/{}", prefix, host, file_name),
        None => format!("{}/{}", host, file_name),
    }
}

/// Uploads a finished export and returns its `s3://bucket/key` URI.
pub async fn upload_artifact(
    spaces_config: &SpacesConfig,
    artifact: &ExportArtifact,
    host_label: &str,
) -> Result<String> {
    let key = object_key(
        spaces_config.folder_prefix.as_deref(),
        host_label,
        &artifact.file_name,
    );
    info!(
        path = %artifact.path.display(),
        bucket = %spaces_config.bucket_name,
        key = %key,
        "uploading artifact"
    );

    let client = s3_client(spaces_config).await;
    let body = ByteStream::from_path(&artifact.path)
        .await
        .with_context(|| format!("Failed to read artifact {}", artifact.path.display()))?;

    client
        .put_object()
        .bucket(&spaces_config.bucket_name)
        .key(&key)
        .body(body)
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed to upload {} to bucket {} with key {}",
                artifact.path.display(),
                spaces_config.bucket_name,
                key
            )
        })?;

    let uri = format!("s3://{}/{}", spaces_config.bucket_name, key);
    info!(uri = %uri, "✓ artifact uploaded");
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_layout() {
        let name = "20240824020728_416001_db1_sales_backup.sql";
        assert_eq!(
            object_key(Some("backups/"), "db1", name),
            "backups/db1/20240824020728_416001_db1_sales_backup.sql"
        );
        assert_eq!(object_key(None, "db1", name), format!("db1/{}", name));
        assert_eq!(object_key(Some(""), "/var/run/pg", name), format!("_var_run_pg/{}", name));
    }
}
