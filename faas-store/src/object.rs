use std::path::{Path, PathBuf};

use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::StoreError;

/// Deterministic object key layout for sources and artifacts.
///
/// Source file:      <source-prefix>/<workspace>/<task>/<relative-path>
/// Source prefix:    <source-prefix>/<workspace>/<task>/
/// Artifact file:    <artifact-prefix>/<task>/<filename>
/// Artifact prefix:  <artifact-prefix>/<task>/
#[derive(Clone, Debug)]
pub struct KeyLayout {
    pub bucket: String,
    pub source_prefix: String,
    pub artifact_prefix: String,
}

impl KeyLayout {
    pub fn new(
        bucket: impl Into<String>,
        source_prefix: impl Into<String>,
        artifact_prefix: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            source_prefix: source_prefix.into(),
            artifact_prefix: artifact_prefix.into(),
        }
    }

    pub fn source_key(&self, workspace_id: &str, task_id: &str, relative: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.source_prefix, workspace_id, task_id, relative
        )
    }

    pub fn source_prefix_key(&self, workspace_id: &str, task_id: &str) -> String {
        format!("{}/{}/{}/", self.source_prefix, workspace_id, task_id)
    }

    pub fn artifact_key(&self, task_id: &str, filename: &str) -> String {
        format!("{}/{}/{}", self.artifact_prefix, task_id, filename)
    }

    pub fn artifact_prefix_key(&self, task_id: &str) -> String {
        format!("{}/{}/", self.artifact_prefix, task_id)
    }

    pub fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    pub fn source_uri(&self, workspace_id: &str, task_id: &str, relative: &str) -> String {
        self.uri(&self.source_key(workspace_id, task_id, relative))
    }

    pub fn source_prefix_uri(&self, workspace_id: &str, task_id: &str) -> String {
        self.uri(&self.source_prefix_key(workspace_id, task_id))
    }

    pub fn artifact_uri(&self, task_id: &str, filename: &str) -> String {
        self.uri(&self.artifact_key(task_id, filename))
    }

    pub fn artifact_prefix_uri(&self, task_id: &str) -> String {
        self.uri(&self.artifact_prefix_key(task_id))
    }
}

/// Split a scheme-qualified `s3://bucket/key` uri into bucket and key.
pub fn parse_s3_uri(uri: &str) -> Result<(String, String), StoreError> {
    let rest = uri
        .strip_prefix("s3://")
        .ok_or_else(|| StoreError::InvalidUri(uri.to_string()))?;
    let (bucket, key) = match rest.split_once('/') {
        Some((bucket, key)) => (bucket, key),
        None => (rest, ""),
    };
    if bucket.is_empty() {
        return Err(StoreError::InvalidUri(uri.to_string()));
    }
    Ok((bucket.to_string(), key.to_string()))
}

/// S3-backed store for source trees and build artifacts.
pub struct ObjectStore {
    client: aws_sdk_s3::Client,
    layout: KeyLayout,
}

impl ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, layout: KeyLayout) -> Self {
        Self { client, layout }
    }

    pub async fn connect(settings: &faas_config::Settings) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.aws_region.clone()))
            .load()
            .await;
        Self::new(
            aws_sdk_s3::Client::new(&config),
            KeyLayout::new(
                settings.s3_bucket.clone(),
                settings.source_prefix.clone(),
                settings.artifact_prefix.clone(),
            ),
        )
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    async fn upload_file(&self, path: &Path, key: &str) -> Result<String, StoreError> {
        if !path.exists() {
            return Err(StoreError::FileNotFound(path.to_path_buf()));
        }
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
        self.client
            .put_object()
            .bucket(&self.layout.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(StoreError::s3)?;
        debug!(key, "uploaded object");
        Ok(self.layout.uri(key))
    }

    /// Upload a single source file under the task's source prefix.
    pub async fn upload_source(
        &self,
        workspace_id: &str,
        task_id: &str,
        path: &Path,
    ) -> Result<String, StoreError> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| StoreError::FileNotFound(path.to_path_buf()))?;
        let key = self.layout.source_key(workspace_id, task_id, &filename);
        self.upload_file(path, &key).await
    }

    /// Mirror a whole source tree, preserving relative paths. Fails on the
    /// first upload error.
    pub async fn upload_source_directory(
        &self,
        workspace_id: &str,
        task_id: &str,
        directory: &Path,
    ) -> Result<String, StoreError> {
        if !directory.is_dir() {
            return Err(StoreError::NotADirectory(directory.to_path_buf()));
        }
        for entry in WalkDir::new(directory) {
            let entry = entry.map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(directory)
                .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
            let key =
                self.layout
                    .source_key(workspace_id, task_id, &relative.to_string_lossy());
            self.upload_file(entry.path(), &key).await?;
        }
        let prefix = self.layout.source_prefix_uri(workspace_id, task_id);
        info!(%prefix, "uploaded source tree");
        Ok(prefix)
    }

    /// Upload a build artifact under the task's artifact prefix.
    pub async fn upload_artifact(&self, task_id: &str, path: &Path) -> Result<String, StoreError> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| StoreError::FileNotFound(path.to_path_buf()))?;
        let key = self.layout.artifact_key(task_id, &filename);
        self.upload_file(path, &key).await
    }

    /// Reconstruct a source tree from a scheme-qualified prefix uri into a
    /// local directory, creating intermediate directories as needed.
    pub async fn download_source_directory(
        &self,
        s3_uri: &str,
        local_dir: &Path,
    ) -> Result<PathBuf, StoreError> {
        let (bucket, prefix) = parse_s3_uri(s3_uri)?;
        let prefix = prefix.trim_end_matches('/').to_string();

        tokio::fs::create_dir_all(local_dir).await?;

        let mut downloaded = 0usize;
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&bucket)
            .prefix(&prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(StoreError::s3)?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let relative = key[prefix.len()..].trim_start_matches('/');
                if relative.is_empty() {
                    continue;
                }
                let target = local_dir.join(relative);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let response = self
                    .client
                    .get_object()
                    .bucket(&bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(StoreError::s3)?;
                let bytes = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
                    .into_bytes();
                tokio::fs::write(&target, &bytes).await?;
                downloaded += 1;
            }
        }

        if downloaded == 0 {
            return Err(StoreError::EmptyPrefix(s3_uri.to_string()));
        }
        info!(count = downloaded, %s3_uri, "downloaded source tree");
        Ok(local_dir.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> KeyLayout {
        KeyLayout::new("code-bucket", "build-sources", "build-artifacts")
    }

    #[test]
    fn source_key_layout_is_exact() {
        let l = layout();
        assert_eq!(
            l.source_key("ws-1", "t-1", "app.py"),
            "build-sources/ws-1/t-1/app.py"
        );
        assert_eq!(
            l.source_key("ws-1", "t-1", "lib/util.py"),
            "build-sources/ws-1/t-1/lib/util.py"
        );
        assert_eq!(l.source_prefix_key("ws-1", "t-1"), "build-sources/ws-1/t-1/");
    }

    #[test]
    fn artifact_key_layout_is_exact() {
        let l = layout();
        assert_eq!(
            l.artifact_key("t-1", "app.wasm"),
            "build-artifacts/t-1/app.wasm"
        );
        assert_eq!(l.artifact_prefix_key("t-1"), "build-artifacts/t-1/");
    }

    #[test]
    fn uris_are_scheme_qualified() {
        let l = layout();
        assert_eq!(
            l.source_prefix_uri("ws-1", "t-1"),
            "s3://code-bucket/build-sources/ws-1/t-1/"
        );
        assert_eq!(
            l.artifact_uri("t-1", "app.wasm"),
            "s3://code-bucket/build-artifacts/t-1/app.wasm"
        );
    }

    #[test]
    fn parse_uri_roundtrip() {
        let (bucket, key) = parse_s3_uri("s3://code-bucket/build-sources/ws/t/").unwrap();
        assert_eq!(bucket, "code-bucket");
        assert_eq!(key, "build-sources/ws/t/");
    }

    #[test]
    fn parse_uri_rejects_other_schemes() {
        assert!(matches!(
            parse_s3_uri("https://example.com/x"),
            Err(StoreError::InvalidUri(_))
        ));
        assert!(matches!(
            parse_s3_uri("s3://"),
            Err(StoreError::InvalidUri(_))
        ));
    }

    #[test]
    fn parse_uri_bucket_only() {
        let (bucket, key) = parse_s3_uri("s3://just-bucket").unwrap();
        assert_eq!(bucket, "just-bucket");
        assert_eq!(key, "");
    }
}
