use std::io;
use std::path::PathBuf;

use chrono::Utc;

/// Filesystem-backed blob store for hazard proof images.
///
/// Blobs are written below the media root under a key namespaced by the
/// owning user and a millisecond timestamp, and addressed externally through
/// the configured public base URL. The image must be stored successfully
/// before the hazard document referencing it is written.
pub struct BlobStore {
    root: PathBuf,
    base_url: String,
}

/// A stored blob: the key is used for removal, the URL goes into the
/// hazard document.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub key: String,
    pub url: String,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Store image bytes for a user and return the blob's key and public URL.
    pub async fn store(
        &self,
        user_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> io::Result<StoredBlob> {
        let key = format!(
            "hazard-images/{}/{}_{}",
            sanitize_component(user_id),
            Utc::now().timestamp_millis(),
            sanitize_component(file_name),
        );

        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!("Stored blob {} ({} bytes)", key, bytes.len());
        Ok(StoredBlob {
            url: format!("{}/{}", self.base_url, key),
            key,
        })
    }

    /// Remove a previously stored blob. Used to compensate when the hazard
    /// write fails after a successful upload.
    pub async fn remove(&self, key: &str) -> io::Result<()> {
        tokio::fs::remove_file(self.root.join(key)).await
    }
}

/// Flattens path separators and other hostile characters out of a key
/// component so a crafted file name cannot escape the media root.
fn sanitize_component(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_writes_bytes_and_builds_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path(), "http://localhost:3000/media/");

        let blob = store
            .store("user@example.com", "ice.png", b"png-bytes")
            .await
            .unwrap();

        assert!(blob.key.starts_with("hazard-images/user@example.com/"));
        assert!(blob.key.ends_with("_ice.png"));
        assert_eq!(blob.url, format!("http://localhost:3000/media/{}", blob.key));

        let on_disk = tokio::fs::read(dir.path().join(&blob.key)).await.unwrap();
        assert_eq!(on_disk, b"png-bytes");
    }

    #[tokio::test]
    async fn remove_deletes_the_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path(), "http://localhost:3000/media");

        let blob = store
            .store("user@example.com", "ice.png", b"png-bytes")
            .await
            .unwrap();
        store.remove(&blob.key).await.unwrap();

        assert!(!dir.path().join(&blob.key).exists());
    }

    #[tokio::test]
    async fn hostile_file_names_cannot_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path(), "http://localhost:3000/media");

        let blob = store
            .store("user@example.com", "../../etc/passwd", b"x")
            .await
            .unwrap();

        assert!(!blob.key.contains("/../"));
        assert!(dir.path().join(&blob.key).starts_with(dir.path()));
    }
}
