use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

use concierge_types::models::MediaKind;

/// A media file submitted by a participant, before upload.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub filename: String,
    pub kind: MediaKind,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    pub url: String,
}

/// Blob store that turns uploaded bytes into a durable URL. Messages only
/// ever keep the URL.
#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    async fn upload(&self, filename: &str, bytes: Bytes) -> anyhow::Result<StoredAttachment>;
}

/// Stores attachments as flat files under one directory and hands out URLs
/// of the form `{public_url}/media/{name}`.
pub struct DiskAttachmentStore {
    dir: PathBuf,
    public_url: String,
}

impl DiskAttachmentStore {
    pub async fn new(dir: PathBuf, public_url: &str) -> anyhow::Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Attachment directory: {}", dir.display());
        Ok(Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    /// Path of a stored attachment, or None for names this store never issues.
    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        let (stem, ext) = match name.split_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (name, None),
        };
        stem.parse::<Uuid>().ok()?;
        if let Some(ext) = ext {
            if !is_safe_extension(ext) {
                return None;
            }
        }
        Some(self.dir.join(name))
    }
}

#[async_trait]
impl AttachmentResolver for DiskAttachmentStore {
    async fn upload(&self, filename: &str, bytes: Bytes) -> anyhow::Result<StoredAttachment> {
        let name = match extension_of(filename) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };

        let path = self.dir.join(&name);
        let mut file = fs::File::create(&path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        info!("Stored attachment {} ({} bytes)", name, bytes.len());
        Ok(StoredAttachment {
            url: format!("{}/media/{}", self.public_url, name),
        })
    }
}

/// Lowercased extension of a client filename, if it is short and alphanumeric.
fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    is_safe_extension(&ext).then_some(ext)
}

fn is_safe_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_sanitized() {
        assert_eq!(extension_of("photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension_of("clip.final.mp4").as_deref(), Some("mp4"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("evil./../x"), None);
        assert_eq!(extension_of("long.extension-here"), None);
    }

    #[tokio::test]
    async fn upload_writes_file_and_returns_public_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskAttachmentStore::new(dir.path().join("media"), "https://portal.test/")
            .await
            .unwrap();

        let stored = store
            .upload("fuite.png", Bytes::from_static(b"\x89PNG fake"))
            .await
            .unwrap();
        assert!(stored.url.starts_with("https://portal.test/media/"));
        assert!(stored.url.ends_with(".png"));

        let name = stored.url.rsplit('/').next().unwrap();
        let path = store.path_for(name).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"\x89PNG fake");
    }

    #[tokio::test]
    async fn path_for_rejects_foreign_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskAttachmentStore::new(dir.path().to_path_buf(), "http://localhost:3000")
            .await
            .unwrap();

        assert!(store.path_for("../concierge.db").is_none());
        assert!(store.path_for("not-a-uuid.png").is_none());
        let id = Uuid::new_v4();
        assert!(store.path_for(&format!("{}.png", id)).is_some());
        assert!(store.path_for(&format!("{}./etc", id)).is_none());
    }
}
