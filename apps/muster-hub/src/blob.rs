use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use fleet_state::store::BlobStore;

/// Filesystem blob store. Download-log entries record paths relative to the
/// root's final component so they stay servable when the root moves.
pub struct FsBlobStore {
    root: PathBuf,
    prefix: String,
}

impl FsBlobStore {
    pub async fn new(root: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&root).await?;
        let prefix = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string());
        Ok(Self { root, prefix })
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn write(&self, file_name: &str, bytes: &[u8]) -> io::Result<String> {
        let path = self.root.join(file_name);
        fs::write(&path, bytes).await?;
        Ok(format!("{}/{}", self.prefix, file_name))
    }
}
