use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct TokioFs;

impl TokioFs {
    pub fn new() -> Self {
        Self
    }
}

// Local files: ssh public keys, custom data and the config file
#[async_trait]
pub trait FileReader {
    async fn read_to_string(&self, path: &Path) -> Result<String>;

    async fn is_file(&self, path: &Path) -> bool;
}

#[async_trait]
impl FileReader for TokioFs {
    async fn read_to_string(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read file: {}", path.display()))
    }

    async fn is_file(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false)
    }
}
