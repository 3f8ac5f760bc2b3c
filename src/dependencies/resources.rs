use std::fmt::Display;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Diagnostic payload returned by the management API (`{"error": {...}}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDiagnostic {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<RemoteDiagnostic>,
}

impl RemoteDiagnostic {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            target: None,
            details: Vec::new(),
        }
    }

    /// Extract the diagnostic from an error envelope, falling back to the raw body.
    pub fn from_body(body: &str) -> Self {
        #[derive(Deserialize)]
        struct Envelope {
            error: RemoteDiagnostic,
        }

        serde_json::from_str::<Envelope>(body)
            .map(|envelope| envelope.error)
            .unwrap_or_else(|_| Self::new("UnknownError", body.trim()))
    }
}

impl Display for RemoteDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}) {}", self.code, self.message)?;
        for detail in &self.details {
            write!(f, "; {detail}")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("resource not found: {path}")]
    NotFound { path: String },
    #[error("request to {path} failed with status {status}: {diagnostic}")]
    Api {
        path: String,
        status: u16,
        diagnostic: RemoteDiagnostic,
    },
    #[error("request to {path} failed")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response from {path}: {reason}")]
    Malformed { path: String, reason: String },
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Read-only access to management resources.
///
/// Paths are relative to the management endpoint, e.g.
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Network/virtualNetworks/{name}`.
/// They may carry their own query string (`$filter`); the api version is always appended.
#[async_trait]
pub trait ResourceReader {
    /// Read a single document.
    async fn get(&self, path: &str, api_version: &str) -> Result<Value, RemoteError>;

    /// Read every item of a collection, following `nextLink` pages.
    /// Bare JSON arrays (as returned by the image catalog) are accepted as a single page.
    async fn list(&self, path: &str, api_version: &str) -> Result<Vec<Value>, RemoteError>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use mockall::mock;

    mock! {
        pub ResourceReader {}

        #[async_trait]
        impl ResourceReader for ResourceReader {
            async fn get(&self, path: &str, api_version: &str) -> Result<Value, RemoteError>;
            async fn list(&self, path: &str, api_version: &str) -> Result<Vec<Value>, RemoteError>;
        }
    }

    pub fn not_found(path: &str) -> RemoteError {
        RemoteError::NotFound {
            path: path.to_string(),
        }
    }
}
