use async_trait::async_trait;

use super::RemoteError;

// Dependency to fetch the published image alias document
#[async_trait]
pub trait AliasDocumentSource {
    /// Fetch the raw alias document.
    async fn fetch_alias_document(&self) -> Result<String, RemoteError>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use mockall::mock;

    mock! {
        pub AliasDocumentSource {}

        #[async_trait]
        impl AliasDocumentSource for AliasDocumentSource {
            async fn fetch_alias_document(&self) -> Result<String, RemoteError>;
        }
    }
}
