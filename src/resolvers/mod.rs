//! Resolver pipeline.
//!
//! Each stage reads the immutable [`CreateRequest`](crate::models::CreateRequest) plus whatever
//! earlier stages produced and returns its own resolved value. Remote lookups go through the
//! injected [`ResolverContext`] so every stage can run against mocks.
use serde_json::Value;
use tracing::trace;

use crate::{
    config::ApiVersions,
    dependencies::{AliasDocumentSource, FileReader, RemoteError, ResourceReader},
    error::DeployError,
    models::{ResourceId, ResourceScope},
};

pub mod balancer;
pub mod credentials;
pub mod disk_layout;
pub mod identity;
pub mod image;
pub mod location;
pub mod network;
mod pipeline;
pub mod placement;
pub mod resource_id;
pub mod secrets;
pub mod subnet;

pub use pipeline::*;

/// Collaborators shared by every resolver stage.
pub struct ResolverContext<'a> {
    pub resources: &'a (dyn ResourceReader + Send + Sync),
    pub aliases: &'a (dyn AliasDocumentSource + Send + Sync),
    pub files: &'a (dyn FileReader + Send + Sync),
    pub api_versions: &'a ApiVersions,
    pub scope: ResourceScope,
}

impl ResolverContext<'_> {
    /// Canonical id for a name or id, see [`resource_id::resolve_resource_id`].
    pub fn resource_id(&self, value: &str, namespace: &str, resource_type: &str) -> ResourceId {
        resource_id::resolve_resource_id(&self.scope, value, namespace, resource_type)
    }

    /// Read a resource, `None` when it does not exist.
    pub async fn find(&self, id: &ResourceId) -> Result<Option<Value>, DeployError> {
        let api_version = self.api_versions.for_namespace(&id.namespace);
        trace!(resource_id = %id, %api_version, "reading resource");

        match self.resources.get(&id.to_string(), api_version).await {
            Ok(value) => Ok(Some(value)),
            Err(RemoteError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// One read-only lookup; "not found" is a negative answer, every other failure is an error.
    pub async fn exists(&self, id: &ResourceId) -> Result<bool, DeployError> {
        Ok(self.find(id).await?.is_some())
    }

    /// List a collection below the resource group, e.g. `Microsoft.Network/virtualNetworks`.
    pub async fn list_in_group(
        &self,
        namespace: &str,
        resource_type: &str,
    ) -> Result<Vec<Value>, DeployError> {
        let path = format!(
            "{}/providers/{}/{}",
            self.scope.resource_group_path(),
            namespace,
            resource_type
        );
        Ok(self
            .resources
            .list(&path, self.api_versions.for_namespace(namespace))
            .await?)
    }
}


#[cfg(test)]
mod tests {
    use super::{testing::*, *};
    use crate::dependencies::{RemoteDiagnostic, mocks::not_found};
    use serde_json::json;

    #[tokio::test]
    async fn test_exists_maps_not_found_to_false() {
        let mut fixture = Fixture::new();
        fixture
            .resources
            .expect_get()
            .withf(|path, version| {
                path == rg_id("Microsoft.Network", "networkSecurityGroups", "nsg1")
                    && version == "2022-11-01"
            })
            .times(1)
            .returning(|path, _| Err(not_found(path)));

        let context = fixture.context();
        let id = context.resource_id("nsg1", "Microsoft.Network", "networkSecurityGroups");

        assert!(!context.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_propagates_other_failures() {
        let mut fixture = Fixture::new();
        fixture.resources.expect_get().times(1).returning(|path, _| {
            Err(RemoteError::Api {
                path: path.to_string(),
                status: 403,
                diagnostic: RemoteDiagnostic::new("AuthorizationFailed", "denied"),
            })
        });

        let context = fixture.context();
        let id = context.resource_id("nsg1", "Microsoft.Network", "networkSecurityGroups");

        assert!(matches!(
            context.exists(&id).await,
            Err(DeployError::Remote(RemoteError::Api { status: 403, .. }))
        ));
    }

    #[tokio::test]
    async fn test_find_returns_document() {
        let mut fixture = Fixture::new();
        fixture
            .resources
            .expect_get()
            .return_once(|_, _| Ok(json!({"name": "avset1"})));

        let context = fixture.context();
        let id = context.resource_id("avset1", "Microsoft.Compute", "availabilitySets");

        assert_eq!(
            context.find(&id).await.unwrap(),
            Some(json!({"name": "avset1"}))
        );
    }
}
