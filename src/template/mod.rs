//! Deployment document assembly.
//!
//! The builders never talk to the remote API: everything they need was decided by the resolver
//! pipeline. Generated names are derived from the request so repeated runs produce the same
//! document, role assignment names excepted.
use std::collections::BTreeMap;

use serde_json::json;

use crate::{
    config::ApiVersions,
    error::DeployError,
    models::{CreateRequest, DeploymentDocument, ResourceDefinition, ResourceScope},
    resolvers::ResolvedRequest,
};

mod compute;
pub mod naming;
mod network;
mod vm;
mod vmss;

pub const VM_OUTPUT: &str = "vm";
pub const VMSS_OUTPUT: &str = "vmss";

/// Ambient values every resource of one document shares.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub scope: &'a ResourceScope,
    pub api_versions: &'a ApiVersions,
    pub location: &'a str,
    pub tags: &'a BTreeMap<String, String>,
}

impl TemplateContext<'_> {
    /// A top-level resource placed in the deployment location and carrying the request tags.
    pub fn resource(&self, resource_type: &str, name: &str, api_version: &str) -> ResourceDefinition {
        let resource = ResourceDefinition::new(resource_type, name, api_version).location(self.location);
        if self.tags.is_empty() {
            resource
        } else {
            resource.with("tags", json!(self.tags))
        }
    }

    pub fn id(&self, namespace: &str, resource_type: &str, name: &str) -> String {
        self.scope
            .resource_id(namespace, resource_type, name)
            .to_string()
    }
}

/// Id of a resource a definition points at, plus the `dependsOn` key when the same document
/// creates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub id: String,
    pub depends_on: Option<String>,
}

impl Reference {
    pub fn new(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            depends_on: Some(key.into()),
        }
    }

    pub fn existing(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            depends_on: None,
        }
    }
}

/// Document creating a single machine and everything it needs.
pub fn build_vm_document(
    request: &CreateRequest,
    resolved: &ResolvedRequest,
    scope: &ResourceScope,
    api_versions: &ApiVersions,
) -> Result<DeploymentDocument, DeployError> {
    let context = TemplateContext {
        scope,
        api_versions,
        location: &resolved.location,
        tags: &request.tags,
    };
    let document = vm::assemble(&context, request, resolved)?;
    // surface dangling references before anything is submitted
    document.ordered_resources()?;
    Ok(document)
}

/// Document creating a scale set with its network front end.
pub fn build_vmss_document(
    request: &CreateRequest,
    resolved: &ResolvedRequest,
    scope: &ResourceScope,
    api_versions: &ApiVersions,
) -> Result<DeploymentDocument, DeployError> {
    let context = TemplateContext {
        scope,
        api_versions,
        location: &resolved.location,
        tags: &request.tags,
    };
    let document = vmss::assemble(&context, request, resolved)?;
    document.ordered_resources()?;
    Ok(document)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for builder tests.
    use super::*;

    pub struct TemplateFixture {
        pub scope: ResourceScope,
        pub api_versions: ApiVersions,
        pub tags: BTreeMap<String, String>,
    }

    impl TemplateFixture {
        pub fn new() -> Self {
            Self {
                scope: ResourceScope::new("sub", "rg"),
                api_versions: ApiVersions::default(),
                tags: BTreeMap::new(),
            }
        }

        pub fn context(&self) -> TemplateContext<'_> {
            TemplateContext {
                scope: &self.scope,
                api_versions: &self.api_versions,
                location: "westus",
                tags: &self.tags,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{testing::*, *};

    #[test]
    fn test_resource_carries_location_and_tags() {
        let mut fixture = TemplateFixture::new();
        fixture.tags.insert("env".to_string(), "test".to_string());

        let resource = fixture
            .context()
            .resource("Microsoft.Network/publicIPAddresses", "ip", "2022-11-01");

        assert_eq!(resource.location.as_deref(), Some("westus"));
        assert_eq!(resource.body["tags"], json!({"env": "test"}));
    }

    #[test]
    fn test_untagged_resource_has_no_tags_member() {
        let fixture = TemplateFixture::new();

        let resource = fixture
            .context()
            .resource("Microsoft.Network/publicIPAddresses", "ip", "2022-11-01");

        assert!(!resource.body.contains_key("tags"));
    }
}
