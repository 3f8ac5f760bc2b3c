//! Canonical resource identifiers.
//!
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}[/{child_type}/{child_name}]*`
use std::{fmt::Display, str::FromStr};

use serde::Serialize;

use crate::error::DeployError;

/// Subscription and resource group a request operates in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceScope {
    pub subscription_id: String,
    pub resource_group: String,
}

impl ResourceScope {
    pub fn new(subscription_id: impl Into<String>, resource_group: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
        }
    }

    /// Path of the resource group itself.
    pub fn resource_group_path(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription_id, self.resource_group
        )
    }

    /// Synthesize an identifier for `name` inside this scope.
    pub fn resource_id(&self, namespace: &str, resource_type: &str, name: &str) -> ResourceId {
        ResourceId {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            namespace: namespace.to_string(),
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            children: Vec::new(),
            verbatim: None,
        }
    }
}

/// A resource identifier; one that was parsed renders exactly as it was written.
#[derive(Debug, Clone, Serialize)]
#[serde(into = "String")]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub namespace: String,
    pub resource_type: String,
    pub name: String,
    /// Nested `(type, name)` segments, e.g. `subnets/default`.
    pub children: Vec<(String, String)>,
    verbatim: Option<String>,
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        self.subscription_id == other.subscription_id
            && self.resource_group == other.resource_group
            && self.namespace == other.namespace
            && self.resource_type == other.resource_type
            && self.name == other.name
            && self.children == other.children
    }
}

impl Eq for ResourceId {}

impl ResourceId {
    /// Parse a fully qualified identifier; anything else yields `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let segments: Vec<&str> = value.trim_matches('/').split('/').collect();
        if !value.starts_with('/') || segments.len() < 8 || segments.len() % 2 != 0 {
            return None;
        }
        if !segments[0].eq_ignore_ascii_case("subscriptions")
            || !segments[2].eq_ignore_ascii_case("resourcegroups")
            || !segments[4].eq_ignore_ascii_case("providers")
        {
            return None;
        }
        if segments.iter().any(|segment| segment.is_empty()) {
            return None;
        }

        let children = segments[8..]
            .chunks(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();

        Some(Self {
            subscription_id: segments[1].to_string(),
            resource_group: segments[3].to_string(),
            namespace: segments[5].to_string(),
            resource_type: segments[6].to_string(),
            name: segments[7].to_string(),
            children,
            verbatim: Some(value.to_string()),
        })
    }

    pub fn child(mut self, resource_type: &str, name: &str) -> Self {
        self.children
            .push((resource_type.to_string(), name.to_string()));
        self.verbatim = None;
        self
    }

    /// The enclosing resource, `None` for a top level one.
    pub fn parent(&self) -> Option<Self> {
        let mut parent = self.clone();
        parent.children.pop()?;
        parent.verbatim = None;
        Some(parent)
    }

    /// Name of the innermost resource.
    pub fn leaf_name(&self) -> &str {
        self.children
            .last()
            .map(|(_, name)| name.as_str())
            .unwrap_or(&self.name)
    }

    /// Full type, e.g. `Microsoft.Network/virtualNetworks/subnets`.
    pub fn full_type(&self) -> String {
        let mut full_type = format!("{}/{}", self.namespace, self.resource_type);
        for (child_type, _) in &self.children {
            full_type.push('/');
            full_type.push_str(child_type);
        }
        full_type
    }

    /// Case-insensitive check of the full type.
    pub fn is_type(&self, full_type: &str) -> bool {
        self.full_type().eq_ignore_ascii_case(full_type)
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(verbatim) = &self.verbatim {
            return f.write_str(verbatim);
        }
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}",
            self.subscription_id, self.resource_group, self.namespace, self.resource_type, self.name
        )?;
        for (child_type, child_name) in &self.children {
            write!(f, "/{child_type}/{child_name}")?;
        }
        Ok(())
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.to_string()
    }
}

impl FromStr for ResourceId {
    type Err = DeployError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
            .ok_or_else(|| DeployError::usage(format!("'{value}' is not a valid resource id")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBNET_ID: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/default";

    #[test]
    fn test_parse_child_resource() {
        let id = ResourceId::parse(SUBNET_ID).unwrap();

        assert_eq!(id.subscription_id, "sub");
        assert_eq!(id.resource_group, "rg");
        assert_eq!(id.name, "vnet1");
        assert_eq!(id.leaf_name(), "default");
        assert_eq!(id.full_type(), "Microsoft.Network/virtualNetworks/subnets");
        assert_eq!(id.to_string(), SUBNET_ID);
    }

    #[test]
    fn test_parse_is_case_insensitive_on_keywords() {
        let id = ResourceId::parse(
            "/SUBSCRIPTIONS/sub/resourcegroups/rg/Providers/Microsoft.Compute/images/img",
        )
        .unwrap();

        assert!(id.is_type("microsoft.compute/images"));
        assert_eq!(id.resource_group, "rg");
        assert_eq!(
            id,
            ResourceScope::new("sub", "rg").resource_id("Microsoft.Compute", "images", "img")
        );
    }

    #[test]
    fn test_parsed_id_renders_as_written() {
        let written = "/subscriptions/sub/resourcegroups/rg/providers/Microsoft.Compute/images/img";

        let id = ResourceId::parse(written).unwrap();

        assert_eq!(id.to_string(), written);
    }

    #[test]
    fn test_child_and_parent_render_canonically() {
        let vnet = ResourceId::parse(
            "/subscriptions/sub/resourcegroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1",
        )
        .unwrap();

        let subnet = vnet.clone().child("subnets", "default");

        assert_eq!(subnet.to_string(), SUBNET_ID);
        assert_eq!(
            subnet.parent().unwrap().to_string(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1"
        );
        assert_eq!(vnet.parent(), None);
    }

    #[test]
    fn test_parse_rejects_partial_ids() {
        assert!(ResourceId::parse("myimage").is_none());
        assert!(ResourceId::parse("/subscriptions/sub/resourceGroups/rg").is_none());
        assert!(
            ResourceId::parse("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/images")
                .is_none()
        );
        assert!(ResourceId::parse("Canonical:UbuntuServer:18.04-LTS:latest").is_none());
        assert!(ResourceId::parse("https://account.blob.core.windows.net/vhds/os.vhd").is_none());
    }

    #[test]
    fn test_scope_synthesizes_ids() {
        let scope = ResourceScope::new("sub", "rg");
        let id = scope
            .resource_id("Microsoft.Network", "virtualNetworks", "vnet1")
            .child("subnets", "default");

        assert_eq!(id.to_string(), SUBNET_ID);
    }
}
