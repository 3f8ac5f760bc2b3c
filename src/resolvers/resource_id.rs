use crate::models::{ResourceId, ResourceScope};

/// Turn a bare name or a fully qualified id into a canonical id.
///
/// Fully qualified input is kept exactly as written; anything else is treated as a name inside
/// the ambient resource group. Never touches the network.
pub fn resolve_resource_id(
    scope: &ResourceScope,
    value: &str,
    namespace: &str,
    resource_type: &str,
) -> ResourceId {
    ResourceId::parse(value)
        .unwrap_or_else(|| scope.resource_id(namespace, resource_type, value))
}
