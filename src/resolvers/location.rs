use serde_json::Value;
use tracing::debug;

use super::ResolverContext;
use crate::{dependencies::RemoteError, error::DeployError, models::CreateRequest};

/// The requested location, or the resource group's location when none was given.
pub async fn resolve_location(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
) -> Result<String, DeployError> {
    if let Some(location) = &request.location {
        return Ok(location.clone());
    }

    let path = context.scope.resource_group_path();
    let group = context
        .resources
        .get(&path, &context.api_versions.resource_groups)
        .await?;
    let location = group
        .get("location")
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::Malformed {
            path,
            reason: "resource group without location".to_string(),
        })?;

    debug!(%location, "using resource group location");
    Ok(location.to_string())
}
