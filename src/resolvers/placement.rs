//! Where the machines run and how they are billed: proximity placement group, dedicated hosts,
//! capacity reservation, Spot settings and boot diagnostics.
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::ResolverContext;
use crate::{
    error::DeployError,
    models::{CreateRequest, ResourceId},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPlacement {
    pub proximity_placement_group: Option<ResourceId>,
    pub dedicated_host: Option<ResourceId>,
    pub host_group: Option<ResourceId>,
    pub capacity_reservation_group: Option<ResourceId>,
    /// Blob endpoint boot diagnostics are written to.
    pub boot_diagnostics_uri: Option<String>,
}

/// Host and billing flag rules, decidable from the request alone.
pub fn check_placement_flags(request: &CreateRequest) -> Result<(), DeployError> {
    if request.dedicated_host.is_some() && request.host_group.is_some() {
        return Err(DeployError::usage(
            "--host ID | --host-group NAME_OR_ID, not both",
        ));
    }
    if let Some(host) = &request.dedicated_host {
        if ResourceId::parse(host).is_none() {
            return Err(DeployError::usage(format!(
                "--host '{host}' is not a valid resource id"
            )));
        }
    }

    let evictable = request.priority.is_some_and(|priority| priority.is_evictable());
    if request.eviction_policy.is_some() && !evictable {
        return Err(DeployError::usage(
            "--priority Spot|Low [--eviction-policy POLICY]",
        ));
    }
    if let Some(max_price) = request.max_price {
        if !evictable {
            return Err(DeployError::usage(
                "--priority Spot|Low [--max-price PRICE]",
            ));
        }
        if max_price != -1.0 && max_price <= 0.0 {
            return Err(DeployError::usage(format!(
                "--max-price must be -1 or a positive price, got {max_price}"
            )));
        }
    }
    Ok(())
}

/// Resolve every placement reference to an id; the proximity placement group has to exist.
pub async fn resolve_placement(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
) -> Result<ResolvedPlacement, DeployError> {
    let proximity_placement_group = match &request.proximity_placement_group {
        Some(ppg) => {
            let id = context.resource_id(ppg, "Microsoft.Compute", "proximityPlacementGroups");
            if !context.exists(&id).await? {
                return Err(DeployError::resolution(
                    format!("proximity placement group '{ppg}' does not exist"),
                    &["proximity placement group"],
                ));
            }
            Some(id)
        }
        None => None,
    };

    let placement = ResolvedPlacement {
        proximity_placement_group,
        dedicated_host: request.dedicated_host.as_deref().and_then(ResourceId::parse),
        host_group: request
            .host_group
            .as_deref()
            .map(|group| context.resource_id(group, "Microsoft.Compute", "hostGroups")),
        capacity_reservation_group: request.capacity_reservation_group.as_deref().map(|group| {
            context.resource_id(group, "Microsoft.Compute", "capacityReservationGroups")
        }),
        boot_diagnostics_uri: match &request.boot_diagnostics_storage {
            Some(storage) => Some(boot_diagnostics_uri(context, storage).await?),
            None => None,
        },
    };
    debug!(?placement, "placement resolved");
    Ok(placement)
}

/// A URI is used as given; an account name or id is looked up for its blob endpoint.
async fn boot_diagnostics_uri(
    context: &ResolverContext<'_>,
    storage: &str,
) -> Result<String, DeployError> {
    if Url::parse(storage).is_ok_and(|url| matches!(url.scheme(), "http" | "https")) {
        return Ok(storage.to_string());
    }

    let id = context.resource_id(storage, "Microsoft.Storage", "storageAccounts");
    let account = context.find(&id).await?.ok_or_else(|| {
        DeployError::resolution(
            format!("storage account '{storage}' does not exist"),
            &["blob uri", "storage account"],
        )
    })?;
    account
        .pointer("/properties/primaryEndpoints/blob")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            DeployError::resolution(
                format!("storage account '{storage}' has no blob endpoint"),
                &["blob uri", "storage account"],
            )
        })
}
