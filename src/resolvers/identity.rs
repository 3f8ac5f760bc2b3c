//! Managed identities and the optional role assignment of the system identity.
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::ResolverContext;
use crate::{
    error::DeployError,
    models::{CreateRequest, DEFAULT_ROLE, ResourceId, SYSTEM_IDENTITY},
};

static ROLE_DEFINITION_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^/subscriptions/.+/providers/Microsoft\.Authorization/roleDefinitions/")
        .expect("valid regex")
});
static GUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{12}$")
        .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub role_definition_id: String,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub system_assigned: bool,
    pub user_assigned: Vec<ResourceId>,
    /// Role granted to the system identity on a scope.
    pub role_assignment: Option<RoleAssignment>,
}

impl ResolvedIdentity {
    /// Identity type as the compute API spells it.
    pub fn identity_type(&self) -> &'static str {
        match (self.system_assigned, self.user_assigned.is_empty()) {
            (true, true) => "SystemAssigned",
            (true, false) => "SystemAssigned, UserAssigned",
            (false, _) => "UserAssigned",
        }
    }
}

pub async fn resolve_identity(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
) -> Result<Option<ResolvedIdentity>, DeployError> {
    let Some(identities) = &request.assign_identity else {
        if request.identity_scope.is_some() || request.identity_role.is_some() {
            return Err(DeployError::usage(
                "--assign-identity [--scope SCOPE] [--role ROLE]",
            ));
        }
        return Ok(None);
    };

    let system_assigned =
        identities.is_empty() || identities.iter().any(|identity| identity == SYSTEM_IDENTITY);
    let user_assigned: Vec<ResourceId> = identities
        .iter()
        .filter(|identity| *identity != SYSTEM_IDENTITY)
        .map(|identity| {
            context.resource_id(
                identity,
                "Microsoft.ManagedIdentity",
                "userAssignedIdentities",
            )
        })
        .collect();

    let role_assignment = match (&request.identity_scope, &request.identity_role) {
        (None, None) => None,
        (None, Some(_)) => {
            return Err(DeployError::usage("--role is only applicable together with --scope"));
        }
        (Some(_), _) if !system_assigned => {
            return Err(DeployError::usage(
                "'--scope'/'--role' is only applicable when assign system identity",
            ));
        }
        (Some(scope), role) => {
            let role = role.as_deref().unwrap_or(DEFAULT_ROLE);
            Some(RoleAssignment {
                role_definition_id: resolve_role_id(context, role, scope).await?,
                scope: scope.clone(),
            })
        }
    };

    Ok(Some(ResolvedIdentity {
        system_assigned,
        user_assigned,
        role_assignment,
    }))
}

/// Role definition id for a full id, a GUID or a role name looked up on the scope.
pub async fn resolve_role_id(
    context: &ResolverContext<'_>,
    role: &str,
    scope: &str,
) -> Result<String, DeployError> {
    if ROLE_DEFINITION_ID.is_match(role) {
        return Ok(role.to_string());
    }
    if GUID.is_match(role) {
        return Ok(format!(
            "/subscriptions/{}/providers/Microsoft.Authorization/roleDefinitions/{role}",
            context.scope.subscription_id
        ));
    }

    let path = format!(
        "{}/providers/Microsoft.Authorization/roleDefinitions?$filter=roleName eq '{role}'",
        scope.trim_end_matches('/')
    );
    let definitions = context
        .resources
        .list(&path, &context.api_versions.authorization)
        .await?;
    let ids: Vec<&str> = definitions
        .iter()
        .filter_map(|definition| definition.get("id").and_then(Value::as_str))
        .collect();

    match ids.as_slice() {
        [] => Err(DeployError::resolution(
            format!("role '{role}' doesn't exist"),
            &["role definition id", "guid", "role name"],
        )),
        [id] => {
            debug!(%role, role_definition_id = %id, "role resolved");
            Ok(id.to_string())
        }
        _ => Err(DeployError::usage(format!(
            "more than one role matches the given name '{role}', please pick an id from [{}]",
            ids.join(", ")
        ))),
    }
}
