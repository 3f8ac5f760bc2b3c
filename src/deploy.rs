//! Deployment submission.
//!
//! A document is submitted as one unit. Validation never creates anything, a no-wait submission
//! hands back the operation handle, and a waited submission polls the operation until it settles
//! and returns the declared output instead of the deployment envelope.
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::{
    dependencies::{
        DeploymentCreator, DeploymentValidator, OperationHandle, OperationState, RemoteError,
        ValidationReport,
    },
    error::DeployError,
    models::DeploymentDocument,
};

/// Both deployment endpoints.
pub trait DeploymentManagement: DeploymentValidator + DeploymentCreator {}

impl<T: DeploymentValidator + DeploymentCreator> DeploymentManagement for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Only run the validation endpoint.
    Validate,
    /// Start the deployment and return its handle.
    NoWait,
    /// Start the deployment and poll it to a terminal state.
    Wait,
}

impl DeploymentMode {
    pub fn from_flags(validate: bool, no_wait: bool) -> Self {
        match (validate, no_wait) {
            (true, _) => Self::Validate,
            (false, true) => Self::NoWait,
            (false, false) => Self::Wait,
        }
    }
}

/// Where a document goes and which output it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    pub resource_group: String,
    pub deployment_name: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DeploymentOutcome {
    Validated(ValidationReport),
    Accepted(OperationHandle),
    /// The value of the declared output.
    Succeeded(Value),
}

/// Submit `document` according to `mode`.
///
/// Nothing is retried. Validation hands back its report, diagnostic included. A document the
/// create endpoint refuses, or a deployment that ends failed or canceled, is an error carrying the
/// remote diagnostic.
pub async fn submit(
    deployments: &(dyn DeploymentManagement + Send + Sync),
    document: &DeploymentDocument,
    target: &DeploymentTarget,
    mode: DeploymentMode,
    poll_interval: Duration,
) -> Result<DeploymentOutcome, DeployError> {
    let body = document.deployment_body()?;
    trace!(
        resource_group = %target.resource_group,
        deployment_name = %target.deployment_name,
        ?mode,
        "submitting deployment"
    );

    if mode == DeploymentMode::Validate {
        let report = deployments
            .validate_deployment(&target.resource_group, &target.deployment_name, &body)
            .await
            .map_err(|e| rejected(target, e))?;

        if report.is_valid() {
            info!(deployment_name = %target.deployment_name, "deployment is valid");
        } else {
            warn!(deployment_name = %target.deployment_name, "deployment failed validation");
        }
        return Ok(DeploymentOutcome::Validated(report));
    }

    let handle = deployments
        .begin_deployment(&target.resource_group, &target.deployment_name, &body)
        .await
        .map_err(|e| rejected(target, e))?;

    if mode == DeploymentMode::NoWait {
        info!(deployment_name = %handle.deployment_name, "not waiting for the deployment to finish");
        return Ok(DeploymentOutcome::Accepted(handle));
    }

    wait_for_completion(deployments, &handle, poll_interval).await?;

    let outputs = deployments
        .deployment_outputs(&target.resource_group, &target.deployment_name)
        .await?;
    let value = outputs
        .get(&target.output)
        .and_then(|output| output.get("value"))
        .cloned()
        .ok_or_else(|| RemoteError::Malformed {
            path: target.deployment_name.clone(),
            reason: format!("deployment has no '{}' output", target.output),
        })?;

    Ok(DeploymentOutcome::Succeeded(value))
}

/// Poll the operation, sleeping `poll_interval` between checks, until it is terminal.
async fn wait_for_completion(
    deployments: &(dyn DeploymentManagement + Send + Sync),
    handle: &OperationHandle,
    poll_interval: Duration,
) -> Result<(), DeployError> {
    loop {
        let status = deployments.operation_status(handle).await?;
        debug!(deployment_name = %handle.deployment_name, state = %status.state, "deployment status");

        if !status.state.is_terminal() {
            tokio::time::sleep(poll_interval).await;
            continue;
        }
        if status.state == OperationState::Succeeded {
            return Ok(());
        }
        return Err(DeployError::OperationFailed {
            deployment_name: handle.deployment_name.clone(),
            state: status.state,
            diagnostic: status.error,
        });
    }
}

/// A 400 from either endpoint means the document itself was refused.
fn rejected(target: &DeploymentTarget, error: RemoteError) -> DeployError {
    match error {
        RemoteError::Api {
            status: 400,
            diagnostic,
            ..
        } => DeployError::Rejected {
            deployment_name: target.deployment_name.clone(),
            diagnostic,
        },
        error => error.into(),
    }
}
