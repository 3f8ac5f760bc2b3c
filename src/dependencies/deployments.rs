use std::fmt::Display;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{RemoteDiagnostic, RemoteError};

/// Handle to a running deployment, returned by the create endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationHandle {
    pub deployment_name: String,
    pub resource_group: String,
    /// Absolute URL polled for the operation status.
    pub status_url: String,
}

/// State of a long-running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationState {
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl OperationState {
    /// Map a provisioning state string; every non-terminal value counts as running.
    pub fn from_remote(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Running,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
        };
        write!(f, "{value}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    pub state: OperationState,
    pub error: Option<RemoteDiagnostic>,
}

/// Result of the validation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteDiagnostic>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

// Dependency to validate a deployment without creating anything
#[async_trait]
pub trait DeploymentValidator {
    async fn validate_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        body: &Value,
    ) -> Result<ValidationReport, RemoteError>;
}

// Dependency to create a deployment and follow it to completion
#[async_trait]
pub trait DeploymentCreator {
    async fn begin_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        body: &Value,
    ) -> Result<OperationHandle, RemoteError>;

    async fn operation_status(&self, handle: &OperationHandle)
    -> Result<OperationStatus, RemoteError>;

    /// Read `properties.outputs` of a finished deployment.
    async fn deployment_outputs(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> Result<Value, RemoteError>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use mockall::mock;

    mock! {
        pub Deployments {}

        #[async_trait]
        impl DeploymentValidator for Deployments {
            async fn validate_deployment(
                &self,
                resource_group: &str,
                deployment_name: &str,
                body: &Value,
            ) -> Result<ValidationReport, RemoteError>;
        }

        #[async_trait]
        impl DeploymentCreator for Deployments {
            async fn begin_deployment(
                &self,
                resource_group: &str,
                deployment_name: &str,
                body: &Value,
            ) -> Result<OperationHandle, RemoteError>;

            async fn operation_status(&self, handle: &OperationHandle) -> Result<OperationStatus, RemoteError>;

            async fn deployment_outputs(
                &self,
                resource_group: &str,
                deployment_name: &str,
            ) -> Result<Value, RemoteError>;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_state_from_remote() {
        assert_eq!(OperationState::from_remote("Succeeded"), OperationState::Succeeded);
        assert_eq!(OperationState::from_remote("failed"), OperationState::Failed);
        assert_eq!(OperationState::from_remote("Canceled"), OperationState::Canceled);
        assert_eq!(OperationState::from_remote("Accepted"), OperationState::Running);
        assert_eq!(OperationState::from_remote("Updating"), OperationState::Running);
        assert!(!OperationState::Running.is_terminal());
        assert!(OperationState::Canceled.is_terminal());
    }
}
