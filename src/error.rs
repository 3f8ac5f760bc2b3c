//! Error taxonomy for resolving and deploying a create request.
use thiserror::Error;

use crate::dependencies::{OperationState, RemoteDiagnostic, RemoteError};

#[derive(Debug, Error)]
pub enum DeployError {
    /// Conflicting or incomplete input, detected before anything is created.
    #[error("usage error: {0}")]
    Usage(String),

    /// A referenced resource could not be classified or found.
    #[error("{message} (tried: {})", attempted.join(" -> "))]
    Resolution {
        message: String,
        attempted: Vec<String>,
    },

    /// The deployment endpoint rejected the document.
    #[error("deployment '{deployment_name}' was rejected: {diagnostic}")]
    Rejected {
        deployment_name: String,
        diagnostic: RemoteDiagnostic,
    },

    /// The deployment reached a terminal state other than success.
    #[error("deployment '{deployment_name}' finished with state {state}{}", diagnostic.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
    OperationFailed {
        deployment_name: String,
        state: OperationState,
        diagnostic: Option<RemoteDiagnostic>,
    },

    /// The assembled document is not a valid graph.
    #[error("invalid deployment document: {0}")]
    InvalidTemplate(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// An interactive prompt could not be shown or answered.
    #[error("prompt failed: {0:#}")]
    Prompt(anyhow::Error),
}

impl DeployError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn resolution(message: impl Into<String>, attempted: &[&str]) -> Self {
        Self::Resolution {
            message: message.into(),
            attempted: attempted.iter().map(|step| step.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_display() {
        let error = DeployError::usage("--image IMAGE | --attach-os-disk DISK");

        assert_eq!(
            error.to_string(),
            "usage error: --image IMAGE | --attach-os-disk DISK"
        );
    }

    #[test]
    fn test_resolution_display_lists_attempted_path() {
        let error = DeployError::resolution(
            "invalid image \"foo\"",
            &["resource id", "urn", "alias", "managed image"],
        );

        assert_eq!(
            error.to_string(),
            "invalid image \"foo\" (tried: resource id -> urn -> alias -> managed image)"
        );
    }

    #[test]
    fn test_operation_failed_display() {
        let error = DeployError::OperationFailed {
            deployment_name: "vm_deploy_1".to_string(),
            state: OperationState::Canceled,
            diagnostic: None,
        };

        assert_eq!(
            error.to_string(),
            "deployment 'vm_deploy_1' finished with state Canceled"
        );

        let error = DeployError::OperationFailed {
            deployment_name: "vm_deploy_1".to_string(),
            state: OperationState::Failed,
            diagnostic: Some(RemoteDiagnostic::new("Conflict", "quota exceeded")),
        };

        assert_eq!(
            error.to_string(),
            "deployment 'vm_deploy_1' finished with state Failed: (Conflict) quota exceeded"
        );
    }
}
