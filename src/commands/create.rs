use std::{fmt::Display, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, trace};

use crate::{
    args,
    commands::CommandWithOutput,
    config::{ApiVersions, Settings},
    deploy::{self, DeploymentManagement, DeploymentMode, DeploymentOutcome, DeploymentTarget},
    dependencies::{AliasDocumentSource, ArmClient, FileReader, ResourceReader, TokioFs},
    error::DeployError,
    interaction::{Interaction, SpinnerInteraction},
    models::{CreateRequest, ResourceScope},
    resolvers::{self, ResolverContext, ResolverInteraction},
    template::{self, VM_OUTPUT, VMSS_OUTPUT, naming},
};

// Remote dependencies of the create commands
pub trait CreateManagement: ResourceReader + AliasDocumentSource + DeploymentManagement {}
impl<T: ResourceReader + AliasDocumentSource + DeploymentManagement> CreateManagement for T {}

// Prompts and progress shown while creating
pub trait CreateInteraction: ResolverInteraction + SpinnerInteraction {}
impl<T: ResolverInteraction + SpinnerInteraction> CreateInteraction for T {}

/// What a create command deploys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateKind {
    Vm,
    Vmss,
}

impl CreateKind {
    fn deployment_prefix(self) -> &'static str {
        match self {
            Self::Vm => "vm_deploy_",
            Self::Vmss => "vmss_deploy_",
        }
    }

    fn output(self) -> &'static str {
        match self {
            Self::Vm => VM_OUTPUT,
            Self::Vmss => VMSS_OUTPUT,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Vm => "Virtual machine",
            Self::Vmss => "Scale set",
        }
    }
}

pub struct Create {
    kind: CreateKind,
    request: CreateRequest,
    mode: DeploymentMode,

    subscription_id: String,
    api_versions: ApiVersions,
    poll_interval: Duration,

    interaction: Box<dyn CreateInteraction + Send + Sync>,
    management: Box<dyn CreateManagement + Send + Sync>,
    files: Box<dyn FileReader + Send + Sync>,
}

impl Create {
    fn new(kind: CreateKind, request: CreateRequest, mode: DeploymentMode, settings: &Settings) -> Self {
        Self {
            kind,
            request,
            mode,

            subscription_id: settings.subscription_id.clone(),
            api_versions: settings.api_versions.clone(),
            poll_interval: settings.poll_interval,

            interaction: Box::new(Interaction::new()),
            management: Box::new(ArmClient::new(settings)),
            files: Box::new(TokioFs::new()),
        }
    }

    pub fn vm(args: args::VmCreate, settings: &Settings) -> Self {
        let mode = DeploymentMode::from_flags(args.common.validate, args.common.no_wait);
        Self::new(CreateKind::Vm, args.into(), mode, settings)
    }

    pub fn vmss(args: args::VmssCreate, settings: &Settings) -> Self {
        let mode = DeploymentMode::from_flags(args.common.validate, args.common.no_wait);
        Self::new(CreateKind::Vmss, args.into(), mode, settings)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CreateResult {
    Validated {
        deployment_name: String,
        resource_group: String,
    },
    Accepted {
        deployment_name: String,
        resource_group: String,
        status_url: String,
    },
    Created {
        #[serde(skip)]
        kind: &'static str,
        name: String,
        resource_group: String,
        resource: Value,
    },
}

impl Display for CreateResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validated {
                deployment_name,
                resource_group,
            } => write!(
                f,
                "Deployment '{deployment_name}' in resource group '{resource_group}' is valid"
            ),
            Self::Accepted {
                deployment_name,
                resource_group,
                ..
            } => write!(
                f,
                "Deployment '{deployment_name}' accepted in resource group '{resource_group}', not waiting for it to finish"
            ),
            Self::Created {
                kind,
                name,
                resource_group,
                resource,
            } => {
                write!(f, "{kind} '{name}' created in resource group '{resource_group}'")?;
                if let Some(state) = resource.get("provisioningState").and_then(Value::as_str) {
                    write!(f, " ({state})")?;
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CommandWithOutput for Create {
    type Output = CreateResult;

    async fn execute(&mut self) -> Result<Self::Output> {
        trace!(
            kind = ?self.kind,
            name = %self.request.name,
            resource_group = %self.request.resource_group,
            mode = ?self.mode,
            "executing create command"
        );

        let scope = ResourceScope::new(&self.subscription_id, &self.request.resource_group);
        let context = ResolverContext {
            resources: &*self.management,
            aliases: &*self.management,
            files: &*self.files,
            api_versions: &self.api_versions,
            scope: scope.clone(),
        };

        // no spinner while resolving, it may prompt for a password or a EULA
        let resolved = resolvers::resolve(&context, &*self.interaction, &self.request).await?;

        let document = match self.kind {
            CreateKind::Vm => {
                template::build_vm_document(&self.request, &resolved, &scope, &self.api_versions)?
            }
            CreateKind::Vmss => {
                template::build_vmss_document(&self.request, &resolved, &scope, &self.api_versions)?
            }
        };
        debug!(resources = document.resources().len(), "deployment document assembled");

        let target = DeploymentTarget {
            resource_group: self.request.resource_group.clone(),
            deployment_name: naming::deployment_name(self.kind.deployment_prefix()),
            output: self.kind.output().to_string(),
        };

        let message = match self.mode {
            DeploymentMode::Validate => "Validating deployment...",
            DeploymentMode::NoWait | DeploymentMode::Wait => "Deploying...",
        };
        let spinner = self.interaction.start_spinner(message.to_string())?;
        let outcome = deploy::submit(
            &*self.management,
            &document,
            &target,
            self.mode,
            self.poll_interval,
        )
        .await?;
        drop(spinner);

        Ok(match outcome {
            DeploymentOutcome::Validated(report) => {
                // a failed validation still exits non-zero, with the diagnostic as the error
                if let Some(diagnostic) = report.error {
                    return Err(DeployError::Rejected {
                        deployment_name: target.deployment_name,
                        diagnostic,
                    }
                    .into());
                }
                CreateResult::Validated {
                    deployment_name: target.deployment_name,
                    resource_group: target.resource_group,
                }
            }
            DeploymentOutcome::Accepted(handle) => CreateResult::Accepted {
                deployment_name: handle.deployment_name,
                resource_group: handle.resource_group,
                status_url: handle.status_url,
            },
            DeploymentOutcome::Succeeded(resource) => {
                info!(name = %self.request.name, "deployment succeeded");
                CreateResult::Created {
                    kind: self.kind.label(),
                    name: self.request.name.clone(),
                    resource_group: target.resource_group,
                    resource,
                }
            }
        })
    }
}
