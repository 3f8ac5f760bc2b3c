use std::path::Path;

use tracing::{debug, info};

use super::{
    ResolverContext,
    balancer::{check_balancer_flags, resolve_scale_set_network},
    credentials::{Credentials, resolve_credentials},
    disk_layout::{check_disk_flags, resolve_disk_layout, ultra_ssd_enabled},
    identity::{ResolvedIdentity, resolve_identity},
    image::{OsDiskSource, ResolvedImage, check_image_flags, community_gallery_eula, resolve_image},
    location::resolve_location,
    network::{check_subnet_flags, resolve_availability_set, resolve_nics, resolve_storage_account},
    placement::{ResolvedPlacement, check_placement_flags, resolve_placement},
    secrets::{check_certificate_stores, load_secrets},
};
use crate::{
    error::DeployError,
    interaction::{
        ConfirmationPrompt, ConfirmationPromptOptions, ConfirmationPromptResult, PasswordPrompt,
    },
    models::{
        CreateRequest, DiskLayout, NicPlan, ResourceId, ScaleSetNetworkPlan, StorageAccountPlan,
        StorageProfile, VaultSecretGroup,
    },
};

/// Prompts the pipeline may need: the admin password and the community gallery EULA.
pub trait ResolverInteraction: PasswordPrompt + ConfirmationPrompt {}

impl<T: PasswordPrompt + ConfirmationPrompt> ResolverInteraction for T {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedNetwork {
    Machine(NicPlan),
    ScaleSet(ScaleSetNetworkPlan),
}

/// Everything the template builder needs, decided once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub location: String,
    pub image: ResolvedImage,
    pub disks: DiskLayout,
    /// Account holding the VHDs of an unmanaged machine.
    pub storage_account: Option<StorageAccountPlan>,
    pub availability_set: Option<ResourceId>,
    pub network: ResolvedNetwork,
    pub credentials: Option<Credentials>,
    pub identity: Option<ResolvedIdentity>,
    pub workspace: Option<ResourceId>,
    pub ultra_ssd_enabled: Option<bool>,
    /// Cloud-init or script content, not yet encoded.
    pub custom_data: Option<String>,
    pub placement: ResolvedPlacement,
    pub secrets: Vec<VaultSecretGroup>,
}

/// Every check that needs nothing but the request.
///
/// Runs before any lookup so conflicting flags never cost a remote call.
pub fn precheck(request: &CreateRequest) -> Result<(), DeployError> {
    check_image_flags(request)?;
    check_disk_flags(request)?;
    check_subnet_flags(request)?;
    if let Some(options) = &request.scale_set {
        check_balancer_flags(request, options)?;
    }
    check_placement_flags(request)
}

/// Run every resolver stage in order.
///
/// [`precheck`] and the local secrets files come first, so malformed input fails before any
/// remote call is made.
pub async fn resolve(
    context: &ResolverContext<'_>,
    interaction: &(dyn ResolverInteraction + Send + Sync),
    request: &CreateRequest,
) -> Result<ResolvedRequest, DeployError> {
    precheck(request)?;
    let secrets = load_secrets(context.files, &context.scope, request).await?;

    let location = resolve_location(context, request).await?;
    let image = resolve_image(context, request, &location).await?;
    debug!(profile = ?image.profile, os_type = %image.os_type, "image resolved");
    check_certificate_stores(&secrets, image.os_type)?;

    if let OsDiskSource::CommunityGallery(gallery_image) = &image.source {
        if !request.accept_term {
            let eula = community_gallery_eula(context, &location, &gallery_image.gallery).await?;
            accept_eula(interaction, &gallery_image.gallery, eula)?;
        }
    }

    let disks = resolve_disk_layout(&context.scope, request, &image)?;

    let storage_account = match image.profile {
        StorageProfile::SaPirImage | StorageProfile::SaCustomImage if !request.is_scale_set() => {
            Some(
                resolve_storage_account(context, request, &location, disks.os.storage_sku.as_deref())
                    .await?,
            )
        }
        _ => None,
    };

    let availability_set = resolve_availability_set(context, request).await?;

    let network = if request.is_scale_set() {
        ResolvedNetwork::ScaleSet(
            resolve_scale_set_network(context, request, &location, image.os_type).await?,
        )
    } else {
        ResolvedNetwork::Machine(resolve_nics(context, request, &location, image.os_type).await?)
    };

    let specialized = image.profile.is_specialized() || request.specialized;
    let credentials =
        resolve_credentials(context, interaction, request, image.os_type, specialized).await?;

    let identity = resolve_identity(context, request).await?;
    let workspace = resolve_workspace(context, request).await?;
    let custom_data = resolve_custom_data(context, request).await?;
    let placement = resolve_placement(context, request).await?;

    Ok(ResolvedRequest {
        location,
        ultra_ssd_enabled: ultra_ssd_enabled(request),
        image,
        disks,
        storage_account,
        availability_set,
        network,
        credentials,
        identity,
        workspace,
        custom_data,
        placement,
        secrets,
    })
}

/// `--custom-data` is a path when such a file exists, the content itself otherwise.
async fn resolve_custom_data(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
) -> Result<Option<String>, DeployError> {
    let Some(value) = &request.custom_data else {
        return Ok(None);
    };

    let path = Path::new(value);
    if !context.files.is_file(path).await {
        return Ok(Some(value.clone()));
    }
    debug!(path = %path.display(), "reading custom data");
    context
        .files
        .read_to_string(path)
        .await
        .map(Some)
        .map_err(|e| DeployError::usage(format!("{e:#}")))
}

fn accept_eula(
    interaction: &(dyn ResolverInteraction + Send + Sync),
    gallery: &str,
    eula: Option<String>,
) -> Result<(), DeployError> {
    let options = ConfirmationPromptOptions::builder()
        .message(format!(
            "Images from community gallery '{gallery}' are provided by a third party. Do you accept the terms?"
        ))
        .default(false);
    let options = match eula {
        Some(eula) => options
            .pre_confirmation_help_text(format!("End user license agreement: {eula}"))
            .build(),
        None => options.build(),
    };

    match interaction
        .confirm(options)
        .map_err(|e| DeployError::Prompt(e.context("pass --accept-term to run non-interactively")))?
    {
        ConfirmationPromptResult::Yes => {
            info!(%gallery, "community gallery terms accepted");
            Ok(())
        }
        ConfirmationPromptResult::No | ConfirmationPromptResult::Canceled => Err(
            DeployError::usage("the community gallery terms must be accepted, or pass --accept-term"),
        ),
    }
}

/// Log Analytics workspace the monitoring agent reports to; it has to exist.
async fn resolve_workspace(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
) -> Result<Option<ResourceId>, DeployError> {
    let Some(workspace) = &request.workspace else {
        return Ok(None);
    };

    let id = context.resource_id(workspace, "Microsoft.OperationalInsights", "workspaces");
    if !context.exists(&id).await? {
        return Err(DeployError::resolution(
            format!("workspace '{workspace}' does not exist"),
            &["workspace id", "workspace name"],
        ));
    }
    Ok(Some(id))
}
