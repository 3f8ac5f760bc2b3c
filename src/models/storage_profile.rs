use std::fmt::Display;

use serde::Serialize;

use super::{CreateRequest, RequestField, ResourceId};
use crate::error::DeployError;

/// How the OS disk of a new machine is sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageProfile {
    /// Unmanaged OS disk from a marketplace image.
    #[serde(rename = "new-unmanaged-from-image")]
    SaPirImage,
    /// Unmanaged OS disk from a generalized VHD.
    #[serde(rename = "new-unmanaged-custom-image")]
    SaCustomImage,
    #[serde(rename = "attach-unmanaged-specialized")]
    SaSpecializedOsDisk,
    #[serde(rename = "new-managed-from-marketplace-image")]
    ManagedPirImage,
    #[serde(rename = "new-managed-from-custom-image")]
    ManagedCustomImage,
    #[serde(rename = "attach-managed-specialized")]
    ManagedSpecializedOsDisk,
    SharedGalleryImage,
    CommunityGalleryImage,
}

impl StorageProfile {
    pub fn description(self) -> &'static str {
        match self {
            Self::SaCustomImage => "create unmanaged OS disk created from generalized VHD",
            Self::SaPirImage => "create unmanaged OS disk from Azure Marketplace image",
            Self::SaSpecializedOsDisk => "attach to existing unmanaged OS disk",
            Self::ManagedCustomImage => "create managed OS disk from custom image",
            Self::ManagedPirImage => "create managed OS disk from Azure Marketplace image",
            Self::ManagedSpecializedOsDisk => "attach existing managed OS disk",
            Self::SharedGalleryImage => "create OS disk from shared gallery image",
            Self::CommunityGalleryImage => "create OS disk from community gallery image",
        }
    }

    pub fn is_unmanaged(self) -> bool {
        matches!(
            self,
            Self::SaPirImage | Self::SaCustomImage | Self::SaSpecializedOsDisk
        )
    }

    /// Profiles that attach an existing OS disk and therefore carry no OS profile.
    pub fn is_specialized(self) -> bool {
        matches!(
            self,
            Self::SaSpecializedOsDisk | Self::ManagedSpecializedOsDisk
        )
    }

    pub fn required_fields(self, scale_set: bool) -> Vec<RequestField> {
        use RequestField::*;

        let required = match self {
            Self::ManagedPirImage
            | Self::ManagedCustomImage
            | Self::SharedGalleryImage
            | Self::CommunityGalleryImage => vec![Image],
            Self::ManagedSpecializedOsDisk => vec![OsType, AttachOsDisk],
            Self::SaPirImage => vec![Image, UseUnmanagedDisk],
            Self::SaCustomImage => vec![Image, OsType, UseUnmanagedDisk],
            Self::SaSpecializedOsDisk => vec![OsType, AttachOsDisk, UseUnmanagedDisk],
        };

        scrub_for_scale_set(required, scale_set)
    }

    pub fn forbidden_fields(self, scale_set: bool) -> Vec<RequestField> {
        use RequestField::*;

        let mut forbidden = match self {
            Self::ManagedPirImage | Self::ManagedCustomImage => vec![
                OsType,
                AttachOsDisk,
                StorageAccount,
                StorageContainerName,
                UseUnmanagedDisk,
            ],
            Self::SharedGalleryImage | Self::CommunityGalleryImage => vec![
                AttachOsDisk,
                StorageAccount,
                StorageContainerName,
                UseUnmanagedDisk,
            ],
            Self::ManagedSpecializedOsDisk => vec![
                OsDiskName,
                OsCaching,
                StorageAccount,
                EphemeralOsDisk,
                StorageContainerName,
                UseUnmanagedDisk,
                StorageSku,
            ],
            Self::SaPirImage => vec![OsType, AttachOsDisk, DataDiskSizesGb, EphemeralOsDisk],
            Self::SaCustomImage => vec![AttachOsDisk, DataDiskSizesGb, EphemeralOsDisk],
            Self::SaSpecializedOsDisk => vec![
                OsDiskName,
                OsCaching,
                Image,
                StorageAccount,
                EphemeralOsDisk,
                StorageContainerName,
                DataDiskSizesGb,
                StorageSku,
            ],
        };

        if self.is_specialized() {
            forbidden.extend(RequestField::AUTH);
        }
        if scale_set && matches!(self, Self::ManagedPirImage | Self::ManagedCustomImage) {
            forbidden.push(OsDiskName);
        }

        scrub_for_scale_set(forbidden, scale_set)
    }

    /// Check that every required field is present and every forbidden one absent.
    pub fn check_fields(self, request: &CreateRequest) -> Result<(), DeployError> {
        let scale_set = request.is_scale_set();

        let missing: Vec<&str> = self
            .required_fields(scale_set)
            .into_iter()
            .filter(|field| !request.is_set(*field))
            .map(RequestField::flag)
            .collect();
        let not_applicable: Vec<&str> = self
            .forbidden_fields(scale_set)
            .into_iter()
            .filter(|field| request.is_set(*field))
            .map(RequestField::flag)
            .collect();

        if missing.is_empty() && not_applicable.is_empty() {
            return Ok(());
        }

        let mut message = format!("invalid usage for storage profile: {}:", self.description());
        if !missing.is_empty() {
            message.push_str(&format!("\n\tmissing: {}", missing.join(", ")));
        }
        if !not_applicable.is_empty() {
            message.push_str(&format!("\n\tnot applicable: {}", not_applicable.join(", ")));
        }

        Err(DeployError::Usage(message))
    }
}

// Scale sets have no attachable OS disk and no single storage account.
fn scrub_for_scale_set(fields: Vec<RequestField>, scale_set: bool) -> Vec<RequestField> {
    if !scale_set {
        return fields;
    }

    fields
        .into_iter()
        .filter(|field| !matches!(field, RequestField::AttachOsDisk | RequestField::StorageAccount))
        .collect()
}

impl Display for StorageProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SaPirImage => "new-unmanaged-from-image",
            Self::SaCustomImage => "new-unmanaged-custom-image",
            Self::SaSpecializedOsDisk => "attach-unmanaged-specialized",
            Self::ManagedPirImage => "new-managed-from-marketplace-image",
            Self::ManagedCustomImage => "new-managed-from-custom-image",
            Self::ManagedSpecializedOsDisk => "attach-managed-specialized",
            Self::SharedGalleryImage => "shared-gallery-image",
            Self::CommunityGalleryImage => "community-gallery-image",
        };
        write!(f, "{name}")
    }
}

/// Storage account holding the VHDs of an unmanaged machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageAccountPlan {
    Existing(ResourceId),
    New { name: String, sku: String },
}

impl StorageAccountPlan {
    pub fn name(&self) -> &str {
        match self {
            Self::Existing(id) => &id.name,
            Self::New { name, .. } => name,
        }
    }
}
