//! Storage profile selection and image classification.
use std::cmp::Ordering;

use serde_json::Value;
use tracing::{debug, warn};

use super::ResolverContext;
use crate::{
    dependencies::{AliasDocumentSource, ResourceReader},
    error::DeployError,
    models::{
        BUNDLED_ALIAS_DOCUMENT, CreateRequest, ImageAlias, ImageSource, ImageUrn, OsType,
        PublicGalleryImage, PurchasePlan, ResourceId, StorageProfile,
    },
};

const CLASSIFICATION_PATH: [&str; 7] = [
    "resource id",
    "shared gallery id",
    "community gallery id",
    "urn",
    "vhd uri",
    "alias",
    "managed image",
];

/// Where the OS disk comes from once the image reference is understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsDiskSource {
    Marketplace(ImageUrn),
    /// Managed image, gallery image or gallery image version.
    CustomImage(ResourceId),
    SharedGallery(PublicGalleryImage),
    CommunityGallery(PublicGalleryImage),
    Vhd(String),
    AttachManaged(ResourceId),
    AttachVhd(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub profile: StorageProfile,
    pub source: OsDiskSource,
    pub os_type: OsType,
    /// LUNs of the data disks the image brings along.
    pub image_data_luns: Vec<u32>,
    pub plan: Option<PurchasePlan>,
}

impl ResolvedImage {
    pub fn urn(&self) -> Option<&ImageUrn> {
        match &self.source {
            OsDiskSource::Marketplace(urn) => Some(urn),
            _ => None,
        }
    }
}

/// Input checks that need nothing but the request; run before any remote call.
pub fn check_image_flags(request: &CreateRequest) -> Result<(), DeployError> {
    if request.ephemeral_os_disk_placement.is_some() && !request.ephemeral_os_disk {
        return Err(DeployError::usage(
            "--ephemeral-os-disk-placement is only configurable when --ephemeral-os-disk is specified",
        ));
    }
    if request.specialized && request.image.is_none() {
        return Err(DeployError::usage(
            "--specialized is only configurable when --image is specified",
        ));
    }
    match (&request.image, &request.attach_os_disk) {
        (Some(_), None) | (None, Some(_)) => Ok(()),
        _ => Err(DeployError::usage("--image IMAGE | --attach-os-disk DISK")),
    }
}

/// Select the storage profile, validate its field set and fetch the image metadata it needs.
pub async fn resolve_image(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
    location: &str,
) -> Result<ResolvedImage, DeployError> {
    check_image_flags(request)?;

    let (profile, source) = match (&request.image, &request.attach_os_disk) {
        (None, Some(disk)) if request.use_unmanaged_disk => (
            StorageProfile::SaSpecializedOsDisk,
            OsDiskSource::AttachVhd(disk.clone()),
        ),
        (None, Some(disk)) => (
            StorageProfile::ManagedSpecializedOsDisk,
            OsDiskSource::AttachManaged(context.resource_id(disk, "Microsoft.Compute", "disks")),
        ),
        (Some(image), _) => classify_image(context, request, image).await?,
        (None, None) => return Err(DeployError::usage("--image IMAGE | --attach-os-disk DISK")),
    };
    debug!(%profile, "storage profile selected");

    profile.check_fields(request)?;

    let mut image_data_luns = Vec::new();
    let os_type = match &source {
        OsDiskSource::Marketplace(urn) => OsType::from_offer(&urn.offer),
        OsDiskSource::CustomImage(id) => {
            let metadata = custom_image_metadata(context, id).await?;
            image_data_luns = metadata.data_luns;
            metadata.os_type
        }
        OsDiskSource::SharedGallery(image) => {
            let path = format!(
                "/subscriptions/{}/providers/Microsoft.Compute/locations/{}/sharedGalleries/{}/images/{}",
                context.scope.subscription_id, location, image.gallery, image.image
            );
            gallery_os_type(context, request, &path, "shared").await?
        }
        OsDiskSource::CommunityGallery(image) => {
            let path = format!(
                "/subscriptions/{}/providers/Microsoft.Compute/locations/{}/communityGalleries/{}/images/{}",
                context.scope.subscription_id, location, image.gallery, image.image
            );
            gallery_os_type(context, request, &path, "community").await?
        }
        OsDiskSource::Vhd(_) | OsDiskSource::AttachManaged(_) | OsDiskSource::AttachVhd(_) => {
            request.os_type.ok_or_else(|| DeployError::usage("--os-type is required"))?
        }
    };

    let plan = match (&source, request.plan.name.clone()) {
        (_, Some(name)) => Some(PurchasePlan {
            name,
            product: request.plan.product.clone().unwrap_or_default(),
            publisher: request.plan.publisher.clone().unwrap_or_default(),
            promotion_code: request.plan.promotion_code.clone(),
        }),
        (OsDiskSource::Marketplace(urn), None) if request.plan.is_empty() => {
            lookup_plan(context, location, urn).await
        }
        _ => None,
    };

    Ok(ResolvedImage {
        profile,
        source,
        os_type,
        image_data_luns,
        plan,
    })
}

async fn classify_image(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
    image: &str,
) -> Result<(StorageProfile, OsDiskSource), DeployError> {
    let marketplace = |urn: ImageUrn| {
        let profile = if request.use_unmanaged_disk {
            StorageProfile::SaPirImage
        } else {
            StorageProfile::ManagedPirImage
        };
        (profile, OsDiskSource::Marketplace(urn))
    };

    match ImageSource::classify(image) {
        Some(ImageSource::ManagedImage(id)) => {
            return Ok((StorageProfile::ManagedCustomImage, OsDiskSource::CustomImage(id)));
        }
        Some(ImageSource::SharedGallery(image)) => {
            return Ok((StorageProfile::SharedGalleryImage, OsDiskSource::SharedGallery(image)));
        }
        Some(ImageSource::CommunityGallery(image)) => {
            return Ok((
                StorageProfile::CommunityGalleryImage,
                OsDiskSource::CommunityGallery(image),
            ));
        }
        Some(ImageSource::Marketplace(urn)) => return Ok(marketplace(urn)),
        Some(ImageSource::VhdUri(url)) => {
            return Ok((StorageProfile::SaCustomImage, OsDiskSource::Vhd(url.to_string())));
        }
        None => {}
    }

    let aliases = load_aliases(context.aliases).await;
    if let Some(alias) = aliases
        .iter()
        .find(|alias| alias.urn_alias.eq_ignore_ascii_case(image))
    {
        debug!(alias = %alias.urn_alias, urn = %alias.urn(), "image alias matched");
        return Ok(marketplace(alias.urn()));
    }

    let id = context.resource_id(image, "Microsoft.Compute", "images");
    if context.exists(&id).await? {
        return Ok((StorageProfile::ManagedCustomImage, OsDiskSource::CustomImage(id)));
    }

    let names: Vec<&str> = aliases.iter().map(|alias| alias.urn_alias.as_str()).collect();
    Err(DeployError::resolution(
        format!(
            "invalid image \"{image}\"; use a valid image URN, custom image name, custom image id, VHD blob URI, or pick an image from [{}]",
            names.join(", ")
        ),
        &CLASSIFICATION_PATH,
    ))
}

/// The published alias list, or the bundled copy when it cannot be fetched or parsed.
pub async fn load_aliases(source: &(dyn AliasDocumentSource + Send + Sync)) -> Vec<ImageAlias> {
    let published = match source.fetch_alias_document().await {
        Ok(document) => ImageAlias::parse_document(&document),
        Err(e) => Err(e.to_string()),
    };

    match published {
        Ok(aliases) => aliases,
        Err(reason) => {
            warn!(reason = %reason, "failed to load the image alias document, using the bundled copy");
            // the bundled document ships with the binary and is covered by tests
            ImageAlias::parse_document(BUNDLED_ALIAS_DOCUMENT).unwrap_or_default()
        }
    }
}

struct CustomImageMetadata {
    os_type: OsType,
    data_luns: Vec<u32>,
}

async fn custom_image_metadata(
    context: &ResolverContext<'_>,
    id: &ResourceId,
) -> Result<CustomImageMetadata, DeployError> {
    let compute = &context.api_versions.compute;

    if id.is_type("Microsoft.Compute/images") {
        let image = context.resources.get(&id.to_string(), compute).await?;
        return Ok(CustomImageMetadata {
            os_type: os_type_at(&image, "/properties/storageProfile/osDisk/osType", id)?,
            data_luns: luns_at(&image, "/properties/storageProfile/dataDisks"),
        });
    }

    let is_gallery_image = id.resource_type.eq_ignore_ascii_case("galleries")
        && id
            .children
            .first()
            .is_some_and(|(child, _)| child.eq_ignore_ascii_case("images"));
    if !is_gallery_image {
        return Err(DeployError::usage(format!(
            "unrecognized image information \"{id}\""
        )));
    }

    let (definition_id, version) = match (id.children.len(), id.parent()) {
        (1, _) => (id.clone(), None),
        (2, Some(definition_id)) => (definition_id, Some(id.leaf_name().to_string())),
        _ => {
            return Err(DeployError::usage(format!(
                "unrecognized image information \"{id}\""
            )));
        }
    };

    let definition = context
        .resources
        .get(&definition_id.to_string(), compute)
        .await?;
    let os_type = os_type_at(&definition, "/properties/osType", id)?;

    let image_version = match version {
        Some(version) if !version.eq_ignore_ascii_case("latest") => {
            let version_id = definition_id.clone().child("versions", &version);
            context.resources.get(&version_id.to_string(), compute).await?
        }
        _ => {
            let versions = context
                .resources
                .list(&format!("{definition_id}/versions"), compute)
                .await?;
            latest_gallery_version(versions).ok_or_else(|| {
                DeployError::resolution(
                    format!("there is no latest image version for \"{id}\""),
                    &["gallery image versions"],
                )
            })?
        }
    };

    Ok(CustomImageMetadata {
        os_type,
        data_luns: luns_at(&image_version, "/properties/storageProfile/dataDiskImages"),
    })
}

/// Newest published version that is not excluded from `latest`.
fn latest_gallery_version(versions: Vec<Value>) -> Option<Value> {
    let published_date = |version: &Value| {
        version
            .pointer("/properties/publishingProfile/publishedDate")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    versions
        .into_iter()
        .filter(|version| {
            !version
                .pointer("/properties/publishingProfile/excludeFromLatest")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
        .max_by_key(published_date)
}

async fn gallery_os_type(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
    path: &str,
    kind: &str,
) -> Result<OsType, DeployError> {
    let image = context
        .resources
        .get(path, &context.api_versions.compute)
        .await?;
    let os_type: OsType = image
        .pointer("/properties/osType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .parse()?;

    match request.os_type {
        Some(requested) if requested != os_type => Err(DeployError::usage(format!(
            "--os-type is not the correct os type of this {kind} gallery image, the os type of this image should be {os_type}"
        ))),
        _ => Ok(os_type),
    }
}

fn os_type_at(value: &Value, pointer: &str, id: &ResourceId) -> Result<OsType, DeployError> {
    let os_type = value.pointer(pointer).and_then(Value::as_str).ok_or_else(|| {
        DeployError::resolution(
            format!("image \"{id}\" does not declare an os type"),
            &["managed image"],
        )
    })?;
    os_type.parse()
}

fn luns_at(value: &Value, pointer: &str) -> Vec<u32> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|disks| {
            disks
                .iter()
                .filter_map(|disk| disk.get("lun").and_then(Value::as_u64))
                .filter_map(|lun| u32::try_from(lun).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Path of a marketplace image collection for a location, optionally narrowed to
/// `publishers/{p}/artifacttypes/vmimage/offers/{o}/skus/{s}/versions`.
pub fn marketplace_path(subscription_id: &str, location: &str, segments: &[(&str, &str)]) -> String {
    let mut path = format!(
        "/subscriptions/{subscription_id}/providers/Microsoft.Compute/locations/{location}"
    );
    for (collection, name) in segments {
        path.push_str(&format!("/{collection}/{name}"));
    }
    path
}

/// Path of one marketplace image version.
pub fn marketplace_version_path(subscription_id: &str, location: &str, urn: &ImageUrn) -> String {
    marketplace_path(
        subscription_id,
        location,
        &[
            ("publishers", urn.publisher.as_str()),
            ("artifacttypes", "vmimage"),
            ("offers", urn.offer.as_str()),
            ("skus", urn.sku.as_str()),
            ("versions", urn.version.as_str()),
        ],
    )
}

/// Compare dotted versions numerically (`1.10.0 > 1.9.3`).
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let parts = |version: &str| -> Vec<u64> {
        version
            .split('.')
            .map(|part| part.parse().unwrap_or(0))
            .collect()
    };
    parts(left).cmp(&parts(right))
}

/// Resolve `latest` to the newest published version of a marketplace sku.
///
/// Shared by the create pipeline and `image show`, so it only needs a resource reader.
pub async fn resolve_latest_version(
    resources: &(dyn ResourceReader + Send + Sync),
    subscription_id: &str,
    api_version: &str,
    location: &str,
    urn: &ImageUrn,
) -> Result<ImageUrn, DeployError> {
    if !urn.is_latest() {
        return Ok(urn.clone());
    }

    let path = marketplace_path(
        subscription_id,
        location,
        &[
            ("publishers", urn.publisher.as_str()),
            ("artifacttypes", "vmimage"),
            ("offers", urn.offer.as_str()),
            ("skus", urn.sku.as_str()),
        ],
    );
    let versions = resources
        .list(&format!("{path}/versions"), api_version)
        .await?;
    let newest = versions
        .iter()
        .filter_map(|version| version.get("name").and_then(Value::as_str))
        .max_by(|left, right| compare_versions(left, right))
        .ok_or_else(|| {
            DeployError::resolution(
                format!("no versions available for image \"{urn}\""),
                &["marketplace versions"],
            )
        })?;

    Ok(ImageUrn::new(&urn.publisher, &urn.offer, &urn.sku, newest))
}

/// Purchase plan declared by a marketplace image; lookup failures only warn.
async fn lookup_plan(
    context: &ResolverContext<'_>,
    location: &str,
    urn: &ImageUrn,
) -> Option<PurchasePlan> {
    let result = async {
        let urn = resolve_latest_version(
            context.resources,
            &context.scope.subscription_id,
            &context.api_versions.compute,
            location,
            urn,
        )
        .await?;
        let path = marketplace_version_path(&context.scope.subscription_id, location, &urn);
        let version = context
            .resources
            .get(&path, &context.api_versions.compute)
            .await?;
        Ok::<_, DeployError>(
            version
                .pointer("/properties/plan")
                .cloned()
                .and_then(|plan| serde_json::from_value::<PurchasePlan>(plan).ok()),
        )
    }
    .await;

    match result {
        Ok(plan) => plan,
        Err(e) => {
            warn!(urn = %urn, error = %e, "could not read the image purchase plan, continuing without it");
            None
        }
    }
}

/// EULA link of a community gallery.
pub async fn community_gallery_eula(
    context: &ResolverContext<'_>,
    location: &str,
    gallery: &str,
) -> Result<Option<String>, DeployError> {
    let path = format!(
        "/subscriptions/{}/providers/Microsoft.Compute/locations/{}/communityGalleries/{}",
        context.scope.subscription_id, location, gallery
    );
    let value = context
        .resources
        .get(&path, &context.api_versions.compute)
        .await?;

    Ok(value
        .pointer("/properties/communityMetadata/eula")
        .or_else(|| value.pointer("/communityMetadata/eula"))
        .and_then(Value::as_str)
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dependencies::{RemoteError, mocks::not_found},
        models::{Caching, ScaleSetOptions},
        resolvers::testing::*,
    };
    use serde_json::json;

    fn request_with_image(image: &str) -> CreateRequest {
        CreateRequest {
            name: "vm1".to_string(),
            resource_group: RESOURCE_GROUP.to_string(),
            image: Some(image.to_string()),
            ..Default::default()
        }
    }

    fn alias_document() -> String {
        json!({
            "outputs": {"aliases": {"value": {"Linux": {
                "UbuntuLTS": {"publisher": "Canonical", "offer": "UbuntuServer", "sku": "18.04-LTS", "version": "latest"}
            }}}}
        })
        .to_string()
    }

    // ==================== pre-checks ====================

    #[test]
    fn test_image_and_attach_together_is_usage_error() {
        let request = CreateRequest {
            attach_os_disk: Some("disk1".to_string()),
            ..request_with_image("UbuntuLTS")
        };

        assert!(matches!(check_image_flags(&request), Err(DeployError::Usage(_))));
    }

    #[test]
    fn test_neither_image_nor_attach_is_usage_error() {
        let error = check_image_flags(&CreateRequest::default()).unwrap_err();

        assert_eq!(
            error.to_string(),
            "usage error: --image IMAGE | --attach-os-disk DISK"
        );
    }

    #[test]
    fn test_ephemeral_placement_requires_ephemeral_disk() {
        let request = CreateRequest {
            ephemeral_os_disk_placement: Some(crate::models::EphemeralPlacement::ResourceDisk),
            ..request_with_image("UbuntuLTS")
        };

        assert!(matches!(check_image_flags(&request), Err(DeployError::Usage(_))));
    }

    #[tokio::test]
    async fn test_conflicting_request_makes_no_remote_call() {
        // no expectations: any remote call panics
        let fixture = Fixture::new();
        let request = CreateRequest {
            attach_os_disk: Some("disk1".to_string()),
            ..request_with_image("Canonical:UbuntuServer:18.04:latest")
        };

        let result = resolve_image(&fixture.context(), &request, "westus").await;

        assert!(matches!(result, Err(DeployError::Usage(_))));
    }

    // ==================== classification ====================

    #[tokio::test]
    async fn test_urn_selects_managed_marketplace_profile() {
        let mut fixture = Fixture::new();
        // plan lookup reads the version list and the newest version
        fixture
            .resources
            .expect_list()
            .withf(|path, _| {
                path == "/subscriptions/sub/providers/Microsoft.Compute/locations/westus/publishers/Canonical/artifacttypes/vmimage/offers/UbuntuServer/skus/18.04/versions"
            })
            .return_once(|_, _| Ok(vec![json!({"name": "18.04.201901220"}), json!({"name": "18.04.202001010"})]));
        fixture
            .resources
            .expect_get()
            .withf(|path, _| path.ends_with("/versions/18.04.202001010"))
            .return_once(|_, _| Ok(json!({"properties": {}})));

        let request = request_with_image("Canonical:UbuntuServer:18.04:latest");

        let resolved = resolve_image(&fixture.context(), &request, "westus")
            .await
            .unwrap();

        assert_eq!(resolved.profile, StorageProfile::ManagedPirImage);
        assert_eq!(resolved.os_type, OsType::Linux);
        assert_eq!(resolved.plan, None);
        assert_eq!(
            resolved.urn(),
            Some(&ImageUrn::new("Canonical", "UbuntuServer", "18.04", "latest"))
        );
    }

    #[tokio::test]
    async fn test_urn_with_unmanaged_disk_selects_unmanaged_profile() {
        let mut fixture = Fixture::new();
        fixture
            .resources
            .expect_get()
            .return_once(|_, _| {
                Ok(json!({"properties": {"plan": {"name": "byol", "product": "fortigate", "publisher": "fortinet"}}}))
            });

        let request = CreateRequest {
            use_unmanaged_disk: true,
            ..request_with_image("fortinet:fortigate:byol:6.0.1")
        };

        let resolved = resolve_image(&fixture.context(), &request, "westus")
            .await
            .unwrap();

        assert_eq!(resolved.profile, StorageProfile::SaPirImage);
        assert_eq!(resolved.plan.map(|plan| plan.name), Some("byol".to_string()));
    }

    #[tokio::test]
    async fn test_explicit_plan_skips_lookup() {
        let fixture = Fixture::new();
        let mut request = request_with_image("MicrosoftWindowsServer:WindowsServer:2019-Datacenter:1.0.0");
        request.plan.name = Some("plan1".to_string());
        request.plan.publisher = Some("pub1".to_string());

        let resolved = resolve_image(&fixture.context(), &request, "westus")
            .await
            .unwrap();

        assert_eq!(resolved.os_type, OsType::Windows);
        assert_eq!(resolved.plan.unwrap().publisher, "pub1");
    }

    #[tokio::test]
    async fn test_alias_is_matched_case_insensitively() {
        let mut fixture = Fixture::new();
        fixture
            .aliases
            .expect_fetch_alias_document()
            .return_once(|| Ok(alias_document()));
        fixture
            .resources
            .expect_list()
            .returning(|path, _| Err(not_found(path)));

        let resolved = resolve_image(&fixture.context(), &request_with_image("ubuntults"), "westus")
            .await
            .unwrap();

        assert_eq!(resolved.profile, StorageProfile::ManagedPirImage);
        assert_eq!(resolved.urn().unwrap().offer, "UbuntuServer");
    }

    #[tokio::test]
    async fn test_alias_fetch_failure_falls_back_to_bundled_document() {
        let mut fixture = Fixture::new();
        fixture
            .aliases
            .expect_fetch_alias_document()
            .return_once(|| Err(not_found("https://aliases.example.com/aliases.json")));
        fixture
            .resources
            .expect_list()
            .returning(|path, _| Err(not_found(path)));

        let resolved = resolve_image(
            &fixture.context(),
            &request_with_image("Win2019Datacenter"),
            "westus",
        )
        .await
        .unwrap();

        assert_eq!(resolved.os_type, OsType::Windows);
    }

    #[tokio::test]
    async fn test_unknown_image_lists_aliases_and_attempted_path() {
        let mut fixture = Fixture::new();
        fixture
            .aliases
            .expect_fetch_alias_document()
            .return_once(|| Ok(alias_document()));
        fixture
            .resources
            .expect_get()
            .withf(|path, _| path == rg_id("Microsoft.Compute", "images", "myimage"))
            .return_once(|path, _| Err(not_found(path)));

        let error = resolve_image(&fixture.context(), &request_with_image("myimage"), "westus")
            .await
            .unwrap_err();

        let message = error.to_string();
        assert!(matches!(error, DeployError::Resolution { .. }));
        assert!(message.contains("[UbuntuLTS]"));
        assert!(message.contains("alias -> managed image"));
    }

    #[tokio::test]
    async fn test_vhd_uri_requires_os_type() {
        let fixture = Fixture::new();
        let request = CreateRequest {
            use_unmanaged_disk: true,
            ..request_with_image("https://sa.blob.core.windows.net/vhds/image.vhd")
        };

        let error = resolve_image(&fixture.context(), &request, "westus")
            .await
            .unwrap_err();

        assert!(error.to_string().contains("missing: --os-type"));
    }

    // ==================== managed custom images ====================

    #[tokio::test]
    async fn test_managed_image_by_name_reads_metadata() {
        let image_id = rg_id("Microsoft.Compute", "images", "myimage");
        let mut fixture = Fixture::new();
        fixture
            .aliases
            .expect_fetch_alias_document()
            .return_once(|| Ok(alias_document()));
        fixture
            .resources
            .expect_get()
            .withf(move |path, _| path == image_id)
            .times(2)
            .returning(|_, _| {
                Ok(json!({"properties": {"storageProfile": {
                    "osDisk": {"osType": "Windows"},
                    "dataDisks": [{"lun": 0}, {"lun": 3}]
                }}}))
            });

        let resolved = resolve_image(&fixture.context(), &request_with_image("myimage"), "westus")
            .await
            .unwrap();

        assert_eq!(resolved.profile, StorageProfile::ManagedCustomImage);
        assert_eq!(resolved.os_type, OsType::Windows);
        assert_eq!(resolved.image_data_luns, vec![0, 3]);
    }

    #[tokio::test]
    async fn test_gallery_image_latest_skips_excluded_versions() {
        let definition = rg_id("Microsoft.Compute", "galleries", "gallery1/images/def1");
        let definition_for_get = definition.clone();
        let mut fixture = Fixture::new();
        fixture
            .resources
            .expect_get()
            .withf(move |path, _| path == definition_for_get)
            .return_once(|_, _| Ok(json!({"properties": {"osType": "Linux"}})));
        fixture
            .resources
            .expect_list()
            .withf(move |path, _| path == format!("{definition}/versions"))
            .return_once(|_, _| {
                Ok(vec![
                    json!({"name": "1.0.0", "properties": {
                        "publishingProfile": {"publishedDate": "2023-01-01T00:00:00Z"},
                        "storageProfile": {"dataDiskImages": [{"lun": 1}]}
                    }}),
                    json!({"name": "2.0.0", "properties": {
                        "publishingProfile": {"publishedDate": "2023-06-01T00:00:00Z", "excludeFromLatest": true},
                        "storageProfile": {"dataDiskImages": [{"lun": 5}]}
                    }}),
                ])
            });

        let request = request_with_image(&rg_id(
            "Microsoft.Compute",
            "galleries",
            "gallery1/images/def1/versions/latest",
        ));

        let resolved = resolve_image(&fixture.context(), &request, "westus")
            .await
            .unwrap();

        assert_eq!(resolved.profile, StorageProfile::ManagedCustomImage);
        assert_eq!(resolved.image_data_luns, vec![1]);
    }

    #[tokio::test]
    async fn test_custom_image_forbids_os_type() {
        let fixture = Fixture::new();
        let request = CreateRequest {
            os_type: Some(OsType::Linux),
            ..request_with_image(&rg_id("Microsoft.Compute", "images", "img"))
        };

        let error = resolve_image(&fixture.context(), &request, "westus")
            .await
            .unwrap_err();

        assert!(error.to_string().contains("not applicable: --os-type"));
    }

    // ==================== galleries ====================

    #[tokio::test]
    async fn test_shared_gallery_os_type_mismatch_is_usage_error() {
        let mut fixture = Fixture::new();
        fixture
            .resources
            .expect_get()
            .withf(|path, _| {
                path == "/subscriptions/sub/providers/Microsoft.Compute/locations/westus/sharedGalleries/g1/images/i1"
            })
            .return_once(|_, _| Ok(json!({"properties": {"osType": "Windows"}})));

        let request = CreateRequest {
            os_type: Some(OsType::Linux),
            ..request_with_image("/SharedGalleries/g1/Images/i1/Versions/latest")
        };

        let error = resolve_image(&fixture.context(), &request, "westus")
            .await
            .unwrap_err();

        assert!(matches!(error, DeployError::Usage(_)));
        assert!(error.to_string().contains("should be windows"));
    }

    #[tokio::test]
    async fn test_community_gallery_reads_os_type() {
        let mut fixture = Fixture::new();
        fixture
            .resources
            .expect_get()
            .return_once(|_, _| Ok(json!({"properties": {"osType": "Linux"}})));

        let resolved = resolve_image(
            &fixture.context(),
            &request_with_image("/CommunityGalleries/c1/Images/i1/Versions/1.0.0"),
            "westus",
        )
        .await
        .unwrap();

        assert_eq!(resolved.profile, StorageProfile::CommunityGalleryImage);
        assert_eq!(resolved.os_type, OsType::Linux);
    }

    #[tokio::test]
    async fn test_community_gallery_eula() {
        let mut fixture = Fixture::new();
        fixture
            .resources
            .expect_get()
            .withf(|path, _| path.ends_with("/locations/westus/communityGalleries/c1"))
            .return_once(|_, _| {
                Ok(json!({"properties": {"communityMetadata": {"eula": "https://example.com/eula"}}}))
            });

        let eula = community_gallery_eula(&fixture.context(), "westus", "c1")
            .await
            .unwrap();

        assert_eq!(eula.as_deref(), Some("https://example.com/eula"));
    }

    // ==================== specialized disks ====================

    #[tokio::test]
    async fn test_attach_disk_selects_managed_specialized_profile() {
        let fixture = Fixture::new();
        let request = CreateRequest {
            attach_os_disk: Some("osdisk1".to_string()),
            os_type: Some(OsType::Linux),
            ..Default::default()
        };

        let resolved = resolve_image(&fixture.context(), &request, "westus")
            .await
            .unwrap();

        assert_eq!(resolved.profile, StorageProfile::ManagedSpecializedOsDisk);
        assert_eq!(
            resolved.source,
            OsDiskSource::AttachManaged(
                ResourceId::parse(&rg_id("Microsoft.Compute", "disks", "osdisk1")).unwrap()
            )
        );
    }

    #[tokio::test]
    async fn test_attach_disk_rejects_os_disk_options() {
        let fixture = Fixture::new();
        let request = CreateRequest {
            attach_os_disk: Some("osdisk1".to_string()),
            os_type: Some(OsType::Linux),
            os_caching: Some(Caching::ReadWrite),
            ..Default::default()
        };

        let error = resolve_image(&fixture.context(), &request, "westus")
            .await
            .unwrap_err();

        assert!(error.to_string().contains("not applicable: --os-disk-caching"));
    }

    #[tokio::test]
    async fn test_scale_set_with_image_passes_precheck() {
        let fixture = Fixture::new();
        let mut request = request_with_image("Canonical:UbuntuServer:18.04:1.0.0");
        request.scale_set = Some(ScaleSetOptions::default());
        request.plan.name = Some("p".to_string());

        let resolved = resolve_image(&fixture.context(), &request, "westus")
            .await
            .unwrap();

        assert_eq!(resolved.profile, StorageProfile::ManagedPirImage);
    }

    // ==================== versions ====================

    #[test]
    fn test_compare_versions_is_numeric() {
        assert_eq!(compare_versions("1.10.0", "1.9.3"), Ordering::Greater);
        assert_eq!(compare_versions("18.04.1", "18.04.1"), Ordering::Equal);
        assert_eq!(compare_versions("2", "10"), Ordering::Less);
    }

    #[test]
    fn test_remote_errors_convert() {
        let error: DeployError = RemoteError::NotFound {
            path: "/x".to_string(),
        }
        .into();

        assert!(matches!(error, DeployError::Remote(_)));
    }
}
