//! Compute pieces shared by machines and scale sets.
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde_json::{Map, Value, json};

use super::{Reference, TemplateContext, naming};
use crate::{
    models::{
        CreateRequest, DataDisk, DataDiskSource, DeploymentDocument, DiskLayout, OsType,
        PlanOptions, PurchasePlan, ResourceDefinition, ResourceId, Secret, VaultSecretGroup,
    },
    resolvers::{
        credentials::Credentials,
        identity::{ResolvedIdentity, RoleAssignment},
        image::{OsDiskSource, ResolvedImage},
        placement::ResolvedPlacement,
    },
};

pub const VM_TYPE: &str = "Microsoft.Compute/virtualMachines";
pub const VMSS_TYPE: &str = "Microsoft.Compute/virtualMachineScaleSets";
pub const STORAGE_ACCOUNT_TYPE: &str = "Microsoft.Storage/storageAccounts";
pub const EXTENSION_TYPE: &str = "Microsoft.Compute/virtualMachines/extensions";

/// Accounts in the storage pool of an unmanaged scale set.
pub const STORAGE_POOL_SIZE: usize = 5;
const STORAGE_POOL_LOOP: &str = "storageLoop";
const MONITORING_API_VERSION: &str = "2015-11-01-preview";

pub fn storage_account(context: &TemplateContext<'_>, name: &str, sku: &str) -> ResourceDefinition {
    context
        .resource(STORAGE_ACCOUNT_TYPE, name, &context.api_versions.storage)
        .properties(json!({"accountType": sku}))
}

/// Copy loop of storage accounts holding the VHDs of an unmanaged scale set.
///
/// Adds the `storageAccountNames` and `vhdContainers` variables and returns the loop name the
/// scale set depends on.
pub fn add_storage_pool(
    document: &mut DeploymentDocument,
    context: &TemplateContext<'_>,
    naming_prefix: &str,
    sku: &str,
) -> String {
    let names: Vec<String> = (0..STORAGE_POOL_SIZE)
        .map(|index| format!("{naming_prefix}{index}"))
        .collect();
    let containers: Vec<String> = (0..STORAGE_POOL_SIZE)
        .map(|index| {
            format!(
                "[concat('https://', variables('storageAccountNames')[{index}], '.blob.core.windows.net/vhds')]"
            )
        })
        .collect();
    document.add_variable("storageAccountNames", json!(names));
    document.add_variable("vhdContainers", json!(containers));

    let pool = storage_account(
        context,
        "[variables('storageAccountNames')[copyIndex()]]",
        sku,
    )
    .with(
        "copy",
        json!({"name": STORAGE_POOL_LOOP, "count": STORAGE_POOL_SIZE}),
    );
    document.add_resource(pool);
    STORAGE_POOL_LOOP.to_string()
}

pub fn vhd_uri(account: &str, container: &str, disk_name: &str) -> String {
    format!("https://{account}.blob.core.windows.net/{container}/{disk_name}.vhd")
}

/// Where the OS disk of an unmanaged profile is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsDiskTarget {
    Managed,
    /// The disk stays in the blob it is sourced from.
    Source,
    /// One VHD of a single machine.
    Vhd(String),
    /// Containers of a scale set storage pool.
    Containers(Value),
}

/// `storageProfile` of a machine or scale set model.
pub fn storage_profile(
    image: &ResolvedImage,
    disks: &DiskLayout,
    os_disk_name: Option<&str>,
    target: &OsDiskTarget,
) -> Value {
    let os = &disks.os;
    let mut os_disk = Map::new();
    let mut profile = Map::new();

    let create_option = if image.profile.is_specialized() { "attach" } else { "fromImage" };
    os_disk.insert("createOption".into(), json!(create_option));
    if let Some(name) = os_disk_name {
        os_disk.insert("name".into(), json!(name));
    }
    if !image.profile.is_specialized() {
        os_disk.insert("caching".into(), json!(os.caching.to_string()));
    }

    match &image.source {
        OsDiskSource::Vhd(uri) => {
            os_disk.insert("osType".into(), json!(image.os_type.template_name()));
            os_disk.insert("image".into(), json!({"uri": uri}));
        }
        OsDiskSource::AttachVhd(uri) => {
            os_disk.insert("osType".into(), json!(image.os_type.template_name()));
            os_disk.insert("vhd".into(), json!({"uri": uri}));
        }
        OsDiskSource::AttachManaged(id) => {
            os_disk.insert("osType".into(), json!(image.os_type.template_name()));
            os_disk.insert("managedDisk".into(), json!({"id": id.to_string()}));
        }
        OsDiskSource::Marketplace(urn) => {
            profile.insert(
                "imageReference".into(),
                json!({
                    "publisher": urn.publisher,
                    "offer": urn.offer,
                    "sku": urn.sku,
                    "version": urn.version,
                }),
            );
        }
        OsDiskSource::CustomImage(id) => {
            profile.insert("imageReference".into(), json!({"id": id.to_string()}));
        }
        OsDiskSource::SharedGallery(gallery_image) => {
            profile.insert(
                "imageReference".into(),
                json!({"sharedGalleryImageId": gallery_image.id}),
            );
        }
        OsDiskSource::CommunityGallery(gallery_image) => {
            profile.insert(
                "imageReference".into(),
                json!({"communityGalleryImageId": gallery_image.id}),
            );
        }
    }

    match target {
        OsDiskTarget::Vhd(uri) => {
            os_disk.insert("vhd".into(), json!({"uri": uri}));
        }
        OsDiskTarget::Containers(containers) => {
            os_disk.insert("vhdContainers".into(), containers.clone());
        }
        OsDiskTarget::Managed if !image.profile.is_specialized() => {
            if let Some(sku) = &os.storage_sku {
                os_disk.insert("managedDisk".into(), json!({"storageAccountType": sku}));
            }
        }
        _ => {}
    }

    if let Some(size_gb) = os.size_gb {
        os_disk.insert("diskSizeGB".into(), json!(size_gb));
    }
    if let Some(enabled) = os.write_accelerator {
        os_disk.insert("writeAcceleratorEnabled".into(), json!(enabled));
    }
    if os.ephemeral {
        let mut settings = json!({"option": "Local"});
        if let Some(placement) = os.ephemeral_placement {
            settings["placement"] = json!(placement.to_string());
        }
        os_disk.insert("diffDiskSettings".into(), settings);
    }

    profile.insert("osDisk".into(), Value::Object(os_disk));
    if !disks.data.is_empty() {
        profile.insert(
            "dataDisks".into(),
            Value::Array(disks.data_disks().map(data_disk).collect()),
        );
    }
    Value::Object(profile)
}

fn data_disk(disk: &DataDisk) -> Value {
    let mut value = json!({"lun": disk.lun});
    let mut managed_disk = Map::new();

    match &disk.source {
        DataDiskSource::FromImage => {
            value["createOption"] = json!("fromImage");
        }
        DataDiskSource::Empty { size_gb } => {
            value["createOption"] = json!("empty");
            value["diskSizeGB"] = json!(size_gb);
        }
        DataDiskSource::Copy { source_id } => {
            value["createOption"] = json!("copy");
            value["sourceResource"] = json!({"id": source_id});
        }
        DataDiskSource::Restore { restore_point_id } => {
            value["createOption"] = json!("restore");
            value["sourceResource"] = json!({"id": restore_point_id});
        }
        DataDiskSource::AttachManaged { disk_id } => {
            value["createOption"] = json!("attach");
            managed_disk.insert("id".into(), json!(disk_id));
        }
        DataDiskSource::AttachVhd { uri } => {
            let name = uri
                .rsplit('/')
                .next()
                .unwrap_or(uri)
                .trim_end_matches(".vhd");
            value["createOption"] = json!("attach");
            value["name"] = json!(name);
            value["vhd"] = json!({"uri": uri});
        }
    }

    if let Some(caching) = disk.caching {
        value["caching"] = json!(caching.to_string());
    }
    if let Some(sku) = &disk.storage_sku {
        if !matches!(disk.source, DataDiskSource::AttachVhd { .. }) {
            managed_disk.insert("storageAccountType".into(), json!(sku));
        }
    }
    if !managed_disk.is_empty() {
        value["managedDisk"] = Value::Object(managed_disk);
    }
    if let Some(enabled) = disk.write_accelerator {
        value["writeAcceleratorEnabled"] = json!(enabled);
    }
    value
}

/// `osProfile` of a machine, or of a scale set model when `computer_name_key` is
/// `computerNamePrefix`. The password goes through a secure parameter.
pub fn os_profile(
    document: &mut DeploymentDocument,
    credentials: &Credentials,
    os_type: OsType,
    computer_name_key: &str,
    computer_name: &str,
    custom_data: Option<&str>,
    secrets: &[VaultSecretGroup],
) -> Value {
    let mut profile = Value::Object(Map::new());
    profile[computer_name_key] = json!(computer_name);
    profile["adminUsername"] = json!(credentials.admin_username);

    if let Some(password) = &credentials.admin_password {
        profile["adminPassword"] = json!(document.add_secure_parameter("adminPassword", password.clone()));
    }
    if let Some(custom_data) = custom_data {
        profile["customData"] = json!(BASE64.encode(custom_data));
    }
    if !secrets.is_empty() {
        profile["secrets"] = json!(secrets);
    }

    if os_type == OsType::Linux && !credentials.ssh_keys.is_empty() {
        let path = credentials.ssh_dest_key_path.clone().unwrap_or_else(|| {
            format!("/home/{}/.ssh/authorized_keys", credentials.admin_username)
        });
        let public_keys: Vec<Value> = credentials
            .ssh_keys
            .iter()
            .map(|key| json!({"keyData": key, "path": path}))
            .collect();
        profile["linuxConfiguration"] = json!({
            "disablePasswordAuthentication": credentials.disables_password_login(),
            "ssh": {"publicKeys": public_keys},
        });
    }
    profile
}

/// Billing, host encryption and capacity reservation of a machine, or of a scale set model.
pub fn set_billing_profile(
    properties: &mut Value,
    request: &CreateRequest,
    placement: &ResolvedPlacement,
) {
    if let Some(priority) = request.priority {
        properties["priority"] = json!(priority.to_string());
    }
    if let Some(policy) = request.eviction_policy {
        properties["evictionPolicy"] = json!(policy.to_string());
    }
    if let Some(max_price) = request.max_price {
        properties["billingProfile"] = json!({"maxPrice": max_price});
    }
    if let Some(enabled) = request.encryption_at_host {
        properties["securityProfile"] = json!({"encryptionAtHost": enabled});
    }
    if let Some(group) = &placement.capacity_reservation_group {
        properties["capacityReservation"] =
            json!({"capacityReservationGroup": {"id": group.to_string()}});
    }
}

pub fn identity(identity: &ResolvedIdentity) -> Value {
    let mut value = json!({"type": identity.identity_type()});
    if !identity.user_assigned.is_empty() {
        let user_assigned: Map<String, Value> = identity
            .user_assigned
            .iter()
            .map(|id| (id.to_string(), json!({})))
            .collect();
        value["userAssignedIdentities"] = Value::Object(user_assigned);
    }
    value
}

/// Role of the system identity of `principal` on the assignment scope.
///
/// The name is a fresh GUID on every call; the service requires a unique one.
pub fn role_assignment(
    context: &TemplateContext<'_>,
    assignment: &RoleAssignment,
    principal_type: &str,
    principal_name: &str,
    principal_key: &str,
) -> ResourceDefinition {
    let guid = naming::role_assignment_name();
    let (resource_type, name) = match ResourceId::parse(&assignment.scope) {
        Some(scope) => {
            let mut name = scope.name.clone();
            for (_, child_name) in &scope.children {
                name.push('/');
                name.push_str(child_name);
            }
            (
                format!("{}/providers/roleAssignments", scope.full_type()),
                format!("{name}/Microsoft.Authorization/{guid}"),
            )
        }
        None => ("Microsoft.Authorization/roleAssignments".to_string(), guid),
    };

    let principal_id = format!(
        "[reference(resourceId('{principal_type}', '{principal_name}'), '{}', 'Full').identity.principalId]",
        context.api_versions.compute
    );

    ResourceDefinition::new(resource_type, name, &context.api_versions.authorization)
        .depends_on(principal_key)
        .properties(json!({
            "roleDefinitionId": assignment.role_definition_id,
            "principalId": principal_id,
            "scope": assignment.scope,
        }))
}

/// Log Analytics agent of a machine; the workspace id arrives as a secure parameter.
pub fn monitoring_agent(
    document: &mut DeploymentDocument,
    context: &TemplateContext<'_>,
    vm_name: &str,
    vm_key: &str,
    os_type: OsType,
    workspace: &ResourceId,
) -> ResourceDefinition {
    let workspace_expression =
        document.add_secure_parameter("workspaceId", Secret::new(workspace.to_string()));
    let workspace_parameter = workspace_expression
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let agent = match os_type {
        OsType::Linux => "OmsAgentForLinux",
        OsType::Windows => "MicrosoftMonitoringAgent",
    };

    context
        .resource(
            EXTENSION_TYPE,
            &format!("{vm_name}/{agent}"),
            &context.api_versions.extensions,
        )
        .depends_on(vm_key)
        .properties(json!({
            "publisher": "Microsoft.EnterpriseCloud.Monitoring",
            "type": agent,
            "typeHandlerVersion": "1.0",
            "autoUpgradeMinorVersion": true,
            "settings": {
                "workspaceId": format!("[reference({workspace_parameter}, '{MONITORING_API_VERSION}').customerId]"),
                "stopOnMultipleConnections": true,
            },
            "protectedSettings": {
                "workspaceKey": format!("[listKeys({workspace_parameter}, '{MONITORING_API_VERSION}').primarySharedKey]"),
            },
        }))
}

/// Purchase plan from the flags, else from the image metadata.
pub fn plan(options: &PlanOptions, image_plan: Option<&PurchasePlan>) -> Value {
    if !options.is_empty() {
        return json!({
            "name": options.name,
            "publisher": options.publisher,
            "product": options.product,
            "promotionCode": options.promotion_code,
        });
    }
    match image_plan {
        Some(plan) => json!({
            "name": plan.name,
            "publisher": plan.publisher,
            "product": plan.product,
            "promotionCode": plan.promotion_code,
        }),
        None => Value::Null,
    }
}

/// Attach `reference` as a dependency when it points at a resource of this document.
pub fn depend_on(resource: ResourceDefinition, reference: Option<&Reference>) -> ResourceDefinition {
    match reference.and_then(|reference| reference.depends_on.as_deref()) {
        Some(key) => resource.depends_on(key),
        None => resource,
    }
}
