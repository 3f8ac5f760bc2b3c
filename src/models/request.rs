use std::{collections::BTreeMap, fmt::Display};

use serde::Serialize;

use super::{Caching, EphemeralPlacement, IpAllocation, LoadBalancerSku, NsgRule, OsType, PublicIpSku, Secret};

pub const DEFAULT_VM_SIZE: &str = "Standard_DS1_v2";
pub const DEFAULT_INSTANCE_COUNT: u32 = 2;
pub const DEFAULT_ADMIN_USERNAME: &str = "azureuser";
pub const DEFAULT_ROLE: &str = "Contributor";
/// Marker in `--assign-identity` for the system assigned identity.
pub const SYSTEM_IDENTITY: &str = "[system]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationType {
    Password,
    Ssh,
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum UpgradePolicyMode {
    #[default]
    Manual,
    Automatic,
    Rolling,
}

impl Display for UpgradePolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "Manual"),
            Self::Automatic => write!(f, "Automatic"),
            Self::Rolling => write!(f, "Rolling"),
        }
    }
}

/// Billing priority of the machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum Priority {
    Regular,
    Low,
    Spot,
}

impl Priority {
    /// Low and Spot capacity may be taken back.
    pub fn is_evictable(self) -> bool {
        matches!(self, Self::Low | Self::Spot)
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regular => write!(f, "Regular"),
            Self::Low => write!(f, "Low"),
            Self::Spot => write!(f, "Spot"),
        }
    }
}

/// What happens to an evicted Spot or Low priority machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum EvictionPolicy {
    Deallocate,
    Delete,
}

impl Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deallocate => write!(f, "Deallocate"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

/// Purchase plan flags, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOptions {
    pub name: Option<String>,
    pub product: Option<String>,
    pub publisher: Option<String>,
    pub promotion_code: Option<String>,
}

impl PlanOptions {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.product.is_none()
            && self.publisher.is_none()
            && self.promotion_code.is_none()
    }
}

/// Options that only exist for scale sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScaleSetOptions {
    pub instance_count: Option<u32>,
    pub disable_overprovision: bool,
    pub upgrade_policy_mode: UpgradePolicyMode,
    /// `Some("")` means no load balancer.
    pub load_balancer: Option<String>,
    pub load_balancer_sku: Option<LoadBalancerSku>,
    pub application_gateway: Option<String>,
    pub app_gateway_sku: Option<String>,
    pub app_gateway_capacity: Option<u32>,
    pub app_gateway_subnet_address_prefix: Option<String>,
    pub backend_pool_name: Option<String>,
    pub nat_pool_name: Option<String>,
    pub backend_port: Option<u16>,
    pub health_probe: Option<String>,
    pub public_ip_per_vm: bool,
    pub vm_domain_name: Option<String>,
    pub single_placement_group: Option<bool>,
    pub computer_name_prefix: Option<String>,
    pub platform_fault_domain_count: Option<u32>,
}

impl ScaleSetOptions {
    pub fn instance_count(&self) -> u32 {
        self.instance_count.unwrap_or(DEFAULT_INSTANCE_COUNT)
    }
}

/// Everything the user asked for in one create invocation.
///
/// Resolvers never mutate the request; each stage returns its own resolved value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateRequest {
    pub name: String,
    pub resource_group: String,
    pub location: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub size: Option<String>,

    // image / os disk source
    pub image: Option<String>,
    pub attach_os_disk: Option<String>,
    pub use_unmanaged_disk: bool,
    pub os_type: Option<OsType>,
    pub specialized: bool,
    pub accept_term: bool,
    pub plan: PlanOptions,

    // disks
    pub os_disk_name: Option<String>,
    pub os_caching: Option<Caching>,
    pub os_disk_size_gb: Option<u32>,
    /// Global value or `LUN=value` pairs.
    pub data_caching: Vec<String>,
    /// Global value or `os=value` / `LUN=value` pairs.
    pub storage_sku: Vec<String>,
    pub write_accelerator: Vec<String>,
    pub storage_account: Option<String>,
    pub storage_container_name: Option<String>,
    pub data_disk_sizes_gb: Vec<u32>,
    /// Snapshot, disk or restore point references to copy data disks from.
    pub data_disk_sources: Vec<String>,
    pub attach_data_disks: Vec<String>,
    pub ephemeral_os_disk: bool,
    pub ephemeral_os_disk_placement: Option<EphemeralPlacement>,
    pub ultra_ssd_enabled: Option<bool>,

    // network
    pub vnet_name: Option<String>,
    pub vnet_address_prefix: Option<String>,
    pub subnet: Option<String>,
    pub subnet_address_prefix: Option<String>,
    /// `Some("")` means no NSG.
    pub nsg: Option<String>,
    pub nsg_rule: Option<NsgRule>,
    /// `Some("")` means no public IP.
    pub public_ip_address: Option<String>,
    pub public_ip_address_allocation: Option<IpAllocation>,
    pub public_ip_address_dns_name: Option<String>,
    pub public_ip_sku: Option<PublicIpSku>,
    pub private_ip_address: Option<String>,
    pub nics: Vec<String>,
    pub availability_set: Option<String>,
    pub zones: Vec<String>,
    pub accelerated_networking: Option<bool>,

    // credentials
    pub admin_username: Option<String>,
    pub admin_password: Option<Secret>,
    pub authentication_type: Option<AuthenticationType>,
    pub ssh_key_values: Vec<String>,
    pub ssh_dest_key_path: Option<String>,
    pub computer_name: Option<String>,
    pub custom_data: Option<String>,
    pub license_type: Option<String>,

    // identity
    /// `Some(vec![])` assigns the system identity only.
    pub assign_identity: Option<Vec<String>>,
    pub identity_scope: Option<String>,
    pub identity_role: Option<String>,

    pub workspace: Option<String>,

    // placement and billing
    pub proximity_placement_group: Option<String>,
    /// Dedicated host id; only machines can pin one.
    pub dedicated_host: Option<String>,
    pub host_group: Option<String>,
    pub capacity_reservation_group: Option<String>,
    pub priority: Option<Priority>,
    /// Highest price in US dollars, `-1` for "never evict for price".
    pub max_price: Option<f64>,
    pub eviction_policy: Option<EvictionPolicy>,
    pub encryption_at_host: Option<bool>,
    /// Storage account name or blob endpoint URI for boot diagnostics.
    pub boot_diagnostics_storage: Option<String>,
    /// Key Vault certificate groups, each JSON text or a path to a JSON file.
    pub secrets: Vec<String>,

    pub scale_set: Option<ScaleSetOptions>,
}

impl CreateRequest {
    pub fn is_scale_set(&self) -> bool {
        self.scale_set.is_some()
    }

    pub fn vm_size(&self) -> &str {
        self.size.as_deref().unwrap_or(DEFAULT_VM_SIZE)
    }

    /// Whether a user supplied a value for `field`.
    pub fn is_set(&self, field: RequestField) -> bool {
        match field {
            RequestField::Image => self.image.is_some(),
            RequestField::OsType => self.os_type.is_some(),
            RequestField::AttachOsDisk => self.attach_os_disk.is_some(),
            RequestField::StorageAccount => self.storage_account.is_some(),
            RequestField::StorageContainerName => self.storage_container_name.is_some(),
            RequestField::UseUnmanagedDisk => self.use_unmanaged_disk,
            RequestField::OsDiskName => self.os_disk_name.is_some(),
            RequestField::OsCaching => self.os_caching.is_some(),
            RequestField::EphemeralOsDisk => self.ephemeral_os_disk,
            RequestField::StorageSku => !self.storage_sku.is_empty(),
            RequestField::DataDiskSizesGb => !self.data_disk_sizes_gb.is_empty(),
            RequestField::AdminUsername => self.admin_username.is_some(),
            RequestField::AdminPassword => self.admin_password.is_some(),
            RequestField::AuthenticationType => self.authentication_type.is_some(),
            RequestField::SshKeyValues => !self.ssh_key_values.is_empty(),
            RequestField::SshDestKeyPath => self.ssh_dest_key_path.is_some(),
        }
    }
}

/// Request fields that storage profiles constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestField {
    Image,
    OsType,
    AttachOsDisk,
    StorageAccount,
    StorageContainerName,
    UseUnmanagedDisk,
    OsDiskName,
    OsCaching,
    EphemeralOsDisk,
    StorageSku,
    DataDiskSizesGb,
    AdminUsername,
    AdminPassword,
    AuthenticationType,
    SshKeyValues,
    SshDestKeyPath,
}

impl RequestField {
    /// Fields that only matter when an OS profile is generated.
    pub const AUTH: [Self; 5] = [
        Self::AdminPassword,
        Self::AdminUsername,
        Self::AuthenticationType,
        Self::SshDestKeyPath,
        Self::SshKeyValues,
    ];

    pub fn flag(self) -> &'static str {
        match self {
            Self::Image => "--image",
            Self::OsType => "--os-type",
            Self::AttachOsDisk => "--attach-os-disk",
            Self::StorageAccount => "--storage-account",
            Self::StorageContainerName => "--storage-container-name",
            Self::UseUnmanagedDisk => "--use-unmanaged-disk",
            Self::OsDiskName => "--os-disk-name",
            Self::OsCaching => "--os-disk-caching",
            Self::EphemeralOsDisk => "--ephemeral-os-disk",
            Self::StorageSku => "--storage-sku",
            Self::DataDiskSizesGb => "--data-disk-sizes-gb",
            Self::AdminUsername => "--admin-username",
            Self::AdminPassword => "--admin-password",
            Self::AuthenticationType => "--authentication-type",
            Self::SshKeyValues => "--ssh-key-values",
            Self::SshDestKeyPath => "--ssh-dest-key-path",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_set_treats_empty_lists_as_unset() {
        let request = CreateRequest {
            data_disk_sizes_gb: vec![],
            storage_sku: vec!["Premium_LRS".to_string()],
            use_unmanaged_disk: false,
            ..Default::default()
        };

        assert!(!request.is_set(RequestField::DataDiskSizesGb));
        assert!(request.is_set(RequestField::StorageSku));
        assert!(!request.is_set(RequestField::UseUnmanagedDisk));
    }

    #[test]
    fn test_only_spot_and_low_are_evictable() {
        assert!(Priority::Spot.is_evictable());
        assert!(Priority::Low.is_evictable());
        assert!(!Priority::Regular.is_evictable());
        assert_eq!(Priority::Spot.to_string(), "Spot");
        assert_eq!(EvictionPolicy::Deallocate.to_string(), "Deallocate");
    }

    #[test]
    fn test_defaults() {
        let request = CreateRequest::default();
        let scale_set = ScaleSetOptions::default();

        assert_eq!(request.vm_size(), "Standard_DS1_v2");
        assert!(!request.is_scale_set());
        assert_eq!(scale_set.instance_count(), 2);
        assert_eq!(scale_set.upgrade_policy_mode, UpgradePolicyMode::Manual);
    }
}
