use std::{collections::BTreeMap, str::FromStr};

use clap::Args;

use crate::models::{
    AuthenticationType, Caching, CreateRequest, EphemeralPlacement, EvictionPolicy, IpAllocation,
    NsgRule, OsType, PlanOptions, Priority, PublicIpSku, Secret,
};

/// Options shared by `vm create` and `vmss create`.
#[derive(Args, Debug, Clone, Default)]
pub struct CreateArgs {
    /// Name of the resource group.
    #[arg(long, short = 'g')]
    pub resource_group: String,

    /// Name of the machine or scale set.
    #[arg(long, short = 'n')]
    pub name: String,

    /// Location, defaults to the location of the resource group.
    #[arg(long, short = 'l')]
    pub location: Option<String>,

    /// Space-separated tags: key[=value].
    #[arg(long, num_args = 1.., value_parser = parse_tag)]
    pub tags: Vec<(String, String)>,

    /// Machine size, e.g. Standard_DS1_v2.
    #[arg(long)]
    pub size: Option<String>,

    /// OS image: URN, alias, custom image name or id, gallery image id, or VHD blob URI.
    #[arg(long)]
    pub image: Option<String>,

    /// Do not use managed disks to persist the machine.
    #[arg(long)]
    pub use_unmanaged_disk: bool,

    /// Type of OS installed on a custom VHD.
    #[arg(long, ignore_case = true)]
    pub os_type: Option<OsType>,

    /// The gallery image version is specialized.
    #[arg(long)]
    pub specialized: bool,

    /// Accept the license agreement and privacy statement of a community gallery image.
    #[arg(long)]
    pub accept_term: bool,

    /// Purchase plan name.
    #[arg(long)]
    pub plan_name: Option<String>,

    /// Purchase plan product.
    #[arg(long)]
    pub plan_product: Option<String>,

    /// Purchase plan publisher.
    #[arg(long)]
    pub plan_publisher: Option<String>,

    /// Purchase plan promotion code.
    #[arg(long)]
    pub plan_promotion_code: Option<String>,

    /// Name of the new OS disk.
    #[arg(long)]
    pub os_disk_name: Option<String>,

    /// Caching of the OS disk: None, ReadOnly or ReadWrite.
    #[arg(long, value_parser = Caching::from_str)]
    pub os_disk_caching: Option<Caching>,

    /// Size of the OS disk in GB.
    #[arg(long)]
    pub os_disk_size_gb: Option<u32>,

    /// Caching of data disks, one global value or LUN=value pairs.
    #[arg(long, num_args = 1..)]
    pub data_disk_caching: Vec<String>,

    /// Storage SKU, one global value or os=value and LUN=value pairs.
    #[arg(long, num_args = 1..)]
    pub storage_sku: Vec<String>,

    /// Enable write accelerator, true or false globally or os=bool and LUN=bool pairs.
    #[arg(long, num_args = 1..)]
    pub write_accelerator: Vec<String>,

    /// Storage account holding unmanaged disks.
    #[arg(long)]
    pub storage_account: Option<String>,

    /// Container holding unmanaged disks.
    #[arg(long)]
    pub storage_container_name: Option<String>,

    /// Sizes of new empty data disks in GB.
    #[arg(long, num_args = 1..)]
    pub data_disk_sizes_gb: Vec<u32>,

    /// Snapshots, disks or restore points to copy data disks from.
    #[arg(long, num_args = 1..)]
    pub data_disk_sources: Vec<String>,

    /// Place the OS disk on host-local storage.
    #[arg(long)]
    pub ephemeral_os_disk: bool,

    /// Where the ephemeral OS disk lives.
    #[arg(long, ignore_case = true)]
    pub ephemeral_os_disk_placement: Option<EphemeralPlacement>,

    /// Enable UltraSSD_LRS data disks.
    #[arg(long)]
    pub ultra_ssd_enabled: Option<bool>,

    /// Name or id of the virtual network.
    #[arg(long)]
    pub vnet_name: Option<String>,

    /// Address prefix of a new virtual network.
    #[arg(long)]
    pub vnet_address_prefix: Option<String>,

    /// Name or id of the subnet.
    #[arg(long)]
    pub subnet: Option<String>,

    /// Address prefix of a new subnet.
    #[arg(long)]
    pub subnet_address_prefix: Option<String>,

    /// Name or id of the network security group, "" for none.
    #[arg(long)]
    pub nsg: Option<String>,

    /// Inbound rule of a new network security group.
    #[arg(long, ignore_case = true)]
    pub nsg_rule: Option<NsgRule>,

    /// Name or id of the public IP address, "" for none.
    #[arg(long)]
    pub public_ip_address: Option<String>,

    /// Allocation method of a new public IP address.
    #[arg(long, ignore_case = true)]
    pub public_ip_address_allocation: Option<IpAllocation>,

    /// DNS label of a new public IP address.
    #[arg(long)]
    pub public_ip_address_dns_name: Option<String>,

    /// SKU of a new public IP address.
    #[arg(long, ignore_case = true)]
    pub public_ip_sku: Option<PublicIpSku>,

    /// Enable accelerated networking.
    #[arg(long)]
    pub accelerated_networking: Option<bool>,

    /// Availability zones.
    #[arg(long, short = 'z', num_args = 1..)]
    pub zones: Vec<String>,

    /// Admin account name.
    #[arg(long)]
    pub admin_username: Option<String>,

    /// Admin password, prompted for when required and missing.
    #[arg(long)]
    pub admin_password: Option<String>,

    /// Authentication type, inferred when omitted.
    #[arg(long, ignore_case = true)]
    pub authentication_type: Option<AuthenticationType>,

    /// SSH public keys or key file paths.
    #[arg(long, num_args = 1..)]
    pub ssh_key_values: Vec<String>,

    /// Destination path of the SSH public key on the machine.
    #[arg(long)]
    pub ssh_dest_key_path: Option<String>,

    /// Custom init script file or text.
    #[arg(long)]
    pub custom_data: Option<String>,

    /// License type of images with Windows or RHEL/SLES licensing.
    #[arg(long)]
    pub license_type: Option<String>,

    /// Assign managed identities: [system] and/or user assigned identity names or ids.
    #[arg(long, num_args = 0..)]
    pub assign_identity: Option<Vec<String>>,

    /// Scope the system assigned identity can access.
    #[arg(long)]
    pub scope: Option<String>,

    /// Role name or id granted to the system assigned identity.
    #[arg(long, requires = "scope")]
    pub role: Option<String>,

    /// Name or id of an existing proximity placement group.
    #[arg(long)]
    pub ppg: Option<String>,

    /// Name or id of a dedicated host group.
    #[arg(long)]
    pub host_group: Option<String>,

    /// Name or id of a capacity reservation group.
    #[arg(long)]
    pub capacity_reservation_group: Option<String>,

    /// Billing priority; Spot runs short-lived workloads at a lower price.
    #[arg(long, ignore_case = true)]
    pub priority: Option<Priority>,

    /// Highest price in US dollars for Spot capacity, -1 to never evict for price.
    #[arg(long, allow_negative_numbers = true)]
    pub max_price: Option<f64>,

    /// What happens to evicted Spot or Low priority machines.
    #[arg(long, ignore_case = true)]
    pub eviction_policy: Option<EvictionPolicy>,

    /// Encrypt every disk, temp disk included, at the host.
    #[arg(long)]
    pub encryption_at_host: Option<bool>,

    /// Key Vault certificates as JSON text or JSON files.
    #[arg(long, short = 's', num_args = 1..)]
    pub secrets: Vec<String>,

    /// Validate the deployment without creating anything.
    #[arg(long)]
    pub validate: bool,

    /// Do not wait for the deployment to finish.
    #[arg(long)]
    pub no_wait: bool,
}

impl CreateArgs {
    /// The shared part of a create request; command specific fields keep their defaults.
    pub fn into_request(self) -> CreateRequest {
        CreateRequest {
            name: self.name,
            resource_group: self.resource_group,
            location: self.location,
            tags: self.tags.into_iter().collect::<BTreeMap<_, _>>(),
            size: self.size,
            image: self.image,
            use_unmanaged_disk: self.use_unmanaged_disk,
            os_type: self.os_type,
            specialized: self.specialized,
            accept_term: self.accept_term,
            plan: PlanOptions {
                name: self.plan_name,
                product: self.plan_product,
                publisher: self.plan_publisher,
                promotion_code: self.plan_promotion_code,
            },
            os_disk_name: self.os_disk_name,
            os_caching: self.os_disk_caching,
            os_disk_size_gb: self.os_disk_size_gb,
            data_caching: self.data_disk_caching,
            storage_sku: self.storage_sku,
            write_accelerator: self.write_accelerator,
            storage_account: self.storage_account,
            storage_container_name: self.storage_container_name,
            data_disk_sizes_gb: self.data_disk_sizes_gb,
            data_disk_sources: self.data_disk_sources,
            ephemeral_os_disk: self.ephemeral_os_disk,
            ephemeral_os_disk_placement: self.ephemeral_os_disk_placement,
            ultra_ssd_enabled: self.ultra_ssd_enabled,
            vnet_name: self.vnet_name,
            vnet_address_prefix: self.vnet_address_prefix,
            subnet: self.subnet,
            subnet_address_prefix: self.subnet_address_prefix,
            nsg: self.nsg,
            nsg_rule: self.nsg_rule,
            public_ip_address: self.public_ip_address,
            public_ip_address_allocation: self.public_ip_address_allocation,
            public_ip_address_dns_name: self.public_ip_address_dns_name,
            public_ip_sku: self.public_ip_sku,
            accelerated_networking: self.accelerated_networking,
            zones: self.zones,
            admin_username: self.admin_username,
            admin_password: self.admin_password.map(Secret::from),
            authentication_type: self.authentication_type,
            ssh_key_values: self.ssh_key_values,
            ssh_dest_key_path: self.ssh_dest_key_path,
            custom_data: self.custom_data,
            license_type: self.license_type,
            assign_identity: self.assign_identity,
            identity_scope: self.scope,
            identity_role: self.role,
            proximity_placement_group: self.ppg,
            host_group: self.host_group,
            capacity_reservation_group: self.capacity_reservation_group,
            priority: self.priority,
            max_price: self.max_price,
            eviction_policy: self.eviction_policy,
            encryption_at_host: self.encryption_at_host,
            secrets: self.secrets,
            ..Default::default()
        }
    }
}

/// `key=value`, or a bare `key` for an empty value.
fn parse_tag(tag: &str) -> Result<(String, String), String> {
    let (key, value) = tag.split_once('=').unwrap_or((tag, ""));
    if key.is_empty() {
        return Err(format!("invalid tag '{tag}', expected key[=value]"));
    }
    Ok((key.to_string(), value.to_string()))
}
