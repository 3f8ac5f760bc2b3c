//! Network, storage account and availability set resolution.
use serde_json::Value;
use tracing::{debug, info};

use super::{ResolverContext, subnet};
use crate::{
    error::DeployError,
    models::{
        CreateRequest, IpAllocation, NicPlan, NsgPlan, NsgRule, OsType, PublicIpPlan,
        PublicIpSku, ResourceId, StorageAccountPlan, SubnetPlan,
    },
    template::naming::hash_string,
};

const GATEWAY_SUBNET: &str = "GatewaySubnet";

/// Instance count and overprovisioning of a scale set, used to size subnets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetDemand {
    pub instance_count: u32,
    pub overprovision: bool,
}

impl SubnetDemand {
    pub fn from_request(request: &CreateRequest) -> Option<Self> {
        request.scale_set.as_ref().map(|options| Self {
            instance_count: options.instance_count(),
            overprovision: !options.disable_overprovision,
        })
    }

    fn fits(&self, prefix: &str) -> bool {
        subnet::prefix_has_capacity(prefix, self.instance_count, self.overprovision)
    }
}

/// `--subnet ID` stands alone; a subnet name needs `--vnet-name`, which is never an id.
pub fn check_subnet_flags(request: &CreateRequest) -> Result<(), DeployError> {
    let vnet_is_id = request.vnet_name.as_deref().is_some_and(|vnet| vnet.contains('/'));
    let subnet_is_id = request.subnet.as_deref().and_then(ResourceId::parse).is_some();
    let valid = match (&request.subnet, &request.vnet_name) {
        _ if vnet_is_id => false,
        (Some(_), Some(_)) => !subnet_is_id,
        (Some(_), None) => subnet_is_id,
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(DeployError::usage("--subnet ID | --subnet NAME --vnet-name NAME"))
    }
}

/// Pick the subnet of the primary NIC: an existing one, a new subnet in an existing vnet, or a new vnet.
pub async fn resolve_subnet(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
    location: &str,
    demand: Option<SubnetDemand>,
) -> Result<SubnetPlan, DeployError> {
    check_subnet_flags(request)?;

    if let Some(subnet_id) = request.subnet.as_deref().and_then(ResourceId::parse) {
        if !context.exists(&subnet_id).await? {
            return Err(DeployError::resolution(
                format!("subnet '{subnet_id}' does not exist"),
                &["subnet id"],
            ));
        }
        return Ok(SubnetPlan::Existing(subnet_id));
    }

    let nothing_requested = request.vnet_name.is_none()
        && request.subnet.is_none()
        && request.vnet_address_prefix.is_none()
        && request.subnet_address_prefix.is_none();
    if nothing_requested {
        if let Some(subnet_id) = find_usable_subnet(context, location, demand).await? {
            info!(subnet = %subnet_id, "using existing subnet");
            return Ok(SubnetPlan::Existing(subnet_id));
        }
    }

    let vnet_name = request
        .vnet_name
        .clone()
        .unwrap_or_else(|| format!("{}VNET", request.name));
    let subnet_name = request
        .subnet
        .clone()
        .unwrap_or_else(|| format!("{}Subnet", request.name));
    let vnet_id = context.scope.resource_id("Microsoft.Network", "virtualNetworks", &vnet_name);
    let subnet_id = vnet_id.clone().child("subnets", &subnet_name);

    if request.vnet_name.is_some() {
        if let Some(vnet) = context.find(&vnet_id).await? {
            if subnets_of(&vnet)
                .any(|subnet| name_of(subnet).eq_ignore_ascii_case(&subnet_name))
            {
                return Ok(SubnetPlan::Existing(subnet_id));
            }
            let subnet_prefix = request.subnet_address_prefix.clone().ok_or_else(|| {
                DeployError::usage(format!(
                    "--subnet-address-prefix is required to add subnet '{subnet_name}' to existing vnet '{vnet_name}'"
                ))
            })?;
            return Ok(SubnetPlan::NewSubnet {
                subnet_id,
                subnet_prefix,
            });
        }
    }

    let vnet_prefix = request
        .vnet_address_prefix
        .clone()
        .unwrap_or_else(|| subnet::DEFAULT_VNET_PREFIX.to_string());
    let subnet_prefix = match (&request.subnet_address_prefix, demand) {
        (Some(prefix), _) => prefix.clone(),
        (None, Some(demand)) => subnet::scale_set_subnet_prefix(
            &vnet_prefix,
            demand.instance_count,
            demand.overprovision,
        )?,
        (None, None) => subnet::DEFAULT_SUBNET_PREFIX.to_string(),
    };
    debug!(
        vnet = %vnet_name,
        vnet_prefix = %vnet_prefix,
        subnet_prefix = %subnet_prefix,
        "creating virtual network"
    );

    Ok(SubnetPlan::NewVnet {
        subnet_id,
        vnet_prefix,
        subnet_prefix,
    })
}

// First non-gateway subnet of a vnet in the same location, big enough for the scale set.
async fn find_usable_subnet(
    context: &ResolverContext<'_>,
    location: &str,
    demand: Option<SubnetDemand>,
) -> Result<Option<ResourceId>, DeployError> {
    let vnets = context
        .list_in_group("Microsoft.Network", "virtualNetworks")
        .await?;

    for vnet in vnets.iter().filter(|vnet| same_location(vnet, location)) {
        let candidate = subnets_of(vnet).find(|subnet| {
            let prefix = subnet
                .pointer("/properties/addressPrefix")
                .and_then(Value::as_str)
                .unwrap_or_default();
            !name_of(subnet).eq_ignore_ascii_case(GATEWAY_SUBNET)
                && demand.is_none_or(|demand| demand.fits(prefix))
        });

        if let Some(subnet) = candidate {
            let id = match subnet.get("id").and_then(Value::as_str).and_then(ResourceId::parse) {
                Some(id) => id,
                None => context
                    .scope
                    .resource_id("Microsoft.Network", "virtualNetworks", name_of(vnet))
                    .child("subnets", name_of(subnet)),
            };
            return Ok(Some(id));
        }
    }

    Ok(None)
}

pub(crate) fn same_location(resource: &Value, location: &str) -> bool {
    let normalize = |value: &str| value.replace(' ', "").to_ascii_lowercase();
    resource
        .get("location")
        .and_then(Value::as_str)
        .is_some_and(|value| normalize(value) == normalize(location))
}

pub(crate) fn subnets_of(vnet: &Value) -> impl Iterator<Item = &Value> {
    vnet.pointer("/properties/subnets")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

pub(crate) fn name_of(resource: &Value) -> &str {
    resource.get("name").and_then(Value::as_str).unwrap_or_default()
}

/// NSG of a single machine: none, an existing group, or a new one opening SSH or RDP.
pub async fn resolve_nsg(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
    os_type: OsType,
) -> Result<NsgPlan, DeployError> {
    let rule = request.nsg_rule.unwrap_or(match os_type {
        OsType::Windows => NsgRule::Rdp,
        OsType::Linux => NsgRule::Ssh,
    });

    match request.nsg.as_deref() {
        Some("") => Ok(NsgPlan::None),
        Some(nsg) => {
            let id = context.resource_id(nsg, "Microsoft.Network", "networkSecurityGroups");
            if context.exists(&id).await? {
                Ok(NsgPlan::Existing(id))
            } else {
                Ok(NsgPlan::New { name: id.name, rule })
            }
        }
        None => Ok(NsgPlan::New {
            name: format!("{}NSG", request.name),
            rule,
        }),
    }
}

/// Public IP of a single machine.
pub async fn resolve_public_ip(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
    default_name: &str,
    default_sku: Option<PublicIpSku>,
) -> Result<PublicIpPlan, DeployError> {
    let name = match request.public_ip_address.as_deref() {
        Some("") => return Ok(PublicIpPlan::None),
        Some(public_ip) => {
            let id = context.resource_id(public_ip, "Microsoft.Network", "publicIPAddresses");
            if context.exists(&id).await? {
                return Ok(PublicIpPlan::Existing(id));
            }
            id.name
        }
        None => default_name.to_string(),
    };

    let sku = match request.public_ip_sku.or(default_sku) {
        Some(PublicIpSku::Basic) if !request.zones.is_empty() => {
            return Err(DeployError::usage(
                "a 'Basic' public IP cannot be used with --zone, use --public-ip-sku Standard",
            ));
        }
        None if !request.zones.is_empty() => {
            info!("zonal deployment, using a 'Standard' public IP");
            Some(PublicIpSku::Standard)
        }
        sku => sku,
    };
    let allocation = request
        .public_ip_address_allocation
        .unwrap_or(match sku {
            Some(PublicIpSku::Standard) => IpAllocation::Static,
            _ => IpAllocation::Dynamic,
        });

    Ok(PublicIpPlan::New {
        name,
        allocation,
        dns_name: request.public_ip_address_dns_name.clone(),
        sku,
    })
}

/// Interfaces of a single machine.
pub async fn resolve_nics(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
    location: &str,
    os_type: OsType,
) -> Result<NicPlan, DeployError> {
    if !request.nics.is_empty() {
        let conflicting = [
            ("--nsg", request.nsg.is_some()),
            ("--public-ip-address", request.public_ip_address.is_some()),
            ("--vnet-name", request.vnet_name.is_some()),
            ("--subnet", request.subnet.is_some()),
            ("--private-ip-address", request.private_ip_address.is_some()),
        ];
        let conflicting: Vec<&str> = conflicting
            .into_iter()
            .filter_map(|(flag, set)| set.then_some(flag))
            .collect();
        if !conflicting.is_empty() {
            return Err(DeployError::usage(format!(
                "--nics cannot be used with {}",
                conflicting.join(", ")
            )));
        }

        let nics = request
            .nics
            .iter()
            .map(|nic| context.resource_id(nic, "Microsoft.Network", "networkInterfaces"))
            .collect();
        return Ok(NicPlan::Existing(nics));
    }

    let subnet = resolve_subnet(context, request, location, None).await?;
    let nsg = resolve_nsg(context, request, os_type).await?;
    let public_ip =
        resolve_public_ip(context, request, &format!("{}PublicIP", request.name), None).await?;

    Ok(NicPlan::New {
        subnet,
        nsg,
        public_ip,
        private_ip_address: request.private_ip_address.clone(),
    })
}

/// Storage account for the VHDs of an unmanaged machine.
///
/// An explicit account is used or created. Otherwise an account of the matching tier in the
/// same location is reused, and only when none exists a new one is named after the machine.
pub async fn resolve_storage_account(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
    location: &str,
    sku: Option<&str>,
) -> Result<StorageAccountPlan, DeployError> {
    let sku = sku.unwrap_or("Premium_LRS");

    if let Some(account) = &request.storage_account {
        let id = context.resource_id(account, "Microsoft.Storage", "storageAccounts");
        if context.exists(&id).await? {
            return Ok(StorageAccountPlan::Existing(id));
        }
        return Ok(StorageAccountPlan::New {
            name: id.name,
            sku: sku.to_string(),
        });
    }

    let tier = if sku.to_ascii_lowercase().contains("premium") {
        "Premium"
    } else {
        "Standard"
    };
    let accounts = context
        .list_in_group("Microsoft.Storage", "storageAccounts")
        .await?;
    let reusable = accounts.iter().find(|account| {
        same_location(account, location)
            && account
                .pointer("/sku/tier")
                .and_then(Value::as_str)
                .is_some_and(|value| value.eq_ignore_ascii_case(tier))
    });
    if let Some(account) = reusable {
        let id = context.resource_id(name_of(account), "Microsoft.Storage", "storageAccounts");
        info!(storage_account = %id.name, "reusing storage account");
        return Ok(StorageAccountPlan::Existing(id));
    }

    let vm_id = context
        .scope
        .resource_id("Microsoft.Compute", "virtualMachines", &request.name);
    Ok(StorageAccountPlan::New {
        name: format!("vhdstorage{}", hash_string(&vm_id.to_string(), 14)),
        sku: sku.to_string(),
    })
}

/// Id of the requested availability set, which must already exist.
pub async fn resolve_availability_set(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
) -> Result<Option<ResourceId>, DeployError> {
    let Some(availability_set) = &request.availability_set else {
        return Ok(None);
    };

    let id = context.resource_id(availability_set, "Microsoft.Compute", "availabilitySets");
    if !context.exists(&id).await? {
        return Err(DeployError::resolution(
            format!("availability set '{availability_set}' does not exist"),
            &["availability set"],
        ));
    }

    Ok(Some(id))
}
