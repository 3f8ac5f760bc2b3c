use serde_json::{Value, json};
use tracing::debug;

use super::{
    Reference, TemplateContext, VMSS_OUTPUT,
    compute::{self, OsDiskTarget, VMSS_TYPE},
    naming,
    network::{self, ApplicationGatewayOptions, LoadBalancerOptions},
};
use crate::{
    error::DeployError,
    models::{BalancerPlan, CreateRequest, DeploymentDocument, StorageProfile},
    resolvers::{ResolvedNetwork, ResolvedRequest},
};

const INSTANCE_PUBLIC_IP: &str = "instancepublicip";
const DEFAULT_POOL_SKU: &str = "Standard_LRS";

pub(super) fn assemble(
    context: &TemplateContext<'_>,
    request: &CreateRequest,
    resolved: &ResolvedRequest,
) -> Result<DeploymentDocument, DeployError> {
    let ResolvedNetwork::ScaleSet(plan) = &resolved.network else {
        return Err(DeployError::InvalidTemplate(
            "a scale set needs a scale set network plan".to_string(),
        ));
    };
    let options = request.scale_set.as_ref().ok_or_else(|| {
        DeployError::InvalidTemplate("scale set options are missing".to_string())
    })?;

    let mut document = DeploymentDocument::new();
    let name = request.name.as_str();
    let vmss_id = context.id("Microsoft.Compute", "virtualMachineScaleSets", name);
    let naming_prefix = naming::scale_set_naming_prefix(name, &vmss_id);
    let mut dependencies: Vec<String> = Vec::new();

    // the gateway subnet joins a new vnet, or is added next to the scale set subnet
    let gateway_subnet = match &plan.balancer {
        BalancerPlan::NewApplicationGateway {
            gateway_subnet_id,
            gateway_subnet_prefix,
            ..
        } => Some((gateway_subnet_id, gateway_subnet_prefix.as_str())),
        _ => None,
    };
    let extra_subnets: Vec<(&str, &str)> = match gateway_subnet {
        Some((id, prefix)) if plan.subnet.is_new_vnet() => vec![(id.leaf_name(), prefix)],
        _ => Vec::new(),
    };
    let subnet = network::add_subnet(&mut document, context, &plan.subnet, &extra_subnets);
    dependencies.extend(subnet.depends_on.clone());

    let nsg = network::add_nsg(&mut document, context, &plan.nsg);
    if let Some(key) = nsg.as_ref().and_then(|nsg| nsg.depends_on.clone()) {
        dependencies.push(key);
    }

    let mut ip_configuration = json!({"subnet": {"id": subnet.id}});
    match &plan.balancer {
        BalancerPlan::None => {}
        BalancerPlan::NewLoadBalancer {
            name: lb_name,
            sku,
            backend_pool,
            nat_pool,
            backend_port,
            public_ip,
        } => {
            let public_ip = network::add_public_ip(&mut document, context, public_ip, &request.zones);
            let lb = network::load_balancer(
                context,
                lb_name,
                &LoadBalancerOptions {
                    sku: *sku,
                    backend_pool,
                    nat_pool,
                    backend_port: *backend_port,
                    public_ip_id: public_ip.as_ref().map(|ip| ip.id.as_str()),
                    subnet_id: &subnet.id,
                    instance_count: options.instance_count(),
                    overprovision: !options.disable_overprovision,
                },
            );
            // an internal front end sits in the scale set subnet
            let front_end = public_ip.as_ref().unwrap_or(&subnet);
            let lb = compute::depend_on(lb, Some(front_end));
            dependencies.push(lb.key());
            document.add_resource(lb);

            let lb_id = context.id("Microsoft.Network", "loadBalancers", lb_name);
            ip_configuration["loadBalancerBackendAddressPools"] =
                json!([{"id": format!("{lb_id}/backendAddressPools/{backend_pool}")}]);
            ip_configuration["loadBalancerInboundNatPools"] =
                json!([{"id": format!("{lb_id}/inboundNatPools/{nat_pool}")}]);
        }
        BalancerPlan::ExistingLoadBalancer {
            id,
            backend_pool,
            nat_pool,
        } => {
            ip_configuration["loadBalancerBackendAddressPools"] =
                json!([{"id": format!("{id}/backendAddressPools/{backend_pool}")}]);
            if let Some(nat_pool) = nat_pool {
                ip_configuration["loadBalancerInboundNatPools"] =
                    json!([{"id": format!("{id}/inboundNatPools/{nat_pool}")}]);
            }
        }
        BalancerPlan::NewApplicationGateway {
            name: ag_name,
            sku,
            capacity,
            backend_pool,
            backend_port,
            gateway_subnet_id,
            gateway_subnet_prefix,
            public_ip,
        } => {
            let gateway_subnet = if plan.subnet.is_new_vnet() {
                Reference {
                    id: gateway_subnet_id.to_string(),
                    depends_on: subnet.depends_on.clone(),
                }
            } else {
                let child = network::subnet(
                    context,
                    plan.subnet.vnet_name(),
                    gateway_subnet_id.leaf_name(),
                    gateway_subnet_prefix,
                );
                let key = child.key();
                document.add_resource(child);
                Reference::new(gateway_subnet_id.to_string(), key)
            };
            let public_ip = network::add_public_ip(&mut document, context, public_ip, &[]);

            document.add_variable("appGwID", network::app_gateway_variable(ag_name));
            let gateway = network::application_gateway(
                context,
                ag_name,
                &ApplicationGatewayOptions {
                    sku,
                    capacity: *capacity,
                    backend_pool,
                    backend_port: *backend_port,
                    public_ip_id: public_ip.as_ref().map(|ip| ip.id.as_str()),
                    subnet_id: &subnet.id,
                    gateway_subnet_id: &gateway_subnet.id,
                },
            );
            let gateway = [Some(&gateway_subnet), Some(&subnet), public_ip.as_ref()]
                .into_iter()
                .fold(gateway, |gateway, reference| compute::depend_on(gateway, reference));
            dependencies.push(gateway.key());
            document.add_resource(gateway);

            let ag_id = context.id("Microsoft.Network", "applicationGateways", ag_name);
            ip_configuration["ApplicationGatewayBackendAddressPools"] =
                json!([{"id": format!("{ag_id}/backendAddressPools/{backend_pool}")}]);
        }
        BalancerPlan::ExistingApplicationGateway { id, backend_pool } => {
            ip_configuration["ApplicationGatewayBackendAddressPools"] =
                json!([{"id": format!("{id}/backendAddressPools/{backend_pool}")}]);
        }
    }

    if options.public_ip_per_vm {
        let mut public_ip_configuration = json!({
            "name": INSTANCE_PUBLIC_IP,
            "properties": {"idleTimeoutInMinutes": 10},
        });
        if let Some(domain_name) = &options.vm_domain_name {
            public_ip_configuration["properties"]["dnsSettings"] =
                json!({"domainNameLabel": domain_name});
        }
        ip_configuration["publicipaddressconfiguration"] = public_ip_configuration;
    }

    let mut nic_configuration = json!({
        "primary": true,
        "ipConfigurations": [{
            "name": format!("{naming_prefix}IPConfig"),
            "properties": ip_configuration,
        }],
    });
    if let Some(accelerated) = request.accelerated_networking {
        nic_configuration["enableAcceleratedNetworking"] = json!(accelerated);
    }
    if let Some(nsg) = &nsg {
        nic_configuration["networkSecurityGroup"] = json!({"id": nsg.id});
    }
    let mut network_profile = json!({
        "networkInterfaceConfigurations": [{
            "name": format!("{naming_prefix}Nic"),
            "properties": nic_configuration,
        }]
    });
    if let Some(probe) = &plan.health_probe {
        network_profile["healthProbe"] = json!({"id": probe.to_string()});
    }

    let profile = resolved.image.profile;
    let unmanaged_disk_name = || {
        request
            .os_disk_name
            .clone()
            .unwrap_or_else(|| naming::os_disk_vhd_name(&vmss_id))
    };
    let (target, os_disk_name) = match profile {
        StorageProfile::SaPirImage => {
            let sku = resolved
                .disks
                .os
                .storage_sku
                .as_deref()
                .unwrap_or(DEFAULT_POOL_SKU);
            dependencies.push(compute::add_storage_pool(
                &mut document,
                context,
                &naming_prefix,
                sku,
            ));
            (
                OsDiskTarget::Containers(json!("[variables('vhdContainers')]")),
                Some(unmanaged_disk_name()),
            )
        }
        StorageProfile::SaCustomImage => (OsDiskTarget::Source, Some(unmanaged_disk_name())),
        _ => (OsDiskTarget::Managed, request.os_disk_name.clone()),
    };

    let mut vm_profile = json!({
        "storageProfile": compute::storage_profile(
            &resolved.image,
            &resolved.disks,
            os_disk_name.as_deref(),
            &target,
        ),
        "networkProfile": network_profile,
    });
    if let Some(credentials) = &resolved.credentials {
        let prefix = options
            .computer_name_prefix
            .clone()
            .unwrap_or_else(|| naming_prefix.clone());
        vm_profile["osProfile"] = compute::os_profile(
            &mut document,
            credentials,
            resolved.image.os_type,
            "computerNamePrefix",
            &prefix,
            resolved.custom_data.as_deref(),
            &resolved.secrets,
        );
    }
    if let Some(license_type) = &request.license_type {
        vm_profile["licenseType"] = json!(license_type);
    }
    compute::set_billing_profile(&mut vm_profile, request, &resolved.placement);

    let mut properties = json!({
        "overprovision": !options.disable_overprovision,
        "upgradePolicy": {"mode": options.upgrade_policy_mode.to_string()},
        "virtualMachineProfile": vm_profile,
    });
    if let Some(single_placement_group) = plan.single_placement_group {
        properties["singlePlacementGroup"] = json!(single_placement_group);
    }
    if let Some(count) = options.platform_fault_domain_count {
        properties["platformFaultDomainCount"] = json!(count);
    }
    if let Some(enabled) = resolved.ultra_ssd_enabled {
        properties["additionalCapabilities"] = json!({"ultraSSDEnabled": enabled});
    }
    if let Some(ppg) = &resolved.placement.proximity_placement_group {
        properties["proximityPlacementGroup"] = json!({"id": ppg.to_string()});
    }
    if let Some(host_group) = &resolved.placement.host_group {
        properties["hostGroup"] = json!({"id": host_group.to_string()});
    }

    let zones = if request.zones.is_empty() {
        Value::Null
    } else {
        json!(request.zones)
    };
    let vmss = dependencies.into_iter().fold(
        context
            .resource(VMSS_TYPE, name, &context.api_versions.compute)
            .with(
                "sku",
                json!({"name": request.vm_size(), "capacity": options.instance_count()}),
            )
            .with("zones", zones)
            .with("plan", compute::plan(&request.plan, resolved.image.plan.as_ref()))
            .with(
                "identity",
                resolved
                    .identity
                    .as_ref()
                    .map(compute::identity)
                    .unwrap_or_default(),
            )
            .properties(properties),
        |vmss, key| vmss.depends_on(key),
    );
    let vmss_key = vmss.key();
    document.add_resource(vmss);

    if let Some(assignment) = resolved
        .identity
        .as_ref()
        .and_then(|identity| identity.role_assignment.as_ref())
    {
        document.add_resource(compute::role_assignment(
            context, assignment, VMSS_TYPE, name, &vmss_key,
        ));
    }

    document.add_output(
        VMSS_OUTPUT,
        json!({
            "type": "object",
            "value": format!(
                "[reference(resourceId('{VMSS_TYPE}', '{name}'), '{}')]",
                context.api_versions.compute
            ),
        }),
    );

    debug!(
        vmss = %name,
        prefix = %naming_prefix,
        resources = document.resources().len(),
        "scale set document assembled"
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        config::ApiVersions,
        models::{
            AuthenticationType, Caching, DiskLayout, ImageUrn, IpAllocation, LoadBalancerSku,
            NsgPlan, NsgRule, OsDisk, OsType, PublicIpPlan, ResourceScope, ScaleSetNetworkPlan,
            ScaleSetOptions, SubnetPlan,
        },
        resolvers::{
            credentials::Credentials,
            image::{OsDiskSource, ResolvedImage},
            placement::ResolvedPlacement,
        },
        template::build_vmss_document,
    };

    fn scope() -> ResourceScope {
        ResourceScope::new("sub", "rg")
    }

    fn request() -> CreateRequest {
        CreateRequest {
            name: "ss1".to_string(),
            resource_group: "rg".to_string(),
            image: Some("UbuntuLTS".to_string()),
            scale_set: Some(ScaleSetOptions {
                instance_count: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn new_vnet() -> SubnetPlan {
        SubnetPlan::NewVnet {
            subnet_id: scope()
                .resource_id("Microsoft.Network", "virtualNetworks", "ss1VNET")
                .child("subnets", "ss1Subnet"),
            vnet_prefix: "10.0.0.0/16".to_string(),
            subnet_prefix: "10.0.0.0/24".to_string(),
        }
    }

    fn new_public_ip(name: &str) -> PublicIpPlan {
        PublicIpPlan::New {
            name: name.to_string(),
            allocation: IpAllocation::Dynamic,
            dns_name: None,
            sku: None,
        }
    }

    fn new_load_balancer(sku: Option<LoadBalancerSku>) -> BalancerPlan {
        BalancerPlan::NewLoadBalancer {
            name: "ss1LB".to_string(),
            sku,
            backend_pool: "ss1LBBEPool".to_string(),
            nat_pool: "ss1LBNatPool".to_string(),
            backend_port: 22,
            public_ip: new_public_ip("ss1LBPublicIP"),
        }
    }

    fn resolved(profile: StorageProfile, balancer: BalancerPlan) -> ResolvedRequest {
        ResolvedRequest {
            location: "westus".to_string(),
            image: ResolvedImage {
                profile,
                source: OsDiskSource::Marketplace(ImageUrn::new(
                    "Canonical",
                    "UbuntuServer",
                    "18.04-LTS",
                    "latest",
                )),
                os_type: OsType::Linux,
                image_data_luns: vec![],
                plan: None,
            },
            disks: DiskLayout {
                os: OsDisk {
                    caching: Caching::ReadWrite,
                    storage_sku: None,
                    size_gb: None,
                    write_accelerator: None,
                    ephemeral: false,
                    ephemeral_placement: None,
                },
                data: BTreeMap::new(),
            },
            storage_account: None,
            availability_set: None,
            network: ResolvedNetwork::ScaleSet(ScaleSetNetworkPlan {
                subnet: new_vnet(),
                balancer,
                nsg: NsgPlan::None,
                health_probe: None,
                single_placement_group: None,
            }),
            credentials: Some(Credentials {
                admin_username: "azureuser".to_string(),
                authentication_type: AuthenticationType::Ssh,
                admin_password: None,
                ssh_keys: vec!["ssh-rsa AAAA".to_string()],
                ssh_dest_key_path: None,
            }),
            identity: None,
            workspace: None,
            ultra_ssd_enabled: None,
            custom_data: None,
            placement: ResolvedPlacement::default(),
            secrets: vec![],
        }
    }

    fn build(request: &CreateRequest, resolved: &ResolvedRequest) -> DeploymentDocument {
        build_vmss_document(request, resolved, &scope(), &ApiVersions::default()).unwrap()
    }

    fn scale_set(document: &DeploymentDocument) -> &crate::models::ResourceDefinition {
        document.find(VMSS_TYPE).next().unwrap()
    }

    fn ip_configuration(document: &DeploymentDocument) -> &Value {
        &scale_set(document).body["properties"]["virtualMachineProfile"]["networkProfile"]
            ["networkInterfaceConfigurations"][0]["properties"]["ipConfigurations"][0]
            ["properties"]
    }

    #[test]
    fn test_new_load_balancer_front_end() {
        let document = build(&request(), &resolved(StorageProfile::ManagedPirImage, new_load_balancer(None)));

        let names: Vec<&str> = document
            .ordered_resources()
            .unwrap()
            .into_iter()
            .map(|resource| resource.name.as_str())
            .collect();
        assert_eq!(names, vec!["ss1VNET", "ss1LBPublicIP", "ss1LB", "ss1"]);

        let vmss = scale_set(&document);
        assert_eq!(vmss.body["sku"], json!({"name": "Standard_DS1_v2", "capacity": 3}));
        assert_eq!(vmss.body["properties"]["overprovision"], true);
        assert_eq!(vmss.body["properties"]["upgradePolicy"]["mode"], "Manual");
        assert_eq!(
            ip_configuration(&document)["loadBalancerBackendAddressPools"][0]["id"],
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/loadBalancers/ss1LB/backendAddressPools/ss1LBBEPool"
        );
        assert_eq!(
            ip_configuration(&document)["loadBalancerInboundNatPools"][0]["id"],
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/loadBalancers/ss1LB/inboundNatPools/ss1LBNatPool"
        );
    }

    #[test]
    fn test_no_balancer_adds_no_front_end() {
        let document = build(&request(), &resolved(StorageProfile::ManagedPirImage, BalancerPlan::None));

        assert_eq!(document.resources().len(), 2);
        assert!(ip_configuration(&document).get("loadBalancerBackendAddressPools").is_none());
    }

    #[test]
    fn test_existing_load_balancer_without_nat_pool() {
        let id = scope().resource_id("Microsoft.Network", "loadBalancers", "shared");
        let document = build(
            &request(),
            &resolved(
                StorageProfile::ManagedPirImage,
                BalancerPlan::ExistingLoadBalancer {
                    id,
                    backend_pool: "pool".to_string(),
                    nat_pool: None,
                },
            ),
        );

        assert!(document.find("Microsoft.Network/loadBalancers").next().is_none());
        assert!(ip_configuration(&document).get("loadBalancerInboundNatPools").is_none());
        assert!(
            ip_configuration(&document)["loadBalancerBackendAddressPools"][0]["id"]
                .as_str()
                .unwrap()
                .ends_with("/loadBalancers/shared/backendAddressPools/pool")
        );
    }

    #[test]
    fn test_new_application_gateway_in_new_vnet() {
        let gateway = BalancerPlan::NewApplicationGateway {
            name: "ss1AG".to_string(),
            sku: "Standard_Large".to_string(),
            capacity: 10,
            backend_pool: "ss1AGBEPool".to_string(),
            backend_port: 80,
            gateway_subnet_id: scope()
                .resource_id("Microsoft.Network", "virtualNetworks", "ss1VNET")
                .child("subnets", "appGwSubnet"),
            gateway_subnet_prefix: "10.0.1.0/24".to_string(),
            public_ip: new_public_ip("ss1AGPublicIP"),
        };

        let document = build(&request(), &resolved(StorageProfile::ManagedPirImage, gateway));

        let template = document.template().unwrap();
        assert_eq!(
            template["variables"]["appGwID"],
            "[resourceId('Microsoft.Network/applicationGateways', 'ss1AG')]"
        );
        let vnet = document.find("Microsoft.Network/virtualNetworks").next().unwrap();
        assert_eq!(vnet.body["properties"]["subnets"][1]["name"], "appGwSubnet");
        let ag = document.find("Microsoft.Network/applicationGateways").next().unwrap();
        assert_eq!(
            ag.depends_on,
            vec![
                "Microsoft.Network/virtualNetworks/ss1VNET",
                "Microsoft.Network/publicIPAddresses/ss1AGPublicIP",
            ]
        );
        assert!(
            ip_configuration(&document)["ApplicationGatewayBackendAddressPools"][0]["id"]
                .as_str()
                .unwrap()
                .ends_with("/applicationGateways/ss1AG/backendAddressPools/ss1AGBEPool")
        );
    }

    #[test]
    fn test_unmanaged_scale_set_gets_storage_pool() {
        let document = build(&request(), &resolved(StorageProfile::SaPirImage, BalancerPlan::None));

        let vmss = scale_set(&document);
        assert!(vmss.depends_on.contains(&"storageLoop".to_string()));
        let os_disk = &vmss.body["properties"]["virtualMachineProfile"]["storageProfile"]["osDisk"];
        assert_eq!(os_disk["vhdContainers"], "[variables('vhdContainers')]");
        assert!(os_disk["name"].as_str().unwrap().starts_with("osdisk_"));

        let pool = document.find("Microsoft.Storage/storageAccounts").next().unwrap();
        assert_eq!(pool.body["properties"]["accountType"], "Standard_LRS");
        let template = document.template().unwrap();
        let names = template["variables"]["storageAccountNames"].as_array().unwrap();
        assert_eq!(names.len(), 5);
        assert!(names[0].as_str().unwrap().starts_with("ss1"));
    }

    #[test]
    fn test_instance_public_ip_and_nsg() {
        let request = CreateRequest {
            scale_set: Some(ScaleSetOptions {
                public_ip_per_vm: true,
                vm_domain_name: Some("web".to_string()),
                ..Default::default()
            }),
            ..request()
        };
        let mut resolved = resolved(StorageProfile::ManagedPirImage, new_load_balancer(Some(LoadBalancerSku::Standard)));
        if let ResolvedNetwork::ScaleSet(plan) = &mut resolved.network {
            plan.nsg = NsgPlan::New {
                name: "ss1NSG".to_string(),
                rule: NsgRule::Ssh,
            };
            plan.single_placement_group = Some(false);
        }

        let document = build(&request, &resolved);

        let vmss = scale_set(&document);
        assert!(vmss.depends_on.contains(&"Microsoft.Network/networkSecurityGroups/ss1NSG".to_string()));
        assert_eq!(vmss.body["properties"]["singlePlacementGroup"], false);
        assert_eq!(
            ip_configuration(&document)["publicipaddressconfiguration"],
            json!({
                "name": "instancepublicip",
                "properties": {"idleTimeoutInMinutes": 10, "dnsSettings": {"domainNameLabel": "web"}},
            })
        );
        let nic = &vmss.body["properties"]["virtualMachineProfile"]["networkProfile"]
            ["networkInterfaceConfigurations"][0]["properties"];
        assert!(nic["networkSecurityGroup"]["id"].as_str().unwrap().ends_with("/ss1NSG"));
    }

    #[test]
    fn test_computer_name_prefix_and_output() {
        let document = build(&request(), &resolved(StorageProfile::ManagedPirImage, BalancerPlan::None));

        let vmss = scale_set(&document);
        let prefix = vmss.body["properties"]["virtualMachineProfile"]["osProfile"]["computerNamePrefix"]
            .as_str()
            .unwrap();
        assert_eq!(prefix.len(), 9);
        assert!(prefix.starts_with("ss1"));

        let template = document.template().unwrap();
        assert_eq!(
            template["outputs"]["vmss"]["value"],
            "[reference(resourceId('Microsoft.Compute/virtualMachineScaleSets', 'ss1'), '2023-03-01')]"
        );
    }

    #[test]
    fn test_spot_scale_set_in_host_group() {
        let request = CreateRequest {
            priority: Some(crate::models::Priority::Low),
            eviction_policy: Some(crate::models::EvictionPolicy::Deallocate),
            encryption_at_host: Some(true),
            ..request()
        };
        let mut resolved = resolved(StorageProfile::ManagedPirImage, BalancerPlan::None);
        resolved.placement = ResolvedPlacement {
            proximity_placement_group: Some(scope().resource_id(
                "Microsoft.Compute",
                "proximityPlacementGroups",
                "ppg1",
            )),
            host_group: Some(scope().resource_id("Microsoft.Compute", "hostGroups", "hg1")),
            ..Default::default()
        };

        let document = build(&request, &resolved);

        let properties = &scale_set(&document).body["properties"];
        assert_eq!(
            properties["proximityPlacementGroup"]["id"],
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/proximityPlacementGroups/ppg1"
        );
        assert_eq!(
            properties["hostGroup"]["id"],
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/hostGroups/hg1"
        );
        let vm_profile = &properties["virtualMachineProfile"];
        assert_eq!(vm_profile["priority"], "Low");
        assert_eq!(vm_profile["evictionPolicy"], "Deallocate");
        assert_eq!(vm_profile["securityProfile"], json!({"encryptionAtHost": true}));
        assert!(vm_profile.get("billingProfile").is_none());
    }
}
