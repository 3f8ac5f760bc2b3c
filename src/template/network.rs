//! Network resources: virtual networks, subnets, security groups, public IPs, interfaces and
//! scale set front ends.
use serde_json::{Value, json};

use super::{Reference, TemplateContext};
use crate::models::{
    DeploymentDocument, IpAllocation, LoadBalancerSku, NsgPlan, NsgRule, PublicIpPlan,
    PublicIpSku, ResourceDefinition, SubnetPlan,
};

pub const VNET_TYPE: &str = "Microsoft.Network/virtualNetworks";
pub const SUBNET_TYPE: &str = "Microsoft.Network/virtualNetworks/subnets";
pub const NSG_TYPE: &str = "Microsoft.Network/networkSecurityGroups";
pub const PUBLIC_IP_TYPE: &str = "Microsoft.Network/publicIPAddresses";
pub const NIC_TYPE: &str = "Microsoft.Network/networkInterfaces";
pub const LOAD_BALANCER_TYPE: &str = "Microsoft.Network/loadBalancers";
pub const APP_GATEWAY_TYPE: &str = "Microsoft.Network/applicationGateways";

const LB_FRONTEND_NAME: &str = "loadBalancerFrontEnd";
const AG_FRONTEND_NAME: &str = "appGwFrontendIP";

/// A new virtual network with its subnets, `(name, prefix)`.
pub fn virtual_network(
    context: &TemplateContext<'_>,
    name: &str,
    vnet_prefix: &str,
    subnets: &[(&str, &str)],
) -> ResourceDefinition {
    let subnets: Vec<Value> = subnets
        .iter()
        .map(|(subnet, prefix)| json!({"name": subnet, "properties": {"addressPrefix": prefix}}))
        .collect();

    context
        .resource(VNET_TYPE, name, &context.api_versions.network)
        .properties(json!({
            "addressSpace": {"addressPrefixes": [vnet_prefix]},
            "subnets": subnets,
        }))
}

/// A subnet added to a virtual network that already exists.
pub fn subnet(
    context: &TemplateContext<'_>,
    vnet_name: &str,
    subnet_name: &str,
    prefix: &str,
) -> ResourceDefinition {
    ResourceDefinition::new(
        SUBNET_TYPE,
        format!("{vnet_name}/{subnet_name}"),
        &context.api_versions.network,
    )
    .properties(json!({"addressPrefix": prefix}))
}

pub fn network_security_group(
    context: &TemplateContext<'_>,
    name: &str,
    rule: NsgRule,
) -> ResourceDefinition {
    let nsg = context.resource(NSG_TYPE, name, &context.api_versions.network);
    let Some((rule_name, port)) = rule.inbound_rule() else {
        return nsg;
    };

    nsg.properties(json!({
        "securityRules": [{
            "name": rule_name,
            "properties": {
                "protocol": "Tcp",
                "sourcePortRange": "*",
                "destinationPortRange": port.to_string(),
                "sourceAddressPrefix": "*",
                "destinationAddressPrefix": "*",
                "access": "Allow",
                "priority": 1000,
                "direction": "Inbound",
            }
        }]
    }))
}

pub fn public_ip(
    context: &TemplateContext<'_>,
    name: &str,
    allocation: IpAllocation,
    dns_name: Option<&str>,
    sku: Option<PublicIpSku>,
    zones: &[String],
) -> ResourceDefinition {
    let mut properties = json!({"publicIPAllocationMethod": allocation.to_string()});
    if let Some(dns_name) = dns_name {
        properties["dnsSettings"] = json!({"domainNameLabel": dns_name});
    }

    // a public IP lives in at most one zone; cross-zone front ends rely on a Standard balancer
    let zones = match zones {
        [zone] => json!([zone]),
        _ => Value::Null,
    };

    context
        .resource(PUBLIC_IP_TYPE, name, &context.api_versions.network)
        .with("sku", sku.map(|sku| json!({"name": sku.to_string()})).unwrap_or_default())
        .with("zones", zones)
        .properties(properties)
}

pub struct NicOptions<'a> {
    pub vm_name: &'a str,
    pub subnet_id: &'a str,
    pub private_ip_address: Option<&'a str>,
    pub nsg_id: Option<&'a str>,
    pub public_ip_id: Option<&'a str>,
    pub accelerated_networking: Option<bool>,
}

pub fn network_interface(
    context: &TemplateContext<'_>,
    name: &str,
    options: &NicOptions<'_>,
) -> ResourceDefinition {
    let mut ip_configuration = json!({
        "privateIPAllocationMethod": if options.private_ip_address.is_some() { "Static" } else { "Dynamic" },
        "subnet": {"id": options.subnet_id},
    });
    if let Some(address) = options.private_ip_address {
        ip_configuration["privateIPAddress"] = json!(address);
    }
    if let Some(public_ip_id) = options.public_ip_id {
        ip_configuration["publicIPAddress"] = json!({"id": public_ip_id});
    }

    let mut properties = json!({
        "ipConfigurations": [{
            "name": format!("ipconfig{}", options.vm_name),
            "properties": ip_configuration,
        }]
    });
    if let Some(nsg_id) = options.nsg_id {
        properties["networkSecurityGroup"] = json!({"id": nsg_id});
    }
    if let Some(accelerated) = options.accelerated_networking {
        properties["enableAcceleratedNetworking"] = json!(accelerated);
    }

    context
        .resource(NIC_TYPE, name, &context.api_versions.network)
        .properties(properties)
}

fn frontend_ip_configuration(name: &str, public_ip_id: Option<&str>, subnet_id: &str) -> Value {
    match public_ip_id {
        Some(public_ip_id) => json!({
            "name": name,
            "properties": {"publicIPAddress": {"id": public_ip_id}},
        }),
        None => json!({
            "name": name,
            "properties": {
                "privateIPAllocationMethod": "Dynamic",
                "subnet": {"id": subnet_id},
            },
        }),
    }
}

pub struct LoadBalancerOptions<'a> {
    pub sku: Option<LoadBalancerSku>,
    pub backend_pool: &'a str,
    pub nat_pool: &'a str,
    pub backend_port: u16,
    pub public_ip_id: Option<&'a str>,
    pub subnet_id: &'a str,
    pub instance_count: u32,
    pub overprovision: bool,
}

pub fn load_balancer(
    context: &TemplateContext<'_>,
    name: &str,
    options: &LoadBalancerOptions<'_>,
) -> ResourceDefinition {
    let lb_id = format!("resourceId('{LOAD_BALANCER_TYPE}', '{name}')");
    let frontend_id = format!("[concat({lb_id}, '/frontendIPConfigurations/', '{LB_FRONTEND_NAME}')]");

    // every instance needs a NAT port, twice as many while overprovisioning
    let per_instance = if options.overprovision { 2 } else { 1 };
    let port_range_end = (49_999 + options.instance_count * per_instance).max(50_119);

    let mut properties = json!({
        "backendAddressPools": [{"name": options.backend_pool}],
        "inboundNatPools": [{
            "name": options.nat_pool,
            "properties": {
                "frontendIPConfiguration": {"id": frontend_id},
                "protocol": "tcp",
                "frontendPortRangeStart": "50000",
                "frontendPortRangeEnd": port_range_end.to_string(),
                "backendPort": options.backend_port,
            }
        }],
        "frontendIPConfigurations": [
            frontend_ip_configuration(LB_FRONTEND_NAME, options.public_ip_id, options.subnet_id)
        ],
    });

    // a Standard balancer only gives outbound connectivity through a rule
    if options.sku == Some(LoadBalancerSku::Standard) {
        properties["loadBalancingRules"] = json!([{
            "name": "LBRule",
            "properties": {
                "frontendIPConfiguration": {"id": frontend_id},
                "backendAddressPool": {
                    "id": format!("[concat({lb_id}, '/backendAddressPools/', '{}')]", options.backend_pool)
                },
                "protocol": "tcp",
                "frontendPort": 80,
                "backendPort": 80,
                "enableFloatingIP": false,
                "idleTimeoutInMinutes": 5,
            }
        }]);
    }

    context
        .resource(LOAD_BALANCER_TYPE, name, &context.api_versions.network)
        .with(
            "sku",
            options
                .sku
                .map(|sku| json!({"name": sku.to_string()}))
                .unwrap_or_default(),
        )
        .properties(properties)
}

pub struct ApplicationGatewayOptions<'a> {
    pub sku: &'a str,
    pub capacity: u32,
    pub backend_pool: &'a str,
    pub backend_port: u16,
    pub public_ip_id: Option<&'a str>,
    pub subnet_id: &'a str,
    pub gateway_subnet_id: &'a str,
}

/// A new application gateway. Sub-resource ids go through the `appGwID` variable, see
/// [`app_gateway_variable`].
pub fn application_gateway(
    context: &TemplateContext<'_>,
    name: &str,
    options: &ApplicationGatewayOptions<'_>,
) -> ResourceDefinition {
    let sub_resource =
        |kind: &str, child: &str| format!("[concat(variables('appGwID'), '/{kind}/{child}')]");
    let tier = options.sku.split('_').next().unwrap_or(options.sku);

    context
        .resource(APP_GATEWAY_TYPE, name, &context.api_versions.network)
        .properties(json!({
            "backendAddressPools": [{"name": options.backend_pool}],
            "backendHttpSettingsCollection": [{
                "name": "appGwBackendHttpSettings",
                "properties": {
                    "Port": options.backend_port,
                    "Protocol": "Http",
                    "CookieBasedAffinity": "Disabled",
                }
            }],
            "frontendIPConfigurations": [
                frontend_ip_configuration(AG_FRONTEND_NAME, options.public_ip_id, options.subnet_id)
            ],
            "frontendPorts": [{"name": "appGwFrontendPort", "properties": {"Port": 80}}],
            "gatewayIPConfigurations": [{
                "name": "appGwIpConfig",
                "properties": {"subnet": {"id": options.gateway_subnet_id}},
            }],
            "httpListeners": [{
                "name": "appGwHttpListener",
                "properties": {
                    "FrontendIPConfiguration": {"Id": sub_resource("frontendIPConfigurations", AG_FRONTEND_NAME)},
                    "FrontendPort": {"Id": sub_resource("frontendPorts", "appGwFrontendPort")},
                    "Protocol": "Http",
                    "SslCertificate": null,
                }
            }],
            "sku": {"name": options.sku, "tier": tier, "capacity": options.capacity},
            "requestRoutingRules": [{
                "Name": "rule1",
                "properties": {
                    "RuleType": "Basic",
                    "httpListener": {"id": sub_resource("httpListeners", "appGwHttpListener")},
                    "backendAddressPool": {"id": sub_resource("backendAddressPools", options.backend_pool)},
                    "backendHttpSettings": {"id": sub_resource("backendHttpSettingsCollection", "appGwBackendHttpSettings")},
                }
            }],
        }))
}

pub fn app_gateway_variable(name: &str) -> Value {
    json!(format!("[resourceId('{APP_GATEWAY_TYPE}', '{name}')]"))
}

/// Add whatever the subnet plan needs and return the subnet reference.
///
/// `extra_subnets` are created next to the machine subnet when the whole network is new.
pub fn add_subnet(
    document: &mut DeploymentDocument,
    context: &TemplateContext<'_>,
    plan: &SubnetPlan,
    extra_subnets: &[(&str, &str)],
) -> Reference {
    let id = plan.subnet_id().to_string();
    match plan {
        SubnetPlan::Existing(_) => Reference::existing(id),
        SubnetPlan::NewVnet {
            vnet_prefix,
            subnet_prefix,
            ..
        } => {
            let mut subnets = vec![(plan.subnet_name(), subnet_prefix.as_str())];
            subnets.extend_from_slice(extra_subnets);
            let vnet = virtual_network(context, plan.vnet_name(), vnet_prefix, &subnets);
            let key = vnet.key();
            document.add_resource(vnet);
            Reference::new(id, key)
        }
        SubnetPlan::NewSubnet { subnet_prefix, .. } => {
            let subnet = subnet(context, plan.vnet_name(), plan.subnet_name(), subnet_prefix);
            let key = subnet.key();
            document.add_resource(subnet);
            Reference::new(id, key)
        }
    }
}

pub fn add_nsg(
    document: &mut DeploymentDocument,
    context: &TemplateContext<'_>,
    plan: &NsgPlan,
) -> Option<Reference> {
    match plan {
        NsgPlan::None => None,
        NsgPlan::Existing(id) => Some(Reference::existing(id.to_string())),
        NsgPlan::New { name, rule } => {
            let nsg = network_security_group(context, name, *rule);
            let key = nsg.key();
            document.add_resource(nsg);
            Some(Reference::new(context.id("Microsoft.Network", "networkSecurityGroups", name), key))
        }
    }
}

pub fn add_public_ip(
    document: &mut DeploymentDocument,
    context: &TemplateContext<'_>,
    plan: &PublicIpPlan,
    zones: &[String],
) -> Option<Reference> {
    match plan {
        PublicIpPlan::None => None,
        PublicIpPlan::Existing(id) => Some(Reference::existing(id.to_string())),
        PublicIpPlan::New {
            name,
            allocation,
            dns_name,
            sku,
        } => {
            let public_ip = public_ip(context, name, *allocation, dns_name.as_deref(), *sku, zones);
            let key = public_ip.key();
            document.add_resource(public_ip);
            Some(Reference::new(context.id("Microsoft.Network", "publicIPAddresses", name), key))
        }
    }
}
