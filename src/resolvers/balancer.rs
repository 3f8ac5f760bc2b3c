//! Scale set front end: load balancer or application gateway, NSG and placement groups.
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    ResolverContext,
    network::{self, SubnetDemand, name_of, subnets_of},
    subnet,
};
use crate::{
    error::DeployError,
    models::{
        BalancerPlan, CreateRequest, LoadBalancerSku, NsgPlan, NsgRule, OsType, PublicIpSku,
        ResourceId, ScaleSetNetworkPlan, ScaleSetOptions, SubnetPlan,
    },
};

/// Scale sets above this size span several placement groups.
pub const SINGLE_PLACEMENT_GROUP_LIMIT: u32 = 100;

const DEFAULT_APP_GATEWAY_SKU: &str = "Standard_Large";
const DEFAULT_APP_GATEWAY_CAPACITY: u32 = 10;
const DEFAULT_APP_GATEWAY_PORT: u16 = 80;
const APP_GATEWAY_SUBNET: &str = "appGwSubnet";

/// Resolve the network shape of a scale set.
pub async fn resolve_scale_set_network(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
    location: &str,
    os_type: OsType,
) -> Result<ScaleSetNetworkPlan, DeployError> {
    let options = request
        .scale_set
        .as_ref()
        .ok_or_else(|| DeployError::usage("scale set options are required"))?;
    check_balancer_flags(request, options)?;

    let single_placement_group = single_placement_group(request, options);
    let subnet = network::resolve_subnet(
        context,
        request,
        location,
        SubnetDemand::from_request(request),
    )
    .await?;

    let balancer = match (
        options.load_balancer.as_deref(),
        options.application_gateway.as_deref(),
    ) {
        (_, Some(ag)) if !ag.is_empty() => {
            resolve_application_gateway(context, request, options, ag, &subnet).await?
        }
        (Some(""), _) => BalancerPlan::None,
        (lb, _) => {
            resolve_load_balancer(context, request, options, lb, os_type, single_placement_group)
                .await?
        }
    };

    let creates_front_end = matches!(
        balancer,
        BalancerPlan::NewLoadBalancer { .. } | BalancerPlan::NewApplicationGateway { .. }
    );
    if !creates_front_end
        && (request.public_ip_address.as_deref().is_some_and(|ip| !ip.is_empty())
            || request.public_ip_address_dns_name.is_some())
    {
        return Err(DeployError::usage(
            "--public-ip-address can only be used when creating a new load balancer or application gateway frontend",
        ));
    }

    let nsg = match request.nsg.as_deref() {
        Some(nsg) if !nsg.is_empty() => NsgPlan::Existing(context.resource_id(
            nsg,
            "Microsoft.Network",
            "networkSecurityGroups",
        )),
        None if balancer.is_new_standard_load_balancer() => NsgPlan::New {
            name: format!("{}NSG", request.name),
            rule: match os_type {
                OsType::Windows => NsgRule::Rdp,
                OsType::Linux => NsgRule::Ssh,
            },
        },
        _ => NsgPlan::None,
    };

    let health_probe = match (&balancer, &options.health_probe) {
        (_, None) => None,
        (BalancerPlan::NewLoadBalancer { name, .. }, Some(probe)) => Some(
            ResourceId::parse(probe).unwrap_or_else(|| {
                context
                    .scope
                    .resource_id("Microsoft.Network", "loadBalancers", name)
                    .child("probes", probe)
            }),
        ),
        (BalancerPlan::ExistingLoadBalancer { id, .. }, Some(probe)) => Some(
            ResourceId::parse(probe).unwrap_or_else(|| id.clone().child("probes", probe)),
        ),
        (_, Some(_)) => {
            return Err(DeployError::usage(
                "--health-probe requires a load balancer",
            ));
        }
    };

    debug!(?balancer, ?single_placement_group, "scale set network resolved");
    Ok(ScaleSetNetworkPlan {
        subnet,
        balancer,
        nsg,
        health_probe,
        single_placement_group,
    })
}

/// Front end flag conflicts, decidable from the request alone.
pub fn check_balancer_flags(
    request: &CreateRequest,
    options: &ScaleSetOptions,
) -> Result<(), DeployError> {
    let gateway = options
        .application_gateway
        .as_deref()
        .is_some_and(|ag| !ag.is_empty());
    if gateway && options.load_balancer.as_deref().is_some_and(|lb| !lb.is_empty()) {
        return Err(DeployError::usage(
            "--load-balancer NAME_OR_ID | --application-gateway NAME_OR_ID",
        ));
    }

    let conflicting: Vec<&str> = if gateway {
        [
            ("--nat-pool-name", options.nat_pool_name.is_some()),
            ("--health-probe", options.health_probe.is_some()),
            ("--lb-sku", options.load_balancer_sku.is_some()),
        ]
        .into_iter()
        .filter_map(|(flag, set)| set.then_some(flag))
        .collect()
    } else {
        [
            ("--app-gateway-sku", options.app_gateway_sku.is_some()),
            ("--app-gateway-capacity", options.app_gateway_capacity.is_some()),
            (
                "--app-gateway-subnet-address-prefix",
                options.app_gateway_subnet_address_prefix.is_some(),
            ),
        ]
        .into_iter()
        .filter_map(|(flag, set)| set.then_some(flag))
        .collect()
    };

    if !conflicting.is_empty() {
        let front_end = if gateway {
            "an application gateway"
        } else {
            "a load balancer"
        };
        return Err(DeployError::usage(format!(
            "{} cannot be used with {front_end}",
            conflicting.join(", ")
        )));
    }

    // an explicit Basic sku only matters for a load balancer that may be created
    let may_create_load_balancer = !gateway && options.load_balancer.as_deref() != Some("");
    if may_create_load_balancer
        && options.load_balancer_sku == Some(LoadBalancerSku::Basic)
        && single_placement_group(request, options) == Some(false)
    {
        let reason = if !request.zones.is_empty() {
            "for zonal scale-sets"
        } else if options.instance_count() > SINGLE_PLACEMENT_GROUP_LIMIT {
            "for scale-sets with 100+ instances"
        } else {
            "because 'single placement group' is turned off"
        };
        return Err(DeployError::usage(format!(
            "'Standard' load balancer is required {reason}"
        )));
    }
    Ok(())
}

/// Explicit value, else `false` for zonal or large scale sets.
fn single_placement_group(request: &CreateRequest, options: &ScaleSetOptions) -> Option<bool> {
    options.single_placement_group.or_else(|| {
        (!request.zones.is_empty() || options.instance_count() > SINGLE_PLACEMENT_GROUP_LIMIT)
            .then_some(false)
    })
}

async fn resolve_load_balancer(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
    options: &ScaleSetOptions,
    load_balancer: Option<&str>,
    os_type: OsType,
    single_placement_group: Option<bool>,
) -> Result<BalancerPlan, DeployError> {
    let name = match load_balancer {
        Some(lb) => {
            let id = context.resource_id(lb, "Microsoft.Network", "loadBalancers");
            if let Some(existing) = context.find(&id).await? {
                return existing_load_balancer(id, &existing, options);
            }
            id.name
        }
        None => format!("{}LB", request.name),
    };

    // Basic with single placement group off was rejected up front
    let sku = match (options.load_balancer_sku, single_placement_group) {
        (None, Some(false)) => Some(LoadBalancerSku::Standard),
        (sku, _) => sku,
    };

    let public_ip_sku = match sku {
        Some(LoadBalancerSku::Standard) => Some(PublicIpSku::Standard),
        _ => None,
    };
    let public_ip = network::resolve_public_ip(
        context,
        request,
        &format!("{name}PublicIP"),
        public_ip_sku,
    )
    .await?;

    Ok(BalancerPlan::NewLoadBalancer {
        backend_pool: options
            .backend_pool_name
            .clone()
            .unwrap_or_else(|| format!("{name}BEPool")),
        nat_pool: options
            .nat_pool_name
            .clone()
            .unwrap_or_else(|| format!("{name}NatPool")),
        backend_port: options.backend_port.unwrap_or(match os_type {
            OsType::Windows => 3389,
            OsType::Linux => 22,
        }),
        name,
        sku,
        public_ip,
    })
}

fn existing_load_balancer(
    id: ResourceId,
    existing: &Value,
    options: &ScaleSetOptions,
) -> Result<BalancerPlan, DeployError> {
    let backend_pools = child_names(existing, "/properties/backendAddressPools");
    let backend_pool = match (&options.backend_pool_name, backend_pools.as_slice()) {
        (Some(name), _) => name.clone(),
        (None, [only]) => only.clone(),
        (None, []) => {
            return Err(DeployError::resolution(
                format!("load balancer '{}' has no backend pool", id.name),
                &["load balancer backend pools"],
            ));
        }
        (None, _) => {
            return Err(DeployError::usage(format!(
                "multiple backend pools found in '{}', use --backend-pool-name to pick one",
                id.name
            )));
        }
    };

    let nat_pools = child_names(existing, "/properties/inboundNatPools");
    let nat_pool = match (&options.nat_pool_name, nat_pools.as_slice()) {
        (Some(name), _) => Some(name.clone()),
        (None, []) => {
            warn!(load_balancer = %id.name, "load balancer has no inbound NAT pool, instances will not be reachable through it");
            None
        }
        (None, [only]) => Some(only.clone()),
        (None, _) => {
            return Err(DeployError::usage(format!(
                "multiple NAT pools found in '{}', use --nat-pool-name to pick one",
                id.name
            )));
        }
    };

    Ok(BalancerPlan::ExistingLoadBalancer {
        id,
        backend_pool,
        nat_pool,
    })
}

async fn resolve_application_gateway(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
    options: &ScaleSetOptions,
    application_gateway: &str,
    subnet: &SubnetPlan,
) -> Result<BalancerPlan, DeployError> {
    let id = context.resource_id(
        application_gateway,
        "Microsoft.Network",
        "applicationGateways",
    );

    if let Some(existing) = context.find(&id).await? {
        let pools = child_names(&existing, "/properties/backendAddressPools");
        let backend_pool = match (&options.backend_pool_name, pools.as_slice()) {
            (Some(name), _) => name.clone(),
            (None, [only]) => only.clone(),
            (None, _) => {
                return Err(DeployError::usage(format!(
                    "application gateway '{}' must have exactly one backend pool, use --backend-pool-name to pick one",
                    id.name
                )));
            }
        };
        return Ok(BalancerPlan::ExistingApplicationGateway { id, backend_pool });
    }

    let name = id.name;
    let vnet_id = context.scope.resource_id(
        "Microsoft.Network",
        "virtualNetworks",
        subnet.vnet_name(),
    );
    let gateway_subnet_prefix = match (&options.app_gateway_subnet_address_prefix, subnet) {
        (Some(prefix), _) => prefix.clone(),
        (
            None,
            SubnetPlan::NewVnet {
                vnet_prefix,
                subnet_prefix,
                ..
            },
        ) => subnet::next_subnet_prefix(vnet_prefix, subnet_prefix, 24)?,
        (None, _) => existing_vnet_gateway_prefix(context, &vnet_id, subnet).await?,
    };

    let public_ip =
        network::resolve_public_ip(context, request, &format!("{name}PublicIP"), None).await?;

    Ok(BalancerPlan::NewApplicationGateway {
        sku: options
            .app_gateway_sku
            .clone()
            .unwrap_or_else(|| DEFAULT_APP_GATEWAY_SKU.to_string()),
        capacity: options
            .app_gateway_capacity
            .unwrap_or(DEFAULT_APP_GATEWAY_CAPACITY),
        backend_pool: options
            .backend_pool_name
            .clone()
            .unwrap_or_else(|| format!("{name}BEPool")),
        backend_port: options.backend_port.unwrap_or(DEFAULT_APP_GATEWAY_PORT),
        gateway_subnet_id: vnet_id.child("subnets", APP_GATEWAY_SUBNET),
        gateway_subnet_prefix,
        public_ip,
        name,
    })
}

// Next free /24 after the scale set subnet, read from the existing vnet.
async fn existing_vnet_gateway_prefix(
    context: &ResolverContext<'_>,
    vnet_id: &ResourceId,
    subnet: &SubnetPlan,
) -> Result<String, DeployError> {
    let missing = || {
        DeployError::usage(
            "--app-gateway-subnet-address-prefix is required when the virtual network's address space cannot be read",
        )
    };

    let vnet = context.find(vnet_id).await?.ok_or_else(missing)?;
    let vnet_prefix = vnet
        .pointer("/properties/addressSpace/addressPrefixes/0")
        .and_then(Value::as_str)
        .ok_or_else(missing)?;
    let subnet_prefix = match subnet {
        SubnetPlan::NewSubnet { subnet_prefix, .. } => subnet_prefix.clone(),
        _ => subnets_of(&vnet)
            .find(|candidate| name_of(candidate).eq_ignore_ascii_case(subnet.subnet_name()))
            .and_then(|candidate| candidate.pointer("/properties/addressPrefix"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(missing)?,
    };

    subnet::next_subnet_prefix(vnet_prefix, &subnet_prefix, 24)
}

fn child_names(resource: &Value, pointer: &str) -> Vec<String> {
    resource
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|children| {
            children
                .iter()
                .map(|child| name_of(child).to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dependencies::mocks::not_found, models::PublicIpPlan, resolvers::testing::*};
    use serde_json::json;

    fn vmss_request(options: ScaleSetOptions) -> CreateRequest {
        CreateRequest {
            name: "vmss1".to_string(),
            resource_group: RESOURCE_GROUP.to_string(),
            vnet_name: Some("vnet1".to_string()),
            subnet: Some("default".to_string()),
            scale_set: Some(options),
            ..Default::default()
        }
    }

    fn fixture_with_new_vnet() -> Fixture {
        let mut fixture = Fixture::new();
        fixture
            .resources
            .expect_get()
            .returning(|path, _| Err(not_found(path)));
        fixture
    }

    #[tokio::test]
    async fn test_default_is_new_load_balancer() {
        let fixture = fixture_with_new_vnet();

        let plan = resolve_scale_set_network(
            &fixture.context(),
            &vmss_request(ScaleSetOptions::default()),
            "westus",
            OsType::Linux,
        )
        .await
        .unwrap();

        let BalancerPlan::NewLoadBalancer {
            name,
            sku,
            backend_pool,
            nat_pool,
            backend_port,
            public_ip,
        } = plan.balancer
        else {
            panic!("expected a new load balancer");
        };
        assert_eq!(name, "vmss1LB");
        assert_eq!(sku, None);
        assert_eq!(backend_pool, "vmss1LBBEPool");
        assert_eq!(nat_pool, "vmss1LBNatPool");
        assert_eq!(backend_port, 22);
        assert!(matches!(public_ip, PublicIpPlan::New { ref name, .. } if name == "vmss1LBPublicIP"));
        assert_eq!(plan.nsg, NsgPlan::None);
        assert_eq!(plan.single_placement_group, None);
    }

    #[tokio::test]
    async fn test_large_scale_set_needs_standard_load_balancer() {
        let fixture = fixture_with_new_vnet();
        let options = ScaleSetOptions {
            instance_count: Some(150),
            ..Default::default()
        };

        let plan = resolve_scale_set_network(
            &fixture.context(),
            &vmss_request(options),
            "westus",
            OsType::Windows,
        )
        .await
        .unwrap();

        assert!(plan.balancer.is_new_standard_load_balancer());
        assert_eq!(plan.single_placement_group, Some(false));
        assert!(matches!(plan.nsg, NsgPlan::New { rule: NsgRule::Rdp, ref name } if name == "vmss1NSG"));
        assert!(matches!(
            plan.balancer,
            BalancerPlan::NewLoadBalancer { backend_port: 3389, .. }
        ));
    }

    #[tokio::test]
    async fn test_basic_load_balancer_reasons() {
        let cases = [
            (
                ScaleSetOptions {
                    instance_count: Some(150),
                    load_balancer_sku: Some(LoadBalancerSku::Basic),
                    ..Default::default()
                },
                vec![],
                "for scale-sets with 100+ instances",
            ),
            (
                ScaleSetOptions {
                    load_balancer_sku: Some(LoadBalancerSku::Basic),
                    ..Default::default()
                },
                vec!["1".to_string()],
                "for zonal scale-sets",
            ),
            (
                ScaleSetOptions {
                    load_balancer_sku: Some(LoadBalancerSku::Basic),
                    single_placement_group: Some(false),
                    ..Default::default()
                },
                vec![],
                "because 'single placement group' is turned off",
            ),
        ];

        for (options, zones, reason) in cases {
            let fixture = fixture_with_new_vnet();
            let request = CreateRequest {
                zones,
                ..vmss_request(options)
            };

            let error = resolve_scale_set_network(&fixture.context(), &request, "westus", OsType::Linux)
                .await
                .unwrap_err();

            assert_eq!(
                error.to_string(),
                format!("usage error: 'Standard' load balancer is required {reason}")
            );
        }
    }

    #[tokio::test]
    async fn test_existing_load_balancer_pools() {
        let lb_id = rg_id("Microsoft.Network", "loadBalancers", "lb1");
        let mut fixture = Fixture::new();
        fixture
            .resources
            .expect_get()
            .returning(move |path, _| {
                if path == lb_id {
                    Ok(json!({
                        "name": "lb1",
                        "properties": {
                            "backendAddressPools": [{"name": "pool1"}],
                            "inboundNatPools": [{"name": "nat1"}]
                        }
                    }))
                } else {
                    Err(not_found(path))
                }
            });
        let options = ScaleSetOptions {
            load_balancer: Some("lb1".to_string()),
            ..Default::default()
        };

        let plan = resolve_scale_set_network(
            &fixture.context(),
            &vmss_request(options),
            "westus",
            OsType::Linux,
        )
        .await
        .unwrap();

        let BalancerPlan::ExistingLoadBalancer {
            id,
            backend_pool,
            nat_pool,
        } = plan.balancer
        else {
            panic!("expected an existing load balancer");
        };
        assert_eq!(id.name, "lb1");
        assert_eq!(backend_pool, "pool1");
        assert_eq!(nat_pool.as_deref(), Some("nat1"));
    }

    #[tokio::test]
    async fn test_existing_load_balancer_with_many_pools_is_an_error() {
        let mut fixture = Fixture::new();
        fixture.resources.expect_get().returning(|path, _| {
            if path.contains("loadBalancers") {
                Ok(json!({"properties": {"backendAddressPools": [{"name": "a"}, {"name": "b"}]}}))
            } else {
                Err(not_found(path))
            }
        });
        let options = ScaleSetOptions {
            load_balancer: Some("lb1".to_string()),
            ..Default::default()
        };

        let result = resolve_scale_set_network(
            &fixture.context(),
            &vmss_request(options),
            "westus",
            OsType::Linux,
        )
        .await;

        assert!(matches!(result, Err(DeployError::Usage(_))));
    }

    #[tokio::test]
    async fn test_new_application_gateway_in_new_vnet() {
        let fixture = fixture_with_new_vnet();
        let options = ScaleSetOptions {
            application_gateway: Some("ag1".to_string()),
            ..Default::default()
        };

        let plan = resolve_scale_set_network(
            &fixture.context(),
            &vmss_request(options),
            "westus",
            OsType::Linux,
        )
        .await
        .unwrap();

        let BalancerPlan::NewApplicationGateway {
            name,
            sku,
            capacity,
            backend_port,
            gateway_subnet_id,
            gateway_subnet_prefix,
            ..
        } = plan.balancer
        else {
            panic!("expected a new application gateway");
        };
        assert_eq!(name, "ag1");
        assert_eq!(sku, "Standard_Large");
        assert_eq!(capacity, 10);
        assert_eq!(backend_port, 80);
        assert_eq!(gateway_subnet_id.leaf_name(), "appGwSubnet");
        assert_eq!(gateway_subnet_prefix, "10.0.1.0/24");
    }

    #[tokio::test]
    async fn test_application_gateway_rejects_load_balancer_flags() {
        let fixture = Fixture::new();
        let options = ScaleSetOptions {
            application_gateway: Some("ag1".to_string()),
            nat_pool_name: Some("nat".to_string()),
            ..Default::default()
        };

        let error = resolve_scale_set_network(
            &fixture.context(),
            &vmss_request(options),
            "westus",
            OsType::Linux,
        )
        .await
        .unwrap_err();

        assert_eq!(
            error.to_string(),
            "usage error: --nat-pool-name cannot be used with an application gateway"
        );
    }

    #[tokio::test]
    async fn test_load_balancer_and_gateway_together_is_usage_error() {
        let fixture = fixture_with_new_vnet();
        let options = ScaleSetOptions {
            application_gateway: Some("ag1".to_string()),
            load_balancer: Some("lb1".to_string()),
            ..Default::default()
        };

        let result = resolve_scale_set_network(
            &fixture.context(),
            &vmss_request(options),
            "westus",
            OsType::Linux,
        )
        .await;

        assert!(matches!(result, Err(DeployError::Usage(_))));
    }

    #[tokio::test]
    async fn test_public_ip_without_balancer_is_usage_error() {
        let fixture = fixture_with_new_vnet();
        let options = ScaleSetOptions {
            load_balancer: Some(String::new()),
            ..Default::default()
        };
        let request = CreateRequest {
            public_ip_address: Some("ip1".to_string()),
            ..vmss_request(options)
        };

        let result =
            resolve_scale_set_network(&fixture.context(), &request, "westus", OsType::Linux).await;

        assert!(matches!(result, Err(DeployError::Usage(_))));
    }

    #[tokio::test]
    async fn test_health_probe_is_child_of_load_balancer() {
        let fixture = fixture_with_new_vnet();
        let options = ScaleSetOptions {
            health_probe: Some("probe1".to_string()),
            ..Default::default()
        };

        let plan = resolve_scale_set_network(
            &fixture.context(),
            &vmss_request(options),
            "westus",
            OsType::Linux,
        )
        .await
        .unwrap();

        assert_eq!(
            plan.health_probe.map(|probe| probe.to_string()),
            Some(format!(
                "{}/probes/probe1",
                rg_id("Microsoft.Network", "loadBalancers", "vmss1LB")
            ))
        );
    }
}
