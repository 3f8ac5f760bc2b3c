use std::fmt::Display;

use serde::Serialize;

use super::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum NsgRule {
    Ssh,
    Rdp,
    None,
}

impl NsgRule {
    /// `(rule name, destination port)` of the inbound allow rule.
    pub fn inbound_rule(self) -> Option<(&'static str, u16)> {
        match self {
            Self::Ssh => Some(("default-allow-ssh", 22)),
            Self::Rdp => Some(("rdp", 3389)),
            Self::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum IpAllocation {
    Dynamic,
    Static,
}

impl Display for IpAllocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dynamic => write!(f, "Dynamic"),
            Self::Static => write!(f, "Static"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum PublicIpSku {
    Basic,
    Standard,
}

impl Display for PublicIpSku {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "Basic"),
            Self::Standard => write!(f, "Standard"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum LoadBalancerSku {
    Basic,
    Standard,
}

impl Display for LoadBalancerSku {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "Basic"),
            Self::Standard => write!(f, "Standard"),
        }
    }
}

/// Subnet the primary NIC lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubnetPlan {
    Existing(ResourceId),
    /// Virtual network and subnet are both created by the deployment.
    NewVnet {
        subnet_id: ResourceId,
        vnet_prefix: String,
        subnet_prefix: String,
    },
    /// The virtual network exists; the subnet is added to it as a child resource.
    NewSubnet {
        subnet_id: ResourceId,
        subnet_prefix: String,
    },
}

impl SubnetPlan {
    pub fn subnet_id(&self) -> &ResourceId {
        match self {
            Self::Existing(subnet_id)
            | Self::NewVnet { subnet_id, .. }
            | Self::NewSubnet { subnet_id, .. } => subnet_id,
        }
    }

    pub fn vnet_name(&self) -> &str {
        &self.subnet_id().name
    }

    pub fn subnet_name(&self) -> &str {
        self.subnet_id().leaf_name()
    }

    pub fn is_new_vnet(&self) -> bool {
        matches!(self, Self::NewVnet { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NsgPlan {
    New { name: String, rule: NsgRule },
    Existing(ResourceId),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicIpPlan {
    New {
        name: String,
        allocation: IpAllocation,
        dns_name: Option<String>,
        sku: Option<PublicIpSku>,
    },
    Existing(ResourceId),
    None,
}

/// Network interfaces of a single machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NicPlan {
    /// Existing interfaces, the first one is primary.
    Existing(Vec<ResourceId>),
    New {
        subnet: SubnetPlan,
        nsg: NsgPlan,
        public_ip: PublicIpPlan,
        private_ip_address: Option<String>,
    },
}

/// Front end of a scale set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalancerPlan {
    None,
    NewLoadBalancer {
        name: String,
        sku: Option<LoadBalancerSku>,
        backend_pool: String,
        nat_pool: String,
        backend_port: u16,
        public_ip: PublicIpPlan,
    },
    ExistingLoadBalancer {
        id: ResourceId,
        backend_pool: String,
        nat_pool: Option<String>,
    },
    NewApplicationGateway {
        name: String,
        sku: String,
        capacity: u32,
        backend_pool: String,
        backend_port: u16,
        gateway_subnet_id: ResourceId,
        gateway_subnet_prefix: String,
        public_ip: PublicIpPlan,
    },
    ExistingApplicationGateway {
        id: ResourceId,
        backend_pool: String,
    },
}

impl BalancerPlan {
    pub fn is_new_standard_load_balancer(&self) -> bool {
        matches!(
            self,
            Self::NewLoadBalancer {
                sku: Some(LoadBalancerSku::Standard),
                ..
            }
        )
    }
}

/// Network shape of a scale set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleSetNetworkPlan {
    pub subnet: SubnetPlan,
    pub balancer: BalancerPlan,
    pub nsg: NsgPlan,
    pub health_probe: Option<ResourceId>,
    pub single_placement_group: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceScope;

    #[test]
    fn test_subnet_plan_names() {
        let plan = SubnetPlan::NewVnet {
            subnet_id: ResourceScope::new("sub", "rg")
                .resource_id("Microsoft.Network", "virtualNetworks", "vm1VNET")
                .child("subnets", "vm1Subnet"),
            vnet_prefix: "10.0.0.0/16".to_string(),
            subnet_prefix: "10.0.0.0/24".to_string(),
        };

        assert_eq!(plan.vnet_name(), "vm1VNET");
        assert_eq!(plan.subnet_name(), "vm1Subnet");
        assert!(plan.is_new_vnet());
    }

    #[test]
    fn test_nsg_rule_ports() {
        assert_eq!(NsgRule::Ssh.inbound_rule(), Some(("default-allow-ssh", 22)));
        assert_eq!(NsgRule::Rdp.inbound_rule(), Some(("rdp", 3389)));
        assert_eq!(NsgRule::None.inbound_rule(), None);
    }
}
