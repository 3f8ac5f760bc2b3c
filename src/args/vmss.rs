use clap::{Args, Subcommand};

use crate::models::{CreateRequest, LoadBalancerSku, ScaleSetOptions, UpgradePolicyMode};

use super::CreateArgs;

#[derive(Subcommand)]
pub enum Vmss {
    /// Create a virtual machine scale set.
    ///
    /// The scale set is created behind a new load balancer unless an application gateway, an
    /// existing balancer or no balancer ("") is requested.
    Create(VmssCreate),
}

#[derive(Args, Debug, Clone)]
pub struct VmssCreate {
    #[command(flatten)]
    pub common: CreateArgs,

    /// Number of instances.
    #[arg(long)]
    pub instance_count: Option<u32>,

    /// Disable overprovisioning.
    #[arg(long)]
    pub disable_overprovision: bool,

    /// Upgrade policy mode.
    #[arg(long, ignore_case = true, default_value = "manual")]
    pub upgrade_policy_mode: UpgradePolicyMode,

    /// Name or id of the load balancer, "" for none.
    #[arg(long, conflicts_with = "app_gateway")]
    pub load_balancer: Option<String>,

    /// SKU of a new load balancer.
    #[arg(long, ignore_case = true)]
    pub lb_sku: Option<LoadBalancerSku>,

    /// Name or id of the application gateway.
    #[arg(long)]
    pub app_gateway: Option<String>,

    /// SKU of a new application gateway.
    #[arg(long)]
    pub app_gateway_sku: Option<String>,

    /// Capacity of a new application gateway.
    #[arg(long)]
    pub app_gateway_capacity: Option<u32>,

    /// Address prefix of the subnet holding a new application gateway.
    #[arg(long)]
    pub app_gateway_subnet_address_prefix: Option<String>,

    /// Backend pool of the load balancer or application gateway.
    #[arg(long)]
    pub backend_pool_name: Option<String>,

    /// Inbound NAT pool of the load balancer.
    #[arg(long)]
    pub nat_pool_name: Option<String>,

    /// Backend port of the NAT pool or application gateway.
    #[arg(long)]
    pub backend_port: Option<u16>,

    /// Name or id of an existing load balancer probe.
    #[arg(long)]
    pub health_probe: Option<String>,

    /// Give every instance its own public IP address.
    #[arg(long)]
    pub public_ip_per_vm: bool,

    /// DNS label prefix of per instance public IP addresses.
    #[arg(long, requires = "public_ip_per_vm")]
    pub vm_domain_name: Option<String>,

    /// Limit the scale set to a single placement group.
    #[arg(long)]
    pub single_placement_group: Option<bool>,

    /// Computer name prefix of the instances.
    #[arg(long)]
    pub computer_name_prefix: Option<String>,

    /// Fault domain count of each placement group.
    #[arg(long)]
    pub platform_fault_domain_count: Option<u32>,
}

impl From<VmssCreate> for CreateRequest {
    fn from(args: VmssCreate) -> Self {
        Self {
            scale_set: Some(ScaleSetOptions {
                instance_count: args.instance_count,
                disable_overprovision: args.disable_overprovision,
                upgrade_policy_mode: args.upgrade_policy_mode,
                load_balancer: args.load_balancer,
                load_balancer_sku: args.lb_sku,
                application_gateway: args.app_gateway,
                app_gateway_sku: args.app_gateway_sku,
                app_gateway_capacity: args.app_gateway_capacity,
                app_gateway_subnet_address_prefix: args.app_gateway_subnet_address_prefix,
                backend_pool_name: args.backend_pool_name,
                nat_pool_name: args.nat_pool_name,
                backend_port: args.backend_port,
                health_probe: args.health_probe,
                public_ip_per_vm: args.public_ip_per_vm,
                vm_domain_name: args.vm_domain_name,
                single_placement_group: args.single_placement_group,
                computer_name_prefix: args.computer_name_prefix,
                platform_fault_domain_count: args.platform_fault_domain_count,
            }),
            ..args.common.into_request()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: VmssCreate,
    }

    #[test]
    fn test_parse_scale_set_options() {
        let harness = Harness::try_parse_from([
            "vmforge",
            "-g",
            "rg",
            "-n",
            "ss1",
            "--image",
            "UbuntuLTS",
            "--instance-count",
            "5",
            "--load-balancer",
            "",
            "--upgrade-policy-mode",
            "Automatic",
            "--tags",
            "env=test",
            "team",
        ])
        .unwrap();

        let request = CreateRequest::from(harness.args);
        let scale_set = request.scale_set.as_ref().unwrap();

        assert_eq!(scale_set.instance_count(), 5);
        assert_eq!(scale_set.load_balancer.as_deref(), Some(""));
        assert_eq!(scale_set.upgrade_policy_mode, UpgradePolicyMode::Automatic);
        assert_eq!(request.tags.len(), 2);
        assert_eq!(request.image.as_deref(), Some("UbuntuLTS"));
    }

    #[test]
    fn test_load_balancer_conflicts_with_app_gateway() {
        let result = Harness::try_parse_from([
            "vmforge",
            "-g",
            "rg",
            "-n",
            "ss1",
            "--load-balancer",
            "lb1",
            "--app-gateway",
            "ag1",
        ]);

        assert!(result.is_err());
    }
}
