use serde_json::{Value, json};
use tracing::debug;

use super::{
    TemplateContext, VM_OUTPUT,
    compute::{self, OsDiskTarget, VM_TYPE},
    naming,
    network::{self, NicOptions},
};
use crate::{
    error::DeployError,
    models::{
        CreateRequest, DeploymentDocument, NicPlan, StorageAccountPlan, StorageProfile,
    },
    resolvers::{ResolvedNetwork, ResolvedRequest},
};

pub(super) fn assemble(
    context: &TemplateContext<'_>,
    request: &CreateRequest,
    resolved: &ResolvedRequest,
) -> Result<DeploymentDocument, DeployError> {
    let ResolvedNetwork::Machine(nics) = &resolved.network else {
        return Err(DeployError::InvalidTemplate(
            "a machine needs a network interface plan".to_string(),
        ));
    };

    let mut document = DeploymentDocument::new();
    let vm_name = request.name.as_str();
    let vm_id = context.id("Microsoft.Compute", "virtualMachines", vm_name);
    let mut dependencies: Vec<String> = Vec::new();

    let profile = resolved.image.profile;
    let mut os_disk_name = request.os_disk_name.clone();
    let target = match (profile, &resolved.storage_account) {
        (StorageProfile::SaPirImage | StorageProfile::SaCustomImage, Some(account)) => {
            if let StorageAccountPlan::New { name, sku } = account {
                let storage_account = compute::storage_account(context, name, sku);
                dependencies.push(storage_account.key());
                document.add_resource(storage_account);
            }
            let disk_name = os_disk_name
                .get_or_insert_with(|| naming::os_disk_vhd_name(&vm_id))
                .clone();
            let container = request.storage_container_name.as_deref().unwrap_or("vhds");
            OsDiskTarget::Vhd(compute::vhd_uri(account.name(), container, &disk_name))
        }
        (StorageProfile::SaSpecializedOsDisk, _) => OsDiskTarget::Source,
        _ => OsDiskTarget::Managed,
    };

    let network_interfaces: Vec<Value> = match nics {
        NicPlan::Existing(ids) => ids
            .iter()
            .enumerate()
            .map(|(position, id)| {
                json!({"id": id.to_string(), "properties": {"primary": position == 0}})
            })
            .collect(),
        NicPlan::New {
            subnet,
            nsg,
            public_ip,
            private_ip_address,
        } => {
            let subnet = network::add_subnet(&mut document, context, subnet, &[]);
            let nsg = network::add_nsg(&mut document, context, nsg);
            let public_ip = network::add_public_ip(&mut document, context, public_ip, &request.zones);

            let nic_name = naming::nic_name(vm_name);
            let nic = network::network_interface(
                context,
                &nic_name,
                &NicOptions {
                    vm_name,
                    subnet_id: &subnet.id,
                    private_ip_address: private_ip_address.as_deref(),
                    nsg_id: nsg.as_ref().map(|nsg| nsg.id.as_str()),
                    public_ip_id: public_ip.as_ref().map(|ip| ip.id.as_str()),
                    accelerated_networking: request.accelerated_networking,
                },
            );
            let nic = [Some(&subnet), nsg.as_ref(), public_ip.as_ref()]
                .into_iter()
                .fold(nic, |nic, reference| compute::depend_on(nic, reference));
            dependencies.push(nic.key());
            document.add_resource(nic);

            vec![json!({"id": context.id("Microsoft.Network", "networkInterfaces", &nic_name)})]
        }
    };

    let mut properties = json!({
        "hardwareProfile": {"vmSize": request.vm_size()},
        "networkProfile": {"networkInterfaces": network_interfaces},
        "storageProfile": compute::storage_profile(
            &resolved.image,
            &resolved.disks,
            os_disk_name.as_deref(),
            &target,
        ),
    });
    if let Some(credentials) = &resolved.credentials {
        let computer_name = request
            .computer_name
            .clone()
            .unwrap_or_else(|| naming::computer_name(vm_name));
        properties["osProfile"] = compute::os_profile(
            &mut document,
            credentials,
            resolved.image.os_type,
            "computerName",
            &computer_name,
            resolved.custom_data.as_deref(),
            &resolved.secrets,
        );
    }
    if let Some(availability_set) = &resolved.availability_set {
        properties["availabilitySet"] = json!({"id": availability_set.to_string()});
    }
    let placement = &resolved.placement;
    if let Some(ppg) = &placement.proximity_placement_group {
        properties["proximityPlacementGroup"] = json!({"id": ppg.to_string()});
    }
    if let Some(host) = &placement.dedicated_host {
        properties["host"] = json!({"id": host.to_string()});
    }
    if let Some(host_group) = &placement.host_group {
        properties["hostGroup"] = json!({"id": host_group.to_string()});
    }
    if let Some(storage_uri) = &placement.boot_diagnostics_uri {
        properties["diagnosticsProfile"] =
            json!({"bootDiagnostics": {"enabled": true, "storageUri": storage_uri}});
    }
    compute::set_billing_profile(&mut properties, request, placement);
    if let Some(license_type) = &request.license_type {
        properties["licenseType"] = json!(license_type);
    }
    if let Some(enabled) = resolved.ultra_ssd_enabled {
        properties["additionalCapabilities"] = json!({"ultraSSDEnabled": enabled});
    }

    let zones = if request.zones.is_empty() {
        Value::Null
    } else {
        json!(request.zones)
    };
    let vm = dependencies.into_iter().fold(
        context
            .resource(VM_TYPE, vm_name, &context.api_versions.compute)
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
        |vm, key| vm.depends_on(key),
    );
    let vm_key = vm.key();
    document.add_resource(vm);

    if let Some(assignment) = resolved
        .identity
        .as_ref()
        .and_then(|identity| identity.role_assignment.as_ref())
    {
        document.add_resource(compute::role_assignment(
            context, assignment, VM_TYPE, vm_name, &vm_key,
        ));
    }
    if let Some(workspace) = &resolved.workspace {
        let agent = compute::monitoring_agent(
            &mut document,
            context,
            vm_name,
            &vm_key,
            resolved.image.os_type,
            workspace,
        );
        document.add_resource(agent);
    }

    document.add_output(
        VM_OUTPUT,
        json!({
            "type": "object",
            "value": format!(
                "[reference(resourceId('{VM_TYPE}', '{vm_name}'), '{}')]",
                context.api_versions.compute
            ),
        }),
    );

    debug!(vm = %vm_name, resources = document.resources().len(), "machine document assembled");
    Ok(document)
}
