use clap::{Args, Subcommand};

use crate::models::CreateRequest;

use super::CreateArgs;

#[derive(Subcommand)]
pub enum Vm {
    /// Create a virtual machine.
    ///
    /// The machine and every resource it needs (network interface, virtual network, public IP,
    /// network security group, storage account) are created in a single deployment.
    Create(VmCreate),
}

#[derive(Args, Debug, Clone)]
pub struct VmCreate {
    #[command(flatten)]
    pub common: CreateArgs,

    /// Existing managed OS disk or VHD to attach.
    #[arg(long)]
    pub attach_os_disk: Option<String>,

    /// Existing managed disks or VHDs to attach as data disks.
    #[arg(long, num_args = 1..)]
    pub attach_data_disks: Vec<String>,

    /// Existing network interfaces, the first one becomes primary.
    #[arg(long, num_args = 1..)]
    pub nics: Vec<String>,

    /// Static private IP address of the new network interface.
    #[arg(long)]
    pub private_ip_address: Option<String>,

    /// Name or id of an existing availability set.
    #[arg(long)]
    pub availability_set: Option<String>,

    /// Host name of the machine, defaults to its name.
    #[arg(long)]
    pub computer_name: Option<String>,

    /// Log Analytics workspace name or id, enables the monitoring agent.
    #[arg(long)]
    pub workspace: Option<String>,

    /// Id of the dedicated host the machine runs on.
    #[arg(long, conflicts_with = "host_group")]
    pub host: Option<String>,

    /// Storage account name or blob URI for boot diagnostics.
    #[arg(long)]
    pub boot_diagnostics_storage: Option<String>,
}

impl From<VmCreate> for CreateRequest {
    fn from(args: VmCreate) -> Self {
        Self {
            attach_os_disk: args.attach_os_disk,
            attach_data_disks: args.attach_data_disks,
            nics: args.nics,
            private_ip_address: args.private_ip_address,
            availability_set: args.availability_set,
            computer_name: args.computer_name,
            workspace: args.workspace,
            dedicated_host: args.host,
            boot_diagnostics_storage: args.boot_diagnostics_storage,
            ..args.common.into_request()
        }
    }
}
