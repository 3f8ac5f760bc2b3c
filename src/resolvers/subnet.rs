//! IPv4 prefix arithmetic for new virtual networks and subnets.
use std::net::Ipv4Addr;

use crate::error::DeployError;

pub const DEFAULT_VNET_PREFIX: &str = "10.0.0.0/16";
pub const DEFAULT_SUBNET_PREFIX: &str = "10.0.0.0/24";

/// Largest and smallest subnet masks tried for a new scale set subnet.
const SCALE_SET_MASKS: std::ops::RangeInclusive<u8> = 16..=24;

/// Split `a.b.c.d/n` into its address and mask length.
pub fn parse_cidr(value: &str) -> Result<(Ipv4Addr, u8), DeployError> {
    let invalid = || DeployError::usage(format!("'{value}' is not a valid IPv4 address prefix"));

    let (address, mask) = value.split_once('/').ok_or_else(invalid)?;
    let address: Ipv4Addr = address.parse().map_err(|_| invalid())?;
    let mask: u8 = mask.parse().map_err(|_| invalid())?;
    if mask > 32 {
        return Err(invalid());
    }

    Ok((address, mask))
}

/// Whether a subnet with `mask` leaves room for the instances, 2 addresses being reserved.
///
/// Overprovisioned scale sets briefly run half again as many machines.
pub fn has_capacity(mask: u8, instance_count: u32, overprovision: bool) -> bool {
    let usable = (1u64 << (32 - u32::from(mask.min(32)))).saturating_sub(2);
    let needed = if overprovision {
        u64::from(instance_count) * 3 / 2
    } else {
        u64::from(instance_count)
    };

    usable > needed
}

/// Same check for an existing subnet given by its prefix.
pub fn prefix_has_capacity(prefix: &str, instance_count: u32, overprovision: bool) -> bool {
    parse_cidr(prefix)
        .map(|(_, mask)| has_capacity(mask, instance_count, overprovision))
        .unwrap_or(false)
}

/// Subnet prefix for a new scale set vnet: the vnet's base address with the smallest mask that fits.
pub fn scale_set_subnet_prefix(
    vnet_prefix: &str,
    instance_count: u32,
    overprovision: bool,
) -> Result<String, DeployError> {
    let (address, _) = parse_cidr(vnet_prefix)?;

    SCALE_SET_MASKS
        .rev()
        .find(|mask| has_capacity(*mask, instance_count, overprovision))
        .map(|mask| format!("{address}/{mask}"))
        .ok_or_else(|| {
            DeployError::usage(format!(
                "instance count '{instance_count}' is out of range of 2^16 subnet size"
            ))
        })
}

/// The sibling of `subnet_prefix` inside `vnet_prefix`, formatted with `new_mask`.
///
/// Takes the next block after the subnet, or the one before it when the next block would leave
/// the vnet.
pub fn next_subnet_prefix(
    vnet_prefix: &str,
    subnet_prefix: &str,
    new_mask: u8,
) -> Result<String, DeployError> {
    let (vnet_address, vnet_mask) = parse_cidr(vnet_prefix)?;
    let (subnet_address, subnet_mask) = parse_cidr(subnet_prefix)?;
    let out_of_range = || {
        DeployError::usage(
            "--subnet-address-prefix value should be a subrange of --vnet-address-prefix's",
        )
    };
    if subnet_mask < vnet_mask {
        return Err(out_of_range());
    }

    let vnet_bits = 32 - u32::from(vnet_mask);
    let subnet_bits = 32 - u32::from(subnet_mask);
    let vnet_block = u64::from(u32::from(vnet_address)) >> vnet_bits;
    let leaves_vnet = |candidate: u64| candidate >> (vnet_bits - subnet_bits) != vnet_block;

    let block = u64::from(u32::from(subnet_address)) >> subnet_bits;
    let mut candidate = block + 1;
    if leaves_vnet(candidate) {
        candidate = block.checked_sub(1).ok_or_else(out_of_range)?;
        if leaves_vnet(candidate) {
            return Err(out_of_range());
        }
    }

    let address = u32::try_from(candidate << subnet_bits).map_err(|_| out_of_range())?;
    Ok(format!("{}/{new_mask}", Ipv4Addr::from(address)))
}
