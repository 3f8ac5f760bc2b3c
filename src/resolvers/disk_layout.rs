//! Normalize OS and data disk options into one [`DiskLayout`].
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::LazyLock,
};

use regex::Regex;
use tracing::{debug, warn};

use super::{image::ResolvedImage, resource_id::resolve_resource_id};
use crate::{
    error::DeployError,
    models::{
        Caching, CreateRequest, DataDisk, DataDiskSource, DiskLayout, DiskOverrides, DiskSlot,
        OsDisk, ResourceScope, StorageProfile,
    },
};

// Lv series sizes, e.g. Standard_L8s_v2, only support caching None.
static LV_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)_L[0-9]+s").expect("valid regex"));

const ULTRA_SSD: &str = "ultrassd_lrs";

pub fn is_lv_size(size: &str) -> bool {
    LV_SIZE.is_match(size)
}

/// Storage skus after defaults: unmanaged images get one account sku when none was given.
pub fn effective_storage_skus(request: &CreateRequest, profile: StorageProfile) -> Vec<String> {
    if request.storage_sku.is_empty()
        && matches!(
            profile,
            StorageProfile::SaPirImage | StorageProfile::SaCustomImage
        )
    {
        let sku = if request.is_scale_set() {
            "Standard_LRS"
        } else {
            "Premium_LRS"
        };
        return vec![sku.to_string()];
    }

    request.storage_sku.clone()
}

/// Explicit setting, else enabled when any requested sku is UltraSSD.
pub fn ultra_ssd_enabled(request: &CreateRequest) -> Option<bool> {
    request.ultra_ssd_enabled.or_else(|| {
        request
            .storage_sku
            .iter()
            .any(|sku| sku.to_ascii_lowercase().contains(ULTRA_SSD))
            .then_some(true)
    })
}

/// Lay out the OS disk and every data disk with a unique LUN.
///
/// Image disks keep their LUNs. Empty, copied, restored and attached disks follow in that order,
/// each on the lowest LUN still free.
pub fn resolve_disk_layout(
    scope: &ResourceScope,
    request: &CreateRequest,
    image: &ResolvedImage,
) -> Result<DiskLayout, DeployError> {
    let caching = data_caching(request)?;
    let storage_skus = effective_storage_skus(request, image.profile);
    let storage_sku =
        DiskOverrides::parse("--storage-sku", &storage_skus, |value| Ok(value.to_string()))?;
    let write_accelerator = DiskOverrides::parse(
        "--write-accelerator",
        &request.write_accelerator,
        parse_bool,
    )?;

    let mut data = BTreeMap::new();
    for lun in &image.image_data_luns {
        data.insert(*lun, DataDiskSource::FromImage);
    }
    for size_gb in &request.data_disk_sizes_gb {
        push_next(&mut data, DataDiskSource::Empty { size_gb: *size_gb });
    }

    let (restores, copies): (Vec<&String>, Vec<&String>) = request
        .data_disk_sources
        .iter()
        .partition(|source| is_restore_point(source));
    for source in copies {
        let source_id = resolve_resource_id(scope, source, "Microsoft.Compute", "snapshots");
        push_next(
            &mut data,
            DataDiskSource::Copy {
                source_id: source_id.to_string(),
            },
        );
    }
    for source in restores {
        push_next(
            &mut data,
            DataDiskSource::Restore {
                restore_point_id: source.clone(),
            },
        );
    }

    for disk in &request.attach_data_disks {
        let source = if request.use_unmanaged_disk {
            DataDiskSource::AttachVhd { uri: disk.clone() }
        } else {
            let disk_id = resolve_resource_id(scope, disk, "Microsoft.Compute", "disks");
            DataDiskSource::AttachManaged {
                disk_id: disk_id.to_string(),
            }
        };
        push_next(&mut data, source);
    }

    let luns: BTreeSet<u32> = data.keys().copied().collect();
    check_slots("--data-disk-caching", &caching, &luns)?;
    check_slots("--storage-sku", &storage_sku, &luns)?;
    check_slots("--write-accelerator", &write_accelerator, &luns)?;

    let lv_size = is_lv_size(request.vm_size());
    if lv_size {
        let explicit_os = request.os_caching.filter(|caching| *caching != Caching::None);
        let explicit_data = luns
            .iter()
            .filter_map(|lun| caching.for_slot(DiskSlot::Lun(*lun)))
            .find(|caching| *caching != Caching::None);
        if explicit_os.is_some() || explicit_data.is_some() {
            return Err(lv_caching_error());
        }
    }

    let os_caching = match request.os_caching {
        Some(caching) => caching,
        None if lv_size => Caching::None,
        None if request.ephemeral_os_disk => Caching::ReadOnly,
        None => Caching::ReadWrite,
    };

    let mut os_storage_sku = storage_sku.for_slot(DiskSlot::Os);
    if os_storage_sku
        .as_deref()
        .is_some_and(|sku| sku.eq_ignore_ascii_case(ULTRA_SSD))
    {
        warn!("UltraSSD_LRS cannot be used for the OS disk, using the default storage sku instead");
        os_storage_sku = None;
    }

    let data = data
        .into_iter()
        .map(|(lun, source)| {
            let slot = DiskSlot::Lun(lun);
            let disk = DataDisk {
                lun,
                source,
                caching: caching
                    .for_slot(slot)
                    .or(lv_size.then_some(Caching::None)),
                storage_sku: storage_sku.for_slot(slot),
                write_accelerator: write_accelerator.for_slot(slot),
            };
            (lun, disk)
        })
        .collect();

    let layout = DiskLayout {
        os: OsDisk {
            caching: os_caching,
            storage_sku: os_storage_sku,
            size_gb: request.os_disk_size_gb,
            write_accelerator: write_accelerator.for_slot(DiskSlot::Os),
            ephemeral: request.ephemeral_os_disk,
            ephemeral_placement: request.ephemeral_os_disk_placement,
        },
        data,
    };
    debug!(luns = ?layout.luns(), os_caching = %layout.os.caching, "disk layout resolved");

    Ok(layout)
}

/// Override syntax and OS caching rules, decidable before any image lookup.
pub fn check_disk_flags(request: &CreateRequest) -> Result<(), DeployError> {
    data_caching(request)?;
    DiskOverrides::parse(
        "--write-accelerator",
        &request.write_accelerator,
        parse_bool,
    )?;
    if is_lv_size(request.vm_size())
        && request.os_caching.is_some_and(|caching| caching != Caching::None)
    {
        return Err(lv_caching_error());
    }
    Ok(())
}

fn data_caching(request: &CreateRequest) -> Result<DiskOverrides<Caching>, DeployError> {
    let caching = DiskOverrides::parse(
        "--data-disk-caching",
        &request.data_caching,
        str::parse::<Caching>,
    )?;
    if caching.slots().contains(&DiskSlot::Os) {
        return Err(DeployError::usage(
            "--data-disk-caching does not accept 'os=', use --os-disk-caching",
        ));
    }
    Ok(caching)
}

fn lv_caching_error() -> DeployError {
    DeployError::usage("for Lv series of machines, 'None' is the only supported caching mode")
}

fn is_restore_point(source: &str) -> bool {
    let lowercase = source.to_ascii_lowercase();
    lowercase.contains("/restorepointcollections/") && lowercase.contains("/restorepoints/")
}

fn push_next(data: &mut BTreeMap<u32, DataDiskSource>, source: DataDiskSource) {
    let lun = (0..).find(|lun| !data.contains_key(lun)).unwrap_or_default();
    data.insert(lun, source);
}

fn check_slots<T: Clone>(
    flag: &str,
    overrides: &DiskOverrides<T>,
    luns: &BTreeSet<u32>,
) -> Result<(), DeployError> {
    for slot in overrides.slots() {
        if let DiskSlot::Lun(lun) = slot {
            if !luns.contains(&lun) {
                let valid: Vec<String> = luns.iter().map(u32::to_string).collect();
                return Err(DeployError::usage(format!(
                    "{flag}: data disk with lun of '{lun}' doesn't exist, existing luns: [{}]",
                    valid.join(", ")
                )));
            }
        }
    }

    Ok(())
}

fn parse_bool(value: &str) -> Result<bool, DeployError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(DeployError::usage(format!(
            "'{value}' is not a boolean, expected true or false"
        ))),
    }
}
