use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use serde::Serialize;

use crate::error::DeployError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum Caching {
    None,
    ReadOnly,
    ReadWrite,
}

impl FromStr for Caching {
    type Err = DeployError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "readonly" => Ok(Self::ReadOnly),
            "readwrite" => Ok(Self::ReadWrite),
            _ => Err(DeployError::usage(format!(
                "unknown caching '{value}', expected None, ReadOnly or ReadWrite"
            ))),
        }
    }
}

impl Display for Caching {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::ReadOnly => write!(f, "ReadOnly"),
            Self::ReadWrite => write!(f, "ReadWrite"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum EphemeralPlacement {
    CacheDisk,
    ResourceDisk,
}

impl Display for EphemeralPlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CacheDisk => write!(f, "CacheDisk"),
            Self::ResourceDisk => write!(f, "ResourceDisk"),
        }
    }
}

/// A disk position: the OS disk or a data disk LUN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiskSlot {
    Os,
    Lun(u32),
}

impl FromStr for DiskSlot {
    type Err = DeployError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("os") {
            return Ok(Self::Os);
        }
        value
            .parse()
            .map(Self::Lun)
            .map_err(|_| DeployError::usage(format!("'{value}' is neither 'os' nor a LUN")))
    }
}

impl Display for DiskSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Os => write!(f, "os"),
            Self::Lun(lun) => write!(f, "{lun}"),
        }
    }
}

/// Per disk setting given either once for every disk or as `slot=value` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskOverrides<T> {
    Unset,
    Global(T),
    PerSlot(BTreeMap<DiskSlot, T>),
}

impl<T: Clone> DiskOverrides<T> {
    /// Parse `[value]` or `[slot=value, ...]`; mixing both forms is rejected.
    pub fn parse<F>(flag: &str, tokens: &[String], parse_value: F) -> Result<Self, DeployError>
    where
        F: Fn(&str) -> Result<T, DeployError>,
    {
        match tokens {
            [] => Ok(Self::Unset),
            [single] if !single.contains('=') => Ok(Self::Global(parse_value(single)?)),
            _ => {
                let mut per_slot = BTreeMap::new();
                for token in tokens {
                    let (slot, value) = token.split_once('=').ok_or_else(|| {
                        DeployError::usage(format!(
                            "{flag}: either a single value or a list of 'os=VALUE' / 'LUN=VALUE' pairs"
                        ))
                    })?;
                    per_slot.insert(slot.trim().parse()?, parse_value(value.trim())?);
                }
                Ok(Self::PerSlot(per_slot))
            }
        }
    }

    pub fn for_slot(&self, slot: DiskSlot) -> Option<T> {
        match self {
            Self::Unset => None,
            Self::Global(value) => Some(value.clone()),
            Self::PerSlot(values) => values.get(&slot).cloned(),
        }
    }

    pub fn slots(&self) -> Vec<DiskSlot> {
        match self {
            Self::PerSlot(values) => values.keys().copied().collect(),
            _ => Vec::new(),
        }
    }
}

/// Where a data disk's content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "createOption", rename_all = "camelCase")]
pub enum DataDiskSource {
    /// Declared by the source image; the image fixes the LUN.
    FromImage,
    Empty { size_gb: u32 },
    /// Snapshot or managed disk to copy.
    Copy { source_id: String },
    Restore { restore_point_id: String },
    AttachManaged { disk_id: String },
    AttachVhd { uri: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    pub lun: u32,
    pub source: DataDiskSource,
    pub caching: Option<Caching>,
    pub storage_sku: Option<String>,
    pub write_accelerator: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    pub caching: Caching,
    pub storage_sku: Option<String>,
    pub size_gb: Option<u32>,
    pub write_accelerator: Option<bool>,
    pub ephemeral: bool,
    pub ephemeral_placement: Option<EphemeralPlacement>,
}

/// Normalized layout of every disk of one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskLayout {
    pub os: OsDisk,
    pub data: BTreeMap<u32, DataDisk>,
}

impl DiskLayout {
    pub fn luns(&self) -> Vec<u32> {
        self.data.keys().copied().collect()
    }

    pub fn data_disks(&self) -> impl Iterator<Item = &DataDisk> {
        self.data.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn test_parse_global_override() {
        let overrides =
            DiskOverrides::parse("--data-disk-caching", &tokens(&["readonly"]), str::parse::<Caching>)
                .unwrap();

        assert_eq!(overrides, DiskOverrides::Global(Caching::ReadOnly));
        assert_eq!(overrides.for_slot(DiskSlot::Lun(7)), Some(Caching::ReadOnly));
    }

    #[test]
    fn test_parse_per_slot_override() {
        let overrides = DiskOverrides::parse(
            "--storage-sku",
            &tokens(&["os=Premium_LRS", "1=Standard_LRS"]),
            |value| Ok(value.to_string()),
        )
        .unwrap();

        assert_eq!(overrides.for_slot(DiskSlot::Os).as_deref(), Some("Premium_LRS"));
        assert_eq!(overrides.for_slot(DiskSlot::Lun(1)).as_deref(), Some("Standard_LRS"));
        assert_eq!(overrides.for_slot(DiskSlot::Lun(0)), None);
        assert_eq!(overrides.slots(), vec![DiskSlot::Os, DiskSlot::Lun(1)]);
    }

    #[test]
    fn test_parse_rejects_mixed_forms() {
        let result = DiskOverrides::parse(
            "--storage-sku",
            &tokens(&["Premium_LRS", "1=Standard_LRS"]),
            |value| Ok(value.to_string()),
        );

        assert!(matches!(result, Err(DeployError::Usage(_))));
    }

    #[test]
    fn test_parse_rejects_bad_slot() {
        let result = DiskOverrides::parse("--storage-sku", &tokens(&["data=Premium_LRS"]), |value| {
            Ok(value.to_string())
        });

        assert!(matches!(result, Err(DeployError::Usage(_))));
    }
}
