//! Names of generated resources.
//!
//! Everything derived from a parent id is a stable hash, so running the same request twice yields
//! the same names. Only deployment and role assignment names are random.
use sha2::{Digest, Sha256};
use uuid::Uuid;

const COMPUTER_NAME_SPECIAL_CHARS: &str = "`~!@#$%^&*()=+_[]{}\\|;:'\",<>/?";

/// Lower-case hex SHA-256 of `value`, cut to `length` characters.
pub fn hash_string(value: &str, length: usize) -> String {
    let mut digest = hex::encode(Sha256::digest(value.as_bytes()));
    digest.truncate(length);
    digest
}

/// `{prefix}` followed by 32 random hex characters.
pub fn deployment_name(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}

/// Role assignment names must be globally unique GUIDs.
pub fn role_assignment_name() -> String {
    Uuid::new_v4().to_string()
}

pub fn nic_name(vm_name: &str) -> String {
    format!("{vm_name}VMNic")
}

/// Name of the OS disk VHD of an unmanaged machine.
pub fn os_disk_vhd_name(parent_id: &str) -> String {
    format!("osdisk_{}", hash_string(parent_id, 10))
}

/// Machine name without the characters a computer name cannot hold.
pub fn computer_name(vm_name: &str) -> String {
    vm_name
        .chars()
        .filter(|c| !COMPUTER_NAME_SPECIAL_CHARS.contains(*c))
        .collect()
}

/// Nine character prefix of scale set instance, nic and storage pool names.
pub fn scale_set_naming_prefix(vmss_name: &str, vmss_id: &str) -> String {
    let scrubbed: String = vmss_name
        .replace('-', "")
        .to_ascii_lowercase()
        .chars()
        .take(5)
        .collect();
    let hash = hash_string(vmss_id, 9 - scrubbed.chars().count());
    format!("{scrubbed}{hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const VM_ID: &str =
        "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1";

    #[test]
    fn test_hash_string_is_stable_and_truncated() {
        let first = hash_string(VM_ID, 14);

        assert_eq!(first.len(), 14);
        assert_eq!(first, hash_string(VM_ID, 14));
        assert!(first.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(first, hash_string(&VM_ID.replace("vm1", "vm2"), 14));
    }

    #[test]
    fn test_hash_string_of_known_value() {
        // sha256("abc")
        assert_eq!(hash_string("abc", 16), "ba7816bf8f01cfea");
    }

    #[test]
    fn test_deployment_name_has_random_suffix() {
        let name = deployment_name("vm_deploy_");

        assert!(name.starts_with("vm_deploy_"));
        assert_eq!(name.len(), "vm_deploy_".len() + 32);
        assert_ne!(name, deployment_name("vm_deploy_"));
    }

    #[test]
    fn test_computer_name_drops_special_characters() {
        assert_eq!(computer_name("web_01.test"), "web01.test");
    }

    #[test]
    fn test_scale_set_naming_prefix() {
        let id = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/virtualMachineScaleSets/My-Scale-Set";

        let prefix = scale_set_naming_prefix("My-Scale-Set", id);

        assert_eq!(prefix.len(), 9);
        assert!(prefix.starts_with("mysca"));
        assert_eq!(prefix, scale_set_naming_prefix("My-Scale-Set", id));
    }

    #[test]
    fn test_short_scale_set_name_gets_longer_hash() {
        assert_eq!(scale_set_naming_prefix("ss", "id").len(), 9);
    }
}
