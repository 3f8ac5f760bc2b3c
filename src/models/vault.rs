use serde::Serialize;

use super::ResourceId;

/// Certificates of one Key Vault installed on the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSecretGroup {
    pub source_vault: SourceVault,
    pub vault_certificates: Vec<VaultCertificate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceVault {
    pub id: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultCertificate {
    pub certificate_url: String,
    /// Certificate store on Windows machines; Linux has none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_store: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceScope;
    use serde_json::json;

    #[test]
    fn test_serializes_in_os_profile_shape() {
        let group = VaultSecretGroup {
            source_vault: SourceVault {
                id: ResourceScope::new("sub", "rg").resource_id("Microsoft.KeyVault", "vaults", "kv1"),
            },
            vault_certificates: vec![VaultCertificate {
                certificate_url: "https://kv1.vault.azure.net/secrets/cert1/1".to_string(),
                certificate_store: None,
            }],
        };

        assert_eq!(
            serde_json::to_value(&group).unwrap(),
            json!({
                "sourceVault": {"id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.KeyVault/vaults/kv1"},
                "vaultCertificates": [{"certificateUrl": "https://kv1.vault.azure.net/secrets/cert1/1"}]
            })
        );
    }
}
