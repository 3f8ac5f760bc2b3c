//! Key Vault certificates installed through the OS profile.
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::resource_id::resolve_resource_id;
use crate::{
    dependencies::FileReader,
    error::DeployError,
    models::{
        CreateRequest, OsType, ResourceScope, SourceVault, VaultCertificate, VaultSecretGroup,
    },
};

/// Read every `--secrets` value, check its shape and merge the groups by vault.
///
/// A value naming an existing file is read from it, anything else is JSON text of the form
/// `[{"sourceVault": {"id": ..}, "vaultCertificates": [{"certificateUrl": .., "certificateStore": ..}]}]`.
/// Every shape problem is reported at once. Vault names become ids in the request's group.
pub async fn load_secrets(
    files: &(dyn FileReader + Send + Sync),
    scope: &ResourceScope,
    request: &CreateRequest,
) -> Result<Vec<VaultSecretGroup>, DeployError> {
    let mut groups: Vec<VaultSecretGroup> = Vec::new();
    let mut errors = Vec::new();

    for (arg, value) in request.secrets.iter().enumerate() {
        let path = Path::new(value);
        let text = if files.is_file(path).await {
            files
                .read_to_string(path)
                .await
                .map_err(|e| DeployError::usage(format!("{e:#}")))?
        } else {
            value.clone()
        };

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| DeployError::usage(format!("error decoding secrets: {e}")))?;
        let Some(entries) = parsed.as_array() else {
            return Err(DeployError::usage(format!(
                "error decoding secrets: arg {arg} is not a JSON array"
            )));
        };

        for (index, entry) in entries.iter().enumerate() {
            match parse_group(scope, entry, index, arg) {
                Ok(group) => merge(&mut groups, group),
                Err(mut found) => errors.append(&mut found),
            }
        }
    }

    if !errors.is_empty() {
        return Err(DeployError::usage(errors.join("\n")));
    }
    debug!(vaults = groups.len(), "secrets loaded");
    Ok(groups)
}

/// Windows installs each certificate into a named store, so every one must name it.
pub fn check_certificate_stores(
    groups: &[VaultSecretGroup],
    os_type: OsType,
) -> Result<(), DeployError> {
    if os_type != OsType::Windows {
        return Ok(());
    }

    let missing: Vec<String> = groups
        .iter()
        .flat_map(|group| {
            group
                .vault_certificates
                .iter()
                .filter(|certificate| certificate.certificate_store.is_none())
                .map(move |certificate| {
                    format!(
                        "certificate '{}' of vault '{}' is missing certificateStore, which Windows requires",
                        certificate.certificate_url, group.source_vault.id
                    )
                })
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DeployError::usage(missing.join("\n")))
    }
}

fn parse_group(
    scope: &ResourceScope,
    entry: &Value,
    index: usize,
    arg: usize,
) -> Result<VaultSecretGroup, Vec<String>> {
    let mut errors = Vec::new();

    let vault_id = match entry.get("sourceVault") {
        None => {
            errors.push(format!(
                "secret is missing sourceVault key at index {index} in arg {arg}"
            ));
            None
        }
        Some(vault) => match vault.get("id").and_then(Value::as_str) {
            None => {
                errors.push(format!(
                    "secret is missing sourceVault.id key at index {index} in arg {arg}"
                ));
                None
            }
            Some(id) => Some(resolve_resource_id(scope, id, "Microsoft.KeyVault", "vaults")),
        },
    };

    let mut vault_certificates = Vec::new();
    match entry
        .get("vaultCertificates")
        .and_then(Value::as_array)
        .filter(|certificates| !certificates.is_empty())
    {
        None => errors.push(format!(
            "secret is missing vaultCertificates array or it is empty at index {index} in arg {arg}"
        )),
        Some(certificates) => {
            for (position, certificate) in certificates.iter().enumerate() {
                let Some(url) = certificate.get("certificateUrl").and_then(Value::as_str) else {
                    errors.push(format!(
                        "secret is missing certificateUrl within vaultCertificates array at secret index {index} and vaultCertificate index {position} in arg {arg}"
                    ));
                    continue;
                };
                vault_certificates.push(VaultCertificate {
                    certificate_url: url.to_string(),
                    certificate_store: certificate
                        .get("certificateStore")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
            }
        }
    }

    match vault_id {
        Some(id) if errors.is_empty() => Ok(VaultSecretGroup {
            source_vault: SourceVault { id },
            vault_certificates,
        }),
        _ => Err(errors),
    }
}

fn merge(groups: &mut Vec<VaultSecretGroup>, group: VaultSecretGroup) {
    let vault = group.source_vault.id.to_string();
    match groups
        .iter_mut()
        .find(|existing| existing.source_vault.id.to_string().eq_ignore_ascii_case(&vault))
    {
        Some(existing) => existing.vault_certificates.extend(group.vault_certificates),
        None => groups.push(group),
    }
}
