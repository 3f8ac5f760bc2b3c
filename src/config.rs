//! Invocation settings.
//!
//! Settings come from the global CLI flags (which also read `VMFORGE_*` environment variables)
//! and an optional JSON config file. Flags win over the file, the file wins over defaults.
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{args::GlobalArgs, dependencies::FileReader};

pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com/";
pub const DEFAULT_ALIAS_DOCUMENT_URL: &str = "https://raw.githubusercontent.com/Azure/azure-rest-api-specs/master/arm-compute/quickstart-templates/aliases.json";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Pinned API versions, one per provider.
///
/// Templates are emitted against these versions, so changing one changes the document shape
/// only when the operator asks for it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiVersions {
    pub compute: String,
    pub network: String,
    pub storage: String,
    pub deployments: String,
    pub authorization: String,
    pub resource_groups: String,
    pub managed_identity: String,
    pub operational_insights: String,
    pub extensions: String,
}

impl Default for ApiVersions {
    fn default() -> Self {
        Self {
            compute: "2023-03-01".to_string(),
            network: "2022-11-01".to_string(),
            storage: "2022-09-01".to_string(),
            deployments: "2022-09-01".to_string(),
            authorization: "2022-04-01".to_string(),
            resource_groups: "2022-09-01".to_string(),
            managed_identity: "2023-01-31".to_string(),
            operational_insights: "2022-10-01".to_string(),
            extensions: "2023-03-01".to_string(),
        }
    }
}

impl ApiVersions {
    /// Version used to read resources of a provider namespace.
    pub fn for_namespace(&self, namespace: &str) -> &str {
        match namespace.to_ascii_lowercase().as_str() {
            "microsoft.compute" => &self.compute,
            "microsoft.network" => &self.network,
            "microsoft.storage" => &self.storage,
            "microsoft.authorization" => &self.authorization,
            "microsoft.managedidentity" => &self.managed_identity,
            "microsoft.operationalinsights" => &self.operational_insights,
            _ => &self.resource_groups,
        }
    }
}

/// Shape of the optional config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigFile {
    pub endpoint: Option<Url>,
    pub alias_document_url: Option<Url>,
    /// Human readable duration, e.g. `"5s"` or `"500ms"`.
    pub poll_interval: Option<String>,
    pub api_versions: ApiVersions,
}

impl ConfigFile {
    pub fn parse(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("parsing config file")
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub subscription_id: String,
    pub access_token: String,
    pub endpoint: Url,
    pub alias_document_url: Url,
    pub poll_interval: Duration,
    pub api_versions: ApiVersions,
}

impl Settings {
    /// Load the settings for this invocation, reading the config file when one is configured.
    pub async fn load(args: &GlobalArgs, files: &(dyn FileReader + Send + Sync)) -> Result<Self> {
        let config_file = match &args.config {
            Some(path) => {
                debug!(path = %path.display(), "reading config file");
                let contents = files.read_to_string(path).await?;
                Some(ConfigFile::parse(&contents)?)
            }
            None => None,
        };

        Self::from_parts(args, config_file)
    }

    pub fn from_parts(args: &GlobalArgs, config_file: Option<ConfigFile>) -> Result<Self> {
        let config_file = config_file.unwrap_or_default();

        let subscription_id = args.subscription.clone().ok_or_else(|| {
            anyhow!("no subscription configured, pass --subscription or set VMFORGE_SUBSCRIPTION")
        })?;
        let access_token = args.access_token.clone().ok_or_else(|| {
            anyhow!("no access token configured, pass --access-token or set VMFORGE_ACCESS_TOKEN")
        })?;

        let endpoint = match args.endpoint.clone().or(config_file.endpoint) {
            Some(endpoint) => endpoint,
            None => Url::parse(DEFAULT_ENDPOINT).context("parsing default endpoint")?,
        };
        let alias_document_url = match config_file.alias_document_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_ALIAS_DOCUMENT_URL)
                .context("parsing default alias document url")?,
        };
        let poll_interval = match config_file.poll_interval {
            Some(value) => duration_str::parse(&value)
                .map_err(|e| anyhow!("invalid pollInterval '{value}': {e}"))?,
            None => DEFAULT_POLL_INTERVAL,
        };

        Ok(Self {
            subscription_id,
            access_token,
            endpoint,
            alias_document_url,
            poll_interval,
            api_versions: config_file.api_versions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependencies::mocks::MockTokioFs;
    use std::path::{Path, PathBuf};

    fn global_args() -> GlobalArgs {
        GlobalArgs {
            debug: false,
            format: None,
            subscription: Some("sub-1".to_string()),
            access_token: Some("token".to_string()),
            endpoint: None,
            config: None,
        }
    }

    #[test]
    fn test_defaults_without_config_file() {
        let settings = Settings::from_parts(&global_args(), None).unwrap();

        assert_eq!(settings.subscription_id, "sub-1");
        assert_eq!(settings.endpoint.as_str(), DEFAULT_ENDPOINT);
        assert_eq!(settings.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(settings.api_versions, ApiVersions::default());
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let config = ConfigFile::parse(
            r#"{
                "endpoint": "https://management.example.com/",
                "pollInterval": "250ms",
                "apiVersions": { "compute": "2022-08-01" }
            }"#,
        )
        .unwrap();

        let settings = Settings::from_parts(&global_args(), Some(config)).unwrap();

        assert_eq!(settings.endpoint.as_str(), "https://management.example.com/");
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.api_versions.compute, "2022-08-01");
        // unspecified versions keep their pinned default
        assert_eq!(settings.api_versions.network, ApiVersions::default().network);
    }

    #[test]
    fn test_flag_endpoint_wins_over_config_file() {
        let mut args = global_args();
        args.endpoint = Some(Url::parse("https://flag.example.com/").unwrap());
        let config = ConfigFile::parse(r#"{"endpoint": "https://file.example.com/"}"#).unwrap();

        let settings = Settings::from_parts(&args, Some(config)).unwrap();

        assert_eq!(settings.endpoint.as_str(), "https://flag.example.com/");
    }

    #[test]
    fn test_missing_subscription_is_an_error() {
        let mut args = global_args();
        args.subscription = None;

        let error = Settings::from_parts(&args, None).unwrap_err();

        assert!(error.to_string().contains("--subscription"));
    }

    #[test]
    fn test_api_version_for_namespace() {
        let versions = ApiVersions::default();

        assert_eq!(versions.for_namespace("Microsoft.Compute"), versions.compute);
        assert_eq!(versions.for_namespace("microsoft.network"), versions.network);
        assert_eq!(versions.for_namespace("Microsoft.Resources"), versions.resource_groups);
    }

    #[test]
    fn test_invalid_poll_interval_is_an_error() {
        let config = ConfigFile::parse(r#"{"pollInterval": "soon"}"#).unwrap();

        assert!(Settings::from_parts(&global_args(), Some(config)).is_err());
    }

    #[tokio::test]
    async fn test_load_reads_config_file() {
        let mut args = global_args();
        args.config = Some(PathBuf::from("/etc/vmforge.json"));

        let mut files = MockTokioFs::new();
        files
            .expect_read_to_string()
            .withf(|path| path == Path::new("/etc/vmforge.json"))
            .return_once(|_| Ok(r#"{"pollInterval": "1s"}"#.to_string()));

        let settings = Settings::load(&args, &files).await.unwrap();

        assert_eq!(settings.poll_interval, Duration::from_secs(1));
    }
}
