use std::{fmt::Display, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::{error::DeployError, models::ResourceId};

static SHARED_GALLERY_IMAGE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^/SharedGalleries/([^/]+)/Images/([^/]+)/Versions/[^/]+$")
        .expect("invalid shared gallery regex")
});

static COMMUNITY_GALLERY_IMAGE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^/CommunityGalleries/([^/]+)/Images/([^/]+)/Versions/[^/]+$")
        .expect("invalid community gallery regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OsType {
    Linux,
    Windows,
}

impl OsType {
    /// Value used in templates.
    pub fn template_name(self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::Windows => "Windows",
        }
    }

    /// Marketplace images do not declare an os type, infer it from the offer.
    pub fn from_offer(offer: &str) -> Self {
        if offer.to_ascii_lowercase().contains("windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }
}

impl FromStr for OsType {
    type Err = DeployError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            _ => Err(DeployError::usage(format!("unknown os type '{value}'"))),
        }
    }
}

impl Display for OsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::Windows => write!(f, "windows"),
        }
    }
}

/// Marketplace image reference `publisher:offer:sku:version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageUrn {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

impl ImageUrn {
    pub fn new(
        publisher: impl Into<String>,
        offer: impl Into<String>,
        sku: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            publisher: publisher.into(),
            offer: offer.into(),
            sku: sku.into(),
            version: version.into(),
        }
    }

    /// Parse exactly four `:`-separated segments.
    pub fn parse(value: &str) -> Option<Self> {
        let parts: Vec<&str> = value.split(':').collect();
        match parts.as_slice() {
            [publisher, offer, sku, version] => {
                Some(Self::new(*publisher, *offer, *sku, *version))
            }
            _ => None,
        }
    }

    pub fn is_latest(&self) -> bool {
        self.version.eq_ignore_ascii_case("latest")
    }
}

impl Display for ImageUrn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.publisher, self.offer, self.sku, self.version
        )
    }
}

/// Purchase plan attached to some marketplace images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePlan {
    pub name: String,
    pub product: String,
    pub publisher: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion_code: Option<String>,
}

/// Gallery image reachable without owning the gallery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicGalleryImage {
    pub id: String,
    pub gallery: String,
    pub image: String,
}

impl PublicGalleryImage {
    fn capture(regex: &Regex, value: &str) -> Option<Self> {
        let captures = regex.captures(value)?;
        Some(Self {
            id: value.to_string(),
            gallery: captures[1].to_string(),
            image: captures[2].to_string(),
        })
    }

    pub fn parse_shared(value: &str) -> Option<Self> {
        Self::capture(&SHARED_GALLERY_IMAGE_ID, value)
    }

    pub fn parse_community(value: &str) -> Option<Self> {
        Self::capture(&COMMUNITY_GALLERY_IMAGE_ID, value)
    }
}

/// Where the OS disk image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Managed image or gallery image (version) in a resource group.
    ManagedImage(ResourceId),
    SharedGallery(PublicGalleryImage),
    CommunityGallery(PublicGalleryImage),
    Marketplace(ImageUrn),
    /// Generalized VHD blob.
    VhdUri(Url),
}

impl ImageSource {
    /// Classify an image reference purely by its syntax.
    ///
    /// Returns `None` for anything that needs a lookup (aliases, bare image names).
    pub fn classify(value: &str) -> Option<Self> {
        if let Some(id) = ResourceId::parse(value) {
            return Some(Self::ManagedImage(id));
        }
        if let Some(image) = PublicGalleryImage::parse_shared(value) {
            return Some(Self::SharedGallery(image));
        }
        if let Some(image) = PublicGalleryImage::parse_community(value) {
            return Some(Self::CommunityGallery(image));
        }
        if let Some(urn) = ImageUrn::parse(value) {
            return Some(Self::Marketplace(urn));
        }
        if value.contains("://") {
            if let Ok(url) = Url::parse(value) {
                return Some(Self::VhdUri(url));
            }
        }
        None
    }
}

/// One entry of the alias document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAlias {
    pub urn_alias: String,
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
    pub os_type: OsType,
}

impl ImageAlias {
    pub fn urn(&self) -> ImageUrn {
        ImageUrn::new(&self.publisher, &self.offer, &self.sku, &self.version)
    }

    /// Parse the published alias document (`outputs.aliases.value.{Linux,Windows}`).
    pub fn parse_document(document: &str) -> Result<Vec<Self>, String> {
        #[derive(Deserialize)]
        struct Entry {
            publisher: String,
            offer: String,
            sku: String,
            version: String,
        }

        let document: Value = serde_json::from_str(document).map_err(|e| e.to_string())?;
        let groups = document
            .pointer("/outputs/aliases/value")
            .and_then(Value::as_object)
            .ok_or_else(|| "missing outputs.aliases.value".to_string())?;

        let mut aliases = Vec::new();
        for (group, entries) in groups {
            let os_type = OsType::from_str(group).map_err(|e| e.to_string())?;
            let entries: std::collections::BTreeMap<String, Entry> =
                serde_json::from_value(entries.clone()).map_err(|e| e.to_string())?;
            aliases.extend(entries.into_iter().map(|(urn_alias, entry)| Self {
                urn_alias,
                publisher: entry.publisher,
                offer: entry.offer,
                sku: entry.sku,
                version: entry.version,
                os_type,
            }));
        }

        Ok(aliases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urn_requires_exactly_four_segments() {
        assert_eq!(
            ImageUrn::parse("Canonical:UbuntuServer:18.04-LTS:latest"),
            Some(ImageUrn::new("Canonical", "UbuntuServer", "18.04-LTS", "latest"))
        );
        assert_eq!(ImageUrn::parse("Canonical:UbuntuServer:18.04-LTS"), None);
        assert_eq!(ImageUrn::parse("a:b:c:d:e"), None);
    }

    #[test]
    fn test_classify_by_syntax() {
        assert!(matches!(
            ImageSource::classify(
                "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/images/img"
            ),
            Some(ImageSource::ManagedImage(_))
        ));
        assert!(matches!(
            ImageSource::classify("/SharedGalleries/g1/Images/i1/Versions/1.0.0"),
            Some(ImageSource::SharedGallery(PublicGalleryImage { ref gallery, .. })) if gallery == "g1"
        ));
        assert!(matches!(
            ImageSource::classify("/communitygalleries/g2/images/i2/versions/latest"),
            Some(ImageSource::CommunityGallery(PublicGalleryImage { ref image, .. })) if image == "i2"
        ));
        assert!(matches!(
            ImageSource::classify("Canonical:UbuntuServer:18.04:latest"),
            Some(ImageSource::Marketplace(_))
        ));
        assert!(matches!(
            ImageSource::classify("https://account.blob.core.windows.net/vhds/image.vhd"),
            Some(ImageSource::VhdUri(_))
        ));
        assert_eq!(ImageSource::classify("UbuntuLTS"), None);
    }

    #[test]
    fn test_os_type_from_offer() {
        assert_eq!(OsType::from_offer("WindowsServer"), OsType::Windows);
        assert_eq!(OsType::from_offer("UbuntuServer"), OsType::Linux);
    }

    #[test]
    fn test_parse_alias_document() {
        let document = r#"{
            "outputs": {
                "aliases": {
                    "value": {
                        "Linux": {
                            "UbuntuLTS": {"publisher": "Canonical", "offer": "UbuntuServer", "sku": "18.04-LTS", "version": "latest"}
                        },
                        "Windows": {
                            "Win2019Datacenter": {"publisher": "MicrosoftWindowsServer", "offer": "WindowsServer", "sku": "2019-Datacenter", "version": "latest"}
                        }
                    }
                }
            }
        }"#;

        let aliases = ImageAlias::parse_document(document).unwrap();

        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases[0].urn_alias, "UbuntuLTS");
        assert_eq!(aliases[0].os_type, OsType::Linux);
        assert_eq!(
            aliases[1].urn().to_string(),
            "MicrosoftWindowsServer:WindowsServer:2019-Datacenter:latest"
        );
    }

    #[test]
    fn test_bundled_alias_document_parses() {
        let aliases = ImageAlias::parse_document(crate::models::BUNDLED_ALIAS_DOCUMENT).unwrap();

        assert!(aliases.iter().any(|alias| alias.urn_alias == "UbuntuLTS"));
    }
}
