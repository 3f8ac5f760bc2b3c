//! Marketplace image catalog.
//!
//! Enumerating every image of a location walks publishers → offers → skus → versions. Publishers
//! are independent, so they are walked by a bounded pool of workers.
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    dependencies::{AliasDocumentSource, ResourceReader},
    error::DeployError,
    models::{ImageAlias, ImageUrn},
    resolvers::image::{
        compare_versions, load_aliases, marketplace_path, marketplace_version_path,
        resolve_latest_version,
    },
};

/// Publishers walked at the same time.
pub const CATALOG_WORKERS: usize = 5;

/// Case-insensitive substring filters; `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub publisher: Option<String>,
    pub offer: Option<String>,
    pub sku: Option<String>,
}

impl CatalogFilter {
    fn matches(filter: &Option<String>, value: &str) -> bool {
        filter
            .as_deref()
            .is_none_or(|filter| value.to_lowercase().contains(&filter.to_lowercase()))
    }

    fn matches_image(&self, publisher: &str, offer: &str, sku: &str) -> bool {
        Self::matches(&self.publisher, publisher)
            && Self::matches(&self.offer, offer)
            && Self::matches(&self.sku, sku)
    }
}

/// One row of an image listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogImage {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
    pub urn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urn_alias: Option<String>,
}

impl CatalogImage {
    fn new(urn: ImageUrn, urn_alias: Option<String>) -> Self {
        Self {
            urn: urn.to_string(),
            publisher: urn.publisher,
            offer: urn.offer,
            sku: urn.sku,
            version: urn.version,
            urn_alias,
        }
    }
}

/// Read access to the marketplace of one subscription.
pub struct Catalog<'a> {
    pub resources: &'a (dyn ResourceReader + Send + Sync),
    pub subscription_id: &'a str,
    pub api_version: &'a str,
}

impl Catalog<'_> {
    /// Every image version in `location` that passes `filter`, sorted.
    ///
    /// All publisher walks run to completion; the first failure among them is returned afterwards.
    pub async fn list_all(
        &self,
        location: &str,
        filter: &CatalogFilter,
    ) -> Result<Vec<CatalogImage>, DeployError> {
        let publishers: Vec<String> = self
            .names(&format!("{}/publishers", marketplace_path(self.subscription_id, location, &[])))
            .await?
            .into_iter()
            .filter(|publisher| CatalogFilter::matches(&filter.publisher, publisher))
            .collect();
        debug!(%location, publishers = publishers.len(), "walking image publishers");

        let results: Vec<Result<Vec<CatalogImage>, DeployError>> = stream::iter(
            publishers
                .iter()
                .map(|publisher| self.list_publisher(location, publisher, filter))
                .collect::<Vec<_>>(),
        )
        .buffer_unordered(CATALOG_WORKERS)
            .collect()
            .await;

        let mut images = Vec::new();
        for result in results {
            images.extend(result?);
        }
        sort_images(&mut images);
        Ok(images)
    }

    async fn list_publisher(
        &self,
        location: &str,
        publisher: &str,
        filter: &CatalogFilter,
    ) -> Result<Vec<CatalogImage>, DeployError> {
        trace!(%publisher, "listing offers");
        let publisher_path = marketplace_path(
            self.subscription_id,
            location,
            &[("publishers", publisher), ("artifacttypes", "vmimage")],
        );

        let mut images = Vec::new();
        let offers = self.names(&format!("{publisher_path}/offers")).await?;
        for offer in offers
            .iter()
            .filter(|offer| CatalogFilter::matches(&filter.offer, offer))
        {
            let skus = self
                .names(&format!("{publisher_path}/offers/{offer}/skus"))
                .await?;
            for sku in skus
                .iter()
                .filter(|sku| CatalogFilter::matches(&filter.sku, sku))
            {
                let versions = self
                    .names(&format!("{publisher_path}/offers/{offer}/skus/{sku}/versions"))
                    .await?;
                images.extend(versions.into_iter().map(|version| {
                    CatalogImage::new(ImageUrn::new(publisher, offer, sku, version), None)
                }));
            }
        }

        Ok(images)
    }

    /// One published image version; `latest` picks the newest one.
    pub async fn show(&self, location: &str, urn: &ImageUrn) -> Result<Value, DeployError> {
        let urn = resolve_latest_version(
            self.resources,
            self.subscription_id,
            self.api_version,
            location,
            urn,
        )
        .await?;

        let path = marketplace_version_path(self.subscription_id, location, &urn);
        self.resources
            .get(&path, self.api_version)
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => DeployError::resolution(
                    format!("image \"{urn}\" was not found in {location}"),
                    &["marketplace"],
                ),
                e => e.into(),
            })
    }

    async fn names(&self, path: &str) -> Result<Vec<String>, DeployError> {
        let items = self.resources.list(path, self.api_version).await?;
        Ok(items
            .iter()
            .filter_map(|item| item.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }
}

/// Aliases passing `filter`, from the published document or the bundled copy.
pub async fn list_aliases(
    source: &(dyn AliasDocumentSource + Send + Sync),
    filter: &CatalogFilter,
) -> Vec<CatalogImage> {
    let mut images: Vec<CatalogImage> = load_aliases(source)
        .await
        .into_iter()
        .filter(|alias| filter.matches_image(&alias.publisher, &alias.offer, &alias.sku))
        .map(|alias: ImageAlias| {
            let urn = alias.urn();
            CatalogImage::new(urn, Some(alias.urn_alias))
        })
        .collect();
    sort_images(&mut images);
    images
}

fn sort_images(images: &mut [CatalogImage]) {
    images.sort_by(|left, right| {
        left.publisher
            .cmp(&right.publisher)
            .then_with(|| left.offer.cmp(&right.offer))
            .then_with(|| left.sku.cmp(&right.sku))
            .then_with(|| compare_versions(&left.version, &right.version))
    });
}
