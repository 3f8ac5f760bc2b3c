//! Command to list marketplace images.
//!
//! Without `--all` only the curated aliases are listed, which needs no location and is fast.
//! With `--all` the whole marketplace of a location is walked.
use std::fmt::Display;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, trace};

use crate::{
    args,
    catalog::{self, Catalog, CatalogFilter, CatalogImage},
    commands::CommandWithOutput,
    config::Settings,
    dependencies::ArmClient,
    error::DeployError,
    interaction::{Interaction, SpinnerInteraction},
    table::{Table, TableColumn},
};

use super::ImageManagement;

pub struct List {
    location: Option<String>,
    all: bool,
    filter: CatalogFilter,

    subscription_id: String,
    api_version: String,

    interaction: Box<dyn SpinnerInteraction + Send + Sync>,
    management: Box<dyn ImageManagement + Send + Sync>,
}

impl List {
    pub fn new(args: args::ImageList, settings: &Settings) -> Self {
        Self {
            location: args.location,
            all: args.all,
            filter: CatalogFilter {
                publisher: args.publisher,
                offer: args.offer,
                sku: args.sku,
            },

            subscription_id: settings.subscription_id.clone(),
            api_version: settings.api_versions.compute.clone(),

            interaction: Box::new(Interaction::new()),
            management: Box::new(ArmClient::new(settings)),
        }
    }
}

/// Newtype so the listing can render as a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ListResult(Vec<CatalogImage>);

const ALIAS_COLUMNS: &[TableColumn<&str, CatalogImage>] = &[
    ("ALIAS", |i: &CatalogImage| i.urn_alias.clone().unwrap_or_default()),
    ("PUBLISHER", |i: &CatalogImage| i.publisher.clone()),
    ("OFFER", |i: &CatalogImage| i.offer.clone()),
    ("SKU", |i: &CatalogImage| i.sku.clone()),
    ("URN", |i: &CatalogImage| i.urn.clone()),
];

const IMAGE_COLUMNS: &[TableColumn<&str, CatalogImage>] = &[
    ("PUBLISHER", |i: &CatalogImage| i.publisher.clone()),
    ("OFFER", |i: &CatalogImage| i.offer.clone()),
    ("SKU", |i: &CatalogImage| i.sku.clone()),
    ("VERSION", |i: &CatalogImage| i.version.clone()),
    ("URN", |i: &CatalogImage| i.urn.clone()),
];

impl From<&ListResult> for Table {
    fn from(value: &ListResult) -> Self {
        let columns = if value.0.iter().any(|image| image.urn_alias.is_some()) {
            ALIAS_COLUMNS
        } else {
            IMAGE_COLUMNS
        };
        Table::from_iter(&value.0, columns)
    }
}

impl Display for ListResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Table::from(self).fmt(f)
    }
}

#[async_trait]
impl CommandWithOutput for List {
    type Output = ListResult;

    async fn execute(&mut self) -> Result<Self::Output> {
        trace!(location = ?self.location, all = self.all, filter = ?self.filter, "executing image list command");

        if !self.all {
            info!("listing image aliases, use --all to list every marketplace image");
            let images = catalog::list_aliases(&*self.management, &self.filter).await;
            return Ok(ListResult(images));
        }

        let location = self
            .location
            .as_deref()
            .ok_or_else(|| DeployError::usage("--location is required with --all"))?;

        let _spinner = self
            .interaction
            .start_spinner("Listing marketplace images...".to_string())?;
        let catalog = Catalog {
            resources: &*self.management,
            subscription_id: &self.subscription_id,
            api_version: &self.api_version,
        };
        let images = catalog.list_all(location, &self.filter).await?;

        Ok(ListResult(images))
    }
}
