//! Command to show one marketplace image version.
use std::fmt::Display;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::{
    args,
    catalog::Catalog,
    commands::CommandWithOutput,
    config::Settings,
    dependencies::{ArmClient, ResourceReader},
    error::DeployError,
    models::ImageUrn,
};

pub struct Show {
    location: String,
    urn: ImageUrn,

    subscription_id: String,
    api_version: String,

    resources: Box<dyn ResourceReader + Send + Sync>,
}

impl Show {
    pub fn new(args: args::ImageShow, settings: &Settings) -> Result<Self> {
        Ok(Self {
            urn: image_urn(&args)?,
            location: args.location,

            subscription_id: settings.subscription_id.clone(),
            api_version: settings.api_versions.compute.clone(),

            resources: Box::new(ArmClient::new(settings)),
        })
    }
}

/// Either `--urn` or all four discrete parts, never both.
fn image_urn(args: &args::ImageShow) -> Result<ImageUrn, DeployError> {
    let parts = [&args.publisher, &args.offer, &args.sku, &args.version];
    let usage = || DeployError::usage("--urn URN | --publisher P --offer O --sku S --version V");

    match (&args.urn, parts) {
        (Some(_), parts) if parts.iter().any(|part| part.is_some()) => Err(usage()),
        (Some(urn), _) => ImageUrn::parse(urn).ok_or_else(|| {
            DeployError::usage(format!(
                "invalid urn '{urn}', expected publisher:offer:sku:version"
            ))
        }),
        (None, [Some(publisher), Some(offer), Some(sku), Some(version)]) => {
            Ok(ImageUrn::new(publisher, offer, sku, version))
        }
        (None, _) => Err(usage()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ShowResult(Value);

impl Display for ShowResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = |pointer: &str| self.0.pointer(pointer).and_then(Value::as_str);

        writeln!(f, "Name:              {}", text("/name").unwrap_or_default())?;
        writeln!(f, "Location:          {}", text("/location").unwrap_or_default())?;
        if let Some(os) = text("/properties/osDiskImage/operatingSystem") {
            writeln!(f, "Operating system:  {os}")?;
        }
        if let Some(generation) = text("/properties/hyperVGeneration") {
            writeln!(f, "Generation:        {generation}")?;
        }
        if let Some(architecture) = text("/properties/architecture") {
            writeln!(f, "Architecture:      {architecture}")?;
        }
        if let Some(plan) = self.0.pointer("/properties/plan") {
            let part = |key: &str| plan.get(key).and_then(Value::as_str).unwrap_or_default();
            writeln!(
                f,
                "Plan:              {} / {} / {}",
                part("publisher"),
                part("product"),
                part("name")
            )?;
        }
        let data_disks = self
            .0
            .pointer("/properties/dataDiskImages")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or_default();
        write!(f, "Data disk images:  {data_disks}")
    }
}

#[async_trait]
impl CommandWithOutput for Show {
    type Output = ShowResult;

    async fn execute(&mut self) -> Result<Self::Output> {
        trace!(location = %self.location, urn = %self.urn, "executing image show command");

        let catalog = Catalog {
            resources: &*self.resources,
            subscription_id: &self.subscription_id,
            api_version: &self.api_version,
        };
        let image = catalog.show(&self.location, &self.urn).await?;

        Ok(ShowResult(image))
    }
}
