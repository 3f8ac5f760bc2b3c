//! This module contains the formatting logic for the application.
//!
//! The main entry point is the [`Formattable`] trait which provides a method to format an object as text or json.
use std::fmt::Display;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

/// Format of the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum Format {
    #[default]
    Text,
    Json,
}

/// Trait for types that can be formatted as text or JSON.
///
/// Types implementing both [`Display`] and [`Serialize`] automatically get a default implementation.
pub trait Formattable {
    /// Format the output of the object as text or json.
    fn format(&self, format: Format) -> Result<String>;
}

/// When text is requested, the object is converted to a string using the [`Display`] trait.
/// When JSON is requested, the object is serialized as pretty-printed JSON, since most outputs
/// are nested resource documents meant to be read by people as well as tools.
impl<T> Formattable for T
where
    T: Display + Serialize,
{
    fn format(&self, format: Format) -> Result<String> {
        Ok(match format {
            Format::Text => self.to_string(),
            Format::Json => serde_json::to_string_pretty(self).context("serializing to json")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Accepted {
        deployment_name: String,
        resource_group: String,
    }

    impl Display for Accepted {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(
                f,
                "Deployment {} accepted in {}",
                self.deployment_name, self.resource_group
            )
        }
    }

    fn accepted() -> Accepted {
        Accepted {
            deployment_name: "vm_deploy_1".to_string(),
            resource_group: "rg".to_string(),
        }
    }

    #[test]
    fn test_format_text() {
        let result = accepted().format(Format::Text).unwrap();
        assert_eq!(result, "Deployment vm_deploy_1 accepted in rg");
    }

    #[test]
    fn test_format_json_is_pretty() {
        let result = accepted().format(Format::Json).unwrap();
        assert_eq!(
            result,
            "{\n  \"deploymentName\": \"vm_deploy_1\",\n  \"resourceGroup\": \"rg\"\n}"
        );
    }

    #[test]
    fn test_default_format_is_text() {
        assert_eq!(Format::default(), Format::Text);
    }
}
