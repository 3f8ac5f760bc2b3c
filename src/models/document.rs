use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{Map, Value, json};

use super::Secret;
use crate::error::DeployError;

const TEMPLATE_SCHEMA: &str =
    "https://schema.management.azure.com/schemas/2015-01-01/deploymentTemplate.json#";

/// One node of the deployment graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub api_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// `properties`, `sku`, `tags`, `identity` and the other top-level members.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl ResourceDefinition {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            api_version: api_version.into(),
            location: None,
            depends_on: Vec::new(),
            body: Map::new(),
        }
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Add a dependency on another resource of the document, see [`Self::key`].
    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.depends_on.contains(&key) {
            self.depends_on.push(key);
        }
        self
    }

    /// Set a top-level member; `null` values are skipped.
    pub fn with(mut self, member: &str, value: Value) -> Self {
        if !value.is_null() {
            self.body.insert(member.to_string(), value);
        }
        self
    }

    pub fn properties(self, properties: Value) -> Self {
        self.with("properties", properties)
    }

    /// Key other resources list in `dependsOn`, `{type}/{name}`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.resource_type, self.name)
    }

    /// Name of the copy loop this definition expands to, if any.
    pub fn copy_loop(&self) -> Option<&str> {
        self.body
            .get("copy")
            .and_then(|copy| copy.get("name"))
            .and_then(Value::as_str)
    }
}

/// Type of a declared template parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    SecureString,
}

/// Resources, parameters and outputs of one deployment.
///
/// Secret parameter values are kept apart from the template and only travel in the parameter
/// set handed to the deployment endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentDocument {
    resources: Vec<ResourceDefinition>,
    variables: Map<String, Value>,
    parameters: BTreeMap<String, ParameterType>,
    secure_values: BTreeMap<String, Secret>,
    outputs: BTreeMap<String, Value>,
}

impl DeploymentDocument {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_resource(&mut self, resource: ResourceDefinition) {
        self.resources.push(resource);
    }

    pub fn add_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    /// Declare a secure parameter and return the expression referencing it.
    pub fn add_secure_parameter(&mut self, name: &str, value: Secret) -> String {
        self.parameters
            .insert(name.to_string(), ParameterType::SecureString);
        self.secure_values.insert(name.to_string(), value);
        format!("[parameters('{name}')]")
    }

    pub fn add_output(&mut self, name: &str, value: Value) {
        self.outputs.insert(name.to_string(), value);
    }

    pub fn resources(&self) -> &[ResourceDefinition] {
        &self.resources
    }

    #[cfg(test)]
    pub fn find(&self, resource_type: &str) -> impl Iterator<Item = &ResourceDefinition> {
        self.resources
            .iter()
            .filter(move |resource| resource.resource_type.eq_ignore_ascii_case(resource_type))
    }

    /// Resources ordered so each one follows everything it depends on.
    ///
    /// Insertion order is kept wherever the dependencies allow it. A dependency on a resource the
    /// document does not contain, or a cycle, is an error.
    pub fn ordered_resources(&self) -> Result<Vec<&ResourceDefinition>, DeployError> {
        // a copy loop is addressed by its loop name
        let mut index: HashMap<String, usize> = HashMap::new();
        for (position, resource) in self.resources.iter().enumerate() {
            index.insert(resource.key().to_ascii_lowercase(), position);
            if let Some(copy_loop) = resource.copy_loop() {
                index.insert(copy_loop.to_ascii_lowercase(), position);
            }
        }

        let mut pending_dependencies = Vec::with_capacity(self.resources.len());
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.resources.len()];
        for (position, resource) in self.resources.iter().enumerate() {
            for dependency in &resource.depends_on {
                let Some(&target) = index.get(&dependency.to_ascii_lowercase()) else {
                    return Err(DeployError::InvalidTemplate(format!(
                        "'{}' depends on '{dependency}', which is not part of the deployment",
                        resource.key()
                    )));
                };
                dependents[target].push(position);
            }
            pending_dependencies.push(resource.depends_on.len());
        }

        let mut ordered = Vec::with_capacity(self.resources.len());
        let mut placed = vec![false; self.resources.len()];
        while ordered.len() < self.resources.len() {
            let Some(next) = (0..self.resources.len())
                .find(|&position| !placed[position] && pending_dependencies[position] == 0)
            else {
                let cycle: Vec<String> = (0..self.resources.len())
                    .filter(|&position| !placed[position])
                    .map(|position| self.resources[position].key())
                    .collect();
                return Err(DeployError::InvalidTemplate(format!(
                    "dependency cycle between {}",
                    cycle.join(", ")
                )));
            };

            placed[next] = true;
            for &dependent in &dependents[next] {
                pending_dependencies[dependent] -= 1;
            }
            ordered.push(&self.resources[next]);
        }

        Ok(ordered)
    }

    /// The template body. Contains parameter declarations but never their secret values.
    pub fn template(&self) -> Result<Value, DeployError> {
        let resources = self.ordered_resources()?;
        let parameters: Map<String, Value> = self
            .parameters
            .iter()
            .map(|(name, parameter_type)| (name.clone(), json!({ "type": parameter_type })))
            .collect();

        Ok(json!({
            "$schema": TEMPLATE_SCHEMA,
            "contentVersion": "1.0.0.0",
            "parameters": parameters,
            "variables": self.variables,
            "resources": resources,
            "outputs": self.outputs,
        }))
    }

    /// Values of the secure parameters, in the shape the deployment endpoint expects.
    pub fn parameter_values(&self) -> Value {
        let values: Map<String, Value> = self
            .secure_values
            .iter()
            .map(|(name, secret)| (name.clone(), json!({ "value": secret.expose() })))
            .collect();
        Value::Object(values)
    }

    /// Request body of the validate and create endpoints.
    pub fn deployment_body(&self) -> Result<Value, DeployError> {
        Ok(json!({
            "properties": {
                "mode": "Incremental",
                "template": self.template()?,
                "parameters": self.parameter_values(),
            }
        }))
    }
}
