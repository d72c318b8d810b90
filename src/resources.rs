//! Resources and resource templates.
//!
//! Only the generated adapter registers any; the manual adapter publishes
//! tools alone.

use std::collections::HashMap;
use std::sync::Arc;

use percent_encoding::percent_decode_str;

use crate::error::{Error, Result};
use crate::protocol::{ReadResourceResult, ResourceDefinition, ResourceTemplateDefinition};

/// A readable resource with a fixed URI.
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// Listing entry.
    fn definition(&self) -> ResourceDefinition;

    /// Read the resource.
    async fn read(&self) -> Result<ReadResourceResult>;
}

/// A family of resources addressed by a URI template.
#[async_trait::async_trait]
pub trait ResourceTemplate: Send + Sync {
    /// Listing entry.
    fn definition(&self) -> ResourceTemplateDefinition;

    /// Read the resource identified by `uri` with the variables bound from it.
    async fn read(&self, uri: &str, variables: HashMap<String, String>)
        -> Result<ReadResourceResult>;
}

/// Registry of resources and templates.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: Vec<Arc<dyn Resource>>,
    templates: Vec<Arc<dyn ResourceTemplate>>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fixed resource.
    pub fn register_resource(&mut self, resource: Arc<dyn Resource>) {
        self.resources.push(resource);
    }

    /// Register a template.
    pub fn register_template(&mut self, template: Arc<dyn ResourceTemplate>) {
        self.templates.push(template);
    }

    /// Resource listing entries.
    pub fn list_resources(&self) -> Vec<ResourceDefinition> {
        self.resources.iter().map(|r| r.definition()).collect()
    }

    /// Template listing entries.
    pub fn list_templates(&self) -> Vec<ResourceTemplateDefinition> {
        self.templates.iter().map(|t| t.definition()).collect()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.templates.is_empty()
    }

    /// Read a resource by URI. Fixed resources are tried before templates.
    pub async fn read(&self, uri: &str) -> Result<ReadResourceResult> {
        if let Some(resource) = self
            .resources
            .iter()
            .find(|r| r.definition().uri == uri)
            .cloned()
        {
            return resource.read().await;
        }

        for template in &self.templates {
            if let Some(vars) = match_uri_template(&template.definition().uri_template, uri) {
                return template.read(uri, vars).await;
            }
        }

        Err(Error::ResourceNotFound(uri.to_string()))
    }
}

/// Match a level-1 URI template (`scheme://name/{a}/{b}`) against a URI.
///
/// Each `{var}` binds exactly one non-empty `/`-free segment, percent-decoded.
pub fn match_uri_template(template: &str, uri: &str) -> Option<HashMap<String, String>> {
    let mut vars = HashMap::new();
    let mut rest = uri;
    let mut tpl = template;

    while !tpl.is_empty() {
        match tpl.find('{') {
            Some(open) => {
                let literal = &tpl[..open];
                rest = rest.strip_prefix(literal)?;
                let close = tpl[open..].find('}')? + open;
                let name = &tpl[open + 1..close];
                tpl = &tpl[close + 1..];

                let end = rest.find('/').unwrap_or(rest.len());
                let value = &rest[..end];
                if value.is_empty() {
                    return None;
                }
                let value = percent_decode_str(value).decode_utf8_lossy().into_owned();
                vars.insert(name.to_string(), value);
                rest = &rest[end..];
            }
            None => {
                rest = rest.strip_prefix(tpl)?;
                tpl = "";
            }
        }
    }

    rest.is_empty().then_some(vars)
}
