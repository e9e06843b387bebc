//! Query parser configuration options

use cinder_core::{resolved_ancestor_properties, EdgeType, Error, Result, Section};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Options for parsing and rewriting queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Edge type of navigations that do not name one
    pub default_edge_type: String,

    /// Edge types a query may traverse
    pub allowed_edge_types: BTreeSet<String>,

    /// Section that property paths are relative to
    pub section: String,

    /// Ancestor properties materialized on every node. Filters on them never
    /// need a merge query.
    pub resolved_properties: BTreeSet<String>,
}

impl QueryOptions {
    /// Options that interpret paths relative to the given section
    pub fn new(section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            ..Default::default()
        }
    }

    /// Options that interpret paths as absolute
    pub fn on_root() -> Self {
        Self::new(Section::PATH_ROOT)
    }

    /// Load options from a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: QueryOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Set the edge type used when a query does not specify one
    pub fn default_edge_type(mut self, edge_type: impl Into<String>) -> Self {
        self.default_edge_type = edge_type.into();
        self
    }

    /// Allow an additional edge type
    pub fn allow_edge_type(mut self, edge_type: impl Into<String>) -> Self {
        self.allowed_edge_types.insert(edge_type.into());
        self
    }

    /// Set the properties that never require a merge query
    pub fn resolved_properties(mut self, properties: BTreeSet<String>) -> Self {
        self.resolved_properties = properties;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.allowed_edge_types.contains(&self.default_edge_type) {
            return Err(Error::Configuration(format!(
                "Default edge type {} is not one of the allowed edge types {:?}",
                self.default_edge_type, self.allowed_edge_types
            )));
        }
        Ok(())
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            default_edge_type: EdgeType::DEFAULT.to_string(),
            allowed_edge_types: EdgeType::allowed(),
            section: Section::REPORTED.to_string(),
            resolved_properties: resolved_ancestor_properties(),
        }
    }
}
