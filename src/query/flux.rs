//! Generated query
//!
//! The translated query text together with the request shape the backend
//! expects when the query is posted as JSON.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Annotations requested from the backend's CSV response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Annotation {
    Datatype,
    Group,
    Default,
}

/// Response format requested with a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dialect {
    pub header: bool,
    pub delimiter: String,
    pub comment_prefix: String,
    pub annotations: Vec<Annotation>,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            header: true,
            delimiter: ",".to_string(),
            comment_prefix: "#".to_string(),
            annotations: vec![Annotation::Datatype, Annotation::Group, Annotation::Default],
        }
    }
}

/// A translated query
#[derive(Debug, Clone, PartialEq)]
pub struct FluxQuery {
    /// Packages imported ahead of the options, e.g. `strings`
    pub imports: Vec<String>,
    /// `option p<N> = <literal>` declarations in binding order
    pub statements: Vec<String>,
    /// The pipeline
    pub query: String,
    /// Requested response format
    pub dialect: Dialect,
}

impl FluxQuery {
    pub fn new(imports: Vec<String>, statements: Vec<String>, query: String) -> Self {
        Self {
            imports,
            statements,
            query,
            dialect: Dialect::default(),
        }
    }

    /// Full query text: imports, options, a blank line, then the pipeline
    pub fn to_flux(&self) -> String {
        let mut text = String::new();
        for import in &self.imports {
            text.push_str(&format!("import \"{}\"\n", import));
        }
        for statement in &self.statements {
            text.push_str(statement);
            text.push('\n');
        }
        if !self.imports.is_empty() || !self.statements.is_empty() {
            text.push('\n');
        }
        text.push_str(&self.query);
        text
    }

    /// JSON request body
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for FluxQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_flux())
    }
}

impl Serialize for FluxQuery {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FluxQuery", 3)?;
        state.serialize_field("query", &self.to_flux())?;
        state.serialize_field("type", "flux")?;
        state.serialize_field("dialect", &self.dialect)?;
        state.end()
    }
}
