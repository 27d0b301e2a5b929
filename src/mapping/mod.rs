//! Member resolution
//!
//! Maps members of a queried entity onto backend columns. Callers either
//! implement [`MemberResolver`] themselves or describe the entity with an
//! [`EntityMapping`] (usually loaded from the config file) and use
//! [`MappingResolver`].

use crate::model::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role of an entity member in the backend data model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    /// The measurement name (`_measurement`)
    Measurement,
    /// The point timestamp (`_time`)
    Timestamp,
    /// Indexed, string-valued dimension
    Tag,
    /// Measured value column
    Field,
}

impl std::fmt::Display for MemberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Measurement => write!(f, "measurement"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::Tag => write!(f, "tag"),
            Self::Field => write!(f, "field"),
        }
    }
}

/// Resolves entity members to backend columns
pub trait MemberResolver: Send + Sync {
    /// Role of the member
    fn resolve_member_kind(&self, member: &str) -> MemberKind;

    /// Backend column name for the member
    fn column_name(&self, member: &str) -> String;

    /// Column name for dynamic, indexer-style field access
    fn named_field_assignment_name(&self, member: &str, value: &Value) -> String {
        format!("{}_{}", self.column_name(member), value)
    }
}

/// Declared mapping of one member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberMapping {
    /// Role of the member
    pub kind: MemberKind,
    /// Backend column name (defaults to the member name)
    #[serde(default)]
    pub column: Option<String>,
}

/// Declared mapping of an entity type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMapping {
    /// Entity name as used in queries
    pub name: String,
    /// Members keyed by member name
    #[serde(default)]
    pub members: HashMap<String, MemberMapping>,
}

impl EntityMapping {
    /// Create an empty mapping
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: HashMap::new(),
        }
    }

    /// Declare a member
    pub fn member(mut self, name: impl Into<String>, kind: MemberKind) -> Self {
        self.members
            .insert(name.into(), MemberMapping { kind, column: None });
        self
    }

    /// Declare a member stored under a different column name
    pub fn member_as(
        mut self,
        name: impl Into<String>,
        kind: MemberKind,
        column: impl Into<String>,
    ) -> Self {
        self.members.insert(
            name.into(),
            MemberMapping {
                kind,
                column: Some(column.into()),
            },
        );
        self
    }
}

/// [`MemberResolver`] backed by an [`EntityMapping`]
///
/// Members without a declaration resolve to fields named after the member.
#[derive(Debug, Clone)]
pub struct MappingResolver {
    mapping: EntityMapping,
}

impl MappingResolver {
    pub fn new(mapping: EntityMapping) -> Self {
        Self { mapping }
    }

    /// The underlying mapping
    pub fn mapping(&self) -> &EntityMapping {
        &self.mapping
    }
}

impl MemberResolver for MappingResolver {
    fn resolve_member_kind(&self, member: &str) -> MemberKind {
        self.mapping
            .members
            .get(member)
            .map(|m| m.kind)
            .unwrap_or(MemberKind::Field)
    }

    fn column_name(&self, member: &str) -> String {
        self.mapping
            .members
            .get(member)
            .and_then(|m| m.column.clone())
            .unwrap_or_else(|| member.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor_mapping() -> EntityMapping {
        EntityMapping::new("sensor")
            .member("timestamp", MemberKind::Timestamp)
            .member_as("device_id", MemberKind::Tag, "deviceId")
            .member("attributes", MemberKind::Field)
    }

    #[test]
    fn test_declared_members() {
        let resolver = MappingResolver::new(sensor_mapping());
        assert_eq!(resolver.resolve_member_kind("timestamp"), MemberKind::Timestamp);
        assert_eq!(resolver.resolve_member_kind("device_id"), MemberKind::Tag);
        assert_eq!(resolver.column_name("device_id"), "deviceId");
        assert_eq!(resolver.column_name("timestamp"), "timestamp");
    }

    #[test]
    fn test_undeclared_member_is_field() {
        let resolver = MappingResolver::new(sensor_mapping());
        assert_eq!(resolver.resolve_member_kind("value"), MemberKind::Field);
        assert_eq!(resolver.column_name("value"), "value");
    }

    #[test]
    fn test_named_field_assignment_name() {
        let resolver = MappingResolver::new(sensor_mapping());
        assert_eq!(
            resolver.named_field_assignment_name("attributes", &Value::from("quality")),
            "attributes_quality"
        );
    }

    #[test]
    fn test_mapping_from_toml() {
        let mapping: EntityMapping = toml::from_str(
            r#"
            name = "sensor"
            [members.timestamp]
            kind = "timestamp"
            [members.device_id]
            kind = "tag"
            column = "deviceId"
            "#,
        )
        .unwrap();
        assert_eq!(mapping, EntityMapping::new("sensor")
            .member("timestamp", MemberKind::Timestamp)
            .member_as("device_id", MemberKind::Tag, "deviceId"));
    }
}
