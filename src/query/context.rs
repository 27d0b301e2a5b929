//! Per-translation generation context

use super::aggregator::QueryAggregator;
use super::variables::VariableAggregator;
use crate::mapping::{MemberKind, MemberResolver};
use std::collections::HashMap;

/// Mutable state of one translation.
///
/// Created fresh for every query and never shared, so concurrent
/// translations need no locking.
pub struct QueryGenerationContext<'r> {
    /// Named variable bindings
    pub variables: VariableAggregator,
    /// Pipeline stages
    pub aggregator: QueryAggregator,
    entity: String,
    resolver: &'r dyn MemberResolver,
    members: HashMap<String, (MemberKind, String)>,
    strings_import: bool,
}

impl<'r> QueryGenerationContext<'r> {
    /// Create a context; the bucket is bound first (`p1`) and the default
    /// range start `0` second (`p2`)
    pub fn new(bucket: &str, entity: impl Into<String>, resolver: &'r dyn MemberResolver) -> Self {
        let mut variables = VariableAggregator::new();
        let bucket_assignment = variables.add_named_variable(bucket);
        let range_start_assignment = variables.add_named_variable(0);

        Self {
            variables,
            aggregator: QueryAggregator::new(bucket_assignment, range_start_assignment),
            entity: entity.into(),
            resolver,
            members: HashMap::new(),
            strings_import: false,
        }
    }

    /// The queried entity type
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The injected member resolver
    pub fn resolver(&self) -> &'r dyn MemberResolver {
        self.resolver
    }

    /// Resolve a member to its kind and column name, memoized per member
    pub fn resolve_member(&mut self, member: &str) -> (MemberKind, String) {
        if let Some(resolved) = self.members.get(member) {
            return resolved.clone();
        }
        let resolved = (
            self.resolver.resolve_member_kind(member),
            self.resolver.column_name(member),
        );
        self.members.insert(member.to_string(), resolved.clone());
        resolved
    }

    /// Record that the emitted query calls into the `strings` package
    pub fn require_strings_import(&mut self) {
        self.strings_import = true;
    }

    pub fn needs_strings_import(&self) -> bool {
        self.strings_import
    }
}
