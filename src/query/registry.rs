//! Result operator registry
//!
//! Maps the method names that may trail a comprehension (`.Take(5)`,
//! `.Count()`) to result operator factories. Operators the built-in set
//! lacks are plugged in with [`NodeTypeRegistry::register_custom_operators`].

use crate::model::{Expr, ResultOperator};
use crate::query::error::{QueryError, QueryResult};
use std::collections::HashMap;

/// Builds a result operator from the call arguments
pub type OperatorFactory = fn(&[Expr]) -> QueryResult<ResultOperator>;

/// Registry of result operators keyed by method name
#[derive(Clone, Default)]
pub struct NodeTypeRegistry {
    factories: HashMap<String, OperatorFactory>,
}

impl std::fmt::Debug for NodeTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTypeRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}

impl NodeTypeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in sequence operators
    pub fn create_default() -> Self {
        let mut registry = Self::new();
        registry.register("Take", |args| Ok(ResultOperator::Take(count_argument("Take", args)?)));
        registry.register("Skip", |args| Ok(ResultOperator::Skip(count_argument("Skip", args)?)));
        registry.register("Any", |args| no_arguments("Any", args, ResultOperator::Any));
        registry.register("Count", |args| no_arguments("Count", args, ResultOperator::Count));
        registry.register("LongCount", |args| {
            no_arguments("LongCount", args, ResultOperator::LongCount)
        });
        registry.register("First", |args| no_arguments("First", args, ResultOperator::First));
        registry.register("Last", |args| no_arguments("Last", args, ResultOperator::Last));
        registry.register("Single", |args| no_arguments("Single", args, ResultOperator::Single));
        registry.register("Sum", |args| no_arguments("Sum", args, ResultOperator::Sum));
        registry.register("Min", |args| no_arguments("Min", args, ResultOperator::Min));
        registry.register("Max", |args| no_arguments("Max", args, ResultOperator::Max));
        registry.register("Average", |args| {
            no_arguments("Average", args, ResultOperator::Average)
        });
        registry.register("Distinct", |args| {
            no_arguments("Distinct", args, ResultOperator::Distinct)
        });
        registry
    }

    /// Plug in operators that are not part of the built-in set
    pub fn register_custom_operators(&mut self) {
        self.register("TakeLast", |args| {
            Ok(ResultOperator::TakeLast(count_argument("TakeLast", args)?))
        });
    }

    /// Register (or replace) a factory for a method name
    pub fn register(&mut self, method: impl Into<String>, factory: OperatorFactory) {
        self.factories.insert(method.into(), factory);
    }

    pub fn is_registered(&self, method: &str) -> bool {
        self.factories.contains_key(method)
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    /// Build the operator for a trailing method call
    pub fn create(&self, method: &str, args: &[Expr]) -> QueryResult<ResultOperator> {
        let factory = self.factories.get(method).ok_or_else(|| {
            QueryError::Parse(format!("Unknown result operator '{}'", method))
        })?;
        factory(args)
    }
}

fn count_argument(method: &str, args: &[Expr]) -> QueryResult<Expr> {
    match args {
        [count] => Ok(count.clone()),
        _ => Err(QueryError::Parse(format!(
            "{} expects exactly one argument, got {}",
            method,
            args.len()
        ))),
    }
}

fn no_arguments(method: &str, args: &[Expr], operator: ResultOperator) -> QueryResult<ResultOperator> {
    if args.is_empty() {
        Ok(operator)
    } else {
        Err(QueryError::Parse(format!(
            "{} does not take arguments, got {}",
            method,
            args.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_operators() {
        let registry = NodeTypeRegistry::create_default();
        assert_eq!(
            registry.create("Take", &[Expr::constant(5)]).unwrap(),
            ResultOperator::Take(Expr::constant(5))
        );
        assert_eq!(registry.create("Count", &[]).unwrap(), ResultOperator::Count);
        assert!(!registry.is_registered("TakeLast"));
    }

    #[test]
    fn test_custom_take_last() {
        let mut registry = NodeTypeRegistry::create_default();
        assert!(registry.create("TakeLast", &[Expr::constant(2)]).is_err());

        registry.register_custom_operators();
        assert_eq!(
            registry.create("TakeLast", &[Expr::constant(2)]).unwrap(),
            ResultOperator::TakeLast(Expr::constant(2))
        );
    }

    #[test]
    fn test_argument_checks() {
        let registry = NodeTypeRegistry::create_default();
        assert!(matches!(
            registry.create("Take", &[]),
            Err(QueryError::Parse(_))
        ));
        assert!(matches!(
            registry.create("Any", &[Expr::constant(true)]),
            Err(QueryError::Parse(_))
        ));
    }
}
