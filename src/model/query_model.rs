//! Query model
//!
//! The parsed shape of a typed query: the queried entity, its body clauses
//! (where / order by) and the trailing result operators.

use super::expr::Expr;
use super::value::Value;
use crate::query::{QueryError, QueryResult};
use std::fmt;

/// A parsed query over a sequence of entities
#[derive(Debug, Clone, PartialEq)]
pub struct QueryModel {
    /// Name of the queried entity type
    pub entity: String,
    /// Where and order-by clauses, in source order
    pub body: Vec<BodyClause>,
    /// Result operators, in source order
    pub result_operators: Vec<ResultOperator>,
}

impl QueryModel {
    /// Start building a query over the given entity
    pub fn from_entity(entity: impl Into<String>) -> QueryModelBuilder {
        QueryModelBuilder::new(entity)
    }

    /// Iterate the where-clause predicates
    pub fn where_clauses(&self) -> impl Iterator<Item = &Expr> {
        self.body.iter().filter_map(|clause| match clause {
            BodyClause::Where(predicate) => Some(predicate),
            BodyClause::OrderBy(_) => None,
        })
    }
}

/// A clause in the body of a query
#[derive(Debug, Clone, PartialEq)]
pub enum BodyClause {
    /// `where <predicate>`
    Where(Expr),
    /// `orderby <key> [direction], ...`
    OrderBy(Vec<Ordering>),
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One key of an order-by clause
#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    /// Key selector
    pub expr: Expr,
    /// Sort direction
    pub direction: Direction,
}

impl Ordering {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            direction: Direction::Asc,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            direction: Direction::Desc,
        }
    }
}

/// Operators appended after the main predicate/selector
#[derive(Debug, Clone, PartialEq)]
pub enum ResultOperator {
    /// First N items
    Take(Expr),
    /// Skip N items
    Skip(Expr),
    /// Last N items
    TakeLast(Expr),
    /// Existence check
    Any,
    /// Item count
    Count,
    /// Item count as a 64-bit integer
    LongCount,
    First,
    Last,
    Single,
    Sum,
    Min,
    Max,
    Average,
    Distinct,
}

impl ResultOperator {
    /// Operator type name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Take(_) => "TakeResultOperator",
            Self::Skip(_) => "SkipResultOperator",
            Self::TakeLast(_) => "TakeLastResultOperator",
            Self::Any => "AnyResultOperator",
            Self::Count => "CountResultOperator",
            Self::LongCount => "LongCountResultOperator",
            Self::First => "FirstResultOperator",
            Self::Last => "LastResultOperator",
            Self::Single => "SingleResultOperator",
            Self::Sum => "SumResultOperator",
            Self::Min => "MinResultOperator",
            Self::Max => "MaxResultOperator",
            Self::Average => "AverageResultOperator",
            Self::Distinct => "DistinctResultOperator",
        }
    }

    /// Evaluate a sequence-preserving operator over already materialized items.
    ///
    /// Only `Take`, `Skip` and `TakeLast` are sequence-preserving; the count
    /// argument must be a non-negative integer constant.
    pub fn execute_in_memory<T>(&self, items: Vec<T>) -> QueryResult<Vec<T>> {
        match self {
            Self::Take(count) => {
                let n = constant_count(count, self)?;
                Ok(items.into_iter().take(n).collect())
            }
            Self::Skip(count) => {
                let n = constant_count(count, self)?;
                Ok(items.into_iter().skip(n).collect())
            }
            Self::TakeLast(count) => {
                let n = constant_count(count, self)?;
                let skip = items.len().saturating_sub(n);
                Ok(items.into_iter().skip(skip).collect())
            }
            other => Err(QueryError::UnsupportedConstruct {
                construct: other.to_string(),
                kind: other.type_name().to_string(),
            }),
        }
    }
}

fn constant_count(expr: &Expr, operator: &ResultOperator) -> QueryResult<usize> {
    match expr {
        Expr::Constant(value) => value
            .as_i64()
            .filter(|n| *n >= 0 && !matches!(value, Value::Float(_)))
            .map(|n| n as usize)
            .ok_or_else(|| {
                QueryError::Parse(format!(
                    "{} expects a non-negative integer count, got {}",
                    operator.type_name(),
                    value
                ))
            }),
        other => Err(QueryError::UnsupportedConstruct {
            construct: other.to_string(),
            kind: other.kind_name().to_string(),
        }),
    }
}

impl fmt::Display for ResultOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Take(n) => write!(f, "Take({})", n),
            Self::Skip(n) => write!(f, "Skip({})", n),
            Self::TakeLast(n) => write!(f, "TakeLast({})", n),
            Self::Any => write!(f, "Any()"),
            Self::Count => write!(f, "Count()"),
            Self::LongCount => write!(f, "LongCount()"),
            Self::First => write!(f, "First()"),
            Self::Last => write!(f, "Last()"),
            Self::Single => write!(f, "Single()"),
            Self::Sum => write!(f, "Sum()"),
            Self::Min => write!(f, "Min()"),
            Self::Max => write!(f, "Max()"),
            Self::Average => write!(f, "Average()"),
            Self::Distinct => write!(f, "Distinct()"),
        }
    }
}

/// Builder for constructing query models programmatically
#[derive(Debug, Clone)]
pub struct QueryModelBuilder {
    entity: String,
    body: Vec<BodyClause>,
    result_operators: Vec<ResultOperator>,
}

impl QueryModelBuilder {
    /// Create a builder for the given entity
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            body: Vec::new(),
            result_operators: Vec::new(),
        }
    }

    /// Add a where clause
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.body.push(BodyClause::Where(predicate));
        self
    }

    /// Start a new order-by clause with an ascending key
    pub fn order_by(mut self, key: Expr) -> Self {
        self.body.push(BodyClause::OrderBy(vec![Ordering::asc(key)]));
        self
    }

    /// Start a new order-by clause with a descending key
    pub fn order_by_descending(mut self, key: Expr) -> Self {
        self.body.push(BodyClause::OrderBy(vec![Ordering::desc(key)]));
        self
    }

    /// Add a secondary key to the last order-by clause
    pub fn then_by(mut self, ordering: Ordering) -> Self {
        match self.body.last_mut() {
            Some(BodyClause::OrderBy(orderings)) => orderings.push(ordering),
            _ => self.body.push(BodyClause::OrderBy(vec![ordering])),
        }
        self
    }

    /// Append any result operator
    pub fn result_operator(mut self, operator: ResultOperator) -> Self {
        self.result_operators.push(operator);
        self
    }

    pub fn take(self, n: i64) -> Self {
        self.result_operator(ResultOperator::Take(Expr::constant(n)))
    }

    pub fn skip(self, n: i64) -> Self {
        self.result_operator(ResultOperator::Skip(Expr::constant(n)))
    }

    pub fn take_last(self, n: i64) -> Self {
        self.result_operator(ResultOperator::TakeLast(Expr::constant(n)))
    }

    pub fn any(self) -> Self {
        self.result_operator(ResultOperator::Any)
    }

    pub fn count(self) -> Self {
        self.result_operator(ResultOperator::Count)
    }

    pub fn long_count(self) -> Self {
        self.result_operator(ResultOperator::LongCount)
    }

    /// Build the query model
    pub fn build(self) -> QueryModel {
        QueryModel {
            entity: self.entity,
            body: self.body,
            result_operators: self.result_operators,
        }
    }
}
