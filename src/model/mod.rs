//! Typed query model
//!
//! The input side of translation:
//!
//! - **Value**: constants embedded in queries and cells of result records
//! - **Expr**: predicate/selector expression trees
//! - **QueryModel**: where/order-by clauses plus result operators

mod expr;
mod query_model;
mod value;

pub use expr::{BinaryKind, Expr, UnaryKind};
pub use query_model::{
    BodyClause, Direction, Ordering, QueryModel, QueryModelBuilder, ResultOperator,
};
pub use value::Value;
pub(crate) use value::duration_micros;
