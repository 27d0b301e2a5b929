//! Query Translation
//!
//! Turns typed query models into Flux:
//!
//! - **Parser**: Parse query comprehensions into a [`QueryModel`](crate::model::QueryModel)
//! - **Visitor**: Translate a model into a [`FluxQuery`]
//! - **Executor**: Run translated queries through an execution collaborator
//!
//! # Generated Query
//!
//! ```text
//! option p1 = "<bucket>"
//! option p2 = 0
//! ...
//!
//! from(bucket: p1)
//!   |> range(start: p2[, stop: pN])
//!   |> pivot(rowKey:["_time"], columnKey: ["_field"], valueColumn: "_value")
//!   [|> filter(fn: (r) => ...)]
//!   [|> sort(columns: ["..."], desc: pN)]*
//!   [|> limit(n: pN[, offset: pN])]
//!   [|> tail(n: pN)]
//! ```
//!
//! Constants never appear inline; each one is bound to an `option` and
//! referenced by name.
//!
//! # Examples
//!
//! ## Using the Model Builder
//!
//! ```rust,ignore
//! use fluxlinq::model::{Expr, QueryModel};
//! use fluxlinq::query::QueryVisitor;
//!
//! let model = QueryModel::from_entity("sensor")
//!     .filter(Expr::member("device_id").equals(Expr::constant("d1")))
//!     .take(10)
//!     .build();
//! let (query, settings) = QueryVisitor::translate(&model, "my-bucket", &resolver)?;
//! println!("{}", query.to_flux());
//! ```
//!
//! ## Using Query Strings
//!
//! ```rust,ignore
//! let parser = QueryParser::new().bind("since", since);
//! let model = parser.parse("from s in sensor where s.timestamp > since select s")?;
//! let count = executor.execute_scalar(&model)?;
//! ```

mod aggregator;
mod context;
mod error;
mod executor;
mod expression;
mod flux;
mod parser;
mod parts;
mod range;
mod registry;
mod settings;
mod variables;
mod visitor;

pub use aggregator::{QueryAggregator, ResultFunction, RESULT_COLUMN};
pub use context::QueryGenerationContext;
pub use error::{ExecutionError, QueryError, QueryResult};
pub use executor::QueryExecutor;
pub use expression::{visit as visit_expression, visit_predicate};
pub use flux::{Annotation, Dialect, FluxQuery};
pub use parser::{parse_query, QueryParser};
pub use parts::{ExpressionPart, StringFunction};
pub use range::{classify as classify_time_comparison, RangeBound, RangeClassifier};
pub use registry::{NodeTypeRegistry, OperatorFactory};
pub use settings::QueryResultsSettings;
pub use variables::{Literal, NamedVariable, VariableAggregator};
pub use visitor::QueryVisitor;
