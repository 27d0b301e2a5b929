//! # fluxlinq
//!
//! Translates typed query models into parameterized Flux queries and runs
//! them through a pluggable execution collaborator.
//!
//! ## Modules
//!
//! - [`model`]: Query models, expression trees and constant values
//! - [`mapping`]: Member-to-column mapping of queryable entities
//! - [`query`]: Parser, translator and executor
//! - [`client`]: Execution collaborator traits, records and cancellation
//! - [`config`]: File and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fluxlinq::mapping::{EntityMapping, MappingResolver, MemberKind};
//! use fluxlinq::query::{QueryParser, QueryVisitor};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = MappingResolver::new(
//!         EntityMapping::new("sensor")
//!             .member("timestamp", MemberKind::Timestamp)
//!             .member("device_id", MemberKind::Tag),
//!     );
//!
//!     let model = QueryParser::new()
//!         .bind("device", "d1")
//!         .parse("from s in sensor where s.device_id == device select s")?;
//!
//!     let (query, _settings) = QueryVisitor::translate(&model, "my-bucket", &resolver)?;
//!     println!("{}", query.to_flux());
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod mapping;
pub mod model;
pub mod query;

// Re-export top-level types for convenience
pub use model::{BinaryKind, Expr, QueryModel, ResultOperator, Value};

pub use mapping::{EntityMapping, MappingResolver, MemberKind, MemberResolver};

pub use query::{
    ExecutionError, FluxQuery, QueryError, QueryExecutor, QueryParser, QueryResult,
    QueryResultsSettings, QueryVisitor,
};

pub use client::{
    cancellation, CancellationHandle, CancellationSignal, FluxRecord, FromRecord, QueryApi,
    QueryApiSync,
};

pub use config::{Config, ConfigError, LoggingConfig, SourceConfig};
