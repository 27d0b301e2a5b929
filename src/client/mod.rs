//! Execution collaborators
//!
//! The translator does not talk to the backend itself. Callers plug in a
//! synchronous [`QueryApiSync`], a streaming [`QueryApi`], or both; records
//! they return are mapped onto caller types through [`FromRecord`].

mod cancel;
mod record;

pub use cancel::{cancellation, CancellationHandle, CancellationSignal};
pub use record::{FluxRecord, FromRecord};

use crate::query::{ExecutionError, FluxQuery};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Stream of decoded records
pub type RecordStream = BoxStream<'static, Result<FluxRecord, ExecutionError>>;

/// Blocking query execution
pub trait QueryApiSync: Send + Sync {
    /// Execute the query and return every record
    fn query(&self, query: &FluxQuery, org: &str) -> Result<Vec<FluxRecord>, ExecutionError>;
}

/// Streaming query execution
#[async_trait]
pub trait QueryApi: Send + Sync {
    /// Execute the query; records are yielded as they are decoded
    async fn query_stream(&self, query: &FluxQuery, org: &str) -> Result<RecordStream, ExecutionError>;
}
