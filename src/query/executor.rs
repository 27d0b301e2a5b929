//! Query Executor
//!
//! Translates query models and runs them through the configured execution
//! collaborator:
//! 1. Translate the model into a Flux query and its results settings
//! 2. Execute it (blocking or streaming)
//! 3. Reduce scalar queries on the client, map rows otherwise
//!
//! # Execution Pipeline
//!
//! ```text
//! QueryModel → QueryVisitor → FluxQuery → QueryApi → rows → reduce | map
//! ```

use crate::client::{CancellationSignal, FluxRecord, FromRecord, QueryApi, QueryApiSync, RecordStream};
use crate::mapping::MemberResolver;
use crate::model::{QueryModel, Value};
use crate::query::aggregator::RESULT_COLUMN;
use crate::query::error::{QueryError, QueryResult};
use crate::query::flux::FluxQuery;
use crate::query::settings::QueryResultsSettings;
use crate::query::visitor::QueryVisitor;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;

/// Query executor bound to one bucket and organization
#[derive(Clone)]
pub struct QueryExecutor {
    bucket: String,
    org: String,
    resolver: Arc<dyn MemberResolver>,
    sync_api: Option<Arc<dyn QueryApiSync>>,
    async_api: Option<Arc<dyn QueryApi>>,
}

impl QueryExecutor {
    /// Create an executor without execution collaborators
    pub fn new(
        bucket: impl Into<String>,
        org: impl Into<String>,
        resolver: Arc<dyn MemberResolver>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            org: org.into(),
            resolver,
            sync_api: None,
            async_api: None,
        }
    }

    /// Configure the blocking collaborator
    pub fn with_sync_api(mut self, api: Arc<dyn QueryApiSync>) -> Self {
        self.sync_api = Some(api);
        self
    }

    /// Configure the streaming collaborator
    pub fn with_async_api(mut self, api: Arc<dyn QueryApi>) -> Self {
        self.async_api = Some(api);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    /// Translate a model without executing it
    pub fn generate_query(&self, model: &QueryModel) -> QueryResult<(FluxQuery, QueryResultsSettings)> {
        QueryVisitor::translate(model, &self.bucket, self.resolver.as_ref())
    }

    /// Execute a scalar-reduced query (e.g. `Count`)
    pub fn execute_scalar(&self, model: &QueryModel) -> QueryResult<Value> {
        let api = self.sync_api()?;
        let (query, settings) = self.generate_query(model)?;
        if !settings.scalar_aggregated() {
            return Err(QueryError::NotScalar);
        }

        let records = self.run_sync(api, &query)?;
        reduce(&settings, records)
    }

    /// Execute a query expected to yield at most one row
    ///
    /// Without `return_default_when_empty` an empty result is an error.
    pub fn execute_single<T: FromRecord>(
        &self,
        model: &QueryModel,
        return_default_when_empty: bool,
    ) -> QueryResult<Option<T>> {
        let mut items = self.execute_collection::<T>(model)?.into_iter();
        match (items.next(), items.next()) {
            (Some(item), None) => Ok(Some(item)),
            (None, _) if return_default_when_empty => Ok(None),
            (None, _) => Err(QueryError::NoElements),
            (Some(_), Some(_)) => Err(QueryError::MoreThanOneElement),
        }
    }

    /// Execute a query and map every row
    pub fn execute_collection<T: FromRecord>(&self, model: &QueryModel) -> QueryResult<Vec<T>> {
        let api = self.sync_api()?;
        let (query, _) = self.generate_query(model)?;

        self.run_sync(api, &query)?
            .into_iter()
            .map(T::from_record)
            .collect()
    }

    /// Execute a scalar-reduced query through the streaming collaborator
    ///
    /// Cancellation is honoured while waiting for rows and once more before
    /// the reduction; the reduction itself is not interruptible.
    pub async fn execute_scalar_async(
        &self,
        model: &QueryModel,
        cancellation: &CancellationSignal,
    ) -> QueryResult<Value> {
        let api = self.async_api()?;
        let (query, settings) = self.generate_query(model)?;
        if !settings.scalar_aggregated() {
            return Err(QueryError::NotScalar);
        }

        let stream = self.open_stream(api, &query, cancellation).await?;
        let records = collect_records(stream, cancellation).await?;
        if cancellation.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        reduce(&settings, records)
    }

    /// Execute a query through the streaming collaborator and map every row
    pub async fn execute_collection_async<T: FromRecord>(
        &self,
        model: &QueryModel,
        cancellation: &CancellationSignal,
    ) -> QueryResult<Vec<T>> {
        let api = self.async_api()?;
        let (query, _) = self.generate_query(model)?;

        let stream = self.open_stream(api, &query, cancellation).await?;
        collect_records(stream, cancellation)
            .await?
            .into_iter()
            .map(T::from_record)
            .collect()
    }

    fn sync_api(&self) -> QueryResult<&Arc<dyn QueryApiSync>> {
        self.sync_api.as_ref().ok_or_else(|| {
            QueryError::MisconfiguredExecutor(
                "synchronous execution requested without a QueryApiSync".to_string(),
            )
        })
    }

    fn async_api(&self) -> QueryResult<&Arc<dyn QueryApi>> {
        self.async_api.as_ref().ok_or_else(|| {
            QueryError::MisconfiguredExecutor(
                "asynchronous execution requested without a QueryApi".to_string(),
            )
        })
    }

    fn run_sync(&self, api: &Arc<dyn QueryApiSync>, query: &FluxQuery) -> QueryResult<Vec<FluxRecord>> {
        let start = Instant::now();
        let records = api.query(query, &self.org).map_err(QueryError::Execution)?;
        tracing::debug!(
            org = %self.org,
            rows = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(records)
    }

    async fn open_stream(
        &self,
        api: &Arc<dyn QueryApi>,
        query: &FluxQuery,
        cancellation: &CancellationSignal,
    ) -> QueryResult<RecordStream> {
        if cancellation.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        tokio::select! {
            _ = cancellation.cancelled() => {
                tracing::info!(org = %self.org, "Query cancelled before response");
                Err(QueryError::Cancelled)
            }
            result = api.query_stream(query, &self.org) => result.map_err(QueryError::Execution),
        }
    }
}

async fn collect_records(
    mut stream: RecordStream,
    cancellation: &CancellationSignal,
) -> QueryResult<Vec<FluxRecord>> {
    let mut records = Vec::new();
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => return Err(QueryError::Cancelled),
            next = stream.next() => match next {
                Some(record) => records.push(record.map_err(QueryError::Execution)?),
                None => return Ok(records),
            },
        }
    }
}

/// Project the result column of every row and reduce it
fn reduce(settings: &QueryResultsSettings, records: Vec<FluxRecord>) -> QueryResult<Value> {
    let values = records
        .into_iter()
        .map(|mut record| {
            record.take(RESULT_COLUMN).ok_or_else(|| {
                QueryError::Mapping(format!(
                    "record of table {} has no {} column",
                    record.table, RESULT_COLUMN
                ))
            })
        })
        .collect::<QueryResult<Vec<Value>>>()?;
    tracing::debug!(rows = values.len(), "Reducing scalar result");
    settings.reduce(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::cancellation;
    use crate::mapping::{EntityMapping, MappingResolver, MemberKind};
    use crate::model::Expr;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Returns canned records and remembers the last query
    struct FakeApi {
        records: Vec<FluxRecord>,
        last_query: Mutex<Option<String>>,
        delay: Duration,
    }

    impl FakeApi {
        fn new(records: Vec<FluxRecord>) -> Arc<Self> {
            Arc::new(Self {
                records,
                last_query: Mutex::new(None),
                delay: Duration::ZERO,
            })
        }

        fn slow(records: Vec<FluxRecord>) -> Arc<Self> {
            Arc::new(Self {
                records,
                last_query: Mutex::new(None),
                delay: Duration::from_secs(5),
            })
        }
    }

    impl QueryApiSync for FakeApi {
        fn query(&self, query: &FluxQuery, _org: &str) -> Result<Vec<FluxRecord>, crate::query::ExecutionError> {
            *self.last_query.lock().unwrap() = Some(query.to_flux());
            Ok(self.records.clone())
        }
    }

    #[async_trait]
    impl QueryApi for FakeApi {
        async fn query_stream(
            &self,
            query: &FluxQuery,
            _org: &str,
        ) -> Result<RecordStream, crate::query::ExecutionError> {
            *self.last_query.lock().unwrap() = Some(query.to_flux());
            tokio::time::sleep(self.delay).await;
            let records: Vec<Result<FluxRecord, crate::query::ExecutionError>> =
                self.records.clone().into_iter().map(Ok).collect();
            Ok(futures_util::stream::iter(records).boxed())
        }
    }

    struct FailingApi;

    impl QueryApiSync for FailingApi {
        fn query(&self, _query: &FluxQuery, _org: &str) -> Result<Vec<FluxRecord>, crate::query::ExecutionError> {
            Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "backend unavailable",
            )))
        }
    }

    fn resolver() -> Arc<dyn MemberResolver> {
        Arc::new(MappingResolver::new(
            EntityMapping::new("sensor")
                .member("timestamp", MemberKind::Timestamp)
                .member("host", MemberKind::Tag),
        ))
    }

    fn count_rows(counts: &[i64]) -> Vec<FluxRecord> {
        counts
            .iter()
            .enumerate()
            .map(|(table, count)| FluxRecord::new(table).with_value(RESULT_COLUMN, *count))
            .collect()
    }

    fn rows(n: usize) -> Vec<FluxRecord> {
        (0..n)
            .map(|i| FluxRecord::new(0).with_value("_value", i as i64))
            .collect()
    }

    #[test]
    fn test_count_returns_row_count() {
        let api = FakeApi::new(count_rows(&[3]));
        let executor = QueryExecutor::new("b", "o", resolver()).with_sync_api(api.clone());

        let model = QueryModel::from_entity("sensor").count().build();
        assert_eq!(executor.execute_scalar(&model).unwrap(), Value::Int(3));

        let sent = api.last_query.lock().unwrap().clone().unwrap();
        assert!(sent.contains("stateCount("));
    }

    #[test]
    fn test_count_sums_tables() {
        let api = FakeApi::new(count_rows(&[2, 5]));
        let executor = QueryExecutor::new("b", "o", resolver()).with_sync_api(api);

        let model = QueryModel::from_entity("sensor").long_count().build();
        assert_eq!(executor.execute_scalar(&model).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_count_row_without_result_column() {
        let api = FakeApi::new(vec![
            FluxRecord::new(0).with_value(RESULT_COLUMN, 2i64),
            FluxRecord::new(1).with_value("_value", 9i64),
        ]);
        let executor = QueryExecutor::new("b", "o", resolver()).with_sync_api(api);

        let model = QueryModel::from_entity("sensor").count().build();
        match executor.execute_scalar(&model) {
            Err(QueryError::Mapping(message)) => {
                assert_eq!(message, "record of table 1 has no linq_result_column column")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_scalar_on_sequence_query() {
        let executor = QueryExecutor::new("b", "o", resolver()).with_sync_api(FakeApi::new(rows(3)));
        let model = QueryModel::from_entity("sensor").take(3).build();
        assert!(matches!(executor.execute_scalar(&model), Err(QueryError::NotScalar)));
    }

    #[test]
    fn test_collection_maps_rows() {
        let executor = QueryExecutor::new("b", "o", resolver()).with_sync_api(FakeApi::new(rows(3)));
        let model = QueryModel::from_entity("sensor").build();

        let values: Vec<Value> = executor.execute_collection(&model).unwrap();
        assert_eq!(values, vec![Value::Int(0), Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_single_semantics() {
        let model = QueryModel::from_entity("sensor").build();

        let one = QueryExecutor::new("b", "o", resolver()).with_sync_api(FakeApi::new(rows(1)));
        let record: Option<FluxRecord> = one.execute_single(&model, false).unwrap();
        assert_eq!(record.unwrap().value(), Some(&Value::Int(0)));

        let empty = QueryExecutor::new("b", "o", resolver()).with_sync_api(FakeApi::new(vec![]));
        assert!(matches!(
            empty.execute_single::<FluxRecord>(&model, false),
            Err(QueryError::NoElements)
        ));
        assert_eq!(empty.execute_single::<FluxRecord>(&model, true).unwrap(), None);

        let many = QueryExecutor::new("b", "o", resolver()).with_sync_api(FakeApi::new(rows(2)));
        assert!(matches!(
            many.execute_single::<FluxRecord>(&model, true),
            Err(QueryError::MoreThanOneElement)
        ));
    }

    #[test]
    fn test_missing_sync_api_fails_fast() {
        let api = FakeApi::new(rows(1));
        let executor = QueryExecutor::new("b", "o", resolver()).with_async_api(api.clone());
        let model = QueryModel::from_entity("sensor").build();

        assert!(matches!(
            executor.execute_collection::<FluxRecord>(&model),
            Err(QueryError::MisconfiguredExecutor(_))
        ));
        assert!(api.last_query.lock().unwrap().is_none());
    }

    #[test]
    fn test_translation_error_sends_nothing() {
        let api = FakeApi::new(rows(1));
        let executor = QueryExecutor::new("b", "o", resolver()).with_sync_api(api.clone());
        let model = QueryModel::from_entity("sensor")
            .filter(Expr::member("host").call("Trim", vec![]).equals(Expr::constant("a")))
            .build();

        assert!(matches!(
            executor.execute_collection::<FluxRecord>(&model),
            Err(QueryError::UnsupportedConstruct { .. })
        ));
        assert!(api.last_query.lock().unwrap().is_none());
    }

    #[test]
    fn test_execution_error_is_propagated() {
        let executor = QueryExecutor::new("b", "o", resolver()).with_sync_api(Arc::new(FailingApi));
        let model = QueryModel::from_entity("sensor").build();

        match executor.execute_collection::<FluxRecord>(&model) {
            Err(QueryError::Execution(source)) => assert_eq!(source.to_string(), "backend unavailable"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_async_collection() {
        let executor = QueryExecutor::new("b", "o", resolver()).with_async_api(FakeApi::new(rows(2)));
        let model = QueryModel::from_entity("sensor").build();

        let records: Vec<FluxRecord> = executor
            .execute_collection_async(&model, &CancellationSignal::never())
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_async_count() {
        let executor =
            QueryExecutor::new("b", "o", resolver()).with_async_api(FakeApi::new(count_rows(&[1, 1, 1])));
        let model = QueryModel::from_entity("sensor").count().build();

        let count = executor
            .execute_scalar_async(&model, &CancellationSignal::never())
            .await
            .unwrap();
        assert_eq!(count, Value::Int(3));
    }

    #[tokio::test]
    async fn test_missing_async_api_fails_fast() {
        let executor = QueryExecutor::new("b", "o", resolver()).with_sync_api(FakeApi::new(rows(1)));
        let model = QueryModel::from_entity("sensor").count().build();

        assert!(matches!(
            executor
                .execute_scalar_async(&model, &CancellationSignal::never())
                .await,
            Err(QueryError::MisconfiguredExecutor(_))
        ));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_pending_query() {
        let executor =
            QueryExecutor::new("b", "o", resolver()).with_async_api(FakeApi::slow(count_rows(&[3])));
        let model = QueryModel::from_entity("sensor").count().build();
        let (handle, signal) = cancellation();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        let result = executor.execute_scalar_async(&model, &signal).await;
        assert!(matches!(result, Err(QueryError::Cancelled)));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let executor = QueryExecutor::new("b", "o", resolver()).with_async_api(FakeApi::new(rows(1)));
        let model = QueryModel::from_entity("sensor").build();
        let (handle, signal) = cancellation();
        handle.cancel();

        let result = executor
            .execute_collection_async::<FluxRecord>(&model, &signal)
            .await;
        assert!(matches!(result, Err(QueryError::Cancelled)));
    }
}
