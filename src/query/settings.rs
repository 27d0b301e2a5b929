//! Query results settings
//!
//! Decides whether the rows returned for a query must be reduced to a
//! single value on the client and how.

use super::aggregator::ResultFunction;
use crate::model::{QueryModel, ResultOperator, Value};
use crate::query::error::{QueryError, QueryResult};

/// How the rows of a translated query become its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryResultsSettings {
    scalar_aggregated: bool,
    result_function: Option<ResultFunction>,
}

impl QueryResultsSettings {
    /// Settings for a query whose pipeline ends with `result_function`
    pub fn for_function(result_function: Option<ResultFunction>) -> Self {
        Self {
            scalar_aggregated: result_function.is_some(),
            result_function,
        }
    }

    /// Settings derived from the result operators of a model
    pub fn from_model(model: &QueryModel) -> Self {
        let function = model.result_operators.iter().fold(None, |found, operator| match operator {
            ResultOperator::Count | ResultOperator::LongCount => Some(ResultFunction::Count),
            _ => found,
        });
        Self::for_function(function)
    }

    /// True when the result is one value reduced from all rows
    pub fn scalar_aggregated(&self) -> bool {
        self.scalar_aggregated
    }

    pub fn result_function(&self) -> Option<ResultFunction> {
        self.result_function
    }

    /// Reduce the projected result column of every row to the query result
    pub fn reduce(&self, values: Vec<Value>) -> QueryResult<Value> {
        match self.result_function {
            Some(ResultFunction::Count) => {
                let mut total: i64 = 0;
                for value in values {
                    let count = value.as_i64().ok_or_else(|| {
                        QueryError::Mapping(format!(
                            "count value '{}' of type {} is not an integer",
                            value,
                            value.type_name()
                        ))
                    })?;
                    total = total.saturating_add(count);
                }
                Ok(Value::Int(total))
            }
            None => Ok(Value::Array(values)),
        }
    }
}
