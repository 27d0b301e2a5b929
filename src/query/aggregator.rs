//! Query aggregation
//!
//! Collects the pipeline stages produced by translation and renders them in
//! their fixed order:
//!
//! ```text
//! from → range → pivot → filter? → sort* → limit? → tail? → reduction?
//! ```

use super::variables::quote;

/// Column carrying the result of an in-backend reduction
pub const RESULT_COLUMN: &str = "linq_result_column";

const PIVOT: &str = r#"pivot(rowKey:["_time"], columnKey: ["_field"], valueColumn: "_value")"#;

/// Reduction appended to the pipeline and finished client-side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFunction {
    /// Row count
    Count,
}

/// Accumulated pipeline stages for one translation
#[derive(Debug, Clone)]
pub struct QueryAggregator {
    bucket_assignment: String,
    range_start_assignment: String,
    range_stop_assignment: Option<String>,
    limit_n: Option<String>,
    limit_offset: Option<String>,
    tail_n: Option<String>,
    filters: Vec<String>,
    orders: Vec<(String, String)>,
    result_function: Option<ResultFunction>,
}

impl QueryAggregator {
    /// Create an aggregator over the given bucket and default range start
    pub fn new(bucket_assignment: impl Into<String>, range_start_assignment: impl Into<String>) -> Self {
        Self {
            bucket_assignment: bucket_assignment.into(),
            range_start_assignment: range_start_assignment.into(),
            range_stop_assignment: None,
            limit_n: None,
            limit_offset: None,
            tail_n: None,
            filters: Vec::new(),
            orders: Vec::new(),
            result_function: None,
        }
    }

    /// Replace the range start; returns the previous assignment
    pub fn add_range_start(&mut self, assignment: impl Into<String>) -> String {
        std::mem::replace(&mut self.range_start_assignment, assignment.into())
    }

    /// Replace the range stop; returns the previous assignment, if any
    pub fn add_range_stop(&mut self, assignment: impl Into<String>) -> Option<String> {
        self.range_stop_assignment.replace(assignment.into())
    }

    /// Add a filter expression; filters are ANDed in insertion order
    pub fn add_filter(&mut self, filter: impl Into<String>) {
        self.filters.push(filter.into());
    }

    /// Add a sort stage over `column` with a boolean `desc` assignment
    pub fn add_order(&mut self, column: impl Into<String>, desc_assignment: impl Into<String>) {
        self.orders.push((column.into(), desc_assignment.into()));
    }

    pub fn add_limit_n(&mut self, assignment: impl Into<String>) {
        self.limit_n = Some(assignment.into());
    }

    pub fn add_limit_offset(&mut self, assignment: impl Into<String>) {
        self.limit_offset = Some(assignment.into());
    }

    pub fn add_tail_n(&mut self, assignment: impl Into<String>) {
        self.tail_n = Some(assignment.into());
    }

    pub fn add_result_function(&mut self, function: ResultFunction) {
        self.result_function = Some(function);
    }

    pub fn result_function(&self) -> Option<ResultFunction> {
        self.result_function
    }

    pub fn range_start_assignment(&self) -> &str {
        &self.range_start_assignment
    }

    pub fn range_stop_assignment(&self) -> Option<&str> {
        self.range_stop_assignment.as_deref()
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    /// Render the pipeline
    pub fn build_query(&self) -> String {
        let mut parts = Vec::new();

        parts.push(build_operator("from", &[("bucket", Some(&self.bucket_assignment))]));
        parts.push(build_operator(
            "range",
            &[
                ("start", Some(&self.range_start_assignment)),
                ("stop", self.range_stop_assignment.as_ref()),
            ],
        ));
        parts.push(PIVOT.to_string());

        if !self.filters.is_empty() {
            parts.push(format!("filter(fn: (r) => {})", self.filters.join(" and ")));
        }

        for (column, desc) in &self.orders {
            parts.push(format!("sort(columns: [{}], desc: {})", quote(column), desc));
        }

        if self.limit_n.is_some() || self.limit_offset.is_some() {
            // limit() requires n, so a bare offset gets an unbounded one
            let unbounded = i64::MAX.to_string();
            let n = self.limit_n.as_ref().unwrap_or(&unbounded);
            parts.push(build_operator(
                "limit",
                &[("n", Some(n)), ("offset", self.limit_offset.as_ref())],
            ));
        }

        if let Some(n) = &self.tail_n {
            parts.push(build_operator("tail", &[("n", Some(n))]));
        }

        match self.result_function {
            Some(ResultFunction::Count) => {
                parts.push(format!(
                    "stateCount(fn: (r) => true, column: \"{0}\") |> last(column: \"{0}\") |> keep(columns: [\"{0}\"])",
                    RESULT_COLUMN
                ));
            }
            None => {}
        }

        parts.join(" |> ")
    }
}

/// `name(arg: value, ...)`, skipping arguments without a value
fn build_operator(name: &str, args: &[(&str, Option<&String>)]) -> String {
    let rendered: Vec<String> = args
        .iter()
        .filter_map(|(arg, value)| value.map(|v| format!("{}: {}", arg, v)))
        .collect();
    format!("{}({})", name, rendered.join(", "))
}
