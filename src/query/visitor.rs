//! Query visitor
//!
//! Drives a whole translation: where clauses go through the expression
//! visitor and the range classifier, order-by keys become sort stages and
//! result operators shape the tail of the pipeline.

use super::aggregator::ResultFunction;
use super::context::QueryGenerationContext;
use super::expression;
use super::flux::FluxQuery;
use super::parts::ExpressionPart;
use super::range::RangeClassifier;
use super::settings::QueryResultsSettings;
use crate::mapping::MemberResolver;
use crate::model::{BodyClause, Direction, Expr, Ordering, QueryModel, ResultOperator, UnaryKind, Value};
use crate::query::error::{QueryError, QueryResult};
use tracing::debug;

/// Translates one query model into a [`FluxQuery`]
pub struct QueryVisitor<'r> {
    context: QueryGenerationContext<'r>,
    ranges: RangeClassifier,
    /// Set once a TakeLast was visited; tail() is always the last stage
    tail_taken: bool,
}

impl<'r> QueryVisitor<'r> {
    /// Create a visitor for a query over `entity` in `bucket`
    pub fn new(bucket: &str, entity: impl Into<String>, resolver: &'r dyn MemberResolver) -> Self {
        Self {
            context: QueryGenerationContext::new(bucket, entity, resolver),
            ranges: RangeClassifier::new(),
            tail_taken: false,
        }
    }

    /// Translate a model in one go
    pub fn translate(
        model: &QueryModel,
        bucket: &str,
        resolver: &'r dyn MemberResolver,
    ) -> QueryResult<(FluxQuery, QueryResultsSettings)> {
        let mut visitor = Self::new(bucket, model.entity.clone(), resolver);
        visitor.visit_query_model(model)?;
        Ok((visitor.generate_query(), visitor.results_settings()))
    }

    /// Visit the body clauses and result operators of a model
    pub fn visit_query_model(&mut self, model: &QueryModel) -> QueryResult<()> {
        for clause in &model.body {
            match clause {
                BodyClause::Where(predicate) => self.visit_where_clause(predicate)?,
                BodyClause::OrderBy(orderings) => self.visit_order_by_clause(orderings)?,
            }
        }
        for operator in &model.result_operators {
            self.visit_result_operator(operator)?;
        }
        Ok(())
    }

    fn visit_where_clause(&mut self, predicate: &Expr) -> QueryResult<()> {
        let parts = expression::visit_predicate(predicate, &mut self.context)?;

        let mut filters = Vec::new();
        for part in parts {
            match part {
                ExpressionPart::TimeRangeCandidate { .. } => {
                    self.ranges.apply(&part, &mut self.context.aggregator)?
                }
                ExpressionPart::NoOp => {}
                other => filters.push(other.to_flux()?),
            }
        }

        if !filters.is_empty() {
            self.context.aggregator.add_filter(filters.join(" and "));
        }
        Ok(())
    }

    fn visit_order_by_clause(&mut self, orderings: &[Ordering]) -> QueryResult<()> {
        for ordering in orderings {
            let column = match expression::visit(&ordering.expr, &mut self.context)? {
                ExpressionPart::ColumnRef { name, .. } => name,
                _ => {
                    return Err(QueryError::unsupported(
                        &ordering.expr,
                        ordering.expr.kind_name(),
                    ))
                }
            };
            let desc = self
                .context
                .variables
                .add_named_variable(ordering.direction == Direction::Desc);
            self.context.aggregator.add_order(column, desc);
        }
        Ok(())
    }

    fn visit_result_operator(&mut self, operator: &ResultOperator) -> QueryResult<()> {
        match operator {
            ResultOperator::Take(_) | ResultOperator::Skip(_) if self.tail_taken => {
                return Err(QueryError::unsupported(operator, operator.type_name()))
            }
            ResultOperator::Take(count) => {
                let n = self.count_variable(operator, count)?;
                self.context.aggregator.add_limit_n(n);
            }
            ResultOperator::Skip(count) => {
                let offset = self.count_variable(operator, count)?;
                self.context.aggregator.add_limit_offset(offset);
            }
            ResultOperator::TakeLast(count) => {
                let n = self.count_variable(operator, count)?;
                self.context.aggregator.add_tail_n(n);
                self.tail_taken = true;
            }
            ResultOperator::Any => {}
            ResultOperator::Count | ResultOperator::LongCount => {
                self.context.aggregator.add_result_function(ResultFunction::Count);
            }
            ResultOperator::First
            | ResultOperator::Last
            | ResultOperator::Single
            | ResultOperator::Sum
            | ResultOperator::Min
            | ResultOperator::Max
            | ResultOperator::Average
            | ResultOperator::Distinct => {
                return Err(QueryError::unsupported(operator, operator.type_name()))
            }
        }
        Ok(())
    }

    /// Bind the count argument of Take/Skip/TakeLast to a variable; counts
    /// must be non-negative integer constants
    fn count_variable(&mut self, operator: &ResultOperator, count: &Expr) -> QueryResult<String> {
        match constant_value(count) {
            Some(value @ Value::Int(n)) if *n >= 0 => {
                Ok(self.context.variables.add_named_variable(value.clone()))
            }
            Some(value @ Value::UInt(_)) => {
                Ok(self.context.variables.add_named_variable(value.clone()))
            }
            _ => Err(QueryError::unsupported(operator, operator.type_name())),
        }
    }

    /// Render the query built so far
    pub fn generate_query(&self) -> FluxQuery {
        let imports = if self.context.needs_strings_import() {
            vec!["strings".to_string()]
        } else {
            Vec::new()
        };
        let query = FluxQuery::new(
            imports,
            self.context.variables.get_statements(),
            self.context.aggregator.build_query(),
        );
        debug!(entity = %self.context.entity(), query = %query.query, "generated query");
        query
    }

    /// Results settings for the query built so far
    pub fn results_settings(&self) -> QueryResultsSettings {
        QueryResultsSettings::for_function(self.context.aggregator.result_function())
    }
}

fn constant_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Constant(value) => Some(value),
        Expr::Unary {
            op: UnaryKind::Convert,
            operand,
        } => constant_value(operand),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{EntityMapping, MappingResolver, MemberKind};
    use chrono::{TimeZone, Utc};

    const BASE: &str = r#"from(bucket: p1) |> range(start: p2) |> pivot(rowKey:["_time"], columnKey: ["_field"], valueColumn: "_value")"#;

    fn resolver() -> MappingResolver {
        MappingResolver::new(
            EntityMapping::new("sensor")
                .member("timestamp", MemberKind::Timestamp)
                .member_as("device_id", MemberKind::Tag, "deviceId")
                .member("host", MemberKind::Tag)
                .member("value", MemberKind::Field),
        )
    }

    fn translate(model: &QueryModel) -> QueryResult<(FluxQuery, QueryResultsSettings)> {
        let resolver = resolver();
        QueryVisitor::translate(model, "b", &resolver)
    }

    fn option(query: &FluxQuery, name: &str) -> String {
        let prefix = format!("option {} = ", name);
        query
            .statements
            .iter()
            .find_map(|s| s.strip_prefix(&prefix).map(str::to_string))
            .unwrap()
    }

    #[test]
    fn test_empty_model() {
        let (query, settings) = translate(&QueryModel::from_entity("sensor").build()).unwrap();
        assert_eq!(query.query, BASE);
        assert_eq!(query.statements, vec![r#"option p1 = "b""#, "option p2 = 0"]);
        assert!(!settings.scalar_aggregated());
    }

    #[test]
    fn test_timestamp_equality_sets_both_bounds() {
        let t = Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap();
        let model = QueryModel::from_entity("sensor")
            .filter(Expr::member("timestamp").equals(Expr::constant(t)))
            .build();
        let (query, _) = translate(&model).unwrap();
        assert!(query.query.contains("range(start: p3, stop: p3)"));
        assert!(!query.query.contains("filter("));
        assert_eq!(option(&query, "p3"), "2023-05-01T00:00:00Z");
    }

    #[test]
    fn test_time_range_in_either_operand_order() {
        let t1 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2023, 2, 1, 0, 0, 0).unwrap();

        let forward = QueryModel::from_entity("sensor")
            .filter(
                Expr::member("timestamp")
                    .gt(Expr::constant(t1))
                    .and(Expr::member("timestamp").lt(Expr::constant(t2))),
            )
            .build();
        let reversed = QueryModel::from_entity("sensor")
            .filter(
                Expr::constant(t1)
                    .lt(Expr::member("timestamp"))
                    .and(Expr::constant(t2).gt(Expr::member("timestamp"))),
            )
            .build();

        for model in [forward, reversed] {
            let (query, _) = translate(&model).unwrap();
            assert!(query.query.contains("range(start: p3, stop: p4)"));
            assert_eq!(option(&query, "p3"), "2023-01-01T00:00:00Z");
            assert_eq!(option(&query, "p4"), "2023-02-01T00:00:00Z");
        }
    }

    #[test]
    fn test_take_then_skip_single_limit() {
        let model = QueryModel::from_entity("sensor").take(5).skip(2).build();
        let (query, _) = translate(&model).unwrap();
        assert_eq!(query.query.matches("limit(").count(), 1);
        assert!(query.query.ends_with("|> limit(n: p3, offset: p4)"));
        assert_eq!(option(&query, "p3"), "5");
        assert_eq!(option(&query, "p4"), "2");
    }

    #[test]
    fn test_take_last_renders_tail() {
        let model = QueryModel::from_entity("sensor").take_last(3).build();
        let (query, _) = translate(&model).unwrap();
        assert!(query.query.ends_with("|> tail(n: p3)"));
    }

    #[test]
    fn test_take_after_take_last_fails() {
        let model = QueryModel::from_entity("sensor").take_last(3).take(5).build();
        match translate(&model) {
            Err(QueryError::UnsupportedConstruct { construct, kind }) => {
                assert_eq!(construct, "Take(5)");
                assert_eq!(kind, "TakeResultOperator");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let model = QueryModel::from_entity("sensor").take_last(3).skip(1).build();
        assert!(translate(&model).is_err());

        // take-then-tail keeps its meaning: the last 3 of the first 5
        let model = QueryModel::from_entity("sensor").take(5).take_last(3).build();
        let (query, _) = translate(&model).unwrap();
        assert!(query.query.ends_with("|> limit(n: p3) |> tail(n: p4)"));
    }

    #[test]
    fn test_negative_counts_fail() {
        for model in [
            QueryModel::from_entity("sensor").take(-1).build(),
            QueryModel::from_entity("sensor").skip(-2).build(),
            QueryModel::from_entity("sensor").take_last(-3).build(),
        ] {
            assert!(matches!(
                translate(&model),
                Err(QueryError::UnsupportedConstruct { .. })
            ));
        }

        let model = QueryModel::from_entity("sensor").take(0).build();
        let (query, _) = translate(&model).unwrap();
        assert_eq!(option(&query, "p3"), "0");
    }

    #[test]
    fn test_count_is_scalar() {
        let model = QueryModel::from_entity("sensor").count().build();
        let (query, settings) = translate(&model).unwrap();
        assert!(settings.scalar_aggregated());
        assert!(query.query.contains("stateCount("));
    }

    #[test]
    fn test_any_is_noop() {
        let model = QueryModel::from_entity("sensor").any().build();
        let (query, settings) = translate(&model).unwrap();
        assert_eq!(query.query, BASE);
        assert!(!settings.scalar_aggregated());
    }

    #[test]
    fn test_two_sorts_in_clause_order() {
        let model = QueryModel::from_entity("sensor")
            .order_by_descending(Expr::member("timestamp"))
            .order_by(Expr::member("host"))
            .build();
        let (query, _) = translate(&model).unwrap();
        assert!(query.query.ends_with(
            r#"|> sort(columns: ["_time"], desc: p3) |> sort(columns: ["host"], desc: p4)"#
        ));
        assert_eq!(option(&query, "p3"), "true");
        assert_eq!(option(&query, "p4"), "false");
    }

    #[test]
    fn test_order_by_non_column_fails() {
        let model = QueryModel::from_entity("sensor")
            .order_by(Expr::member("value").gt(Expr::constant(1)))
            .build();
        assert!(matches!(
            translate(&model),
            Err(QueryError::UnsupportedConstruct { .. })
        ));
    }

    #[test]
    fn test_unmapped_method_fails() {
        let model = QueryModel::from_entity("sensor")
            .filter(Expr::member("host").call("Trim", vec![]).equals(Expr::constant("a")))
            .build();
        match translate(&model) {
            Err(QueryError::UnsupportedConstruct { construct, kind }) => {
                assert_eq!(construct, "s.host.Trim()");
                assert_eq!(kind, "Call");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_result_operator() {
        let model = QueryModel::from_entity("sensor")
            .result_operator(ResultOperator::First)
            .build();
        match translate(&model) {
            Err(QueryError::UnsupportedConstruct { kind, .. }) => {
                assert_eq!(kind, "FirstResultOperator")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_non_constant_take_fails() {
        let model = QueryModel::from_entity("sensor")
            .result_operator(ResultOperator::Take(Expr::member("value")))
            .build();
        assert!(translate(&model).is_err());
    }

    #[test]
    fn test_timestamp_not_equal_fails() {
        let model = QueryModel::from_entity("sensor")
            .filter(Expr::member("timestamp").not_equals(Expr::constant(0)))
            .build();
        assert!(matches!(
            translate(&model),
            Err(QueryError::UnsupportedTimeComparison(_))
        ));
    }

    #[test]
    fn test_device_filter_end_to_end() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let model = QueryModel::from_entity("sensor")
            .filter(
                Expr::member("device_id")
                    .equals(Expr::constant("d1"))
                    .and(Expr::member("timestamp").gt(Expr::constant(t0))),
            )
            .order_by(Expr::member("timestamp"))
            .build();
        let (query, _) = translate(&model).unwrap();

        assert_eq!(
            query.to_flux(),
            [
                r#"option p1 = "b""#,
                "option p2 = 0",
                r#"option p3 = "d1""#,
                "option p4 = 2024-03-01T12:00:00Z",
                "option p5 = false",
                "",
                r#"from(bucket: p1) |> range(start: p4) |> pivot(rowKey:["_time"], columnKey: ["_field"], valueColumn: "_value") |> filter(fn: (r) => (r["deviceId"] == p3)) |> sort(columns: ["_time"], desc: p5)"#,
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_strings_import() {
        let model = QueryModel::from_entity("sensor")
            .filter(Expr::member("host").call("Contains", vec![Expr::constant("web")]))
            .build();
        let (query, _) = translate(&model).unwrap();
        assert_eq!(query.imports, vec!["strings".to_string()]);
        assert!(query
            .query
            .contains(r#"filter(fn: (r) => strings.containsStr(v: r["host"], substr: p3))"#));
    }

    #[test]
    fn test_multiple_where_clauses_are_anded() {
        let model = QueryModel::from_entity("sensor")
            .filter(Expr::member("host").equals(Expr::constant("a")))
            .filter(
                Expr::member("value")
                    .gt(Expr::constant(1.5))
                    .and(Expr::member("value").lt(Expr::constant(9.5))),
            )
            .build();
        let (query, _) = translate(&model).unwrap();
        assert!(query.query.ends_with(
            r#"filter(fn: (r) => (r["host"] == p3) and (r["value"] > p4) and (r["value"] < p5))"#
        ));
        assert_eq!(option(&query, "p4"), "1.5");
    }
}
