//! Expression tree visitor
//!
//! Walks predicate and selector trees depth-first and turns them into
//! [`ExpressionPart`]s. Only constants, member accesses, indexers, binary
//! comparisons/logic and allow-listed string methods translate; every other
//! node fails with [`QueryError::UnsupportedConstruct`].

use super::context::QueryGenerationContext;
use super::parts::{column_accessor, ExpressionPart, StringFunction};
use crate::mapping::MemberKind;
use crate::model::{BinaryKind, Expr, UnaryKind, Value};
use crate::query::error::{QueryError, QueryResult};

/// Translate one expression into a single part
pub fn visit(expr: &Expr, context: &mut QueryGenerationContext<'_>) -> QueryResult<ExpressionPart> {
    match expr {
        Expr::Constant(value) => Ok(literal(value.clone(), context)),
        Expr::Member(member) => {
            let (kind, column) = context.resolve_member(member);
            Ok(ExpressionPart::column(kind, column))
        }
        Expr::Index { member, key } => {
            let column = context.resolver().named_field_assignment_name(member, key);
            Ok(ExpressionPart::CompositeAssignment {
                value: key.clone(),
                rendered_assignment: column_accessor(&column),
            })
        }
        Expr::Unary {
            op: UnaryKind::Convert,
            operand,
        } => visit(operand, context),
        Expr::Binary { op, left, right } => visit_binary(expr, *op, left, right, context),
        Expr::MethodCall {
            receiver,
            method,
            args,
        } => visit_method_call(expr, receiver, method, args, context),
        Expr::Unary { .. } | Expr::Parameter(_) | Expr::Conditional { .. } => {
            Err(QueryError::unsupported(expr, expr.kind_name()))
        }
    }
}

/// Translate a where-clause predicate into its top-level conjuncts.
///
/// `a && b && c` yields three parts so that timestamp comparisons among them
/// can be routed to the range stage individually.
pub fn visit_predicate(
    expr: &Expr,
    context: &mut QueryGenerationContext<'_>,
) -> QueryResult<Vec<ExpressionPart>> {
    let mut parts = Vec::new();
    collect_conjuncts(expr, context, &mut parts)?;
    Ok(parts)
}

fn collect_conjuncts(
    expr: &Expr,
    context: &mut QueryGenerationContext<'_>,
    parts: &mut Vec<ExpressionPart>,
) -> QueryResult<()> {
    match expr {
        Expr::Binary { op, left, right } if op.is_conjunction() => {
            collect_conjuncts(left, context, parts)?;
            collect_conjuncts(right, context, parts)
        }
        Expr::Unary {
            op: UnaryKind::Convert,
            operand,
        } => collect_conjuncts(operand, context, parts),
        _ => {
            parts.push(visit(expr, context)?);
            Ok(())
        }
    }
}

fn literal(value: Value, context: &mut QueryGenerationContext<'_>) -> ExpressionPart {
    ExpressionPart::LiteralRef {
        name: context.variables.add_named_variable(value),
    }
}

fn visit_binary(
    expr: &Expr,
    op: BinaryKind,
    left: &Expr,
    right: &Expr,
    context: &mut QueryGenerationContext<'_>,
) -> QueryResult<ExpressionPart> {
    if op.flux_token().is_none() {
        return Err(QueryError::unsupported(expr, op.to_string()));
    }

    let left = visit(left, context)?;
    let right = visit(right, context)?;

    if op.is_comparison() {
        mark_tag_literal(&left, &right, context);
        mark_tag_literal(&right, &left, context);

        // range() has no row in scope, so only literal bounds can move there
        match (left.is_time_column(), right.is_time_column()) {
            (true, false) if right.is_literal() => {
                return Ok(ExpressionPart::TimeRangeCandidate {
                    left: None,
                    right: Some(Box::new(right)),
                    op,
                })
            }
            (false, true) if left.is_literal() => {
                return Ok(ExpressionPart::TimeRangeCandidate {
                    left: Some(Box::new(left)),
                    right: None,
                    op,
                })
            }
            _ => {}
        }
    }

    Ok(ExpressionPart::BinaryOp {
        kind: op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

/// Tag values are strings in the backend; quote a literal compared to a tag
fn mark_tag_literal(
    column: &ExpressionPart,
    other: &ExpressionPart,
    context: &mut QueryGenerationContext<'_>,
) {
    if let (
        ExpressionPart::ColumnRef {
            kind: MemberKind::Tag,
            ..
        },
        ExpressionPart::LiteralRef { name },
    ) = (column, other)
    {
        context.variables.variable_is_tag(name);
    }
}

fn visit_method_call(
    expr: &Expr,
    receiver: &Expr,
    method: &str,
    args: &[Expr],
    context: &mut QueryGenerationContext<'_>,
) -> QueryResult<ExpressionPart> {
    let function = StringFunction::from_method(method)
        .ok_or_else(|| QueryError::unsupported(expr, expr.kind_name()))?;

    if function.parameters().len() != args.len() + 1 {
        return Err(QueryError::unsupported(expr, expr.kind_name()));
    }

    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(visit(receiver, context)?);
    for arg in args {
        parts.push(visit(arg, context)?);
    }

    if function.needs_strings_import() {
        context.require_strings_import();
    }

    Ok(ExpressionPart::StringCall {
        function,
        args: parts,
    })
}
