//! Expression parts
//!
//! Fragments of emitted Flux text produced while walking a predicate.
//! Rendering is pure: it only appends to the buffer and never touches the
//! generation context.

use crate::mapping::MemberKind;
use crate::model::{BinaryKind, Value};
use crate::query::error::{QueryError, QueryResult};
use crate::query::variables::quote;

/// Flux string library functions reachable from method calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFunction {
    ContainsStr,
    HasPrefix,
    HasSuffix,
    ReplaceAll,
    ToLower,
    ToUpper,
    ToString,
}

impl StringFunction {
    /// Map a source method name onto a string function
    pub fn from_method(name: &str) -> Option<Self> {
        match name {
            "Contains" | "contains" => Some(Self::ContainsStr),
            "StartsWith" | "starts_with" => Some(Self::HasPrefix),
            "EndsWith" | "ends_with" => Some(Self::HasSuffix),
            "Replace" | "replace" => Some(Self::ReplaceAll),
            "ToLower" | "to_lowercase" | "to_lower" => Some(Self::ToLower),
            "ToUpper" | "to_uppercase" | "to_upper" => Some(Self::ToUpper),
            "ToString" | "to_string" => Some(Self::ToString),
            _ => None,
        }
    }

    /// Fully qualified Flux function name
    pub fn flux_name(&self) -> &'static str {
        match self {
            Self::ContainsStr => "strings.containsStr",
            Self::HasPrefix => "strings.hasPrefix",
            Self::HasSuffix => "strings.hasSuffix",
            Self::ReplaceAll => "strings.replaceAll",
            Self::ToLower => "strings.toLower",
            Self::ToUpper => "strings.toUpper",
            Self::ToString => "string",
        }
    }

    /// Named parameters in emission order; the first one receives the receiver
    pub fn parameters(&self) -> &'static [&'static str] {
        match self {
            Self::ContainsStr => &["v", "substr"],
            Self::HasPrefix => &["v", "prefix"],
            Self::HasSuffix => &["v", "suffix"],
            Self::ReplaceAll => &["v", "t", "u"],
            Self::ToLower | Self::ToUpper | Self::ToString => &["v"],
        }
    }

    /// True when the function lives in the `strings` package
    pub fn needs_strings_import(&self) -> bool {
        !matches!(self, Self::ToString)
    }
}

/// `r["<column>"]` with the column name escaped as a string literal
pub fn column_accessor(column: &str) -> String {
    format!("r[{}]", quote(column))
}

/// A fragment of emittable Flux text
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionPart {
    /// Reference to a named variable (`p3`)
    LiteralRef { name: String },
    /// Column accessor (`r["host"]`)
    ColumnRef { kind: MemberKind, name: String },
    /// Binary operator applied to two parts
    BinaryOp {
        kind: BinaryKind,
        left: Box<ExpressionPart>,
        right: Box<ExpressionPart>,
    },
    /// Call of a string library function
    StringCall {
        function: StringFunction,
        args: Vec<ExpressionPart>,
    },
    /// Value whose rendered form was computed during traversal
    CompositeAssignment {
        value: Value,
        rendered_assignment: String,
    },
    /// Comparison against the timestamp column; exactly one side holds the bound
    TimeRangeCandidate {
        left: Option<Box<ExpressionPart>>,
        right: Option<Box<ExpressionPart>>,
        op: BinaryKind,
    },
    /// Marker for a node that was not translated
    NoOp,
}

impl ExpressionPart {
    /// Column accessor for the given kind; measurement and timestamp use
    /// their reserved names regardless of the resolved column
    pub fn column(kind: MemberKind, resolved_name: impl Into<String>) -> Self {
        let name = match kind {
            MemberKind::Measurement => "_measurement".to_string(),
            MemberKind::Timestamp => "_time".to_string(),
            MemberKind::Tag | MemberKind::Field => resolved_name.into(),
        };
        Self::ColumnRef { kind, name }
    }

    /// True for the timestamp column accessor
    pub fn is_time_column(&self) -> bool {
        matches!(
            self,
            Self::ColumnRef {
                kind: MemberKind::Timestamp,
                ..
            }
        )
    }

    /// True for a variable reference
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::LiteralRef { .. })
    }

    /// Append this fragment's Flux text to the buffer
    pub fn render(&self, buffer: &mut String) -> QueryResult<()> {
        match self {
            Self::LiteralRef { name } => buffer.push_str(name),
            Self::ColumnRef { name, .. } => buffer.push_str(&column_accessor(name)),
            Self::BinaryOp { kind, left, right } => {
                let token = kind
                    .flux_token()
                    .ok_or_else(|| QueryError::unsupported(kind, "Binary"))?;
                let mut inner = String::new();
                left.render(&mut inner)?;
                inner.push(' ');
                inner.push_str(token);
                inner.push(' ');
                right.render(&mut inner)?;

                buffer.push('(');
                buffer.push_str(&inner);
                buffer.push(')');
            }
            Self::StringCall { function, args } => {
                let mut inner = String::new();
                for (i, (param, arg)) in function.parameters().iter().zip(args).enumerate() {
                    if i > 0 {
                        inner.push_str(", ");
                    }
                    inner.push_str(param);
                    inner.push_str(": ");
                    arg.render(&mut inner)?;
                }

                buffer.push_str(function.flux_name());
                buffer.push('(');
                buffer.push_str(&inner);
                buffer.push(')');
            }
            Self::CompositeAssignment {
                rendered_assignment,
                ..
            } => buffer.push_str(rendered_assignment),
            Self::TimeRangeCandidate { left, right, op } => {
                let time = Self::column(MemberKind::Timestamp, "_time");
                let (left, right) = match (left, right) {
                    (Some(bound), None) => (bound.as_ref().clone(), time),
                    (None, Some(bound)) => (time, bound.as_ref().clone()),
                    _ => return Err(QueryError::unsupported(op, "TimeRange")),
                };
                Self::BinaryOp {
                    kind: *op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
                .render(buffer)?;
            }
            Self::NoOp => {
                return Err(QueryError::unsupported("<untranslated node>", "NoOp"));
            }
        }
        Ok(())
    }

    /// Render into a fresh string
    pub fn to_flux(&self) -> QueryResult<String> {
        let mut buffer = String::new();
        self.render(&mut buffer)?;
        Ok(buffer)
    }
}
