//! Variable aggregation
//!
//! Constants met during traversal are not inlined into the pipeline. Each one
//! is bound to a sequential `p<N>` name and declared in the query preamble as
//! `option p<N> = <literal>`.

use crate::model::{duration_micros, Value};
use chrono::{SecondsFormat, Utc};
use std::fmt;

/// A Flux literal
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    UnsignedInteger(u64),
    Boolean(bool),
    Float(f64),
    String(String),
    DateTime(chrono::DateTime<Utc>),
    /// Duration in microseconds
    Duration(i64),
    Array(Vec<Literal>),
}

impl Literal {
    /// Convert a value into its literal form.
    ///
    /// Tag values are always strings in the backend, so `is_tag` forces a
    /// string literal whatever the underlying type.
    pub fn from_value(value: &Value, is_tag: bool) -> Self {
        match value {
            Value::Array(items) => {
                Self::Array(items.iter().map(|v| Self::from_value(v, is_tag)).collect())
            }
            _ if is_tag => Self::String(value.to_string()),
            Value::Int(v) => Self::Integer(*v),
            Value::UInt(v) => Self::UnsignedInteger(*v),
            Value::Bool(v) => Self::Boolean(*v),
            Value::Float(v) => Self::Float(*v),
            Value::String(s) => Self::String(s.clone()),
            Value::DateTime(dt) => Self::DateTime(dt.with_timezone(&Utc)),
            Value::Duration(d) => Self::Duration(duration_micros(d)),
            Value::Other(s) => Self::String(s.clone()),
        }
    }
}

/// Flux string literal for `s`, quoted and escaped
pub(crate) fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '$' if chars.peek() == Some(&'{') => quoted.push_str("\\$"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str(&quote(s))
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::UnsignedInteger(v) => write!(f, "{}", v),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Float(v) if v.is_nan() => write!(f, "float(v: \"NaN\")"),
            Self::Float(v) if v.is_infinite() => {
                let sign = if *v > 0.0 { "+" } else { "-" };
                write!(f, "float(v: \"{}Inf\")", sign)
            }
            Self::Float(v) => {
                let text = v.to_string();
                if text.contains('.') {
                    write!(f, "{}", text)
                } else {
                    write!(f, "{}.0", text)
                }
            }
            Self::String(s) => write_escaped(f, s),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Duration(us) => write!(f, "{}us", us),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A constant bound to a preamble name
#[derive(Debug, Clone, PartialEq)]
pub struct NamedVariable {
    /// `p<N>`
    pub name: String,
    /// The bound constant
    pub value: Value,
    /// Render as a quoted string regardless of the value type
    pub is_tag: bool,
}

impl NamedVariable {
    /// Literal form of the bound value
    pub fn literal(&self) -> Literal {
        Literal::from_value(&self.value, self.is_tag)
    }

    /// `option <name> = <literal>` declaration
    pub fn statement(&self) -> String {
        format!("option {} = {}", self.name, self.literal())
    }
}

/// Allocates named variables for one translation
#[derive(Debug, Default)]
pub struct VariableAggregator {
    variables: Vec<NamedVariable>,
}

impl VariableAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value to the next sequential name and return that name
    pub fn add_named_variable(&mut self, value: impl Into<Value>) -> String {
        let name = format!("p{}", self.variables.len() + 1);
        let value = value.into();
        tracing::trace!(name = %name, value = %value, "bound query variable");
        self.variables.push(NamedVariable {
            name: name.clone(),
            value,
            is_tag: false,
        });
        name
    }

    /// Flag every variable registered under `name` as a tag value
    pub fn variable_is_tag(&mut self, name: &str) {
        self.variables
            .iter_mut()
            .filter(|v| v.name == name)
            .for_each(|v| v.is_tag = true);
    }

    /// Look up a variable by name
    pub fn get(&self, name: &str) -> Option<&NamedVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// All variables in binding order
    pub fn variables(&self) -> &[NamedVariable] {
        &self.variables
    }

    /// Preamble declarations in binding order
    pub fn get_statements(&self) -> Vec<String> {
        self.variables.iter().map(NamedVariable::statement).collect()
    }
}
