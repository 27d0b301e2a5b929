//! Expression trees
//!
//! Predicates and selectors of a query are expressed as a closed set of
//! node kinds. The translator matches on them exhaustively, so adding a
//! node kind is a compile-time checked change.

use super::value::Value;
use std::fmt;

/// Binary node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryKind {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// Short-circuit conjunction (`&&`)
    AndAlso,
    /// Bitwise/logical conjunction (`&`)
    And,
    /// Short-circuit disjunction (`||`)
    OrElse,
    /// Bitwise/logical disjunction (`|`)
    Or,
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
}

impl BinaryKind {
    /// Backend operator token, `None` for kinds the backend query cannot express
    pub fn flux_token(&self) -> Option<&'static str> {
        match self {
            Self::Equal => Some("=="),
            Self::NotEqual => Some("!="),
            Self::LessThan => Some("<"),
            Self::LessThanOrEqual => Some("<="),
            Self::GreaterThan => Some(">"),
            Self::GreaterThanOrEqual => Some(">="),
            Self::AndAlso | Self::And => Some("and"),
            Self::OrElse | Self::Or => Some("or"),
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Modulo => None,
        }
    }

    /// True for the six ordering/equality comparisons
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::LessThan
                | Self::LessThanOrEqual
                | Self::GreaterThan
                | Self::GreaterThanOrEqual
        )
    }

    /// True for conjunctions
    pub fn is_conjunction(&self) -> bool {
        matches!(self, Self::AndAlso | Self::And)
    }

    /// Source-level symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::AndAlso => "&&",
            Self::And => "&",
            Self::OrElse => "||",
            Self::Or => "|",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
        }
    }
}

impl fmt::Display for BinaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Equal => "Equal",
            Self::NotEqual => "NotEqual",
            Self::LessThan => "LessThan",
            Self::LessThanOrEqual => "LessThanOrEqual",
            Self::GreaterThan => "GreaterThan",
            Self::GreaterThanOrEqual => "GreaterThanOrEqual",
            Self::AndAlso => "AndAlso",
            Self::And => "And",
            Self::OrElse => "OrElse",
            Self::Or => "Or",
            Self::Add => "Add",
            Self::Subtract => "Subtract",
            Self::Multiply => "Multiply",
            Self::Divide => "Divide",
            Self::Modulo => "Modulo",
        };
        write!(f, "{}", name)
    }
}

/// Unary node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryKind {
    /// Type conversion, transparent to translation
    Convert,
    /// Logical negation
    Not,
    /// Arithmetic negation
    Negate,
}

/// A node of a predicate or selector tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant value
    Constant(Value),
    /// Access to a member of the queried entity
    Member(String),
    /// Indexer access on an entity member, e.g. `s.attributes["quality"]`
    Index { member: String, key: Value },
    /// Binary operation
    Binary {
        op: BinaryKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation
    Unary { op: UnaryKind, operand: Box<Expr> },
    /// Method call on a receiver
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// Reference to an unbound parameter or variable
    Parameter(String),
    /// Ternary conditional
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
}

impl Expr {
    /// Constant node
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    /// Member access node
    pub fn member(name: impl Into<String>) -> Self {
        Self::Member(name.into())
    }

    /// Indexer access node
    pub fn index(member: impl Into<String>, key: impl Into<Value>) -> Self {
        Self::Index {
            member: member.into(),
            key: key.into(),
        }
    }

    /// Binary node
    pub fn binary(op: BinaryKind, left: Expr, right: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Method call node
    pub fn call(self, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::MethodCall {
            receiver: Box::new(self),
            method: method.into(),
            args,
        }
    }

    pub fn equals(self, other: Expr) -> Self {
        Self::binary(BinaryKind::Equal, self, other)
    }

    pub fn not_equals(self, other: Expr) -> Self {
        Self::binary(BinaryKind::NotEqual, self, other)
    }

    pub fn lt(self, other: Expr) -> Self {
        Self::binary(BinaryKind::LessThan, self, other)
    }

    pub fn le(self, other: Expr) -> Self {
        Self::binary(BinaryKind::LessThanOrEqual, self, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        Self::binary(BinaryKind::GreaterThan, self, other)
    }

    pub fn ge(self, other: Expr) -> Self {
        Self::binary(BinaryKind::GreaterThanOrEqual, self, other)
    }

    pub fn and(self, other: Expr) -> Self {
        Self::binary(BinaryKind::AndAlso, self, other)
    }

    pub fn or(self, other: Expr) -> Self {
        Self::binary(BinaryKind::OrElse, self, other)
    }

    /// Wrap in a transparent conversion
    pub fn convert(self) -> Self {
        Self::Unary {
            op: UnaryKind::Convert,
            operand: Box::new(self),
        }
    }

    /// Name of the node kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Constant(_) => "Constant",
            Self::Member(_) => "MemberAccess",
            Self::Index { .. } => "Index",
            Self::Binary { .. } => "Binary",
            Self::Unary {
                op: UnaryKind::Convert,
                ..
            } => "Convert",
            Self::Unary {
                op: UnaryKind::Not, ..
            } => "Not",
            Self::Unary {
                op: UnaryKind::Negate,
                ..
            } => "Negate",
            Self::MethodCall { .. } => "Call",
            Self::Parameter(_) => "Parameter",
            Self::Conditional { .. } => "Conditional",
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(Value::String(s)) => write!(f, "{:?}", s),
            Self::Constant(v) => write!(f, "{}", v),
            Self::Member(name) => write!(f, "s.{}", name),
            Self::Index { member, key } => write!(f, "s.{}[{}]", member, key),
            Self::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Self::Unary { op, operand } => match op {
                UnaryKind::Convert => write!(f, "{}", operand),
                UnaryKind::Not => write!(f, "!{}", operand),
                UnaryKind::Negate => write!(f, "-{}", operand),
            },
            Self::MethodCall {
                receiver,
                method,
                args,
            } => {
                write!(f, "{}.{}(", receiver, method)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Self::Parameter(name) => write!(f, "{}", name),
            Self::Conditional {
                test,
                if_true,
                if_false,
            } => write!(f, "({} ? {} : {})", test, if_true, if_false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flux_tokens() {
        assert_eq!(BinaryKind::Equal.flux_token(), Some("=="));
        assert_eq!(BinaryKind::AndAlso.flux_token(), Some("and"));
        assert_eq!(BinaryKind::Or.flux_token(), Some("or"));
        assert_eq!(BinaryKind::Add.flux_token(), None);
    }

    #[test]
    fn test_display() {
        let expr = Expr::member("host")
            .equals(Expr::constant("a"))
            .and(Expr::member("value").gt(Expr::constant(5)));
        assert_eq!(expr.to_string(), r#"((s.host == "a") && (s.value > 5))"#);

        let call = Expr::member("host").call("StartsWith", vec![Expr::constant("web")]);
        assert_eq!(call.to_string(), r#"s.host.StartsWith("web")"#);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Expr::Parameter("t".into()).kind_name(), "Parameter");
        assert_eq!(Expr::member("x").convert().kind_name(), "Convert");
    }
}
