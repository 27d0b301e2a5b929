//! Query Parser
//!
//! Parses query comprehensions into a [`QueryModel`].
//!
//! # Supported Syntax
//!
//! ```text
//! from <var> in <entity>
//! [where <predicate>]*
//! [orderby <key> [ascending|descending] [, <key> ...]]*
//! select <var>
//! ```
//!
//! The comprehension may be wrapped in parentheses and followed by result
//! operators, e.g. `.Take(10)` or `.Count()`.
//!
//! # Examples
//!
//! ```text
//! from s in sensor where s.device_id == "d1" select s
//! from s in sensor where s.timestamp > datetime("2024-01-01T00:00:00Z") orderby s.timestamp descending select s
//! (from s in sensor where s.value >= threshold select s).Take(5).Skip(2)
//! ```
//!
//! Identifiers other than the range variable are looked up in the parser's
//! bindings; unbound identifiers become parameters and fail translation.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, satisfy},
    combinator::{map, map_res, not, opt, recognize, value},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::registry::NodeTypeRegistry;
use crate::model::{BinaryKind, BodyClause, Direction, Expr, Ordering, QueryModel, UnaryKind, Value};
use crate::query::error::{QueryError, QueryResult};
use chrono::DateTime;
use std::collections::HashMap;

/// Parses query text with a set of named bindings and a result operator
/// registry
#[derive(Debug, Clone)]
pub struct QueryParser {
    registry: NodeTypeRegistry,
    bindings: HashMap<String, Value>,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryParser {
    /// Parser with the built-in operators plus the custom ones
    pub fn new() -> Self {
        let mut registry = NodeTypeRegistry::create_default();
        registry.register_custom_operators();
        Self::with_registry(registry)
    }

    pub fn with_registry(registry: NodeTypeRegistry) -> Self {
        Self {
            registry,
            bindings: HashMap::new(),
        }
    }

    /// Bind an identifier to a constant
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    pub fn registry(&self) -> &NodeTypeRegistry {
        &self.registry
    }

    pub fn bindings(&self) -> &HashMap<String, Value> {
        &self.bindings
    }

    /// Parse a query string into a query model
    pub fn parse(&self, input: &str) -> QueryResult<QueryModel> {
        let input = input.trim();

        let syntax = match parse_full_query(input) {
            Ok((remaining, syntax)) => {
                if remaining.trim().is_empty() {
                    syntax
                } else {
                    return Err(QueryError::Parse(format!(
                        "Unexpected input after query: '{}'",
                        remaining.trim()
                    )));
                }
            }
            Err(e) => return Err(QueryError::Parse(format!("{:?}", e))),
        };

        self.lower(syntax)
    }

    fn lower(&self, syntax: QuerySyntax) -> QueryResult<QueryModel> {
        if syntax.selected != syntax.variable {
            return Err(QueryError::Parse(format!(
                "select must project the range variable '{}', got '{}'",
                syntax.variable, syntax.selected
            )));
        }

        let lowering = Lowering {
            variable: &syntax.variable,
            bindings: &self.bindings,
        };

        let mut body = Vec::with_capacity(syntax.clauses.len());
        for clause in syntax.clauses {
            body.push(match clause {
                ClauseSyntax::Where(predicate) => BodyClause::Where(lowering.lower(predicate)?),
                ClauseSyntax::OrderBy(keys) => BodyClause::OrderBy(
                    keys.into_iter()
                        .map(|(key, direction)| {
                            Ok(Ordering {
                                expr: lowering.lower(key)?,
                                direction,
                            })
                        })
                        .collect::<QueryResult<Vec<_>>>()?,
                ),
            });
        }

        let mut result_operators = Vec::with_capacity(syntax.operators.len());
        for (method, args) in syntax.operators {
            let args = args
                .into_iter()
                .map(|arg| lowering.lower(arg))
                .collect::<QueryResult<Vec<_>>>()?;
            result_operators.push(self.registry.create(&method, &args)?);
        }

        Ok(QueryModel {
            entity: syntax.entity,
            body,
            result_operators,
        })
    }
}

/// Parse a query string with the given parser
pub fn parse_query(input: &str, parser: &QueryParser) -> QueryResult<QueryModel> {
    parser.parse(input)
}

/// Query as written, before identifiers are resolved
#[derive(Debug)]
struct QuerySyntax {
    variable: String,
    entity: String,
    clauses: Vec<ClauseSyntax>,
    selected: String,
    operators: Vec<(String, Vec<Node>)>,
}

#[derive(Debug)]
enum ClauseSyntax {
    Where(Node),
    OrderBy(Vec<(Node, Direction)>),
}

/// Expression as written
#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Value),
    Ident(String),
    Field(Box<Node>, String),
    Index(Box<Node>, Box<Node>),
    Call(Box<Node>, String, Vec<Node>),
    Binary(BinaryKind, Box<Node>, Box<Node>),
    Not(Box<Node>),
    Negate(Box<Node>),
    Array(Vec<Node>),
}

/// Resolves identifiers of one query
struct Lowering<'a> {
    variable: &'a str,
    bindings: &'a HashMap<String, Value>,
}

impl Lowering<'_> {
    fn lower(&self, node: Node) -> QueryResult<Expr> {
        match node {
            Node::Literal(value) => Ok(Expr::Constant(value)),
            Node::Ident(name) if name == self.variable => Err(QueryError::Parse(format!(
                "range variable '{}' must be followed by a member",
                name
            ))),
            Node::Ident(name) => Ok(match self.bindings.get(&name) {
                Some(value) => Expr::Constant(value.clone()),
                None => Expr::Parameter(name),
            }),
            Node::Field(base, member) => match *base {
                Node::Ident(ref name) if name == self.variable => Ok(Expr::Member(member)),
                other => Err(QueryError::Parse(format!(
                    "member '{}' must be accessed on the range variable, got {:?}",
                    member, other
                ))),
            },
            Node::Index(base, key) => {
                let member = match *base {
                    Node::Field(inner, member) if *inner == Node::Ident(self.variable.to_string()) => {
                        member
                    }
                    other => {
                        return Err(QueryError::Parse(format!(
                            "indexer must follow a member of the range variable, got {:?}",
                            other
                        )))
                    }
                };
                match self.lower(*key)? {
                    Expr::Constant(key) => Ok(Expr::Index { member, key }),
                    other => Err(QueryError::Parse(format!(
                        "indexer key must be a constant, got {}",
                        other
                    ))),
                }
            }
            Node::Call(receiver, method, args) => Ok(Expr::MethodCall {
                receiver: Box::new(self.lower(*receiver)?),
                method,
                args: args
                    .into_iter()
                    .map(|arg| self.lower(arg))
                    .collect::<QueryResult<Vec<_>>>()?,
            }),
            Node::Binary(op, left, right) => {
                Ok(Expr::binary(op, self.lower(*left)?, self.lower(*right)?))
            }
            Node::Not(operand) => Ok(Expr::Unary {
                op: UnaryKind::Not,
                operand: Box::new(self.lower(*operand)?),
            }),
            Node::Negate(operand) => Ok(match self.lower(*operand)? {
                Expr::Constant(Value::Int(v)) => Expr::Constant(Value::Int(
                    v.checked_neg().ok_or_else(|| negate_overflow(v))?,
                )),
                Expr::Constant(Value::Float(v)) => Expr::Constant(Value::Float(-v)),
                Expr::Constant(Value::Duration(d)) => Expr::Constant(Value::Duration(
                    chrono::Duration::zero()
                        .checked_sub(&d)
                        .ok_or_else(|| negate_overflow(d))?,
                )),
                other => Expr::Unary {
                    op: UnaryKind::Negate,
                    operand: Box::new(other),
                },
            }),
            Node::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match self.lower(item)? {
                        Expr::Constant(value) => values.push(value),
                        other => {
                            return Err(QueryError::Parse(format!(
                                "array elements must be constants, got {}",
                                other
                            )))
                        }
                    }
                }
                Ok(Expr::Constant(Value::Array(values)))
            }
        }
    }
}

fn negate_overflow(value: impl std::fmt::Display) -> QueryError {
    QueryError::Parse(format!("negating {} overflows", value))
}

/// Parse the full query, optionally parenthesized and followed by operators
fn parse_full_query(input: &str) -> IResult<&str, QuerySyntax> {
    let (input, _) = multispace0(input)?;
    let (input, mut syntax) = alt((
        delimited(
            pair(char('('), multispace0),
            parse_comprehension,
            pair(multispace0, char(')')),
        ),
        parse_comprehension,
    ))(input)?;
    let (input, operators) = many0(preceded(multispace0, parse_operator_call))(input)?;
    let (input, _) = multispace0(input)?;

    syntax.operators = operators;
    Ok((input, syntax))
}

/// Parse `from <var> in <entity> <clauses> select <var>`
fn parse_comprehension(input: &str) -> IResult<&str, QuerySyntax> {
    let (input, _) = keyword("from")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, variable) = parse_identifier(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = keyword("in")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, entity) = parse_identifier(input)?;
    let (input, clauses) = many0(preceded(multispace1, parse_clause))(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = keyword("select")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, selected) = parse_identifier(input)?;

    Ok((
        input,
        QuerySyntax {
            variable: variable.to_string(),
            entity: entity.to_string(),
            clauses,
            selected: selected.to_string(),
            operators: Vec::new(),
        },
    ))
}

/// Parse a where or orderby clause
fn parse_clause(input: &str) -> IResult<&str, ClauseSyntax> {
    alt((
        map(
            preceded(pair(keyword("where"), multispace1), parse_expression),
            ClauseSyntax::Where,
        ),
        map(
            preceded(
                pair(keyword("orderby"), multispace1),
                separated_list1(delimited(multispace0, char(','), multispace0), parse_ordering),
            ),
            ClauseSyntax::OrderBy,
        ),
    ))(input)
}

/// Parse an ordering key with its optional direction
fn parse_ordering(input: &str) -> IResult<&str, (Node, Direction)> {
    let (input, key) = parse_expression(input)?;
    let (input, direction) = opt(preceded(
        multispace1,
        alt((
            value(Direction::Asc, keyword("ascending")),
            value(Direction::Desc, keyword("descending")),
        )),
    ))(input)?;
    Ok((input, (key, direction.unwrap_or(Direction::Asc))))
}

/// Parse a trailing `.Method(args)`
fn parse_operator_call(input: &str) -> IResult<&str, (String, Vec<Node>)> {
    let (input, _) = char('.')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, method) = parse_identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, args) = parse_arguments(input)?;
    Ok((input, (method.to_string(), args)))
}

/// Parse a parenthesized, comma separated argument list
fn parse_arguments(input: &str) -> IResult<&str, Vec<Node>> {
    delimited(
        pair(char('('), multispace0),
        separated_list0(delimited(multispace0, char(','), multispace0), parse_expression),
        pair(multispace0, char(')')),
    )(input)
}

/// Parse an expression (lowest precedence first)
fn parse_expression(input: &str) -> IResult<&str, Node> {
    parse_or(input)
}

fn parse_or(input: &str) -> IResult<&str, Node> {
    binary_chain(input, parse_and, |input| value(BinaryKind::OrElse, tag("||"))(input))
}

fn parse_and(input: &str) -> IResult<&str, Node> {
    binary_chain(input, parse_comparison, |input| {
        value(BinaryKind::AndAlso, tag("&&"))(input)
    })
}

fn parse_comparison(input: &str) -> IResult<&str, Node> {
    let (input, left) = parse_additive(input)?;
    let (input, rest) = opt(pair(
        preceded(multispace0, parse_comparison_operator),
        preceded(multispace0, parse_additive),
    ))(input)?;

    Ok(match rest {
        Some((op, right)) => (input, Node::Binary(op, Box::new(left), Box::new(right))),
        None => (input, left),
    })
}

fn parse_additive(input: &str) -> IResult<&str, Node> {
    binary_chain(input, parse_multiplicative, |input| {
        alt((
            value(BinaryKind::Add, char('+')),
            value(BinaryKind::Subtract, char('-')),
        ))(input)
    })
}

fn parse_multiplicative(input: &str) -> IResult<&str, Node> {
    binary_chain(input, parse_unary, |input| {
        alt((
            value(BinaryKind::Multiply, char('*')),
            value(BinaryKind::Divide, char('/')),
            value(BinaryKind::Modulo, char('%')),
        ))(input)
    })
}

/// Left-associative chain `operand (op operand)*`
fn binary_chain<'a>(
    input: &'a str,
    operand: fn(&'a str) -> IResult<&'a str, Node>,
    operator: fn(&'a str) -> IResult<&'a str, BinaryKind>,
) -> IResult<&'a str, Node> {
    let (mut input, mut left) = operand(input)?;
    loop {
        match preceded(multispace0, operator)(input) {
            Ok((rest, op)) => {
                let (rest, right) = preceded(multispace0, operand)(rest)?;
                left = Node::Binary(op, Box::new(left), Box::new(right));
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, left)),
            Err(e) => return Err(e),
        }
    }
}

/// Parse comparison operator
fn parse_comparison_operator(input: &str) -> IResult<&str, BinaryKind> {
    alt((
        value(BinaryKind::Equal, tag("==")),
        value(BinaryKind::NotEqual, tag("!=")),
        value(BinaryKind::LessThanOrEqual, tag("<=")),
        value(BinaryKind::GreaterThanOrEqual, tag(">=")),
        value(BinaryKind::LessThan, tag("<")),
        value(BinaryKind::GreaterThan, tag(">")),
    ))(input)
}

fn parse_unary(input: &str) -> IResult<&str, Node> {
    alt((
        map(preceded(pair(char('!'), multispace0), parse_unary), |n| {
            Node::Not(Box::new(n))
        }),
        map(preceded(pair(char('-'), multispace0), parse_unary), |n| {
            Node::Negate(Box::new(n))
        }),
        parse_postfix,
    ))(input)
}

/// Postfix accessors: `.member`, `.method(args)` and `[key]`
enum Postfix {
    Field(String),
    Call(String, Vec<Node>),
    Index(Node),
}

fn parse_postfix(input: &str) -> IResult<&str, Node> {
    let (input, primary) = parse_primary(input)?;
    let (input, accessors) = many0(alt((
        map(
            preceded(char('.'), pair(parse_identifier, opt(parse_arguments))),
            |(name, args)| match args {
                Some(args) => Postfix::Call(name.to_string(), args),
                None => Postfix::Field(name.to_string()),
            },
        ),
        map(
            delimited(
                pair(char('['), multispace0),
                parse_expression,
                pair(multispace0, char(']')),
            ),
            Postfix::Index,
        ),
    )))(input)?;

    let node = accessors.into_iter().fold(primary, |node, accessor| match accessor {
        Postfix::Field(name) => Node::Field(Box::new(node), name),
        Postfix::Call(name, args) => Node::Call(Box::new(node), name, args),
        Postfix::Index(key) => Node::Index(Box::new(node), Box::new(key)),
    });
    Ok((input, node))
}

fn parse_primary(input: &str) -> IResult<&str, Node> {
    alt((
        delimited(
            pair(char('('), multispace0),
            parse_expression,
            pair(multispace0, char(')')),
        ),
        map(
            delimited(
                pair(char('['), multispace0),
                separated_list0(delimited(multispace0, char(','), multispace0), parse_expression),
                pair(multispace0, char(']')),
            ),
            Node::Array,
        ),
        map(parse_datetime, Node::Literal),
        map(parse_duration, Node::Literal),
        map(parse_number, Node::Literal),
        map(parse_string_literal, |s| Node::Literal(Value::String(s))),
        value(Node::Literal(Value::Bool(true)), keyword("true")),
        value(Node::Literal(Value::Bool(false)), keyword("false")),
        map(parse_identifier, |name| Node::Ident(name.to_string())),
    ))(input)
}

/// Parse `datetime("2024-01-01T00:00:00Z")`
fn parse_datetime(input: &str) -> IResult<&str, Value> {
    map_res(
        preceded(
            pair(keyword("datetime"), multispace0),
            delimited(
                pair(char('('), multispace0),
                parse_string_literal,
                pair(multispace0, char(')')),
            ),
        ),
        |text| DateTime::parse_from_rfc3339(&text).map(Value::DateTime),
    )(input)
}

/// Parse duration like "250ms", "5s", "2m", "1h", "1d", "10us"
fn parse_duration(input: &str) -> IResult<&str, Value> {
    map_res(
        terminated(
            pair(
                map_res(digit1, |s: &str| s.parse::<i64>()),
                alt((tag("ms"), tag("us"), tag("s"), tag("m"), tag("h"), tag("d"))),
            ),
            not(satisfy(is_identifier_char)),
        ),
        |(amount, unit)| {
            let factor: i64 = match unit {
                "us" => 1,
                "ms" => 1_000,
                "s" => 1_000_000,
                "m" => 60 * 1_000_000,
                "h" => 60 * 60 * 1_000_000,
                _ => 24 * 60 * 60 * 1_000_000,
            };
            amount
                .checked_mul(factor)
                .map(|us| Value::Duration(chrono::Duration::microseconds(us)))
                .ok_or("duration out of range")
        },
    )(input)
}

/// Parse integer or floating point number
fn parse_number(input: &str) -> IResult<&str, Value> {
    map_res(
        terminated(
            recognize(tuple((digit1, opt(pair(char('.'), digit1))))),
            not(satisfy(is_identifier_char)),
        ),
        |text: &str| {
            let number = if text.contains('.') {
                text.parse().ok().map(Value::Float)
            } else {
                text.parse()
                    .ok()
                    .map(Value::Int)
                    .or_else(|| text.parse().ok().map(Value::UInt))
            };
            number.ok_or("number out of range")
        },
    )(input)
}

/// Parse quoted string (double or single quotes, backslash escapes)
fn parse_string_literal(input: &str) -> IResult<&str, String> {
    let (rest, quote) = alt((char('"'), char('\'')))(input)?;
    let mut content = String::new();
    let mut chars = rest.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((&rest[i + 1..], content)),
            '\\' => match chars.next() {
                Some((_, 'n')) => content.push('\n'),
                Some((_, 'r')) => content.push('\r'),
                Some((_, 't')) => content.push('\t'),
                Some((_, escaped)) => content.push(escaped),
                None => break,
            },
            c => content.push(c),
        }
    }

    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Parse a keyword not followed by identifier characters
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(word), not(satisfy(is_identifier_char)))
}

/// Parse identifier (range variable, entity, member, binding)
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_identifier_char),
    ))(input)
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
