//! The compiled expression tree.
//!
//! [`Expression`] is a closed set of node kinds. Evaluation lives in
//! [`crate::engine`]; tooling walks the tree through [`Expression::children`]
//! or an [`ExpressionVisitor`], and `Display` prints the canonical form.

use crate::operators::{ArithmeticOperator, ComparisonOperator};
use crate::types::format_double;
use rust_decimal::Decimal;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Decimal(d) => {
                let text = d.to_string();
                if text.contains('.') {
                    f.write_str(&text)
                } else {
                    write!(f, "{text}.0")
                }
            }
            Literal::Double(d) => {
                let text = format_double(*d);
                if text.contains(['E', 'N', 'I']) {
                    f.write_str(&text)
                } else {
                    write!(f, "{text}e0")
                }
            }
        }
    }
}

/// A possibly prefixed name. `namespace` is bound when the expression is
/// compiled against a static context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EQName {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
}

impl EQName {
    pub fn new(prefix: Option<&str>, local: impl Into<String>) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local: local.into(),
            namespace: None,
        }
    }
}

impl fmt::Display for EQName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local),
            None => f.write_str(&self.local),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Flag,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    Descendant,
    DescendantOrSelf,
}

impl Axis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Flag => "flag",
            Axis::SelfAxis => "self",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "flag" => Axis::Flag,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    Name(EQName),
    /// `*`
    Wildcard,
    /// `node()`
    AnyKind,
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::Name(name) => write!(f, "{name}"),
            NodeTest::Wildcard => f.write_str("*"),
            NodeTest::AnyKind => f.write_str("node()"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.axis, &self.test) {
            (Axis::Child, test) => write!(f, "{test}"),
            (Axis::Flag, test) => write!(f, "@{test}"),
            (Axis::SelfAxis, NodeTest::AnyKind) => f.write_str("."),
            (Axis::Parent, NodeTest::AnyKind) => f.write_str(".."),
            (axis, test) => write!(f, "{}::{}", axis.as_str(), test),
        }
    }
}

/// The key of a `?` lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupKey {
    /// `?name`, a string key.
    Name(String),
    /// `?3`
    Integer(i64),
    /// `?*`
    Wildcard,
    /// `?(expr)`
    Expression(Box<Expression>),
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::Name(name) => write!(f, "?{name}"),
            LookupKey::Integer(i) => write!(f, "?{i}"),
            LookupKey::Wildcard => f.write_str("?*"),
            LookupKey::Expression(expr) => write!(f, "?({expr})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    General(ComparisonOperator),
    Value(ComparisonOperator),
    Arithmetic(ArithmeticOperator),
    Union,
    Intersect,
    Except,
    /// `||`
    StringConcat,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Or => "or",
            BinaryOperator::And => "and",
            BinaryOperator::General(op) => op.symbol(),
            BinaryOperator::Value(op) => op.keyword(),
            BinaryOperator::Arithmetic(op) => op.as_str(),
            BinaryOperator::Union => "union",
            BinaryOperator::Intersect => "intersect",
            BinaryOperator::Except => "except",
            BinaryOperator::StringConcat => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: EQName,
    pub arguments: Vec<Expression>,
}

/// A `$name := expr` or `$name in expr` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    /// `.`
    ContextItem,
    Variable(String),
    /// `(a, b)`; `()` is the empty sequence.
    Sequence(Vec<Expression>),
    Range {
        start: Box<Expression>,
        end: Box<Expression>,
    },
    /// A lone `/`.
    Root,
    /// `/path`
    RootPath(Box<Expression>),
    /// `//path`
    RootDescendantPath(Box<Expression>),
    /// `left/right`
    Path {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `left//right`
    DescendantPath {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Step(Step),
    /// `base[predicate]...`
    Filter {
        base: Box<Expression>,
        predicates: Vec<Expression>,
    },
    /// `left ! right`
    SimpleMap {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `[a, b]`: one member per expression.
    SquareArray(Vec<Expression>),
    /// `array { expr }`: one member per atomized item.
    CurlyArray(Option<Box<Expression>>),
    /// `map { k : v, ... }`
    Map(Vec<(Expression, Expression)>),
    Lookup {
        base: Box<Expression>,
        key: LookupKey,
    },
    /// A `?key` lookup on the focus.
    UnaryLookup(LookupKey),
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Negate(Box<Expression>),
    FunctionCall(FunctionCall),
    For {
        bindings: Vec<Binding>,
        body: Box<Expression>,
    },
    Let {
        bindings: Vec<Binding>,
        body: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },
    Quantified {
        quantifier: Quantifier,
        bindings: Vec<Binding>,
        satisfies: Box<Expression>,
    },
    /// `expr cast as type?`
    Cast {
        expr: Box<Expression>,
        type_name: EQName,
        allow_empty: bool,
    },
    /// `expr castable as type?`
    Castable {
        expr: Box<Expression>,
        type_name: EQName,
        allow_empty: bool,
    },
}

impl Expression {
    pub(crate) fn boxed(self) -> Box<Expression> {
        Box::new(self)
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: left.boxed(),
            right: right.boxed(),
        }
    }

    /// A short name for the node kind, for diagnostics and tooling.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expression::Literal(_) => "literal",
            Expression::ContextItem => "context-item",
            Expression::Variable(_) => "variable-reference",
            Expression::Sequence(_) => "sequence",
            Expression::Range { .. } => "range",
            Expression::Root => "root-slash-only",
            Expression::RootPath(_) => "root-slash-path",
            Expression::RootDescendantPath(_) => "root-double-slash-path",
            Expression::Path { .. } => "relative-slash-path",
            Expression::DescendantPath { .. } => "relative-double-slash-path",
            Expression::Step(_) => "step",
            Expression::Filter { .. } => "filter",
            Expression::SimpleMap { .. } => "simple-map",
            Expression::SquareArray(_) => "array-square-constructor",
            Expression::CurlyArray(_) => "array-sequence-constructor",
            Expression::Map(_) => "map-constructor",
            Expression::Lookup { .. } => "postfix-lookup",
            Expression::UnaryLookup(_) => "unary-lookup",
            Expression::Binary { op, .. } => match op {
                BinaryOperator::Or => "or",
                BinaryOperator::And => "and",
                BinaryOperator::General(_) => "general-comparison",
                BinaryOperator::Value(_) => "value-comparison",
                BinaryOperator::Arithmetic(_) => "arithmetic",
                BinaryOperator::Union => "union",
                BinaryOperator::Intersect | BinaryOperator::Except => "intersect-except",
                BinaryOperator::StringConcat => "string-concat",
            },
            Expression::Negate(_) => "negate",
            Expression::FunctionCall(_) => "function-call",
            Expression::For { .. } => "for",
            Expression::Let { .. } => "let",
            Expression::If { .. } => "if",
            Expression::Quantified { .. } => "quantified",
            Expression::Cast { .. } => "cast",
            Expression::Castable { .. } => "castable",
        }
    }

    /// Direct sub-expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Literal(_)
            | Expression::ContextItem
            | Expression::Variable(_)
            | Expression::Root
            | Expression::Step(_) => Vec::new(),
            Expression::Sequence(items) | Expression::SquareArray(items) => items.iter().collect(),
            Expression::Range { start, end } => vec![start, end],
            Expression::RootPath(expr)
            | Expression::RootDescendantPath(expr)
            | Expression::Negate(expr) => vec![expr],
            Expression::Path { left, right }
            | Expression::DescendantPath { left, right }
            | Expression::SimpleMap { left, right }
            | Expression::Binary { left, right, .. } => vec![left, right],
            Expression::Filter { base, predicates } => {
                let mut children = vec![base.as_ref()];
                children.extend(predicates);
                children
            }
            Expression::CurlyArray(expr) => expr.iter().map(|e| e.as_ref()).collect(),
            Expression::Map(entries) => entries.iter().flat_map(|(k, v)| [k, v]).collect(),
            Expression::Lookup { base, key } => {
                let mut children = vec![base.as_ref()];
                if let LookupKey::Expression(expr) = key {
                    children.push(expr);
                }
                children
            }
            Expression::UnaryLookup(key) => match key {
                LookupKey::Expression(expr) => vec![expr],
                _ => Vec::new(),
            },
            Expression::FunctionCall(call) => call.arguments.iter().collect(),
            Expression::For { bindings, body } | Expression::Let { bindings, body } => {
                let mut children: Vec<&Expression> = bindings.iter().map(|b| &b.value).collect();
                children.push(body);
                children
            }
            Expression::If {
                condition,
                then_branch,
                else_branch,
            } => vec![condition, then_branch, else_branch],
            Expression::Quantified {
                bindings, satisfies, ..
            } => {
                let mut children: Vec<&Expression> = bindings.iter().map(|b| &b.value).collect();
                children.push(satisfies);
                children
            }
            Expression::Cast { expr, .. } | Expression::Castable { expr, .. } => vec![expr],
        }
    }

    /// Mutable access to the direct sub-expressions.
    pub(crate) fn children_mut(&mut self) -> Vec<&mut Expression> {
        match self {
            Expression::Literal(_)
            | Expression::ContextItem
            | Expression::Variable(_)
            | Expression::Root
            | Expression::Step(_) => Vec::new(),
            Expression::Sequence(items) | Expression::SquareArray(items) => items.iter_mut().collect(),
            Expression::Range { start, end } => vec![start, end],
            Expression::RootPath(expr)
            | Expression::RootDescendantPath(expr)
            | Expression::Negate(expr) => vec![expr],
            Expression::Path { left, right }
            | Expression::DescendantPath { left, right }
            | Expression::SimpleMap { left, right }
            | Expression::Binary { left, right, .. } => vec![left, right],
            Expression::Filter { base, predicates } => {
                let mut children = vec![base.as_mut()];
                children.extend(predicates.iter_mut());
                children
            }
            Expression::CurlyArray(expr) => expr.iter_mut().map(|e| e.as_mut()).collect(),
            Expression::Map(entries) => entries.iter_mut().flat_map(|(k, v)| [k, v]).collect(),
            Expression::Lookup { base, key } => {
                let mut children = vec![base.as_mut()];
                if let LookupKey::Expression(expr) = key {
                    children.push(expr);
                }
                children
            }
            Expression::UnaryLookup(key) => match key {
                LookupKey::Expression(expr) => vec![expr],
                _ => Vec::new(),
            },
            Expression::FunctionCall(call) => call.arguments.iter_mut().collect(),
            Expression::For { bindings, body } | Expression::Let { bindings, body } => {
                let mut children: Vec<&mut Expression> =
                    bindings.iter_mut().map(|b| &mut b.value).collect();
                children.push(body);
                children
            }
            Expression::If {
                condition,
                then_branch,
                else_branch,
            } => vec![condition, then_branch, else_branch],
            Expression::Quantified {
                bindings, satisfies, ..
            } => {
                let mut children: Vec<&mut Expression> =
                    bindings.iter_mut().map(|b| &mut b.value).collect();
                children.push(satisfies);
                children
            }
            Expression::Cast { expr, .. } | Expression::Castable { expr, .. } => vec![expr],
        }
    }

    /// Walks the tree depth-first.
    pub fn accept<V: ExpressionVisitor + ?Sized>(&self, visitor: &mut V) {
        if visitor.enter(self) {
            for child in self.children() {
                child.accept(visitor);
            }
        }
        visitor.leave(self);
    }
}

/// A depth-first walker over an expression tree.
pub trait ExpressionVisitor {
    /// Called before a node's children. Returning `false` skips them.
    fn enter(&mut self, expression: &Expression) -> bool {
        let _ = expression;
        true
    }

    /// Called after a node's children.
    fn leave(&mut self, expression: &Expression) {
        let _ = expression;
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_bindings(f: &mut fmt::Formatter<'_>, bindings: &[Binding], separator: &str) -> fmt::Result {
    for (i, binding) in bindings.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "${} {} {}", binding.name, separator, binding.value)?;
    }
    Ok(())
}

/// Prints the canonical form, with binary operations parenthesized.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(literal) => write!(f, "{literal}"),
            Expression::ContextItem => f.write_str("."),
            Expression::Variable(name) => write!(f, "${name}"),
            Expression::Sequence(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                f.write_str(")")
            }
            Expression::Range { start, end } => write!(f, "({start} to {end})"),
            Expression::Root => f.write_str("/"),
            Expression::RootPath(path) => write!(f, "/{path}"),
            Expression::RootDescendantPath(path) => write!(f, "//{path}"),
            Expression::Path { left, right } => write!(f, "{left}/{right}"),
            Expression::DescendantPath { left, right } => write!(f, "{left}//{right}"),
            Expression::Step(step) => write!(f, "{step}"),
            Expression::Filter { base, predicates } => {
                write!(f, "{base}")?;
                for predicate in predicates {
                    write!(f, "[{predicate}]")?;
                }
                Ok(())
            }
            Expression::SimpleMap { left, right } => write!(f, "({left} ! {right})"),
            Expression::SquareArray(members) => {
                f.write_str("[")?;
                write_list(f, members)?;
                f.write_str("]")
            }
            Expression::CurlyArray(None) => f.write_str("array {}"),
            Expression::CurlyArray(Some(expr)) => write!(f, "array {{{expr}}}"),
            Expression::Map(entries) => {
                f.write_str("map {")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Expression::Lookup { base, key } => write!(f, "{base}{key}"),
            Expression::UnaryLookup(key) => write!(f, "{key}"),
            Expression::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.as_str(), right)
            }
            Expression::Negate(expr) => write!(f, "-({expr})"),
            Expression::FunctionCall(call) => {
                write!(f, "{}(", call.name)?;
                write_list(f, &call.arguments)?;
                f.write_str(")")
            }
            Expression::For { bindings, body } => {
                f.write_str("(for ")?;
                write_bindings(f, bindings, "in")?;
                write!(f, " return {body})")
            }
            Expression::Let { bindings, body } => {
                f.write_str("(let ")?;
                write_bindings(f, bindings, ":=")?;
                write!(f, " return {body})")
            }
            Expression::If {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "(if ({condition}) then {then_branch} else {else_branch})"),
            Expression::Quantified {
                quantifier,
                bindings,
                satisfies,
            } => {
                f.write_str(match quantifier {
                    Quantifier::Some => "(some ",
                    Quantifier::Every => "(every ",
                })?;
                write_bindings(f, bindings, "in")?;
                write!(f, " satisfies {satisfies})")
            }
            Expression::Cast {
                expr,
                type_name,
                allow_empty,
            } => write!(
                f,
                "({} cast as {}{})",
                expr,
                type_name,
                if *allow_empty { "?" } else { "" }
            ),
            Expression::Castable {
                expr,
                type_name,
                allow_empty,
            } => write!(
                f,
                "({} castable as {}{})",
                expr,
                type_name,
                if *allow_empty { "?" } else { "" }
            ),
        }
    }
}
