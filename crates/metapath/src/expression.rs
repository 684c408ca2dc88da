//! Compiled Metapath expressions.
//!
//! [`MetapathExpression::compile`] parses the text and resolves it against a
//! static context: namespace prefixes are bound, every function call is
//! checked to exist at its arity and every cast target must be a registered
//! atomic type. A compiled expression is immutable and can be evaluated any
//! number of times, from any thread, each time with its own dynamic context.

use crate::ast::{Expression, NodeTest, Step};
use crate::context::{DynamicContext, StaticContext};
use crate::engine;
use crate::error::MetapathError;
use crate::parser::parse_expression;
use crate::types::{Item, Sequence};
use metaschema_node::MetapathNode;
use std::fmt;

/// The shape a caller wants an evaluation result in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    Sequence,
    /// Zero or one item.
    Item,
    /// The effective boolean value.
    Boolean,
    /// The string value of the single item, or `""` for an empty result.
    String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationResult<N: MetapathNode> {
    Sequence(Sequence<N>),
    Item(Option<Item<N>>),
    Boolean(bool),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetapathExpression {
    text: String,
    ast: Expression,
}

impl MetapathExpression {
    pub fn compile<N: MetapathNode>(
        text: &str,
        static_context: &StaticContext<N>,
    ) -> Result<Self, MetapathError> {
        let mut ast = parse_expression(text)?;
        resolve(&mut ast, static_context)?;
        log::debug!("Compiled metapath '{}' ({})", text, ast.kind_name());
        Ok(Self {
            text: text.to_string(),
            ast,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn ast(&self) -> &Expression {
        &self.ast
    }

    /// Evaluates with an optional single focus item.
    pub fn evaluate<N: MetapathNode>(
        &self,
        focus: Option<Item<N>>,
        context: &DynamicContext<N>,
    ) -> Result<Sequence<N>, MetapathError> {
        let focus = focus.map(Sequence::of).unwrap_or_default();
        self.evaluate_with_focus(&focus, context)
    }

    pub fn evaluate_with_focus<N: MetapathNode>(
        &self,
        focus: &Sequence<N>,
        context: &DynamicContext<N>,
    ) -> Result<Sequence<N>, MetapathError> {
        log::trace!("Evaluating metapath '{}'", self.text);
        engine::evaluate(&self.ast, context, focus)
    }

    pub fn evaluate_as<N: MetapathNode>(
        &self,
        focus: Option<Item<N>>,
        context: &DynamicContext<N>,
        result_type: ResultType,
    ) -> Result<EvaluationResult<N>, MetapathError> {
        let result = self.evaluate(focus, context)?;
        Ok(match result_type {
            ResultType::Sequence => EvaluationResult::Sequence(result),
            ResultType::Item => EvaluationResult::Item(result.first_item(true)?),
            ResultType::Boolean => EvaluationResult::Boolean(result.effective_boolean_value()?),
            ResultType::String => EvaluationResult::String(match result.first_item(true)? {
                Some(item) => item.string_value()?,
                None => String::new(),
            }),
        })
    }
}

impl fmt::Display for MetapathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Binds names in the tree to the static context, depth-first.
fn resolve<N: MetapathNode>(
    expr: &mut Expression,
    static_context: &StaticContext<N>,
) -> Result<(), MetapathError> {
    match expr {
        Expression::FunctionCall(call) if call.name.namespace.is_none() => {
            let namespace = static_context.function_namespace(call.name.prefix.as_deref())?;
            let arity = call.arguments.len();
            if static_context
                .functions()
                .resolve(namespace, &call.name.local, arity)
                .is_none()
            {
                return Err(MetapathError::UnknownFunction {
                    name: call.name.to_string(),
                    arity,
                });
            }
            call.name.namespace = Some(namespace.to_string());
        }
        Expression::Step(Step {
            test: NodeTest::Name(name),
            ..
        }) => {
            if let Some(prefix) = &name.prefix {
                let namespace = static_context.namespace_for_prefix(prefix).ok_or_else(|| {
                    MetapathError::UnboundPrefix {
                        prefix: prefix.clone(),
                    }
                })?;
                name.namespace = Some(namespace.to_string());
            }
        }
        Expression::Cast { type_name, .. } | Expression::Castable { type_name, .. } => {
            if static_context.types().get(&type_name.local).is_none() {
                return Err(MetapathError::StaticType(format!(
                    "unknown atomic type '{type_name}'"
                )));
            }
        }
        _ => {}
    }
    for child in expr.children_mut() {
        resolve(child, static_context)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AtomicItem;
    use metaschema_node::SimpleNode;
    use std::sync::Arc;

    const NS: &str = "http://example.com/ns/catalog";

    fn static_context() -> Arc<StaticContext<SimpleNode>> {
        Arc::new(
            StaticContext::builder()
                .namespace("c", NS)
                .namespace("other", "http://example.com/ns/other")
                .build(),
        )
    }

    fn document() -> SimpleNode {
        SimpleNode::document()
            .child(
                SimpleNode::assembly("catalog")
                    .namespace(NS)
                    .flag("id", "cat-1")
                    .child(SimpleNode::field("title", "Catalog").namespace(NS)),
            )
            .build()
    }

    fn run(text: &str, focus: Option<Item<SimpleNode>>) -> Result<Sequence<SimpleNode>, MetapathError> {
        let statics = static_context();
        let expression = MetapathExpression::compile(text, &statics)?;
        expression.evaluate(focus, &DynamicContext::new(statics))
    }

    #[test]
    fn test_compile_and_evaluate() {
        let result = run("fn:count(1 to 3) + count(())", None).unwrap();
        assert_eq!(result, Sequence::from_atomic(AtomicItem::Integer(3)));
    }

    #[test]
    fn test_compile_keeps_text() {
        let statics = static_context();
        let expression = MetapathExpression::compile(" @id = 'x' ", &statics).unwrap();
        assert_eq!(expression.text(), " @id = 'x' ");
        assert_eq!(expression.to_string(), " @id = 'x' ");
        assert_eq!(expression.ast().kind_name(), "general-comparison");
    }

    #[test]
    fn test_static_errors() {
        let statics = static_context();
        let err = MetapathExpression::compile("exists(nope(1))", &statics).unwrap_err();
        assert_eq!(
            err,
            MetapathError::UnknownFunction {
                name: "nope".into(),
                arity: 1
            }
        );

        let err = MetapathExpression::compile("count(1, 2)", &statics).unwrap_err();
        assert!(matches!(err, MetapathError::UnknownFunction { arity: 2, .. }));

        let err = MetapathExpression::compile("x:title", &statics).unwrap_err();
        assert_eq!(err, MetapathError::UnboundPrefix { prefix: "x".into() });

        let err = MetapathExpression::compile("1 castable as nope", &statics).unwrap_err();
        assert!(matches!(err, MetapathError::StaticType(_)));

        assert!(MetapathExpression::compile("1 +", &statics).unwrap_err().is_static());
    }

    #[test]
    fn test_prefixed_name_tests() {
        let focus = Some(Item::Node(document()));
        let title = run("/c:catalog/c:title", focus.clone()).unwrap();
        assert_eq!(title.len().unwrap(), 1);

        let unprefixed = run("/catalog/title", focus.clone()).unwrap();
        assert_eq!(unprefixed.len().unwrap(), 1);

        let other = run("/other:catalog", focus).unwrap();
        assert!(other.is_empty().unwrap());
    }

    #[test]
    fn test_evaluate_as() {
        let statics = static_context();
        let ctx = DynamicContext::new(statics.clone());
        let focus = Some(Item::Node(document()));

        let expression = MetapathExpression::compile("/catalog/@id", &statics).unwrap();
        assert_eq!(
            expression
                .evaluate_as(focus.clone(), &ctx, ResultType::String)
                .unwrap(),
            EvaluationResult::String("cat-1".into())
        );
        assert_eq!(
            expression
                .evaluate_as(focus.clone(), &ctx, ResultType::Boolean)
                .unwrap(),
            EvaluationResult::Boolean(true)
        );

        let missing = MetapathExpression::compile("/catalog/@missing", &statics).unwrap();
        assert_eq!(
            missing.evaluate_as(focus, &ctx, ResultType::String).unwrap(),
            EvaluationResult::String(String::new())
        );

        let many = MetapathExpression::compile("(1, 2)", &statics).unwrap();
        assert!(matches!(
            many.evaluate_as::<SimpleNode>(None, &ctx, ResultType::Item),
            Err(MetapathError::Cardinality { .. })
        ));
        assert_eq!(
            many.evaluate_as::<SimpleNode>(None, &ctx, ResultType::Sequence)
                .unwrap(),
            EvaluationResult::Sequence(Sequence::from_items(vec![
                AtomicItem::Integer(1).into(),
                AtomicItem::Integer(2).into(),
            ]))
        );
    }
}
