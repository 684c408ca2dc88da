//! Metapath evaluation engine.
//!
//! Entry point: [`evaluate`]. Every expression is evaluated against a
//! dynamic context and a focus sequence and yields a sequence. The walk is
//! depth-first and strictly sequential: the right operand of `/`, `!` and
//! predicates is evaluated once per left item, in order, with the focus
//! reset to that single item.

use crate::ast::*;
use crate::context::DynamicContext;
use crate::error::MetapathError;
use crate::operators;
use crate::types::{ArrayItem, AtomicItem, CollectionValue, Item, MapItem, Sequence};
use metaschema_node::MetapathNode;
use std::collections::BTreeSet;

type EvalResult<N> = Result<Sequence<N>, MetapathError>;

pub fn evaluate<N: MetapathNode>(
    expr: &Expression,
    ctx: &DynamicContext<N>,
    focus: &Sequence<N>,
) -> EvalResult<N> {
    match expr {
        Expression::Literal(literal) => Ok(Sequence::from_atomic(literal_value(literal))),
        Expression::ContextItem => {
            if focus.is_empty()? {
                Err(MetapathError::focus_required("."))
            } else {
                Ok(focus.clone())
            }
        }
        Expression::Variable(name) => ctx.variable_value(name),
        Expression::Sequence(items) => {
            let parts = items
                .iter()
                .map(|item| evaluate(item, ctx, focus))
                .collect::<Result<Vec<_>, _>>()?;
            Sequence::concat(parts)
        }
        Expression::Range { start, end } => evaluate_range(start, end, ctx, focus),

        Expression::Root => Ok(Sequence::from_nodes(roots(expr, focus)?)),
        Expression::RootPath(path) => {
            let roots = Sequence::from_nodes(roots(expr, focus)?);
            evaluate(path, ctx, &roots)
        }
        Expression::RootDescendantPath(path) => descend(roots(expr, focus)?, path, ctx),
        Expression::Path { left, right } => {
            let nodes = require_nodes(&evaluate(left, ctx, focus)?, expr)?;
            apply_to_nodes(nodes, right, ctx)
        }
        Expression::DescendantPath { left, right } => {
            let nodes = require_nodes(&evaluate(left, ctx, focus)?, expr)?;
            descend(nodes, right, ctx)
        }
        Expression::Step(step) => {
            let mut nodes = BTreeSet::new();
            for node in step_focus(expr, focus)? {
                nodes.extend(axis_nodes(step, &node));
            }
            Ok(Sequence::from_nodes(nodes))
        }
        Expression::Filter { base, predicates } => evaluate_filter(base, predicates, ctx, focus),
        Expression::SimpleMap { left, right } => {
            let left = evaluate(left, ctx, focus)?;
            let mut results = Vec::new();
            for item in left.items()?.iter() {
                let mapped = evaluate(right, ctx, &Sequence::of(item.clone()))?;
                results.extend(mapped.items()?.iter().cloned());
            }
            Ok(Sequence::from_items(results))
        }

        Expression::SquareArray(members) => {
            let members = members
                .iter()
                .map(|member| evaluate(member, ctx, focus).and_then(CollectionValue::from_sequence))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Sequence::of(Item::Array(ArrayItem::from_members(members))))
        }
        Expression::CurlyArray(None) => Ok(Sequence::of(Item::Array(ArrayItem::new()))),
        Expression::CurlyArray(Some(inner)) => {
            let atomics = evaluate(inner, ctx, focus)?.atomize(ctx.types())?;
            Ok(Sequence::of(Item::Array(ArrayItem::from_items(
                atomics.into_iter().map(Item::Atomic),
            ))))
        }
        Expression::Map(entries) => evaluate_map(entries, ctx, focus),
        Expression::Lookup { base, key } => {
            let items = evaluate(base, ctx, focus)?;
            lookup(expr, &items.items()?, key, ctx, focus)
        }
        Expression::UnaryLookup(key) => {
            let items = focus.items()?;
            if items.is_empty() {
                return Err(MetapathError::focus_required(expr.to_string()));
            }
            lookup(expr, &items, key, ctx, focus)
        }

        Expression::Binary { op, left, right } => {
            evaluate_binary(expr, *op, left, right, ctx, focus)
        }
        Expression::Negate(operand) => match single_operand(operand, ctx, focus)? {
            Some(value) => Ok(Sequence::from_atomic(operators::negate(&value)?)),
            None => Ok(Sequence::empty()),
        },
        Expression::FunctionCall(call) => evaluate_function_call(call, ctx, focus),

        Expression::For { bindings, body } => {
            let mut results = Vec::new();
            evaluate_for(bindings, body, ctx, focus, &mut results)?;
            Ok(Sequence::from_items(results))
        }
        Expression::Let { bindings, body } => {
            let mut scope = ctx.clone();
            for binding in bindings {
                let value = evaluate(&binding.value, &scope, focus)?;
                scope = scope
                    .sub_context()
                    .bind_variable_value(binding.name.clone(), value);
            }
            evaluate(body, &scope, focus)
        }
        Expression::If {
            condition,
            then_branch,
            else_branch,
        } => {
            if evaluate(condition, ctx, focus)?.effective_boolean_value()? {
                evaluate(then_branch, ctx, focus)
            } else {
                evaluate(else_branch, ctx, focus)
            }
        }
        Expression::Quantified {
            quantifier,
            bindings,
            satisfies,
        } => Ok(boolean(evaluate_quantified(
            *quantifier,
            bindings,
            satisfies,
            ctx,
            focus,
        )?)),

        Expression::Cast {
            expr: operand,
            type_name,
            allow_empty,
        } => {
            let value = cast_operand(operand, type_name, *allow_empty, ctx, focus)?;
            Ok(value.map(Sequence::from_atomic).unwrap_or_default())
        }
        Expression::Castable {
            expr: operand,
            type_name,
            allow_empty,
        } => match cast_operand(operand, type_name, *allow_empty, ctx, focus) {
            Ok(_) => Ok(boolean(true)),
            Err(err) if err.is_static() => Err(err),
            Err(_) => Ok(boolean(false)),
        },
    }
}

fn boolean<N: MetapathNode>(value: bool) -> Sequence<N> {
    Sequence::from_atomic(AtomicItem::Boolean(value))
}

fn literal_value(literal: &Literal) -> AtomicItem {
    match literal {
        Literal::String(s) => AtomicItem::string(s.clone()),
        Literal::Integer(i) => AtomicItem::Integer(*i),
        Literal::Decimal(d) => AtomicItem::decimal(*d),
        Literal::Double(d) => AtomicItem::Double(*d),
    }
}

fn require_nodes<N: MetapathNode>(
    sequence: &Sequence<N>,
    expr: &Expression,
) -> Result<Vec<N>, MetapathError> {
    sequence
        .items()?
        .iter()
        .map(|item| match item {
            Item::Node(node) => Ok(node.clone()),
            other => Err(MetapathError::dynamic_type(
                format!("'{expr}' requires node items"),
                other.type_name(),
            )),
        })
        .collect()
}

/// The focus nodes of a step. A step needs a focus.
fn step_focus<N: MetapathNode>(
    expr: &Expression,
    focus: &Sequence<N>,
) -> Result<Vec<N>, MetapathError> {
    if focus.is_empty()? {
        return Err(MetapathError::focus_required(expr.to_string()));
    }
    require_nodes(focus, expr)
}

/// The distinct document roots of the focus nodes.
fn roots<N: MetapathNode>(
    expr: &Expression,
    focus: &Sequence<N>,
) -> Result<BTreeSet<N>, MetapathError> {
    Ok(step_focus(expr, focus)?
        .into_iter()
        .map(|node| node.root())
        .collect())
}

/// Evaluates `right` once per node and merges the results.
fn apply_to_nodes<N: MetapathNode>(
    nodes: impl IntoIterator<Item = N>,
    right: &Expression,
    ctx: &DynamicContext<N>,
) -> EvalResult<N> {
    let mut results = Vec::new();
    for node in nodes {
        let step = evaluate(right, ctx, &Sequence::of(Item::Node(node)))?;
        results.extend(step.items()?.iter().cloned());
    }

    // nodes come back in document order without duplicates; other items
    // keep their evaluation order
    let node_count = results.iter().filter(|item| matches!(item, Item::Node(_))).count();
    if node_count == results.len() {
        let nodes: BTreeSet<N> = results
            .into_iter()
            .filter_map(|item| match item {
                Item::Node(node) => Some(node),
                _ => None,
            })
            .collect();
        Ok(Sequence::from_nodes(nodes))
    } else if node_count == 0 {
        Ok(Sequence::from_items(results))
    } else {
        Err(MetapathError::dynamic_type(
            format!("path step '{right}' returned both nodes and non-node items"),
            "item()",
        ))
    }
}

/// `nodes//right`: applies `right` to every descendant-or-self node.
fn descend<N: MetapathNode>(
    nodes: impl IntoIterator<Item = N>,
    right: &Expression,
    ctx: &DynamicContext<N>,
) -> EvalResult<N> {
    let mut targets = BTreeSet::new();
    for node in nodes {
        targets.extend(node.descendants());
        targets.insert(node);
    }
    apply_to_nodes(targets, right, ctx)
}

/// The nodes a step selects from `node`, in axis order.
fn axis_nodes<N: MetapathNode>(step: &Step, node: &N) -> Vec<N> {
    let candidates = match step.axis {
        Axis::Child => node.children(),
        Axis::Flag => node.flags(),
        Axis::SelfAxis => vec![node.clone()],
        Axis::Parent => node.parent().into_iter().collect(),
        Axis::Ancestor => node.ancestors(),
        Axis::AncestorOrSelf => node.ancestors_or_self(),
        Axis::Descendant => node.descendants(),
        Axis::DescendantOrSelf => {
            let mut nodes = vec![node.clone()];
            nodes.extend(node.descendants());
            nodes
        }
    };
    candidates
        .into_iter()
        .filter(|candidate| matches_test(&step.test, candidate))
        .collect()
}

fn matches_test<N: MetapathNode>(test: &NodeTest, node: &N) -> bool {
    match test {
        NodeTest::AnyKind => true,
        NodeTest::Wildcard => node.name().is_some(),
        NodeTest::Name(name) => node.name().is_some_and(|qname| {
            qname.local == name.local
                && (name.namespace.is_none() || qname.namespace == name.namespace)
        }),
    }
}

fn evaluate_filter<N: MetapathNode>(
    base: &Expression,
    predicates: &[Expression],
    ctx: &DynamicContext<N>,
    focus: &Sequence<N>,
) -> EvalResult<N> {
    // positions on a step count along the axis from each focus node
    if let Expression::Step(step) = base {
        let mut nodes = BTreeSet::new();
        for node in step_focus(base, focus)? {
            let candidates = axis_nodes(step, &node).into_iter().map(Item::Node).collect();
            for item in apply_predicates(candidates, predicates, ctx)? {
                if let Item::Node(node) = item {
                    nodes.insert(node);
                }
            }
        }
        return Ok(Sequence::from_nodes(nodes));
    }

    let items = evaluate(base, ctx, focus)?.to_vec()?;
    Ok(Sequence::from_items(apply_predicates(items, predicates, ctx)?))
}

fn apply_predicates<N: MetapathNode>(
    mut items: Vec<Item<N>>,
    predicates: &[Expression],
    ctx: &DynamicContext<N>,
) -> Result<Vec<Item<N>>, MetapathError> {
    for predicate in predicates {
        let mut kept = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let result = evaluate(predicate, ctx, &Sequence::of(item.clone()))?;
            if predicate_holds(&result, index + 1)? {
                kept.push(item);
            }
        }
        items = kept;
    }
    Ok(items)
}

/// A single numeric result selects by position; anything else is tested
/// for its effective boolean value.
fn predicate_holds<N: MetapathNode>(
    result: &Sequence<N>,
    position: usize,
) -> Result<bool, MetapathError> {
    let items = result.items()?;
    if let [Item::Atomic(atomic)] = &items[..]
        && atomic.is_numeric()
    {
        return Ok(atomic.as_f64() == Some(position as f64));
    }
    result.effective_boolean_value()
}

fn evaluate_range<N: MetapathNode>(
    start: &Expression,
    end: &Expression,
    ctx: &DynamicContext<N>,
    focus: &Sequence<N>,
) -> EvalResult<N> {
    let (Some(first), Some(last)) = (
        range_bound(start, ctx, focus)?,
        range_bound(end, ctx, focus)?,
    ) else {
        return Ok(Sequence::empty());
    };
    if first > last {
        return Ok(Sequence::empty());
    }
    Ok(Sequence::from_stream(
        (first..=last).map(|i| Item::Atomic(AtomicItem::Integer(i))),
    ))
}

fn range_bound<N: MetapathNode>(
    expr: &Expression,
    ctx: &DynamicContext<N>,
    focus: &Sequence<N>,
) -> Result<Option<i64>, MetapathError> {
    let Some(value) = single_operand(expr, ctx, focus)? else {
        return Ok(None);
    };
    let value = match ctx.types().get("integer") {
        Some(adapter) if value.is_untyped() => adapter.cast(&value)?,
        _ => value,
    };
    if !value.is_integer() {
        return Err(MetapathError::dynamic_type(
            format!("range bound '{expr}' must be an integer"),
            value.type_name(),
        ));
    }
    Ok(value.as_i64())
}

/// Atomizes an operand that may hold at most one value.
fn single_operand<N: MetapathNode>(
    expr: &Expression,
    ctx: &DynamicContext<N>,
    focus: &Sequence<N>,
) -> Result<Option<AtomicItem>, MetapathError> {
    let mut atomics = evaluate(expr, ctx, focus)?.atomize(ctx.types())?;
    match atomics.len() {
        0 => Ok(None),
        1 => Ok(atomics.pop()),
        n => Err(MetapathError::cardinality(
            format!("operand '{expr}'"),
            "zero or one",
            n,
        )),
    }
}

fn evaluate_binary<N: MetapathNode>(
    expr: &Expression,
    op: BinaryOperator,
    left: &Expression,
    right: &Expression,
    ctx: &DynamicContext<N>,
    focus: &Sequence<N>,
) -> EvalResult<N> {
    match op {
        BinaryOperator::Or => Ok(boolean(
            evaluate(left, ctx, focus)?.effective_boolean_value()?
                || evaluate(right, ctx, focus)?.effective_boolean_value()?,
        )),
        BinaryOperator::And => Ok(boolean(
            evaluate(left, ctx, focus)?.effective_boolean_value()?
                && evaluate(right, ctx, focus)?.effective_boolean_value()?,
        )),
        BinaryOperator::General(comparison) => {
            let l = evaluate(left, ctx, focus)?.atomize(ctx.types())?;
            let r = evaluate(right, ctx, focus)?.atomize(ctx.types())?;
            Ok(boolean(operators::general_compare(
                comparison,
                &l,
                &r,
                ctx.types(),
            )?))
        }
        BinaryOperator::Value(comparison) => {
            match (
                single_operand(left, ctx, focus)?,
                single_operand(right, ctx, focus)?,
            ) {
                (Some(l), Some(r)) => Ok(boolean(operators::value_compare(comparison, &l, &r)?)),
                _ => Ok(Sequence::empty()),
            }
        }
        BinaryOperator::Arithmetic(arithmetic) => {
            match (
                single_operand(left, ctx, focus)?,
                single_operand(right, ctx, focus)?,
            ) {
                (Some(l), Some(r)) => Ok(Sequence::from_atomic(operators::arithmetic(
                    arithmetic, &l, &r,
                )?)),
                _ => Ok(Sequence::empty()),
            }
        }
        BinaryOperator::StringConcat => {
            let l = single_operand(left, ctx, focus)?.map(|a| a.as_string());
            let r = single_operand(right, ctx, focus)?.map(|a| a.as_string());
            Ok(Sequence::from_atomic(AtomicItem::string(
                l.unwrap_or_default() + &r.unwrap_or_default(),
            )))
        }
        BinaryOperator::Union | BinaryOperator::Intersect | BinaryOperator::Except => {
            let l: BTreeSet<N> = require_nodes(&evaluate(left, ctx, focus)?, expr)?
                .into_iter()
                .collect();
            let r: BTreeSet<N> = require_nodes(&evaluate(right, ctx, focus)?, expr)?
                .into_iter()
                .collect();
            let nodes: Vec<N> = match op {
                BinaryOperator::Union => l.union(&r).cloned().collect(),
                BinaryOperator::Intersect => l.intersection(&r).cloned().collect(),
                _ => l.difference(&r).cloned().collect(),
            };
            Ok(Sequence::from_nodes(nodes))
        }
    }
}

fn evaluate_map<N: MetapathNode>(
    entries: &[(Expression, Expression)],
    ctx: &DynamicContext<N>,
    focus: &Sequence<N>,
) -> EvalResult<N> {
    let mut values = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let keys = evaluate(key, ctx, focus)?.atomize(ctx.types())?;
        let key = match <[AtomicItem; 1]>::try_from(keys) {
            Ok([key]) => key,
            Err(keys) => {
                return Err(MetapathError::cardinality(
                    format!("map key '{key}'"),
                    "exactly one",
                    keys.len(),
                ));
            }
        };
        values.push((key, CollectionValue::from_sequence(evaluate(value, ctx, focus)?)?));
    }
    Ok(Sequence::of(Item::Map(MapItem::from_entries(values)?)))
}

fn lookup<N: MetapathNode>(
    expr: &Expression,
    items: &[Item<N>],
    key: &LookupKey,
    ctx: &DynamicContext<N>,
    focus: &Sequence<N>,
) -> EvalResult<N> {
    let keys = match key {
        LookupKey::Wildcard => None,
        LookupKey::Name(name) => Some(vec![AtomicItem::string(name.clone())]),
        LookupKey::Integer(i) => Some(vec![AtomicItem::Integer(*i)]),
        LookupKey::Expression(key) => Some(evaluate(key, ctx, focus)?.atomize(ctx.types())?),
    };

    let mut results = Vec::new();
    for item in items {
        match (item, &keys) {
            (Item::Map(map), None) => results.extend(map.values().map(CollectionValue::as_sequence)),
            (Item::Map(map), Some(keys)) => {
                for key in keys {
                    if let Some(value) = map.get(key) {
                        results.push(value.as_sequence());
                    }
                }
            }
            (Item::Array(array), None) => {
                results.extend(array.members().iter().map(CollectionValue::as_sequence))
            }
            (Item::Array(array), Some(keys)) => {
                for key in keys {
                    let position = key.as_i64().filter(|_| key.is_integer()).ok_or_else(|| {
                        MetapathError::dynamic_type("array lookup requires an integer key", key.type_name())
                    })?;
                    results.push(array.get(position)?.as_sequence());
                }
            }
            (other, _) => {
                return Err(MetapathError::dynamic_type(
                    format!("'{expr}' requires a map or an array"),
                    other.type_name(),
                ));
            }
        }
    }
    Sequence::concat(results)
}

fn evaluate_function_call<N: MetapathNode>(
    call: &FunctionCall,
    ctx: &DynamicContext<N>,
    focus: &Sequence<N>,
) -> EvalResult<N> {
    let statics = ctx.static_context();
    let namespace = match &call.name.namespace {
        Some(namespace) => namespace.as_str(),
        None => statics.function_namespace(call.name.prefix.as_deref())?,
    };
    let arity = call.arguments.len();
    let function = statics
        .functions()
        .resolve(namespace, &call.name.local, arity)
        .ok_or_else(|| MetapathError::UnknownFunction {
            name: call.name.to_string(),
            arity,
        })?;

    let arguments = call
        .arguments
        .iter()
        .map(|argument| evaluate(argument, ctx, focus))
        .collect::<Result<Vec<_>, _>>()?;
    function.invoke(arguments, ctx, focus)
}

fn evaluate_for<N: MetapathNode>(
    bindings: &[Binding],
    body: &Expression,
    ctx: &DynamicContext<N>,
    focus: &Sequence<N>,
    results: &mut Vec<Item<N>>,
) -> Result<(), MetapathError> {
    let Some((binding, rest)) = bindings.split_first() else {
        results.extend(evaluate(body, ctx, focus)?.items()?.iter().cloned());
        return Ok(());
    };
    let values = evaluate(&binding.value, ctx, focus)?;
    for item in values.items()?.iter() {
        let scope = ctx
            .sub_context()
            .bind_variable_value(binding.name.clone(), Sequence::of(item.clone()));
        evaluate_for(rest, body, &scope, focus, results)?;
    }
    Ok(())
}

fn evaluate_quantified<N: MetapathNode>(
    quantifier: Quantifier,
    bindings: &[Binding],
    satisfies: &Expression,
    ctx: &DynamicContext<N>,
    focus: &Sequence<N>,
) -> Result<bool, MetapathError> {
    let Some((binding, rest)) = bindings.split_first() else {
        return evaluate(satisfies, ctx, focus)?.effective_boolean_value();
    };
    let values = evaluate(&binding.value, ctx, focus)?;
    for item in values.items()?.iter() {
        let scope = ctx
            .sub_context()
            .bind_variable_value(binding.name.clone(), Sequence::of(item.clone()));
        let holds = evaluate_quantified(quantifier, rest, satisfies, &scope, focus)?;
        match quantifier {
            Quantifier::Some if holds => return Ok(true),
            Quantifier::Every if !holds => return Ok(false),
            _ => {}
        }
    }
    Ok(quantifier == Quantifier::Every)
}

fn cast_operand<N: MetapathNode>(
    expr: &Expression,
    type_name: &EQName,
    allow_empty: bool,
    ctx: &DynamicContext<N>,
    focus: &Sequence<N>,
) -> Result<Option<AtomicItem>, MetapathError> {
    let adapter = ctx.types().get(&type_name.local).ok_or_else(|| {
        MetapathError::StaticType(format!("unknown atomic type '{type_name}'"))
    })?;
    let atomics = evaluate(expr, ctx, focus)?.atomize(ctx.types())?;
    match &atomics[..] {
        [] if allow_empty => Ok(None),
        [value] => adapter.cast(value).map(Some),
        _ => Err(MetapathError::cardinality(
            format!("cast as {type_name}"),
            if allow_empty { "zero or one" } else { "exactly one" },
            atomics.len(),
        )),
    }
}
