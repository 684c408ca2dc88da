mod common;

use common::fixtures::catalog;
use common::{Engine, TestResult};
use metaschema::{
    AtomicItem, EvaluationResult, Item, MetapathError, MetapathExpression, ResultType, Sequence,
    SimpleNode,
};
use serde_json::json;

#[test]
fn test_simple_map_over_sequence() -> TestResult {
    let engine = Engine::new();
    let result = engine.eval("(1, 2, 3) ! (. * 2)", None)?;
    assert_eq!(result.to_json()?, json!([2, 4, 6]));
    Ok(())
}

#[test]
fn test_navigation_over_catalog() -> TestResult {
    let engine = Engine::new();
    let doc = catalog();

    assert_eq!(
        engine.eval_strings("//control/@id", Some(&doc))?,
        ["ac-1", "ac-2", "au-1"]
    );
    assert_eq!(
        engine.eval_strings("//group[@id = 'au']/control[1]/title", Some(&doc))?,
        ["Audit Policy"]
    );
    assert_eq!(
        engine.eval_strings("//control[not(@id)]/title", Some(&doc))?,
        ["Draft"]
    );
    assert_eq!(
        engine.eval_strings("//link/ancestor::control/@id", Some(&doc))?,
        ["ac-1", "ac-2"]
    );
    assert_eq!(
        engine.eval_strings("(//title)[1] ! path(.)", Some(&doc))?,
        ["/catalog[1]/title[1]"]
    );
    Ok(())
}

#[test]
fn test_typed_flags_atomize_by_data_type() -> TestResult {
    let engine = Engine::new();
    let doc = catalog();

    let total = engine.eval("sum(//control/@weight) eq 4", Some(&doc))?;
    assert_eq!(total, Sequence::from_atomic(AtomicItem::Boolean(true)));

    let heaviest = engine.eval_strings("//control[@weight = max(//control/@weight)]/@id", Some(&doc))?;
    assert_eq!(heaviest, ["ac-2"]);
    Ok(())
}

#[test]
fn test_array_get_bounds() {
    let engine = Engine::new();
    assert_eq!(
        engine.eval("array:get([10, 20, 30], 0)", None).unwrap_err(),
        MetapathError::ArrayIndexOutOfBounds { index: 0, size: 3 }
    );
    assert_eq!(
        engine.eval("array:get([10, 20, 30], 4)", None).unwrap_err(),
        MetapathError::ArrayIndexOutOfBounds { index: 4, size: 3 }
    );
    assert_eq!(
        engine.eval("array:get([10, 20, 30], 3)", None).unwrap(),
        Sequence::from_atomic(AtomicItem::Integer(30))
    );
}

#[test]
fn test_boolean_casts_to_decimal() -> TestResult {
    let engine = Engine::new();
    assert_eq!(
        engine.eval("meta:decimal(true()) eq 1", None)?,
        Sequence::from_atomic(AtomicItem::Boolean(true))
    );
    assert_eq!(
        engine.eval("(false() cast as decimal) eq 0", None)?,
        Sequence::from_atomic(AtomicItem::Boolean(true))
    );
    Ok(())
}

#[test]
fn test_invalid_dates_are_rejected() {
    let engine = Engine::new();
    assert!(engine.eval("meta:date('2023-02-29')", None).is_err());
    assert!(engine.eval("meta:date('2024-02-29')", None).is_ok());
    assert_eq!(
        engine.eval("'2023-02-29' castable as date", None).unwrap(),
        Sequence::from_atomic(AtomicItem::Boolean(false))
    );
}

#[test]
fn test_maps_and_arrays_convert_to_json() -> TestResult {
    let engine = Engine::new();
    let result = engine.eval("map { 'a': 1, 'b': [true(), 'x'] }", None)?;
    assert_eq!(result.to_json()?, json!({"a": 1, "b": [true, "x"]}));

    let merged = engine.eval(
        "map:merge((map { 'k': 1 }, map { 'k': 2 }))?k",
        None,
    )?;
    assert_eq!(merged, Sequence::from_atomic(AtomicItem::Integer(1)));
    Ok(())
}

#[test]
fn test_duplicate_map_constructor_keys() {
    let engine = Engine::new();
    let err = engine.eval("map { 1: 'a', 1.0: 'b' }", None).unwrap_err();
    assert!(matches!(err, MetapathError::DuplicateMapKey { .. }));
}

#[test]
fn test_evaluate_as_result_types() -> TestResult {
    let engine = Engine::new();
    let doc = catalog();
    let focus = Some(Item::Node(doc));

    let title = MetapathExpression::compile("/catalog/title", &engine.statics)?;
    assert_eq!(
        title.evaluate_as(focus.clone(), &engine.dynamic, ResultType::String)?,
        EvaluationResult::String("Security Controls".into())
    );

    let missing = MetapathExpression::compile("/catalog/missing", &engine.statics)?;
    assert_eq!(
        missing.evaluate_as(focus.clone(), &engine.dynamic, ResultType::Item)?,
        EvaluationResult::Item(None)
    );
    assert_eq!(
        missing.evaluate_as(focus, &engine.dynamic, ResultType::Boolean)?,
        EvaluationResult::Boolean(false)
    );
    Ok(())
}

#[test]
fn test_one_shot_stream_is_consumed_once() {
    let sequence: Sequence<SimpleNode> =
        Sequence::from_stream((1..=3).map(|i| Item::Atomic(AtomicItem::Integer(i))));
    let first: Vec<_> = sequence.stream().unwrap().collect();
    assert_eq!(first.len(), 3);
    assert!(matches!(sequence.stream(), Err(MetapathError::SequenceConsumed)));
}

#[test]
fn test_compiled_expression_shared_across_threads() -> TestResult {
    let engine = Engine::new();
    let expression = MetapathExpression::compile("count(//control) + $offset", &engine.statics)?;
    let doc = catalog();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4_i64)
            .map(|offset| {
                let expression = &expression;
                let statics = engine.statics.clone();
                let doc = doc.clone();
                scope.spawn(move || {
                    let ctx = metaschema::DynamicContext::builder(statics)
                        .variable("offset", Sequence::from_atomic(AtomicItem::Integer(offset)))
                        .build();
                    expression.evaluate(Some(Item::Node(doc)), &ctx)
                })
            })
            .collect();
        for (offset, handle) in handles.into_iter().enumerate() {
            let result = handle.join().expect("worker panicked").expect("evaluation failed");
            assert_eq!(
                result,
                Sequence::from_atomic(AtomicItem::Integer(4 + offset as i64))
            );
        }
    });
    Ok(())
}

#[test]
fn test_static_errors_surface_at_compile_time() {
    let engine = Engine::new();
    assert!(matches!(
        MetapathExpression::compile("fn:no-such-function()", &engine.statics),
        Err(MetapathError::UnknownFunction { .. })
    ));
    assert!(matches!(
        MetapathExpression::compile("//control[", &engine.statics),
        Err(MetapathError::Syntax { .. })
    ));
}
