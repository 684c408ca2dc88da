pub mod fixtures;

use metaschema::{DynamicContext, Item, MetapathError, MetapathExpression, Sequence, SimpleNode, StaticContext};
use std::sync::Arc;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A static context plus one dynamic context for evaluating test expressions.
pub struct Engine {
    pub statics: Arc<StaticContext<SimpleNode>>,
    pub dynamic: DynamicContext<SimpleNode>,
}

impl Engine {
    pub fn new() -> Self {
        init_logging();
        let statics = Arc::new(StaticContext::new());
        let dynamic = DynamicContext::new(statics.clone());
        Self { statics, dynamic }
    }

    /// Compiles and evaluates `text` with `focus` as the context item.
    pub fn eval(&self, text: &str, focus: Option<&SimpleNode>) -> Result<Sequence<SimpleNode>, MetapathError> {
        let expression = MetapathExpression::compile(text, &self.statics)?;
        expression.evaluate(focus.cloned().map(Item::Node), &self.dynamic)
    }

    /// Evaluates `text` and returns the string value of every result item.
    pub fn eval_strings(&self, text: &str, focus: Option<&SimpleNode>) -> Result<Vec<String>, MetapathError> {
        self.eval(text, focus)?
            .items()?
            .iter()
            .map(Item::string_value)
            .collect()
    }

    /// Evaluates `text` and keeps the node results.
    pub fn nodes(&self, text: &str, focus: &SimpleNode) -> Result<Vec<SimpleNode>, MetapathError> {
        Ok(self
            .eval(text, Some(focus))?
            .items()?
            .iter()
            .filter_map(|item| item.as_node().cloned())
            .collect())
    }
}
