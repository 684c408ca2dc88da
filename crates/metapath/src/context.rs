//! Compile-time and run-time evaluation environments.

use crate::datatype::TypeRegistry;
use crate::datatype::temporal::DateTime;
use crate::error::MetapathError;
use crate::functions::FunctionLibrary;
use crate::types::Sequence;
use indexmap::IndexMap;
use metaschema_node::MetapathNode;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

/// Namespace of the Metapath data types and cast functions.
pub const META_NS: &str = "http://csrc.nist.gov/ns/metaschema/metapath";
/// Namespace of the core function library.
pub const FN_NS: &str = "http://csrc.nist.gov/ns/metaschema/metapath-functions";
pub const ARRAY_NS: &str = "http://csrc.nist.gov/ns/metaschema/metapath-functions/array";
pub const MAP_NS: &str = "http://csrc.nist.gov/ns/metaschema/metapath-functions/map";

/// Immutable compile-time environment, shareable across threads.
pub struct StaticContext<N> {
    base_uri: Option<Url>,
    default_function_namespace: String,
    namespaces: IndexMap<String, String>,
    functions: Arc<FunctionLibrary<N>>,
    types: Arc<TypeRegistry>,
}

impl<N: MetapathNode> StaticContext<N> {
    /// A context with the built-in functions, types and prefixes.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> StaticContextBuilder<N> {
        StaticContextBuilder::new()
    }

    pub fn base_uri(&self) -> Option<&Url> {
        self.base_uri.as_ref()
    }

    pub fn default_function_namespace(&self) -> &str {
        &self.default_function_namespace
    }

    pub fn namespace_for_prefix(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &str)> {
        self.namespaces
            .iter()
            .map(|(prefix, uri)| (prefix.as_str(), uri.as_str()))
    }

    pub fn functions(&self) -> &FunctionLibrary<N> {
        &self.functions
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// The namespace a function name refers to: the bound namespace of its
    /// prefix, or the default function namespace.
    pub fn function_namespace(&self, prefix: Option<&str>) -> Result<&str, MetapathError> {
        match prefix {
            None => Ok(&self.default_function_namespace),
            Some(prefix) => {
                self.namespace_for_prefix(prefix)
                    .ok_or_else(|| MetapathError::UnboundPrefix {
                        prefix: prefix.to_string(),
                    })
            }
        }
    }
}

impl<N: MetapathNode> Default for StaticContext<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> fmt::Debug for StaticContext<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticContext")
            .field("base_uri", &self.base_uri)
            .field("default_function_namespace", &self.default_function_namespace)
            .field("namespaces", &self.namespaces)
            .finish_non_exhaustive()
    }
}

pub struct StaticContextBuilder<N> {
    base_uri: Option<Url>,
    default_function_namespace: String,
    namespaces: IndexMap<String, String>,
    functions: Option<Arc<FunctionLibrary<N>>>,
    types: Option<Arc<TypeRegistry>>,
}

impl<N: MetapathNode> StaticContextBuilder<N> {
    fn new() -> Self {
        let namespaces = [("meta", META_NS), ("fn", FN_NS), ("array", ARRAY_NS), ("map", MAP_NS)]
            .into_iter()
            .map(|(prefix, uri)| (prefix.to_string(), uri.to_string()))
            .collect();
        Self {
            base_uri: None,
            default_function_namespace: FN_NS.to_string(),
            namespaces,
            functions: None,
            types: None,
        }
    }

    pub fn base_uri(mut self, base_uri: Url) -> Self {
        self.base_uri = Some(base_uri);
        self
    }

    pub fn namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    pub fn default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.default_function_namespace = uri.into();
        self
    }

    pub fn functions(mut self, functions: Arc<FunctionLibrary<N>>) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn types(mut self, types: Arc<TypeRegistry>) -> Self {
        self.types = Some(types);
        self
    }

    pub fn build(self) -> StaticContext<N> {
        StaticContext {
            base_uri: self.base_uri,
            default_function_namespace: self.default_function_namespace,
            namespaces: self.namespaces,
            functions: self
                .functions
                .unwrap_or_else(|| Arc::new(FunctionLibrary::builtin())),
            types: self
                .types
                .unwrap_or_else(|| Arc::new(TypeRegistry::builtin())),
        }
    }
}

/// Resolves document URIs to node trees for `fn:doc`.
pub trait DocumentLoader<N>: Send + Sync {
    fn load(&self, uri: &Url) -> Result<N, MetapathError>;
}

impl<N, F> DocumentLoader<N> for F
where
    F: Fn(&Url) -> Result<N, MetapathError> + Send + Sync,
{
    fn load(&self, uri: &Url) -> Result<N, MetapathError> {
        self(uri)
    }
}

struct SharedState<N> {
    static_context: Arc<StaticContext<N>>,
    current_date_time: DateTime,
    document_loader: Option<Arc<dyn DocumentLoader<N>>>,
    documents: Mutex<HashMap<Url, N>>,
}

struct VariableFrame<N> {
    name: String,
    value: Sequence<N>,
    parent: Option<Arc<VariableFrame<N>>>,
}

/// Run-time environment of one evaluation.
///
/// Cloning is cheap. Variable bindings form an immutable chain, so a binding
/// added to a sub-context is never visible to its parent or siblings. The
/// current date-time and the document cache are shared by every
/// sub-context derived from the same root.
pub struct DynamicContext<N> {
    shared: Arc<SharedState<N>>,
    variables: Option<Arc<VariableFrame<N>>>,
}

impl<N> Clone for DynamicContext<N> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            variables: self.variables.clone(),
        }
    }
}

impl<N: MetapathNode> DynamicContext<N> {
    pub fn new(static_context: Arc<StaticContext<N>>) -> Self {
        Self::builder(static_context).build()
    }

    pub fn builder(static_context: Arc<StaticContext<N>>) -> DynamicContextBuilder<N> {
        DynamicContextBuilder {
            static_context,
            current_date_time: None,
            document_loader: None,
            variables: Vec::new(),
        }
    }

    pub fn static_context(&self) -> &StaticContext<N> {
        &self.shared.static_context
    }

    pub fn static_context_arc(&self) -> Arc<StaticContext<N>> {
        Arc::clone(&self.shared.static_context)
    }

    pub fn types(&self) -> &TypeRegistry {
        self.shared.static_context.types()
    }

    /// The date-time fixed when this context was created.
    pub fn current_date_time(&self) -> &DateTime {
        &self.shared.current_date_time
    }

    /// A child context sharing this context's bindings.
    pub fn sub_context(&self) -> Self {
        self.clone()
    }

    /// Adds a binding in front of the existing chain.
    pub fn bind_variable_value(mut self, name: impl Into<String>, value: Sequence<N>) -> Self {
        self.variables = Some(Arc::new(VariableFrame {
            name: name.into(),
            value,
            parent: self.variables.take(),
        }));
        self
    }

    /// Looks a variable up from the innermost binding outward.
    pub fn variable_value(&self, name: &str) -> Result<Sequence<N>, MetapathError> {
        let mut frame = self.variables.as_deref();
        while let Some(current) = frame {
            if current.name == name {
                return Ok(current.value.clone());
            }
            frame = current.parent.as_deref();
        }
        Err(MetapathError::UnboundVariable {
            name: name.to_string(),
        })
    }

    /// Loads a document through the configured loader. Each URI is loaded at
    /// most once per context.
    pub fn load_document(&self, uri: &Url) -> Result<N, MetapathError> {
        if let Some(document) = self
            .shared
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
        {
            log::trace!("Document cache hit for {uri}");
            return Ok(document.clone());
        }
        let loader = self
            .shared
            .document_loader
            .as_ref()
            .ok_or_else(|| MetapathError::Document {
                uri: uri.to_string(),
                message: "no document loader is configured".to_string(),
            })?;
        log::debug!("Loading document {uri}");
        let document = loader.load(uri)?;
        Ok(self
            .shared
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(uri.clone())
            .or_insert(document)
            .clone())
    }
}

impl<N> fmt::Debug for DynamicContext<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        let mut frame = self.variables.as_deref();
        while let Some(current) = frame {
            names.push(current.name.as_str());
            frame = current.parent.as_deref();
        }
        f.debug_struct("DynamicContext")
            .field("current_date_time", &self.shared.current_date_time)
            .field("variables", &names)
            .finish_non_exhaustive()
    }
}

pub struct DynamicContextBuilder<N> {
    static_context: Arc<StaticContext<N>>,
    current_date_time: Option<DateTime>,
    document_loader: Option<Arc<dyn DocumentLoader<N>>>,
    variables: Vec<(String, Sequence<N>)>,
}

impl<N: MetapathNode> DynamicContextBuilder<N> {
    /// Fixes the current date-time instead of reading the clock.
    pub fn current_date_time(mut self, value: DateTime) -> Self {
        self.current_date_time = Some(value);
        self
    }

    pub fn document_loader(mut self, loader: impl DocumentLoader<N> + 'static) -> Self {
        self.document_loader = Some(Arc::new(loader));
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: Sequence<N>) -> Self {
        self.variables.push((name.into(), value));
        self
    }

    pub fn build(self) -> DynamicContext<N> {
        let context = DynamicContext {
            shared: Arc::new(SharedState {
                static_context: self.static_context,
                current_date_time: self.current_date_time.unwrap_or_else(DateTime::now),
                document_loader: self.document_loader,
                documents: Mutex::new(HashMap::new()),
            }),
            variables: None,
        };
        self.variables
            .into_iter()
            .fold(context, |context, (name, value)| {
                context.bind_variable_value(name, value)
            })
    }
}
