//! Execution context shared by every level of one query execution.

use crate::completion::{DefaultValueCompleter, ValueCompleter};
use crate::error::{ErrorSink, FetchErrorHandler, FieldError, SimpleFetchErrorHandler};
use crate::executor::ExecutorConfig;
use crate::instrumentation::{Instrumentation, NoOpInstrumentation};
use crate::query::FragmentMap;
use crate::resolver::ResolverMap;
use crate::schema::Schema;
use crate::strategy::{AsyncExecutionStrategy, ExecutionStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifier of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExecutionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ExecutionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request-scoped data handed to resolvers.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Request-scoped data.
    pub data: HashMap<String, Value>,
    /// Variables from the request.
    pub variables: HashMap<String, Value>,
}

impl Context {
    /// Creates a new context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context with variables.
    pub fn with_variables(variables: HashMap<String, Value>) -> Self {
        Self {
            data: HashMap::new(),
            variables,
        }
    }

    /// Sets a value in the context.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.data.insert(key.into(), v);
        }
    }

    /// Gets a value from the context.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Gets a variable as a specific type.
    pub fn variable_as<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Option<T> {
        self.variables
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// State of one execution. Everything is read-only except the error sink,
/// which only grows.
pub struct ExecutionContext {
    execution_id: ExecutionId,
    schema: Arc<Schema>,
    fragments: Arc<FragmentMap>,
    root: Arc<Value>,
    context: Arc<Context>,
    errors: ErrorSink,
    resolvers: Arc<ResolverMap>,
    instrumentation: Arc<dyn Instrumentation>,
    error_handler: Arc<dyn FetchErrorHandler>,
    completer: Arc<dyn ValueCompleter>,
    strategy: Arc<dyn ExecutionStrategy>,
    config: ExecutorConfig,
}

impl ExecutionContext {
    /// Starts building a context over `schema`.
    pub fn builder(schema: Arc<Schema>) -> ExecutionContextBuilder {
        ExecutionContextBuilder::new(schema)
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn fragments(&self) -> &Arc<FragmentMap> {
        &self.fragments
    }

    /// The value the root level resolves against.
    pub fn root(&self) -> &Arc<Value> {
        &self.root
    }

    /// Request-scoped data.
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.context.variables
    }

    pub fn resolvers(&self) -> &ResolverMap {
        &self.resolvers
    }

    pub fn instrumentation(&self) -> &dyn Instrumentation {
        self.instrumentation.as_ref()
    }

    pub fn error_handler(&self) -> &dyn FetchErrorHandler {
        self.error_handler.as_ref()
    }

    pub fn completer(&self) -> &dyn ValueCompleter {
        self.completer.as_ref()
    }

    /// Strategy used for every level below the root.
    pub fn strategy(&self) -> &dyn ExecutionStrategy {
        self.strategy.as_ref()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn errors(&self) -> &ErrorSink {
        &self.errors
    }

    /// Records an error.
    pub fn add_error(&self, error: FieldError) {
        self.errors.push(error);
    }

    /// Records several errors.
    pub fn add_errors(&self, errors: impl IntoIterator<Item = FieldError>) {
        self.errors.extend(errors);
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("fragments", &self.fragments.len())
            .field("errors", &self.errors.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ExecutionContext`].
pub struct ExecutionContextBuilder {
    execution_id: Option<ExecutionId>,
    schema: Arc<Schema>,
    fragments: Arc<FragmentMap>,
    root: Arc<Value>,
    context: Arc<Context>,
    resolvers: Arc<ResolverMap>,
    instrumentation: Arc<dyn Instrumentation>,
    error_handler: Arc<dyn FetchErrorHandler>,
    completer: Arc<dyn ValueCompleter>,
    strategy: Arc<dyn ExecutionStrategy>,
    config: ExecutorConfig,
}

impl ExecutionContextBuilder {
    fn new(schema: Arc<Schema>) -> Self {
        Self {
            execution_id: None,
            schema,
            fragments: Arc::new(FragmentMap::default()),
            root: Arc::new(Value::Object(serde_json::Map::new())),
            context: Arc::new(Context::new()),
            resolvers: Arc::new(ResolverMap::new()),
            instrumentation: Arc::new(NoOpInstrumentation),
            error_handler: Arc::new(SimpleFetchErrorHandler),
            completer: Arc::new(DefaultValueCompleter),
            strategy: Arc::new(AsyncExecutionStrategy),
            config: ExecutorConfig::default(),
        }
    }

    pub fn execution_id(mut self, id: ExecutionId) -> Self {
        self.execution_id = Some(id);
        self
    }

    pub fn fragments(mut self, fragments: Arc<FragmentMap>) -> Self {
        self.fragments = fragments;
        self
    }

    pub fn root(mut self, root: Value) -> Self {
        self.root = Arc::new(root);
        self
    }

    pub fn context(mut self, context: Arc<Context>) -> Self {
        self.context = context;
        self
    }

    pub fn resolvers(mut self, resolvers: Arc<ResolverMap>) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn instrumentation(mut self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    pub fn error_handler(mut self, handler: Arc<dyn FetchErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    pub fn completer(mut self, completer: Arc<dyn ValueCompleter>) -> Self {
        self.completer = completer;
        self
    }

    pub fn strategy(mut self, strategy: Arc<dyn ExecutionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ExecutionContext {
        ExecutionContext {
            execution_id: self.execution_id.unwrap_or_else(ExecutionId::generate),
            schema: self.schema,
            fragments: self.fragments,
            root: self.root,
            context: self.context,
            errors: ErrorSink::new(),
            resolvers: self.resolvers,
            instrumentation: self.instrumentation,
            error_handler: self.error_handler,
            completer: self.completer,
            strategy: self.strategy,
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context() {
        let mut ctx = Context::new();
        ctx.set("user_id", "123");

        assert_eq!(ctx.get::<String>("user_id"), Some("123".to_string()));
        assert_eq!(ctx.get::<String>("missing"), None);
    }

    #[test]
    fn test_context_with_variables() {
        let mut vars = HashMap::new();
        vars.insert("id".to_string(), serde_json::json!("42"));

        let ctx = Context::with_variables(vars);
        assert_eq!(ctx.variable("id"), Some(&serde_json::json!("42")));
        assert_eq!(ctx.variable_as::<String>("id"), Some("42".to_string()));
    }

    #[test]
    fn test_execution_ids_are_unique() {
        let schema = Arc::new(Schema::new());
        let a = ExecutionContext::builder(Arc::clone(&schema)).build();
        let b = ExecutionContext::builder(schema)
            .execution_id(ExecutionId::from("fixed"))
            .build();

        assert_ne!(a.execution_id(), b.execution_id());
        assert_eq!(b.execution_id().as_str(), "fixed");
        assert!(a.errors().is_empty());
    }
}
