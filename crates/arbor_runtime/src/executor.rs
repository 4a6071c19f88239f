//! Query execution for Arbor.

use crate::collect::collect_fields;
use crate::context::{Context, ExecutionContext, ExecutionId};
use crate::error::{ExecutionError, FetchErrorHandler, FieldError, SimpleFetchErrorHandler};
use crate::instrumentation::{
    ChainedInstrumentation, Instrumentation, NoOpInstrumentation, TracingInstrumentation,
};
use crate::parameters::{ExecutionParameters, TypeInfo};
use crate::query::{FragmentDefinition, FragmentMap, Operation, OperationKind};
use crate::resolver::ResolverMap;
use crate::schema::{Schema, TypeRef};
use crate::strategy::{AsyncExecutionStrategy, ExecutionStrategy, SerialExecutionStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Emit tracing spans for every field and fetch.
    pub tracing: bool,
    /// Turn resolver panics into field errors.
    pub catch_panics: bool,
    /// Log fetch failures at warn level.
    pub log_fetch_errors: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            tracing: false,
            catch_panics: true,
            log_fetch_errors: true,
        }
    }
}

impl ExecutorConfig {
    /// Parses a JSON configuration. Missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// The query executor.
pub struct Executor {
    config: ExecutorConfig,
    resolvers: Arc<ResolverMap>,
    instrumentation: Arc<dyn Instrumentation>,
    error_handler: Arc<dyn FetchErrorHandler>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("resolvers", &self.resolvers)
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Creates a new executor.
    pub fn new() -> Self {
        Self::new_with(ExecutorConfig::default(), ResolverMap::new())
    }

    /// Creates an executor with configuration.
    pub fn with_config(config: ExecutorConfig) -> Self {
        Self::new_with(config, ResolverMap::new())
    }

    /// Creates an executor with resolvers.
    pub fn with_resolvers(resolvers: ResolverMap) -> Self {
        Self::new_with(ExecutorConfig::default(), resolvers)
    }

    /// Creates an executor with config and resolvers.
    pub fn new_with(config: ExecutorConfig, resolvers: ResolverMap) -> Self {
        Self {
            config,
            resolvers: Arc::new(resolvers),
            instrumentation: Arc::new(NoOpInstrumentation),
            error_handler: Arc::new(SimpleFetchErrorHandler),
        }
    }

    /// Replaces the instrumentation.
    pub fn with_instrumentation(mut self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    /// Replaces the fetch error handler.
    pub fn with_error_handler(mut self, handler: Arc<dyn FetchErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    /// Gets a reference to the resolvers.
    pub fn resolvers(&self) -> &ResolverMap {
        &self.resolvers
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executes an operation.
    ///
    /// Field failures end up in [`Response::errors`]. `Err` is returned only
    /// when the operation cannot run against the schema or the asynchronous
    /// machinery broke down.
    pub async fn execute(
        &self,
        schema: &Arc<Schema>,
        input: ExecutionInput,
    ) -> Result<Response, ExecutionError> {
        let kind = input.operation.kind;
        let root_type = schema.root_type(kind)?;

        let mut context = input.context;
        context.variables = input.variables;
        let ctx = ExecutionContext::builder(Arc::clone(schema))
            .execution_id(input.execution_id.unwrap_or_else(ExecutionId::generate))
            .fragments(Arc::new(input.fragments))
            .root(input.root)
            .context(Arc::new(context))
            .resolvers(Arc::clone(&self.resolvers))
            .instrumentation(self.instrumentation())
            .error_handler(Arc::clone(&self.error_handler))
            .config(self.config.clone())
            .build();

        tracing::debug!(
            execution_id = %ctx.execution_id(),
            operation = %kind,
            name = input.operation.name.as_deref().unwrap_or_default(),
            "executing operation"
        );

        let fields = collect_fields(&ctx, root_type, [&input.operation.selection_set]);
        let params = ExecutionParameters::builder(TypeInfo::root(TypeRef::named(
            root_type.name.clone(),
        )))
        .fields(Arc::new(fields))
        .source_arc(Some(Arc::clone(ctx.root())))
        .build();

        let outcome = match kind {
            OperationKind::Mutation => SerialExecutionStrategy.execute(&ctx, params).await,
            OperationKind::Query | OperationKind::Subscription => {
                AsyncExecutionStrategy.execute(&ctx, params).await
            }
        };

        let data = match outcome {
            Ok(result) => result.data,
            Err(e) if e.is_null_propagation() => Value::Null,
            Err(e) => {
                tracing::error!(execution_id = %ctx.execution_id(), error = %e, "execution aborted");
                return Err(e);
            }
        };
        let errors = ctx.errors().snapshot();
        tracing::debug!(
            execution_id = %ctx.execution_id(),
            errors = errors.len(),
            "operation executed"
        );

        Ok(Response {
            data: Some(data),
            errors: (!errors.is_empty()).then_some(errors),
        })
    }

    fn instrumentation(&self) -> Arc<dyn Instrumentation> {
        if self.config.tracing {
            Arc::new(ChainedInstrumentation::new(vec![
                Arc::new(TracingInstrumentation) as Arc<dyn Instrumentation>,
                Arc::clone(&self.instrumentation),
            ]))
        } else {
            Arc::clone(&self.instrumentation)
        }
    }
}

/// One operation to execute.
#[derive(Debug, Clone)]
pub struct ExecutionInput {
    pub operation: Operation,
    pub fragments: FragmentMap,
    pub variables: HashMap<String, Value>,
    /// Value the root fields resolve against.
    pub root: Value,
    /// Request-scoped data; its variables are replaced by `variables`.
    pub context: Context,
    pub execution_id: Option<ExecutionId>,
}

impl ExecutionInput {
    /// Creates an input with an empty root object.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            fragments: FragmentMap::default(),
            variables: HashMap::new(),
            root: Value::Object(serde_json::Map::new()),
            context: Context::new(),
            execution_id: None,
        }
    }

    /// Adds a fragment definition.
    pub fn fragment(mut self, fragment: FragmentDefinition) -> Self {
        self.fragments.insert(fragment.name.clone(), fragment);
        self
    }

    /// Sets one variable.
    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn variables(mut self, variables: HashMap<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn root(mut self, root: Value) -> Self {
        self.root = root;
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn execution_id(mut self, id: impl Into<ExecutionId>) -> Self {
        self.execution_id = Some(id.into());
        self
    }
}

/// A GraphQL response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// The errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl Response {
    /// Creates a successful response with data.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// Creates an error response.
    pub fn error(error: FieldError) -> Self {
        Self {
            data: None,
            errors: Some(vec![error]),
        }
    }

    /// Returns true if the response has errors.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().map(|e| !e.is_empty()).unwrap_or(false)
    }

    /// Returns true if the response has data.
    pub fn has_data(&self) -> bool {
        self.data.as_ref().is_some_and(|d| !d.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResponsePath;
    use crate::query::{Directive, Field, InputValue, SelectionSet};
    use crate::resolver::ResolverError;
    use crate::schema::{FieldDef, InputFieldDef, ObjectDef, SchemaBuilder};
    use serde_json::json;

    fn create_test_schema() -> Arc<Schema> {
        let schema = SchemaBuilder::new()
            .query_type("Query")
            .mutation_type("Mutation")
            .object(
                ObjectDef::new("Query")
                    .field(
                        FieldDef::new("user", TypeRef::named("User")).argument(
                            InputFieldDef::new("id", TypeRef::non_null(TypeRef::named("ID"))),
                        ),
                    )
                    .field(FieldDef::new(
                        "version",
                        TypeRef::non_null(TypeRef::named("String")),
                    )),
            )
            .object(
                ObjectDef::new("Mutation")
                    .field(FieldDef::new("rename", TypeRef::named("User"))),
            )
            .object(
                ObjectDef::new("User")
                    .field(FieldDef::new("id", TypeRef::non_null(TypeRef::named("ID"))))
                    .field(FieldDef::new("name", TypeRef::named("String"))),
            )
            .build();
        Arc::new(schema)
    }

    fn resolvers() -> ResolverMap {
        let mut resolvers = ResolverMap::new();
        resolvers.register_fn("Query", "user", |env| {
            let id: String = env.require("id")?;
            Ok(json!({"id": id, "name": "Alice"}))
        });
        resolvers.register_fn("Query", "version", |_| Ok(json!("1.0")));
        resolvers.register_fn("Mutation", "rename", |env| {
            Ok(json!({"id": "1", "name": env.root()["newName"]}))
        });
        resolvers
    }

    #[tokio::test]
    async fn test_execute_simple_query() {
        let executor = Executor::with_resolvers(resolvers());
        let operation = Operation::query(
            SelectionSet::new()
                .field(
                    Field::new("user")
                        .arg("id", InputValue::variable("userId"))
                        .select(
                            SelectionSet::new()
                                .field(Field::new("id"))
                                .field(Field::new("name")),
                        ),
                )
                .field(Field::new("version")),
        );
        let input = ExecutionInput::new(operation).variable("userId", json!("42"));

        let response = executor.execute(&create_test_schema(), input).await.unwrap();

        assert!(response.has_data());
        assert!(!response.has_errors());
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"data":{"user":{"id":"42","name":"Alice"},"version":"1.0"}}"#
        );
    }

    #[tokio::test]
    async fn test_root_non_null_violation_nulls_data() {
        let mut resolvers = resolvers();
        resolvers.register_fn("Query", "version", |_| Err(ResolverError::custom("down")));
        let executor = Executor::with_resolvers(resolvers);
        let operation = Operation::query(
            SelectionSet::new()
                .field(Field::new("user").arg("id", InputValue::string("1")))
                .field(Field::new("version")),
        );

        let response = executor
            .execute(&create_test_schema(), ExecutionInput::new(operation))
            .await
            .unwrap();

        assert_eq!(response.data, Some(Value::Null));
        assert!(!response.has_data());
        let errors = response.errors.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, Some(ResponsePath::root().field("version")));
        assert_eq!(
            serde_json::to_value(&errors[0]).unwrap()["extensions"]["code"],
            "RESOLVER_ERROR"
        );
    }

    #[tokio::test]
    async fn test_mutation_and_skip() {
        let executor = Executor::with_resolvers(resolvers());
        let operation = Operation::mutation(
            SelectionSet::new().field(
                Field::new("rename").select(
                    SelectionSet::new()
                        .field(
                            Field::new("id")
                                .directive(Directive::skip(InputValue::variable("terse"))),
                        )
                        .field(Field::new("name")),
                ),
            ),
        );
        let input = ExecutionInput::new(operation)
            .root(json!({"newName": "Bob"}))
            .variable("terse", json!(true))
            .execution_id("exec-1");

        let response = executor.execute(&create_test_schema(), input).await.unwrap();

        assert_eq!(response.data, Some(json!({"rename": {"name": "Bob"}})));
    }

    #[tokio::test]
    async fn test_missing_root_type() {
        let schema = Arc::new(
            SchemaBuilder::new()
                .query_type("Query")
                .object(ObjectDef::new("Query"))
                .build(),
        );
        let operation = Operation::mutation(SelectionSet::new().field(Field::new("x")));

        let err = Executor::new()
            .execute(&schema, ExecutionInput::new(operation))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::MissingRootType(OperationKind::Mutation)
        ));
    }

    #[tokio::test]
    async fn test_tracing_config_keeps_results() {
        let config = ExecutorConfig {
            tracing: true,
            ..ExecutorConfig::default()
        };
        let executor = Executor::new_with(config, resolvers());
        let operation = Operation::query(SelectionSet::new().field(Field::new("version")));

        let response = executor
            .execute(&create_test_schema(), ExecutionInput::new(operation))
            .await
            .unwrap();
        assert_eq!(response, Response::data(json!({"version": "1.0"})));
    }

    #[test]
    fn test_config_from_json() {
        let config = ExecutorConfig::from_json(r#"{"tracing": true}"#).unwrap();
        assert!(config.tracing);
        assert!(config.catch_panics);
        assert!(config.log_fetch_errors);

        assert!(ExecutorConfig::from_json(r#"{"tracing": "yes"}"#).is_err());
    }

    #[test]
    fn test_response_helpers() {
        let response = Response::error(FieldError::new("boom"));
        assert!(response.has_errors());
        assert!(!response.has_data());
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"errors": [{"message": "boom"}]})
        );
    }

    #[tokio::test]
    async fn test_undefined_field_type_is_branch_local() {
        let schema = SchemaBuilder::new()
            .query_type("Query")
            .object(
                ObjectDef::new("Query")
                    .field(FieldDef::new("ok", TypeRef::named("Int")))
                    .field(FieldDef::new("broken", TypeRef::named("Missing"))),
            )
            .build();
        let mut resolvers = ResolverMap::new();
        resolvers.register_fn("Query", "ok", |_| Ok(json!(1)));
        resolvers.register_fn("Query", "broken", |_| Ok(json!({"x": 1})));
        let operation = Operation::query(
            SelectionSet::new()
                .field(Field::new("ok"))
                .field(Field::new("broken")),
        );

        let response = Executor::with_resolvers(resolvers)
            .execute(&Arc::new(schema), ExecutionInput::new(operation))
            .await
            .unwrap();

        assert_eq!(response.data, Some(json!({"ok": 1, "broken": null})));
        let errors = response.errors.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), Some("TYPE_MISMATCH"));
        assert_eq!(errors[0].path, Some(ResponsePath::root().field("broken")));
    }

    fn panicking_async_resolvers() -> ResolverMap {
        let mut resolvers = resolvers();
        resolvers.register_async("Query", "version", |_| async {
            if true {
                panic!("async boom");
            }
            Ok(json!("never"))
        });
        resolvers
    }

    #[tokio::test]
    async fn test_async_resolver_panic_follows_catch_panics() {
        use futures::FutureExt;
        use std::panic::AssertUnwindSafe;

        let operation = || Operation::query(SelectionSet::new().field(Field::new("version")));
        let schema = create_test_schema();

        let caught = Executor::new_with(ExecutorConfig::default(), panicking_async_resolvers());
        let response = caught
            .execute(&schema, ExecutionInput::new(operation()))
            .await
            .unwrap();
        assert_eq!(response.data, Some(Value::Null));
        let errors = response.errors.unwrap();
        assert_eq!(errors[0].code(), Some("INTERNAL_ERROR"));
        assert!(errors[0].message.contains("async boom"));

        let config = ExecutorConfig {
            catch_panics: false,
            ..ExecutorConfig::default()
        };
        let uncaught = Executor::new_with(config, panicking_async_resolvers());
        let outcome = AssertUnwindSafe(uncaught.execute(&schema, ExecutionInput::new(operation())))
            .catch_unwind()
            .await;
        assert!(outcome.is_err());
    }
}
