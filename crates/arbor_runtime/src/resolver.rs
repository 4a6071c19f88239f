//! Resolver system for Arbor.
//!
//! A resolver receives the [`FieldEnvironment`] of one field and returns
//! either a plain value or an [`AsyncUnit`] that completes later.

use crate::environment::FieldEnvironment;
use crate::schema::{Schema, TYPENAME_FIELD};
use crate::unit::{AsyncUnit, FieldValue};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Arguments passed to a resolver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolverArgs {
    args: IndexMap<String, Value>,
}

impl ResolverArgs {
    /// Creates new resolver args.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates resolver args from a list of (name, value) pairs.
    pub fn from_pairs(pairs: Vec<(String, Value)>) -> Self {
        Self {
            args: pairs.into_iter().collect(),
        }
    }

    /// Gets an argument by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Gets an argument as a specific type.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.args
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a required argument, returning an error if not found.
    pub fn require<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, ResolverError> {
        self.args
            .get(name)
            .ok_or_else(|| ResolverError::MissingArgument(name.to_string()))
            .and_then(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| ResolverError::ArgumentParseError(name.to_string(), e.to_string()))
            })
    }

    /// Returns all arguments.
    pub fn all(&self) -> &IndexMap<String, Value> {
        &self.args
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Sets an argument.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }
}

/// Error from a resolver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolverError {
    /// Field not found on the source value.
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Missing required argument.
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// Argument parse error.
    #[error("Failed to parse argument '{0}': {1}")]
    ArgumentParseError(String, String),

    /// Custom error.
    #[error("{0}")]
    Custom(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResolverError {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// Result type for resolvers.
pub type ResolverResult = Result<FieldValue, ResolverError>;

/// Trait for field resolvers.
///
/// The call itself must not block: slow work belongs in the returned
/// [`AsyncUnit`].
pub trait Resolver: Send + Sync {
    /// Resolves a field value.
    fn resolve(&self, env: &FieldEnvironment) -> ResolverResult;
}

impl<F> Resolver for F
where
    F: Fn(&FieldEnvironment) -> ResolverResult + Send + Sync,
{
    fn resolve(&self, env: &FieldEnvironment) -> ResolverResult {
        self(env)
    }
}

/// A boxed resolver.
pub type BoxedResolver = Box<dyn Resolver>;

/// A sync resolver function.
pub type SyncResolverFn =
    Arc<dyn Fn(&FieldEnvironment) -> Result<Value, ResolverError> + Send + Sync>;

/// A wrapper for sync resolver functions.
pub struct FnResolver {
    func: SyncResolverFn,
}

impl FnResolver {
    /// Creates a new function resolver.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&FieldEnvironment) -> Result<Value, ResolverError> + Send + Sync + 'static,
    {
        Self { func: Arc::new(f) }
    }
}

impl Resolver for FnResolver {
    fn resolve(&self, env: &FieldEnvironment) -> ResolverResult {
        (self.func)(env).map(FieldValue::Value)
    }
}

/// An async resolver function type.
pub type AsyncResolverFn = Arc<dyn Fn(FieldEnvironment) -> AsyncUnit + Send + Sync>;

/// A wrapper for async resolver functions.
pub struct AsyncFnResolver {
    func: AsyncResolverFn,
}

impl AsyncFnResolver {
    /// Creates a new async function resolver.
    ///
    /// The future is polled by the executor's join; use [`AsyncUnit::spawn`]
    /// inside a plain resolver to run work on the runtime instead.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(FieldEnvironment) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ResolverError>> + Send + 'static,
    {
        Self {
            func: Arc::new(move |env| AsyncUnit::from_future(f(env))),
        }
    }
}

impl Resolver for AsyncFnResolver {
    fn resolve(&self, env: &FieldEnvironment) -> ResolverResult {
        Ok(FieldValue::Unit((self.func)(env.clone())))
    }
}

/// Default resolver that accesses properties from the source object.
pub struct DefaultResolver;

impl Resolver for DefaultResolver {
    fn resolve(&self, env: &FieldEnvironment) -> ResolverResult {
        let field_name = env.field_name();
        match env.source() {
            Value::Object(map) => {
                if let Some(value) = map.get(field_name) {
                    Ok(FieldValue::Value(value.clone()))
                } else {
                    // Try snake_case version
                    let snake_case = to_snake_case(field_name);
                    Ok(FieldValue::Value(
                        map.get(&snake_case).cloned().unwrap_or(Value::Null),
                    ))
                }
            }
            Value::Null => Ok(FieldValue::Value(Value::Null)),
            _ => Err(ResolverError::FieldNotFound(field_name.to_string())),
        }
    }
}

/// Answers `__typename` with the parent object type.
struct TypenameResolver;

impl Resolver for TypenameResolver {
    fn resolve(&self, env: &FieldEnvironment) -> ResolverResult {
        Ok(FieldValue::Value(Value::String(
            env.parent_type().to_string(),
        )))
    }
}

/// Converts camelCase to snake_case.
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// Picks the concrete object type of a value of an abstract type.
pub type TypeResolverFn = Arc<dyn Fn(&Value, &Schema) -> Option<String> + Send + Sync>;

/// Storage for resolvers organized by type and field.
pub struct ResolverMap {
    /// Resolvers indexed by "TypeName.fieldName".
    resolvers: FxHashMap<String, BoxedResolver>,

    /// Concrete type pickers indexed by interface or union name.
    type_resolvers: FxHashMap<String, TypeResolverFn>,

    /// Default resolver for unregistered fields.
    default_resolver: Option<BoxedResolver>,
}

impl Default for ResolverMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverMap {
    /// Creates a new resolver map.
    pub fn new() -> Self {
        Self {
            resolvers: FxHashMap::default(),
            type_resolvers: FxHashMap::default(),
            default_resolver: Some(Box::new(DefaultResolver)),
        }
    }

    /// Registers a resolver for a specific type and field.
    pub fn register<R: Resolver + 'static>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: R,
    ) {
        let key = format!("{}.{}", type_name.into(), field_name.into());
        self.resolvers.insert(key, Box::new(resolver));
    }

    /// Registers a sync function as a resolver.
    pub fn register_fn<F>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) where
        F: Fn(&FieldEnvironment) -> Result<Value, ResolverError> + Send + Sync + 'static,
    {
        self.register(type_name, field_name, FnResolver::new(f));
    }

    /// Registers a function that returns a plain value or an [`AsyncUnit`].
    pub fn register_unit_fn<F>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) where
        F: Fn(&FieldEnvironment) -> ResolverResult + Send + Sync + 'static,
    {
        self.register(type_name, field_name, f);
    }

    /// Registers an async function as a resolver.
    pub fn register_async<F, Fut>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) where
        F: Fn(FieldEnvironment) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ResolverError>> + Send + 'static,
    {
        self.register(type_name, field_name, AsyncFnResolver::new(f));
    }

    /// Registers how to pick the concrete type of an interface or union value.
    pub fn register_type_resolver<F>(&mut self, abstract_type: impl Into<String>, f: F)
    where
        F: Fn(&Value, &Schema) -> Option<String> + Send + Sync + 'static,
    {
        self.type_resolvers.insert(abstract_type.into(), Arc::new(f));
    }

    /// Gets a resolver for a type and field.
    pub fn get(&self, type_name: &str, field_name: &str) -> Option<&dyn Resolver> {
        if field_name == TYPENAME_FIELD {
            return Some(&TypenameResolver);
        }
        let key = format!("{}.{}", type_name, field_name);
        self.resolvers
            .get(&key)
            .map(|r| r.as_ref())
            .or(self.default_resolver.as_ref().map(|r| r.as_ref()))
    }

    /// Names the concrete object type of `value`, declared as `abstract_type`.
    ///
    /// Falls back to the value's own `__typename` property.
    pub fn resolve_type(&self, abstract_type: &str, value: &Value, schema: &Schema) -> Option<String> {
        if let Some(f) = self.type_resolvers.get(abstract_type) {
            return f(value, schema);
        }
        value
            .get(TYPENAME_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Sets the default resolver.
    pub fn set_default<R: Resolver + 'static>(&mut self, resolver: R) {
        self.default_resolver = Some(Box::new(resolver));
    }

    /// Removes the default resolver.
    pub fn remove_default(&mut self) {
        self.default_resolver = None;
    }
}

impl Debug for ResolverMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverMap")
            .field("resolver_count", &self.resolvers.len())
            .field("type_resolver_count", &self.type_resolvers.len())
            .field("has_default", &self.default_resolver.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::FieldEnvironment;
    use serde_json::json;

    fn ready(result: ResolverResult) -> Value {
        match result {
            Ok(FieldValue::Value(v)) => v,
            Ok(FieldValue::Unit(_)) => panic!("expected an immediate value"),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_resolver_args() {
        let args = ResolverArgs::from_pairs(vec![
            ("id".to_string(), json!("42")),
            ("limit".to_string(), json!(10)),
        ]);

        assert_eq!(args.get("id"), Some(&json!("42")));
        assert_eq!(args.get_as::<i32>("limit"), Some(10));
        assert_eq!(args.require::<String>("id").unwrap(), "42");
        assert_eq!(
            args.require::<String>("missing"),
            Err(ResolverError::MissingArgument("missing".to_string()))
        );
        assert!(matches!(
            args.require::<i32>("id"),
            Err(ResolverError::ArgumentParseError(..))
        ));
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("firstName"), "first_name");
        assert_eq!(to_snake_case("id"), "id");
        assert_eq!(to_snake_case("createdAtUTC"), "created_at_u_t_c");
    }

    #[test]
    fn test_default_resolver() {
        let env = FieldEnvironment::for_test("User", "firstName", json!({"first_name": "Ada"}));
        assert_eq!(ready(DefaultResolver.resolve(&env)), json!("Ada"));

        let env = FieldEnvironment::for_test("User", "age", json!({"name": "Ada"}));
        assert_eq!(ready(DefaultResolver.resolve(&env)), Value::Null);

        let env = FieldEnvironment::for_test("User", "name", json!(3));
        assert!(DefaultResolver.resolve(&env).is_err());
    }

    #[test]
    fn test_resolver_map_lookup() {
        let mut map = ResolverMap::new();
        map.register_fn("Query", "hello", |_env| Ok(json!("world")));

        let env = FieldEnvironment::for_test("Query", "hello", Value::Null);
        let resolver = map.get("Query", "hello").unwrap();
        assert_eq!(ready(resolver.resolve(&env)), json!("world"));

        // Falls back to the default resolver
        assert!(map.get("Query", "other").is_some());
        map.remove_default();
        assert!(map.get("Query", "other").is_none());

        // __typename is always answered
        let env = FieldEnvironment::for_test("Query", "__typename", Value::Null);
        let resolver = map.get("Query", "__typename").unwrap();
        assert_eq!(ready(resolver.resolve(&env)), json!("Query"));
    }

    #[test]
    fn test_resolve_type() {
        let mut map = ResolverMap::new();
        let schema = Schema::new();

        assert_eq!(
            map.resolve_type("Node", &json!({"__typename": "User"}), &schema),
            Some("User".to_string())
        );
        assert_eq!(map.resolve_type("Node", &json!({}), &schema), None);

        map.register_type_resolver("Node", |value, _schema| {
            value.get("kind").and_then(Value::as_str).map(str::to_string)
        });
        assert_eq!(
            map.resolve_type("Node", &json!({"kind": "Post"}), &schema),
            Some("Post".to_string())
        );
    }
}
