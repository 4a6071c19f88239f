//! Value completion.
//!
//! Turns a fetched value into its response shape according to the field's
//! declared type. Objects and lists re-enter execution for their members.
//! Null propagation is decided here: a non-null type that ends up null fails
//! with [`ExecutionError::NonNullViolation`], and the nearest nullable type
//! above turns that failure back into null.

use crate::collect::collect_fields;
use crate::context::ExecutionContext;
use crate::error::{ExecutionError, FieldError};
use crate::parameters::{ExecutionParameters, FieldGroup};
use crate::schema::{EnumDef, ObjectDef, TypeDef, TypeRef};
use crate::strategy::{ExecutionFuture, ExecutionResult};
use futures::future::{self, join_all, FutureExt};
use serde_json::{Number, Value};
use std::sync::Arc;

/// Completes the value of one field.
pub trait ValueCompleter: Send + Sync {
    /// `params.source()` is the fetched value, `None` when the fetch failed.
    fn complete<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        params: ExecutionParameters,
        fields: FieldGroup,
    ) -> ExecutionFuture<'a>;
}

/// Completion following the declared output type.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultValueCompleter;

impl ValueCompleter for DefaultValueCompleter {
    fn complete<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        params: ExecutionParameters,
        fields: FieldGroup,
    ) -> ExecutionFuture<'a> {
        complete_value(ctx, params, fields)
    }
}

fn ready<'a>(outcome: Result<ExecutionResult, ExecutionError>) -> ExecutionFuture<'a> {
    future::ready(outcome).boxed()
}

fn complete_value<'a>(
    ctx: &'a ExecutionContext,
    params: ExecutionParameters,
    fields: FieldGroup,
) -> ExecutionFuture<'a> {
    let ty = params.type_info().ty().clone();
    let value = match params.source_arc() {
        // The fetch failed and its error is already recorded.
        None => return ready(null_or_violation(&params)),
        Some(value) if value.is_null() => {
            if ty.is_non_null() {
                ctx.add_error(null_error(&params, &fields));
            }
            return ready(null_or_violation(&params));
        }
        Some(value) => Arc::clone(value),
    };

    let completed = match ty.nullable() {
        TypeRef::List(item) => complete_list(ctx, &params, item, &value, fields),
        TypeRef::Named(name) => complete_named(ctx, &params, name, value, fields),
        nested @ TypeRef::NonNull(_) => {
            let error = mismatch(&params, &fields, format!("Invalid output type '{nested}'"));
            ctx.add_error(error);
            ready(null_or_violation(&params))
        }
    };

    if ty.is_non_null() {
        return completed;
    }
    let path = params.path().clone();
    completed
        .map(move |outcome| match outcome {
            Err(e) if e.is_null_propagation() => {
                tracing::debug!(path = %path, "null propagation stopped at nullable field");
                Ok(ExecutionResult::from_data(Value::Null))
            }
            other => other,
        })
        .boxed()
}

fn complete_list<'a>(
    ctx: &'a ExecutionContext,
    params: &ExecutionParameters,
    item_type: &TypeRef,
    value: &Value,
    fields: FieldGroup,
) -> ExecutionFuture<'a> {
    let Value::Array(items) = value else {
        let message = format!(
            "Expected a list for field of type '{}' but got {}",
            params.type_info().ty(),
            value_kind(value)
        );
        ctx.add_error(mismatch(params, &fields, message));
        return ready(null_or_violation(params));
    };

    let pending: Vec<_> = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let item_params = ExecutionParameters::builder(
                params.type_info().retyped(item_type.clone()),
            )
            .fields(Arc::clone(params.fields()))
            .arguments(Arc::clone(params.arguments()))
            .source(Some(item.clone()))
            .path(params.path().index(index))
            .build();
            ctx.completer().complete(ctx, item_params, Arc::clone(&fields))
        })
        .collect();

    async move {
        let mut values = Vec::with_capacity(pending.len());
        let mut violation = None;
        for outcome in join_all(pending).await {
            match outcome {
                Ok(result) => values.push(result.data),
                Err(e) if e.is_null_propagation() => {
                    violation.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        match violation {
            Some(e) => Err(e),
            None => Ok(ExecutionResult::from_data(Value::Array(values))),
        }
    }
    .boxed()
}

fn complete_named<'a>(
    ctx: &'a ExecutionContext,
    params: &ExecutionParameters,
    type_name: &str,
    value: Arc<Value>,
    fields: FieldGroup,
) -> ExecutionFuture<'a> {
    let type_def = match ctx.schema().require_type(type_name) {
        Ok(def) => def,
        Err(e) => {
            ctx.add_error(mismatch(params, &fields, e.to_string()));
            return ready(null_or_violation(params));
        }
    };
    match type_def {
        TypeDef::Scalar(scalar) => match serialize_scalar(&scalar.name, &value) {
            Ok(data) => ready(Ok(ExecutionResult::from_data(data))),
            Err(message) => {
                ctx.add_error(mismatch(params, &fields, message));
                ready(null_or_violation(params))
            }
        },
        TypeDef::Enum(def) => match serialize_enum(def, &value) {
            Ok(data) => ready(Ok(ExecutionResult::from_data(data))),
            Err(message) => {
                ctx.add_error(mismatch(params, &fields, message));
                ready(null_or_violation(params))
            }
        },
        TypeDef::Object(object) => complete_object(ctx, params, object, value, fields),
        TypeDef::Interface(_) | TypeDef::Union(_) => {
            match resolve_concrete_type(ctx, type_def, &value) {
                Ok(object) => complete_object(ctx, params, object, value, fields),
                Err(message) => {
                    ctx.add_error(mismatch(params, &fields, message));
                    ready(null_or_violation(params))
                }
            }
        }
        TypeDef::InputObject(def) => {
            let message = format!("Input type '{}' cannot be used as an output type", def.name);
            ctx.add_error(mismatch(params, &fields, message));
            ready(null_or_violation(params))
        }
    }
}

/// Executes the sub-selections of every field in the group against `value`.
fn complete_object<'a>(
    ctx: &'a ExecutionContext,
    params: &ExecutionParameters,
    object: &ObjectDef,
    value: Arc<Value>,
    fields: FieldGroup,
) -> ExecutionFuture<'a> {
    let sub_fields = collect_fields(ctx, object, fields.iter().map(|f| &f.selection_set));
    let nested = ExecutionParameters::builder(
        params.type_info().retyped(TypeRef::named(object.name.clone())),
    )
    .fields(Arc::new(sub_fields))
    .arguments(Arc::clone(params.arguments()))
    .source_arc(Some(value))
    .path(params.path().clone())
    .build();
    ctx.strategy().execute(ctx, nested)
}

fn resolve_concrete_type<'s>(
    ctx: &'s ExecutionContext,
    abstract_type: &TypeDef,
    value: &Value,
) -> Result<&'s ObjectDef, String> {
    let schema = ctx.schema();
    let name = ctx
        .resolvers()
        .resolve_type(abstract_type.name(), value, schema)
        .ok_or_else(|| {
            format!(
                "Could not determine the concrete type of abstract type '{}'",
                abstract_type.name()
            )
        })?;
    let object = schema.object_type(&name).map_err(|e| e.to_string())?;
    if !schema.is_possible_type(abstract_type.name(), object) {
        return Err(format!(
            "Type '{}' is not a possible type of '{}'",
            object.name,
            abstract_type.name()
        ));
    }
    Ok(object)
}

fn null_or_violation(params: &ExecutionParameters) -> Result<ExecutionResult, ExecutionError> {
    if params.type_info().is_non_null() {
        Err(ExecutionError::NonNullViolation {
            path: params.path().clone(),
        })
    } else {
        Ok(ExecutionResult::from_data(Value::Null))
    }
}

fn null_error(params: &ExecutionParameters, fields: &FieldGroup) -> FieldError {
    let parent = params
        .type_info()
        .parent()
        .map(|p| p.ty().named_type().to_string())
        .unwrap_or_default();
    let field = fields.first().map(|f| f.name.as_str()).unwrap_or_default();
    FieldError::new(format!(
        "Cannot return null for non-nullable field '{parent}.{field}' of type '{}'",
        params.type_info().ty()
    ))
    .with_locations(fields.iter())
    .with_path(params.path().clone())
    .with_code("NON_NULL_VIOLATION")
}

fn mismatch(params: &ExecutionParameters, fields: &FieldGroup, message: String) -> FieldError {
    FieldError::new(message)
        .with_locations(fields.iter())
        .with_path(params.path().clone())
        .with_code("TYPE_MISMATCH")
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Serializes a value of a scalar type. Custom scalars pass through.
pub fn serialize_scalar(scalar: &str, value: &Value) -> Result<Value, String> {
    let fail = || {
        format!(
            "Cannot serialize {} as scalar '{scalar}'",
            value_kind(value)
        )
    };
    match scalar {
        "Int" => {
            let int = match value {
                Value::Number(n) => n.as_i64().or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.is_finite())
                        .map(|f| f as i64)
                }),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                Value::Bool(b) => Some(i64::from(*b)),
                _ => None,
            }
            .ok_or_else(fail)?;
            let int = i32::try_from(int)
                .map_err(|_| format!("Int cannot represent non 32-bit integer value {int}"))?;
            Ok(Value::Number(Number::from(int)))
        }
        "Float" => {
            let float = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                _ => None,
            }
            .and_then(Number::from_f64)
            .ok_or_else(fail)?;
            Ok(Value::Number(float))
        }
        "String" => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(fail()),
        },
        "Boolean" => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) if s == "true" || s == "false" => Ok(Value::Bool(s == "true")),
            Value::Number(n) => n.as_f64().map(|f| Value::Bool(f != 0.0)).ok_or_else(fail),
            _ => Err(fail()),
        },
        "ID" => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(fail()),
        },
        _ => Ok(value.clone()),
    }
}

fn serialize_enum(def: &EnumDef, value: &Value) -> Result<Value, String> {
    match value.as_str() {
        Some(name) if def.has_value(name) => Ok(value.clone()),
        Some(name) => Err(format!("Invalid value '{name}' for enum '{}'", def.name)),
        None => Err(format!(
            "Cannot serialize {} as enum '{}'",
            value_kind(value),
            def.name
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResponsePath;
    use crate::parameters::TypeInfo;
    use crate::query::{Field, SelectionSet};
    use crate::test_support::query_schema;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::builder(Arc::new(query_schema())).build()
    }

    fn params(ty: TypeRef, source: Option<Value>, key: &str) -> ExecutionParameters {
        let root = TypeInfo::root(TypeRef::named("Query"));
        ExecutionParameters::builder(TypeInfo::child(ty, &root))
            .source(source)
            .path(ResponsePath::root().field(key))
            .build()
    }

    fn group(field: Field) -> FieldGroup {
        Arc::from(vec![field])
    }

    #[tokio::test]
    async fn test_failed_fetch_adds_no_error() {
        let ctx = ctx();
        let nullable = params(TypeRef::named("Int"), None, "a");
        let result = complete_value(&ctx, nullable, group(Field::new("a"))).await.unwrap();
        assert_eq!(result.data, Value::Null);

        let non_null = params(TypeRef::non_null(TypeRef::named("String")), None, "greeting");
        let err = complete_value(&ctx, non_null, group(Field::new("greeting")))
            .await
            .unwrap_err();
        assert!(err.is_null_propagation());
        assert!(ctx.errors().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_null_for_non_null_records_error() {
        let ctx = ctx();
        let p = params(
            TypeRef::non_null(TypeRef::named("String")),
            Some(Value::Null),
            "greeting",
        );
        let err = complete_value(&ctx, p, group(Field::new("greeting").at(2, 3)))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::NonNullViolation { .. }));
        let errors = ctx.errors().snapshot();
        assert_eq!(errors.len(), 1);
        assert!(errors[0]
            .message
            .starts_with("Cannot return null for non-nullable field 'Query.greeting'"));
        assert_eq!(errors[0].locations.len(), 1);
    }

    #[tokio::test]
    async fn test_list_item_violation_nulls_the_list() {
        let ctx = ctx();
        let tags = TypeRef::list(TypeRef::non_null(TypeRef::named("String")));

        let p = params(tags.clone(), Some(json!(["a", 2, true])), "tags");
        let result = complete_value(&ctx, p, group(Field::new("tags"))).await.unwrap();
        assert_eq!(result.data, json!(["a", "2", "true"]));

        let p = params(tags, Some(json!(["a", null])), "tags");
        let result = complete_value(&ctx, p, group(Field::new("tags"))).await.unwrap();
        assert_eq!(result.data, Value::Null);

        let errors = ctx.errors().snapshot();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, Some(ResponsePath::root().field("tags").index(1)));
    }

    #[tokio::test]
    async fn test_non_list_value_for_list_type() {
        let ctx = ctx();
        let p = params(
            TypeRef::list(TypeRef::named("String")),
            Some(json!("single")),
            "tags",
        );
        let result = complete_value(&ctx, p, group(Field::new("tags"))).await.unwrap();
        assert_eq!(result.data, Value::Null);
        assert_eq!(ctx.errors().snapshot()[0].code(), Some("TYPE_MISMATCH"));
    }

    #[tokio::test]
    async fn test_enum_values() {
        let ctx = ctx();
        let p = params(TypeRef::named("Role"), Some(json!("ADMIN")), "role");
        let result = complete_value(&ctx, p, group(Field::new("role"))).await.unwrap();
        assert_eq!(result.data, json!("ADMIN"));

        let p = params(TypeRef::named("Role"), Some(json!("OWNER")), "role");
        let result = complete_value(&ctx, p, group(Field::new("role"))).await.unwrap();
        assert_eq!(result.data, Value::Null);
        assert_eq!(ctx.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_object_completion_merges_sub_selections() {
        let ctx = ctx();
        let fields: FieldGroup = Arc::from(vec![
            Field::new("user").select(SelectionSet::new().field(Field::new("name"))),
            Field::new("user").select(
                SelectionSet::new()
                    .field(Field::new("id"))
                    .field(Field::new("name")),
            ),
        ]);
        let p = params(
            TypeRef::named("User"),
            Some(json!({"id": 1, "name": "Ada", "nickname": "countess"})),
            "user",
        );

        let result = complete_value(&ctx, p, fields).await.unwrap();
        assert_eq!(
            serde_json::to_string(&result.data).unwrap(),
            r#"{"name":"Ada","id":"1"}"#
        );
    }

    #[tokio::test]
    async fn test_nested_violation_absorbed_by_nullable_object() {
        let ctx = ctx();
        let p = params(TypeRef::named("User"), Some(json!({"id": "1"})), "user");
        let fields = group(
            Field::new("user").select(
                SelectionSet::new()
                    .field(Field::new("id"))
                    .field(Field::new("name")),
            ),
        );

        let result = complete_value(&ctx, p, fields).await.unwrap();
        assert_eq!(result.data, Value::Null);
        assert_eq!(ctx.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_abstract_type_resolution() {
        let ctx = ctx();
        let fields = group(Field::new("node").select(SelectionSet::new().field(Field::new("__typename"))));

        let p = params(
            TypeRef::named("Node"),
            Some(json!({"__typename": "User", "id": "1"})),
            "node",
        );
        let result = complete_value(&ctx, p, Arc::clone(&fields)).await.unwrap();
        assert_eq!(result.data, json!({"__typename": "User"}));

        let p = params(TypeRef::named("Node"), Some(json!({"id": "1"})), "node");
        let result = complete_value(&ctx, p, fields).await.unwrap();
        assert_eq!(result.data, Value::Null);
        assert!(ctx.errors().snapshot()[0]
            .message
            .contains("Could not determine the concrete type"));
    }

    #[test]
    fn test_serialize_scalar() {
        assert_eq!(serialize_scalar("Int", &json!(7)), Ok(json!(7)));
        assert_eq!(serialize_scalar("Int", &json!(7.0)), Ok(json!(7)));
        assert_eq!(serialize_scalar("Int", &json!("12")), Ok(json!(12)));
        assert!(serialize_scalar("Int", &json!(1u64 << 40)).is_err());
        assert!(serialize_scalar("Int", &json!(1.5)).is_err());
        assert_eq!(serialize_scalar("Float", &json!(2)), Ok(json!(2.0)));
        assert_eq!(serialize_scalar("String", &json!(false)), Ok(json!("false")));
        assert_eq!(serialize_scalar("Boolean", &json!("true")), Ok(json!(true)));
        assert_eq!(serialize_scalar("ID", &json!(42)), Ok(json!("42")));
        assert!(serialize_scalar("ID", &json!([1])).is_err());
        assert_eq!(
            serialize_scalar("DateTime", &json!({"iso": "2024"})),
            Ok(json!({"iso": "2024"}))
        );
    }
}
