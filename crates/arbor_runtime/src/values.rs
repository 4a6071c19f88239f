//! Argument value resolution.

use crate::query::InputValue;
use crate::resolver::ResolverArgs;
use crate::schema::InputFieldDef;
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use thiserror::Error;

/// An argument could not be resolved.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgumentError {
    #[error("Argument '{name}' of type '{ty}' is required but was not provided")]
    MissingRequired { name: String, ty: String },

    #[error("Argument '{name}' of non-null type '{ty}' must not be null")]
    NullForNonNull { name: String, ty: String },

    #[error("Argument '{name}': float value {value} cannot be represented")]
    InvalidFloat { name: String, value: f64 },
}

/// Resolves the argument values of one field.
///
/// Variables are substituted, absent arguments fall back to their schema
/// default, and absent nullable arguments without a default are omitted.
pub fn resolve_arguments(
    specs: &IndexMap<String, InputFieldDef>,
    nodes: &[(String, InputValue)],
    variables: &HashMap<String, Value>,
) -> Result<ResolverArgs, ArgumentError> {
    let mut args = ResolverArgs::new();
    for (name, spec) in specs {
        let provided = nodes
            .iter()
            .find(|(arg, _)| arg == name)
            .and_then(|(_, node)| match node {
                // An unset variable counts as an absent argument.
                InputValue::Variable(var) => variables.get(var).cloned().map(Ok),
                other => Some(value_from_ast(name, other, variables)),
            })
            .transpose()?;

        let value = match provided {
            Some(value) => Some(value),
            None => spec.default_value.clone(),
        };

        match value {
            Some(Value::Null) if spec.ty.is_non_null() => {
                return Err(ArgumentError::NullForNonNull {
                    name: name.clone(),
                    ty: spec.ty.to_string(),
                });
            }
            Some(value) => args.set(name.clone(), value),
            None if spec.ty.is_non_null() => {
                return Err(ArgumentError::MissingRequired {
                    name: name.clone(),
                    ty: spec.ty.to_string(),
                });
            }
            None => {}
        }
    }
    Ok(args)
}

/// Converts an input literal into a JSON value, substituting variables.
/// Unset variables inside lists and objects become null.
fn value_from_ast(
    arg: &str,
    node: &InputValue,
    variables: &HashMap<String, Value>,
) -> Result<Value, ArgumentError> {
    let value = match node {
        InputValue::Null => Value::Null,
        InputValue::Int(i) => Value::Number(Number::from(*i)),
        InputValue::Float(f) => Value::Number(Number::from_f64(*f).ok_or_else(|| {
            ArgumentError::InvalidFloat {
                name: arg.to_string(),
                value: *f,
            }
        })?),
        InputValue::String(s) | InputValue::Enum(s) => Value::String(s.clone()),
        InputValue::Boolean(b) => Value::Bool(*b),
        InputValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        InputValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| value_from_ast(arg, item, variables))
                .collect::<Result<_, _>>()?,
        ),
        InputValue::Object(fields) => {
            let mut map = Map::new();
            for (key, item) in fields {
                map.insert(key.clone(), value_from_ast(arg, item, variables)?);
            }
            Value::Object(map)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeRef;
    use serde_json::json;

    fn specs() -> IndexMap<String, InputFieldDef> {
        let mut specs = IndexMap::new();
        specs.insert(
            "id".to_string(),
            InputFieldDef::new("id", TypeRef::non_null(TypeRef::named("ID"))),
        );
        specs.insert(
            "limit".to_string(),
            InputFieldDef::new("limit", TypeRef::named("Int")).with_default(json!(10)),
        );
        specs.insert(
            "filter".to_string(),
            InputFieldDef::new("filter", TypeRef::named("Filter")),
        );
        specs
    }

    #[test]
    fn test_literals_and_defaults() {
        let nodes = vec![("id".to_string(), InputValue::string("7"))];
        let args = resolve_arguments(&specs(), &nodes, &HashMap::new()).unwrap();

        assert_eq!(args.get("id"), Some(&json!("7")));
        assert_eq!(args.get("limit"), Some(&json!(10)));
        assert_eq!(args.get("filter"), None);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_variables() {
        let mut vars = HashMap::new();
        vars.insert("userId".to_string(), json!("u1"));
        vars.insert("tag".to_string(), json!("rust"));

        let nodes = vec![
            ("id".to_string(), InputValue::variable("userId")),
            ("limit".to_string(), InputValue::variable("unset")),
            (
                "filter".to_string(),
                InputValue::Object(vec![
                    ("tags".to_string(), InputValue::List(vec![InputValue::variable("tag")])),
                    ("order".to_string(), InputValue::Enum("ASC".to_string())),
                ]),
            ),
        ];
        let args = resolve_arguments(&specs(), &nodes, &vars).unwrap();

        assert_eq!(args.get("id"), Some(&json!("u1")));
        assert_eq!(args.get("limit"), Some(&json!(10)));
        assert_eq!(
            args.get("filter"),
            Some(&json!({"tags": ["rust"], "order": "ASC"}))
        );
    }

    #[test]
    fn test_required_arguments() {
        let err = resolve_arguments(&specs(), &[], &HashMap::new()).unwrap_err();
        assert_eq!(
            err,
            ArgumentError::MissingRequired {
                name: "id".to_string(),
                ty: "ID!".to_string()
            }
        );

        let nodes = vec![("id".to_string(), InputValue::Null)];
        let err = resolve_arguments(&specs(), &nodes, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ArgumentError::NullForNonNull { .. }));
    }

    #[test]
    fn test_variable_bound_to_null() {
        let mut vars = HashMap::new();
        vars.insert("userId".to_string(), Value::Null);
        vars.insert("limit".to_string(), Value::Null);

        let nodes = vec![("id".to_string(), InputValue::variable("userId"))];
        let err = resolve_arguments(&specs(), &nodes, &vars).unwrap_err();
        assert!(matches!(err, ArgumentError::NullForNonNull { ref name, .. } if name == "id"));

        // an explicit null replaces the default of a nullable argument
        let nodes = vec![
            ("id".to_string(), InputValue::string("7")),
            ("limit".to_string(), InputValue::variable("limit")),
        ];
        let args = resolve_arguments(&specs(), &nodes, &vars).unwrap();
        assert_eq!(args.get("limit"), Some(&Value::Null));
    }
}
