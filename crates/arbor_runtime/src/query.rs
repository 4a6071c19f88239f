//! Selection tree for Arbor.
//!
//! Operations arrive already parsed and validated; this module only models the
//! tree the executor walks. Builders exist for every node so trees can be
//! assembled in code.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        };
        f.write_str(name)
    }
}

/// An executable operation.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub selection_set: SelectionSet,
}

impl Operation {
    /// Creates a query operation.
    pub fn query(selection_set: SelectionSet) -> Self {
        Self {
            kind: OperationKind::Query,
            name: None,
            selection_set,
        }
    }

    /// Creates a mutation operation.
    pub fn mutation(selection_set: SelectionSet) -> Self {
        Self {
            kind: OperationKind::Mutation,
            name: None,
            selection_set,
        }
    }

    /// Sets the operation name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A position in the query source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

/// A selection set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionSet {
    pub items: Vec<Selection>,
}

impl SelectionSet {
    /// Creates an empty selection set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    pub fn field(mut self, field: Field) -> Self {
        self.items.push(Selection::Field(field));
        self
    }

    /// Adds a fragment spread.
    pub fn spread(mut self, fragment_name: impl Into<String>) -> Self {
        self.items.push(Selection::FragmentSpread(FragmentSpread {
            name: fragment_name.into(),
            directives: Vec::new(),
        }));
        self
    }

    /// Adds an inline fragment.
    pub fn inline(mut self, fragment: InlineFragment) -> Self {
        self.items.push(Selection::InlineFragment(fragment));
        self
    }

    /// Adds any selection.
    pub fn push(mut self, selection: Selection) -> Self {
        self.items.push(selection);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Field> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(Selection::Field).collect(),
        }
    }
}

/// A selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Field),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

/// A field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: Vec<(String, InputValue)>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub location: Option<SourceLocation>,
}

impl Field {
    /// Creates a field selection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: Vec::new(),
            directives: Vec::new(),
            selection_set: SelectionSet::new(),
            location: None,
        }
    }

    /// Returns the key under which the field appears in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Sets the alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Adds an argument.
    pub fn arg(mut self, name: impl Into<String>, value: InputValue) -> Self {
        self.arguments.push((name.into(), value));
        self
    }

    /// Adds a directive.
    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    /// Sets the sub-selection.
    pub fn select(mut self, selection_set: SelectionSet) -> Self {
        self.selection_set = selection_set;
        self
    }

    /// Sets the source location.
    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.location = Some(SourceLocation { line, column });
        self
    }

    /// Looks up an argument node by name.
    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| value)
    }
}

/// A named fragment spread.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpread {
    pub name: String,
    pub directives: Vec<Directive>,
}

/// An inline fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

impl InlineFragment {
    /// Creates an inline fragment with a type condition.
    pub fn on(type_name: impl Into<String>, selection_set: SelectionSet) -> Self {
        Self {
            type_condition: Some(type_name.into()),
            directives: Vec::new(),
            selection_set,
        }
    }

    /// Adds a directive.
    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }
}

/// A fragment definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub selection_set: SelectionSet,
}

impl FragmentDefinition {
    pub fn new(
        name: impl Into<String>,
        type_condition: impl Into<String>,
        selection_set: SelectionSet,
    ) -> Self {
        Self {
            name: name.into(),
            type_condition: type_condition.into(),
            selection_set,
        }
    }
}

/// Fragment definitions by name.
pub type FragmentMap = FxHashMap<String, FragmentDefinition>;

/// A directive applied to a selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
}

impl Directive {
    /// `@skip(if: ...)`.
    pub fn skip(condition: InputValue) -> Self {
        Self {
            name: "skip".to_string(),
            arguments: vec![("if".to_string(), condition)],
        }
    }

    /// `@include(if: ...)`.
    pub fn include(condition: InputValue) -> Self {
        Self {
            name: "include".to_string(),
            arguments: vec![("if".to_string(), condition)],
        }
    }

    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| value)
    }
}

/// A literal or variable reference in argument position.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Null,
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Enum(String),
    List(Vec<InputValue>),
    Object(Vec<(String, InputValue)>),
    Variable(String),
}

impl InputValue {
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_key() {
        let field = Field::new("user");
        assert_eq!(field.response_key(), "user");

        let aliased = Field::new("user").alias("me");
        assert_eq!(aliased.response_key(), "me");
    }

    #[test]
    fn test_argument_lookup() {
        let field = Field::new("user")
            .arg("id", InputValue::string("1"))
            .arg("limit", InputValue::variable("n"));

        assert_eq!(field.argument("id"), Some(&InputValue::string("1")));
        assert_eq!(field.argument("limit"), Some(&InputValue::variable("n")));
        assert_eq!(field.argument("missing"), None);
    }

    #[test]
    fn test_input_value_from_json() {
        let value = InputValue::from(serde_json::json!({"a": [1, 2.5, "x", null, true]}));
        assert_eq!(
            value,
            InputValue::Object(vec![(
                "a".to_string(),
                InputValue::List(vec![
                    InputValue::Int(1),
                    InputValue::Float(2.5),
                    InputValue::string("x"),
                    InputValue::Null,
                    InputValue::Boolean(true),
                ])
            )])
        );
    }
}
