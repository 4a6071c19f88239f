//! The environment a resolver sees for one field.

use crate::collect::collect_fields_in;
use crate::context::{Context, ExecutionContext, ExecutionId};
use crate::error::ResponsePath;
use crate::parameters::FieldGroup;
use crate::query::{Field, FragmentMap};
use crate::resolver::{ResolverArgs, ResolverError};
use crate::schema::{ObjectDef, Schema, TypeDef, TypeRef};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Nesting limit of the selection set view. Unvalidated queries may spread
/// fragments recursively.
const MAX_SELECTION_DEPTH: usize = 32;

/// Everything a resolver may inspect about the field it resolves.
///
/// Cheap to clone: shared parts are reference counted.
#[derive(Clone)]
pub struct FieldEnvironment {
    source: Arc<Value>,
    arguments: Arc<ResolverArgs>,
    root: Arc<Value>,
    fields: FieldGroup,
    field_type: TypeRef,
    parent_type: String,
    schema: Arc<Schema>,
    fragments: Arc<FragmentMap>,
    context: Arc<Context>,
    execution_id: ExecutionId,
    path: ResponsePath,
    selection_set: Arc<OnceLock<SelectionSetView>>,
}

impl FieldEnvironment {
    pub(crate) fn new(
        ctx: &ExecutionContext,
        parent: &ObjectDef,
        field_type: TypeRef,
        fields: FieldGroup,
        arguments: Arc<ResolverArgs>,
        source: Arc<Value>,
        path: ResponsePath,
    ) -> Self {
        Self {
            source,
            arguments,
            root: Arc::clone(ctx.root()),
            fields,
            field_type,
            parent_type: parent.name.clone(),
            schema: Arc::clone(ctx.schema()),
            fragments: Arc::clone(ctx.fragments()),
            context: Arc::clone(ctx.context()),
            execution_id: ctx.execution_id().clone(),
            path,
            selection_set: Arc::new(OnceLock::new()),
        }
    }

    /// Name of the field being resolved (not its alias).
    pub fn field_name(&self) -> &str {
        self.fields.first().map(|f| f.name.as_str()).unwrap_or_default()
    }

    /// The selections merged under this field's response key.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// The first selection of the group.
    pub fn field(&self) -> Option<&Field> {
        self.fields.first()
    }

    /// The parent value this field is resolved on.
    pub fn source(&self) -> &Value {
        &self.source
    }

    /// Deserializes the parent value.
    pub fn source_as<T: DeserializeOwned>(&self) -> Result<T, ResolverError> {
        T::deserialize(self.source.as_ref())
            .map_err(|e| ResolverError::Internal(format!("invalid source value: {e}")))
    }

    pub fn arguments(&self) -> &ResolverArgs {
        &self.arguments
    }

    /// Gets an argument by name.
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Gets a required argument as a specific type.
    pub fn require<T: DeserializeOwned>(&self, name: &str) -> Result<T, ResolverError> {
        self.arguments.require(name)
    }

    /// The root value of the execution.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Declared type of the field.
    pub fn field_type(&self) -> &TypeRef {
        &self.field_type
    }

    /// Name of the object type the field is defined on.
    pub fn parent_type(&self) -> &str {
        &self.parent_type
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn fragments(&self) -> &FragmentMap {
        &self.fragments
    }

    /// Request-scoped data.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    /// Path of the field in the response.
    pub fn path(&self) -> &ResponsePath {
        &self.path
    }

    /// The sub-selections of this field, built on first access.
    pub fn selection_set(&self) -> &SelectionSetView {
        self.selection_set.get_or_init(|| {
            let mut view = SelectionSetView::default();
            view.walk(
                &self.schema,
                &self.fragments,
                &self.context.variables,
                &self.field_type,
                &self.fields,
                "",
                1,
            );
            view
        })
    }

    #[cfg(test)]
    pub(crate) fn for_test(parent_type: &str, field_name: &str, source: Value) -> Self {
        Self {
            source: Arc::new(source),
            arguments: Arc::new(ResolverArgs::new()),
            root: Arc::new(Value::Null),
            fields: Arc::from(vec![Field::new(field_name)]),
            field_type: TypeRef::named("String"),
            parent_type: parent_type.to_string(),
            schema: Arc::new(Schema::new()),
            fragments: Arc::new(FragmentMap::default()),
            context: Arc::new(Context::new()),
            execution_id: ExecutionId::from("test"),
            path: ResponsePath::root().field(field_name),
            selection_set: Arc::new(OnceLock::new()),
        }
    }
}

impl fmt::Debug for FieldEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldEnvironment")
            .field("parent_type", &self.parent_type)
            .field("field", &self.field_name())
            .field("path", &self.path)
            .field("execution_id", &self.execution_id)
            .finish_non_exhaustive()
    }
}

/// One field below the resolved field.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedField {
    /// Field name.
    pub name: String,
    /// Alias or name.
    pub response_key: String,
    /// Slash separated field names from the resolved field, e.g. `author/name`.
    pub qualified_name: String,
    /// Object type the field was collected on.
    pub object_type: String,
    /// 1 for direct children.
    pub level: usize,
}

/// Flattened view of a field's sub-selections.
///
/// Abstract types contribute the fields of every possible object type.
#[derive(Debug, Clone, Default)]
pub struct SelectionSetView {
    fields: Vec<SelectedField>,
}

impl SelectionSetView {
    /// All selected fields, depth first.
    pub fn fields(&self) -> &[SelectedField] {
        &self.fields
    }

    /// Direct children only.
    pub fn immediate_fields(&self) -> impl Iterator<Item = &SelectedField> {
        self.fields.iter().filter(|f| f.level == 1)
    }

    /// Returns true if a field matches `pattern`.
    ///
    /// Patterns are qualified names where `*` matches one segment and `**`
    /// any number of segments.
    pub fn contains(&self, pattern: &str) -> bool {
        let pattern: Vec<&str> = pattern.split('/').collect();
        self.fields.iter().any(|f| {
            let name: Vec<&str> = f.qualified_name.split('/').collect();
            glob_match(&pattern, &name)
        })
    }

    /// Returns true if every pattern matches some field.
    pub fn contains_all<'p>(&self, patterns: impl IntoIterator<Item = &'p str>) -> bool {
        patterns.into_iter().all(|p| self.contains(p))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &mut self,
        schema: &Schema,
        fragments: &FragmentMap,
        variables: &std::collections::HashMap<String, Value>,
        ty: &TypeRef,
        group: &[Field],
        prefix: &str,
        level: usize,
    ) {
        if level > MAX_SELECTION_DEPTH {
            return;
        }
        let objects: Vec<&ObjectDef> = match schema.get_type(ty.named_type()) {
            Some(TypeDef::Object(object)) => vec![object],
            Some(t) if t.is_abstract() => schema.possible_types(t.name()),
            _ => return,
        };
        for object in objects {
            let sub = collect_fields_in(
                schema,
                fragments,
                variables,
                object,
                group.iter().map(|f| &f.selection_set),
            );
            for (key, fields) in &sub {
                let Some(first) = fields.first() else {
                    continue;
                };
                let qualified_name = if prefix.is_empty() {
                    first.name.clone()
                } else {
                    format!("{prefix}/{}", first.name)
                };
                self.fields.push(SelectedField {
                    name: first.name.clone(),
                    response_key: key.clone(),
                    qualified_name: qualified_name.clone(),
                    object_type: object.name.clone(),
                    level,
                });
                if let Ok(def) = schema.field_def(object, &first.name) {
                    self.walk(
                        schema,
                        fragments,
                        variables,
                        &def.ty,
                        fields,
                        &qualified_name,
                        level + 1,
                    );
                }
            }
        }
    }
}

fn glob_match(pattern: &[&str], name: &[&str]) -> bool {
    match (pattern.split_first(), name.split_first()) {
        (None, None) => true,
        (Some((&"**", rest)), _) => {
            glob_match(rest, name) || (!name.is_empty() && glob_match(pattern, &name[1..]))
        }
        (Some((p, rest)), Some((n, name_rest))) => {
            (*p == "*" || p == n) && glob_match(rest, name_rest)
        }
        _ => false,
    }
}
