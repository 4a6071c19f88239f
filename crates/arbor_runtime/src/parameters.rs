//! Per-level execution parameters.

use crate::error::{ExecutionError, ResponsePath};
use crate::query::Field;
use crate::resolver::ResolverArgs;
use crate::schema::{ObjectDef, Schema, TypeDef, TypeRef};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// Selections sharing one response key.
pub type FieldGroup = Arc<[Field]>;

/// Response key to merged selections, in declaration order.
pub type FieldMap = IndexMap<String, FieldGroup>;

/// The type at one level of the execution, linked to the level above.
///
/// Links only point upwards, so the chain ends at the root.
#[derive(Debug)]
pub struct TypeInfo {
    ty: TypeRef,
    parent: Option<Arc<TypeInfo>>,
}

impl TypeInfo {
    /// Type information of a root level.
    pub fn root(ty: TypeRef) -> Arc<Self> {
        Arc::new(Self { ty, parent: None })
    }

    /// Type information of a level below `parent`.
    pub fn child(ty: TypeRef, parent: &Arc<TypeInfo>) -> Arc<Self> {
        Arc::new(Self {
            ty,
            parent: Some(Arc::clone(parent)),
        })
    }

    /// Same level, different type: list items and resolved object types keep
    /// the parent of the field they belong to.
    pub fn retyped(&self, ty: TypeRef) -> Arc<Self> {
        Arc::new(Self {
            ty,
            parent: self.parent.clone(),
        })
    }

    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    pub fn parent(&self) -> Option<&Arc<TypeInfo>> {
        self.parent.as_ref()
    }

    /// Walks the chain upwards, starting with the parent.
    pub fn ancestors(&self) -> impl Iterator<Item = &TypeInfo> {
        std::iter::successors(self.parent.as_deref(), |info| info.parent.as_deref())
    }

    pub fn is_non_null(&self) -> bool {
        self.ty.is_non_null()
    }

    /// Narrows the current type to an object type.
    ///
    /// Fails if the type is wrapped (list or non-null) or names anything but
    /// an object type.
    pub fn cast_object<'s>(&self, schema: &'s Schema) -> Result<&'s ObjectDef, ExecutionError> {
        match &self.ty {
            TypeRef::Named(name) => schema.require_type(name).and_then(TypeDef::as_object),
            wrapped => Err(ExecutionError::WrappedType(wrapped.clone())),
        }
    }
}

/// Immutable snapshot of the state of one recursion level.
#[derive(Debug, Clone)]
pub struct ExecutionParameters {
    type_info: Arc<TypeInfo>,
    fields: Arc<FieldMap>,
    arguments: Arc<ResolverArgs>,
    source: Option<Arc<Value>>,
    path: ResponsePath,
}

impl ExecutionParameters {
    /// Starts building parameters for a level of type `type_info`.
    pub fn builder(type_info: Arc<TypeInfo>) -> ExecutionParametersBuilder {
        ExecutionParametersBuilder {
            type_info,
            fields: Arc::new(FieldMap::new()),
            arguments: Arc::new(ResolverArgs::new()),
            source: None,
            path: ResponsePath::root(),
        }
    }

    pub fn type_info(&self) -> &Arc<TypeInfo> {
        &self.type_info
    }

    pub fn fields(&self) -> &Arc<FieldMap> {
        &self.fields
    }

    pub fn arguments(&self) -> &Arc<ResolverArgs> {
        &self.arguments
    }

    /// The value being drilled into; `None` when the fetch for it failed.
    pub fn source(&self) -> Option<&Value> {
        self.source.as_deref()
    }

    /// The shared source value.
    pub fn source_arc(&self) -> Option<&Arc<Value>> {
        self.source.as_ref()
    }

    pub fn path(&self) -> &ResponsePath {
        &self.path
    }
}

/// Builder for [`ExecutionParameters`].
#[derive(Debug)]
pub struct ExecutionParametersBuilder {
    type_info: Arc<TypeInfo>,
    fields: Arc<FieldMap>,
    arguments: Arc<ResolverArgs>,
    source: Option<Arc<Value>>,
    path: ResponsePath,
}

impl ExecutionParametersBuilder {
    pub fn fields(mut self, fields: Arc<FieldMap>) -> Self {
        self.fields = fields;
        self
    }

    pub fn arguments(mut self, arguments: Arc<ResolverArgs>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn source(mut self, source: Option<Value>) -> Self {
        self.source = source.map(Arc::new);
        self
    }

    /// Like [`source`](Self::source), sharing a value other levels hold too.
    pub fn source_arc(mut self, source: Option<Arc<Value>>) -> Self {
        self.source = source;
        self
    }

    pub fn path(mut self, path: ResponsePath) -> Self {
        self.path = path;
        self
    }

    pub fn build(self) -> ExecutionParameters {
        ExecutionParameters {
            type_info: self.type_info,
            fields: self.fields,
            arguments: self.arguments,
            source: self.source,
            path: self.path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, SchemaBuilder};

    #[test]
    fn test_type_info_chain() {
        let root = TypeInfo::root(TypeRef::named("Query"));
        let user = TypeInfo::child(TypeRef::named("User"), &root);
        let name = TypeInfo::child(TypeRef::non_null(TypeRef::named("String")), &user);

        assert!(Arc::ptr_eq(name.parent().unwrap(), &user));
        assert!(Arc::ptr_eq(user.parent().unwrap(), &root));
        assert!(root.parent().is_none());

        let chain: Vec<String> = name.ancestors().map(|t| t.ty().to_string()).collect();
        assert_eq!(chain, vec!["User", "Query"]);
        assert!(name.is_non_null());
    }

    #[test]
    fn test_cast_object() {
        let schema = SchemaBuilder::new()
            .object(ObjectDef::new("Query").field(FieldDef::new("a", TypeRef::named("Int"))))
            .build();

        let query = TypeInfo::root(TypeRef::named("Query"));
        assert_eq!(query.cast_object(&schema).unwrap().name, "Query");

        let int = TypeInfo::root(TypeRef::named("Int"));
        assert!(matches!(
            int.cast_object(&schema),
            Err(ExecutionError::TypeCast { .. })
        ));

        let list = TypeInfo::root(TypeRef::list(TypeRef::named("Query")));
        assert!(matches!(
            list.cast_object(&schema),
            Err(ExecutionError::WrappedType(_))
        ));
    }
}
