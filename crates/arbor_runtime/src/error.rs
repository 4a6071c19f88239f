//! Errors for Arbor execution.
//!
//! Three layers of failure are distinguished:
//! - [`FetchError`]: what a resolver's asynchronous unit fails with. Recovered
//!   at the field: converted to [`FieldError`]s and recorded in the
//!   [`ErrorSink`].
//! - [`ExecutionError`]: failures that travel up the recursion instead of
//!   being absorbed (non-null propagation, broken plumbing, type mismatches).
//! - [`FieldError`]: the serialisable error reported next to the data.

use crate::context::ExecutionContext;
use crate::query::{Field, OperationKind, SourceLocation};
use crate::resolver::{ResolverArgs, ResolverError};
use crate::schema::{FieldDef, TypeKind, TypeRef};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// A path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self::Field(s.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// Path from the root of the response to a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponsePath(Vec<PathSegment>);

impl ResponsePath {
    /// The empty path of the root level.
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns a new path extended by a field key.
    pub fn field(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Field(key.to_string()));
        Self(segments)
    }

    /// Returns a new path extended by a list index.
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The last field key on the path, if any.
    pub fn last_field(&self) -> Option<&str> {
        self.0.iter().rev().find_map(|s| match s {
            PathSegment::Field(name) => Some(name.as_str()),
            PathSegment::Index(_) => None,
        })
    }
}

impl<S: Into<PathSegment>> FromIterator<S> for ResponsePath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ResponsePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            match segment {
                PathSegment::Field(name) => write!(f, "/{name}")?,
                PathSegment::Index(i) => write!(f, "/{i}")?,
            }
        }
        Ok(())
    }
}

/// A field error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// The error message.
    pub message: String,
    /// Locations of the offending selections.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<SourceLocation>,
    /// The path to the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<ResponsePath>,
    /// Error extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<IndexMap<String, serde_json::Value>>,
}

impl FieldError {
    /// Creates a new field error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    /// Adds a path to the error.
    pub fn with_path(mut self, path: ResponsePath) -> Self {
        self.path = Some(path);
        self
    }

    /// Adds the locations of the given selections.
    pub fn with_locations<'a>(mut self, fields: impl IntoIterator<Item = &'a Field>) -> Self {
        self.locations
            .extend(fields.into_iter().filter_map(|f| f.location));
        self
    }

    /// Adds an extension.
    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), value);
        self
    }

    /// Sets the error code extension.
    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.with_extension("code", serde_json::Value::String(code.into()))
    }

    /// Returns the error code extension, if set.
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(|v| v.as_str())
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} ({path})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Failure of an asynchronous fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The resolver reported an error.
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// The resolver panicked.
    #[error("resolver panicked: {0}")]
    Panicked(String),

    /// The unit can never complete: its completer was dropped or the task
    /// driving it was lost.
    #[error("fetch was abandoned before it completed")]
    Abandoned,
}

impl FetchError {
    /// Returns true if the failure comes from the async machinery rather than
    /// from the resolver itself.
    pub fn is_broken_plumbing(&self) -> bool {
        matches!(self, Self::Abandoned)
    }
}

/// Failures that propagate up the execution instead of being recorded at a
/// single field.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// A non-nullable value was null; the nearest nullable ancestor absorbs it.
    #[error("Cannot return null for non-nullable field at {path}")]
    NonNullViolation { path: ResponsePath },

    /// The asynchronous join broke down.
    #[error("execution interrupted at {path}: {source}")]
    Interrupted {
        path: ResponsePath,
        #[source]
        source: FetchError,
    },

    /// The schema has no such field.
    #[error("Field '{field}' is not defined on type '{parent}'")]
    FieldNotFound { parent: String, field: String },

    /// A type could not be narrowed to the expected kind.
    #[error("Type '{type_name}' is {found}, expected {expected}")]
    TypeCast {
        type_name: String,
        expected: TypeKind,
        found: TypeKind,
    },

    /// A list or non-null type was used where a named type is required.
    #[error("Type '{0}' is a wrapping type, expected a named object type")]
    WrappedType(TypeRef),

    /// A type name is missing from the schema.
    #[error("Unknown type '{0}'")]
    UnknownType(String),

    /// The schema defines no root type for the operation.
    #[error("Schema does not define a {0} root type")]
    MissingRootType(OperationKind),
}

impl ExecutionError {
    /// Returns true if the error can be absorbed by a nullable ancestor.
    pub fn is_null_propagation(&self) -> bool {
        matches!(self, Self::NonNullViolation { .. })
    }
}

/// Append-only collector of field errors, shared by every branch of one
/// execution.
#[derive(Debug, Default)]
pub struct ErrorSink {
    errors: Mutex<Vec<FieldError>>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one error.
    pub fn push(&self, error: FieldError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }

    /// Appends several errors under one lock.
    pub fn extend(&self, errors: impl IntoIterator<Item = FieldError>) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(errors);
    }

    /// Copies the errors recorded so far.
    pub fn snapshot(&self) -> Vec<FieldError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything an error handler may inspect about a failed fetch.
pub struct FetchErrorParams<'a> {
    pub ctx: &'a ExecutionContext,
    pub field_def: &'a FieldDef,
    pub fields: &'a [Field],
    pub arguments: &'a ResolverArgs,
    pub path: &'a ResponsePath,
    pub error: &'a FetchError,
}

/// Converts fetch failures into reportable errors.
pub trait FetchErrorHandler: Send + Sync {
    fn handle(&self, params: FetchErrorParams<'_>) -> Vec<FieldError>;
}

/// Reports one error per failed fetch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleFetchErrorHandler;

impl FetchErrorHandler for SimpleFetchErrorHandler {
    fn handle(&self, params: FetchErrorParams<'_>) -> Vec<FieldError> {
        let code = match params.error {
            FetchError::Resolver(_) => "RESOLVER_ERROR",
            FetchError::Panicked(_) | FetchError::Abandoned => "INTERNAL_ERROR",
        };
        let error = FieldError::new(format!(
            "Exception while fetching data ({}) : {}",
            params.path, params.error
        ))
        .with_locations(params.fields)
        .with_path(params.path.clone())
        .with_code(code);
        vec![error]
    }
}
