//! Fixtures shared by unit tests.

use crate::completion::{DefaultValueCompleter, ValueCompleter};
use crate::context::ExecutionContext;
use crate::instrumentation::{FieldParameters, Instrumentation, InstrumentationContext};
use crate::parameters::{ExecutionParameters, FieldGroup, TypeInfo};
use crate::schema::{
    EnumDef, EnumValueDef, FieldDef, InterfaceDef, ObjectDef, Schema, SchemaBuilder, TypeDef,
    TypeRef,
};
use crate::strategy::{ExecutionFuture, ExecutionResult};
use indexmap::IndexMap;
use serde_json::Value;
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// ```graphql
/// type Query { a: Int  b: Int  c: Int  greeting: String!  user: User
///              users: [User]  node: Node  tags: [String!]  role: Role }
/// type User implements Node { id: ID!  name: String!  nickname: String
///                             friends: [User!] }
/// ```
pub(crate) fn query_schema() -> Schema {
    let int = || TypeRef::named("Int");
    SchemaBuilder::new()
        .query_type("Query")
        .mutation_type("Mutation")
        .object(
            ObjectDef::new("Query")
                .field(FieldDef::new("a", int()))
                .field(FieldDef::new("b", int()))
                .field(FieldDef::new("c", int()))
                .field(FieldDef::new(
                    "greeting",
                    TypeRef::non_null(TypeRef::named("String")),
                ))
                .field(FieldDef::new("user", TypeRef::named("User")))
                .field(FieldDef::new("users", TypeRef::list(TypeRef::named("User"))))
                .field(FieldDef::new("node", TypeRef::named("Node")))
                .field(FieldDef::new(
                    "tags",
                    TypeRef::list(TypeRef::non_null(TypeRef::named("String"))),
                ))
                .field(FieldDef::new("role", TypeRef::named("Role"))),
        )
        .object(
            ObjectDef::new("Mutation")
                .field(FieldDef::new("first", int()))
                .field(FieldDef::new("second", int())),
        )
        .object(
            ObjectDef::new("User")
                .implements("Node")
                .field(FieldDef::new("id", TypeRef::non_null(TypeRef::named("ID"))))
                .field(FieldDef::new(
                    "name",
                    TypeRef::non_null(TypeRef::named("String")),
                ))
                .field(FieldDef::new("nickname", TypeRef::named("String")))
                .field(FieldDef::new(
                    "friends",
                    TypeRef::list(TypeRef::non_null(TypeRef::named("User"))),
                )),
        )
        .add_type(TypeDef::Interface(InterfaceDef {
            name: "Node".to_string(),
            description: None,
            fields: IndexMap::new(),
            implements: Vec::new(),
        }))
        .add_type(TypeDef::Enum(EnumDef {
            name: "Role".to_string(),
            description: None,
            values: ["ADMIN", "READER"]
                .into_iter()
                .map(|name| EnumValueDef {
                    name: name.to_string(),
                    description: None,
                    deprecated: false,
                    deprecation_reason: None,
                })
                .collect(),
        }))
        .build()
}

/// Span counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SpanCounts {
    pub fields_begun: usize,
    pub fields_ended: usize,
    pub fields_failed: usize,
    pub fetches_begun: usize,
    pub fetches_ended: usize,
    pub fetches_failed: usize,
}

#[derive(Debug, Default)]
struct Counters {
    fields_begun: AtomicUsize,
    fields_ended: AtomicUsize,
    fields_failed: AtomicUsize,
    fetches_begun: AtomicUsize,
    fetches_ended: AtomicUsize,
    fetches_failed: AtomicUsize,
}

/// Counts begun and ended spans.
#[derive(Debug, Default)]
pub(crate) struct CountingInstrumentation {
    counters: Arc<Counters>,
}

impl CountingInstrumentation {
    pub(crate) fn snapshot(&self) -> SpanCounts {
        let c = &self.counters;
        SpanCounts {
            fields_begun: c.fields_begun.load(Ordering::SeqCst),
            fields_ended: c.fields_ended.load(Ordering::SeqCst),
            fields_failed: c.fields_failed.load(Ordering::SeqCst),
            fetches_begun: c.fetches_begun.load(Ordering::SeqCst),
            fetches_ended: c.fetches_ended.load(Ordering::SeqCst),
            fetches_failed: c.fetches_failed.load(Ordering::SeqCst),
        }
    }
}

struct FieldCounter(Arc<Counters>);

impl InstrumentationContext<ExecutionResult> for FieldCounter {
    fn on_end(self: Box<Self>, result: Result<&ExecutionResult, &dyn Error>) {
        self.0.fields_ended.fetch_add(1, Ordering::SeqCst);
        if result.is_err() {
            self.0.fields_failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct FetchCounter(Arc<Counters>);

impl InstrumentationContext<Value> for FetchCounter {
    fn on_end(self: Box<Self>, result: Result<&Value, &dyn Error>) {
        self.0.fetches_ended.fetch_add(1, Ordering::SeqCst);
        if result.is_err() {
            self.0.fetches_failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Instrumentation for CountingInstrumentation {
    fn begin_field(
        &self,
        _params: &FieldParameters<'_>,
    ) -> Box<dyn InstrumentationContext<ExecutionResult>> {
        self.counters.fields_begun.fetch_add(1, Ordering::SeqCst);
        Box::new(FieldCounter(Arc::clone(&self.counters)))
    }

    fn begin_field_fetch(
        &self,
        _params: &FieldParameters<'_>,
    ) -> Box<dyn InstrumentationContext<Value>> {
        self.counters.fetches_begun.fetch_add(1, Ordering::SeqCst);
        Box::new(FetchCounter(Arc::clone(&self.counters)))
    }
}

/// What a recording completer saw.
#[derive(Debug, Clone)]
pub(crate) struct CompletionCall {
    pub path: String,
    pub type_info: Arc<TypeInfo>,
    pub source: Option<Value>,
    pub group_len: usize,
}

/// Records every completion, then completes as usual.
#[derive(Debug, Default)]
pub(crate) struct RecordingCompleter {
    calls: Mutex<Vec<CompletionCall>>,
}

impl RecordingCompleter {
    pub(crate) fn calls(&self) -> Vec<CompletionCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ValueCompleter for RecordingCompleter {
    fn complete<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        params: ExecutionParameters,
        fields: FieldGroup,
    ) -> ExecutionFuture<'a> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(CompletionCall {
                path: params.path().to_string(),
                type_info: Arc::clone(params.type_info()),
                source: params.source().cloned(),
                group_len: fields.len(),
            });
        }
        DefaultValueCompleter.complete(ctx, params, fields)
    }
}
