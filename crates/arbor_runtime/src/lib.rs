//! Runtime for Arbor.
//!
//! This crate provides the asynchronous field-resolution engine:
//! - `schema`: Schema definition and building
//! - `query`: Selection tree of an operation
//! - `collect`: Field collection (fragments, `@skip`/`@include`)
//! - `values`: Argument resolution
//! - `context`: Shared state of one execution
//! - `parameters`: Per-level parameters and type ancestry
//! - `environment`: What a resolver sees of its field
//! - `resolver`: Resolver registry
//! - `unit`: Asynchronous units returned by resolvers
//! - `error`: Paths, field errors and the error sink
//! - `resolve`: Resolution of one field
//! - `completion`: Value completion and null propagation
//! - `strategy`: Dispatch and aggregation of one level
//! - `instrumentation`: Field and fetch spans
//! - `executor`: Query execution

pub mod collect;
pub mod completion;
pub mod context;
pub mod environment;
pub mod error;
pub mod executor;
pub mod instrumentation;
pub mod parameters;
pub mod query;
pub mod resolve;
pub mod resolver;
pub mod schema;
pub mod strategy;
pub mod unit;
pub mod values;

#[cfg(test)]
mod test_support;

pub use completion::{DefaultValueCompleter, ValueCompleter};
pub use context::{Context, ExecutionContext, ExecutionId};
pub use environment::{FieldEnvironment, SelectedField, SelectionSetView};
pub use error::{
    ErrorSink, ExecutionError, FetchError, FetchErrorHandler, FetchErrorParams, FieldError,
    PathSegment, ResponsePath, SimpleFetchErrorHandler,
};
pub use executor::{ExecutionInput, Executor, ExecutorConfig, Response};
pub use instrumentation::{
    ChainedInstrumentation, FieldParameters, Instrumentation, InstrumentationContext,
    NoOpInstrumentation, TracingInstrumentation,
};
pub use parameters::{ExecutionParameters, FieldGroup, FieldMap, TypeInfo};
pub use query::{
    Directive, Field, FragmentDefinition, FragmentMap, InlineFragment, InputValue, Operation,
    OperationKind, Selection, SelectionSet,
};
pub use resolver::{Resolver, ResolverArgs, ResolverError, ResolverMap, ResolverResult};
pub use schema::{FieldDef, InputFieldDef, ObjectDef, Schema, SchemaBuilder, TypeDef, TypeRef};
pub use strategy::{
    AsyncExecutionStrategy, ExecutionFuture, ExecutionResult, ExecutionStrategy,
    SerialExecutionStrategy,
};
pub use unit::{AsyncUnit, Completer, FieldValue};
pub use values::ArgumentError;
