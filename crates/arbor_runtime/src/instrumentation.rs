//! Instrumentation hooks around field resolution.
//!
//! Every `begin_*` call returns a context that must be ended exactly once.
//! [`InstrumentationContext::on_end`] consumes the box, so a span cannot be
//! ended twice.

use crate::context::ExecutionContext;
use crate::environment::FieldEnvironment;
use crate::schema::FieldDef;
use crate::strategy::ExecutionResult;
use serde_json::Value;
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;

/// What an instrumentation sees when a field span begins.
pub struct FieldParameters<'a> {
    pub ctx: &'a ExecutionContext,
    pub field_def: &'a FieldDef,
    pub env: &'a FieldEnvironment,
}

/// An open span.
pub trait InstrumentationContext<T>: Send {
    /// Ends the span with the outcome.
    fn on_end(self: Box<Self>, result: Result<&T, &dyn Error>);
}

/// Hooks called around each field and each fetch.
pub trait Instrumentation: Send + Sync {
    /// Begins the span of a whole field: fetch plus completion.
    fn begin_field(
        &self,
        params: &FieldParameters<'_>,
    ) -> Box<dyn InstrumentationContext<ExecutionResult>>;

    /// Begins the span of the resolver call and its asynchronous unit.
    fn begin_field_fetch(&self, params: &FieldParameters<'_>)
        -> Box<dyn InstrumentationContext<Value>>;
}

/// Context that does nothing when ended.
pub struct NoOpContext;

impl<T> InstrumentationContext<T> for NoOpContext {
    fn on_end(self: Box<Self>, _result: Result<&T, &dyn Error>) {}
}

/// Instrumentation that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpInstrumentation;

impl Instrumentation for NoOpInstrumentation {
    fn begin_field(
        &self,
        _params: &FieldParameters<'_>,
    ) -> Box<dyn InstrumentationContext<ExecutionResult>> {
        Box::new(NoOpContext)
    }

    fn begin_field_fetch(
        &self,
        _params: &FieldParameters<'_>,
    ) -> Box<dyn InstrumentationContext<Value>> {
        Box::new(NoOpContext)
    }
}

/// Emits a `tracing` span per field and per fetch, with the elapsed time
/// recorded when the span ends.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInstrumentation;

struct TracingContext {
    span: tracing::Span,
    started: Instant,
}

impl TracingContext {
    fn new(span: tracing::Span) -> Self {
        Self {
            span,
            started: Instant::now(),
        }
    }
}

impl<T> InstrumentationContext<T> for TracingContext {
    fn on_end(self: Box<Self>, result: Result<&T, &dyn Error>) {
        let elapsed_us = u64::try_from(self.started.elapsed().as_micros()).unwrap_or(u64::MAX);
        let _entered = self.span.enter();
        match result {
            Ok(_) => tracing::debug!(elapsed_us, "completed"),
            Err(e) => tracing::debug!(elapsed_us, error = %e, "failed"),
        }
    }
}

impl Instrumentation for TracingInstrumentation {
    fn begin_field(
        &self,
        params: &FieldParameters<'_>,
    ) -> Box<dyn InstrumentationContext<ExecutionResult>> {
        let span = tracing::debug_span!(
            "field",
            execution_id = %params.ctx.execution_id(),
            path = %params.env.path(),
            parent = params.env.parent_type(),
            ty = %params.field_def.ty,
        );
        Box::new(TracingContext::new(span))
    }

    fn begin_field_fetch(
        &self,
        params: &FieldParameters<'_>,
    ) -> Box<dyn InstrumentationContext<Value>> {
        let span = tracing::debug_span!(
            "fetch",
            execution_id = %params.ctx.execution_id(),
            path = %params.env.path(),
            field = params.field_def.name.as_str(),
        );
        Box::new(TracingContext::new(span))
    }
}

/// Runs several instrumentations. Spans begin in order and end in order.
#[derive(Default, Clone)]
pub struct ChainedInstrumentation {
    instrumentations: Vec<Arc<dyn Instrumentation>>,
}

impl ChainedInstrumentation {
    pub fn new(instrumentations: Vec<Arc<dyn Instrumentation>>) -> Self {
        Self { instrumentations }
    }

    /// Appends an instrumentation to the chain.
    pub fn with(mut self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        self.instrumentations.push(instrumentation);
        self
    }

    pub fn len(&self) -> usize {
        self.instrumentations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrumentations.is_empty()
    }
}

struct ChainedContext<T> {
    contexts: Vec<Box<dyn InstrumentationContext<T>>>,
}

impl<T> InstrumentationContext<T> for ChainedContext<T> {
    fn on_end(self: Box<Self>, result: Result<&T, &dyn Error>) {
        for context in self.contexts {
            context.on_end(result);
        }
    }
}

impl Instrumentation for ChainedInstrumentation {
    fn begin_field(
        &self,
        params: &FieldParameters<'_>,
    ) -> Box<dyn InstrumentationContext<ExecutionResult>> {
        Box::new(ChainedContext {
            contexts: self
                .instrumentations
                .iter()
                .map(|i| i.begin_field(params))
                .collect(),
        })
    }

    fn begin_field_fetch(
        &self,
        params: &FieldParameters<'_>,
    ) -> Box<dyn InstrumentationContext<Value>> {
        Box::new(ChainedContext {
            contexts: self
                .instrumentations
                .iter()
                .map(|i| i.begin_field_fetch(params))
                .collect(),
        })
    }
}
