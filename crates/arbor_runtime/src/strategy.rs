//! Execution strategies: how the fields of one level are dispatched and
//! joined.

use crate::context::ExecutionContext;
use crate::error::{ExecutionError, FieldError};
use crate::parameters::ExecutionParameters;
use crate::resolve::resolve_field;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Future of a level or field outcome.
pub type ExecutionFuture<'a> = BoxFuture<'a, Result<ExecutionResult, ExecutionError>>;

/// Resolved data together with the errors recorded so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl ExecutionResult {
    pub fn new(data: Value, errors: Vec<FieldError>) -> Self {
        Self { data, errors }
    }

    /// A result carrying data only.
    pub fn from_data(data: Value) -> Self {
        Self::new(data, Vec::new())
    }
}

/// Executes the fields of one level.
pub trait ExecutionStrategy: Send + Sync {
    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        params: ExecutionParameters,
    ) -> ExecutionFuture<'a>;
}

/// Issues every field of the level before waiting on any of them, then joins
/// them in declaration order.
#[derive(Debug, Default, Clone, Copy)]
pub struct AsyncExecutionStrategy;

impl ExecutionStrategy for AsyncExecutionStrategy {
    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        params: ExecutionParameters,
    ) -> ExecutionFuture<'a> {
        let fields = Arc::clone(params.fields());
        let mut keys = Vec::with_capacity(fields.len());
        let mut pending = Vec::with_capacity(fields.len());
        for (key, group) in fields.iter() {
            keys.push(key.clone());
            pending.push(resolve_field(ctx, &params, group));
        }
        tracing::debug!(path = %params.path(), fields = keys.len(), "fields dispatched");

        async move {
            let outcomes = join_all(pending).await;
            tracing::debug!(path = %params.path(), "fields joined");
            let assembled = assemble(keys.into_iter().zip(outcomes), ctx.errors().snapshot());
            if let Err(e) = &assembled {
                log_fatal(&params, e);
            }
            assembled
        }
        .boxed()
    }
}

/// Resolves the fields of the level one after another. A field's resolver is
/// only called once the previous field has completed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialExecutionStrategy;

impl ExecutionStrategy for SerialExecutionStrategy {
    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        params: ExecutionParameters,
    ) -> ExecutionFuture<'a> {
        async move {
            let fields = Arc::clone(params.fields());
            let mut outcomes = Vec::with_capacity(fields.len());
            for (key, group) in fields.iter() {
                let outcome = resolve_field(ctx, &params, group).await;
                if let Err(e) = &outcome {
                    log_fatal(&params, e);
                    return outcome;
                }
                outcomes.push((key.clone(), outcome));
            }
            assemble(outcomes, ctx.errors().snapshot())
        }
        .boxed()
    }
}

fn log_fatal(params: &ExecutionParameters, error: &ExecutionError) {
    if error.is_null_propagation() {
        tracing::debug!(path = %params.path(), error = %error, "level nulled");
    } else {
        tracing::error!(path = %params.path(), error = %error, "level execution failed");
    }
}

/// Folds field outcomes into the level result, in the order given.
///
/// A failure other than null propagation wins over null propagation. Among
/// failures of the same kind the first in order is returned.
pub fn assemble(
    outcomes: impl IntoIterator<Item = (String, Result<ExecutionResult, ExecutionError>)>,
    errors: Vec<FieldError>,
) -> Result<ExecutionResult, ExecutionError> {
    let mut data = Map::new();
    let mut violation = None;
    for (key, outcome) in outcomes {
        match outcome {
            Ok(result) => {
                data.insert(key, result.data);
            }
            Err(e) if e.is_null_propagation() => {
                violation.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }
    match violation {
        Some(e) => Err(e),
        None => Ok(ExecutionResult::new(Value::Object(data), errors)),
    }
}
