//! Resolution of a single field.
//!
//! Everything up to attaching the continuation happens synchronously when
//! [`resolve_field`] is called: definition lookup, argument resolution,
//! instrumentation and the resolver call itself. Only the returned future
//! waits.

use crate::context::ExecutionContext;
use crate::environment::FieldEnvironment;
use crate::error::{ExecutionError, FetchError, FetchErrorParams, FieldError, ResponsePath};
use crate::instrumentation::FieldParameters;
use crate::parameters::{ExecutionParameters, FieldGroup, TypeInfo};
use crate::resolver::{ResolverArgs, ResolverError};
use crate::schema::{FieldDef, ObjectDef};
use crate::strategy::{ExecutionFuture, ExecutionResult};
use crate::unit::{panic_message, AsyncUnit, FieldValue};
use crate::values::resolve_arguments;
use futures::future::{self, FutureExt};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Resolves one selection group of the current level.
///
/// Fetch failures are recorded in the context and complete the field as
/// failed. The future fails only when null propagation reaches past this
/// field or the asynchronous unit was abandoned.
pub fn resolve_field<'a>(
    ctx: &'a ExecutionContext,
    params: &ExecutionParameters,
    fields: &FieldGroup,
) -> ExecutionFuture<'a> {
    let Some(first) = fields.first() else {
        return future::ready(Ok(ExecutionResult::from_data(Value::Null))).boxed();
    };
    let path = params.path().field(first.response_key());

    let parent_type = match params.type_info().cast_object(ctx.schema()) {
        Ok(object) => object,
        Err(e) => return future::ready(Err(e)).boxed(),
    };
    let field_def = match ctx.schema().field_def(parent_type, &first.name) {
        Ok(def) => def,
        Err(e) => {
            tracing::debug!(path = %path, error = %e, "field skipped");
            ctx.add_error(
                FieldError::new(e.to_string())
                    .with_locations(fields.iter())
                    .with_path(path)
                    .with_code("FIELD_NOT_FOUND"),
            );
            return future::ready(Ok(ExecutionResult::from_data(Value::Null))).boxed();
        }
    };

    let arguments = match resolve_arguments(&field_def.arguments, &first.arguments, ctx.variables())
    {
        Ok(args) => Arc::new(args),
        Err(e) => {
            ctx.add_error(
                FieldError::new(e.to_string())
                    .with_locations(fields.iter())
                    .with_path(path.clone())
                    .with_code("INVALID_ARGUMENT"),
            );
            let failed = child_parameters(
                params,
                field_def,
                Arc::new(ResolverArgs::new()),
                None,
                path,
            );
            return ctx.completer().complete(ctx, failed, Arc::clone(fields));
        }
    };

    let env = FieldEnvironment::new(
        ctx,
        parent_type,
        field_def.ty.clone(),
        Arc::clone(fields),
        Arc::clone(&arguments),
        params
            .source_arc()
            .map_or_else(|| Arc::new(Value::Null), Arc::clone),
        path.clone(),
    );
    let instrumented = FieldParameters {
        ctx,
        field_def,
        env: &env,
    };
    let field_span = ctx.instrumentation().begin_field(&instrumented);
    let fetch_span = ctx.instrumentation().begin_field_fetch(&instrumented);

    let unit = fetch(ctx, parent_type, field_def, &env);

    let params = params.clone();
    let fields = Arc::clone(fields);
    unit.then(move |fetched| {
        let source = match fetched {
            Ok(value) => {
                fetch_span.on_end(Ok(&value));
                Some(value)
            }
            Err(error) if error.is_broken_plumbing() => {
                tracing::error!(path = %path, error = %error, "field unit abandoned");
                fetch_span.on_end(Err(&error));
                let interrupted = ExecutionError::Interrupted {
                    path,
                    source: error,
                };
                field_span.on_end(Err(&interrupted));
                return future::ready(Err(interrupted)).boxed();
            }
            Err(error) => {
                if ctx.config().log_fetch_errors {
                    tracing::warn!(path = %path, error = %error, "exception while fetching data");
                }
                let errors = ctx.error_handler().handle(FetchErrorParams {
                    ctx,
                    field_def,
                    fields: &fields,
                    arguments: &arguments,
                    path: &path,
                    error: &error,
                });
                ctx.add_errors(errors);
                fetch_span.on_end(Err(&error));
                None
            }
        };

        let child = child_parameters(&params, field_def, arguments, source, path);
        ctx.completer()
            .complete(ctx, child, fields)
            .map(move |completed| {
                match &completed {
                    Ok(result) => field_span.on_end(Ok(result)),
                    Err(e) => field_span.on_end(Err(e)),
                }
                completed
            })
            .boxed()
    })
    .boxed()
}

/// Calls the resolver. A synchronous failure becomes a failed unit, and so
/// does a panic when `catch_panics` is set.
fn fetch(
    ctx: &ExecutionContext,
    parent_type: &ObjectDef,
    field_def: &FieldDef,
    env: &FieldEnvironment,
) -> AsyncUnit {
    let Some(resolver) = ctx.resolvers().get(&parent_type.name, &field_def.name) else {
        return AsyncUnit::failed(ResolverError::Internal(format!(
            "no resolver for {}.{}",
            parent_type.name, field_def.name
        )));
    };

    let resolved = if ctx.config().catch_panics {
        match catch_unwind(AssertUnwindSafe(|| resolver.resolve(env))) {
            Ok(resolved) => resolved,
            Err(payload) => {
                return AsyncUnit::failed(FetchError::Panicked(panic_message(payload.as_ref())))
            }
        }
    } else {
        resolver.resolve(env)
    };

    match resolved {
        Ok(FieldValue::Unit(unit)) if ctx.config().catch_panics => unit.catch_panics(),
        Ok(value) => value.into_unit(),
        Err(e) => AsyncUnit::failed(e),
    }
}

/// Parameters of the level below a field: the field's declared type linked
/// to the current type, with the current field mapping.
fn child_parameters(
    params: &ExecutionParameters,
    field_def: &FieldDef,
    arguments: Arc<ResolverArgs>,
    source: Option<Value>,
    path: ResponsePath,
) -> ExecutionParameters {
    ExecutionParameters::builder(TypeInfo::child(field_def.ty.clone(), params.type_info()))
        .fields(Arc::clone(params.fields()))
        .arguments(arguments)
        .source(source)
        .path(path)
        .build()
}
