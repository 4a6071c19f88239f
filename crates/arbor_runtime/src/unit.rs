//! Asynchronous units of resolver output.
//!
//! An [`AsyncUnit`] yields a value or a [`FetchError`] exactly once. It is
//! either already resolved, driven by a future, running on the tokio runtime,
//! or completed from the outside through a [`Completer`].

use crate::error::FetchError;
use crate::resolver::ResolverError;
use futures::future::{self, BoxFuture, FutureExt, Then};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Outcome of a fetch.
pub type FetchResult = Result<Value, FetchError>;

/// A value or failure that becomes available at most once.
pub struct AsyncUnit {
    inner: BoxFuture<'static, FetchResult>,
}

impl AsyncUnit {
    /// A unit that is already resolved.
    pub fn resolved(value: Value) -> Self {
        Self {
            inner: future::ready(Ok(value)).boxed(),
        }
    }

    /// A unit that has already failed.
    pub fn failed(error: impl Into<FetchError>) -> Self {
        Self {
            inner: future::ready(Err(error.into())).boxed(),
        }
    }

    /// Adopts a future. A panic while polling it unwinds into the poller
    /// unless the unit is wrapped with [`AsyncUnit::catch_panics`].
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, ResolverError>> + Send + 'static,
    {
        Self {
            inner: future.map(|result| result.map_err(FetchError::from)).boxed(),
        }
    }

    /// Runs the future as a task on the current tokio runtime.
    ///
    /// Must be called from within a runtime. The task keeps running even if
    /// the unit is dropped. A panic of the task is resumed in the poller.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, ResolverError>> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let inner = async move {
            match handle.await {
                Ok(result) => result.map_err(FetchError::from),
                Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
                Err(_) => Err(FetchError::Abandoned),
            }
        };
        Self {
            inner: inner.boxed(),
        }
    }

    /// Fails the unit with [`FetchError::Panicked`] instead of unwinding when
    /// producing its value panics.
    pub fn catch_panics(self) -> Self {
        let inner = AssertUnwindSafe(self.inner)
            .catch_unwind()
            .map(|outcome| match outcome {
                Ok(result) => result,
                Err(payload) => Err(FetchError::Panicked(panic_message(payload.as_ref()))),
            });
        Self {
            inner: inner.boxed(),
        }
    }

    /// A unit completed from the outside through the returned [`Completer`].
    ///
    /// Dropping the completer without completing fails the unit with
    /// [`FetchError::Abandoned`].
    pub fn channel() -> (Completer, Self) {
        let (tx, rx) = oneshot::channel();
        let inner = rx.map(|received| received.unwrap_or(Err(FetchError::Abandoned)));
        (
            Completer { tx },
            Self {
                inner: inner.boxed(),
            },
        )
    }

    /// Attaches a continuation. `f` runs exactly once, with the unit's value
    /// or failure.
    pub fn then<F, Fut>(self, f: F) -> Then<BoxFuture<'static, FetchResult>, Fut, F>
    where
        F: FnOnce(FetchResult) -> Fut,
        Fut: Future,
    {
        self.inner.then(f)
    }
}

impl Future for AsyncUnit {
    type Output = FetchResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for AsyncUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncUnit").finish_non_exhaustive()
    }
}

/// Write end of [`AsyncUnit::channel`]. Consumed by completion, so a unit is
/// completed at most once.
#[derive(Debug)]
pub struct Completer {
    tx: oneshot::Sender<FetchResult>,
}

impl Completer {
    /// Resolves the unit with a value.
    pub fn complete(self, value: Value) {
        self.finish(Ok(value));
    }

    /// Fails the unit.
    pub fn fail(self, error: ResolverError) {
        self.finish(Err(error));
    }

    /// Resolves or fails the unit.
    pub fn finish(self, result: Result<Value, ResolverError>) {
        // The receiver is gone only if nobody waits for the field any more.
        let _ = self.tx.send(result.map_err(FetchError::from));
    }

    /// Returns true if the unit was dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// What a resolver returns: a plain value or a unit to wait on.
#[derive(Debug)]
pub enum FieldValue {
    Value(Value),
    Unit(AsyncUnit),
}

impl FieldValue {
    /// Adapts into a unit. Units are adopted as they are.
    pub fn into_unit(self) -> AsyncUnit {
        match self {
            Self::Value(value) => AsyncUnit::resolved(value),
            Self::Unit(unit) => unit,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<AsyncUnit> for FieldValue {
    fn from(unit: AsyncUnit) -> Self {
        Self::Unit(unit)
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
