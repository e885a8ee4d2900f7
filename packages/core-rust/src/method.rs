//! Type-erased service methods and lifecycle hooks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::CallError;
use crate::types::Value;

pub type MethodResult = Result<Value, CallError>;

/// Boxed future returned by every service method.
pub type MethodFuture = Pin<Box<dyn Future<Output = MethodResult> + Send>>;

/// An async callable bound to a service instance. Arguments are positional.
pub type Method = Arc<dyn Fn(Vec<Value>) -> MethodFuture + Send + Sync>;

pub type HookFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// `initialize` / `teardown` hook stored on a service.
pub type Hook = Arc<dyn Fn() -> HookFuture + Send + Sync>;

/// Wraps an async closure as a [`Method`].
pub fn method<F, Fut>(f: F) -> Method
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |args| {
        let fut = f(args);
        Box::pin(async move { fut.await.map_err(CallError::from) })
    })
}

/// Wraps a synchronous closure as a [`Method`]. Calls still go through a
/// future, so callers cannot tell the two apart.
pub fn sync_method<F>(f: F) -> Method
where
    F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(move |args| {
        let outcome = f(args).map_err(CallError::from);
        Box::pin(async move { outcome })
    })
}

/// Wraps an async closure as a lifecycle [`Hook`].
pub fn hook<F, Fut>(f: F) -> Hook
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}
