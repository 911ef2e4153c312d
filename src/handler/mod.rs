//! Handler and middleware types.
//!
//! Every node-level callable — method handlers, the not-allowed handler,
//! the request passer and the request handler — is a [`BoxHandler`]: a
//! shared closure that takes the request context and resolves to the
//! context plus a `Handled` flag. `true` means a response was produced
//! (or the request was terminally rejected); `false` is returned only by
//! a request passer whose subtree found no match, letting the nearest
//! subtree-handler ancestor take over.

pub(crate) mod methods;

use crate::dispatch::RequestContext;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Whether a handler produced a response.
pub type Handled = bool;

pub type HandlerFuture = BoxFuture<'static, (RequestContext, Handled)>;

/// A shared, callable handler value.
pub type BoxHandler = Arc<dyn Fn(RequestContext) -> HandlerFuture + Send + Sync>;

/// Builds a [`BoxHandler`] from an async closure.
///
/// ```ignore
/// let hello = handler_fn(|mut ctx| async move {
///     ctx.set_response(text_response("hello"));
///     (ctx, true)
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> BoxHandler
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (RequestContext, Handled)> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// A unary handler wrapper. Middleware maps a handler to a handler;
/// when several are applied, the last-listed one becomes the outermost
/// caller.
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: BoxHandler) -> BoxHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxHandler) -> BoxHandler + Send + Sync,
{
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        self(next)
    }
}

/// Applies middleware in listed order, so the last entry wraps all the
/// earlier ones.
pub(crate) fn wrap_all(handler: BoxHandler, middleware: &[Arc<dyn Middleware>]) -> BoxHandler {
    let mut wrapped = handler;
    for mw in middleware {
        wrapped = mw.wrap(wrapped);
    }
    wrapped
}
