//! Template-driven host/path HTTP request multiplexer.
//!
//! Hosts and resources are declared with compact URL templates
//! (`https://{sub:[a-z]+}.example.com/users/{id:\d+}`); requests walk
//! the resulting tree one path segment at a time, matching the static
//! bucket first, then pattern children in registration order, then the
//! wildcard. Each node enforces its own policy — scheme, path
//! cleanliness, trailing slash, subtree fallback — and either handles
//! the request, redirects, or ends in not-found.
//!
//! ```ignore
//! let mut router = Router::new();
//! router
//!     .resource_mut("/users/{id:\\d+}")?
//!     .set_handler_for("GET", handler_fn(|mut ctx| async move {
//!         let id = ctx.path_params().get("id").unwrap_or("").to_string();
//!         ctx.set_response(text_response(StatusCode::OK, id));
//!         (ctx, true)
//!     }))?;
//!
//! let service = router.compile()?; // frozen; serve it on hyper
//! ```

mod dispatch;
mod error;
mod handler;
mod host;
mod resource;
mod response;
mod router;
mod routing;
mod template;

pub use dispatch::RequestContext;
pub use error::{RouterError, TemplateError};
pub use handler::{handler_fn, BoxHandler, Handled, HandlerFuture, Middleware};
pub use host::Host;
pub use resource::Resource;
pub use response::{
    empty_body, full_body, set_common_redirect_handler, set_not_found_handler,
    set_permanent_redirect_code, text_response, BoxBody, NotFoundHandler, RedirectCode,
    RedirectHook,
};
pub use router::{Router, RouterService};
pub use template::{Similarity, Template, UriParams};
