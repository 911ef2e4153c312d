//! Response bodies, the responses the dispatcher synthesizes itself,
//! and the process-wide responder defaults.

use crate::dispatch::RequestContext;
use arc_swap::ArcSwap;
use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE, LOCATION};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use std::sync::{Arc, LazyLock};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// A plain-text response, the common case in handlers and tests.
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> hyper::Response<BoxBody> {
    hyper::Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(full_body(body))
        .unwrap()
}

/// The status code used for the dispatcher's synthesized redirects.
/// Permanent codes only; the dispatcher never issues 302/307.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectCode {
    /// `308 Permanent Redirect` — the default.
    PermanentRedirect,
    /// `301 Moved Permanently` — for clients that mishandle 308.
    MovedPermanently,
}

impl RedirectCode {
    fn status(self) -> StatusCode {
        match self {
            RedirectCode::PermanentRedirect => StatusCode::PERMANENT_REDIRECT,
            RedirectCode::MovedPermanently => StatusCode::MOVED_PERMANENTLY,
        }
    }
}

/// Replaces the dispatcher's default `404 Not Found` response.
pub type NotFoundHandler =
    Arc<dyn Fn(&RequestContext) -> hyper::Response<BoxBody> + Send + Sync>;

/// Wraps every redirect the dispatcher synthesizes, e.g. to log it or
/// to attach a body.
pub type RedirectHook = Arc<
    dyn Fn(&RequestContext, hyper::Response<BoxBody>) -> hyper::Response<BoxBody> + Send + Sync,
>;

#[derive(Clone)]
struct ResponderDefaults {
    redirect_code: RedirectCode,
    not_found: Option<NotFoundHandler>,
    redirect_hook: Option<RedirectHook>,
}

/// Process-wide responder defaults. Initialize once at startup;
/// mutation while serving has undefined observational semantics.
static DEFAULTS: LazyLock<ArcSwap<ResponderDefaults>> = LazyLock::new(|| {
    ArcSwap::from_pointee(ResponderDefaults {
        redirect_code: RedirectCode::PermanentRedirect,
        not_found: None,
        redirect_hook: None,
    })
});

pub fn set_permanent_redirect_code(code: RedirectCode) {
    let mut defaults = (**DEFAULTS.load()).clone();
    defaults.redirect_code = code;
    DEFAULTS.store(Arc::new(defaults));
}

pub fn set_not_found_handler(handler: NotFoundHandler) {
    let mut defaults = (**DEFAULTS.load()).clone();
    defaults.not_found = Some(handler);
    DEFAULTS.store(Arc::new(defaults));
}

pub fn set_common_redirect_handler(hook: RedirectHook) {
    let mut defaults = (**DEFAULTS.load()).clone();
    defaults.redirect_hook = Some(hook);
    DEFAULTS.store(Arc::new(defaults));
}

pub(crate) fn not_found_response(ctx: &RequestContext) -> hyper::Response<BoxBody> {
    let defaults = DEFAULTS.load();
    match &defaults.not_found {
        Some(custom) => custom(ctx),
        None => default_not_found(),
    }
}

pub(crate) fn default_not_found() -> hyper::Response<BoxBody> {
    text_response(StatusCode::NOT_FOUND, "Not Found\n")
}

pub(crate) fn redirect_response(ctx: &RequestContext, location: &str) -> hyper::Response<BoxBody> {
    let defaults = DEFAULTS.load();
    let response = hyper::Response::builder()
        .status(defaults.redirect_code.status())
        .header(LOCATION, location)
        .body(empty_body())
        .unwrap();
    match &defaults.redirect_hook {
        Some(hook) => hook(ctx, response),
        None => response,
    }
}

/// Malformed internal state encountered during dispatch.
pub(crate) fn bad_request_response() -> hyper::Response<BoxBody> {
    text_response(StatusCode::BAD_REQUEST, "Bad Request\n")
}

pub(crate) fn method_not_allowed_response(allow: &str) -> hyper::Response<BoxBody> {
    hyper::Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header(ALLOW, allow)
        .body(empty_body())
        .unwrap()
}

pub(crate) fn auto_options_response(allow: &str) -> hyper::Response<BoxBody> {
    hyper::Response::builder()
        .status(StatusCode::OK)
        .header(ALLOW, allow)
        .body(empty_body())
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_not_found_shape() {
        let response = default_not_found();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_method_not_allowed_carries_allow() {
        let response = method_not_allowed_response("GET, OPTIONS");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(ALLOW).unwrap(), "GET, OPTIONS");
    }

    #[test]
    fn test_auto_options_shape() {
        let response = auto_options_response("GET, OPTIONS, POST");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(ALLOW).unwrap(), "GET, OPTIONS, POST");
    }

    #[test]
    fn test_redirect_code_mapping() {
        assert_eq!(
            RedirectCode::PermanentRedirect.status(),
            StatusCode::PERMANENT_REDIRECT
        );
        assert_eq!(
            RedirectCode::MovedPermanently.status(),
            StatusCode::MOVED_PERMANENTLY
        );
    }
}
