//! The per-request dispatch state machine.
//!
//! A request enters on some compiled root and walks the tree one
//! segment at a time: each node either passes the request deeper
//! through its request passer, handles it through its request handler,
//! synthesizes a redirect, or ends in not-found. The per-request
//! routing state is recycled through a bounded free pool.

pub(crate) mod compiled;

use crate::handler::{Handled, HandlerFuture};
use crate::response::{
    auto_options_response, bad_request_response, method_not_allowed_response, not_found_response,
    redirect_response, BoxBody,
};
use crate::routing::segments;
use crate::template::UriParams;
use compiled::CompiledResource;
use std::any::Any;
use std::sync::{Arc, Mutex};
use tracing::debug;

const STATE_POOL_LIMIT: usize = 64;

/// Recycled per-request routing state. Requests are served
/// concurrently; every request takes its own state from the pool and
/// returns it on exit.
static STATE_POOL: Mutex<Vec<RoutingState>> = Mutex::new(Vec::new());

#[derive(Debug, Default)]
pub(crate) struct RoutingState {
    /// The canonicalized request path.
    pub(crate) path: String,
    /// Byte cursor: everything before it has been consumed.
    pub(crate) offset: usize,
    /// The original path differed from the canonical form.
    pub(crate) unclean: bool,
    /// A subtree-handler ancestor was passed on the way down, so a
    /// failed descent falls back to it instead of not-found.
    pub(crate) subtree_exists: bool,
}

impl RoutingState {
    pub(crate) fn acquire(raw_path: &str) -> RoutingState {
        let mut state = STATE_POOL
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
            .unwrap_or_default();
        state.unclean = segments::clean_path_into(raw_path, &mut state.path);
        state.offset = 0;
        state.subtree_exists = false;
        state
    }

    pub(crate) fn release(state: RoutingState) {
        let mut pool = STATE_POOL
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if pool.len() < STATE_POOL_LIMIT {
            pool.push(state);
        }
    }

    pub(crate) fn has_remaining(&self) -> bool {
        segments::has_remaining_segments(&self.path, self.offset)
    }

    /// Consumes and returns the next segment, `%2F`-decoded.
    pub(crate) fn next_segment(&mut self) -> Option<String> {
        let (start, end) = segments::next_segment_range(&self.path, self.offset)?;
        self.offset = end;
        Some(segments::decode_segment(&self.path[start..end]).into_owned())
    }

    pub(crate) fn mark(&self) -> usize {
        self.offset
    }

    pub(crate) fn revert(&mut self, mark: usize) {
        self.offset = mark;
    }

    pub(crate) fn remaining_path(&self) -> &str {
        segments::remaining_path(&self.path, self.offset)
    }

    pub(crate) fn has_trailing_slash(&self) -> bool {
        segments::has_trailing_slash(&self.path)
    }
}

/// The context a request carries through dispatch and into handlers.
pub struct RequestContext {
    request: hyper::Request<BoxBody>,
    response: Option<hyper::Response<BoxBody>>,
    pub(crate) routing: RoutingState,
    pub(crate) current: Option<Arc<CompiledResource>>,
    pub(crate) host_params: UriParams,
    pub(crate) path_params: UriParams,
    pub(crate) shared_data: Option<Arc<dyn Any + Send + Sync>>,
    pub(crate) matched_template: Option<String>,
    pub(crate) allowed_methods: Option<Arc<str>>,
}

impl RequestContext {
    pub(crate) fn new(request: hyper::Request<BoxBody>) -> RequestContext {
        let routing = RoutingState::acquire(request.uri().path());
        RequestContext {
            request,
            response: None,
            routing,
            current: None,
            host_params: UriParams::new(),
            path_params: UriParams::new(),
            shared_data: None,
            matched_template: None,
            allowed_methods: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(request: hyper::Request<BoxBody>) -> RequestContext {
        RequestContext::new(request)
    }

    pub fn request(&self) -> &hyper::Request<BoxBody> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut hyper::Request<BoxBody> {
        &mut self.request
    }

    /// Records the response to send. A handler that sets a response
    /// returns `(ctx, true)`.
    pub fn set_response(&mut self, response: hyper::Response<BoxBody>) {
        self.response = Some(response);
    }

    pub fn take_response(&mut self) -> Option<hyper::Response<BoxBody>> {
        self.response.take()
    }

    pub(crate) fn into_response(mut self) -> Option<hyper::Response<BoxBody>> {
        let response = self.response.take();
        let routing = std::mem::take(&mut self.routing);
        RoutingState::release(routing);
        response
    }

    /// Ends dispatch: releases the pooled state and returns the
    /// response. A dispatch that produced none is malformed internal
    /// state and answers `400`.
    pub(crate) fn finish(self) -> hyper::Response<BoxBody> {
        self.into_response().unwrap_or_else(bad_request_response)
    }

    /// Values captured from the matched host template.
    pub fn host_params(&self) -> &UriParams {
        &self.host_params
    }

    /// Values captured from matched path segment templates.
    pub fn path_params(&self) -> &UriParams {
        &self.path_params
    }

    /// The path below the handling resource. Non-empty only for a
    /// subtree handler that took a request for a descendant path.
    pub fn remaining_path(&self) -> &str {
        self.routing.remaining_path()
    }

    /// The template of the resource that handled the request.
    pub fn matched_template(&self) -> Option<&str> {
        self.matched_template.as_deref()
    }

    /// The handling resource's `Allow` value, sorted and including
    /// `OPTIONS`. Set before the request handler runs, so a custom
    /// not-allowed handler can read it.
    pub fn allowed_methods(&self) -> Option<&str> {
        self.allowed_methods.as_deref()
    }

    /// The handling resource's shared data, downcast to `D`.
    pub fn shared_data<D: Any + Send + Sync>(&self) -> Option<Arc<D>> {
        self.shared_data.clone()?.downcast::<D>().ok()
    }

    pub(crate) fn is_secure_request(&self) -> bool {
        self.request.uri().scheme_str() == Some("https")
    }

    fn request_scheme(&self) -> &str {
        self.request.uri().scheme_str().unwrap_or("http")
    }

    fn request_authority(&self) -> &str {
        if let Some(authority) = self.request.uri().authority() {
            return authority.as_str();
        }
        self.request
            .headers()
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// The request host, authority port and case stripped.
    pub(crate) fn request_host(&self) -> String {
        let authority = self.request_authority();
        let host = match authority.rsplit_once(':') {
            // Only a numeric tail is a port; an IPv6 literal's colons
            // stay part of the host.
            Some((h, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => h,
            _ => authority,
        };
        host.to_ascii_lowercase()
    }
}

/// The per-node step: pass deeper while segments remain, then check
/// the node's capability and policies, then redirect or handle.
pub(crate) fn handle_or_pass_request(mut ctx: RequestContext) -> HandlerFuture {
    Box::pin(async move {
        let Some(node) = ctx.current.clone() else {
            let response = bad_request_response();
            ctx.set_response(response);
            return (ctx, true);
        };

        if ctx.routing.has_remaining() {
            if node.is_subtree_handler() {
                ctx.routing.subtree_exists = true;
            }
            let passer = node.request_passer.clone();
            let (mut passed, handled) = passer(ctx).await;
            if handled {
                return (passed, true);
            }
            // The passer may have moved the current node; restore it.
            // A false return keeps propagating until it reaches the
            // nearest subtree-handler ancestor, which handles below.
            passed.current = Some(node.clone());
            if !node.is_subtree_handler() {
                return (passed, false);
            }
            ctx = passed;
        }

        if !node.can_handle_request() {
            let response = not_found_response(&ctx);
            ctx.set_response(response);
            return (ctx, true);
        }

        match policy_outcome(&node, &ctx) {
            Policy::Handle => {
                ctx.shared_data = node.shared_data.clone();
                ctx.matched_template = Some(node.template.content());
                ctx.allowed_methods = Some(node.methods.allow().clone());
                let handler = node.request_handler.clone();
                handler(ctx).await
            }
            Policy::NotFound => {
                let response = not_found_response(&ctx);
                ctx.set_response(response);
                (ctx, true)
            }
            Policy::Redirect(location) => {
                debug!(
                    path = %ctx.routing.path,
                    location = %location,
                    "routing: synthesized redirect"
                );
                let response = redirect_response(&ctx, &location);
                ctx.set_response(response);
                (ctx, true)
            }
        }
    })
}

enum Policy {
    Handle,
    NotFound,
    Redirect(String),
}

/// Policy order: scheme, then path cleanliness, then trailing slash.
/// All edits merge into a single redirect URL.
fn policy_outcome(node: &CompiledResource, ctx: &RequestContext) -> Policy {
    let mut upgrade_scheme = false;
    if node.is_secure() && !ctx.is_secure_request() {
        if !node.redirects_insecure() {
            return Policy::NotFound;
        }
        upgrade_scheme = true;
    }

    let mut redirect_path: Option<String> = None;
    if ctx.routing.unclean && !node.is_lenient_on_unclean_path() {
        redirect_path = Some(ctx.routing.path.clone());
    }

    if !node.is_lenient_on_trailing_slash() && ctx.routing.path != "/" {
        // A subtree handler reached by fallthrough still has segments
        // left; the length guard skips paths too short to re-slash.
        let fallthrough = ctx.routing.has_remaining();
        let applies = !fallthrough || ctx.routing.path.len() > 2;
        let path_has_slash = ctx.routing.has_trailing_slash();
        if applies && path_has_slash != node.has_trailing_slash() {
            if node.is_strict_on_trailing_slash() {
                return Policy::NotFound;
            }
            let mut target = redirect_path
                .take()
                .unwrap_or_else(|| ctx.routing.path.clone());
            if node.has_trailing_slash() {
                target.push('/');
            } else {
                target.pop();
            }
            redirect_path = Some(target);
        }
    }

    if upgrade_scheme || redirect_path.is_some() {
        let path = redirect_path.as_deref().unwrap_or(ctx.routing.path.as_str());
        let scheme = if upgrade_scheme {
            "https"
        } else {
            ctx.request_scheme()
        };
        Policy::Redirect(format!("{}://{}{}", scheme, ctx.request_authority(), path))
    } else {
        Policy::Handle
    }
}

/// The default request passer: consumes the next segment and matches
/// it against the static bucket, then the pattern children in
/// insertion order, then the wildcard. A failed descent restores the
/// cursor and any captures; `false` is returned only under a
/// subtree-handler ancestor.
pub(crate) async fn builtin_request_passer(mut ctx: RequestContext) -> (RequestContext, Handled) {
    let Some(node) = ctx.current.clone() else {
        let response = bad_request_response();
        ctx.set_response(response);
        return (ctx, true);
    };

    let mark = ctx.routing.mark();
    let params_mark = ctx.path_params.len();
    let Some(segment) = ctx.routing.next_segment() else {
        let response = bad_request_response();
        ctx.set_response(response);
        return (ctx, true);
    };

    let mut matched: Option<Arc<CompiledResource>> = None;
    if let Some(child) = node.static_children.get(segment.as_str()) {
        matched = Some(child.clone());
    }
    if matched.is_none() {
        for child in &node.pattern_children {
            if child.template.matches(&segment, &mut ctx.path_params) {
                matched = Some(child.clone());
                break;
            }
        }
    }
    if matched.is_none() {
        if let Some(child) = &node.wildcard_child {
            if child.template.matches(&segment, &mut ctx.path_params) {
                matched = Some(child.clone());
            }
        }
    }

    match matched {
        Some(child) => {
            ctx.current = Some(child);
            let (mut ctx, handled) = handle_or_pass_request(ctx).await;
            if handled {
                return (ctx, true);
            }
            ctx.routing.revert(mark);
            ctx.path_params.truncate(params_mark);
            (ctx, false)
        }
        None if ctx.routing.subtree_exists => {
            ctx.routing.revert(mark);
            (ctx, false)
        }
        None => {
            debug!(
                path = %ctx.routing.path,
                segment = %segment,
                "routing: no child matched"
            );
            let response = not_found_response(&ctx);
            ctx.set_response(response);
            (ctx, true)
        }
    }
}

/// The default request handler: dispatches to the method's handler,
/// falls back to auto-`OPTIONS`, then to the not-allowed handler with
/// `Allow` prepared, then to not-found when the node has no handlers
/// at all.
pub(crate) async fn builtin_request_handler(mut ctx: RequestContext) -> (RequestContext, Handled) {
    let Some(node) = ctx.current.clone() else {
        let response = bad_request_response();
        ctx.set_response(response);
        return (ctx, true);
    };

    let method = ctx.request.method().as_str().to_uppercase();
    if let Some(handler) = node.methods.get(&method) {
        let handler = handler.clone();
        return handler(ctx).await;
    }

    if node.methods.is_empty() {
        let response = not_found_response(&ctx);
        ctx.set_response(response);
        return (ctx, true);
    }

    if method == "OPTIONS" {
        let response = auto_options_response(node.methods.allow());
        ctx.set_response(response);
        return (ctx, true);
    }

    match node.methods.not_allowed() {
        Some(handler) => {
            let handler = handler.clone();
            handler(ctx).await
        }
        None => {
            let response = method_not_allowed_response(node.methods.allow());
            ctx.set_response(response);
            (ctx, true)
        }
    }
}
