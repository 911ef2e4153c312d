//! The router — the top-level entry of the multiplexer.
//!
//! A build-time `Router` collects hosts and a root resource through
//! URL-template registration, then compiles into a [`RouterService`]:
//! a cheaply cloneable, frozen routing table served concurrently. Host
//! selection tries the static host map first, then the pattern hosts
//! in registration order, then falls back to the root resource.

use crate::dispatch::compiled::{compile_resource, CompiledHost, CompiledResource};
use crate::dispatch::{handle_or_pass_request, RequestContext};
use crate::error::RouterError;
use crate::handler::{wrap_all, BoxHandler, Handled, HandlerFuture, Middleware};
use crate::host::{parse_host_template, Host};
use crate::resource::{apply_trailing_slash, keep_resource_or_its_children, Resource};
use crate::response::{not_found_response, BoxBody};
use crate::routing::url::{split_url_template, SchemeKind};
use crate::template::{Similarity, Template};
use http_body_util::BodyExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
pub struct Router {
    static_hosts: HashMap<Box<str>, Host>,
    pattern_hosts: Vec<Host>,
    root: Option<Box<Resource>>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Router {
        Router::default()
    }

    /// Adds a host. A host with a `Same` template merges its root tree
    /// into the existing one.
    pub fn add_host(&mut self, host: Host) -> Result<(), RouterError> {
        let (template, root) = host.into_parts();

        if let Some(existing) = self.existing_host_mut(&template)? {
            return existing.merge_or_replace_root(root);
        }

        debug!(host = %template, "routing: registered host");
        let host = Host::with_template(template, root)?;
        self.insert_host(host);
        Ok(())
    }

    /// Adds a resource. A resource carrying a host template lands
    /// under that host (created if missing); a root resource merges
    /// with the router's root; anything else goes below the root,
    /// which is created on demand.
    pub fn add_resource(&mut self, mut resource: Resource) -> Result<(), RouterError> {
        if let Some(host_template) = resource.take_host_template() {
            if let Some(host) = self.existing_host_mut(&host_template)? {
                if resource.is_root() {
                    return host.merge_or_replace_root(resource);
                }
                return host.root_mut().add_subresource(resource);
            }

            let root = if resource.is_root() {
                resource
            } else {
                let mut root = Resource::new("/")?;
                root.add_subresource(resource)?;
                root
            };
            debug!(host = %host_template, "routing: registered host");
            let host = Host::with_template(host_template, root)?;
            self.insert_host(host);
            return Ok(());
        }

        if resource.is_root() {
            return match self.root.take() {
                Some(existing) => {
                    let merged = keep_resource_or_its_children(*existing, resource)?;
                    self.root = Some(Box::new(merged));
                    Ok(())
                }
                None => {
                    self.root = Some(Box::new(resource));
                    Ok(())
                }
            };
        }

        self.root_resource_mut().add_subresource(resource)
    }

    /// Finds or creates the resource named by `url_template` — a
    /// path (`/a/b`), an absolute form (`https://example.com/a/b`),
    /// or the scheme-only form (`https:///a/b`). The scheme decides
    /// the `secure` flag, a trailing slash the trailing-slash flag;
    /// either contradicting the resource's existing configuration is
    /// an error.
    pub fn resource_mut(&mut self, url_template: &str) -> Result<&mut Resource, RouterError> {
        if url_template.is_empty() {
            return Err(RouterError::NilArgument);
        }

        let parts = split_url_template(url_template);
        let implied_secure = parts.scheme.map(|s| s == SchemeKind::Https);
        let path = parts.path;

        let parent = match parts.host {
            Some("") => return Err(RouterError::EmptyHostTemplate),
            Some(host) => {
                let (template, _) = parse_host_template(host)?;
                self.host_root_mut(template)?
            }
            None => {
                if path.is_empty() {
                    return Err(RouterError::EmptyPathTemplate);
                }
                self.root_resource_mut()
            }
        };

        if path.is_empty() || path == "/" {
            apply_implied_security(parent, implied_secure)?;
            return Ok(parent);
        }

        let (leaf, trailing_slash) = parent.subresource_for_url(path)?;
        apply_implied_security(leaf, implied_secure)?;
        apply_trailing_slash(leaf, trailing_slash)?;
        Ok(leaf)
    }

    /// Looks up an already registered resource; nothing is created and
    /// no configuration is applied. `$name` segments without a pattern
    /// stand for the unique child with that external name; a trailing
    /// slash is not a lookup key.
    pub fn registered_resource(&mut self, url_template: &str) -> Result<&mut Resource, RouterError> {
        if url_template.is_empty() {
            return Err(RouterError::NilArgument);
        }

        let parts = split_url_template(url_template);
        let path = parts.path;

        let parent = match parts.host {
            Some("") => return Err(RouterError::EmptyHostTemplate),
            Some(host) => {
                let (template, _) = parse_host_template(host)?;
                match self.existing_host_mut(&template)? {
                    Some(existing) => existing.root_mut(),
                    None => return Err(RouterError::NonExistentHost(template.content())),
                }
            }
            None => match self.root.as_deref_mut() {
                Some(root) => root,
                None => {
                    return Err(RouterError::NonExistentResource(url_template.to_string()));
                }
            },
        };

        if path.is_empty() || path == "/" {
            return Ok(parent);
        }
        parent.registered_subresource_mut(path)
    }

    /// Wraps the router's entry with middleware; the last-listed
    /// middleware becomes the outermost caller.
    pub fn wrap_with(&mut self, middleware: Vec<Arc<dyn Middleware>>) -> Result<(), RouterError> {
        if middleware.is_empty() {
            return Err(RouterError::NoMiddleware);
        }
        self.middleware.extend(middleware);
        Ok(())
    }

    /// Freezes the tree into a serveable [`RouterService`]. Every host
    /// and the root resource must have at least one handler somewhere
    /// in their subtree.
    pub fn compile(self) -> Result<RouterService, RouterError> {
        let Router {
            static_hosts,
            pattern_hosts,
            root,
            middleware,
        } = self;

        for host in static_hosts.values().chain(pattern_hosts.iter()) {
            if !host.has_handler_in_subtree() {
                return Err(RouterError::DormantHost(host.template().content()));
            }
        }
        if let Some(root) = &root {
            if !root.has_handler_in_subtree() {
                return Err(RouterError::DormantResource("/".to_string()));
            }
        }

        let static_hosts: HashMap<Box<str>, CompiledHost> = static_hosts
            .into_iter()
            .map(|(key, host)| {
                let (template, root) = host.into_parts();
                (key, CompiledHost::new(template, root))
            })
            .collect();
        let pattern_hosts: Vec<CompiledHost> = pattern_hosts
            .into_iter()
            .map(|host| {
                let (template, root) = host.into_parts();
                CompiledHost::new(template, root)
            })
            .collect();
        let root: Option<Arc<CompiledResource>> = root.map(|r| compile_resource(*r));

        let route_count = static_hosts.len() + pattern_hosts.len() + usize::from(root.is_some());
        let inner = Arc::new(RouterInner {
            static_hosts,
            pattern_hosts,
            root,
        });

        let entry: BoxHandler = Arc::new(move |ctx: RequestContext| {
            let inner = inner.clone();
            Box::pin(router_entry(inner, ctx)) as HandlerFuture
        });
        let entry = wrap_all(entry, &middleware);

        tracing::info!(trees = route_count, "routing: compiled router");
        Ok(RouterService { entry })
    }

    fn insert_host(&mut self, host: Host) {
        match host.template().static_content() {
            Some(content) => {
                self.static_hosts
                    .insert(content.to_ascii_lowercase().into_boxed_str(), host);
            }
            None => self.pattern_hosts.push(host),
        }
    }

    fn existing_host_mut(
        &mut self,
        template: &Template,
    ) -> Result<Option<&mut Host>, RouterError> {
        if let Some(content) = template.static_content() {
            let key = content.to_ascii_lowercase();
            let Some(existing) = self.static_hosts.get(key.as_str()) else {
                return Ok(None);
            };
            match existing.template().compare(template) {
                Similarity::Same => {}
                Similarity::DifferentNames if template.name().is_none() => {}
                _ => return Err(RouterError::ConflictingHost(template.content())),
            }
            return Ok(self.static_hosts.get_mut(key.as_str()));
        }

        let mut found = None;
        for (i, existing) in self.pattern_hosts.iter().enumerate() {
            match existing.template().compare(template) {
                Similarity::Same => {
                    found = Some(i);
                    break;
                }
                Similarity::Different => {}
                _ => return Err(RouterError::ConflictingHost(template.content())),
            }
        }
        match found {
            Some(i) => Ok(Some(&mut self.pattern_hosts[i])),
            None => Ok(None),
        }
    }

    fn host_root_mut(&mut self, template: Template) -> Result<&mut Resource, RouterError> {
        if self.existing_host_mut(&template)?.is_none() {
            debug!(host = %template, "routing: registered host");
            let host = Host::with_template(template.clone(), Resource::new("/")?)?;
            self.insert_host(host);
        }
        match self.existing_host_mut(&template)? {
            Some(host) => Ok(host.root_mut()),
            None => Err(RouterError::NonExistentHost(template.content())),
        }
    }

    fn root_resource_mut(&mut self) -> &mut Resource {
        if self.root.is_none() {
            self.root = Some(Box::new(Resource::with_template(Template::root())));
        }
        self.root.as_deref_mut().unwrap()
    }
}

fn apply_implied_security(
    resource: &mut Resource,
    implied: Option<bool>,
) -> Result<(), RouterError> {
    match implied {
        Some(true) => {
            if resource.config.is_active() && !resource.is_secure() {
                return Err(RouterError::ConflictingSecurity(
                    resource.template().content(),
                ));
            }
            resource.set_secure();
            Ok(())
        }
        Some(false) => {
            if resource.is_secure() {
                return Err(RouterError::ConflictingSecurity(
                    resource.template().content(),
                ));
            }
            Ok(())
        }
        None => Ok(()),
    }
}

pub(crate) struct RouterInner {
    static_hosts: HashMap<Box<str>, CompiledHost>,
    pattern_hosts: Vec<CompiledHost>,
    root: Option<Arc<CompiledResource>>,
}

/// The compiled, frozen router. Cloning is cheap; clones share the
/// same tree.
#[derive(Clone)]
pub struct RouterService {
    entry: BoxHandler,
}

impl RouterService {
    /// Routes one request to completion and returns the response.
    pub async fn dispatch(&self, request: hyper::Request<BoxBody>) -> hyper::Response<BoxBody> {
        let ctx = RequestContext::new(request);
        let (ctx, _handled) = (self.entry)(ctx).await;
        ctx.finish()
    }
}

impl hyper::service::Service<hyper::Request<hyper::body::Incoming>> for RouterService {
    type Response = hyper::Response<BoxBody>;
    type Error = std::convert::Infallible;
    type Future = futures_util::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, request: hyper::Request<hyper::body::Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move {
            let request = request.map(|body| body.boxed());
            Ok(service.dispatch(request).await)
        })
    }
}

/// Router-level host selection: static map, then pattern hosts in
/// registration order, then the root resource when the request names
/// a path.
async fn router_entry(inner: Arc<RouterInner>, mut ctx: RequestContext) -> (RequestContext, Handled) {
    let host = ctx.request_host();

    if !host.is_empty() {
        if let Some(compiled) = inner.static_hosts.get(host.as_str()) {
            ctx.current = Some(compiled.root.clone());
            return dispatch_from_root(ctx).await;
        }
        for compiled in &inner.pattern_hosts {
            if compiled.template.matches(&host, &mut ctx.host_params) {
                ctx.current = Some(compiled.root.clone());
                return dispatch_from_root(ctx).await;
            }
        }
    }

    if let Some(root) = &inner.root {
        if !ctx.request().uri().path().is_empty() {
            ctx.current = Some(root.clone());
            return dispatch_from_root(ctx).await;
        }
    }

    debug!(host = %host, "routing: no host matched");
    let response = not_found_response(&ctx);
    ctx.set_response(response);
    (ctx, true)
}

/// Enters a tree at its root and turns an unconsumed `false` into a
/// terminal not-found.
async fn dispatch_from_root(ctx: RequestContext) -> (RequestContext, Handled) {
    let (mut ctx, handled) = handle_or_pass_request(ctx).await;
    if !handled {
        let response = not_found_response(&ctx);
        ctx.set_response(response);
    }
    (ctx, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;

    fn noop() -> BoxHandler {
        handler_fn(|ctx| async move { (ctx, true) })
    }

    fn capable_root() -> Resource {
        let mut root = Resource::new("/").unwrap();
        root.set_handler_for("GET", noop()).unwrap();
        root
    }

    #[test]
    fn test_add_host_and_lookup() {
        let mut router = Router::new();
        router
            .add_host(Host::new("example.com", capable_root()).unwrap())
            .unwrap();
        router
            .add_host(Host::new("{sub:[a-z]+}.example.com", capable_root()).unwrap())
            .unwrap();

        assert!(router.registered_resource("http://example.com").is_ok());
        assert!(router
            .registered_resource("http://{sub:[a-z]+}.example.com")
            .is_ok());
        assert_eq!(
            router.registered_resource("http://missing.net").err(),
            Some(RouterError::NonExistentHost("missing.net".to_string()))
        );
    }

    #[test]
    fn test_add_host_merges_same_template() {
        let mut router = Router::new();
        router
            .add_host(Host::new("example.com", capable_root()).unwrap())
            .unwrap();

        // Dormant duplicate root merges into the existing host.
        let mut dormant = Resource::new("/").unwrap();
        dormant.subresource_mut("/a").unwrap();
        router
            .add_host(Host::new("example.com", dormant).unwrap())
            .unwrap();
        assert!(router.registered_resource("http://example.com/a").is_ok());

        // A second capable root is a duplicate host.
        assert_eq!(
            router
                .add_host(Host::new("example.com", capable_root()).unwrap())
                .err(),
            Some(RouterError::DuplicateHostTemplate("example.com".to_string()))
        );
    }

    #[test]
    fn test_add_resource_creates_its_host() {
        let mut router = Router::new();
        let mut hosted = Resource::new("http://example.com/api/v1").unwrap();
        hosted.set_handler_for("GET", noop()).unwrap();
        router.add_resource(hosted).unwrap();

        assert!(router
            .registered_resource("http://example.com/api/v1")
            .is_ok());
    }

    #[test]
    fn test_resource_mut_security_conflicts() {
        let mut router = Router::new();
        router.resource_mut("https:///secret").unwrap();
        assert_eq!(
            router.resource_mut("http:///secret").err(),
            Some(RouterError::ConflictingSecurity("secret".to_string()))
        );

        // An insecure resource with recorded configuration cannot be
        // re-registered as secure.
        router.resource_mut("/open").unwrap().set_subtree_handler();
        assert_eq!(
            router.resource_mut("https:///open").err(),
            Some(RouterError::ConflictingSecurity("open".to_string()))
        );
    }

    #[test]
    fn test_resource_mut_trailing_slash_conflict() {
        let mut router = Router::new();
        router.resource_mut("/a/").unwrap();
        assert_eq!(
            router.resource_mut("/a").err(),
            Some(RouterError::ConflictingTrailingSlash("a".to_string()))
        );
    }

    #[test]
    fn test_registered_resource_shorthand() {
        let mut router = Router::new();
        router
            .resource_mut("/users/$id:{id:\\d+}/posts")
            .unwrap()
            .set_handler_for("GET", noop())
            .unwrap();

        assert!(router.registered_resource("/users/$id/posts").is_ok());
        assert!(matches!(
            router.registered_resource("/users/$other/posts"),
            Err(RouterError::NonExistentResource(_))
        ));
    }

    #[test]
    fn test_empty_arguments() {
        let mut router = Router::new();
        assert_eq!(router.resource_mut("").err(), Some(RouterError::NilArgument));
        assert_eq!(
            router.registered_resource("").err(),
            Some(RouterError::NilArgument)
        );
        assert_eq!(router.wrap_with(Vec::new()).err(), Some(RouterError::NoMiddleware));
    }

    #[test]
    fn test_conflicting_host_names() {
        let mut router = Router::new();
        router
            .add_host(Host::new("$main:example.com", capable_root()).unwrap())
            .unwrap();
        assert_eq!(
            router
                .add_host(Host::new("$alias:example.com", capable_root()).unwrap())
                .err(),
            Some(RouterError::ConflictingHost("$alias:example.com".to_string()))
        );
    }
}
