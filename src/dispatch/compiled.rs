//! The frozen serving tree.
//!
//! Compiling consumes the build-time tree and produces `Arc`-shared
//! nodes whose request passer and request handler are first-class
//! handler values: the built-ins wrapped by whatever middleware the
//! node accumulated, the last-listed wrap outermost. The compiled tree
//! is immutable; concurrent readers need no lock.

use crate::dispatch::{builtin_request_handler, builtin_request_passer, RequestContext};
use crate::handler::methods::CompiledMethodHandlers;
use crate::handler::{wrap_all, BoxHandler, HandlerFuture};
use crate::resource::{ConfigFlags, Resource};
use crate::template::Template;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) struct CompiledResource {
    pub(crate) template: Template,
    pub(crate) static_children: HashMap<Box<str>, Arc<CompiledResource>>,
    pub(crate) pattern_children: Vec<Arc<CompiledResource>>,
    pub(crate) wildcard_child: Option<Arc<CompiledResource>>,
    pub(crate) request_passer: BoxHandler,
    pub(crate) request_handler: BoxHandler,
    pub(crate) methods: CompiledMethodHandlers,
    config: ConfigFlags,
    pub(crate) shared_data: Option<Arc<dyn Any + Send + Sync>>,
}

pub(crate) fn compile_resource(resource: Resource) -> Arc<CompiledResource> {
    let Resource {
        template,
        static_children,
        pattern_children,
        wildcard_child,
        method_handlers,
        passer_middleware,
        handler_middleware,
        config,
        shared_data,
        ..
    } = resource;

    let static_children = static_children
        .into_iter()
        .map(|(content, child)| (content, compile_resource(child)))
        .collect();
    let pattern_children = pattern_children
        .into_iter()
        .map(compile_resource)
        .collect();
    let wildcard_child = wildcard_child.map(|child| compile_resource(*child));

    let passer: BoxHandler =
        Arc::new(|ctx: RequestContext| Box::pin(builtin_request_passer(ctx)) as HandlerFuture);
    let handler: BoxHandler =
        Arc::new(|ctx: RequestContext| Box::pin(builtin_request_handler(ctx)) as HandlerFuture);

    Arc::new(CompiledResource {
        template,
        static_children,
        pattern_children,
        wildcard_child,
        request_passer: wrap_all(passer, &passer_middleware),
        request_handler: wrap_all(handler, &handler_middleware),
        methods: method_handlers.compile(),
        config,
        shared_data,
    })
}

impl CompiledResource {
    pub(crate) fn can_handle_request(&self) -> bool {
        !self.methods.is_empty()
    }

    pub(crate) fn is_subtree_handler(&self) -> bool {
        self.config.has(ConfigFlags::SUBTREE_HANDLER)
    }

    pub(crate) fn is_secure(&self) -> bool {
        self.config.has(ConfigFlags::SECURE)
    }

    pub(crate) fn redirects_insecure(&self) -> bool {
        self.config.has(ConfigFlags::REDIRECT_INSECURE)
    }

    pub(crate) fn has_trailing_slash(&self) -> bool {
        self.config.has(ConfigFlags::TRAILING_SLASH)
    }

    pub(crate) fn is_strict_on_trailing_slash(&self) -> bool {
        self.config.has(ConfigFlags::STRICT_ON_TRAILING_SLASH)
    }

    pub(crate) fn is_lenient_on_trailing_slash(&self) -> bool {
        self.config.has_any(
            ConfigFlags::LENIENT_ON_TRAILING_SLASH | ConfigFlags::HANDLE_PATH_AS_IS,
        )
    }

    pub(crate) fn is_lenient_on_unclean_path(&self) -> bool {
        self.config.has_any(
            ConfigFlags::LENIENT_ON_UNCLEAN_PATH | ConfigFlags::HANDLE_PATH_AS_IS,
        )
    }
}

/// A compiled host: its template plus the compiled root of its tree.
pub(crate) struct CompiledHost {
    pub(crate) template: Template,
    pub(crate) root: Arc<CompiledResource>,
}

impl CompiledHost {
    pub(crate) fn new(template: Template, root: Resource) -> CompiledHost {
        CompiledHost {
            template,
            root: compile_resource(root),
        }
    }
}
