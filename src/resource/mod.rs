//! Resource nodes — the building blocks of the routing tree.
//!
//! A `Resource` matches one path segment through its template and owns
//! its children in three buckets: a literal-keyed static map, an
//! insertion-ordered pattern list, and at most one wildcard. Nodes are
//! registered by template or by URL template; colliding registrations
//! merge, with the handler-capable side winning. The build-time tree is
//! mutable; serving happens on the compiled tree.

mod config;

pub(crate) use config::ConfigFlags;

use crate::error::{RouterError, TemplateError};
use crate::handler::methods::{self, MethodHandlers};
use crate::handler::{BoxHandler, Middleware};
use crate::routing::segments::RouteSegments;
use crate::routing::url::{split_url_template, SchemeKind};
use crate::template::{Similarity, Template, TemplateKind};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

pub struct Resource {
    pub(crate) template: Template,
    pub(crate) host_template: Option<Template>,
    /// Templates of the registration path above this node, root
    /// excluded. Stands in for a parent back-link: ancestor walks read
    /// it and it can never form an ownership cycle.
    pub(crate) prefix_templates: Vec<Template>,

    pub(crate) static_children: HashMap<Box<str>, Resource>,
    pub(crate) pattern_children: Vec<Resource>,
    pub(crate) wildcard_child: Option<Box<Resource>>,

    pub(crate) method_handlers: MethodHandlers,
    pub(crate) passer_middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) handler_middleware: Vec<Arc<dyn Middleware>>,

    pub(crate) config: ConfigFlags,
    pub(crate) shared_data: Option<Arc<dyn Any + Send + Sync>>,
}

impl Resource {
    /// Creates a resource from a URL template: a path (`/a/{id:\d+}`),
    /// or an absolute form with a host (`https://example.com/a`), or
    /// the scheme-only form (`https:///a`). `https` marks the resource
    /// secure; a trailing slash sets its trailing-slash flag. Prefix
    /// segments are remembered and validated when the resource is
    /// attached to a parent.
    pub fn new(url_template: &str) -> Result<Resource, RouterError> {
        if url_template.is_empty() {
            return Err(RouterError::NilArgument);
        }

        let parts = split_url_template(url_template);

        let host_template = match parts.host {
            Some("") => return Err(RouterError::EmptyHostTemplate),
            Some(host) => {
                let template = Template::parse(host)?;
                if template.is_wildcard() {
                    return Err(RouterError::WildcardHostTemplate);
                }
                Some(template)
            }
            None => None,
        };

        let secure = parts.scheme == Some(SchemeKind::Https);
        let path = parts.path;

        if path.is_empty() || path == "/" {
            if path.is_empty() && host_template.is_none() {
                return Err(RouterError::EmptyPathTemplate);
            }
            let mut root = Resource::with_template(Template::root());
            root.host_template = host_template;
            if secure {
                root.config.set(ConfigFlags::SECURE);
            }
            return Ok(root);
        }

        if !path.starts_with('/') {
            return Err(RouterError::Template(TemplateError::InvalidTemplate(
                "path template must start with '/'".to_string(),
            )));
        }

        let segments = RouteSegments::new(path);
        let trailing_slash = segments.has_trailing_slash();
        let mut templates = Vec::new();
        for segment in segments {
            templates.push(Template::parse(segment?)?);
        }
        let Some(leaf_template) = templates.pop() else {
            return Err(RouterError::EmptyPathSegmentTemplate);
        };
        check_chain_names(&templates, &leaf_template)?;

        let mut leaf = Resource::with_template(leaf_template);
        leaf.prefix_templates = templates;
        leaf.host_template = host_template;
        if secure {
            leaf.config.set(ConfigFlags::SECURE);
        }
        if trailing_slash {
            leaf.config.set(ConfigFlags::TRAILING_SLASH);
        }
        Ok(leaf)
    }

    pub(crate) fn with_template(template: Template) -> Resource {
        Resource {
            template,
            host_template: None,
            prefix_templates: Vec::new(),
            static_children: HashMap::new(),
            pattern_children: Vec::new(),
            wildcard_child: None,
            method_handlers: MethodHandlers::new(),
            passer_middleware: Vec::new(),
            handler_middleware: Vec::new(),
            config: ConfigFlags::default(),
            shared_data: None,
        }
    }

    // -----------------------------------------------------------------
    // Identity

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Whether `template` is this resource's template.
    pub fn is(&self, template: &str) -> bool {
        match Template::parse(template) {
            Ok(t) => self.template.compare(&t) == Similarity::Same,
            Err(_) => false,
        }
    }

    pub(crate) fn is_root(&self) -> bool {
        self.template.is_root()
    }

    /// The host template a URL-template-built resource belongs to.
    pub fn host_template(&self) -> Option<&Template> {
        self.host_template.as_ref()
    }

    pub(crate) fn take_host_template(&mut self) -> Option<Template> {
        self.host_template.take()
    }

    fn path_templates(&self) -> impl Iterator<Item = &Template> {
        self.prefix_templates
            .iter()
            .chain(std::iter::once(&self.template))
    }

    fn child_prefix(&self) -> Vec<Template> {
        self.path_templates()
            .filter(|t| !t.is_root())
            .cloned()
            .collect()
    }

    pub(crate) fn children_iter(&self) -> impl Iterator<Item = &Resource> {
        self.static_children
            .values()
            .chain(self.pattern_children.iter())
            .chain(self.wildcard_child.as_deref())
    }

    // -----------------------------------------------------------------
    // Handlers

    /// Registers `handler` for each token in `methods` (comma and/or
    /// space separated, upper-cased). The single token `"!"` selects
    /// the not-allowed slot.
    pub fn set_handler_for(&mut self, methods: &str, handler: BoxHandler) -> Result<(), RouterError> {
        self.method_handlers.set_for(methods, handler)
    }

    /// The handler registered for `method`, the not-allowed handler
    /// for `"!"`, or the synthesized `OPTIONS` handler when methods
    /// exist but no explicit `OPTIONS` entry does.
    pub fn handler_of(&self, method: &str) -> Option<BoxHandler> {
        if method == methods::NOT_ALLOWED_TOKEN {
            return self.method_handlers.not_allowed().cloned();
        }
        let method = method.to_uppercase();
        if let Some(handler) = self.method_handlers.get(&method) {
            return Some(handler.clone());
        }
        if method == "OPTIONS" && !self.method_handlers.is_empty() {
            let allow: Arc<str> = Arc::from(self.method_handlers.allow_header().as_str());
            return Some(methods::auto_options_handler(allow));
        }
        None
    }

    /// The methods a request may use on this resource, sorted and
    /// including `OPTIONS`.
    pub fn allowed_methods(&self) -> Vec<String> {
        self.method_handlers.allowed_methods()
    }

    /// A resource with at least one method handler. Nodes without one
    /// are dormant: they exist only as a prefix.
    pub fn can_handle_request(&self) -> bool {
        !self.method_handlers.is_empty()
    }

    /// Dormancy for merge purposes: method handlers, a not-allowed
    /// handler, or applied middleware all count as an effect worth
    /// keeping.
    pub(crate) fn has_handling_effect(&self) -> bool {
        !self.method_handlers.is_empty()
            || self.method_handlers.has_not_allowed()
            || !self.passer_middleware.is_empty()
            || !self.handler_middleware.is_empty()
    }

    pub(crate) fn has_handler_in_subtree(&self) -> bool {
        self.can_handle_request() || self.children_iter().any(|c| c.has_handler_in_subtree())
    }

    // -----------------------------------------------------------------
    // Middleware

    /// Wraps the request passer. Applied at compile time; the
    /// last-listed middleware becomes the outermost caller.
    pub fn wrap_request_passer(
        &mut self,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Result<(), RouterError> {
        if middleware.is_empty() {
            return Err(RouterError::NoMiddleware);
        }
        self.passer_middleware.extend(middleware);
        Ok(())
    }

    /// Wraps the request handler. Applied at compile time; the
    /// last-listed middleware becomes the outermost caller.
    pub fn wrap_request_handler(
        &mut self,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Result<(), RouterError> {
        if middleware.is_empty() {
            return Err(RouterError::NoMiddleware);
        }
        self.handler_middleware.extend(middleware);
        Ok(())
    }

    /// Wraps the method handlers selected by `methods`. `"*"` selects
    /// all currently registered methods, `"!"` the not-allowed slot.
    pub fn wrap_handler_of(
        &mut self,
        methods: &str,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Result<(), RouterError> {
        self.method_handlers.wrap(methods, &middleware)
    }

    // -----------------------------------------------------------------
    // Shared data

    pub fn set_shared_data<D: Any + Send + Sync>(&mut self, data: D) {
        self.shared_data = Some(Arc::new(data));
    }

    pub fn shared_data<D: Any + Send + Sync>(&self) -> Option<Arc<D>> {
        self.shared_data.clone()?.downcast::<D>().ok()
    }

    // -----------------------------------------------------------------
    // Configuration

    pub fn set_subtree_handler(&mut self) {
        self.config.set(ConfigFlags::SUBTREE_HANDLER);
    }

    pub fn is_subtree_handler(&self) -> bool {
        self.config.has(ConfigFlags::SUBTREE_HANDLER)
    }

    pub fn set_secure(&mut self) {
        self.config.set(ConfigFlags::SECURE);
    }

    pub fn is_secure(&self) -> bool {
        self.config.has(ConfigFlags::SECURE)
    }

    /// Redirect insecure requests to the HTTPS URL instead of hiding
    /// the resource. Implies `secure`.
    pub fn set_redirect_insecure(&mut self) {
        self.config
            .set(ConfigFlags::REDIRECT_INSECURE | ConfigFlags::SECURE);
    }

    pub fn redirects_insecure(&self) -> bool {
        self.config.has(ConfigFlags::REDIRECT_INSECURE)
    }

    pub fn set_trailing_slash(&mut self) {
        self.config.set(ConfigFlags::TRAILING_SLASH);
    }

    pub fn has_trailing_slash(&self) -> bool {
        self.config.has(ConfigFlags::TRAILING_SLASH)
    }

    /// Respond `404` on a trailing-slash mismatch instead of
    /// redirecting.
    pub fn set_strict_on_trailing_slash(&mut self) -> Result<(), RouterError> {
        if self.config.has_any(
            ConfigFlags::LENIENT_ON_TRAILING_SLASH | ConfigFlags::HANDLE_PATH_AS_IS,
        ) {
            return Err(RouterError::ConflictingConfig(
                "strict and lenient trailing slash".to_string(),
            ));
        }
        self.config.set(ConfigFlags::STRICT_ON_TRAILING_SLASH);
        Ok(())
    }

    pub fn is_strict_on_trailing_slash(&self) -> bool {
        self.config.has(ConfigFlags::STRICT_ON_TRAILING_SLASH)
    }

    /// Handle requests regardless of a trailing-slash mismatch.
    pub fn set_lenient_on_trailing_slash(&mut self) -> Result<(), RouterError> {
        if self.config.has(ConfigFlags::STRICT_ON_TRAILING_SLASH) {
            return Err(RouterError::ConflictingConfig(
                "strict and lenient trailing slash".to_string(),
            ));
        }
        self.config.set(ConfigFlags::LENIENT_ON_TRAILING_SLASH);
        Ok(())
    }

    pub fn is_lenient_on_trailing_slash(&self) -> bool {
        self.config.has_any(
            ConfigFlags::LENIENT_ON_TRAILING_SLASH | ConfigFlags::HANDLE_PATH_AS_IS,
        )
    }

    /// Handle requests whose path was not clean instead of redirecting
    /// to the cleaned path.
    pub fn set_lenient_on_unclean_path(&mut self) {
        self.config.set(ConfigFlags::LENIENT_ON_UNCLEAN_PATH);
    }

    pub fn is_lenient_on_unclean_path(&self) -> bool {
        self.config.has_any(
            ConfigFlags::LENIENT_ON_UNCLEAN_PATH | ConfigFlags::HANDLE_PATH_AS_IS,
        )
    }

    /// Handle the path exactly as received. Implies leniency on both
    /// the trailing slash and path cleanliness.
    pub fn set_handle_path_as_is(&mut self) -> Result<(), RouterError> {
        if self.config.has(ConfigFlags::STRICT_ON_TRAILING_SLASH) {
            return Err(RouterError::ConflictingConfig(
                "strict trailing slash and handle path as is".to_string(),
            ));
        }
        self.config.set(ConfigFlags::HANDLE_PATH_AS_IS);
        Ok(())
    }

    pub fn handles_path_as_is(&self) -> bool {
        self.config.has(ConfigFlags::HANDLE_PATH_AS_IS)
    }

    // -----------------------------------------------------------------
    // Registration

    /// Finds or creates the resource at `path` below this one,
    /// creating missing intermediates as dormant nodes. A trailing
    /// slash in `path` sets the leaf's trailing-slash flag and must
    /// not contradict its existing configuration.
    pub fn subresource_mut(&mut self, path: &str) -> Result<&mut Resource, RouterError> {
        let (leaf, trailing_slash) = self.subresource_for_url(path)?;
        apply_trailing_slash(leaf, trailing_slash)?;
        Ok(leaf)
    }

    /// The walk behind [`subresource_mut`]: finds or creates the leaf
    /// and reports the template's trailing slash without applying it,
    /// so URL-template registration can order its config checks.
    pub(crate) fn subresource_for_url(
        &mut self,
        path: &str,
    ) -> Result<(&mut Resource, bool), RouterError> {
        if path.is_empty() {
            return Err(RouterError::EmptyPathTemplate);
        }
        if path == "/" {
            return Err(RouterError::UnwantedPathTemplate);
        }
        if !path.starts_with('/') {
            return Err(RouterError::Template(TemplateError::InvalidTemplate(
                "path template must start with '/'".to_string(),
            )));
        }

        let segments = RouteSegments::new(path);
        let trailing_slash = segments.has_trailing_slash();

        let mut current = self;
        for segment in segments {
            let template = Template::parse(segment?)?;
            current = current.find_or_create_child(template)?;
        }

        Ok((current, trailing_slash))
    }

    /// Looks up an already registered resource below this one. Any
    /// `$name` segment without a pattern stands for the unique child
    /// carrying that external name. A trailing slash is ignored as a
    /// lookup key.
    pub fn registered_subresource_mut(
        &mut self,
        path: &str,
    ) -> Result<&mut Resource, RouterError> {
        if path.is_empty() {
            return Err(RouterError::EmptyPathTemplate);
        }
        if path == "/" {
            return Err(RouterError::UnwantedPathTemplate);
        }
        if !path.starts_with('/') {
            return Err(RouterError::Template(TemplateError::InvalidTemplate(
                "path template must start with '/'".to_string(),
            )));
        }

        let mut current = self;
        for segment in RouteSegments::new(path) {
            current = current.find_child_mut(segment?)?;
        }
        Ok(current)
    }

    /// Attaches `new_resource` below this one. A resource built with a
    /// prefix path must sit at that exact position: the prefix is
    /// validated against this resource's own path, missing
    /// intermediates are created dormant, and a template collision at
    /// the final position resolves by merge.
    pub fn add_subresource(&mut self, mut new_resource: Resource) -> Result<(), RouterError> {
        if new_resource.host_template.is_some() {
            return Err(RouterError::NonRouterParent);
        }
        if new_resource.is_root() {
            return Err(RouterError::UnwantedPathTemplate);
        }

        let prefix = std::mem::take(&mut new_resource.prefix_templates);
        let mut prefix = prefix.into_iter();

        // The new resource's prefix must repeat this resource's own
        // path before naming anything below it.
        for own in self.path_templates().filter(|t| !t.is_root()) {
            let Some(given) = prefix.next() else {
                return Err(RouterError::ConflictingPath(new_resource.template.content()));
            };
            match own.compare(&given) {
                Similarity::Same => {}
                Similarity::DifferentNames if given.name().is_none() => {}
                _ => {
                    return Err(RouterError::ConflictingPathSegment(given.content()));
                }
            }
        }

        let mut target = self;
        for template in prefix {
            target = target.find_or_create_child(template)?;
        }
        target.attach_child(new_resource)
    }

    /// Finds the child matching `template`, or creates it as a dormant
    /// node. Similarity decides: `Same` is the same node, any other
    /// non-`Different` similarity is a collision error.
    pub(crate) fn find_or_create_child(
        &mut self,
        template: Template,
    ) -> Result<&mut Resource, RouterError> {
        match template.kind() {
            TemplateKind::Static => {
                let content = template
                    .static_content()
                    .unwrap_or_default()
                    .to_string();
                if let Some(existing) = self.static_children.get(content.as_str()) {
                    match existing.template.compare(&template) {
                        Similarity::Same => {}
                        Similarity::DifferentNames if template.name().is_none() => {}
                        Similarity::DifferentNames => {
                            return Err(RouterError::DifferentNames(content));
                        }
                        _ => return Err(RouterError::DifferentTemplates(content)),
                    }
                    return Ok(self.static_children.get_mut(content.as_str()).unwrap());
                }
                self.check_new_child_template(&template)?;
                let child = self.new_child(template);
                self.static_children
                    .insert(content.clone().into_boxed_str(), child);
                Ok(self.static_children.get_mut(content.as_str()).unwrap())
            }
            TemplateKind::Pattern => {
                let mut found = None;
                for (i, child) in self.pattern_children.iter().enumerate() {
                    match child.template.compare(&template) {
                        Similarity::Same => {
                            found = Some(i);
                            break;
                        }
                        Similarity::DifferentValueNames => {
                            return Err(RouterError::DifferentValueNames(template.content()));
                        }
                        Similarity::DifferentNames => {
                            return Err(RouterError::DifferentNames(template.content()));
                        }
                        Similarity::Different => {}
                    }
                }
                if let Some(i) = found {
                    return Ok(&mut self.pattern_children[i]);
                }
                self.check_new_child_template(&template)?;
                let child = self.new_child(template);
                self.pattern_children.push(child);
                Ok(self.pattern_children.last_mut().unwrap())
            }
            TemplateKind::Wildcard => {
                if let Some(existing) = self.wildcard_child.as_deref() {
                    match existing.template.compare(&template) {
                        Similarity::Same => {}
                        Similarity::DifferentValueNames => {
                            return Err(RouterError::DifferentValueNames(template.content()));
                        }
                        Similarity::DifferentNames => {
                            return Err(RouterError::DifferentNames(template.content()));
                        }
                        Similarity::Different => {
                            return Err(RouterError::DifferentTemplates(template.content()));
                        }
                    }
                    return Ok(self.wildcard_child.as_deref_mut().unwrap());
                }
                self.check_new_child_template(&template)?;
                let child = self.new_child(template);
                self.wildcard_child = Some(Box::new(child));
                Ok(self.wildcard_child.as_deref_mut().unwrap())
            }
        }
    }

    fn new_child(&self, template: Template) -> Resource {
        debug!(
            parent = %self.template,
            template = %template,
            "routing: registered resource"
        );
        let mut child = Resource::with_template(template);
        child.prefix_templates = self.child_prefix();
        child
    }

    /// Lookup-only variant of [`find_or_create_child`] with `$name`
    /// shorthand support.
    fn find_child_mut(&mut self, segment: &str) -> Result<&mut Resource, RouterError> {
        if let Some(name) = shorthand_name(segment) {
            if self
                .static_children
                .values()
                .any(|c| c.template.name() == Some(name.as_str()))
            {
                return Ok(self
                    .static_children
                    .values_mut()
                    .find(|c| c.template.name() == Some(name.as_str()))
                    .unwrap());
            }
            if let Some(i) = self
                .pattern_children
                .iter()
                .position(|c| c.template.name() == Some(name.as_str()))
            {
                return Ok(&mut self.pattern_children[i]);
            }
            if self
                .wildcard_child
                .as_deref()
                .is_some_and(|c| c.template.name() == Some(name.as_str()))
            {
                return Ok(self.wildcard_child.as_deref_mut().unwrap());
            }
            return Err(RouterError::NonExistentResource(segment.to_string()));
        }

        let template = Template::parse(segment)?;
        match template.kind() {
            TemplateKind::Static => {
                let content = template.static_content().unwrap_or_default();
                match self.static_children.get(content) {
                    Some(existing) => match existing.template.compare(&template) {
                        Similarity::Same => {}
                        Similarity::DifferentNames if template.name().is_none() => {}
                        Similarity::DifferentNames => {
                            return Err(RouterError::DifferentNames(content.to_string()));
                        }
                        _ => return Err(RouterError::DifferentTemplates(content.to_string())),
                    },
                    None => {
                        return Err(RouterError::NonExistentResource(segment.to_string()));
                    }
                }
                Ok(self.static_children.get_mut(content).unwrap())
            }
            TemplateKind::Pattern => {
                for (i, child) in self.pattern_children.iter().enumerate() {
                    match child.template.compare(&template) {
                        Similarity::Same => return Ok(&mut self.pattern_children[i]),
                        Similarity::DifferentValueNames => {
                            return Err(RouterError::DifferentValueNames(template.content()));
                        }
                        Similarity::DifferentNames => {
                            return Err(RouterError::DifferentNames(template.content()));
                        }
                        Similarity::Different => {}
                    }
                }
                Err(RouterError::NonExistentResource(segment.to_string()))
            }
            TemplateKind::Wildcard => match self.wildcard_child.as_deref() {
                Some(existing) => match existing.template.compare(&template) {
                    Similarity::Same => Ok(self.wildcard_child.as_deref_mut().unwrap()),
                    Similarity::DifferentValueNames => {
                        Err(RouterError::DifferentValueNames(template.content()))
                    }
                    Similarity::DifferentNames => {
                        Err(RouterError::DifferentNames(template.content()))
                    }
                    Similarity::Different => {
                        Err(RouterError::DifferentTemplates(template.content()))
                    }
                },
                None => Err(RouterError::NonExistentResource(segment.to_string())),
            },
        }
    }

    /// Places `new` into the right bucket, merging on a `Same`
    /// template collision.
    pub(crate) fn attach_child(&mut self, mut new: Resource) -> Result<(), RouterError> {
        self.check_subtree_names(&new)?;
        self.check_sibling_names(&new)?;
        new.prefix_templates = self.child_prefix();

        match new.template.kind() {
            TemplateKind::Static => {
                let content = new.template.static_content().unwrap_or_default().to_string();
                if let Some(existing) = self.static_children.get(content.as_str()) {
                    match existing.template.compare(&new.template) {
                        Similarity::Same => {}
                        Similarity::DifferentNames if new.template.name().is_none() => {}
                        Similarity::DifferentNames => {
                            return Err(RouterError::DifferentNames(content));
                        }
                        _ => return Err(RouterError::DifferentTemplates(content)),
                    }
                    check_merge_capability(existing, &new)?;
                    let existing = self.static_children.remove(content.as_str()).unwrap();
                    let merged = keep_resource_or_its_children(existing, new)?;
                    self.static_children
                        .insert(content.into_boxed_str(), merged);
                    return Ok(());
                }
                debug!(parent = %self.template, template = %new.template, "routing: registered resource");
                self.static_children.insert(content.into_boxed_str(), new);
                Ok(())
            }
            TemplateKind::Pattern => {
                let mut found = None;
                for (i, child) in self.pattern_children.iter().enumerate() {
                    match child.template.compare(&new.template) {
                        Similarity::Same => {
                            found = Some(i);
                            break;
                        }
                        Similarity::DifferentValueNames => {
                            return Err(RouterError::DifferentValueNames(new.template.content()));
                        }
                        Similarity::DifferentNames => {
                            return Err(RouterError::DifferentNames(new.template.content()));
                        }
                        Similarity::Different => {}
                    }
                }
                if let Some(i) = found {
                    check_merge_capability(&self.pattern_children[i], &new)?;
                    let existing = self.pattern_children.remove(i);
                    let merged = keep_resource_or_its_children(existing, new)?;
                    self.pattern_children.insert(i, merged);
                    return Ok(());
                }
                debug!(parent = %self.template, template = %new.template, "routing: registered resource");
                self.pattern_children.push(new);
                Ok(())
            }
            TemplateKind::Wildcard => {
                if let Some(existing) = self.wildcard_child.take() {
                    match existing.template.compare(&new.template) {
                        Similarity::Same => {
                            if let Err(e) = check_merge_capability(&existing, &new) {
                                self.wildcard_child = Some(existing);
                                return Err(e);
                            }
                            let merged = keep_resource_or_its_children(*existing, new)?;
                            self.wildcard_child = Some(Box::new(merged));
                            Ok(())
                        }
                        Similarity::DifferentValueNames => {
                            self.wildcard_child = Some(existing);
                            Err(RouterError::DifferentValueNames(new.template.content()))
                        }
                        Similarity::DifferentNames => {
                            self.wildcard_child = Some(existing);
                            Err(RouterError::DifferentNames(new.template.content()))
                        }
                        Similarity::Different => {
                            self.wildcard_child = Some(existing);
                            Err(RouterError::DifferentTemplates(new.template.content()))
                        }
                    }
                } else {
                    debug!(parent = %self.template, template = %new.template, "routing: registered resource");
                    self.wildcard_child = Some(Box::new(new));
                    Ok(())
                }
            }
        }
    }

    /// Moves every child of `other` under this resource, re-parenting
    /// each and merging where templates collide. Children are drained
    /// into a worklist first so the merge never iterates buckets it is
    /// mutating; nested collisions merge depth-first.
    fn absorb_children(&mut self, other: Resource) -> Result<(), RouterError> {
        let Resource {
            static_children,
            pattern_children,
            wildcard_child,
            ..
        } = other;

        let mut worklist: VecDeque<Resource> = VecDeque::new();
        worklist.extend(static_children.into_values());
        worklist.extend(pattern_children);
        if let Some(wildcard) = wildcard_child {
            worklist.push_back(*wildcard);
        }

        while let Some(child) = worklist.pop_front() {
            self.attach_child(child)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Name uniqueness

    fn ancestor_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for template in self.path_templates() {
            if let Some(name) = template.name() {
                names.push(name);
            }
            names.extend(template.value_names());
        }
        names
    }

    fn check_new_child_template(&self, template: &Template) -> Result<(), RouterError> {
        let ancestors = self.ancestor_names();
        if let Some(name) = template.name() {
            if ancestors.contains(&name) {
                return Err(RouterError::DuplicateNameInTheURL(name.to_string()));
            }
            for sibling in self.children_iter() {
                if sibling.template.name() == Some(name) {
                    return Err(RouterError::DuplicateNameAmongSiblings(name.to_string()));
                }
            }
        }
        for value_name in template.value_names() {
            if ancestors.contains(&value_name) {
                return Err(RouterError::DuplicateValueNameInTheURL(
                    value_name.to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Checks the names of `new` and its whole subtree against this
    /// resource's ancestor chain; every path through `new` inherits
    /// that chain.
    fn check_subtree_names(&self, new: &Resource) -> Result<(), RouterError> {
        let ancestors = self.ancestor_names();
        let mut stack = vec![new];
        while let Some(resource) = stack.pop() {
            if let Some(name) = resource.template.name() {
                if ancestors.contains(&name) {
                    return Err(RouterError::DuplicateNameInTheURL(name.to_string()));
                }
            }
            for value_name in resource.template.value_names() {
                if ancestors.contains(&value_name) {
                    return Err(RouterError::DuplicateValueNameInTheURL(
                        value_name.to_string(),
                    ));
                }
            }
            stack.extend(resource.children_iter());
        }
        Ok(())
    }

    fn check_sibling_names(&self, new: &Resource) -> Result<(), RouterError> {
        let Some(name) = new.template.name() else {
            return Ok(());
        };
        for sibling in self.children_iter() {
            if sibling.template.name() == Some(name)
                && sibling.template.compare(&new.template) != Similarity::Same
            {
                return Err(RouterError::DuplicateNameAmongSiblings(name.to_string()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("template", &self.template.content())
            .field("static", &self.static_children.keys().collect::<Vec<_>>())
            .field(
                "patterns",
                &self
                    .pattern_children
                    .iter()
                    .map(|c| c.template.content())
                    .collect::<Vec<_>>(),
            )
            .field("wildcard", &self.wildcard_child.is_some())
            .field("handlers", &self.method_handlers)
            .finish()
    }
}

fn check_merge_capability(existing: &Resource, new: &Resource) -> Result<(), RouterError> {
    if existing.has_handling_effect() && new.has_handling_effect() {
        return Err(RouterError::DuplicateResourceTemplate(
            new.template.content(),
        ));
    }
    Ok(())
}

/// Resolves a template collision: the handler-capable side keeps the
/// position and receives the other side's children. Two capable
/// resources with the same template cannot coexist.
pub(crate) fn keep_resource_or_its_children(
    mut existing: Resource,
    mut new: Resource,
) -> Result<Resource, RouterError> {
    let existing_capable = existing.has_handling_effect();
    let new_capable = new.has_handling_effect();

    if existing_capable && new_capable {
        return Err(RouterError::DuplicateResourceTemplate(
            new.template.content(),
        ));
    }

    if new_capable {
        tracing::warn!(
            template = %new.template,
            "routing: replacing dormant resource with handler-capable duplicate"
        );
        new.prefix_templates = std::mem::take(&mut existing.prefix_templates);
        merge_config(&mut new, &existing)?;
        if new.shared_data.is_none() {
            new.shared_data = existing.shared_data.take();
        }
        new.absorb_children(existing)?;
        Ok(new)
    } else {
        merge_config(&mut existing, &new)?;
        if existing.shared_data.is_none() {
            existing.shared_data = new.shared_data.take();
        }
        existing.absorb_children(new)?;
        Ok(existing)
    }
}

fn merge_config(winner: &mut Resource, loser: &Resource) -> Result<(), RouterError> {
    if !loser.config.is_active() {
        return Ok(());
    }
    if !winner.config.is_active() {
        winner.config = loser.config;
        return Ok(());
    }
    if winner.config != loser.config {
        return Err(RouterError::ConflictingConfig(winner.template.content()));
    }
    Ok(())
}

pub(crate) fn apply_trailing_slash(
    resource: &mut Resource,
    trailing_slash: bool,
) -> Result<(), RouterError> {
    if resource.is_root() {
        return Ok(());
    }
    if trailing_slash {
        if resource.config.is_active() && !resource.has_trailing_slash() {
            return Err(RouterError::ConflictingTrailingSlash(
                resource.template.content(),
            ));
        }
        resource.config.set(ConfigFlags::TRAILING_SLASH);
    } else if resource.has_trailing_slash() {
        return Err(RouterError::ConflictingTrailingSlash(
            resource.template.content(),
        ));
    }
    Ok(())
}

fn check_chain_names(prefix: &[Template], leaf: &Template) -> Result<(), RouterError> {
    let mut seen: Vec<&str> = Vec::new();
    for template in prefix.iter().chain(std::iter::once(leaf)) {
        if let Some(name) = template.name() {
            if seen.contains(&name) {
                return Err(RouterError::DuplicateNameInTheURL(name.to_string()));
            }
            seen.push(name);
        }
        for value_name in template.value_names() {
            if seen.contains(&value_name) {
                return Err(RouterError::DuplicateValueNameInTheURL(
                    value_name.to_string(),
                ));
            }
            seen.push(value_name);
        }
    }
    Ok(())
}

fn shorthand_name(segment: &str) -> Option<String> {
    let rest = segment.strip_prefix('$')?;
    let mut name = String::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => name.push(chars.next()?),
            ':' => return None,
            c => name.push(c),
        }
    }
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
