//! Host nodes — roots of per-domain resource trees.

use crate::error::RouterError;
use crate::resource::{keep_resource_or_its_children, Resource};
use crate::template::{Similarity, Template};

/// A routing node keyed by the request's `Host`. A host owns exactly
/// one root resource; everything under the domain hangs off that root.
pub struct Host {
    template: Template,
    root: Resource,
}

impl Host {
    /// Creates a host from a host template and its root resource.
    ///
    /// The template is a dotted domain, optionally with value slots in
    /// its labels (`{sub:[a-z]+}.example.com`); wildcards are not
    /// allowed at the host level. An `https://` prefix marks the root
    /// secure, a trailing `/` is ignored.
    pub fn new(host_template: &str, root: Resource) -> Result<Host, RouterError> {
        let (template, secure) = parse_host_template(host_template)?;
        let mut root = root;
        if secure {
            root.set_secure();
        }
        Host::with_template(template, root)
    }

    pub(crate) fn with_template(template: Template, mut root: Resource) -> Result<Host, RouterError> {
        if !root.is_root() {
            return Err(RouterError::UnwantedPathTemplate);
        }
        if let Some(existing) = root.take_host_template() {
            if existing.compare(&template) != Similarity::Same {
                return Err(RouterError::ConflictingHost(existing.content()));
            }
        }
        Ok(Host { template, root })
    }

    /// Whether `template` is this host's template.
    pub fn is(&self, template: &str) -> bool {
        match parse_host_template(template) {
            Ok((t, _)) => self.template.compare(&t) == Similarity::Same,
            Err(_) => false,
        }
    }

    pub(crate) fn template(&self) -> &Template {
        &self.template
    }

    pub fn root(&self) -> &Resource {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Resource {
        &mut self.root
    }

    pub(crate) fn into_parts(self) -> (Template, Resource) {
        (self.template, self.root)
    }

    pub(crate) fn has_handler_in_subtree(&self) -> bool {
        self.root.has_handler_in_subtree()
    }

    /// Merges another root tree for the same host. The handler-capable
    /// root wins the position; both being capable is a duplicate.
    pub(crate) fn merge_or_replace_root(&mut self, new_root: Resource) -> Result<(), RouterError> {
        let old_root = std::mem::replace(&mut self.root, Resource::with_template(Template::root()));
        match keep_resource_or_its_children(old_root, new_root) {
            Ok(merged) => {
                self.root = merged;
                Ok(())
            }
            Err(RouterError::DuplicateResourceTemplate(_)) => Err(
                RouterError::DuplicateHostTemplate(self.template.content()),
            ),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.template, f)
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("template", &self.template.content())
            .field("root", &self.root)
            .finish()
    }
}

/// Parses a host template string, stripping an optional scheme and a
/// trailing slash. Returns the template and whether `https://` was
/// given.
pub(crate) fn parse_host_template(host_template: &str) -> Result<(Template, bool), RouterError> {
    if host_template.is_empty() {
        return Err(RouterError::EmptyHostTemplate);
    }

    let (stripped, secure) = if let Some(rest) = host_template.strip_prefix("https://") {
        (rest, true)
    } else if let Some(rest) = host_template.strip_prefix("http://") {
        (rest, false)
    } else {
        (host_template, false)
    };
    let stripped = stripped.strip_suffix('/').unwrap_or(stripped);

    if stripped.is_empty() {
        return Err(RouterError::EmptyHostTemplate);
    }

    let template = Template::parse(stripped)?;
    if template.is_wildcard() {
        return Err(RouterError::WildcardHostTemplate);
    }
    Ok((template, secure))
}
