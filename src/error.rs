use std::fmt;

/// Errors produced while parsing, matching, or applying URL templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template string is malformed: empty, unbalanced braces,
    /// an empty value-slot name, or an empty pattern.
    InvalidTemplate(String),
    /// A provided value does not match the value slot's pattern.
    InvalidValue(String),
    /// A value slot has no value and `ignore_missing` was not set.
    MissingValue(String),
    /// A repeated value-slot name carries a different pattern than
    /// its first occurrence.
    DifferentPattern(String),
    /// The template repeats its wildcard name.
    RepeatedWildcardName(String),
    /// The template declares a second, differently named wildcard.
    AnotherWildcardName(String),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::InvalidTemplate(msg) => write!(f, "invalid template: {}", msg),
            TemplateError::InvalidValue(name) => {
                write!(f, "value for '{}' does not match its pattern", name)
            }
            TemplateError::MissingValue(name) => write!(f, "missing value for '{}'", name),
            TemplateError::DifferentPattern(name) => {
                write!(f, "value name '{}' repeated with a different pattern", name)
            }
            TemplateError::RepeatedWildcardName(name) => {
                write!(f, "wildcard name '{}' repeated", name)
            }
            TemplateError::AnotherWildcardName(name) => {
                write!(f, "'{}' declares a second wildcard", name)
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// Errors produced while registering hosts and resources or while
/// configuring them. Registration, configuration, and template errors
/// propagate to the caller; serve-time failures never surface here,
/// they become `400 Bad Request` responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// An empty string was passed where a template argument was required.
    NilArgument,
    EmptyHostTemplate,
    EmptyPathTemplate,
    /// A path template contains an empty segment (`/a//b`).
    EmptyPathSegmentTemplate,
    /// Host templates must not be wildcards.
    WildcardHostTemplate,
    /// A path was supplied where only a host (or a root) is accepted.
    UnwantedPathTemplate,
    /// The resource carries a host template and can only be attached
    /// to a router.
    NonRouterParent,
    RegisteredHost(String),
    RegisteredResource(String),
    DuplicateHostTemplate(String),
    DuplicateResourceTemplate(String),
    /// A sibling already carries the same external template name.
    DuplicateNameAmongSiblings(String),
    /// A template name is repeated along the registration path.
    DuplicateNameInTheURL(String),
    /// A value-slot name is repeated along the registration path.
    DuplicateValueNameInTheURL(String),
    /// The resource belongs to a different host than the one it is
    /// being registered under.
    ConflictingHost(String),
    /// The resource's prefix path disagrees with its position in
    /// the tree.
    ConflictingPath(String),
    /// A prefix path segment disagrees with the existing segment at
    /// the same position.
    ConflictingPathSegment(String),
    /// The URL template's scheme contradicts the resource's existing
    /// security configuration.
    ConflictingSecurity(String),
    /// The URL template's trailing slash contradicts the resource's
    /// existing configuration.
    ConflictingTrailingSlash(String),
    /// Mutually exclusive configuration flags were combined.
    ConflictingConfig(String),
    /// The host exists but no resource in its subtree can handle
    /// a request.
    DormantHost(String),
    /// The resource subtree has no handler anywhere.
    DormantResource(String),
    NonExistentHost(String),
    NonExistentResource(String),
    /// A wrap call received no middleware.
    NoMiddleware,
    /// A methods string contained no usable method token.
    NoMethod,
    /// A wrap targeted a method with no registered handler.
    NoHandlerExists(String),

    /// Compare-then-err sentinels used by similarity-based lookups.
    DifferentTemplates(String),
    DifferentValueNames(String),
    DifferentNames(String),

    Template(TemplateError),
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::NilArgument => write!(f, "empty argument"),
            RouterError::EmptyHostTemplate => write!(f, "empty host template"),
            RouterError::EmptyPathTemplate => write!(f, "empty path template"),
            RouterError::EmptyPathSegmentTemplate => write!(f, "empty path segment template"),
            RouterError::WildcardHostTemplate => write!(f, "host template cannot be a wildcard"),
            RouterError::UnwantedPathTemplate => write!(f, "unwanted path template"),
            RouterError::NonRouterParent => {
                write!(f, "resource with a host template needs a router parent")
            }
            RouterError::RegisteredHost(t) => write!(f, "host '{}' is already registered", t),
            RouterError::RegisteredResource(t) => {
                write!(f, "resource '{}' is already registered", t)
            }
            RouterError::DuplicateHostTemplate(t) => write!(f, "duplicate host template '{}'", t),
            RouterError::DuplicateResourceTemplate(t) => {
                write!(f, "duplicate resource template '{}'", t)
            }
            RouterError::DuplicateNameAmongSiblings(n) => {
                write!(f, "duplicate name '{}' among siblings", n)
            }
            RouterError::DuplicateNameInTheURL(n) => write!(f, "duplicate name '{}' in the URL", n),
            RouterError::DuplicateValueNameInTheURL(n) => {
                write!(f, "duplicate value name '{}' in the URL", n)
            }
            RouterError::ConflictingHost(t) => write!(f, "conflicting host '{}'", t),
            RouterError::ConflictingPath(p) => write!(f, "conflicting path '{}'", p),
            RouterError::ConflictingPathSegment(s) => {
                write!(f, "conflicting path segment '{}'", s)
            }
            RouterError::ConflictingSecurity(t) => {
                write!(f, "conflicting security configuration for '{}'", t)
            }
            RouterError::ConflictingTrailingSlash(t) => {
                write!(f, "conflicting trailing slash configuration for '{}'", t)
            }
            RouterError::ConflictingConfig(msg) => write!(f, "conflicting config: {}", msg),
            RouterError::DormantHost(t) => write!(f, "host '{}' has no handler in its tree", t),
            RouterError::DormantResource(t) => {
                write!(f, "resource '{}' has no handler in its tree", t)
            }
            RouterError::NonExistentHost(t) => write!(f, "no host '{}'", t),
            RouterError::NonExistentResource(t) => write!(f, "no resource '{}'", t),
            RouterError::NoMiddleware => write!(f, "no middleware"),
            RouterError::NoMethod => write!(f, "no method"),
            RouterError::NoHandlerExists(m) => write!(f, "no handler exists for '{}'", m),
            RouterError::DifferentTemplates(t) => write!(f, "different templates: '{}'", t),
            RouterError::DifferentValueNames(t) => {
                write!(f, "templates differ in value names: '{}'", t)
            }
            RouterError::DifferentNames(t) => write!(f, "templates differ in name: '{}'", t),
            RouterError::Template(e) => write!(f, "template error: {}", e),
        }
    }
}

impl std::error::Error for RouterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RouterError::Template(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TemplateError> for RouterError {
    fn from(e: TemplateError) -> Self {
        RouterError::Template(e)
    }
}
