//! URL templates — the compiled matchers of routing nodes.
//!
//! A template is an ordered sequence of slices: literal static runs and
//! named value slots, where a slot either carries a regex (a pattern
//! slot) or is unbounded (the wildcard, at most one per template).
//! Templates are pre-compiled once at registration time and matched
//! against host strings and path segments at request time.

mod parser;

use crate::error::TemplateError;
use parser::{RawSlice, RawTemplate};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The equivalence class of two templates, used to detect collisions
/// during registration.
///
/// Ordered from least to most similar: `Different` templates match
/// different inputs, `DifferentValueNames` match the same inputs but
/// capture under different names, `DifferentNames` differ only in their
/// external name, `Same` templates are interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Similarity {
    Different,
    DifferentValueNames,
    DifferentNames,
    Same,
}

/// The template class deciding a child's bucket on its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TemplateKind {
    Static,
    Wildcard,
    Pattern,
}

#[derive(Debug, Clone)]
pub(crate) struct ValueSlot {
    name: Arc<str>,
    /// Verbatim regex source; `None` marks the unbounded wildcard slot.
    source: Option<Box<str>>,
    /// Directionally anchored matcher: slots before the wildcard are
    /// start-anchored, slots after it end-anchored, a lone pattern slot
    /// both-anchored. Repeated names share the first occurrence's form.
    matcher: Option<Regex>,
    /// Fully anchored form used for apply-time value validation.
    validator: Option<Regex>,
}

#[derive(Debug, Clone)]
pub(crate) enum Slice {
    Static(Box<str>),
    Slot(ValueSlot),
}

/// A parsed and compiled URL template.
#[derive(Debug, Clone)]
pub struct Template {
    name: Option<Arc<str>>,
    slices: Vec<Slice>,
    wildcard: Option<usize>,
}

impl Template {
    /// Parses and compiles a template string.
    pub fn parse(input: &str) -> Result<Template, TemplateError> {
        Template::from_raw(parser::parse(input)?)
    }

    fn from_raw(raw: RawTemplate) -> Result<Template, TemplateError> {
        let RawTemplate { name, slices: raw_slices } = raw;

        // First occurrence of each value name decides its pattern (a
        // repeat may omit the pattern and inherit it) and its anchoring.
        let mut first_sources: HashMap<Arc<str>, Option<String>> = HashMap::new();
        let mut wildcard: Option<usize> = None;
        let mut resolved: Vec<(Option<Arc<str>>, Option<String>, Option<String>)> = Vec::new();

        for raw_slice in raw_slices {
            match raw_slice {
                RawSlice::Static(s) => resolved.push((None, Some(s), None)),
                RawSlice::Slot { name, pattern } => {
                    let interned: Arc<str> = match first_sources.get_key_value(name.as_str()) {
                        Some((key, _)) => key.clone(),
                        None => Arc::from(name.as_str()),
                    };

                    let pattern = match first_sources.get(&*interned) {
                        Some(Some(first)) => match pattern {
                            None => Some(first.clone()),
                            Some(p) if p == *first => Some(p),
                            Some(_) => {
                                return Err(TemplateError::DifferentPattern(name));
                            }
                        },
                        Some(None) => {
                            return Err(match pattern {
                                None => TemplateError::RepeatedWildcardName(name),
                                Some(_) => TemplateError::DifferentPattern(name),
                            });
                        }
                        None => {
                            first_sources.insert(interned.clone(), pattern.clone());
                            if pattern.is_none() {
                                if wildcard.is_some() {
                                    return Err(TemplateError::AnotherWildcardName(name));
                                }
                                wildcard = Some(resolved.len());
                            }
                            pattern
                        }
                    };

                    resolved.push((Some(interned), None, pattern));
                }
            }
        }

        // Compile each slot once its position relative to the wildcard
        // is known. A repeated name reuses the first compiled instance.
        let single_pattern_slot =
            resolved.len() == 1 && matches!(&resolved[0], (Some(_), _, Some(_)));
        let mut compiled: HashMap<Arc<str>, (Regex, Regex)> = HashMap::new();
        let mut slices = Vec::with_capacity(resolved.len());

        for (idx, (slot_name, static_content, source)) in resolved.into_iter().enumerate() {
            let Some(slot_name) = slot_name else {
                let content = static_content.unwrap_or_default();
                slices.push(Slice::Static(content.into_boxed_str()));
                continue;
            };

            let (matcher, validator) = match &source {
                None => (None, None),
                Some(src) => match compiled.get(&slot_name) {
                    Some((m, v)) => (Some(m.clone()), Some(v.clone())),
                    None => {
                        let matcher_src = if single_pattern_slot {
                            format!("^(?:{})$", src)
                        } else if wildcard.map_or(true, |w| idx < w) {
                            format!("^(?:{})", src)
                        } else {
                            format!("(?:{})$", src)
                        };
                        let matcher = compile_slot_regex(&slot_name, &matcher_src)?;
                        let validator =
                            compile_slot_regex(&slot_name, &format!("^(?:{})$", src))?;
                        compiled.insert(slot_name.clone(), (matcher.clone(), validator.clone()));
                        (Some(matcher), Some(validator))
                    }
                },
            };

            slices.push(Slice::Slot(ValueSlot {
                name: slot_name,
                source: source.map(String::into_boxed_str),
                matcher,
                validator,
            }));
        }

        Ok(Template {
            name: name.map(|n| Arc::from(n.as_str())),
            slices,
            wildcard,
        })
    }

    /// The root resource's template.
    pub(crate) fn root() -> Template {
        Template {
            name: None,
            slices: vec![Slice::Static("/".into())],
            wildcard: None,
        }
    }

    /// The template's external name, if one was given with `$name:`.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// A template consisting of a single literal slice.
    pub fn is_static(&self) -> bool {
        matches!(self.slices.as_slice(), [Slice::Static(_)])
    }

    /// A template consisting of a single unbounded value slot.
    pub fn is_wildcard(&self) -> bool {
        self.slices.len() == 1 && self.wildcard == Some(0)
    }

    /// Any template that is neither static nor a lone wildcard.
    pub fn is_pattern(&self) -> bool {
        !self.is_static() && !self.is_wildcard()
    }

    pub(crate) fn kind(&self) -> TemplateKind {
        if self.is_static() {
            TemplateKind::Static
        } else if self.is_wildcard() {
            TemplateKind::Wildcard
        } else {
            TemplateKind::Pattern
        }
    }

    pub(crate) fn is_root(&self) -> bool {
        self.static_content() == Some("/")
    }

    pub(crate) fn static_content(&self) -> Option<&str> {
        match self.slices.as_slice() {
            [Slice::Static(s)] => Some(s),
            _ => None,
        }
    }

    /// The name of the unbounded value slot, if the template has one.
    pub fn wildcard_name(&self) -> Option<&str> {
        let idx = self.wildcard?;
        match &self.slices[idx] {
            Slice::Slot(v) => Some(&v.name),
            Slice::Static(_) => None,
        }
    }

    /// Unique value-slot names in first-occurrence order.
    pub(crate) fn value_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for slice in &self.slices {
            if let Slice::Slot(v) = slice {
                if !names.contains(&&*v.name) {
                    names.push(&v.name);
                }
            }
        }
        names
    }

    /// Matches `input` against the template, appending captured
    /// `(name, value)` pairs to `params`. On failure, `params` is left
    /// exactly as it was.
    ///
    /// Slices are consumed strictly left-to-right up to the wildcard
    /// and strictly right-to-left down to it; any non-empty middle
    /// remainder becomes the wildcard's value.
    pub(crate) fn matches(&self, input: &str, params: &mut UriParams) -> bool {
        let mark = params.len();
        if self.matches_inner(input, params, mark) {
            true
        } else {
            params.truncate(mark);
            false
        }
    }

    fn matches_inner(&self, input: &str, params: &mut UriParams, mark: usize) -> bool {
        if let Some(content) = self.static_content() {
            return content == input;
        }

        let mut rest = input;
        let upper = self.wildcard.unwrap_or(self.slices.len());

        for slice in &self.slices[..upper] {
            match slice {
                Slice::Static(s) => match rest.strip_prefix(&**s) {
                    Some(r) => rest = r,
                    None => return false,
                },
                Slice::Slot(v) => {
                    let Some(found) = v.matcher.as_ref().and_then(|re| re.find(rest)) else {
                        return false;
                    };
                    if found.start() != 0 {
                        return false;
                    }
                    if !push_capture(params, mark, &v.name, found.as_str()) {
                        return false;
                    }
                    rest = &rest[found.end()..];
                }
            }
        }

        let Some(w) = self.wildcard else {
            return rest.is_empty();
        };

        for slice in self.slices[w + 1..].iter().rev() {
            match slice {
                Slice::Static(s) => match rest.strip_suffix(&**s) {
                    Some(r) => rest = r,
                    None => return false,
                },
                Slice::Slot(v) => {
                    let Some(found) = v.matcher.as_ref().and_then(|re| re.find(rest)) else {
                        return false;
                    };
                    if found.end() != rest.len() {
                        return false;
                    }
                    if !push_capture(params, mark, &v.name, found.as_str()) {
                        return false;
                    }
                    rest = &rest[..found.start()];
                }
            }
        }

        if rest.is_empty() {
            return false;
        }

        match &self.slices[w] {
            Slice::Slot(v) => push_capture(params, mark, &v.name, rest),
            Slice::Static(_) => false,
        }
    }

    /// Rebuilds a concrete string from the template by substituting
    /// each value slot from `values`. Provided values must fully match
    /// their slot's pattern. A missing value is an error unless
    /// `ignore_missing` is set, in which case the slot is skipped.
    pub fn apply(
        &self,
        values: &HashMap<&str, &str>,
        ignore_missing: bool,
    ) -> Result<String, TemplateError> {
        let mut out = String::new();
        for slice in &self.slices {
            match slice {
                Slice::Static(s) => out.push_str(s),
                Slice::Slot(v) => match values.get(&*v.name) {
                    Some(value) => {
                        if let Some(validator) = &v.validator {
                            if !validator.is_match(value) {
                                return Err(TemplateError::InvalidValue(v.name.to_string()));
                            }
                        }
                        out.push_str(value);
                    }
                    None if ignore_missing => {}
                    None => return Err(TemplateError::MissingValue(v.name.to_string())),
                },
            }
        }
        Ok(out)
    }

    /// Compares two templates for registration purposes.
    pub fn compare(&self, other: &Template) -> Similarity {
        if self.slices.len() != other.slices.len() {
            return Similarity::Different;
        }

        let mut same_value_names = true;
        for (a, b) in self.slices.iter().zip(other.slices.iter()) {
            match (a, b) {
                (Slice::Static(x), Slice::Static(y)) => {
                    if x != y {
                        return Similarity::Different;
                    }
                }
                (Slice::Slot(x), Slice::Slot(y)) => {
                    if x.source != y.source {
                        return Similarity::Different;
                    }
                    if x.name != y.name {
                        same_value_names = false;
                    }
                }
                _ => return Similarity::Different,
            }
        }

        if !same_value_names {
            return Similarity::DifferentValueNames;
        }
        if self.name.as_deref() != other.name.as_deref() {
            return Similarity::DifferentNames;
        }
        Similarity::Same
    }

    /// The template's source string, reconstructed with escapes. Parsing
    /// the result yields a `Same` template.
    pub fn content(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        if let Some(name) = &self.name {
            out.push('$');
            escape_into(&mut out, name, &[':', '{', '}', '\\']);
            out.push(':');
        }
        for (idx, slice) in self.slices.iter().enumerate() {
            match slice {
                Slice::Static(s) => {
                    let escape_dollar = idx == 0 && self.name.is_none();
                    for (i, c) in s.chars().enumerate() {
                        match c {
                            '{' | '}' | '\\' => {
                                out.push('\\');
                                out.push(c);
                            }
                            '$' if i == 0 && escape_dollar => {
                                out.push('\\');
                                out.push('$');
                            }
                            c => out.push(c),
                        }
                    }
                }
                Slice::Slot(v) => {
                    out.push('{');
                    escape_into(&mut out, &v.name, &[':', '{', '}', '\\']);
                    if let Some(source) = &v.source {
                        out.push(':');
                        out.push_str(source);
                    }
                    out.push('}');
                }
            }
        }
        f.write_str(&out)
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Similarity::Same
    }
}

fn compile_slot_regex(name: &str, source: &str) -> Result<Regex, TemplateError> {
    Regex::new(source).map_err(|e| {
        TemplateError::InvalidTemplate(format!("invalid pattern for '{}': {}", name, e))
    })
}

fn escape_into(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Pushes a capture, failing when a repeated name matched two different
/// values within the same template match.
fn push_capture(params: &mut UriParams, mark: usize, name: &Arc<str>, value: &str) -> bool {
    if let Some(existing) = params.get_from(mark, name) {
        return existing == value;
    }
    params.push(name.clone(), value.to_string());
    true
}

/// Values captured from a matched host or path, in match order.
#[derive(Debug, Clone, Default)]
pub struct UriParams {
    entries: Vec<(Arc<str>, String)>,
}

impl UriParams {
    pub(crate) fn new() -> UriParams {
        UriParams::default()
    }

    /// The first value captured under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_from(0, name)
    }

    fn get_from(&self, start: usize, name: &str) -> Option<&str> {
        self.entries[start..]
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (&**n, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push(&mut self, name: Arc<str>, value: String) {
        self.entries.push((name, value));
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }
}
