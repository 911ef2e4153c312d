//! Scanner for the URL template grammar.
//!
//! A template string is an optional `$name:` prefix followed by a body of
//! static runs and brace-delimited value slots: `{valueName}` or
//! `{valueName:regex}`. `:`, `{`, `}` and a leading `$` are
//! backslash-escaped in names and static runs. A slot's regex may contain
//! balanced `{...}`; braces inside character classes are not counted and
//! pattern characters may be escaped with `\`.

use crate::error::TemplateError;

/// An unvalidated template slice as produced by the scanner. Regex
/// sources are kept verbatim; compilation happens when the slices are
/// assembled into a `Template`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawSlice {
    Static(String),
    Slot {
        name: String,
        pattern: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawTemplate {
    pub(crate) name: Option<String>,
    pub(crate) slices: Vec<RawSlice>,
}

pub(crate) fn parse(input: &str) -> Result<RawTemplate, TemplateError> {
    if input.is_empty() {
        return Err(TemplateError::InvalidTemplate("empty template".to_string()));
    }

    let chars: Vec<char> = input.chars().collect();
    let mut pos = 0usize;

    let name = if chars[0] == '$' {
        pos += 1;
        let name = scan_name_prefix(&chars, &mut pos)?;
        Some(name)
    } else {
        None
    };

    let mut slices = Vec::new();
    let mut current_static = String::new();

    while pos < chars.len() {
        match chars[pos] {
            '\\' => {
                pos += 1;
                let Some(&escaped) = chars.get(pos) else {
                    return Err(TemplateError::InvalidTemplate(
                        "dangling escape".to_string(),
                    ));
                };
                current_static.push(escaped);
                pos += 1;
            }
            '{' => {
                if !current_static.is_empty() {
                    slices.push(RawSlice::Static(std::mem::take(&mut current_static)));
                }
                pos += 1;
                let slot = scan_slot(&chars, &mut pos)?;
                slices.push(slot);
            }
            '}' => {
                return Err(TemplateError::InvalidTemplate(
                    "unbalanced braces".to_string(),
                ));
            }
            c => {
                current_static.push(c);
                pos += 1;
            }
        }
    }

    if !current_static.is_empty() {
        slices.push(RawSlice::Static(current_static));
    }

    if slices.is_empty() {
        return Err(TemplateError::InvalidTemplate("empty template".to_string()));
    }

    Ok(RawTemplate { name, slices })
}

/// Scans the external name of a `$name:` prefix. The cursor is positioned
/// just past the `$` on entry and just past the terminating `:` on exit.
fn scan_name_prefix(chars: &[char], pos: &mut usize) -> Result<String, TemplateError> {
    let mut name = String::new();

    while *pos < chars.len() {
        match chars[*pos] {
            '\\' => {
                *pos += 1;
                let Some(&escaped) = chars.get(*pos) else {
                    return Err(TemplateError::InvalidTemplate(
                        "dangling escape in template name".to_string(),
                    ));
                };
                name.push(escaped);
                *pos += 1;
            }
            ':' => {
                *pos += 1;
                if name.is_empty() {
                    return Err(TemplateError::InvalidTemplate(
                        "empty template name".to_string(),
                    ));
                }
                return Ok(name);
            }
            '{' | '}' => {
                return Err(TemplateError::InvalidTemplate(
                    "unescaped brace in template name".to_string(),
                ));
            }
            c => {
                name.push(c);
                *pos += 1;
            }
        }
    }

    Err(TemplateError::InvalidTemplate(
        "template name is not terminated with ':'".to_string(),
    ))
}

/// Scans one `{name}` / `{name:regex}` slot. The cursor is positioned
/// just past the opening `{` on entry and just past the closing `}` on
/// exit.
fn scan_slot(chars: &[char], pos: &mut usize) -> Result<RawSlice, TemplateError> {
    let mut name = String::new();

    loop {
        let Some(&c) = chars.get(*pos) else {
            return Err(TemplateError::InvalidTemplate(
                "unbalanced braces".to_string(),
            ));
        };

        match c {
            '\\' => {
                *pos += 1;
                let Some(&escaped) = chars.get(*pos) else {
                    return Err(TemplateError::InvalidTemplate(
                        "dangling escape in value name".to_string(),
                    ));
                };
                name.push(escaped);
                *pos += 1;
            }
            '}' => {
                *pos += 1;
                if name.is_empty() {
                    return Err(TemplateError::InvalidTemplate(
                        "empty value name".to_string(),
                    ));
                }
                return Ok(RawSlice::Slot {
                    name,
                    pattern: None,
                });
            }
            ':' => {
                *pos += 1;
                if name.is_empty() {
                    return Err(TemplateError::InvalidTemplate(
                        "empty value name".to_string(),
                    ));
                }
                let pattern = scan_slot_pattern(chars, pos)?;
                return Ok(RawSlice::Slot {
                    name,
                    pattern: Some(pattern),
                });
            }
            '{' => {
                return Err(TemplateError::InvalidTemplate(
                    "unescaped brace in value name".to_string(),
                ));
            }
            c => {
                name.push(c);
                *pos += 1;
            }
        }
    }
}

/// Scans a slot's regex up to the matching `}`. Balance is tracked at
/// the template level: `{`/`}` nest unless they sit inside a character
/// class, and a backslash hides the next character from the counter.
/// The regex source is preserved verbatim, escapes included.
fn scan_slot_pattern(chars: &[char], pos: &mut usize) -> Result<String, TemplateError> {
    let mut pattern = String::new();
    let mut depth = 0usize;
    let mut in_class = false;
    let mut class_start = false;

    while *pos < chars.len() {
        let c = chars[*pos];

        if in_class {
            if c == ']' && !class_start {
                in_class = false;
            }
            class_start = false;
            pattern.push(c);
            *pos += 1;
            continue;
        }

        match c {
            '\\' => {
                pattern.push(c);
                *pos += 1;
                let Some(&escaped) = chars.get(*pos) else {
                    return Err(TemplateError::InvalidTemplate(
                        "dangling escape in pattern".to_string(),
                    ));
                };
                pattern.push(escaped);
                *pos += 1;
            }
            '[' => {
                in_class = true;
                class_start = true;
                pattern.push(c);
                *pos += 1;
                if chars.get(*pos) == Some(&'^') {
                    pattern.push('^');
                    *pos += 1;
                }
            }
            '{' => {
                depth += 1;
                pattern.push(c);
                *pos += 1;
            }
            '}' => {
                if depth == 0 {
                    *pos += 1;
                    if pattern.is_empty() {
                        return Err(TemplateError::InvalidTemplate("empty pattern".to_string()));
                    }
                    return Ok(pattern);
                }
                depth -= 1;
                pattern.push(c);
                *pos += 1;
            }
            c => {
                pattern.push(c);
                *pos += 1;
            }
        }
    }

    Err(TemplateError::InvalidTemplate(
        "unbalanced braces".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_slice(s: &str) -> RawSlice {
        RawSlice::Static(s.to_string())
    }

    fn slot(name: &str, pattern: Option<&str>) -> RawSlice {
        RawSlice::Slot {
            name: name.to_string(),
            pattern: pattern.map(|p| p.to_string()),
        }
    }

    #[test]
    fn test_static_template() {
        let raw = parse("users").unwrap();
        assert_eq!(raw.name, None);
        assert_eq!(raw.slices, vec![static_slice("users")]);
    }

    #[test]
    fn test_named_static_template() {
        let raw = parse("$users:users").unwrap();
        assert_eq!(raw.name.as_deref(), Some("users"));
        assert_eq!(raw.slices, vec![static_slice("users")]);
    }

    #[test]
    fn test_wildcard_slot() {
        let raw = parse("{rest}").unwrap();
        assert_eq!(raw.slices, vec![slot("rest", None)]);
    }

    #[test]
    fn test_pattern_slot() {
        let raw = parse("{id:\\d+}").unwrap();
        assert_eq!(raw.slices, vec![slot("id", Some("\\d+"))]);
    }

    #[test]
    fn test_mixed_slices() {
        let raw = parse("v{major:\\d+}.{minor:\\d+}").unwrap();
        assert_eq!(
            raw.slices,
            vec![
                static_slice("v"),
                slot("major", Some("\\d+")),
                static_slice("."),
                slot("minor", Some("\\d+")),
            ]
        );
    }

    #[test]
    fn test_balanced_braces_in_pattern() {
        let raw = parse("{id:\\d{3}}").unwrap();
        assert_eq!(raw.slices, vec![slot("id", Some("\\d{3}"))]);
    }

    #[test]
    fn test_braces_in_character_class() {
        let raw = parse("{odd:[{}]+}").unwrap();
        assert_eq!(raw.slices, vec![slot("odd", Some("[{}]+"))]);
    }

    #[test]
    fn test_escaped_brace_in_pattern() {
        let raw = parse("{curly:a\\{b}").unwrap();
        assert_eq!(raw.slices, vec![slot("curly", Some("a\\{b"))]);
    }

    #[test]
    fn test_escaped_dollar() {
        let raw = parse("\\$price").unwrap();
        assert_eq!(raw.name, None);
        assert_eq!(raw.slices, vec![static_slice("$price")]);
    }

    #[test]
    fn test_escaped_colon_in_name() {
        let raw = parse("$ns\\:users:users").unwrap();
        assert_eq!(raw.name.as_deref(), Some("ns:users"));
    }

    #[test]
    fn test_escaped_braces_in_static() {
        let raw = parse("a\\{b\\}c").unwrap();
        assert_eq!(raw.slices, vec![static_slice("a{b}c")]);
    }

    #[test]
    fn test_empty_template() {
        assert!(matches!(
            parse(""),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_unterminated_name() {
        assert!(matches!(
            parse("$users"),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_empty_slot_name() {
        assert!(matches!(
            parse("{}"),
            Err(TemplateError::InvalidTemplate(_))
        ));
        assert!(matches!(
            parse("{:\\d+}"),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_empty_pattern() {
        assert!(matches!(
            parse("{id:}"),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_unbalanced_braces() {
        assert!(matches!(
            parse("{id:\\d+"),
            Err(TemplateError::InvalidTemplate(_))
        ));
        assert!(matches!(
            parse("id}"),
            Err(TemplateError::InvalidTemplate(_))
        ));
        assert!(matches!(
            parse("{id"),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_named_template_with_empty_body() {
        assert!(matches!(
            parse("$name:"),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }
}
