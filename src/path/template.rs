use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use regex::Regex;
use smallvec::SmallVec;

use super::remaining::RemainingPath;
use crate::error::TemplateError;

/// Maximum number of path variables before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated `(name, value)` storage for path variables.
///
/// Names are `Arc<str>` shared with the compiled template; values are the raw (still
/// percent-encoded) text from the request path.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Regex for a variable without an explicit pattern: one segment, matched lazily.
pub const DEFAULT_VARIABLE_REGEX: &str = "[^/]+?";

const REST_GROUP: &str = "rest";

/// A compiled path template.
///
/// Templates consist of literal text and `{name}` / `{name: regex}` variables. The leading
/// `/` is ignored. Matching is anchored at the start of a [`RemainingPath`] and always ends on
/// a segment boundary; whatever follows is returned as the remainder.
#[derive(Debug, Clone)]
pub struct PathExpression {
    template: String,
    normalized: String,
    /// `None` for the empty expression, which matches everything and consumes nothing.
    regex: Option<Regex>,
    var_names: Vec<Arc<str>>,
    group_names: Vec<String>,
    literal_chars: usize,
    non_default_groups: usize,
    empty_or_slash: bool,
}

/// Outcome of a successful [`PathExpression::match_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// The consumed part of the path, without trailing `/`.
    pub matched: String,
    /// Variable bindings in template order.
    pub variables: ParamVec,
    /// What is left for sub-resources.
    pub remainder: RemainingPath,
}

impl PathExpression {
    /// Compiles `template`.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] for an unclosed or empty variable, a `{` inside a variable,
    /// a stray `}`, matrix parameters (`;`) or a variable regex that does not compile.
    pub fn compile(template: &str) -> Result<Self, TemplateError> {
        let body = template.strip_prefix('/').unwrap_or(template);
        let offset = template.len() - body.len();
        let mut pattern = String::with_capacity(body.len() * 2 + 16);
        let mut var_names = Vec::new();
        let mut group_names = Vec::new();
        let mut literal_chars = 0;
        let mut non_default_groups = 0;

        let mut chars = body.char_indices();
        while let Some((pos, c)) = chars.next() {
            match c {
                '{' => {
                    let mut var = String::new();
                    let mut closed = false;
                    for (inner_pos, inner) in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => {
                                return Err(TemplateError::NestedBrace {
                                    template: template.to_string(),
                                    position: offset + inner_pos,
                                })
                            }
                            other => var.push(other),
                        }
                    }
                    if !closed {
                        return Err(TemplateError::UnclosedVariable {
                            template: template.to_string(),
                            position: offset + pos,
                        });
                    }
                    let (name, regex) = match var.split_once(':') {
                        Some((name, regex)) => (name.trim(), regex.trim()),
                        None => (var.trim(), ""),
                    };
                    if name.is_empty() {
                        return Err(TemplateError::EmptyVariableName {
                            template: template.to_string(),
                            position: offset + pos,
                        });
                    }
                    let regex = if regex.is_empty() {
                        DEFAULT_VARIABLE_REGEX
                    } else {
                        non_default_groups += 1;
                        regex
                    };
                    let group = format!("v{}", group_names.len());
                    pattern.push_str("(?P<");
                    pattern.push_str(&group);
                    pattern.push('>');
                    pattern.push_str(regex);
                    pattern.push(')');
                    group_names.push(group);
                    var_names.push(Arc::from(name));
                }
                '}' => {
                    return Err(TemplateError::UnexpectedCloseBrace {
                        template: template.to_string(),
                        position: offset + pos,
                    })
                }
                ';' => {
                    return Err(TemplateError::MatrixParameters {
                        template: template.to_string(),
                    })
                }
                '/' => {
                    literal_chars += 1;
                    pattern.push('/');
                }
                c if is_uri_char(c) => {
                    literal_chars += 1;
                    let mut buf = [0u8; 4];
                    pattern.push_str(&regex::escape(c.encode_utf8(&mut buf)));
                }
                c => {
                    let mut buf = [0u8; 4];
                    let encoded = urlencoding::encode(c.encode_utf8(&mut buf));
                    literal_chars += encoded.len();
                    pattern.push_str(&regex::escape(&encoded));
                }
            }
        }

        let empty_or_slash = pattern.is_empty();
        if !pattern.is_empty() && !pattern.ends_with('/') {
            pattern.push('/');
        }
        let regex = Regex::new(&format!("^{pattern}(?P<{REST_GROUP}>.*)$")).map_err(|err| {
            TemplateError::InvalidRegex {
                template: template.to_string(),
                reason: err.to_string(),
            }
        })?;

        Ok(Self {
            template: template.to_string(),
            normalized: body.trim_end_matches('/').to_string(),
            regex: Some(regex),
            var_names,
            group_names,
            literal_chars,
            non_default_groups,
            empty_or_slash,
        })
    }

    /// The expression of a method without its own path; matches anything and consumes nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            template: String::new(),
            normalized: String::new(),
            regex: None,
            var_names: Vec::new(),
            group_names: Vec::new(),
            literal_chars: 0,
            non_default_groups: 0,
            empty_or_slash: true,
        }
    }

    /// Matches at the start of `path`.
    #[must_use]
    pub fn match_path(&self, path: &RemainingPath) -> Option<MatchResult> {
        let Some(regex) = &self.regex else {
            return Some(MatchResult {
                matched: String::new(),
                variables: ParamVec::new(),
                remainder: path.clone(),
            });
        };
        let given = path.as_str();
        let caps = regex.captures(given)?;
        let rest = caps.name(REST_GROUP).map_or("", |m| m.as_str());
        let consumed = &given[..given.len() - rest.len()];
        let variables = self
            .var_names
            .iter()
            .zip(&self.group_names)
            .map(|(name, group)| {
                let value = caps.name(group).map_or("", |m| m.as_str());
                (Arc::clone(name), value.to_string())
            })
            .collect();
        Some(MatchResult {
            matched: consumed.trim_end_matches('/').to_string(),
            variables,
            remainder: RemainingPath::from_normalized(rest),
        })
    }

    /// Matches only if the whole of `path` is consumed.
    #[must_use]
    pub fn match_complete(&self, path: &RemainingPath) -> Option<MatchResult> {
        self.match_path(path)
            .filter(|result| result.remainder.is_empty_or_slash())
    }

    /// The template as written.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Template without leading or trailing `/`; the identity used for equality.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    #[must_use]
    pub fn variable_names(&self) -> &[Arc<str>] {
        &self.var_names
    }

    /// Literal characters, counting percent-encoded characters by their encoded length.
    #[must_use]
    pub fn literal_chars(&self) -> usize {
        self.literal_chars
    }

    /// One per template variable.
    #[must_use]
    pub fn capturing_groups(&self) -> usize {
        self.var_names.len()
    }

    /// Variables declared with an explicit regex.
    #[must_use]
    pub fn non_default_groups(&self) -> usize {
        self.non_default_groups
    }

    /// True for an empty or `/` template.
    #[must_use]
    pub fn is_empty_or_slash(&self) -> bool {
        self.empty_or_slash
    }
}

impl PartialEq for PathExpression {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for PathExpression {}

impl Hash for PathExpression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.normalized)
    }
}

/// Characters allowed unencoded in a path template literal.
fn is_uri_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-._~!$&'()*+,=:@%".contains(c)
}

