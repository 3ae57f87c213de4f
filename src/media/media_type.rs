use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::error::MediaTypeError;

/// `*/*`
pub static ALL: Lazy<MediaType> = Lazy::new(|| MediaType::new("*", "*"));
/// `application/*`
pub static APPLICATION_ALL: Lazy<MediaType> = Lazy::new(|| MediaType::new("application", "*"));
/// `application/octet-stream`, the fallback when only wildcards were negotiated.
pub static APPLICATION_OCTET_STREAM: Lazy<MediaType> =
    Lazy::new(|| MediaType::new("application", "octet-stream"));
pub static APPLICATION_JSON: Lazy<MediaType> = Lazy::new(|| MediaType::new("application", "json"));
pub static TEXT_PLAIN: Lazy<MediaType> = Lazy::new(|| MediaType::new("text", "plain"));

/// A media type with optional parameters.
///
/// Type and subtype are lowercased on parse. Parameters keep their declared order; names are
/// lowercased, values are kept as written (quotes removed).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    main: String,
    sub: String,
    params: Vec<(String, String)>,
}

impl MediaType {
    #[must_use]
    pub fn new(main: &str, sub: &str) -> Self {
        Self {
            main: main.to_ascii_lowercase(),
            sub: sub.to_ascii_lowercase(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        self.params.retain(|(n, _)| *n != name);
        self.params.push((name, value.to_string()));
        self
    }

    /// Parses a comma separated list, rejecting the whole list on the first bad entry.
    pub fn parse_list(input: &str) -> Result<Vec<MediaType>, MediaTypeError> {
        input
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(MediaType::from_str)
            .collect()
    }

    #[must_use]
    pub fn main_type(&self) -> &str {
        &self.main
    }

    #[must_use]
    pub fn sub_type(&self) -> &str {
        &self.sub
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    #[must_use]
    pub fn without_params(&self) -> MediaType {
        MediaType::new(&self.main, &self.sub)
    }

    #[must_use]
    pub fn is_wildcard_type(&self) -> bool {
        self.main == "*"
    }

    #[must_use]
    pub fn is_wildcard_subtype(&self) -> bool {
        self.sub == "*"
    }

    /// Neither the type nor the subtype is a wildcard.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        !self.is_wildcard_type() && !self.is_wildcard_subtype()
    }

    /// 2 for `type/sub`, 1 for `type/*`, 0 for `*/*`.
    #[must_use]
    pub fn specificity(&self) -> u8 {
        if self.is_wildcard_type() {
            0
        } else if self.is_wildcard_subtype() {
            1
        } else {
            2
        }
    }

    /// True if every type matched by `other` is matched by `self` (parameters ignored).
    #[must_use]
    pub fn includes(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() {
            return true;
        }
        if self.main != other.main {
            return false;
        }
        self.is_wildcard_subtype() || self.sub == other.sub
    }

    /// True if either type includes the other.
    #[must_use]
    pub fn is_compatible(&self, other: &MediaType) -> bool {
        self.includes(other) || other.includes(self)
    }

    /// The more specific of two compatible types; `self` wins on equal specificity.
    #[must_use]
    pub fn most_specific<'a>(&'a self, other: &'a MediaType) -> &'a MediaType {
        if other.specificity() > self.specificity() {
            other
        } else {
            self
        }
    }

    /// Same type and subtype, parameters ignored.
    #[must_use]
    pub fn equals_ignoring_params(&self, other: &MediaType) -> bool {
        self.main == other.main && self.sub == other.sub
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let err = |reason| MediaTypeError {
            input: input.to_string(),
            reason,
        };
        let mut parts = input.split(';');
        let essence = parts.next().map(str::trim).unwrap_or_default();
        if essence.is_empty() {
            return Err(err("empty media type"));
        }
        // A lone `*` is commonly sent by clients and means `*/*`.
        let (main, sub) = if essence == "*" {
            ("*", "*")
        } else {
            essence.split_once('/').ok_or_else(|| err("missing '/'"))?
        };
        let (main, sub) = (main.trim(), sub.trim());
        if !is_token(main) || !is_token(sub) {
            return Err(err("type and subtype must be tokens"));
        }
        if main == "*" && sub != "*" {
            return Err(err("wildcard type requires wildcard subtype"));
        }
        let mut media = MediaType::new(main, sub);
        for param in parts {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let (name, value) = param
                .split_once('=')
                .ok_or_else(|| err("parameter without '='"))?;
            let name = name.trim();
            if !is_token(name) {
                return Err(err("parameter name must be a token"));
            }
            let value = value.trim().trim_matches('"');
            media = media.with_param(name, value);
        }
        Ok(media)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main, self.sub)?;
        for (name, value) in &self.params {
            write!(f, ";{name}={value}")?;
        }
        Ok(())
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

/// Sorts most specific first; the sort is stable so declaration order breaks ties.
pub fn sort_by_concreteness(types: &mut [MediaType]) {
    types.sort_by(|a, b| b.specificity().cmp(&a.specificity()));
}
