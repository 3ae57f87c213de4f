use std::fmt;

/// The part of a request path still to be matched.
///
/// Normalized form: no leading `/`, matrix parameters removed from every segment, and a
/// trailing `/` whenever the path is not empty. `/widgets;v=2/special` becomes
/// `widgets/special/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RemainingPath {
    path: String,
}

impl RemainingPath {
    /// Normalizes a raw (still percent-encoded) request path.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let raw = raw.split(['?', '#']).next().unwrap_or_default();
        let mut path = String::with_capacity(raw.len() + 1);
        for (i, segment) in raw.trim_start_matches('/').split('/').enumerate() {
            if i > 0 {
                path.push('/');
            }
            path.push_str(segment.split(';').next().unwrap_or_default());
        }
        if !path.is_empty() && !path.ends_with('/') {
            path.push('/');
        }
        Self { path }
    }

    /// Wraps a remainder produced by a match; already normalized.
    pub(crate) fn from_normalized(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// True if nothing but an optional `/` is left.
    #[must_use]
    pub fn is_empty_or_slash(&self) -> bool {
        self.path.is_empty() || self.path == "/"
    }
}

impl fmt::Display for RemainingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Matrix parameters of every segment of `raw`, in path order. Names and values stay encoded.
#[must_use]
pub fn matrix_params(raw: &str) -> Vec<(String, String)> {
    let raw = raw.split(['?', '#']).next().unwrap_or_default();
    raw.split('/')
        .flat_map(|segment| segment.split(';').skip(1))
        .filter(|param| !param.is_empty())
        .map(|param| match param.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (param.to_string(), String::new()),
        })
        .collect()
}
