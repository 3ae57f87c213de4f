use http::header::{HeaderMap, HeaderName, ACCEPT, ACCEPT_CHARSET, ACCEPT_LANGUAGE};
use tracing::debug;

use super::media_type::{MediaType, ALL};

/// A client preference with its quality value in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Preference<T> {
    pub value: T,
    pub quality: f32,
}

/// Accepted media types, best first.
///
/// Entries with `q=0` are dropped but remembered as refusals. Ordering is by quality, then
/// specificity, then header order. An empty header (or no header) accepts everything; a header
/// whose every entry was refused accepts nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcceptedMediaTypes {
    entries: Vec<Preference<MediaType>>,
    refused: Vec<MediaType>,
}

impl AcceptedMediaTypes {
    /// Parses every `Accept` header value; malformed entries are skipped.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::parse_all(header_values(headers, &ACCEPT))
    }

    #[must_use]
    pub fn parse(header: &str) -> Self {
        Self::parse_all(std::iter::once(header))
    }

    fn parse_all<'a>(values: impl Iterator<Item = &'a str>) -> Self {
        let mut entries = Vec::new();
        let mut refused = Vec::new();
        for item in values.flat_map(|v| v.split(',')) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (essence, quality) = split_quality(item);
            match essence.parse::<MediaType>() {
                Ok(value) if quality > 0.0 => entries.push(Preference { value, quality }),
                Ok(value) => refused.push(value),
                Err(err) => debug!(entry = %item, error = %err, "Ignoring malformed Accept entry"),
            }
        }
        entries.sort_by(|a, b| {
            b.quality
                .total_cmp(&a.quality)
                .then_with(|| b.value.specificity().cmp(&a.value.specificity()))
        });
        Self { entries, refused }
    }

    /// Accepted types in preference order; `*/*` when the client stated nothing, empty when it
    /// refused everything it named.
    #[must_use]
    pub fn media_types(&self) -> Vec<MediaType> {
        if self.is_unconstrained() {
            vec![ALL.clone()]
        } else {
            self.entries.iter().map(|p| p.value.clone()).collect()
        }
    }

    #[must_use]
    pub fn preferences(&self) -> &[Preference<MediaType>] {
        &self.entries
    }

    /// Types named with `q=0`.
    #[must_use]
    pub fn refused(&self) -> &[MediaType] {
        &self.refused
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` when the client stated no usable preference at all.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.entries.is_empty() && self.refused.is_empty()
    }

    /// Quality the client assigns to `media`: the quality of the most specific accepted range
    /// including it, or 0.
    #[must_use]
    pub fn quality_of(&self, media: &MediaType) -> f32 {
        if self.is_unconstrained() {
            return 1.0;
        }
        self.entries
            .iter()
            .filter(|p| p.value.includes(media))
            .max_by_key(|p| p.value.specificity())
            .map_or(0.0, |p| p.quality)
    }
}

/// Language or charset preferences, best first. Tags are lowercased; `*` matches anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preferences {
    entries: Vec<Preference<String>>,
}

impl Preferences {
    #[must_use]
    pub fn languages(headers: &HeaderMap) -> Self {
        Self::parse_all(header_values(headers, &ACCEPT_LANGUAGE))
    }

    #[must_use]
    pub fn charsets(headers: &HeaderMap) -> Self {
        Self::parse_all(header_values(headers, &ACCEPT_CHARSET))
    }

    #[must_use]
    pub fn parse(header: &str) -> Self {
        Self::parse_all(std::iter::once(header))
    }

    fn parse_all<'a>(values: impl Iterator<Item = &'a str>) -> Self {
        let mut entries: Vec<Preference<String>> = values
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(split_quality)
            .filter(|(_, quality)| *quality > 0.0)
            .map(|(tag, quality)| Preference {
                value: tag.trim().to_ascii_lowercase(),
                quality,
            })
            .collect();
        entries.sort_by(|a, b| b.quality.total_cmp(&a.quality));
        Self { entries }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn preferences(&self) -> &[Preference<String>] {
        &self.entries
    }

    /// Quality for `tag`. An exact tag beats a prefix (`en` for `en-gb`), which beats `*`.
    /// Without preferences every tag is fully acceptable.
    #[must_use]
    pub fn quality_of(&self, tag: &str) -> f32 {
        if self.entries.is_empty() {
            return 1.0;
        }
        let tag = tag.to_ascii_lowercase();
        let mut best: Option<(u8, f32)> = None;
        for pref in &self.entries {
            let rank = if pref.value == tag {
                2
            } else if tag
                .strip_prefix(pref.value.as_str())
                .is_some_and(|rest| rest.starts_with('-'))
            {
                1
            } else if pref.value == "*" {
                0
            } else {
                continue;
            };
            if best.is_none_or(|(r, _)| rank > r) {
                best = Some((rank, pref.quality));
            }
        }
        best.map_or(0.0, |(_, q)| q)
    }
}

fn header_values<'a>(headers: &'a HeaderMap, name: &HeaderName) -> impl Iterator<Item = &'a str> {
    headers
        .get_all(name)
        .into_iter()
        .filter_map(|v| v.to_str().ok())
}

/// Splits `essence;q=0.5;ext` into the essence (other parameters kept) and its quality.
/// Parameters after `q` are accept-extensions and are dropped.
fn split_quality(item: &str) -> (String, f32) {
    let mut essence = String::new();
    let mut quality = 1.0;
    for (i, part) in item.split(';').enumerate() {
        let part = part.trim();
        if i > 0 {
            if let Some(q) = part.strip_prefix("q=").or_else(|| part.strip_prefix("Q=")) {
                quality = q.trim().parse::<f32>().map_or(1.0, |q| q.clamp(0.0, 1.0));
                break;
            }
            essence.push(';');
        }
        essence.push_str(part);
    }
    (essence, quality)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_sorted_by_quality_then_specificity() {
        let accepted = AcceptedMediaTypes::parse("text/*;q=0.5, */*;q=0.1, text/html, application/json;q=0.5");
        let names: Vec<_> = accepted.media_types().iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec!["text/html", "application/json", "text/*", "*/*"]
        );
    }

    #[test]
    fn test_accept_drops_zero_quality_and_garbage() {
        let accepted = AcceptedMediaTypes::parse("text/plain;q=0, nonsense, application/xml");
        let names: Vec<_> = accepted.media_types().iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["application/xml"]);
        assert_eq!(accepted.refused(), &["text/plain".parse::<MediaType>().expect("media type")]);
    }

    #[test]
    fn test_all_refused_accepts_nothing() {
        let accepted = AcceptedMediaTypes::parse("text/plain;q=0");
        assert!(accepted.is_empty());
        assert!(!accepted.is_unconstrained());
        assert!(accepted.media_types().is_empty());
        for media in ["text/plain", "application/json"] {
            let media: MediaType = media.parse().expect("media type");
            assert!(accepted.quality_of(&media).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_empty_accept_is_wildcard() {
        let accepted = AcceptedMediaTypes::from_headers(&HeaderMap::new());
        assert!(accepted.is_unconstrained());
        assert_eq!(accepted.media_types(), vec![ALL.clone()]);
    }

    #[test]
    fn test_media_params_survive_quality_split() {
        let accepted = AcceptedMediaTypes::parse("text/plain;charset=utf-8;q=0.3");
        let prefs = accepted.preferences();
        assert_eq!(prefs[0].value.charset(), Some("utf-8"));
        assert!((prefs[0].quality - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_language_quality() {
        let langs = Preferences::parse("en-gb, en;q=0.8, *;q=0.1");
        assert!((langs.quality_of("en-GB") - 1.0).abs() < f32::EPSILON);
        assert!((langs.quality_of("en-us") - 0.8).abs() < f32::EPSILON);
        assert!((langs.quality_of("de") - 0.1).abs() < f32::EPSILON);
        assert!((Preferences::default().quality_of("de") - 1.0).abs() < f32::EPSILON);
    }
}
