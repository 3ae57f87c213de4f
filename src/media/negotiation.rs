//! Response media type negotiation and variant selection.

use tracing::debug;

use super::media_type::{sort_by_concreteness, MediaType, ALL, APPLICATION_ALL, APPLICATION_OCTET_STREAM};
use super::preferences::{AcceptedMediaTypes, Preferences};
use crate::error::DispatchError;

/// Charsets a finished representation may keep; anything else is relabelled UTF-8.
pub const SUPPORTED_CHARSETS: [&str; 3] = ["UTF-8", "US-ASCII", "ISO-8859-1"];

/// Chooses the response media type from the producible set `producible` and the client's
/// accepted types (best first).
///
/// 1. An empty producible set yields `application/octet-stream`.
/// 2. An empty accepted list accepts nothing; a client without preferences is passed as `*/*`.
/// 3. Producible types are ordered most concrete first.
/// 4. For every accepted type, in order, and every producible type compatible with it, the more
///    specific of the pair is collected.
/// 5. Nothing collected fails with [`DispatchError::NotAcceptable`].
/// 6. The first concrete collected type wins.
/// 7. Otherwise a collected `*/*` or `application/*` yields `application/octet-stream`.
/// 8. Otherwise [`DispatchError::NotAcceptable`].
pub fn negotiate_media_type(
    mut producible: Vec<MediaType>,
    accepted: &[MediaType],
) -> Result<MediaType, DispatchError> {
    if producible.is_empty() {
        return Ok(APPLICATION_OCTET_STREAM.clone());
    }
    sort_by_concreteness(&mut producible);

    let mut matched: Vec<&MediaType> = Vec::new();
    for acc in accepted {
        for prod in &producible {
            if acc.is_compatible(prod) {
                matched.push(prod.most_specific(acc));
            }
        }
    }
    if matched.is_empty() {
        debug!(producible = ?producible, accepted = ?accepted, "No producible type is accepted");
        return Err(DispatchError::NotAcceptable { producible });
    }
    if let Some(concrete) = matched.iter().find(|m| m.is_concrete()) {
        return Ok(concrete.without_params());
    }
    if matched
        .iter()
        .any(|m| m.equals_ignoring_params(&ALL) || m.equals_ignoring_params(&APPLICATION_ALL))
    {
        return Ok(APPLICATION_OCTET_STREAM.clone());
    }
    Err(DispatchError::NotAcceptable { producible })
}

/// Normalizes a representation charset to one of [`SUPPORTED_CHARSETS`], defaulting to UTF-8.
#[must_use]
pub fn supported_charset(charset: Option<&str>) -> &'static str {
    charset
        .and_then(|cs| {
            SUPPORTED_CHARSETS
                .iter()
                .find(|supported| supported.eq_ignore_ascii_case(cs.trim()))
                .copied()
        })
        .unwrap_or(SUPPORTED_CHARSETS[0])
}

/// One representation a resource is able to produce.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variant {
    pub media_type: Option<MediaType>,
    pub language: Option<String>,
    pub charset: Option<String>,
}

impl Variant {
    #[must_use]
    pub fn media(media_type: MediaType) -> Self {
        Self {
            media_type: Some(media_type),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_ascii_lowercase());
        self
    }

    #[must_use]
    pub fn with_charset(mut self, charset: &str) -> Self {
        self.charset = Some(charset.to_string());
        self
    }
}

/// Outcome of [`select_variant`].
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedVariant {
    pub variant: Variant,
    /// Request headers the choice depended on, for the `Vary` response header.
    pub vary: Vec<&'static str>,
}

/// Picks the variant with the highest combined quality; the first declared wins ties.
/// Variants any dimension of which the client rejects (quality 0) are never chosen.
#[must_use]
pub fn select_variant(
    variants: &[Variant],
    accepted: &AcceptedMediaTypes,
    languages: &Preferences,
    charsets: &Preferences,
) -> Option<SelectedVariant> {
    let mut best: Option<(&Variant, f32)> = None;
    for variant in variants {
        let media_q = variant
            .media_type
            .as_ref()
            .map_or(1.0, |m| accepted.quality_of(m));
        let lang_q = variant
            .language
            .as_deref()
            .map_or(1.0, |l| languages.quality_of(l));
        let charset_q = variant
            .charset
            .as_deref()
            .map_or(1.0, |c| charsets.quality_of(c));
        let score = media_q * lang_q * charset_q;
        if score > 0.0 && best.is_none_or(|(_, s)| score > s) {
            best = Some((variant, score));
        }
    }
    let (variant, _) = best?;

    let mut vary = Vec::new();
    if varies(variants, |v| v.media_type.as_ref().map(ToString::to_string)) {
        vary.push("Accept");
    }
    if varies(variants, |v| v.language.clone()) {
        vary.push("Accept-Language");
    }
    if varies(variants, |v| v.charset.clone()) {
        vary.push("Accept-Charset");
    }
    Some(SelectedVariant {
        variant: variant.clone(),
        vary,
    })
}

fn varies<K: PartialEq>(variants: &[Variant], key: impl Fn(&Variant) -> Option<K>) -> bool {
    let mut keys = variants.iter().filter_map(key);
    match keys.next() {
        Some(first) => keys.any(|k| k != first),
        None => false,
    }
}
