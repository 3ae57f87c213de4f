//! # Media Module
//!
//! Media types, client preferences (`Accept`, `Accept-Language`, `Accept-Charset`) and the
//! content negotiation used to pick resource methods, writers and response media types.

mod media_type;
mod negotiation;
mod preferences;

pub use media_type::{
    sort_by_concreteness, MediaType, ALL, APPLICATION_ALL, APPLICATION_JSON,
    APPLICATION_OCTET_STREAM, TEXT_PLAIN,
};
pub use negotiation::{
    negotiate_media_type, select_variant, supported_charset, SelectedVariant, Variant,
    SUPPORTED_CHARSETS,
};
pub use preferences::{AcceptedMediaTypes, Preference, Preferences};
