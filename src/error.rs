//! # Error Module
//!
//! Error taxonomy for registration and dispatch.
//!
//! Three families of errors exist:
//!
//! - [`ModelError`] / [`TemplateError`] - raised while building resource classes and providers,
//!   i.e. before any request is dispatched
//! - [`DispatchError`] - the matching, negotiation and conversion failures of a single request,
//!   each with a fixed HTTP status
//! - [`ApplicationError`] - faults raised by application code (resource factories, locators,
//!   resource methods, providers), tagged with a [`FaultClass`] so that exception mappers can be
//!   selected by walking the class hierarchy
//!
//! ## Fault classes
//!
//! Fault classes form a single-inheritance tree rooted at [`ANY`]. A class is *unchecked* if it,
//! or any of its ancestors, is declared unchecked. Unchecked faults with no mapper escape the
//! dispatcher; checked faults with no mapper become a generic 500 response.
//!
//! ```text
//! ANY
//! ├── CHECKED
//! │   ├── IO
//! │   └── RUNTIME (unchecked)
//! │       ├── INVALID_STATE
//! │       ├── INVALID_ARGUMENT
//! │       └── WEB_APPLICATION
//! └── FATAL (unchecked)
//! ```
//!
//! Applications declare their own classes as statics:
//!
//! ```rust
//! use restdispatch::error::{FaultClass, RUNTIME};
//!
//! static OUT_OF_STOCK: FaultClass = FaultClass::extends("out_of_stock", &RUNTIME);
//! assert!(OUT_OF_STOCK.is_unchecked());
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

use http::{header, HeaderValue, Method, StatusCode};
use thiserror::Error;

use crate::media::MediaType;
use crate::model::Reply;

/// Node of the fault-class hierarchy.
///
/// Identity is the address of the static, so two classes with the same name are still distinct.
#[derive(Debug)]
pub struct FaultClass {
    name: &'static str,
    parent: Option<&'static FaultClass>,
    unchecked: bool,
}

impl FaultClass {
    /// A class with no parent.
    #[must_use]
    pub const fn root(name: &'static str) -> Self {
        Self {
            name,
            parent: None,
            unchecked: false,
        }
    }

    /// A class extending `parent`; inherits the parent's checked/unchecked nature.
    #[must_use]
    pub const fn extends(name: &'static str, parent: &'static FaultClass) -> Self {
        Self {
            name,
            parent: Some(parent),
            unchecked: false,
        }
    }

    /// A class extending `parent` that is unchecked regardless of its ancestors.
    #[must_use]
    pub const fn unchecked(name: &'static str, parent: &'static FaultClass) -> Self {
        Self {
            name,
            parent: Some(parent),
            unchecked: true,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<&'static FaultClass> {
        self.parent
    }

    /// True if this class or one of its ancestors is declared unchecked.
    #[must_use]
    pub fn is_unchecked(&self) -> bool {
        self.unchecked || self.parent.is_some_and(FaultClass::is_unchecked)
    }

    /// This class followed by its ancestors, nearest first.
    pub fn lineage(&'static self) -> impl Iterator<Item = &'static FaultClass> {
        std::iter::successors(Some(self), |class| class.parent)
    }

    /// True if `self` is `other` or descends from it.
    #[must_use]
    pub fn is_a(&'static self, other: &'static FaultClass) -> bool {
        self.lineage().any(|class| class == other)
    }

    /// Stable identity key for maps.
    pub(crate) fn key(&'static self) -> usize {
        self as *const FaultClass as usize
    }
}

impl PartialEq for FaultClass {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for FaultClass {}

impl Hash for FaultClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self as *const FaultClass as usize).hash(state);
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Root of every fault class.
pub static ANY: FaultClass = FaultClass::root("any");
/// Faults that must be mapped or answered with a generic server error.
pub static CHECKED: FaultClass = FaultClass::extends("checked", &ANY);
/// Programming faults; escape the dispatcher when unmapped.
pub static RUNTIME: FaultClass = FaultClass::unchecked("runtime", &CHECKED);
/// Unrecoverable faults; escape the dispatcher when unmapped.
pub static FATAL: FaultClass = FaultClass::unchecked("fatal", &ANY);
pub static IO: FaultClass = FaultClass::extends("io", &CHECKED);
pub static INVALID_STATE: FaultClass = FaultClass::extends("invalid_state", &RUNTIME);
pub static INVALID_ARGUMENT: FaultClass = FaultClass::extends("invalid_argument", &RUNTIME);
/// Faults that already carry the reply to send.
pub static WEB_APPLICATION: FaultClass = FaultClass::extends("web_application", &RUNTIME);

/// A fault raised by application code or produced from a dispatch failure.
#[derive(Debug, Error)]
#[error("{class}: {message}")]
pub struct ApplicationError {
    class: &'static FaultClass,
    message: String,
    reply: Option<Box<Reply>>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ApplicationError {
    #[must_use]
    pub fn new(class: &'static FaultClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            reply: None,
            source: None,
        }
    }

    /// A [`WEB_APPLICATION`] fault carrying the reply that should be sent.
    #[must_use]
    pub fn web(reply: Reply) -> Self {
        let message = format!("request failed with status {}", reply.status());
        Self {
            class: &WEB_APPLICATION,
            message,
            reply: Some(Box::new(reply)),
            source: None,
        }
    }

    /// A [`WEB_APPLICATION`] fault with a bare status.
    #[must_use]
    pub fn status(status: StatusCode) -> Self {
        Self::web(Reply::new(status))
    }

    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    #[must_use]
    pub fn class(&self) -> &'static FaultClass {
        self.class
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn reply(&self) -> Option<&Reply> {
        self.reply.as_deref()
    }

    /// The carried reply, if any.
    #[must_use]
    pub fn into_reply(self) -> Option<Reply> {
        self.reply.map(|reply| *reply)
    }
}

/// Invalid path template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("no '}}' found after '{{' at position {position} of \"{template}\"")]
    UnclosedVariable { template: String, position: usize },
    #[error("empty variable name at position {position} of \"{template}\"")]
    EmptyVariableName { template: String, position: usize },
    #[error("'{{' inside a variable at position {position} of \"{template}\"")]
    NestedBrace { template: String, position: usize },
    #[error("'}}' is only allowed as end of a variable at position {position} of \"{template}\"")]
    UnexpectedCloseBrace { template: String, position: usize },
    #[error("invalid character at position {position} of \"{template}\"")]
    InvalidCharacter { template: String, position: usize },
    #[error("matrix parameters are not allowed in path template \"{template}\"")]
    MatrixParameters { template: String },
    #[error("invalid regular expression in \"{template}\": {reason}")]
    InvalidRegex { template: String, reason: String },
}

/// Invalid media type text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid media type \"{input}\": {reason}")]
pub struct MediaTypeError {
    pub input: String,
    pub reason: &'static str,
}

/// Invalid resource class or provider definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid path on {owner}: {source}")]
    InvalidPath {
        owner: String,
        #[source]
        source: TemplateError,
    },
    #[error("invalid media type on {owner}: {source}")]
    InvalidMediaType {
        owner: String,
        #[source]
        source: MediaTypeError,
    },
    #[error("{owner} has no path template and cannot be a root resource class")]
    MissingPath { owner: String },
    #[error("{owner} has no factory and cannot be instantiated as a root resource class")]
    MissingFactory { owner: String },
}

/// Failure of one dispatch phase.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no root resource class matches \"{path}\"")]
    RootResourceNotFound { path: String },
    #[error("no resource matches \"{path}\"")]
    ResourceNotFound { path: String },
    #[error("no resource method matches \"{path}\"")]
    ResourceMethodNotFound { path: String },
    #[error("method {method} is not allowed")]
    MethodNotAllowed { method: Method, allowed: Vec<Method> },
    #[error("media type {given} is not supported")]
    UnsupportedMediaType {
        given: MediaType,
        consumed: Vec<MediaType>,
    },
    #[error("no acceptable representation available")]
    NotAcceptable { producible: Vec<MediaType> },
    #[error("no message body reader for {type_name} as {media_type}")]
    NoMessageBodyReader {
        type_name: &'static str,
        media_type: MediaType,
    },
    #[error("no message body writer for {type_name}")]
    NoMessageBodyWriter {
        type_name: &'static str,
        media_type: Option<MediaType>,
    },
    #[error("sub-resource locator chain exceeded {limit} levels")]
    LocatorDepthExceeded { limit: usize },
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl DispatchError {
    /// HTTP status surfaced for this failure.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::RootResourceNotFound { .. }
            | DispatchError::ResourceNotFound { .. }
            | DispatchError::ResourceMethodNotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            DispatchError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DispatchError::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            DispatchError::NoMessageBodyReader { .. }
            | DispatchError::NoMessageBodyWriter { .. }
            | DispatchError::LocatorDepthExceeded { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::Application(err) => err
                .reply()
                .map_or(StatusCode::INTERNAL_SERVER_ERROR, Reply::status),
        }
    }

    /// Converts the failure into the fault routed through exception-mapper lookup.
    ///
    /// Matching and negotiation failures become [`WEB_APPLICATION`] faults carrying their
    /// status (and the `Allow` header for 405).
    #[must_use]
    pub fn into_application_error(self) -> ApplicationError {
        let status = self.status();
        let reply = match &self {
            DispatchError::Application(_) => None,
            DispatchError::MethodNotAllowed { allowed, .. } => {
                let reply = Reply::new(status);
                Some(match HeaderValue::from_str(&join_methods(allowed)) {
                    Ok(value) => reply.header(header::ALLOW, value),
                    Err(_) => reply,
                })
            }
            _ => Some(Reply::new(status)),
        };
        match (self, reply) {
            (DispatchError::Application(err), _) => err,
            (other, reply) => {
                let mut err = ApplicationError::web(reply.unwrap_or_else(|| Reply::new(status)));
                err.message = other.to_string();
                err
            }
        }
    }
}

/// Comma separated method list for the `Allow` header.
pub(crate) fn join_methods(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
