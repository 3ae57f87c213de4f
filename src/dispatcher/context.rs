use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, Method, StatusCode};
use tracing::debug;

use super::request::Request;
use crate::error::{ApplicationError, DispatchError, INVALID_STATE};
use crate::ids::RequestId;
use crate::media::{
    select_variant, AcceptedMediaTypes, MediaType, Preferences, SelectedVariant, Variant,
    APPLICATION_OCTET_STREAM,
};
use crate::model::EntityType;
use crate::path::{matrix_params, ParamVec};
use crate::providers::Providers;

/// Decides role membership for [`CallContext::is_user_in_role`].
pub trait RoleChecker: Send + Sync {
    fn is_in_role(&self, principal: Option<&str>, role: &str) -> bool;
}

impl<F> RoleChecker for F
where
    F: Fn(Option<&str>, &str) -> bool + Send + Sync,
{
    fn is_in_role(&self, principal: Option<&str>, role: &str) -> bool {
        self(principal, role)
    }
}

/// Per-request state threaded through every dispatch phase.
///
/// Path variables accumulate while the path is consumed; once the resource method is chosen
/// the context is frozen and further variable changes are refused.
pub struct CallContext {
    request_id: RequestId,
    method: Method,
    request_path: String,
    headers: HeaderMap,
    accepted: AcceptedMediaTypes,
    languages: Preferences,
    charsets: Preferences,
    entity_media_type: Option<MediaType>,
    path_params: ParamVec,
    matrix_params: Vec<(String, String)>,
    query_params: Vec<(String, String)>,
    matched_uris: Vec<String>,
    matched_resources: Vec<String>,
    principal: Option<String>,
    role_checker: Option<Arc<dyn RoleChecker>>,
    read_only: bool,
}

impl CallContext {
    pub(crate) fn new(request: &Request, role_checker: Option<Arc<dyn RoleChecker>>) -> Self {
        let headers = request.headers().clone();
        let query_params = request
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();
        Self {
            request_id: RequestId::from_headers(&headers),
            method: request.method().clone(),
            request_path: request.path().to_string(),
            accepted: AcceptedMediaTypes::from_headers(&headers),
            languages: Preferences::languages(&headers),
            charsets: Preferences::charsets(&headers),
            entity_media_type: request.entity_media_type(),
            path_params: ParamVec::new(),
            matrix_params: matrix_params(request.path()),
            query_params,
            matched_uris: Vec::new(),
            matched_resources: Vec::new(),
            principal: request.principal_name().map(ToString::to_string),
            role_checker,
            read_only: false,
            headers,
        }
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Raw request path, matrix parameters included.
    #[must_use]
    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn accepted_media_types(&self) -> &AcceptedMediaTypes {
        &self.accepted
    }

    #[must_use]
    pub fn accepted_languages(&self) -> &Preferences {
        &self.languages
    }

    /// Declared media type of the request entity.
    #[must_use]
    pub fn entity_media_type(&self) -> Option<&MediaType> {
        self.entity_media_type.as_ref()
    }

    /// Decoded value of a path variable; the innermost binding wins when names repeat.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<String> {
        self.path_param_encoded(name).map(|v| decode(v).into_owned())
    }

    #[must_use]
    pub fn path_param_encoded(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn path_params(&self) -> &ParamVec {
        &self.path_params
    }

    /// Decoded matrix parameter from any path segment; the last occurrence wins.
    #[must_use]
    pub fn matrix_param(&self, name: &str) -> Option<String> {
        self.matrix_params
            .iter()
            .rfind(|(k, _)| decode(k) == name)
            .map(|(_, v)| decode(v).into_owned())
    }

    /// First value of a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a query parameter, in order.
    pub fn query_params<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query_params
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Merges variables from a path match.
    ///
    /// # Errors
    ///
    /// An [`INVALID_STATE`] fault once the context is frozen.
    pub fn add_path_params(&mut self, variables: &ParamVec) -> Result<(), ApplicationError> {
        if self.read_only {
            return Err(ApplicationError::new(
                &INVALID_STATE,
                "call context is read-only once the resource method is selected",
            ));
        }
        self.path_params
            .extend(variables.iter().map(|(k, v)| (Arc::clone(k), v.clone())));
        Ok(())
    }

    /// Records that `segment` was consumed by the resource `resource`.
    pub(crate) fn add_for_matched(&mut self, segment: &str, resource: &str) {
        let uri = match self.matched_uris.last() {
            Some(parent) if segment.is_empty() => parent.clone(),
            Some(parent) if !parent.is_empty() => format!("{parent}/{segment}"),
            _ => segment.to_string(),
        };
        debug!(uri = %uri, resource = %resource, "Matched resource");
        self.matched_uris.push(uri);
        self.matched_resources.push(resource.to_string());
    }

    /// Matched URIs relative to the base, most recent (longest) first.
    pub fn matched_uris(&self) -> impl Iterator<Item = &str> {
        self.matched_uris.iter().rev().map(String::as_str)
    }

    /// Names of the resource classes matched so far, most recent first.
    pub fn matched_resources(&self) -> impl Iterator<Item = &str> {
        self.matched_resources.iter().rev().map(String::as_str)
    }

    pub(crate) fn set_read_only(&mut self) {
        self.read_only = true;
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[must_use]
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    /// Asks the installed [`RoleChecker`].
    ///
    /// # Errors
    ///
    /// A 500 fault when no role checker is installed.
    pub fn is_user_in_role(&self, role: &str) -> Result<bool, ApplicationError> {
        match &self.role_checker {
            Some(checker) => Ok(checker.is_in_role(self.principal(), role)),
            None => Err(ApplicationError::status(StatusCode::INTERNAL_SERVER_ERROR)
                .with_source(std::io::Error::other("no role checker installed"))),
        }
    }

    /// Chooses among `variants` using the request's Accept, Accept-Language and
    /// Accept-Charset headers.
    #[must_use]
    pub fn select_variant(&self, variants: &[Variant]) -> Option<SelectedVariant> {
        select_variant(variants, &self.accepted, &self.languages, &self.charsets)
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("request_path", &self.request_path)
            .field("path_params", &self.path_params)
            .field("matched_uris", &self.matched_uris)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

/// What a resource method or locator receives besides its instance.
pub struct Invocation<'a> {
    context: &'a CallContext,
    providers: &'a Providers,
    body: Option<Vec<u8>>,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(context: &'a CallContext, providers: &'a Providers, body: Option<Vec<u8>>) -> Self {
        Self {
            context,
            providers,
            body,
        }
    }

    #[must_use]
    pub fn context(&self) -> &'a CallContext {
        self.context
    }

    #[must_use]
    pub fn providers(&self) -> &'a Providers {
        self.providers
    }

    /// Reads the request entity as `T` with the best reader for its `Content-Type`
    /// (`application/octet-stream` if absent). `None` if the request has no body or it was
    /// already read.
    ///
    /// # Errors
    ///
    /// A 500 fault if no reader handles `T`, or whatever the reader fails with.
    pub fn read_entity<T: Any>(&mut self) -> Result<Option<T>, ApplicationError> {
        let Some(body) = self.body.take() else {
            return Ok(None);
        };
        let ty = EntityType::of::<T>();
        let media_type = self
            .context
            .entity_media_type()
            .cloned()
            .unwrap_or_else(|| APPLICATION_OCTET_STREAM.clone());
        let Some(reader) = self.providers.best_reader(&ty, &media_type) else {
            return Err(DispatchError::NoMessageBodyReader {
                type_name: ty.name(),
                media_type,
            }
            .into_application_error());
        };
        let entity = reader.read_from(&ty, &media_type, self.context.headers(), &body)?;
        entity.downcast::<T>().map(Some).map_err(|entity| {
            ApplicationError::new(
                &INVALID_STATE,
                format!("reader produced {} instead of {}", entity.entity_type(), ty.name()),
            )
        })
    }

    /// Context object of type `C` for entities of `for_type`, from the registered resolvers.
    #[must_use]
    pub fn context_value<C: Any + Send + Sync>(&self, for_type: &EntityType) -> Option<Arc<C>> {
        self.providers.context::<C>(for_type, None)
    }
}

fn decode(value: &str) -> Cow<'_, str> {
    urlencoding::decode(value).unwrap_or(Cow::Borrowed(value))
}
