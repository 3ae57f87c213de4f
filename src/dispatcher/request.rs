use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tracing::debug;

use crate::media::MediaType;

/// An inbound request as seen by the dispatcher.
///
/// `path` is the raw, still percent-encoded path and may carry matrix parameters.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    principal: Option<String>,
}

impl Request {
    /// A request for `uri` (path plus optional `?query`).
    #[must_use]
    pub fn new(method: Method, uri: &str) -> Self {
        let uri = uri.split('#').next().unwrap_or_default();
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (uri, None),
        };
        Self {
            method,
            path: path.to_string(),
            query,
            headers: HeaderMap::new(),
            body: None,
            principal: None,
        }
    }

    #[must_use]
    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    #[must_use]
    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    #[must_use]
    pub fn put(uri: &str) -> Self {
        Self::new(Method::PUT, uri)
    }

    #[must_use]
    pub fn delete(uri: &str) -> Self {
        Self::new(Method::DELETE, uri)
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Adds a header from text; values that are not valid header text are dropped.
    #[must_use]
    pub fn header_str(self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => self.header(name, value),
            Err(err) => {
                debug!(header = %name, error = %err, "Dropping invalid header value");
                self
            }
        }
    }

    #[must_use]
    pub fn accept(self, value: &str) -> Self {
        self.header_str(header::ACCEPT, value)
    }

    #[must_use]
    pub fn content_type(self, value: &str) -> Self {
        self.header_str(header::CONTENT_TYPE, value)
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Authenticated user name, as established by the connector.
    #[must_use]
    pub fn principal(mut self, name: &str) -> Self {
        self.principal = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn principal_name(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    /// Declared media type of the entity.
    ///
    /// `None` without a body, or when `Content-Type` is missing or unparseable.
    #[must_use]
    pub fn entity_media_type(&self) -> Option<MediaType> {
        self.body.as_ref()?;
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    pub(crate) fn take_body(&mut self) -> Option<Vec<u8>> {
        self.body.take()
    }
}

impl From<http::Request<Vec<u8>>> for Request {
    fn from(request: http::Request<Vec<u8>>) -> Self {
        let (parts, body) = request.into_parts();
        let mut converted = Request::new(parts.method, &parts.uri.to_string());
        if let Some(path_and_query) = parts.uri.path_and_query() {
            converted.path = path_and_query.path().to_string();
            converted.query = path_and_query.query().map(ToString::to_string);
        }
        converted.headers = parts.headers;
        if !body.is_empty() {
            converted.body = Some(body);
        }
        converted
    }
}

/// The answer to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parsed `Content-Type`.
    #[must_use]
    pub fn content_type(&self) -> Option<MediaType> {
        self.header(&header::CONTENT_TYPE)
            .and_then(|v| v.parse().ok())
    }

    /// Methods listed in `Allow`.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        self.header(&header::ALLOW)
            .map(|allow| {
                allow
                    .split(',')
                    .filter_map(|m| m.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Body as UTF-8 text, if it is.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    #[must_use]
    pub fn into_http(self) -> http::Response<Vec<u8>> {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
