// Per-request context and path parameters

use crate::{HttpError, HttpRequest};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::Span;
use uuid::Uuid;

/// Per-request context passed to every route method.
///
/// Carries the raw request and a `request` span acting as the request's
/// scoped logger: events emitted while the route method runs are recorded
/// under it.
#[derive(Clone, Debug)]
pub struct Context {
    request: Arc<HttpRequest>,
    request_id: Uuid,
    span: Span,
}

impl Context {
    pub fn new(request: HttpRequest) -> Self {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
        );

        Self {
            request: Arc::new(request),
            request_id,
            span,
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.request.query(name)
    }
}

/// Parameters captured from `:name` / `{name}` path segments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathParams(HashMap<String, String>);

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Parse a parameter; missing or unparsable values are a 400.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T, HttpError> {
        let raw = self
            .get(name)
            .ok_or_else(|| HttpError::bad_request(format!("Missing path parameter: {name}")))?;
        raw.parse()
            .map_err(|_| HttpError::bad_request(format!("Invalid path parameter {name}: {raw}")))
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, String>> for PathParams {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}
