// HTTP request and response types

use crate::{HttpError, etag::ETag};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// HTTP methods a route can be declared for.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl HttpMethod {
    /// Case-insensitive parse; `None` for methods no route can declare.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "PATCH" => Some(HttpMethod::PATCH),
            "DELETE" => Some(HttpMethod::DELETE),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::DELETE => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request wrapper
///
/// Header names are stored lowercase.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::bad_request(e.to_string()))
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }
}

/// HTTP response wrapper
///
/// Header names are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn created() -> Self {
        Self::new(201)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::ok()
            .content_type("text/plain; charset=utf-8")
            .with_body(body.into().into_bytes())
    }

    /// `200 OK`, `application/json`.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HttpError> {
        Self::ok().with_json(value)
    }

    /// RFC 9457 problem document for `error`.
    pub fn problem(error: &HttpError) -> Self {
        // HttpError serializes as {status, title, detail}; a map of strings and a u16 cannot fail.
        let body = serde_json::to_vec(error).unwrap_or_default();
        Self::new(error.status)
            .content_type("application/problem+json")
            .with_body(body)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, HttpError> {
        self.body = serde_json::to_vec(value)?;
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key.to_lowercase(), value.into());
        self
    }

    pub fn content_type(self, value: &str) -> Self {
        self.with_header("content-type", value)
    }

    /// Attach a strong ETag computed from the current body.
    pub fn with_etag(self) -> Self {
        let etag = ETag::from_bytes(&self.body);
        self.with_header("etag", etag.to_header_value())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Body as UTF-8 text (lossy).
    pub fn text_body(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// JSON response helper
///
/// Route methods return `Json(value)` to have `value` serialized as the
/// response body.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T: Serialize>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(HttpMethod::from_str("get"), Some(HttpMethod::GET));
        assert_eq!(HttpMethod::from_str("DELETE"), Some(HttpMethod::DELETE));
        assert_eq!(HttpMethod::from_str("HEAD"), None);
        assert_eq!(HttpMethod::PATCH.to_string(), "PATCH");
    }

    #[test]
    fn test_request_headers_case_insensitive() {
        let req = HttpRequest::new("GET", "/").with_header("Content-Type", "application/json");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn test_request_json() {
        #[derive(Debug, Deserialize)]
        struct Payload {
            name: String,
        }

        let req = HttpRequest::new("POST", "/").with_body(br#"{"name":"x"}"#.to_vec());
        let payload: Payload = req.json().unwrap();
        assert_eq!(payload.name, "x");

        let bad = HttpRequest::new("POST", "/").with_body(b"{".to_vec());
        assert_eq!(bad.json::<Payload>().unwrap_err().status, 400);
    }

    #[test]
    fn test_problem_response() {
        let res = HttpResponse::problem(&HttpError::not_found("Route GET /v1/unknown not found"));
        assert_eq!(res.status, 404);
        assert_eq!(res.header("Content-Type"), Some("application/problem+json"));
        assert_eq!(
            res.text_body(),
            r#"{"status":404,"title":"Not Found","detail":"Route GET /v1/unknown not found"}"#
        );
    }

    #[test]
    fn test_with_etag_is_stable() {
        let a = HttpResponse::text("hello").with_etag();
        let b = HttpResponse::text("hello").with_etag();
        let c = HttpResponse::text("world").with_etag();
        assert_eq!(a.header("etag"), b.header("etag"));
        assert_ne!(a.header("etag"), c.header("etag"));
    }
}
