//! Route method return values and response normalization.
//!
//! A route method returns anything implementing [`IntoReply`]. The router
//! turns the resulting [`Reply`] into an [`HttpResponse`]:
//!
//! | Return value | Response |
//! |---|---|
//! | `HttpResponse` | passed through unchanged |
//! | `String`, `&'static str` | `200`, `text/plain`, `etag` |
//! | `Json<T>`, `serde_json::Value` | `200`, `application/json`, `etag` |
//! | `()` | `204`, empty body, no `etag` |
//! | `Err(e)` | problem response for `e.into()` |

use crate::{HttpError, HttpResponse, Json};
use serde::Serialize;

/// A route method result before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A complete response, sent as-is.
    Response(HttpResponse),
    Text(String),
    /// Serialized JSON.
    Json(Vec<u8>),
    Empty,
}

impl Reply {
    /// Serialize `value` as a JSON reply.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HttpError> {
        Ok(Reply::Json(serde_json::to_vec(value)?))
    }

    /// Normalize into a response, attaching an `etag` to string and JSON bodies.
    pub fn into_response(self) -> HttpResponse {
        match self {
            Reply::Response(response) => response,
            Reply::Text(text) => HttpResponse::text(text).with_etag(),
            Reply::Json(body) => HttpResponse::ok()
                .content_type("application/json")
                .with_body(body)
                .with_etag(),
            Reply::Empty => HttpResponse::no_content(),
        }
    }
}

/// Conversion from a route method's return value.
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, HttpError>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(self)
    }
}

impl IntoReply for HttpResponse {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(Reply::Response(self))
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(Reply::Text(self))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(Reply::Text(self.to_string()))
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(Reply::Empty)
    }
}

impl IntoReply for serde_json::Value {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Reply::json(&self)
    }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Reply::json(&self.0)
    }
}

impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<HttpError>,
{
    fn into_reply(self) -> Result<Reply, HttpError> {
        self.map_err(Into::into).and_then(IntoReply::into_reply)
    }
}
