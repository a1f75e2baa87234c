// Error types for the Girder framework
//
// Startup failures (registry, container, router, driver, application) abort
// `Application::listen`. Request-time failures are `HttpError`s and never
// leave the request that produced them.

use crate::{HttpResponse, RegistrationKey};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Failures looking up or recording class registrations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Registration not found: {0}")]
    NotFound(String),

    #[error("Class {class} is already registered as {key}")]
    AlreadyRegistered {
        class: &'static str,
        key: RegistrationKey,
    },
}

/// Dependency-resolution and instantiation failures.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Class {class} does not declare a registration method")]
    MissingRegistrationMethod { class: &'static str },

    #[error("{class}: unsupported parameter definition at position {position}")]
    UnsupportedParameter { class: &'static str, position: usize },

    #[error("{class}: dependency {dependency} at position {position} is not registered")]
    UnresolvedDependency {
        class: &'static str,
        dependency: &'static str,
        position: usize,
    },

    #[error("Registration method of {class} failed: {source}")]
    RegistrationFailed {
        class: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to construct {class}: {source}")]
    ConstructionFailed {
        class: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<&'static str> },

    #[error("Class {0} is not bound in the container")]
    NotBound(String),

    #[error("{class}: missing constructor argument at position {position}")]
    MissingDependency { class: &'static str, position: usize },

    #[error("{class}: constructor argument at position {position} is not a {expected}")]
    DependencyMismatch {
        class: &'static str,
        position: usize,
        expected: &'static str,
    },

    #[error("{class}.{method} is not a route method")]
    MethodNotFound { class: &'static str, method: String },

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// Route and controller metadata inconsistencies.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Class {class} has routes but no controller metadata; register it as a controller or service")]
    MissingControllerMetadata { class: &'static str },

    #[error("Route {route} declares body type {body}, which is not registered as an input type")]
    BodyNotInputType { route: String, body: &'static str },

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

/// Route-table and listener failures.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Route {method} {path} already registered")]
    AlreadyRegistered { method: String, path: String },

    #[error("Driver is {0:?}; routes can only be registered and served from the idle state")]
    NotIdle(crate::DriverState),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server task failed: {0}")]
    Task(String),
}

/// Application configuration failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("Invalid API version {0:?}; expected v<N>, v<N>alpha<N> or v<N>beta<N>")]
    InvalidVersion(String),
}

/// Umbrella error for every fallible framework operation.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Application(#[from] ApplicationError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for an `Internal` error, mostly useful in `Injectable::construct`.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ============================================================================
// Request-time errors
// ============================================================================

/// A request-time error carrying an HTTP status.
///
/// Rendered as an RFC 9457 problem document:
///
/// ```json
/// {"status":404,"title":"Not Found","detail":"Route GET /v1/unknown not found"}
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{title}: {detail}")]
pub struct HttpError {
    pub status: u16,
    pub title: String,
    pub detail: String,
}

impl HttpError {
    /// Build an error for `status`; the title is the status' reason phrase.
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        let title = StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("Error")
            .to_string();

        Self {
            status,
            title,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(400, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(404, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(500, detail)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Render as an `application/problem+json` response.
    pub fn into_response(self) -> HttpResponse {
        HttpResponse::problem(&self)
    }
}

impl From<Error> for HttpError {
    fn from(err: Error) -> Self {
        match err {
            Error::Http(http) => http,
            other => HttpError::internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::internal(err.to_string())
    }
}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        HttpError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_titles() {
        assert_eq!(HttpError::not_found("x").title, "Not Found");
        assert_eq!(HttpError::bad_request("x").title, "Bad Request");
        assert_eq!(HttpError::internal("x").title, "Internal Server Error");
        assert_eq!(HttpError::new(799, "x").title, "Error");
    }

    #[test]
    fn test_http_error_classes() {
        assert!(HttpError::not_found("x").is_client_error());
        assert!(!HttpError::not_found("x").is_server_error());
        assert!(HttpError::internal("x").is_server_error());
    }

    #[test]
    fn test_unsupported_parameter_message() {
        let err = ContainerError::UnsupportedParameter {
            class: "MessagesController",
            position: 1,
        };
        assert_eq!(
            err.to_string(),
            "MessagesController: unsupported parameter definition at position 1"
        );
    }

    #[test]
    fn test_cycle_message() {
        let err = ContainerError::DependencyCycle {
            cycle: vec!["A", "B", "A"],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: A -> B -> A");
    }

    #[test]
    fn test_framework_error_into_http_error() {
        let err: HttpError = Error::internal("kaboom").into();
        assert_eq!(err.status, 500);
        assert_eq!(err.detail, "kaboom");

        let err: HttpError = Error::Http(HttpError::not_found("gone")).into();
        assert_eq!(err.status, 404);
    }
}
