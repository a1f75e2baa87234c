// Route compilation: controller and route metadata into request handlers

use crate::container::Container;
use crate::logging::{debug, error, warn};
use crate::registry::{ClassKind, DecodeFn, RouteMetadata};
use crate::{
    ApiVersion, Context, HttpError, HttpMethod, HttpRequest, HttpResponse, PathParams,
    RegistrationKey, Registry, Reply, Result, RouterError,
};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A decoded request body, erased to its input type.
pub type Body = Box<dyn Any + Send>;

/// Future returned by a bound route method.
pub type RouteFuture = BoxFuture<'static, Result<Reply, HttpError>>;

/// A compiled request handler, as registered with a driver.
pub type RouteHandler = Arc<dyn Fn(Context, PathParams) -> BoxFuture<'static, HttpResponse> + Send + Sync>;

/// A route method bound to its controller instance.
#[derive(Clone)]
pub struct BoundMethod {
    name: &'static str,
    f: Arc<dyn Fn(Context, PathParams, Option<Body>) -> RouteFuture + Send + Sync>,
}

impl BoundMethod {
    pub fn new<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(Context, PathParams, Option<Body>) -> RouteFuture + Send + Sync + 'static,
    {
        Self { name, f: Arc::new(f) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn call(&self, ctx: Context, params: PathParams, body: Option<Body>) -> RouteFuture {
        (self.f)(ctx, params, body)
    }
}

impl fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMethod").field("name", &self.name).finish()
    }
}

/// A final route: method, fully joined path and compiled handler.
#[derive(Clone)]
pub struct ControllerRoute {
    pub method: HttpMethod,
    pub path: String,
    pub handler: RouteHandler,
}

impl fmt::Debug for ControllerRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRoute")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Builds [`ControllerRoute`]s from registry metadata and container instances.
pub struct Router<'a> {
    registry: &'a Registry,
    container: &'a Container,
}

impl<'a> Router<'a> {
    pub fn new(registry: &'a Registry, container: &'a Container) -> Self {
        Self {
            registry,
            container,
        }
    }

    /// Compile every route of the controller registered under `key`, mounted
    /// under `/{version}/{controller path}`.
    pub fn build_controller_routes(
        &self,
        version: &ApiVersion,
        key: RegistrationKey,
    ) -> Result<Vec<ControllerRoute>> {
        let class = self.registry.class_registration(key)?.target().class();
        let metadata = self.registry.controller_metadata(key).ok_or(
            RouterError::MissingControllerMetadata {
                class: class.type_name(),
            },
        )?;

        let mut routes = Vec::new();
        for route in self.registry.routes_for(key) {
            let method = self.container.get_class_method(key, route.method_name)?;
            let path = join_path(&[version.as_str(), &metadata.path, &route.path]);
            let handler = self.build_route_handler(&route, method)?;

            debug!(
                method = %route.method,
                path = %path,
                controller = class.short_name(),
                handler = route.method_name,
                "Route compiled"
            );
            routes.push(ControllerRoute {
                method: route.method,
                path,
                handler,
            });
        }

        Ok(routes)
    }

    /// Wrap `method` in a handler that decodes the declared body, invokes the
    /// method and normalizes its result. Errors and panics become problem
    /// responses; they never escape the request.
    pub fn build_route_handler(&self, route: &RouteMetadata, method: BoundMethod) -> Result<RouteHandler> {
        let decoder = self.body_decoder(route)?;
        let body_type = route.body.map(|class| class.short_name());

        Ok(Arc::new(move |ctx: Context, params: PathParams| {
            let method = method.clone();
            async move {
                let body = match decode_body(decoder, body_type, ctx.request()) {
                    Ok(body) => body,
                    Err(err) => {
                        debug!(detail = %err.detail, "Request body rejected");
                        return err.into_response();
                    }
                };

                let name = method.name();
                let invocation = AssertUnwindSafe(async move { method.call(ctx, params, body).await });
                match invocation.catch_unwind().await {
                    Ok(Ok(reply)) => reply.into_response(),
                    Ok(Err(err)) => {
                        if err.is_server_error() {
                            error!(handler = name, status = err.status, detail = %err.detail, "Route method failed");
                        } else {
                            debug!(handler = name, status = err.status, detail = %err.detail, "Route method returned an error");
                        }
                        err.into_response()
                    }
                    Err(panic) => {
                        let detail = panic_message(panic.as_ref());
                        error!(handler = name, detail = %detail, "Route method panicked");
                        HttpError::internal(detail).into_response()
                    }
                }
            }
            .boxed()
        }))
    }

    fn body_decoder(&self, route: &RouteMetadata) -> Result<Option<DecodeFn>> {
        let Some(body) = route.body else {
            return Ok(None);
        };

        let not_input = || RouterError::BodyNotInputType {
            route: format!("{} {}", route.method, route.path),
            body: body.type_name(),
        };

        let key = self.registry.registration_key_of(&body).map_err(|_| not_input())?;
        let registration = self.registry.class_registration(key)?;
        if registration.kind() != ClassKind::InputType {
            return Err(not_input().into());
        }

        Ok(Some(registration.target().decoder().ok_or_else(not_input)?))
    }
}

fn decode_body(
    decoder: Option<DecodeFn>,
    body_type: Option<&'static str>,
    request: &HttpRequest,
) -> Result<Option<Body>, HttpError> {
    let Some(decode) = decoder else {
        return Ok(None);
    };
    if request.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    decode(&request.body).map(Some).map_err(|err| {
        warn!(error = %err, "Failed to decode request body");
        HttpError::bad_request(format!(
            "Invalid {} body: {err}",
            body_type.unwrap_or("request")
        ))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Route method panicked".to_string()
    }
}

/// Join path pieces with single slashes: one leading slash, duplicate
/// slashes collapsed, no trailing slash (except for the root).
pub fn join_path(parts: &[&str]) -> String {
    let mut path = String::new();
    for segment in parts.iter().flat_map(|part| part.split('/')).filter(|s| !s.is_empty()) {
        path.push('/');
        path.push_str(segment);
    }

    if path.is_empty() {
        path.push('/');
    }
    path
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
}

/// A route path with `:name` or `{name}` parameter segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|segment| {
                if let Some(name) = segment.strip_prefix(':') {
                    Segment::Param(name.to_string())
                } else if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Segment::Param(name.to_string())
                } else {
                    Segment::Static(segment.to_string())
                }
            })
            .collect();

        Self {
            raw: path.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Same segments, with parameters compared by position only.
    pub fn same_shape(&self, other: &PathPattern) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Static(a), Segment::Static(b)) => a == b,
                    (Segment::Param(_), Segment::Param(_)) => true,
                    _ => false,
                })
    }

    pub fn has_params(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Param(_)))
    }

    /// Match a request path (without query string); parameter values are percent-decoded.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        let mut params = PathParams::new();

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Static(expected) if expected == part => {}
                Segment::Static(_) => return None,
                Segment::Param(name) => {
                    let value = urlencoding::decode(part)
                        .map(|decoded| decoded.into_owned())
                        .unwrap_or_else(|_| part.to_string());
                    params.insert(name.clone(), value);
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(&["v1", "/messages", "/"]), "/v1/messages");
        assert_eq!(join_path(&["v1", "messages/", "/:id"]), "/v1/messages/:id");
        assert_eq!(join_path(&["/v1/", "//messages//", "//latest"]), "/v1/messages/latest");
        assert_eq!(join_path(&["v1", "", "health"]), "/v1/health");
        assert_eq!(join_path(&["", "", ""]), "/");
    }

    #[test]
    fn test_match_static() {
        let pattern = PathPattern::parse("/v1/messages");
        assert_eq!(pattern.matches("/v1/messages"), Some(PathParams::new()));
        assert_eq!(pattern.matches("/v1/messages/"), Some(PathParams::new()));
        assert!(pattern.matches("/v1/message").is_none());
        assert!(pattern.matches("/v1/messages/1").is_none());
        assert!(pattern.matches("/v1").is_none());
    }

    #[test]
    fn test_match_params() {
        let colon = PathPattern::parse("/v1/users/:user_id/posts/:post_id");
        let params = colon.matches("/v1/users/123/posts/456").unwrap();
        assert_eq!(params.get("user_id"), Some("123"));
        assert_eq!(params.get("post_id"), Some("456"));

        let braces = PathPattern::parse("/v1/messages/{id}");
        assert!(braces.has_params());
        assert_eq!(braces.matches("/v1/messages/7").unwrap().get("id"), Some("7"));
    }

    #[test]
    fn test_match_decodes_params() {
        let pattern = PathPattern::parse("/v1/tags/:name");
        let params = pattern.matches("/v1/tags/hello%20world").unwrap();
        assert_eq!(params.get("name"), Some("hello world"));
    }

    #[test]
    fn test_same_shape() {
        let colon = PathPattern::parse("/v1/m/:id");
        assert!(colon.same_shape(&PathPattern::parse("/v1/m/{id}")));
        assert!(colon.same_shape(&PathPattern::parse("v1//m/{key}/")));
        assert!(!colon.same_shape(&PathPattern::parse("/v1/m/latest")));
        assert!(!colon.same_shape(&PathPattern::parse("/v1/m/:id/edit")));
    }

    #[test]
    fn test_root_pattern() {
        let pattern = PathPattern::parse("/");
        assert!(pattern.matches("/").is_some());
        assert!(pattern.matches("/x").is_none());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("kaboom");
        assert_eq!(panic_message(payload.as_ref()), "kaboom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom twice"));
        assert_eq!(panic_message(payload.as_ref()), "kaboom twice");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "Route method panicked");
    }
}
