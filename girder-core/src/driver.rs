//! HTTP drivers.
//!
//! A [`Driver`] owns the route table and the listening socket. Routes are
//! registered while the driver is [`DriverState::Idle`]; `listen` moves it to
//! `Listening` and returns a [`ServerHandle`]. Shutdown stops accepting new
//! connections, lets in-flight requests finish, then reports `Stopped`:
//!
//! ```text
//! Idle -> Listening -> ShuttingDown -> Stopped
//! ```

use crate::logging::{debug, error, info};
use crate::routing::{ControllerRoute, PathPattern, RouteHandler};
use crate::shutdown::shutdown_signal;
use crate::{
    ApplicationError, Context, DriverError, HttpError, HttpMethod, HttpRequest, HttpResponse,
    PathParams, Result,
};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;

/// Driver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Listening,
    ShuttingDown,
    Stopped,
}

/// Where to listen. Defaults to `0.0.0.0:8080`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListenOptions {
    pub hostname: String,
    pub port: u16,
}

impl ListenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// An HTTP server strategy.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Add a route. Only valid while idle; an exact method and path pair can
    /// be registered once.
    fn register_route(&mut self, route: ControllerRoute) -> Result<()>;

    /// Bind and start serving in the background.
    async fn listen(&mut self, options: &ListenOptions) -> Result<ServerHandle>;

    fn state(&self) -> DriverState;
}

/// Available driver strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverKind {
    /// `hyper` HTTP/1.1 over a `tokio` TCP listener.
    #[default]
    Hyper,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Hyper => "hyper",
        }
    }

    pub fn create(&self) -> Box<dyn Driver> {
        match self {
            DriverKind::Hyper => Box::new(HyperDriver::new()),
        }
    }
}

impl FromStr for DriverKind {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "hyper" => Ok(DriverKind::Hyper),
            _ => Err(ApplicationError::UnsupportedDriver(s.to_string())),
        }
    }
}

// ============================================================================
// Route table
// ============================================================================

struct RouteEntry {
    pattern: PathPattern,
    handlers: HashMap<HttpMethod, MethodRoute>,
}

// Each method keeps the pattern it was registered with so parameters are
// named the way that route spelled them.
struct MethodRoute {
    pattern: PathPattern,
    handler: RouteHandler,
}

/// Final path -> method -> handler, in registration order.
///
/// Paths that differ only in parameter names or syntax (`/m/:id`, `/m/{key}`)
/// are the same route. Lookup scans paths in insertion order and stops at the
/// first matching path. A method that path does not serve is not found, even
/// when a later path would match.
#[derive(Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, route: ControllerRoute) -> Result<(), DriverError> {
        let pattern = PathPattern::parse(&route.path);
        let index = match self
            .entries
            .iter()
            .position(|entry| entry.pattern.same_shape(&pattern))
        {
            Some(index) => index,
            None => {
                self.entries.push(RouteEntry {
                    pattern: pattern.clone(),
                    handlers: HashMap::new(),
                });
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[index];
        if entry.handlers.contains_key(&route.method) {
            return Err(DriverError::AlreadyRegistered {
                method: route.method.to_string(),
                path: route.path,
            });
        }

        entry.handlers.insert(
            route.method,
            MethodRoute {
                pattern,
                handler: route.handler,
            },
        );
        Ok(())
    }

    /// Handler and path parameters for a request, if any.
    pub fn lookup(&self, method: &str, path: &str) -> Option<(RouteHandler, PathParams)> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.pattern.matches(path).is_some())?;

        let method = HttpMethod::from_str(method)?;
        let route = entry.handlers.get(&method)?;
        let params = route.pattern.matches(path)?;
        Some((route.handler.clone(), params))
    }

    /// Route the request in `ctx`, or answer with a 404 problem response.
    pub async fn dispatch(&self, ctx: Context) -> HttpResponse {
        let request = ctx.request();
        match self.lookup(&request.method, &request.path) {
            Some((handler, params)) => handler(ctx, params).await,
            None => HttpError::not_found(format!("Route {} {} not found", request.method, request.path))
                .into_response(),
        }
    }

    /// Registered `(method, path)` pairs.
    pub fn routes(&self) -> Vec<(HttpMethod, String)> {
        let mut routes = Vec::new();
        for entry in &self.entries {
            let mut methods: Vec<_> = entry
                .handlers
                .iter()
                .map(|(method, route)| (*method, route.pattern.as_str().to_string()))
                .collect();
            methods.sort_by_key(|(method, _)| method.as_str());
            routes.extend(methods);
        }
        routes
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|entry| entry.handlers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable").field("routes", &self.routes()).finish()
    }
}

// ============================================================================
// Hyper driver
// ============================================================================

/// HTTP/1.1 driver built on `hyper`.
pub struct HyperDriver {
    routes: RouteTable,
    state: Arc<RwLock<DriverState>>,
}

impl HyperDriver {
    pub fn new() -> Self {
        Self {
            routes: RouteTable::new(),
            state: Arc::new(RwLock::new(DriverState::Idle)),
        }
    }

    fn ensure_idle(&self) -> Result<(), DriverError> {
        match *self.state.read() {
            DriverState::Idle => Ok(()),
            other => Err(DriverError::NotIdle(other)),
        }
    }
}

impl Default for HyperDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for HyperDriver {
    fn register_route(&mut self, route: ControllerRoute) -> Result<()> {
        self.ensure_idle()?;
        debug!(method = %route.method, path = %route.path, "Registering route");
        self.routes.insert(route)?;
        Ok(())
    }

    async fn listen(&mut self, options: &ListenOptions) -> Result<ServerHandle> {
        self.ensure_idle()?;

        let address = format!("{}:{}", options.hostname, options.port);
        let listener = TcpListener::bind((options.hostname.as_str(), options.port))
            .await
            .map_err(|source| DriverError::Bind {
                address: address.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;

        let table = Arc::new(std::mem::take(&mut self.routes));
        let (shutdown, signal) = watch::channel(false);
        *self.state.write() = DriverState::Listening;

        info!(addr = %addr, routes = table.len(), "Server listening");
        let task = tokio::spawn(serve(listener, table, signal, self.state.clone()));

        Ok(ServerHandle {
            addr,
            shutdown,
            task: Some(task),
            state: self.state.clone(),
        })
    }

    fn state(&self) -> DriverState {
        *self.state.read()
    }
}

async fn serve(
    listener: TcpListener,
    table: Arc<RouteTable>,
    mut signal: watch::Receiver<bool>,
    state: Arc<RwLock<DriverState>>,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            Ok(()) = signal.changed() => {
                info!(in_flight = tasks.len(), "Shutdown requested, draining connections");
                break;
            }

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        error!(error = %err, "Accept error");
                        continue;
                    }
                };

                let table = Arc::clone(&table);
                let signal = signal.clone();
                tasks.spawn(serve_connection(TokioIo::new(stream), peer, table, signal));
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    *state.write() = DriverState::ShuttingDown;
    drop(listener);

    while tasks.join_next().await.is_some() {}

    *state.write() = DriverState::Stopped;
    info!("Server stopped");
}

async fn serve_connection(
    io: TokioIo<tokio::net::TcpStream>,
    peer: SocketAddr,
    table: Arc<RouteTable>,
    mut signal: watch::Receiver<bool>,
) {
    let service = service_fn(move |req: Request<Incoming>| {
        let table = Arc::clone(&table);
        async move { Ok::<_, Infallible>(dispatch(&table, req).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    let mut draining = *signal.borrow();
    if draining {
        conn.as_mut().graceful_shutdown();
    }

    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(err) = result {
                    debug!(peer = %peer, error = %err, "Connection error");
                }
                break;
            }

            Ok(()) = signal.changed(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

async fn dispatch(table: &RouteTable, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();

    let mut request = HttpRequest::new(parts.method.as_str(), parts.uri.path());
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            request.headers.insert(name.as_str().to_string(), value.to_string());
        }
    }
    if let Some(query) = parts.uri.query() {
        request.query_params = serde_urlencoded::from_str(query).unwrap_or_default();
    }

    let response = match body.collect().await {
        Ok(collected) => {
            request.body = collected.to_bytes().to_vec();
            let ctx = Context::new(request);
            let span = ctx.span().clone();

            async move {
                let started = Instant::now();
                let response = table.dispatch(ctx).await;
                info!(
                    status = response.status,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "Request completed"
                );
                response
            }
            .instrument(span)
            .await
        }
        Err(err) => HttpError::bad_request(format!("Failed to read request body: {err}")).into_response(),
    };

    into_hyper_response(response)
}

fn into_hyper_response(response: HttpResponse) -> Response<Full<Bytes>> {
    let HttpResponse {
        status,
        headers,
        body,
    } = response;

    let mut builder = Response::builder().status(status);
    for (name, value) in &headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder.body(Full::new(Bytes::from(body))).unwrap_or_else(|err| {
        error!(error = %err, status, "Failed to build response");
        let mut fallback = Response::new(Full::new(Bytes::new()));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

// ============================================================================
// Server handle
// ============================================================================

/// A running server.
///
/// Dropping the handle leaves the server running detached; call
/// [`shutdown`](Self::shutdown) to stop it.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    state: Arc<RwLock<DriverState>>,
}

impl ServerHandle {
    /// The bound address (the real port when listening on port 0).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> DriverState {
        *self.state.read()
    }

    /// Stop accepting connections and wait for in-flight requests to drain.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.shutdown.send_replace(true);
        self.finished().await
    }

    /// Resolves once the server has stopped.
    pub async fn finished(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.await.map_err(|err| DriverError::Task(err.to_string()))?;
        }
        Ok(())
    }

    /// Serve until SIGINT or SIGTERM, then shut down gracefully.
    pub async fn run_until_signal(mut self) -> Result<()> {
        shutdown_signal().await;
        self.shutdown().await
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("addr", &self.addr)
            .field("state", &self.state())
            .finish()
    }
}
