// Application bootstrapper
//
// `listen` runs the whole startup sequence against a fresh container and a
// fresh driver: build the container, instantiate and compile every
// registered controller per version, register the routes, bind. Any failure
// aborts startup before a single request is served.

use crate::container::Container;
use crate::driver::{DriverKind, ListenOptions, ServerHandle};
use crate::logging::{LogConfig, LogFormat, LogLevel, debug, info};
use crate::registry::{ClassRef, Registry};
use crate::routing::{ControllerRoute, Router};
use crate::{ApiVersion, Result};
use serde::Deserialize;
use tracing_appender::non_blocking::WorkerGuard;

/// Construction options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApplicationOptions {
    /// Driver strategy; `"hyper"` when unset.
    pub driver: Option<String>,
    /// Install a global log subscriber at this level.
    pub log_level: Option<LogLevel>,
    pub log_format: Option<LogFormat>,
}

impl ApplicationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = Some(format);
        self
    }
}

/// Application lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationState {
    Configured,
    Built,
    Listening,
}

/// A version prefix and the controllers mounted under it.
///
/// ```ignore
/// app.register_version(
///     VersionRegistration::new("v1")
///         .controller::<MessagesController>()
///         .controller::<HealthController>(),
/// )?;
/// ```
#[derive(Debug, Clone)]
pub struct VersionRegistration {
    version: String,
    controllers: Vec<ClassRef>,
}

impl VersionRegistration {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            controllers: Vec::new(),
        }
    }

    pub fn controller<T: 'static>(mut self) -> Self {
        self.controllers.push(ClassRef::of::<T>());
        self
    }
}

/// The main application struct
pub struct Application {
    registry: Registry,
    driver: DriverKind,
    versions: Vec<(ApiVersion, Vec<ClassRef>)>,
    state: ApplicationState,
    container: Option<Container>,
    _log_guard: Option<WorkerGuard>,
}

impl Application {
    /// Create an application over `registry`.
    ///
    /// Fails fast on an unsupported driver.
    pub fn new(registry: Registry, options: ApplicationOptions) -> Result<Self> {
        let driver: DriverKind = options.driver.as_deref().unwrap_or_default().parse()?;

        let log_guard = match options.log_level {
            Some(level) => LogConfig::new()
                .level(level)
                .format(options.log_format.unwrap_or_default())
                .init()?,
            None => None,
        };

        info!(driver = driver.as_str(), "Application configured");
        Ok(Self {
            registry,
            driver,
            versions: Vec::new(),
            state: ApplicationState::Configured,
            container: None,
            _log_guard: log_guard,
        })
    }

    /// Mount controllers under a version prefix. May be called repeatedly;
    /// controllers for an already registered version are appended.
    pub fn register_version(&mut self, registration: VersionRegistration) -> Result<&mut Self> {
        let version = ApiVersion::parse(&registration.version)?;
        debug!(
            version = %version,
            controllers = registration.controllers.len(),
            "Version registered"
        );

        match self.versions.iter_mut().find(|(existing, _)| *existing == version) {
            Some((_, controllers)) => controllers.extend(registration.controllers),
            None => self.versions.push((version, registration.controllers)),
        }
        Ok(self)
    }

    /// Build a fresh container and compile every registered controller's routes.
    pub async fn compile(&mut self) -> Result<Vec<ControllerRoute>> {
        let container = Container::new(self.registry.clone());
        container.build().await?;

        let router = Router::new(&self.registry, &container);
        let mut routes = Vec::new();
        for (version, controllers) in &self.versions {
            for class in controllers {
                let key = self.registry.registration_key_of(class)?;
                container.setup_class(key)?;
                routes.extend(router.build_controller_routes(version, key)?);
            }
        }

        self.container = Some(container);
        self.state = ApplicationState::Built;
        Ok(routes)
    }

    /// Compile, register the routes with a new driver and start serving.
    pub async fn listen(&mut self, options: ListenOptions) -> Result<ServerHandle> {
        let routes = self.compile().await?;

        let mut driver = self.driver.create();
        for route in routes {
            driver.register_route(route)?;
        }

        let handle = driver.listen(&options).await?;
        self.state = ApplicationState::Listening;
        Ok(handle)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The container from the most recent `compile`/`listen`.
    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    pub fn state(&self) -> ApplicationState {
        self.state
    }

    pub fn driver(&self) -> DriverKind {
        self.driver
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("driver", &self.driver)
            .field("versions", &self.versions.len())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApplicationError, Error};

    #[test]
    fn test_unsupported_driver_fails_fast() {
        let err = Application::new(Registry::new(), ApplicationOptions::new().driver("express"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Application(ApplicationError::UnsupportedDriver(ref d)) if d == "express"
        ));
    }

    #[test]
    fn test_log_level_initializes_logging_once() {
        let options = ApplicationOptions {
            log_level: Some(LogLevel::Warn),
            ..ApplicationOptions::new()
        };

        let first = Application::new(Registry::new(), options.clone());
        assert!(first.is_ok());

        // The global subscriber is already installed; a second init is a no-op.
        let second = Application::new(Registry::new(), options);
        assert!(second.is_ok());
        assert!(second.unwrap()._log_guard.is_none());
    }

    #[test]
    fn test_invalid_version() {
        let mut app = Application::new(Registry::new(), ApplicationOptions::new()).unwrap();
        assert_eq!(app.state(), ApplicationState::Configured);
        assert!(app.register_version(VersionRegistration::new("version1")).is_err());
        assert!(app.register_version(VersionRegistration::new("v1beta2")).is_ok());
    }

    #[test]
    fn test_options_deserialize() {
        let options: ApplicationOptions =
            serde_json::from_str(r#"{"driver":"hyper","log_level":"debug"}"#).unwrap();
        assert_eq!(options.driver.as_deref(), Some("hyper"));
        assert_eq!(options.log_level, Some(LogLevel::Debug));
        assert_eq!(options.log_format, None);
    }

    #[tokio::test]
    async fn test_unregistered_controller_aborts_compile() {
        struct Ghost;

        let mut app = Application::new(Registry::new(), ApplicationOptions::new()).unwrap();
        app.register_version(VersionRegistration::new("v1").controller::<Ghost>())
            .unwrap();

        let err = app.compile().await.unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
        assert_eq!(app.state(), ApplicationState::Configured);
    }
}
