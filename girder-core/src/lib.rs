// Core library for the Girder HTTP framework
// Registry, dependency container, router, driver and application runtime

pub mod application;
pub mod container;
pub mod context;
pub mod driver;
pub mod error;
pub mod etag;
pub mod http;
pub mod logging;
pub mod registry;
pub mod reply;
pub mod routing;
pub mod schema;
pub mod shutdown;
pub mod traits;
pub mod version;

pub use application::*;
pub use container::{Container, Dependencies};
pub use context::*;
pub use driver::*;
pub use error::*;
pub use self::http::*;
pub use registry::{
    ClassKind, ClassRef, ClassRegistration, ClassTarget, ControllerMetadata, Provider,
    RegistrationKey, Registry, RouteKey, RouteMetadata,
};
pub use reply::*;
pub use routing::*;
pub use schema::*;
pub use shutdown::shutdown_signal;
pub use traits::*;
pub use version::*;

pub use async_trait::async_trait;
pub use futures_util::future::BoxFuture;

/// Support code for macro expansions. Not public API.
#[doc(hidden)]
pub mod __private {
    use crate::{Body, HttpError};

    pub use futures_util::future::FutureExt;

    /// Recover the typed body the router decoded for a route.
    pub fn downcast_body<T: 'static>(body: Option<Body>) -> Result<Option<T>, HttpError> {
        match body {
            None => Ok(None),
            Some(body) => body.downcast::<T>().map(|body| Some(*body)).map_err(|_| {
                HttpError::internal(format!(
                    "Request body is not a {}",
                    std::any::type_name::<T>()
                ))
            }),
        }
    }
}
