// Girder - an annotation-driven HTTP framework for Rust
//
// Services and controllers are plain structs wired together by a dependency
// container; routes are declared with attributes on impl blocks and mounted
// under API version prefixes.

// Macro expansions refer to `::girder::...`; this makes those paths resolve
// inside this crate as well.
extern crate self as girder;

// Re-export core functionality
pub use girder_core::*;

// Re-export procedural macros
pub use girder_macros::{
    InputType, ObjectType, controller, delete, get, patch, post, put, routes, service,
};

// Re-export optional crates
#[cfg(feature = "config")]
pub use girder_config;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        ApiVersion, Application, ApplicationOptions, Container, Context, Controller, Dependencies,
        Dependency, Error, FieldType, HttpError, HttpMethod, HttpRequest, HttpResponse, InputType,
        Injectable, IntoReply, Json, ListenOptions, ObjectType, PathParams, Registry, Reply, Result, Routes,
        ServerHandle, TypeSchema, VersionRegistration, async_trait, controller, delete, get,
        patch, post, put, routes, service, shutdown_signal,
    };

    #[cfg(feature = "config")]
    pub use girder_config::{ConfigService, ServerConfig};
}
