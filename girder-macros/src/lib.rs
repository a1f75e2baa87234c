// Procedural macros for the Girder HTTP framework
// Attribute syntax for services, controllers and routes, plus schema derives

use proc_macro::TokenStream;

mod injectable;
mod route_validation;
mod routes;
mod schema;

/// Marks a struct as an injectable service.
///
/// `Arc<T>` fields are constructor dependencies resolved from the container;
/// every other field (and any field marked `#[inject(default)]`) starts from
/// `Default::default()`.
///
/// ```ignore
/// #[service]
/// struct MessageStore {
///     messages: parking_lot::RwLock<Vec<Message>>,
/// }
/// ```
#[proc_macro_attribute]
pub fn service(attr: TokenStream, item: TokenStream) -> TokenStream {
    injectable::service_impl(attr, item)
}

/// Marks a struct as a controller with a base path.
///
/// ```ignore
/// #[controller("/messages")]
/// struct MessagesController {
///     store: Arc<MessageStore>,
/// }
/// ```
#[proc_macro_attribute]
pub fn controller(attr: TokenStream, item: TokenStream) -> TokenStream {
    injectable::controller_impl(attr, item)
}

/// Collects the route methods of an impl block.
///
/// Methods carrying `#[get]`, `#[post]`, `#[put]`, `#[patch]` or `#[delete]`
/// become routes. A route method takes `&self` followed by up to three
/// parameters, in order: the request `Context`, the `PathParams` and the
/// decoded `Option<Body>`. It may be `async` and returns anything that
/// implements `IntoReply`.
///
/// ```ignore
/// #[routes]
/// impl MessagesController {
///     #[get]
///     async fn list(&self) -> Json<Vec<Message>> { ... }
///
///     #[post(body = CreateMessage)]
///     async fn create(
///         &self,
///         _ctx: Context,
///         _params: PathParams,
///         body: Option<CreateMessage>,
///     ) -> Result<Json<Message>, HttpError> { ... }
///
///     #[get("/:id")]
///     fn show(&self, _ctx: Context, params: PathParams) -> Result<Json<Message>, HttpError> { ... }
/// }
/// ```
#[proc_macro_attribute]
pub fn routes(attr: TokenStream, item: TokenStream) -> TokenStream {
    routes::routes_impl(attr, item)
}

/// HTTP GET route
#[proc_macro_attribute]
pub fn get(attr: TokenStream, item: TokenStream) -> TokenStream {
    routes::detached_route(attr, item, "get")
}

/// HTTP POST route
#[proc_macro_attribute]
pub fn post(attr: TokenStream, item: TokenStream) -> TokenStream {
    routes::detached_route(attr, item, "post")
}

/// HTTP PUT route
#[proc_macro_attribute]
pub fn put(attr: TokenStream, item: TokenStream) -> TokenStream {
    routes::detached_route(attr, item, "put")
}

/// HTTP PATCH route
#[proc_macro_attribute]
pub fn patch(attr: TokenStream, item: TokenStream) -> TokenStream {
    routes::detached_route(attr, item, "patch")
}

/// HTTP DELETE route
#[proc_macro_attribute]
pub fn delete(attr: TokenStream, item: TokenStream) -> TokenStream {
    routes::detached_route(attr, item, "delete")
}

/// Derives `ObjectType` for an output model.
///
/// ```ignore
/// #[derive(Serialize, ObjectType)]
/// #[object_type(description = "A chat message")]
/// struct Message {
///     #[field(description = "Message identifier")]
///     id: String,
///     content: String,
/// }
/// ```
#[proc_macro_derive(ObjectType, attributes(object_type, field))]
pub fn object_type_derive(input: TokenStream) -> TokenStream {
    schema::derive_schema(input, schema::ModelKind::Object)
}

/// Derives `InputType` for a request-body model. The type must also
/// implement `Deserialize`.
#[proc_macro_derive(InputType, attributes(input_type, field))]
pub fn input_type_derive(input: TokenStream) -> TokenStream {
    schema::derive_schema(input, schema::ModelKind::Input)
}
