//! A small messages API.
//!
//! ```sh
//! GIRDER_PORT=3000 GIRDER_LOG_LEVEL=debug GIRDER_LOG_FORMAT=pretty \
//!     cargo run --example messages
//! curl localhost:3000/v1/messages
//! curl -X POST localhost:3000/v1/messages -d '{"content":"hi"}'
//! ```

use girder::logging::info;
use girder::prelude::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, ObjectType)]
#[object_type(description = "A chat message")]
struct Message {
    #[field(description = "Message identifier")]
    id: String,
    #[field(description = "Message text")]
    content: String,
}

#[derive(Debug, Deserialize, InputType)]
#[input_type(description = "Payload for a new message")]
struct CreateMessage {
    #[field(description = "Message text")]
    content: String,
}

#[service]
struct MessageStore {
    messages: RwLock<Vec<Message>>,
}

impl MessageStore {
    fn add(&self, content: String) -> Message {
        let mut messages = self.messages.write();
        let message = Message {
            id: (messages.len() + 1).to_string(),
            content,
        };
        messages.push(message.clone());
        message
    }
}

#[controller("/messages")]
struct MessagesController {
    store: Arc<MessageStore>,
    config: Arc<ConfigService>,
}

#[routes]
impl MessagesController {
    #[get]
    async fn list(&self) -> Json<Vec<Message>> {
        Json(self.store.messages.read().clone())
    }

    #[post(body = CreateMessage)]
    async fn create(
        &self,
        ctx: Context,
        _params: PathParams,
        body: Option<CreateMessage>,
    ) -> Result<Json<Message>, HttpError> {
        let body = body.ok_or_else(|| HttpError::bad_request("Missing message body"))?;

        let max_len: usize = self
            .config
            .manager()
            .get_parsed("max_message_length")
            .unwrap_or(280);
        if body.content.chars().count() > max_len {
            return Err(HttpError::bad_request(format!(
                "Messages are limited to {max_len} characters"
            )));
        }

        let message = self.store.add(body.content);
        ctx.span().in_scope(|| info!(id = %message.id, "Message created"));
        Ok(Json(message))
    }

    #[get("/:id")]
    fn show(&self, _ctx: Context, params: PathParams) -> Result<Json<Message>, HttpError> {
        let id = params.get("id").unwrap_or_default();
        self.store
            .messages
            .read()
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .map(Json)
            .ok_or_else(|| HttpError::not_found(format!("Message {id} not found")))
    }
}

#[tokio::main]
async fn main() -> girder::Result<()> {
    let config = ServerConfig::load(None)?;

    let registry = Registry::new();
    registry.register_service::<ConfigService>()?;
    registry.register_service::<MessageStore>()?;
    registry.register_object_type::<Message>()?;
    registry.register_input_type::<CreateMessage>()?;
    registry.register_controller::<MessagesController>()?;

    let options = ApplicationOptions {
        log_level: config.log_level.or(Some(girder::logging::LogLevel::Info)),
        ..config.application_options()
    };

    let mut app = Application::new(registry, options)?;
    app.register_version(VersionRegistration::new("v1").controller::<MessagesController>())?;

    for schema in app.registry().schemas() {
        info!(schema = %schema.to_json_schema(), "Model {}", schema.name);
    }

    let handle = app.listen(config.listen_options()).await?;
    info!(addr = %handle.addr(), "Try: curl http://{}/v1/messages", handle.addr());
    handle.run_until_signal().await
}
