//! Type descriptors for object and input models.
//!
//! A [`TypeSchema`] is built once per type (normally by
//! `#[derive(ObjectType)]` / `#[derive(InputType)]`) and attached to the
//! type's registration. It is never mutated afterwards. Schemas describe
//! models; they do not validate them.

use serde::Serialize;
use serde_json::{Map, Value, json};

/// Which registration kind a schema describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Object,
    Input,
}

/// Primitive field categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

/// One field of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "type")]
    pub ty: FieldType,
    pub optional: bool,
}

impl FieldSchema {
    pub fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            description: "",
            ty,
            optional: false,
        }
    }

    pub fn description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }
}

/// Descriptor for an object or input model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: SchemaKind,
    pub fields: Vec<FieldSchema>,
}

impl TypeSchema {
    pub fn object(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: SchemaKind::Object,
            fields: Vec::new(),
        }
    }

    pub fn input(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: SchemaKind::Input,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Render as a JSON-Schema-shaped object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let mut property = Map::new();
            property.insert("type".into(), Value::from(field.ty.as_str()));
            if !field.description.is_empty() {
                property.insert("description".into(), Value::from(field.description));
            }
            properties.insert(field.name.to_string(), Value::Object(property));

            if !field.optional {
                required.push(Value::from(field.name));
            }
        }

        json!({
            "title": self.name,
            "description": self.description,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_schema() -> TypeSchema {
        TypeSchema::input("CreateMessage", "Payload for a new message")
            .field(FieldSchema::new("content", FieldType::String).description("Message text"))
            .field(FieldSchema::new("priority", FieldType::Integer).optional(true))
    }

    #[test]
    fn test_builder() {
        let schema = message_schema();
        assert_eq!(schema.kind, SchemaKind::Input);
        assert_eq!(schema.fields.len(), 2);
        assert_eq!(schema.get_field("content").unwrap().description, "Message text");
        assert!(schema.get_field("missing").is_none());
    }

    #[test]
    fn test_json_schema() {
        let value = message_schema().to_json_schema();
        assert_eq!(value["title"], "CreateMessage");
        assert_eq!(value["properties"]["content"]["type"], "string");
        assert_eq!(value["properties"]["priority"]["type"], "integer");
        assert_eq!(value["required"], json!(["content"]));
    }
}
