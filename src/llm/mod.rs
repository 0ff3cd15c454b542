mod error;
#[cfg(test)]
pub mod fake;
mod gemini;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub use error::TransportError;
pub use gemini::GeminiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "model" => Some(Role::Model),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    InlineImage { mime_type: String, data: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// Structured-output schema: a flat object of primitive fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseSchema {
    pub fields: Vec<SchemaField>,
}

impl ResponseSchema {
    pub fn required(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(SchemaField { name, kind, required: true });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(SchemaField { name, kind, required: false });
        self
    }

    /// OpenAPI-subset object schema understood by Gemini.
    pub fn to_json(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for f in &self.fields {
            let ty = match f.kind {
                FieldKind::String => "STRING",
                FieldKind::Number => "NUMBER",
                FieldKind::Boolean => "BOOLEAN",
            };
            properties.insert(f.name.to_string(), json!({ "type": ty }));
            if f.required {
                required.push(json!(f.name));
            }
        }
        json!({
            "type": "OBJECT",
            "properties": properties,
            "required": required,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub system_instruction: String,
    pub history: Vec<Turn>,
    pub parts: Vec<Part>,
    pub schema: Option<ResponseSchema>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    /// Concatenated candidate text; `None` when the model returned nothing
    /// (blocked prompt, empty candidate).
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Black-box generation capability used by the coaching pipeline.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, TransportError>;

    async fn generate_image(&self, prompt: &str) -> Result<InlineImage, TransportError>;
}

/// Returns what sits between the first opening code fence and the last
/// closing one. Text without a fence is only trimmed.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let rest = &trimmed[open + 3..];
    // Skip an optional language tag on the opening fence line.
    let body = match rest.find('\n') {
        Some(idx) if rest[..idx].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            &rest[idx + 1..]
        }
        _ => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    match body.rfind("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_code_fences_handles_tagged_and_bare_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```  "), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fences("```{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn strip_code_fences_ignores_text_around_the_block() {
        assert_eq!(
            strip_code_fences("Here you go:\n```json{\"a\":1}```"),
            "{\"a\":1}"
        );
        assert_eq!(
            strip_code_fences("Sure!\n```json\n{\"a\":\n1}\n```\nEnjoy your meal."),
            "{\"a\":\n1}"
        );
        assert_eq!(strip_code_fences("```json\n{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn schema_lists_required_fields_only() {
        let schema = ResponseSchema::default()
            .required("name", FieldKind::String)
            .optional("calories", FieldKind::Number);
        let v = schema.to_json();
        assert_eq!(v["type"], "OBJECT");
        assert_eq!(v["properties"]["calories"]["type"], "NUMBER");
        assert_eq!(v["required"], json!(["name"]));
    }

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!(Role::parse(Role::Model.as_str()), Some(Role::Model));
        assert_eq!(Role::parse("assistant"), None);
    }
}
