use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::{
    GenerateRequest, GenerateResponse, GenerationClient, InlineImage, Part, TransportError,
};
use crate::config::GeminiConfig;

/// `generateContent` client for the Gemini REST API.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(cfg: &GeminiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            text_model: cfg.text_model.clone(),
            image_model: cfg.image_model.clone(),
        })
    }

    async fn post(&self, model: &str, body: &Value) -> Result<Value, TransportError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, model, "gemini request failed");
                TransportError::network(&e)
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| TransportError::network(&e))?;
        if !status.is_success() {
            error!(%status, model, "gemini api error");
            return Err(TransportError::from_status(status.as_u16(), &text));
        }
        serde_json::from_str(&text).map_err(|e| {
            error!(error = %e, model, "gemini response is not json");
            TransportError::Body(e.to_string())
        })
    }
}

pub(crate) fn build_body(request: &GenerateRequest) -> Value {
    let mut contents: Vec<Value> = request
        .history
        .iter()
        .map(|t| json!({ "role": t.role.as_str(), "parts": [{ "text": t.text }] }))
        .collect();

    let parts: Vec<Value> = request
        .parts
        .iter()
        .map(|p| match p {
            Part::Text(text) => json!({ "text": text }),
            Part::InlineImage { mime_type, data } => json!({
                "inline_data": { "mime_type": mime_type, "data": data }
            }),
        })
        .collect();
    contents.push(json!({ "role": "user", "parts": parts }));

    let mut body = json!({ "contents": contents });
    if !request.system_instruction.is_empty() {
        body["system_instruction"] = json!({ "parts": [{ "text": request.system_instruction }] });
    }
    if let Some(schema) = &request.schema {
        body["generation_config"] = json!({
            "response_mime_type": "application/json",
            "response_schema": schema.to_json(),
        });
    }
    body
}

/// Joins the text parts of the first candidate. Thought parts are skipped.
pub(crate) fn extract_text(data: &Value) -> Option<String> {
    let Some(candidate) = data["candidates"].get(0) else {
        let reason = data
            .get("promptFeedback")
            .and_then(|pf| pf.get("blockReason"))
            .and_then(Value::as_str)
            .unwrap_or("");
        warn!(block_reason = reason, "gemini returned no candidates");
        return None;
    };
    let text: String = candidate["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter(|p| !p.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        let finish = candidate.get("finishReason").and_then(Value::as_str).unwrap_or("");
        warn!(finish_reason = finish, "gemini candidate has no text");
        return None;
    }
    Some(text)
}

pub(crate) fn extract_image(data: &Value) -> Option<InlineImage> {
    let candidates = data.get("candidates").and_then(Value::as_array)?;
    candidates
        .iter()
        .filter_map(|c| c["content"]["parts"].as_array())
        .flatten()
        .find_map(|part| {
            let inline = part.get("inlineData").or_else(|| part.get("inline_data"))?;
            let data = inline.get("data").and_then(Value::as_str)?;
            if data.is_empty() {
                return None;
            }
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            Some(InlineImage {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            })
        })
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, TransportError> {
        let body = build_body(request);
        let data = self.post(&self.text_model, &body).await?;
        debug!(model = %self.text_model, response = %data, "gemini raw response");
        Ok(GenerateResponse {
            text: extract_text(&data),
        })
    }

    async fn generate_image(&self, prompt: &str) -> Result<InlineImage, TransportError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generation_config": { "responseModalities": ["IMAGE"] },
        });
        let data = self.post(&self.image_model, &body).await?;
        extract_image(&data).ok_or(TransportError::NoImage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FieldKind, ResponseSchema, Role, Turn};

    #[test]
    fn body_appends_new_user_turn_after_history() {
        let req = GenerateRequest {
            system_instruction: "be kind".into(),
            history: vec![
                Turn { role: Role::User, text: "hi".into() },
                Turn { role: Role::Model, text: "hello".into() },
            ],
            parts: vec![
                Part::Text("lunch".into()),
                Part::InlineImage { mime_type: "image/jpeg".into(), data: "AAAA".into() },
            ],
            schema: Some(ResponseSchema::default().required("ok", FieldKind::Boolean)),
        };
        let body = build_body(&req);
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "be kind");
        assert_eq!(body["generation_config"]["response_mime_type"], "application/json");
    }

    #[test]
    fn body_omits_optional_sections() {
        let req = GenerateRequest {
            parts: vec![Part::Text("x".into())],
            ..Default::default()
        };
        let body = build_body(&req);
        assert!(body.get("system_instruction").is_none());
        assert!(body.get("generation_config").is_none());
    }

    #[test]
    fn extract_text_skips_thoughts_and_handles_blocks() {
        let data = json!({
            "candidates": [{ "content": { "parts": [
                { "text": "thinking...", "thought": true },
                { "text": "{\"a\":" },
                { "text": "1}" }
            ]}}]
        });
        assert_eq!(extract_text(&data).as_deref(), Some("{\"a\":1}"));

        let blocked = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert_eq!(extract_text(&blocked), None);

        let empty = json!({ "candidates": [{ "content": { "parts": [] }, "finishReason": "SAFETY" }] });
        assert_eq!(extract_text(&empty), None);
    }

    #[test]
    fn extract_image_accepts_both_casings() {
        let data = json!({
            "candidates": [{ "content": { "parts": [
                { "text": "here you go" },
                { "inlineData": { "mimeType": "image/png", "data": "iVBOR" } }
            ]}}]
        });
        let img = extract_image(&data).unwrap();
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.data_url(), "data:image/png;base64,iVBOR");

        let snake = json!({
            "candidates": [{ "content": { "parts": [
                { "inline_data": { "mime_type": "image/jpeg", "data": "/9j/" } }
            ]}}]
        });
        assert_eq!(extract_image(&snake).unwrap().mime_type, "image/jpeg");
        assert!(extract_image(&json!({ "candidates": [] })).is_none());
    }
}
