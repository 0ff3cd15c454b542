use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{GenerateRequest, GenerateResponse, GenerationClient, InlineImage, TransportError};

/// Scripted stand-in for the generation service. Each `generate` call pops
/// the next queued reply; an exhausted queue behaves like a network failure.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<Option<String>, TransportError>>>,
    image: Mutex<Option<Result<InlineImage, TransportError>>>,
    pub requests: Mutex<Vec<GenerateRequest>>,
    pub image_prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(Some(text.to_string())));
        self
    }

    pub fn empty_reply(self) -> Self {
        self.replies.lock().unwrap().push_back(Ok(None));
        self
    }

    pub fn fail(self) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Network("connection refused".into())));
        self
    }

    pub fn image(self, result: Result<InlineImage, TransportError>) -> Self {
        *self.image.lock().unwrap() = Some(result);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, idx: usize) -> GenerateRequest {
        self.requests.lock().unwrap()[idx].clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(GenerateResponse { text }),
            Some(Err(e)) => Err(e),
            None => Err(TransportError::Network("script exhausted".into())),
        }
    }

    async fn generate_image(&self, prompt: &str) -> Result<InlineImage, TransportError> {
        self.image_prompts.lock().unwrap().push(prompt.to_string());
        self.image
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(TransportError::NoImage))
    }
}
