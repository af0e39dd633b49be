pub mod groq;
pub mod intent;
pub mod ollama;

use async_trait::async_trait;

/// Opaque text completion: given a prompt, return the model's reply.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}
