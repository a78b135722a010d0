use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;

use promptdeck_core::AiSettings;

/// The answer is one small JSON object; cap the completion accordingly so a
/// rambling model cannot run up the bill.
const MAX_COMPLETION_TOKENS: u32 = 256;

/// Provider names accepted in settings.json, in the order shown to users.
const PROVIDERS: &[&str] = &[
    "openai",
    "anthropic",
    "google",
    "ollama",
    "groq",
    "mistral",
    "deepseek",
];

fn map_backend(provider: &str) -> Result<LLMBackend, String> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(format!(
            "unknown provider '{}' (supported: {})",
            other,
            PROVIDERS.join(", ")
        )),
    }
}

/// One-shot classification request against the configured backend.
pub async fn complete(
    settings: &AiSettings,
    system: &str,
    user_msg: &str,
) -> Result<String, String> {
    let backend = map_backend(&settings.provider).map_err(|e| {
        tracing::warn!(provider = %settings.provider, "unusable AI settings");
        e
    })?;

    let mut builder = LLMBuilder::new()
        .backend(backend)
        .model(&settings.model)
        .system(system)
        .max_tokens(MAX_COMPLETION_TOKENS);

    // Local backends such as ollama run without a key.
    if !settings.api_key.is_empty() {
        builder = builder.api_key(&settings.api_key);
    }

    let llm = builder.build().map_err(|e| {
        tracing::warn!(provider = %settings.provider, error = %e, "LLM client construction failed");
        format!("build LLM: {e}")
    })?;

    let messages = vec![ChatMessage::user().content(user_msg).build()];

    let response = llm.chat(&messages).await.map_err(|e| {
        tracing::warn!(
            provider = %settings.provider,
            model = %settings.model,
            error = %e,
            "chat request failed"
        );
        format!("chat: {e}")
    })?;

    match response.text() {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err("LLM returned no text".to_string()),
    }
}
