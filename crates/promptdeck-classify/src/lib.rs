pub mod engine;
mod parse;
mod prompt;

use serde::{Deserialize, Serialize};

use promptdeck_core::{AiSettings, CategoryId, LibraryData, Prompt};

/// A category suggestion for one prompt, resolved against the library's
/// actual taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub category_id: CategoryId,
    /// Root-to-leaf scenario path for display, e.g. "Science > Physics".
    pub path: String,
    pub reason: String,
}

/// Ask the configured LLM to classify a prompt into the library's scenario
/// taxonomy. Returns None on any failure — transport errors, empty output,
/// or a response that names no real category.
pub async fn suggest_category(
    library: &LibraryData,
    prompt: &Prompt,
    settings: &AiSettings,
) -> Option<Suggestion> {
    let system = prompt::system_prompt();
    let user_msg = prompt::user_message(library, prompt);

    tracing::debug!(
        provider = %settings.provider,
        model = %settings.model,
        prompt_id = prompt.id,
        "requesting category suggestion"
    );

    match engine::complete(settings, &system, &user_msg).await {
        Ok(raw) => {
            tracing::debug!(output = %raw, "raw LLM output");
            let suggestion = parse::parse_llm_output(&raw, &library.categories);
            if suggestion.is_none() {
                tracing::warn!("LLM output named no category in this library");
            }
            suggestion
        }
        // engine::complete already logged the specifics.
        Err(e) => {
            tracing::debug!(error = %e, "no suggestion produced");
            None
        }
    }
}
