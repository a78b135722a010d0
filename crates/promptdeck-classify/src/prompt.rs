use promptdeck_core::taxonomy::{build_tree, TreeNode};
use promptdeck_core::{LibraryData, Prompt};

/// Keep category context short; descriptions can be essays.
const MAX_DESCRIPTION_BYTES: usize = 80;
/// Prompt bodies are clipped so one classification never dominates context.
const MAX_CONTENT_BYTES: usize = 1200;

/// Truncate to at most `max` bytes without splitting a character.
fn truncate_chars(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn push_clipped(out: &mut String, text: &str, max: usize) {
    let clipped = truncate_chars(text, max);
    out.push_str(clipped);
    if clipped.len() < text.len() {
        out.push_str("...");
    }
}

/// Render the taxonomy as an indented id/name listing for LLM consumption.
/// Uses the same tree construction as the UI so the model only ever sees
/// categories that are actually reachable.
pub fn serialize_taxonomy(library: &LibraryData) -> String {
    let tree = build_tree(&library.categories);
    let mut out = String::with_capacity(1024);
    out.push_str("CATEGORIES:\n");
    if tree.is_empty() {
        out.push_str("(none)\n");
        return out;
    }
    for node in &tree {
        serialize_node(&mut out, node, 0);
    }
    out
}

fn serialize_node(out: &mut String, node: &TreeNode, indent: usize) {
    let pad: String = "  ".repeat(indent);
    out.push_str(&pad);
    out.push('[');
    out.push_str(&node.category.id.to_string());
    out.push_str("] ");
    out.push_str(&node.category.name);
    if let Some(desc) = &node.category.description {
        if !desc.is_empty() {
            out.push_str(" — ");
            push_clipped(out, desc, MAX_DESCRIPTION_BYTES);
        }
    }
    out.push('\n');
    for child in &node.children {
        serialize_node(out, child, indent + 1);
    }
}

/// Compact text rendering of the prompt to classify.
pub fn user_message(library: &LibraryData, prompt: &Prompt) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("PROMPT:\n");
    out.push_str("title: ");
    out.push_str(&prompt.title);
    out.push('\n');
    if !prompt.tags.is_empty() {
        out.push_str("tags: ");
        out.push_str(&prompt.tags.join(", "));
        out.push('\n');
    }
    out.push_str("content:\n");
    push_clipped(&mut out, &prompt.content, MAX_CONTENT_BYTES);
    out.push_str("\n\n");
    out.push_str(&serialize_taxonomy(library));
    out
}

pub fn system_prompt() -> String {
    format!(
        "You are a classification advisor for a library of teaching prompts. Given one prompt \
and the library's scenario taxonomy, pick the single category that best fits.\n\n\
Rules:\n\
- Pick ONLY from the listed categories. Never invent a category.\n\
- Prefer the deepest listed category that genuinely fits; fall back to its parent when no \
leaf matches.\n\
- Classify by what the prompt asks the AI to do, not by keyword overlap.\n\
- If nothing fits at all, answer with category id 0.\n\n\
Output ONLY a JSON object: {{\"category\": <id>, \"reason\": \"<one sentence>\"}}. \
The id must be one of the bracketed numbers from the listing (or 0 for no fit).\n\n\
## Taxonomy Rules\n{}\n\n\
Output ONLY the JSON object, nothing else.",
        promptdeck_core::rules::RULES
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptdeck_core::Category;

    fn library_with_description(desc: &str) -> LibraryData {
        LibraryData {
            categories: vec![Category {
                id: 1,
                name: "语文".to_string(),
                level: 1,
                parent_id: None,
                description: Some(desc.to_string()),
                icon: None,
                is_custom: false,
            }],
            prompts: vec![],
        }
    }

    fn prompt_with_content(content: String) -> Prompt {
        Prompt {
            id: 1,
            title: "作文批改".to_string(),
            content,
            scenario_id: None,
            tags: vec![],
            score: None,
            use_count: 0,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn multibyte_content_is_clipped_on_char_boundaries() {
        // One ASCII byte in front pushes every 3-byte character off the
        // clip offset, so a byte-index slice would panic here.
        let content = format!("a{}", "你".repeat(MAX_CONTENT_BYTES / 3 + 50));
        assert!(content.len() > MAX_CONTENT_BYTES);
        let library = library_with_description("");
        let msg = user_message(&library, &prompt_with_content(content));
        assert!(msg.contains("...\n\n"));
    }

    #[test]
    fn multibyte_description_is_clipped_on_char_boundaries() {
        let desc = "专".repeat(MAX_DESCRIPTION_BYTES / 3 + 10);
        let out = serialize_taxonomy(&library_with_description(&desc));
        assert!(out.contains("..."));
        assert!(out.contains("[1] 语文"));
    }

    #[test]
    fn short_text_is_untouched() {
        let library = library_with_description("short note");
        let msg = user_message(&library, &prompt_with_content("short body".to_string()));
        assert!(msg.contains("short body\n\n"));
        let out = serialize_taxonomy(&library);
        assert!(out.contains("short note"));
        assert!(!out.contains("short note..."));
    }

    #[test]
    fn truncation_never_exceeds_the_limit() {
        let s = "你".repeat(100);
        let clipped = truncate_chars(&s, 80);
        assert!(clipped.len() <= 80);
        assert_eq!(clipped.len() % 3, 0);
        assert_eq!(truncate_chars("plain", 80), "plain");
    }
}
