use promptdeck_core::{taxonomy, Category, CategoryId};

use crate::Suggestion;

#[derive(serde::Deserialize)]
struct LlmAnswer {
    /// Id number, id string, category name, or a "Subject > Topic" path.
    category: serde_json::Value,
    #[serde(default)]
    reason: String,
}

/// Parse raw LLM output into a Suggestion, matching the model's category
/// reference back to a real id. Returns None on total parse failure or when
/// the reference names nothing in the taxonomy (graceful degradation).
pub fn parse_llm_output(raw: &str, categories: &[Category]) -> Option<Suggestion> {
    let json_str = extract_json_object(raw)?;
    let answer: LlmAnswer = serde_json::from_str(&json_str).ok()?;
    let category_id = resolve_category(&answer.category, categories)?;
    Some(Suggestion {
        category_id,
        path: taxonomy::resolve_path(category_id, categories, " > "),
        reason: answer.reason,
    })
}

/// Extract the first balanced JSON object from raw LLM output. Tolerates
/// markdown fences and prose around the object, but not braces inside
/// strings before the object closes — good enough for this response shape.
fn extract_json_object(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    for (i, ch) in raw[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Match the LLM's category reference to an ID. Tries numeric id first, then
/// exact name, case-insensitive name, path tail, and finally substring.
fn resolve_category(value: &serde_json::Value, categories: &[Category]) -> Option<CategoryId> {
    if let Some(id) = value.as_i64() {
        return categories.iter().find(|c| c.id == id).map(|c| c.id);
    }

    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }

    // Numeric string
    if let Ok(id) = text.parse::<CategoryId>() {
        if let Some(c) = categories.iter().find(|c| c.id == id) {
            return Some(c.id);
        }
    }

    // "Subject > Topic > Scene" — the tail segment is the category itself.
    let tail = text
        .rsplit(['>', '/'])
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(text);

    for candidate in [text, tail] {
        if let Some(c) = categories.iter().find(|c| c.name == candidate) {
            return Some(c.id);
        }
        let lower = candidate.to_lowercase();
        if let Some(c) = categories
            .iter()
            .find(|c| c.name.to_lowercase() == lower)
        {
            return Some(c.id);
        }
    }

    // Substring match (name contains the LLM's string or vice versa)
    let lower = tail.to_lowercase();
    categories
        .iter()
        .find(|c| {
            let n = c.name.to_lowercase();
            n.contains(&lower) || lower.contains(&n)
        })
        .map(|c| c.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cats() -> Vec<Category> {
        vec![
            Category {
                id: 1,
                name: "Science".to_string(),
                level: 1,
                parent_id: None,
                description: None,
                icon: None,
                is_custom: false,
            },
            Category {
                id: 2,
                name: "Physics".to_string(),
                level: 2,
                parent_id: Some(1),
                description: None,
                icon: None,
                is_custom: false,
            },
        ]
    }

    #[test]
    fn parses_plain_json_with_numeric_id() {
        let s = parse_llm_output(r#"{"category": 2, "reason": "mechanics prompt"}"#, &cats())
            .unwrap();
        assert_eq!(s.category_id, 2);
        assert_eq!(s.path, "Science > Physics");
        assert_eq!(s.reason, "mechanics prompt");
    }

    #[test]
    fn parses_fenced_output() {
        let raw = "Sure, here you go:\n```json\n{\"category\": \"Physics\", \"reason\": \"x\"}\n```";
        let s = parse_llm_output(raw, &cats()).unwrap();
        assert_eq!(s.category_id, 2);
    }

    #[test]
    fn resolves_path_strings_by_tail() {
        let s = parse_llm_output(r#"{"category": "Science > Physics"}"#, &cats()).unwrap();
        assert_eq!(s.category_id, 2);
    }

    #[test]
    fn resolves_case_insensitive_names() {
        let s = parse_llm_output(r#"{"category": "physics"}"#, &cats()).unwrap();
        assert_eq!(s.category_id, 2);
    }

    #[test]
    fn zero_id_means_no_fit() {
        assert!(parse_llm_output(r#"{"category": 0}"#, &cats()).is_none());
    }

    #[test]
    fn unknown_reference_degrades_to_none() {
        assert!(parse_llm_output(r#"{"category": "Knitting"}"#, &cats()).is_none());
        assert!(parse_llm_output(r#"{"category": 99}"#, &cats()).is_none());
    }

    #[test]
    fn garbage_output_degrades_to_none() {
        assert!(parse_llm_output("I couldn't decide.", &cats()).is_none());
        assert!(parse_llm_output("", &cats()).is_none());
        assert!(parse_llm_output("{not json", &cats()).is_none());
    }
}
