//! Prompt variable substitution.
//!
//! Prompt content may carry `{{variable}}` placeholders that are filled in
//! per use. The scanner is deliberately forgiving: an unterminated `{{` and
//! an empty `{{}}` are left as literal text, not errors.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TemplateError {
    #[error("missing values for variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),
}

/// Collect placeholder names in order of first appearance, deduplicated.
pub fn extract_variables(content: &str) -> Vec<String> {
    let mut vars: Vec<String> = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if !name.is_empty() && !vars.iter().any(|v| v == name) {
                    vars.push(name.to_string());
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    vars
}

/// Substitute every placeholder in `content` from `values`.
///
/// Fails up front with the full list of missing variable names so the caller
/// can surface one actionable error instead of a partially rendered prompt.
pub fn render(content: &str, values: &HashMap<String, String>) -> Result<String, TemplateError> {
    let missing: Vec<String> = extract_variables(content)
        .into_iter()
        .filter(|v| !values.contains_key(v))
        .collect();
    if !missing.is_empty() {
        return Err(TemplateError::MissingVariables(missing));
    }

    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                out.push_str(&rest[..start]);
                let name = after[..end].trim();
                // Empty placeholders stay literal even when a "" key exists,
                // matching what extract_variables reports.
                match values.get(name).filter(|_| !name.is_empty()) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn extracts_in_order_without_duplicates() {
        let vars = extract_variables("Grade this {{subject}} essay by {{student}} on {{subject}}");
        assert_eq!(vars, vec!["subject".to_string(), "student".to_string()]);
    }

    #[test]
    fn extracts_nothing_from_plain_text() {
        assert!(extract_variables("no placeholders here").is_empty());
        assert!(extract_variables("").is_empty());
    }

    #[test]
    fn unterminated_and_empty_placeholders_are_ignored() {
        assert!(extract_variables("broken {{tail").is_empty());
        assert!(extract_variables("empty {{}} here").is_empty());
        assert_eq!(
            extract_variables("{{a}} then broken {{tail"),
            vec!["a".to_string()]
        );
    }

    #[test]
    fn renders_all_occurrences() {
        let out = render(
            "Write a {{tone}} email about {{topic}}. Keep the {{tone}} consistent.",
            &values(&[("tone", "friendly"), ("topic", "homework")]),
        )
        .unwrap();
        assert_eq!(
            out,
            "Write a friendly email about homework. Keep the friendly consistent."
        );
    }

    #[test]
    fn whitespace_inside_braces_is_tolerated() {
        let out = render("Hello {{ name }}!", &values(&[("name", "Ada")])).unwrap();
        assert_eq!(out, "Hello Ada!");
    }

    #[test]
    fn missing_values_listed_in_error() {
        let err = render("{{a}} {{b}} {{c}}", &values(&[("b", "x")])).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingVariables(vec!["a".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn empty_placeholder_is_never_substituted() {
        // A "" key in the value map must not capture {{}}.
        let out = render("keep {{}} and fill {{a}}", &values(&[("", "BAD"), ("a", "ok")])).unwrap();
        assert_eq!(out, "keep {{}} and fill ok");
        let spaced = render("also {{   }}", &values(&[("", "BAD")])).unwrap();
        assert_eq!(spaced, "also {{   }}");
    }

    #[test]
    fn literal_text_passes_through() {
        let out = render("just text, {{}} and a {single} brace", &HashMap::new()).unwrap();
        assert_eq!(out, "just text, {{}} and a {single} brace");
    }
}
