pub mod rules;
pub mod taxonomy;
pub mod template;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// --- Types ---

/// Identifier of a category (a.k.a. scenario) in the 3-level taxonomy.
pub type CategoryId = i64;

/// Identifier of a prompt.
pub type PromptId = i64;

/// A node in the 3-level scenario taxonomy used to tag and filter prompts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// Depth in the taxonomy: 1 (top) through 3 (leaf).
    pub level: u8,
    /// Parent category. `None` for level-1 categories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// User-created category, as opposed to a system preset.
    #[serde(default)]
    pub is_custom: bool,
}

/// A user-authored AI instruction template. Only `id` and `scenario_id`
/// matter to the taxonomy logic; the rest is display/content metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: PromptId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Category this prompt is filed under. `None` means uncategorized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default)]
    pub use_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A prompt library: the unit of storage, one `.deck` file on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LibraryData {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
}

// --- Storage ---

/// Resolve the global decks directory (~/.promptdeck/).
pub fn decks_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".promptdeck")
}

fn library_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.deck", name))
}

/// List all library names (without .deck extension) in `dir`, sorted.
pub fn list_libraries_in(dir: &Path) -> Result<Vec<String>, String> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(|e| e.to_string())?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name().to_string_lossy().to_string();
            name.strip_suffix(".deck").map(|n| n.to_string())
        })
        .collect();
    names.sort();
    Ok(names)
}

/// List all library names in the global decks directory, sorted.
pub fn list_libraries() -> Result<Vec<String>, String> {
    list_libraries_in(&decks_dir())
}

/// Read a library as typed LibraryData from `dir`.
pub fn read_library_in(dir: &Path, name: &str) -> Result<LibraryData, String> {
    let raw = fs::read_to_string(library_path(dir, name)).map_err(|e| e.to_string())?;
    serde_json::from_str(&raw).map_err(|e| e.to_string())
}

/// Read a library from the global decks directory.
pub fn read_library(name: &str) -> Result<LibraryData, String> {
    read_library_in(&decks_dir(), name)
}

/// Write a library into `dir`.
///
/// Uses atomic write (temp file + rename) so concurrent readers and file
/// watchers never observe a half-written deck.
pub fn write_library_in(dir: &Path, name: &str, library: &LibraryData) -> Result<(), String> {
    fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(library).map_err(|e| e.to_string())?;
    let tmp = dir.join(format!(".{}.deck.tmp", name));
    let path = library_path(dir, name);
    fs::write(&tmp, json).map_err(|e| e.to_string())?;
    fs::rename(&tmp, &path).map_err(|e| e.to_string())
}

/// Write a library into the global decks directory.
pub fn write_library(name: &str, library: &LibraryData) -> Result<(), String> {
    write_library_in(&decks_dir(), name, library)
}

/// Delete a library by name from `dir`. Deleting a missing library is a no-op.
pub fn delete_library_in(dir: &Path, name: &str) -> Result<(), String> {
    let path = library_path(dir, name);
    if path.exists() {
        fs::remove_file(&path).map_err(|e| e.to_string())
    } else {
        Ok(())
    }
}

/// Delete a library from the global decks directory.
pub fn delete_library(name: &str) -> Result<(), String> {
    delete_library_in(&decks_dir(), name)
}

/// Generate the next category ID: one past the highest existing id.
pub fn next_category_id(library: &LibraryData) -> CategoryId {
    library.categories.iter().map(|c| c.id).max().unwrap_or(0) + 1
}

/// Generate the next prompt ID: one past the highest existing id.
pub fn next_prompt_id(library: &LibraryData) -> PromptId {
    library.prompts.iter().map(|p| p.id).max().unwrap_or(0) + 1
}

// --- AI Settings ---

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    pub provider: String,
    pub api_key: String,
    pub model: String,
}

fn settings_path() -> PathBuf {
    decks_dir().join("settings.json")
}

pub fn read_settings() -> AiSettings {
    let path = settings_path();
    if !path.exists() {
        return AiSettings::default();
    }
    fs::read_to_string(&path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub fn write_settings(settings: &AiSettings) -> Result<(), String> {
    let dir = decks_dir();
    fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(settings).map_err(|e| e.to_string())?;
    fs::write(settings_path(), json).map_err(|e| e.to_string())
}

pub fn ai_configured(settings: &AiSettings) -> bool {
    !settings.provider.is_empty()
        && !settings.model.is_empty()
        && (settings.provider == "ollama" || !settings.api_key.is_empty())
}
