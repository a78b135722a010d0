use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use promptdeck_core::taxonomy::{self, CategoryFilter, TreeNode, MAX_LEVEL};
use promptdeck_core::{template, Category, CategoryId, LibraryData, Prompt, PromptId};

const MAX_CATEGORY_NAME: usize = 60;

fn validate_category_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Category name must not be empty".to_string());
    }
    if trimmed.len() > MAX_CATEGORY_NAME {
        return Err(format!(
            "Category name '{}' exceeds {} character limit",
            trimmed, MAX_CATEGORY_NAME
        ));
    }
    Ok(())
}

/// Check the level/parent pairing of a category against the rest of the list.
fn validate_placement(
    categories: &[Category],
    level: u8,
    parent_id: Option<CategoryId>,
    label: &str,
) -> Result<(), String> {
    if level == 0 || level > MAX_LEVEL {
        return Err(format!(
            "Level {} for {} is out of range (1-{})",
            level, label, MAX_LEVEL
        ));
    }
    match (level, parent_id) {
        (1, Some(pid)) => Err(format!(
            "Level-1 category {} must not have a parent (got {})",
            label, pid
        )),
        (1, None) => Ok(()),
        (_, None) => Err(format!(
            "Level-{} category {} requires a parentId one level up",
            level, label
        )),
        (_, Some(pid)) => {
            let parent = categories
                .iter()
                .find(|c| c.id == pid)
                .ok_or_else(|| format!("Parent category {} for {} not found", pid, label))?;
            if parent.level != level - 1 {
                return Err(format!(
                    "Parent of level-{} category {} must be level {}, but '{}' is level {}",
                    level,
                    label,
                    level - 1,
                    parent.name,
                    parent.level
                ));
            }
            Ok(())
        }
    }
}

/// Full well-formedness check used when a library is written wholesale.
/// Reads stay tolerant (the tree view omits malformed rows); writes do not.
fn validate_library(library: &LibraryData) -> Result<(), String> {
    let mut category_ids = HashSet::new();
    for cat in &library.categories {
        if !category_ids.insert(cat.id) {
            return Err(format!("Duplicate category id {}", cat.id));
        }
        validate_category_name(&cat.name)?;
    }
    for cat in &library.categories {
        validate_placement(
            &library.categories,
            cat.level,
            cat.parent_id,
            &format!("'{}' (id {})", cat.name, cat.id),
        )?;
    }
    let mut prompt_ids = HashSet::new();
    for prompt in &library.prompts {
        if !prompt_ids.insert(prompt.id) {
            return Err(format!("Duplicate prompt id {}", prompt.id));
        }
        if prompt.title.trim().is_empty() {
            return Err(format!("Prompt {} has an empty title", prompt.id));
        }
        if let Some(sid) = prompt.scenario_id {
            if !category_ids.contains(&sid) {
                return Err(format!(
                    "Prompt {} references missing category {}",
                    prompt.id, sid
                ));
            }
        }
    }
    Ok(())
}

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GetLibraryRequest {
    /// Name of the library to retrieve
    name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetLibraryRequest {
    /// Name of the library to create or overwrite
    name: String,
    /// The complete library as a JSON string: {"categories": [{id, name, level, parentId?, description?, icon?, isCustom}], "prompts": [{id, title, content, scenarioId?, tags?}]}. Levels run 1-3; every level-2/3 category needs a parentId one level up.
    data: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GetTreeRequest {
    /// Name of the library
    library: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddCategoryItem {
    /// Display name (max 60 characters)
    name: String,
    /// Depth in the taxonomy: 1 (subject), 2 (topic), or 3 (scene)
    level: u8,
    /// Parent category id. Required for levels 2 and 3, forbidden for level 1.
    parent_id: Option<CategoryId>,
    /// Optional description of what belongs here
    description: Option<String>,
    /// Optional icon identifier for the UI
    icon: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddCategoryRequest {
    /// Name of the library
    library: String,
    /// Array of categories to add. Added categories are user-owned (isCustom=true).
    categories: Vec<AddCategoryItem>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct UpdateCategoryItem {
    /// ID of the category to update
    category_id: CategoryId,
    /// New display name
    name: Option<String>,
    /// New description
    description: Option<String>,
    /// New icon identifier
    icon: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct UpdateCategoryRequest {
    /// Name of the library
    library: String,
    /// Array of category updates. Preset categories (isCustom=false) are refused.
    categories: Vec<UpdateCategoryItem>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DeleteCategoryRequest {
    /// Name of the library
    library: String,
    /// IDs of categories to delete. Descendants are deleted too; prompts filed under any deleted category become uncategorized.
    category_ids: Vec<CategoryId>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddPromptItem {
    /// Prompt title
    title: String,
    /// Prompt body. May contain {{variable}} placeholders filled in by render_prompt.
    content: String,
    /// Category to file the prompt under (any level). Omit for uncategorized.
    scenario_id: Option<CategoryId>,
    /// Free-form tags
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddPromptRequest {
    /// Name of the library
    library: String,
    /// Array of prompts to add
    prompts: Vec<AddPromptItem>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct UpdatePromptItem {
    /// ID of the prompt to update
    prompt_id: PromptId,
    /// New title
    title: Option<String>,
    /// New content
    content: Option<String>,
    /// Re-file under this category id
    scenario_id: Option<CategoryId>,
    /// Set true to make the prompt uncategorized (ignored when scenario_id is given)
    clear_scenario: Option<bool>,
    /// Replacement tag list
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct UpdatePromptRequest {
    /// Name of the library
    library: String,
    /// Array of prompt updates to apply
    prompts: Vec<UpdatePromptItem>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DeletePromptRequest {
    /// Name of the library
    library: String,
    /// IDs of prompts to delete
    prompt_ids: Vec<PromptId>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ListPromptsRequest {
    /// Name of the library
    library: String,
    /// Level-1 category constraint. Omit for all subjects.
    level1: Option<CategoryId>,
    /// Level-2 category constraint. Omit for all topics.
    level2: Option<CategoryId>,
    /// Level-3 category constraint. Omit for all scenes.
    level3: Option<CategoryId>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ResolveSelectionRequest {
    /// Name of the library
    library: String,
    /// Raw scenario query-parameter value from a deep link, e.g. "17". Non-numeric input resolves to no selection.
    scenario: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CountPromptsRequest {
    /// Name of the library
    library: String,
    /// Category to count prompts for, including all descendants
    category_id: CategoryId,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RenderPromptRequest {
    /// Name of the library
    library: String,
    /// ID of the prompt to render
    prompt_id: PromptId,
    /// Values for the prompt's {{variable}} placeholders
    variables: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SuggestCategoryRequest {
    /// Name of the library
    library: String,
    /// ID of the prompt to classify
    prompt_id: PromptId,
}

// --- Server ---

#[derive(Clone)]
pub struct PromptdeckServer {
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl PromptdeckServer {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "List all available prompt libraries")]
    fn list_libraries(&self) -> Result<CallToolResult, McpError> {
        match promptdeck_core::list_libraries() {
            Ok(names) => {
                let text = if names.is_empty() {
                    "No libraries found. Use set_library to create one.".to_string()
                } else {
                    names.join("\n")
                };
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
        }
    }

    #[tool(
        description = "Get the full JSON content of a library: {categories: [{id, name, level, parentId?, description?, icon?, isCustom}], prompts: [{id, title, content, scenarioId?, tags?, score?, useCount}]}. For browsing, prefer get_scenario_tree and list_prompts."
    )]
    fn get_library(
        &self,
        Parameters(req): Parameters<GetLibraryRequest>,
    ) -> Result<CallToolResult, McpError> {
        match promptdeck_core::read_library(&req.name) {
            Ok(library) => {
                let json = serde_json::to_string_pretty(&library)
                    .unwrap_or_else(|e| format!("Serialization error: {}", e));
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
                "Failed to read library '{}': {}",
                req.name, e
            ))])),
        }
    }

    #[tool(
        description = "Create or overwrite a library with complete data in one call. The whole payload is validated before anything is written: duplicate ids, out-of-range levels, dangling or mis-leveled parent links, and prompts referencing missing categories are all rejected."
    )]
    fn set_library(
        &self,
        Parameters(req): Parameters<SetLibraryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let library: LibraryData = match serde_json::from_str(&req.data) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Invalid library JSON: {}",
                    e
                ))]));
            }
        };

        if let Err(e) = validate_library(&library) {
            return Ok(CallToolResult::error(vec![Content::text(e)]));
        }

        let categories = library.categories.len();
        let prompts = library.prompts.len();
        match promptdeck_core::write_library(&req.name, &library) {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Set library '{}' ({} categories, {} prompts)",
                req.name, categories, prompts
            ))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
        }
    }

    #[tool(description = "Delete a library by name. Deleting a missing library is a no-op.")]
    fn delete_library(
        &self,
        Parameters(req): Parameters<GetLibraryRequest>,
    ) -> Result<CallToolResult, McpError> {
        match promptdeck_core::delete_library(&req.name) {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Deleted library '{}'",
                req.name
            ))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
        }
    }

    #[tool(
        description = "Get the 3-level scenario tree of a library with aggregate prompt counts. Each node: {id, name, level, isCustom, promptCount, children}. promptCount includes prompts filed under the node or any descendant. Categories with broken parent links are omitted. Also reports the number of prompts with no resolvable category."
    )]
    fn get_scenario_tree(
        &self,
        Parameters(req): Parameters<GetTreeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let library = match promptdeck_core::read_library(&req.library) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to read library '{}': {}",
                    req.library, e
                ))]));
            }
        };

        let counts = taxonomy::prompt_counts(&library.categories, &library.prompts);
        let tree: Vec<serde_json::Value> = taxonomy::build_tree(&library.categories)
            .iter()
            .map(|node| tree_to_json(node, &counts))
            .collect();

        let known: HashSet<CategoryId> = library.categories.iter().map(|c| c.id).collect();
        let uncategorized = library
            .prompts
            .iter()
            .filter(|p| p.scenario_id.map_or(true, |id| !known.contains(&id)))
            .count();

        let result = serde_json::json!({
            "tree": tree,
            "totalPrompts": library.prompts.len(),
            "uncategorizedPrompts": uncategorized,
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&result).unwrap_or_default(),
        )]))
    }

    #[tool(
        description = "Add one or more categories. Level 1 = subject (no parent), level 2 = topic (parent is a level-1 id), level 3 = scene (parent is a level-2 id). Added categories are user-owned (isCustom=true). IDs are assigned automatically."
    )]
    fn add_categories(
        &self,
        Parameters(req): Parameters<AddCategoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut library = match promptdeck_core::read_library(&req.library) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to read library '{}': {}",
                    req.library, e
                ))]));
            }
        };

        let mut added = Vec::new();
        for item in &req.categories {
            if let Err(e) = validate_category_name(&item.name) {
                return Ok(CallToolResult::error(vec![Content::text(e)]));
            }
            if let Err(e) = validate_placement(
                &library.categories,
                item.level,
                item.parent_id,
                &format!("'{}'", item.name),
            ) {
                return Ok(CallToolResult::error(vec![Content::text(e)]));
            }

            let id = promptdeck_core::next_category_id(&library);
            library.categories.push(Category {
                id,
                name: item.name.trim().to_string(),
                level: item.level,
                parent_id: item.parent_id,
                description: item.description.clone(),
                icon: item.icon.clone(),
                is_custom: true,
            });
            added.push(id.to_string());
        }

        match promptdeck_core::write_library(&req.library, &library) {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Added {} categor{} (id{} {})",
                added.len(),
                if added.len() == 1 { "y" } else { "ies" },
                if added.len() == 1 { "" } else { "s" },
                added.join(", ")
            ))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
        }
    }

    #[tool(
        description = "Update display properties of one or more user-owned categories. Preset categories (isCustom=false) are shared fixtures and cannot be modified. Re-parenting is not supported; delete and re-add instead."
    )]
    fn update_categories(
        &self,
        Parameters(req): Parameters<UpdateCategoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut library = match promptdeck_core::read_library(&req.library) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to read library '{}': {}",
                    req.library, e
                ))]));
            }
        };

        let mut updated = 0usize;
        for item in &req.categories {
            let cat = match library.categories.iter_mut().find(|c| c.id == item.category_id) {
                Some(c) => c,
                None => {
                    return Ok(CallToolResult::error(vec![Content::text(format!(
                        "Category {} not found",
                        item.category_id
                    ))]));
                }
            };
            if !cat.is_custom {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Category '{}' is a preset and cannot be modified",
                    cat.name
                ))]));
            }
            if let Some(name) = &item.name {
                if let Err(e) = validate_category_name(name) {
                    return Ok(CallToolResult::error(vec![Content::text(e)]));
                }
                cat.name = name.trim().to_string();
            }
            if let Some(desc) = &item.description {
                cat.description = Some(desc.clone());
            }
            if let Some(icon) = &item.icon {
                cat.icon = Some(icon.clone());
            }
            updated += 1;
        }

        match promptdeck_core::write_library(&req.library, &library) {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Updated {} categor{}",
                updated,
                if updated == 1 { "y" } else { "ies" }
            ))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
        }
    }

    #[tool(
        description = "Delete one or more user-owned categories and all their descendants. Prompts filed under any deleted category become uncategorized. Refused if the request (or its descendant closure) touches a preset category."
    )]
    fn delete_categories(
        &self,
        Parameters(req): Parameters<DeleteCategoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut library = match promptdeck_core::read_library(&req.library) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to read library '{}': {}",
                    req.library, e
                ))]));
            }
        };

        let mut to_delete: HashSet<CategoryId> = HashSet::new();
        for cid in &req.category_ids {
            if !library.categories.iter().any(|c| c.id == *cid) {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Category {} not found",
                    cid
                ))]));
            }
            to_delete.insert(*cid);
        }

        // Close over descendants.
        let mut changed = true;
        while changed {
            changed = false;
            for cat in &library.categories {
                if let Some(pid) = cat.parent_id {
                    if to_delete.contains(&pid) && !to_delete.contains(&cat.id) {
                        to_delete.insert(cat.id);
                        changed = true;
                    }
                }
            }
        }

        if let Some(preset) = library
            .categories
            .iter()
            .find(|c| to_delete.contains(&c.id) && !c.is_custom)
        {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "Category '{}' is a preset and cannot be deleted",
                preset.name
            ))]));
        }

        let before = library.categories.len();
        library.categories.retain(|c| !to_delete.contains(&c.id));
        let removed = before - library.categories.len();

        let mut unfiled = 0usize;
        for prompt in &mut library.prompts {
            if prompt.scenario_id.is_some_and(|id| to_delete.contains(&id)) {
                prompt.scenario_id = None;
                unfiled += 1;
            }
        }

        match promptdeck_core::write_library(&req.library, &library) {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Deleted {} categor{}; {} prompt(s) uncategorized",
                removed,
                if removed == 1 { "y" } else { "ies" },
                unfiled
            ))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
        }
    }

    #[tool(
        description = "Add one or more prompts. scenario_id may point at a category of any level; omit it for uncategorized. IDs are assigned automatically."
    )]
    fn add_prompts(
        &self,
        Parameters(req): Parameters<AddPromptRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut library = match promptdeck_core::read_library(&req.library) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to read library '{}': {}",
                    req.library, e
                ))]));
            }
        };

        let mut added = Vec::new();
        for item in &req.prompts {
            if item.title.trim().is_empty() {
                return Ok(CallToolResult::error(vec![Content::text(
                    "Prompt title must not be empty".to_string(),
                )]));
            }
            if let Some(sid) = item.scenario_id {
                if !library.categories.iter().any(|c| c.id == sid) {
                    return Ok(CallToolResult::error(vec![Content::text(format!(
                        "Category {} for prompt '{}' not found",
                        sid, item.title
                    ))]));
                }
            }

            let id = promptdeck_core::next_prompt_id(&library);
            library.prompts.push(Prompt {
                id,
                title: item.title.trim().to_string(),
                content: item.content.clone(),
                scenario_id: item.scenario_id,
                tags: item.tags.clone().unwrap_or_default(),
                score: None,
                use_count: 0,
                created_at: None,
                updated_at: None,
            });
            added.push(id.to_string());
        }

        match promptdeck_core::write_library(&req.library, &library) {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Added {} prompt(s) (id{} {})",
                added.len(),
                if added.len() == 1 { "" } else { "s" },
                added.join(", ")
            ))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
        }
    }

    #[tool(description = "Update one or more existing prompts")]
    fn update_prompts(
        &self,
        Parameters(req): Parameters<UpdatePromptRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut library = match promptdeck_core::read_library(&req.library) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to read library '{}': {}",
                    req.library, e
                ))]));
            }
        };

        let mut updated = 0usize;
        for item in &req.prompts {
            if let Some(sid) = item.scenario_id {
                if !library.categories.iter().any(|c| c.id == sid) {
                    return Ok(CallToolResult::error(vec![Content::text(format!(
                        "Category {} not found",
                        sid
                    ))]));
                }
            }
            let prompt = match library.prompts.iter_mut().find(|p| p.id == item.prompt_id) {
                Some(p) => p,
                None => {
                    return Ok(CallToolResult::error(vec![Content::text(format!(
                        "Prompt {} not found",
                        item.prompt_id
                    ))]));
                }
            };
            if let Some(title) = &item.title {
                if title.trim().is_empty() {
                    return Ok(CallToolResult::error(vec![Content::text(
                        "Prompt title must not be empty".to_string(),
                    )]));
                }
                prompt.title = title.trim().to_string();
            }
            if let Some(content) = &item.content {
                prompt.content = content.clone();
            }
            if let Some(sid) = item.scenario_id {
                prompt.scenario_id = Some(sid);
            } else if item.clear_scenario.unwrap_or(false) {
                prompt.scenario_id = None;
            }
            if let Some(tags) = &item.tags {
                prompt.tags = tags.clone();
            }
            updated += 1;
        }

        match promptdeck_core::write_library(&req.library, &library) {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Updated {} prompt(s)",
                updated
            ))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
        }
    }

    #[tool(description = "Delete one or more prompts by ID")]
    fn delete_prompts(
        &self,
        Parameters(req): Parameters<DeletePromptRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut library = match promptdeck_core::read_library(&req.library) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to read library '{}': {}",
                    req.library, e
                ))]));
            }
        };

        let to_delete: HashSet<PromptId> = req.prompt_ids.iter().copied().collect();
        let before = library.prompts.len();
        library.prompts.retain(|p| !to_delete.contains(&p.id));
        let removed = before - library.prompts.len();

        match promptdeck_core::write_library(&req.library, &library) {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Deleted {} prompt(s)",
                removed
            ))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
        }
    }

    #[tool(
        description = "List prompts matching the category constraints. Omit a level to mean no constraint at that level; a level-1 id alone returns the whole subtree's prompts. Uncategorized prompts only appear when no constraint is set. Order is stable (library order). Each row carries the resolved scenario path."
    )]
    fn list_prompts(
        &self,
        Parameters(req): Parameters<ListPromptsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let library = match promptdeck_core::read_library(&req.library) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to read library '{}': {}",
                    req.library, e
                ))]));
            }
        };

        let filter = CategoryFilter {
            level1: req.level1,
            level2: req.level2,
            level3: req.level3,
        };
        let matches = taxonomy::filter_prompts(&library.prompts, &library.categories, &filter);

        let rows: Vec<serde_json::Value> = matches
            .iter()
            .map(|p| {
                let path = p
                    .scenario_id
                    .map(|id| taxonomy::resolve_path(id, &library.categories, " > "))
                    .unwrap_or_default();
                serde_json::json!({
                    "id": p.id,
                    "title": p.title,
                    "scenarioId": p.scenario_id,
                    "scenarioPath": path,
                    "tags": p.tags,
                })
            })
            .collect();

        let result = serde_json::json!({
            "count": rows.len(),
            "prompts": rows,
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&result).unwrap_or_default(),
        )]))
    }

    #[tool(
        description = "Resolve a deep-linked scenario query parameter into level-1/2/3 filter selections. Malformed (non-numeric) input resolves to no selection. A well-formed id with a broken ancestor chain is a data-integrity error, never a partial selection."
    )]
    fn resolve_selection(
        &self,
        Parameters(req): Parameters<ResolveSelectionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let library = match promptdeck_core::read_library(&req.library) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to read library '{}': {}",
                    req.library, e
                ))]));
            }
        };

        let Some(target) = taxonomy::parse_scenario_param(&req.scenario) else {
            return Ok(CallToolResult::success(vec![Content::text(
                "No selection (scenario parameter is not a valid id)".to_string(),
            )]));
        };

        match taxonomy::resolve_selection(target, &library.categories) {
            Ok(selection) => Ok(CallToolResult::success(vec![Content::text(
                serde_json::to_string_pretty(&selection).unwrap_or_default(),
            )])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
                "Cannot resolve selection: {}",
                e
            ))])),
        }
    }

    #[tool(
        description = "Count prompts filed under a category or any of its descendants. Unknown ids count 0."
    )]
    fn count_prompts(
        &self,
        Parameters(req): Parameters<CountPromptsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let library = match promptdeck_core::read_library(&req.library) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to read library '{}': {}",
                    req.library, e
                ))]));
            }
        };

        let count = taxonomy::count_prompts(req.category_id, &library.categories, &library.prompts);
        let path = taxonomy::resolve_path(req.category_id, &library.categories, " > ");
        let label = if path.is_empty() {
            format!("Category {} (not found)", req.category_id)
        } else {
            format!("Category {} (\"{}\")", req.category_id, path)
        };
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{}: {} prompt(s) including descendants",
            label, count
        ))]))
    }

    #[tool(
        description = "Render a prompt's content with values for its {{variable}} placeholders. Fails with the full list of missing variable names if any placeholder is left unfilled."
    )]
    fn render_prompt(
        &self,
        Parameters(req): Parameters<RenderPromptRequest>,
    ) -> Result<CallToolResult, McpError> {
        let library = match promptdeck_core::read_library(&req.library) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to read library '{}': {}",
                    req.library, e
                ))]));
            }
        };

        let prompt = match library.prompts.iter().find(|p| p.id == req.prompt_id) {
            Some(p) => p,
            None => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Prompt {} not found",
                    req.prompt_id
                ))]));
            }
        };

        let values = req.variables.unwrap_or_default();
        match template::render(&prompt.content, &values) {
            Ok(rendered) => Ok(CallToolResult::success(vec![Content::text(rendered)])),
            Err(e) => {
                let vars = template::extract_variables(&prompt.content);
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "{} (prompt variables: {})",
                    e,
                    vars.join(", ")
                ))]))
            }
        }
    }

    #[tool(
        description = "Ask the configured AI backend to suggest a category for a prompt. Returns {categoryId, path, reason}. Requires provider/model (and usually an API key) in ~/.promptdeck/settings.json. The suggestion is advisory: file it with update_prompts after the user confirms."
    )]
    async fn suggest_category(
        &self,
        Parameters(req): Parameters<SuggestCategoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let library = match promptdeck_core::read_library(&req.library) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to read library '{}': {}",
                    req.library, e
                ))]));
            }
        };

        let prompt = match library.prompts.iter().find(|p| p.id == req.prompt_id) {
            Some(p) => p.clone(),
            None => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Prompt {} not found",
                    req.prompt_id
                ))]));
            }
        };

        let settings = promptdeck_core::read_settings();
        if !promptdeck_core::ai_configured(&settings) {
            return Ok(CallToolResult::error(vec![Content::text(
                "AI is not configured. Set provider, model, and apiKey in ~/.promptdeck/settings.json"
                    .to_string(),
            )]));
        }

        match promptdeck_classify::suggest_category(&library, &prompt, &settings).await {
            Some(suggestion) => Ok(CallToolResult::success(vec![Content::text(
                serde_json::to_string_pretty(&suggestion).unwrap_or_default(),
            )])),
            None => Ok(CallToolResult::error(vec![Content::text(
                "No suggestion available (backend unreachable or output named no category)"
                    .to_string(),
            )])),
        }
    }

    #[tool(
        description = "Get the taxonomy rules that govern how categories are structured and prompts are classified"
    )]
    fn get_rules(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(
            promptdeck_core::rules::RULES,
        )]))
    }
}

#[tool_handler]
impl ServerHandler for PromptdeckServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!(
            "{}\n\n## Taxonomy Rules\n{}",
            INSTRUCTIONS,
            promptdeck_core::rules::RULES
        );
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn tree_to_json(node: &TreeNode, counts: &HashMap<CategoryId, usize>) -> serde_json::Value {
    let children: Vec<serde_json::Value> = node
        .children
        .iter()
        .map(|c| tree_to_json(c, counts))
        .collect();
    serde_json::json!({
        "id": node.category.id,
        "name": node.category.name,
        "level": node.category.level,
        "isCustom": node.category.is_custom,
        "promptCount": counts.get(&node.category.id).copied().unwrap_or(0),
        "children": children,
    })
}

const INSTRUCTIONS: &str = r#"promptdeck is a prompt library manager for educators. You are working with prompt libraries stored as .deck files (JSON format) under ~/.promptdeck/.

## Data model
- **Category** (a.k.a. scenario): a node in a fixed 3-level taxonomy. Level 1 = subject, level 2 = topic (parent is a level-1 id), level 3 = teaching scene (parent is a level-2 id). Preset categories have isCustom=false and cannot be edited or deleted.
- **Prompt**: an AI instruction template with a title, content (may contain {{variable}} placeholders), optional tags, and an optional scenarioId filing it under one category at any level.

## IDs
Category and prompt ids are positive integers, assigned automatically by add_categories/add_prompts. Use get_scenario_tree and list_prompts to discover them.

## Browsing workflow
1. `list_libraries`, then `get_scenario_tree` for the taxonomy with aggregate prompt counts.
2. `list_prompts` with level1/level2/level3 ids to narrow. Omitting a level means "all"; a level-1 id alone covers the whole subtree. Uncategorized prompts only appear in fully unconstrained listings.
3. `resolve_selection` maps a deep-linked scenario id to the level-1/2/3 selection state.

## Editing workflow
Call `get_rules` before restructuring a taxonomy. Mutations are validated: levels must be 1-3, parents must sit exactly one level up, and prompts may only reference existing categories. Deleting a category deletes its descendants and unfiles their prompts.

## Using prompts
`render_prompt` substitutes {{variable}} placeholders with supplied values. `suggest_category` asks the configured AI backend where an unfiled prompt belongs; confirm with the user before applying it via `update_prompts`."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Handle `promptdeck-mcp init` subcommand
    if std::env::args().nth(1).as_deref() == Some("init") {
        return init_project();
    }

    let service = PromptdeckServer::new()
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "MCP server error"))?;
    service.waiting().await?;
    Ok(())
}

/// Write project-scoped MCP config files in the current directory so that
/// Claude Code and/or Codex discover promptdeck-mcp when working in this
/// project. Only writes config for tools that are actually installed.
fn init_project() -> Result<(), Box<dyn std::error::Error>> {
    let binary_path = std::env::current_exe()?
        .canonicalize()?
        .to_string_lossy()
        .to_string();

    let cwd = std::env::current_dir()?;

    let has_claude = which("claude");
    let has_codex = which("codex");

    if !has_claude && !has_codex {
        eprintln!("Neither `claude` nor `codex` found in PATH.");
        eprintln!("Install Claude Code or OpenAI Codex first, then re-run `promptdeck-mcp init`.");
        std::process::exit(1);
    }

    if has_claude {
        init_claude_code(&cwd, &binary_path)?;
    }
    if has_codex {
        init_codex(&cwd, &binary_path)?;
    }

    let tools: Vec<&str> = [
        if has_claude { Some("Claude Code") } else { None },
        if has_codex { Some("Codex") } else { None },
    ]
    .into_iter()
    .flatten()
    .collect();
    eprintln!("\nDone. {} will use promptdeck in this project.", tools.join(" and "));

    Ok(())
}

fn which(name: &str) -> bool {
    // Check PATH for the given binary
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| {
                let candidate = dir.join(name);
                candidate.is_file() || dir.join(format!("{name}.exe")).is_file()
            })
        })
        .unwrap_or(false)
}

/// Write .mcp.json for Claude Code, merging with any existing config.
fn init_claude_code(
    cwd: &std::path::Path,
    binary_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mcp_json_path = cwd.join(".mcp.json");
    let mut root: serde_json::Value = if mcp_json_path.exists() {
        let contents = std::fs::read_to_string(&mcp_json_path)?;
        serde_json::from_str(&contents).unwrap_or_else(|_| serde_json::json!({}))
    } else {
        serde_json::json!({})
    };

    if !root.get("mcpServers").is_some_and(|v| v.is_object()) {
        root["mcpServers"] = serde_json::json!({});
    }
    root["mcpServers"]["promptdeck"] = serde_json::json!({
        "type": "stdio",
        "command": binary_path,
        "args": [],
    });

    std::fs::write(&mcp_json_path, serde_json::to_string_pretty(&root)?)?;
    eprintln!("Wrote {}", mcp_json_path.display());
    Ok(())
}

/// Write .codex/config.toml for OpenAI Codex, merging with any existing config.
fn init_codex(
    cwd: &std::path::Path,
    binary_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let codex_dir = cwd.join(".codex");
    let config_toml_path = codex_dir.join("config.toml");

    let mut doc: toml_edit::DocumentMut = if config_toml_path.exists() {
        std::fs::read_to_string(&config_toml_path)?
            .parse()
            .unwrap_or_default()
    } else {
        toml_edit::DocumentMut::new()
    };

    if !doc.contains_table("mcp_servers") {
        doc["mcp_servers"] = toml_edit::Item::Table(toml_edit::Table::new());
    }

    let mut server = toml_edit::Table::new();
    server.insert("command", toml_edit::value(binary_path));
    server.insert("args", toml_edit::value(toml_edit::Array::new()));
    doc["mcp_servers"]["promptdeck"] = toml_edit::Item::Table(server);

    std::fs::create_dir_all(&codex_dir)?;
    std::fs::write(&config_toml_path, doc.to_string())?;
    eprintln!("Wrote {}", config_toml_path.display());
    Ok(())
}
