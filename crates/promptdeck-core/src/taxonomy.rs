//! Scenario taxonomy engine: tree construction, prompt count aggregation,
//! ancestor resolution, and category filtering.
//!
//! All operations are pure functions over flat category/prompt snapshots.
//! Ancestor chains are not trusted to be acyclic: every upward or downward
//! walk carries a visited guard and degrades instead of looping.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;

use crate::{Category, CategoryId, Prompt};

/// Maximum depth of the taxonomy. Hard-coded, not configurable.
pub const MAX_LEVEL: u8 = 3;

/// A category with its resolved children, as displayed in the tree view.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub category: Category,
    pub children: Vec<TreeNode>,
}

/// Lookup index over one flat category snapshot: id and children maps built
/// once and shared by the tree, count, and path operations.
struct CategoryIndex<'a> {
    by_id: HashMap<CategoryId, &'a Category>,
    children: HashMap<CategoryId, Vec<&'a Category>>,
}

impl<'a> CategoryIndex<'a> {
    fn new(categories: &'a [Category]) -> Self {
        let mut by_id = HashMap::with_capacity(categories.len());
        let mut children: HashMap<CategoryId, Vec<&'a Category>> = HashMap::new();
        for cat in categories {
            by_id.insert(cat.id, cat);
            if let Some(pid) = cat.parent_id {
                children.entry(pid).or_default().push(cat);
            }
        }
        Self { by_id, children }
    }

    fn get(&self, id: CategoryId) -> Option<&'a Category> {
        self.by_id.get(&id).copied()
    }

    fn children_of(&self, id: CategoryId) -> &[&'a Category] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Build the 3-level display tree from a flat category list.
///
/// Categories with a level outside 1..=3, or whose parent link is dangling
/// or points at the wrong level, are silently omitted — the tree must still
/// render for the well-formed remainder.
pub fn build_tree(categories: &[Category]) -> Vec<TreeNode> {
    let index = CategoryIndex::new(categories);
    categories
        .iter()
        .filter(|c| c.level == 1)
        .map(|l1| TreeNode {
            category: l1.clone(),
            children: child_nodes(l1, 2, &index),
        })
        .collect()
}

fn child_nodes(parent: &Category, level: u8, index: &CategoryIndex<'_>) -> Vec<TreeNode> {
    index
        .children_of(parent.id)
        .iter()
        .filter(|c| c.level == level)
        .map(|child| TreeNode {
            category: (*child).clone(),
            children: if level < MAX_LEVEL {
                child_nodes(child, level + 1, index)
            } else {
                Vec::new()
            },
        })
        .collect()
}

fn direct_counts(prompts: &[Prompt]) -> HashMap<CategoryId, usize> {
    let mut counts: HashMap<CategoryId, usize> = HashMap::new();
    for prompt in prompts {
        if let Some(id) = prompt.scenario_id {
            *counts.entry(id).or_insert(0) += 1;
        }
    }
    counts
}

/// Aggregate prompt count for every category in one pass: a category's count
/// is the number of prompts filed directly under it plus the counts of all
/// its descendants. Memoized bottom-up, O(categories + prompts).
pub fn prompt_counts(categories: &[Category], prompts: &[Prompt]) -> HashMap<CategoryId, usize> {
    let index = CategoryIndex::new(categories);
    let direct = direct_counts(prompts);
    let mut memo: HashMap<CategoryId, usize> = HashMap::with_capacity(categories.len());
    let mut visiting = HashSet::new();
    for cat in categories {
        count_memoized(cat.id, &index, &direct, &mut memo, &mut visiting);
    }
    memo
}

fn count_memoized(
    id: CategoryId,
    index: &CategoryIndex<'_>,
    direct: &HashMap<CategoryId, usize>,
    memo: &mut HashMap<CategoryId, usize>,
    visiting: &mut HashSet<CategoryId>,
) -> usize {
    if let Some(&n) = memo.get(&id) {
        return n;
    }
    // Cycle guard: a category already on the walk contributes nothing.
    if !visiting.insert(id) {
        return 0;
    }
    let mut total = direct.get(&id).copied().unwrap_or(0);
    for child in index.children_of(id) {
        total += count_memoized(child.id, index, direct, memo, visiting);
    }
    visiting.remove(&id);
    memo.insert(id, total);
    total
}

/// Aggregate prompt count for a single category. Unknown ids count 0.
pub fn count_prompts(
    category_id: CategoryId,
    categories: &[Category],
    prompts: &[Prompt],
) -> usize {
    let index = CategoryIndex::new(categories);
    if index.get(category_id).is_none() {
        return 0;
    }
    let direct = direct_counts(prompts);
    let mut memo = HashMap::new();
    let mut visiting = HashSet::new();
    count_memoized(category_id, &index, &direct, &mut memo, &mut visiting)
}

/// Human-readable ancestor chain for a category, root first, e.g.
/// "Science > Physics > Mechanics". Unknown ids resolve to an empty string.
/// A dangling or cyclic parent link stops the walk at the last good ancestor.
pub fn resolve_path(category_id: CategoryId, categories: &[Category], separator: &str) -> String {
    let index = CategoryIndex::new(categories);
    let Some(mut current) = index.get(category_id) else {
        return String::new();
    };
    let mut names = vec![current.name.as_str()];
    let mut visited = HashSet::from([current.id]);
    while let Some(pid) = current.parent_id {
        match index.get(pid) {
            Some(parent) if visited.insert(parent.id) => {
                names.push(parent.name.as_str());
                current = parent;
            }
            _ => break,
        }
    }
    names.reverse();
    names.join(separator)
}

/// Per-level filter selection derived from a deep-linked category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level1: Option<CategoryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level2: Option<CategoryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level3: Option<CategoryId>,
}

/// Data-integrity failures while resolving a category's ancestor chain.
/// These are surfaced to the caller, never silently partially applied.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SelectionError {
    #[error("category {0} does not exist")]
    UnknownCategory(CategoryId),
    #[error("category {category} (level {level}) has no parent link")]
    NoParent { category: CategoryId, level: u8 },
    #[error("category {category} references missing parent {parent}")]
    MissingParent {
        category: CategoryId,
        parent: CategoryId,
    },
    #[error("category {category} is at level {found}, expected level {expected}")]
    LevelMismatch {
        category: CategoryId,
        expected: u8,
        found: u8,
    },
    #[error("category {category} has invalid level {level}")]
    InvalidLevel { category: CategoryId, level: u8 },
}

fn parent_at<'a>(
    cat: &Category,
    expected_level: u8,
    index: &CategoryIndex<'a>,
) -> Result<&'a Category, SelectionError> {
    let pid = cat.parent_id.ok_or(SelectionError::NoParent {
        category: cat.id,
        level: cat.level,
    })?;
    let parent = index.get(pid).ok_or(SelectionError::MissingParent {
        category: cat.id,
        parent: pid,
    })?;
    if parent.level != expected_level {
        return Err(SelectionError::LevelMismatch {
            category: parent.id,
            expected: expected_level,
            found: parent.level,
        });
    }
    Ok(parent)
}

/// Resolve the level-1/2/3 filter selections that put the UI in the state
/// matching a deep-linked target category. Broken chains are explicit errors.
pub fn resolve_selection(
    target: CategoryId,
    categories: &[Category],
) -> Result<Selection, SelectionError> {
    let index = CategoryIndex::new(categories);
    let cat = index
        .get(target)
        .ok_or(SelectionError::UnknownCategory(target))?;
    match cat.level {
        1 => Ok(Selection {
            level1: Some(target),
            ..Selection::default()
        }),
        2 => {
            let parent = parent_at(cat, 1, &index)?;
            Ok(Selection {
                level1: Some(parent.id),
                level2: Some(target),
                level3: None,
            })
        }
        3 => {
            let parent = parent_at(cat, 2, &index)?;
            let grandparent = parent_at(parent, 1, &index)?;
            Ok(Selection {
                level1: Some(grandparent.id),
                level2: Some(parent.id),
                level3: Some(target),
            })
        }
        level => Err(SelectionError::InvalidLevel {
            category: target,
            level,
        }),
    }
}

/// Active category constraints at each level. `None` means no constraint
/// ("all") at that level.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryFilter {
    pub level1: Option<CategoryId>,
    pub level2: Option<CategoryId>,
    pub level3: Option<CategoryId>,
}

impl CategoryFilter {
    pub fn is_unconstrained(&self) -> bool {
        self.level1.is_none() && self.level2.is_none() && self.level3.is_none()
    }
}

/// Filter prompts by the selected category constraints. Stable: matching
/// prompts keep their input order. Prompts that are uncategorized, or that
/// reference a category missing from the snapshot, match only the fully
/// unconstrained filter.
pub fn filter_prompts<'a>(
    prompts: &'a [Prompt],
    categories: &[Category],
    filter: &CategoryFilter,
) -> Vec<&'a Prompt> {
    let index = CategoryIndex::new(categories);
    prompts
        .iter()
        .filter(|p| prompt_matches(p, &index, filter))
        .collect()
}

fn prompt_matches(prompt: &Prompt, index: &CategoryIndex<'_>, filter: &CategoryFilter) -> bool {
    let cat = match prompt.scenario_id.and_then(|id| index.get(id)) {
        Some(c) => c,
        None => return filter.is_unconstrained(),
    };
    match cat.level {
        1 => {
            // A prompt filed at level 1 sits above any level-2/3 narrowing.
            filter.level2.is_none()
                && filter.level3.is_none()
                && filter.level1.map_or(true, |id| id == cat.id)
        }
        2 => {
            if filter.level3.is_some() {
                return false;
            }
            if let Some(l1) = filter.level1 {
                if cat.parent_id != Some(l1) {
                    return false;
                }
            }
            filter.level2.map_or(true, |id| id == cat.id)
        }
        3 => {
            let parent = cat.parent_id.and_then(|pid| index.get(pid));
            if let Some(l1) = filter.level1 {
                match parent {
                    Some(par) if par.parent_id == Some(l1) => {}
                    _ => return false,
                }
            }
            if let Some(l2) = filter.level2 {
                if parent.map(|p| p.id) != Some(l2) {
                    return false;
                }
            }
            filter.level3.map_or(true, |id| id == cat.id)
        }
        // Out-of-range level: treat like an unresolvable category.
        _ => filter.is_unconstrained(),
    }
}

/// Parse a `?scenario=` URL query parameter. Non-numeric or non-positive
/// input is "no selection", never an error.
pub fn parse_scenario_param(raw: &str) -> Option<CategoryId> {
    raw.trim().parse::<CategoryId>().ok().filter(|id| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: CategoryId, name: &str, level: u8, parent_id: Option<CategoryId>) -> Category {
        Category {
            id,
            name: name.to_string(),
            level,
            parent_id,
            description: None,
            icon: None,
            is_custom: false,
        }
    }

    fn prompt(id: i64, scenario_id: Option<CategoryId>) -> Prompt {
        Prompt {
            id,
            title: format!("prompt {}", id),
            content: String::new(),
            scenario_id,
            tags: vec![],
            score: None,
            use_count: 0,
            created_at: None,
            updated_at: None,
        }
    }

    /// Science > Physics > Mechanics/Optics, Science > Chemistry, History.
    fn taxonomy() -> Vec<Category> {
        vec![
            cat(1, "Science", 1, None),
            cat(2, "Physics", 2, Some(1)),
            cat(3, "Mechanics", 3, Some(2)),
            cat(4, "Optics", 3, Some(2)),
            cat(5, "Chemistry", 2, Some(1)),
            cat(6, "History", 1, None),
        ]
    }

    fn prompts() -> Vec<Prompt> {
        vec![
            prompt(10, Some(1)),
            prompt(11, Some(2)),
            prompt(12, Some(3)),
            prompt(13, Some(3)),
            prompt(14, Some(4)),
            prompt(15, Some(5)),
            prompt(16, Some(6)),
            prompt(17, None),
        ]
    }

    fn collect_ids(nodes: &[TreeNode], out: &mut Vec<CategoryId>) {
        for node in nodes {
            out.push(node.category.id);
            collect_ids(&node.children, out);
        }
    }

    #[test]
    fn tree_contains_every_well_formed_category_once() {
        let cats = taxonomy();
        let tree = build_tree(&cats);
        let mut ids = Vec::new();
        collect_ids(&tree, &mut ids);
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn tree_shape_follows_parent_links() {
        let tree = build_tree(&taxonomy());
        assert_eq!(tree.len(), 2);
        let science = &tree[0];
        assert_eq!(science.category.name, "Science");
        assert_eq!(science.children.len(), 2);
        let physics = &science.children[0];
        assert_eq!(physics.category.name, "Physics");
        let leaves: Vec<&str> = physics
            .children
            .iter()
            .map(|n| n.category.name.as_str())
            .collect();
        assert_eq!(leaves, vec!["Mechanics", "Optics"]);
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn dangling_parent_is_omitted_without_error() {
        let mut cats = taxonomy();
        cats.push(cat(7, "Orphan", 2, Some(99)));
        let tree = build_tree(&cats);
        let mut ids = Vec::new();
        collect_ids(&tree, &mut ids);
        assert!(!ids.contains(&7));
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn out_of_range_level_is_omitted() {
        let mut cats = taxonomy();
        cats.push(cat(8, "Too Deep", 4, Some(3)));
        cats.push(cat(9, "Zero", 0, None));
        let tree = build_tree(&cats);
        let mut ids = Vec::new();
        collect_ids(&tree, &mut ids);
        assert!(!ids.contains(&8));
        assert!(!ids.contains(&9));
    }

    #[test]
    fn counts_aggregate_descendants() {
        let cats = taxonomy();
        let ps = prompts();
        // Physics: 1 direct + Mechanics 2 + Optics 1.
        assert_eq!(count_prompts(2, &cats, &ps), 4);
        // Science: 1 direct + Physics 4 + Chemistry 1.
        assert_eq!(count_prompts(1, &cats, &ps), 6);
        assert_eq!(count_prompts(3, &cats, &ps), 2);
        assert_eq!(count_prompts(6, &cats, &ps), 1);
    }

    #[test]
    fn count_additivity_at_level_one() {
        let cats = taxonomy();
        let ps = prompts();
        let direct_science = ps.iter().filter(|p| p.scenario_id == Some(1)).count();
        let child_sum = count_prompts(2, &cats, &ps) + count_prompts(5, &cats, &ps);
        assert_eq!(count_prompts(1, &cats, &ps), direct_science + child_sum);
    }

    #[test]
    fn leaf_with_nothing_attached_counts_zero() {
        let mut cats = taxonomy();
        cats.push(cat(7, "Thermodynamics", 3, Some(2)));
        assert_eq!(count_prompts(7, &cats, &prompts()), 0);
    }

    #[test]
    fn unknown_category_counts_zero() {
        assert_eq!(count_prompts(404, &taxonomy(), &prompts()), 0);
    }

    #[test]
    fn memo_table_agrees_with_single_counts() {
        let cats = taxonomy();
        let ps = prompts();
        let table = prompt_counts(&cats, &ps);
        for c in &cats {
            assert_eq!(table[&c.id], count_prompts(c.id, &cats, &ps), "id {}", c.id);
        }
    }

    #[test]
    fn path_joins_root_to_leaf() {
        let cats = taxonomy();
        assert_eq!(resolve_path(1, &cats, " > "), "Science");
        assert_eq!(resolve_path(2, &cats, " > "), "Science > Physics");
        assert_eq!(resolve_path(3, &cats, " / "), "Science / Physics / Mechanics");
        assert_eq!(resolve_path(42, &cats, " > "), "");
    }

    #[test]
    fn path_stops_at_dangling_parent() {
        let mut cats = taxonomy();
        cats.push(cat(7, "Orphan", 3, Some(99)));
        assert_eq!(resolve_path(7, &cats, " > "), "Orphan");
    }

    #[test]
    fn cyclic_parent_links_terminate() {
        let cats = vec![cat(1, "A", 2, Some(2)), cat(2, "B", 3, Some(1))];
        // Must not loop; the walk stops when it revisits a node.
        assert_eq!(resolve_path(2, &cats, " > "), "A > B");
        let _ = count_prompts(1, &cats, &[prompt(1, Some(1)), prompt(2, Some(2))]);
        let _ = prompt_counts(&cats, &[]);
    }

    #[test]
    fn selection_from_each_level() {
        let cats = taxonomy();
        assert_eq!(
            resolve_selection(1, &cats).unwrap(),
            Selection {
                level1: Some(1),
                level2: None,
                level3: None
            }
        );
        assert_eq!(
            resolve_selection(2, &cats).unwrap(),
            Selection {
                level1: Some(1),
                level2: Some(2),
                level3: None
            }
        );
        assert_eq!(
            resolve_selection(4, &cats).unwrap(),
            Selection {
                level1: Some(1),
                level2: Some(2),
                level3: Some(4)
            }
        );
    }

    #[test]
    fn selection_round_trip_matches_ancestors() {
        let cats = taxonomy();
        let sel = resolve_selection(3, &cats).unwrap();
        let by_id = |id: CategoryId| cats.iter().find(|c| c.id == id).unwrap();
        assert_eq!(by_id(sel.level3.unwrap()).id, 3);
        assert_eq!(by_id(sel.level2.unwrap()).id, by_id(3).parent_id.unwrap());
        assert_eq!(
            by_id(sel.level1.unwrap()).id,
            by_id(by_id(3).parent_id.unwrap()).parent_id.unwrap()
        );
    }

    #[test]
    fn broken_chains_are_explicit_errors() {
        let mut cats = taxonomy();
        cats.push(cat(7, "Orphan", 2, Some(99)));
        cats.push(cat(8, "Deep Orphan", 3, Some(7)));
        cats.push(cat(9, "Rootless", 3, None));
        assert_eq!(
            resolve_selection(42, &cats),
            Err(SelectionError::UnknownCategory(42))
        );
        assert_eq!(
            resolve_selection(7, &cats),
            Err(SelectionError::MissingParent {
                category: 7,
                parent: 99
            })
        );
        // The failure two hops up still aborts the whole resolution.
        assert_eq!(
            resolve_selection(8, &cats),
            Err(SelectionError::MissingParent {
                category: 7,
                parent: 99
            })
        );
        assert_eq!(
            resolve_selection(9, &cats),
            Err(SelectionError::NoParent {
                category: 9,
                level: 3
            })
        );
    }

    #[test]
    fn mis_leveled_parent_is_an_error() {
        // Level-3 category parented directly under a level-1 category.
        let cats = vec![cat(1, "Science", 1, None), cat(2, "Skipped", 3, Some(1))];
        assert_eq!(
            resolve_selection(2, &cats),
            Err(SelectionError::LevelMismatch {
                category: 1,
                expected: 2,
                found: 1
            })
        );
    }

    fn matched_ids(filter: CategoryFilter) -> Vec<i64> {
        let cats = taxonomy();
        let ps = prompts();
        filter_prompts(&ps, &cats, &filter)
            .iter()
            .map(|p| p.id)
            .collect()
    }

    #[test]
    fn filter_level1_matches_whole_subtree() {
        let ids = matched_ids(CategoryFilter {
            level1: Some(1),
            ..CategoryFilter::default()
        });
        assert_eq!(ids, vec![10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn filter_level2_narrows_to_branch() {
        let ids = matched_ids(CategoryFilter {
            level1: Some(1),
            level2: Some(2),
            level3: None,
        });
        assert_eq!(ids, vec![11, 12, 13, 14]);
    }

    #[test]
    fn filter_level3_narrows_to_leaf() {
        let ids = matched_ids(CategoryFilter {
            level1: Some(1),
            level2: Some(2),
            level3: Some(3),
        });
        assert_eq!(ids, vec![12, 13]);
    }

    #[test]
    fn unconstrained_filter_matches_everything() {
        let ids = matched_ids(CategoryFilter::default());
        assert_eq!(ids, vec![10, 11, 12, 13, 14, 15, 16, 17]);
    }

    #[test]
    fn uncategorized_only_matches_unconstrained() {
        let ids = matched_ids(CategoryFilter {
            level1: Some(6),
            ..CategoryFilter::default()
        });
        assert_eq!(ids, vec![16]);
    }

    #[test]
    fn dangling_prompt_reference_acts_uncategorized() {
        let cats = taxonomy();
        let ps = vec![prompt(1, Some(404)), prompt(2, Some(1))];
        let constrained = filter_prompts(
            &ps,
            &cats,
            &CategoryFilter {
                level1: Some(1),
                ..CategoryFilter::default()
            },
        );
        assert_eq!(constrained.len(), 1);
        assert_eq!(constrained[0].id, 2);
        let all = filter_prompts(&ps, &cats, &CategoryFilter::default());
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn scenario_param_rejects_malformed_input() {
        assert_eq!(parse_scenario_param("abc"), None);
        assert_eq!(parse_scenario_param(""), None);
        assert_eq!(parse_scenario_param("12.5"), None);
        assert_eq!(parse_scenario_param("-3"), None);
        assert_eq!(parse_scenario_param("0"), None);
        assert_eq!(parse_scenario_param(" 7 "), Some(7));
        assert_eq!(parse_scenario_param("42"), Some(42));
    }
}
