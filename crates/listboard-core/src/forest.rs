//! Category hierarchy helpers.
//!
//! Categories are stored flat with an optional `parentId`. This module turns
//! them into a forest, validates reparenting and answers ancestry queries.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::error::{Error, Result};
use crate::model::Category;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNode {
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    pub fn id(&self) -> &str {
        &self.category.id
    }

    /// Number of nodes in this subtree, including itself.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(CategoryNode::size).sum::<usize>()
    }
}

/// Builds the forest. Roots and children keep the relative order of the
/// input. A category whose parent is unset or not in `categories` is a root.
///
/// Categories unreachable from any root sit on a parent cycle; they are
/// promoted to roots so every category shows up exactly once.
pub fn build_forest(categories: &[Category]) -> Vec<CategoryNode> {
    let present: HashSet<&str> = categories.iter().map(|c| c.id.as_str()).collect();

    let mut children_map: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (idx, category) in categories.iter().enumerate() {
        match category.parent_id.as_deref() {
            Some(parent) if present.contains(parent) => {
                children_map.entry(parent).or_default().push(idx);
            }
            _ => roots.push(idx),
        }
    }

    fn attach(
        idx: usize,
        categories: &[Category],
        children_map: &HashMap<&str, Vec<usize>>,
        visited: &mut HashSet<usize>,
    ) -> CategoryNode {
        visited.insert(idx);
        let category = &categories[idx];
        let mut children = Vec::new();
        if let Some(kids) = children_map.get(category.id.as_str()) {
            for &kid in kids {
                if !visited.contains(&kid) {
                    children.push(attach(kid, categories, children_map, visited));
                }
            }
        }
        CategoryNode {
            category: category.clone(),
            children,
        }
    }

    let mut visited = HashSet::new();
    let mut forest: Vec<CategoryNode> = roots
        .into_iter()
        .map(|idx| attach(idx, categories, &children_map, &mut visited))
        .collect();

    for idx in 0..categories.len() {
        if !visited.contains(&idx) {
            warn!(category = %categories[idx].id, "category parent chain forms a cycle; promoting to root");
            forest.push(attach(idx, categories, &children_map, &mut visited));
        }
    }

    forest
}

/// Case-insensitive alphabetical order of roots, for flat management views.
pub fn sort_roots_by_name(forest: &mut [CategoryNode]) {
    forest.sort_by_key(|node| node.category.name.to_lowercase());
}

/// Depth-first `(category, depth)` pairs in display order.
pub fn flatten(forest: &[CategoryNode]) -> Vec<(&Category, usize)> {
    fn walk<'a>(node: &'a CategoryNode, depth: usize, out: &mut Vec<(&'a Category, usize)>) {
        out.push((&node.category, depth));
        for child in &node.children {
            walk(child, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    for root in forest {
        walk(root, 0, &mut out);
    }
    out
}

/// Direct children of `parent_id`, in input order.
pub fn subcategories_of<'a>(categories: &'a [Category], parent_id: &str) -> Vec<&'a Category> {
    categories
        .iter()
        .filter(|c| c.parent_id.as_deref() == Some(parent_id))
        .collect()
}

/// Ids from `id` up to its root, starting with `id` itself. Stops at a
/// missing parent or when the chain loops back on itself.
pub fn ancestor_chain(categories: &[Category], id: &str) -> Vec<String> {
    let by_id: HashMap<&str, &Category> = categories.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(id);
    while let Some(cur) = current {
        if !seen.insert(cur) {
            break;
        }
        let Some(category) = by_id.get(cur) else {
            break;
        };
        chain.push(category.id.clone());
        current = category.parent_id.as_deref();
    }
    chain
}

/// Rejects a move that would make `category_id` its own descendant. The
/// parent chain of `new_parent_id` is walked up to the root; if the moved
/// category is on it the move is refused.
pub fn check_reparent(categories: &[Category], category_id: &str, new_parent_id: Option<&str>) -> Result<()> {
    let Some(new_parent) = new_parent_id else {
        return Ok(());
    };

    if new_parent == category_id || ancestor_chain(categories, new_parent).iter().any(|id| id == category_id) {
        return Err(Error::CategoryCycle {
            category: category_id.to_string(),
            new_parent: new_parent.to_string(),
        });
    }
    Ok(())
}
