//! List statistics: distribution of items over columns and categories plus
//! how complete the items are filled in.

use std::collections::HashMap;

use serde::Serialize;

use crate::forest::{CategoryNode, build_forest};
use crate::model::{Category, Column, ListItem};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct Share {
    pub count: usize,
    pub percentage: f64,
}

impl Share {
    fn of(count: usize, total: usize) -> Self {
        Self {
            count,
            percentage: percent(count, total),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStat {
    pub column_id: String,
    pub header: String,
    pub share: Share,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubcategoryStat {
    pub category_id: String,
    pub name: String,
    pub share: Share,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStat {
    pub category_id: String,
    pub name: String,
    pub color: String,
    pub icon: Option<String>,
    pub total: Share,
    pub direct: Share,
    pub subcategories: Vec<SubcategoryStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Completion {
    pub with_dates: Share,
    pub with_tags: Share,
    pub with_description: Share,
    pub with_category: Share,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_items: usize,
    pub by_column: Vec<ColumnStat>,
    pub by_category: Vec<CategoryStat>,
    pub uncategorized: Share,
    /// Items pointing at a category id that no longer exists.
    pub orphaned: Share,
    pub completion: Completion,
}

pub fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Legacy subcategory encoding: an item stored on a main category whose tag
/// matches (case-insensitively) the name of one of its subcategories. The
/// first subcategory in `subcategories` order wins.
pub fn infer_subcategory<'a>(item: &ListItem, subcategories: &[&'a Category]) -> Option<&'a Category> {
    subcategories.iter().copied().find(|sub| {
        let name = sub.name.to_lowercase();
        item.tags.iter().any(|tag| tag.to_lowercase() == name)
    })
}

/// Where a category sits relative to its main category: the root id and,
/// below the root, the root's direct child on the way down.
struct Placement<'a> {
    root: &'a str,
    sub: Option<&'a str>,
}

fn placements(forest: &[CategoryNode]) -> HashMap<&str, Placement<'_>> {
    fn mark<'a>(node: &'a CategoryNode, root: &'a str, sub: &'a str, out: &mut HashMap<&'a str, Placement<'a>>) {
        out.insert(node.id(), Placement { root, sub: Some(sub) });
        for child in &node.children {
            mark(child, root, sub, out);
        }
    }

    let mut out = HashMap::new();
    for root in forest {
        out.insert(root.id(), Placement { root: root.id(), sub: None });
        for child in &root.children {
            mark(child, root.id(), child.id(), &mut out);
        }
    }
    out
}

/// Computes statistics for `items`, which may be the whole list or a
/// filtered subset. Pure: the same inputs always give the same output.
///
/// A root's total covers its whole subtree, not just the root and its direct
/// subcategories. Items in a category two or more levels down are counted
/// under the root's direct child on their parent chain.
#[tracing::instrument(skip_all, fields(items = items.len()))]
pub fn aggregate(items: &[ListItem], columns: &[Column], categories: &[Category]) -> Statistics {
    let total = items.len();

    let mut sorted_columns: Vec<&Column> = columns.iter().collect();
    sorted_columns.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
    let by_column = sorted_columns
        .into_iter()
        .map(|column| ColumnStat {
            column_id: column.id.clone(),
            header: column.header.clone(),
            share: Share::of(items.iter().filter(|i| i.column_id == column.id).count(), total),
        })
        .collect();

    let forest = build_forest(categories);
    let placed = placements(&forest);

    // root id -> (total, direct, per-subcategory counts)
    let mut root_counts: HashMap<&str, (usize, usize, HashMap<&str, usize>)> = HashMap::new();
    let mut uncategorized = 0;
    let mut orphaned = 0;

    for item in items {
        let Some(category_id) = item.category_id.as_deref() else {
            uncategorized += 1;
            continue;
        };
        let Some(placement) = placed.get(category_id) else {
            orphaned += 1;
            continue;
        };

        let sub = match placement.sub {
            Some(sub) => Some(sub),
            None => attribute_on_root(item, placement.root, &forest),
        };

        let entry = root_counts.entry(placement.root).or_default();
        entry.0 += 1;
        match sub {
            Some(sub) => *entry.2.entry(sub).or_default() += 1,
            None => entry.1 += 1,
        }
    }

    let by_category = forest
        .iter()
        .map(|root| {
            let (root_total, direct, subs) = root_counts.remove(root.id()).unwrap_or_default();
            CategoryStat {
                category_id: root.category.id.clone(),
                name: root.category.name.clone(),
                color: root.category.color.clone(),
                icon: root.category.icon.clone(),
                total: Share::of(root_total, total),
                direct: Share::of(direct, total),
                subcategories: root
                    .children
                    .iter()
                    .map(|child| SubcategoryStat {
                        category_id: child.category.id.clone(),
                        name: child.category.name.clone(),
                        share: Share::of(subs.get(child.id()).copied().unwrap_or(0), total),
                    })
                    .collect(),
            }
        })
        .collect();

    let count = |pred: fn(&ListItem) -> bool| items.iter().filter(|i| pred(i)).count();
    let completion = Completion {
        with_dates: Share::of(count(ListItem::has_dates), total),
        with_tags: Share::of(count(|i| !i.tags.is_empty()), total),
        with_description: Share::of(count(ListItem::has_description), total),
        with_category: Share::of(count(|i| i.category_id.is_some()), total),
    };

    Statistics {
        total_items: total,
        by_column,
        by_category,
        uncategorized: Share::of(uncategorized, total),
        orphaned: Share::of(orphaned, total),
        completion,
    }
}

/// Subcategory for an item stored directly on a main category: the explicit
/// `subcategory_id` if it names a direct child, else the tag fallback.
fn attribute_on_root<'a>(item: &ListItem, root_id: &str, forest: &'a [CategoryNode]) -> Option<&'a str> {
    let root = forest.iter().find(|node| node.id() == root_id)?;

    if let Some(explicit) = item.subcategory_id.as_deref()
        && let Some(child) = root.children.iter().find(|c| c.id() == explicit)
    {
        return Some(child.id());
    }

    let subs: Vec<&Category> = root.children.iter().map(|c| &c.category).collect();
    infer_subcategory(item, &subs).map(|c| c.id.as_str())
}
