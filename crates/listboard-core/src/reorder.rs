//! Drag-and-drop reordering.
//!
//! Columns carry a dense zero-based `order` inside their list and items a
//! dense zero-based `order` inside their column. Every function here keeps
//! that invariant for the containers it touches and returns the entities
//! whose `order` or `columnId` changed, so callers can persist exactly those
//! in one batch.

use std::collections::{BTreeSet, HashMap};

use listboard_shared::Slot;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Column, ListItem};

/// Moves the column at `from` to `to` (clamped to the end) and renumbers
/// every column. Columns are read in `(order, id)` order.
pub fn move_column(columns: &mut Vec<Column>, from: usize, to: usize) -> Result<Vec<Column>> {
    sort_columns(columns);
    if from >= columns.len() {
        return Err(Error::not_found("column position", from.to_string()));
    }
    let to = to.min(columns.len() - 1);
    if from == to {
        debug!(from, "column move is a no-op");
        return Ok(vec![]);
    }

    let before: HashMap<String, usize> = columns.iter().map(|c| (c.id.clone(), c.order)).collect();
    let moved = columns.remove(from);
    columns.insert(to, moved);

    let mut changed = Vec::new();
    for (idx, column) in columns.iter_mut().enumerate() {
        column.order = idx;
        if before.get(&column.id) != Some(&idx) {
            changed.push(column.clone());
        }
    }
    debug!(from, to, changed = changed.len(), "moved column");
    Ok(changed)
}

/// Moves the item sitting at `source` to `destination`. When the column
/// changes, both columns are renumbered and the item's `column_id` follows
/// it. Identical slots are a no-op.
pub fn move_item(items: &mut [ListItem], source: &Slot, destination: &Slot) -> Result<Vec<ListItem>> {
    if source == destination {
        debug!(column = %source.column_id, index = source.index, "item move is a no-op");
        return Ok(vec![]);
    }

    let mut source_ids = column_item_ids(items, &source.column_id);
    if source.index >= source_ids.len() {
        return Err(Error::not_found(
            "item position",
            format!("{}[{}]", source.column_id, source.index),
        ));
    }
    let moved = source_ids.remove(source.index);

    let same_column = source.column_id == destination.column_id;
    let mut destination_ids = if same_column {
        std::mem::take(&mut source_ids)
    } else {
        column_item_ids(items, &destination.column_id)
    };
    let at = destination.index.min(destination_ids.len());
    destination_ids.insert(at, moved);

    let before = snapshot(items);
    renumber(items, &destination_ids, &destination.column_id);
    if !same_column {
        renumber(items, &source_ids, &source.column_id);
    }

    let changed = changed_since(items, &before);
    debug!(
        from = %source.column_id,
        to = %destination.column_id,
        index = at,
        changed = changed.len(),
        "moved item"
    );
    Ok(changed)
}

/// Where `item_id` currently sits, if present.
pub fn locate_item(items: &[ListItem], item_id: &str) -> Option<Slot> {
    let item = items.iter().find(|i| i.id == item_id)?;
    let index = column_item_ids(items, &item.column_id)
        .iter()
        .position(|id| id == item_id)?;
    Some(Slot {
        column_id: item.column_id.clone(),
        index,
    })
}

/// Renumbers every column's items to `0..n`, keeping their relative
/// `(order, id)` order. Repairs gaps and duplicates left by older writers.
pub fn normalize_items(items: &mut [ListItem]) -> Vec<ListItem> {
    let before = snapshot(items);
    let columns: BTreeSet<String> = items.iter().map(|i| i.column_id.clone()).collect();
    for column_id in columns {
        let ids = column_item_ids(items, &column_id);
        renumber(items, &ids, &column_id);
    }
    changed_since(items, &before)
}

/// Column counterpart of [`normalize_items`].
pub fn normalize_columns(columns: &mut [Column]) -> Vec<Column> {
    sort_columns(columns);
    let mut changed = Vec::new();
    for (idx, column) in columns.iter_mut().enumerate() {
        if column.order != idx {
            column.order = idx;
            changed.push(column.clone());
        }
    }
    changed
}

pub fn is_dense(orders: impl IntoIterator<Item = usize>) -> bool {
    let mut orders: Vec<usize> = orders.into_iter().collect();
    orders.sort_unstable();
    orders.iter().enumerate().all(|(idx, order)| idx == *order)
}

fn sort_columns(columns: &mut [Column]) {
    columns.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
}

fn column_item_ids(items: &[ListItem], column_id: &str) -> Vec<String> {
    let mut members: Vec<&ListItem> = items.iter().filter(|i| i.column_id == column_id).collect();
    members.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
    members.into_iter().map(|i| i.id.clone()).collect()
}

fn renumber(items: &mut [ListItem], ids: &[String], column_id: &str) {
    let positions: HashMap<&str, usize> = ids.iter().enumerate().map(|(idx, id)| (id.as_str(), idx)).collect();
    for item in items.iter_mut() {
        if let Some(&idx) = positions.get(item.id.as_str()) {
            item.order = idx;
            item.column_id = column_id.to_string();
        }
    }
}

fn snapshot(items: &[ListItem]) -> HashMap<String, (String, usize)> {
    items
        .iter()
        .map(|i| (i.id.clone(), (i.column_id.clone(), i.order)))
        .collect()
}

fn changed_since(items: &[ListItem], before: &HashMap<String, (String, usize)>) -> Vec<ListItem> {
    items
        .iter()
        .filter(|i| before.get(&i.id) != Some(&(i.column_id.clone(), i.order)))
        .cloned()
        .collect()
}
