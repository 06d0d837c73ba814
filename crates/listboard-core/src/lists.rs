//! Lists and their columns, plus persistence of reorder results.
//!
//! Every operation is scoped to the calling [`Identity`]: a list owned by
//! someone else is reported as [`Error::Forbidden`]. Writes that touch more
//! than one document go through a single [`WriteBatch`].

use chrono::Utc;
use listboard_shared::{ColumnCreate, ColumnPatch, ListCreate, ListPatch, Slot};
use serde_json::{Map, json};
use tracing::info;

use crate::auth::{Identity, ensure_owner};
use crate::categories::non_blank;
use crate::error::{Error, Result};
use crate::model::{Column, List, ListItem, new_id};
use crate::reorder;
use crate::store::{CollectionRef, DocRef, Direction, DocumentStore, Query, WriteBatch};

pub fn lists_ref() -> CollectionRef {
    CollectionRef::root("lists")
}

pub fn list_doc(list_id: &str) -> DocRef {
    lists_ref().doc(list_id)
}

pub fn columns_ref(list_id: &str) -> CollectionRef {
    list_doc(list_id).collection("columns")
}

pub fn items_ref(list_id: &str) -> CollectionRef {
    list_doc(list_id).collection("items")
}

/// A list together with its columns and items. Items are grouped by column
/// position, then sorted by `order`.
#[derive(Debug, Clone)]
pub struct Board {
    pub list: List,
    pub columns: Vec<Column>,
    pub items: Vec<ListItem>,
}

#[tracing::instrument(skip(store, user, create), fields(user_id = %user.uid))]
pub fn create_list(store: &mut DocumentStore, user: &Identity, create: &ListCreate) -> Result<List> {
    let name = create.name.trim();
    if name.is_empty() {
        return Err(Error::validation("list name is required"));
    }

    let now = Utc::now();
    let list = List {
        id: new_id(),
        name: name.to_string(),
        description: non_blank(create.description.as_deref()),
        user_id: user.uid.clone(),
        created_at: now,
        updated_at: now,
    };
    store.set(&list_doc(&list.id), &list)?;
    info!(list_id = %list.id, "created list");
    Ok(list)
}

pub fn get_list(store: &DocumentStore, user: &Identity, list_id: &str) -> Result<List> {
    let list: List = store
        .get(&list_doc(list_id))?
        .ok_or_else(|| Error::not_found("list", list_id))?;
    ensure_owner(&list.user_id, user, "list")?;
    Ok(list)
}

/// The user's lists, newest first.
pub fn lists_for_user(store: &DocumentStore, user: &Identity) -> Result<Vec<List>> {
    let mut lists: Vec<List> = store.query(&lists_ref(), &Query::new().where_eq("userId", user.uid.as_str()))?;
    lists.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(lists)
}

#[tracing::instrument(skip(store, user, patch), fields(user_id = %user.uid))]
pub fn update_list(store: &mut DocumentStore, user: &Identity, list_id: &str, patch: &ListPatch) -> Result<List> {
    get_list(store, user, list_id)?;

    let mut fields = Map::new();
    if let Some(name) = &patch.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("list name is required"));
        }
        fields.insert("name".to_string(), json!(name));
    }
    if let Some(description) = &patch.description {
        fields.insert("description".to_string(), json!(non_blank(description.as_deref())));
    }
    if fields.is_empty() {
        return get_list(store, user, list_id);
    }

    fields.insert("updatedAt".to_string(), json!(Utc::now()));
    store.update(&list_doc(list_id), fields)?;
    info!(list_id, "updated list");
    get_list(store, user, list_id)
}

/// Builds the cascade delete of a list: every item, every column, then the
/// list itself.
pub fn delete_list_batch(store: &DocumentStore, list_id: &str) -> Result<WriteBatch> {
    let mut batch = WriteBatch::new();
    for item in load_items(store, list_id)? {
        batch.delete(&items_ref(list_id).doc(&item.id));
    }
    for column in load_columns(store, list_id)? {
        batch.delete(&columns_ref(list_id).doc(&column.id));
    }
    batch.delete(&list_doc(list_id));
    Ok(batch)
}

/// Deletes the list with its columns and items. Returns the number of
/// documents removed.
#[tracing::instrument(skip(store, user), fields(user_id = %user.uid))]
pub fn delete_list(store: &mut DocumentStore, user: &Identity, list_id: &str) -> Result<usize> {
    get_list(store, user, list_id)?;
    let batch = delete_list_batch(store, list_id)?;
    let removed = batch.len();
    store.commit(batch)?;
    info!(list_id, removed, "deleted list");
    Ok(removed)
}

pub fn load_columns(store: &DocumentStore, list_id: &str) -> Result<Vec<Column>> {
    store.query(&columns_ref(list_id), &Query::new().order_by("order", Direction::Ascending))
}

/// Items of the list ordered by column position then `order`.
pub fn load_items(store: &DocumentStore, list_id: &str) -> Result<Vec<ListItem>> {
    store.query(&items_ref(list_id), &Query::new().order_by("order", Direction::Ascending))
}

pub fn load_board(store: &DocumentStore, user: &Identity, list_id: &str) -> Result<Board> {
    let list = get_list(store, user, list_id)?;
    let columns = load_columns(store, list_id)?;

    let position = |column_id: &str| columns.iter().position(|c| c.id == column_id).unwrap_or(usize::MAX);
    let mut items = load_items(store, list_id)?;
    items.sort_by(|a, b| {
        position(&a.column_id)
            .cmp(&position(&b.column_id))
            .then_with(|| a.order.cmp(&b.order))
            .then_with(|| a.id.cmp(&b.id))
    });

    Ok(Board { list, columns, items })
}

pub fn get_column(store: &DocumentStore, list_id: &str, column_id: &str) -> Result<Column> {
    store
        .get(&columns_ref(list_id).doc(column_id))?
        .ok_or_else(|| Error::not_found("column", column_id))
}

#[tracing::instrument(skip(store, user, create), fields(user_id = %user.uid))]
pub fn add_column(store: &mut DocumentStore, user: &Identity, list_id: &str, create: &ColumnCreate) -> Result<Column> {
    get_list(store, user, list_id)?;
    let header = create.header.trim();
    if header.is_empty() {
        return Err(Error::validation("column header is required"));
    }

    let column = Column {
        id: new_id(),
        header: header.to_string(),
        order: load_columns(store, list_id)?.len(),
    };
    store.set(&columns_ref(list_id).doc(&column.id), &column)?;
    info!(list_id, column_id = %column.id, order = column.order, "added column");
    Ok(column)
}

#[tracing::instrument(skip(store, user, patch), fields(user_id = %user.uid))]
pub fn update_column(
    store: &mut DocumentStore,
    user: &Identity,
    list_id: &str,
    column_id: &str,
    patch: &ColumnPatch,
) -> Result<Column> {
    get_list(store, user, list_id)?;
    get_column(store, list_id, column_id)?;

    if let Some(header) = &patch.header {
        let header = header.trim();
        if header.is_empty() {
            return Err(Error::validation("column header is required"));
        }
        let mut fields = Map::new();
        fields.insert("header".to_string(), json!(header));
        store.update(&columns_ref(list_id).doc(column_id), fields)?;
        info!(list_id, column_id, "renamed column");
    }
    get_column(store, list_id, column_id)
}

/// Deletes a column and its items, then closes the gap in the remaining
/// column orders. Returns the number of items removed.
#[tracing::instrument(skip(store, user), fields(user_id = %user.uid))]
pub fn delete_column(store: &mut DocumentStore, user: &Identity, list_id: &str, column_id: &str) -> Result<usize> {
    get_list(store, user, list_id)?;
    get_column(store, list_id, column_id)?;

    let mut batch = WriteBatch::new();
    let mut removed = 0;
    for item in load_items(store, list_id)?
        .iter()
        .filter(|i| i.column_id == column_id)
    {
        batch.delete(&items_ref(list_id).doc(&item.id));
        removed += 1;
    }
    batch.delete(&columns_ref(list_id).doc(column_id));

    let mut remaining: Vec<Column> = load_columns(store, list_id)?
        .into_iter()
        .filter(|c| c.id != column_id)
        .collect();
    for column in reorder::normalize_columns(&mut remaining) {
        batch.update(&columns_ref(list_id).doc(&column.id), order_fields(column.order));
    }

    store.commit(batch)?;
    info!(list_id, column_id, removed, "deleted column");
    Ok(removed)
}

/// Moves a column and persists every changed order in one batch.
#[tracing::instrument(skip(store, user), fields(user_id = %user.uid))]
pub fn move_column(
    store: &mut DocumentStore,
    user: &Identity,
    list_id: &str,
    from: usize,
    to: usize,
) -> Result<Vec<Column>> {
    get_list(store, user, list_id)?;
    let mut columns = load_columns(store, list_id)?;
    let changed = reorder::move_column(&mut columns, from, to)?;

    let mut batch = WriteBatch::new();
    for column in &changed {
        batch.update(&columns_ref(list_id).doc(&column.id), order_fields(column.order));
    }
    store.commit(batch)?;
    info!(list_id, from, to, changed = changed.len(), "persisted column move");
    Ok(columns)
}

/// Moves an item to `destination` and persists every changed item in one
/// batch. Returns the changed items.
#[tracing::instrument(skip(store, user, destination), fields(user_id = %user.uid))]
pub fn move_item(
    store: &mut DocumentStore,
    user: &Identity,
    list_id: &str,
    item_id: &str,
    destination: &Slot,
) -> Result<Vec<ListItem>> {
    get_list(store, user, list_id)?;
    get_column(store, list_id, &destination.column_id)?;

    let mut items = load_items(store, list_id)?;
    let source = reorder::locate_item(&items, item_id).ok_or_else(|| Error::not_found("item", item_id))?;
    let changed = reorder::move_item(&mut items, &source, destination)?;

    let mut batch = WriteBatch::new();
    for item in &changed {
        let mut fields = order_fields(item.order);
        fields.insert("columnId".to_string(), json!(item.column_id));
        batch.update(&items_ref(list_id).doc(&item.id), fields);
    }
    store.commit(batch)?;
    info!(list_id, item_id, changed = changed.len(), "persisted item move");
    Ok(changed)
}

/// Rewrites gapped or duplicated orders of columns and items. Returns how
/// many documents were touched.
#[tracing::instrument(skip(store, user), fields(user_id = %user.uid))]
pub fn repair_orders(store: &mut DocumentStore, user: &Identity, list_id: &str) -> Result<usize> {
    get_list(store, user, list_id)?;
    let mut columns = load_columns(store, list_id)?;
    let mut items = load_items(store, list_id)?;

    let mut batch = WriteBatch::new();
    for column in reorder::normalize_columns(&mut columns) {
        batch.update(&columns_ref(list_id).doc(&column.id), order_fields(column.order));
    }
    for item in reorder::normalize_items(&mut items) {
        batch.update(&items_ref(list_id).doc(&item.id), order_fields(item.order));
    }

    let touched = batch.len();
    store.commit(batch)?;
    info!(list_id, touched, "repaired orders");
    Ok(touched)
}

pub(crate) fn order_fields(order: usize) -> Map<String, serde_json::Value> {
    let mut fields = Map::new();
    fields.insert("order".to_string(), json!(order));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Identity {
        Identity::new("u1", "u1@example.com")
    }

    fn seeded() -> (DocumentStore, List, Vec<Column>) {
        let mut store = DocumentStore::in_memory();
        let list = create_list(
            &mut store,
            &user(),
            &ListCreate {
                name: " Reading ".to_string(),
                description: Some("".to_string()),
            },
        )
        .expect("create list");
        let columns = ["To read", "Reading", "Done"]
            .iter()
            .map(|h| {
                add_column(&mut store, &user(), &list.id, &ColumnCreate { header: h.to_string() }).expect("column")
            })
            .collect();
        (store, list, columns)
    }

    #[test]
    fn create_trims_and_normalizes() {
        let (_, list, columns) = seeded();
        assert_eq!(list.name, "Reading");
        assert!(list.description.is_none());
        let orders: Vec<usize> = columns.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut store = DocumentStore::in_memory();
        let err = create_list(
            &mut store,
            &user(),
            &ListCreate {
                name: "   ".to_string(),
                description: None,
            },
        )
        .expect_err("blank");
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn non_owner_is_forbidden() {
        let (mut store, list, _) = seeded();
        let other = Identity::new("u2", "u2@example.com");
        assert!(matches!(get_list(&store, &other, &list.id), Err(Error::Forbidden(_))));
        assert!(matches!(
            delete_list(&mut store, &other, &list.id),
            Err(Error::Forbidden(_))
        ));
        assert!(lists_for_user(&store, &other).expect("lists").is_empty());
    }

    #[test]
    fn update_sets_and_clears_description() {
        let (mut store, list, _) = seeded();
        let set = ListPatch {
            description: Some(Some("novels".to_string())),
            ..ListPatch::default()
        };
        let updated = update_list(&mut store, &user(), &list.id, &set).expect("set");
        assert_eq!(updated.description.as_deref(), Some("novels"));
        assert!(updated.updated_at >= list.updated_at);

        let clear = ListPatch {
            description: Some(None),
            ..ListPatch::default()
        };
        let updated = update_list(&mut store, &user(), &list.id, &clear).expect("clear");
        assert!(updated.description.is_none());
        assert_eq!(updated.name, "Reading");
    }

    #[test]
    fn delete_column_redensifies_remaining() {
        let (mut store, list, columns) = seeded();
        delete_column(&mut store, &user(), &list.id, &columns[0].id).expect("delete");
        let remaining = load_columns(&store, &list.id).expect("columns");
        let view: Vec<(&str, usize)> = remaining.iter().map(|c| (c.header.as_str(), c.order)).collect();
        assert_eq!(view, vec![("Reading", 0), ("Done", 1)]);
    }

    #[test]
    fn move_column_persists_orders() {
        let (mut store, list, _) = seeded();
        move_column(&mut store, &user(), &list.id, 2, 0).expect("move");
        let headers: Vec<String> = load_columns(&store, &list.id)
            .expect("columns")
            .into_iter()
            .map(|c| c.header)
            .collect();
        assert_eq!(headers, vec!["Done", "To read", "Reading"]);
    }

    #[test]
    fn lists_are_newest_first() {
        let (mut store, first, _) = seeded();
        let second = create_list(
            &mut store,
            &user(),
            &ListCreate {
                name: "Films".to_string(),
                description: None,
            },
        )
        .expect("second");
        let ids: Vec<String> = lists_for_user(&store, &user())
            .expect("lists")
            .into_iter()
            .map(|l| l.id)
            .collect();
        if second.created_at > first.created_at {
            assert_eq!(ids, vec![second.id, first.id]);
        } else {
            assert_eq!(ids.len(), 2);
        }
    }
}
