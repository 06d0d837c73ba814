//! Whole-account backup as one JSON document.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::Identity;
use crate::categories::{categories_for_user, categories_ref};
use crate::error::{Error, Result};
use crate::lists::{columns_ref, items_ref, list_doc, lists_for_user, load_columns, load_items};
use crate::model::{Category, Column, List, ListItem, UserSettings};
use crate::settings::{SettingsChange, SettingsHub, get_user_settings, reset_user_settings, settings_doc};
use crate::store::{DocumentStore, WriteBatch};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportedColumn {
    pub list_id: String,
    #[serde(flatten)]
    pub column: Column,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportedItem {
    pub list_id: String,
    #[serde(flatten)]
    pub item: ListItem,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub settings: UserSettings,
    pub lists: Vec<List>,
    pub columns: Vec<ExportedColumn>,
    pub items: Vec<ExportedItem>,
    pub categories: Vec<Category>,
    pub export_date: DateTime<Utc>,
}

#[tracing::instrument(skip(store, user), fields(user_id = %user.uid))]
pub fn export_user_data(store: &mut DocumentStore, user: &Identity) -> Result<ExportData> {
    let settings = get_user_settings(store, user)?;
    let lists = lists_for_user(store, user)?;

    let mut columns = Vec::new();
    let mut items = Vec::new();
    for list in &lists {
        columns.extend(load_columns(store, &list.id)?.into_iter().map(|column| ExportedColumn {
            list_id: list.id.clone(),
            column,
        }));
        items.extend(load_items(store, &list.id)?.into_iter().map(|item| ExportedItem {
            list_id: list.id.clone(),
            item,
        }));
    }
    let categories = categories_for_user(store, user)?;

    info!(
        lists = lists.len(),
        columns = columns.len(),
        items = items.len(),
        categories = categories.len(),
        "exported user data"
    );
    Ok(ExportData {
        settings,
        lists,
        columns,
        items,
        categories,
        export_date: Utc::now(),
    })
}

pub fn parse_export(text: &str) -> Result<ExportData> {
    serde_json::from_str(text).map_err(|err| Error::validation(format!("invalid import file structure: {err}")))
}

/// Writes an export back for `user` in a single batch. Ownership is
/// rewritten to the importing user and the user's own documents with the
/// same id are replaced. Ids held by another user reject the whole import.
#[tracing::instrument(skip(store, hub, user, data), fields(user_id = %user.uid))]
pub fn import_user_data(
    store: &mut DocumentStore,
    hub: &SettingsHub,
    user: &Identity,
    data: &ExportData,
) -> Result<usize> {
    validate(data)?;
    check_ownership(store, user, data)?;

    let mut batch = WriteBatch::new();
    batch.set(&settings_doc(&user.uid), &data.settings)?;
    for list in &data.lists {
        let list = List {
            user_id: user.uid.clone(),
            ..list.clone()
        };
        batch.set(&list_doc(&list.id), &list)?;
    }
    for exported in &data.columns {
        batch.set(&columns_ref(&exported.list_id).doc(&exported.column.id), &exported.column)?;
    }
    for exported in &data.items {
        batch.set(&items_ref(&exported.list_id).doc(&exported.item.id), &exported.item)?;
    }
    for category in &data.categories {
        let category = Category {
            user_id: user.uid.clone(),
            ..category.clone()
        };
        batch.set(&categories_ref().doc(&category.id), &category)?;
    }

    let written = batch.len();
    store.commit(batch)?;
    info!(written, "imported user data");

    hub.publish(SettingsChange {
        user_id: user.uid.clone(),
        settings: data.settings.clone(),
    });
    Ok(written)
}

/// Restores the default settings. Lists and categories are left alone.
pub fn reset_user_data(store: &mut DocumentStore, hub: &SettingsHub, user: &Identity) -> Result<UserSettings> {
    reset_user_settings(store, hub, user)
}

/// Columns and items only live under lists of the same file, so checking the
/// lists covers them too.
fn check_ownership(store: &DocumentStore, user: &Identity, data: &ExportData) -> Result<()> {
    for list in &data.lists {
        if let Some(existing) = store.get::<List>(&list_doc(&list.id))?
            && existing.user_id != user.uid
        {
            warn!(list_id = %list.id, "import refers to a list owned by another user");
            return Err(Error::Forbidden(format!("list {} belongs to another user", list.id)));
        }
    }
    for category in &data.categories {
        if let Some(existing) = store.get::<Category>(&categories_ref().doc(&category.id))?
            && existing.user_id != user.uid
        {
            warn!(category_id = %category.id, "import refers to a category owned by another user");
            return Err(Error::Forbidden(format!("category {} belongs to another user", category.id)));
        }
    }
    Ok(())
}

fn validate(data: &ExportData) -> Result<()> {
    let list_ids: HashSet<&str> = data.lists.iter().map(|l| l.id.as_str()).collect();
    let mut columns_by_list: HashMap<&str, HashSet<&str>> = HashMap::new();

    for exported in &data.columns {
        if !list_ids.contains(exported.list_id.as_str()) {
            return Err(Error::validation(format!(
                "column {} references unknown list {}",
                exported.column.id, exported.list_id
            )));
        }
        columns_by_list
            .entry(exported.list_id.as_str())
            .or_default()
            .insert(exported.column.id.as_str());
    }

    for exported in &data.items {
        let known = columns_by_list
            .get(exported.list_id.as_str())
            .is_some_and(|cols| cols.contains(exported.item.column_id.as_str()));
        if !known {
            return Err(Error::validation(format!(
                "item {} references unknown column {}",
                exported.item.id, exported.item.column_id
            )));
        }
    }

    let category_ids: HashSet<&str> = data.categories.iter().map(|c| c.id.as_str()).collect();
    for category in &data.categories {
        if let Some(parent) = category.parent_id.as_deref()
            && !category_ids.contains(parent)
        {
            return Err(Error::validation(format!(
                "category {} references unknown parent {parent}",
                category.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use listboard_shared::{CategoryCreate, ColumnCreate, ItemCreate, ListCreate};

    use super::*;
    use crate::categories::create_category;
    use crate::items::add_item;
    use crate::lists::{add_column, create_list, get_list};

    fn seeded(user: &Identity) -> DocumentStore {
        let mut store = DocumentStore::in_memory();
        let list = create_list(
            &mut store,
            user,
            &ListCreate {
                name: "Books".to_string(),
                description: None,
            },
        )
        .expect("list");
        let column = add_column(
            &mut store,
            user,
            &list.id,
            &ColumnCreate {
                header: "To read".to_string(),
            },
        )
        .expect("column");
        add_item(
            &mut store,
            user,
            &list.id,
            &column.id,
            &ItemCreate {
                title: "Dune".to_string(),
                ..ItemCreate::default()
            },
        )
        .expect("item");
        store
    }

    #[test]
    fn export_then_import_into_fresh_store() {
        let alice = Identity::new("alice", "alice@example.com");
        let mut source = seeded(&alice);
        let data = export_user_data(&mut source, &alice).expect("export");
        let text = serde_json::to_string(&data).expect("serialize");
        assert!(text.contains("\"exportDate\""));
        assert!(text.contains("\"listId\""));

        let bob = Identity::new("bob", "bob@example.com");
        let mut target = DocumentStore::in_memory();
        let hub = SettingsHub::new();
        let rx = hub.subscribe();
        let written = import_user_data(&mut target, &hub, &bob, &parse_export(&text).expect("parse")).expect("import");
        assert_eq!(written, 4);
        assert!(rx.try_recv().is_ok());

        let lists = lists_for_user(&target, &bob).expect("lists");
        assert_eq!(lists.len(), 1);
        assert_eq!(load_items(&target, &lists[0].id).expect("items")[0].title, "Dune");
    }

    #[test]
    fn missing_sections_are_rejected() {
        let err = parse_export(r#"{"settings":{},"lists":[]}"#).expect_err("incomplete");
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn dangling_column_reference_writes_nothing() {
        let alice = Identity::new("alice", "alice@example.com");
        let mut source = seeded(&alice);
        let mut data = export_user_data(&mut source, &alice).expect("export");
        data.items[0].item.column_id = "ghost".to_string();

        let mut target = DocumentStore::in_memory();
        let err = import_user_data(&mut target, &SettingsHub::new(), &alice, &data).expect_err("invalid");
        assert!(matches!(err, Error::Validation(_)));
        assert!(target.is_empty());
    }

    #[test]
    fn import_cannot_take_over_another_users_list() {
        let alice = Identity::new("alice", "alice@example.com");
        let mut store = seeded(&alice);
        let private = lists_for_user(&store, &alice).expect("lists").remove(0);
        let mut data = export_user_data(&mut store, &alice).expect("export");
        data.lists[0].name = "pwned".to_string();
        let before = store.len();

        let mallory = Identity::new("mallory", "mallory@example.com");

        let err = import_user_data(&mut store, &SettingsHub::new(), &mallory, &data).expect_err("foreign list");
        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(store.len(), before);
        assert_eq!(get_list(&store, &alice, &private.id).expect("still alice's").name, "Books");
        assert!(lists_for_user(&store, &mallory).expect("lists").is_empty());
    }

    #[test]
    fn import_cannot_take_over_another_users_category() {
        let alice = Identity::new("alice", "alice@example.com");
        let mut store = DocumentStore::in_memory();
        let category = create_category(
            &mut store,
            &alice,
            &CategoryCreate {
                name: "Secret".to_string(),
                color: None,
                icon: None,
                parent_id: None,
            },
        )
        .expect("category");

        let mallory = Identity::new("mallory", "mallory@example.com");
        let mut data = export_user_data(&mut store, &mallory).expect("export");
        data.categories.push(category);

        let err = import_user_data(&mut store, &SettingsHub::new(), &mallory, &data).expect_err("foreign category");
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(categories_for_user(&store, &mallory).expect("categories").is_empty());
    }

    #[test]
    fn reimporting_own_export_replaces_in_place() {
        let alice = Identity::new("alice", "alice@example.com");
        let mut store = seeded(&alice);
        let mut data = export_user_data(&mut store, &alice).expect("export");
        data.lists[0].name = "Renamed".to_string();

        import_user_data(&mut store, &SettingsHub::new(), &alice, &data).expect("own import");
        let lists = lists_for_user(&store, &alice).expect("lists");
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name, "Renamed");
    }
}
