use listboard_shared::{CategoryCreate, CategoryPatch};
use serde_json::{Map, Value, json};
use tracing::info;

use crate::auth::{Identity, ensure_owner};
use crate::error::{Error, Result};
use crate::forest::check_reparent;
use crate::model::{Category, new_id};
use crate::store::{CollectionRef, DocumentStore, Query, WriteBatch};

pub const DEFAULT_COLOR: &str = "#3B82F6";

pub fn categories_ref() -> CollectionRef {
    CollectionRef::root("categories")
}

/// The user's categories, sorted case-insensitively by name.
#[tracing::instrument(skip(store, user), fields(user_id = %user.uid))]
pub fn categories_for_user(store: &DocumentStore, user: &Identity) -> Result<Vec<Category>> {
    let mut categories: Vec<Category> = store.query(&categories_ref(), &Query::new().where_eq("userId", user.uid.as_str()))?;
    categories.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(categories)
}

pub fn get_category(store: &DocumentStore, user: &Identity, category_id: &str) -> Result<Category> {
    let category: Category = store
        .get(&categories_ref().doc(category_id))?
        .ok_or_else(|| Error::not_found("category", category_id))?;
    ensure_owner(&category.user_id, user, "category")?;
    Ok(category)
}

#[tracing::instrument(skip(store, user, create), fields(user_id = %user.uid))]
pub fn create_category(store: &mut DocumentStore, user: &Identity, create: &CategoryCreate) -> Result<Category> {
    let name = create.name.trim();
    if name.is_empty() {
        return Err(Error::validation("category name is required"));
    }
    if let Some(parent_id) = &create.parent_id {
        get_category(store, user, parent_id)?;
    }

    let category = Category {
        id: new_id(),
        name: name.to_string(),
        color: normalize_color(create.color.as_deref()),
        icon: non_blank(create.icon.as_deref()),
        parent_id: create.parent_id.clone(),
        user_id: user.uid.clone(),
    };
    store.set(&categories_ref().doc(&category.id), &category)?;
    info!(category_id = %category.id, parent = ?category.parent_id, "created category");
    Ok(category)
}

#[tracing::instrument(skip(store, user, patch), fields(user_id = %user.uid))]
pub fn update_category(
    store: &mut DocumentStore,
    user: &Identity,
    category_id: &str,
    patch: &CategoryPatch,
) -> Result<Category> {
    get_category(store, user, category_id)?;

    let mut fields = Map::new();
    if let Some(name) = &patch.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("category name is required"));
        }
        fields.insert("name".to_string(), json!(name));
    }
    if let Some(color) = &patch.color {
        fields.insert("color".to_string(), json!(normalize_color(Some(color))));
    }
    if let Some(icon) = &patch.icon {
        fields.insert("icon".to_string(), json!(non_blank(icon.as_deref())));
    }

    if !fields.is_empty() {
        store.update(&categories_ref().doc(category_id), fields)?;
        info!(category_id, "updated category");
    }
    get_category(store, user, category_id)
}

/// Moves a category under `new_parent_id`, or makes it a root when `None`.
/// Nothing is written when the move would create a cycle.
#[tracing::instrument(skip(store, user), fields(user_id = %user.uid))]
pub fn reparent_category(
    store: &mut DocumentStore,
    user: &Identity,
    category_id: &str,
    new_parent_id: Option<&str>,
) -> Result<Category> {
    get_category(store, user, category_id)?;
    if let Some(parent_id) = new_parent_id {
        get_category(store, user, parent_id)?;
    }

    let categories = categories_for_user(store, user)?;
    check_reparent(&categories, category_id, new_parent_id)?;

    let mut fields = Map::new();
    fields.insert(
        "parentId".to_string(),
        new_parent_id.map_or(Value::Null, |p| json!(p)),
    );
    store.update(&categories_ref().doc(category_id), fields)?;
    info!(category_id, parent = ?new_parent_id, "reparented category");
    get_category(store, user, category_id)
}

/// Deletes a category. Its direct children become roots in the same batch.
/// Items keep their reference and show up as orphaned in statistics.
#[tracing::instrument(skip(store, user), fields(user_id = %user.uid))]
pub fn delete_category(store: &mut DocumentStore, user: &Identity, category_id: &str) -> Result<usize> {
    get_category(store, user, category_id)?;
    let categories = categories_for_user(store, user)?;

    let mut batch = WriteBatch::new();
    let mut promoted = 0;
    for child in categories
        .iter()
        .filter(|c| c.parent_id.as_deref() == Some(category_id))
    {
        let mut fields = Map::new();
        fields.insert("parentId".to_string(), Value::Null);
        batch.update(&categories_ref().doc(&child.id), fields);
        promoted += 1;
    }
    batch.delete(&categories_ref().doc(category_id));
    store.commit(batch)?;

    info!(category_id, promoted, "deleted category");
    Ok(promoted)
}

fn normalize_color(color: Option<&str>) -> String {
    match color.map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => DEFAULT_COLOR.to_string(),
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Identity {
        Identity::new("u1", "u1@example.com")
    }

    fn create(store: &mut DocumentStore, name: &str, parent: Option<&str>) -> Category {
        create_category(
            store,
            &user(),
            &CategoryCreate {
                name: name.to_string(),
                color: None,
                icon: None,
                parent_id: parent.map(str::to_string),
            },
        )
        .expect("create category")
    }

    #[test]
    fn create_defaults_color_and_lists_by_name() {
        let mut store = DocumentStore::in_memory();
        let b = create(&mut store, "books", None);
        create(&mut store, "Apps", None);
        assert_eq!(b.color, DEFAULT_COLOR);

        let names: Vec<String> = categories_for_user(&store, &user())
            .expect("list")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Apps", "books"]);
    }

    #[test]
    fn other_users_cannot_touch_a_category() {
        let mut store = DocumentStore::in_memory();
        let c = create(&mut store, "Mine", None);
        let intruder = Identity::new("u2", "u2@example.com");
        assert!(matches!(
            get_category(&store, &intruder, &c.id),
            Err(Error::Forbidden(_))
        ));
        assert!(categories_for_user(&store, &intruder).expect("list").is_empty());
    }

    #[test]
    fn reparent_into_descendant_writes_nothing() {
        let mut store = DocumentStore::in_memory();
        let a = create(&mut store, "A", None);
        let s = create(&mut store, "S", Some(a.id.as_str()));
        let g = create(&mut store, "G", Some(s.id.as_str()));

        let err = reparent_category(&mut store, &user(), &a.id, Some(g.id.as_str())).expect_err("cycle");
        assert!(matches!(err, Error::CategoryCycle { .. }));
        assert!(get_category(&store, &user(), &a.id).expect("a").parent_id.is_none());

        let moved = reparent_category(&mut store, &user(), &g.id, None).expect("to root");
        assert!(moved.is_root());
    }

    #[test]
    fn delete_promotes_children() {
        let mut store = DocumentStore::in_memory();
        let a = create(&mut store, "A", None);
        let s = create(&mut store, "S", Some(a.id.as_str()));
        assert_eq!(delete_category(&mut store, &user(), &a.id).expect("delete"), 1);
        assert!(get_category(&store, &user(), &s.id).expect("s").is_root());
    }

    #[test]
    fn update_rejects_blank_name_and_clears_icon() {
        let mut store = DocumentStore::in_memory();
        let c = create(&mut store, "A", None);
        let blank = CategoryPatch {
            name: Some("  ".to_string()),
            ..CategoryPatch::default()
        };
        assert!(update_category(&mut store, &user(), &c.id, &blank).is_err());

        let patch = CategoryPatch {
            color: Some("#10B981".to_string()),
            icon: Some(None),
            ..CategoryPatch::default()
        };
        let updated = update_category(&mut store, &user(), &c.id, &patch).expect("update");
        assert_eq!(updated.color, "#10B981");
        assert!(updated.icon.is_none());
    }
}
