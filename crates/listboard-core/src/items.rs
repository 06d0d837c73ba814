use listboard_shared::{ItemCreate, ItemPatch};
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::auth::Identity;
use crate::categories::{categories_for_user, get_category, non_blank};
use crate::error::{Error, Result};
use crate::forest::subcategories_of;
use crate::lists::{get_column, get_list, items_ref, load_items, order_fields};
use crate::model::{ListItem, new_id};
use crate::reorder;
use crate::stats::infer_subcategory;
use crate::store::{DocumentStore, WriteBatch};

pub fn get_item(store: &DocumentStore, list_id: &str, item_id: &str) -> Result<ListItem> {
    store
        .get(&items_ref(list_id).doc(item_id))?
        .ok_or_else(|| Error::not_found("item", item_id))
}

/// Adds an item at the end of `column_id`.
#[tracing::instrument(skip(store, user, create), fields(user_id = %user.uid))]
pub fn add_item(
    store: &mut DocumentStore,
    user: &Identity,
    list_id: &str,
    column_id: &str,
    create: &ItemCreate,
) -> Result<ListItem> {
    get_list(store, user, list_id)?;
    get_column(store, list_id, column_id)?;

    let title = create.title.trim();
    if title.is_empty() {
        return Err(Error::validation("item title is required"));
    }

    let category_id = non_blank(create.category_id.as_deref());
    let subcategory_id = non_blank(create.subcategory_id.as_deref());
    check_categories(store, user, category_id.as_deref(), subcategory_id.as_deref())?;

    let order = load_items(store, list_id)?
        .iter()
        .filter(|i| i.column_id == column_id)
        .count();

    let item = ListItem {
        id: new_id(),
        title: title.to_string(),
        description: non_blank(create.description.as_deref()),
        column_id: column_id.to_string(),
        category_id,
        subcategory_id,
        start_date: create.start_date,
        end_date: create.end_date,
        order,
        tags: normalize_tags(&create.tags),
    };
    check_date_range(&item)?;

    store.set(&items_ref(list_id).doc(&item.id), &item)?;
    info!(list_id, item_id = %item.id, column_id, order, "added item");
    Ok(item)
}

#[tracing::instrument(skip(store, user, patch), fields(user_id = %user.uid))]
pub fn update_item(
    store: &mut DocumentStore,
    user: &Identity,
    list_id: &str,
    item_id: &str,
    patch: &ItemPatch,
) -> Result<ListItem> {
    get_list(store, user, list_id)?;
    let mut next = get_item(store, list_id, item_id)?;

    if let Some(title) = &patch.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::validation("item title is required"));
        }
        next.title = title.to_string();
    }
    if let Some(description) = &patch.description {
        next.description = non_blank(description.as_deref());
    }
    if let Some(category_id) = &patch.category_id {
        next.category_id = non_blank(category_id.as_deref());
        if next.category_id.is_none() {
            next.subcategory_id = None;
        }
    }
    if let Some(subcategory_id) = &patch.subcategory_id {
        next.subcategory_id = non_blank(subcategory_id.as_deref());
    }
    if let Some(start) = patch.start_date {
        next.start_date = start;
    }
    if let Some(end) = patch.end_date {
        next.end_date = end;
    }
    if let Some(tags) = &patch.tags {
        next.tags = normalize_tags(tags);
    }

    if patch.category_id.is_some() || patch.subcategory_id.is_some() {
        check_categories(store, user, next.category_id.as_deref(), next.subcategory_id.as_deref())?;
    }
    check_date_range(&next)?;

    let mut fields = Map::new();
    fields.insert("title".to_string(), json!(next.title));
    fields.insert("description".to_string(), json!(next.description));
    fields.insert("categoryId".to_string(), json!(next.category_id));
    fields.insert("subcategoryId".to_string(), json!(next.subcategory_id));
    fields.insert("startDate".to_string(), json!(next.start_date));
    fields.insert("endDate".to_string(), json!(next.end_date));
    fields.insert("tags".to_string(), json!(next.tags));
    store.update(&items_ref(list_id).doc(item_id), fields)?;

    info!(list_id, item_id, "updated item");
    Ok(next)
}

/// Deletes an item and closes the gap it leaves in its column.
#[tracing::instrument(skip(store, user), fields(user_id = %user.uid))]
pub fn delete_item(store: &mut DocumentStore, user: &Identity, list_id: &str, item_id: &str) -> Result<()> {
    get_list(store, user, list_id)?;
    let item = get_item(store, list_id, item_id)?;

    let mut siblings: Vec<ListItem> = load_items(store, list_id)?
        .into_iter()
        .filter(|i| i.column_id == item.column_id && i.id != item.id)
        .collect();

    let mut batch = WriteBatch::new();
    batch.delete(&items_ref(list_id).doc(item_id));
    for sibling in reorder::normalize_items(&mut siblings) {
        batch.update(&items_ref(list_id).doc(&sibling.id), order_fields(sibling.order));
    }
    store.commit(batch)?;

    info!(list_id, item_id, "deleted item");
    Ok(())
}

/// Copies an item to the end of its column. With `auto_increment` a
/// trailing number in the title is bumped.
#[tracing::instrument(skip(store, user), fields(user_id = %user.uid))]
pub fn duplicate_item(
    store: &mut DocumentStore,
    user: &Identity,
    list_id: &str,
    item_id: &str,
    auto_increment: bool,
) -> Result<ListItem> {
    get_list(store, user, list_id)?;
    let source = get_item(store, list_id, item_id)?;

    let order = load_items(store, list_id)?
        .iter()
        .filter(|i| i.column_id == source.column_id)
        .count();

    let title = if auto_increment {
        increment_title(&source.title)
    } else {
        source.title.clone()
    };

    let copy = ListItem {
        id: new_id(),
        title,
        order,
        ..source
    };
    store.set(&items_ref(list_id).doc(&copy.id), &copy)?;
    info!(list_id, source = item_id, item_id = %copy.id, "duplicated item");
    Ok(copy)
}

/// `"Task 9"` becomes `"Task 10"`. Titles without a trailing number, or
/// whose number does not fit in a `u64`, are returned unchanged.
pub fn increment_title(title: &str) -> String {
    let Ok(trailing) = Regex::new(r"\d+$") else {
        return title.to_string();
    };
    let Some(found) = trailing.find(title) else {
        return title.to_string();
    };
    match found.as_str().parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
        Some(next) => format!("{}{next}", &title[..found.start()]),
        None => {
            debug!(title, "trailing number too large to increment");
            title.to_string()
        }
    }
}

/// Converts tag-based subcategory references into `subcategoryId`. Items
/// placed on a root category with no explicit subcategory get the first
/// subcategory whose name matches one of their tags. Returns how many items
/// were rewritten.
#[tracing::instrument(skip(store, user), fields(user_id = %user.uid))]
pub fn migrate_tag_subcategories(store: &mut DocumentStore, user: &Identity, list_id: &str) -> Result<usize> {
    get_list(store, user, list_id)?;
    let categories = categories_for_user(store, user)?;

    let mut batch = WriteBatch::new();
    for item in load_items(store, list_id)? {
        if item.subcategory_id.is_some() {
            continue;
        }
        let Some(category_id) = item.category_id.as_deref() else {
            continue;
        };
        let subcategories = subcategories_of(&categories, category_id);
        if let Some(sub) = infer_subcategory(&item, &subcategories) {
            let mut fields = Map::new();
            fields.insert("subcategoryId".to_string(), Value::String(sub.id.clone()));
            batch.update(&items_ref(list_id).doc(&item.id), fields);
        }
    }

    let migrated = batch.len();
    store.commit(batch)?;
    info!(list_id, migrated, "migrated tag subcategories");
    Ok(migrated)
}

fn check_categories(
    store: &DocumentStore,
    user: &Identity,
    category_id: Option<&str>,
    subcategory_id: Option<&str>,
) -> Result<()> {
    if let Some(category_id) = category_id {
        get_category(store, user, category_id)?;
    }
    if let Some(subcategory_id) = subcategory_id {
        let sub = get_category(store, user, subcategory_id)?;
        if category_id.is_none() || sub.parent_id.as_deref() != category_id {
            return Err(Error::validation(format!(
                "{} is not a subcategory of the item's category",
                sub.name
            )));
        }
    }
    Ok(())
}

fn check_date_range(item: &ListItem) -> Result<()> {
    if let (Some(start), Some(end)) = (item.start_date, item.end_date)
        && end < start
    {
        return Err(Error::validation("end date is before start date"));
    }
    Ok(())
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !out.iter().any(|seen| seen.eq_ignore_ascii_case(tag)) {
            out.push(tag.to_string());
        }
    }
    out
}
