use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use listboard_shared::{
    CategoryCreate, CategoryPatch, ColumnCreate, ColumnPatch, FeedbackCreate, FeedbackKind, FeedbackStatus, ItemCreate,
    ItemPatch, ListCreate, ListPatch, Slot,
};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::auth::{AdminPolicy, Identity};
use crate::categories;
use crate::cli::{
    CategoryCmd, ColumnCmd, Command, FeedbackCmd, ItemCmd, ItemFields, ListCmd, PrefsCmd, ProfileCmd, SearchArgs,
    SettingsCmd,
};
use crate::export;
use crate::feedback;
use crate::items;
use crate::lists;
use crate::prefs::{self, Language, LocalPrefs};
use crate::profile;
use crate::render::Renderer;
use crate::search::SearchFilter;
use crate::settings::{self, SettingsHub};
use crate::stats;
use crate::store::DocumentStore;

/// Everything a command needs for one invocation.
pub struct Session {
    pub store: DocumentStore,
    pub user: Identity,
    pub policy: AdminPolicy,
    pub hub: SettingsHub,
    pub renderer: Renderer,
    pub data_dir: PathBuf,
    pub prefs: LocalPrefs,
}

#[instrument(skip_all)]
pub fn dispatch(session: &mut Session, command: Command) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");
    match command {
        Command::List(cmd) => cmd_list(session, cmd),
        Command::Column(cmd) => cmd_column(session, cmd),
        Command::Item(cmd) => cmd_item(session, cmd),
        Command::Category(cmd) => cmd_category(session, cmd),
        Command::Stats { list, search, json } => cmd_stats(session, &list, &search, json),
        Command::Settings(cmd) => cmd_settings(session, cmd),
        Command::Prefs(cmd) => cmd_prefs(session, cmd),
        Command::Profile(cmd) => cmd_profile(session, cmd),
        Command::Feedback(cmd) => cmd_feedback(session, cmd),
        Command::Export { output } => cmd_export(session, output.as_deref()),
        Command::Import { input } => cmd_import(session, &input),
    }
}

/// Picks the single candidate whose id equals `token`, else the single one
/// whose id starts with it, else the single one whose name matches it
/// case-insensitively.
pub fn resolve_unique<'a>(token: &str, kind: &str, candidates: &'a [(String, String)]) -> anyhow::Result<&'a str> {
    let token = token.trim();
    if let Some((id, _)) = candidates.iter().find(|(id, _)| id == token) {
        return Ok(id.as_str());
    }

    let by_prefix: Vec<&str> = candidates
        .iter()
        .filter(|(id, _)| !token.is_empty() && id.starts_with(token))
        .map(|(id, _)| id.as_str())
        .collect();
    if let [only] = by_prefix.as_slice() {
        return Ok(*only);
    }

    let by_name: Vec<&str> = candidates
        .iter()
        .filter(|(_, name)| name.eq_ignore_ascii_case(token))
        .map(|(id, _)| id.as_str())
        .collect();
    match by_name.as_slice() {
        [only] => Ok(*only),
        [] if by_prefix.is_empty() => Err(anyhow!("no {kind} matches {token:?}")),
        _ => Err(anyhow!("{kind} {token:?} is ambiguous")),
    }
}

fn resolve_list(session: &Session, token: &str) -> anyhow::Result<String> {
    let candidates: Vec<(String, String)> = lists::lists_for_user(&session.store, &session.user)?
        .into_iter()
        .map(|l| (l.id, l.name))
        .collect();
    Ok(resolve_unique(token, "list", &candidates)?.to_string())
}

fn resolve_column(session: &Session, list_id: &str, token: &str) -> anyhow::Result<String> {
    let columns = lists::load_columns(&session.store, list_id)?;
    if let Ok(position) = token.parse::<usize>()
        && let Some(column) = columns.iter().find(|c| c.order == position)
    {
        return Ok(column.id.clone());
    }
    let candidates: Vec<(String, String)> = columns.into_iter().map(|c| (c.id, c.header)).collect();
    Ok(resolve_unique(token, "column", &candidates)?.to_string())
}

fn resolve_item(session: &Session, list_id: &str, token: &str) -> anyhow::Result<String> {
    let candidates: Vec<(String, String)> = lists::load_items(&session.store, list_id)?
        .into_iter()
        .map(|i| (i.id, i.title))
        .collect();
    Ok(resolve_unique(token, "item", &candidates)?.to_string())
}

fn resolve_category(session: &Session, token: &str) -> anyhow::Result<String> {
    let candidates: Vec<(String, String)> = categories::categories_for_user(&session.store, &session.user)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    Ok(resolve_unique(token, "category", &candidates)?.to_string())
}

#[instrument(skip(session))]
fn cmd_list(session: &mut Session, cmd: ListCmd) -> anyhow::Result<()> {
    match cmd {
        ListCmd::Add { name, description } => {
            info!("command list add");
            let list = lists::create_list(&mut session.store, &session.user, &ListCreate { name, description })?;
            println!("Created list {} ({}).", list.name, list.id);
        }
        ListCmd::Ls => {
            let all = lists::lists_for_user(&session.store, &session.user)?;
            session.renderer.write_lists(&mut io::stdout().lock(), &all)?;
        }
        ListCmd::Show { list, search } => {
            let list_id = resolve_list(session, &list)?;
            let board = lists::load_board(&session.store, &session.user, &list_id)?;
            let filter = search_filter(&search);
            let working = filter.apply(&board.items);
            let cats = categories::categories_for_user(&session.store, &session.user)?;
            let user_settings = settings::get_user_settings(&mut session.store, &session.user)?;
            session
                .renderer
                .write_board(&mut io::stdout().lock(), &board, &working, &cats, &user_settings)?;
        }
        ListCmd::Edit {
            list,
            name,
            description,
            clear_description,
        } => {
            let list_id = resolve_list(session, &list)?;
            let patch = ListPatch {
                name,
                description: if clear_description { Some(None) } else { description.map(Some) },
            };
            let updated = lists::update_list(&mut session.store, &session.user, &list_id, &patch)?;
            println!("Updated list {}.", updated.name);
        }
        ListCmd::Delete { list } => {
            let list_id = resolve_list(session, &list)?;
            let removed = lists::delete_list(&mut session.store, &session.user, &list_id)?;
            println!("Deleted list {list_id} ({removed} documents).");
        }
        ListCmd::Repair { list } => {
            let list_id = resolve_list(session, &list)?;
            let touched = lists::repair_orders(&mut session.store, &session.user, &list_id)?;
            println!("Repaired {touched} positions.");
        }
        ListCmd::MigrateTags { list } => {
            let list_id = resolve_list(session, &list)?;
            let migrated = items::migrate_tag_subcategories(&mut session.store, &session.user, &list_id)?;
            println!("Migrated {migrated} items.");
        }
    }
    Ok(())
}

#[instrument(skip(session))]
fn cmd_column(session: &mut Session, cmd: ColumnCmd) -> anyhow::Result<()> {
    match cmd {
        ColumnCmd::Add { list, header } => {
            let list_id = resolve_list(session, &list)?;
            let column = lists::add_column(&mut session.store, &session.user, &list_id, &ColumnCreate { header })?;
            println!("Added column {} at position {}.", column.header, column.order);
        }
        ColumnCmd::Rename { list, column, header } => {
            let list_id = resolve_list(session, &list)?;
            let column_id = resolve_column(session, &list_id, &column)?;
            let patch = ColumnPatch { header: Some(header) };
            let column = lists::update_column(&mut session.store, &session.user, &list_id, &column_id, &patch)?;
            println!("Renamed column to {}.", column.header);
        }
        ColumnCmd::Delete { list, column } => {
            let list_id = resolve_list(session, &list)?;
            let column_id = resolve_column(session, &list_id, &column)?;
            let removed = lists::delete_column(&mut session.store, &session.user, &list_id, &column_id)?;
            println!("Deleted column and {removed} items.");
        }
        ColumnCmd::Move { list, from, to } => {
            let list_id = resolve_list(session, &list)?;
            let columns = lists::move_column(&mut session.store, &session.user, &list_id, from, to)?;
            let headers: Vec<&str> = columns.iter().map(|c| c.header.as_str()).collect();
            println!("Columns: {}", headers.join(" | "));
        }
    }
    Ok(())
}

#[instrument(skip(session))]
fn cmd_item(session: &mut Session, cmd: ItemCmd) -> anyhow::Result<()> {
    match cmd {
        ItemCmd::Add {
            list,
            column,
            title,
            fields,
        } => {
            let list_id = resolve_list(session, &list)?;
            let column_id = resolve_column(session, &list_id, &column)?;
            let create = ItemCreate {
                title,
                description: fields.description,
                category_id: fields.category.map(|c| resolve_category(session, &c)).transpose()?,
                subcategory_id: fields.subcategory.map(|c| resolve_category(session, &c)).transpose()?,
                start_date: fields.start,
                end_date: fields.end,
                tags: fields.tags,
            };
            let item = items::add_item(&mut session.store, &session.user, &list_id, &column_id, &create)?;
            println!("Created item {} ({}).", item.title, item.id);
        }
        ItemCmd::Edit {
            list,
            item,
            title,
            fields,
            clear,
        } => {
            let list_id = resolve_list(session, &list)?;
            let item_id = resolve_item(session, &list_id, &item)?;
            let patch = item_patch(session, title, fields, &clear)?;
            let item = items::update_item(&mut session.store, &session.user, &list_id, &item_id, &patch)?;
            println!("Updated item {}.", item.title);
        }
        ItemCmd::Delete { list, item } => {
            let list_id = resolve_list(session, &list)?;
            let item_id = resolve_item(session, &list_id, &item)?;
            items::delete_item(&mut session.store, &session.user, &list_id, &item_id)?;
            println!("Deleted item {item_id}.");
        }
        ItemCmd::Duplicate { list, item } => {
            let list_id = resolve_list(session, &list)?;
            let item_id = resolve_item(session, &list_id, &item)?;
            let auto_increment = settings::get_user_settings(&mut session.store, &session.user)?.auto_increment_duplicates;
            let copy = items::duplicate_item(&mut session.store, &session.user, &list_id, &item_id, auto_increment)?;
            println!("Created item {} ({}).", copy.title, copy.id);
        }
        ItemCmd::Move {
            list,
            item,
            column,
            index,
        } => {
            let list_id = resolve_list(session, &list)?;
            let item_id = resolve_item(session, &list_id, &item)?;
            let column_id = resolve_column(session, &list_id, &column)?;
            let destination = Slot { column_id, index };
            let changed = lists::move_item(&mut session.store, &session.user, &list_id, &item_id, &destination)?;
            println!("Moved item; {} positions updated.", changed.len());
        }
    }
    Ok(())
}

fn item_patch(session: &Session, title: Option<String>, fields: ItemFields, clear: &[String]) -> anyhow::Result<ItemPatch> {
    let cleared = |name: &str| clear.iter().any(|c| c.trim().eq_ignore_ascii_case(name));
    for name in clear {
        if !["description", "category", "subcategory", "start", "end", "tags"].contains(&name.trim()) {
            return Err(anyhow!("cannot clear unknown field {name:?}"));
        }
    }

    let mut patch = ItemPatch {
        title,
        ..ItemPatch::default()
    };
    patch.description = if cleared("description") { Some(None) } else { fields.description.map(Some) };
    patch.category_id = if cleared("category") {
        Some(None)
    } else {
        fields.category.map(|c| resolve_category(session, &c).map(Some)).transpose()?
    };
    patch.subcategory_id = if cleared("subcategory") {
        Some(None)
    } else {
        fields.subcategory.map(|c| resolve_category(session, &c).map(Some)).transpose()?
    };
    patch.start_date = if cleared("start") { Some(None) } else { fields.start.map(Some) };
    patch.end_date = if cleared("end") { Some(None) } else { fields.end.map(Some) };
    patch.tags = if cleared("tags") {
        Some(vec![])
    } else if fields.tags.is_empty() {
        None
    } else {
        Some(fields.tags)
    };
    Ok(patch)
}

#[instrument(skip(session))]
fn cmd_category(session: &mut Session, cmd: CategoryCmd) -> anyhow::Result<()> {
    match cmd {
        CategoryCmd::Add {
            name,
            color,
            icon,
            parent,
        } => {
            let parent_id = parent.map(|p| resolve_category(session, &p)).transpose()?;
            let create = CategoryCreate {
                name,
                color,
                icon,
                parent_id,
            };
            let category = categories::create_category(&mut session.store, &session.user, &create)?;
            println!("Created category {} ({}).", category.name, category.id);
        }
        CategoryCmd::Ls => {
            let all = categories::categories_for_user(&session.store, &session.user)?;
            session.renderer.write_categories(&mut io::stdout().lock(), &all)?;
        }
        CategoryCmd::Edit {
            category,
            name,
            color,
            icon,
            clear_icon,
        } => {
            let category_id = resolve_category(session, &category)?;
            let patch = CategoryPatch {
                name,
                color,
                icon: if clear_icon { Some(None) } else { icon.map(Some) },
            };
            let category = categories::update_category(&mut session.store, &session.user, &category_id, &patch)?;
            println!("Updated category {}.", category.name);
        }
        CategoryCmd::Reparent { category, parent } => {
            let category_id = resolve_category(session, &category)?;
            let parent_id = parent.map(|p| resolve_category(session, &p)).transpose()?;
            let category =
                categories::reparent_category(&mut session.store, &session.user, &category_id, parent_id.as_deref())?;
            match category.parent_id {
                Some(parent) => println!("Moved {} under {parent}.", category.name),
                None => println!("Moved {} to the top level.", category.name),
            }
        }
        CategoryCmd::Delete { category } => {
            let category_id = resolve_category(session, &category)?;
            let promoted = categories::delete_category(&mut session.store, &session.user, &category_id)?;
            println!("Deleted category {category_id}; {promoted} subcategories moved to the top level.");
        }
    }
    Ok(())
}

fn search_filter(args: &SearchArgs) -> SearchFilter {
    SearchFilter::new(&args.phrase(), &args.tags, &args.without_tags)
}

#[instrument(skip(session, search))]
fn cmd_stats(session: &mut Session, list: &str, search: &SearchArgs, json: bool) -> anyhow::Result<()> {
    let list_id = resolve_list(session, list)?;
    let board = lists::load_board(&session.store, &session.user, &list_id)?;
    let working = search_filter(search).apply(&board.items);
    let cats = categories::categories_for_user(&session.store, &session.user)?;
    let statistics = stats::aggregate(&working, &board.columns, &cats);
    debug!(total = statistics.total_items, "computed statistics");

    let mut out = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &statistics)?;
        writeln!(out)?;
    } else {
        session.renderer.write_stats(&mut out, &statistics)?;
    }
    Ok(())
}

#[instrument(skip(session))]
fn cmd_settings(session: &mut Session, cmd: SettingsCmd) -> anyhow::Result<()> {
    let current = match cmd {
        SettingsCmd::Show => settings::get_user_settings(&mut session.store, &session.user)?,
        SettingsCmd::Set { key, value } => {
            let patch = settings::parse_setting(&key, &value)?;
            settings::update_user_settings(&mut session.store, &session.hub, &session.user, &patch)?
        }
        SettingsCmd::Reset => export::reset_user_data(&mut session.store, &session.hub, &session.user)?,
    };
    session.renderer.write_settings(&mut io::stdout().lock(), &current)
}

#[instrument(skip(session))]
fn cmd_profile(session: &mut Session, cmd: ProfileCmd) -> anyhow::Result<()> {
    let current = match cmd {
        ProfileCmd::Show => profile::get_profile(&session.store, &session.user)?,
        ProfileCmd::Name { name } => {
            let saved = profile::update_display_name(&mut session.store, &session.user, name.as_deref())?;
            session.user.display_name = saved.display_name.clone();
            saved
        }
    };
    session.renderer.write_profile(&mut io::stdout().lock(), &current)
}

#[instrument(skip(session))]
fn cmd_prefs(session: &mut Session, cmd: PrefsCmd) -> anyhow::Result<()> {
    let mut next = session.prefs.clone();
    match cmd {
        PrefsCmd::Show => {
            return session.renderer.write_prefs(&mut io::stdout().lock(), &session.prefs);
        }
        PrefsCmd::Theme { theme } => {
            next.theme = serde_json::from_value(Value::String(theme.to_lowercase()))
                .map_err(|_| anyhow!("theme must be light, dark or system, got {theme:?}"))?;
        }
        PrefsCmd::Language { language } => {
            next.language = language.parse::<Language>()?;
        }
        PrefsCmd::TourDone => next.has_seen_tour = true,
    }

    prefs::save_prefs(&session.data_dir, &next)?;
    session.prefs = next;
    session.renderer.write_prefs(&mut io::stdout().lock(), &session.prefs)
}

#[instrument(skip(session))]
fn cmd_feedback(session: &mut Session, cmd: FeedbackCmd) -> anyhow::Result<()> {
    match cmd {
        FeedbackCmd::Submit { kind, subject, message } => {
            let kind: FeedbackKind = serde_json::from_value(Value::String(kind.to_lowercase()))
                .map_err(|_| anyhow!("feedback kind must be bug, feature or other, got {kind:?}"))?;
            let create = FeedbackCreate { kind, subject, message };
            let entry = feedback::submit_feedback(&mut session.store, &session.user, &create)?;
            println!("Thanks! Feedback {} recorded.", entry.id);
        }
        FeedbackCmd::Ls { status } => {
            let status = status.map(|s| parse_status(&s)).transpose()?;
            let entries = feedback::list_feedback(&session.store, &session.policy, &session.user, status)?;
            session.renderer.write_feedback(&mut io::stdout().lock(), &entries)?;
        }
        FeedbackCmd::Status { id, status } => {
            let status = parse_status(&status)?;
            let entries = feedback::list_feedback(&session.store, &session.policy, &session.user, None)?;
            let candidates: Vec<(String, String)> = entries.into_iter().map(|f| (f.id, f.subject)).collect();
            let feedback_id = resolve_unique(&id, "feedback", &candidates)?.to_string();
            let entry =
                feedback::set_feedback_status(&mut session.store, &session.policy, &session.user, &feedback_id, status)?;
            println!("Feedback {} is now {:?}.", entry.id, entry.status);
        }
    }
    Ok(())
}

fn parse_status(raw: &str) -> anyhow::Result<FeedbackStatus> {
    serde_json::from_value(Value::String(raw.to_lowercase()))
        .map_err(|_| anyhow!("status must be pending, reviewed or resolved, got {raw:?}"))
}

#[instrument(skip(session))]
fn cmd_export(session: &mut Session, output: Option<&Path>) -> anyhow::Result<()> {
    let data = export::export_user_data(&mut session.store, &session.user)?;
    let text = serde_json::to_string_pretty(&data)?;
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            println!("Exported {} lists to {}.", data.lists.len(), path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

#[instrument(skip(session))]
fn cmd_import(session: &mut Session, input: &Path) -> anyhow::Result<()> {
    let text = fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))?;
    let data = export::parse_export(&text)?;
    let written = export::import_user_data(&mut session.store, &session.hub, &session.user, &data)?;
    println!("Imported {written} documents.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<(String, String)> {
        vec![
            ("a1b2".to_string(), "Books".to_string()),
            ("a1c3".to_string(), "Films".to_string()),
            ("ff00".to_string(), "books".to_string()),
        ]
    }

    #[test]
    fn resolve_prefers_exact_then_prefix_then_name() {
        let c = candidates();
        assert_eq!(resolve_unique("a1c3", "list", &c).expect("exact"), "a1c3");
        assert_eq!(resolve_unique("ff", "list", &c).expect("prefix"), "ff00");
        assert_eq!(resolve_unique("films", "list", &c).expect("name"), "a1c3");
    }

    #[test]
    fn resolve_reports_ambiguity_and_misses() {
        let c = candidates();
        assert!(resolve_unique("a1", "list", &c).is_err());
        assert!(resolve_unique("BOOKS", "list", &c).is_err());
        let err = resolve_unique("zzz", "list", &c).expect_err("missing");
        assert!(err.to_string().contains("no list matches"));
    }
}
