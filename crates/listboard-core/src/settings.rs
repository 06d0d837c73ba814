//! Per-user display settings and the hub that fans changes out to
//! interested parts of the process.

use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

use listboard_shared::SettingsPatch;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::auth::Identity;
use crate::error::{Error, Result};
use crate::model::UserSettings;
use crate::store::{CollectionRef, DocRef, DocumentStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsChange {
    pub user_id: String,
    pub settings: UserSettings,
}

/// Publish/subscribe point for settings changes. Subscribers receive every
/// change published after they subscribed; dropped receivers are pruned on
/// the next publish.
#[derive(Debug, Default)]
pub struct SettingsHub {
    subscribers: Mutex<Vec<Sender<SettingsChange>>>,
}

impl SettingsHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SettingsChange> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn publish(&self, change: SettingsChange) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
        debug!(user_id = %change.user_id, subscribers = subscribers.len(), "published settings change");
    }
}

pub fn settings_doc(user_id: &str) -> DocRef {
    CollectionRef::root("settings").doc(user_id)
}

/// Returns the user's settings, writing the defaults on first access.
#[tracing::instrument(skip(store, user), fields(user_id = %user.uid))]
pub fn get_user_settings(store: &mut DocumentStore, user: &Identity) -> Result<UserSettings> {
    let doc = settings_doc(&user.uid);
    if let Some(settings) = store.get::<UserSettings>(&doc)? {
        return Ok(settings);
    }

    let settings = UserSettings::default();
    store.set(&doc, &settings)?;
    info!("created default settings");
    Ok(settings)
}

#[tracing::instrument(skip(store, hub, user, patch), fields(user_id = %user.uid))]
pub fn update_user_settings(
    store: &mut DocumentStore,
    hub: &SettingsHub,
    user: &Identity,
    patch: &SettingsPatch,
) -> Result<UserSettings> {
    let current = get_user_settings(store, user)?;
    if patch.is_empty() {
        return Ok(current);
    }

    store.update(&settings_doc(&user.uid), patch_fields(patch)?)?;
    let settings = store
        .get::<UserSettings>(&settings_doc(&user.uid))?
        .ok_or_else(|| Error::not_found("settings", user.uid.clone()))?;

    info!("updated settings");
    hub.publish(SettingsChange {
        user_id: user.uid.clone(),
        settings: settings.clone(),
    });
    Ok(settings)
}

#[tracing::instrument(skip(store, hub, user), fields(user_id = %user.uid))]
pub fn reset_user_settings(store: &mut DocumentStore, hub: &SettingsHub, user: &Identity) -> Result<UserSettings> {
    let settings = UserSettings::default();
    store.set(&settings_doc(&user.uid), &settings)?;
    info!("reset settings to defaults");
    hub.publish(SettingsChange {
        user_id: user.uid.clone(),
        settings: settings.clone(),
    });
    Ok(settings)
}

/// Parses a `key value` pair as typed on the command line into a patch.
/// Keys are accepted in camelCase or kebab-case.
pub fn parse_setting(key: &str, value: &str) -> Result<SettingsPatch> {
    let normalized: String = key.chars().filter(|c| *c != '-' && *c != '_').collect::<String>().to_lowercase();
    let mut patch = SettingsPatch::default();

    let flag = || {
        crate::config::parse_bool(value)
            .ok_or_else(|| Error::validation(format!("expected on/off for {key}, got {value:?}")))
    };

    match normalized.as_str() {
        "showcategorylabels" => patch.show_category_labels = Some(flag()?),
        "showcategoryicons" => patch.show_category_icons = Some(flag()?),
        "showitemdescription" => patch.show_item_description = Some(flag()?),
        "showitemdates" => patch.show_item_dates = Some(flag()?),
        "showitemtags" => patch.show_item_tags = Some(flag()?),
        "compactmode" => patch.compact_mode = Some(flag()?),
        "disablecategorycolors" => patch.disable_category_colors = Some(flag()?),
        "autoincrementduplicates" => patch.auto_increment_duplicates = Some(flag()?),
        "defaultview" => {
            patch.default_view = Some(
                serde_json::from_value(Value::String(value.to_lowercase()))
                    .map_err(|_| Error::validation(format!("default view must be board or list, got {value:?}")))?,
            );
        }
        "theme" => {
            patch.theme = Some(
                serde_json::from_value(Value::String(value.to_lowercase()))
                    .map_err(|_| Error::validation(format!("theme must be light, dark or system, got {value:?}")))?,
            );
        }
        _ => return Err(Error::validation(format!("unknown setting: {key}"))),
    }
    Ok(patch)
}

fn patch_fields(patch: &SettingsPatch) -> Result<Map<String, Value>> {
    let Value::Object(map) = serde_json::to_value(patch)? else {
        return Err(Error::Store("settings patch did not serialize to an object".to_string()));
    };
    Ok(map.into_iter().filter(|(_, value)| !value.is_null()).collect())
}

#[cfg(test)]
mod tests {
    use listboard_shared::{DefaultView, Theme};

    use super::*;

    fn user() -> Identity {
        Identity::new("u1", "u1@example.com")
    }

    #[test]
    fn first_read_creates_defaults() {
        let mut store = DocumentStore::in_memory();
        let settings = get_user_settings(&mut store, &user()).expect("settings");
        assert_eq!(settings, UserSettings::default());
        assert!(store.exists(&settings_doc("u1")));
    }

    #[test]
    fn update_merges_and_publishes() {
        let mut store = DocumentStore::in_memory();
        let hub = SettingsHub::new();
        let rx = hub.subscribe();

        let patch = SettingsPatch {
            compact_mode: Some(true),
            theme: Some(Theme::Dark),
            ..SettingsPatch::default()
        };
        let updated = update_user_settings(&mut store, &hub, &user(), &patch).expect("update");
        assert!(updated.compact_mode);
        assert_eq!(updated.theme, Theme::Dark);
        assert!(updated.show_item_tags);

        let change = rx.try_recv().expect("change delivered");
        assert_eq!(change.user_id, "u1");
        assert!(change.settings.compact_mode);
    }

    #[test]
    fn empty_patch_publishes_nothing() {
        let mut store = DocumentStore::in_memory();
        let hub = SettingsHub::new();
        let rx = hub.subscribe();
        update_user_settings(&mut store, &hub, &user(), &SettingsPatch::default()).expect("noop");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let hub = SettingsHub::new();
        let keep = hub.subscribe();
        drop(hub.subscribe());
        assert_eq!(hub.subscriber_count(), 2);

        hub.publish(SettingsChange {
            user_id: "u1".to_string(),
            settings: UserSettings::default(),
        });
        assert_eq!(hub.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }

    #[test]
    fn reset_restores_defaults() {
        let mut store = DocumentStore::in_memory();
        let hub = SettingsHub::new();
        let patch = parse_setting("compact-mode", "on").expect("parse");
        update_user_settings(&mut store, &hub, &user(), &patch).expect("update");
        let reset = reset_user_settings(&mut store, &hub, &user()).expect("reset");
        assert!(!reset.compact_mode);
    }

    #[test]
    fn parse_setting_accepts_both_spellings() {
        let patch = parse_setting("defaultView", "LIST").expect("view");
        assert_eq!(patch.default_view, Some(DefaultView::List));
        let patch = parse_setting("show-item-tags", "off").expect("tags");
        assert_eq!(patch.show_item_tags, Some(false));
        assert!(parse_setting("nope", "on").is_err());
        assert!(parse_setting("theme", "neon").is_err());
    }
}
