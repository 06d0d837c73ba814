//! The user's profile document. Only the display name is editable here;
//! the email belongs to the identity and comes from configuration.

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::info;

use crate::auth::Identity;
use crate::categories::non_blank;
use crate::error::Result;
use crate::model::UserProfile;
use crate::store::{CollectionRef, DocRef, DocumentStore};

pub fn profile_doc(user_id: &str) -> DocRef {
    CollectionRef::root("users").doc(user_id)
}

/// The stored profile, or one derived from the identity when the user has
/// never saved it. Reading never writes.
pub fn get_profile(store: &DocumentStore, user: &Identity) -> Result<UserProfile> {
    Ok(store
        .get::<UserProfile>(&profile_doc(&user.uid))?
        .unwrap_or_else(|| UserProfile {
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            created_at: Utc::now(),
            updated_at: None,
        }))
}

/// Sets the display name; `None` or a blank name clears it. The first save
/// creates the document.
#[tracing::instrument(skip(store, user), fields(user_id = %user.uid))]
pub fn update_display_name(
    store: &mut DocumentStore,
    user: &Identity,
    display_name: Option<&str>,
) -> Result<UserProfile> {
    let display_name = non_blank(display_name);
    let doc = profile_doc(&user.uid);
    let now = Utc::now();

    if store.exists(&doc) {
        let mut fields = Map::new();
        fields.insert(
            "displayName".to_string(),
            display_name.as_deref().map_or(Value::Null, |n| json!(n)),
        );
        fields.insert("email".to_string(), json!(user.email));
        fields.insert("updatedAt".to_string(), json!(now));
        store.update(&doc, fields)?;
    } else {
        let profile = UserProfile {
            display_name,
            email: user.email.clone(),
            created_at: now,
            updated_at: Some(now),
        };
        store.set(&doc, &profile)?;
    }

    info!("updated profile");
    get_profile(store, user)
}

/// The identity with the stored display name taking precedence over the
/// configured one.
pub fn with_stored_name(store: &DocumentStore, user: Identity) -> Result<Identity> {
    let stored = store.get::<UserProfile>(&profile_doc(&user.uid))?;
    Ok(match stored {
        Some(profile) => Identity {
            display_name: profile.display_name,
            ..user
        },
        None => user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Identity {
        Identity {
            display_name: Some("From Config".to_string()),
            ..Identity::new("u1", "u1@example.com")
        }
    }

    #[test]
    fn unsaved_profile_comes_from_identity_without_writing() {
        let store = DocumentStore::in_memory();
        let profile = get_profile(&store, &user()).expect("profile");
        assert_eq!(profile.display_name.as_deref(), Some("From Config"));
        assert_eq!(profile.email, "u1@example.com");
        assert!(store.is_empty());
    }

    #[test]
    fn saved_name_overrides_config_and_can_be_cleared() {
        let mut store = DocumentStore::in_memory();
        let saved = update_display_name(&mut store, &user(), Some("  Ana  ")).expect("save");
        assert_eq!(saved.display_name.as_deref(), Some("Ana"));
        assert!(saved.updated_at.is_some());

        let identity = with_stored_name(&store, user()).expect("identity");
        assert_eq!(identity.display_name.as_deref(), Some("Ana"));
        assert_eq!(identity.email, "u1@example.com");

        let cleared = update_display_name(&mut store, &user(), Some(" ")).expect("clear");
        assert!(cleared.display_name.is_none());
        assert!(with_stored_name(&store, user()).expect("identity").display_name.is_none());
    }

    #[test]
    fn profiles_are_per_user() {
        let mut store = DocumentStore::in_memory();
        update_display_name(&mut store, &user(), Some("Ana")).expect("save");
        let other = Identity::new("u2", "u2@example.com");
        assert!(get_profile(&store, &other).expect("other").display_name.is_none());
    }
}
