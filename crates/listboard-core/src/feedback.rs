use chrono::Utc;
use listboard_shared::{FeedbackCreate, FeedbackStatus};
use serde_json::{Map, json};
use tracing::info;

use crate::auth::{AdminPolicy, Identity};
use crate::error::{Error, Result};
use crate::model::{Feedback, new_id};
use crate::store::{CollectionRef, DocumentStore, Query};

pub fn feedback_ref() -> CollectionRef {
    CollectionRef::root("feedback")
}

#[tracing::instrument(skip(store, user, create), fields(user_id = %user.uid))]
pub fn submit_feedback(store: &mut DocumentStore, user: &Identity, create: &FeedbackCreate) -> Result<Feedback> {
    let subject = create.subject.trim();
    let message = create.message.trim();
    if subject.is_empty() {
        return Err(Error::validation("feedback subject is required"));
    }
    if message.is_empty() {
        return Err(Error::validation("feedback message is required"));
    }

    let feedback = Feedback {
        id: new_id(),
        kind: create.kind,
        subject: subject.to_string(),
        message: message.to_string(),
        user_id: user.uid.clone(),
        user_email: user.email.clone(),
        created_at: Utc::now(),
        status: FeedbackStatus::Pending,
    };
    store.set(&feedback_ref().doc(&feedback.id), &feedback)?;
    info!(feedback_id = %feedback.id, kind = ?feedback.kind, "submitted feedback");
    Ok(feedback)
}

/// All feedback, newest first, optionally narrowed to one status. Admins
/// only.
pub fn list_feedback(
    store: &DocumentStore,
    policy: &AdminPolicy,
    user: &Identity,
    status: Option<FeedbackStatus>,
) -> Result<Vec<Feedback>> {
    policy.require_admin(user)?;
    let mut all: Vec<Feedback> = store.query(&feedback_ref(), &Query::new())?;
    if let Some(status) = status {
        all.retain(|f| f.status == status);
    }
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(all)
}

#[tracing::instrument(skip(store, policy, user), fields(user_id = %user.uid))]
pub fn set_feedback_status(
    store: &mut DocumentStore,
    policy: &AdminPolicy,
    user: &Identity,
    feedback_id: &str,
    status: FeedbackStatus,
) -> Result<Feedback> {
    policy.require_admin(user)?;
    let doc = feedback_ref().doc(feedback_id);
    if !store.exists(&doc) {
        return Err(Error::not_found("feedback", feedback_id));
    }

    let mut fields = Map::new();
    fields.insert("status".to_string(), json!(status));
    store.update(&doc, fields)?;
    info!(feedback_id, ?status, "changed feedback status");

    store
        .get(&doc)?
        .ok_or_else(|| Error::not_found("feedback", feedback_id))
}

#[cfg(test)]
mod tests {
    use listboard_shared::FeedbackKind;

    use super::*;

    fn admin() -> Identity {
        Identity::new("a1", "boss@example.com")
    }

    fn member() -> Identity {
        Identity::new("u1", "me@example.com")
    }

    fn policy() -> AdminPolicy {
        AdminPolicy::new(["boss@example.com"])
    }

    fn report(subject: &str, message: &str) -> FeedbackCreate {
        FeedbackCreate {
            kind: FeedbackKind::Bug,
            subject: subject.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn submit_requires_subject_and_message() {
        let mut store = DocumentStore::in_memory();
        assert!(submit_feedback(&mut store, &member(), &report("", "body")).is_err());
        assert!(submit_feedback(&mut store, &member(), &report("title", "  ")).is_err());

        let fb = submit_feedback(&mut store, &member(), &report("Crash", "on start")).expect("submit");
        assert_eq!(fb.status, FeedbackStatus::Pending);
        assert_eq!(fb.user_email, "me@example.com");
    }

    #[test]
    fn only_admins_read_and_moderate() {
        let mut store = DocumentStore::in_memory();
        let fb = submit_feedback(&mut store, &member(), &report("Idea", "dark mode")).expect("submit");

        assert!(matches!(
            list_feedback(&store, &policy(), &member(), None),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            set_feedback_status(&mut store, &policy(), &member(), &fb.id, FeedbackStatus::Resolved),
            Err(Error::Forbidden(_))
        ));

        let updated =
            set_feedback_status(&mut store, &policy(), &admin(), &fb.id, FeedbackStatus::Reviewed).expect("status");
        assert_eq!(updated.status, FeedbackStatus::Reviewed);

        let pending = list_feedback(&store, &policy(), &admin(), Some(FeedbackStatus::Pending)).expect("list");
        assert!(pending.is_empty());
        assert_eq!(list_feedback(&store, &policy(), &admin(), None).expect("list").len(), 1);
    }

    #[test]
    fn unknown_feedback_is_not_found() {
        let mut store = DocumentStore::in_memory();
        let err = set_feedback_status(&mut store, &policy(), &admin(), "missing", FeedbackStatus::Resolved)
            .expect_err("missing");
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
