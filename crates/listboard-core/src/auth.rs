use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// The signed-in user every query is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: None,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let uid = cfg.user_id();
        let email = cfg.user_email();
        let display_name = cfg.user_name();
        debug!(uid = %uid, "resolved identity");
        Self {
            uid,
            email,
            display_name,
        }
    }
}

/// Who may moderate feedback. Evaluated on the service side; the list is
/// never handed to callers.
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    emails: BTreeSet<String>,
}

impl AdminPolicy {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|email| email.as_ref().trim().to_ascii_lowercase())
                .filter(|email| !email.is_empty())
                .collect(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let policy = Self::new(cfg.admin_emails());
        if policy.emails.is_empty() {
            debug!("no admin emails configured");
        }
        policy
    }

    pub fn is_admin(&self, user: &Identity) -> bool {
        !user.email.is_empty() && self.emails.contains(&user.email.trim().to_ascii_lowercase())
    }

    pub fn require_admin(&self, user: &Identity) -> Result<()> {
        if self.is_admin(user) {
            Ok(())
        } else {
            warn!(uid = %user.uid, "admin access denied");
            Err(Error::Forbidden("administrator access required".to_string()))
        }
    }
}

pub fn ensure_owner(owner_id: &str, user: &Identity, what: &str) -> Result<()> {
    if owner_id == user.uid {
        Ok(())
    } else {
        warn!(uid = %user.uid, owner = %owner_id, what, "ownership check failed");
        Err(Error::Forbidden(format!("{what} belongs to another user")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_match_is_case_insensitive_and_requires_email() {
        let policy = AdminPolicy::new([" Admin@Example.com ", ""]);
        assert!(policy.is_admin(&Identity::new("u1", "admin@example.COM")));
        assert!(!policy.is_admin(&Identity::new("u2", "someone@example.com")));
        assert!(!policy.is_admin(&Identity::new("u3", "")));
    }

    #[test]
    fn empty_policy_admits_nobody() {
        let policy = AdminPolicy::default();
        let err = policy
            .require_admin(&Identity::new("u1", "admin@example.com"))
            .expect_err("no admins");
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[test]
    fn owner_check() {
        let user = Identity::new("u1", "a@b.c");
        assert!(ensure_owner("u1", &user, "list").is_ok());
        assert!(ensure_owner("u2", &user, "list").is_err());
    }
}
