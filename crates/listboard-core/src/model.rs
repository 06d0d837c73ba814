use chrono::{DateTime, NaiveDate, Utc};
use listboard_shared::{DefaultView, FeedbackKind, FeedbackStatus, Theme};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document ids double as the last segment of the document path.
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub header: String,
    pub order: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub column_id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub subcategory_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub order: usize,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ListItem {
    pub fn new(title: impl Into<String>, column_id: impl Into<String>, order: usize) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            description: None,
            column_id: column_id.into(),
            category_id: None,
            subcategory_id: None,
            start_date: None,
            end_date: None,
            order,
            tags: vec![],
        }
    }

    pub fn has_dates(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }

    pub fn has_description(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub user_id: String,
}

impl Category {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// The `users/{uid}` document. The email mirrors the identity at the time
/// of the last write and is never read back into it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub show_category_labels: bool,
    pub show_category_icons: bool,
    pub show_item_description: bool,
    pub show_item_dates: bool,
    pub show_item_tags: bool,
    pub compact_mode: bool,
    pub default_view: DefaultView,
    pub theme: Theme,
    pub disable_category_colors: bool,
    pub auto_increment_duplicates: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            show_category_labels: true,
            show_category_icons: true,
            show_item_description: true,
            show_item_dates: true,
            show_item_tags: true,
            compact_mode: false,
            default_view: DefaultView::Board,
            theme: Theme::System,
            disable_category_colors: false,
            auto_increment_duplicates: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: String,
    pub kind: FeedbackKind,
    pub subject: String,
    pub message: String,
    pub user_id: String,
    pub user_email: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: FeedbackStatus,
}
