use chrono::NaiveDate;
use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  Light,
  Dark,
  #[default]
  System
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum DefaultView {
  #[default]
  Board,
  List
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
  Bug,
  Feature,
  Other
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
  #[default]
  Pending,
  Reviewed,
  Resolved
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ListCreate {
  pub name:        String,
  #[serde(default)]
  pub description: Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
#[serde(rename_all = "camelCase")]
pub struct ListPatch {
  pub name:        Option<String>,
  pub description: Option<Option<String>>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ColumnCreate {
  pub header: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
#[serde(rename_all = "camelCase")]
pub struct ColumnPatch {
  pub header: Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
#[serde(rename_all = "camelCase")]
pub struct ItemCreate {
  pub title:          String,
  #[serde(default)]
  pub description:    Option<String>,
  #[serde(default)]
  pub category_id:    Option<String>,
  #[serde(default)]
  pub subcategory_id: Option<String>,
  #[serde(default)]
  pub start_date:     Option<NaiveDate>,
  #[serde(default)]
  pub end_date:       Option<NaiveDate>,
  #[serde(default)]
  pub tags:           Vec<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
  pub title:          Option<String>,
  pub description:    Option<Option<String>>,
  pub category_id:    Option<Option<String>>,
  pub subcategory_id: Option<Option<String>>,
  pub start_date:     Option<Option<NaiveDate>>,
  pub end_date:       Option<Option<NaiveDate>>,
  pub tags:           Option<Vec<String>>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCreate {
  pub name:      String,
  #[serde(default)]
  pub color:     Option<String>,
  #[serde(default)]
  pub icon:      Option<String>,
  #[serde(default)]
  pub parent_id: Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
  pub name:  Option<String>,
  pub color: Option<String>,
  pub icon:  Option<Option<String>>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackCreate {
  pub kind:    FeedbackKind,
  pub subject: String,
  pub message: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
  pub show_category_labels:      Option<bool>,
  pub show_category_icons:       Option<bool>,
  pub show_item_description:     Option<bool>,
  pub show_item_dates:           Option<bool>,
  pub show_item_tags:            Option<bool>,
  pub compact_mode:              Option<bool>,
  pub default_view:              Option<DefaultView>,
  pub theme:                     Option<Theme>,
  pub disable_category_colors:   Option<bool>,
  pub auto_increment_duplicates: Option<bool>
}

impl SettingsPatch {
  pub fn is_empty(&self) -> bool {
    self.show_category_labels.is_none()
      && self.show_category_icons.is_none()
      && self.show_item_description.is_none()
      && self.show_item_dates.is_none()
      && self.show_item_tags.is_none()
      && self.compact_mode.is_none()
      && self.default_view.is_none()
      && self.theme.is_none()
      && self.disable_category_colors.is_none()
      && self.auto_increment_duplicates.is_none()
  }
}

/// Position of an item inside a column: the column id plus the zero-based
/// index among that column's items ordered by `order`.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
  pub column_id: String,
  pub index:     usize
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn item_create_accepts_sparse_payload() {
    let create: ItemCreate =
      serde_json::from_str(
        r#"{"title":"Dune","categoryId":"books"}"#
      )
      .expect("parse item create");
    assert_eq!(create.title, "Dune");
    assert_eq!(
      create.category_id.as_deref(),
      Some("books")
    );
    assert!(create.tags.is_empty());
    assert!(create.start_date.is_none());
  }

  #[test]
  fn enums_use_lowercase_wire_names() {
    let json = serde_json::to_string(
      &FeedbackStatus::Reviewed
    )
    .expect("serialize status");
    assert_eq!(json, "\"reviewed\"");

    let theme: Theme =
      serde_json::from_str("\"dark\"")
        .expect("parse theme");
    assert_eq!(theme, Theme::Dark);
  }

  #[test]
  fn settings_patch_emptiness() {
    assert!(
      SettingsPatch::default().is_empty()
    );
    let patch = SettingsPatch {
      compact_mode: Some(true),
      ..SettingsPatch::default()
    };
    assert!(!patch.is_empty());
  }
}
