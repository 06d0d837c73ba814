use tracing::trace;

use crate::model::ListItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pred {
  TagInclude(String),
  TagExclude(String),
  TextContains(String)
}

/// Conjunction of predicates. The
/// free-text query is matched as one
/// phrase against the title or
/// description, case-insensitively.
/// Tag predicates only come from
/// explicit tag arguments.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
  preds: Vec<Pred>
}

impl SearchFilter {
  pub fn new(
    query: &str,
    include_tags: &[String],
    exclude_tags: &[String]
  ) -> Self {
    let mut preds = Vec::new();

    let needle = query.trim();
    if !needle.is_empty() {
      preds.push(Pred::TextContains(
        needle.to_lowercase()
      ));
    }
    preds.extend(
      normalized(include_tags)
        .map(Pred::TagInclude)
    );
    preds.extend(
      normalized(exclude_tags)
        .map(Pred::TagExclude)
    );

    trace!(?preds, "built search filter");
    Self {
      preds
    }
  }

  /// Shorthand for a free-text query
  /// without tag predicates.
  pub fn text(query: &str) -> Self {
    Self::new(query, &[], &[])
  }

  pub fn is_empty(&self) -> bool {
    self.preds.is_empty()
  }

  pub fn preds(&self) -> &[Pred] {
    &self.preds
  }

  pub fn matches(
    &self,
    item: &ListItem
  ) -> bool {
    self
      .preds
      .iter()
      .all(|pred| eval_pred(pred, item))
  }

  /// The working set: items passing the
  /// filter, in input order.
  pub fn apply(
    &self,
    items: &[ListItem]
  ) -> Vec<ListItem> {
    items
      .iter()
      .filter(|item| self.matches(item))
      .cloned()
      .collect()
  }
}

fn normalized(
  tags: &[String]
) -> impl Iterator<Item = String> + '_ {
  tags
    .iter()
    .map(|t| t.trim())
    .filter(|t| !t.is_empty())
    .map(str::to_lowercase)
}

fn eval_pred(
  pred: &Pred,
  item: &ListItem
) -> bool {
  match pred {
    | Pred::TagInclude(tag) => {
      has_tag(item, tag)
    }
    | Pred::TagExclude(tag) => {
      !has_tag(item, tag)
    }
    | Pred::TextContains(needle) => {
      item
        .title
        .to_lowercase()
        .contains(needle)
        || item
          .description
          .as_deref()
          .is_some_and(|d| {
            d.to_lowercase()
              .contains(needle)
          })
    }
  }
}

fn has_tag(
  item: &ListItem,
  tag: &str
) -> bool {
  item
    .tags
    .iter()
    .any(|t| t.to_lowercase() == tag)
}
