//! Clipboard of pending create/cut/copy intents.

use std::fmt;
use std::str::FromStr;

use dcgen_proto::RecordId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;

/// What a paste does with the source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClipboardAction {
    /// Insert a new, empty record.
    Create,
    /// Move the source record.
    Cut,
    /// Insert a copy of the source record.
    Copy,
    /// Insert a copy of the source record and all its descendants.
    DeepCopy,
}

impl ClipboardAction {
    /// Whether the action needs a source record.
    pub fn needs_source(self) -> bool {
        !matches!(self, ClipboardAction::Create)
    }

    /// Whether the action inserts a clone of the source.
    pub fn is_copy(self) -> bool {
        matches!(self, ClipboardAction::Copy | ClipboardAction::DeepCopy)
    }

    /// Kebab-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            ClipboardAction::Create => "create",
            ClipboardAction::Cut => "cut",
            ClipboardAction::Copy => "copy",
            ClipboardAction::DeepCopy => "deep-copy",
        }
    }
}

impl fmt::Display for ClipboardAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClipboardAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ClipboardAction::Create),
            "cut" => Ok(ClipboardAction::Cut),
            "copy" => Ok(ClipboardAction::Copy),
            "deep-copy" | "deepcopy" => Ok(ClipboardAction::DeepCopy),
            other => Err(Error::InvalidArgument(format!("unknown clipboard action '{}'", other))),
        }
    }
}

/// A pending intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardItem {
    /// What to do.
    pub action: ClipboardAction,
    /// Record type the intent is about.
    pub record_type: String,
    /// Source record, absent for `create`.
    #[serde(default)]
    pub source: Option<RecordId>,
    /// Parent the record is meant for, when already known.
    #[serde(default)]
    pub parent: Option<RecordId>,
}

impl ClipboardItem {
    /// A `create` intent.
    pub fn create(record_type: impl Into<String>, parent: Option<RecordId>) -> Self {
        Self {
            action: ClipboardAction::Create,
            record_type: record_type.into(),
            source: None,
            parent,
        }
    }

    /// An intent acting on an existing record.
    pub fn with_source(action: ClipboardAction, source: RecordId, parent: Option<RecordId>) -> Self {
        Self {
            action,
            record_type: source.record_type.clone(),
            source: Some(source),
            parent,
        }
    }

    /// A `cut` intent.
    pub fn cut(source: RecordId) -> Self {
        Self::with_source(ClipboardAction::Cut, source, None)
    }

    /// A `copy` intent.
    pub fn copy(source: RecordId) -> Self {
        Self::with_source(ClipboardAction::Copy, source, None)
    }

    /// A `deep-copy` intent.
    pub fn deep_copy(source: RecordId) -> Self {
        Self::with_source(ClipboardAction::DeepCopy, source, None)
    }

    /// Set the intended parent.
    pub fn with_parent(mut self, parent: RecordId) -> Self {
        self.parent = Some(parent);
        self
    }

    fn same_intent(&self, other: &ClipboardItem) -> bool {
        self.action == other.action
            && self.record_type == other.record_type
            && self.source == other.source
    }
}

/// Parent scope of a clipboard filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParentScope {
    /// Any parent or none.
    #[default]
    Any,
    /// Items without a parent.
    NoParent,
    /// Items meant for this parent.
    Parent(RecordId),
}

/// Narrows the clipboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardFilter {
    record_type: Option<String>,
    actions: Vec<ClipboardAction>,
    parent: ParentScope,
    sources: Vec<RecordId>,
}

impl ClipboardFilter {
    /// A filter matching every item.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only items of a record type.
    pub fn for_type(record_type: impl Into<String>) -> Self {
        Self {
            record_type: Some(record_type.into()),
            ..Default::default()
        }
    }

    /// Also accept an action. Without any action, all are accepted.
    pub fn with_action(mut self, action: ClipboardAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Restrict the parent scope.
    pub fn with_parent_scope(mut self, parent: ParentScope) -> Self {
        self.parent = parent;
        self
    }

    /// Also accept a source. Without any source, all are accepted.
    pub fn with_source(mut self, source: RecordId) -> Self {
        self.sources.push(source);
        self
    }

    /// Whether an item passes the filter.
    pub fn matches(&self, item: &ClipboardItem) -> bool {
        if let Some(record_type) = &self.record_type {
            if item.record_type != *record_type {
                return false;
            }
        }
        if !self.actions.is_empty() && !self.actions.contains(&item.action) {
            return false;
        }
        let parent_ok = match &self.parent {
            ParentScope::Any => true,
            ParentScope::NoParent => item.parent.is_none(),
            ParentScope::Parent(id) => item.parent.as_ref() == Some(id),
        };
        if !parent_ok {
            return false;
        }
        self.sources.is_empty()
            || item
                .source
                .as_ref()
                .is_some_and(|source| self.sources.contains(source))
    }
}

/// Storage of clipboard items across the cut/copy and paste requests.
pub trait ClipboardStore: Send + Sync {
    /// Items passing `filter`, oldest first.
    fn fetch(&self, filter: &ClipboardFilter) -> Vec<ClipboardItem>;

    /// Add an item, replacing an older item with the same action and source.
    fn push(&self, item: ClipboardItem);

    /// Remove an item. Returns whether it was present.
    fn remove(&self, item: &ClipboardItem) -> bool;

    /// Remove every item.
    fn clear(&self);
}

/// In-memory clipboard.
#[derive(Debug, Default)]
pub struct Clipboard {
    items: RwLock<Vec<ClipboardItem>>,
}

impl Clipboard {
    /// Create an empty clipboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clipboard holding `items`.
    pub fn from_items(items: impl IntoIterator<Item = ClipboardItem>) -> Self {
        let clipboard = Self::new();
        for item in items {
            clipboard.push(item);
        }
        clipboard
    }

    /// Snapshot of every item.
    pub fn items(&self) -> Vec<ClipboardItem> {
        self.items.read().clone()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether the clipboard is empty.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl ClipboardStore for Clipboard {
    fn fetch(&self, filter: &ClipboardFilter) -> Vec<ClipboardItem> {
        self.items
            .read()
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect()
    }

    fn push(&self, item: ClipboardItem) {
        let mut items = self.items.write();
        items.retain(|existing| !existing.same_intent(&item));
        debug!(action = %item.action, record_type = %item.record_type, "clipboard push");
        items.push(item);
    }

    fn remove(&self, item: &ClipboardItem) -> bool {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|existing| existing != item);
        items.len() != before
    }

    fn clear(&self) {
        self.items.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: i64) -> RecordId {
        RecordId::new("tl_page", id)
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("deep-copy".parse::<ClipboardAction>().unwrap(), ClipboardAction::DeepCopy);
        assert_eq!(ClipboardAction::Cut.to_string(), "cut");
        assert!("move".parse::<ClipboardAction>().is_err());
        assert!(!ClipboardAction::Create.needs_source());
        assert!(ClipboardAction::DeepCopy.is_copy());
    }

    #[test]
    fn test_push_replaces_same_intent() {
        let clipboard = Clipboard::new();
        clipboard.push(ClipboardItem::copy(page(1)));
        clipboard.push(ClipboardItem::copy(page(1)).with_parent(page(7)));
        clipboard.push(ClipboardItem::cut(page(1)));

        assert_eq!(clipboard.len(), 2);
        let copies = clipboard.fetch(&ClipboardFilter::new().with_action(ClipboardAction::Copy));
        assert_eq!(copies[0].parent, Some(page(7)));
    }

    #[test]
    fn test_filter_scopes() {
        let clipboard = Clipboard::from_items(vec![
            ClipboardItem::cut(page(1)),
            ClipboardItem::copy(page(2)).with_parent(page(5)),
            ClipboardItem::create("tl_page", None),
            ClipboardItem::copy(RecordId::new("tl_article", 1)),
        ]);

        assert_eq!(clipboard.fetch(&ClipboardFilter::for_type("tl_page")).len(), 3);
        assert_eq!(
            clipboard
                .fetch(&ClipboardFilter::for_type("tl_page").with_parent_scope(ParentScope::NoParent))
                .len(),
            2
        );
        assert_eq!(
            clipboard
                .fetch(&ClipboardFilter::new().with_parent_scope(ParentScope::Parent(page(5))))
                .len(),
            1
        );
        assert_eq!(clipboard.fetch(&ClipboardFilter::new().with_source(page(1))).len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let clipboard = Clipboard::from_items(vec![ClipboardItem::cut(page(1)), ClipboardItem::copy(page(2))]);
        assert!(clipboard.remove(&ClipboardItem::cut(page(1))));
        assert!(!clipboard.remove(&ClipboardItem::cut(page(1))));
        assert_eq!(clipboard.len(), 1);

        clipboard.clear();
        assert!(clipboard.is_empty());
    }

    #[test]
    fn test_item_json() {
        let item = ClipboardItem::deep_copy(page(3)).with_parent(page(1));
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"deep-copy\""));
        assert!(json.contains("tl_page::3"));
        let decoded: ClipboardItem = serde_json::from_str(&json).unwrap();
        assert_eq!(item, decoded);
    }
}
