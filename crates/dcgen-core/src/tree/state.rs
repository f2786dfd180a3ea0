//! Expanded/collapsed state of tree nodes.

use std::collections::BTreeMap;

use dcgen_proto::Ident;
use serde::{Deserialize, Serialize};

/// Keyed lookup of whether a tree node is expanded.
pub trait NodeStateStore {
    /// Whether the node (record type, id) is expanded.
    fn is_expanded(&self, record_type: &str, id: &Ident) -> bool;
}

/// Node states kept by the caller between requests.
///
/// Ids are keyed by their JSON form so the states serialize to plain JSON
/// objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNodeStates {
    #[serde(default)]
    all_open: bool,
    #[serde(default)]
    states: BTreeMap<String, BTreeMap<String, bool>>,
}

impl TreeNodeStates {
    /// Create states with every node collapsed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every node is forced open.
    pub fn is_all_open(&self) -> bool {
        self.all_open
    }

    /// Force every node open (or stop forcing it).
    pub fn set_all_open(&mut self, all_open: bool) -> &mut Self {
        self.all_open = all_open;
        self
    }

    /// The explicit state of a node, ignoring the "all open" flag.
    pub fn explicit_state(&self, record_type: &str, id: &Ident) -> Option<bool> {
        self.states
            .get(record_type)
            .and_then(|ids| ids.get(&id.to_json()))
            .copied()
    }

    /// Set the explicit state of a node.
    pub fn set_expanded(&mut self, record_type: &str, id: &Ident, expanded: bool) -> &mut Self {
        self.states
            .entry(record_type.to_string())
            .or_default()
            .insert(id.to_json(), expanded);
        self
    }

    /// Flip the explicit state of a node and return the new state.
    pub fn toggle(&mut self, record_type: &str, id: &Ident) -> bool {
        let expanded = !self.explicit_state(record_type, id).unwrap_or(false);
        self.set_expanded(record_type, id, expanded);
        expanded
    }

    /// Forget every state.
    pub fn reset(&mut self) -> &mut Self {
        self.all_open = false;
        self.states.clear();
        self
    }
}

impl NodeStateStore for TreeNodeStates {
    fn is_expanded(&self, record_type: &str, id: &Ident) -> bool {
        self.all_open || self.explicit_state(record_type, id).unwrap_or(false)
    }
}
