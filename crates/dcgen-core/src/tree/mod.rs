//! Lazily expanded record trees.
//!
//! The walk only descends below expanded nodes. Collapsed nodes are probed
//! with a single-row query to know whether they have children at all.

mod state;

pub use state::{NodeStateStore, TreeNodeStates};

use std::collections::HashSet;

use dcgen_proto::{DataQuery, FilterExpr, Pagination, RecordId};
use tracing::{debug, warn};

use crate::collector::ModelCollector;
use crate::definition::ParentChildCondition;
use crate::error::Error;
use crate::panel::Panel;
use crate::record::Record;

/// Maximum tree depth walked.
const MAX_TREE_DEPTH: usize = 100;

/// A record and its loaded children.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// The record, with tree metadata filled in.
    pub record: Record,
    /// Children, empty unless the node is expanded.
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Depth-first, pre-order view of this node and its loaded descendants.
    pub fn flatten(&self) -> Vec<&Record> {
        let mut out = vec![&self.record];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }
}

/// Builds displayable trees of the definition's records.
pub struct TreeCollector<'a> {
    collector: &'a ModelCollector,
    states: &'a dyn NodeStateStore,
    panel: Option<&'a dyn Panel>,
    parent_filter: Option<FilterExpr>,
}

impl<'a> TreeCollector<'a> {
    /// Create a tree collector.
    pub fn new(collector: &'a ModelCollector, states: &'a dyn NodeStateStore) -> Self {
        Self {
            collector,
            states,
            panel: None,
            parent_filter: None,
        }
    }

    /// Apply a listing panel to every level.
    pub fn with_panel(mut self, panel: &'a dyn Panel) -> Self {
        self.panel = Some(panel);
        self
    }

    /// Restrict records of the root type to children of `parent`, a record of
    /// a separate parent list above the tree.
    pub fn with_parent(mut self, parent: &Record) -> Result<Self, Error> {
        let root_type = &self.collector.definition().root_type;
        let condition = self
            .collector
            .definition()
            .condition(parent.record_type(), root_type)
            .ok_or_else(|| Error::RelationshipMissing {
                parent: parent.record_type().to_string(),
                child: root_type.clone(),
            })?;
        self.parent_filter = Some(condition.filter_for(parent));
        Ok(self)
    }

    /// Collect the tree below `root`, or below all roots when `None`.
    pub fn collect(&self, root: Option<&RecordId>) -> Result<Vec<TreeNode>, Error> {
        let mut visited = HashSet::new();

        let tops = match root {
            Some(id) => {
                let record = self
                    .collector
                    .get_record(id)?
                    .ok_or_else(|| Error::RecordNotFound(id.clone()))?;
                vec![record]
            }
            None => {
                let store = self.collector.root_store()?;
                let mut query = self.collector.root_query()?;
                self.prepare(store.name(), &mut query, None);
                store.fetch_all(&query)?
            }
        };

        let mut nodes = Vec::with_capacity(tops.len());
        for record in tops {
            if let Some(node) = self.build_node(record, 0, &mut visited)? {
                nodes.push(node);
            }
        }
        debug!(roots = nodes.len(), "collected tree");
        Ok(nodes)
    }

    fn build_node(
        &self,
        mut record: Record,
        level: usize,
        visited: &mut HashSet<RecordId>,
    ) -> Result<Option<TreeNode>, Error> {
        let Some(id) = record.record_id() else {
            return Ok(None);
        };
        if !visited.insert(id.clone()) {
            warn!(record = %id, "record reached twice, skipping");
            return Ok(None);
        }

        let expanded = self.states.is_expanded(&id.record_type, &id.id);
        record.meta.tree_level = level;
        record.meta.is_expanded = expanded;

        let mut children = Vec::new();
        let conditions = self.collector.definition().conditions_from(record.record_type());
        for condition in conditions {
            if !expanded || level >= MAX_TREE_DEPTH {
                if self.has_children(&record, condition)? {
                    record.meta.has_children = true;
                    break;
                }
                continue;
            }

            for child in self.children_of(&record, condition)? {
                record.meta.has_children = true;
                if let Some(node) = self.build_node(child, level + 1, visited)? {
                    children.push(node);
                }
            }
        }

        Ok(Some(TreeNode { record, children }))
    }

    fn child_query(&self, parent: &Record, condition: &ParentChildCondition) -> DataQuery {
        let mut query = DataQuery::new().with_filter(condition.filter_for(parent));
        query.set_sorting(self.collector.listing_order(&condition.child_type));
        self.prepare(&condition.child_type, &mut query, Some(parent));
        query
    }

    fn children_of(&self, parent: &Record, condition: &ParentChildCondition) -> Result<Vec<Record>, Error> {
        let store = self.collector.store(&condition.child_type)?;
        store.fetch_all(&self.child_query(parent, condition))
    }

    fn has_children(&self, parent: &Record, condition: &ParentChildCondition) -> Result<bool, Error> {
        let store = self.collector.store(&condition.child_type)?;
        let mut query = self.child_query(parent, condition);
        query.set_pagination(Pagination::limit(1));
        query.set_id_only(true);
        Ok(store.fetch(&query)?.is_some())
    }

    /// Layer the panel and the parent-list filter onto a query.
    fn prepare(&self, record_type: &str, query: &mut DataQuery, parent: Option<&Record>) {
        if let Some(panel) = self.panel {
            panel.initialize(record_type, query, parent);
        }
        if record_type == self.collector.definition().root_type {
            if let Some(filter) = &self.parent_filter {
                query.add_filter(filter.clone());
            }
        }
    }
}
