//! Relationship definition: the declarative metadata of one hierarchy.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use dcgen_proto::OrderSpec;
use serde::{Deserialize, Serialize};

use super::{ParentChildCondition, RootCondition};
use crate::error::Error;

/// How records of the root type are arranged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// A plain list without parents.
    #[default]
    Flat,
    /// A list whose records all belong to a record of a separate parent type.
    Parented,
    /// A tree: roots selected by the root condition, children by conditions.
    Hierarchical,
}

/// Per-property flags affecting copies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFlags {
    /// Never carried over to a copy.
    #[serde(default)]
    pub do_not_copy: bool,
    /// Must stay unique, so a copy starts without it.
    #[serde(default)]
    pub unique: bool,
}

impl PropertyFlags {
    /// Whether the property is stripped when a record is copied.
    pub fn stripped_on_copy(&self) -> bool {
        self.do_not_copy || self.unique
    }
}

/// Read-only relationship metadata for one logical hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    /// Definition name, used in messages.
    pub name: String,
    /// Arrangement of the root type.
    #[serde(default)]
    pub mode: Mode,
    /// The record type being administered.
    pub root_type: String,
    /// Parent record type in parented mode.
    #[serde(default)]
    pub parent_type: Option<String>,
    /// Root condition (required in hierarchical mode).
    #[serde(default)]
    pub root_condition: Option<RootCondition>,
    /// Parent-child conditions.
    #[serde(default)]
    pub conditions: Vec<ParentChildCondition>,
    /// Property flags keyed by record type, then property.
    #[serde(default)]
    pub properties: BTreeMap<String, BTreeMap<String, PropertyFlags>>,
    /// Manual sorting property of the root type.
    #[serde(default)]
    pub manual_sorting: Option<String>,
    /// Active listing sort order; earlier entries group later ones.
    #[serde(default)]
    pub sorting: Vec<OrderSpec>,
    /// Grouping property inherited by records pasted after a sibling.
    #[serde(default)]
    pub grouping: Option<String>,
}

impl Definition {
    /// Create a flat definition for a record type.
    pub fn new(name: impl Into<String>, root_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Flat,
            root_type: root_type.into(),
            parent_type: None,
            root_condition: None,
            conditions: Vec::new(),
            properties: BTreeMap::new(),
            manual_sorting: None,
            sorting: Vec::new(),
            grouping: None,
        }
    }

    /// Set the mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the parent type (parented mode).
    pub fn with_parent_type(mut self, parent_type: impl Into<String>) -> Self {
        self.parent_type = Some(parent_type.into());
        self
    }

    /// Set the root condition.
    pub fn with_root_condition(mut self, condition: RootCondition) -> Self {
        self.root_condition = Some(condition);
        self
    }

    /// Add a parent-child condition.
    pub fn with_condition(mut self, condition: ParentChildCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Set flags for one property of a record type.
    pub fn with_property_flags(
        mut self,
        record_type: impl Into<String>,
        property: impl Into<String>,
        flags: PropertyFlags,
    ) -> Self {
        self.properties
            .entry(record_type.into())
            .or_default()
            .insert(property.into(), flags);
        self
    }

    /// Set the manual sorting property.
    pub fn with_manual_sorting(mut self, property: impl Into<String>) -> Self {
        self.manual_sorting = Some(property.into());
        self
    }

    /// Set the listing sort order.
    pub fn with_sorting(mut self, sorting: Vec<OrderSpec>) -> Self {
        self.sorting = sorting;
        self
    }

    /// Set the grouping property.
    pub fn with_grouping(mut self, property: impl Into<String>) -> Self {
        self.grouping = Some(property.into());
        self
    }

    /// Parse and validate a JSON definition.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let definition: Definition = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid definition: {}", e)))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Read, parse and validate a JSON definition file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read definition {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Whether the definition describes a tree.
    pub fn is_hierarchical(&self) -> bool {
        self.mode == Mode::Hierarchical
    }

    /// Whether the definition describes a parented list.
    pub fn is_parented(&self) -> bool {
        self.mode == Mode::Parented
    }

    /// Condition for a (parent, child) pair of types.
    pub fn condition(&self, parent_type: &str, child_type: &str) -> Option<&ParentChildCondition> {
        self.conditions
            .iter()
            .find(|c| c.parent_type == parent_type && c.child_type == child_type)
    }

    /// Every record type the definition mentions, root type first.
    pub fn record_types(&self) -> Vec<&str> {
        let mut types = vec![self.root_type.as_str()];
        let mentioned = self
            .parent_type
            .iter()
            .map(String::as_str)
            .chain(self.conditions.iter().flat_map(|c| [c.parent_type.as_str(), c.child_type.as_str()]));
        for record_type in mentioned {
            if !types.contains(&record_type) {
                types.push(record_type);
            }
        }
        types
    }

    /// All conditions whose parent side is `parent_type`.
    pub fn conditions_from(&self, parent_type: &str) -> Vec<&ParentChildCondition> {
        self.conditions
            .iter()
            .filter(|c| c.parent_type == parent_type)
            .collect()
    }

    /// All conditions whose child side is `child_type`.
    pub fn conditions_to(&self, child_type: &str) -> Vec<&ParentChildCondition> {
        self.conditions
            .iter()
            .filter(|c| c.child_type == child_type)
            .collect()
    }

    /// Flags of a property, default flags when undeclared.
    pub fn property_flags(&self, record_type: &str, property: &str) -> PropertyFlags {
        self.properties
            .get(record_type)
            .and_then(|props| props.get(property))
            .copied()
            .unwrap_or_default()
    }

    /// Properties of a record type that a copy must not carry.
    pub fn stripped_on_copy(&self, record_type: &str) -> Vec<&str> {
        self.properties
            .get(record_type)
            .map(|props| {
                props
                    .iter()
                    .filter(|(_, flags)| flags.stripped_on_copy())
                    .map(|(name, _)| name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sorting properties that group `property`, i.e. precede it in the listing order.
    pub fn grouping_properties_before(&self, property: &str) -> Vec<&str> {
        match self.sorting.iter().position(|s| s.field == property) {
            Some(index) => self.sorting[..index].iter().map(|s| s.field.as_str()).collect(),
            None => Vec::new(),
        }
    }

    /// Check the definition for consistency.
    ///
    /// Runs once at load time; the rest of the engine relies on it.
    pub fn validate(&self) -> Result<(), Error> {
        if self.root_type.is_empty() {
            return Err(Error::Configuration(format!(
                "definition '{}' has no root type",
                self.name
            )));
        }

        match self.mode {
            Mode::Hierarchical => {
                let root = self.root_condition.as_ref().ok_or_else(|| {
                    Error::Configuration(format!(
                        "hierarchical definition '{}' requires a root condition for '{}'",
                        self.name, self.root_type
                    ))
                })?;
                if root.record_type != self.root_type {
                    return Err(Error::Configuration(format!(
                        "root condition of '{}' targets '{}' instead of '{}'",
                        self.name, root.record_type, self.root_type
                    )));
                }
            }
            Mode::Parented => {
                let parent_type = self.parent_type.as_deref().ok_or_else(|| {
                    Error::Configuration(format!(
                        "parented definition '{}' requires a parent type",
                        self.name
                    ))
                })?;
                if self.condition(parent_type, &self.root_type).is_none() {
                    return Err(Error::Configuration(format!(
                        "parented definition '{}' requires a condition from '{}' to '{}'",
                        self.name, parent_type, self.root_type
                    )));
                }
            }
            Mode::Flat => {}
        }

        if let Some(root) = &self.root_condition {
            if root.references_parent() {
                return Err(Error::Configuration(format!(
                    "root condition of '{}' may only use constants",
                    self.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for condition in &self.conditions {
            if !seen.insert((condition.parent_type.as_str(), condition.child_type.as_str())) {
                return Err(Error::Configuration(format!(
                    "duplicate condition from '{}' to '{}'",
                    condition.parent_type, condition.child_type
                )));
            }
        }

        self.check_acyclic()
    }

    /// Reject cycles between distinct record types.
    ///
    /// Self-referencing conditions are the tree of a single type and are
    /// allowed; the record data itself must still be a tree.
    fn check_acyclic(&self) -> Result<(), Error> {
        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        for condition in self.conditions.iter().filter(|c| !c.is_self_referencing()) {
            edges
                .entry(condition.parent_type.as_str())
                .or_default()
                .push(condition.child_type.as_str());
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            node: &'a str,
            edges: &HashMap<&'a str, Vec<&'a str>>,
            marks: &mut HashMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Result<(), Error> {
            match marks.get(node) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    path.push(node);
                    return Err(Error::Configuration(format!(
                        "relationship cycle: {}",
                        path.join(" -> ")
                    )));
                }
                None => {}
            }

            marks.insert(node, Mark::Visiting);
            path.push(node);
            for &next in edges.get(node).map(Vec::as_slice).unwrap_or_default() {
                visit(next, edges, marks, path)?;
            }
            path.pop();
            marks.insert(node, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        let mut starts: Vec<&str> = edges.keys().copied().collect();
        starts.sort_unstable();
        for start in starts {
            visit(start, &edges, &mut marks, &mut Vec::new())?;
        }
        Ok(())
    }
}
