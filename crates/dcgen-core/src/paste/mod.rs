//! Paste orchestration.
//!
//! A paste turns clipboard intents into record mutations in fixed stages:
//! resolve the sources, apply the action, inherit grouping, relate and sort
//! against the target, persist, and finally cascade deep copies into child
//! record types. There is no transaction: an error leaves every record saved
//! before it in place.

mod target;

pub use target::PasteTarget;

use std::collections::HashSet;
use std::sync::Arc;

use dcgen_proto::RecordId;
use tracing::{debug, info};

use crate::clipboard::{ClipboardAction, ClipboardFilter, ClipboardItem, ClipboardStore};
use crate::collector::ModelCollector;
use crate::config::PasteConfig;
use crate::definition::{Definition, Mode, ParentChildCondition};
use crate::error::Error;
use crate::events::PersistListener;
use crate::record::Record;
use crate::relationship::RelationshipManager;
use crate::sorting::{Placement, SortingManager};
use crate::store::DataStore;

/// Outcome of a paste.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasteResult {
    /// The pasted records, in batch order.
    pub pasted: Vec<RecordId>,
    /// Every record saved, including renumbered siblings and deep copies.
    pub saved: Vec<RecordId>,
    /// (origin, clone) pairs of every copied record.
    pub copies: Vec<(RecordId, RecordId)>,
    /// Deepest deep-copy level reached; 0 when no children were copied.
    pub depth: usize,
}

/// A record taking part in a paste, with the origin it was cloned from.
struct Pending {
    record: Record,
    origin: Option<Record>,
    deep: bool,
}

/// Executes clipboard intents against a target position.
pub struct Orchestrator<'a> {
    collector: &'a ModelCollector,
    clipboard: &'a dyn ClipboardStore,
    listeners: Vec<Arc<dyn PersistListener>>,
    sorting: SortingManager,
    config: PasteConfig,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator for the collector's definition.
    pub fn new(collector: &'a ModelCollector, clipboard: &'a dyn ClipboardStore) -> Self {
        Self {
            sorting: SortingManager::for_definition(collector.definition()),
            collector,
            clipboard,
            listeners: Vec::new(),
            config: PasteConfig::default(),
        }
    }

    /// Notify `listener` around every save.
    pub fn with_listener(mut self, listener: Arc<dyn PersistListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Replace the paste limits.
    pub fn with_config(mut self, config: PasteConfig) -> Self {
        self.config = config;
        self
    }

    fn definition(&self) -> &Definition {
        self.collector.definition()
    }

    fn relationships(&self) -> &RelationshipManager {
        self.collector.relationships()
    }

    /// Paste every clipboard item passing `filter` and remove them from the
    /// clipboard afterwards.
    pub fn paste_clipboard(
        &self,
        filter: &ClipboardFilter,
        target: &PasteTarget,
    ) -> Result<PasteResult, Error> {
        let items = self.clipboard.fetch(filter);
        if items.is_empty() {
            return Err(Error::InvalidParameters(
                "no clipboard item matches the paste request".to_string(),
            ));
        }
        self.paste(items, target)
    }

    /// Paste a single explicit intent.
    pub fn paste_item(&self, item: ClipboardItem, target: &PasteTarget) -> Result<PasteResult, Error> {
        self.paste(vec![item], target)
    }

    fn paste(&self, items: Vec<ClipboardItem>, target: &PasteTarget) -> Result<PasteResult, Error> {
        let mut result = PasteResult::default();

        let mut pending = Vec::with_capacity(items.len());
        for item in &items {
            pending.push(self.resolve(item, target)?);
        }

        if let PasteTarget::After(anchor_id) = target {
            if let Some(grouping) = &self.definition().grouping {
                let anchor = self.require_record(anchor_id)?;
                let value = anchor.value(grouping);
                for entry in pending.iter_mut() {
                    entry.record.set(grouping.clone(), value.clone());
                }
            }
        }

        let (records, origins): (Vec<Record>, Vec<(Option<Record>, bool)>) = pending
            .into_iter()
            .map(|p| (p.record, (p.origin, p.deep)))
            .unzip();

        let saved = self.place_and_persist(records, target, &mut result)?;

        let mut created: HashSet<RecordId> = saved.iter().filter_map(Record::record_id).collect();
        for (clone, (origin, deep)) in saved.iter().zip(origins) {
            let Some(origin) = origin else {
                continue;
            };
            if let (Some(from), Some(to)) = (origin.record_id(), clone.record_id()) {
                result.copies.push((from, to));
            }
            if deep {
                self.copy_children(&origin, clone, 1, &mut created, &mut result)?;
            }
        }

        for item in &items {
            self.clipboard.remove(item);
        }

        info!(
            to = %target,
            pasted = result.pasted.len(),
            saved = result.saved.len(),
            copies = result.copies.len(),
            depth = result.depth,
            "paste completed"
        );
        Ok(result)
    }

    /// Resolve one intent into the record to place.
    fn resolve(&self, item: &ClipboardItem, target: &PasteTarget) -> Result<Pending, Error> {
        let root_type = &self.definition().root_type;
        if item.record_type != *root_type {
            return Err(Error::InvalidArgument(format!(
                "cannot paste '{}' records into '{}'",
                item.record_type,
                self.definition().name
            )));
        }

        let source = match (&item.source, item.action.needs_source()) {
            (Some(id), true) => Some(self.require_record(id)?),
            (None, true) => {
                return Err(Error::InvalidParameters(format!(
                    "{} requires a source record",
                    item.action
                )))
            }
            (_, false) => None,
        };

        let (mut record, origin, deep) = match (item.action, source) {
            (ClipboardAction::Create, _) => (self.collector.root_store()?.empty_record(), None, false),
            (ClipboardAction::Cut, Some(source)) => {
                self.guard_not_within(&source, target)?;
                (source, None, false)
            }
            (ClipboardAction::Copy, Some(source)) => (self.clone_record(&source), Some(source), false),
            (ClipboardAction::DeepCopy, Some(source)) => {
                (self.clone_record(&source), Some(source), true)
            }
            (action, None) => {
                return Err(Error::InvalidParameters(format!(
                    "{} requires a source record",
                    action
                )))
            }
        };
        self.collector.guard_originates_from(&record)?;

        if let Some(parent_id) = &item.parent {
            let parent = self.require_record(parent_id)?;
            self.relationships().set_parent(&mut record, &parent)?;
        }

        debug!(action = %item.action, source = ?item.source, "resolved clipboard item");
        Ok(Pending { record, origin, deep })
    }

    /// A copy of `source` without identifier and non-copyable properties.
    fn clone_record(&self, source: &Record) -> Record {
        let mut clone = source.clone_without_id();
        for property in self.definition().stripped_on_copy(source.record_type()) {
            clone.remove(property);
        }
        clone
    }

    /// Reject moving a record next to or below itself.
    fn guard_not_within(&self, source: &Record, target: &PasteTarget) -> Result<(), Error> {
        let (Some(source_id), Some(target_id)) = (source.record_id(), target.reference()) else {
            return Ok(());
        };
        if source_id == *target_id {
            return Err(Error::InvalidParameters(format!(
                "cannot paste {} relative to itself",
                source_id
            )));
        }
        if self.definition().mode == Mode::Hierarchical
            && target_id.record_type == source_id.record_type
        {
            let descendants = self.collector.collect_children_of(source, None, true)?;
            if descendants.contains(target_id) {
                return Err(Error::InvalidParameters(format!(
                    "cannot paste {} into its own subtree",
                    source_id
                )));
            }
        }
        Ok(())
    }

    /// Relate the batch to the target, sort it among its new siblings and
    /// persist everything affected. Returns the saved batch.
    fn place_and_persist(
        &self,
        mut batch: Vec<Record>,
        target: &PasteTarget,
        result: &mut PasteResult,
    ) -> Result<Vec<Record>, Error> {
        if batch.is_empty() {
            return Ok(batch);
        }

        let property = self.sorting.property();
        let (siblings, placement) = match target {
            PasteTarget::After(anchor_id) => {
                let anchor = self.require_record(anchor_id)?;
                self.collector.guard_originates_from(&anchor)?;
                self.relate_after(&mut batch, &anchor)?;

                let siblings = match property {
                    Some(_) => self.collector.collect_siblings_of(&anchor, property, None)?,
                    None => Vec::new(),
                };
                let anchor_ident = anchor
                    .id()
                    .cloned()
                    .ok_or_else(|| Error::RecordNotFound(anchor_id.clone()))?;
                (siblings, Placement::After(anchor_ident))
            }
            PasteTarget::Into(parent_id) => {
                let parent = self.require_record(parent_id)?;
                self.relationships().set_parent_for_all(&mut batch, &parent)?;
                let siblings = self.siblings_under(&batch[0], property, Some(parent_id))?;
                (siblings, Placement::Start)
            }
            PasteTarget::Top(Some(parent_id)) => {
                let parent = self.require_record(parent_id)?;
                self.relationships().set_parent_for_all(&mut batch, &parent)?;
                let siblings = self.siblings_under(&batch[0], property, Some(parent_id))?;
                (siblings, Placement::Start)
            }
            PasteTarget::Top(None) => {
                match self.definition().mode {
                    Mode::Hierarchical => self.relationships().set_all_root(&mut batch)?,
                    Mode::Parented => {
                        return Err(Error::InvalidParameters(format!(
                            "pasting at the top of '{}' requires a parent",
                            self.definition().name
                        )))
                    }
                    Mode::Flat => {}
                }
                let siblings = self.siblings_under(&batch[0], property, None)?;
                (siblings, Placement::Start)
            }
        };

        let (batch, shifted) = if property.is_some() {
            let outcome = self.sorting.place(batch, siblings, &placement)?;
            (outcome.batch, outcome.shifted)
        } else {
            (batch, Vec::new())
        };

        let store = self.collector.root_store()?;
        let mut saved = Vec::with_capacity(batch.len());
        for mut record in batch {
            self.persist(store.as_ref(), &mut record, result)?;
            if let Some(id) = record.record_id() {
                result.pasted.push(id);
            }
            saved.push(record);
        }
        if !shifted.is_empty() {
            debug!(count = shifted.len(), "persisting renumbered siblings");
        }
        for mut record in shifted {
            self.persist(store.as_ref(), &mut record, result)?;
        }

        Ok(saved)
    }

    /// Give the batch the parent (or root state) of the anchor.
    fn relate_after(&self, batch: &mut [Record], anchor: &Record) -> Result<(), Error> {
        let mode = self.definition().mode;
        if mode == Mode::Flat {
            return Ok(());
        }

        if mode == Mode::Hierarchical && self.relationships().is_root(anchor)? {
            return self.relationships().set_all_root(batch);
        }

        match self.collector.search_parent_of(anchor)? {
            Some(parent) => self.relationships().set_parent_for_all(batch, &parent),
            None => {
                let parent_type = match mode {
                    Mode::Parented => self.definition().parent_type.clone().unwrap_or_default(),
                    _ => self.definition().root_type.clone(),
                };
                for record in batch.iter_mut() {
                    self.relationships().set_same_parent(record, anchor, &parent_type)?;
                }
                Ok(())
            }
        }
    }

    fn siblings_under(
        &self,
        sample: &Record,
        property: Option<&str>,
        parent_id: Option<&RecordId>,
    ) -> Result<Vec<Record>, Error> {
        match property {
            Some(_) => self.collector.collect_siblings_of(sample, property, parent_id),
            None => Ok(Vec::new()),
        }
    }

    /// Copy every child of `origin` below `clone`, one batch per condition.
    fn copy_children(
        &self,
        origin: &Record,
        clone: &Record,
        depth: usize,
        created: &mut HashSet<RecordId>,
        result: &mut PasteResult,
    ) -> Result<(), Error> {
        for condition in self.definition().conditions_from(origin.record_type()) {
            let children: Vec<Record> = self
                .collector
                .fetch_children(origin, condition)?
                .into_iter()
                .filter(|child| child.record_id().map_or(true, |id| !created.contains(&id)))
                .collect();
            if children.is_empty() {
                continue;
            }

            if depth > self.config.max_depth {
                return Err(Error::MaxDepthExceeded { depth });
            }
            result.depth = result.depth.max(depth);

            debug!(
                parent = ?clone.record_id(),
                child_type = %condition.child_type,
                count = children.len(),
                depth,
                "deep copying children"
            );

            let saved = self.paste_children(&children, clone, condition, result)?;
            created.extend(saved.iter().filter_map(Record::record_id));
            for (child, copy) in children.iter().zip(&saved) {
                if let (Some(from), Some(to)) = (child.record_id(), copy.record_id()) {
                    result.copies.push((from, to));
                }
                self.copy_children(child, copy, depth + 1, created, result)?;
            }
        }
        Ok(())
    }

    /// Paste copies of `children` into `parent` under one condition.
    ///
    /// Children of the root type are sorted at the front of the new parent;
    /// other types keep their copied sorting values.
    fn paste_children(
        &self,
        children: &[Record],
        parent: &Record,
        condition: &ParentChildCondition,
        result: &mut PasteResult,
    ) -> Result<Vec<Record>, Error> {
        let mut batch: Vec<Record> = children.iter().map(|c| self.clone_record(c)).collect();
        for copy in batch.iter_mut() {
            condition.apply_to(parent, copy);
        }

        if condition.child_type == self.definition().root_type {
            if let (Some(_), Some(parent_id)) = (self.sorting.property(), parent.record_id()) {
                let siblings = self.collector.collect_siblings_of(
                    &batch[0],
                    self.sorting.property(),
                    Some(&parent_id),
                )?;
                let outcome = self.sorting.place(batch, siblings, &Placement::Start)?;
                batch = outcome.into_affected();
            }
        }

        let store = self.collector.store(&condition.child_type)?;
        for record in batch.iter_mut() {
            self.persist(store.as_ref(), record, result)?;
        }
        batch.truncate(children.len());
        Ok(batch)
    }

    /// Save one record, notifying the listeners around it.
    fn persist(
        &self,
        store: &dyn DataStore,
        record: &mut Record,
        result: &mut PasteResult,
    ) -> Result<(), Error> {
        let original = match record.id() {
            Some(id) if !record.meta.is_new => {
                store.fetch(&store.empty_query().with_id(id.clone()))?
            }
            _ => None,
        };

        for listener in &self.listeners {
            listener.pre_persist(record, original.as_ref());
        }
        store.save(record)?;
        for listener in &self.listeners {
            listener.post_persist(record, original.as_ref());
        }

        if let Some(id) = record.record_id() {
            result.saved.push(id);
        }
        Ok(())
    }

    fn require_record(&self, id: &RecordId) -> Result<Record, Error> {
        self.collector
            .get_record(id)?
            .ok_or_else(|| Error::RecordNotFound(id.clone()))
    }
}
