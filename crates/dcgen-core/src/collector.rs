//! Resolving parents, siblings and children across data stores.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use dcgen_proto::{DataQuery, FilterExpr, OrderSpec, RecordId, Value};
use tracing::{debug, trace, warn};

use crate::definition::{Definition, Mode, ParentChildCondition, SetOn};
use crate::error::Error;
use crate::panel::Panel;
use crate::record::Record;
use crate::relationship::RelationshipManager;
use crate::store::{DataStore, DataStores};

/// Maximum depth of exhaustive tree walks.
const MAX_WALK_DEPTH: usize = 100;

/// Resolves structural relationships of the definition's root type.
#[derive(Debug, Clone)]
pub struct ModelCollector {
    definition: Arc<Definition>,
    relationships: RelationshipManager,
    stores: DataStores,
}

impl ModelCollector {
    /// Create a collector over the given stores.
    pub fn new(definition: Arc<Definition>, stores: DataStores) -> Self {
        Self {
            relationships: RelationshipManager::new(definition.clone()),
            definition,
            stores,
        }
    }

    /// The underlying definition.
    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// The relationship manager of the definition.
    pub fn relationships(&self) -> &RelationshipManager {
        &self.relationships
    }

    /// The registered data stores.
    pub fn stores(&self) -> &DataStores {
        &self.stores
    }

    /// Store of a record type.
    pub fn store(&self, record_type: &str) -> Result<&Arc<dyn DataStore>, Error> {
        self.stores.get(record_type)
    }

    /// Store of the root type.
    pub fn root_store(&self) -> Result<&Arc<dyn DataStore>, Error> {
        self.stores.get(&self.definition.root_type)
    }

    /// Fetch a record. `Ok(None)` when it does not exist.
    pub fn get_record(&self, id: &RecordId) -> Result<Option<Record>, Error> {
        let store = self.store(&id.record_type)?;
        store.fetch(&store.empty_query().with_id(id.id.clone()))
    }

    /// Fetch a record by its serialized id. Malformed ids are an invalid argument.
    pub fn get_record_serialized(&self, serialized: &str) -> Result<Option<Record>, Error> {
        let id = RecordId::parse(serialized)?;
        self.get_record(&id)
    }

    /// Fail unless `record` belongs to the root type.
    pub fn guard_originates_from(&self, record: &Record) -> Result<(), Error> {
        if record.record_type() != self.definition.root_type {
            return Err(Error::InvalidArgument(format!(
                "record of type '{}' does not originate from '{}'",
                record.record_type(),
                self.definition.root_type
            )));
        }
        Ok(())
    }

    /// Query selecting all roots (hierarchical) or all records (otherwise)
    /// of the root type, in listing order.
    pub fn root_query(&self) -> Result<DataQuery, Error> {
        let mut query = self.root_store()?.empty_query();
        if self.definition.mode == Mode::Hierarchical {
            let root = self.definition.root_condition.as_ref().ok_or_else(|| {
                Error::Configuration(format!(
                    "hierarchical definition '{}' has no root condition",
                    self.definition.name
                ))
            })?;
            query.add_filter(root.filter());
        }
        query.set_sorting(self.listing_order(&self.definition.root_type));
        Ok(query)
    }

    /// Children of `parent` under one condition, in listing order.
    pub fn fetch_children(
        &self,
        parent: &Record,
        condition: &ParentChildCondition,
    ) -> Result<Vec<Record>, Error> {
        let store = self.store(&condition.child_type)?;
        let mut query = store.empty_query();
        query.set_filter(condition.filter_for(parent));
        query.set_sorting(self.listing_order(&condition.child_type));
        store.fetch_all(&query)
    }

    /// Locate the parent of `record`.
    ///
    /// Hierarchical mode tries the inverse filter of self-referencing
    /// conditions first and falls back to an exhaustive walk from the roots.
    /// Roots have no parent.
    pub fn search_parent_of(&self, record: &Record) -> Result<Option<Record>, Error> {
        self.guard_originates_from(record)?;

        match self.definition.mode {
            Mode::Hierarchical => {
                if self.relationships.is_root(record)? {
                    return Ok(None);
                }

                for condition in self.definition.conditions_to(record.record_type()) {
                    if !condition.is_self_referencing() {
                        continue;
                    }
                    if let Some(filter) = condition.inverse_filter_for(record) {
                        let store = self.store(&condition.parent_type)?;
                        let parent = store.fetch(&store.empty_query().with_filter(filter))?;
                        if let Some(parent) = parent {
                            if condition.matches(&parent, record) {
                                return Ok(Some(parent));
                            }
                        }
                    }
                }

                trace!(record = ?record.record_id(), "walking tree to locate parent");
                let roots = self.root_store()?.fetch_all(&self.root_query()?)?;
                self.search_parent_of_in(record, roots)
            }
            Mode::Parented => {
                let condition = self.parented_condition()?;
                let store = self.store(&condition.parent_type)?;

                if let Some(filter) = condition.inverse_filter_for(record) {
                    return store.fetch(&store.empty_query().with_filter(filter));
                }

                let candidates = store.fetch_all(&store.empty_query())?;
                Ok(candidates
                    .into_iter()
                    .find(|candidate| condition.matches(candidate, record)))
            }
            Mode::Flat => Err(Error::InvalidArgument(format!(
                "definition '{}' is neither hierarchical nor parented, records have no parent",
                self.definition.name
            ))),
        }
    }

    /// Search `candidates` and everything below them for the parent of `record`.
    pub fn search_parent_of_in(
        &self,
        record: &Record,
        candidates: Vec<Record>,
    ) -> Result<Option<Record>, Error> {
        let mut visited = HashSet::new();
        self.search_parent_recursive(record, candidates, &mut visited, 0)
    }

    fn search_parent_recursive(
        &self,
        record: &Record,
        candidates: Vec<Record>,
        visited: &mut HashSet<RecordId>,
        depth: usize,
    ) -> Result<Option<Record>, Error> {
        if depth > MAX_WALK_DEPTH {
            warn!(depth, "parent search exceeded maximum depth");
            return Ok(None);
        }

        for candidate in candidates {
            if let Some(id) = candidate.record_id() {
                if !visited.insert(id) {
                    continue;
                }
            }

            let conditions = self.definition.conditions_from(candidate.record_type());
            if conditions
                .iter()
                .any(|c| c.child_type == record.record_type() && c.matches(&candidate, record))
            {
                return Ok(Some(candidate));
            }

            for condition in conditions {
                let children = self.fetch_children(&candidate, condition)?;
                if let Some(found) =
                    self.search_parent_recursive(record, children, visited, depth + 1)?
                {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    /// Ordered siblings of `record`: same type, same parent and, when the
    /// listing is grouped, the same values of every sorting property that
    /// precedes `sorting_property`.
    ///
    /// An explicit `parent_id` takes precedence over the record's own parent.
    pub fn collect_siblings_of(
        &self,
        record: &Record,
        sorting_property: Option<&str>,
        parent_id: Option<&RecordId>,
    ) -> Result<Vec<Record>, Error> {
        self.collect_siblings_in(record, sorting_property, parent_id, None)
    }

    /// Like [`collect_siblings_of`](Self::collect_siblings_of), with the base
    /// query prepared by `panel` first. Panel filters narrow the siblings;
    /// panel sorting and pagination are ignored, the list is always complete
    /// and ordered by the sorting property.
    pub fn collect_siblings_in(
        &self,
        record: &Record,
        sorting_property: Option<&str>,
        parent_id: Option<&RecordId>,
        panel: Option<&dyn Panel>,
    ) -> Result<Vec<Record>, Error> {
        self.guard_originates_from(record)?;

        let store = self.root_store()?;
        let mut query = store.empty_query();
        let mut parent_record = None;

        if let Some(parent_id) = parent_id {
            let parent = self
                .get_record(parent_id)?
                .ok_or_else(|| Error::RecordNotFound(parent_id.clone()))?;
            let condition = self.require_condition(parent.record_type(), record.record_type())?;
            query.add_filter(condition.filter_for(&parent));
            parent_record = Some(parent);
        } else {
            match self.definition.mode {
                Mode::Hierarchical => {
                    if self.relationships.is_root(record)? {
                        if let Some(root) = &self.definition.root_condition {
                            query.add_filter(root.filter());
                        }
                    } else {
                        match self.search_parent_of(record)? {
                            Some(parent) => {
                                let condition = self
                                    .require_condition(parent.record_type(), record.record_type())?;
                                query.add_filter(condition.filter_for(&parent));
                                parent_record = Some(parent);
                            }
                            None => {
                                warn!(
                                    record = ?record.record_id(),
                                    "record has no parent and is not a root"
                                );
                                let condition = self.self_condition()?;
                                query.add_filter(same_parent_filter(condition, record));
                            }
                        }
                    }
                }
                Mode::Parented => {
                    let condition = self.parented_condition()?;
                    match self.search_parent_of(record)? {
                        Some(parent) => {
                            query.add_filter(condition.filter_for(&parent));
                            parent_record = Some(parent);
                        }
                        None => {
                            query.add_filter(same_parent_filter(condition, record));
                        }
                    };
                }
                Mode::Flat => {}
            }
        }

        if let Some(panel) = panel {
            panel.initialize(record.record_type(), &mut query, parent_record.as_ref());
            query.pagination = None;
        }

        if let Some(property) = sorting_property {
            for grouping in self.definition.grouping_properties_before(property) {
                let filter = match record.value(grouping) {
                    Value::Null => FilterExpr::is_null(grouping),
                    value => FilterExpr::eq(grouping, value),
                };
                query.add_filter(filter);
            }
            query.set_sorting(vec![OrderSpec::asc(property)]);
        } else {
            query.set_sorting(self.definition.sorting.clone());
        }

        debug!(record = ?record.record_id(), filter = ?query.filter, "collecting siblings");
        store.fetch_all(&query)
    }

    /// Identifiers of the children of `record`.
    ///
    /// With `record_type` set, follows the shortest chain of conditions from
    /// the record's type to that type; an empty hop ends the search. Without
    /// it, children of the record's own type are collected. `recursive`
    /// additionally descends through every generation of the target type.
    pub fn collect_children_of(
        &self,
        record: &Record,
        record_type: Option<&str>,
        recursive: bool,
    ) -> Result<Vec<RecordId>, Error> {
        let target = record_type.unwrap_or(record.record_type());
        let self_condition = self.definition.condition(target, target);

        let mut frontier = vec![record.clone()];
        if target == record.record_type() {
            let Some(condition) = self_condition else {
                return Ok(Vec::new());
            };
            frontier = self.children_under(&frontier, condition)?;
        } else {
            let Some(path) = self.type_path(record.record_type(), target) else {
                debug!(from = record.record_type(), to = target, "no relationship path");
                return Ok(Vec::new());
            };
            for condition in path {
                frontier = self.children_under(&frontier, condition)?;
                if frontier.is_empty() {
                    return Ok(Vec::new());
                }
            }
        }

        let mut ids: Vec<RecordId> = frontier.iter().filter_map(Record::record_id).collect();
        if !recursive {
            return Ok(ids);
        }

        let Some(condition) = self_condition else {
            return Ok(ids);
        };
        let mut seen: HashSet<RecordId> = ids.iter().cloned().collect();
        let mut queue: VecDeque<Record> = frontier.into();
        while let Some(parent) = queue.pop_front() {
            for child in self.fetch_children(&parent, condition)? {
                if let Some(id) = child.record_id() {
                    if seen.insert(id.clone()) {
                        ids.push(id);
                        queue.push_back(child);
                    }
                }
            }
        }
        Ok(ids)
    }

    fn children_under(
        &self,
        parents: &[Record],
        condition: &ParentChildCondition,
    ) -> Result<Vec<Record>, Error> {
        let mut children = Vec::new();
        for parent in parents {
            children.extend(self.fetch_children(parent, condition)?);
        }
        Ok(children)
    }

    /// Shortest chain of distinct-type conditions from `from` to `to`.
    fn type_path(&self, from: &str, to: &str) -> Option<Vec<&ParentChildCondition>> {
        let mut queue = VecDeque::from([(from, Vec::new())]);
        let mut seen = HashSet::from([from]);

        while let Some((current, path)) = queue.pop_front() {
            for condition in self.definition.conditions_from(current) {
                if condition.is_self_referencing() || !seen.insert(condition.child_type.as_str()) {
                    continue;
                }
                let mut next: Vec<&ParentChildCondition> = path.clone();
                next.push(condition);
                if condition.child_type == to {
                    return Some(next);
                }
                queue.push_back((condition.child_type.as_str(), next));
            }
        }
        None
    }

    /// Sort order used when listing records of a type.
    pub(crate) fn listing_order(&self, record_type: &str) -> Vec<OrderSpec> {
        if record_type != self.definition.root_type {
            return Vec::new();
        }
        if !self.definition.sorting.is_empty() {
            return self.definition.sorting.clone();
        }
        self.definition
            .manual_sorting
            .iter()
            .map(|property| OrderSpec::asc(property.clone()))
            .collect()
    }

    fn require_condition(
        &self,
        parent_type: &str,
        child_type: &str,
    ) -> Result<&ParentChildCondition, Error> {
        self.definition
            .condition(parent_type, child_type)
            .ok_or_else(|| Error::RelationshipMissing {
                parent: parent_type.to_string(),
                child: child_type.to_string(),
            })
    }

    fn self_condition(&self) -> Result<&ParentChildCondition, Error> {
        let root_type = &self.definition.root_type;
        self.require_condition(root_type, root_type)
    }

    fn parented_condition(&self) -> Result<&ParentChildCondition, Error> {
        let parent_type = self.definition.parent_type.as_deref().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "parented definition '{}' has no parent type",
                self.definition.name
            ))
        })?;
        self.definition
            .condition(parent_type, &self.definition.root_type)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "no condition from '{}' to '{}' configured",
                    parent_type, self.definition.root_type
                ))
            })
    }
}

/// Filter matching records that carry the same parent-identifying values as `record`.
fn same_parent_filter(condition: &ParentChildCondition, record: &Record) -> FilterExpr {
    let parts: Vec<FilterExpr> = condition
        .set_on
        .iter()
        .map(|rule| {
            let property = match rule {
                SetOn::Copy { to_field, .. } => to_field,
                SetOn::Constant { property, .. } => property,
            };
            match record.value(property) {
                Value::Null => FilterExpr::is_null(property.clone()),
                value => FilterExpr::eq(property.clone(), value),
            }
        })
        .collect();
    FilterExpr::and(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ParentChildCondition, RootCondition};
    use crate::store::MemoryStore;
    use dcgen_proto::Ident;

    fn page_tree() -> Arc<Definition> {
        Arc::new(
            Definition::new("pages", "tl_page")
                .with_mode(Mode::Hierarchical)
                .with_root_condition(RootCondition::by_field("tl_page", "pid", 0))
                .with_condition(ParentChildCondition::by_field("tl_page", "id", "tl_page", "pid"))
                .with_condition(ParentChildCondition::by_field("tl_page", "id", "tl_article", "pid"))
                .with_condition(ParentChildCondition::by_field(
                    "tl_article",
                    "id",
                    "tl_content",
                    "pid",
                ))
                .with_manual_sorting("sorting"),
        )
    }

    fn page(pid: i64, sorting: i64) -> Record {
        Record::new("tl_page").with("pid", pid).with("sorting", sorting)
    }

    /// 1 root, 2 root; 3, 4 under 1; 5 under 3. Articles 1, 2 under 3; content under article 1.
    fn collector() -> ModelCollector {
        let pages = MemoryStore::with_records(
            "tl_page",
            vec![page(0, 128), page(0, 256), page(1, 128), page(1, 256), page(3, 128)],
        )
        .unwrap();
        let articles = MemoryStore::with_records(
            "tl_article",
            vec![
                Record::new("tl_article").with("pid", 3),
                Record::new("tl_article").with("pid", 3),
            ],
        )
        .unwrap();
        let content = MemoryStore::with_records(
            "tl_content",
            vec![Record::new("tl_content").with("pid", 1)],
        )
        .unwrap();

        let stores = DataStores::new()
            .with(Arc::new(pages))
            .with(Arc::new(articles))
            .with(Arc::new(content));
        ModelCollector::new(page_tree(), stores)
    }

    fn load(collector: &ModelCollector, id: i64) -> Record {
        collector
            .get_record(&RecordId::new("tl_page", id))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_get_record() {
        let collector = collector();
        assert!(collector.get_record(&RecordId::new("tl_page", 1)).unwrap().is_some());
        assert!(collector.get_record(&RecordId::new("tl_page", 99)).unwrap().is_none());
        assert!(collector.get_record_serialized("tl_page::2").unwrap().is_some());
        assert!(matches!(
            collector.get_record_serialized("tl_page:2"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            collector.get_record(&RecordId::new("tl_news", 1)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_root_has_no_parent() {
        let collector = collector();
        assert!(collector.search_parent_of(&load(&collector, 1)).unwrap().is_none());
    }

    #[test]
    fn test_search_parent_by_inverse_filter() {
        let collector = collector();
        let parent = collector.search_parent_of(&load(&collector, 5)).unwrap().unwrap();
        assert_eq!(parent.id(), Some(&Ident::Int(3)));
    }

    #[test]
    fn test_search_parent_by_walk() {
        let collector = collector();
        let roots = collector
            .root_store()
            .unwrap()
            .fetch_all(&collector.root_query().unwrap())
            .unwrap();
        let parent = collector
            .search_parent_of_in(&load(&collector, 5), roots)
            .unwrap()
            .unwrap();
        assert_eq!(parent.id(), Some(&Ident::Int(3)));
    }

    #[test]
    fn test_search_parent_guards_type() {
        let collector = collector();
        let article = Record::new("tl_article").with_id(1).with("pid", 3);
        assert!(matches!(
            collector.search_parent_of(&article),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_collect_siblings() {
        let collector = collector();
        let siblings = collector
            .collect_siblings_of(&load(&collector, 4), Some("sorting"), None)
            .unwrap();
        let ids: Vec<_> = siblings.iter().filter_map(Record::id).cloned().collect();
        assert_eq!(ids, vec![Ident::Int(3), Ident::Int(4)]);

        let roots = collector
            .collect_siblings_of(&load(&collector, 2), Some("sorting"), None)
            .unwrap();
        assert_eq!(roots.len(), 2);

        let explicit = collector
            .collect_siblings_of(&load(&collector, 1), Some("sorting"), Some(&RecordId::new("tl_page", 3)))
            .unwrap();
        assert_eq!(explicit.len(), 1);
        assert_eq!(explicit[0].id(), Some(&Ident::Int(5)));
    }

    #[test]
    fn test_collect_siblings_through_panel() {
        use crate::panel::PanelSettings;
        use dcgen_proto::Pagination;

        let collector = collector();
        let panel = PanelSettings::new("tl_page")
            .with_filter(FilterExpr::gt("sorting", 200))
            .with_sorting(vec![OrderSpec::desc("sorting")])
            .with_pagination(Pagination::limit(1));

        let children = collector
            .collect_siblings_in(&load(&collector, 3), Some("sorting"), None, Some(&panel))
            .unwrap();
        let ids: Vec<_> = children.iter().filter_map(Record::id).cloned().collect();
        assert_eq!(ids, vec![Ident::Int(4)]);

        // Pagination never truncates the top level.
        let panel = PanelSettings::new("tl_page").with_pagination(Pagination::limit(1));
        let roots = collector
            .collect_siblings_in(&load(&collector, 2), Some("sorting"), None, Some(&panel))
            .unwrap();
        let ids: Vec<_> = roots.iter().filter_map(Record::id).cloned().collect();
        assert_eq!(ids, vec![Ident::Int(1), Ident::Int(2)]);

        let other = PanelSettings::new("tl_article").with_filter(FilterExpr::eq("pid", 99));
        let untouched = collector
            .collect_siblings_in(&load(&collector, 4), Some("sorting"), None, Some(&other))
            .unwrap();
        assert_eq!(untouched.len(), 2);
    }

    #[test]
    fn test_collect_siblings_with_grouping() {
        let definition = Definition::new("news", "tl_news")
            .with_manual_sorting("sorting")
            .with_sorting(vec![OrderSpec::asc("category"), OrderSpec::asc("sorting")]);
        let store = MemoryStore::with_records(
            "tl_news",
            vec![
                Record::new("tl_news").with("category", "a").with("sorting", 128),
                Record::new("tl_news").with("category", "b").with("sorting", 128),
                Record::new("tl_news").with("category", "a").with("sorting", 256),
            ],
        )
        .unwrap();
        let collector = ModelCollector::new(Arc::new(definition), DataStores::new().with(Arc::new(store)));

        let record = Record::new("tl_news").with("category", "a");
        let siblings = collector.collect_siblings_of(&record, Some("sorting"), None).unwrap();
        let ids: Vec<_> = siblings.iter().filter_map(Record::id).cloned().collect();
        assert_eq!(ids, vec![Ident::Int(1), Ident::Int(3)]);

        let all = collector.collect_siblings_of(&record, Some("category"), None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_collect_children() {
        let collector = collector();
        let root = load(&collector, 1);

        let direct = collector.collect_children_of(&root, None, false).unwrap();
        assert_eq!(direct, vec![RecordId::new("tl_page", 3), RecordId::new("tl_page", 4)]);

        let all = collector.collect_children_of(&root, None, true).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.contains(&RecordId::new("tl_page", 5)));

        let content = collector
            .collect_children_of(&load(&collector, 3), Some("tl_content"), false)
            .unwrap();
        assert_eq!(content, vec![RecordId::new("tl_content", 1)]);

        let none = collector
            .collect_children_of(&load(&collector, 4), Some("tl_content"), false)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_flat_mode_has_no_parents() {
        let definition = Definition::new("news", "tl_news");
        let store = MemoryStore::new("tl_news");
        let collector = ModelCollector::new(Arc::new(definition), DataStores::new().with(Arc::new(store)));
        assert!(matches!(
            collector.search_parent_of(&Record::new("tl_news")),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parented_parent_lookup() {
        let definition = Definition::new("articles", "tl_article")
            .with_mode(Mode::Parented)
            .with_parent_type("tl_page")
            .with_condition(ParentChildCondition::by_field("tl_page", "id", "tl_article", "pid"));
        let pages = MemoryStore::with_records("tl_page", vec![Record::new("tl_page"), Record::new("tl_page")]).unwrap();
        let articles = MemoryStore::new("tl_article");
        let collector = ModelCollector::new(
            Arc::new(definition),
            DataStores::new().with(Arc::new(pages)).with(Arc::new(articles)),
        );

        let article = Record::new("tl_article").with("pid", 2);
        let parent = collector.search_parent_of(&article).unwrap().unwrap();
        assert_eq!(parent.record_id(), Some(RecordId::new("tl_page", 2)));
    }
}
