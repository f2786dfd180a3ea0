//! Applying and testing declared relationships on single records.

use std::sync::Arc;

use tracing::debug;

use crate::definition::{Definition, Mode, ParentChildCondition};
use crate::error::Error;
use crate::record::Record;

/// Applies root and parent-child conditions of a [`Definition`] to records.
#[derive(Debug, Clone)]
pub struct RelationshipManager {
    definition: Arc<Definition>,
}

impl RelationshipManager {
    /// Create a manager for a definition.
    pub fn new(definition: Arc<Definition>) -> Self {
        Self { definition }
    }

    /// The underlying definition.
    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Whether `record` is a root of the hierarchy.
    ///
    /// Records of a type other than the root condition's are never roots.
    pub fn is_root(&self, record: &Record) -> Result<bool, Error> {
        match &self.definition.root_condition {
            Some(root) => Ok(root.matches(record)),
            None if self.definition.mode == Mode::Hierarchical => Err(self.missing_root()),
            None => Ok(false),
        }
    }

    /// Make `record` a root. No-op outside hierarchical mode.
    pub fn set_root(&self, record: &mut Record) -> Result<(), Error> {
        if self.definition.mode != Mode::Hierarchical {
            return Ok(());
        }

        let root = self
            .definition
            .root_condition
            .as_ref()
            .ok_or_else(|| self.missing_root())?;
        if record.record_type() != root.record_type {
            return Err(Error::InvalidArgument(format!(
                "'{}' records cannot be roots of '{}'",
                record.record_type(),
                self.definition.name
            )));
        }

        root.apply_to(record);
        Ok(())
    }

    /// Make every record a root. Records before a failing one stay modified.
    pub fn set_all_root(&self, records: &mut [Record]) -> Result<(), Error> {
        for record in records.iter_mut() {
            self.set_root(record)?;
        }
        Ok(())
    }

    /// Write the parent-identifying values of `parent` onto `child`.
    pub fn set_parent(&self, child: &mut Record, parent: &Record) -> Result<(), Error> {
        let condition = self.require_condition(parent.record_type(), child.record_type())?;
        debug!(
            child = child.record_type(),
            parent = ?parent.record_id(),
            "assigning parent"
        );
        condition.apply_to(parent, child);
        Ok(())
    }

    /// [`RelationshipManager::set_parent`] for every record.
    pub fn set_parent_for_all(&self, records: &mut [Record], parent: &Record) -> Result<(), Error> {
        for record in records.iter_mut() {
            self.set_parent(record, parent)?;
        }
        Ok(())
    }

    /// Copy the parent-identifying values `source` carries onto `target`,
    /// using the condition from `parent_type` to the target's type.
    pub fn set_same_parent(
        &self,
        target: &mut Record,
        source: &Record,
        parent_type: &str,
    ) -> Result<(), Error> {
        let condition = self.require_condition(parent_type, target.record_type())?;
        condition.copy_from(source, target);
        Ok(())
    }

    /// Whether `child` belongs to `parent` under a declared condition.
    pub fn is_child_of(&self, child: &Record, parent: &Record) -> bool {
        self.definition
            .condition(parent.record_type(), child.record_type())
            .map(|condition| condition.matches(parent, child))
            .unwrap_or(false)
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

    fn missing_root(&self) -> Error {
        Error::Configuration(format!(
            "hierarchical definition '{}' has no root condition",
            self.definition.name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ParentChildCondition, RootCondition};
    use dcgen_proto::Value;

    fn tree() -> Arc<Definition> {
        Arc::new(
            Definition::new("pages", "tl_page")
                .with_mode(Mode::Hierarchical)
                .with_root_condition(RootCondition::by_field("tl_page", "pid", 0))
                .with_condition(ParentChildCondition::by_field("tl_page", "id", "tl_page", "pid"))
                .with_condition(ParentChildCondition::by_field("tl_page", "id", "tl_article", "pid")),
        )
    }

    #[test]
    fn test_is_root() {
        let manager = RelationshipManager::new(tree());
        assert!(manager.is_root(&Record::new("tl_page").with("pid", 0)).unwrap());
        assert!(!manager.is_root(&Record::new("tl_page").with("pid", 3)).unwrap());
        assert!(!manager.is_root(&Record::new("tl_article").with("pid", 0)).unwrap());
    }

    #[test]
    fn test_is_root_without_condition() {
        let mut definition = (*tree()).clone();
        definition.root_condition = None;
        let manager = RelationshipManager::new(Arc::new(definition.clone()));
        assert!(matches!(
            manager.is_root(&Record::new("tl_page")),
            Err(Error::Configuration(_))
        ));

        definition.mode = Mode::Flat;
        let manager = RelationshipManager::new(Arc::new(definition));
        assert!(!manager.is_root(&Record::new("tl_page")).unwrap());
    }

    #[test]
    fn test_set_root_is_idempotent() {
        let manager = RelationshipManager::new(tree());
        let mut page = Record::new("tl_page").with("pid", 9);

        manager.set_root(&mut page).unwrap();
        let once = page.clone();
        manager.set_root(&mut page).unwrap();

        assert_eq!(page, once);
        assert!(manager.is_root(&page).unwrap());
    }

    #[test]
    fn test_set_root_outside_hierarchy_is_noop() {
        let definition = Definition::new("news", "tl_news");
        let manager = RelationshipManager::new(Arc::new(definition));
        let mut record = Record::new("tl_news").with("pid", 4);
        manager.set_root(&mut record).unwrap();
        assert_eq!(record.value("pid"), Value::Int(4));
    }

    #[test]
    fn test_set_parent() {
        let manager = RelationshipManager::new(tree());
        let parent = Record::new("tl_page").with_id(5);
        let mut children = vec![Record::new("tl_article"), Record::new("tl_page")];

        manager.set_parent_for_all(&mut children, &parent).unwrap();
        assert!(children.iter().all(|c| c.value("pid") == Value::Int(5)));
        assert!(children.iter().all(|c| manager.is_child_of(c, &parent)));
    }

    #[test]
    fn test_set_parent_missing_relationship() {
        let manager = RelationshipManager::new(tree());
        let parent = Record::new("tl_article").with_id(5);
        let mut child = Record::new("tl_page");

        match manager.set_parent(&mut child, &parent) {
            Err(Error::RelationshipMissing { parent, child }) => {
                assert_eq!(parent, "tl_article");
                assert_eq!(child, "tl_page");
            }
            other => panic!("expected missing relationship, got {:?}", other),
        }
    }

    #[test]
    fn test_set_same_parent() {
        let manager = RelationshipManager::new(tree());
        let sibling = Record::new("tl_article").with_id(2).with("pid", 7);
        let mut target = Record::new("tl_article");

        manager.set_same_parent(&mut target, &sibling, "tl_page").unwrap();
        assert_eq!(target.value("pid"), Value::Int(7));

        assert!(matches!(
            manager.set_same_parent(&mut target, &sibling, "tl_news"),
            Err(Error::RelationshipMissing { .. })
        ));
    }
}
