//! Listing panels: filter, sort and pagination settings applied to the base
//! query of a listing before relationship filters are layered on top.

use dcgen_proto::{DataQuery, FilterExpr, OrderSpec, Pagination};

use crate::record::Record;

/// Prepares base queries for listings.
pub trait Panel {
    /// Adjust `query` for records of `record_type`. `parent` is the record
    /// whose children are listed, `None` for the top level.
    fn initialize(&self, record_type: &str, query: &mut DataQuery, parent: Option<&Record>);
}

/// Panel settings for one record type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelSettings {
    /// Record type the settings apply to.
    pub record_type: String,
    /// Search/filter expression.
    pub filter: Option<FilterExpr>,
    /// Sort order replacing the default one.
    pub sorting: Vec<OrderSpec>,
    /// Page of the top level.
    pub pagination: Option<Pagination>,
}

impl PanelSettings {
    /// Create empty settings for a record type.
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            ..Default::default()
        }
    }

    /// Set the filter.
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the sort order.
    pub fn with_sorting(mut self, sorting: Vec<OrderSpec>) -> Self {
        self.sorting = sorting;
        self
    }

    /// Set the top-level page.
    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

impl Panel for PanelSettings {
    fn initialize(&self, record_type: &str, query: &mut DataQuery, parent: Option<&Record>) {
        if record_type != self.record_type {
            return;
        }
        if let Some(filter) = &self.filter {
            query.add_filter(filter.clone());
        }
        if !self.sorting.is_empty() {
            query.set_sorting(self.sorting.clone());
        }
        // Only the top level is paginated; children are always listed in full.
        if let (Some(pagination), None) = (self.pagination, parent) {
            query.set_pagination(pagination);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_applies_to_own_type() {
        let panel = PanelSettings::new("tl_page")
            .with_filter(FilterExpr::eq("published", true))
            .with_pagination(Pagination::limit(20));

        let mut query = DataQuery::new();
        panel.initialize("tl_page", &mut query, None);
        assert_eq!(query.filter, Some(FilterExpr::eq("published", true)));
        assert_eq!(query.pagination, Some(Pagination::limit(20)));

        let mut other = DataQuery::new();
        panel.initialize("tl_article", &mut other, None);
        assert_eq!(other, DataQuery::new());
    }

    #[test]
    fn test_children_are_not_paginated() {
        let panel = PanelSettings::new("tl_page").with_pagination(Pagination::limit(20));
        let parent = Record::new("tl_page").with_id(1);

        let mut query = DataQuery::new();
        panel.initialize("tl_page", &mut query, Some(&parent));
        assert_eq!(query.pagination, None);
    }
}
