//! Gap-based ordering of sibling records.
//!
//! Sorting values are integers spaced [`SORTING_STEP`] apart. Inserting a
//! batch between two siblings uses the gap between them when it is wide
//! enough; otherwise the batch is spread out with a larger step and every
//! following sibling is renumbered.

use std::collections::HashSet;

use dcgen_proto::Ident;
use tracing::{debug, warn};

use crate::definition::Definition;
use crate::error::Error;
use crate::record::Record;

/// Default distance between neighbouring sorting values.
pub const SORTING_STEP: i64 = 128;

/// Smallest per-record step accepted inside an existing gap.
pub const MIN_STEP: i64 = 2;

/// Where a batch is placed among its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// After the last sibling (no previous record supplied).
    Append,
    /// Before the first sibling.
    Start,
    /// Directly after the sibling with this identifier.
    After(Ident),
}

/// Records whose sorting value changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortOutcome {
    /// The placed batch, in input order.
    pub batch: Vec<Record>,
    /// Siblings renumbered to make room, in sibling order.
    pub shifted: Vec<Record>,
}

impl SortOutcome {
    /// Whether following siblings had to be renumbered.
    pub fn rebalanced(&self) -> bool {
        !self.shifted.is_empty()
    }

    /// Every affected record: batch first, then shifted siblings.
    pub fn into_affected(self) -> Vec<Record> {
        let mut affected = self.batch;
        affected.extend(self.shifted);
        affected
    }
}

/// Computes sorting values for batches inserted into sibling sets.
///
/// Pure: nothing is fetched or persisted here.
#[derive(Debug, Clone, Default)]
pub struct SortingManager {
    property: Option<String>,
}

impl SortingManager {
    /// Create a manager writing `property`.
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
        }
    }

    /// Create a manager for the manual sorting property of a definition.
    pub fn for_definition(definition: &Definition) -> Self {
        Self {
            property: definition.manual_sorting.clone(),
        }
    }

    /// Sorting property, if any.
    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    /// Write new sorting values onto `batch` placed among `siblings`.
    ///
    /// Siblings that are members of the batch are skipped. The relative order
    /// of the batch is kept. Fails with a configuration error when no
    /// sorting property is set and the batch is not empty.
    pub fn place(
        &self,
        mut batch: Vec<Record>,
        siblings: Vec<Record>,
        placement: &Placement,
    ) -> Result<SortOutcome, Error> {
        if batch.is_empty() {
            return Ok(SortOutcome::default());
        }

        let property = self.property.as_deref().ok_or_else(|| {
            Error::Configuration(format!(
                "no sorting property to place {} '{}' record(s)",
                batch.len(),
                batch[0].record_type()
            ))
        })?;

        let in_batch: HashSet<&Ident> = batch.iter().filter_map(Record::id).collect();
        let mut others: Vec<Record> = siblings
            .into_iter()
            .filter(|s| s.id().map_or(true, |id| !in_batch.contains(id)))
            .collect();
        others.sort_by_key(|s| s.sorting_value(property));

        // Index of the anchor in `others`; `None` places in front of everything.
        let anchor_index = match placement {
            Placement::Start => None,
            Placement::Append => others.len().checked_sub(1),
            Placement::After(anchor) => {
                match others.iter().position(|s| s.id() == Some(anchor)) {
                    Some(index) => Some(index),
                    None => {
                        warn!(
                            anchor = %anchor,
                            "anchor not found among siblings, appending instead"
                        );
                        others.len().checked_sub(1)
                    }
                }
            }
        };

        let anchor_value = anchor_index.map_or(0, |i| others[i].sorting_value(property));
        let marker_index = anchor_index.map_or(0, |i| i + 1);
        let n = batch.len() as i64;

        let marker_value = others.get(marker_index).map(|m| m.sorting_value(property));
        let step = match marker_value {
            None => {
                for (i, record) in batch.iter_mut().enumerate() {
                    record.set(property, anchor_value + SORTING_STEP * (i as i64 + 1));
                }
                return Ok(SortOutcome {
                    batch,
                    shifted: Vec::new(),
                });
            }
            Some(marker) => (marker - anchor_value) / n,
        };

        if (MIN_STEP..=SORTING_STEP).contains(&step) {
            for (i, record) in batch.iter_mut().enumerate() {
                record.set(property, anchor_value + step / 2 + step * i as i64);
            }
            return Ok(SortOutcome {
                batch,
                shifted: Vec::new(),
            });
        }

        let step = (n + SORTING_STEP - 1) / SORTING_STEP * SORTING_STEP;
        debug!(
            property,
            anchor = anchor_value,
            step,
            count = others.len() - marker_index,
            "gap exhausted, renumbering following siblings"
        );

        let mut current = anchor_value;
        for record in batch.iter_mut() {
            current += step;
            record.set(property, current);
        }

        let shifted = others
            .into_iter()
            .skip(marker_index)
            .map(|mut sibling| {
                current += step;
                sibling.set(property, current);
                sibling
            })
            .collect();

        Ok(SortOutcome { batch, shifted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn siblings(values: &[i64]) -> Vec<Record> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Record::new("t").with_id(i as i64 + 1).with("sorting", *v))
            .collect()
    }

    fn new_records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new("t").with("label", format!("new{}", i)))
            .collect()
    }

    fn values(records: &[Record]) -> Vec<i64> {
        records.iter().map(|r| r.sorting_value("sorting")).collect()
    }

    /// Merge the outcome back into the sibling set and read it in order.
    fn merged(original: Vec<Record>, outcome: &SortOutcome) -> Vec<Record> {
        let mut all: Vec<Record> = original
            .into_iter()
            .filter(|r| {
                !outcome
                    .shifted
                    .iter()
                    .chain(outcome.batch.iter())
                    .any(|s| s.id().is_some() && s.id() == r.id())
            })
            .collect();
        all.extend(outcome.batch.iter().cloned());
        all.extend(outcome.shifted.iter().cloned());
        all.sort_by_key(|r| r.sorting_value("sorting"));
        all
    }

    #[test]
    fn test_insert_into_wide_gap() {
        let manager = SortingManager::new("sorting");
        let outcome = manager
            .place(new_records(1), siblings(&[10, 20, 30]), &Placement::After(Ident::Int(2)))
            .unwrap();

        assert_eq!(values(&outcome.batch), vec![25]);
        assert!(!outcome.rebalanced());
        assert_eq!(
            values(&merged(siblings(&[10, 20, 30]), &outcome)),
            vec![10, 20, 25, 30]
        );
    }

    #[test]
    fn test_narrow_gap_rebalances() {
        let manager = SortingManager::new("sorting");
        let outcome = manager
            .place(new_records(3), siblings(&[10, 11]), &Placement::After(Ident::Int(1)))
            .unwrap();

        assert_eq!(values(&outcome.batch), vec![138, 266, 394]);
        assert_eq!(values(&outcome.shifted), vec![522]);
        assert_eq!(outcome.shifted[0].id(), Some(&Ident::Int(2)));
        assert_eq!(
            values(&merged(siblings(&[10, 11]), &outcome)),
            vec![10, 138, 266, 394, 522]
        );
    }

    #[test]
    fn test_front_of_empty_set() {
        let manager = SortingManager::new("sorting");
        let outcome = manager.place(new_records(2), Vec::new(), &Placement::Start).unwrap();
        assert_eq!(values(&outcome.batch), vec![128, 256]);
    }

    #[test]
    fn test_front_of_existing_set() {
        let manager = SortingManager::new("sorting");
        let outcome = manager
            .place(new_records(1), siblings(&[128, 256]), &Placement::Start)
            .unwrap();
        assert_eq!(values(&outcome.batch), vec![64]);
        assert!(!outcome.rebalanced());
    }

    #[test]
    fn test_append() {
        let manager = SortingManager::new("sorting");
        let outcome = manager
            .place(new_records(2), siblings(&[128, 256]), &Placement::Append)
            .unwrap();
        assert_eq!(values(&outcome.batch), vec![384, 512]);
    }

    #[test]
    fn test_large_batch_uses_wider_step() {
        let manager = SortingManager::new("sorting");
        let outcome = manager
            .place(new_records(200), siblings(&[0, 1]), &Placement::After(Ident::Int(1)))
            .unwrap();
        assert_eq!(outcome.batch[0].sorting_value("sorting"), 256);
        assert_eq!(outcome.shifted[0].sorting_value("sorting"), 256 * 201);
    }

    #[test]
    fn test_batch_members_are_skipped() {
        // Moving record 1 after record 3 within [1:128, 2:256, 3:384].
        let manager = SortingManager::new("sorting");
        let moving = vec![Record::new("t").with_id(1).with("sorting", 128)];
        let outcome = manager
            .place(moving, siblings(&[128, 256, 384]), &Placement::After(Ident::Int(3)))
            .unwrap();
        assert_eq!(values(&outcome.batch), vec![512]);
        assert!(!outcome.rebalanced());
    }

    #[test]
    fn test_unknown_anchor_appends() {
        let manager = SortingManager::new("sorting");
        let outcome = manager
            .place(new_records(1), siblings(&[128]), &Placement::After(Ident::Int(99)))
            .unwrap();
        assert_eq!(values(&outcome.batch), vec![256]);
    }

    #[test]
    fn test_missing_property() {
        let manager = SortingManager::default();
        assert!(matches!(
            manager.place(new_records(1), Vec::new(), &Placement::Start),
            Err(Error::Configuration(_))
        ));
        assert!(manager.place(Vec::new(), Vec::new(), &Placement::Start).unwrap().batch.is_empty());
    }

    #[test]
    fn test_order_invariants_over_many_layouts() {
        let layouts: Vec<Vec<i64>> = vec![
            vec![10, 11],
            vec![10, 20, 30],
            vec![1, 2, 3, 4, 5],
            vec![0, 128, 129, 130, 1000],
            vec![5, 5, 5],
            vec![128, 256, 384, 512],
        ];

        let manager = SortingManager::new("sorting");
        for layout in layouts {
            for anchor in 0..layout.len() {
                for n in [1usize, 2, 3, 7, 130] {
                    let original = siblings(&layout);
                    let anchor_id = original[anchor].id().cloned().unwrap();
                    let outcome = manager
                        .place(new_records(n), original.clone(), &Placement::After(anchor_id.clone()))
                        .unwrap();

                    // Batch order is preserved.
                    let batch_values = values(&outcome.batch);
                    assert!(batch_values.windows(2).all(|w| w[0] < w[1]), "{:?}", layout);

                    let all = merged(original.clone(), &outcome);
                    let labels: Vec<String> = all
                        .iter()
                        .map(|r| match r.id() {
                            Some(id) => id.to_string(),
                            None => r.value("label").to_string(),
                        })
                        .collect();

                    // Batch lands directly after the anchor.
                    let at = labels
                        .iter()
                        .position(|l| *l == anchor_id.to_string())
                        .unwrap();
                    let expected: Vec<String> = (0..n).map(|i| format!("new{}", i)).collect();
                    assert_eq!(&labels[at + 1..at + 1 + n], expected.as_slice(), "{:?}", layout);

                    // Siblings after the anchor all sort above the batch.
                    let last_batch = *batch_values.last().unwrap();
                    for sibling in &all[at + 1 + n..] {
                        assert!(sibling.sorting_value("sorting") > last_batch, "{:?}", layout);
                    }

                    // Values from the anchor onward are strictly increasing.
                    let tail = values(&all[at..]);
                    assert!(tail.windows(2).all(|w| w[0] < w[1]), "{:?} {:?}", layout, tail);
                }
            }
        }
    }
}
