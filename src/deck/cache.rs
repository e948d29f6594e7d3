//! Per-slide expansion cache

use std::collections::HashMap;
use std::sync::Arc;

use super::slide::{Annotation, Deck, SlideNumber, SlideRecord};

/// Partial update for the mutable fields of a [`SlideRecord`].
///
/// `None` leaves the field untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldUpdate {
    pub expanded_content: Option<String>,
    pub annotations: Option<Vec<Annotation>>,
}

impl FieldUpdate {
    /// Complete expansion together with its derived annotations
    #[must_use]
    pub fn expansion(content: String, annotations: Vec<Annotation>) -> Self {
        Self {
            expanded_content: Some(content),
            annotations: Some(annotations),
        }
    }

    #[must_use]
    pub fn annotations(annotations: Vec<Annotation>) -> Self {
        Self {
            expanded_content: None,
            annotations: Some(annotations),
        }
    }
}

/// Session-lifetime table of slide records keyed by slide number.
///
/// Records are shared behind `Arc` and replaced wholesale on update, so an
/// untouched entry keeps its identity across updates. No eviction.
#[derive(Clone, Debug, Default)]
pub struct SlideCache {
    records: Vec<Arc<SlideRecord>>,
    index: HashMap<SlideNumber, usize>,
}

impl SlideCache {
    #[must_use]
    pub fn new(deck: Deck) -> Self {
        let records: Vec<_> = deck
            .into_slides()
            .into_iter()
            .map(|slide| Arc::new(SlideRecord::new(slide)))
            .collect();
        let index = records
            .iter()
            .enumerate()
            .map(|(i, record)| (record.number(), i))
            .collect();
        Self { records, index }
    }

    #[must_use]
    pub fn get(&self, number: SlideNumber) -> Option<&Arc<SlideRecord>> {
        self.index.get(&number).map(|&i| &self.records[i])
    }

    /// Record at a navigation index (0-based position in the deck)
    #[must_use]
    pub fn get_at(&self, index: usize) -> Option<&Arc<SlideRecord>> {
        self.records.get(index)
    }

    #[must_use]
    pub fn index_of(&self, number: SlideNumber) -> Option<usize> {
        self.index.get(&number).copied()
    }

    #[must_use]
    pub fn is_expanded(&self, number: SlideNumber) -> bool {
        self.get(number).is_some_and(|r| r.is_expanded())
    }

    #[must_use]
    pub fn records(&self) -> &[Arc<SlideRecord>] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Merge `update` into the record for `number`.
    ///
    /// Only the matching entry is replaced; every other entry stays the same
    /// `Arc`. Returns `false` when the slide is unknown or the update is empty.
    pub fn update_fields(&mut self, number: SlideNumber, update: FieldUpdate) -> bool {
        let Some(&i) = self.index.get(&number) else {
            return false;
        };
        if update.expanded_content.is_none() && update.annotations.is_none() {
            return false;
        }

        let mut record = SlideRecord::clone(&self.records[i]);
        if let Some(content) = update.expanded_content {
            record.expanded_content = Some(content);
        }
        if let Some(annotations) = update.annotations {
            record.annotations = Some(annotations);
        }
        self.records[i] = Arc::new(record);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::{Slide, derive_annotations};

    fn cache_of(n: u32) -> SlideCache {
        let slides = (1..=n).map(|i| Slide::new(i, format!("slide {i}"))).collect();
        SlideCache::new(Deck::new(slides).unwrap())
    }

    #[test]
    fn lookup_by_number_and_index() {
        let cache = cache_of(3);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.index_of(2), Some(1));
        assert_eq!(cache.get_at(2).map(|r| r.number()), Some(3));
        assert!(cache.get(4).is_none());
        assert!(!cache.is_expanded(1));
    }

    #[test]
    fn update_replaces_only_the_matching_entry() {
        let mut cache = cache_of(3);
        let before: Vec<_> = cache.records().to_vec();

        assert!(cache.update_fields(2, FieldUpdate::expansion("body".into(), vec![])));

        assert!(Arc::ptr_eq(&before[0], &cache.records()[0]));
        assert!(!Arc::ptr_eq(&before[1], &cache.records()[1]));
        assert!(Arc::ptr_eq(&before[2], &cache.records()[2]));
        assert_eq!(cache.get(2).unwrap().expanded_content.as_deref(), Some("body"));
        assert!(Arc::ptr_eq(&before[1].slide, &cache.records()[1].slide));
    }

    #[test]
    fn partial_update_keeps_other_field() {
        let mut cache = cache_of(1);
        cache.update_fields(1, FieldUpdate::expansion("body".into(), vec![]));

        let annotations = derive_annotations(&[]);
        cache.update_fields(1, FieldUpdate::annotations(annotations));

        let record = cache.get(1).unwrap();
        assert_eq!(record.expanded_content.as_deref(), Some("body"));
        assert_eq!(record.annotations.as_deref(), Some(&[][..]));
    }

    #[test]
    fn unknown_slide_and_empty_update_are_ignored() {
        let mut cache = cache_of(1);
        let before = cache.records()[0].clone();

        assert!(!cache.update_fields(9, FieldUpdate::expansion("x".into(), vec![])));
        assert!(!cache.update_fields(1, FieldUpdate::default()));
        assert!(Arc::ptr_eq(&before, &cache.records()[0]));
    }
}
