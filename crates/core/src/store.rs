//! In-memory annotation collection
//!
//! Owns every committed [`Annotation`]. Insertion order is the Z-order used
//! for rendering and export: later records draw on top.

use std::collections::{HashMap, HashSet};

use crate::annotation::{Annotation, AnnotationId, DocPoint};
use crate::error::AnnotationError;

/// Collection of annotations for one open document
#[derive(Debug, Default)]
pub struct AnnotationStore {
    /// All annotations indexed by ID
    annotations: HashMap<AnnotationId, Annotation>,

    /// Document-wide insertion order
    order: Vec<AnnotationId>,

    /// Per-page insertion order
    by_page: HashMap<u32, Vec<AnnotationId>>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an annotation
    ///
    /// # Errors
    ///
    /// Rejects records that fail [`Annotation::validate`] and ids that are
    /// already present. The store is unchanged on error.
    pub fn add(&mut self, annotation: Annotation) -> Result<AnnotationId, AnnotationError> {
        annotation.validate()?;
        let id = annotation.id();
        if self.annotations.contains_key(&id) {
            return Err(AnnotationError::DuplicateId(id));
        }

        self.order.push(id);
        self.by_page.entry(annotation.page()).or_default().push(id);
        self.annotations.insert(id, annotation);
        Ok(id)
    }

    /// Remove an annotation by ID; unknown ids are a no-op
    pub fn remove_by_id(&mut self, id: AnnotationId) -> Option<Annotation> {
        let annotation = self.annotations.remove(&id)?;
        self.order.retain(|&aid| aid != id);
        if let Some(page_ids) = self.by_page.get_mut(&annotation.page()) {
            page_ids.retain(|&aid| aid != id);
            if page_ids.is_empty() {
                self.by_page.remove(&annotation.page());
            }
        }
        Some(annotation)
    }

    /// Remove every annotation on every page
    pub fn clear(&mut self) {
        self.annotations.clear();
        self.order.clear();
        self.by_page.clear();
    }

    /// Annotations on `page`, in insertion order
    pub fn by_page(&self, page: u32) -> Vec<&Annotation> {
        self.by_page
            .get(&page)
            .map(|ids| ids.iter().filter_map(|id| self.annotations.get(id)).collect())
            .unwrap_or_default()
    }

    /// All annotations, in insertion order
    pub fn all(&self) -> Vec<&Annotation> {
        self.order
            .iter()
            .filter_map(|id| self.annotations.get(id))
            .collect()
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.get(&id)
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Topmost annotation on `page` under a document-space point
    pub fn hit_test(&self, page: u32, point: &DocPoint, tolerance: f32) -> Option<&Annotation> {
        self.by_page
            .get(&page)?
            .iter()
            .rev()
            .filter_map(|id| self.annotations.get(id))
            .find(|a| a.hit_test(point, tolerance))
    }

    /// Replace the whole collection
    ///
    /// Every record is validated and checked for duplicate ids before
    /// anything is touched, so a failure leaves the current contents intact.
    pub fn replace_all(&mut self, annotations: Vec<Annotation>) -> Result<(), AnnotationError> {
        let mut seen = HashSet::with_capacity(annotations.len());
        for annotation in &annotations {
            annotation.validate()?;
            if !seen.insert(annotation.id()) {
                return Err(AnnotationError::DuplicateId(annotation.id()));
            }
        }

        self.clear();
        for annotation in annotations {
            let id = annotation.id();
            self.order.push(id);
            self.by_page.entry(annotation.page()).or_default().push(id);
            self.annotations.insert(id, annotation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationType, Color, DocRect};

    fn square(page: u32, x: f32) -> Annotation {
        Annotation::new(
            AnnotationType::Square,
            page,
            DocRect::from([x, 0.0, x + 10.0, 10.0]),
            Color::GREEN,
            "User",
        )
    }

    #[test]
    fn test_add_and_by_page_order() {
        let mut store = AnnotationStore::new();
        let a = store.add(square(0, 0.0)).unwrap();
        let b = store.add(square(1, 0.0)).unwrap();
        let c = store.add(square(0, 20.0)).unwrap();

        let page0: Vec<_> = store.by_page(0).iter().map(|a| a.id()).collect();
        assert_eq!(page0, vec![a, c]);
        assert_eq!(store.by_page(1)[0].id(), b);
        assert!(store.by_page(7).is_empty());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut store = AnnotationStore::new();
        let first = square(0, 0.0);
        let dup = square(0, 50.0).with_id(first.id());
        store.add(first.clone()).unwrap();

        assert_eq!(store.add(dup), Err(AnnotationError::DuplicateId(first.id())));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(first.id()), Some(&first));
    }

    #[test]
    fn test_invalid_record_rejected() {
        let mut store = AnnotationStore::new();
        let bad = Annotation::new(
            AnnotationType::FreeText,
            0,
            DocRect::from([0.0, 0.0, 1.0, 1.0]),
            Color::BLACK,
            "User",
        );
        assert!(store.add(bad).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_by_id() {
        let mut store = AnnotationStore::new();
        let a = store.add(square(0, 0.0)).unwrap();
        let b = store.add(square(0, 20.0)).unwrap();

        assert!(store.remove_by_id(a).is_some());
        assert!(store.remove_by_id(a).is_none());
        assert!(store.remove_by_id(uuid::Uuid::new_v4()).is_none());

        let ids: Vec<_> = store.all().iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec![b]);
    }

    #[test]
    fn test_clear() {
        let mut store = AnnotationStore::new();
        store.add(square(0, 0.0)).unwrap();
        store.add(square(3, 0.0)).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert!(store.by_page(0).is_empty());
        assert!(store.by_page(3).is_empty());
    }

    #[test]
    fn test_hit_test_returns_topmost() {
        let mut store = AnnotationStore::new();
        store.add(square(0, 0.0)).unwrap();
        let top = store.add(square(0, 5.0)).unwrap();

        let hit = store.hit_test(0, &DocPoint::new(7.0, 5.0), 0.0).unwrap();
        assert_eq!(hit.id(), top);
        assert!(store.hit_test(1, &DocPoint::new(7.0, 5.0), 0.0).is_none());
    }

    #[test]
    fn test_replace_all_is_atomic() {
        let mut store = AnnotationStore::new();
        let kept = store.add(square(0, 0.0)).unwrap();

        let one = square(0, 0.0);
        let twin = square(1, 0.0).with_id(one.id());
        assert!(store.replace_all(vec![one, twin]).is_err());
        assert_eq!(store.all()[0].id(), kept);

        store.replace_all(vec![square(2, 0.0)]).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(kept).is_none());
        assert_eq!(store.by_page(2).len(), 1);
    }
}
