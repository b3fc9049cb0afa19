//! Authoritative per-page element store.
//!
//! Single logical writer: all mutations go through `&mut self` methods on
//! the interaction thread and are synchronous, last-write-wins. Read-only
//! observers borrow `&self`.

use crate::element::{ElementId, ElementPatch, OwnerIndex, PlacedElement};
use crate::error::{Error, Result};
use kurbo::Point;
use std::collections::HashMap;

/// Authoritative store of all placed elements.
#[derive(Debug, Clone, Default)]
pub struct ElementStore {
    /// All elements, keyed by id.
    elements: HashMap<ElementId, PlacedElement>,
    /// Insertion order, used as the stable listing/hit-test order.
    order: Vec<ElementId>,
    /// Bumped once per mutating call. Observable check for the
    /// interactive-latency contract: no store mutation may occur for a
    /// session target between pointer-down and commit.
    mutations: u64,
}

impl ElementStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch of elements atomically.
    ///
    /// Rejects the whole batch if any id already exists (or repeats
    /// within the batch); no partial insertion is observable.
    pub fn add_elements(&mut self, elements: Vec<PlacedElement>) -> Result<()> {
        for (i, element) in elements.iter().enumerate() {
            let dup_in_batch = elements[..i].iter().any(|e| e.id == element.id);
            if dup_in_batch || self.elements.contains_key(&element.id) {
                return Err(Error::DuplicateElement(element.id));
            }
        }
        for element in elements {
            self.order.push(element.id);
            self.elements.insert(element.id, element);
        }
        self.mutations += 1;
        Ok(())
    }

    /// Apply a partial update to an element.
    ///
    /// Positional fields target one placement: replicated elements need
    /// `patch.page`; single-page elements may omit it. A position or
    /// size change invalidates that placement's document coordinates.
    pub fn update_element(&mut self, id: ElementId, patch: &ElementPatch) -> Result<()> {
        let element = self
            .elements
            .get_mut(&id)
            .ok_or(Error::UnknownElement(id))?;

        if patch.is_positional() {
            let page = match patch.page {
                Some(page) => page,
                None => match element.placements.pages().as_slice() {
                    [only] => *only,
                    pages => {
                        return Err(Error::PlacementMissing {
                            id,
                            page: pages.first().copied().unwrap_or(0),
                        });
                    }
                },
            };
            let placement = element
                .placements
                .on_page_mut(page)
                .ok_or(Error::PlacementMissing { id, page })?;
            if let Some(position) = patch.position {
                placement.position = position;
            }
            if let Some(size) = patch.size {
                placement.size = size;
            }
            placement.document_coords = None;
        }

        if let Some(value) = &patch.value {
            element.value = value.clone();
        }
        if let Some(style) = &patch.style {
            element.style = style.clone();
        }
        if let Some(config) = &patch.config {
            element.config = config.clone();
        }
        if let Some(index) = patch.option_index {
            element.option_index = Some(index);
        }

        self.mutations += 1;
        Ok(())
    }

    /// Remove an element.
    pub fn remove_element(&mut self, id: ElementId) -> Result<PlacedElement> {
        let element = self.elements.remove(&id).ok_or(Error::UnknownElement(id))?;
        self.order.retain(|&other| other != id);
        self.mutations += 1;
        Ok(element)
    }

    /// Remove a batch of elements atomically (grouped delete).
    ///
    /// All ids are verified before anything is removed, so a
    /// half-deleted group is never observable.
    pub fn remove_elements(&mut self, ids: &[ElementId]) -> Result<Vec<PlacedElement>> {
        for &id in ids {
            if !self.elements.contains_key(&id) {
                return Err(Error::UnknownElement(id));
            }
        }
        let mut removed = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(element) = self.elements.remove(&id) {
                removed.push(element);
            }
        }
        self.order.retain(|id| !ids.contains(id));
        self.mutations += 1;
        Ok(removed)
    }

    /// Get an element by id.
    pub fn get(&self, id: ElementId) -> Option<&PlacedElement> {
        self.elements.get(&id)
    }

    /// Mutable access for sibling engine modules. Counts as a mutation.
    pub(crate) fn get_mut(&mut self, id: ElementId) -> Option<&mut PlacedElement> {
        self.mutations += 1;
        self.elements.get_mut(&id)
    }

    /// Mutable access that does not count as a store mutation. Reserved
    /// for derived-state refresh (document coordinate recalculation),
    /// which must not show up in the mutation count.
    pub(crate) fn get_mut_untracked(&mut self, id: ElementId) -> Option<&mut PlacedElement> {
        self.elements.get_mut(&id)
    }

    /// Whether an element exists.
    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    /// All elements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PlacedElement> {
        self.order.iter().filter_map(|id| self.elements.get(id))
    }

    /// Elements appearing on a page, in insertion order.
    pub fn elements_on_page(&self, page: u32) -> impl Iterator<Item = &PlacedElement> {
        self.iter().filter(move |e| e.is_on_page(page))
    }

    /// Elements on a page, optionally filtered by owner.
    pub fn list_elements(&self, page: u32, owner: Option<OwnerIndex>) -> Vec<&PlacedElement> {
        self.elements_on_page(page)
            .filter(|e| owner.is_none_or(|o| e.owner == o))
            .collect()
    }

    /// Find the frontmost element whose placement on `page` contains the
    /// given unscaled page-local point. Later insertions win, matching
    /// visual stacking.
    pub fn element_at(&self, page: u32, point: Point) -> Option<ElementId> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.elements.get(id))
            .find(|e| {
                e.placements
                    .on_page(page)
                    .is_some_and(|p| p.bounds().contains(point))
            })
            .map(|e| e.id)
    }

    /// Number of mutating calls so far.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
