//! Replication of shared elements across page subsets.
//!
//! A signature or stamp is one logical field for value and validation
//! purposes but is placed independently on each assigned page. Assignment
//! changes add or drop per-page instances; pages that stay assigned keep
//! their positions untouched.

use crate::element::{ElementId, ElementPatch, Placements};
use crate::error::{Error, Result};
use crate::store::ElementStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A page-assignment request: every known page, or an explicit set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Assign to every page the renderer has reported.
    All,
    /// Assign to exactly these pages.
    Pages(BTreeSet<u32>),
}

impl PageSelection {
    /// Resolve to a concrete page set. An empty resolution is rejected:
    /// the caller must always supply at least the active page.
    pub fn resolve(&self, known_pages: &BTreeSet<u32>) -> Result<BTreeSet<u32>> {
        let pages = match self {
            PageSelection::All => known_pages.clone(),
            PageSelection::Pages(pages) => pages.clone(),
        };
        if pages.is_empty() {
            return Err(Error::OrphanedReplicationAssignment);
        }
        Ok(pages)
    }
}

/// Pages added and removed by an assignment change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentDiff {
    pub added: BTreeSet<u32>,
    pub removed: BTreeSet<u32>,
}

/// Change which pages a replicable element is assigned to.
///
/// Newly assigned pages get an instance seeded from the element's
/// lowest-page placement (coordinates unresolved until recalculated);
/// unassigned pages drop theirs. Validation happens before any mutation.
pub fn set_page_assignment(
    store: &mut ElementStore,
    id: ElementId,
    selection: &PageSelection,
    known_pages: &BTreeSet<u32>,
) -> Result<AssignmentDiff> {
    let target = selection.resolve(known_pages)?;

    // Full validation against the read-only view first: a rejected call
    // must not count as a store mutation.
    let element = store.get(id).ok_or(Error::UnknownElement(id))?;
    if !element.kind.is_replicable()
        || !matches!(element.placements, Placements::Replicated { .. })
    {
        return Err(Error::NotReplicable(element.kind));
    }

    let element = store.get_mut(id).ok_or(Error::UnknownElement(id))?;
    let kind = element.kind;
    let Placements::Replicated { by_page } = &mut element.placements else {
        return Err(Error::NotReplicable(kind));
    };

    let current: BTreeSet<u32> = by_page.keys().copied().collect();
    let diff = AssignmentDiff {
        added: target.difference(&current).copied().collect(),
        removed: current.difference(&target).copied().collect(),
    };

    let seed = by_page
        .values()
        .next()
        .expect("replicated element has at least one placement")
        .clone();
    for &page in &diff.added {
        let mut placement = seed.clone();
        placement.document_coords = None;
        by_page.insert(page, placement);
    }
    for page in &diff.removed {
        by_page.remove(page);
    }

    Ok(diff)
}

/// Push a value/style/config change to every instance sharing the id,
/// explicitly excluding position and size.
pub fn propagate_non_positional_change(
    store: &mut ElementStore,
    id: ElementId,
    patch: &ElementPatch,
) -> Result<()> {
    if patch.is_positional() {
        return Err(Error::PositionalPropagation);
    }
    store.update_element(id, &patch.non_positional())
}
