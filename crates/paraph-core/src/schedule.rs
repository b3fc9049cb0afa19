//! Deferred document-coordinate recalculation.
//!
//! Recomputation is decoupled from the interactive frame rate: commits
//! and geometry changes enqueue single-shot tasks which the embedding
//! shell drains once per render frame. Re-scheduling a placement cancels
//! its stale task; a placement whose page geometry is not available yet
//! is retried a bounded number of times and then dropped with a warning.
//! Nothing on this path ever surfaces an error to the interaction code.

use crate::element::ElementId;
use crate::geometry::{self, PageGeometry, ViewContext};
use crate::store::ElementStore;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, HashSet};

/// How many frames a task waits for page geometry before giving up.
pub const MAX_RECALC_RETRIES: u32 = 5;

#[derive(Debug, Clone)]
struct PendingRecalc {
    generation: u64,
    retries: u32,
}

/// Queue of pending coordinate recalculations.
#[derive(Debug, Clone, Default)]
pub struct RecalcScheduler {
    /// One single-shot task per element instance.
    pending: HashMap<(ElementId, u32), PendingRecalc>,
    /// Elements whose recalculation is fully suppressed because an
    /// interaction session targets them.
    suppressed: HashSet<ElementId>,
    generation: u64,
}

impl RecalcScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule recalculation for one element instance. Scheduling again
    /// before the task fires cancels the stale one and resets its retry
    /// budget.
    pub fn schedule(&mut self, id: ElementId, page: u32) {
        self.generation += 1;
        self.pending.insert(
            (id, page),
            PendingRecalc {
                generation: self.generation,
                retries: 0,
            },
        );
    }

    /// Suppress recalculation for an element while a session targets it.
    pub fn suppress(&mut self, id: ElementId) {
        self.suppressed.insert(id);
    }

    /// Lift suppression after the session ends.
    pub fn release(&mut self, id: ElementId) {
        self.suppressed.remove(&id);
    }

    /// Whether recalculation for an element is currently suppressed.
    pub fn is_suppressed(&self, id: ElementId) -> bool {
        self.suppressed.contains(&id)
    }

    /// Drop every pending task for an element (it was deleted).
    pub fn cancel(&mut self, id: ElementId) {
        self.pending.retain(|(task_id, _), _| *task_id != id);
        self.suppressed.remove(&id);
    }

    /// Whether a task is queued for the given instance.
    pub fn is_pending(&self, id: ElementId, page: u32) -> bool {
        self.pending.contains_key(&(id, page))
    }

    /// Whether anything is queued.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Generation of a queued task, for staleness checks in tests.
    pub fn generation_of(&self, id: ElementId, page: u32) -> Option<u64> {
        self.pending.get(&(id, page)).map(|t| t.generation)
    }

    /// Frame callback: recompute document coordinates for every due task.
    ///
    /// Suppressed tasks stay queued untouched. Tasks whose element or
    /// placement vanished are dropped silently; tasks whose page has no
    /// geometry yet are retried up to [`MAX_RECALC_RETRIES`] frames and
    /// then dropped with a warning. Returns the number of placements
    /// recomputed.
    pub fn run_due(
        &mut self,
        store: &mut ElementStore,
        pages: &BTreeMap<u32, PageGeometry>,
        view: &ViewContext,
    ) -> usize {
        let due: Vec<(ElementId, u32)> = self
            .pending
            .keys()
            .filter(|(id, _)| !self.suppressed.contains(id))
            .copied()
            .collect();

        let mut recomputed = 0;
        for (id, page) in due {
            let Some(element) = store.get_mut_untracked(id) else {
                self.pending.remove(&(id, page));
                continue;
            };
            let Some(placement) = element.placements.on_page_mut(page) else {
                self.pending.remove(&(id, page));
                continue;
            };

            let Some(geometry) = pages.get(&page) else {
                if let Some(task) = self.pending.get_mut(&(id, page)) {
                    task.retries += 1;
                    if task.retries >= MAX_RECALC_RETRIES {
                        warn!(
                            "coordinates for element {id} on page {page} left unresolved: \
                             no geometry after {MAX_RECALC_RETRIES} attempts"
                        );
                        self.pending.remove(&(id, page));
                    }
                }
                continue;
            };

            match geometry::to_document_space(placement.position, placement.size, geometry, view)
            {
                Ok(coords) => {
                    placement.document_coords = Some(coords);
                    recomputed += 1;
                }
                Err(err) => {
                    // Degenerate geometry never throws into the
                    // interaction path; the coordinates stay unresolved.
                    warn!("recalculation for element {id} on page {page} failed: {err}");
                }
            }
            self.pending.remove(&(id, page));
        }
        debug!("recalculated {recomputed} placements, {} pending", self.pending.len());
        recomputed
    }
}
