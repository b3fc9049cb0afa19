//! Engine facade over the store, groups, replication, sessions, and the
//! recalculation scheduler.
//!
//! This is the surface the three external collaborators talk to: the
//! renderer reports page geometry, the field-configuration layer creates
//! and edits elements, and the persistence layer reads serialization
//! records. All mutation happens here, on the interaction thread.

use crate::element::{
    ElementId, ElementPatch, FieldKind, GroupKey, OwnerIndex, PlacedElement, Placement,
    Placements,
};
use crate::error::{Error, Result};
use crate::geometry::{self, DocumentCoords, PageGeometry, ViewContext};
use crate::group::{self, ElementGroup};
use crate::replicate::{self, AssignmentDiff, PageSelection};
use crate::schedule::RecalcScheduler;
use crate::session::{Corner, InteractionSession, SessionState};
use crate::store::ElementStore;
use kurbo::{Point, Vec2};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Horizontal gap between date triplet members at creation.
const DATE_MEMBER_GAP: f64 = 8.0;
/// Vertical gap between an option set member and an appended option.
const OPTION_GAP: f64 = 8.0;
/// Cascade offset between per-participant copies created for "all owners".
const OWNER_CASCADE: Vec2 = Vec2::new(12.0, 12.0);

/// One serialization record per element instance.
///
/// Screen positions are never serialized; only document coordinates
/// cross this boundary, so a reload on a different viewport reprojects
/// through the inverse transform. A replicated element emits one record
/// per assigned page, each carrying the full assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementRecord {
    pub id: ElementId,
    pub kind: FieldKind,
    pub page_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_assignment: Option<Vec<u32>>,
    pub document_coords: DocumentCoords,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_key: Option<GroupKey>,
    pub owner: OwnerIndex,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_index: Option<u32>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub style: Value,
    #[serde(default)]
    pub config: Value,
}

/// The field placement engine.
#[derive(Debug, Clone)]
pub struct FieldEngine {
    store: ElementStore,
    scheduler: RecalcScheduler,
    session: Option<InteractionSession>,
    view: ViewContext,
    /// Geometry per rendered page, as reported by the renderer.
    pages: BTreeMap<u32, PageGeometry>,
    /// Number of workflow participants; "all owners" creation expands to
    /// one element per participant.
    participant_count: u32,
}

impl FieldEngine {
    /// Create an engine for a document with the given participant count.
    pub fn new(participant_count: u32) -> Self {
        Self {
            store: ElementStore::new(),
            scheduler: RecalcScheduler::new(),
            session: None,
            view: ViewContext::default(),
            pages: BTreeMap::new(),
            participant_count: participant_count.max(1),
        }
    }

    /// Read access to the element store for observers (side panels).
    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    /// Current view context.
    pub fn view(&self) -> &ViewContext {
        &self.view
    }

    /// Set the zoom level. Stored positions are unscaled and unaffected,
    /// but cached page geometry was measured at the old zoom and must not
    /// be combined with the new one: it is dropped, every document
    /// coordinate is invalidated, and recalculation waits for fresh
    /// geometry from [`FieldEngine::page_ready`] through the scheduler's
    /// bounded retry.
    pub fn set_zoom(&mut self, zoom: f64) {
        let previous = self.view.zoom;
        self.view.set_zoom(zoom);
        if self.view.zoom == previous {
            return;
        }
        self.pages.clear();
        let in_use: BTreeSet<u32> = self
            .store
            .iter()
            .flat_map(|e| e.placements.pages())
            .collect();
        for page in in_use {
            self.invalidate_page(page);
        }
    }

    // --- renderer side ---------------------------------------------------

    /// Accept new or updated geometry for a page.
    ///
    /// Cached document coordinates for that page are invalidated and
    /// recalculation is rescheduled. Stored screen positions are never
    /// touched; reprojection happens only through the transform.
    pub fn page_ready(&mut self, geometry: PageGeometry) {
        let page = geometry.page;
        self.pages.insert(page, geometry);
        self.invalidate_page(page);
    }

    /// Drop cached coordinates for every placement on a page and queue
    /// recalculation. Session targets are invalidated too: their queued
    /// task sits suppressed until the session releases it, so they catch
    /// up on the first frame after commit or cancel.
    fn invalidate_page(&mut self, page: u32) {
        let affected: Vec<ElementId> = self.store.elements_on_page(page).map(|e| e.id).collect();
        for id in affected {
            if let Some(placement) = self
                .store
                .get_mut_untracked(id)
                .and_then(|e| e.placements.on_page_mut(page))
            {
                placement.document_coords = None;
            }
            self.scheduler.schedule(id, page);
        }
    }

    /// Geometry for a page, if the renderer has reported it.
    pub fn page_geometry(&self, page: u32) -> Option<&PageGeometry> {
        self.pages.get(&page)
    }

    // --- configuration side ----------------------------------------------

    /// Elements on a page, optionally filtered by owner.
    pub fn list_elements(&self, page: u32, owner: Option<OwnerIndex>) -> Vec<&PlacedElement> {
        self.store.list_elements(page, owner)
    }

    /// Resolve a logical group.
    pub fn get_group(&self, key: GroupKey) -> Option<ElementGroup> {
        group::resolve_group(&self.store, key)
    }

    /// Resolve every group in the document.
    pub fn groups(&self) -> Vec<ElementGroup> {
        group::resolve_all(&self.store)
    }

    /// Place a new field at the given unscaled page-local position.
    ///
    /// Date kinds expand to a day/month/year triplet sharing one fresh
    /// group key. `OwnerIndex::All` expands to one copy per participant,
    /// cascaded so they do not stack exactly. Option kinds open a new
    /// option set at index 0. The whole expansion is inserted atomically;
    /// all created ids are returned.
    pub fn create_element(
        &mut self,
        kind: FieldKind,
        owner: OwnerIndex,
        page: u32,
        position: Point,
    ) -> Result<Vec<ElementId>> {
        let owners: Vec<OwnerIndex> = match owner {
            OwnerIndex::All => (0..self.participant_count).map(OwnerIndex::Actor).collect(),
            actor => vec![actor],
        };

        let mut created: Vec<PlacedElement> = Vec::new();
        for (i, owner) in owners.into_iter().enumerate() {
            let at = position + OWNER_CASCADE * i as f64;
            if kind.date_role().is_some() {
                created.extend(date_triplet(owner, page, at));
            } else if kind.is_option() {
                created.push(
                    PlacedElement::new(kind, owner, page, at)
                        .with_group_key(uuid::Uuid::new_v4())
                        .with_option_index(0),
                );
            } else {
                created.push(PlacedElement::new(kind, owner, page, at));
            }
        }

        let ids: Vec<ElementId> = created.iter().map(|e| e.id).collect();
        self.store.add_elements(created)?;
        for &id in &ids {
            self.scheduler.schedule(id, page);
        }
        Ok(ids)
    }

    /// Append an option to an existing option set.
    ///
    /// The new member copies the set's kind and owner, takes the next
    /// free index (`max + 1`, so gaps from deletions stay gaps), and is
    /// placed below the current last member.
    pub fn add_option(&mut self, key: GroupKey) -> Result<ElementId> {
        let last = group::resolve_group(&self.store, key)
            .and_then(|g| g.members.last().copied())
            .and_then(|id| self.store.get(id))
            .ok_or_else(|| {
                Error::InvalidGroupOperation(format!("no option set with key {key}"))
            })?;
        if !last.kind.is_option() {
            return Err(Error::InvalidGroupOperation(format!(
                "group {key} is not an option set"
            )));
        }

        let pages = last.placements.pages();
        let page = pages[0];
        let anchor = last.placements.reference().clone();
        let kind = last.kind;
        let owner = last.owner;

        let index = group::next_option_index(&self.store, key);
        let position = Point::new(
            anchor.position.x,
            anchor.position.y + anchor.size.height + OPTION_GAP,
        );
        let element = PlacedElement::new(kind, owner, page, position)
            .with_group_key(key)
            .with_option_index(index);
        let id = element.id;
        self.store.add_elements(vec![element])?;
        self.scheduler.schedule(id, page);
        Ok(id)
    }

    /// Apply a partial update to an element. Positional changes schedule
    /// a coordinate recalculation for the affected placement.
    pub fn update_element(&mut self, id: ElementId, patch: &ElementPatch) -> Result<()> {
        self.store.update_element(id, patch)?;
        if patch.is_positional() {
            if let Some(page) = self.patched_page(id, patch) {
                self.scheduler.schedule(id, page);
            }
        }
        Ok(())
    }

    fn patched_page(&self, id: ElementId, patch: &ElementPatch) -> Option<u32> {
        patch.page.or_else(|| {
            let pages = self.store.get(id)?.placements.pages();
            match pages.as_slice() {
                [only] => Some(*only),
                _ => None,
            }
        })
    }

    /// Delete an element. Grouped date/option elements cascade: every
    /// sibling sharing the group key is removed in one transaction.
    pub fn delete_element(&mut self, id: ElementId) -> Result<Vec<ElementId>> {
        let element = self.store.get(id).ok_or(Error::UnknownElement(id))?;
        let cascade_key = element
            .group_key
            .filter(|_| element.kind.date_role().is_some() || element.kind.is_option());

        let removed = match cascade_key {
            Some(key) => group::delete_group(&mut self.store, key)?,
            None => {
                self.store.remove_element(id)?;
                vec![id]
            }
        };
        self.on_removed(&removed);
        Ok(removed)
    }

    /// Delete every member of a group transactionally.
    pub fn delete_group(&mut self, key: GroupKey) -> Result<Vec<ElementId>> {
        let removed = group::delete_group(&mut self.store, key)?;
        self.on_removed(&removed);
        Ok(removed)
    }

    /// Fan a non-positional update out to every member of a group.
    pub fn update_group(&mut self, key: GroupKey, patch: &ElementPatch) -> Result<()> {
        group::update_group(&mut self.store, key, patch)
    }

    /// Remaining shared byte budget for a more-file group.
    pub fn remaining_file_budget(&self, key: GroupKey, cap_bytes: u64) -> u64 {
        group::remaining_file_budget(&self.store, key, cap_bytes)
    }

    /// Change the pages a replicable element is assigned to. New pages
    /// are seeded from the element's current reference position and get
    /// their coordinates recalculated.
    pub fn set_page_assignment(
        &mut self,
        id: ElementId,
        selection: &PageSelection,
    ) -> Result<AssignmentDiff> {
        let known: std::collections::BTreeSet<u32> = self.pages.keys().copied().collect();
        let diff = replicate::set_page_assignment(&mut self.store, id, selection, &known)?;
        for &page in &diff.added {
            self.scheduler.schedule(id, page);
        }
        Ok(diff)
    }

    /// Push a value/style/config change to every instance sharing an id.
    pub fn propagate_non_positional_change(
        &mut self,
        id: ElementId,
        patch: &ElementPatch,
    ) -> Result<()> {
        replicate::propagate_non_positional_change(&mut self.store, id, patch)
    }

    fn on_removed(&mut self, removed: &[ElementId]) {
        for &id in removed {
            self.scheduler.cancel(id);
        }
        // A session whose target is gone is discarded without committing.
        if let Some(session) = &self.session {
            if removed.contains(&session.target) {
                self.session = None;
            }
        }
    }

    // --- interaction side ------------------------------------------------

    /// Hit-test a page at a scaled screen-pixel point, frontmost first.
    pub fn element_at(&self, page: u32, screen_point: Point) -> Option<ElementId> {
        let unscaled = Point::new(
            screen_point.x / self.view.zoom,
            screen_point.y / self.view.zoom,
        );
        self.store.element_at(page, unscaled)
    }

    /// Begin dragging an element instance. Captures the zoom at start;
    /// recalculation for the target is suppressed until the session ends.
    pub fn begin_drag(&mut self, id: ElementId, page: u32, at: Point) -> Result<()> {
        self.ensure_placement(id, page)?;
        self.discard_session();
        self.scheduler.suppress(id);
        self.session = Some(InteractionSession::drag(id, page, at, self.view.zoom));
        Ok(())
    }

    /// Begin resizing an element instance from a corner handle.
    pub fn begin_resize(
        &mut self,
        id: ElementId,
        page: u32,
        corner: Corner,
        at: Point,
    ) -> Result<()> {
        self.ensure_placement(id, page)?;
        self.discard_session();
        self.scheduler.suppress(id);
        self.session = Some(InteractionSession::resize(
            id,
            page,
            corner,
            at,
            self.view.zoom,
        ));
        Ok(())
    }

    fn ensure_placement(&self, id: ElementId, page: u32) -> Result<()> {
        let element = self.store.get(id).ok_or(Error::UnknownElement(id))?;
        if element.placements.on_page(page).is_none() {
            return Err(Error::PlacementMissing { id, page });
        }
        Ok(())
    }

    /// Update the live pointer position of the active session. Only the
    /// session's delta changes; the store is untouched until commit.
    pub fn pointer_move(&mut self, to: Point) {
        if let Some(session) = &mut self.session {
            session.pointer_move(to);
        }
    }

    /// Observable session state.
    pub fn session_state(&self) -> SessionState {
        match &self.session {
            Some(session) => SessionState::Active(session.kind()),
            None => SessionState::Idle,
        }
    }

    /// Discard the active session without committing.
    pub fn cancel_session(&mut self) {
        self.discard_session();
    }

    fn discard_session(&mut self) {
        if let Some(session) = self.session.take() {
            self.scheduler.release(session.target);
        }
    }

    /// Commit the active session: fold its accumulated delta into the
    /// stored unscaled geometry and schedule recalculation.
    ///
    /// A commit whose element no longer exists is stale: it is ignored
    /// with a warning and `None` is returned.
    pub fn commit_session(&mut self) -> Result<Option<ElementId>> {
        let session = self.session.take().ok_or(Error::NoActiveSession)?;
        let (id, page) = (session.target, session.page);
        self.scheduler.release(id);

        let Some(placement) = self
            .store
            .get(id)
            .and_then(|e| e.placements.on_page(page))
        else {
            warn!("stale session commit for element {id} on page {page}; ignored");
            return Ok(None);
        };

        let outcome = session.resolve(placement);
        let patch = ElementPatch {
            page: Some(page),
            position: Some(outcome.position),
            size: Some(outcome.size),
            ..Default::default()
        };
        self.store.update_element(id, &patch)?;
        self.scheduler.schedule(id, page);
        Ok(Some(id))
    }

    // --- persistence side ------------------------------------------------

    /// Drain due recalculation tasks. The embedding shell calls this once
    /// per render frame.
    pub fn run_recalculation(&mut self) -> usize {
        self.scheduler
            .run_due(&mut self.store, &self.pages, &self.view)
    }

    /// Serialize every element whose coordinates are resolved.
    ///
    /// Due recalculation is flushed first, so coordinates are current
    /// before any external persistence read. Elements with unresolved
    /// placements are excluded with a warning; they keep rendering at
    /// their last known screen position but do not export.
    pub fn serialize_all(&mut self) -> Vec<ElementRecord> {
        self.run_recalculation();

        let mut records = Vec::new();
        for element in self.store.iter() {
            let unresolved = element
                .placements
                .iter()
                .any(|(_, p)| p.document_coords.is_none());
            if unresolved {
                warn!(
                    "element {} has unresolved coordinates and is excluded from export",
                    element.id
                );
                continue;
            }
            let assignment = match &element.placements {
                Placements::Single { .. } => None,
                Placements::Replicated { .. } => Some(element.placements.pages()),
            };
            for (page, placement) in element.placements.iter() {
                let coords = placement
                    .document_coords
                    .expect("unresolved placements were filtered above");
                records.push(ElementRecord {
                    id: element.id,
                    kind: element.kind,
                    page_number: page,
                    page_assignment: assignment.clone(),
                    document_coords: coords,
                    group_key: element.group_key,
                    owner: element.owner,
                    option_index: element.option_index,
                    value: element.value.clone(),
                    style: element.style.clone(),
                    config: element.config.clone(),
                });
            }
        }
        records
    }

    /// Rebuild elements from serialization records, reprojecting document
    /// coordinates into the current viewport through the inverse
    /// transform. Every referenced page must have reported geometry.
    pub fn load_records(&mut self, records: Vec<ElementRecord>) -> Result<Vec<ElementId>> {
        // Group records by element id, preserving record order.
        let mut grouped: Vec<(ElementId, Vec<ElementRecord>)> = Vec::new();
        for record in records {
            match grouped.iter_mut().find(|(id, _)| *id == record.id) {
                Some((_, list)) => list.push(record),
                None => grouped.push((record.id, vec![record])),
            }
        }

        let mut elements = Vec::with_capacity(grouped.len());
        for (id, instances) in grouped {
            let first = &instances[0];
            let mut by_page = BTreeMap::new();
            for record in &instances {
                let geometry = self
                    .pages
                    .get(&record.page_number)
                    .ok_or(Error::GeometryUnavailable {
                        page: record.page_number,
                    })?;
                let (position, size) =
                    geometry::to_screen_space(&record.document_coords, geometry, &self.view)?;
                by_page.insert(
                    record.page_number,
                    Placement {
                        position,
                        size,
                        document_coords: Some(record.document_coords),
                    },
                );
            }
            let placements = if first.kind.is_replicable() {
                Placements::Replicated { by_page }
            } else {
                let (page, placement) = by_page
                    .into_iter()
                    .next()
                    .expect("record group has at least one instance");
                Placements::Single { page, placement }
            };
            elements.push(PlacedElement {
                id,
                kind: first.kind,
                owner: first.owner,
                group_key: first.group_key,
                option_index: first.option_index,
                value: first.value.clone(),
                style: first.style.clone(),
                config: first.config.clone(),
                placements,
            });
        }

        let ids = elements.iter().map(|e| e.id).collect();
        self.store.add_elements(elements)?;
        Ok(ids)
    }
}

/// Build a day/month/year triplet sharing a fresh group key, laid out
/// left to right from the drop position.
fn date_triplet(owner: OwnerIndex, page: u32, at: Point) -> Vec<PlacedElement> {
    let key = uuid::Uuid::new_v4();
    let mut x = at.x;
    [FieldKind::DateDay, FieldKind::DateMonth, FieldKind::DateYear]
        .into_iter()
        .map(|kind| {
            let element =
                PlacedElement::new(kind, owner, page, Point::new(x, at.y)).with_group_key(key);
            x += kind.default_size().width + DATE_MEMBER_GAP;
            element
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupFamily;
    use kurbo::Size;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn geometry(page: u32, zoom: f64) -> PageGeometry {
        PageGeometry::new(
            page,
            Size::new(800.0 * zoom, 1035.3 * zoom),
            Size::new(612.0, 792.0),
        )
    }

    fn engine_with_pages(pages: &[u32]) -> FieldEngine {
        let mut engine = FieldEngine::new(2);
        for &page in pages {
            engine.page_ready(geometry(page, 1.0));
        }
        engine
    }

    #[test]
    fn test_scenario_a_date_creation() {
        let mut engine = engine_with_pages(&[1]);
        let ids = engine
            .create_element(
                FieldKind::DateDay,
                OwnerIndex::Actor(0),
                1,
                Point::new(100.0, 100.0),
            )
            .unwrap();
        assert_eq!(ids.len(), 3);

        let key = engine.store().get(ids[0]).unwrap().group_key.unwrap();
        let group = engine.get_group(key).unwrap();
        assert_eq!(group.family, GroupFamily::Date);
        assert!(group.complete);
        assert_eq!(group.members.len(), 3);
        // All members share the one key.
        for &id in &ids {
            assert_eq!(engine.store().get(id).unwrap().group_key, Some(key));
        }
    }

    #[test]
    fn test_scenario_b_page_assignment() {
        let mut engine = engine_with_pages(&[1, 2]);
        let id = engine
            .create_element(
                FieldKind::Signature,
                OwnerIndex::Actor(0),
                1,
                Point::new(40.0, 60.0),
            )
            .unwrap()[0];

        let pages: BTreeSet<u32> = [1, 2].into_iter().collect();
        let diff = engine
            .set_page_assignment(id, &PageSelection::Pages(pages))
            .unwrap();
        assert_eq!(diff.added.len(), 1);

        let element = engine.store().get(id).unwrap();
        assert_eq!(element.placements.pages(), vec![1, 2]);
        // Page-2 instance seeded at the page-1 position.
        assert_eq!(
            element.placements.on_page(2).unwrap().position,
            Point::new(40.0, 60.0)
        );

        // Deleting the signature removes every instance.
        engine.delete_element(id).unwrap();
        assert!(engine.store().get(id).is_none());
        assert!(engine.list_elements(1, None).is_empty());
        assert!(engine.list_elements(2, None).is_empty());
    }

    #[test]
    fn test_scenario_c_drag_commit_at_zoom() {
        let mut engine = engine_with_pages(&[1]);
        engine.set_zoom(1.5);
        let id = engine
            .create_element(
                FieldKind::Text,
                OwnerIndex::Actor(0),
                1,
                Point::new(100.0, 100.0),
            )
            .unwrap()[0];

        engine.begin_drag(id, 1, Point::new(100.0, 100.0)).unwrap();
        engine.pointer_move(Point::new(150.0, 130.0));
        let committed = engine.commit_session().unwrap();
        assert_eq!(committed, Some(id));

        let position = engine
            .store()
            .get(id)
            .unwrap()
            .placements
            .on_page(1)
            .unwrap()
            .position;
        assert!((position.x - 133.333).abs() < 1e-2);
        assert!((position.y - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_interactive_latency_no_store_mutation_before_commit() {
        let mut engine = engine_with_pages(&[1]);
        let id = engine
            .create_element(FieldKind::Text, OwnerIndex::Actor(0), 1, Point::ZERO)
            .unwrap()[0];
        engine.run_recalculation();

        engine.begin_drag(id, 1, Point::ZERO).unwrap();
        let before = engine.store().mutation_count();
        for i in 1..=20 {
            engine.pointer_move(Point::new(i as f64, i as f64));
            engine.run_recalculation(); // suppressed for the target
        }
        assert_eq!(engine.store().mutation_count(), before);

        engine.commit_session().unwrap();
        assert_eq!(engine.store().mutation_count(), before + 1);
    }

    #[test]
    fn test_commit_converges_document_coords() {
        let mut engine = engine_with_pages(&[1]);
        let id = engine
            .create_element(FieldKind::Text, OwnerIndex::Actor(0), 1, Point::new(50.0, 50.0))
            .unwrap()[0];
        engine.run_recalculation();

        engine.begin_drag(id, 1, Point::ZERO).unwrap();
        engine.pointer_move(Point::new(30.0, 0.0));
        engine.commit_session().unwrap();

        // Stale until the next frame, resolved after it.
        let placement = |engine: &FieldEngine| {
            engine
                .store()
                .get(id)
                .unwrap()
                .placements
                .on_page(1)
                .unwrap()
                .clone()
        };
        assert!(placement(&engine).document_coords.is_none());
        engine.run_recalculation();
        assert!(placement(&engine).document_coords.is_some());
    }

    #[test]
    fn test_delete_during_session_discards_it() {
        let mut engine = engine_with_pages(&[1]);
        let id = engine
            .create_element(FieldKind::Text, OwnerIndex::Actor(0), 1, Point::ZERO)
            .unwrap()[0];

        engine.begin_drag(id, 1, Point::ZERO).unwrap();
        engine.delete_element(id).unwrap();
        assert_eq!(engine.session_state(), SessionState::Idle);
        assert!(matches!(
            engine.commit_session(),
            Err(Error::NoActiveSession)
        ));
    }

    #[test]
    fn test_stale_commit_is_ignored() {
        let mut engine = engine_with_pages(&[1]);
        let signature = engine
            .create_element(FieldKind::Signature, OwnerIndex::Actor(0), 1, Point::ZERO)
            .unwrap()[0];
        let other = engine
            .create_element(FieldKind::Text, OwnerIndex::Actor(0), 1, Point::ZERO)
            .unwrap()[0];

        engine.begin_drag(signature, 1, Point::ZERO).unwrap();
        // Deleting a different element keeps the session alive.
        engine.delete_element(other).unwrap();
        assert_ne!(engine.session_state(), SessionState::Idle);

        // Removing the target behind the engine's back makes the commit
        // stale: ignored, not an error.
        engine.store.remove_element(signature).unwrap();
        let committed = engine.commit_session().unwrap();
        assert_eq!(committed, None);
    }

    #[test]
    fn test_all_owners_expansion() {
        let mut engine = engine_with_pages(&[1]);
        let ids = engine
            .create_element(FieldKind::Text, OwnerIndex::All, 1, Point::new(10.0, 10.0))
            .unwrap();
        assert_eq!(ids.len(), 2);

        let owners: Vec<OwnerIndex> = ids
            .iter()
            .map(|&id| engine.store().get(id).unwrap().owner)
            .collect();
        assert_eq!(owners, vec![OwnerIndex::Actor(0), OwnerIndex::Actor(1)]);
        // Copies are cascaded, not stacked.
        let p0 = engine.store().get(ids[0]).unwrap().placements.reference().position;
        let p1 = engine.store().get(ids[1]).unwrap().placements.reference().position;
        assert_ne!(p0, p1);
    }

    #[test]
    fn test_add_option_appends_after_gap() {
        let mut engine = engine_with_pages(&[1]);
        let first = engine
            .create_element(FieldKind::RadioOption, OwnerIndex::Actor(0), 1, Point::ZERO)
            .unwrap()[0];
        let key = engine.store().get(first).unwrap().group_key.unwrap();

        let second = engine.add_option(key).unwrap();
        let third = engine.add_option(key).unwrap();
        assert_eq!(engine.store().get(second).unwrap().option_index, Some(1));
        assert_eq!(engine.store().get(third).unwrap().option_index, Some(2));

        // Deleting any one option cascades to the whole set.
        let removed = engine.delete_element(second).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(engine.get_group(key).is_none());
    }

    #[test]
    fn test_replication_independence_and_shared_value() {
        let mut engine = engine_with_pages(&[1, 3]);
        let id = engine
            .create_element(FieldKind::Signature, OwnerIndex::Actor(0), 1, Point::ZERO)
            .unwrap()[0];
        let pages: BTreeSet<u32> = [1, 3].into_iter().collect();
        engine
            .set_page_assignment(id, &PageSelection::Pages(pages))
            .unwrap();

        // Move the page-1 instance.
        engine.begin_drag(id, 1, Point::ZERO).unwrap();
        engine.pointer_move(Point::new(60.0, 80.0));
        engine.commit_session().unwrap();

        let element = engine.store().get(id).unwrap();
        assert_eq!(
            element.placements.on_page(1).unwrap().position,
            Point::new(60.0, 80.0)
        );
        assert_eq!(element.placements.on_page(3).unwrap().position, Point::ZERO);

        // A label change reaches the one shared identity.
        engine
            .propagate_non_positional_change(
                id,
                &ElementPatch {
                    value: Some(json!({"label": "Initials"})),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(
            engine.store().get(id).unwrap().value,
            json!({"label": "Initials"})
        );
    }

    #[test]
    fn test_serialize_skips_unresolved_and_roundtrips() {
        let mut engine = engine_with_pages(&[1]);
        let resolved = engine
            .create_element(FieldKind::Text, OwnerIndex::Actor(0), 1, Point::new(100.0, 200.0))
            .unwrap()[0];
        // Page 9 has no geometry; this element can never resolve.
        let unresolved = engine
            .create_element(FieldKind::Text, OwnerIndex::Actor(0), 9, Point::ZERO)
            .unwrap()[0];

        for _ in 0..10 {
            engine.run_recalculation();
        }
        let records = engine.serialize_all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, resolved);
        assert!(records.iter().all(|r| r.id != unresolved));

        // Reload into a viewport rendered at double zoom: the unscaled
        // position reprojects identically.
        let json = serde_json::to_string(&records).unwrap();
        let parsed: Vec<ElementRecord> = serde_json::from_str(&json).unwrap();

        let mut reloaded = FieldEngine::new(2);
        reloaded.set_zoom(2.0);
        reloaded.page_ready(geometry(1, 2.0));
        let ids = reloaded.load_records(parsed).unwrap();
        assert_eq!(ids, vec![resolved]);
        let position = reloaded
            .store()
            .get(resolved)
            .unwrap()
            .placements
            .on_page(1)
            .unwrap()
            .position;
        assert!((position.x - 100.0).abs() < 1e-3);
        assert!((position.y - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_serialize_replicated_emits_instance_records() {
        let mut engine = engine_with_pages(&[1, 2]);
        let id = engine
            .create_element(FieldKind::Stamp, OwnerIndex::Actor(0), 1, Point::new(10.0, 10.0))
            .unwrap()[0];
        engine.set_page_assignment(id, &PageSelection::All).unwrap();

        let records = engine.serialize_all();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.id == id));
        assert!(
            records
                .iter()
                .all(|r| r.page_assignment.as_deref() == Some(&[1, 2][..]))
        );
        let pages: Vec<u32> = records.iter().map(|r| r.page_number).collect();
        assert_eq!(pages, vec![1, 2]);
    }

    #[test]
    fn test_zoom_change_drops_stale_geometry() {
        let mut engine = engine_with_pages(&[1]);
        let id = engine
            .create_element(FieldKind::Text, OwnerIndex::Actor(0), 1, Point::new(100.0, 100.0))
            .unwrap()[0];
        engine.run_recalculation();
        let coords = |engine: &FieldEngine| {
            engine
                .store()
                .get(id)
                .unwrap()
                .placements
                .on_page(1)
                .unwrap()
                .document_coords
        };
        let baseline = coords(&engine).unwrap();

        // Between the zoom change and the renderer's re-report there is
        // no usable geometry: recalculation must wait rather than divide
        // the old pixel size by the new zoom.
        engine.set_zoom(2.0);
        engine.run_recalculation();
        assert!(coords(&engine).is_none());
        assert!(engine.serialize_all().is_empty());

        engine.page_ready(geometry(1, 2.0));
        engine.run_recalculation();
        let after = coords(&engine).unwrap();
        assert!((after.left - baseline.left).abs() < 1e-9);
        assert!((after.top - baseline.top).abs() < 1e-9);
    }

    #[test]
    fn test_cancelled_session_catches_up_with_new_geometry() {
        let mut engine = engine_with_pages(&[1]);
        let id = engine
            .create_element(FieldKind::Text, OwnerIndex::Actor(0), 1, Point::new(100.0, 100.0))
            .unwrap()[0];
        engine.run_recalculation();
        let coords = |engine: &FieldEngine| {
            engine
                .store()
                .get(id)
                .unwrap()
                .placements
                .on_page(1)
                .unwrap()
                .document_coords
        };
        let before = coords(&engine).unwrap();

        engine.begin_drag(id, 1, Point::ZERO).unwrap();
        // The page is re-rendered at half the pixel size mid-session.
        engine.page_ready(PageGeometry::new(
            1,
            Size::new(400.0, 517.65),
            Size::new(612.0, 792.0),
        ));
        engine.run_recalculation();
        assert!(coords(&engine).is_none());

        // Cancelling must not leave coordinates from the old geometry:
        // the queued task fires once suppression lifts.
        engine.cancel_session();
        engine.run_recalculation();
        let after = coords(&engine).unwrap();
        assert!((after.left - before.left * 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_page_ready_invalidates_without_moving_elements() {
        let mut engine = engine_with_pages(&[1]);
        let id = engine
            .create_element(FieldKind::Text, OwnerIndex::Actor(0), 1, Point::new(25.0, 35.0))
            .unwrap()[0];
        engine.run_recalculation();
        let before = engine
            .store()
            .get(id)
            .unwrap()
            .placements
            .on_page(1)
            .unwrap()
            .clone();
        assert!(before.document_coords.is_some());

        // Renderer re-reports the page (e.g. after a zoom re-render).
        engine.page_ready(geometry(1, 1.0));
        let after = engine
            .store()
            .get(id)
            .unwrap()
            .placements
            .on_page(1)
            .unwrap()
            .clone();
        assert_eq!(after.position, before.position);
        assert!(after.document_coords.is_none());

        engine.run_recalculation();
        assert!(
            engine
                .store()
                .get(id)
                .unwrap()
                .placements
                .on_page(1)
                .unwrap()
                .document_coords
                .is_some()
        );
    }
}
