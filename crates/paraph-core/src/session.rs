//! Transient drag/resize interaction state.
//!
//! A session accumulates pointer deltas in scaled screen pixels without
//! touching the element store; the store is mutated exactly once, at
//! commit, where the delta is folded into the stored unscaled position
//! using the zoom captured when the session started. If the target is
//! deleted mid-session the session is discarded without committing.

use crate::element::{ElementId, Placement};
use kurbo::{Point, Size, Vec2};

/// Minimum element edge length in unscaled pixels after a resize.
pub const MIN_ELEMENT_SIZE: f64 = 1.0;

/// What the session is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Dragging,
    Resizing,
}

/// Corner a resize is anchored against; the opposite corner stays fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Observable state of the interaction slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active(SessionKind),
}

/// The geometry a commit folds into the store, already unscaled.
#[derive(Debug, Clone, Copy)]
pub struct CommitOutcome {
    pub position: Point,
    pub size: Size,
}

/// An active drag or resize on one element instance.
#[derive(Debug, Clone)]
pub struct InteractionSession {
    kind: SessionKind,
    /// Target element instance.
    pub target: ElementId,
    pub page: u32,
    /// Pointer origin in scaled screen pixels.
    origin: Point,
    /// Live pointer delta in scaled screen pixels. Updated on every
    /// move; never written to the store before commit.
    delta: Vec2,
    /// Zoom at pointer-down. Commits normalize by this, not by whatever
    /// the zoom is at pointer-up.
    zoom_at_start: f64,
    /// Resize anchor; `None` while dragging.
    corner: Option<Corner>,
}

impl InteractionSession {
    /// Start a drag session.
    pub fn drag(target: ElementId, page: u32, at: Point, zoom: f64) -> Self {
        Self {
            kind: SessionKind::Dragging,
            target,
            page,
            origin: at,
            delta: Vec2::ZERO,
            zoom_at_start: zoom,
            corner: None,
        }
    }

    /// Start a resize session anchored at the given corner.
    pub fn resize(target: ElementId, page: u32, corner: Corner, at: Point, zoom: f64) -> Self {
        Self {
            kind: SessionKind::Resizing,
            target,
            page,
            origin: at,
            delta: Vec2::ZERO,
            zoom_at_start: zoom,
            corner: Some(corner),
        }
    }

    /// The session kind.
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Update the live delta from the current pointer position.
    pub fn pointer_move(&mut self, to: Point) {
        self.delta = to - self.origin;
    }

    /// Accumulated delta normalized to unscaled pixels.
    pub fn unscaled_delta(&self) -> Vec2 {
        self.delta / self.zoom_at_start
    }

    /// Fold the accumulated delta into an element's stored geometry.
    ///
    /// For drags the whole rectangle translates. For resizes the dragged
    /// corner follows the pointer while the opposite corner stays put:
    /// the position offset and size offset are computed together and
    /// applied atomically by the caller.
    pub fn resolve(&self, placement: &Placement) -> CommitOutcome {
        let d = self.unscaled_delta();
        match (self.kind, self.corner) {
            (SessionKind::Dragging, _) | (SessionKind::Resizing, None) => CommitOutcome {
                position: placement.position + d,
                size: placement.size,
            },
            (SessionKind::Resizing, Some(corner)) => {
                let (pos, size) = (placement.position, placement.size);
                let w = match corner {
                    Corner::TopRight | Corner::BottomRight => size.width + d.x,
                    Corner::TopLeft | Corner::BottomLeft => size.width - d.x,
                }
                .max(MIN_ELEMENT_SIZE);
                let h = match corner {
                    Corner::BottomLeft | Corner::BottomRight => size.height + d.y,
                    Corner::TopLeft | Corner::TopRight => size.height - d.y,
                }
                .max(MIN_ELEMENT_SIZE);
                // Position offsets come from the clamped size, not the raw
                // delta, so the anchored edges stay fixed even when a
                // dimension hits the minimum.
                let x = match corner {
                    Corner::TopLeft | Corner::BottomLeft => pos.x + (size.width - w),
                    Corner::TopRight | Corner::BottomRight => pos.x,
                };
                let y = match corner {
                    Corner::TopLeft | Corner::TopRight => pos.y + (size.height - h),
                    Corner::BottomLeft | Corner::BottomRight => pos.y,
                };
                CommitOutcome {
                    position: Point::new(x, y),
                    size: Size::new(w, h),
                }
            }
        }
    }
}
