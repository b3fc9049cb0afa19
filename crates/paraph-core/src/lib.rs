//! Paraph Core Library
//!
//! Platform-agnostic positioning, grouping, and multi-page replication
//! engine for interactive document fields. Rendering, configuration
//! forms, and persistence are external collaborators; this crate owns
//! the geometry and grouping semantics they read from and write to.

pub mod element;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod group;
pub mod replicate;
pub mod schedule;
pub mod session;
pub mod store;

pub use element::{
    DateRole, ElementId, ElementPatch, FieldKind, GroupKey, OwnerIndex, PlacedElement, Placement,
    Placements,
};
pub use engine::{ElementRecord, FieldEngine};
pub use error::{Error, Result};
pub use geometry::{
    DocumentCoords, PageGeometry, ViewContext, to_document_space, to_screen_space, MAX_ZOOM,
    MIN_ZOOM,
};
pub use group::{ElementGroup, GroupFamily};
pub use replicate::{AssignmentDiff, PageSelection};
pub use schedule::{RecalcScheduler, MAX_RECALC_RETRIES};
pub use session::{Corner, InteractionSession, SessionKind, SessionState};
pub use store::ElementStore;
