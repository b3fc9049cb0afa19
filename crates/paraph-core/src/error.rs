//! Error types for the placement engine.

use crate::element::{ElementId, FieldKind};
use thiserror::Error;

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("page {page} has no geometry yet")]
    GeometryUnavailable { page: u32 },
    #[error("page {page} reported zero-size geometry")]
    ZeroSizePage { page: u32 },
    #[error("unknown element: {0}")]
    UnknownElement(ElementId),
    #[error("duplicate element id: {0}")]
    DuplicateElement(ElementId),
    #[error("element {id} has no placement on page {page}")]
    PlacementMissing { id: ElementId, page: u32 },
    #[error("invalid group operation: {0}")]
    InvalidGroupOperation(String),
    #[error("page assignment resolved to zero pages")]
    OrphanedReplicationAssignment,
    #[error("element kind {0:?} cannot span multiple pages")]
    NotReplicable(FieldKind),
    #[error("position and size cannot be propagated across instances")]
    PositionalPropagation,
    #[error("no interaction session is active")]
    NoActiveSession,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
