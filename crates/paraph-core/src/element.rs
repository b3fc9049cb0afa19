//! Field element definitions.

use crate::geometry::DocumentCoords;
use kurbo::{Point, Rect, Size};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for a placed element, unique across the document.
pub type ElementId = Uuid;

/// Correlation id shared by the members of one logical group.
///
/// Assigned once at creation and never reused; never derived from an
/// element id.
pub type GroupKey = Uuid;

/// The kind of interactive field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    Text,
    CheckboxOption,
    RadioOption,
    Select,
    DateDay,
    DateMonth,
    DateYear,
    Signature,
    Stamp,
    MoreFile,
    PeriodDate,
}

/// Role of a date group member, in display order day -> month -> year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DateRole {
    Day,
    Month,
    Year,
}

impl FieldKind {
    /// Whether this kind may have independently positioned instances on
    /// multiple pages while sharing one identity/value.
    pub fn is_replicable(self) -> bool {
        matches!(self, FieldKind::Signature | FieldKind::Stamp)
    }

    /// The date role of this kind, if it is a date digit group member.
    pub fn date_role(self) -> Option<DateRole> {
        match self {
            FieldKind::DateDay => Some(DateRole::Day),
            FieldKind::DateMonth => Some(DateRole::Month),
            FieldKind::DateYear => Some(DateRole::Year),
            _ => None,
        }
    }

    /// Whether this kind is a member of a checkbox/radio option set.
    pub fn is_option(self) -> bool {
        matches!(self, FieldKind::CheckboxOption | FieldKind::RadioOption)
    }

    /// Default unscaled size for a newly placed field of this kind.
    pub fn default_size(self) -> Size {
        match self {
            FieldKind::Text => Size::new(160.0, 32.0),
            FieldKind::CheckboxOption | FieldKind::RadioOption => Size::new(24.0, 24.0),
            FieldKind::Select => Size::new(160.0, 32.0),
            FieldKind::DateDay | FieldKind::DateMonth => Size::new(48.0, 32.0),
            FieldKind::DateYear => Size::new(72.0, 32.0),
            FieldKind::Signature => Size::new(200.0, 80.0),
            FieldKind::Stamp => Size::new(120.0, 120.0),
            FieldKind::MoreFile => Size::new(160.0, 48.0),
            FieldKind::PeriodDate => Size::new(200.0, 32.0),
        }
    }
}

/// Workflow participant a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerIndex {
    /// A single participant, by index.
    Actor(u32),
    /// Sentinel: one instance required per participant (expanded at
    /// creation time; stored elements always resolve to an actor).
    All,
}

/// Per-page geometry of an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Unscaled pixels relative to the page-local origin (top-left).
    pub position: Point,
    /// Unscaled size.
    pub size: Size,
    /// Derived document coordinates; `None` while unresolved. May lag
    /// during active dragging but converges after commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_coords: Option<DocumentCoords>,
}

impl Placement {
    /// Create a placement with unresolved document coordinates.
    pub fn new(position: Point, size: Size) -> Self {
        Self {
            position,
            size,
            document_coords: None,
        }
    }

    /// Bounding rectangle in unscaled page-local pixels.
    pub fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }
}

/// Where an element lives: one page, or an independently placed instance
/// per assigned page (replicable kinds only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlacementsWire")]
pub enum Placements {
    Single { page: u32, placement: Placement },
    /// Invariant: `by_page` is never empty. Enforced on deserialization;
    /// in-memory construction always seeds at least the creation page,
    /// and assignment changes reject an empty page set.
    Replicated { by_page: BTreeMap<u32, Placement> },
}

/// Mirror of [`Placements`] for deserialization, so the non-empty
/// invariant can be checked before a value exists.
#[derive(Deserialize)]
enum PlacementsWire {
    Single { page: u32, placement: Placement },
    Replicated { by_page: BTreeMap<u32, Placement> },
}

impl TryFrom<PlacementsWire> for Placements {
    type Error = String;

    fn try_from(wire: PlacementsWire) -> Result<Self, Self::Error> {
        match wire {
            PlacementsWire::Single { page, placement } => {
                Ok(Placements::Single { page, placement })
            }
            PlacementsWire::Replicated { by_page } if by_page.is_empty() => {
                Err("replicated element needs at least one placement".into())
            }
            PlacementsWire::Replicated { by_page } => Ok(Placements::Replicated { by_page }),
        }
    }
}

impl Placements {
    /// Pages this element appears on, ascending.
    pub fn pages(&self) -> Vec<u32> {
        match self {
            Placements::Single { page, .. } => vec![*page],
            Placements::Replicated { by_page } => by_page.keys().copied().collect(),
        }
    }

    /// Whether the element appears on the given page.
    pub fn contains_page(&self, page: u32) -> bool {
        match self {
            Placements::Single { page: p, .. } => *p == page,
            Placements::Replicated { by_page } => by_page.contains_key(&page),
        }
    }

    /// The placement on a given page, if any.
    pub fn on_page(&self, page: u32) -> Option<&Placement> {
        match self {
            Placements::Single { page: p, placement } if *p == page => Some(placement),
            Placements::Single { .. } => None,
            Placements::Replicated { by_page } => by_page.get(&page),
        }
    }

    /// Mutable placement on a given page, if any.
    pub fn on_page_mut(&mut self, page: u32) -> Option<&mut Placement> {
        match self {
            Placements::Single { page: p, placement } if *p == page => Some(placement),
            Placements::Single { .. } => None,
            Placements::Replicated { by_page } => by_page.get_mut(&page),
        }
    }

    /// The placement on the lowest-numbered page. Used as the seed when
    /// replicating onto newly assigned pages.
    pub fn reference(&self) -> &Placement {
        match self {
            Placements::Single { placement, .. } => placement,
            Placements::Replicated { by_page } => {
                by_page
                    .values()
                    .next()
                    .expect("replicated element has at least one placement")
            }
        }
    }

    /// Iterate over `(page, placement)` pairs.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (u32, &Placement)> + '_> {
        match self {
            Placements::Single { page, placement } => {
                Box::new(std::iter::once((*page, placement)))
            }
            Placements::Replicated { by_page } => {
                Box::new(by_page.iter().map(|(p, pl)| (*p, pl)))
            }
        }
    }

    /// Iterate over `(page, placement)` pairs mutably.
    pub fn iter_mut(&mut self) -> Box<dyn Iterator<Item = (u32, &mut Placement)> + '_> {
        match self {
            Placements::Single { page, placement } => {
                Box::new(std::iter::once((*page, placement)))
            }
            Placements::Replicated { by_page } => {
                Box::new(by_page.iter_mut().map(|(p, pl)| (*p, pl)))
            }
        }
    }
}

/// A field placed on the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedElement {
    pub id: ElementId,
    pub kind: FieldKind,
    pub owner: OwnerIndex,
    /// Correlation id for sibling elements forming one logical group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_key: Option<GroupKey>,
    /// Ordering index within an option set. Assigned at creation, never
    /// reused within a group even after deletions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_index: Option<u32>,
    /// Opaque payloads, not interpreted by this engine.
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub style: Value,
    #[serde(default)]
    pub config: Value,
    pub placements: Placements,
}

impl PlacedElement {
    /// Create a new element at the given unscaled position with the
    /// kind's default size. Replicable kinds start assigned to the
    /// creation page only.
    pub fn new(kind: FieldKind, owner: OwnerIndex, page: u32, position: Point) -> Self {
        let placement = Placement::new(position, kind.default_size());
        let placements = if kind.is_replicable() {
            let mut by_page = BTreeMap::new();
            by_page.insert(page, placement);
            Placements::Replicated { by_page }
        } else {
            Placements::Single { page, placement }
        };
        Self {
            id: Uuid::new_v4(),
            kind,
            owner,
            group_key: None,
            option_index: None,
            value: Value::Null,
            style: Value::Null,
            config: Value::Null,
            placements,
        }
    }

    /// Attach a group key.
    pub fn with_group_key(mut self, key: GroupKey) -> Self {
        self.group_key = Some(key);
        self
    }

    /// Attach an option index.
    pub fn with_option_index(mut self, index: u32) -> Self {
        self.option_index = Some(index);
        self
    }

    /// Whether the element appears on the given page.
    pub fn is_on_page(&self, page: u32) -> bool {
        self.placements.contains_page(page)
    }
}

/// Partial update applied to an element.
///
/// Positional fields target one placement; for replicated elements the
/// `page` must name which instance moves.
#[derive(Debug, Clone, Default)]
pub struct ElementPatch {
    /// Page whose placement a position/size change targets. Optional for
    /// single-page elements.
    pub page: Option<u32>,
    pub position: Option<Point>,
    pub size: Option<Size>,
    pub value: Option<Value>,
    pub style: Option<Value>,
    pub config: Option<Value>,
    pub option_index: Option<u32>,
}

impl ElementPatch {
    /// Whether the patch touches geometry.
    pub fn is_positional(&self) -> bool {
        self.position.is_some() || self.size.is_some()
    }

    /// Copy of this patch with all positional fields stripped.
    pub fn non_positional(&self) -> Self {
        Self {
            page: None,
            position: None,
            size: None,
            value: self.value.clone(),
            style: self.style.clone(),
            config: self.config.clone(),
            option_index: self.option_index,
        }
    }
}
