//! Conversion between canvas-pixel space and document-point space.
//!
//! Screen positions are stored unscaled (divided by the current zoom), so
//! an element at rest is zoom-independent. Document coordinates use the
//! page's point system with the y axis growing up, while screen y grows
//! down; the transform flips the axis. Both directions are pure functions
//! of the page geometry and the view context.

use crate::error::{Error, Result};
use kurbo::{Point, Size};
use serde::{Deserialize, Serialize};

/// Minimum allowed zoom level.
pub const MIN_ZOOM: f64 = 0.1;
/// Maximum allowed zoom level.
pub const MAX_ZOOM: f64 = 10.0;

/// Explicit view state passed into every transform call.
///
/// Replaces ambient global zoom: callers always say which zoom a pixel
/// measurement was taken at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ViewContext {
    /// Current zoom level (1.0 = 100%).
    pub zoom: f64,
}

impl Default for ViewContext {
    fn default() -> Self {
        Self { zoom: 1.0 }
    }
}

impl ViewContext {
    /// Create a view context with the given zoom, clamped to the valid range.
    pub fn new(zoom: f64) -> Self {
        Self {
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
        }
    }

    /// Set the zoom level, clamped to the valid range.
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }
}

/// Pixel and point geometry of one rendered page.
///
/// Read-only input reported by the external renderer. `pixel_size` is the
/// rendered size at the current zoom; `document_size` is the fixed size of
/// the page in document points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Page number this geometry belongs to.
    pub page: u32,
    /// Rendered pixel size, scaled by the zoom it was measured at.
    pub pixel_size: Size,
    /// Page size in document points.
    pub document_size: Size,
}

impl PageGeometry {
    /// Create page geometry from rendered pixel size and document point size.
    pub fn new(page: u32, pixel_size: Size, document_size: Size) -> Self {
        Self {
            page,
            pixel_size,
            document_size,
        }
    }

    /// Pixel size of the page at zoom 1.0.
    fn base_pixel_size(&self, view: &ViewContext) -> Size {
        Size::new(
            self.pixel_size.width / view.zoom,
            self.pixel_size.height / view.zoom,
        )
    }

    fn validate(&self, view: &ViewContext) -> Result<Size> {
        let base = self.base_pixel_size(view);
        if base.width <= 0.0
            || base.height <= 0.0
            || self.document_size.width <= 0.0
            || self.document_size.height <= 0.0
        {
            return Err(Error::ZeroSizePage { page: self.page });
        }
        Ok(base)
    }
}

/// Element coordinates in document points, y-up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentCoords {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl DocumentCoords {
    /// Width in document points.
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    /// Height in document points.
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }
}

/// Convert an unscaled page-local screen rectangle to document coordinates.
///
/// `position` and `size` are in unscaled pixels relative to the page
/// origin (top-left). The result is expressed in the page's point system
/// with the origin at the bottom-left.
pub fn to_document_space(
    position: Point,
    size: Size,
    geometry: &PageGeometry,
    view: &ViewContext,
) -> Result<DocumentCoords> {
    let base = geometry.validate(view)?;
    let ratio_x = geometry.document_size.width / base.width;
    let ratio_y = geometry.document_size.height / base.height;

    let left = position.x * ratio_x;
    let right = (position.x + size.width) * ratio_x;
    // Screen y grows down, document y grows up.
    let top = geometry.document_size.height - position.y * ratio_y;
    let bottom = geometry.document_size.height - (position.y + size.height) * ratio_y;

    Ok(DocumentCoords {
        left,
        bottom,
        right,
        top,
    })
}

/// Convert document coordinates back to an unscaled page-local rectangle.
///
/// Exact inverse of [`to_document_space`], used to reproject stored
/// elements against a different render scale or viewport.
pub fn to_screen_space(
    coords: &DocumentCoords,
    geometry: &PageGeometry,
    view: &ViewContext,
) -> Result<(Point, Size)> {
    let base = geometry.validate(view)?;
    let ratio_x = geometry.document_size.width / base.width;
    let ratio_y = geometry.document_size.height / base.height;

    let x = coords.left / ratio_x;
    let y = (geometry.document_size.height - coords.top) / ratio_y;
    let width = coords.width() / ratio_x;
    let height = coords.height() / ratio_y;

    Ok((Point::new(x, y), Size::new(width, height)))
}
