//! Canvas <-> document coordinate mapping
//!
//! Canvas space has its origin at the top-left and is measured in pixels.
//! Document space has its origin at the bottom-left and is measured in
//! document units at scale 1. The mapping is fully determined by the scale
//! factor and the page viewport height `H`:
//!
//! ```text
//! document = (px / scale, H - py / scale)
//! canvas   = (x * scale, (H - y) * scale)
//! ```

use crate::annotation::{CanvasPoint, DocPoint, DocRect};
use crate::error::GeometryError;

/// Pure mapping between canvas pixels and document space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    scale: f32,
    viewport_height: f32,
}

/// Canvas-space rectangle, origin top-left, normalized
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CanvasRect {
    pub fn from_corners(a: CanvasPoint, b: CanvasPoint) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self {
            x,
            y,
            width: a.x.max(b.x) - x,
            height: a.y.max(b.y) - y,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

impl CoordinateMapper {
    /// Create a mapper for `scale` and a page viewport height in document units
    ///
    /// # Errors
    ///
    /// Fails fast when `scale <= 0` or either value is not finite. Nothing is
    /// clamped.
    pub fn new(scale: f32, viewport_height: f32) -> Result<Self, GeometryError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(GeometryError::InvalidScale(scale));
        }
        if !viewport_height.is_finite() || viewport_height < 0.0 {
            return Err(GeometryError::InvalidViewport(viewport_height));
        }
        Ok(Self {
            scale,
            viewport_height,
        })
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn viewport_height(&self) -> f32 {
        self.viewport_height
    }

    pub fn canvas_to_document(&self, p: CanvasPoint) -> DocPoint {
        DocPoint::new(p.x / self.scale, self.viewport_height - p.y / self.scale)
    }

    pub fn document_to_canvas(&self, p: DocPoint) -> CanvasPoint {
        CanvasPoint::new(p.x * self.scale, (self.viewport_height - p.y) * self.scale)
    }

    /// Map two canvas corners into a normalized document rect
    pub fn canvas_rect_to_document(&self, a: CanvasPoint, b: CanvasPoint) -> DocRect {
        DocRect::from_corners(self.canvas_to_document(a), self.canvas_to_document(b))
    }

    /// Map a document rect into a normalized canvas rect
    ///
    /// The vertical flip swaps which edge is on top, so the corners are
    /// re-normalized after mapping.
    pub fn document_rect_to_canvas(&self, rect: &DocRect) -> CanvasRect {
        CanvasRect::from_corners(
            self.document_to_canvas(DocPoint::new(rect.x0, rect.y0)),
            self.document_to_canvas(DocPoint::new(rect.x1, rect.y1)),
        )
    }
}
