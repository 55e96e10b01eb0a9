//! Document rendering collaborator
//!
//! The engine never decodes documents itself. A [`DocumentRenderer`] hands
//! back a decoded raster together with the page viewport, and the engine
//! derives the viewport height `H` for coordinate mapping from it.

use image::RgbaImage;

use crate::error::RenderError;

/// Page size in document units at scale 1
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PageViewport {
    pub width: f32,
    pub height: f32,
}

/// A decoded page raster
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Straight-alpha pixels, `viewport * scale` in size
    pub raster: RgbaImage,
    pub viewport: PageViewport,
}

/// Source of page rasters
///
/// Rendering the same page twice must yield the same raster and have no
/// other side effect. Page indices are zero-based.
pub trait DocumentRenderer {
    fn page_count(&self) -> u32;

    fn render_page(&self, page: u32, scale: f32) -> Result<PageImage, RenderError>;
}

/// Largest raster a renderer may allocate, in RGBA bytes (1 GiB)
pub const MAX_RASTER_BYTES: u64 = 1 << 30;

/// Raster dimensions for a viewport at `scale`
///
/// Sizes that do not fit in memory are a backend error rather than an
/// allocation failure.
pub fn raster_size(viewport: PageViewport, scale: f32) -> Result<(u32, u32), RenderError> {
    let too_large = || {
        RenderError::Backend(format!(
            "page raster {}x{} at scale {scale} exceeds {MAX_RASTER_BYTES} bytes",
            viewport.width, viewport.height
        ))
    };

    let width = dimension(viewport.width * scale).ok_or_else(too_large)?;
    let height = dimension(viewport.height * scale).ok_or_else(too_large)?;
    let bytes = u64::from(width)
        .checked_mul(u64::from(height))
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(too_large)?;
    if bytes > MAX_RASTER_BYTES {
        return Err(too_large());
    }
    Ok((width, height))
}

fn dimension(extent: f32) -> Option<u32> {
    let extent = extent.ceil().max(1.0);
    (extent.is_finite() && extent <= u32::MAX as f32).then_some(extent as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_size_rounds_up() {
        let letter = PageViewport {
            width: 612.0,
            height: 792.0,
        };
        assert_eq!(raster_size(letter, 1.0).unwrap(), (612, 792));
        assert_eq!(raster_size(letter, 1.5).unwrap(), (918, 1188));
        assert_eq!(
            raster_size(PageViewport { width: 10.2, height: 0.0 }, 1.0).unwrap(),
            (11, 1)
        );
    }

    #[test]
    fn test_raster_size_rejects_huge_scale() {
        let letter = PageViewport {
            width: 612.0,
            height: 792.0,
        };
        assert!(matches!(raster_size(letter, 1.0e7), Err(RenderError::Backend(_))));
        assert!(matches!(raster_size(letter, f32::MAX), Err(RenderError::Backend(_))));
        // 16384 x 16384 x 4 is exactly 1 GiB
        let square = PageViewport {
            width: 16384.0,
            height: 16384.0,
        };
        assert!(raster_size(square, 1.0).is_ok());
        assert!(raster_size(square, 1.01).is_err());
    }
}
