//! Layered page rendering
//!
//! The pipeline keeps three layers of identical size:
//! - base: the page raster supplied by the document renderer
//! - annotations: committed annotations for the current page
//! - preview: the in-progress gesture, cleared on every redraw
//!
//! The layers are only combined in [`RenderPipeline::composite`], so a
//! preview redraw never touches the base raster.

pub mod draw;

use image::RgbaImage;
use tiny_skia::{Color as SkColor, ColorU8, Pixmap, PixmapPaint, Transform};
use tracing::{debug, warn};

use crate::annotation::Annotation;
use crate::coords::CoordinateMapper;
use crate::document::PageImage;
use crate::error::{EngineError, EngineResult};
use crate::tool::Preview;

pub use draw::DrawStyle;

/// What the canvas currently shows
#[derive(Debug, Clone, PartialEq)]
pub enum RenderStatus {
    /// Nothing presented yet
    Empty,
    /// A page render is in flight; layers still hold the previous page
    Loading { page: u32 },
    Ready { page: u32 },
    /// The last load failed; layers still hold the previous page
    Failed { page: u32, message: String },
}

struct Layers {
    page: u32,
    mapper: CoordinateMapper,
    base: Pixmap,
    annotations: Pixmap,
    preview: Pixmap,
}

/// Sole owner of the drawing surfaces
pub struct RenderPipeline {
    layers: Option<Layers>,
    status: RenderStatus,
    style: DrawStyle,
    preview_opacity: f32,
}

impl RenderPipeline {
    pub fn new(style: DrawStyle, preview_opacity: f32) -> Self {
        Self {
            layers: None,
            status: RenderStatus::Empty,
            style,
            preview_opacity: preview_opacity.clamp(0.0, 1.0),
        }
    }

    pub fn status(&self) -> &RenderStatus {
        &self.status
    }

    /// Page whose layers are currently presented
    pub fn presented_page(&self) -> Option<u32> {
        self.layers.as_ref().map(|l| l.page)
    }

    /// Mapper the presented layers were drawn with
    pub fn mapper(&self) -> Option<CoordinateMapper> {
        self.layers.as_ref().map(|l| l.mapper)
    }

    pub fn canvas_size(&self) -> Option<(u32, u32)> {
        self.layers
            .as_ref()
            .map(|l| (l.base.width(), l.base.height()))
    }

    pub fn mark_loading(&mut self, page: u32) {
        self.status = RenderStatus::Loading { page };
    }

    /// Record a failed page load
    ///
    /// The previously presented layers are left as they are and no
    /// annotation is drawn for the failed page.
    pub fn mark_failed(&mut self, page: u32, message: impl Into<String>) {
        let message = message.into();
        warn!(page, %message, "page render failed");
        self.status = RenderStatus::Failed { page, message };
    }

    /// Full redraw: replace the base raster and redraw every annotation
    pub fn present_page(
        &mut self,
        page: u32,
        image: &PageImage,
        mapper: CoordinateMapper,
        annotations: &[&Annotation],
    ) -> EngineResult<()> {
        let base = pixmap_from_rgba(&image.raster).ok_or_else(|| EngineError::PageLoad {
            page,
            message: format!(
                "page raster has invalid size {}x{}",
                image.raster.width(),
                image.raster.height()
            ),
        })?;
        let (width, height) = (base.width(), base.height());
        let annotation_layer = blank(width, height, page)?;
        let preview_layer = blank(width, height, page)?;

        self.layers = Some(Layers {
            page,
            mapper,
            base,
            annotations: annotation_layer,
            preview: preview_layer,
        });
        self.status = RenderStatus::Ready { page };
        debug!(page, width, height, "page presented");
        self.redraw_annotations(annotations);
        Ok(())
    }

    /// Clear and redraw the committed annotation layer
    ///
    /// Records for other pages are skipped.
    pub fn redraw_annotations(&mut self, annotations: &[&Annotation]) {
        let Some(layers) = self.layers.as_mut() else {
            return;
        };
        layers.annotations.fill(SkColor::TRANSPARENT);
        let page = layers.page;
        let mut drawn = 0usize;
        for annotation in annotations.iter().filter(|a| a.page() == page) {
            draw::draw_annotation(&mut layers.annotations, annotation, &layers.mapper, &self.style);
            drawn += 1;
        }
        debug!(page, drawn, "annotation layer redrawn");
    }

    /// Clear the preview layer and draw `preview` on it
    pub fn redraw_preview(&mut self, preview: Option<&Preview>) {
        let Some(layers) = self.layers.as_mut() else {
            return;
        };
        layers.preview.fill(SkColor::TRANSPARENT);
        if let Some(preview) = preview {
            draw::draw_preview(&mut layers.preview, preview, &self.style, layers.mapper.scale());
        }
    }

    /// Flatten base, annotations and preview into one pixmap
    pub fn composite(&self) -> Option<Pixmap> {
        let layers = self.layers.as_ref()?;
        let mut out = layers.base.clone();
        out.draw_pixmap(
            0,
            0,
            layers.annotations.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        let preview_paint = PixmapPaint {
            opacity: self.preview_opacity,
            ..PixmapPaint::default()
        };
        out.draw_pixmap(
            0,
            0,
            layers.preview.as_ref(),
            &preview_paint,
            Transform::identity(),
            None,
        );
        Some(out)
    }

    /// Composite as a straight-alpha image
    pub fn composite_image(&self) -> Option<RgbaImage> {
        self.composite().and_then(|p| rgba_from_pixmap(&p))
    }

    /// Composite encoded as PNG
    pub fn snapshot_png(&self) -> EngineResult<Vec<u8>> {
        let pixmap = self.composite().ok_or(EngineError::NoPageLoaded)?;
        pixmap
            .encode_png()
            .map_err(|e| EngineError::Image(format!("PNG encoding failed: {e}")))
    }
}

fn blank(width: u32, height: u32, page: u32) -> EngineResult<Pixmap> {
    Pixmap::new(width, height).ok_or_else(|| EngineError::PageLoad {
        page,
        message: format!("failed to allocate layer {width}x{height}"),
    })
}

/// Copy a straight-alpha raster into a premultiplied pixmap
pub fn pixmap_from_rgba(raster: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(raster.width(), raster.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(raster.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}

pub fn rgba_from_pixmap(pixmap: &Pixmap) -> Option<RgbaImage> {
    let data = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), data)
}
