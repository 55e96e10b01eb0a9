use annotator_core::{raster_size, DocumentRenderer, PageImage, PageViewport, RenderError};
use image::{Rgba, RgbaImage};
use lopdf::{Document, ObjectId};
use std::fs;
use std::path::Path;
use tracing::debug;

pub mod appearance;
pub mod writer;

pub use writer::LopdfAnnotationWriter;

/// Fallback when a page has no usable MediaBox (US Letter)
const DEFAULT_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

/// Inheritance chains deeper than this are treated as malformed
const MAX_PARENT_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl From<PageSize> for PageViewport {
    fn from(size: PageSize) -> Self {
        PageViewport { width: size.width_pt, height: size.height_pt }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<PdfEngineError> for RenderError {
    fn from(err: PdfEngineError) -> Self {
        match err {
            PdfEngineError::PageOutOfRange { page, page_count } => {
                RenderError::PageOutOfRange { page, page_count }
            }
            other => RenderError::Backend(other.to_string()),
        }
    }
}

pub(crate) fn reject_encrypted(bytes: &[u8]) -> Result<(), PdfEngineError> {
    if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err(PdfEngineError::EncryptedUnsupported);
    }
    Ok(())
}

pub(crate) fn load_document(bytes: &[u8]) -> Result<Document, PdfEngineError> {
    reject_encrypted(bytes)?;
    Ok(Document::load_mem(bytes)?)
}

/// Page object ids in page order
pub(crate) fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

fn media_box(doc: &Document, page_id: ObjectId) -> Option<PageSize> {
    let mut current = page_id;
    for _ in 0..MAX_PARENT_DEPTH {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(array) = dict.get(b"MediaBox").and_then(|obj| obj.as_array()) {
            if array.len() != 4 {
                return None;
            }
            let x0 = array[0].as_float().ok()?;
            let y0 = array[1].as_float().ok()?;
            let x1 = array[2].as_float().ok()?;
            let y1 = array[3].as_float().ok()?;
            return Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() });
        }
        // MediaBox is inheritable from the page tree
        current = dict.get(b"Parent").and_then(|obj| obj.as_reference()).ok()?;
    }
    None
}

fn parse_sizes(doc: &Document) -> Result<Vec<PageSize>, PdfEngineError> {
    let sizes: Vec<PageSize> = page_ids(doc)
        .into_iter()
        .map(|id| media_box(doc, id).unwrap_or(DEFAULT_PAGE_SIZE))
        .collect();

    if sizes.is_empty() {
        return Err(PdfEngineError::Backend("document has no pages".to_owned()));
    }

    Ok(sizes)
}

/// Page geometry of a PDF, rendered as blank paper
///
/// The pure-Rust backend parses page sizes with lopdf but does not
/// rasterize content; pages come back white with a light border so the
/// annotation overlay has something to sit on. Build with the `pdfium`
/// feature for real page content.
#[derive(Debug, Clone)]
pub struct LopdfDocument {
    page_sizes: Vec<PageSize>,
}

impl LopdfDocument {
    pub fn open(path: &Path) -> Result<Self, PdfEngineError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfEngineError> {
        let doc = load_document(bytes)?;
        let page_sizes = parse_sizes(&doc)?;
        debug!(pages = page_sizes.len(), "parsed PDF page tree");
        Ok(Self { page_sizes })
    }

    pub fn page_size(&self, page: u32) -> Result<PageSize, PdfEngineError> {
        self.page_sizes.get(page as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page,
            page_count: self.page_sizes.len() as u32,
        })
    }

    pub fn page_sizes(&self) -> &[PageSize] {
        &self.page_sizes
    }
}

impl DocumentRenderer for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    fn render_page(&self, page: u32, scale: f32) -> Result<PageImage, RenderError> {
        let viewport = PageViewport::from(self.page_size(page)?);
        let (width, height) = raster_size(viewport, scale)?;

        let mut raster = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                raster.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                raster.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                raster.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                raster.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        Ok(PageImage { raster, viewport })
    }
}

#[cfg(feature = "pdfium")]
pub mod pdfium_backend {
    use super::*;
    use pdfium_render::prelude::*;

    /// Renders real page content through a system pdfium library
    pub struct PdfiumDocument {
        pdfium: Pdfium,
        bytes: Vec<u8>,
        geometry: LopdfDocument,
    }

    impl PdfiumDocument {
        pub fn open(path: &Path) -> Result<Self, PdfEngineError> {
            let bytes = fs::read(path)?;
            let geometry = LopdfDocument::from_bytes(&bytes)?;
            let bindings = Pdfium::bind_to_system_library().map_err(|err| {
                PdfEngineError::Backend(format!("failed to bind pdfium system library: {err}"))
            })?;

            Ok(Self { pdfium: Pdfium::new(bindings), bytes, geometry })
        }

        fn render(&self, page: u32, scale: f32) -> Result<PageImage, PdfEngineError> {
            let viewport = PageViewport::from(self.geometry.page_size(page)?);
            let (width, height) = raster_size(viewport, scale)
                .map_err(|err| PdfEngineError::Backend(err.to_string()))?;

            let document = self
                .pdfium
                .load_pdf_from_byte_slice(&self.bytes, None)
                .map_err(|err| PdfEngineError::Backend(err.to_string()))?;
            let pdf_page = document
                .pages()
                .get(page as PdfPageIndex)
                .map_err(|err| PdfEngineError::Backend(err.to_string()))?;
            let config = PdfRenderConfig::new()
                .set_target_width(width as i32)
                .set_maximum_height(height as i32);
            let bitmap = pdf_page
                .render_with_config(&config)
                .map_err(|err| PdfEngineError::Backend(err.to_string()))?;

            let raster = RgbaImage::from_raw(
                bitmap.width() as u32,
                bitmap.height() as u32,
                bitmap.as_rgba_bytes(),
            )
            .ok_or_else(|| PdfEngineError::Backend("pdfium returned a short bitmap".to_owned()))?;

            Ok(PageImage { raster, viewport })
        }
    }

    impl DocumentRenderer for PdfiumDocument {
        fn page_count(&self) -> u32 {
            self.geometry.page_count()
        }

        fn render_page(&self, page: u32, scale: f32) -> Result<PageImage, RenderError> {
            Ok(self.render(page, scale)?)
        }
    }
}

/// Open `path` with the best available backend
#[cfg(feature = "pdfium")]
pub fn open_renderer(path: &Path) -> Result<Box<dyn DocumentRenderer>, PdfEngineError> {
    match pdfium_backend::PdfiumDocument::open(path) {
        Ok(document) => Ok(Box::new(document)),
        Err(PdfEngineError::Backend(message)) => {
            tracing::warn!(%message, "pdfium unavailable, falling back to lopdf");
            Ok(Box::new(LopdfDocument::open(path)?))
        }
        Err(err) => Err(err),
    }
}

/// Open `path` with the best available backend
#[cfg(not(feature = "pdfium"))]
pub fn open_renderer(path: &Path) -> Result<Box<dyn DocumentRenderer>, PdfEngineError> {
    Ok(Box::new(LopdfDocument::open(path)?))
}
