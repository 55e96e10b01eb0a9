//! Persistence adapter
//!
//! Translates stored annotations into calls against an
//! [`AnnotationExporter`], one creation call per record, then asks the
//! exporter to write the result. The store is only read; a failed export
//! never rolls back committed annotations.

use std::path::Path;

use tracing::{info, warn};

use crate::annotation::{Annotation, AnnotationType, Color, DocPoint};
use crate::error::ExportError;
use crate::store::AnnotationStore;

/// Arguments of a single creation call, all in document space
#[derive(Debug, Clone, PartialEq)]
pub struct CreateAnnotation {
    /// Zero-based page index
    pub page: u32,
    /// `[x0, y0, x1, y1]`, normalized
    pub rect: [f32; 4],
    /// Present for Polygon and Ink only
    pub vertices: Option<Vec<DocPoint>>,
    pub contents: String,
    pub author: String,
    pub color: Color,
}

impl From<&Annotation> for CreateAnnotation {
    fn from(annotation: &Annotation) -> Self {
        let vertices = (!annotation.vertices().is_empty()).then(|| annotation.vertices().to_vec());
        Self {
            page: annotation.page(),
            rect: annotation.rect().to_array(),
            vertices,
            contents: annotation
                .contents()
                .map(str::to_string)
                .unwrap_or_else(|| annotation.kind().default_contents()),
            author: annotation.author().to_string(),
            color: annotation.color(),
        }
    }
}

/// Export collaborator; one creation call per annotation type
pub trait AnnotationExporter {
    fn create_text_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError>;
    fn create_highlight_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError>;
    fn create_underline_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError>;
    fn create_square_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError>;
    fn create_circle_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError>;
    fn create_free_text_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError>;
    fn create_strike_out_annotation(&mut self, args: &CreateAnnotation)
        -> Result<(), ExportError>;
    fn create_polygon_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError>;
    fn create_ink_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError>;

    /// Serialize everything created so far into `filename`
    fn download(&mut self, filename: &Path) -> Result<(), ExportError>;
}

/// Outcome of a successful export
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ExportSummary {
    pub annotations: usize,
    pub pages: Vec<u32>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PersistenceAdapter;

impl PersistenceAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Forward one record to the matching creation call
    pub fn forward(
        &self,
        annotation: &Annotation,
        exporter: &mut dyn AnnotationExporter,
    ) -> Result<(), ExportError> {
        let args = CreateAnnotation::from(annotation);
        match annotation.kind() {
            AnnotationType::Text => exporter.create_text_annotation(&args),
            AnnotationType::Highlight => exporter.create_highlight_annotation(&args),
            AnnotationType::Underline => exporter.create_underline_annotation(&args),
            AnnotationType::Square => exporter.create_square_annotation(&args),
            AnnotationType::Circle => exporter.create_circle_annotation(&args),
            AnnotationType::FreeText => exporter.create_free_text_annotation(&args),
            AnnotationType::StrikeOut => exporter.create_strike_out_annotation(&args),
            AnnotationType::Polygon => exporter.create_polygon_annotation(&args),
            AnnotationType::Ink => exporter.create_ink_annotation(&args),
        }
    }

    /// Export every stored annotation, in insertion order, then download
    ///
    /// # Errors
    ///
    /// Stops at the first exporter failure and returns it unchanged.
    pub fn export(
        &self,
        store: &AnnotationStore,
        exporter: &mut dyn AnnotationExporter,
        filename: &Path,
    ) -> Result<ExportSummary, ExportError> {
        let annotations = store.all();
        let mut pages: Vec<u32> = Vec::new();

        for annotation in &annotations {
            if let Err(err) = self.forward(annotation, exporter) {
                warn!(id = %annotation.id(), kind = %annotation.kind(), %err, "export call failed");
                return Err(err);
            }
            if !pages.contains(&annotation.page()) {
                pages.push(annotation.page());
            }
        }

        exporter.download(filename).inspect_err(|err| {
            warn!(path = %filename.display(), %err, "download failed");
        })?;

        pages.sort_unstable();
        info!(
            path = %filename.display(),
            annotations = annotations.len(),
            "annotations exported"
        );
        Ok(ExportSummary {
            annotations: annotations.len(),
            pages,
        })
    }
}
