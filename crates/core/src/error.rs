//! Error taxonomy for the annotation engine
//!
//! Every failure is scoped to the operation that produced it. Nothing here is
//! fatal to the host process and no variant implies that prior state changed.

use crate::annotation::{AnnotationId, AnnotationType};

/// Invalid geometry configuration or input
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("scale must be a finite value greater than zero (got {0})")]
    InvalidScale(f32),

    #[error("viewport height must be finite and non-negative (got {0})")]
    InvalidViewport(f32),

    #[error("coordinate ({x}, {y}) is not finite")]
    NonFinite { x: f32, y: f32 },
}

/// A record that would violate the stored-annotation invariants
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnnotationError {
    #[error("annotation {0} already exists")]
    DuplicateId(AnnotationId),

    #[error("rect [{0}, {1}, {2}, {3}] is not normalized")]
    UnnormalizedRect(f32, f32, f32, f32),

    #[error("{kind} needs at least {required} points (got {actual})")]
    TooFewPoints {
        kind: AnnotationType,
        required: usize,
        actual: usize,
    },

    #[error("{0} annotations do not carry vertices")]
    UnexpectedVertices(AnnotationType),

    #[error("free text annotations require non-empty contents")]
    MissingContents,

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Failure reported by the document rendering collaborator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("backend error: {0}")]
    Backend(String),
}

/// Failure reported by the persistence/export collaborator
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by [`crate::AnnotationEngine`]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to load page {page}: {message}")]
    PageLoad { page: u32, message: String },

    #[error("no page is currently loaded")]
    NoPageLoaded,

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("invalid annotation: {0}")]
    InvalidAnnotation(#[from] AnnotationError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    #[error("scene serialization error: {0}")]
    Scene(#[from] serde_json::Error),

    #[error("unsupported scene version {0}")]
    UnsupportedSceneVersion(u32),

    #[error("CSV export error: {0}")]
    Csv(#[from] crate::csv_export::CsvExportError),

    #[error("image encoding error: {0}")]
    Image(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
