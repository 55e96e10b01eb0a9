//! Annotation engine core
//!
//! Per-page annotation records, canvas/document coordinate mapping, the
//! gesture state machine that creates records, and the layered renderer
//! that keeps the overlay in sync with page navigation.

pub mod annotation;
pub mod config;
pub mod coords;
pub mod csv_export;
pub mod document;
pub mod engine;
pub mod error;
pub mod export;
pub mod page_view;
pub mod render;
pub mod scene;
pub mod store;
pub mod style;
pub mod text_layout;
pub mod tool;

pub use annotation::{
    Annotation, AnnotationId, AnnotationType, CanvasPoint, Color, DocPoint, DocRect,
};
pub use config::{ConfigError, EngineConfig};
pub use coords::{CanvasRect, CoordinateMapper};
pub use csv_export::{export_annotations_csv, CsvExportConfig, CsvExportError};
pub use document::{raster_size, DocumentRenderer, PageImage, PageViewport, MAX_RASTER_BYTES};
pub use engine::{AnnotationEngine, LoadOutcome};
pub use error::{
    AnnotationError, EngineError, EngineResult, ExportError, GeometryError, RenderError,
};
pub use export::{AnnotationExporter, CreateAnnotation, ExportSummary, PersistenceAdapter};
pub use page_view::{PageView, RenderTicket};
pub use render::{DrawStyle, RenderPipeline, RenderStatus};
pub use scene::{Scene, SceneView, SCENE_VERSION};
pub use store::AnnotationStore;
pub use style::{default_color, tool_style, DrawRule, GestureKind, ToolStyle};
pub use tool::{
    GestureContext, NoPrompt, PointerButton, Preview, PreviewShape, TextPrompt, ToolEvent,
    ToolOutcome, ToolState, ToolStateMachine,
};
