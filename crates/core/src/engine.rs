//! Annotation engine facade
//!
//! Wires the tool state machine, annotation store, page view and render
//! pipeline together and owns all of them. Every method runs to completion
//! before the next event is processed; the only out-of-band step is a page
//! render, modelled as [`AnnotationEngine::begin_page_load`] followed later by
//! [`AnnotationEngine::finish_page_load`].

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::annotation::{Annotation, AnnotationId, AnnotationType, CanvasPoint};
use crate::config::EngineConfig;
use crate::coords::CoordinateMapper;
use crate::csv_export::{export_annotations_csv, CsvExportConfig};
use crate::document::{DocumentRenderer, PageImage, PageViewport};
use crate::error::{EngineError, EngineResult, GeometryError, RenderError};
use crate::export::{AnnotationExporter, ExportSummary, PersistenceAdapter};
use crate::page_view::{PageView, RenderTicket};
use crate::render::{DrawStyle, RenderPipeline, RenderStatus};
use crate::scene::{Scene, SceneView};
use crate::store::AnnotationStore;
use crate::tool::{GestureContext, TextPrompt, ToolEvent, ToolOutcome, ToolState, ToolStateMachine};

/// Hit radius for delete-under-cursor, in canvas pixels
const HIT_TOLERANCE_PX: f32 = 3.0;

/// What happened to a settled page render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Presented { page: u32 },
    /// The result belonged to a superseded request and was dropped
    Stale,
}

pub struct AnnotationEngine {
    config: EngineConfig,
    store: AnnotationStore,
    tools: ToolStateMachine,
    view: PageView,
    pipeline: RenderPipeline,
    viewport: Option<PageViewport>,
    adapter: PersistenceAdapter,
}

impl Default for AnnotationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl AnnotationEngine {
    pub fn new(config: EngineConfig) -> Self {
        let pipeline = RenderPipeline::new(DrawStyle::from(&config), config.preview_opacity);
        let tools = ToolStateMachine::new().with_ink_spacing(config.ink_min_spacing);
        Self {
            config,
            store: AnnotationStore::new(),
            tools,
            view: PageView::new(),
            pipeline,
            viewport: None,
            adapter: PersistenceAdapter::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn view(&self) -> &PageView {
        &self.view
    }

    pub fn render_status(&self) -> &RenderStatus {
        self.pipeline.status()
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    pub fn tool_state(&self) -> ToolState {
        self.tools.state()
    }

    pub fn selected_tool(&self) -> Option<AnnotationType> {
        self.tools.selected_tool()
    }

    /// Viewport of the presented page
    pub fn viewport(&self) -> Option<PageViewport> {
        self.viewport
    }

    /// Start loading `page` at `scale`
    ///
    /// Any in-progress gesture is dropped and earlier pending renders become
    /// stale. The canvas keeps showing the previous page until the result is
    /// handed to [`Self::finish_page_load`].
    pub fn begin_page_load(&mut self, page: u32, scale: f32) -> EngineResult<RenderTicket> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(GeometryError::InvalidScale(scale).into());
        }
        self.tools.cancel();
        self.pipeline.redraw_preview(None);
        self.pipeline.mark_loading(page);
        let ticket = self.view.begin_load(page, scale);
        debug!(page, scale, generation = ticket.generation, "page load requested");
        Ok(ticket)
    }

    /// Settle a page render
    ///
    /// Results for superseded tickets are dropped without touching the
    /// canvas. A failed render leaves the previous layers in place.
    pub fn finish_page_load(
        &mut self,
        ticket: RenderTicket,
        result: Result<PageImage, RenderError>,
    ) -> EngineResult<LoadOutcome> {
        if !self.view.accept(&ticket) {
            warn!(
                page = ticket.page,
                generation = ticket.generation,
                current = self.view.current_page(),
                "discarding stale page render"
            );
            return Ok(LoadOutcome::Stale);
        }

        let page = ticket.page;
        let image = match result {
            Ok(image) => image,
            Err(err) => return Err(self.fail_load(page, err.to_string())),
        };

        let mapper = match CoordinateMapper::new(ticket.scale, image.viewport.height) {
            Ok(mapper) => mapper,
            Err(err) => return Err(self.fail_load(page, err.to_string())),
        };

        let annotations = self.store.by_page(page);
        if let Err(err) = self
            .pipeline
            .present_page(page, &image, mapper, &annotations)
        {
            self.pipeline.mark_failed(page, err.to_string());
            return Err(err);
        }
        self.viewport = Some(image.viewport);
        info!(page, scale = ticket.scale, annotations = annotations.len(), "page presented");
        Ok(LoadOutcome::Presented { page })
    }

    fn fail_load(&mut self, page: u32, message: String) -> EngineError {
        self.pipeline.mark_failed(page, message.clone());
        EngineError::PageLoad { page, message }
    }

    /// Render synchronously through `renderer`
    pub fn load_page(
        &mut self,
        renderer: &dyn DocumentRenderer,
        page: u32,
        scale: f32,
    ) -> EngineResult<LoadOutcome> {
        let ticket = self.begin_page_load(page, scale)?;
        let result = renderer.render_page(page, scale);
        self.finish_page_load(ticket, result)
    }

    /// Select a tool, dropping any in-progress gesture
    pub fn select_tool(&mut self, tool: Option<AnnotationType>) {
        if self.tools.select_tool(tool) == ToolOutcome::Discarded {
            self.pipeline.redraw_preview(None);
        }
    }

    /// Mapper and page for pointer input, if the current page is on screen
    fn input_target(&self) -> Option<(CoordinateMapper, u32)> {
        if self.view.is_loading() {
            return None;
        }
        let page = self.pipeline.presented_page()?;
        if page != self.view.current_page() {
            return None;
        }
        Some((self.pipeline.mapper()?, page))
    }

    /// Dispatch one pointer event
    ///
    /// Input is ignored while a page render is pending or when the current
    /// page failed to load.
    pub fn handle_event(
        &mut self,
        event: ToolEvent,
        prompt: &mut dyn TextPrompt,
    ) -> EngineResult<ToolOutcome> {
        let Some((mapper, page)) = self.input_target() else {
            debug!(?event, "pointer input ignored, page not ready");
            return Ok(ToolOutcome::Ignored);
        };

        let ctx = GestureContext {
            mapper: &mapper,
            page,
            author: &self.config.author,
        };
        let outcome = self.tools.handle(event, &ctx, prompt);

        match &outcome {
            ToolOutcome::PreviewChanged => {
                let preview = self.tools.preview();
                self.pipeline.redraw_preview(preview.as_ref());
            }
            ToolOutcome::Committed(annotation) => {
                self.pipeline.redraw_preview(None);
                let id = self.store.add(annotation.clone())?;
                info!(%id, kind = %annotation.kind(), page, "annotation committed");
                self.redraw_annotations();
            }
            ToolOutcome::Discarded => self.pipeline.redraw_preview(None),
            ToolOutcome::Ignored => {}
        }
        Ok(outcome)
    }

    /// Add a record directly, bypassing the tools
    pub fn add_annotation(&mut self, annotation: Annotation) -> EngineResult<AnnotationId> {
        let id = self.store.add(annotation)?;
        self.redraw_annotations();
        Ok(id)
    }

    /// Remove a record; unknown ids are a no-op
    pub fn remove_annotation(&mut self, id: AnnotationId) -> Option<Annotation> {
        let removed = self.store.remove_by_id(id)?;
        debug!(%id, "annotation removed");
        self.redraw_annotations();
        Some(removed)
    }

    /// Remove the topmost annotation under a canvas point on the current page
    pub fn remove_at(&mut self, pos: CanvasPoint) -> Option<Annotation> {
        let (mapper, page) = self.input_target()?;
        let point = mapper.canvas_to_document(pos);
        let id = self
            .store
            .hit_test(page, &point, HIT_TOLERANCE_PX / mapper.scale())?
            .id();
        self.remove_annotation(id)
    }

    /// Remove every annotation on every page
    pub fn clear_annotations(&mut self) {
        let count = self.store.len();
        self.store.clear();
        info!(count, "annotations cleared");
        self.redraw_annotations();
    }

    fn redraw_annotations(&mut self) {
        let Some(page) = self.pipeline.presented_page() else {
            return;
        };
        let annotations = self.store.by_page(page);
        self.pipeline.redraw_annotations(&annotations);
    }

    /// Hand every annotation to `exporter`, then download to `filename`
    ///
    /// Committed annotations are kept whatever the outcome.
    pub fn export_document(
        &self,
        exporter: &mut dyn AnnotationExporter,
        filename: &Path,
    ) -> EngineResult<ExportSummary> {
        Ok(self.adapter.export(&self.store, exporter, filename)?)
    }

    pub fn scene(&self) -> Scene {
        let view = SceneView {
            page: self.view.current_page(),
            scale: self.view.scale(),
            viewport: self.viewport,
        };
        Scene::from_store(&self.store, view)
    }

    pub fn export_scene(&self, path: &Path) -> EngineResult<()> {
        self.scene().write(path)?;
        info!(path = %path.display(), annotations = self.store.len(), "scene exported");
        Ok(())
    }

    /// Replace the store with the records of `scene`
    ///
    /// Nothing changes unless every record is valid.
    pub fn import_scene(&mut self, scene: Scene) -> EngineResult<usize> {
        let count = scene.annotations.len();
        self.store.replace_all(scene.annotations)?;
        self.tools.cancel();
        self.pipeline.redraw_preview(None);
        self.redraw_annotations();
        info!(count, "scene imported");
        Ok(count)
    }

    /// Flattened PNG of the current canvas
    pub fn snapshot_png(&self) -> EngineResult<Vec<u8>> {
        self.pipeline.snapshot_png()
    }

    pub fn export_png(&self, path: &Path) -> EngineResult<()> {
        let png = self.snapshot_png()?;
        fs::write(path, png)?;
        info!(path = %path.display(), "canvas snapshot written");
        Ok(())
    }

    /// CSV list of the stored annotations, returning the row count
    pub fn export_csv<W: std::io::Write>(
        &self,
        writer: W,
        config: &CsvExportConfig,
    ) -> EngineResult<usize> {
        Ok(export_annotations_csv(writer, &self.store.all(), config)?)
    }
}
