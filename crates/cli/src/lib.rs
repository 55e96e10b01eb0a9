use annotator_core::{
    AnnotationEngine, AnnotationType, CanvasPoint, CsvExportConfig, DocRect, DocumentRenderer,
    EngineConfig, PageView, PointerButton, Scene, TextPrompt, ToolEvent, ToolOutcome,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_engine::{open_renderer, LopdfAnnotationWriter, LopdfDocument};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "annotator=info,annotator_core=info,pdf_engine=info";

#[derive(Debug, Parser)]
#[command(name = "annotator")]
#[command(about = "PDF annotation engine CLI")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Replay a gesture script against a PDF.
    Annotate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        script: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
        #[arg(long)]
        out_pdf: Option<PathBuf>,
        #[arg(long)]
        out_scene: Option<PathBuf>,
        #[arg(long)]
        out_png: Option<PathBuf>,
    },
    /// Write the annotations of a scene into a copy of the PDF.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        scene: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Render one page with its annotations to PNG.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        scene: PathBuf,
        /// 1-based page; defaults to the page stored in the scene.
        #[arg(long)]
        page: Option<u32>,
        /// Defaults to the scale stored in the scene.
        #[arg(long)]
        scale: Option<f32>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Print the annotations of a scene as CSV.
    List {
        #[arg(long)]
        scene: PathBuf,
        /// 1-based page filter.
        #[arg(long)]
        page: Option<u32>,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: Option<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct AnnotateOutput {
    annotations: usize,
    committed: usize,
    /// 1-based pages that carry annotations
    pages: Vec<u32>,
}

/// One step of a gesture script, in canvas pixels
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    Goto {
        page: u32,
        #[serde(default)]
        scale: Option<f32>,
    },
    Select {
        #[serde(default)]
        tool: Option<AnnotationType>,
    },
    Down {
        x: f32,
        y: f32,
        #[serde(default)]
        button: Button,
    },
    Move {
        x: f32,
        y: f32,
    },
    Up {
        x: f32,
        y: f32,
    },
    Complete,
    /// Answer for the next FreeText prompt
    Text {
        value: String,
    },
    Clear,
    RemoveAt {
        x: f32,
        y: f32,
    },
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Button {
    #[default]
    Primary,
    Secondary,
}

impl From<Button> for PointerButton {
    fn from(button: Button) -> Self {
        match button {
            Button::Primary => PointerButton::Primary,
            Button::Secondary => PointerButton::Secondary,
        }
    }
}

/// FreeText answers queued by `text` steps
#[derive(Debug, Default)]
struct ScriptPrompt {
    pending: Option<String>,
}

impl TextPrompt for ScriptPrompt {
    fn request_text(&mut self, rect: &DocRect) -> Option<String> {
        let text = self.pending.take();
        debug!(?rect, answered = text.is_some(), "text prompt");
        text
    }
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing();

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Annotate { file, script, config, scale, out_pdf, out_scene, out_png } => {
            run_annotate(
                &file,
                &script,
                config.as_deref(),
                scale,
                Outputs {
                    pdf: out_pdf.as_deref(),
                    scene: out_scene.as_deref(),
                    png: out_png.as_deref(),
                },
            )
        }
        Commands::Export { file, scene, out } => run_export(&file, &scene, &out),
        Commands::Render { file, scene, page, scale, config, out } => {
            run_render(&file, &scene, page, scale, config.as_deref(), &out)
        }
        Commands::List { scene, page, delimiter } => run_list(&scene, page, delimiter),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // A subscriber may already be installed when `run` is called twice in-process
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let document = LopdfDocument::open(file).context("failed to open PDF")?;

    let page_count = document.page_count();
    let first_page_size_pt = document
        .page_sizes()
        .first()
        .map(|size| PageSizeOutput { width: size.width_pt, height: size.height_pt });

    let payload = InfoOutput { path: file.display().to_string(), page_count, first_page_size_pt };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

struct Outputs<'a> {
    pdf: Option<&'a Path>,
    scene: Option<&'a Path>,
    png: Option<&'a Path>,
}

fn run_annotate(
    file: &Path,
    script: &Path,
    config: Option<&Path>,
    scale: f32,
    outputs: Outputs<'_>,
) -> Result<()> {
    ensure_pdf_exists(file)?;

    let steps = read_script(script)?;
    let renderer = open_renderer(file).context("failed to open PDF")?;
    let mut engine = AnnotationEngine::new(load_config(config)?);

    load_page(&mut engine, renderer.as_ref(), 0, scale)?;

    let mut prompt = ScriptPrompt::default();
    let mut committed = 0;
    for (index, step) in steps.into_iter().enumerate() {
        let outcome = apply_step(&mut engine, renderer.as_ref(), &mut prompt, step, scale)
            .with_context(|| format!("script step {} failed", index + 1))?;
        if matches!(outcome, Some(ToolOutcome::Committed(_))) {
            committed += 1;
        }
    }

    if let Some(path) = outputs.pdf {
        let mut writer = LopdfAnnotationWriter::open(file).context("failed to open PDF")?;
        prepare_output(path)?;
        engine
            .export_document(&mut writer, path)
            .with_context(|| format!("failed to write annotated PDF to {}", path.display()))?;
    }

    if let Some(path) = outputs.scene {
        prepare_output(path)?;
        engine
            .export_scene(path)
            .with_context(|| format!("failed to write scene to {}", path.display()))?;
    }

    if let Some(path) = outputs.png {
        prepare_output(path)?;
        engine
            .export_png(path)
            .with_context(|| format!("failed to write image to {}", path.display()))?;
    }

    let pages: BTreeSet<u32> = engine.store().all().iter().map(|a| a.page() + 1).collect();
    let payload = AnnotateOutput {
        annotations: engine.store().len(),
        committed,
        pages: pages.into_iter().collect(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

fn apply_step(
    engine: &mut AnnotationEngine,
    renderer: &dyn DocumentRenderer,
    prompt: &mut ScriptPrompt,
    step: Step,
    default_scale: f32,
) -> Result<Option<ToolOutcome>> {
    debug!(?step, "script step");
    let event = match step {
        Step::Goto { page, scale } => {
            let target = PageView::clamp_page(i64::from(page) - 1, renderer.page_count())
                .context("document has no pages")?;
            load_page(engine, renderer, target, scale.unwrap_or(default_scale))?;
            return Ok(None);
        }
        Step::Select { tool } => {
            engine.select_tool(tool);
            return Ok(None);
        }
        Step::Text { value } => {
            prompt.pending = Some(value);
            return Ok(None);
        }
        Step::Clear => {
            engine.clear_annotations();
            return Ok(None);
        }
        Step::RemoveAt { x, y } => {
            if let Some(removed) = engine.remove_at(CanvasPoint::new(x, y)) {
                info!(id = %removed.id(), "annotation removed");
            }
            return Ok(None);
        }
        Step::Down { x, y, button } => {
            ToolEvent::PointerDown { pos: CanvasPoint::new(x, y), button: button.into() }
        }
        Step::Move { x, y } => ToolEvent::PointerMove { pos: CanvasPoint::new(x, y) },
        Step::Up { x, y } => ToolEvent::PointerUp { pos: CanvasPoint::new(x, y) },
        Step::Complete => ToolEvent::Complete,
    };

    Ok(Some(engine.handle_event(event, prompt)?))
}

fn run_export(file: &Path, scene: &Path, out: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let scene = read_scene(scene)?;
    let mut engine = AnnotationEngine::new(load_config(None)?);
    engine.import_scene(scene).context("scene holds invalid annotations")?;

    let mut writer = LopdfAnnotationWriter::open(file).context("failed to open PDF")?;
    prepare_output(out)?;
    let summary = engine
        .export_document(&mut writer, out)
        .with_context(|| format!("failed to write annotated PDF to {}", out.display()))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn run_render(
    file: &Path,
    scene: &Path,
    page: Option<u32>,
    scale: Option<f32>,
    config: Option<&Path>,
    out: &Path,
) -> Result<()> {
    ensure_pdf_exists(file)?;

    let scene = read_scene(scene)?;
    let renderer = open_renderer(file).context("failed to open PDF")?;

    let page_index = match page {
        Some(0) => anyhow::bail!("--page is 1-based and must be >= 1"),
        Some(page) => page - 1,
        None => scene.view.page,
    };
    let page_count = renderer.page_count();
    if page_index >= page_count {
        anyhow::bail!("page {} out of range (page_count={page_count})", page_index + 1);
    }
    let scale = scale.unwrap_or(scene.view.scale);

    let mut engine = AnnotationEngine::new(load_config(config)?);
    engine.import_scene(scene).context("scene holds invalid annotations")?;
    load_page(&mut engine, renderer.as_ref(), page_index, scale)?;

    prepare_output(out)?;
    engine
        .export_png(out)
        .with_context(|| format!("failed to write image to {}", out.display()))?;

    println!("{}", out.display());

    Ok(())
}

fn run_list(scene: &Path, page: Option<u32>, delimiter: char) -> Result<()> {
    if !delimiter.is_ascii() {
        anyhow::bail!("--delimiter must be a single ASCII character");
    }
    let page_filter = match page {
        Some(0) => anyhow::bail!("--page is 1-based and must be >= 1"),
        Some(page) => Some(vec![page - 1]),
        None => None,
    };

    let scene = read_scene(scene)?;
    let mut engine = AnnotationEngine::new(load_config(None)?);
    engine.import_scene(scene).context("scene holds invalid annotations")?;

    let config = CsvExportConfig { delimiter: delimiter as u8, page_filter, ..Default::default() };
    let rows = engine
        .export_csv(std::io::stdout().lock(), &config)
        .context("failed to write annotation list")?;
    debug!(rows, "annotation list written");

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    config.with_env().context("invalid configuration in environment")
}

fn load_page(
    engine: &mut AnnotationEngine,
    renderer: &dyn DocumentRenderer,
    page: u32,
    scale: f32,
) -> Result<()> {
    engine
        .load_page(renderer, page, scale)
        .with_context(|| format!("failed to load page {}", page + 1))?;
    Ok(())
}

fn read_script(path: &Path) -> Result<Vec<Step>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("invalid script {}", path.display()))
}

fn read_scene(path: &Path) -> Result<Scene> {
    Scene::read(path).with_context(|| format!("failed to read scene {}", path.display()))
}

fn prepare_output(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
