//! CSV annotation list
//!
//! A flat, one-row-per-annotation listing for review and reporting. This is
//! not a reload format; use the scene JSON for that.

use std::io::Write;

use crate::annotation::{Annotation, Color, DocPoint};

#[derive(Debug, thiserror::Error)]
pub enum CsvExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),
}

pub type CsvExportResult<T> = Result<T, CsvExportError>;

/// Configuration for CSV export
#[derive(Debug, Clone)]
pub struct CsvExportConfig {
    /// Include column headers in the output
    pub include_headers: bool,

    /// CSV delimiter character
    pub delimiter: u8,

    /// Export only annotations from these pages (None = all pages)
    pub page_filter: Option<Vec<u32>>,
}

impl Default for CsvExportConfig {
    fn default() -> Self {
        Self {
            include_headers: true,
            delimiter: b',',
            page_filter: None,
        }
    }
}

/// Export annotations to CSV
///
/// Columns: ID, Page (0-based), Type, Author, Contents, Color (hex),
/// X0, Y0, X1, Y1, Vertices. Rows keep the order of `annotations`.
pub fn export_annotations_csv<W: Write>(
    writer: W,
    annotations: &[&Annotation],
    config: &CsvExportConfig,
) -> CsvExportResult<usize> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(config.include_headers)
        .from_writer(writer);

    if config.include_headers {
        csv_writer.write_record([
            "ID", "Page", "Type", "Author", "Contents", "Color", "X0", "Y0", "X1", "Y1",
            "Vertices",
        ])?;
    }

    let mut rows = 0;
    for annotation in annotations.iter().filter(|a| {
        config
            .page_filter
            .as_ref()
            .map_or(true, |pages| pages.contains(&a.page()))
    }) {
        let rect = annotation.rect();
        csv_writer.write_record(&[
            annotation.id().to_string(),
            annotation.page().to_string(),
            annotation.kind().to_string(),
            annotation.author().to_string(),
            annotation.contents().unwrap_or("").to_string(),
            color_to_hex(&annotation.color()),
            rect.x0.to_string(),
            rect.y0.to_string(),
            rect.x1.to_string(),
            rect.y1.to_string(),
            format_vertices(annotation.vertices()),
        ])?;
        rows += 1;
    }

    csv_writer.flush()?;
    Ok(rows)
}

fn color_to_hex(color: &Color) -> String {
    format!("#{:02X}{:02X}{:02X}", color.r, color.g, color.b)
}

fn format_vertices(vertices: &[DocPoint]) -> String {
    vertices
        .iter()
        .map(|p| format!("({:.2},{:.2})", p.x, p.y))
        .collect::<Vec<_>>()
        .join(";")
}
