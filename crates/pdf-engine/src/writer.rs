//! Annotation export into an existing PDF
//!
//! Each creation call appends one `/Annot` dictionary, with a generated
//! normal appearance, to the target page's `/Annots` array. Nothing touches
//! disk until [`AnnotationExporter::download`].

use std::fmt::Display;
use std::fs;
use std::path::Path;

use annotator_core::{AnnotationExporter, AnnotationType, CreateAnnotation, DocPoint, ExportError};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::{debug, info};

use crate::appearance::{self, ALPHA_STATE, FONT, FREE_TEXT_FONT_SIZE};
use crate::{load_document, page_ids, PdfEngineError};

/// Annotation flag bit 3: print the annotation with the page
const FLAG_PRINT: i64 = 4;

fn backend(err: impl Display) -> ExportError {
    ExportError::Backend(err.to_string())
}

fn real(value: f32) -> Object {
    Object::Real(value.into())
}

fn reals(values: impl IntoIterator<Item = f32>) -> Object {
    Object::Array(values.into_iter().map(real).collect())
}

fn flatten(points: &[DocPoint]) -> Object {
    reals(points.iter().flat_map(|p| [p.x, p.y]))
}

/// PDF text string: literal when ASCII, UTF-16BE with a byte order mark
/// otherwise
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Writes annotations into a loaded PDF
pub struct LopdfAnnotationWriter {
    doc: Document,
    pages: Vec<ObjectId>,
    written: usize,
}

impl LopdfAnnotationWriter {
    pub fn open(path: &Path) -> Result<Self, PdfEngineError> {
        let bytes = fs::read(path)?;
        Ok(Self::from_document(load_document(&bytes)?))
    }

    pub fn from_document(doc: Document) -> Self {
        let pages = page_ids(&doc);
        Self { doc, pages, written: 0 }
    }

    /// Annotations appended so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    fn page_id(&self, page: u32) -> Result<ObjectId, ExportError> {
        self.pages.get(page as usize).copied().ok_or_else(|| {
            ExportError::Backend(format!(
                "page {page} out of range (page_count={})",
                self.pages.len()
            ))
        })
    }

    fn append(
        &mut self,
        kind: AnnotationType,
        args: &CreateAnnotation,
        extra: impl FnOnce(&mut Dictionary),
    ) -> Result<(), ExportError> {
        let page_id = self.page_id(args.page)?;
        let (r, g, b) = args.color.to_normalized();

        let mut annot = dictionary! {
            "Type" => "Annot",
            "Subtype" => subtype(kind),
            "Rect" => reals(args.rect),
            "C" => reals([r, g, b]),
            "T" => text_string(&args.author),
            "Contents" => text_string(&args.contents),
            "F" => Object::Integer(FLAG_PRINT),
            "P" => page_id,
        };
        extra(&mut annot);

        if let Some(ap) = self.appearance(kind, args)? {
            annot.set("AP", dictionary! { "N" => ap });
        }

        let annot_id = self.doc.add_object(annot);
        self.attach(page_id, annot_id)?;
        self.written += 1;

        debug!(page = args.page, kind = %kind, "appended annotation");
        Ok(())
    }

    fn appearance(
        &mut self,
        kind: AnnotationType,
        args: &CreateAnnotation,
    ) -> Result<Option<ObjectId>, ExportError> {
        let Some(content) = appearance::appearance_stream(kind, args)
            .map_err(|_| ExportError::Backend("failed to format appearance stream".to_owned()))?
        else {
            return Ok(None);
        };

        let mut resources = Dictionary::new();
        if let Some(alpha) = appearance::fill_alpha(kind) {
            resources.set(
                "ExtGState",
                dictionary! {
                    ALPHA_STATE => dictionary! {
                        "Type" => "ExtGState",
                        "ca" => real(alpha),
                        "CA" => real(alpha),
                    },
                },
            );
        }
        if kind == AnnotationType::FreeText {
            resources.set(
                "Font",
                dictionary! {
                    FONT => dictionary! {
                        "Type" => "Font",
                        "Subtype" => "Type1",
                        "BaseFont" => "Helvetica",
                        "Encoding" => "WinAnsiEncoding",
                    },
                },
            );
        }

        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => reals(args.rect),
                "Resources" => resources,
            },
            content.into_bytes(),
        );
        Ok(Some(self.doc.add_object(stream)))
    }

    /// Append `annot_id` to the page's `/Annots`, which may be inline, an
    /// indirect array, or absent
    fn attach(&mut self, page_id: ObjectId, annot_id: ObjectId) -> Result<(), ExportError> {
        let existing =
            self.doc.get_dictionary(page_id).map_err(backend)?.get(b"Annots").ok().cloned();

        match existing {
            Some(Object::Reference(array_id)) => {
                self.doc
                    .get_object_mut(array_id)
                    .and_then(Object::as_array_mut)
                    .map_err(backend)?
                    .push(Object::Reference(annot_id));
            }
            Some(Object::Array(mut array)) => {
                array.push(Object::Reference(annot_id));
                self.doc.get_dictionary_mut(page_id).map_err(backend)?.set("Annots", array);
            }
            _ => {
                self.doc
                    .get_dictionary_mut(page_id)
                    .map_err(backend)?
                    .set("Annots", vec![Object::Reference(annot_id)]);
            }
        }
        Ok(())
    }
}

fn subtype(kind: AnnotationType) -> &'static str {
    match kind {
        AnnotationType::Text => "Text",
        AnnotationType::Highlight => "Highlight",
        AnnotationType::Underline => "Underline",
        AnnotationType::Square => "Square",
        AnnotationType::Circle => "Circle",
        AnnotationType::FreeText => "FreeText",
        AnnotationType::StrikeOut => "StrikeOut",
        AnnotationType::Polygon => "Polygon",
        AnnotationType::Ink => "Ink",
    }
}

/// Quadrilateral covering the whole rect, in the upper-left, upper-right,
/// lower-left, lower-right order viewers expect
fn quad_points(rect: [f32; 4]) -> Object {
    let [x0, y0, x1, y1] = rect;
    reals([x0, y1, x1, y1, x0, y0, x1, y0])
}

fn vertices_of(args: &CreateAnnotation) -> Result<&[DocPoint], ExportError> {
    args.vertices
        .as_deref()
        .ok_or_else(|| ExportError::Backend("vertex annotation without vertices".to_owned()))
}

impl AnnotationExporter for LopdfAnnotationWriter {
    fn create_text_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError> {
        self.append(AnnotationType::Text, args, |annot| {
            annot.set("Name", "Comment");
            annot.set("Open", false);
        })
    }

    fn create_highlight_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError> {
        let quads = quad_points(args.rect);
        self.append(AnnotationType::Highlight, args, |annot| {
            annot.set("QuadPoints", quads);
            annot.set("CA", real(appearance::HIGHLIGHT_ALPHA));
        })
    }

    fn create_underline_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError> {
        let quads = quad_points(args.rect);
        self.append(AnnotationType::Underline, args, |annot| annot.set("QuadPoints", quads))
    }

    fn create_square_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError> {
        self.append(AnnotationType::Square, args, |annot| {
            annot.set("BS", dictionary! { "W" => Object::Integer(2) });
        })
    }

    fn create_circle_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError> {
        self.append(AnnotationType::Circle, args, |annot| {
            annot.set("BS", dictionary! { "W" => Object::Integer(2) });
        })
    }

    fn create_free_text_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError> {
        let (r, g, b) = args.color.to_normalized();
        let da = format!("/{FONT} {FREE_TEXT_FONT_SIZE} Tf {r} {g} {b} rg");
        self.append(AnnotationType::FreeText, args, |annot| {
            annot.set("DA", Object::string_literal(da));
        })
    }

    fn create_strike_out_annotation(
        &mut self,
        args: &CreateAnnotation,
    ) -> Result<(), ExportError> {
        let quads = quad_points(args.rect);
        self.append(AnnotationType::StrikeOut, args, |annot| annot.set("QuadPoints", quads))
    }

    fn create_polygon_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError> {
        let vertices = flatten(vertices_of(args)?);
        let (r, g, b) = args.color.to_normalized();
        self.append(AnnotationType::Polygon, args, |annot| {
            annot.set("Vertices", vertices);
            annot.set("IC", reals([r, g, b]));
            annot.set("CA", real(appearance::POLYGON_ALPHA));
        })
    }

    fn create_ink_annotation(&mut self, args: &CreateAnnotation) -> Result<(), ExportError> {
        let stroke = flatten(vertices_of(args)?);
        self.append(AnnotationType::Ink, args, |annot| {
            annot.set("InkList", vec![stroke]);
            annot.set("BS", dictionary! { "W" => Object::Integer(2) });
        })
    }

    fn download(&mut self, filename: &Path) -> Result<(), ExportError> {
        self.doc.save(filename).map_err(backend)?;
        info!(path = %filename.display(), annotations = self.written, "wrote annotated PDF");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{blank_document, to_bytes};
    use annotator_core::Color;

    fn args(page: u32, rect: [f32; 4]) -> CreateAnnotation {
        CreateAnnotation {
            page,
            rect,
            vertices: None,
            contents: "Square annotation".to_string(),
            author: "User".to_string(),
            color: Color::GREEN,
        }
    }

    fn annots(doc: &Document, page: usize) -> Vec<ObjectId> {
        let page_id = page_ids(doc)[page];
        match doc.get_dictionary(page_id).unwrap().get(b"Annots") {
            Ok(Object::Array(items)) => items.iter().map(|o| o.as_reference().unwrap()).collect(),
            Ok(Object::Reference(id)) => doc
                .get_object(*id)
                .unwrap()
                .as_array()
                .unwrap()
                .iter()
                .map(|o| o.as_reference().unwrap())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn floats(obj: &Object) -> Vec<f32> {
        obj.as_array().unwrap().iter().map(|o| o.as_float().unwrap()).collect()
    }

    #[test]
    fn square_is_appended_with_appearance() {
        let mut writer = LopdfAnnotationWriter::from_document(blank_document(&[(612, 792)]));
        writer.create_square_annotation(&args(0, [100.0, 650.0, 200.0, 700.0])).unwrap();

        let doc = writer.document();
        let ids = annots(doc, 0);
        assert_eq!(ids.len(), 1);

        let annot = doc.get_dictionary(ids[0]).unwrap();
        assert_eq!(annot.get(b"Subtype").unwrap().as_name().unwrap(), b"Square");
        assert_eq!(floats(annot.get(b"Rect").unwrap()), vec![100.0, 650.0, 200.0, 700.0]);
        assert_eq!(floats(annot.get(b"C").unwrap()), vec![0.0, 1.0, 0.0]);
        assert_eq!(annot.get(b"T").unwrap().as_str().unwrap(), b"User");
        assert!(annot.get(b"AP").is_ok());
        assert_eq!(writer.written(), 1);
    }

    #[test]
    fn existing_annots_are_preserved() {
        let mut doc = blank_document(&[(612, 792)]);
        let page_id = page_ids(&doc)[0];
        let old = doc.add_object(dictionary! { "Type" => "Annot", "Subtype" => "Link" });
        let array_id = doc.add_object(vec![Object::Reference(old)]);
        doc.get_dictionary_mut(page_id).unwrap().set("Annots", array_id);

        let mut writer = LopdfAnnotationWriter::from_document(doc);
        writer.create_text_annotation(&args(0, [10.0, 10.0, 30.0, 30.0])).unwrap();

        let ids = annots(writer.document(), 0);
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], old);
    }

    #[test]
    fn markup_types_carry_quad_points() {
        let mut writer = LopdfAnnotationWriter::from_document(blank_document(&[(612, 792)]));
        writer.create_highlight_annotation(&args(0, [10.0, 20.0, 110.0, 40.0])).unwrap();

        let id = annots(writer.document(), 0)[0];
        let annot = writer.document().get_dictionary(id).unwrap();
        assert_eq!(
            floats(annot.get(b"QuadPoints").unwrap()),
            vec![10.0, 40.0, 110.0, 40.0, 10.0, 20.0, 110.0, 20.0]
        );
    }

    #[test]
    fn polygon_and_ink_store_vertices() {
        let mut writer = LopdfAnnotationWriter::from_document(blank_document(&[(612, 792)]));
        let mut polygon = args(0, [0.0, 0.0, 10.0, 10.0]);
        polygon.vertices = Some(vec![
            DocPoint::new(0.0, 0.0),
            DocPoint::new(10.0, 0.0),
            DocPoint::new(5.0, 10.0),
        ]);
        writer.create_polygon_annotation(&polygon).unwrap();
        writer.create_ink_annotation(&polygon).unwrap();

        let ids = annots(writer.document(), 0);
        let poly = writer.document().get_dictionary(ids[0]).unwrap();
        assert_eq!(floats(poly.get(b"Vertices").unwrap()), vec![0.0, 0.0, 10.0, 0.0, 5.0, 10.0]);

        let ink = writer.document().get_dictionary(ids[1]).unwrap();
        let strokes = ink.get(b"InkList").unwrap().as_array().unwrap();
        assert_eq!(strokes.len(), 1);
        assert_eq!(floats(&strokes[0]).len(), 6);
    }

    #[test]
    fn polygon_without_vertices_is_rejected() {
        let mut writer = LopdfAnnotationWriter::from_document(blank_document(&[(612, 792)]));
        let err = writer.create_polygon_annotation(&args(0, [0.0, 0.0, 10.0, 10.0])).unwrap_err();
        assert!(matches!(err, ExportError::Backend(_)));
        assert_eq!(writer.written(), 0);
    }

    #[test]
    fn out_of_range_page_is_rejected() {
        let mut writer = LopdfAnnotationWriter::from_document(blank_document(&[(612, 792)]));
        let err = writer.create_circle_annotation(&args(4, [0.0, 0.0, 10.0, 10.0])).unwrap_err();
        assert!(err.to_string().contains("page 4 out of range"));
    }

    #[test]
    fn non_ascii_contents_are_utf16() {
        match text_string("café") {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
                assert_eq!(bytes.len(), 2 + 4 * 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn download_writes_a_loadable_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.pdf");
        let target = dir.path().join("out.pdf");
        std::fs::write(&source, to_bytes(&mut blank_document(&[(612, 792), (612, 792)]))).unwrap();

        let mut writer = LopdfAnnotationWriter::open(&source).unwrap();
        let mut free_text = args(1, [50.0, 50.0, 250.0, 100.0]);
        free_text.contents = "Hello (world)".to_string();
        writer.create_free_text_annotation(&free_text).unwrap();
        writer.download(&target).unwrap();

        let reloaded = Document::load(&target).unwrap();
        assert!(annots(&reloaded, 0).is_empty());
        let ids = annots(&reloaded, 1);
        assert_eq!(ids.len(), 1);
        let annot = reloaded.get_dictionary(ids[0]).unwrap();
        assert_eq!(annot.get(b"Contents").unwrap().as_str().unwrap(), b"Hello (world)");
    }
}
