//! Annotation data model
//!
//! Records are immutable once committed. All geometry is stored in document
//! space: origin at the bottom-left of the page, X to the right, Y upward,
//! units independent of display scale.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AnnotationError;

/// Unique identifier for an annotation
///
/// Generated using UUID v4 so ids stay unique across scene reloads.
pub type AnnotationId = uuid::Uuid;

/// The closed set of annotation kinds the engine can create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationType {
    Text,
    Highlight,
    Underline,
    Square,
    Circle,
    FreeText,
    StrikeOut,
    Polygon,
    Ink,
}

impl AnnotationType {
    pub const ALL: [AnnotationType; 9] = [
        AnnotationType::Text,
        AnnotationType::Highlight,
        AnnotationType::Underline,
        AnnotationType::Square,
        AnnotationType::Circle,
        AnnotationType::FreeText,
        AnnotationType::StrikeOut,
        AnnotationType::Polygon,
        AnnotationType::Ink,
    ];

    pub fn name(&self) -> &'static str {
        match self {
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

    /// Minimum number of vertices a committed record must carry, or `None`
    /// when the type is described by its rect alone.
    pub fn min_vertices(&self) -> Option<usize> {
        match self {
            AnnotationType::Polygon => Some(3),
            AnnotationType::Ink => Some(2),
            _ => None,
        }
    }

    /// Placeholder contents handed to exporters when a record has none
    pub fn default_contents(&self) -> String {
        format!("{} annotation", self.name())
    }
}

impl fmt::Display for AnnotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A point in document space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocPoint {
    pub x: f32,
    pub y: f32,
}

impl DocPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &DocPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A point on the drawing surface, in pixels, origin top-left
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasPoint {
    pub x: f32,
    pub y: f32,
}

impl CanvasPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &CanvasPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned rectangle `[x0, y0, x1, y1]` in document space
///
/// Constructed through [`DocRect::from_corners`] the rect is always
/// normalized (`x0 <= x1`, `y0 <= y1`). Deserialized values are checked by
/// [`Annotation::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct DocRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl DocRect {
    /// Build a normalized rect from two arbitrary corners
    pub fn from_corners(a: DocPoint, b: DocPoint) -> Self {
        Self {
            x0: a.x.min(b.x),
            y0: a.y.min(b.y),
            x1: a.x.max(b.x),
            y1: a.y.max(b.y),
        }
    }

    /// Normalized bounding box of a point set, `None` when empty
    pub fn bounding(points: &[DocPoint]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut rect = DocRect::from_corners(*first, *first);
        for p in rest {
            rect.x0 = rect.x0.min(p.x);
            rect.y0 = rect.y0.min(p.y);
            rect.x1 = rect.x1.max(p.x);
            rect.y1 = rect.y1.max(p.y);
        }
        Some(rect)
    }

    pub fn normalized(&self) -> Self {
        Self::from_corners(DocPoint::new(self.x0, self.y0), DocPoint::new(self.x1, self.y1))
    }

    pub fn is_normalized(&self) -> bool {
        self.x0 <= self.x1 && self.y0 <= self.y1
    }

    pub fn is_finite(&self) -> bool {
        self.x0.is_finite() && self.y0.is_finite() && self.x1.is_finite() && self.y1.is_finite()
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn contains(&self, point: &DocPoint, tolerance: f32) -> bool {
        point.x >= self.x0 - tolerance
            && point.x <= self.x1 + tolerance
            && point.y >= self.y0 - tolerance
            && point.y <= self.y1 + tolerance
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }
}

impl From<[f32; 4]> for DocRect {
    fn from(v: [f32; 4]) -> Self {
        Self {
            x0: v[0],
            y0: v[1],
            x1: v[2],
            y1: v[3],
        }
    }
}

impl From<DocRect> for [f32; 4] {
    fn from(r: DocRect) -> Self {
        r.to_array()
    }
}

/// RGB color, one byte per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const RED: Color = Color { r: 255, g: 0, b: 0 };
    pub const GREEN: Color = Color { r: 0, g: 255, b: 0 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255 };
    pub const YELLOW: Color = Color { r: 255, g: 255, b: 0 };
    pub const MAGENTA: Color = Color { r: 255, g: 0, b: 255 };
    pub const PURPLE: Color = Color { r: 128, g: 0, b: 128 };
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255 };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels scaled to `0.0..=1.0`
    pub fn to_normalized(&self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

/// A committed annotation record
///
/// Fields are private; a record is built once, validated, and then only
/// read. Use the `with_*` builders before handing it to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    id: AnnotationId,
    #[serde(rename = "type")]
    kind: AnnotationType,
    page: u32,
    rect: DocRect,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    vertices: Vec<DocPoint>,
    color: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contents: Option<String>,
    author: String,
}

impl Annotation {
    /// Create a record with a fresh id; `rect` is normalized on the way in
    pub fn new(
        kind: AnnotationType,
        page: u32,
        rect: DocRect,
        color: Color,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            kind,
            page,
            rect: rect.normalized(),
            vertices: Vec::new(),
            color,
            contents: None,
            author: author.into(),
        }
    }

    pub fn with_id(mut self, id: AnnotationId) -> Self {
        self.id = id;
        self
    }

    pub fn with_vertices(mut self, vertices: Vec<DocPoint>) -> Self {
        self.vertices = vertices;
        self
    }

    pub fn with_contents(mut self, contents: impl Into<String>) -> Self {
        self.contents = Some(contents.into());
        self
    }

    pub fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn kind(&self) -> AnnotationType {
        self.kind
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn rect(&self) -> DocRect {
        self.rect
    }

    pub fn vertices(&self) -> &[DocPoint] {
        &self.vertices
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    /// Check the per-record invariants every stored annotation satisfies
    pub fn validate(&self) -> Result<(), AnnotationError> {
        let r = self.rect;
        if !r.is_finite() || self.vertices.iter().any(|p| !p.is_finite()) {
            return Err(crate::error::GeometryError::NonFinite { x: r.x0, y: r.y0 }.into());
        }
        if !r.is_normalized() {
            return Err(AnnotationError::UnnormalizedRect(r.x0, r.y0, r.x1, r.y1));
        }

        match self.kind.min_vertices() {
            Some(required) if self.vertices.len() < required => {
                return Err(AnnotationError::TooFewPoints {
                    kind: self.kind,
                    required,
                    actual: self.vertices.len(),
                });
            }
            None if !self.vertices.is_empty() => {
                return Err(AnnotationError::UnexpectedVertices(self.kind));
            }
            _ => {}
        }

        if self.kind == AnnotationType::FreeText
            && self.contents.as_deref().map_or(true, |c| c.trim().is_empty())
        {
            return Err(AnnotationError::MissingContents);
        }

        Ok(())
    }

    /// Check if a document-space point hits this annotation
    pub fn hit_test(&self, point: &DocPoint, tolerance: f32) -> bool {
        match self.kind {
            AnnotationType::Polygon => {
                point_in_polygon(point, &self.vertices)
                    || polyline_near(point, &self.vertices, true, tolerance)
            }
            AnnotationType::Ink => polyline_near(point, &self.vertices, false, tolerance),
            _ => self.rect.contains(point, tolerance),
        }
    }
}

fn polyline_near(point: &DocPoint, points: &[DocPoint], closed: bool, tolerance: f32) -> bool {
    if points.len() == 1 {
        return point.distance_to(&points[0]) <= tolerance;
    }
    let near = points
        .windows(2)
        .any(|w| point_near_line_segment(point, &w[0], &w[1], tolerance));
    if near || !closed || points.len() < 3 {
        return near;
    }
    point_near_line_segment(point, &points[points.len() - 1], &points[0], tolerance)
}

fn point_near_line_segment(
    point: &DocPoint,
    start: &DocPoint,
    end: &DocPoint,
    tolerance: f32,
) -> bool {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-6 {
        return point.distance_to(start) <= tolerance;
    }

    let t = (((point.x - start.x) * dx + (point.y - start.y) * dy) / length_sq).clamp(0.0, 1.0);
    let closest = DocPoint::new(start.x + t * dx, start.y + t * dy);
    point.distance_to(&closest) <= tolerance
}

// Even-odd ray cast
fn point_in_polygon(point: &DocPoint, vertices: &[DocPoint]) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (a, b) = (vertices[i], vertices[j]);
        if (a.y > point.y) != (b.y > point.y)
            && point.x < (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Vec<DocPoint> {
        vec![
            DocPoint::new(0.0, 0.0),
            DocPoint::new(100.0, 0.0),
            DocPoint::new(50.0, 100.0),
        ]
    }

    #[test]
    fn test_rect_from_corners_normalizes() {
        let rect = DocRect::from_corners(DocPoint::new(200.0, 10.0), DocPoint::new(100.0, 50.0));
        assert_eq!(rect.to_array(), [100.0, 10.0, 200.0, 50.0]);
        assert!(rect.is_normalized());
    }

    #[test]
    fn test_bounding_rect() {
        let rect = DocRect::bounding(&triangle()).unwrap();
        assert_eq!(rect.to_array(), [0.0, 0.0, 100.0, 100.0]);
        assert!(DocRect::bounding(&[]).is_none());
    }

    #[test]
    fn test_new_normalizes_rect() {
        let raw = DocRect::from([50.0, 80.0, 10.0, 20.0]);
        let a = Annotation::new(AnnotationType::Square, 0, raw, Color::GREEN, "User");
        assert_eq!(a.rect().to_array(), [10.0, 20.0, 50.0, 80.0]);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_unnormalized_rect_rejected() {
        let json = format!(
            concat!(
                r#"{{"id":"{}","type":"Square","page":0,"rect":[5,5,1,1],"#,
                r#""color":{{"r":0,"g":255,"b":0}},"author":"User"}}"#,
            ),
            uuid::Uuid::new_v4()
        );
        let a: Annotation = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            a.validate(),
            Err(AnnotationError::UnnormalizedRect(..))
        ));
    }

    #[test]
    fn test_polygon_requires_three_vertices() {
        let rect = DocRect::from([0.0, 0.0, 10.0, 10.0]);
        let a = Annotation::new(AnnotationType::Polygon, 0, rect, Color::PURPLE, "User")
            .with_vertices(vec![DocPoint::new(0.0, 0.0), DocPoint::new(10.0, 10.0)]);
        assert_eq!(
            a.validate(),
            Err(AnnotationError::TooFewPoints {
                kind: AnnotationType::Polygon,
                required: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_vertices_only_on_path_types() {
        let rect = DocRect::from([0.0, 0.0, 10.0, 10.0]);
        let a = Annotation::new(AnnotationType::Square, 0, rect, Color::GREEN, "User")
            .with_vertices(triangle());
        assert_eq!(
            a.validate(),
            Err(AnnotationError::UnexpectedVertices(AnnotationType::Square))
        );
    }

    #[test]
    fn test_free_text_requires_contents() {
        let rect = DocRect::from([0.0, 0.0, 10.0, 10.0]);
        let empty = Annotation::new(AnnotationType::FreeText, 0, rect, Color::BLACK, "User");
        assert_eq!(empty.validate(), Err(AnnotationError::MissingContents));

        let blank = empty.clone().with_contents("   ");
        assert_eq!(blank.validate(), Err(AnnotationError::MissingContents));

        assert!(empty.with_contents("note").validate().is_ok());
    }

    #[test]
    fn test_serde_uses_type_key_and_rect_array() {
        let rect = DocRect::from([1.0, 2.0, 3.0, 4.0]);
        let a = Annotation::new(AnnotationType::Highlight, 2, rect, Color::YELLOW, "Ann");
        let value = serde_json::to_value(&a).unwrap();
        assert_eq!(value["type"], "Highlight");
        assert_eq!(value["rect"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
        assert!(value.get("vertices").is_none());

        let back: Annotation = serde_json::from_value(value).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn test_hit_testing() {
        let rect = DocRect::from([10.0, 10.0, 20.0, 20.0]);
        let square = Annotation::new(AnnotationType::Square, 0, rect, Color::GREEN, "User");
        assert!(square.hit_test(&DocPoint::new(15.0, 15.0), 0.0));
        assert!(square.hit_test(&DocPoint::new(21.0, 15.0), 2.0));
        assert!(!square.hit_test(&DocPoint::new(30.0, 15.0), 2.0));

        let poly = Annotation::new(
            AnnotationType::Polygon,
            0,
            DocRect::bounding(&triangle()).unwrap(),
            Color::PURPLE,
            "User",
        )
        .with_vertices(triangle());
        assert!(poly.hit_test(&DocPoint::new(50.0, 30.0), 0.0));
        // Inside the bounding box but outside the triangle
        assert!(!poly.hit_test(&DocPoint::new(5.0, 90.0), 1.0));
    }

    #[test]
    fn test_ink_hit_follows_stroke() {
        let path = vec![DocPoint::new(0.0, 0.0), DocPoint::new(100.0, 100.0)];
        let ink = Annotation::new(
            AnnotationType::Ink,
            0,
            DocRect::bounding(&path).unwrap(),
            Color::RED,
            "User",
        )
        .with_vertices(path);
        assert!(ink.hit_test(&DocPoint::new(50.0, 51.0), 2.0));
        assert!(!ink.hit_test(&DocPoint::new(90.0, 10.0), 2.0));
    }

    #[test]
    fn test_default_contents() {
        assert_eq!(AnnotationType::Square.default_contents(), "Square annotation");
        assert_eq!(AnnotationType::StrikeOut.to_string(), "StrikeOut");
    }
}
