//! Vector drawing rules
//!
//! Everything here draws in canvas space onto a transparent layer. Committed
//! annotations are mapped from document space first; previews are already
//! in canvas space.

use tiny_skia::{
    Color as SkColor, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Rect, Stroke,
    Transform,
};

use crate::annotation::{Annotation, CanvasPoint, Color};
use crate::config::EngineConfig;
use crate::coords::{CanvasRect, CoordinateMapper};
use crate::style::{tool_style, DrawRule};
use crate::text_layout::layout_text;
use crate::tool::{Preview, PreviewShape};

/// Opacity of the paper-colored box behind FreeText
const TEXT_BACKGROUND_ALPHA: f32 = 0.8;

/// Resolved drawing parameters, in canvas pixels at scale 1
#[derive(Debug, Clone, PartialEq)]
pub struct DrawStyle {
    pub highlight_alpha: f32,
    pub text_alpha: f32,
    pub polygon_alpha: f32,
    pub line_width: f32,
    pub shape_width: f32,
    pub ink_width: f32,
    pub font_size: f32,
    pub line_height: f32,
    pub text_marker_radius: f32,
}

impl From<&EngineConfig> for DrawStyle {
    fn from(config: &EngineConfig) -> Self {
        Self {
            highlight_alpha: config.highlight_alpha,
            text_alpha: config.text_alpha,
            polygon_alpha: config.polygon_alpha,
            line_width: config.line_width,
            shape_width: config.shape_width,
            ink_width: config.ink_width,
            font_size: config.font_size,
            line_height: config.line_height,
            text_marker_radius: config.text_marker_radius,
        }
    }
}

impl Default for DrawStyle {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Draw one committed annotation
pub fn draw_annotation(
    pixmap: &mut Pixmap,
    annotation: &Annotation,
    mapper: &CoordinateMapper,
    style: &DrawStyle,
) {
    let scale = mapper.scale();
    let rule = tool_style(annotation.kind()).rule;
    let color = annotation.color();

    match rule {
        DrawRule::FilledPolygon | DrawRule::Polyline => {
            let points: Vec<CanvasPoint> = annotation
                .vertices()
                .iter()
                .map(|p| mapper.document_to_canvas(*p))
                .collect();
            draw_path_rule(pixmap, rule, &points, color, style, scale);
        }
        _ => {
            let rect = mapper.document_rect_to_canvas(&annotation.rect());
            draw_rect_rule(pixmap, rule, rect, color, annotation.contents(), style, scale);
        }
    }
}

/// Draw the provisional shape of an in-progress gesture
pub fn draw_preview(pixmap: &mut Pixmap, preview: &Preview, style: &DrawStyle, scale: f32) {
    let tool = tool_style(preview.kind);
    match &preview.shape {
        PreviewShape::Rect { anchor, current } => {
            let rect = CanvasRect::from_corners(*anchor, *current);
            if tool.rule == DrawRule::TextBlock {
                // No text yet, outline the target box
                stroke_rect(pixmap, rect, tool.color, style.line_width * scale);
            } else {
                draw_rect_rule(pixmap, tool.rule, rect, tool.color, None, style, scale);
            }
        }
        PreviewShape::Polygon { points, cursor } => {
            let mut points = points.clone();
            points.extend(cursor.iter().copied());
            if points.len() >= 3 {
                draw_path_rule(pixmap, tool.rule, &points, tool.color, style, scale);
            }
            // Open outline keeps the first segments visible too
            stroke_polyline(pixmap, &points, tool.color, style.line_width * scale);
        }
        PreviewShape::Path { points } => {
            draw_path_rule(pixmap, tool.rule, points, tool.color, style, scale);
        }
    }
}

fn draw_rect_rule(
    pixmap: &mut Pixmap,
    rule: DrawRule,
    rect: CanvasRect,
    color: Color,
    contents: Option<&str>,
    style: &DrawStyle,
    scale: f32,
) {
    match rule {
        DrawRule::Marker => {
            fill_rect(pixmap, rect, color, style.text_alpha);
            fill_circle(
                pixmap,
                CanvasPoint::new(rect.x, rect.y),
                style.text_marker_radius * scale,
                color,
            );
        }
        DrawRule::Fill => fill_rect(pixmap, rect, color, style.highlight_alpha),
        DrawRule::BottomLine => {
            let y = rect.bottom();
            stroke_line(pixmap, (rect.x, y), (rect.right(), y), color, style.line_width * scale);
        }
        DrawRule::MidLine => {
            let y = rect.y + rect.height / 2.0;
            stroke_line(pixmap, (rect.x, y), (rect.right(), y), color, style.line_width * scale);
        }
        DrawRule::StrokeRect => stroke_rect(pixmap, rect, color, style.shape_width * scale),
        DrawRule::StrokeEllipse => {
            let Some(bounds) = Rect::from_xywh(rect.x, rect.y, rect.width, rect.height) else {
                return;
            };
            if let Some(path) = PathBuilder::from_oval(bounds) {
                let paint = solid_paint(color, 1.0);
                let stroke = stroke_with_width(style.shape_width * scale);
                pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
        }
        DrawRule::TextBlock => {
            if let Some(text) = contents {
                draw_text_block(pixmap, rect, text, color, style, scale);
            }
        }
        // Path rules never reach here with only a rect
        DrawRule::FilledPolygon | DrawRule::Polyline => {}
    }
}

fn draw_path_rule(
    pixmap: &mut Pixmap,
    rule: DrawRule,
    points: &[CanvasPoint],
    color: Color,
    style: &DrawStyle,
    scale: f32,
) {
    match rule {
        DrawRule::FilledPolygon => {
            let Some(path) = build_path(points, true) else {
                return;
            };
            let paint = solid_paint(color, style.polygon_alpha);
            pixmap.fill_path(&path, &paint, FillRule::EvenOdd, Transform::identity(), None);
        }
        _ => stroke_polyline(pixmap, points, color, style.ink_width * scale),
    }
}

fn draw_text_block(
    pixmap: &mut Pixmap,
    rect: CanvasRect,
    text: &str,
    color: Color,
    style: &DrawStyle,
    scale: f32,
) {
    fill_rect(pixmap, rect, Color::WHITE, TEXT_BACKGROUND_ALPHA);
    stroke_rect(pixmap, rect, color, scale);

    let block = layout_text(text, rect.width, style.font_size * scale, style.line_height);
    let char_width = block.char_width();
    let glyph_height = block.font_size * 0.8;
    let paint = solid_paint(color, 1.0);

    // Lines are centered on both axes
    let top = rect.y + (rect.height - block.height()) / 2.0;

    for (row, line) in block.lines.iter().enumerate() {
        let baseline = top + block.line_advance * row as f32 + block.font_size;
        let line_width = char_width * line.chars().count() as f32;
        let start = rect.x + (rect.width - line_width) / 2.0;
        let mut path = PathBuilder::new();

        // Glyphs are approximated by boxes sized by case
        for (col, ch) in line.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let height = if ch.is_lowercase() {
                glyph_height * 0.6
            } else if ch.is_uppercase() || ch.is_ascii_digit() {
                glyph_height
            } else {
                glyph_height * 0.7
            };
            let left = start + char_width * col as f32;
            if let Some(glyph) =
                Rect::from_ltrb(left, baseline - height, left + char_width * 0.8, baseline)
            {
                path.push_rect(glyph);
            }
        }

        if let Some(path) = path.finish() {
            pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        }
    }
}

fn solid_paint(color: Color, alpha: f32) -> Paint<'static> {
    let (r, g, b) = color.to_normalized();
    let mut paint = Paint::default();
    paint.set_color(SkColor::from_rgba(r, g, b, alpha.clamp(0.0, 1.0)).unwrap_or(SkColor::BLACK));
    paint.anti_alias = true;
    paint
}

fn stroke_with_width(width: f32) -> Stroke {
    Stroke {
        width: width.max(0.0),
        line_cap: LineCap::Butt,
        line_join: LineJoin::Miter,
        ..Stroke::default()
    }
}

fn fill_rect(pixmap: &mut Pixmap, rect: CanvasRect, color: Color, alpha: f32) {
    if let Some(r) = Rect::from_xywh(rect.x, rect.y, rect.width, rect.height) {
        pixmap.fill_rect(r, &solid_paint(color, alpha), Transform::identity(), None);
    }
}

fn fill_circle(pixmap: &mut Pixmap, center: CanvasPoint, radius: f32, color: Color) {
    if radius <= 0.0 {
        return;
    }
    if let Some(path) = PathBuilder::from_circle(center.x, center.y, radius) {
        let paint = solid_paint(color, 1.0);
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
}

fn stroke_rect(pixmap: &mut Pixmap, rect: CanvasRect, color: Color, width: f32) {
    let Some(r) = Rect::from_xywh(rect.x, rect.y, rect.width, rect.height) else {
        return;
    };
    let path = PathBuilder::from_rect(r);
    let paint = solid_paint(color, 1.0);
    pixmap.stroke_path(&path, &paint, &stroke_with_width(width), Transform::identity(), None);
}

fn stroke_line(pixmap: &mut Pixmap, from: (f32, f32), to: (f32, f32), color: Color, width: f32) {
    let mut pb = PathBuilder::new();
    pb.move_to(from.0, from.1);
    pb.line_to(to.0, to.1);
    if let Some(path) = pb.finish() {
        let paint = solid_paint(color, 1.0);
        pixmap.stroke_path(&path, &paint, &stroke_with_width(width), Transform::identity(), None);
    }
}

fn stroke_polyline(pixmap: &mut Pixmap, points: &[CanvasPoint], color: Color, width: f32) {
    let Some(path) = build_path(points, false) else {
        return;
    };
    let paint = solid_paint(color, 1.0);
    let stroke = Stroke {
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..stroke_with_width(width)
    };
    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
}

fn build_path(points: &[CanvasPoint], closed: bool) -> Option<tiny_skia::Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.x, first.y);
    for p in rest {
        pb.line_to(p.x, p.y);
    }
    if closed {
        pb.close();
    }
    pb.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationType, DocPoint, DocRect};

    fn canvas() -> Pixmap {
        Pixmap::new(200, 200).unwrap()
    }

    fn alpha_at(pixmap: &Pixmap, x: u32, y: u32) -> u8 {
        pixmap.pixel(x, y).unwrap().alpha()
    }

    fn mapper() -> CoordinateMapper {
        CoordinateMapper::new(1.0, 200.0).unwrap()
    }

    fn annotation(kind: AnnotationType, rect: [f32; 4]) -> Annotation {
        Annotation::new(kind, 0, DocRect::from(rect), tool_style(kind).color, "User")
    }

    #[test]
    fn test_highlight_fills_with_alpha() {
        let mut pixmap = canvas();
        let a = annotation(AnnotationType::Highlight, [10.0, 10.0, 60.0, 60.0]);
        draw_annotation(&mut pixmap, &a, &mapper(), &DrawStyle::default());

        // Canvas y = 200 - 35
        let inside = alpha_at(&pixmap, 35, 165);
        assert!(inside > 60 && inside < 100, "alpha {inside}");
        assert_eq!(alpha_at(&pixmap, 100, 100), 0);
    }

    #[test]
    fn test_square_is_outline_only() {
        let mut pixmap = canvas();
        let a = annotation(AnnotationType::Square, [50.0, 50.0, 150.0, 150.0]);
        draw_annotation(&mut pixmap, &a, &mapper(), &DrawStyle::default());

        assert_eq!(pixmap.pixel(50, 100).unwrap().green(), 255);
        assert_eq!(alpha_at(&pixmap, 100, 100), 0);
    }

    #[test]
    fn test_underline_and_strikeout_offsets() {
        let rect = [20.0, 100.0, 120.0, 140.0];
        let style = DrawStyle {
            line_width: 2.0,
            ..DrawStyle::default()
        };

        // Canvas rect spans y 60..100
        let mut under = canvas();
        let underline = annotation(AnnotationType::Underline, rect);
        draw_annotation(&mut under, &underline, &mapper(), &style);
        assert!(alpha_at(&under, 70, 100) > 0);
        assert_eq!(alpha_at(&under, 70, 80), 0);

        let mut strike = canvas();
        let strike_out = annotation(AnnotationType::StrikeOut, rect);
        draw_annotation(&mut strike, &strike_out, &mapper(), &style);
        assert!(alpha_at(&strike, 70, 80) > 0);
        assert_eq!(alpha_at(&strike, 70, 99), 0);
    }

    #[test]
    fn test_polygon_filled() {
        let mut pixmap = canvas();
        let vertices = vec![
            DocPoint::new(20.0, 20.0),
            DocPoint::new(180.0, 20.0),
            DocPoint::new(100.0, 180.0),
        ];
        let a = Annotation::new(
            AnnotationType::Polygon,
            0,
            DocRect::bounding(&vertices).unwrap(),
            Color::PURPLE,
            "User",
        )
        .with_vertices(vertices);
        draw_annotation(&mut pixmap, &a, &mapper(), &DrawStyle::default());

        assert!(alpha_at(&pixmap, 100, 150) > 0);
        assert_eq!(alpha_at(&pixmap, 10, 30), 0);
    }

    #[test]
    fn test_free_text_draws_glyphs_inside_rect() {
        let mut pixmap = canvas();
        let a = annotation(AnnotationType::FreeText, [10.0, 100.0, 190.0, 190.0])
            .with_contents("HELLO");
        draw_annotation(&mut pixmap, &a, &mapper(), &DrawStyle::default());

        let painted = (10..190)
            .flat_map(|x| (10..100).map(move |y| (x, y)))
            .filter(|&(x, y)| alpha_at(&pixmap, x, y) > 0)
            .count();
        assert!(painted > 0);
        assert_eq!(alpha_at(&pixmap, 100, 150), 0);
    }

    #[test]
    fn test_free_text_centered_on_bordered_background() {
        let mut pixmap = canvas();
        let a = Annotation::new(
            AnnotationType::FreeText,
            0,
            DocRect::from([10.0, 100.0, 190.0, 190.0]),
            Color::RED,
            "User",
        )
        .with_contents("HI");
        draw_annotation(&mut pixmap, &a, &mapper(), &DrawStyle::default());

        // Old top-left text origin is now plain background
        let background = pixmap.pixel(14, 22).unwrap();
        assert!((200..=208).contains(&background.alpha()), "alpha {}", background.alpha());
        assert_eq!(background.red(), background.alpha());
        assert_eq!(background.green(), background.alpha());

        // "H" sits around x 90..98, y 49..61
        let glyph = pixmap.pixel(94, 55).unwrap();
        assert_eq!((glyph.red(), glyph.green(), glyph.alpha()), (255, 0, 255));

        // Left edge of the border, outside the fill
        let border = pixmap.pixel(9, 50).unwrap();
        assert!(border.alpha() > 0);
        assert_eq!((border.green(), border.blue()), (0, 0));
    }

    #[test]
    fn test_free_text_preview_outlines_box() {
        let mut pixmap = canvas();
        let preview = Preview {
            kind: AnnotationType::FreeText,
            shape: PreviewShape::Rect {
                anchor: CanvasPoint::new(20.0, 20.0),
                current: CanvasPoint::new(120.0, 80.0),
            },
        };
        draw_preview(&mut pixmap, &preview, &DrawStyle::default(), 1.0);
        assert!(alpha_at(&pixmap, 70, 20) > 0);
        assert_eq!(alpha_at(&pixmap, 70, 50), 0);
    }
}
