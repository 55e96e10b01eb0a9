//! Appearance stream generation
//!
//! Each annotation gets a normal appearance (`/AP /N`) form whose `/BBox`
//! equals the annotation `/Rect`, so content is written directly in page
//! coordinates.

use std::fmt::{self, Write};

use annotator_core::{AnnotationType, Color, CreateAnnotation, DocPoint};

/// Bezier control distance for a quarter ellipse
const KAPPA: f32 = 0.552_284_8;

pub const HIGHLIGHT_ALPHA: f32 = 0.3;
pub const POLYGON_ALPHA: f32 = 0.5;
pub const FREE_TEXT_FONT_SIZE: f32 = 16.0;

/// Graphics state resource name used for translucent fills
pub const ALPHA_STATE: &str = "GS0";
/// Font resource name used by FreeText
pub const FONT: &str = "Helv";

/// Content stream for `kind`, or `None` when viewers draw the type from the
/// dictionary alone
pub fn appearance_stream(
    kind: AnnotationType,
    args: &CreateAnnotation,
) -> Result<Option<String>, fmt::Error> {
    let [x0, y0, x1, y1] = args.rect;
    let mut s = String::new();

    match kind {
        AnnotationType::Text => return Ok(None),
        AnnotationType::Highlight => {
            writeln!(s, "/{ALPHA_STATE} gs")?;
            fill_color(&mut s, args.color)?;
            writeln!(s, "{x0} {y0} {} {} re f", x1 - x0, y1 - y0)?;
        }
        AnnotationType::Underline => {
            stroke_color(&mut s, args.color, 1.0)?;
            writeln!(s, "{x0} {y0} m {x1} {y0} l S")?;
        }
        AnnotationType::StrikeOut => {
            let mid = (y0 + y1) / 2.0;
            stroke_color(&mut s, args.color, 1.0)?;
            writeln!(s, "{x0} {mid} m {x1} {mid} l S")?;
        }
        AnnotationType::Square => {
            stroke_color(&mut s, args.color, 2.0)?;
            // Inset by half the line width so the stroke stays inside /BBox
            writeln!(
                s,
                "{} {} {} {} re S",
                x0 + 1.0,
                y0 + 1.0,
                (x1 - x0 - 2.0).max(0.0),
                (y1 - y0 - 2.0).max(0.0)
            )?;
        }
        AnnotationType::Circle => {
            stroke_color(&mut s, args.color, 2.0)?;
            let cx = (x0 + x1) / 2.0;
            let cy = (y0 + y1) / 2.0;
            let rx = ((x1 - x0) / 2.0 - 1.0).max(0.0);
            let ry = ((y1 - y0) / 2.0 - 1.0).max(0.0);
            let (kx, ky) = (rx * KAPPA, ry * KAPPA);
            writeln!(s, "{} {cy} m", cx + rx)?;
            writeln!(s, "{} {} {} {} {cx} {} c", cx + rx, cy + ky, cx + kx, cy + ry, cy + ry)?;
            writeln!(s, "{} {} {} {} {} {cy} c", cx - kx, cy + ry, cx - rx, cy + ky, cx - rx)?;
            writeln!(s, "{} {} {} {} {cx} {} c", cx - rx, cy - ky, cx - kx, cy - ry, cy - ry)?;
            writeln!(s, "{} {} {} {} {} {cy} c", cx + kx, cy - ry, cx + rx, cy - ky, cx + rx)?;
            writeln!(s, "s")?;
        }
        AnnotationType::FreeText => {
            fill_color(&mut s, args.color)?;
            writeln!(s, "BT")?;
            writeln!(s, "/{FONT} {FREE_TEXT_FONT_SIZE} Tf")?;
            writeln!(s, "{} TL", FREE_TEXT_FONT_SIZE * 1.2)?;
            writeln!(s, "{} {} Td", x0 + 2.0, y1 - FREE_TEXT_FONT_SIZE)?;
            for (i, line) in args.contents.lines().enumerate() {
                if i > 0 {
                    writeln!(s, "T*")?;
                }
                writeln!(s, "({}) Tj", escape_pdf_string(line))?;
            }
            writeln!(s, "ET")?;
        }
        AnnotationType::Polygon => {
            let Some(vertices) = args.vertices.as_deref() else {
                return Ok(None);
            };
            writeln!(s, "/{ALPHA_STATE} gs")?;
            fill_color(&mut s, args.color)?;
            path(&mut s, vertices)?;
            writeln!(s, "h f")?;
        }
        AnnotationType::Ink => {
            let Some(vertices) = args.vertices.as_deref() else {
                return Ok(None);
            };
            stroke_color(&mut s, args.color, 2.0)?;
            writeln!(s, "1 J 1 j")?;
            path(&mut s, vertices)?;
            writeln!(s, "S")?;
        }
    }

    Ok(Some(s))
}

/// Alpha used by the `/GS0` resource, if the type needs one
pub fn fill_alpha(kind: AnnotationType) -> Option<f32> {
    match kind {
        AnnotationType::Highlight => Some(HIGHLIGHT_ALPHA),
        AnnotationType::Polygon => Some(POLYGON_ALPHA),
        _ => None,
    }
}

fn fill_color(s: &mut String, color: Color) -> fmt::Result {
    let (r, g, b) = color.to_normalized();
    writeln!(s, "{r} {g} {b} rg")
}

fn stroke_color(s: &mut String, color: Color, width: f32) -> fmt::Result {
    let (r, g, b) = color.to_normalized();
    writeln!(s, "{r} {g} {b} RG")?;
    writeln!(s, "{width} w")
}

fn path(s: &mut String, points: &[DocPoint]) -> fmt::Result {
    for (i, p) in points.iter().enumerate() {
        let op = if i == 0 { "m" } else { "l" };
        writeln!(s, "{} {} {op}", p.x, p.y)?;
    }
    Ok(())
}

/// Escape a literal string for a content stream
///
/// Non-ASCII characters become `?` and control characters are dropped.
pub fn escape_pdf_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            c if (c as u32) < 0x20 => {}
            c if (c as u32) < 0x80 => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(rect: [f32; 4], color: Color) -> CreateAnnotation {
        CreateAnnotation {
            page: 0,
            rect,
            vertices: None,
            contents: "note".to_string(),
            author: "User".to_string(),
            color,
        }
    }

    #[test]
    fn test_square_stream() {
        let square = args([10.0, 20.0, 110.0, 70.0], Color::GREEN);
        let stream = appearance_stream(AnnotationType::Square, &square).unwrap().unwrap();
        assert!(stream.contains("0 1 0 RG"));
        assert!(stream.contains("11 21 98 48 re S"));
    }

    #[test]
    fn test_strike_out_uses_midline() {
        let strike = args([0.0, 10.0, 50.0, 30.0], Color::RED);
        let stream = appearance_stream(AnnotationType::StrikeOut, &strike).unwrap().unwrap();
        assert!(stream.contains("0 20 m 50 20 l S"));
    }

    #[test]
    fn test_text_has_no_stream() {
        assert!(appearance_stream(AnnotationType::Text, &args([0.0, 0.0, 1.0, 1.0], Color::RED))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_polygon_path() {
        let mut a = args([0.0, 0.0, 10.0, 10.0], Color::PURPLE);
        a.vertices = Some(vec![
            DocPoint::new(0.0, 0.0),
            DocPoint::new(10.0, 0.0),
            DocPoint::new(5.0, 10.0),
        ]);
        let stream = appearance_stream(AnnotationType::Polygon, &a).unwrap().unwrap();
        assert!(stream.contains("/GS0 gs"));
        assert!(stream.contains("0 0 m\n10 0 l\n5 10 l\nh f"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape_pdf_string(r"a(b)\c"), r"a\(b\)\\c");
        assert_eq!(escape_pdf_string("héllo"), "h?llo");
    }
}
