//! Per-type tool table
//!
//! One table drives both the tool state machine and the render pipeline, so
//! adding a type means adding one row here.

use crate::annotation::{AnnotationType, Color};

/// How a record of a given type is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawRule {
    /// Translucent fill plus a marker dot at the top-left corner
    Marker,
    /// Translucent rect fill
    Fill,
    /// Horizontal line along the bottom edge (canvas space)
    BottomLine,
    /// Horizontal line at the vertical midpoint
    MidLine,
    StrokeRect,
    /// Ellipse stroked inside the bounding box
    StrokeEllipse,
    /// Word-wrapped text block anchored at the top-left corner
    TextBlock,
    FilledPolygon,
    /// Open stroked polyline through the vertices
    Polyline,
}

/// Which pointer protocol creates a record of a given type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    /// Anchor on pointer-down, commit on pointer-up
    Drag,
    /// Each primary click adds a vertex, an explicit complete commits
    Vertices,
    /// Pointer-move samples a freehand path, pointer-up commits
    Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolStyle {
    pub rule: DrawRule,
    pub gesture: GestureKind,
    pub color: Color,
}

pub fn tool_style(kind: AnnotationType) -> ToolStyle {
    use AnnotationType::*;
    let (rule, gesture, color) = match kind {
        Text => (DrawRule::Marker, GestureKind::Drag, Color::RED),
        Highlight => (DrawRule::Fill, GestureKind::Drag, Color::YELLOW),
        Underline => (DrawRule::BottomLine, GestureKind::Drag, Color::BLUE),
        Square => (DrawRule::StrokeRect, GestureKind::Drag, Color::GREEN),
        Circle => (DrawRule::StrokeEllipse, GestureKind::Drag, Color::MAGENTA),
        FreeText => (DrawRule::TextBlock, GestureKind::Drag, Color::BLACK),
        StrikeOut => (DrawRule::MidLine, GestureKind::Drag, Color::RED),
        Polygon => (DrawRule::FilledPolygon, GestureKind::Vertices, Color::PURPLE),
        Ink => (DrawRule::Polyline, GestureKind::Path, Color::RED),
    };
    ToolStyle {
        rule,
        gesture,
        color,
    }
}

pub fn default_color(kind: AnnotationType) -> Color {
    tool_style(kind).color
}
