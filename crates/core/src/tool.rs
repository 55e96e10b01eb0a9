//! Tool selection and gesture state machine
//!
//! Pointer events arrive in canvas space. The machine keeps the in-progress
//! gesture in canvas space too, and only maps to document space on commit,
//! through the [`CoordinateMapper`] handed in with each event.
//!
//! ```text
//! Idle --down--> Drawing --move--> Drawing --up--> Idle (commit or discard)
//! any  --select_tool--> Idle (in-progress gesture discarded)
//! ```
//!
//! Polygon uses its own protocol: each primary click adds a vertex and an
//! explicit complete (or a secondary click) commits once three vertices are
//! present. Ink samples the pointer path between down and up.

use tracing::{debug, warn};

use crate::annotation::{Annotation, AnnotationType, CanvasPoint, DocPoint, DocRect};
use crate::coords::CoordinateMapper;
use crate::style::{tool_style, GestureKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// Input accepted by [`ToolStateMachine::handle`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToolEvent {
    PointerDown {
        pos: CanvasPoint,
        button: PointerButton,
    },
    PointerMove {
        pos: CanvasPoint,
    },
    PointerUp {
        pos: CanvasPoint,
    },
    /// Finish a multi-click gesture
    Complete,
}

/// Result of dispatching one event
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Nothing changed
    Ignored,
    /// The preview shape changed and the preview layer needs a redraw
    PreviewChanged,
    /// The gesture finished and produced a record for the store
    Committed(Annotation),
    /// The gesture ended without a record
    Discarded,
}

/// Observable machine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolState {
    Idle,
    Drawing,
}

/// Per-event inputs owned by the caller
#[derive(Debug, Clone, Copy)]
pub struct GestureContext<'a> {
    pub mapper: &'a CoordinateMapper,
    pub page: u32,
    pub author: &'a str,
}

/// Source of FreeText contents, asked once per completed FreeText drag
///
/// Returning `None` or a blank string cancels the gesture.
pub trait TextPrompt {
    fn request_text(&mut self, rect: &DocRect) -> Option<String>;
}

impl<F> TextPrompt for F
where
    F: FnMut(&DocRect) -> Option<String>,
{
    fn request_text(&mut self, rect: &DocRect) -> Option<String> {
        self(rect)
    }
}

/// Prompt that always cancels
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl TextPrompt for NoPrompt {
    fn request_text(&mut self, _rect: &DocRect) -> Option<String> {
        None
    }
}

/// Provisional shape in canvas space
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewShape {
    Rect {
        anchor: CanvasPoint,
        current: CanvasPoint,
    },
    Polygon {
        points: Vec<CanvasPoint>,
        cursor: Option<CanvasPoint>,
    },
    Path {
        points: Vec<CanvasPoint>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub kind: AnnotationType,
    pub shape: PreviewShape,
}

#[derive(Debug, Clone, PartialEq)]
enum Gesture {
    Drag {
        anchor: CanvasPoint,
        current: CanvasPoint,
    },
    Vertices {
        points: Vec<CanvasPoint>,
        cursor: Option<CanvasPoint>,
    },
    Path {
        points: Vec<CanvasPoint>,
    },
}

#[derive(Debug, Clone)]
pub struct ToolStateMachine {
    selected: Option<AnnotationType>,
    gesture: Option<Gesture>,
    ink_min_spacing: f32,
}

impl Default for ToolStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolStateMachine {
    pub fn new() -> Self {
        Self {
            selected: None,
            gesture: None,
            ink_min_spacing: 2.0,
        }
    }

    /// Minimum canvas distance between recorded ink points
    pub fn with_ink_spacing(mut self, spacing: f32) -> Self {
        self.ink_min_spacing = spacing.max(0.0);
        self
    }

    pub fn selected_tool(&self) -> Option<AnnotationType> {
        self.selected
    }

    pub fn state(&self) -> ToolState {
        if self.gesture.is_some() {
            ToolState::Drawing
        } else {
            ToolState::Idle
        }
    }

    /// Vertices accumulated by an in-progress polygon
    pub fn pending_vertices(&self) -> &[CanvasPoint] {
        match &self.gesture {
            Some(Gesture::Vertices { points, .. }) => points,
            _ => &[],
        }
    }

    /// Select a tool, or deselect with `None`
    ///
    /// Any in-progress gesture is dropped, including when the same tool is
    /// selected again.
    pub fn select_tool(&mut self, tool: Option<AnnotationType>) -> ToolOutcome {
        self.selected = tool;
        let outcome = self.cancel();
        debug!(?tool, "tool selected");
        outcome
    }

    /// Drop the in-progress gesture without committing
    pub fn cancel(&mut self) -> ToolOutcome {
        match self.gesture.take() {
            Some(_) => {
                debug!("gesture cancelled");
                ToolOutcome::Discarded
            }
            None => ToolOutcome::Ignored,
        }
    }

    /// Single dispatch entry point for pointer input
    pub fn handle(
        &mut self,
        event: ToolEvent,
        ctx: &GestureContext<'_>,
        prompt: &mut dyn TextPrompt,
    ) -> ToolOutcome {
        let Some(kind) = self.selected else {
            return ToolOutcome::Ignored;
        };

        match tool_style(kind).gesture {
            GestureKind::Drag => self.handle_drag(kind, event, ctx, prompt),
            GestureKind::Vertices => self.handle_vertices(kind, event, ctx),
            GestureKind::Path => self.handle_path(kind, event, ctx),
        }
    }

    fn handle_drag(
        &mut self,
        kind: AnnotationType,
        event: ToolEvent,
        ctx: &GestureContext<'_>,
        prompt: &mut dyn TextPrompt,
    ) -> ToolOutcome {
        match event {
            ToolEvent::PointerDown {
                pos,
                button: PointerButton::Primary,
            } => {
                debug!(%kind, x = pos.x, y = pos.y, "drag started");
                self.gesture = Some(Gesture::Drag {
                    anchor: pos,
                    current: pos,
                });
                ToolOutcome::PreviewChanged
            }
            ToolEvent::PointerMove { pos } => match &mut self.gesture {
                Some(Gesture::Drag { current, .. }) => {
                    *current = pos;
                    ToolOutcome::PreviewChanged
                }
                _ => ToolOutcome::Ignored,
            },
            ToolEvent::PointerUp { pos } => {
                let Some(Gesture::Drag { anchor, .. }) = self.gesture.take() else {
                    return ToolOutcome::Ignored;
                };
                let rect = ctx.mapper.canvas_rect_to_document(anchor, pos);
                let mut annotation =
                    Annotation::new(kind, ctx.page, rect, tool_style(kind).color, ctx.author);

                if kind == AnnotationType::FreeText {
                    match prompt.request_text(&rect) {
                        Some(text) if !text.trim().is_empty() => {
                            annotation = annotation.with_contents(text);
                        }
                        _ => {
                            debug!("free text cancelled");
                            return ToolOutcome::Discarded;
                        }
                    }
                }
                finish(annotation)
            }
            _ => ToolOutcome::Ignored,
        }
    }

    fn handle_vertices(
        &mut self,
        kind: AnnotationType,
        event: ToolEvent,
        ctx: &GestureContext<'_>,
    ) -> ToolOutcome {
        match event {
            ToolEvent::PointerDown {
                pos,
                button: PointerButton::Primary,
            } => {
                match &mut self.gesture {
                    Some(Gesture::Vertices { points, .. }) => points.push(pos),
                    _ => {
                        self.gesture = Some(Gesture::Vertices {
                            points: vec![pos],
                            cursor: None,
                        })
                    }
                }
                debug!(vertices = self.pending_vertices().len(), "vertex added");
                ToolOutcome::PreviewChanged
            }
            ToolEvent::PointerMove { pos } => match &mut self.gesture {
                Some(Gesture::Vertices { cursor, .. }) => {
                    *cursor = Some(pos);
                    ToolOutcome::PreviewChanged
                }
                _ => ToolOutcome::Ignored,
            },
            ToolEvent::PointerDown {
                button: PointerButton::Secondary,
                ..
            }
            | ToolEvent::Complete => {
                let required = kind.min_vertices().unwrap_or(3);
                match &self.gesture {
                    Some(Gesture::Vertices { points, .. }) if points.len() >= required => {}
                    _ => {
                        debug!(
                            vertices = self.pending_vertices().len(),
                            "polygon not complete yet"
                        );
                        return ToolOutcome::Ignored;
                    }
                }
                let Some(Gesture::Vertices { points, .. }) = self.gesture.take() else {
                    return ToolOutcome::Ignored;
                };
                commit_path(kind, &points, ctx)
            }
            ToolEvent::PointerUp { .. } => ToolOutcome::Ignored,
        }
    }

    fn handle_path(
        &mut self,
        kind: AnnotationType,
        event: ToolEvent,
        ctx: &GestureContext<'_>,
    ) -> ToolOutcome {
        match event {
            ToolEvent::PointerDown {
                pos,
                button: PointerButton::Primary,
            } => {
                self.gesture = Some(Gesture::Path { points: vec![pos] });
                ToolOutcome::PreviewChanged
            }
            ToolEvent::PointerMove { pos } => {
                let spacing = self.ink_min_spacing;
                match &mut self.gesture {
                    Some(Gesture::Path { points }) => {
                        if push_spaced(points, pos, spacing) {
                            ToolOutcome::PreviewChanged
                        } else {
                            ToolOutcome::Ignored
                        }
                    }
                    _ => ToolOutcome::Ignored,
                }
            }
            ToolEvent::PointerUp { pos } => {
                let Some(Gesture::Path { mut points }) = self.gesture.take() else {
                    return ToolOutcome::Ignored;
                };
                push_spaced(&mut points, pos, self.ink_min_spacing);
                if points.len() < kind.min_vertices().unwrap_or(2) {
                    debug!("ink stroke too short");
                    return ToolOutcome::Discarded;
                }
                commit_path(kind, &points, ctx)
            }
            _ => ToolOutcome::Ignored,
        }
    }

    /// Current provisional shape, if a gesture is in progress
    pub fn preview(&self) -> Option<Preview> {
        let kind = self.selected?;
        let shape = match self.gesture.as_ref()? {
            Gesture::Drag { anchor, current } => PreviewShape::Rect {
                anchor: *anchor,
                current: *current,
            },
            Gesture::Vertices { points, cursor } => PreviewShape::Polygon {
                points: points.clone(),
                cursor: *cursor,
            },
            Gesture::Path { points } => PreviewShape::Path {
                points: points.clone(),
            },
        };
        Some(Preview { kind, shape })
    }
}

fn push_spaced(points: &mut Vec<CanvasPoint>, pos: CanvasPoint, spacing: f32) -> bool {
    match points.last() {
        Some(last) if last.distance_to(&pos) < spacing.max(f32::EPSILON) => false,
        _ => {
            points.push(pos);
            true
        }
    }
}

fn commit_path(
    kind: AnnotationType,
    points: &[CanvasPoint],
    ctx: &GestureContext<'_>,
) -> ToolOutcome {
    let vertices: Vec<DocPoint> = points
        .iter()
        .map(|p| ctx.mapper.canvas_to_document(*p))
        .collect();
    let Some(rect) = DocRect::bounding(&vertices) else {
        return ToolOutcome::Discarded;
    };
    let annotation = Annotation::new(kind, ctx.page, rect, tool_style(kind).color, ctx.author)
        .with_vertices(vertices);
    finish(annotation)
}

fn finish(annotation: Annotation) -> ToolOutcome {
    if let Err(err) = annotation.validate() {
        warn!(%err, kind = %annotation.kind(), "gesture produced an invalid annotation");
        return ToolOutcome::Discarded;
    }
    debug!(id = %annotation.id(), kind = %annotation.kind(), "gesture committed");
    ToolOutcome::Committed(annotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Color;

    fn down(x: f32, y: f32) -> ToolEvent {
        ToolEvent::PointerDown {
            pos: CanvasPoint::new(x, y),
            button: PointerButton::Primary,
        }
    }

    fn mv(x: f32, y: f32) -> ToolEvent {
        ToolEvent::PointerMove {
            pos: CanvasPoint::new(x, y),
        }
    }

    fn up(x: f32, y: f32) -> ToolEvent {
        ToolEvent::PointerUp {
            pos: CanvasPoint::new(x, y),
        }
    }

    fn run(
        machine: &mut ToolStateMachine,
        events: &[ToolEvent],
        prompt: &mut dyn TextPrompt,
    ) -> Vec<ToolOutcome> {
        let mapper = CoordinateMapper::new(1.0, 800.0).unwrap();
        let ctx = GestureContext {
            mapper: &mapper,
            page: 0,
            author: "User",
        };
        events
            .iter()
            .map(|e| machine.handle(*e, &ctx, prompt))
            .collect()
    }

    fn committed(outcomes: &[ToolOutcome]) -> Option<&Annotation> {
        outcomes.iter().find_map(|o| match o {
            ToolOutcome::Committed(a) => Some(a),
            _ => None,
        })
    }

    #[test]
    fn test_no_tool_ignores_input() {
        let mut machine = ToolStateMachine::new();
        let out = run(&mut machine, &[down(1.0, 1.0), up(5.0, 5.0)], &mut NoPrompt);
        assert_eq!(out, vec![ToolOutcome::Ignored, ToolOutcome::Ignored]);
        assert_eq!(machine.state(), ToolState::Idle);
    }

    #[test]
    fn test_square_drag_commits_flipped_rect() {
        let mut machine = ToolStateMachine::new();
        machine.select_tool(Some(AnnotationType::Square));
        let out = run(
            &mut machine,
            &[down(100.0, 100.0), mv(150.0, 120.0), up(200.0, 150.0)],
            &mut NoPrompt,
        );

        let a = committed(&out).unwrap();
        assert_eq!(a.kind(), AnnotationType::Square);
        assert_eq!(a.rect().to_array(), [100.0, 650.0, 200.0, 700.0]);
        assert_eq!(a.color(), Color::GREEN);
        assert_eq!(a.author(), "User");
        assert_eq!(machine.state(), ToolState::Idle);
        assert!(machine.preview().is_none());
    }

    #[test]
    fn test_reverse_drag_is_normalized() {
        let mut machine = ToolStateMachine::new();
        machine.select_tool(Some(AnnotationType::Highlight));
        let out = run(&mut machine, &[down(200.0, 150.0), up(100.0, 100.0)], &mut NoPrompt);
        let a = committed(&out).unwrap();
        assert_eq!(a.rect().to_array(), [100.0, 650.0, 200.0, 700.0]);
        assert_eq!(a.color(), Color::YELLOW);
    }

    #[test]
    fn test_preview_tracks_pointer() {
        let mut machine = ToolStateMachine::new();
        machine.select_tool(Some(AnnotationType::Circle));
        run(&mut machine, &[down(10.0, 10.0), mv(40.0, 30.0)], &mut NoPrompt);

        assert_eq!(machine.state(), ToolState::Drawing);
        assert_eq!(
            machine.preview(),
            Some(Preview {
                kind: AnnotationType::Circle,
                shape: PreviewShape::Rect {
                    anchor: CanvasPoint::new(10.0, 10.0),
                    current: CanvasPoint::new(40.0, 30.0),
                },
            })
        );
    }

    #[test]
    fn test_switching_tool_discards_gesture() {
        let mut machine = ToolStateMachine::new();
        machine.select_tool(Some(AnnotationType::Square));
        run(&mut machine, &[down(10.0, 10.0), mv(40.0, 30.0)], &mut NoPrompt);

        assert_eq!(
            machine.select_tool(Some(AnnotationType::Circle)),
            ToolOutcome::Discarded
        );
        assert_eq!(machine.state(), ToolState::Idle);

        // The release that follows belongs to no gesture
        let out = run(&mut machine, &[up(50.0, 50.0)], &mut NoPrompt);
        assert_eq!(out, vec![ToolOutcome::Ignored]);
    }

    #[test]
    fn test_free_text_uses_prompt() {
        let mut machine = ToolStateMachine::new();
        machine.select_tool(Some(AnnotationType::FreeText));
        let mut prompt = |_: &DocRect| Some("Check this".to_string());
        let out = run(&mut machine, &[down(10.0, 10.0), up(110.0, 60.0)], &mut prompt);

        let a = committed(&out).unwrap();
        assert_eq!(a.contents(), Some("Check this"));
        assert_eq!(a.color(), Color::BLACK);
    }

    #[test]
    fn test_free_text_cancelled() {
        let mut machine = ToolStateMachine::new();
        machine.select_tool(Some(AnnotationType::FreeText));

        let out = run(&mut machine, &[down(10.0, 10.0), up(110.0, 60.0)], &mut NoPrompt);
        assert_eq!(out[1], ToolOutcome::Discarded);

        let mut empty = |_: &DocRect| Some(String::new());
        let out = run(&mut machine, &[down(10.0, 10.0), up(110.0, 60.0)], &mut empty);
        assert_eq!(out[1], ToolOutcome::Discarded);
        assert_eq!(machine.state(), ToolState::Idle);
    }

    #[test]
    fn test_polygon_needs_three_vertices() {
        let mut machine = ToolStateMachine::new();
        machine.select_tool(Some(AnnotationType::Polygon));
        let out = run(
            &mut machine,
            &[down(10.0, 10.0), up(10.0, 10.0), down(50.0, 10.0), ToolEvent::Complete],
            &mut NoPrompt,
        );

        assert_eq!(out[3], ToolOutcome::Ignored);
        assert_eq!(machine.state(), ToolState::Drawing);
        assert_eq!(
            machine.pending_vertices(),
            &[CanvasPoint::new(10.0, 10.0), CanvasPoint::new(50.0, 10.0)]
        );

        // Keep adding after the premature complete
        let out = run(&mut machine, &[down(30.0, 40.0), ToolEvent::Complete], &mut NoPrompt);
        let a = committed(&out).unwrap();
        assert_eq!(a.vertices().len(), 3);
        assert_eq!(a.rect().to_array(), [10.0, 760.0, 50.0, 790.0]);
        assert_eq!(a.vertices()[0], DocPoint::new(10.0, 790.0));
        assert_eq!(machine.state(), ToolState::Idle);
    }

    #[test]
    fn test_polygon_secondary_click_completes() {
        let mut machine = ToolStateMachine::new();
        machine.select_tool(Some(AnnotationType::Polygon));
        let out = run(
            &mut machine,
            &[
                down(0.0, 0.0),
                down(10.0, 0.0),
                down(10.0, 10.0),
                ToolEvent::PointerDown {
                    pos: CanvasPoint::new(99.0, 99.0),
                    button: PointerButton::Secondary,
                },
            ],
            &mut NoPrompt,
        );
        let a = committed(&out).unwrap();
        assert_eq!(a.kind(), AnnotationType::Polygon);
        assert_eq!(a.vertices().len(), 3);
    }

    #[test]
    fn test_ink_samples_with_spacing() {
        let mut machine = ToolStateMachine::new().with_ink_spacing(5.0);
        machine.select_tool(Some(AnnotationType::Ink));
        let out = run(
            &mut machine,
            &[down(0.0, 0.0), mv(1.0, 0.0), mv(10.0, 0.0), mv(12.0, 0.0), up(20.0, 0.0)],
            &mut NoPrompt,
        );

        assert_eq!(out[1], ToolOutcome::Ignored);
        assert_eq!(out[2], ToolOutcome::PreviewChanged);
        let a = committed(&out).unwrap();
        assert_eq!(a.vertices().len(), 3);
        assert_eq!(a.color(), Color::RED);
    }

    #[test]
    fn test_ink_single_point_discarded() {
        let mut machine = ToolStateMachine::new();
        machine.select_tool(Some(AnnotationType::Ink));
        let out = run(&mut machine, &[down(5.0, 5.0), up(5.0, 5.0)], &mut NoPrompt);
        assert_eq!(out[1], ToolOutcome::Discarded);
    }
}
