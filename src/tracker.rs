//! Continuous per-mode tracking: pen strokes and per-frame tool marks.

use serde::Serialize;

use crate::config::{Color, Style};
use crate::landmarks::{HandMetrics, Point2D};
use crate::mode::{Mode, SlideStep, Tool};

/// Drawing instructions for the external renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Primitive {
    LineSegment {
        from: Point2D,
        to: Point2D,
        color: Color,
        thickness: f32,
    },
    FilledCircle {
        center: Point2D,
        radius: f32,
        color: Color,
        alpha: f32,
    },
    /// Replaces the previous marker; never accumulates on the canvas.
    LaserMarker {
        at: Point2D,
        radius: f32,
        color: Color,
    },
    ZoomStep {
        delta: i8,
    },
    Navigate {
        step: SlideStep,
    },
    ClearRequest,
}

/// Last committed pen position, unset between strokes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StrokeCursor(Option<Point2D>);

impl StrokeCursor {
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn unset(&mut self) {
        self.0 = None;
    }

    /// Move the pen; returns the previous position when there was one.
    fn advance(&mut self, to: Point2D) -> Option<Point2D> {
        self.0.replace(to)
    }
}

#[derive(Debug)]
pub struct StrokeTracker {
    style: Style,
    cursor: StrokeCursor,
    paused: bool,
}

impl StrokeTracker {
    pub fn new(style: Style) -> Self {
        Self {
            style,
            cursor: StrokeCursor::default(),
            paused: false,
        }
    }

    pub fn cursor(&self) -> StrokeCursor {
        self.cursor
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Start the next mark as a new sub-path.
    pub fn reset(&mut self) {
        self.cursor.unset();
        self.paused = false;
    }

    /// Primitives for one frame in `mode`. `hand` is `None` when the hand was
    /// not detected.
    pub fn track(&mut self, mode: Mode, hand: Option<&HandMetrics>) -> Vec<Primitive> {
        let tool = match mode {
            Mode::Locked(tool) => tool,
            Mode::Idle | Mode::Zoom => {
                self.reset();
                return vec![];
            }
        };
        let Some(hand) = hand else {
            // lost hand ends the stroke, not the mode
            self.cursor.unset();
            return vec![];
        };
        let at = hand.index_tip;
        let st = &self.style;

        match tool {
            Tool::Draw => {
                // two fingers up pauses the pen without leaving Draw
                if hand.fingers.is_two_finger() {
                    self.paused = true;
                    self.cursor.unset();
                    return vec![];
                }
                self.paused = false;
                match self.cursor.advance(at) {
                    Some(from) => vec![Primitive::LineSegment {
                        from,
                        to: at,
                        color: st.draw_color,
                        thickness: st.draw_thickness,
                    }],
                    None => vec![],
                }
            }
            Tool::Erase => vec![Primitive::FilledCircle {
                center: at,
                radius: st.erase_radius,
                color: st.erase_color,
                alpha: 1.0,
            }],
            Tool::Highlight => vec![Primitive::FilledCircle {
                center: at,
                radius: st.highlight_radius,
                color: st.highlight_color,
                alpha: st.highlight_alpha,
            }],
            Tool::Laser => vec![Primitive::LaserMarker {
                at,
                radius: st.laser_radius,
                color: st.laser_color,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::landmarks::{extract, fixtures::*};

    fn tracker() -> StrokeTracker {
        StrokeTracker::new(Profile::builtin().unwrap().style)
    }

    const DRAW: Mode = Mode::Locked(Tool::Draw);

    #[test]
    fn first_frame_only_sets_cursor() {
        let mut t = tracker();
        let a = extract(&point(100.0, 100.0));
        let b = extract(&point(140.0, 120.0));
        assert!(t.track(DRAW, Some(&a)).is_empty());
        assert!(t.cursor().is_set());

        let out = t.track(DRAW, Some(&b));
        assert_eq!(out.len(), 1);
        match &out[0] {
            Primitive::LineSegment { from, to, .. } => {
                assert_eq!(*from, a.index_tip);
                assert_eq!(*to, b.index_tip);
            }
            other => panic!("expected a segment, got {other:?}"),
        }
    }

    #[test]
    fn hand_loss_starts_a_new_sub_path() {
        let mut t = tracker();
        t.track(DRAW, Some(&extract(&point(100.0, 100.0))));
        t.track(DRAW, Some(&extract(&point(110.0, 100.0))));
        assert!(t.track(DRAW, None).is_empty());
        assert!(!t.cursor().is_set());
        assert!(t.track(DRAW, Some(&extract(&point(400.0, 100.0)))).is_empty());
    }

    #[test]
    fn two_fingers_pause_drawing() {
        let mut t = tracker();
        t.track(DRAW, Some(&extract(&point(100.0, 100.0))));
        assert!(t.track(DRAW, Some(&extract(&two_finger(150.0, 100.0)))).is_empty());
        assert!(t.is_paused());
        assert!(!t.cursor().is_set());
        assert!(t.track(DRAW, Some(&extract(&point(200.0, 100.0)))).is_empty());
        assert!(!t.is_paused());
        assert_eq!(t.track(DRAW, Some(&extract(&point(210.0, 100.0)))).len(), 1);
    }

    #[test]
    fn erase_and_highlight_emit_every_frame() {
        let mut t = tracker();
        for i in 0..5 {
            let hand = extract(&fist(100.0 + i as f32 * 50.0, 100.0));
            let out = t.track(Mode::Locked(Tool::Erase), Some(&hand));
            assert!(matches!(
                out.as_slice(),
                [Primitive::FilledCircle { alpha, radius, .. }] if *alpha == 1.0 && *radius == 40.0
            ));
            assert!(!t.cursor().is_set());
        }
        for i in 0..5 {
            let hand = extract(&pinch(100.0, 100.0 + i as f32 * 50.0));
            let out = t.track(Mode::Locked(Tool::Highlight), Some(&hand));
            assert!(matches!(
                out.as_slice(),
                [Primitive::FilledCircle { alpha, .. }] if (*alpha - 0.4).abs() < 1e-6
            ));
        }
    }

    #[test]
    fn laser_marks_current_position() {
        let mut t = tracker();
        let hand = extract(&three_finger(320.0, 240.0));
        let out = t.track(Mode::Locked(Tool::Laser), Some(&hand));
        assert!(matches!(out.as_slice(), [Primitive::LaserMarker { at, .. }] if *at == hand.index_tip));
    }

    #[test]
    fn leaving_a_tool_unsets_cursor() {
        let mut t = tracker();
        t.track(DRAW, Some(&extract(&point(100.0, 100.0))));
        assert!(t.track(Mode::Idle, Some(&extract(&point(100.0, 100.0)))).is_empty());
        assert!(!t.cursor().is_set());
    }
}
