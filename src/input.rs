//! Frames from the external hand tracker: JSON wire form -> `HandInput`.

use serde::Deserialize;

use crate::error::GestureError;
use crate::landmarks::{LandmarkSet, Point2D};

/// One frame as the pipeline sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum HandInput {
    Present(LandmarkSet),
    /// No hand detected. Not an error.
    Absent,
    /// Dropped to NoGesture by the engine.
    Invalid(GestureError),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum RawPoint {
    Pair([f32; 2]),
    Object { x: f32, y: f32 },
}

impl From<RawPoint> for Point2D {
    fn from(p: RawPoint) -> Self {
        match p {
            RawPoint::Pair([x, y]) => Point2D::new(x, y),
            RawPoint::Object { x, y } => Point2D::new(x, y),
        }
    }
}

/// `{"landmarks": [[x,y],...] | null, "width"?: W, "height"?: H}`
///
/// With `width`/`height` present the coordinates are normalized to [0,1] and
/// get scaled to pixels.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameMessage {
    landmarks: Option<Vec<RawPoint>>,
    #[serde(default)]
    width: Option<f32>,
    #[serde(default)]
    height: Option<f32>,
}

impl FrameMessage {
    pub fn into_input(self) -> HandInput {
        let Some(raw) = self.landmarks else {
            return HandInput::Absent;
        };
        let (sx, sy) = match (self.width, self.height) {
            (Some(w), Some(h)) => (w, h),
            (None, None) => (1.0, 1.0),
            _ => {
                return HandInput::Invalid(GestureError::MalformedFrame(
                    "width and height must be given together".into(),
                ));
            }
        };
        let points = raw
            .into_iter()
            .map(Point2D::from)
            .map(|p| Point2D::new(p.x * sx, p.y * sy))
            .collect();
        match LandmarkSet::new(points) {
            Ok(set) => HandInput::Present(set),
            Err(e) => HandInput::Invalid(e),
        }
    }
}

/// Parse a frame carried in an IPC request or a replay file line.
pub fn frame_from_value(v: serde_json::Value) -> HandInput {
    match serde_json::from_value::<FrameMessage>(v) {
        Ok(msg) => msg.into_input(),
        Err(e) => HandInput::Invalid(GestureError::MalformedFrame(e.to_string())),
    }
}

pub fn parse_frame_line(line: &str) -> HandInput {
    match serde_json::from_str::<FrameMessage>(line) {
        Ok(msg) => msg.into_input(),
        Err(e) => HandInput::Invalid(GestureError::MalformedFrame(e.to_string())),
    }
}
