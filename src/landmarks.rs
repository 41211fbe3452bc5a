//! Landmark frames and the finger state extractor.
//!
//! A `LandmarkSet` is the 21-point hand skeleton produced by the external tracker
//! for one frame, in pixel space. `extract` turns it into the boolean finger
//! flags and distances the classifier works from.

use serde::{Deserialize, Serialize};

use crate::error::GestureError;

pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_MCP: usize = 2;
pub const THUMB_TIP: usize = 4;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_PIP: usize = 14;
pub const RING_TIP: usize = 16;
pub const PINKY_PIP: usize = 18;
pub const PINKY_TIP: usize = 20;

/// Fingertips in thumb -> pinky order.
pub const FINGERTIPS: [usize; 5] = [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// Number of unordered fingertip pairs (5 choose 2).
pub const TIP_PAIRS: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f32,
    pub y: f32,
}

impl Point2D {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// One frame's hand skeleton. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: [Point2D; LANDMARK_COUNT],
}

impl LandmarkSet {
    pub fn new(points: Vec<Point2D>) -> Result<Self, GestureError> {
        let got = points.len();
        let points: [Point2D; LANDMARK_COUNT] =
            points.try_into().map_err(|_| GestureError::InvalidInput {
                expected: LANDMARK_COUNT,
                got,
            })?;
        Ok(Self { points })
    }

    pub fn point(&self, idx: usize) -> Point2D {
        self.points[idx]
    }

    /// Wrist to middle-finger MCP, used to normalize thresholds against the
    /// hand's apparent size.
    pub fn hand_scale(&self) -> f32 {
        self.points[WRIST].distance(&self.points[MIDDLE_MCP])
    }

    fn is_extended(&self, tip: usize, pip: usize) -> bool {
        // image coordinates: smaller y is higher on screen
        self.points[tip].y < self.points[pip].y
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FingerState {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerState {
    pub fn all_extended(&self) -> bool {
        self.thumb && self.index && self.middle && self.ring && self.pinky
    }

    pub fn none_extended(&self) -> bool {
        !(self.thumb || self.index || self.middle || self.ring || self.pinky)
    }

    /// Index up, middle/ring/pinky down. Thumb is ignored.
    pub fn is_point(&self) -> bool {
        self.index && !self.middle && !self.ring && !self.pinky
    }

    /// Index and middle up, ring and pinky down. Thumb is ignored.
    pub fn is_two_finger(&self) -> bool {
        self.index && self.middle && !self.ring && !self.pinky
    }

    /// Index, middle and ring up, pinky down. Thumb is ignored.
    pub fn is_three_finger(&self) -> bool {
        self.index && self.middle && self.ring && !self.pinky
    }
}

/// Everything the classifier and the continuous trackers need from one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HandMetrics {
    pub fingers: FingerState,
    /// index tip <-> thumb tip, pixels
    pub pinch_distance: f32,
    /// all pairwise fingertip distances, pixels
    pub tip_distances: [f32; TIP_PAIRS],
    pub hand_scale: f32,
    pub index_tip: Point2D,
    /// horizontal midpoint of the index and middle tips
    pub swipe_x: f32,
}

pub fn extract(set: &LandmarkSet) -> HandMetrics {
    let fingers = FingerState {
        thumb: set.is_extended(THUMB_TIP, THUMB_MCP),
        index: set.is_extended(INDEX_TIP, INDEX_PIP),
        middle: set.is_extended(MIDDLE_TIP, MIDDLE_PIP),
        ring: set.is_extended(RING_TIP, RING_PIP),
        pinky: set.is_extended(PINKY_TIP, PINKY_PIP),
    };

    let mut tip_distances = [0.0f32; TIP_PAIRS];
    let mut k = 0;
    for i in 0..FINGERTIPS.len() {
        for j in (i + 1)..FINGERTIPS.len() {
            tip_distances[k] = set.point(FINGERTIPS[i]).distance(&set.point(FINGERTIPS[j]));
            k += 1;
        }
    }

    let index_tip = set.point(INDEX_TIP);
    HandMetrics {
        fingers,
        pinch_distance: index_tip.distance(&set.point(THUMB_TIP)),
        tip_distances,
        hand_scale: set.hand_scale(),
        index_tip,
        swipe_x: (index_tip.x + set.point(MIDDLE_TIP).x) / 2.0,
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn rejects_wrong_point_count() {
        let err = LandmarkSet::new(vec![Point2D::default(); 20]).unwrap_err();
        assert_eq!(
            err,
            GestureError::InvalidInput {
                expected: 21,
                got: 20
            }
        );
        assert!(LandmarkSet::new(vec![Point2D::default(); 22]).is_err());
    }

    #[test]
    fn finger_flags_follow_tip_above_pip() {
        let m = extract(&point(300.0, 300.0));
        assert!(m.fingers.index);
        assert!(!m.fingers.middle && !m.fingers.ring && !m.fingers.pinky && !m.fingers.thumb);
        assert!(m.fingers.is_point());

        assert!(extract(&open_hand(0.0, 0.0)).fingers.all_extended());
        assert!(extract(&fist(0.0, 0.0)).fingers.none_extended());
        assert!(extract(&two_finger(0.0, 0.0)).fingers.is_two_finger());
        assert!(extract(&three_finger(0.0, 0.0)).fingers.is_three_finger());
    }

    #[test]
    fn extraction_is_deterministic() {
        let set = pinch(200.0, 150.0);
        assert_eq!(extract(&set), extract(&set));
    }

    #[test]
    fn distances_and_scale() {
        let m = extract(&open_hand(100.0, 100.0));
        assert!((m.hand_scale - 100.0).abs() < 1e-3);
        // thumb (-60) to index (-30), same height
        assert!((m.pinch_distance - 30.0).abs() < 1e-3);
        // thumb to pinky is the widest pair
        let max = m.tip_distances.iter().cloned().fold(0.0f32, f32::max);
        assert!((max - 120.0).abs() < 1e-3);
        assert!((m.swipe_x - 85.0).abs() < 1e-3);
        assert_eq!(m.index_tip, Point2D::new(70.0, 140.0));
    }
}
