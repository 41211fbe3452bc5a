use std::collections::VecDeque;

use serde::Serialize;

use crate::config::Thresholds;
use crate::landmarks::HandMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureLabel {
    NoGesture,
    Point,
    Fist,
    PinchOpen,
    ZoomIn,
    ZoomOut,
    SwipeLeft,
    SwipeRight,
    OpenHand,
    /// index, middle and ring up, pinky folded
    LaserPoint,
}

impl GestureLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoGesture => "no_gesture",
            Self::Point => "point",
            Self::Fist => "fist",
            Self::PinchOpen => "pinch_open",
            Self::ZoomIn => "zoom_in",
            Self::ZoomOut => "zoom_out",
            Self::SwipeLeft => "swipe_left",
            Self::SwipeRight => "swipe_right",
            Self::OpenHand => "open_hand",
            Self::LaserPoint => "laser_point",
        }
    }

    /// Motion-derived labels. These already integrate a window of frames and
    /// fire on a single frame, so they are not subject to majority voting.
    pub fn is_impulse(&self) -> bool {
        matches!(self, Self::SwipeLeft | Self::SwipeRight)
    }
}

/// Rolling horizontal positions while the two-finger swipe pose is held.
#[derive(Debug, Clone)]
pub struct SwipeHistory {
    xs: VecDeque<f32>,
    capacity: usize,
}

impl SwipeHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            xs: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, x: f32) {
        if self.xs.len() == self.capacity {
            self.xs.pop_front();
        }
        self.xs.push_back(x);
    }

    pub fn is_full(&self) -> bool {
        self.xs.len() == self.capacity
    }

    /// newest - oldest
    pub fn displacement(&self) -> f32 {
        match (self.xs.front(), self.xs.back()) {
            (Some(a), Some(b)) => b - a,
            _ => 0.0,
        }
    }

    pub fn clear(&mut self) {
        self.xs.clear();
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }
}

/// Per-frame classifier. The only state it carries is the swipe history.
#[derive(Debug)]
pub struct GestureClassifier {
    th: Thresholds,
    swipe: SwipeHistory,
}

impl GestureClassifier {
    pub fn new(th: Thresholds) -> Self {
        let swipe = SwipeHistory::new(th.swipe_window);
        Self { th, swipe }
    }

    /// First match wins. The order matters: an open hand or a zoom spread can
    /// also satisfy later, broader rules.
    pub fn classify(&mut self, m: &HandMetrics) -> GestureLabel {
        let f = &m.fingers;

        // leaving the swipe pose always drops the history
        if !f.is_two_finger() {
            self.swipe.clear();
        }

        if f.all_extended() {
            return GestureLabel::OpenHand;
        }

        let near = self.th.zoom_in_ratio * m.hand_scale;
        if m.tip_distances.iter().all(|d| *d < near) {
            return GestureLabel::ZoomIn;
        }
        let far = self.th.zoom_out_ratio * m.hand_scale;
        if m.tip_distances.iter().all(|d| *d > far) {
            return GestureLabel::ZoomOut;
        }

        if f.none_extended() {
            return GestureLabel::Fist;
        }

        if m.pinch_distance < self.th.pinch_px {
            return GestureLabel::PinchOpen;
        }

        if f.is_point() {
            return GestureLabel::Point;
        }

        if f.is_three_finger() {
            return GestureLabel::LaserPoint;
        }

        if f.is_two_finger() {
            return self.track_swipe(m.swipe_x);
        }

        GestureLabel::NoGesture
    }

    fn track_swipe(&mut self, x: f32) -> GestureLabel {
        self.swipe.push(x);
        if !self.swipe.is_full() {
            return GestureLabel::NoGesture;
        }
        let dx = self.swipe.displacement();
        if dx > self.th.swipe_threshold_px {
            self.swipe.clear();
            GestureLabel::SwipeRight
        } else if dx < -self.th.swipe_threshold_px {
            self.swipe.clear();
            GestureLabel::SwipeLeft
        } else {
            GestureLabel::NoGesture
        }
    }

    /// Hand lost or mode reset: the swipe pose is broken.
    pub fn reset(&mut self) {
        self.swipe.clear();
    }

    pub fn swipe_history(&self) -> &SwipeHistory {
        &self.swipe
    }
}
