//! Temporal majority filter over per-frame gesture labels.

use std::collections::VecDeque;

use crate::gestures::GestureLabel;

#[derive(Debug, Clone)]
pub struct DebounceWindow {
    labels: VecDeque<GestureLabel>,
    capacity: usize,
}

impl DebounceWindow {
    /// Starts full of `NoGesture`: a fresh window needs a quorum like any
    /// other before it confirms a pose.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            labels: std::iter::repeat_n(GestureLabel::NoGesture, capacity).collect(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append this frame's label and return the confirmed one.
    ///
    /// Impulse labels (swipes) are returned as-is for the frame they fire on
    /// and recorded as `NoGesture`, so they are confirmed exactly once.
    pub fn push(&mut self, label: GestureLabel) -> GestureLabel {
        let recorded = if label.is_impulse() {
            GestureLabel::NoGesture
        } else {
            label
        };
        if self.labels.len() == self.capacity {
            self.labels.pop_front();
        }
        self.labels.push_back(recorded);

        if label.is_impulse() {
            label
        } else {
            self.majority()
        }
    }

    /// Most frequent label in the window. Ties go to the label seen most
    /// recently.
    pub fn majority(&self) -> GestureLabel {
        // (label, count, newest position)
        let mut tally: Vec<(GestureLabel, usize, usize)> = Vec::with_capacity(self.capacity);
        for (pos, label) in self.labels.iter().enumerate() {
            match tally.iter_mut().find(|(l, _, _)| l == label) {
                Some(entry) => {
                    entry.1 += 1;
                    entry.2 = pos;
                }
                None => tally.push((*label, 1, pos)),
            }
        }
        tally
            .into_iter()
            .max_by_key(|(_, count, newest)| (*count, *newest))
            .map(|(label, _, _)| label)
            .unwrap_or(GestureLabel::NoGesture)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}
