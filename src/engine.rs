//! Per-frame pipeline: extract -> classify -> debounce -> mode -> primitives.
//!
//! One `Engine` owns every piece of cross-frame state (swipe history,
//! debounce window, mode, stroke cursor). `process` runs synchronously to
//! completion for each frame; voice commands are applied between frames.

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::Profile;
use crate::debounce::DebounceWindow;
use crate::gestures::{GestureClassifier, GestureLabel};
use crate::input::HandInput;
use crate::landmarks::{self, HandMetrics};
use crate::mode::{Mode, ModeMachine, SlideStep, Transition};
use crate::tracker::{Primitive, StrokeTracker};
use crate::voice::VoiceCommand;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameOutput {
    pub frame: u64,
    pub mode: Mode,
    pub locked: bool,
    /// classifier output before debouncing
    pub raw: GestureLabel,
    pub confirmed: GestureLabel,
    pub primitives: Vec<Primitive>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceOutput {
    pub command: VoiceCommand,
    pub mode: Mode,
    pub locked: bool,
    pub primitives: Vec<Primitive>,
}

/// Everything the pipeline publishes to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum Output {
    Frame(FrameOutput),
    Voice(VoiceOutput),
}

#[derive(Debug)]
pub struct Engine {
    classifier: GestureClassifier,
    debounce: DebounceWindow,
    machine: ModeMachine,
    tracker: StrokeTracker,
    frames: u64,
}

impl Engine {
    pub fn new(profile: &Profile) -> Self {
        Self {
            classifier: GestureClassifier::new(profile.thresholds.clone()),
            debounce: DebounceWindow::new(profile.thresholds.hold_frames),
            machine: ModeMachine::new(),
            tracker: StrokeTracker::new(profile.style.clone()),
            frames: 0,
        }
    }

    /// Swap thresholds and style. The current mode survives; the swipe
    /// history and the stroke restart. The debounce window is kept unless its
    /// size changed.
    pub fn reconfigure(&mut self, profile: &Profile) {
        self.classifier = GestureClassifier::new(profile.thresholds.clone());
        if self.debounce.capacity() != profile.thresholds.hold_frames.max(1) {
            self.debounce = DebounceWindow::new(profile.thresholds.hold_frames);
        }
        self.tracker = StrokeTracker::new(profile.style.clone());
        info!(
            "engine: reconfigured (hold_frames={}, swipe_window={})",
            profile.thresholds.hold_frames, profile.thresholds.swipe_window
        );
    }

    pub fn mode(&self) -> Mode {
        self.machine.mode()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Never fails: malformed frames are logged and treated as hand-absent.
    pub fn process(&mut self, input: HandInput) -> FrameOutput {
        self.frames += 1;
        let n = self.frames;

        let hand: Option<HandMetrics> = match input {
            HandInput::Present(set) => Some(landmarks::extract(&set)),
            HandInput::Absent => None,
            HandInput::Invalid(e) => {
                warn!("frame {n}: {e}; treating as no hand");
                None
            }
        };

        let raw = match &hand {
            Some(m) => self.classifier.classify(m),
            None => {
                self.classifier.reset();
                GestureLabel::NoGesture
            }
        };
        let confirmed = self.debounce.push(raw);

        let mut primitives = vec![];
        match self.machine.apply(confirmed) {
            Transition::Reset => {
                self.tracker.reset();
                self.classifier.reset();
            }
            Transition::ZoomStep(delta) => primitives.push(Primitive::ZoomStep { delta }),
            Transition::Navigate(step) => primitives.push(Primitive::Navigate { step }),
            Transition::Lock(_) | Transition::Stay => {}
        }

        let mode = self.machine.mode();
        primitives.extend(self.tracker.track(mode, hand.as_ref()));

        if raw != confirmed {
            debug!(
                "frame {n}: raw {} confirmed {} ({} in window)",
                raw.as_str(),
                confirmed.as_str(),
                self.debounce.len()
            );
        }

        FrameOutput {
            frame: n,
            mode,
            locked: mode.is_locked(),
            raw,
            confirmed,
            primitives,
        }
    }

    /// Apply a voice command between frames. Last writer wins: the next frame
    /// sees the mode this leaves behind.
    pub fn apply_voice(&mut self, command: VoiceCommand) -> VoiceOutput {
        info!("voice: {command:?}");
        let mut primitives = vec![];
        match command {
            VoiceCommand::Next => primitives.push(Primitive::Navigate {
                step: SlideStep::Next,
            }),
            VoiceCommand::Previous => primitives.push(Primitive::Navigate {
                step: SlideStep::Previous,
            }),
            VoiceCommand::SetMode(tool) => {
                self.machine.force(tool);
                self.tracker.reset();
            }
            VoiceCommand::Stop => {
                self.machine.force_idle();
                self.tracker.reset();
                self.classifier.reset();
            }
            VoiceCommand::Clear => primitives.push(Primitive::ClearRequest),
        }
        let mode = self.machine.mode();
        VoiceOutput {
            command,
            mode,
            locked: mode.is_locked(),
            primitives,
        }
    }

    pub fn stroke_active(&self) -> bool {
        self.tracker.cursor().is_set()
    }

    pub fn pen_paused(&self) -> bool {
        self.tracker.is_paused()
    }

    pub fn swipe_pending(&self) -> usize {
        self.classifier.swipe_history().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{LandmarkSet, fixtures::*};
    use crate::mode::Tool;

    fn engine() -> Engine {
        Engine::new(&Profile::builtin().unwrap())
    }

    fn run(e: &mut Engine, set: &LandmarkSet, frames: usize) -> Vec<FrameOutput> {
        (0..frames)
            .map(|_| e.process(HandInput::Present(set.clone())))
            .collect()
    }

    #[test]
    fn point_locks_draw_then_open_hand_returns_to_idle() {
        let mut e = engine();
        run(&mut e, &point(100.0, 100.0), 4);
        assert_eq!(e.mode(), Mode::Locked(Tool::Draw));

        // a few swipe-pose frames leave history behind
        run(&mut e, &two_finger(150.0, 100.0), 2);
        assert!(e.swipe_pending() > 0);

        let outs = run(&mut e, &open_hand(100.0, 100.0), 4);
        assert_eq!(outs.last().unwrap().mode, Mode::Idle);
        assert!(!outs.last().unwrap().locked);
        assert!(!e.stroke_active());
        assert_eq!(e.swipe_pending(), 0);
    }

    #[test]
    fn debounce_delays_selection() {
        let mut e = engine();
        let outs = run(&mut e, &fist(100.0, 100.0), 2);
        assert_eq!(outs[0].confirmed, GestureLabel::NoGesture);
        assert_eq!(outs[0].mode, Mode::Idle);
        assert_eq!(outs[1].confirmed, GestureLabel::Fist);
        assert_eq!(outs[1].mode, Mode::Locked(Tool::Erase));

        let mut e = engine();
        e.process(HandInput::Absent);
        e.process(HandInput::Absent);
        e.process(HandInput::Absent);
        let out = e.process(HandInput::Present(fist(100.0, 100.0)));
        assert_eq!(out.raw, GestureLabel::Fist);
        assert_eq!(out.confirmed, GestureLabel::NoGesture);
        assert_eq!(out.mode, Mode::Idle);
    }

    #[test]
    fn stray_frame_after_reconfigure_keeps_idle() {
        let mut e = engine();
        for _ in 0..6 {
            e.process(HandInput::Absent);
        }
        e.reconfigure(&Profile::builtin().unwrap());
        let out = e.process(HandInput::Present(fist(100.0, 100.0)));
        assert_eq!(out.confirmed, GestureLabel::NoGesture);
        assert_eq!(out.mode, Mode::Idle);

        // a different window size starts fresh, still full of NoGesture
        let mut p = Profile::builtin().unwrap();
        p.thresholds.hold_frames = 6;
        e.reconfigure(&p);
        let out = e.process(HandInput::Present(fist(100.0, 100.0)));
        assert_eq!(out.mode, Mode::Idle);
    }

    #[test]
    fn draw_strokes_connect_consecutive_frames() {
        let mut e = engine();
        let entering = run(&mut e, &point(100.0, 100.0), 2);
        assert_eq!(entering[0].mode, Mode::Idle);
        assert_eq!(entering[1].mode, Mode::Locked(Tool::Draw));
        assert!(entering[1].primitives.is_empty());

        let out = e.process(HandInput::Present(point(120.0, 100.0)));
        assert!(matches!(out.primitives.as_slice(), [Primitive::LineSegment { .. }]));

        // hand lost: stroke ends, mode stays
        let out = e.process(HandInput::Absent);
        assert!(out.primitives.is_empty());
        assert_eq!(out.mode, Mode::Locked(Tool::Draw));
        let out = e.process(HandInput::Present(point(300.0, 100.0)));
        assert!(out.primitives.is_empty());
    }

    #[test]
    fn malformed_frames_never_escape() {
        let mut e = engine();
        run(&mut e, &fist(100.0, 100.0), 4);
        let out = e.process(HandInput::Invalid(crate::error::GestureError::InvalidInput {
            expected: 21,
            got: 3,
        }));
        assert_eq!(out.raw, GestureLabel::NoGesture);
        assert_eq!(out.mode, Mode::Locked(Tool::Erase));
        assert!(out.primitives.is_empty());
    }

    #[test]
    fn one_zoom_step_per_gesture() {
        let mut e = engine();
        let outs = run(&mut e, &bunched(300.0, 300.0, 10.0), 10);
        let steps: Vec<&Primitive> = outs
            .iter()
            .flat_map(|o| o.primitives.iter())
            .filter(|p| matches!(p, Primitive::ZoomStep { .. }))
            .collect();
        assert_eq!(steps, vec![&Primitive::ZoomStep { delta: 1 }]);
        assert_eq!(e.mode(), Mode::Zoom);
    }

    #[test]
    fn idle_swipe_navigates_once() {
        let mut e = engine();
        let mut navs = 0;
        for i in 0..8 {
            let out = e.process(HandInput::Present(two_finger(100.0 + i as f32 * 30.0, 300.0)));
            navs += out
                .primitives
                .iter()
                .filter(|p| **p == Primitive::Navigate { step: SlideStep::Next })
                .count();
        }
        assert_eq!(navs, 1);
        assert_eq!(e.mode(), Mode::Idle);
    }

    #[test]
    fn voice_overrides_apply_between_frames() {
        let mut e = engine();
        run(&mut e, &point(100.0, 100.0), 3);
        let v = e.apply_voice(VoiceCommand::SetMode(Tool::Highlight));
        assert_eq!(v.mode, Mode::Locked(Tool::Highlight));
        assert!(!e.stroke_active());

        let out = e.process(HandInput::Present(point(100.0, 100.0)));
        assert!(matches!(out.primitives.as_slice(), [Primitive::FilledCircle { .. }]));

        let v = e.apply_voice(VoiceCommand::Stop);
        assert_eq!(v.mode, Mode::Idle);
        assert!(!v.locked);

        let v = e.apply_voice(VoiceCommand::Clear);
        assert_eq!(v.primitives, vec![Primitive::ClearRequest]);
        let v = e.apply_voice(VoiceCommand::Previous);
        assert_eq!(
            v.primitives,
            vec![Primitive::Navigate {
                step: SlideStep::Previous
            }]
        );
    }

    #[test]
    fn output_serializes_for_subscribers() {
        let mut e = engine();
        e.process(HandInput::Present(point(100.0, 100.0)));
        let out = Output::Frame(e.process(HandInput::Present(point(100.0, 100.0))));
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["event"], "frame");
        assert_eq!(v["mode"]["state"], "locked");
        assert_eq!(v["mode"]["tool"], "draw");
        assert_eq!(v["confirmed"], "point");
    }
}
