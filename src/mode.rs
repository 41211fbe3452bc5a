//! Mode state machine.
//!
//! Idle is the only unlocked resting state. A confirmed selection gesture in
//! Idle locks one tool mode; from then on only OpenHand (or a voice Stop) gets
//! back out. Zoom is transient: it is held only while a zoom gesture stays
//! confirmed and never locks.

use std::fmt;
use std::str::FromStr;

use log::info;
use serde::Serialize;

use crate::gestures::GestureLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Draw,
    Erase,
    Highlight,
    Laser,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draw => "draw",
            Self::Erase => "erase",
            Self::Highlight => "highlight",
            Self::Laser => "laser",
        }
    }

    /// Selection table: which confirmed gesture locks which tool.
    pub fn selected_by(label: GestureLabel) -> Option<Tool> {
        match label {
            GestureLabel::Point => Some(Tool::Draw),
            GestureLabel::Fist => Some(Tool::Erase),
            GestureLabel::PinchOpen => Some(Tool::Highlight),
            GestureLabel::LaserPoint => Some(Tool::Laser),
            _ => None,
        }
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draw" => Ok(Tool::Draw),
            "erase" => Ok(Tool::Erase),
            "highlight" => Ok(Tool::Highlight),
            "laser" => Ok(Tool::Laser),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "tool")]
pub enum Mode {
    Idle,
    Zoom,
    Locked(Tool),
}

impl Mode {
    pub fn is_locked(&self) -> bool {
        matches!(self, Mode::Locked(_))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Idle => f.write_str("idle"),
            Mode::Zoom => f.write_str("zoom"),
            Mode::Locked(t) => f.write_str(t.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideStep {
    Next,
    Previous,
}

/// What a single confirmed gesture did to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Lock(Tool),
    /// OpenHand or voice Stop: back to Idle, stroke and swipe state dropped.
    Reset,
    ZoomStep(i8),
    Navigate(SlideStep),
}

#[derive(Debug)]
pub struct ModeMachine {
    mode: Mode,
    last_confirmed: GestureLabel,
}

impl Default for ModeMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeMachine {
    pub fn new() -> Self {
        Self {
            mode: Mode::Idle,
            last_confirmed: GestureLabel::NoGesture,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn apply(&mut self, confirmed: GestureLabel) -> Transition {
        let prev = std::mem::replace(&mut self.last_confirmed, confirmed);

        // universal escape hatch, checked before anything else
        if confirmed == GestureLabel::OpenHand {
            self.set(Mode::Idle, confirmed);
            return Transition::Reset;
        }

        match self.mode {
            // locked: only the tool's own sub-gestures matter, and those are
            // evaluated by the stroke tracker
            Mode::Locked(_) => Transition::Stay,
            Mode::Zoom => match zoom_delta(confirmed) {
                // edge-triggered: one step per change of direction
                Some(delta) if confirmed != prev => Transition::ZoomStep(delta),
                Some(_) => Transition::Stay,
                None => {
                    self.set(Mode::Idle, confirmed);
                    self.from_idle(confirmed)
                }
            },
            Mode::Idle => self.from_idle(confirmed),
        }
    }

    fn from_idle(&mut self, confirmed: GestureLabel) -> Transition {
        if let Some(delta) = zoom_delta(confirmed) {
            self.set(Mode::Zoom, confirmed);
            return Transition::ZoomStep(delta);
        }
        match confirmed {
            GestureLabel::SwipeRight => return Transition::Navigate(SlideStep::Next),
            GestureLabel::SwipeLeft => return Transition::Navigate(SlideStep::Previous),
            _ => {}
        }
        match Tool::selected_by(confirmed) {
            Some(tool) => {
                self.set(Mode::Locked(tool), confirmed);
                Transition::Lock(tool)
            }
            None => Transition::Stay,
        }
    }

    /// Voice override: lock `tool` regardless of the current mode.
    pub fn force(&mut self, tool: Tool) {
        let from = self.mode;
        self.mode = Mode::Locked(tool);
        if from != self.mode {
            info!("mode: {from} -> {} (voice)", self.mode);
        }
    }

    /// Voice override: unlock to Idle.
    pub fn force_idle(&mut self) {
        let from = self.mode;
        self.mode = Mode::Idle;
        if from != Mode::Idle {
            info!("mode: {from} -> idle (voice)");
        }
    }

    fn set(&mut self, mode: Mode, cause: GestureLabel) {
        if self.mode != mode {
            info!("mode: {} -> {} ({})", self.mode, mode, cause.as_str());
            self.mode = mode;
        }
    }
}

fn zoom_delta(label: GestureLabel) -> Option<i8> {
    match label {
        GestureLabel::ZoomIn => Some(1),
        GestureLabel::ZoomOut => Some(-1),
        _ => None,
    }
}
