use anyhow::{Result, anyhow};
use log::info;
use serde::Serialize;
use std::{
    os::unix::net::UnixStream,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc::Receiver,
    },
    time::Duration,
};

use super::dispatch::Subscribers;
use crate::config::Profile;
use crate::engine::{Engine, Output};
use crate::gestures::GestureLabel;
use crate::handoff::{Latest, Recv};
use crate::input::HandInput;
use crate::mode::Mode;
use crate::voice::VoiceCommand;

// how long to wait for a frame before servicing voice/control again
const POLL: Duration = Duration::from_millis(20);

pub enum PipelineCtl {
    Voice(VoiceCommand),
    Subscribe(UnixStream),
    /// the shared profile changed
    Reconfigure,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub mode: Mode,
    pub locked: bool,
    pub confirmed: GestureLabel,
    pub frames: u64,
    pub dropped: u64,
    pub subscribers: usize,
    pub stroke_active: bool,
    pub pen_paused: bool,
    pub swipe_pending: usize,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self {
            mode: Mode::Idle,
            locked: false,
            confirmed: GestureLabel::NoGesture,
            frames: 0,
            dropped: 0,
            subscribers: 0,
            stroke_active: false,
            pen_paused: false,
            swipe_pending: 0,
        }
    }
}

pub fn run_pipeline(
    profile: Arc<Mutex<Profile>>,
    frames: Latest<HandInput>,
    ctl: Receiver<PipelineCtl>,
    status: Arc<Mutex<PipelineStatus>>,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let mut engine = {
        let p = profile
            .lock()
            .map_err(|_| anyhow!("profile lock poisoned"))?;
        Engine::new(&p)
    };
    let mut subs = Subscribers::default();
    info!("pipeline: running");

    while !stop.load(Ordering::Relaxed) {
        // side inputs land between frames, never inside one
        while let Ok(msg) = ctl.try_recv() {
            match msg {
                PipelineCtl::Voice(cmd) => {
                    let out = engine.apply_voice(cmd);
                    publish_status(&status, &engine, None, &frames, &subs);
                    subs.broadcast(&Output::Voice(out));
                }
                PipelineCtl::Subscribe(stream) => subs.add(stream),
                PipelineCtl::Reconfigure => {
                    if let Ok(p) = profile.lock() {
                        engine.reconfigure(&p);
                    }
                }
            }
        }

        match frames.recv_timeout(POLL) {
            Recv::Value(input) => {
                let out = engine.process(input);
                publish_status(&status, &engine, Some(out.confirmed), &frames, &subs);
                subs.broadcast(&Output::Frame(out));
            }
            Recv::Timeout => {}
            Recv::Closed => break,
        }
    }

    info!(
        "pipeline: stopped after {} frames ({} dropped)",
        engine.frames(),
        frames.dropped()
    );
    Ok(())
}

fn publish_status(
    status: &Mutex<PipelineStatus>,
    engine: &Engine,
    confirmed: Option<GestureLabel>,
    frames: &Latest<HandInput>,
    subs: &Subscribers,
) {
    if let Ok(mut st) = status.lock() {
        st.mode = engine.mode();
        st.locked = engine.mode().is_locked();
        if let Some(c) = confirmed {
            st.confirmed = c;
        }
        st.frames = engine.frames();
        st.dropped = frames.dropped();
        st.subscribers = subs.len();
        st.stroke_active = engine.stroke_active();
        st.pen_paused = engine.pen_paused();
        st.swipe_pending = engine.swipe_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff;
    use crate::landmarks::fixtures::*;
    use crate::mode::Tool;
    use std::{sync::mpsc, thread};

    #[test]
    fn runs_frames_and_voice_then_stops_cleanly() {
        let profile = Arc::new(Mutex::new(Profile::builtin().unwrap()));
        let (tx, rx) = handoff::latest();
        let (ctl_tx, ctl_rx) = mpsc::channel();
        let status = Arc::new(Mutex::new(PipelineStatus::default()));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let (profile, status, stop) = (profile.clone(), status.clone(), stop.clone());
            thread::spawn(move || run_pipeline(profile, rx, ctl_rx, status, stop))
        };

        // two frames of quorum before the pose locks
        tx.publish(HandInput::Present(point(100.0, 100.0)));
        wait_for(&status, |s| s.frames >= 1);
        assert_eq!(status.lock().unwrap().mode, Mode::Idle);
        tx.publish(HandInput::Present(point(100.0, 100.0)));
        wait_for(&status, |s| s.frames >= 2);
        assert_eq!(status.lock().unwrap().mode, Mode::Locked(Tool::Draw));

        ctl_tx.send(PipelineCtl::Voice(VoiceCommand::Stop)).unwrap();
        wait_for(&status, |s| s.mode == Mode::Idle);

        ctl_tx.send(PipelineCtl::Voice(VoiceCommand::SetMode(Tool::Laser))).unwrap();
        wait_for(&status, |s| s.mode == Mode::Locked(Tool::Laser));

        tx.close();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn stop_flag_halts_an_idle_pipeline() {
        let profile = Arc::new(Mutex::new(Profile::builtin().unwrap()));
        let (_tx, rx) = handoff::latest();
        let (_ctl_tx, ctl_rx) = mpsc::channel();
        let status = Arc::new(Mutex::new(PipelineStatus::default()));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let stop = stop.clone();
            thread::spawn(move || run_pipeline(profile, rx, ctl_rx, status, stop))
        };
        thread::sleep(Duration::from_millis(30));
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }

    fn wait_for(status: &Mutex<PipelineStatus>, done: impl Fn(&PipelineStatus) -> bool) {
        for _ in 0..500 {
            if done(&status.lock().unwrap()) {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("pipeline status never reached the expected state");
    }
}
