use anyhow::{Result, anyhow};
use log::{error, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
    },
    thread,
    time::Duration,
};

use super::pipeline::{PipelineCtl, PipelineStatus, run_pipeline};
use super::runtime::socket_path;
use crate::config::{DaemonConfigState, Profile};
use crate::handoff::{self, Latest, Publisher};
use crate::input::{self, HandInput};
use crate::voice::{self, VoiceCommand};

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = socket_path();
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let mut state = DaemonState::new()?;
    info!("daemon: active profile '{}'", state.cfg.active_name);

    // SIGINT/SIGTERM and the shutdown op all land here
    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&stop))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&stop))?;

    // channels
    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();
    let (frames_tx, frames_rx) = handoff::latest::<HandInput>();
    let status = Arc::new(Mutex::new(PipelineStatus::default()));

    // gesture thread
    let mut gesture_thread = GestureThread::start(
        state.cfg.profile.clone(),
        frames_rx,
        Arc::clone(&status),
        Arc::clone(&stop),
    );

    // keep the watcher alive for the daemon's lifetime
    let _watcher = watch_profiles(&state.cfg.profiles_dir, tx_req.clone());

    // accept loop
    listener.set_nonblocking(true)?;
    while !stop.load(Ordering::Relaxed) {
        if let Ok((stream, _)) = listener.accept() {
            let ctx = ClientCtx {
                cfg: state.cfg.clone(),
                profile: Arc::clone(&gesture_thread.profile),
                tx_req: tx_req.clone(),
                ctl: gesture_thread.ctl.clone(),
                frames: frames_tx.clone(),
                status: Arc::clone(&status),
                stop: Arc::clone(&stop),
            };
            thread::spawn(move || {
                if let Err(e) = handle_client(stream, ctx) {
                    error!("ipc client error: {e}");
                }
            });
        }

        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Reload => {
                    if let Err(e) = state.cfg.reload() {
                        error!("reload failed: {e}");
                    } else {
                        gesture_thread.update_profile(state.cfg.profile.clone());
                        info!("profile reloaded");
                    }
                }
                IpcMsg::UseProfile(name) => {
                    if let Err(e) = state.cfg.set_active(&name) {
                        error!("use profile failed: {e}");
                    } else {
                        gesture_thread.update_profile(state.cfg.profile.clone());
                        info!("switched active profile to {}", state.cfg.active_name);
                    }
                }
                IpcMsg::ProfileChanged(paths) => {
                    let active = state.cfg.active_profile_path();
                    if paths.iter().any(|p| *p == active) {
                        info!("active profile changed on disk; reloading");
                        if let Err(e) = state.cfg.reload() {
                            error!("reload failed, keeping last good profile: {e}");
                        } else {
                            gesture_thread.update_profile(state.cfg.profile.clone());
                        }
                    }
                }
            }
        }

        thread::sleep(Duration::from_millis(5));
    }

    info!("daemon: shutting down");
    frames_tx.close();
    gesture_thread.join();
    let _ = std::fs::remove_file(&sock);
    Ok(())
}

fn handle_client(stream: UnixStream, ctx: ClientCtx) -> Result<()> {
    let mut writer = stream.try_clone()?;
    let reader = BufReader::new(stream);

    // a connection may carry many requests, e.g. a tracker streaming frames
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let req: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                writeln!(
                    writer,
                    "{}",
                    serde_json::json!({"ok": false, "error": format!("bad request: {e}")})
                )?;
                continue;
            }
        };
        let op = req
            .get("op")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        if op == "subscribe" {
            writeln!(writer, "{}", serde_json::json!({"ok": true, "data": "subscribed"}))?;
            if ctx.ctl.send(PipelineCtl::Subscribe(writer)).is_err() {
                warn!("subscribe: pipeline is gone");
            }
            return Ok(());
        }

        let resp = handle_request(&op, req, &ctx);
        writeln!(writer, "{}", resp)?;
        if op == "shutdown" {
            break;
        }
    }
    Ok(())
}

fn handle_request(op: &str, req: serde_json::Value, ctx: &ClientCtx) -> serde_json::Value {
    match op {
        "status" => {
            let st = ctx
                .status
                .lock()
                .map(|s| s.clone())
                .unwrap_or_default();
            serde_json::json!({"ok": true, "data": {
                "active_profile": ctx.cfg.active_name,
                "profile_name": ctx.cfg.profile.meta.name,
                "socket": socket_path(),
                "pipeline": st,
            }})
        }
        "reload" => {
            let _ = ctx.tx_req.send(IpcMsg::Reload);
            serde_json::json!({"ok": true, "data": {"active_profile": ctx.cfg.active_name}})
        }
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            if name.is_empty() {
                return serde_json::json!({"ok": false, "error": "missing profile name"});
            }
            if let Err(e) = ctx.cfg.check_profile(name) {
                return serde_json::json!({"ok": false, "error": e.to_string()});
            }
            let _ = ctx.tx_req.send(IpcMsg::UseProfile(name.to_string()));
            serde_json::json!({"ok": true, "data": {"active_profile": name}})
        }
        "list" => {
            let list = ctx.cfg.list_profiles();
            serde_json::json!({"ok": true, "data": {"profiles": list, "active": ctx.cfg.active_name}})
        }
        "doctor" => {
            let report = ctx.cfg.doctor_report(&socket_path());
            serde_json::json!({"ok": true, "data": report})
        }
        "frame" => {
            if ctx.frames.publish(input::frame_from_value(req)) {
                serde_json::json!({"ok": true})
            } else {
                serde_json::json!({"ok": false, "error": "pipeline stopped"})
            }
        }
        "voice" => match resolve_voice(&req, ctx) {
            Ok(cmd) => {
                if ctx.ctl.send(PipelineCtl::Voice(cmd)).is_err() {
                    return serde_json::json!({"ok": false, "error": "pipeline stopped"});
                }
                serde_json::json!({"ok": true, "data": {"command": cmd}})
            }
            Err(e) => serde_json::json!({"ok": false, "error": e.to_string()}),
        },
        "shutdown" => {
            ctx.stop.store(true, Ordering::Relaxed);
            serde_json::json!({"ok": true, "data": "shutting down"})
        }
        _ => serde_json::json!({"ok": false, "error": format!("unknown op: {op}")}),
    }
}

/// `{"command": "next"}` is taken literally; `{"phrase": "..."}` goes through
/// the active profile's voice bindings.
fn resolve_voice(req: &serde_json::Value, ctx: &ClientCtx) -> Result<VoiceCommand> {
    if let Some(c) = req.get("command").and_then(|v| v.as_str()) {
        return c.parse::<VoiceCommand>().map_err(|e| anyhow!(e));
    }
    let phrase = req
        .get("phrase")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("voice request needs 'command' or 'phrase'"))?;
    let profile = ctx
        .profile
        .lock()
        .map_err(|_| anyhow!("profile lock poisoned"))?;
    voice::resolve_phrase(phrase, &profile.voice)
        .ok_or_else(|| anyhow!("no voice binding matches '{phrase}'"))
}

fn watch_profiles(dir: &Path, tx: Sender<IpcMsg>) -> Option<RecommendedWatcher> {
    let handler = move |res: notify::Result<Event>| match res {
        Ok(ev) => {
            if matches!(ev.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                let _ = tx.send(IpcMsg::ProfileChanged(ev.paths));
            }
        }
        Err(e) => warn!("profile watcher: {e}"),
    };
    let mut watcher = match notify::recommended_watcher(handler) {
        Ok(w) => w,
        Err(e) => {
            warn!("profile watcher unavailable, hot reload disabled: {e}");
            return None;
        }
    };
    if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
        warn!("cannot watch {}: {e}", dir.display());
        return None;
    }
    info!("watching {} for profile changes", dir.display());
    Some(watcher)
}

struct DaemonState {
    pub cfg: DaemonConfigState,
}

impl DaemonState {
    fn new() -> Result<Self> {
        let cfg = DaemonConfigState::load_or_install_default()?;
        Ok(Self { cfg })
    }
}

/// What one client connection thread can see and reach.
struct ClientCtx {
    cfg: DaemonConfigState,
    profile: Arc<Mutex<Profile>>,
    tx_req: Sender<IpcMsg>,
    ctl: Sender<PipelineCtl>,
    frames: Publisher<HandInput>,
    status: Arc<Mutex<PipelineStatus>>,
    stop: Arc<AtomicBool>,
}

enum IpcMsg {
    Reload,
    UseProfile(String),
    ProfileChanged(Vec<PathBuf>),
}

struct GestureThread {
    profile: Arc<Mutex<Profile>>,
    ctl: Sender<PipelineCtl>,
    handle: Option<thread::JoinHandle<()>>,
}

impl GestureThread {
    fn start(
        profile: Profile,
        frames: Latest<HandInput>,
        status: Arc<Mutex<PipelineStatus>>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let profile_arc = Arc::new(Mutex::new(profile));
        let prof_clone = Arc::clone(&profile_arc);
        let (ctl, ctl_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            if let Err(e) = run_pipeline(prof_clone, frames, ctl_rx, status, stop) {
                error!("gesture pipeline failed: {e}");
            }
        });
        Self {
            profile: profile_arc,
            ctl,
            handle: Some(handle),
        }
    }

    fn update_profile(&mut self, new_profile: Profile) {
        if let Ok(mut p) = self.profile.lock() {
            *p = new_profile;
        }
        let _ = self.ctl.send(PipelineCtl::Reconfigure);
    }

    fn join(&mut self) {
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                error!("gesture pipeline panicked");
            }
        }
    }
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let mut reader = connect_and_send(&req)?;
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}

/// Send one request and hand back the reader for whatever follows.
pub fn connect_and_send(req: &serde_json::Value) -> Result<BufReader<UnixStream>> {
    let sock = socket_path();
    if !sock.exists() {
        return Err(anyhow!(
            "handmark daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(req)? + "\n";
    stream.write_all(line.as_bytes())?;
    Ok(BufReader::new(stream))
}
