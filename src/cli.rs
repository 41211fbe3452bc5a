use anyhow::{Result, anyhow};
use log::warn;
use pico_args::Arguments;
use std::{
    env, fs,
    io::{BufRead, BufReader},
    process::Command,
};

use crate::config;
use crate::engine::Engine;
use crate::input;
use crate::ipc;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon();
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = std::env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("handmark: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("stop") => request(serde_json::json!({"op":"shutdown"})),
        Some("status") => request(serde_json::json!({"op":"status"})),
        Some("reload") => request(serde_json::json!({"op":"reload"})),
        Some("list") => request(serde_json::json!({"op":"list"})),
        Some("doctor") => request(serde_json::json!({"op":"doctor"})),

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handmark use <profile_name>"))?;
            request(serde_json::json!({"op":"use","profile":name}))
        }

        Some("voice") => {
            // usage:
            //   handmark voice next slide
            //   handmark voice --command mode:draw
            if let Some(cmd) = pargs.opt_value_from_str::<_, String>("--command")? {
                return request(serde_json::json!({"op":"voice","command":cmd}));
            }
            let words: Vec<String> = pargs
                .finish()
                .into_iter()
                .filter_map(|s| s.into_string().ok())
                .collect();
            if words.is_empty() {
                return Err(anyhow!("usage: handmark voice <phrase...>"));
            }
            request(serde_json::json!({"op":"voice","phrase":words.join(" ")}))
        }

        Some("watch") => {
            let reader = ipc::connect_and_send(&serde_json::json!({"op":"subscribe"}))?;
            for line in reader.lines() {
                println!("{}", line?);
            }
            Ok(())
        }

        Some("replay") => {
            let path: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handmark replay <frames.jsonl>"))?;
            replay(&path)
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

/// Run the engine offline over a JSON-lines frame file, one output per line.
fn replay(path: &str) -> Result<()> {
    let profile = config::load_active_or_builtin()?;
    let mut engine = Engine::new(&profile);
    let f = fs::File::open(path).map_err(|e| anyhow!("failed to open {path}: {e}"))?;
    for (i, line) in BufReader::new(f).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame = input::parse_frame_line(&line);
        if let input::HandInput::Invalid(e) = &frame {
            warn!("{path}:{}: {e}", i + 1);
        }
        let out = engine.process(frame);
        println!("{}", serde_json::to_string(&out)?);
    }
    Ok(())
}

fn request(req: serde_json::Value) -> Result<()> {
    let r = ipc::client_request(req)?;
    print_response(&r);
    Ok(())
}

fn print_help() {
    println!(
        r#"handmark — hand-gesture annotation daemon

USAGE:
  handmark help [command]                 Show general or command-specific help
  handmark start                          Start the daemon
  handmark stop                           Stop the daemon
  handmark status                         Show mode, last gesture and frame counters
  handmark reload                         Reload active profile
  handmark use <name>                     Switch active profile
  handmark list                           List profiles
  handmark doctor                         Diagnose profile and socket setup
  handmark voice <phrase...>              Send a voice transcript
  handmark voice --command <action>       Send a voice action directly
  handmark watch                          Stream frame outputs from the daemon
  handmark replay <frames.jsonl>          Run recorded frames offline

TIPS:
  - Profiles: ~/.config/handmark/profiles
  - Active profile pointer: ~/.config/handmark/active
  - Trackers send {{"op":"frame","landmarks":[[x,y],...]}} lines to ~/.local/run/handmark.sock
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: handmark start\nStarts the background daemon."),
        "stop" => println!("usage: handmark stop\nStops the running daemon."),
        "status" => println!(
            "usage: handmark status\nShows mode, lock, confirmed gesture, processed/dropped frames."
        ),
        "reload" => println!(
            "usage: handmark reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: handmark use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: handmark list\nLists available profiles."),
        "doctor" => println!(
            "usage: handmark doctor\nReports socket, profile directory and threshold notes."
        ),
        "voice" => println!(
            "usage:\n  handmark voice <phrase...>\n  handmark voice --command <next|previous|stop|clear|mode:<draw|erase|highlight|laser>>"
        ),
        "watch" => println!(
            "usage: handmark watch\nPrints one JSON line per processed frame or voice command."
        ),
        "replay" => println!(
            "usage: handmark replay <frames.jsonl>\nEach line: {{\"landmarks\": [[x,y],...] | null, \"width\"?: W, \"height\"?: H}}"
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
