//! Voice commands: the asynchronous side input from the speech collaborator.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Serialize;

use crate::mode::Tool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "command", content = "mode")]
pub enum VoiceCommand {
    Next,
    Previous,
    /// Force-lock a tool mode.
    SetMode(Tool),
    /// Force-unlock to Idle.
    Stop,
    Clear,
}

impl FromStr for VoiceCommand {
    type Err = String;

    /// `next | previous | stop | clear | mode:<draw|erase|highlight|laser>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if let Some(rest) = s.strip_prefix("mode:") {
            return rest.trim().parse::<Tool>().map(VoiceCommand::SetMode);
        }
        match s.as_str() {
            "next" => Ok(VoiceCommand::Next),
            "previous" | "prev" => Ok(VoiceCommand::Previous),
            "stop" => Ok(VoiceCommand::Stop),
            "clear" => Ok(VoiceCommand::Clear),
            other => Err(format!("unknown voice action: {other}")),
        }
    }
}

impl VoiceCommand {
    // lower wins when one transcript names several commands
    fn rank(&self) -> u8 {
        match self {
            VoiceCommand::Stop => 0,
            VoiceCommand::Next => 1,
            VoiceCommand::Previous => 2,
            VoiceCommand::Clear => 3,
            VoiceCommand::SetMode(_) => 4,
        }
    }
}

/// Resolve a free-form transcript against phrase bindings.
///
/// A binding matches when its phrase (the last dotted segment of the key)
/// occurs in the transcript. Among matches, the command rank decides first
/// (`stop drawing` stops rather than selecting Draw), then the longer phrase,
/// then key order so resolution is stable across runs.
pub fn resolve_phrase(transcript: &str, bindings: &HashMap<String, String>) -> Option<VoiceCommand> {
    let transcript = transcript.trim().to_ascii_lowercase();
    if transcript.is_empty() {
        return None;
    }

    bindings
        .iter()
        .map(|(k, v)| (k.rsplit('.').next().unwrap_or(k.as_str()), v.as_str()))
        .filter(|(phrase, _)| !phrase.is_empty() && transcript.contains(&phrase.to_ascii_lowercase()))
        .filter_map(|(phrase, action)| action.parse::<VoiceCommand>().ok().map(|cmd| (cmd, phrase)))
        .min_by(|a, b| {
            a.0.rank()
                .cmp(&b.0.rank())
                .then(b.1.len().cmp(&a.1.len()))
                .then(a.1.cmp(b.1))
        })
        .map(|(cmd, _)| cmd)
}
