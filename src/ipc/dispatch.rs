use log::{info, warn};
use std::{io::Write, os::unix::net::UnixStream, time::Duration};

use crate::engine::Output;

// a subscriber slower than this is dropped rather than stalling the pipeline
const WRITE_TIMEOUT: Duration = Duration::from_millis(50);

/// Connections that asked for the output stream.
#[derive(Default)]
pub struct Subscribers {
    streams: Vec<UnixStream>,
}

impl Subscribers {
    pub fn add(&mut self, stream: UnixStream) {
        if let Err(e) = stream.set_write_timeout(Some(WRITE_TIMEOUT)) {
            warn!("subscriber: cannot set write timeout: {e}");
        }
        self.streams.push(stream);
        info!("subscriber attached ({} total)", self.streams.len());
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// One JSON line per output to every subscriber; broken ones are dropped.
    pub fn broadcast(&mut self, out: &Output) {
        if self.streams.is_empty() {
            return;
        }
        let line = match serde_json::to_string(out) {
            Ok(s) => s + "\n",
            Err(e) => {
                warn!("dispatch: cannot encode output: {e}");
                return;
            }
        };
        let before = self.streams.len();
        self.streams
            .retain_mut(|s| s.write_all(line.as_bytes()).is_ok());
        let gone = before - self.streams.len();
        if gone > 0 {
            info!("subscriber detached ({gone} dropped, {} left)", self.streams.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::config::Profile;
    use crate::input::HandInput;
    use std::io::{BufRead, BufReader};

    #[test]
    fn broadcast_writes_json_lines_and_drops_closed_peers() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let (dead, dead_peer) = UnixStream::pair().unwrap();
        drop(dead_peer);

        let mut subs = Subscribers::default();
        subs.add(ours);
        subs.add(dead);

        let mut engine = Engine::new(&Profile::builtin().unwrap());
        let out = Output::Frame(engine.process(HandInput::Absent));
        subs.broadcast(&out);
        assert_eq!(subs.len(), 1);

        let mut line = String::new();
        BufReader::new(theirs).read_line(&mut line).unwrap();
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["event"], "frame");
        assert_eq!(v["frame"], 1);
    }
}
