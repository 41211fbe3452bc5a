mod cli;
mod config;
mod debounce;
mod engine;
mod error;
mod gestures;
mod handoff;
mod input;
mod ipc;
mod landmarks;
mod logging;
mod mode;
mod tracker;
mod voice;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
