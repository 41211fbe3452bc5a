mod dispatch;
mod pipeline;
mod runtime;
mod server;

pub use server::{client_request, connect_and_send, run_daemon};
