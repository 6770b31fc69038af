//! IPC module for inference-process and presentation-client communication

mod protocol;
mod server;

pub use server::Server;
