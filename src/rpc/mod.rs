//! RPC surface
//!
//! Exposes the action and parameter operations to remote clients over TCP.

mod server;
mod service;

pub use server::RpcServer;
pub use service::{rejection, ActionService};
