//! Drone Action Shared Protocol Types
//!
//! This crate provides the RPC message types, the result taxonomy and the
//! frame codec shared between the action service and its clients.

pub mod codec;
pub mod proto;
pub mod result;

pub use proto::*;
pub use result::ResultCategory;
