//! Action command core
//!
//! This module handles:
//! - Building commands for the high-level actions and parameters
//! - Serializing commands per vehicle (one in flight at a time)
//! - Waiting for the vehicle's acknowledgment with a deadline
//! - Mapping acknowledgments onto the result taxonomy

mod command;
mod dispatcher;
mod params;
mod serializer;
mod waiter;

pub use command::{Command, CommandFamily, CommandKind, Parameter};
pub use dispatcher::{classify, ActionDispatcher, ActionReply};
pub use params::ParamReply;
pub use serializer::{CommandSerializer, PendingCommand};
pub use waiter::{AckWaiter, WaitOutcome};
