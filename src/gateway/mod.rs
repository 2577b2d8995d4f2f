//! Vehicle Link Gateway
//!
//! The dispatcher talks to vehicles only through [`VehicleGateway`]. A gateway
//! sends one command per call and later reports the vehicle's answer on the
//! ack channel, keyed by the sequence number it was given.

pub mod mav;
#[cfg(test)]
pub(crate) mod mock;
pub mod vehicle_state;

use crate::action::Command;
use async_trait::async_trait;
use drone_action_shared::ActionResult;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// A vehicle on the link, identified by its MAVLink system id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleId(pub u8);

impl VehicleId {
    pub fn system_id(self) -> u8 {
        self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system {}", self.0)
    }
}

/// The vehicle's answer to a sent command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Accepted,
    Denied,
    DeniedLandedStateUnknown,
    DeniedNotLanded,
    NoVtolSupport,
    VtolSupportUnknown,
    LinkError,
    /// Raw link value outside the known set
    Unrecognized(i32),
}

/// Ack delivered on the gateway's ack channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AckReport {
    pub sequence: u64,
    pub outcome: AckOutcome,
    /// Parameter value echoed by the vehicle
    pub value: Option<f32>,
}

impl AckReport {
    pub fn new(sequence: u64, outcome: AckOutcome) -> Self {
        Self {
            sequence,
            outcome,
            value: None,
        }
    }

    pub fn with_value(mut self, value: f32) -> Self {
        self.value = Some(value);
        self
    }
}

/// Sending half of the ack channel, held by gateways
pub type AckSender = mpsc::UnboundedSender<AckReport>;
/// Receiving half of the ack channel, consumed by the ack waiter
pub type AckReceiver = mpsc::UnboundedReceiver<AckReport>;

/// Create the channel gateways report acks on
pub fn ack_channel() -> (AckSender, AckReceiver) {
    mpsc::unbounded_channel()
}

/// Transport-level failures while sending a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Vehicle link is down")]
    LinkDown,

    #[error("Outbound queue closed")]
    QueueClosed,

    /// A reply to an abandoned command could still arrive and would be
    /// mistaken for the answer to this one
    #[error("Late reply to an abandoned command still possible")]
    ReplyOutstanding,
}

impl GatewayError {
    /// Result reported to the caller when a send fails
    pub fn result(&self) -> ActionResult {
        match self {
            GatewayError::LinkDown | GatewayError::QueueClosed => ActionResult::ConnectionError,
            GatewayError::ReplyOutstanding => ActionResult::Busy,
        }
    }
}

/// Link to one or more vehicles
#[async_trait]
pub trait VehicleGateway: Send + Sync {
    /// Whether the vehicle is currently reachable
    async fn is_connected(&self, vehicle: VehicleId) -> bool;

    /// Send a command. The outcome arrives later on the ack channel tagged
    /// with `sequence`, or never.
    async fn send(
        &self,
        vehicle: VehicleId,
        sequence: u64,
        command: &Command,
    ) -> Result<(), GatewayError>;

    /// The dispatcher stopped waiting for `sequence`. Its ack, if it ever
    /// comes, must not be delivered.
    async fn abandon(&self, vehicle: VehicleId, sequence: u64);
}
