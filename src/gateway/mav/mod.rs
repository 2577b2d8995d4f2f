//! MAVLink Gateway
//!
//! [`VehicleGateway`] over a MAVLink link (serial, UDP or TCP). Commands go
//! out as COMMAND_LONG or PARAM_SET/PARAM_REQUEST_READ; COMMAND_ACK and
//! PARAM_VALUE replies are matched to the in-flight sequence number of the
//! sending vehicle.
//!
//! Replies carry no sequence number. Once a command is abandoned its reply is
//! quarantined: a new command that the same reply would answer is refused
//! until the late reply shows up or the window closes.

mod commands;
mod connection;

pub use commands::{ack_outcome, Expectation, MavCommandEncoder};
pub use connection::{FlightLink, Inbound};

use super::vehicle_state::{LandedState, VehicleStateTracker, VtolCapability};
use super::{AckOutcome, AckReport, AckSender, GatewayError, VehicleGateway, VehicleId};
use crate::action::{Command, CommandKind};
use crate::config::{ParameterNames, VehicleConfig};
use async_trait::async_trait;
use commands::{param_id_str, EXTENDED_SYS_STATE_ID};
use mavlink::ardupilotmega::{MavCmd, MavMessage, MavResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Two floats closer than this are the same parameter value
const PARAM_EPSILON: f32 = 1e-4;

/// How long a reply to an abandoned command is still expected
pub const LATE_REPLY_WINDOW: Duration = Duration::from_secs(5);

/// Landed and VTOL state stream rate requested from new vehicles
const STATE_STREAM_INTERVAL: Duration = Duration::from_secs(1);

/// The reply a vehicle owes us, and the request it resolves
#[derive(Debug, Clone)]
struct Awaiting {
    sequence: u64,
    expect: Expectation,
}

/// Reply to an abandoned command that may still arrive
#[derive(Debug, Clone)]
struct Quarantined {
    expect: Expectation,
    until: Instant,
}

#[derive(Debug, Default)]
struct Correlation {
    /// At most one outstanding reply per system id
    awaiting: HashMap<u8, Awaiting>,
    abandoned: HashMap<u8, Vec<Quarantined>>,
}

impl Correlation {
    /// Quarantined reply that `expect` would also match, if any
    fn blocked_by(&mut self, system_id: u8, expect: &Expectation) -> Option<&Quarantined> {
        let now = Instant::now();
        let entries = self.abandoned.get_mut(&system_id)?;
        entries.retain(|entry| entry.until > now);
        entries.iter().find(|entry| entry.expect.shares_reply(expect))
    }

    /// Consume a quarantined entry the incoming reply answers
    fn take_late(&mut self, system_id: u8, reply: &Expectation) -> bool {
        let Some(entries) = self.abandoned.get_mut(&system_id) else {
            return false;
        };
        match entries.iter().position(|entry| entry.expect.shares_reply(reply)) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }
}

pub struct MavlinkGateway {
    encoder: MavCommandEncoder,
    link: FlightLink,
    vehicles: VehicleStateTracker,
    correlation: Mutex<Correlation>,
    acks: AckSender,
}

impl MavlinkGateway {
    /// Open the link and start processing vehicle messages
    pub fn start(config: VehicleConfig, names: ParameterNames, acks: AckSender) -> Arc<Self> {
        let (link, inbound_rx) = FlightLink::start(config.clone());
        let gateway = Arc::new(Self::with_link(&config, names, link, acks));

        let gateway_clone = gateway.clone();
        tokio::spawn(async move {
            gateway_clone.process_inbound(inbound_rx).await;
        });

        gateway
    }

    fn with_link(
        config: &VehicleConfig,
        names: ParameterNames,
        link: FlightLink,
        acks: AckSender,
    ) -> Self {
        Self {
            encoder: MavCommandEncoder::new(config.target_component, names),
            link,
            vehicles: VehicleStateTracker::new(config.heartbeat_timeout()),
            correlation: Mutex::new(Correlation::default()),
            acks,
        }
    }

    async fn process_inbound(&self, mut inbound_rx: mpsc::Receiver<Inbound>) {
        while let Some((header, msg)) = inbound_rx.recv().await {
            self.handle_message(header.system_id, &msg).await;
        }
        info!("[MAVLink] Inbound channel closed");
    }

    async fn handle_message(&self, system_id: u8, msg: &MavMessage) {
        if self.vehicles.process_message(system_id, msg).await {
            info!("[MAVLink] Heartbeat from system {}", system_id);
            self.request_state_stream(system_id).await;
        }

        match msg {
            MavMessage::COMMAND_ACK(ack) => {
                self.on_command_ack(system_id, ack.command, ack.result).await;
            }
            MavMessage::PARAM_VALUE(value) => {
                self.on_param_value(system_id, &param_id_str(&value.param_id), value.param_value)
                    .await;
            }
            MavMessage::STATUSTEXT(text) => {
                let text = String::from_utf8_lossy(&text.text);
                debug!("[MAVLink] system {}: {}", system_id, text.trim_end_matches('\0'));
            }
            _ => {}
        }
    }

    /// Landed and VTOL state are not streamed by every autopilot unasked
    async fn request_state_stream(&self, system_id: u8) {
        let msg =
            self.encoder
                .message_interval(system_id, EXTENDED_SYS_STATE_ID, STATE_STREAM_INTERVAL);
        if let Err(e) = self.link.send(msg).await {
            warn!("[MAVLink] Could not request state stream from system {}: {}", system_id, e);
        }
    }

    async fn on_command_ack(&self, system_id: u8, command: MavCmd, result: MavResult) {
        let reply = Expectation::CommandAck(command);
        let mut correlation = self.correlation.lock().await;

        let matched = correlation
            .awaiting
            .get(&system_id)
            .filter(|entry| entry.expect == reply)
            .map(|entry| entry.sequence);

        let Some(sequence) = matched else {
            if ack_outcome(result).is_some() && correlation.take_late(system_id, &reply) {
                debug!("[MAVLink] Late COMMAND_ACK {:?} from system {} dropped", command, system_id);
            } else {
                debug!("[MAVLink] Unsolicited COMMAND_ACK {:?} from system {}", command, system_id);
            }
            return;
        };

        let Some(outcome) = ack_outcome(result) else {
            debug!("[MAVLink] {:?} in progress on system {}", command, system_id);
            return;
        };

        correlation.awaiting.remove(&system_id);
        drop(correlation);
        self.deliver(AckReport::new(sequence, outcome));
    }

    async fn on_param_value(&self, system_id: u8, param_id: &str, value: f32) {
        let mut correlation = self.correlation.lock().await;

        let matched = correlation
            .awaiting
            .get(&system_id)
            .and_then(|entry| match &entry.expect {
                Expectation::ParamValue { param_id: expected, requested } if expected == param_id => {
                    Some((entry.sequence, *requested))
                }
                _ => None,
            });

        let Some((sequence, requested)) = matched else {
            let reply = Expectation::ParamValue {
                param_id: param_id.to_string(),
                requested: None,
            };
            if correlation.take_late(system_id, &reply) {
                debug!("[MAVLink] Late PARAM_VALUE {} from system {} dropped", param_id, system_id);
            }
            return;
        };

        correlation.awaiting.remove(&system_id);
        drop(correlation);

        // A write the vehicle did not take is echoed back with the old value
        let report = match requested {
            Some(requested) if (requested - value).abs() > PARAM_EPSILON => {
                warn!(
                    "[MAVLink] system {} kept {}={} (requested {})",
                    system_id, param_id, value, requested
                );
                AckReport::new(sequence, AckOutcome::Denied).with_value(value)
            }
            _ => AckReport::new(sequence, AckOutcome::Accepted).with_value(value),
        };
        self.deliver(report);
    }

    fn deliver(&self, report: AckReport) {
        if self.acks.send(report).is_err() {
            warn!("[MAVLink] Ack channel closed, dropping seq={}", report.sequence);
        }
    }

    /// Answers the gateway can give from vehicle state without asking the vehicle
    async fn precheck(&self, system_id: u8, command: &Command) -> Option<AckOutcome> {
        match command.kind() {
            CommandKind::Arm => match self.vehicles.landed_state(system_id).await {
                LandedState::Unknown => Some(AckOutcome::DeniedLandedStateUnknown),
                LandedState::InAir => Some(AckOutcome::DeniedNotLanded),
                LandedState::OnGround => None,
            },
            CommandKind::TransitionToFixedWing | CommandKind::TransitionToMulticopter => {
                match self.vehicles.vtol_capability(system_id).await {
                    VtolCapability::Unknown => Some(AckOutcome::VtolSupportUnknown),
                    VtolCapability::NotVtol => Some(AckOutcome::NoVtolSupport),
                    VtolCapability::Vtol => None,
                }
            }
            _ => None,
        }
    }
}

#[async_trait]
impl VehicleGateway for MavlinkGateway {
    async fn is_connected(&self, vehicle: VehicleId) -> bool {
        self.link.is_up() && self.vehicles.is_connected(vehicle.system_id()).await
    }

    async fn send(
        &self,
        vehicle: VehicleId,
        sequence: u64,
        command: &Command,
    ) -> Result<(), GatewayError> {
        let system_id = vehicle.system_id();

        if let Some(outcome) = self.precheck(system_id, command).await {
            debug!("[MAVLink] {} answered locally for {}: {:?}", command, vehicle, outcome);
            self.deliver(AckReport::new(sequence, outcome));
            return Ok(());
        }

        let (msg, expect) = self.encoder.encode(system_id, command);

        // Registered before sending so a fast reply cannot be missed
        {
            let mut correlation = self.correlation.lock().await;
            if let Some(blocking) = correlation.blocked_by(system_id, &expect) {
                warn!(
                    "[MAVLink] Refusing {} to {}: reply to abandoned {:?} may still arrive",
                    command, vehicle, blocking.expect
                );
                return Err(GatewayError::ReplyOutstanding);
            }
            correlation
                .awaiting
                .insert(system_id, Awaiting { sequence, expect });
        }

        if let Err(e) = self.link.send(msg).await {
            let mut correlation = self.correlation.lock().await;
            if correlation.awaiting.get(&system_id).map(|entry| entry.sequence) == Some(sequence) {
                correlation.awaiting.remove(&system_id);
            }
            return Err(e);
        }

        debug!("[MAVLink] Sent {} to {} (seq={})", command, vehicle, sequence);
        Ok(())
    }

    async fn abandon(&self, vehicle: VehicleId, sequence: u64) {
        let system_id = vehicle.system_id();
        let mut correlation = self.correlation.lock().await;

        let owned = correlation.awaiting.get(&system_id).map(|entry| entry.sequence) == Some(sequence);
        let abandoned = if owned {
            correlation.awaiting.remove(&system_id)
        } else {
            None
        };

        if let Some(entry) = abandoned {
            debug!("[MAVLink] Abandoned seq={} on {}, quarantining {:?}", sequence, vehicle, entry.expect);
            correlation
                .abandoned
                .entry(system_id)
                .or_default()
                .push(Quarantined {
                    expect: entry.expect,
                    until: Instant::now() + LATE_REPLY_WINDOW,
                });
        }
    }
}
