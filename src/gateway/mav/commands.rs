//! MAVLink Command Translation
//!
//! Translates action commands to MAVLink messages and tells the gateway which
//! reply to expect for each.

use crate::action::{Command, CommandKind, Parameter};
use crate::config::ParameterNames;
use crate::gateway::AckOutcome;
use std::time::Duration;
use mavlink::ardupilotmega::{
    MavCmd, MavMessage, MavParamType, MavResult, MavVtolState, COMMAND_LONG_DATA,
    PARAM_REQUEST_READ_DATA, PARAM_SET_DATA,
};

/// Magic number that lets ARM_DISARM stop the motors in flight
const FORCE_DISARM_MAGIC: f32 = 21196.0;

/// Maximum length of a MAVLink parameter id
const PARAM_ID_LEN: usize = 16;

/// Message id of EXTENDED_SYS_STATE
pub const EXTENDED_SYS_STATE_ID: u32 = 245;

/// Reply the vehicle is expected to send for a transmitted command
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// COMMAND_ACK for this command id
    CommandAck(MavCmd),
    /// PARAM_VALUE for this parameter; `requested` is set for writes
    ParamValue {
        param_id: String,
        requested: Option<f32>,
    },
}

impl Expectation {
    /// Whether one reply message could answer both expectations
    pub fn shares_reply(&self, other: &Expectation) -> bool {
        match (self, other) {
            (Expectation::CommandAck(a), Expectation::CommandAck(b)) => a == b,
            (
                Expectation::ParamValue { param_id: a, .. },
                Expectation::ParamValue { param_id: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

/// Builds outbound MAVLink messages for one target component
#[derive(Debug, Clone)]
pub struct MavCommandEncoder {
    target_component: u8,
    names: ParameterNames,
}

impl MavCommandEncoder {
    pub fn new(target_component: u8, names: ParameterNames) -> Self {
        Self {
            target_component,
            names,
        }
    }

    /// Translate a command for `target_system`
    pub fn encode(&self, target_system: u8, command: &Command) -> (MavMessage, Expectation) {
        match command.kind() {
            CommandKind::Arm => self.command_long(
                target_system,
                MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
                [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ),
            CommandKind::Disarm => {
                self.command_long(target_system, MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [0.0; 7])
            }
            // Force disarm even while flying
            CommandKind::Kill => self.command_long(
                target_system,
                MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
                [0.0, FORCE_DISARM_MAGIC, 0.0, 0.0, 0.0, 0.0, 0.0],
            ),
            // NAN yaw/position = current, altitude from the takeoff parameter
            CommandKind::Takeoff => self.command_long(
                target_system,
                MavCmd::MAV_CMD_NAV_TAKEOFF,
                [0.0, 0.0, 0.0, f32::NAN, f32::NAN, f32::NAN, f32::NAN],
            ),
            CommandKind::Land => self.command_long(
                target_system,
                MavCmd::MAV_CMD_NAV_LAND,
                [0.0, 0.0, 0.0, f32::NAN, f32::NAN, f32::NAN, f32::NAN],
            ),
            // param1 = 1: reboot autopilot
            CommandKind::Reboot => self.command_long(
                target_system,
                MavCmd::MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN,
                [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ),
            CommandKind::ReturnToLaunch => {
                self.command_long(target_system, MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH, [0.0; 7])
            }
            CommandKind::TransitionToFixedWing => self.command_long(
                target_system,
                MavCmd::MAV_CMD_DO_VTOL_TRANSITION,
                [MavVtolState::MAV_VTOL_STATE_FW as u8 as f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ),
            CommandKind::TransitionToMulticopter => self.command_long(
                target_system,
                MavCmd::MAV_CMD_DO_VTOL_TRANSITION,
                [MavVtolState::MAV_VTOL_STATE_MC as u8 as f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ),
            CommandKind::GetParameter(parameter) => {
                let name = self.param_name(parameter);
                let msg = MavMessage::PARAM_REQUEST_READ(PARAM_REQUEST_READ_DATA {
                    param_index: -1, // Look up by name
                    target_system,
                    target_component: self.target_component,
                    param_id: param_id_bytes(name),
                });
                (
                    msg,
                    Expectation::ParamValue {
                        param_id: name.to_string(),
                        requested: None,
                    },
                )
            }
            CommandKind::SetParameter(parameter) => {
                let name = self.param_name(parameter);
                let value = command.param().unwrap_or_default();
                let msg = MavMessage::PARAM_SET(PARAM_SET_DATA {
                    param_value: value,
                    target_system,
                    target_component: self.target_component,
                    param_id: param_id_bytes(name),
                    param_type: MavParamType::MAV_PARAM_TYPE_REAL32,
                });
                (
                    msg,
                    Expectation::ParamValue {
                        param_id: name.to_string(),
                        requested: Some(value),
                    },
                )
            }
        }
    }

    /// Ask the vehicle to stream `message_id` every `interval`
    pub fn message_interval(
        &self,
        target_system: u8,
        message_id: u32,
        interval: Duration,
    ) -> MavMessage {
        let interval_us = u32::try_from(interval.as_micros()).unwrap_or(u32::MAX);
        let (msg, _) = self.command_long(
            target_system,
            MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
            [message_id as f32, interval_us as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
        );
        msg
    }

    fn command_long(
        &self,
        target_system: u8,
        command: MavCmd,
        params: [f32; 7],
    ) -> (MavMessage, Expectation) {
        let msg = MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system,
            target_component: self.target_component,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        });

        (msg, Expectation::CommandAck(command))
    }

    fn param_name(&self, parameter: Parameter) -> &str {
        match parameter {
            Parameter::TakeoffAltitude => &self.names.takeoff_altitude,
            Parameter::MaxSpeed => &self.names.max_speed,
            Parameter::RtlAltitude => &self.names.rtl_altitude,
        }
    }
}

/// Map a COMMAND_ACK result. `None` means the command is still running.
pub fn ack_outcome(result: MavResult) -> Option<AckOutcome> {
    match result {
        MavResult::MAV_RESULT_ACCEPTED => Some(AckOutcome::Accepted),
        MavResult::MAV_RESULT_DENIED | MavResult::MAV_RESULT_TEMPORARILY_REJECTED => {
            Some(AckOutcome::Denied)
        }
        MavResult::MAV_RESULT_IN_PROGRESS => None,
        other => Some(AckOutcome::Unrecognized(other as i32)),
    }
}

/// Null-padded parameter id, truncated to 16 bytes
pub fn param_id_bytes(name: &str) -> [u8; PARAM_ID_LEN] {
    let mut id = [0u8; PARAM_ID_LEN];
    let len = name.len().min(PARAM_ID_LEN);
    id[..len].copy_from_slice(&name.as_bytes()[..len]);
    id
}

/// Parameter id as a string, without trailing NULs
pub fn param_id_str(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches('\0')
        .to_string()
}
