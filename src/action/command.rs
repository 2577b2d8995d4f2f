//! Command values handed from the dispatcher to the vehicle gateway

use std::fmt;

/// Vehicle parameters reachable through the parameter accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    TakeoffAltitude,
    MaxSpeed,
    RtlAltitude,
}

/// What a command asks the vehicle to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Arm,
    Disarm,
    Takeoff,
    Land,
    Reboot,
    Kill,
    ReturnToLaunch,
    TransitionToFixedWing,
    TransitionToMulticopter,
    GetParameter(Parameter),
    SetParameter(Parameter),
}

/// Command groups sharing an acknowledgment deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFamily {
    Arming,
    Flight,
    Reboot,
    Kill,
    Transition,
    Parameter,
}

/// A single command for one vehicle. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    kind: CommandKind,
    param: Option<f32>,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self { kind, param: None }
    }

    pub fn get(parameter: Parameter) -> Self {
        Self::new(CommandKind::GetParameter(parameter))
    }

    pub fn set(parameter: Parameter, value: f32) -> Self {
        Self {
            kind: CommandKind::SetParameter(parameter),
            param: Some(value),
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn param(&self) -> Option<f32> {
        self.param
    }

    /// True for get/set of a vehicle parameter
    pub fn is_parameter(&self) -> bool {
        matches!(
            self.kind,
            CommandKind::GetParameter(_) | CommandKind::SetParameter(_)
        )
    }

    pub fn family(&self) -> CommandFamily {
        match self.kind {
            CommandKind::Arm | CommandKind::Disarm => CommandFamily::Arming,
            CommandKind::Takeoff | CommandKind::Land | CommandKind::ReturnToLaunch => {
                CommandFamily::Flight
            }
            CommandKind::Reboot => CommandFamily::Reboot,
            CommandKind::Kill => CommandFamily::Kill,
            CommandKind::TransitionToFixedWing | CommandKind::TransitionToMulticopter => {
                CommandFamily::Transition
            }
            CommandKind::GetParameter(_) | CommandKind::SetParameter(_) => CommandFamily::Parameter,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.param {
            Some(value) => write!(f, "{:?}({})", self.kind, value),
            None => write!(f, "{:?}", self.kind),
        }
    }
}
