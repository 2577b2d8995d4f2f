//! Parameter accessor
//!
//! Get/set of the takeoff altitude, maximum speed and RTL altitude. Values are
//! never cached; every call goes to the vehicle.

use super::command::{Command, Parameter};
use super::dispatcher::{ActionDispatcher, ActionReply};
use crate::gateway::VehicleId;

/// Reply to a parameter read
#[derive(Debug, Clone, PartialEq)]
pub struct ParamReply {
    pub reply: ActionReply,
    /// Vehicle value on success, 0.0 otherwise
    pub value: f32,
}

impl ActionDispatcher {
    pub async fn get_parameter(&self, vehicle: VehicleId, parameter: Parameter) -> ParamReply {
        let dispatched = self.execute(vehicle, Command::get(parameter)).await;
        ParamReply {
            value: dispatched.value.unwrap_or_default(),
            reply: dispatched.reply,
        }
    }

    /// Write a parameter. Range limits are left to the vehicle; only
    /// non-finite values are refused locally.
    pub async fn set_parameter(
        &self,
        vehicle: VehicleId,
        parameter: Parameter,
        value: f32,
    ) -> ActionReply {
        self.execute(vehicle, Command::set(parameter, value)).await.reply
    }

    pub async fn get_takeoff_altitude(&self, vehicle: VehicleId) -> ParamReply {
        self.get_parameter(vehicle, Parameter::TakeoffAltitude).await
    }

    pub async fn set_takeoff_altitude(&self, vehicle: VehicleId, meters: f32) -> ActionReply {
        self.set_parameter(vehicle, Parameter::TakeoffAltitude, meters).await
    }

    pub async fn get_maximum_speed(&self, vehicle: VehicleId) -> ParamReply {
        self.get_parameter(vehicle, Parameter::MaxSpeed).await
    }

    pub async fn set_maximum_speed(&self, vehicle: VehicleId, speed_m_s: f32) -> ActionReply {
        self.set_parameter(vehicle, Parameter::MaxSpeed, speed_m_s).await
    }

    pub async fn get_return_to_launch_altitude(&self, vehicle: VehicleId) -> ParamReply {
        self.get_parameter(vehicle, Parameter::RtlAltitude).await
    }

    pub async fn set_return_to_launch_altitude(
        &self,
        vehicle: VehicleId,
        meters: f32,
    ) -> ActionReply {
        self.set_parameter(vehicle, Parameter::RtlAltitude, meters).await
    }
}
