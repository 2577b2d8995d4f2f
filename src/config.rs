//! Service configuration
//!
//! Every section has sensible defaults, so an empty (or missing) TOML file
//! yields a working setup against a local PX4 SITL instance.

use crate::action::CommandFamily;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration for the action service
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub rpc: RpcConfig,
    pub vehicle: VehicleConfig,
    pub timeouts: TimeoutConfig,
    pub parameters: ParameterNames,
}

impl ServiceConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// RPC listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub listen: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:50051".into(),
        }
    }
}

/// Link to the vehicle(s)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// MAVLink connection string, e.g. "udpin:0.0.0.0:14540" or "serial:/dev/ttyACM0:57600"
    pub connection: String,
    /// System ID we send as
    pub system_id: u8,
    /// Component ID we send as
    pub component_id: u8,
    /// Vehicle targeted when a request does not name one
    pub default_target: u8,
    /// Component targeted on the vehicle (autopilot)
    pub target_component: u8,
    /// A vehicle is connected while its heartbeats arrive within this window
    pub heartbeat_timeout_ms: u64,
    /// Delay between reconnection attempts
    pub reconnect_delay_ms: u64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            // PX4 SITL default offboard port
            connection: "udpin:0.0.0.0:14540".into(),
            system_id: 245,      // Ground station range
            component_id: 190,   // MAV_COMP_ID_MISSIONPLANNER
            default_target: 1,
            target_component: 1, // MAV_COMP_ID_AUTOPILOT1
            heartbeat_timeout_ms: 3000,
            reconnect_delay_ms: 2000,
        }
    }
}

impl VehicleConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Acknowledgment deadlines, with optional per-family overrides
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub default_ms: u64,
    pub arming: Option<u64>,
    pub flight: Option<u64>,
    pub reboot: Option<u64>,
    pub kill: Option<u64>,
    pub transition: Option<u64>,
    pub parameter: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_ms: 3000,
            arming: None,
            flight: None,
            // Autopilots often ack a reboot only after flushing logs
            reboot: Some(10_000),
            transition: Some(5000),
            kill: None,
            parameter: None,
        }
    }
}

impl TimeoutConfig {
    /// Same deadline for every command family
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            default_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            arming: None,
            flight: None,
            reboot: None,
            kill: None,
            transition: None,
            parameter: None,
        }
    }

    pub fn for_family(&self, family: CommandFamily) -> Duration {
        let override_ms = match family {
            CommandFamily::Arming => self.arming,
            CommandFamily::Flight => self.flight,
            CommandFamily::Reboot => self.reboot,
            CommandFamily::Kill => self.kill,
            CommandFamily::Transition => self.transition,
            CommandFamily::Parameter => self.parameter,
        };
        Duration::from_millis(override_ms.unwrap_or(self.default_ms))
    }
}

/// Names of the vehicle parameters behind the parameter accessor (PX4 defaults)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParameterNames {
    pub takeoff_altitude: String,
    pub max_speed: String,
    pub rtl_altitude: String,
}

impl Default for ParameterNames {
    fn default() -> Self {
        Self {
            takeoff_altitude: "MIS_TAKEOFF_ALT".into(),
            max_speed: "MPC_XY_CRUISE".into(),
            rtl_altitude: "RTL_RETURN_ALT".into(),
        }
    }
}
