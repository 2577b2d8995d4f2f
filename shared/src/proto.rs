//! RPC message types
//!
//! Hand-derived prost messages for the action RPC surface. Field tags and the
//! numeric values of [`ActionResult`] are part of the wire contract and must
//! never be renumbered.

use prost::{Enumeration, Message};

/// Outcome code returned for every action request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ActionResult {
    Unknown = 0,
    Success = 1,
    NoSystem = 2,
    ConnectionError = 3,
    Busy = 4,
    CommandDenied = 5,
    CommandDeniedLandedStateUnknown = 6,
    CommandDeniedNotLanded = 7,
    Timeout = 8,
    VtolTransitionSupportUnknown = 9,
    NoVtolTransitionSupport = 10,
    ParameterError = 11,
}

/// Operations exposed over the RPC surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum Method {
    Unspecified = 0,
    Arm = 1,
    Disarm = 2,
    Takeoff = 3,
    Land = 4,
    Reboot = 5,
    Kill = 6,
    ReturnToLaunch = 7,
    TransitionToFixedWing = 8,
    TransitionToMulticopter = 9,
    GetTakeoffAltitude = 10,
    SetTakeoffAltitude = 11,
    GetMaximumSpeed = 12,
    SetMaximumSpeed = 13,
    GetReturnToLaunchAltitude = 14,
    SetReturnToLaunchAltitude = 15,
}

/// `{ result, result_str }` pair carried by every response
#[derive(Clone, PartialEq, Message)]
pub struct ActionStatus {
    #[prost(enumeration = "ActionResult", tag = "1")]
    pub result: i32,

    #[prost(string, tag = "2")]
    pub result_str: String,
}

/// A single request from an RPC client
#[derive(Clone, PartialEq, Message)]
pub struct RpcRequest {
    /// Client-chosen id echoed in the response
    #[prost(uint64, tag = "1")]
    pub request_id: u64,

    /// Target vehicle (MAVLink system id), 0 selects the configured default
    #[prost(uint32, tag = "2")]
    pub system_id: u32,

    #[prost(enumeration = "Method", tag = "3")]
    pub method: i32,

    /// Input for the `Set*` methods, ignored otherwise
    #[prost(float, tag = "4")]
    pub value: f32,
}

/// Response to an [`RpcRequest`]
#[derive(Clone, PartialEq, Message)]
pub struct RpcResponse {
    #[prost(uint64, tag = "1")]
    pub request_id: u64,

    #[prost(message, optional, tag = "2")]
    pub status: Option<ActionStatus>,

    /// Output of the `Get*` methods, 0.0 otherwise
    #[prost(float, tag = "3")]
    pub value: f32,
}

impl ActionStatus {
    /// Build a status carrying the standard description of `result`
    pub fn from_result(result: ActionResult) -> Self {
        Self {
            result: result.into(),
            result_str: result.description().into(),
        }
    }

    /// Decode the result code, falling back to `Unknown` for values outside the enum
    pub fn code(&self) -> ActionResult {
        ActionResult::try_from(self.result).unwrap_or(ActionResult::Unknown)
    }
}

impl RpcRequest {
    pub fn new(request_id: u64, system_id: u32, method: Method) -> Self {
        Self {
            request_id,
            system_id,
            method: method.into(),
            value: 0.0,
        }
    }

    /// Attach the input value of a `Set*` request
    pub fn with_value(mut self, value: f32) -> Self {
        self.value = value;
        self
    }
}

impl RpcResponse {
    pub fn new(request_id: u64, status: ActionStatus, value: f32) -> Self {
        Self {
            request_id,
            status: Some(status),
            value,
        }
    }
}
