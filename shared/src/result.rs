//! Result taxonomy
//!
//! Descriptions, error categories and precedence for [`ActionResult`].

use crate::ActionResult;
use std::fmt;

/// How a caller is expected to react to a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCategory {
    Success,
    /// Vehicle or link unavailable, caller must re-issue
    ResourceUnavailable,
    /// Another command is in flight, caller retries with backoff
    Contention,
    /// Vehicle refused the command, never retried automatically
    PolicyDenial,
    /// Effect on the vehicle is unknown
    Timeout,
    /// Input-side parameter problem
    ParameterValidation,
    Unknown,
}

impl ActionResult {
    /// Human-readable description, never empty
    pub fn description(self) -> &'static str {
        match self {
            ActionResult::Unknown => "Unknown result",
            ActionResult::Success => "Success: the action command was accepted by the vehicle",
            ActionResult::NoSystem => "No system is connected",
            ActionResult::ConnectionError => "Connection error",
            ActionResult::Busy => "Vehicle is busy",
            ActionResult::CommandDenied => "Command refused by vehicle",
            ActionResult::CommandDeniedLandedStateUnknown => {
                "Command refused because landed state is unknown"
            }
            ActionResult::CommandDeniedNotLanded => "Command refused because vehicle not landed",
            ActionResult::Timeout => "Request timed out",
            ActionResult::VtolTransitionSupportUnknown => {
                "Hybrid/VTOL transition support is unknown"
            }
            ActionResult::NoVtolTransitionSupport => {
                "Vehicle does not support hybrid/VTOL transitions"
            }
            ActionResult::ParameterError => "Error getting or setting parameter",
        }
    }

    pub fn category(self) -> ResultCategory {
        match self {
            ActionResult::Success => ResultCategory::Success,
            ActionResult::NoSystem | ActionResult::ConnectionError => {
                ResultCategory::ResourceUnavailable
            }
            ActionResult::Busy => ResultCategory::Contention,
            ActionResult::CommandDenied
            | ActionResult::CommandDeniedLandedStateUnknown
            | ActionResult::CommandDeniedNotLanded
            | ActionResult::VtolTransitionSupportUnknown
            | ActionResult::NoVtolTransitionSupport => ResultCategory::PolicyDenial,
            ActionResult::Timeout => ResultCategory::Timeout,
            ActionResult::ParameterError => ResultCategory::ParameterValidation,
            ActionResult::Unknown => ResultCategory::Unknown,
        }
    }

    pub fn is_success(self) -> bool {
        self == ActionResult::Success
    }

    /// Only contention is worth retrying from the caller side
    pub fn is_retryable(self) -> bool {
        self.category() == ResultCategory::Contention
    }

    /// Rank used when several terminal conditions hold at once.
    ///
    /// Absence of a vehicle beats a denial, which beats a timeout.
    fn precedence(self) -> u8 {
        match self.category() {
            ResultCategory::ResourceUnavailable if self == ActionResult::NoSystem => 4,
            ResultCategory::ResourceUnavailable => 3,
            ResultCategory::PolicyDenial | ResultCategory::ParameterValidation => 2,
            ResultCategory::Timeout => 1,
            ResultCategory::Contention | ResultCategory::Success | ResultCategory::Unknown => 0,
        }
    }

    /// Pick the result that wins when both conditions apply
    pub fn prevailing(self, other: ActionResult) -> ActionResult {
        if other.precedence() > self.precedence() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
