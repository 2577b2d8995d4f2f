//! Command dispatcher
//!
//! Single entry point for callers. Every request runs the same pipeline:
//! connectivity check, admission, send, wait, classify, release.

use super::command::{Command, CommandKind};
use super::serializer::CommandSerializer;
use super::waiter::{AckWaiter, WaitOutcome};
use crate::config::TimeoutConfig;
use crate::gateway::{AckOutcome, AckReceiver, VehicleGateway, VehicleId};
use drone_action_shared::{ActionResult, ActionStatus, ResultCategory};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Terminal answer to one request
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReply {
    pub result: ActionResult,
    pub result_str: String,
}

impl ActionReply {
    pub fn new(result: ActionResult) -> Self {
        Self {
            result,
            result_str: result.description().into(),
        }
    }

    pub fn into_status(self) -> ActionStatus {
        ActionStatus {
            result: self.result.into(),
            result_str: self.result_str,
        }
    }
}

/// Reply plus the value carried by the ack, if any
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Dispatched {
    pub reply: ActionReply,
    pub value: Option<f32>,
}

impl Dispatched {
    fn result(result: ActionResult) -> Self {
        Self {
            reply: ActionReply::new(result),
            value: None,
        }
    }
}

/// Map a vehicle ack onto the result taxonomy
pub fn classify(outcome: AckOutcome, command: &Command) -> ActionResult {
    match outcome {
        AckOutcome::Accepted => ActionResult::Success,
        // A refused parameter is a plumbing problem, not a policy decision
        AckOutcome::Denied if command.is_parameter() => ActionResult::ParameterError,
        AckOutcome::Denied => ActionResult::CommandDenied,
        AckOutcome::DeniedLandedStateUnknown => ActionResult::CommandDeniedLandedStateUnknown,
        AckOutcome::DeniedNotLanded => ActionResult::CommandDeniedNotLanded,
        AckOutcome::NoVtolSupport => ActionResult::NoVtolTransitionSupport,
        AckOutcome::VtolSupportUnknown => ActionResult::VtolTransitionSupportUnknown,
        AckOutcome::LinkError => ActionResult::ConnectionError,
        AckOutcome::Unrecognized(_) => ActionResult::Unknown,
    }
}

/// Dispatches action commands to vehicles and resolves one result per request
#[derive(Clone)]
pub struct ActionDispatcher {
    gateway: Arc<dyn VehicleGateway>,
    serializer: CommandSerializer,
    waiter: AckWaiter,
    timeouts: Arc<TimeoutConfig>,
}

impl ActionDispatcher {
    /// Create a dispatcher and start routing acks from `acks`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        gateway: Arc<dyn VehicleGateway>,
        timeouts: TimeoutConfig,
        acks: AckReceiver,
    ) -> Self {
        let serializer = CommandSerializer::new();
        let waiter = AckWaiter::new(serializer.clone());
        waiter.start(acks);

        Self {
            gateway,
            serializer,
            waiter,
            timeouts: Arc::new(timeouts),
        }
    }

    pub async fn arm(&self, vehicle: VehicleId) -> ActionReply {
        self.command(vehicle, CommandKind::Arm).await
    }

    pub async fn disarm(&self, vehicle: VehicleId) -> ActionReply {
        self.command(vehicle, CommandKind::Disarm).await
    }

    pub async fn takeoff(&self, vehicle: VehicleId) -> ActionReply {
        self.command(vehicle, CommandKind::Takeoff).await
    }

    pub async fn land(&self, vehicle: VehicleId) -> ActionReply {
        self.command(vehicle, CommandKind::Land).await
    }

    pub async fn reboot(&self, vehicle: VehicleId) -> ActionReply {
        self.command(vehicle, CommandKind::Reboot).await
    }

    /// Stop the motors immediately, in flight too. No extra confirmation.
    pub async fn kill(&self, vehicle: VehicleId) -> ActionReply {
        self.command(vehicle, CommandKind::Kill).await
    }

    pub async fn return_to_launch(&self, vehicle: VehicleId) -> ActionReply {
        self.command(vehicle, CommandKind::ReturnToLaunch).await
    }

    pub async fn transition_to_fixedwing(&self, vehicle: VehicleId) -> ActionReply {
        self.command(vehicle, CommandKind::TransitionToFixedWing).await
    }

    pub async fn transition_to_multicopter(&self, vehicle: VehicleId) -> ActionReply {
        self.command(vehicle, CommandKind::TransitionToMulticopter).await
    }

    async fn command(&self, vehicle: VehicleId, kind: CommandKind) -> ActionReply {
        self.execute(vehicle, Command::new(kind)).await.reply
    }

    /// Run one request to completion.
    ///
    /// The pipeline runs in its own task, so a caller that stops waiting
    /// still gets its slot released once the ack or deadline arrives.
    pub(super) async fn execute(&self, vehicle: VehicleId, command: Command) -> Dispatched {
        let dispatcher = self.clone();
        let label = command.to_string();

        match tokio::spawn(async move { dispatcher.run(vehicle, command).await }).await {
            Ok(dispatched) => dispatched,
            Err(e) => {
                error!("[DISPATCH] {} to {} aborted: {}", label, vehicle, e);
                Dispatched::result(ActionResult::Unknown)
            }
        }
    }

    async fn run(&self, vehicle: VehicleId, command: Command) -> Dispatched {
        let label = command.to_string();
        let dispatched = self.dispatch(vehicle, command).await;
        log_outcome(vehicle, &label, dispatched.reply.result);
        dispatched
    }

    async fn dispatch(&self, vehicle: VehicleId, command: Command) -> Dispatched {
        let connected = self.gateway.is_connected(vehicle).await;
        if !connected {
            return Dispatched::result(ActionResult::NoSystem);
        }

        if let Some(value) = command.param() {
            if !value.is_finite() {
                return Dispatched::result(ActionResult::ParameterError);
            }
        }

        let timeout = self.timeouts.for_family(command.family());
        let mut pending = match self
            .serializer
            .submit(vehicle, connected, command, timeout)
            .await
        {
            Ok(pending) => pending,
            Err(rejected) => return Dispatched::result(rejected),
        };

        debug!(
            "[DISPATCH] Sending {} to {} (seq={}, timeout={:?})",
            pending.command, vehicle, pending.sequence, timeout
        );

        if let Err(e) = self
            .gateway
            .send(vehicle, pending.sequence, &pending.command)
            .await
        {
            warn!("[DISPATCH] Send to {} failed: {}", vehicle, e);
            self.serializer.release(&pending).await;
            return Dispatched::result(e.result());
        }

        let outcome = self.waiter.wait(&mut pending).await;
        if !matches!(outcome, WaitOutcome::Acked(_)) {
            self.gateway.abandon(vehicle, pending.sequence).await;
        }
        self.serializer.release(&pending).await;

        match outcome {
            WaitOutcome::Acked(report) => {
                let result = classify(report.outcome, &pending.command);
                match (pending.command.kind(), result, report.value) {
                    (CommandKind::GetParameter(_), ActionResult::Success, None) => {
                        Dispatched::result(ActionResult::ParameterError)
                    }
                    (_, result, value) => Dispatched {
                        reply: ActionReply::new(result),
                        value: if result.is_success() { value } else { None },
                    },
                }
            }
            WaitOutcome::TimedOut => {
                // A vehicle that vanished while we waited is reported as such
                let result = if self.gateway.is_connected(vehicle).await {
                    ActionResult::Timeout
                } else {
                    ActionResult::Timeout.prevailing(ActionResult::NoSystem)
                };
                Dispatched::result(result)
            }
            WaitOutcome::Abandoned => {
                error!(
                    "[DISPATCH] Completion for seq={} dropped without an ack",
                    pending.sequence
                );
                Dispatched::result(ActionResult::Unknown)
            }
        }
    }
}

fn log_outcome(vehicle: VehicleId, command: &str, result: ActionResult) {
    match result.category() {
        ResultCategory::Success => info!("[DISPATCH] {} on {}: {}", command, vehicle, result),
        ResultCategory::Contention
        | ResultCategory::PolicyDenial
        | ResultCategory::Timeout
        | ResultCategory::ParameterValidation => {
            warn!("[DISPATCH] {} on {}: {}", command, vehicle, result)
        }
        ResultCategory::ResourceUnavailable | ResultCategory::Unknown => {
            error!("[DISPATCH] {} on {}: {}", command, vehicle, result)
        }
    }
}
