//! Action RPC service
//!
//! Maps decoded requests onto dispatcher operations.

use crate::action::{ActionDispatcher, ActionReply, ParamReply};
use crate::gateway::VehicleId;
use drone_action_shared::{ActionResult, ActionStatus, Method, RpcRequest, RpcResponse};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ActionService {
    dispatcher: ActionDispatcher,
    default_target: VehicleId,
}

impl ActionService {
    pub fn new(dispatcher: ActionDispatcher, default_target: VehicleId) -> Self {
        Self {
            dispatcher,
            default_target,
        }
    }

    /// Handle one request. Always produces a response with a non-empty status.
    pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
        let request_id = request.request_id;

        let Some(vehicle) = self.target(request.system_id) else {
            warn!("[RPC] Request {} names invalid system id {}", request_id, request.system_id);
            return reply(request_id, ActionReply::new(ActionResult::NoSystem));
        };

        let method = match Method::try_from(request.method) {
            Ok(Method::Unspecified) | Err(_) => {
                warn!("[RPC] Request {} has unknown method {}", request_id, request.method);
                return reply(request_id, ActionReply::new(ActionResult::Unknown));
            }
            Ok(method) => method,
        };

        debug!("[RPC] Request {}: {:?} on {}", request_id, method, vehicle);

        let d = &self.dispatcher;
        let value = request.value;
        match method {
            Method::Arm => reply(request_id, d.arm(vehicle).await),
            Method::Disarm => reply(request_id, d.disarm(vehicle).await),
            Method::Takeoff => reply(request_id, d.takeoff(vehicle).await),
            Method::Land => reply(request_id, d.land(vehicle).await),
            Method::Reboot => reply(request_id, d.reboot(vehicle).await),
            Method::Kill => reply(request_id, d.kill(vehicle).await),
            Method::ReturnToLaunch => reply(request_id, d.return_to_launch(vehicle).await),
            Method::TransitionToFixedWing => {
                reply(request_id, d.transition_to_fixedwing(vehicle).await)
            }
            Method::TransitionToMulticopter => {
                reply(request_id, d.transition_to_multicopter(vehicle).await)
            }
            Method::GetTakeoffAltitude => {
                param_reply(request_id, d.get_takeoff_altitude(vehicle).await)
            }
            Method::SetTakeoffAltitude => {
                reply(request_id, d.set_takeoff_altitude(vehicle, value).await)
            }
            Method::GetMaximumSpeed => param_reply(request_id, d.get_maximum_speed(vehicle).await),
            Method::SetMaximumSpeed => {
                reply(request_id, d.set_maximum_speed(vehicle, value).await)
            }
            Method::GetReturnToLaunchAltitude => {
                param_reply(request_id, d.get_return_to_launch_altitude(vehicle).await)
            }
            Method::SetReturnToLaunchAltitude => {
                reply(request_id, d.set_return_to_launch_altitude(vehicle, value).await)
            }
            Method::Unspecified => reply(request_id, ActionReply::new(ActionResult::Unknown)),
        }
    }

    /// 0 selects the default target; MAVLink system ids fit in a byte
    fn target(&self, system_id: u32) -> Option<VehicleId> {
        match system_id {
            0 => Some(self.default_target),
            id => u8::try_from(id).ok().map(VehicleId),
        }
    }
}

/// Response for a request that failed before reaching the dispatcher
pub fn rejection(request_id: u64, result: ActionResult) -> RpcResponse {
    RpcResponse::new(request_id, ActionStatus::from_result(result), 0.0)
}

fn reply(request_id: u64, reply: ActionReply) -> RpcResponse {
    RpcResponse::new(request_id, reply.into_status(), 0.0)
}

fn param_reply(request_id: u64, param: ParamReply) -> RpcResponse {
    RpcResponse::new(request_id, param.reply.into_status(), param.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::CommandKind;
    use crate::config::TimeoutConfig;
    use crate::gateway::ack_channel;
    use crate::gateway::mock::{Behavior, MockGateway};
    use crate::gateway::AckOutcome;
    use std::sync::Arc;
    use tokio::time::Duration;

    fn setup() -> (ActionService, Arc<MockGateway>) {
        let (ack_tx, ack_rx) = ack_channel();
        let gateway = Arc::new(MockGateway::new(ack_tx));
        let dispatcher = ActionDispatcher::new(
            gateway.clone(),
            TimeoutConfig::uniform(Duration::from_millis(500)),
            ack_rx,
        );
        (ActionService::new(dispatcher, VehicleId(1)), gateway)
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_target_and_request_id() {
        let (service, gateway) = setup();

        let response = service.handle(RpcRequest::new(42, 0, Method::Arm)).await;
        assert_eq!(response.request_id, 42);
        let status = response.status.expect("status");
        assert_eq!(status.code(), ActionResult::Success);
        assert!(!status.result_str.is_empty());

        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, VehicleId(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get_carries_value() {
        let (service, _gateway) = setup();

        let set = service
            .handle(RpcRequest::new(1, 1, Method::SetReturnToLaunchAltitude).with_value(30.0))
            .await;
        assert_eq!(set.status.expect("status").code(), ActionResult::Success);
        assert_eq!(set.value, 0.0);

        let get = service
            .handle(RpcRequest::new(2, 1, Method::GetReturnToLaunchAltitude))
            .await;
        assert_eq!(get.status.expect("status").code(), ActionResult::Success);
        assert_eq!(get.value, 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_method_and_bad_system() {
        let (service, gateway) = setup();

        let mut request = RpcRequest::new(1, 1, Method::Arm);
        request.method = 99;
        let response = service.handle(request).await;
        assert_eq!(response.status.expect("status").code(), ActionResult::Unknown);

        let unspecified = service.handle(RpcRequest::new(2, 1, Method::Unspecified)).await;
        assert_eq!(unspecified.status.expect("status").code(), ActionResult::Unknown);

        let response = service.handle(RpcRequest::new(3, 300, Method::Arm)).await;
        assert_eq!(response.status.expect("status").code(), ActionResult::NoSystem);

        assert!(gateway.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_denial_reaches_client() {
        let (service, gateway) = setup();
        gateway.script(CommandKind::Land, Behavior::Ack(AckOutcome::DeniedNotLanded));

        let response = service.handle(RpcRequest::new(7, 1, Method::Land)).await;
        let status = response.status.expect("status");
        assert_eq!(status.code(), ActionResult::CommandDeniedNotLanded);
        assert_eq!(status.result_str, ActionResult::CommandDeniedNotLanded.description());
    }
}
