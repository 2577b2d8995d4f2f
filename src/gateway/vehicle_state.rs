//! Vehicle State Tracker
//!
//! Reads HEARTBEAT and EXTENDED_SYS_STATE from the link and answers the few
//! questions the gateway needs: is the vehicle there, is it on the ground,
//! can it transition between VTOL modes.

use mavlink::ardupilotmega::{MavLandedState, MavMessage, MavVtolState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandedState {
    Unknown,
    OnGround,
    InAir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VtolCapability {
    Unknown,
    NotVtol,
    Vtol,
}

#[derive(Debug, Clone, Copy)]
struct VehicleStatus {
    last_heartbeat: Instant,
    landed: LandedState,
    vtol: VtolCapability,
}

impl VehicleStatus {
    fn new(now: Instant) -> Self {
        Self {
            last_heartbeat: now,
            landed: LandedState::Unknown,
            vtol: VtolCapability::Unknown,
        }
    }
}

/// Latest known state per MAVLink system id
pub struct VehicleStateTracker {
    vehicles: Arc<RwLock<HashMap<u8, VehicleStatus>>>,
    heartbeat_timeout: Duration,
}

impl VehicleStateTracker {
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            vehicles: Arc::new(RwLock::new(HashMap::new())),
            heartbeat_timeout,
        }
    }

    /// Update state from a message sent by `system_id`.
    ///
    /// Returns true when a heartbeat brings the vehicle (back) into contact.
    pub async fn process_message(&self, system_id: u8, msg: &MavMessage) -> bool {
        let now = Instant::now();

        match msg {
            MavMessage::HEARTBEAT(_) => {
                let mut vehicles = self.vehicles.write().await;
                match vehicles.get_mut(&system_id) {
                    Some(status) => {
                        let was_connected =
                            now.duration_since(status.last_heartbeat) <= self.heartbeat_timeout;
                        status.last_heartbeat = now;
                        !was_connected
                    }
                    None => {
                        vehicles.insert(system_id, VehicleStatus::new(now));
                        true
                    }
                }
            }

            MavMessage::EXTENDED_SYS_STATE(state) => {
                let mut vehicles = self.vehicles.write().await;
                // State from a vehicle we have no heartbeat for yet still counts
                let status = vehicles
                    .entry(system_id)
                    .or_insert_with(|| VehicleStatus::new(now));
                status.landed = landed_state(state.landed_state);
                status.vtol = vtol_capability(state.vtol_state);
                false
            }

            _ => false,
        }
    }

    /// Heard from within the heartbeat timeout
    pub async fn is_connected(&self, system_id: u8) -> bool {
        self.vehicles
            .read()
            .await
            .get(&system_id)
            .map(|status| status.last_heartbeat.elapsed() <= self.heartbeat_timeout)
            .unwrap_or(false)
    }

    pub async fn landed_state(&self, system_id: u8) -> LandedState {
        self.vehicles
            .read()
            .await
            .get(&system_id)
            .map(|status| status.landed)
            .unwrap_or(LandedState::Unknown)
    }

    pub async fn vtol_capability(&self, system_id: u8) -> VtolCapability {
        self.vehicles
            .read()
            .await
            .get(&system_id)
            .map(|status| status.vtol)
            .unwrap_or(VtolCapability::Unknown)
    }
}

fn landed_state(state: MavLandedState) -> LandedState {
    match state {
        MavLandedState::MAV_LANDED_STATE_ON_GROUND => LandedState::OnGround,
        MavLandedState::MAV_LANDED_STATE_IN_AIR
        | MavLandedState::MAV_LANDED_STATE_TAKEOFF
        | MavLandedState::MAV_LANDED_STATE_LANDING => LandedState::InAir,
        _ => LandedState::Unknown,
    }
}

fn vtol_capability(state: MavVtolState) -> VtolCapability {
    match state {
        // UNDEFINED means "not configured as VTOL"
        MavVtolState::MAV_VTOL_STATE_UNDEFINED => VtolCapability::NotVtol,
        _ => VtolCapability::Vtol,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::ardupilotmega::{
        MavAutopilot, MavModeFlag, MavState, MavType, EXTENDED_SYS_STATE_DATA, HEARTBEAT_DATA,
    };

    fn heartbeat() -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_VTOL_TILTROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_PX4,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_STANDBY,
            mavlink_version: 3,
        })
    }

    fn extended(landed: MavLandedState, vtol: MavVtolState) -> MavMessage {
        MavMessage::EXTENDED_SYS_STATE(EXTENDED_SYS_STATE_DATA {
            vtol_state: vtol,
            landed_state: landed,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_follows_heartbeat() {
        let tracker = VehicleStateTracker::new(Duration::from_secs(3));
        assert!(!tracker.is_connected(1).await);

        assert!(tracker.process_message(1, &heartbeat()).await);
        assert!(tracker.is_connected(1).await);
        assert!(!tracker.is_connected(2).await);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!tracker.process_message(1, &heartbeat()).await);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!tracker.is_connected(1).await);

        // Contact regained after the timeout counts as new
        assert!(tracker.process_message(1, &heartbeat()).await);
        assert!(tracker.is_connected(1).await);
    }

    #[tokio::test]
    async fn test_landed_and_vtol_state() {
        let tracker = VehicleStateTracker::new(Duration::from_secs(3));
        tracker.process_message(1, &heartbeat()).await;
        assert_eq!(tracker.landed_state(1).await, LandedState::Unknown);
        assert_eq!(tracker.vtol_capability(1).await, VtolCapability::Unknown);

        tracker
            .process_message(
                1,
                &extended(
                    MavLandedState::MAV_LANDED_STATE_IN_AIR,
                    MavVtolState::MAV_VTOL_STATE_MC,
                ),
            )
            .await;
        assert_eq!(tracker.landed_state(1).await, LandedState::InAir);
        assert_eq!(tracker.vtol_capability(1).await, VtolCapability::Vtol);

        tracker
            .process_message(
                1,
                &extended(
                    MavLandedState::MAV_LANDED_STATE_ON_GROUND,
                    MavVtolState::MAV_VTOL_STATE_UNDEFINED,
                ),
            )
            .await;
        assert_eq!(tracker.landed_state(1).await, LandedState::OnGround);
        assert_eq!(tracker.vtol_capability(1).await, VtolCapability::NotVtol);
    }
}
