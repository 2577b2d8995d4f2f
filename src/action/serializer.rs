//! Command Serializer
//!
//! Keeps at most one in-flight command per vehicle. A second caller is turned
//! away with `Busy` immediately; nothing is queued.

use super::command::{Command, CommandKind};
use crate::gateway::{AckReport, VehicleId};
use drone_action_shared::ActionResult;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{Duration, Instant};
use tracing::{debug, error};

/// Occupant of a vehicle slot
#[derive(Debug)]
struct InFlight {
    sequence: u64,
    kind: CommandKind,
    /// Taken by the first ack for this sequence
    resolver: Option<oneshot::Sender<AckReport>>,
}

type Slots = Arc<Mutex<HashMap<VehicleId, InFlight>>>;

/// A command admitted by the serializer and not yet released.
///
/// Dropping it frees the slot if it still holds this sequence, so a request
/// that unwinds before `release` cannot leave its vehicle busy.
#[derive(Debug)]
pub struct PendingCommand {
    pub vehicle: VehicleId,
    pub sequence: u64,
    pub command: Command,
    pub deadline: Instant,
    pub(super) completion: oneshot::Receiver<AckReport>,
    slots: Slots,
}

impl Drop for PendingCommand {
    fn drop(&mut self) {
        let (vehicle, sequence) = (self.vehicle, self.sequence);

        match self.slots.try_lock() {
            Ok(mut slots) => vacate(&mut slots, vehicle, sequence),
            Err(_) => {
                let slots = self.slots.clone();
                if let Ok(handle) = Handle::try_current() {
                    handle.spawn(async move {
                        vacate(&mut *slots.lock().await, vehicle, sequence);
                    });
                }
            }
        }
    }
}

/// Longest wait a deadline can express
const MAX_WAIT: Duration = Duration::from_secs(86_400 * 365);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout.min(MAX_WAIT)).unwrap_or(now)
}

/// Remove the vehicle's slot only if `sequence` still occupies it
fn vacate(slots: &mut HashMap<VehicleId, InFlight>, vehicle: VehicleId, sequence: u64) {
    if slots.get(&vehicle).map(|slot| slot.sequence) == Some(sequence) {
        slots.remove(&vehicle);
        debug!("[SERIAL] {} slot freed on drop (seq={})", vehicle, sequence);
    }
}

/// Per-vehicle exclusive slots
#[derive(Debug, Clone, Default)]
pub struct CommandSerializer {
    slots: Slots,
    sequence: Arc<AtomicU64>,
}

impl CommandSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Admit `command` as the sole occupant of the vehicle's slot.
    ///
    /// Fails with `NoSystem` when the vehicle is not connected and with `Busy`
    /// when another command is in flight. The deadline is fixed here.
    pub async fn submit(
        &self,
        vehicle: VehicleId,
        connected: bool,
        command: Command,
        timeout: Duration,
    ) -> Result<PendingCommand, ActionResult> {
        if !connected {
            return Err(ActionResult::NoSystem);
        }

        let mut slots = self.slots.lock().await;

        if let Some(current) = slots.get(&vehicle) {
            debug!(
                "[SERIAL] {} busy with {:?} (seq={}), rejecting {}",
                vehicle, current.kind, current.sequence, command
            );
            return Err(ActionResult::Busy);
        }

        let sequence = self.next_sequence();
        let (resolver, completion) = oneshot::channel();

        slots.insert(
            vehicle,
            InFlight {
                sequence,
                kind: command.kind(),
                resolver: Some(resolver),
            },
        );

        Ok(PendingCommand {
            vehicle,
            sequence,
            command,
            deadline: deadline_after(timeout),
            completion,
            slots: self.slots.clone(),
        })
    }

    /// Free the vehicle's slot. Releasing twice, or after a newer command was
    /// admitted, leaves the slot alone.
    pub async fn release(&self, pending: &PendingCommand) {
        let mut slots = self.slots.lock().await;

        match slots.get(&pending.vehicle) {
            Some(current) if current.sequence == pending.sequence => {
                slots.remove(&pending.vehicle);
            }
            Some(current) => {
                error!(
                    "[SERIAL] {} slot held by seq={} while releasing seq={}",
                    pending.vehicle, current.sequence, pending.sequence
                );
            }
            None => {}
        }
    }

    /// Hand an ack to the command it belongs to.
    ///
    /// Returns false if no in-flight command carries this sequence number or
    /// it was already resolved; the report is dropped in that case.
    pub async fn resolve(&self, report: AckReport) -> bool {
        let mut slots = self.slots.lock().await;

        let resolver = slots
            .values_mut()
            .find(|slot| slot.sequence == report.sequence)
            .and_then(|slot| slot.resolver.take());

        match resolver {
            // The waiter may have hit its deadline already
            Some(resolver) => resolver.send(report).is_ok(),
            None => false,
        }
    }

    /// Sequence number of the command in flight for `vehicle`
    pub async fn in_flight(&self, vehicle: VehicleId) -> Option<u64> {
        self.slots.lock().await.get(&vehicle).map(|slot| slot.sequence)
    }
}
