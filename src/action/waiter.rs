//! Acknowledgment Waiter
//!
//! Routes acks from the gateway channel into the serializer's completion
//! slots, and suspends a single request until its ack or deadline.

use super::serializer::{CommandSerializer, PendingCommand};
use crate::gateway::{AckReceiver, AckReport};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaitOutcome {
    /// The vehicle answered before the deadline
    Acked(AckReport),
    /// The deadline passed first; any later ack is discarded
    TimedOut,
    /// The completion slot was dropped without an answer
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct AckWaiter {
    serializer: CommandSerializer,
}

impl AckWaiter {
    pub fn new(serializer: CommandSerializer) -> Self {
        Self { serializer }
    }

    /// Start routing acks from the gateway to in-flight commands.
    ///
    /// The task ends when every ack sender has been dropped.
    pub fn start(&self, mut acks: AckReceiver) -> JoinHandle<()> {
        let serializer = self.serializer.clone();

        tokio::spawn(async move {
            while let Some(report) = acks.recv().await {
                if !serializer.resolve(report).await {
                    debug!(
                        "[WAIT] Discarding ack for seq={} ({:?}): not in flight",
                        report.sequence, report.outcome
                    );
                }
            }
            info!("[WAIT] Ack channel closed");
        })
    }

    /// Suspend until the pending command is resolved or its deadline passes.
    ///
    /// The timeout was fixed into `pending.deadline` at admission. No lock is
    /// held while waiting.
    pub async fn wait(&self, pending: &mut PendingCommand) -> WaitOutcome {
        match tokio::time::timeout_at(pending.deadline, &mut pending.completion).await {
            Ok(Ok(report)) => WaitOutcome::Acked(report),
            Ok(Err(_)) => WaitOutcome::Abandoned,
            Err(_) => {
                // Refuse anything the gateway delivers from now on
                pending.completion.close();
                WaitOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Command, CommandKind};
    use crate::gateway::{ack_channel, AckOutcome, VehicleId};
    use tokio::time::{Duration, Instant};

    const VEHICLE: VehicleId = VehicleId(1);

    async fn admit(serializer: &CommandSerializer, timeout: Duration) -> PendingCommand {
        serializer
            .submit(VEHICLE, true, Command::new(CommandKind::Takeoff), timeout)
            .await
            .expect("admitted")
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_before_deadline() {
        let serializer = CommandSerializer::new();
        let waiter = AckWaiter::new(serializer.clone());
        let (ack_tx, ack_rx) = ack_channel();
        waiter.start(ack_rx);

        let mut pending = admit(&serializer, Duration::from_secs(1)).await;
        let sequence = pending.sequence;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = ack_tx.send(AckReport::new(sequence, AckOutcome::Accepted));
        });

        let outcome = waiter.wait(&mut pending).await;
        assert_eq!(
            outcome,
            WaitOutcome::Acked(AckReport::new(sequence, AckOutcome::Accepted))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_wins() {
        let serializer = CommandSerializer::new();
        let waiter = AckWaiter::new(serializer.clone());
        let (_ack_tx, ack_rx) = ack_channel();
        waiter.start(ack_rx);

        let timeout = Duration::from_millis(500);
        let start = Instant::now();
        let mut pending = admit(&serializer, timeout).await;

        assert_eq!(waiter.wait(&mut pending).await, WaitOutcome::TimedOut);
        assert!(start.elapsed() >= timeout);
        assert!(start.elapsed() < timeout + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_ack_is_discarded() {
        let serializer = CommandSerializer::new();
        let waiter = AckWaiter::new(serializer.clone());

        let mut pending = admit(&serializer, Duration::from_millis(100)).await;
        assert_eq!(waiter.wait(&mut pending).await, WaitOutcome::TimedOut);

        // Completion slot is closed, the late ack finds nobody listening
        let late = AckReport::new(pending.sequence, AckOutcome::Accepted);
        assert!(!serializer.resolve(late).await);

        serializer.release(&pending).await;
        assert!(!serializer.resolve(late).await);
        assert_eq!(serializer.in_flight(VEHICLE).await, None);
    }
}
