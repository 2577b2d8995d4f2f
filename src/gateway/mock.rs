//! Scriptable in-memory gateway for tests

use super::{AckOutcome, AckReport, AckSender, GatewayError, VehicleGateway, VehicleId};
use crate::action::{Command, CommandKind, Parameter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::time::Duration;

/// How the mock answers a command kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    /// Ack right away. `Accepted` on parameter commands echoes the stored value.
    Ack(AckOutcome),
    /// Ack after a delay
    Delayed(Duration, AckOutcome),
    /// Never ack
    Silent,
    /// Fail the send itself
    SendFails,
    /// Panic inside `send`
    Panic,
}

pub struct MockGateway {
    connected: AtomicBool,
    acks: AckSender,
    script: Mutex<HashMap<CommandKind, Behavior>>,
    params: Mutex<HashMap<Parameter, f32>>,
    sent: Mutex<Vec<(VehicleId, u64, Command)>>,
    abandoned: Mutex<Vec<(VehicleId, u64)>>,
}

impl MockGateway {
    pub fn new(acks: AckSender) -> Self {
        Self {
            connected: AtomicBool::new(true),
            acks,
            script: Mutex::new(HashMap::new()),
            params: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            abandoned: Mutex::new(Vec::new()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn script(&self, kind: CommandKind, behavior: Behavior) {
        self.script.lock().unwrap().insert(kind, behavior);
    }

    pub fn set_param(&self, parameter: Parameter, value: f32) {
        self.params.lock().unwrap().insert(parameter, value);
    }

    pub fn sent(&self) -> Vec<(VehicleId, u64, Command)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn abandoned(&self) -> Vec<(VehicleId, u64)> {
        self.abandoned.lock().unwrap().clone()
    }

    fn report(&self, sequence: u64, command: &Command, outcome: AckOutcome) -> AckReport {
        let report = AckReport::new(sequence, outcome);
        if outcome != AckOutcome::Accepted {
            return report;
        }

        let mut params = self.params.lock().unwrap();
        match command.kind() {
            CommandKind::SetParameter(parameter) => {
                let value = command.param().unwrap_or_default();
                params.insert(parameter, value);
                report.with_value(value)
            }
            CommandKind::GetParameter(parameter) => match params.get(&parameter) {
                Some(value) => report.with_value(*value),
                None => report,
            },
            _ => report,
        }
    }
}

#[async_trait]
impl VehicleGateway for MockGateway {
    async fn is_connected(&self, _vehicle: VehicleId) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(
        &self,
        vehicle: VehicleId,
        sequence: u64,
        command: &Command,
    ) -> Result<(), GatewayError> {
        self.sent
            .lock()
            .unwrap()
            .push((vehicle, sequence, command.clone()));

        let behavior = self
            .script
            .lock()
            .unwrap()
            .get(&command.kind())
            .copied()
            .unwrap_or(Behavior::Ack(AckOutcome::Accepted));

        match behavior {
            Behavior::Ack(outcome) => {
                let _ = self.acks.send(self.report(sequence, command, outcome));
            }
            Behavior::Delayed(delay, outcome) => {
                let report = self.report(sequence, command, outcome);
                let acks = self.acks.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = acks.send(report);
                });
            }
            Behavior::Silent => {}
            Behavior::SendFails => return Err(GatewayError::LinkDown),
            Behavior::Panic => panic!("gateway failure while sending {}", command),
        }

        Ok(())
    }

    async fn abandon(&self, vehicle: VehicleId, sequence: u64) {
        self.abandoned.lock().unwrap().push((vehicle, sequence));
    }
}
