//! Flight Link Connection
//!
//! Owns the MAVLink connection: reconnects on failure, writes queued outbound
//! messages and forwards everything received to the gateway.

use crate::config::VehicleConfig;
use crate::gateway::GatewayError;
use anyhow::{anyhow, Result};
use mavlink::ardupilotmega::MavMessage;
use mavlink::error::MessageReadError;
use mavlink::{MavConnection, MavHeader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type SharedConnection = Arc<Box<dyn MavConnection<MavMessage> + Send + Sync>>;

/// A message received from a vehicle
pub type Inbound = (MavHeader, MavMessage);

/// Handle to the link, cheap to clone
#[derive(Clone)]
pub struct FlightLink {
    outbound_tx: mpsc::Sender<MavMessage>,
    link_up: Arc<AtomicBool>,
}

impl FlightLink {
    /// Spawn the connection loop. Received messages arrive on the returned channel.
    pub fn start(config: VehicleConfig) -> (Self, mpsc::Receiver<Inbound>) {
        let (outbound_tx, outbound_rx) = mpsc::channel::<MavMessage>(100);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(100);
        let link_up = Arc::new(AtomicBool::new(false));

        let link_up_clone = link_up.clone();
        tokio::spawn(async move {
            connection_loop(config, outbound_rx, inbound_tx, link_up_clone).await;
        });

        (
            Self {
                outbound_tx,
                link_up,
            },
            inbound_rx,
        )
    }

    /// Link with no connection behind it; outbound messages land on the returned channel
    #[cfg(test)]
    pub fn detached(up: bool) -> (Self, mpsc::Receiver<MavMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::channel::<MavMessage>(100);
        (
            Self {
                outbound_tx,
                link_up: Arc::new(AtomicBool::new(up)),
            },
            outbound_rx,
        )
    }

    pub fn is_up(&self) -> bool {
        self.link_up.load(Ordering::SeqCst)
    }

    /// Queue a message for the vehicle
    pub async fn send(&self, msg: MavMessage) -> Result<(), GatewayError> {
        if !self.is_up() {
            return Err(GatewayError::LinkDown);
        }
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| GatewayError::QueueClosed)
    }
}

/// Main connection loop
async fn connection_loop(
    config: VehicleConfig,
    mut outbound_rx: mpsc::Receiver<MavMessage>,
    inbound_tx: mpsc::Sender<Inbound>,
    link_up: Arc<AtomicBool>,
) {
    loop {
        info!("[MAVLink] Connecting to {}", config.connection);

        match mavlink::connect::<MavMessage>(&config.connection) {
            Ok(conn) => {
                info!("[MAVLink] Link open");
                link_up.store(true, Ordering::SeqCst);

                let result =
                    handle_connection(Arc::new(conn), &config, &mut outbound_rx, &inbound_tx).await;
                link_up.store(false, Ordering::SeqCst);

                match result {
                    Ok(()) => {
                        info!("[MAVLink] Gateway dropped, closing link");
                        return;
                    }
                    Err(e) => warn!("[MAVLink] Connection error: {}", e),
                }
            }
            Err(e) => {
                warn!("[MAVLink] Failed to connect: {}", e);
            }
        }

        tokio::time::sleep(config.reconnect_delay()).await;
    }
}

/// Handle an active connection until it fails or the gateway goes away
async fn handle_connection(
    conn: SharedConnection,
    config: &VehicleConfig,
    outbound_rx: &mut mpsc::Receiver<MavMessage>,
    inbound_tx: &mpsc::Sender<Inbound>,
) -> Result<()> {
    let header = MavHeader {
        system_id: config.system_id,
        component_id: config.component_id,
        sequence: 0,
    };

    // recv() blocks, so reading gets its own thread. It cannot be interrupted;
    // the stop flag keeps it from forwarding once this connection is retired.
    let stop = Arc::new(AtomicBool::new(false));
    let reader_conn = conn.clone();
    let reader_tx = inbound_tx.clone();
    let reader_stop = stop.clone();
    let mut reader = tokio::task::spawn_blocking(move || {
        read_loop(|| reader_conn.recv(), &reader_tx, &reader_stop)
    });

    let result = loop {
        tokio::select! {
            msg = outbound_rx.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = conn.send(&header, &msg) {
                        break Err(anyhow!("Write error: {}", e));
                    }
                }
                None => break Ok(()),
            },

            joined = &mut reader => {
                break match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(anyhow!("Reader thread failed: {}", e)),
                };
            }
        }
    };

    stop.store(true, Ordering::SeqCst);
    result
}

/// Forward received messages until the link fails, the receiver goes away or
/// `stop` is raised
fn read_loop<F>(mut recv: F, inbound_tx: &mpsc::Sender<Inbound>, stop: &AtomicBool) -> Result<()>
where
    F: FnMut() -> Result<Inbound, MessageReadError>,
{
    while !stop.load(Ordering::SeqCst) {
        match recv() {
            Ok(inbound) => {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                if inbound_tx.blocking_send(inbound).is_err() {
                    return Ok(());
                }
            }
            Err(MessageReadError::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // No data available, continue
            }
            Err(MessageReadError::Parse(e)) => {
                debug!("[MAVLink] Dropping unparsable frame: {}", e);
            }
            Err(e) => return Err(anyhow!("Read error: {}", e)),
        }
    }

    debug!("[MAVLink] Reader for retired connection stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::ardupilotmega::{COMMAND_LONG_DATA, MavCmd};
    use mavlink::error::ParserError;

    fn message() -> MavMessage {
        MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system: 1,
            target_component: 1,
            command: MavCmd::MAV_CMD_NAV_LAND,
            confirmation: 0,
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: 0.0,
        })
    }

    #[tokio::test]
    async fn test_send_requires_link() {
        let (link, mut outbound) = FlightLink::detached(false);
        assert_eq!(link.send(message()).await, Err(GatewayError::LinkDown));

        let (link, mut queued) = FlightLink::detached(true);
        link.send(message()).await.expect("queued");
        assert!(queued.recv().await.is_some());
        assert!(outbound.try_recv().is_err());
    }

    fn inbound() -> Inbound {
        (MavHeader::default(), message())
    }

    #[test]
    fn test_reader_stops_when_retired() {
        let (inbound_tx, mut inbound_rx) = mpsc::channel(8);
        let stop = AtomicBool::new(false);

        // The connection is retired while recv() is blocked
        let mut calls = 0;
        let result = read_loop(
            || {
                calls += 1;
                stop.store(true, Ordering::SeqCst);
                Ok(inbound())
            },
            &inbound_tx,
            &stop,
        );

        assert!(result.is_ok());
        assert_eq!(calls, 1);
        assert!(inbound_rx.try_recv().is_err());
    }

    #[test]
    fn test_reader_skips_bad_frames_and_ends_on_io_error() {
        let (inbound_tx, mut inbound_rx) = mpsc::channel(8);
        let stop = AtomicBool::new(false);

        // Popped from the back
        let mut script = vec![
            Err(MessageReadError::Io(std::io::ErrorKind::ConnectionReset.into())),
            Ok(inbound()),
            Err(MessageReadError::Io(std::io::ErrorKind::WouldBlock.into())),
            Err(MessageReadError::Parse(ParserError::UnknownMessage { id: 9999 })),
            Ok(inbound()),
        ];
        let result = read_loop(
            || script.pop().expect("read past end of script"),
            &inbound_tx,
            &stop,
        );

        assert!(result.is_err());
        assert!(inbound_rx.try_recv().is_ok());
        assert!(inbound_rx.try_recv().is_ok());
        assert!(inbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (link, outbound) = FlightLink::detached(true);
        drop(outbound);
        assert_eq!(link.send(message()).await, Err(GatewayError::QueueClosed));
    }
}
