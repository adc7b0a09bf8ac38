//! Tokio driver.
//!
//! Moves a [`Server`] onto a task that ticks it on an interval. Events are
//! forwarded as [`OwnedEvent`]s over a channel; calls go through a cloneable
//! [`ServerHandle`] and are answered over oneshot channels.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use super::event::{OwnedEvent, Reliability};
use super::server::Server;
use crate::core::{AddressFamily, Error, Result};
use crate::endpoint::{EndpointId, EndpointStatus};

/// Capacity of the event and command channels.
const CHANNEL_CAPACITY: usize = 256;

enum Command {
    Connect {
        node: String,
        service: String,
        timeout: Duration,
        reply: oneshot::Sender<Result<EndpointId>>,
    },
    ConnectAddr {
        address: SocketAddr,
        timeout: Duration,
        reply: oneshot::Sender<Result<EndpointId>>,
    },
    Send {
        id: EndpointId,
        payload: Vec<u8>,
        reliability: Reliability,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        id: EndpointId,
        reply: oneshot::Sender<()>,
    },
    Status {
        id: EndpointId,
        reply: oneshot::Sender<Result<EndpointStatus>>,
    },
    LocalAddr {
        family: AddressFamily,
        reply: oneshot::Sender<Result<SocketAddr>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a server running on a driver task.
///
/// The task stops when [`ServerHandle::shutdown`] is called or every
/// handle has been dropped.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    tx: mpsc::Sender<Command>,
}

/// Move `server` onto a new task that ticks it every `tick_interval`.
///
/// Events that do not fit in the channel are dropped with a warning rather
/// than stalling the task, so a slow reader never blocks commands.
///
/// Must be called from within a tokio runtime.
pub fn spawn(server: Server, tick_interval: Duration) -> (ServerHandle, mpsc::Receiver<OwnedEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(run(server, tick_interval, cmd_rx, event_tx));

    (ServerHandle { tx: cmd_tx }, event_rx)
}

async fn run(
    mut server: Server,
    tick_interval: Duration,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<OwnedEvent>,
) {
    let mut ticker = time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(tick_ms = tick_interval.as_millis() as u64, "driver started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut dropped = 0usize;
                for event in server.tick() {
                    match events.try_send(OwnedEvent::from(event)) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => dropped += 1,
                        // Nobody listens; keep serving commands anyway
                        Err(TrySendError::Closed(_)) => {}
                    }
                }
                if dropped > 0 {
                    warn!(dropped, "event channel full, events dropped");
                }
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                if !handle(&mut server, command) {
                    break;
                }
            }
        }
    }

    debug!("driver stopped");
}

/// Apply one command. Returns `false` when the driver should stop.
fn handle(server: &mut Server, command: Command) -> bool {
    // A dropped reply receiver only means the caller stopped waiting
    match command {
        Command::Connect {
            node,
            service,
            timeout,
            reply,
        } => {
            let _ = reply.send(server.connect(&node, &service, timeout));
        }
        Command::ConnectAddr {
            address,
            timeout,
            reply,
        } => {
            let _ = reply.send(server.connect_addr(address, timeout));
        }
        Command::Send {
            id,
            payload,
            reliability,
            reply,
        } => {
            let _ = reply.send(server.send(id, &payload, reliability));
        }
        Command::Disconnect { id, reply } => {
            server.disconnect(id);
            let _ = reply.send(());
        }
        Command::Status { id, reply } => {
            let _ = reply.send(server.status(id));
        }
        Command::LocalAddr { family, reply } => {
            let addr = match family {
                AddressFamily::V4 => server.local_addr_v4(),
                AddressFamily::V6 => server.local_addr_v6(),
            };
            let _ = reply.send(addr);
        }
        Command::Shutdown { reply } => {
            let _ = reply.send(());
            return false;
        }
    }
    true
}

impl ServerHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| Error::DriverClosed)?;
        response.await.map_err(|_| Error::DriverClosed)
    }

    /// Resolve `node`/`service` and start connecting.
    pub async fn connect(&self, node: &str, service: &str, timeout: Duration) -> Result<EndpointId> {
        let node = node.to_string();
        let service = service.to_string();
        self.request(|reply| Command::Connect {
            node,
            service,
            timeout,
            reply,
        })
        .await?
    }

    /// Start connecting to a resolved address.
    pub async fn connect_addr(&self, address: SocketAddr, timeout: Duration) -> Result<EndpointId> {
        self.request(|reply| Command::ConnectAddr {
            address,
            timeout,
            reply,
        })
        .await?
    }

    /// Send a message.
    pub async fn send(&self, id: EndpointId, payload: impl Into<Vec<u8>>, reliability: Reliability) -> Result<()> {
        let payload = payload.into();
        self.request(|reply| Command::Send {
            id,
            payload,
            reliability,
            reply,
        })
        .await?
    }

    /// Close a connection.
    pub async fn disconnect(&self, id: EndpointId) -> Result<()> {
        self.request(|reply| Command::Disconnect { id, reply }).await
    }

    /// Current state of an endpoint.
    pub async fn status(&self, id: EndpointId) -> Result<EndpointStatus> {
        self.request(|reply| Command::Status { id, reply }).await?
    }

    /// Local address of the IPv4 socket.
    pub async fn local_addr_v4(&self) -> Result<SocketAddr> {
        self.request(|reply| Command::LocalAddr {
            family: AddressFamily::V4,
            reply,
        })
        .await?
    }

    /// Local address of the IPv6 socket.
    pub async fn local_addr_v6(&self) -> Result<SocketAddr> {
        self.request(|reply| Command::LocalAddr {
            family: AddressFamily::V6,
            reply,
        })
        .await?
    }

    /// Stop the driver task. The server and its sockets are dropped.
    pub async fn shutdown(&self) -> Result<()> {
        match self.request(|reply| Command::Shutdown { reply }).await {
            Ok(()) => Ok(()),
            Err(Error::DriverClosed) => {
                warn!("driver already stopped");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
