//! One OpenFlow session per connected switch.
//!
//! # Responsibilities
//! - Run the HELLO / FEATURES handshake and learn the datapath id
//! - Answer echo requests
//! - Dispatch PACKET_IN and FLOW_REMOVED to the controller
//! - Queue controller commands to a dedicated writer task
//!
//! # Design Decisions
//! - Reads happen on the session task, writes on a separate task fed by an
//!   unbounded channel, so controller sends never block packet handling
//! - A packet-in that fails to process is logged; only I/O and framing
//!   errors end the session

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{broadcast, mpsc};

use crate::controller::{Outcome, SharedController, Switch, SwitchError};
use crate::net::connection::ConnectionId;
use crate::openflow::{read_message, write_message, FlowMod, Message, PacketOut, WireError};

/// Error that ends a switch session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Switch(#[from] SwitchError),

    #[error("writer task failed: {0}")]
    Writer(String),
}

type Outbound = (u32, Message);

/// Cloneable sender side of a session, implementing [`Switch`].
#[derive(Debug, Clone)]
pub struct SwitchHandle {
    datapath_id: Arc<AtomicU64>,
    next_xid: Arc<AtomicU32>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SwitchHandle {
    fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            datapath_id: Arc::new(AtomicU64::new(0)),
            next_xid: Arc::new(AtomicU32::new(1)),
            tx,
        }
    }

    /// Queue a controller-initiated message under a fresh xid.
    pub fn send(&self, message: Message) -> Result<u32, SwitchError> {
        let xid = self.next_xid.fetch_add(1, Ordering::Relaxed);
        self.reply(xid, message)?;
        Ok(xid)
    }

    /// Queue a message answering `xid`.
    pub fn reply(&self, xid: u32, message: Message) -> Result<(), SwitchError> {
        self.tx
            .send((xid, message))
            .map_err(|_| SwitchError::Disconnected(self.datapath_id()))
    }

    fn set_datapath_id(&self, datapath_id: u64) {
        self.datapath_id.store(datapath_id, Ordering::Relaxed);
    }
}

impl Switch for SwitchHandle {
    fn datapath_id(&self) -> u64 {
        self.datapath_id.load(Ordering::Relaxed)
    }

    fn send_packet_out(&self, packet_out: PacketOut) -> Result<(), SwitchError> {
        self.send(Message::PacketOut(packet_out)).map(|_| ())
    }

    fn install_flow(&self, flow_mod: FlowMod) -> Result<(), SwitchError> {
        self.send(Message::FlowMod(flow_mod)).map(|_| ())
    }
}

/// State for one switch connection.
pub struct SwitchSession {
    id: ConnectionId,
    peer: SocketAddr,
    controller: SharedController,
    max_message_bytes: usize,
}

impl SwitchSession {
    pub fn new(id: ConnectionId, peer: SocketAddr, controller: SharedController, max_message_bytes: usize) -> Self {
        Self {
            id,
            peer,
            controller,
            max_message_bytes,
        }
    }

    /// Drive the session until the switch disconnects or shutdown fires.
    pub async fn run<S>(self, stream: S, mut shutdown: broadcast::Receiver<()>) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_loop(writer, rx));
        let handle = SwitchHandle::new(tx);

        tracing::debug!(connection_id = %self.id, peer_addr = %self.peer, "Starting OpenFlow handshake");

        let result = match handle.send(Message::Hello).and_then(|_| handle.send(Message::FeaturesRequest)) {
            Ok(_) => self.read_loop(&mut reader, &handle, &mut shutdown).await,
            Err(e) => Err(e.into()),
        };

        // Closing the last sender lets the writer flush and exit.
        drop(handle);
        let written = match writer_task.await {
            Ok(r) => r.map_err(SessionError::from),
            Err(e) => Err(SessionError::Writer(e.to_string())),
        };

        result.and(written)
    }

    async fn read_loop<R>(
        &self,
        reader: &mut R,
        handle: &SwitchHandle,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin,
    {
        let mut connected = false;

        let result = loop {
            let (xid, message) = tokio::select! {
                read = read_message(reader, self.max_message_bytes) => match read {
                    Ok(msg) => msg,
                    Err(WireError::Closed) => break Ok(()),
                    Err(e) => break Err(SessionError::from(e)),
                },
                _ = shutdown.recv() => {
                    tracing::debug!(connection_id = %self.id, "Session received shutdown signal");
                    break Ok(());
                }
            };

            if let Err(e) = self.dispatch(xid, message, handle, &mut connected) {
                break Err(e);
            }
        };

        if connected {
            self.controller.on_switch_disconnected(handle.datapath_id());
        }
        result
    }

    fn dispatch(
        &self,
        xid: u32,
        message: Message,
        handle: &SwitchHandle,
        connected: &mut bool,
    ) -> Result<(), SessionError> {
        match message {
            Message::Hello => {
                tracing::trace!(connection_id = %self.id, "HELLO received");
            }
            Message::EchoRequest(data) => {
                handle.reply(xid, Message::EchoReply(data))?;
            }
            Message::FeaturesReply(features) => {
                if *connected {
                    return Ok(());
                }
                handle.set_datapath_id(features.datapath_id);
                tracing::info!(
                    connection_id = %self.id,
                    peer_addr = %self.peer,
                    dpid = %format!("{:016x}", features.datapath_id),
                    ports = features.ports.len(),
                    buffers = features.n_buffers,
                    "Switch handshake complete"
                );
                *connected = true;
                self.controller.on_switch_connected(handle)?;
            }
            Message::PacketIn(packet_in) => {
                if !*connected {
                    tracing::debug!(connection_id = %self.id, "PACKET_IN before handshake, ignoring");
                    return Ok(());
                }
                match self.controller.on_packet_in(handle, &packet_in) {
                    Ok(Outcome::Dropped(reason)) => {
                        tracing::trace!(in_port = packet_in.in_port, reason = %reason, "Packet dropped");
                    }
                    Ok(outcome) => {
                        tracing::trace!(in_port = packet_in.in_port, ?outcome, "Packet handled");
                    }
                    Err(e) => {
                        tracing::debug!(in_port = packet_in.in_port, kind = e.kind(), error = %e, "Packet not handled");
                    }
                }
            }
            Message::FlowRemoved(removed) => {
                self.controller.on_flow_removed(&removed);
            }
            Message::Error(err) => {
                tracing::warn!(
                    connection_id = %self.id,
                    xid,
                    error_type = err.error_type,
                    code = err.code,
                    "Switch reported an error"
                );
            }
            other => {
                tracing::debug!(connection_id = %self.id, msg_type = other.msg_type(), "Ignoring message");
            }
        }
        Ok(())
    }
}

async fn write_loop<S>(mut writer: WriteHalf<S>, mut rx: mpsc::UnboundedReceiver<Outbound>) -> Result<(), WireError>
where
    S: AsyncRead + AsyncWrite,
{
    while let Some((xid, message)) = rx.recv().await {
        write_message(&mut writer, xid, &message).await?;
    }
    // The peer may already be gone; nothing left to report.
    let _ = writer.shutdown().await;
    Ok(())
}
