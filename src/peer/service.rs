//! Peer inbound RPC service: accepts connections from other peers and
//! answers election-layer messages.

use std::sync::Arc;

use crate::algorithms::AlgorithmKind;
use crate::utils;
use crate::wire::{self, Message, MsgKind, PeerId};

use bytes::BytesMut;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Immutable context shared by all connection handler tasks. Handlers
/// never touch election state directly; state-relevant messages are handed
/// to the main loop through the election channel, and only after the reply
/// has been written back.
pub(crate) struct PeerService {
    pub(crate) id: PeerId,
    pub(crate) algorithm: AlgorithmKind,
    pub(crate) delay_max: u64,
    pub(crate) election_tx: mpsc::UnboundedSender<Message>,
}

/// What to do with one inbound message: the reply to send (None drops the
/// message as a protocol error), the event to hand to the main loop, and
/// whether the reply is jittered before being written.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Disposition {
    pub(crate) reply: Option<Message>,
    pub(crate) event: Option<Message>,
    pub(crate) delayed: bool,
}

impl PeerService {
    /// Spawns the acceptor loop on the given listener.
    pub(crate) fn spawn(self: Arc<Self>, listener: TcpListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((conn, _)) => {
                        let service = self.clone();
                        tokio::spawn(async move {
                            service.serve_conn(conn).await;
                        });
                    }
                    Err(e) => pf_error!("accept error: {}", e),
                }
            }
        })
    }

    /// Serves request/reply exchanges on one peer connection until the
    /// remote side hangs up or sends an unreadable frame.
    async fn serve_conn(&self, mut conn: TcpStream) {
        let mut buf = BytesMut::new();
        loop {
            let msg: Message =
                match utils::safe_tcp_read(&mut conn, &mut buf).await {
                    Ok(msg) => msg,
                    Err(_) => return,
                };

            let disposition = self.dispatch(msg);
            if let Some(reply) = disposition.reply {
                if disposition.delayed {
                    wire::random_delay(self.delay_max).await;
                }
                if utils::safe_tcp_write(&mut conn, &reply).await.is_err() {
                    return;
                }
            }
            // hand off only after the reply is on the wire
            if let Some(event) = disposition.event {
                if self.election_tx.send(event).is_err() {
                    return;
                }
            }
        }
    }

    /// Decides the reply, the main-loop hand-off, and the jitter for one
    /// inbound message.
    pub(crate) fn dispatch(&self, msg: Message) -> Disposition {
        match msg.kind {
            MsgKind::Election => {
                let delayed = match self.algorithm {
                    AlgorithmKind::Bully => {
                        pf_debug!(
                            "received ELECTION from {:?}",
                            msg.ids.first()
                        );
                        true // OK replies jitter; bare acks do not
                    }
                    AlgorithmKind::Ring => {
                        pf_debug!("received ELECTION ballot {:?}", msg.ids);
                        false
                    }
                };
                Disposition {
                    reply: Some(Message::ok()),
                    event: Some(msg),
                    delayed,
                }
            }
            MsgKind::Coordinator => {
                if msg.ids.is_empty() {
                    pf_warn!("dropping COORDINATOR with empty payload");
                    return Disposition {
                        reply: None,
                        event: None,
                        delayed: false,
                    };
                }
                pf_debug!("received COORDINATOR {}", msg.ids[0]);
                Disposition {
                    reply: Some(Message::ok()),
                    event: Some(msg),
                    delayed: false,
                }
            }
            MsgKind::Heartbeat => {
                pf_trace!("received HEARTBEAT from {:?}", msg.ids.first());
                Disposition {
                    reply: Some(Message::heartbeat(self.id)),
                    event: None,
                    delayed: true,
                }
            }
            MsgKind::Ok => {
                pf_warn!("dropping unexpected {}", msg);
                Disposition {
                    reply: None,
                    event: None,
                    delayed: false,
                }
            }
        }
    }
}
