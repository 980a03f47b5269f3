//! Wire-level types exchanged between peers and with the registrar, plus
//! the one-shot RPC client helpers.

use std::fmt;
use std::net::SocketAddr;

use crate::utils::{self, CoronetError};

use bytes::BytesMut;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::{self, Duration};

/// Peer ID type; ids are dense in [0, population) and assigned by the
/// registrar in arrival order.
pub type PeerId = u8;

/// Reachability descriptor of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addr: SocketAddr,
}

/// Kinds of election-layer messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgKind {
    Election = 0,
    Ok = 1,
    Coordinator = 2,
    Heartbeat = 3,
}

/// One election-layer message. The `ids` payload depends on the kind:
/// the sender's id for Bully ELECTION and HEARTBEAT, the accumulating
/// ballot for Ring ELECTION, the announced id for COORDINATOR, the
/// responder's id for a HEARTBEAT echo, and empty for a bare OK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub ids: Vec<PeerId>,
    pub kind: MsgKind,
}

impl Message {
    /// An ELECTION message carrying the given id payload.
    pub fn election(ids: Vec<PeerId>) -> Self {
        Message {
            ids,
            kind: MsgKind::Election,
        }
    }

    /// A bare OK acknowledgement.
    pub fn ok() -> Self {
        Message {
            ids: vec![],
            kind: MsgKind::Ok,
        }
    }

    /// A COORDINATOR announcement of the given id.
    pub fn coordinator(id: PeerId) -> Self {
        Message {
            ids: vec![id],
            kind: MsgKind::Coordinator,
        }
    }

    /// A HEARTBEAT probe (or echo) stamped with the given id.
    pub fn heartbeat(id: PeerId) -> Self {
        Message {
            ids: vec![id],
            kind: MsgKind::Heartbeat,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}{:?}", self.kind, self.ids)
    }
}

/// Registration request carrying the caller's reachable address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub addr: SocketAddr,
}

/// Registrar's reply to a registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterReply {
    /// Id assigned; full membership snapshot in ascending id order.
    Granted {
        id: PeerId,
        roster: Vec<PeerInfo>,
    },
    /// Registration refused; no id was consumed.
    Rejected { reason: String },
}

/// Sleeps a uniform random duration in [0, delay_max) milliseconds.
pub(crate) async fn random_delay(delay_max: u64) {
    if delay_max > 0 {
        let d = rand::thread_rng().gen_range(0..delay_max);
        pf_trace!("jitter of {} ms", d);
        time::sleep(Duration::from_millis(d)).await;
    }
}

/// Issues one request/response exchange with a peer. A connection or
/// framing failure is the distinguishable transport error that callers
/// interpret as crash-stop of the target.
pub async fn call(
    addr: SocketAddr,
    msg: &Message,
) -> Result<Message, CoronetError> {
    let mut conn = TcpStream::connect(addr).await?;
    utils::safe_tcp_write(&mut conn, msg).await?;
    let mut buf = BytesMut::new();
    utils::safe_tcp_read(&mut conn, &mut buf).await
}

/// Jitters for up to `delay_max` ms, then issues one exchange with a peer.
pub async fn call_with_delay(
    addr: SocketAddr,
    msg: &Message,
    delay_max: u64,
) -> Result<Message, CoronetError> {
    random_delay(delay_max).await;
    call(addr, msg).await
}

/// Calls the registrar's RegisterPeer operation. The dial is retried a few
/// times so that peers may come up slightly before the registrar.
pub async fn register_call(
    registrar: SocketAddr,
    req: &RegisterRequest,
) -> Result<RegisterReply, CoronetError> {
    let mut conn = utils::tcp_connect_with_retry(registrar, 10).await?;
    utils::safe_tcp_write(&mut conn, req).await?;
    let mut buf = BytesMut::new();
    utils::safe_tcp_read(&mut conn, &mut buf).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        assert_eq!(
            Message::election(vec![0, 1]),
            Message {
                ids: vec![0, 1],
                kind: MsgKind::Election
            }
        );
        assert_eq!(Message::ok().ids, vec![]);
        assert_eq!(Message::coordinator(3).ids, vec![3]);
        assert_eq!(Message::heartbeat(2).kind, MsgKind::Heartbeat);
    }

    #[test]
    fn message_display() {
        let msg = Message::election(vec![0, 2]);
        assert_eq!(format!("{}", msg), "Election[0, 2]");
    }

    #[test]
    fn message_encoding_round_trip() {
        let msg = Message::coordinator(3);
        let bytes = bincode::serialize(&msg).unwrap();
        let back: Message = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, msg);
    }

    #[tokio::test]
    async fn call_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(call(addr, &Message::heartbeat(0)).await.is_err());
    }
}
