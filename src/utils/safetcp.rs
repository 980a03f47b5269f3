//! Safe TCP helpers: length-prefixed bincode framing and bind/connect with
//! retrying.

use std::net::SocketAddr;

use crate::utils::CoronetError;

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{self, Duration};

/// Upper bound on a single frame; election-layer payloads are tiny.
const MAX_FRAME_BYTES: usize = 16 * 1024;

/// Interval between bind/connect retries.
const RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Writes one length-prefixed bincode frame.
pub(crate) async fn safe_tcp_write<T, W>(
    conn: &mut W,
    msg: &T,
) -> Result<(), CoronetError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let bytes = bincode::serialize(msg)?;
    conn.write_u64(bytes.len() as u64).await?;
    conn.write_all(&bytes).await?;
    conn.flush().await?;
    Ok(())
}

/// Reads one length-prefixed bincode frame, reusing the given buffer.
pub(crate) async fn safe_tcp_read<T, R>(
    conn: &mut R,
    buf: &mut BytesMut,
) -> Result<T, CoronetError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let len = conn.read_u64().await? as usize;
    if len > MAX_FRAME_BYTES {
        return Err(CoronetError::msg(format!(
            "frame length {} exceeds limit {}",
            len, MAX_FRAME_BYTES
        )));
    }
    buf.clear();
    buf.resize(len, 0);
    conn.read_exact(&mut buf[..]).await?;
    Ok(bincode::deserialize(&buf[..])?)
}

/// Binds a TCP listener, retrying a few times on failure (e.g. an address
/// briefly still held by a previous run).
pub(crate) async fn tcp_bind_with_retry(
    addr: SocketAddr,
    mut retries: u8,
) -> Result<TcpListener, CoronetError> {
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                if retries == 0 {
                    return Err(e.into());
                }
                retries -= 1;
                time::sleep(RETRY_INTERVAL).await;
            }
        }
    }
}

/// Connects to a TCP endpoint, retrying a few times on failure (e.g. the
/// registrar not yet up at peer startup).
pub(crate) async fn tcp_connect_with_retry(
    addr: SocketAddr,
    mut retries: u8,
) -> Result<TcpStream, CoronetError> {
    loop {
        match TcpStream::connect(addr).await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                if retries == 0 {
                    return Err(e.into());
                }
                retries -= 1;
                time::sleep(RETRY_INTERVAL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{Message, MsgKind};

    #[tokio::test]
    async fn frame_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let sent = Message {
            ids: vec![0, 1, 2],
            kind: MsgKind::Election,
        };
        safe_tcp_write(&mut a, &sent).await.unwrap();

        let mut buf = BytesMut::new();
        let got: Message = safe_tcp_read(&mut b, &mut buf).await.unwrap();
        assert_eq!(got, sent);
    }

    #[tokio::test]
    async fn frame_back_to_back() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        for i in 0..3u8 {
            let msg = Message {
                ids: vec![i],
                kind: MsgKind::Heartbeat,
            };
            safe_tcp_write(&mut a, &msg).await.unwrap();
        }

        let mut buf = BytesMut::new();
        for i in 0..3u8 {
            let got: Message = safe_tcp_read(&mut b, &mut buf).await.unwrap();
            assert_eq!(got.ids, vec![i]);
        }
    }

    #[tokio::test]
    async fn frame_length_capped() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u64((MAX_FRAME_BYTES + 1) as u64).await.unwrap();

        let mut buf = BytesMut::new();
        assert!(safe_tcp_read::<Message, _>(&mut b, &mut buf).await.is_err());
    }

    #[tokio::test]
    async fn connect_refused_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(tcp_connect_with_retry(addr, 0).await.is_err());
    }
}
