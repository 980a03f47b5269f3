//! Bootstrap registrar: assigns dense peer ids in arrival order and
//! releases the full membership snapshot once the cluster is complete.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::utils::{self, CoronetError};
use crate::wire::{PeerId, PeerInfo, RegisterReply, RegisterRequest};

use bytes::BytesMut;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};

/// Startup environment configuration of the registrar process.
#[derive(Debug, Clone, Default)]
pub struct RegistrarEnv {
    /// Cluster size N (at least 2).
    pub peers: u8,
    /// Log verbosity ("", "1" or "2").
    pub verbose: String,
}

impl RegistrarEnv {
    /// Reads and validates the registrar environment variables.
    pub fn from_env() -> Result<Self, CoronetError> {
        let env = env_config!(|var| std::env::var(var).ok() => RegistrarEnv;
                              peers, verbose)?;
        if env.peers < 2 {
            return logged_err!("invalid cluster size {}", env.peers);
        }
        Ok(env)
    }
}

/// Roster being assembled during bootstrap.
struct RegState {
    roster: Vec<PeerInfo>,
}

/// The registrar service. Each registration call parks on the barrier
/// until all peers have registered, then receives the identical snapshot.
pub struct Registrar {
    population: u8,
    listener: TcpListener,
    state: Arc<Mutex<RegState>>,
    full_tx: watch::Sender<bool>,
}

impl Registrar {
    /// Creates a registrar service bound on the given address.
    pub async fn new_and_setup(
        addr: SocketAddr,
        population: u8,
    ) -> Result<Self, CoronetError> {
        if population < 2 {
            return logged_err!("invalid cluster size {}", population);
        }
        let listener = utils::tcp_bind_with_retry(addr, 3).await?;
        pf_info!(
            "serving registrations for {} peers on {}",
            population,
            listener.local_addr()?
        );
        let (full_tx, _full_rx) = watch::channel(false);
        Ok(Registrar {
            population,
            listener,
            state: Arc::new(Mutex::new(RegState { roster: vec![] })),
            full_tx,
        })
    }

    /// Locally bound address (of interest when bound on port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, CoronetError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves registration calls forever; callers arriving after the
    /// cluster is complete are rejected.
    pub async fn serve(self) -> Result<(), CoronetError> {
        loop {
            let (conn, addr) = self.listener.accept().await?;
            pf_debug!("accepted registration connection from {}", addr);
            let population = self.population;
            let state = self.state.clone();
            let full_tx = self.full_tx.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    serve_registration(conn, population, state, full_tx).await
                {
                    pf_warn!("registration handler error: {}", e);
                }
            });
        }
    }
}

/// Handles one registration call end-to-end.
async fn serve_registration(
    mut conn: TcpStream,
    population: u8,
    state: Arc<Mutex<RegState>>,
    full_tx: watch::Sender<bool>,
) -> Result<(), CoronetError> {
    let mut buf = BytesMut::new();
    let req: RegisterRequest = utils::safe_tcp_read(&mut conn, &mut buf).await?;

    // validate before consuming an id
    if req.addr.port() == 0 || req.addr.ip().is_unspecified() {
        pf_warn!("rejecting malformed address {}", req.addr);
        let reply = RegisterReply::Rejected {
            reason: format!("malformed address {}", req.addr),
        };
        return utils::safe_tcp_write(&mut conn, &reply).await;
    }

    let id = {
        let mut state = state.lock().await;
        if state.roster.len() as u8 >= population {
            drop(state);
            pf_warn!("rejecting extra registration from {}", req.addr);
            let reply = RegisterReply::Rejected {
                reason: "cluster already complete".into(),
            };
            return utils::safe_tcp_write(&mut conn, &reply).await;
        }

        let id = state.roster.len() as PeerId;
        state.roster.push(PeerInfo { id, addr: req.addr });
        pf_info!("assigned id {} to {}", id, req.addr);
        if state.roster.len() as u8 == population {
            pf_info!("cluster complete: {:?}", state.roster);
            full_tx.send_replace(true);
        }
        id
    };

    // park until every peer has registered
    let mut full_rx = full_tx.subscribe();
    full_rx.wait_for(|full| *full).await?;

    let roster = state.lock().await.roster.clone();
    let reply = RegisterReply::Granted { id, roster };
    utils::safe_tcp_write(&mut conn, &reply).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire;

    async fn spawn_registrar(population: u8) -> SocketAddr {
        let registrar = Registrar::new_and_setup(
            "127.0.0.1:0".parse().unwrap(),
            population,
        )
        .await
        .unwrap();
        let addr = registrar.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = registrar.serve().await;
        });
        addr
    }

    fn peer_addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn assigns_dense_ids_and_identical_snapshots() {
        let registrar = spawn_registrar(4).await;

        let mut calls = vec![];
        for i in 0..4u16 {
            calls.push(tokio::spawn(async move {
                wire::register_call(
                    registrar,
                    &RegisterRequest {
                        addr: peer_addr(9100 + i),
                    },
                )
                .await
                .unwrap()
            }));
        }

        let mut ids = vec![];
        let mut rosters = vec![];
        for call in calls {
            match call.await.unwrap() {
                RegisterReply::Granted { id, roster } => {
                    ids.push(id);
                    rosters.push(roster);
                }
                RegisterReply::Rejected { reason } => {
                    panic!("unexpected rejection: {}", reason)
                }
            }
        }

        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        for roster in &rosters {
            // every caller observes the same snapshot, in id order
            assert_eq!(roster, &rosters[0]);
            assert_eq!(
                roster.iter().map(|p| p.id).collect::<Vec<_>>(),
                vec![0, 1, 2, 3]
            );
        }
    }

    #[tokio::test]
    async fn rejects_stragglers_after_completion() {
        let registrar = spawn_registrar(2).await;

        let first = tokio::spawn(async move {
            wire::register_call(
                registrar,
                &RegisterRequest {
                    addr: peer_addr(9200),
                },
            )
            .await
            .unwrap()
        });
        let second = wire::register_call(
            registrar,
            &RegisterRequest {
                addr: peer_addr(9201),
            },
        )
        .await
        .unwrap();
        assert!(matches!(second, RegisterReply::Granted { .. }));
        assert!(matches!(
            first.await.unwrap(),
            RegisterReply::Granted { .. }
        ));

        let extra = wire::register_call(
            registrar,
            &RegisterRequest {
                addr: peer_addr(9202),
            },
        )
        .await
        .unwrap();
        assert!(matches!(extra, RegisterReply::Rejected { .. }));
    }

    #[tokio::test]
    async fn rejects_malformed_address_without_consuming_id() {
        let registrar = spawn_registrar(2).await;

        // port 0 is not a reachable service address
        let bad = wire::register_call(
            registrar,
            &RegisterRequest {
                addr: peer_addr(0),
            },
        )
        .await
        .unwrap();
        assert!(matches!(bad, RegisterReply::Rejected { .. }));

        // the cluster still completes with two honest callers
        let first = tokio::spawn(async move {
            wire::register_call(
                registrar,
                &RegisterRequest {
                    addr: peer_addr(9300),
                },
            )
            .await
            .unwrap()
        });
        let second = wire::register_call(
            registrar,
            &RegisterRequest {
                addr: peer_addr(9301),
            },
        )
        .await
        .unwrap();

        for reply in [first.await.unwrap(), second] {
            match reply {
                RegisterReply::Granted { roster, .. } => {
                    assert_eq!(roster.len(), 2)
                }
                RegisterReply::Rejected { reason } => {
                    panic!("unexpected rejection: {}", reason)
                }
            }
        }
    }
}
