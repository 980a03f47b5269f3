//! Peer runtime: election state, bootstrap, and the single-writer main
//! event loop.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::algorithms::{AlgorithmKind, ElectionAlgorithm};
use crate::utils::{self, CoronetError, Timer};
use crate::wire::{
    self, Message, MsgKind, PeerId, RegisterReply, RegisterRequest,
};

use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;

mod heartbeat;
mod roster;
mod service;

pub use roster::Roster;

use heartbeat::HeartbeatTask;
use service::PeerService;

/// Startup environment configuration of a peer process.
#[derive(Debug, Clone)]
pub struct PeerEnv {
    /// Cluster size N (at least 2).
    pub peers: u8,
    /// Election algorithm name ("bully" or "ring").
    pub algo: String,
    /// Maximum per-message random delay in ms.
    pub delay: u64,
    /// Heartbeat tick period in seconds (at least 1).
    pub heartbeat: u64,
    /// Log verbosity ("", "1" or "2").
    pub verbose: String,
    /// ';'-separated ids of peers that must crash at their next algorithm
    /// transition; negative entries are the launcher's no-test sentinel.
    pub crash: String,
}

impl Default for PeerEnv {
    fn default() -> Self {
        PeerEnv {
            peers: 0,
            algo: String::new(),
            delay: 0,
            heartbeat: 2,
            verbose: String::new(),
            crash: String::new(),
        }
    }
}

impl PeerEnv {
    /// Reads and validates the peer environment variables.
    pub fn from_env() -> Result<Self, CoronetError> {
        let env = env_config!(|var| std::env::var(var).ok() => PeerEnv;
                              peers, algo, delay, heartbeat, verbose, crash)?;
        env.validate()?;
        Ok(env)
    }

    fn validate(&self) -> Result<(), CoronetError> {
        if self.peers < 2 {
            return logged_err!("invalid cluster size {}", self.peers);
        }
        if self.heartbeat == 0 {
            return logged_err!("heartbeat period must be at least 1s");
        }
        self.algorithm()?;
        self.crash_ids()?;
        Ok(())
    }

    /// Algorithm kind selected by ALGO.
    pub fn algorithm(&self) -> Result<AlgorithmKind, CoronetError> {
        match AlgorithmKind::parse_name(&self.algo) {
            Some(kind) => Ok(kind),
            None => logged_err!("unrecognized algorithm name '{}'", self.algo),
        }
    }

    /// Ids listed in CRASH; out-of-range entries (e.g. the "-1" no-test
    /// sentinel) are ignored.
    pub fn crash_ids(&self) -> Result<Vec<PeerId>, CoronetError> {
        let mut ids = vec![];
        for tok in self.crash.split(';') {
            let tok = tok.trim();
            if tok.is_empty() {
                continue;
            }
            let id: i64 = tok.parse().map_err(|_| {
                CoronetError::msg(format!("invalid CRASH entry '{}'", tok))
            })?;
            if (0..=PeerId::MAX as i64).contains(&id) {
                ids.push(id as PeerId);
            }
        }
        Ok(ids)
    }
}

/// Election-relevant state of one peer. The main event loop is the sole
/// mutator; RPC handlers reach it only through channel hand-off.
pub struct ElectionState {
    /// My registrar-assigned id.
    pub id: PeerId,
    /// Cluster size at bootstrap.
    pub population: u8,
    /// Current coordinator; None means not yet known.
    pub coordinator: Option<PeerId>,
    /// Bully only: true while soliciting higher ids and not yet yielded.
    pub in_election: bool,
    /// Ring only: accumulated ballot of the in-flight election token.
    pub ring_ballot: Vec<PeerId>,
    /// Local membership view, shared with the failure detector.
    pub view: Arc<Mutex<Roster>>,
    /// Maximum outbound jitter in ms.
    pub delay_max: u64,
    /// Crash-at-next-transition test hook.
    pub crash: bool,
}

impl ElectionState {
    /// Test-hook crash: a structured exit(0), indistinguishable to other
    /// peers from a transport crash.
    pub(crate) fn maybe_crash(&self) {
        if self.crash {
            pf_info!("crash hook reached, exiting");
            std::process::exit(0);
        }
    }
}

/// One peer process: election state plus the channels, timer, and
/// background tasks around it.
pub struct PeerNode {
    state: ElectionState,
    kind: AlgorithmKind,
    algorithm: Box<dyn ElectionAlgorithm + Send + Sync>,
    hb_period: Duration,
    election_rx: mpsc::UnboundedReceiver<Message>,
    failure_rx: mpsc::UnboundedReceiver<PeerId>,
    /// Armed while a yielded Bully contestant awaits the winner's
    /// COORDINATOR announcement.
    await_coord: Timer,
    awaiting_coordinator: bool,
}

impl PeerNode {
    /// Creates a peer node: binds the service listener, registers with the
    /// registrar, and spawns the RPC service and the failure detector.
    pub async fn new_and_setup(
        env: &PeerEnv,
        registrar: SocketAddr,
        bind: SocketAddr,
    ) -> Result<Self, CoronetError> {
        let kind = env.algorithm()?;

        // bind the service socket first so the registrar learns a
        // reachable address
        let listener = utils::tcp_bind_with_retry(bind, 3).await?;
        let addr = listener.local_addr()?;
        pf_info!("serving peer RPCs on {}", addr);

        let reply = wire::register_call(registrar, &RegisterRequest { addr })
            .await?;
        let (id, roster) = match reply {
            RegisterReply::Granted { id, roster } => (id, roster),
            RegisterReply::Rejected { reason } => {
                return logged_err!("registration rejected: {}", reason);
            }
        };
        utils::set_me(format!("p{}", id));
        pf_info!("assigned id {} among {} peers", id, roster.len());

        let population = roster.len() as u8;
        let view = Arc::new(Mutex::new(Roster::new(roster)));
        let crash = env.crash_ids()?.contains(&id);
        if crash {
            pf_info!("will crash at the next algorithm transition");
        }

        let (election_tx, election_rx) = mpsc::unbounded_channel();
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();

        Arc::new(PeerService {
            id,
            algorithm: kind,
            delay_max: env.delay,
            election_tx,
        })
        .spawn(listener);

        HeartbeatTask {
            id,
            population,
            period: Duration::from_secs(env.heartbeat),
            delay_max: env.delay,
            view: view.clone(),
            failure_tx,
        }
        .spawn();

        Ok(PeerNode {
            state: ElectionState {
                id,
                population,
                coordinator: None,
                in_election: false,
                ring_ballot: vec![],
                view,
                delay_max: env.delay,
                crash,
            },
            kind,
            algorithm: kind.new_algorithm(),
            hb_period: Duration::from_secs(env.heartbeat),
            election_rx,
            failure_rx,
            await_coord: Timer::new(),
            awaiting_coordinator: false,
        })
    }

    /// Read access to the election state (log output, tests).
    pub fn state(&self) -> &ElectionState {
        &self.state
    }

    /// Runs the peer main loop forever. The peer holding the highest id
    /// bootstraps the first election; thereafter elections are driven by
    /// inbound messages and failure-detector signals.
    pub async fn run(&mut self) -> Result<(), CoronetError> {
        let highest = self.state.view.lock().await.max_id();
        if highest == Some(self.state.id) {
            pf_info!("bootstrapping the first election");
            self.new_election().await?;
        }

        loop {
            tokio::select! {
                msg = self.election_rx.recv() => match msg {
                    Some(msg) => self.handle_election_msg(msg).await?,
                    None => return logged_err!("election channel closed"),
                },

                id = self.failure_rx.recv() => match id {
                    Some(id) => self.handle_peer_failure(id).await?,
                    None => return logged_err!("failure channel closed"),
                },

                _ = self.await_coord.timeout(),
                        if self.awaiting_coordinator => {
                    self.handle_coordinator_timeout().await?;
                }
            }
        }
    }

    /// Handler of one election-layer message dequeued from the RPC
    /// service.
    async fn handle_election_msg(
        &mut self,
        msg: Message,
    ) -> Result<(), CoronetError> {
        match msg.kind {
            MsgKind::Election => match self.kind {
                // any inbound ELECTION came from a lower id: contest it
                AlgorithmKind::Bully => self.new_election().await,
                AlgorithmKind::Ring => self.handle_ring_ballot(msg.ids).await,
            },
            MsgKind::Coordinator => match msg.ids.first() {
                Some(&id) => self.accept_coordinator(id),
                None => logged_err!("COORDINATOR with empty payload"),
            },
            _ => {
                pf_warn!("ignoring unexpected {} event", msg);
                Ok(())
            }
        }
    }

    /// Accepts a COORDINATOR announcement. Re-announcements of the current
    /// coordinator leave the state unchanged.
    fn accept_coordinator(&mut self, id: PeerId) -> Result<(), CoronetError> {
        pf_info!("recognized {} as coordinator", id);
        self.state.coordinator = Some(id);
        self.state.ring_ballot.clear();
        self.state.in_election = false;
        self.awaiting_coordinator = false;
        self.await_coord.cancel();

        // crash-as-follower test hook
        self.state.maybe_crash();
        Ok(())
    }

    /// Handler of a Ring election token landing on this peer.
    async fn handle_ring_ballot(
        &mut self,
        ballot: Vec<PeerId>,
    ) -> Result<(), CoronetError> {
        self.state.ring_ballot = ballot;

        if !self.state.ring_ballot.contains(&self.state.id) {
            // not yet on the ballot: forward the token along the ring
            return self.algorithm.broadcast_election(&mut self.state).await;
        }

        if self.state.ring_ballot.first() == Some(&self.state.id) {
            // the token completed a full lap; the largest id on it wins
            let winner = match self.state.ring_ballot.iter().copied().max() {
                Some(winner) => winner,
                None => return logged_err!("completed ballot is empty"),
            };
            pf_info!(
                "election {:?} completed, found coordinator {}",
                self.state.ring_ballot,
                winner
            );
            self.state.coordinator = Some(winner);
            self.state.ring_ballot.clear();
            self.algorithm.broadcast_coordinator(&mut self.state).await
        } else {
            // the originator crashed before the token returned to it
            pf_info!(
                "originator of {:?} is gone, starting over",
                self.state.ring_ballot
            );
            self.state.ring_ballot.clear();
            self.algorithm.broadcast_election(&mut self.state).await
        }
    }

    /// Handler of a failure-detector signal.
    async fn handle_peer_failure(
        &mut self,
        id: PeerId,
    ) -> Result<(), CoronetError> {
        pf_info!("learned that peer {} is down", id);

        if self.state.coordinator == Some(id) && !self.election_in_progress()
        {
            pf_info!("coordinator {} is down, starting election", id);
            self.new_election().await?;
        }
        Ok(())
    }

    /// Whether an election is locally in flight.
    fn election_in_progress(&self) -> bool {
        match self.kind {
            AlgorithmKind::Bully => self.state.in_election,
            AlgorithmKind::Ring => !self.state.ring_ballot.is_empty(),
        }
    }

    /// Starts (or joins) an election per the configured algorithm.
    async fn new_election(&mut self) -> Result<(), CoronetError> {
        self.algorithm.broadcast_election(&mut self.state).await?;

        if self.kind == AlgorithmKind::Bully {
            if self.state.in_election {
                // no higher peer claimed the election: this peer wins
                self.awaiting_coordinator = false;
                self.await_coord.cancel();
                self.algorithm
                    .broadcast_coordinator(&mut self.state)
                    .await?;
            } else {
                // yielded to a higher peer; its COORDINATOR must arrive
                // within one full heartbeat rotation, else contest again
                self.awaiting_coordinator = true;
                self.await_coord
                    .kickoff(self.hb_period * self.state.population as u32);
            }
        }
        Ok(())
    }

    /// Handler of the await-coordinator deadline expiring.
    async fn handle_coordinator_timeout(
        &mut self,
    ) -> Result<(), CoronetError> {
        self.awaiting_coordinator = false;
        pf_info!("no COORDINATOR heard in time, contesting again");
        self.new_election().await
    }
}
