//! Rotating-baton heartbeat failure detector.

use std::sync::Arc;

use crate::peer::Roster;
use crate::wire::{self, Message, MsgKind, PeerId};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

/// Failure detector task. At any tick exactly one peer cluster-wide holds
/// the probing baton; the baton advances every tick whether or not its
/// holder is still alive.
pub(crate) struct HeartbeatTask {
    pub(crate) id: PeerId,
    /// Cluster size at bootstrap: the rotation modulus. Kept separate from
    /// the live view so compaction never skews the schedule.
    pub(crate) population: u8,
    pub(crate) period: Duration,
    pub(crate) delay_max: u64,
    pub(crate) view: Arc<Mutex<Roster>>,
    pub(crate) failure_tx: mpsc::UnboundedSender<PeerId>,
}

impl HeartbeatTask {
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        // peer 0 starts with the baton; first round is one period in
        let mut holder: PeerId = 0;
        let mut ticker =
            time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if holder == self.id {
                pf_debug!("holding the heartbeat baton this tick");
                if !self.probe_all().await {
                    return; // main loop is gone
                }
            }
            holder = (holder + 1) % self.population;
        }
    }

    /// Probes every other peer currently in the view; compacts the view
    /// and signals the main loop for each unreachable peer. Returns false
    /// once failure signals have nowhere to go.
    async fn probe_all(&self) -> bool {
        let targets = self.view.lock().await.others(self.id);
        for peer in targets {
            pf_trace!("sending HEARTBEAT to {}", peer.id);
            let msg = Message::heartbeat(self.id);
            match wire::call_with_delay(peer.addr, &msg, self.delay_max).await
            {
                Ok(reply) if reply.kind == MsgKind::Heartbeat => {
                    pf_debug!("peer {:?} is alive", reply.ids.first());
                }
                Ok(reply) => {
                    pf_warn!("unexpected {} beat reply from {}", reply, peer.id);
                }
                Err(_) => {
                    pf_info!("no beat from {}, presuming crashed", peer.id);
                    self.view.lock().await.remove(peer.id);
                    if self.failure_tx.send(peer.id).is_err() {
                        return false;
                    }
                }
            }
        }
        true
    }
}
