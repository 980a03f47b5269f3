//! Unidirectional ring election algorithm.

use super::ElectionAlgorithm;
use crate::peer::ElectionState;
use crate::utils::CoronetError;
use crate::wire::{self, Message};

use async_trait::async_trait;

/// The ring algorithm: an election token accumulates ids while hopping to
/// the next position on the (compacted) ring; the originator resolves the
/// winner once the token comes back around.
pub(super) struct RingAlgorithm;

#[async_trait]
impl ElectionAlgorithm for RingAlgorithm {
    async fn broadcast_election(
        &self,
        state: &mut ElectionState,
    ) -> Result<(), CoronetError> {
        if !state.ring_ballot.contains(&state.id) {
            state.ring_ballot.push(state.id);
        }
        let ballot = state.ring_ballot.clone();

        loop {
            let successor = state.view.lock().await.successor_of(state.id);
            match successor {
                None => {
                    // ring collapsed to one: nobody left to out-vote
                    pf_info!("ring collapsed, recognized itself as coordinator");
                    state.coordinator = Some(state.id);
                    state.ring_ballot.clear();
                    self.broadcast_coordinator(state).await?;
                    return Ok(());
                }
                Some(peer) => {
                    pf_debug!(
                        "sending ELECTION {:?} to {}",
                        ballot,
                        peer.id
                    );
                    let msg = Message::election(ballot.clone());
                    match wire::call_with_delay(
                        peer.addr,
                        &msg,
                        state.delay_max,
                    )
                    .await
                    {
                        Ok(_) => return Ok(()),
                        Err(_) => {
                            pf_info!(
                                "can't contact {}, trying next on the ring",
                                peer.id
                            );
                            state.view.lock().await.remove(peer.id);
                        }
                    }
                }
            }
        }
    }

    async fn broadcast_coordinator(
        &self,
        state: &mut ElectionState,
    ) -> Result<(), CoronetError> {
        let coordinator = match state.coordinator {
            Some(id) => id,
            None => return logged_err!("no coordinator to announce"),
        };

        let targets = state.view.lock().await.others(state.id);
        for peer in targets {
            pf_debug!("sending COORDINATOR to {}", peer.id);
            let msg = Message::coordinator(coordinator);
            // dead peers will be noticed by the next heartbeat round
            if wire::call_with_delay(peer.addr, &msg, state.delay_max)
                .await
                .is_err()
            {
                pf_info!("can't contact {}", peer.id);
            }
        }

        state.maybe_crash();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{dead_addr, spawn_stub, test_state};
    use super::*;
    use crate::wire::MsgKind;

    #[tokio::test]
    async fn forwards_appended_ballot_to_successor() {
        let (next, mut seen) = spawn_stub(Message::ok()).await;
        let self_addr = dead_addr().await;
        let mut state = test_state(0, vec![(0, self_addr), (1, next)]);
        state.ring_ballot = vec![3];

        RingAlgorithm.broadcast_election(&mut state).await.unwrap();

        assert_eq!(seen.recv().await, Some(Message::election(vec![3, 0])));
        assert_eq!(state.ring_ballot, vec![3, 0]);
    }

    #[tokio::test]
    async fn skips_dead_successor() {
        let dead = dead_addr().await;
        let (reachable, mut seen) = spawn_stub(Message::ok()).await;
        let self_addr = dead_addr().await;
        let mut state =
            test_state(0, vec![(0, self_addr), (1, dead), (2, reachable)]);

        RingAlgorithm.broadcast_election(&mut state).await.unwrap();

        // delivered one hop further; the dead hop was compacted away
        assert_eq!(seen.recv().await, Some(Message::election(vec![0])));
        assert!(!state.view.lock().await.contains(1));
    }

    #[tokio::test]
    async fn collapsed_ring_elects_self() {
        let self_addr = dead_addr().await;
        let dead = dead_addr().await;
        let mut state = test_state(2, vec![(1, dead), (2, self_addr)]);

        RingAlgorithm.broadcast_election(&mut state).await.unwrap();

        assert_eq!(state.coordinator, Some(2));
        assert!(state.ring_ballot.is_empty());
    }

    #[tokio::test]
    async fn announces_resolved_coordinator() {
        let (a, mut seen_a) = spawn_stub(Message::ok()).await;
        let (b, mut seen_b) = spawn_stub(Message::ok()).await;
        let self_addr = dead_addr().await;
        let mut state = test_state(1, vec![(0, a), (1, self_addr), (3, b)]);
        state.coordinator = Some(3);

        RingAlgorithm
            .broadcast_coordinator(&mut state)
            .await
            .unwrap();

        for seen in [&mut seen_a, &mut seen_b] {
            let msg = seen.recv().await.unwrap();
            assert_eq!(msg.kind, MsgKind::Coordinator);
            assert_eq!(msg.ids, vec![3]);
        }
    }

    #[tokio::test]
    async fn announce_without_coordinator_is_error() {
        let self_addr = dead_addr().await;
        let mut state = test_state(0, vec![(0, self_addr)]);
        assert!(RingAlgorithm
            .broadcast_coordinator(&mut state)
            .await
            .is_err());
    }
}
