//! Bully election algorithm.

use super::ElectionAlgorithm;
use crate::peer::ElectionState;
use crate::utils::CoronetError;
use crate::wire::{self, Message, MsgKind};

use async_trait::async_trait;

/// The Bully algorithm: contest against every higher id; silence from all
/// of them makes this peer the coordinator.
pub(super) struct BullyAlgorithm;

#[async_trait]
impl ElectionAlgorithm for BullyAlgorithm {
    async fn broadcast_election(
        &self,
        state: &mut ElectionState,
    ) -> Result<(), CoronetError> {
        state.in_election = true;

        let targets = state.view.lock().await.higher_than(state.id);
        for peer in targets {
            pf_debug!("sending ELECTION to {}", peer.id);
            let msg = Message::election(vec![state.id]);
            match wire::call_with_delay(peer.addr, &msg, state.delay_max).await
            {
                Err(_) => {
                    // crash-stop: compact the view and keep contesting
                    pf_info!("can't contact {}", peer.id);
                    state.view.lock().await.remove(peer.id);
                }
                Ok(reply) if reply.kind == MsgKind::Ok => {
                    // a higher peer claimed the election
                    pf_debug!("received OK from {}", peer.id);
                    state.in_election = false;
                    break;
                }
                Ok(reply) => {
                    pf_warn!("unexpected {} reply from {}", reply, peer.id);
                }
            }
        }
        Ok(())
    }

    async fn broadcast_coordinator(
        &self,
        state: &mut ElectionState,
    ) -> Result<(), CoronetError> {
        state.coordinator = Some(state.id);
        state.in_election = false;
        pf_info!("recognized itself as coordinator");

        let targets = state.view.lock().await.others(state.id);
        for peer in targets {
            pf_debug!("sending COORDINATOR to {}", peer.id);
            let msg = Message::coordinator(state.id);
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
