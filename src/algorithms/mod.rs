//! Coronet's collection of election algorithms.

use std::fmt;

use crate::peer::ElectionState;
use crate::utils::CoronetError;

use async_trait::async_trait;

mod bully;
use bully::BullyAlgorithm;

mod ring;
use ring::RingAlgorithm;

/// Enum of supported election algorithm types.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AlgorithmKind {
    Bully,
    Ring,
}

impl AlgorithmKind {
    /// Parse the ALGO environment string into an AlgorithmKind.
    pub fn parse_name(name: &str) -> Option<Self> {
        match name {
            "bully" => Some(Self::Bully),
            "ring" => Some(Self::Ring),
            _ => None,
        }
    }

    /// Create the algorithm capability object of this kind on heap.
    pub fn new_algorithm(&self) -> Box<dyn ElectionAlgorithm + Send + Sync> {
        match self {
            Self::Bully => Box::new(BullyAlgorithm),
            Self::Ring => Box::new(RingAlgorithm),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Election algorithm capability interface: how to contest an election and
/// how to announce a coordinator. Both operations mutate the election
/// state handed to them by the peer main loop, which stays the sole writer.
#[async_trait]
pub trait ElectionAlgorithm {
    /// Starts, or forwards, an election round from this peer.
    async fn broadcast_election(
        &self,
        state: &mut ElectionState,
    ) -> Result<(), CoronetError>;

    /// Announces the elected coordinator to the rest of the view.
    async fn broadcast_coordinator(
        &self,
        state: &mut ElectionState,
    ) -> Result<(), CoronetError>;
}
