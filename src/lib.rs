//! Public interface to the coronet core library, linked by the peer and
//! registrar executables.

#[macro_use]
mod utils;

mod algorithms;
mod peer;
mod registrar;
mod wire;

pub use algorithms::{AlgorithmKind, ElectionAlgorithm};
pub use peer::{ElectionState, PeerEnv, PeerNode, Roster};
pub use registrar::{Registrar, RegistrarEnv};
pub use utils::{
    logger_init, me, set_me, verbose_level, AddrConf, ClusterConf,
    CoronetError, Timer,
};
pub use wire::{
    call, call_with_delay, register_call, Message, MsgKind, PeerId, PeerInfo,
    RegisterReply, RegisterRequest,
};
