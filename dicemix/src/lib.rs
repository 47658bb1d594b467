//! Coordinator of DiceMix-Light anonymous broadcast sessions
//!
//! DiceMix lets a group of peers publish messages so that nobody (including the coordinator)
//! learns which peer published which message. Peers talk to each other only through the
//! coordinator, which relays their submissions round by round:
//!
//! 1. **Key exchange** \
//!    Peers announce ephemeral key exchange public keys and the number of messages they want
//!    to publish. Every pair of peers derives a shared keystream.
//! 2. **Exponential DC-net** \
//!    Each peer submits power sums of its message hashes masked with pairwise pads. Pads cancel
//!    out once all vectors are added up, the coordinator [solves](solver) the power sums and
//!    broadcasts the hashes (ordered), which fixes a slot for every message.
//! 3. **Simple DC-net** \
//!    Each peer puts its messages into their slots and XOR-masks the vector with pairwise
//!    keystreams. XOR of all vectors reveals the messages.
//! 4. **Confirmation** \
//!    Peers confirm that their messages were published. If someone doesn't, everybody reveals
//!    their ephemeral secret, the coordinator replays the run, excludes culprits and restarts
//!    with fresh keys.
//!
//! Peers that don't submit in time are excluded. The run is torn down once too few peers remain.
//!
//! ## Crate layout
//!
//! * [`Hub`] is the coordinator state machine, [`HubRunner`] executes it within tokio runtime
//! * [`session`] holds state of a single run and the blame logic
//! * [`messages`] defines wire format, [`serialization_backend`] encodes it
//! * [`crypto`] abstracts primitives the coordinator relies on
//! * [`field`], [`solver`] and [`dc`] implement DC-net arithmetic
//!
//! Networking is not part of this crate: `dicemix-server` serves a hub over websockets.
//!
//! ## Features
//!
//! * `dev` enables development tools such as [simulated peers](simulation)

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod crypto;
pub mod dc;
pub mod field;
pub mod hub;
pub mod messages;
pub mod serialization_backend;
pub mod session;
pub mod solver;

#[cfg(feature = "dev")]
#[cfg_attr(docsrs, doc(cfg(feature = "dev")))]
pub mod simulation;

#[doc(no_inline)]
pub use self::{
    config::HubConfig,
    hub::{Hub, HubHandle, HubRunner},
};
