//! State of DiceMix runs
//!
//! A run walks peers through rounds: key exchange, exponential DC-net, simple DC-net and
//! confirmation. When a round is complete (every peer submitted, or the round timed out), the
//! run decides what to broadcast next:
//!
//! | round        | everyone submitted                  | someone is missing           |
//! |--------------|-------------------------------------|------------------------------|
//! | key exchange | peers' keys                         | the same, without stragglers |
//! | exponential  | solved roots                        | restart from key exchange    |
//! | simple       | published messages                  | restart from key exchange    |
//! | confirmation | success, or request to reveal keys  | restart from key exchange    |
//! | blame        | restart without culprits            | the same, without stragglers |
//!
//! Every restart increments the run counter. The run itself doesn't know whether enough peers
//! are left to continue, that's decided by [`Hub`](crate::hub::Hub).

use std::mem;

use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto::{CryptoSuite, InvalidKey, KeyExchangeScheme};
use crate::dc::{self, SLOT_SIZE};
use crate::field::Fp;
use crate::messages::{
    PeerId, PeerInfo, RequestBody, RequestCode, ResponseBody, ResponseCode, SessionId,
};
use crate::solver::{self, MAX_POWER_SUMS};

pub use self::peer::Peer;

mod blame;
mod peer;

/// Round of a run, identified by the request it's waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    KeyExchange,
    DcExponential,
    DcSimple,
    Confirmation,
    Blame,
}

impl RunState {
    /// Kind of request peers are expected to submit in this round
    pub fn expected_request(self) -> RequestCode {
        match self {
            RunState::KeyExchange => RequestCode::KeyExchange,
            RunState::DcExponential => RequestCode::ExpDcVector,
            RunState::DcSimple => RequestCode::SimpleDcVector,
            RunState::Confirmation => RequestCode::TxConfirmation,
            RunState::Blame => RequestCode::KeskResponse,
        }
    }

    /// Round entered once response `code` is broadcast
    fn after(code: ResponseCode) -> Option<RunState> {
        match code.expected_reply()? {
            RequestCode::KeyExchange => Some(RunState::KeyExchange),
            RequestCode::ExpDcVector => Some(RunState::DcExponential),
            RequestCode::SimpleDcVector => Some(RunState::DcSimple),
            RequestCode::TxConfirmation => Some(RunState::Confirmation),
            RequestCode::KeskResponse => Some(RunState::Blame),
            RequestCode::Join | RequestCode::LongTermKey => None,
        }
    }
}

/// A single DiceMix session
#[derive(Debug, Clone)]
pub struct Run {
    session_id: SessionId,
    run: u32,
    state: RunState,
    peers: Vec<Peer>,
    messages: Vec<Vec<u8>>,
}

/// Decision made at the end of a round
#[derive(Debug)]
pub(crate) struct Outcome {
    /// Peers removed from the run
    pub evicted: Vec<PeerId>,
    pub response: RoundResponse,
}

#[derive(Debug)]
pub(crate) struct RoundResponse {
    pub code: ResponseCode,
    pub message: &'static str,
    pub body: ResponseBody,
}

impl Run {
    /// Creates a run of peers given by their ids and long-term keys
    pub(crate) fn new(
        session_id: SessionId,
        peers: impl IntoIterator<Item = (PeerId, Vec<u8>)>,
    ) -> Self {
        let peers = peers
            .into_iter()
            .map(|(id, lt_public_key)| {
                let mut peer = Peer::new(id, lt_public_key);
                peer.received = true;
                peer
            })
            .collect();
        Self {
            session_id,
            run: 0,
            state: RunState::KeyExchange,
            peers,
            messages: vec![],
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Run counter, incremented on every restart
    pub fn run_number(&self) -> u32 {
        self.run
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.iter().map(|p| p.id).collect()
    }

    /// Messages published by the simple DC-net round
    pub fn messages(&self) -> &[Vec<u8>] {
        &self.messages
    }

    /// Sum of messages announced by peers of the run
    pub fn total_messages(&self) -> usize {
        self.peers.iter().map(|p| p.num_msgs as usize).sum()
    }

    pub(crate) fn long_term_key(&self, id: PeerId) -> Option<&[u8]> {
        self.peers
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.lt_public_key.as_slice())
    }

    /// Stores a submission of a peer
    ///
    /// Returns `true` if every peer of the run has submitted in the current round.
    pub(crate) fn accept<C: CryptoSuite>(
        &mut self,
        id: PeerId,
        body: RequestBody,
        max_total_messages: u32,
    ) -> Result<bool, Violation> {
        let expected = self.state.expected_request();
        if body.code() != expected {
            return Err(Violation::UnexpectedRequest {
                expected,
                actual: body.code(),
            });
        }

        let total = self.total_messages();
        let announced: u64 = self
            .peers
            .iter()
            .filter(|p| p.received)
            .map(|p| u64::from(p.num_msgs))
            .sum();

        let peer = match self.peers.iter_mut().find(|p| p.id == id) {
            Some(peer) if peer.received => return Err(Violation::AlreadySubmitted),
            Some(peer) => peer,
            None => return Err(Violation::UnknownPeer),
        };

        match body {
            RequestBody::KeyExchange {
                public_key,
                num_msgs,
            } => {
                if num_msgs == 0 {
                    return Err(Violation::NoMessages);
                }
                let limit = u64::from(max_total_messages).min(MAX_POWER_SUMS as u64);
                let announced = announced + u64::from(num_msgs);
                if announced > limit {
                    return Err(Violation::TooManyMessages { announced, limit });
                }
                C::KeyExchange::validate_public_key(&public_key)
                    .map_err(Violation::InvalidPublicKey)?;
                peer.public_key = public_key;
                peer.num_msgs = num_msgs;
            }
            RequestBody::ExpDcVector { dc_exp_vector } => {
                if dc_exp_vector.len() != total {
                    return Err(Violation::LengthMismatch {
                        expected: total,
                        actual: dc_exp_vector.len(),
                    });
                }
                peer.dc_exp_vector = dc_exp_vector.into_iter().map(Fp::from_u64).collect();
            }
            RequestBody::SimpleDcVector {
                dc_simple_vector,
                my_ok,
                next_public_key,
            } => {
                if dc_simple_vector.len() != total {
                    return Err(Violation::LengthMismatch {
                        expected: total,
                        actual: dc_simple_vector.len(),
                    });
                }
                if let Some((index, slot)) = dc_simple_vector
                    .iter()
                    .enumerate()
                    .find(|(_, slot)| slot.len() != SLOT_SIZE)
                {
                    return Err(Violation::SlotSize {
                        index,
                        size: slot.len(),
                    });
                }
                C::KeyExchange::validate_public_key(&next_public_key)
                    .map_err(Violation::InvalidPublicKey)?;
                peer.dc_simple_vector = dc_simple_vector;
                peer.ok = my_ok;
                peer.next_public_key = next_public_key;
            }
            RequestBody::TxConfirmation { confirmation } => {
                peer.confirmation = confirmation;
            }
            RequestBody::KeskResponse { private_key } => {
                peer.private_key = private_key;
            }
            RequestBody::LongTermKey { .. } => {
                return Err(Violation::UnexpectedRequest {
                    expected,
                    actual: RequestCode::LongTermKey,
                })
            }
        }
        peer.received = true;

        Ok(self.peers.iter().all(|p| p.received))
    }

    /// Announces the run to its peers
    pub(crate) fn start(&mut self) -> Outcome {
        let evicted = self.filter_peers();
        let peers = self.peers_info();
        Outcome {
            evicted,
            response: self.respond(
                ResponseCode::StartDiceMix,
                "Initiate DiceMix Protocol",
                ResponseBody::Peers { peers },
            ),
        }
    }

    /// Completes the current round
    ///
    /// Called once every peer submitted, or once the round timed out. Peers who didn't submit
    /// are removed from the run.
    pub(crate) fn complete_round<C: CryptoSuite>(&mut self) -> Outcome {
        match self.state {
            RunState::KeyExchange => {
                let evicted = self.filter_peers();
                Outcome {
                    evicted,
                    response: self.key_exchange_response(),
                }
            }
            RunState::DcExponential => {
                let evicted = self.filter_peers();
                if !evicted.is_empty() {
                    return self.restart(evicted);
                }
                let roots = self.solve_roots();
                Outcome {
                    evicted,
                    response: self.respond(
                        ResponseCode::ExpDcVector,
                        "Solved DC Exponential Roots",
                        ResponseBody::DcExponential {
                            roots: roots.into_iter().map(Fp::value).collect(),
                        },
                    ),
                }
            }
            RunState::DcSimple => {
                let evicted = self.filter_peers();
                if !evicted.is_empty() {
                    return self.restart(evicted);
                }
                let total = self.total_messages();
                self.messages = dc::resolve(
                    self.peers.iter().map(|p| p.dc_simple_vector.as_slice()),
                    total,
                );
                debug!(
                    session_id = self.session_id,
                    published = self.messages.len(),
                    "resolved simple DC-net"
                );
                let body = ResponseBody::DcSimple {
                    messages: self.messages.clone(),
                    peers: self.peers_info(),
                };
                Outcome {
                    evicted,
                    response: self.respond(
                        ResponseCode::SimpleDcVector,
                        "DC Simple Response",
                        body,
                    ),
                }
            }
            RunState::Confirmation => self.check_confirmations(),
            RunState::Blame => self.blame::<C::KeyExchange>(),
        }
    }

    fn check_confirmations(&mut self) -> Outcome {
        let evicted = self.filter_peers();
        if !evicted.is_empty() {
            return self.restart(evicted);
        }

        if self.peers.iter().all(|p| p.confirmation) {
            return Outcome {
                evicted,
                response: self.respond(
                    ResponseCode::TxSuccessful,
                    "DiceMix Successful Response",
                    ResponseBody::TxSuccessful,
                ),
            };
        }

        self.run += 1;
        Outcome {
            evicted,
            response: self.respond(
                ResponseCode::KeskRequest,
                "Blame - send your kesk to identify culprit",
                ResponseBody::KeskRequest,
            ),
        }
    }

    /// Excludes culprits and peers who didn't reveal their keys, then starts over with keys
    /// announced for the next run
    ///
    /// Run counter was already incremented when blame was requested.
    fn blame<K: KeyExchangeScheme>(&mut self) -> Outcome {
        let roots = self.solve_roots();
        let culprits = blame::find_culprits::<K>(&self.peers, &self.messages, &roots);
        for peer in &mut self.peers {
            if culprits.contains(&peer.id) {
                peer.received = false;
            }
        }
        let evicted = self.filter_peers();
        for peer in &mut self.peers {
            peer.rotate_keys();
        }
        Outcome {
            evicted,
            response: self.key_exchange_response(),
        }
    }

    fn restart(&mut self, evicted: Vec<PeerId>) -> Outcome {
        self.run += 1;
        debug!(
            session_id = self.session_id,
            run = self.run,
            "restarting run from key exchange"
        );
        Outcome {
            evicted,
            response: self.key_exchange_response(),
        }
    }

    fn key_exchange_response(&mut self) -> RoundResponse {
        let peers = self.peers_info();
        self.respond(
            ResponseCode::KeyExchange,
            "Key Exchange Response",
            ResponseBody::Peers { peers },
        )
    }

    fn respond(
        &mut self,
        code: ResponseCode,
        message: &'static str,
        body: ResponseBody,
    ) -> RoundResponse {
        if let Some(next) = RunState::after(code) {
            self.state = next;
        }
        RoundResponse {
            code,
            message,
            body,
        }
    }

    /// Removes peers who didn't submit in the current round and resets submission flags
    fn filter_peers(&mut self) -> Vec<PeerId> {
        let mut evicted = vec![];
        self.peers.retain_mut(|peer| {
            if mem::take(&mut peer.received) {
                true
            } else {
                evicted.push(peer.id);
                false
            }
        });
        evicted
    }

    fn peers_info(&self) -> Vec<PeerInfo> {
        self.peers.iter().map(Peer::info).collect()
    }

    /// Message hashes encoded in exponential vectors, empty if they can't be solved
    fn solve_roots(&self) -> Vec<Fp> {
        let total = self.total_messages();
        let combined = dc::combine(
            self.peers.iter().map(|p| p.dc_exp_vector.as_slice()),
            total,
        );
        match solver::solve(&combined) {
            Ok(roots) => roots,
            Err(err) => {
                warn!(session_id = self.session_id, %err, "couldn't solve exponential DC-net");
                vec![]
            }
        }
    }
}

/// Request doesn't follow the protocol
#[derive(Debug, Error)]
pub enum Violation {
    #[error("session {0} doesn't exist")]
    UnknownSession(SessionId),
    #[error("peer is not part of the run")]
    UnknownPeer,
    #[error("peer is not in the waiting room")]
    NotWaiting,
    #[error("expected {expected:?} request, got {actual:?}")]
    UnexpectedRequest {
        expected: RequestCode,
        actual: RequestCode,
    },
    #[error("peer already submitted in this round")]
    AlreadySubmitted,
    #[error("long-term key is already known")]
    KeyAlreadyKnown,
    #[error("peer must send at least one message")]
    NoMessages,
    #[error("peers announced {announced} messages in total, limit is {limit}")]
    TooManyMessages { announced: u64, limit: u64 },
    #[error("vector has {actual} slots, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("slot {index} has wrong size: {size} bytes")]
    SlotSize { index: usize, size: usize },
    #[error("invalid public key")]
    InvalidPublicKey(#[source] InvalidKey),
}
