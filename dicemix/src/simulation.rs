//! Simulated DiceMix peers
//!
//! [`SimulatedPeer`] is a client that follows the protocol (or deviates from it in a way given
//! by [`Behaviour`]), it's transport-agnostic: feed it with frames sent by the coordinator and
//! send back whatever it replies. [`Simulation`] connects simulated peers directly to a [`Hub`]
//! and drives the whole session in place, without any runtime.
//!
//! ```rust
//! use dicemix::simulation::{Simulation, SimulatedPeer};
//! use dicemix::{Hub, HubConfig};
//! use rand::SeedableRng;
//!
//! let hub = Hub::new(HubConfig::default(), rand_chacha::ChaCha20Rng::seed_from_u64(1));
//! let mut simulation = Simulation::new(hub);
//! for (i, message) in ["alice", "bob", "carol"].iter().enumerate() {
//!     simulation.connect(SimulatedPeer::new([message], i as u64)?);
//! }
//! simulation.run_until_idle();
//! assert!(simulation.peers().all(|p| p.is_finished()));
//! # Ok::<_, dicemix::simulation::SimulationError>(())
//! ```

use std::mem;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::crypto::default_suite::chacha::ChaChaKeystream;
use crate::crypto::default_suite::ecdsa::Secp256k1Ecdsa;
use crate::crypto::default_suite::x25519::X25519;
use crate::crypto::{DefaultSuite, InvalidKey, KeyExchangeScheme, Keystream};
use crate::dc::{self, SLOT_SIZE};
use crate::field::Fp;
use crate::hub::{Effect, Hub, RoundTimeout};
use crate::messages::{
    PeerId, PeerInfo, Request, RequestBody, RequestCode, RequestHeader, Response, ResponseBody,
    ResponseCode, SessionId, SignedRequest,
};
use crate::serialization_backend::{Bincode, DeserializationBackend, SerializationBackend};

/// How a simulated peer deviates from the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Honest,
    /// Stops replying once it's asked for a request of given kind
    SilentFrom(RequestCode),
    /// Writes garbage into a slot of the simple DC-net vector it doesn't own
    ExtraSlot,
    /// Reveals a key exchange secret that doesn't match its public key
    WrongSecret,
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("couldn't encode request")]
    Encode(#[source] bincode::Error),
    #[error("couldn't decode response")]
    Decode(#[source] bincode::Error),
    #[error("key is rejected")]
    Key(#[source] InvalidKey),
    #[error("unexpected response {0:?}")]
    UnexpectedResponse(ResponseCode),
    #[error("peer is not part of the run")]
    NotInRun,
    #[error("message of {len} bytes doesn't fit into a slot")]
    MessageTooLong { len: usize },
}

#[derive(Debug)]
struct KxKeypair {
    secret: [u8; 32],
    public: Vec<u8>,
}

impl KxKeypair {
    fn generate(rng: &mut impl RngCore) -> Self {
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        let public = PublicKey::from(&StaticSecret::from(secret)).as_bytes().to_vec();
        Self { secret, public }
    }
}

/// DiceMix client speaking [`DefaultSuite`]
#[derive(Debug)]
pub struct SimulatedPeer {
    behaviour: Behaviour,
    rng: ChaCha20Rng,
    codec: Bincode,

    slots: Vec<Vec<u8>>,
    hashes: Vec<Fp>,

    lt_secret: [u8; 32],
    lt_public_key: Vec<u8>,
    kx: KxKeypair,
    next_kx: KxKeypair,

    id: PeerId,
    session_id: SessionId,
    peers: Vec<PeerInfo>,
    total: usize,
    published: Vec<Vec<u8>>,
    finished: bool,
}

impl SimulatedPeer {
    /// Constructs a peer willing to publish `messages`, keys are derived from `seed`
    ///
    /// Returns error if any message is longer than [`SLOT_SIZE`]
    pub fn new<M: AsRef<[u8]>>(
        messages: impl IntoIterator<Item = M>,
        seed: u64,
    ) -> Result<Self, SimulationError> {
        let slots = messages
            .into_iter()
            .map(|m| {
                let m = m.as_ref();
                dc::to_slot(m).ok_or(SimulationError::MessageTooLong { len: m.len() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let hashes = slots.iter().map(|s| dc::message_hash(s)).collect();

        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let (lt_secret, lt_public_key) = loop {
            let mut secret = [0u8; 32];
            rng.fill_bytes(&mut secret);
            if let Ok(public_key) = Secp256k1Ecdsa::public_key(&secret) {
                break (secret, public_key);
            }
        };
        let kx = KxKeypair::generate(&mut rng);
        let next_kx = KxKeypair::generate(&mut rng);

        Ok(Self {
            behaviour: Behaviour::Honest,
            rng,
            codec: Bincode::new(),
            slots,
            hashes,
            lt_secret,
            lt_public_key,
            kx,
            next_kx,
            id: 0,
            session_id: 0,
            peers: vec![],
            total: 0,
            published: vec![],
            finished: false,
        })
    }

    pub fn with_behaviour(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    /// Id assigned by the coordinator, `0` before join
    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Messages of the peer, padded to slot size
    pub fn messages(&self) -> &[Vec<u8>] {
        &self.slots
    }

    /// Messages published by the last simple DC-net round the peer took part in
    pub fn published(&self) -> &[Vec<u8>] {
        &self.published
    }

    /// Whether the coordinator announced successful completion
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Handles a frame sent by the coordinator, returns a frame to be sent back (if any)
    pub fn handle(&mut self, frame: &[u8]) -> Result<Option<Vec<u8>>, SimulationError> {
        let response: Response = self
            .codec
            .deserialize(frame)
            .map_err(SimulationError::Decode)?;
        let code = response.header.code;
        debug!(peer = self.id, ?code, "simulated peer received response");

        let reply = match (code, response.body) {
            (ResponseCode::JoinResponse, ResponseBody::Join { id }) => {
                self.id = id;
                RequestBody::LongTermKey {
                    public_key: self.lt_public_key.clone(),
                }
            }
            (ResponseCode::StartDiceMix, ResponseBody::Peers { .. }) => {
                self.session_id = response.header.session_id;
                RequestBody::KeyExchange {
                    public_key: self.kx.public.clone(),
                    num_msgs: self.slots.len() as u32,
                }
            }
            (ResponseCode::KeyExchange, ResponseBody::Peers { peers }) => {
                self.exponential_round(peers)?
            }
            (ResponseCode::ExpDcVector, ResponseBody::DcExponential { roots }) => {
                self.simple_round(roots)?
            }
            (ResponseCode::SimpleDcVector, ResponseBody::DcSimple { messages, .. }) => {
                let confirmation = dc::contains_all(&self.slots, &messages);
                self.published = messages;
                RequestBody::TxConfirmation { confirmation }
            }
            (ResponseCode::KeskRequest, ResponseBody::KeskRequest) => {
                let private_key = match self.behaviour {
                    Behaviour::WrongSecret => vec![0x55; 32],
                    _ => self.kx.secret.to_vec(),
                };
                RequestBody::KeskResponse { private_key }
            }
            (ResponseCode::TxSuccessful, ResponseBody::TxSuccessful) => {
                self.finished = true;
                return Ok(None);
            }
            (code, _) => return Err(SimulationError::UnexpectedResponse(code)),
        };

        self.sign(reply)
    }

    fn exponential_round(&mut self, peers: Vec<PeerInfo>) -> Result<RequestBody, SimulationError> {
        let me = peers
            .iter()
            .find(|p| p.id == self.id)
            .ok_or(SimulationError::NotInRun)?;
        if me.public_key == self.next_kx.public {
            let fresh = KxKeypair::generate(&mut self.rng);
            self.kx = mem::replace(&mut self.next_kx, fresh);
            debug!(peer = self.id, "switched to key announced for the next run");
        }
        self.total = peers.iter().map(|p| p.num_msgs as usize).sum();
        self.peers = peers;

        let pads = self
            .keystreams()?
            .into_iter()
            .map(|(id, keystream)| (id, keystream.field_element()));
        let vector = dc::exponential_vector(self.id, &self.hashes, pads, self.total);
        Ok(RequestBody::ExpDcVector {
            dc_exp_vector: vector.into_iter().map(Fp::value).collect(),
        })
    }

    fn simple_round(&mut self, roots: Vec<u64>) -> Result<RequestBody, SimulationError> {
        let roots: Vec<Fp> = roots.into_iter().map(Fp::from_u64).collect();
        let mut vector = vec![vec![0u8; SLOT_SIZE]; self.total];
        let mut my_ok = true;
        let mut owned = vec![];
        for (slot, hash) in self.slots.iter().zip(&self.hashes) {
            match roots.iter().position(|r| r == hash) {
                Some(position) if position < vector.len() => {
                    vector[position] = slot.clone();
                    owned.push(position);
                }
                _ => my_ok = false,
            }
        }
        if self.behaviour == Behaviour::ExtraSlot {
            if let Some(position) = (0..vector.len()).find(|i| !owned.contains(i)) {
                vector[position] = vec![0xee; SLOT_SIZE];
            }
        }

        let mut keystreams: Vec<ChaChaKeystream> =
            self.keystreams()?.into_iter().map(|(_, k)| k).collect();
        dc::apply_keystreams(&mut vector, &mut keystreams);

        Ok(RequestBody::SimpleDcVector {
            dc_simple_vector: vector,
            my_ok,
            next_public_key: self.next_kx.public.clone(),
        })
    }

    fn keystreams(&self) -> Result<Vec<(PeerId, ChaChaKeystream)>, SimulationError> {
        self.peers
            .iter()
            .filter(|p| p.id != self.id)
            .map(|p| {
                X25519::shared_keystream(&self.kx.secret, &p.public_key)
                    .map(|keystream| (p.id, keystream))
                    .map_err(SimulationError::Key)
            })
            .collect()
    }

    fn sign(&self, body: RequestBody) -> Result<Option<Vec<u8>>, SimulationError> {
        if let Behaviour::SilentFrom(code) = self.behaviour {
            if body.code().as_u32() >= code.as_u32() {
                debug!(peer = self.id, code = ?body.code(), "simulated peer stays silent");
                return Ok(None);
            }
        }
        let request = Request {
            header: RequestHeader {
                id: self.id,
                session_id: self.session_id,
            },
            body,
        };
        let request_data = self
            .codec
            .serialize(&request)
            .map_err(SimulationError::Encode)?;
        let signature =
            Secp256k1Ecdsa::sign(&self.lt_secret, &request_data).map_err(SimulationError::Key)?;
        self.codec
            .serialize(&SignedRequest {
                request_data,
                signature,
            })
            .map(Some)
            .map_err(SimulationError::Encode)
    }
}

struct Connection {
    id: PeerId,
    peer: SimulatedPeer,
    outgoing: mpsc::Receiver<Vec<u8>>,
}

/// Drives simulated peers connected directly to a [`Hub`]
///
/// Time doesn't flow in simulation: broadcasts are delivered immediately, and rounds time out
/// only when [`expire_timeouts`](Self::expire_timeouts) is called.
pub struct Simulation<R = ChaCha20Rng> {
    hub: Hub<DefaultSuite, R>,
    connections: Vec<Connection>,
    timeouts: Vec<RoundTimeout>,
    sent: Vec<(ResponseCode, Vec<PeerId>)>,
}

impl<R: RngCore> Simulation<R> {
    pub fn new(hub: Hub<DefaultSuite, R>) -> Self {
        Self {
            hub,
            connections: vec![],
            timeouts: vec![],
            sent: vec![],
        }
    }

    /// Connects a peer to the hub, returns id assigned to it
    ///
    /// Peer doesn't receive anything until [`run_until_idle`](Self::run_until_idle) is called.
    pub fn connect(&mut self, peer: SimulatedPeer) -> PeerId {
        let (id, outgoing) = self.hub.register();
        self.connections.push(Connection { id, peer, outgoing });
        id
    }

    /// Exchanges frames between hub and peers until nobody has anything to say
    pub fn run_until_idle(&mut self) {
        while self.step() {}
    }

    /// Carries out pending effects of the hub, then lets peers reply to whatever they received
    ///
    /// A round completed by the replies isn't broadcast until the next step. Returns `false` if
    /// nothing happened.
    pub fn step(&mut self) -> bool {
        let mut progress = self.apply_effects();

        let mut replies = vec![];
        for connection in &mut self.connections {
            while let Ok(frame) = connection.outgoing.try_recv() {
                progress = true;
                match connection.peer.handle(&frame) {
                    Ok(Some(reply)) => replies.push(reply),
                    Ok(None) => (),
                    Err(err) => warn!(peer = connection.id, %err, "simulated peer failed"),
                }
            }
        }
        for reply in replies {
            self.hub.handle_frame(&reply);
            progress = true;
        }
        progress
    }

    /// Fires every timeout scheduled so far, then runs until idle
    pub fn expire_timeouts(&mut self) {
        for timeout in mem::take(&mut self.timeouts) {
            self.hub.handle_timeout(timeout);
        }
        self.run_until_idle();
    }

    fn apply_effects(&mut self) -> bool {
        let effects = self.hub.take_effects();
        let applied = !effects.is_empty();
        for effect in effects {
            match effect {
                Effect::Send {
                    code,
                    recipients,
                    frame,
                } => {
                    self.hub.deliver(&recipients, &frame);
                    self.sent.push((code, recipients));
                }
                Effect::Disconnect(id) => self.hub.disconnect(id),
                Effect::ScheduleTimeout(timeout) => self.timeouts.push(timeout),
            }
        }
        applied
    }

    pub fn hub(&self) -> &Hub<DefaultSuite, R> {
        &self.hub
    }

    pub fn peer(&self, id: PeerId) -> Option<&SimulatedPeer> {
        self.connections
            .iter()
            .find(|c| c.id == id)
            .map(|c| &c.peer)
    }

    pub fn peers(&self) -> impl Iterator<Item = &SimulatedPeer> {
        self.connections.iter().map(|c| &c.peer)
    }

    /// Responses sent by the hub so far, along with their recipients
    pub fn sent(&self) -> &[(ResponseCode, Vec<PeerId>)] {
        &self.sent
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::{SimulatedPeer, Simulation, SimulationError};
    use crate::messages::ResponseCode;
    use crate::{Hub, HubConfig};

    #[test]
    fn message_longer_than_slot_is_refused() {
        let result = SimulatedPeer::new(["short", "twenty one bytes long"], 1);
        assert_matches!(result, Err(SimulationError::MessageTooLong { len: 21 }));
    }

    #[test]
    fn step_delivers_join_response() {
        let mut simulation = Simulation::new(Hub::new(
            HubConfig::default(),
            ChaCha20Rng::seed_from_u64(3),
        ));
        let id = simulation.connect(SimulatedPeer::new(["hi"], 1).unwrap());
        assert!(simulation.step());
        assert_eq!(simulation.peer(id).unwrap().id(), id);
        assert_eq!(simulation.sent(), &[(ResponseCode::JoinResponse, vec![id])]);

        // the long-term key was submitted during the first step
        assert!(!simulation.step());
        assert_eq!(simulation.hub().waiting_peers(), vec![id]);
    }
}
