//! Coordinator of DiceMix runs
//!
//! [`Hub`] is a synchronous state machine: it's fed with connection events, incoming frames and
//! timeouts, and it queues [effects](Effect) that must be carried out in order: frames to be
//! sent, peers to be disconnected, and timeouts to be scheduled. [`HubRunner`] executes the hub
//! within tokio runtime, processing one event at a time.
//!
//! Peers join a waiting room when they connect. Once enough of them announced their long-term
//! keys, they're moved into a fresh run.

use std::collections::HashMap;
use std::mem;
use std::time::{SystemTime, UNIX_EPOCH};

use phantom_type::PhantomType;
use rand::RngCore;
use rand_chacha::ChaCha20Rng;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, trace, warn};

use crate::config::HubConfig;
use crate::crypto::{CryptoSuite, DefaultSuite, SignatureScheme};
use crate::messages::{
    PeerId, Request, RequestBody, RequestCode, Response, ResponseBody, ResponseCode,
    ResponseHeader, SessionId, SignedRequest,
};
use crate::serialization_backend::{Bincode, DeserializationBackend, SerializationBackend};
use crate::session::{Outcome, Run, RunState, Violation};

pub use self::errors::{HubError, RequestError};
pub use self::runner::{HubHandle, HubRunner};

mod runner;

const WELCOME: &str = "Welcome to CoinShuffle++. Waiting for other peers to join ...";

/// Action requested by the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send the frame to every recipient. Broadcasts of a run are sent after
    /// [broadcast delay](HubConfig::set_broadcast_delay).
    Send {
        code: ResponseCode,
        recipients: Vec<PeerId>,
        frame: Vec<u8>,
    },
    /// Drop the connection to the peer
    Disconnect(PeerId),
    /// Call [`Hub::handle_timeout`] once [response wait](HubConfig::set_response_wait) elapses
    ScheduleTimeout(RoundTimeout),
}

/// Deadline of a round
///
/// Timeout is ignored if the run has moved on since it was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTimeout {
    pub session_id: SessionId,
    pub state: RunState,
    pub run: u32,
}

#[derive(Debug)]
struct WaitingPeer {
    id: PeerId,
    lt_public_key: Option<Vec<u8>>,
}

/// Coordinator state
pub struct Hub<C = DefaultSuite, R = ChaCha20Rng> {
    config: HubConfig,
    rng: R,
    codec: Bincode,
    clients: HashMap<PeerId, mpsc::Sender<Vec<u8>>>,
    waiting: Vec<WaitingPeer>,
    runs: HashMap<SessionId, Run>,
    effects: Vec<Effect>,
    _suite: PhantomType<C>,
}

impl<C, R> Hub<C, R>
where
    C: CryptoSuite,
    R: RngCore,
{
    /// Constructs a hub
    ///
    /// `rng` is used to draw peer ids and session ids.
    pub fn new(config: HubConfig, rng: R) -> Self {
        Self {
            codec: Bincode::with_size_limit(config.message_size_limit()),
            config,
            rng,
            clients: HashMap::new(),
            waiting: vec![],
            runs: HashMap::new(),
            effects: vec![],
            _suite: PhantomType::new(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Registers a new connection
    ///
    /// Returns id assigned to the peer and the queue of frames to be sent to it. The peer is
    /// put into waiting room and sent a join response.
    pub fn register(&mut self) -> (PeerId, mpsc::Receiver<Vec<u8>>) {
        let id = loop {
            let id = (self.rng.next_u32() >> 1) as PeerId;
            if id != 0 && !self.clients.contains_key(&id) {
                break id;
            }
        };
        let (sender, receiver) = mpsc::channel(self.config.outgoing_queue_capacity());
        self.clients.insert(id, sender);
        self.waiting.push(WaitingPeer {
            id,
            lt_public_key: None,
        });
        info!(peer = id, code = ?RequestCode::Join, "peer joined");

        let join = ResponseBody::Join { id };
        match self.encode_response(ResponseCode::JoinResponse, 0, WELCOME, join) {
            Ok(frame) => self.effects.push(Effect::Send {
                code: ResponseCode::JoinResponse,
                recipients: vec![id],
                frame,
            }),
            Err(err) => error!(peer = id, %err, "couldn't encode join response"),
        }
        (id, receiver)
    }

    /// Forgets the connection
    ///
    /// If the peer takes part in a run, it stays there until it fails to submit in time.
    pub fn unregister(&mut self, id: PeerId) {
        if self.clients.remove(&id).is_some() {
            info!(peer = id, "peer left");
        }
        self.waiting.retain(|p| p.id != id);
    }

    /// Drops the connection to the peer
    pub fn disconnect(&mut self, id: PeerId) {
        if self.clients.remove(&id).is_some() {
            debug!(peer = id, "disconnecting peer");
        }
        self.waiting.retain(|p| p.id != id);
    }

    /// Processes a frame received from some peer
    ///
    /// Frames that fail to decode, carry invalid signature or violate the protocol are
    /// discarded.
    pub fn handle_frame(&mut self, frame: &[u8]) {
        match self.try_handle_frame(frame) {
            Ok(()) => (),
            Err(err @ RequestError::Malformed(_)) => warn!(%err, "request discarded"),
            Err(err) => info!(%err, "request discarded"),
        }
    }

    /// Processes a frame received from some peer, returns an error if the frame is discarded
    pub fn try_handle_frame(&mut self, frame: &[u8]) -> Result<(), RequestError> {
        let signed: SignedRequest = self
            .codec
            .deserialize(frame)
            .map_err(RequestError::Malformed)?;
        let request: Request = self
            .codec
            .deserialize(&signed.request_data)
            .map_err(RequestError::Malformed)?;
        let id = request.header.id;
        let session_id = request.header.session_id;

        if let RequestBody::LongTermKey { public_key } = request.body {
            return self.handle_long_term_key(id, public_key);
        }

        let run = self
            .runs
            .get_mut(&session_id)
            .ok_or(Violation::UnknownSession(session_id))?;
        let lt_public_key = run.long_term_key(id).ok_or(Violation::UnknownPeer)?;
        C::Signature::verify(lt_public_key, &signed.request_data, &signed.signature)
            .map_err(RequestError::Signature)?;

        let code = request.body.code();
        let complete = run.accept::<C>(id, request.body, self.config.max_total_messages())?;
        info!(session_id, peer = id, ?code, "request accepted");

        if complete {
            let outcome = run.complete_round::<C>();
            self.broadcast(session_id, outcome);
        }
        Ok(())
    }

    fn handle_long_term_key(
        &mut self,
        id: PeerId,
        public_key: Vec<u8>,
    ) -> Result<(), RequestError> {
        C::Signature::validate_public_key(&public_key).map_err(Violation::InvalidPublicKey)?;
        let peer = self
            .waiting
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(Violation::NotWaiting)?;
        if peer.lt_public_key.is_some() {
            return Err(Violation::KeyAlreadyKnown.into());
        }
        peer.lt_public_key = Some(public_key);
        info!(peer = id, "received long-term key");

        let ready = self
            .waiting
            .iter()
            .filter(|p| p.lt_public_key.is_some())
            .count();
        if ready >= self.config.min_peers() {
            self.start_run();
        }
        Ok(())
    }

    /// Moves peers with known long-term keys from waiting room into a new run
    fn start_run(&mut self) {
        let session_id = loop {
            let id = self.rng.next_u64();
            if id != 0 && !self.runs.contains_key(&id) {
                break id;
            }
        };

        let (ready, waiting): (Vec<_>, Vec<_>) = mem::take(&mut self.waiting)
            .into_iter()
            .partition(|p| p.lt_public_key.is_some());
        self.waiting = waiting;

        let mut run = Run::new(
            session_id,
            ready
                .into_iter()
                .filter_map(|p| Some((p.id, p.lt_public_key?))),
        );
        let outcome = run.start();
        info!(session_id, peers = ?run.peer_ids(), "starting DiceMix run");
        self.runs.insert(session_id, run);
        self.broadcast(session_id, outcome);
    }

    /// Completes the round if the run is still in the same round as when timeout was scheduled
    pub fn handle_timeout(&mut self, timeout: RoundTimeout) {
        let run = match self.runs.get_mut(&timeout.session_id) {
            Some(run) => run,
            None => return,
        };
        if run.state() != timeout.state || run.run_number() != timeout.run {
            trace!(session_id = timeout.session_id, "stale timeout");
            return;
        }
        info!(
            session_id = timeout.session_id,
            state = ?timeout.state,
            run = timeout.run,
            "round timed out"
        );
        let outcome = run.complete_round::<C>();
        self.broadcast(timeout.session_id, outcome);
    }

    fn broadcast(&mut self, session_id: SessionId, outcome: Outcome) {
        for id in &outcome.evicted {
            info!(session_id, peer = id, "peer excluded from run");
            self.effects.push(Effect::Disconnect(*id));
        }

        let (recipients, state, run_number) = match self.runs.get(&session_id) {
            Some(run) => (run.peer_ids(), run.state(), run.run_number()),
            None => return,
        };
        if recipients.len() < self.config.min_active_peers() {
            warn!(
                session_id,
                peers = recipients.len(),
                "not enough peers left to continue the run"
            );
            self.terminate(session_id);
            return;
        }

        let code = outcome.response.code;
        let frame = match self.encode_response(
            code,
            session_id,
            outcome.response.message,
            outcome.response.body,
        ) {
            Ok(frame) => frame,
            Err(err) => {
                error!(session_id, %err, "couldn't encode response");
                self.terminate(session_id);
                return;
            }
        };
        self.effects.push(Effect::Send {
            code,
            recipients,
            frame,
        });

        if code == ResponseCode::TxSuccessful {
            info!(session_id, "run successful");
            self.terminate(session_id);
            return;
        }

        debug!(session_id, ?code, next = ?state, run = run_number, "broadcast");
        self.effects.push(Effect::ScheduleTimeout(RoundTimeout {
            session_id,
            state,
            run: run_number,
        }));
    }

    /// Removes the run and disconnects its peers
    fn terminate(&mut self, session_id: SessionId) {
        if let Some(run) = self.runs.remove(&session_id) {
            for id in run.peer_ids() {
                self.effects.push(Effect::Disconnect(id));
            }
            info!(session_id, "run terminated");
        }
    }

    fn encode_response(
        &self,
        code: ResponseCode,
        session_id: SessionId,
        message: &str,
        body: ResponseBody,
    ) -> Result<Vec<u8>, bincode::Error> {
        let response = Response {
            header: ResponseHeader {
                code,
                session_id,
                timestamp: timestamp(),
                message: message.to_owned(),
                err: String::new(),
            },
            body,
        };
        self.codec.serialize(&response)
    }

    /// Takes effects queued so far
    pub fn take_effects(&mut self) -> Vec<Effect> {
        mem::take(&mut self.effects)
    }

    /// Puts the frame into outgoing queues of recipients
    ///
    /// Recipients whose queue is full or closed are disconnected.
    pub fn deliver(&mut self, recipients: &[PeerId], frame: &[u8]) {
        for id in recipients {
            let client = match self.clients.get(id) {
                Some(client) => client,
                None => {
                    debug!(peer = id, "recipient is not connected");
                    continue;
                }
            };
            match client.try_send(frame.to_vec()) {
                Ok(()) => trace!(peer = id, "frame queued"),
                Err(TrySendError::Full(_)) => {
                    warn!(peer = id, "outgoing queue is full");
                    self.disconnect(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(peer = id, "outgoing queue is closed");
                    self.disconnect(*id);
                }
            }
        }
    }

    /// Run by its session id
    pub fn run(&self, session_id: SessionId) -> Option<&Run> {
        self.runs.get(&session_id)
    }

    /// Runs in progress
    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.runs.values()
    }

    /// Ids of peers in the waiting room
    pub fn waiting_peers(&self) -> Vec<PeerId> {
        self.waiting.iter().map(|p| p.id).collect()
    }

    pub fn is_connected(&self, id: PeerId) -> bool {
        self.clients.contains_key(&id)
    }
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub mod errors {
    use thiserror::Error;

    use crate::crypto::InvalidSignature;
    use crate::session::Violation;

    /// Reason why a request was discarded
    #[derive(Debug, Error)]
    pub enum RequestError {
        #[error("malformed request")]
        Malformed(#[source] bincode::Error),
        #[error("signature doesn't match sender's long-term key")]
        Signature(#[source] InvalidSignature),
        #[error("protocol violation")]
        Violation(
            #[source]
            #[from]
            Violation,
        ),
    }

    /// Coordinator is not reachable
    #[derive(Debug, Error)]
    pub enum HubError {
        #[error("coordinator has stopped")]
        Stopped,
    }
}
