use crate::field::Fp;
use crate::messages::{PeerId, PeerInfo};

/// State of a peer within a run
#[derive(Debug, Clone)]
pub struct Peer {
    pub(crate) id: PeerId,
    pub(crate) lt_public_key: Vec<u8>,
    pub(crate) public_key: Vec<u8>,
    pub(crate) next_public_key: Vec<u8>,
    pub(crate) num_msgs: u32,
    /// Whether the peer submitted in the current round
    pub(crate) received: bool,
    pub(crate) dc_exp_vector: Vec<Fp>,
    pub(crate) dc_simple_vector: Vec<Vec<u8>>,
    pub(crate) ok: bool,
    pub(crate) confirmation: bool,
    pub(crate) private_key: Vec<u8>,
}

impl Peer {
    pub(crate) fn new(id: PeerId, lt_public_key: Vec<u8>) -> Self {
        Self {
            id,
            lt_public_key,
            public_key: vec![],
            next_public_key: vec![],
            num_msgs: 0,
            received: false,
            dc_exp_vector: vec![],
            dc_simple_vector: vec![],
            ok: false,
            confirmation: false,
            private_key: vec![],
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn lt_public_key(&self) -> &[u8] {
        &self.lt_public_key
    }

    /// Key exchange public key in use for the current run
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn num_msgs(&self) -> u32 {
        self.num_msgs
    }

    /// Whether the peer already submitted in the current round
    pub fn has_submitted(&self) -> bool {
        self.received
    }

    pub(crate) fn info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id,
            lt_public_key: self.lt_public_key.clone(),
            public_key: self.public_key.clone(),
            num_msgs: self.num_msgs,
        }
    }

    /// Takes announced key for the next run into use
    pub(crate) fn rotate_keys(&mut self) {
        self.public_key = std::mem::take(&mut self.next_public_key);
    }
}
