//! Wire messages
//!
//! Every request is wrapped into [`SignedRequest`]: `request_data` is the serialized [`Request`]
//! and `signature` is made over exactly these bytes with the peer's long-term key. Responses are
//! not signed.
//!
//! Messages are serialized with a [serialization backend](crate::serialization_backend),
//! [`Bincode`](crate::serialization_backend::Bincode) by default.

use serde::{Deserialize, Serialize};

pub use self::codes::{RequestCode, ResponseCode};

mod codes;

/// Identifier of a connected peer, assigned by the coordinator at join
pub type PeerId = i32;
/// Identifier of a run
pub type SessionId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    pub request_data: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub header: RequestHeader,
    pub body: RequestBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Sender of the request
    pub id: PeerId,
    /// Run the request belongs to, ignored for [`RequestBody::LongTermKey`]
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestBody {
    /// Peer's long-term signature verification key
    LongTermKey { public_key: Vec<u8> },
    /// Key exchange public key and number of messages the peer wants to publish
    KeyExchange { public_key: Vec<u8>, num_msgs: u32 },
    ExpDcVector { dc_exp_vector: Vec<u64> },
    SimpleDcVector {
        dc_simple_vector: Vec<Vec<u8>>,
        /// Whether all of the peer's message hashes were found among the solved roots
        my_ok: bool,
        /// Key exchange public key for the next run
        next_public_key: Vec<u8>,
    },
    TxConfirmation { confirmation: bool },
    /// Key exchange secret key revealed for blame
    KeskResponse { private_key: Vec<u8> },
}

impl RequestBody {
    pub fn code(&self) -> RequestCode {
        match self {
            RequestBody::LongTermKey { .. } => RequestCode::LongTermKey,
            RequestBody::KeyExchange { .. } => RequestCode::KeyExchange,
            RequestBody::ExpDcVector { .. } => RequestCode::ExpDcVector,
            RequestBody::SimpleDcVector { .. } => RequestCode::SimpleDcVector,
            RequestBody::TxConfirmation { .. } => RequestCode::TxConfirmation,
            RequestBody::KeskResponse { .. } => RequestCode::KeskResponse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub header: ResponseHeader,
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub code: ResponseCode,
    /// `0` in responses that don't belong to a run
    pub session_id: SessionId,
    /// Milliseconds since UNIX epoch
    pub timestamp: u64,
    pub message: String,
    pub err: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseBody {
    Join {
        id: PeerId,
    },
    /// Sent with [`ResponseCode::StartDiceMix`] and [`ResponseCode::KeyExchange`]
    Peers {
        peers: Vec<PeerInfo>,
    },
    DcExponential {
        roots: Vec<u64>,
    },
    DcSimple {
        messages: Vec<Vec<u8>>,
        peers: Vec<PeerInfo>,
    },
    TxSuccessful,
    KeskRequest,
}

/// Public information about a peer of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub lt_public_key: Vec<u8>,
    /// Current key exchange public key, empty before key exchange
    pub public_key: Vec<u8>,
    pub num_msgs: u32,
}
