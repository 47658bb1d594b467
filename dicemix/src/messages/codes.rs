use serde::{Deserialize, Serialize};

/// Kind of a request sent by a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum RequestCode {
    /// Not sent explicitly: a peer joins by opening a connection
    Join = 1,
    LongTermKey = 2,
    KeyExchange = 3,
    ExpDcVector = 4,
    SimpleDcVector = 5,
    TxConfirmation = 6,
    KeskResponse = 7,
}

/// Kind of a response sent by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ResponseCode {
    JoinResponse = 101,
    StartDiceMix = 102,
    KeyExchange = 103,
    ExpDcVector = 104,
    SimpleDcVector = 105,
    TxSuccessful = 106,
    KeskRequest = 107,
}

impl RequestCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl ResponseCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Request that peers are expected to send in reply to this response
    ///
    /// `None` for the join response (peers send their long-term key regardless of it) and for
    /// the terminal success response.
    pub fn expected_reply(self) -> Option<RequestCode> {
        match self {
            ResponseCode::StartDiceMix => Some(RequestCode::KeyExchange),
            ResponseCode::KeyExchange => Some(RequestCode::ExpDcVector),
            ResponseCode::ExpDcVector => Some(RequestCode::SimpleDcVector),
            ResponseCode::SimpleDcVector => Some(RequestCode::TxConfirmation),
            ResponseCode::KeskRequest => Some(RequestCode::KeskResponse),
            ResponseCode::JoinResponse | ResponseCode::TxSuccessful => None,
        }
    }

    /// Whether the response is sent to all peers of a run
    pub fn is_broadcast(self) -> bool {
        !matches!(self, ResponseCode::JoinResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::{RequestCode, ResponseCode};

    #[test]
    fn codes_have_wire_values() {
        assert_eq!(RequestCode::Join.as_u32(), 1);
        assert_eq!(RequestCode::KeskResponse.as_u32(), 7);
        assert_eq!(ResponseCode::JoinResponse.as_u32(), 101);
        assert_eq!(ResponseCode::KeskRequest.as_u32(), 107);
    }

    #[test]
    fn every_round_response_expects_a_reply() {
        assert_eq!(
            ResponseCode::StartDiceMix.expected_reply(),
            Some(RequestCode::KeyExchange)
        );
        assert_eq!(
            ResponseCode::SimpleDcVector.expected_reply(),
            Some(RequestCode::TxConfirmation)
        );
        assert_eq!(ResponseCode::TxSuccessful.expected_reply(), None);
        assert!(!ResponseCode::JoinResponse.is_broadcast());
    }
}
