//! Pluggable message encoding

use std::error::Error;
use std::io::Write;

use bincode::{DefaultOptions, Options};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub trait SerializationBackend<T> {
    type Error: Error + Sync + Send + 'static;

    fn serialize_into<W: Write>(&self, value: &T, buffer: W) -> Result<(), Self::Error>;

    fn serialize(&self, value: &T) -> Result<Vec<u8>, Self::Error> {
        let mut buffer = vec![];
        self.serialize_into(value, &mut buffer)?;
        Ok(buffer)
    }
}

pub trait DeserializationBackend<T> {
    type Error: Error + Sync + Send + 'static;

    fn deserialize(&self, bytes: &[u8]) -> Result<T, Self::Error>;
}

/// Default size limit of a single encoded message, 16 MiB
pub const DEFAULT_SIZE_LIMIT: u64 = 16 * 1024 * 1024;

/// [bincode] with varint encoding and size limit
#[derive(Debug, Clone, Copy)]
pub struct Bincode {
    size_limit: u64,
}

impl Bincode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size_limit(size_limit: u64) -> Self {
        Self { size_limit }
    }

    fn options(&self) -> impl Options {
        DefaultOptions::new().with_limit(self.size_limit)
    }
}

impl Default for Bincode {
    fn default() -> Self {
        Self::with_size_limit(DEFAULT_SIZE_LIMIT)
    }
}

impl<T> SerializationBackend<T> for Bincode
where
    T: Serialize,
{
    type Error = bincode::Error;

    fn serialize_into<W: Write>(&self, value: &T, writer: W) -> Result<(), Self::Error> {
        self.options().serialize_into(writer, value)
    }
}

impl<T> DeserializationBackend<T> for Bincode
where
    T: DeserializeOwned,
{
    type Error = bincode::Error;

    fn deserialize(&self, bytes: &[u8]) -> Result<T, Self::Error> {
        self.options().deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::{Bincode, DeserializationBackend, SerializationBackend};
    use crate::messages::{Request, RequestBody, RequestHeader, SignedRequest};

    #[test]
    fn request_survives_encoding() {
        let codec = Bincode::new();
        let request = Request {
            header: RequestHeader {
                id: 17,
                session_id: 0xdead_beef,
            },
            body: RequestBody::KeyExchange {
                public_key: vec![1; 32],
                num_msgs: 2,
            },
        };
        let bytes = codec.serialize(&request).unwrap();
        let decoded: Request = codec.deserialize(&bytes).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn oversized_message_is_rejected() {
        let codec = Bincode::with_size_limit(64);
        let signed = SignedRequest {
            request_data: vec![0; 100],
            signature: vec![],
        };
        assert!(SerializationBackend::<SignedRequest>::serialize(&codec, &signed).is_err());

        let bytes = Bincode::new().serialize(&signed).unwrap();
        assert!(DeserializationBackend::<SignedRequest>::deserialize(&codec, &bytes).is_err());
    }

    #[test]
    fn truncated_input_is_rejected() {
        let codec = Bincode::new();
        let bytes = codec
            .serialize(&SignedRequest {
                request_data: vec![5; 10],
                signature: vec![6; 70],
            })
            .unwrap();
        let result: Result<SignedRequest, _> = codec.deserialize(&bytes[..bytes.len() - 1]);
        assert!(result.is_err());
    }
}
