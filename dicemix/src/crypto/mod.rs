//! Cryptographic primitives used by the coordinator
//!
//! The coordinator never signs or encrypts anything itself. It needs to:
//! * verify that a request was signed by the long-term key of the peer it claims to come from
//! * check that a revealed key exchange secret matches the public key announced earlier
//! * derive pairwise shared keys of a peer with revealed secret, and expand them into the
//!   keystreams the peer used for masking its DC-net vectors
//!
//! These are abstracted by [`CryptoSuite`]. [`DefaultSuite`](default_suite::DefaultSuite) is
//! what deployed clients speak: secp256k1 ECDSA, X25519 and ChaCha20.

use thiserror::Error;

use crate::field::Fp;

pub mod default_suite;

pub use self::default_suite::DefaultSuite;

/// Set of primitives the coordinator relies on
pub trait CryptoSuite: 'static {
    type Signature: SignatureScheme;
    type KeyExchange: KeyExchangeScheme;
}

/// Signature scheme of long-term peer identities
pub trait SignatureScheme {
    /// Checks that the bytes are a well-formed public key
    fn validate_public_key(public_key: &[u8]) -> Result<(), InvalidKey>;

    /// Verifies `signature` of `payload` under `public_key`
    fn verify(public_key: &[u8], payload: &[u8], signature: &[u8])
        -> Result<(), InvalidSignature>;
}

/// Non-interactive key exchange used to derive pairwise DC-net pads
pub trait KeyExchangeScheme {
    type Keystream: Keystream;

    /// Checks that the bytes are a well-formed public key
    fn validate_public_key(public_key: &[u8]) -> Result<(), InvalidKey>;

    /// Derives public key corresponding to the secret
    fn public_key(secret_key: &[u8]) -> Result<Vec<u8>, InvalidKey>;

    /// Checks that `secret_key` corresponds to `public_key`
    fn validate_keypair(secret_key: &[u8], public_key: &[u8]) -> bool {
        matches!(Self::public_key(secret_key), Ok(pk) if pk == public_key)
    }

    /// Derives keystream shared between owner of `secret_key` and owner of `public_key`
    fn shared_keystream(secret_key: &[u8], public_key: &[u8])
        -> Result<Self::Keystream, InvalidKey>;
}

/// Pad generator seeded by a pairwise shared secret
///
/// Both parties of a pair construct identical keystreams. The first block is reserved for the
/// exponential pad, further blocks are consumed by slots of the simple DC-net vector.
pub trait Keystream {
    /// Pad used to mask the exponential DC-net vector. Constant for the keystream.
    fn field_element(&self) -> Fp;

    /// Takes next `len` bytes of pad for the simple DC-net vector
    fn bytes(&mut self, len: usize) -> Vec<u8>;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("signature is invalid")]
pub struct InvalidSignature;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("key is invalid")]
pub struct InvalidKey;
