//! secp256k1 ECDSA identities, X25519 key exchange and ChaCha20 keystreams

use never::Never;

use super::CryptoSuite;

pub mod chacha;
pub mod ecdsa;
pub mod x25519;

pub struct DefaultSuite {
    _cannot_be_constructed: Never,
}

impl CryptoSuite for DefaultSuite {
    type Signature = ecdsa::Secp256k1Ecdsa;
    type KeyExchange = x25519::X25519;
}
