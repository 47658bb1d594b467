use never::Never;
use x25519_dalek::{PublicKey, StaticSecret};

use super::chacha::ChaChaKeystream;
use crate::crypto::{InvalidKey, KeyExchangeScheme};

/// Diffie-Hellman over Curve25519
pub struct X25519 {
    _cannot_be_constructed: Never,
}

impl KeyExchangeScheme for X25519 {
    type Keystream = ChaChaKeystream;

    fn validate_public_key(public_key: &[u8]) -> Result<(), InvalidKey> {
        key_bytes(public_key).map(|_| ())
    }

    fn public_key(secret_key: &[u8]) -> Result<Vec<u8>, InvalidKey> {
        let secret = StaticSecret::from(key_bytes(secret_key)?);
        Ok(PublicKey::from(&secret).as_bytes().to_vec())
    }

    fn shared_keystream(
        secret_key: &[u8],
        public_key: &[u8],
    ) -> Result<Self::Keystream, InvalidKey> {
        let secret = StaticSecret::from(key_bytes(secret_key)?);
        let public = PublicKey::from(key_bytes(public_key)?);
        let shared_secret = secret.diffie_hellman(&public);
        Ok(ChaChaKeystream::new(shared_secret.to_bytes()))
    }
}

fn key_bytes(bytes: &[u8]) -> Result<[u8; 32], InvalidKey> {
    <[u8; 32]>::try_from(bytes).or(Err(InvalidKey))
}
