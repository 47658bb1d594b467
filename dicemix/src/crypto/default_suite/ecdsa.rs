use never::Never;
use secp256k1::{ecdsa::Signature, Message, PublicKey, SECP256K1};
use sha2::{Digest, Sha256};

use crate::crypto::{InvalidKey, InvalidSignature, SignatureScheme};

/// ECDSA over secp256k1 with double SHA-256 message digest and DER-encoded signatures
pub struct Secp256k1Ecdsa {
    _cannot_be_constructed: Never,
}

/// Client-side operations, used by simulated peers
#[cfg(any(test, feature = "dev"))]
#[cfg_attr(docsrs, doc(cfg(feature = "dev")))]
impl Secp256k1Ecdsa {
    /// Signs `payload` with `secret_key`, returns DER-encoded signature
    pub fn sign(secret_key: &[u8], payload: &[u8]) -> Result<Vec<u8>, InvalidKey> {
        let secret_key = secp256k1::SecretKey::from_slice(secret_key).or(Err(InvalidKey))?;
        let message = hashed_message(payload).or(Err(InvalidKey))?;
        let signature = SECP256K1.sign_ecdsa(&message, &secret_key);
        Ok(signature.serialize_der().to_vec())
    }

    /// Derives compressed public key from the secret key
    pub fn public_key(secret_key: &[u8]) -> Result<Vec<u8>, InvalidKey> {
        let secret_key = secp256k1::SecretKey::from_slice(secret_key).or(Err(InvalidKey))?;
        Ok(PublicKey::from_secret_key(SECP256K1, &secret_key)
            .serialize()
            .to_vec())
    }
}

impl SignatureScheme for Secp256k1Ecdsa {
    fn validate_public_key(public_key: &[u8]) -> Result<(), InvalidKey> {
        PublicKey::from_slice(public_key)
            .map(|_| ())
            .or(Err(InvalidKey))
    }

    fn verify(
        public_key: &[u8],
        payload: &[u8],
        signature: &[u8],
    ) -> Result<(), InvalidSignature> {
        let public_key = PublicKey::from_slice(public_key).or(Err(InvalidSignature))?;
        let mut signature = Signature::from_der(signature).or(Err(InvalidSignature))?;
        // libsecp256k1 only accepts low-S signatures
        signature.normalize_s();
        let message = hashed_message(payload).or(Err(InvalidSignature))?;
        SECP256K1
            .verify_ecdsa(&message, &signature, &public_key)
            .or(Err(InvalidSignature))
    }
}

fn hashed_message(payload: &[u8]) -> Result<Message, secp256k1::Error> {
    let digest = Sha256::digest(Sha256::digest(payload));
    Message::from_slice(&digest)
}
