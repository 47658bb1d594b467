use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::crypto::Keystream;
use crate::field::Fp;

const BLOCK_SIZE: usize = 64;

/// ChaCha20 keystream with zero nonce keyed by a 32 bytes shared secret
///
/// Block 0 provides the exponential pad (first 8 bytes, little-endian). Each call to
/// [`bytes`](Keystream::bytes) consumes whole blocks, discarding what's not returned.
pub struct ChaChaKeystream {
    stream: ChaCha20Rng,
    exp_pad: u64,
}

impl ChaChaKeystream {
    pub fn new(seed: [u8; 32]) -> Self {
        let mut stream = ChaCha20Rng::from_seed(seed);
        let mut block = [0u8; BLOCK_SIZE];
        stream.fill_bytes(&mut block);
        let mut pad = [0u8; 8];
        pad.copy_from_slice(&block[..8]);
        Self {
            stream,
            exp_pad: u64::from_le_bytes(pad),
        }
    }
}

impl Keystream for ChaChaKeystream {
    fn field_element(&self) -> Fp {
        Fp::from_u64(self.exp_pad)
    }

    fn bytes(&mut self, len: usize) -> Vec<u8> {
        let blocks = (len + BLOCK_SIZE - 1) / BLOCK_SIZE;
        let mut out = vec![0u8; blocks.max(1) * BLOCK_SIZE];
        self.stream.fill_bytes(&mut out);
        out.truncate(len);
        out
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::ChaChaKeystream;
    use crate::crypto::Keystream;
    use crate::field::Fp;

    #[test]
    fn exponential_pad_matches_chacha20_test_vectors() {
        let cases = [
            ([0u8; 32], hex!("76b8e0ada0f13d90")),
            (
                hex!("0000000000000000000000000000000000000000000000000000000000000001"),
                hex!("4540f05a9f1fb296"),
            ),
            (
                hex!("0100000000000000000000000000000000000000000000000000000000000000"),
                hex!("c5d30a7ce1ec1193"),
            ),
        ];
        for (seed, pad) in cases {
            let keystream = ChaChaKeystream::new(seed);
            assert_eq!(
                keystream.field_element(),
                Fp::from_u64(u64::from_le_bytes(pad))
            );
        }
    }

    #[test]
    fn every_call_takes_a_fresh_block() {
        let mut keystream = ChaChaKeystream::new([0u8; 32]);
        // ChaCha20 block 1 of all-zero key and nonce
        assert_eq!(
            keystream.bytes(20),
            hex!("9f07e7be5551387a98ba977c732d080dcb0f29a0")
        );
        // remaining 44 bytes of block 1 are skipped
        let second = keystream.bytes(20);
        assert_ne!(second, hex!("48e3656912c6533e32ee7aed29b721769ce64e43"));
        assert_eq!(second.len(), 20);
    }

    #[test]
    fn exponential_pad_is_constant() {
        let mut keystream = ChaChaKeystream::new([9u8; 32]);
        let pad = keystream.field_element();
        let _ = keystream.bytes(20);
        assert_eq!(keystream.field_element(), pad);
    }
}
