//! DC-net vectors
//!
//! Two kinds of vectors are exchanged in a run:
//! * exponential vector: slot `i` carries `Σ_j h(m_j)^(i+1)` masked by pairwise field pads,
//!   so that combining vectors of all peers cancels the pads and reveals power sums of all
//!   message hashes
//! * simple vector: each message is placed in the slot given by the rank of its hash among
//!   solved roots and XOR-masked by pairwise keystreams, so that XOR of all vectors reveals
//!   messages in the clear

use crate::crypto::Keystream;
use crate::field::Fp;
use crate::messages::PeerId;

/// Size of a message slot in the simple DC-net vector
pub const SLOT_SIZE: usize = 20;

const EMPTY_SLOT: [u8; SLOT_SIZE] = [0; SLOT_SIZE];

/// Adds up exponential vectors slot-wise
///
/// Output has the length of the first vector, but only the first `total` slots of every vector
/// take part in the sum.
pub fn combine<'v>(vectors: impl IntoIterator<Item = &'v [Fp]>, total: usize) -> Vec<Fp> {
    let mut vectors = vectors.into_iter();
    let mut combined = match vectors.next() {
        Some(first) => first.to_vec(),
        None => return vec![],
    };
    for vector in vectors {
        for (acc, x) in combined.iter_mut().zip(vector).take(total) {
            *acc += *x;
        }
    }
    combined
}

/// XORs simple vectors slot-wise and drops empty slots
pub fn resolve<'v>(vectors: impl IntoIterator<Item = &'v [Vec<u8>]>, total: usize) -> Vec<Vec<u8>> {
    let mut vectors = vectors.into_iter();
    let mut slots = match vectors.next() {
        Some(first) => first.to_vec(),
        None => return vec![],
    };
    for vector in vectors {
        for (slot, other) in slots.iter_mut().zip(vector).take(total) {
            xor_into(slot, other);
        }
    }
    remove_empty_slots(slots)
}

/// Removes slots consisting of [`SLOT_SIZE`] zero bytes
pub fn remove_empty_slots(slots: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    slots
        .into_iter()
        .filter(|slot| slot.as_slice() != EMPTY_SLOT)
        .collect()
}

/// Builds exponential vector of a peer
///
/// `pads` lists pairwise pads with every other peer of the run. A pad is subtracted if the peer's
/// id is smaller than the other's id and added otherwise, so pads of each pair cancel out.
pub fn exponential_vector(
    my_id: PeerId,
    hashes: &[Fp],
    pads: impl IntoIterator<Item = (PeerId, Fp)>,
    total: usize,
) -> Vec<Fp> {
    let mut vector = crate::solver::power_sums(hashes, total);
    for (peer_id, pad) in pads {
        let pad = if my_id < peer_id { -pad } else { pad };
        for slot in vector.iter_mut() {
            *slot += pad;
        }
    }
    vector
}

/// XORs every slot with pairwise keystreams
///
/// Keystreams are consumed one slot at a time, in slot order. Since XOR is an involution, the
/// same routine masks and unmasks a simple vector.
pub fn apply_keystreams<K: Keystream>(slots: &mut [Vec<u8>], keystreams: &mut [K]) {
    for keystream in keystreams {
        for slot in slots.iter_mut() {
            let pad = keystream.bytes(SLOT_SIZE);
            xor_into(slot, &pad);
        }
    }
}

fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

/// Pads a message with zeroes up to [`SLOT_SIZE`]
///
/// Returns `None` if the message doesn't fit into a slot.
pub fn to_slot(message: &[u8]) -> Option<Vec<u8>> {
    if message.len() > SLOT_SIZE {
        return None;
    }
    let mut slot = message.to_vec();
    slot.resize(SLOT_SIZE, 0);
    Some(slot)
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1 64-bit hash
fn fnv1_64(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        hash.wrapping_mul(FNV_PRIME) ^ u64::from(*byte)
    })
}

/// Short hash of a message as a field element: FNV-1 of the base58 encoding
pub fn message_hash(message: &[u8]) -> Fp {
    let encoded = bs58::encode(message).into_string();
    Fp::from_u64(fnv1_64(encoded.as_bytes()))
}

/// Checks that `subset` is contained in `superset` as a multiset
pub fn is_subset(subset: &[Fp], superset: &[Fp]) -> bool {
    let mut rest = superset.to_vec();
    subset.iter().all(|x| match rest.iter().position(|y| y == x) {
        Some(i) => {
            rest.swap_remove(i);
            true
        }
        None => false,
    })
}

/// Checks that every message is present in `all`
pub fn contains_all(messages: &[Vec<u8>], all: &[Vec<u8>]) -> bool {
    messages.iter().all(|m| all.contains(m))
}
