//! Identifies peers who disrupted a run
//!
//! Once peers reveal their key exchange secrets, the coordinator can recompute everything a peer
//! was supposed to send and compare it with what the peer actually sent. A peer is excluded if:
//! * revealed secret doesn't match its key exchange public key
//! * its simple vector, once unmasked, holds a number of messages other than announced
//! * its exponential vector doesn't encode hashes of those messages
//! * it reported a missing hash even though all of its hashes are among the solved roots
//! * it refused to confirm even though all of its messages were published
//! * one of its message hashes collides with a hash of another peer
//!
//! Peers who didn't reveal their secret are excluded by the caller.

use std::collections::{BTreeSet, HashSet};

use thiserror::Error;
use tracing::{debug, info};

use crate::crypto::{KeyExchangeScheme, Keystream};
use crate::dc;
use crate::field::Fp;
use crate::messages::PeerId;

use super::Peer;

/// Returns ids of peers who must be excluded from the next run
pub(crate) fn find_culprits<K: KeyExchangeScheme>(
    peers: &[Peer],
    published: &[Vec<u8>],
    roots: &[Fp],
) -> BTreeSet<PeerId> {
    let mut culprits = BTreeSet::new();
    let mut participants = vec![];

    for peer in peers.iter().filter(|p| p.received) {
        match examine::<K>(peer, peers, published, roots) {
            Ok(hashes) => participants.push(Participant {
                id: peer.id,
                hashes,
            }),
            Err(reason) => {
                info!(peer = peer.id, %reason, "peer is blamed");
                culprits.insert(peer.id);
            }
        }
    }

    for (a, b) in slot_collisions(&participants) {
        info!(peer_a = a, peer_b = b, "peers are blamed for slot collision");
        culprits.insert(a);
        culprits.insert(b);
    }

    culprits
}

/// Peer who passed individual checks, along with hashes of its messages
#[derive(Debug, Clone)]
pub(crate) struct Participant {
    pub id: PeerId,
    pub hashes: Vec<Fp>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum Misbehaviour {
    #[error("revealed secret key doesn't match public key")]
    InvalidKeypair,
    #[error("couldn't derive shared key with peer {with}")]
    KeyExchange { with: PeerId },
    #[error("announced {announced} messages, but sent {sent}")]
    MessageCount { announced: u32, sent: usize },
    #[error("exponential vector doesn't match messages")]
    ExponentialVector,
    #[error("reported missing hash, but all hashes are present")]
    FalseAlarm,
    #[error("messages were published, but peer didn't confirm")]
    MissingConfirmation,
}

/// Replays the run on behalf of `peer`, returns its message hashes if the peer behaved
fn examine<K: KeyExchangeScheme>(
    peer: &Peer,
    peers: &[Peer],
    published: &[Vec<u8>],
    roots: &[Fp],
) -> Result<Vec<Fp>, Misbehaviour> {
    if !K::validate_keypair(&peer.private_key, &peer.public_key) {
        return Err(Misbehaviour::InvalidKeypair);
    }

    let mut total = peer.num_msgs as usize;
    let mut keystreams = vec![];
    let mut pads = vec![];
    for other in peers.iter().filter(|p| p.id != peer.id) {
        let keystream = K::shared_keystream(&peer.private_key, &other.public_key)
            .map_err(|_| Misbehaviour::KeyExchange { with: other.id })?;
        pads.push((other.id, keystream.field_element()));
        keystreams.push(keystream);
        total += other.num_msgs as usize;
    }

    let mut slots = peer.dc_simple_vector.clone();
    dc::apply_keystreams(&mut slots, &mut keystreams);
    let messages = dc::remove_empty_slots(slots);
    if messages.len() != peer.num_msgs as usize {
        return Err(Misbehaviour::MessageCount {
            announced: peer.num_msgs,
            sent: messages.len(),
        });
    }

    let hashes: Vec<Fp> = messages.iter().map(|m| dc::message_hash(m)).collect();
    let expected = dc::exponential_vector(peer.id, &hashes, pads, total);
    if expected != peer.dc_exp_vector {
        return Err(Misbehaviour::ExponentialVector);
    }
    debug!(peer = peer.id, "exponential vector matches messages");

    if !peer.ok && dc::is_subset(&hashes, roots) {
        return Err(Misbehaviour::FalseAlarm);
    }
    if dc::contains_all(&messages, published) && !peer.confirmation {
        return Err(Misbehaviour::MissingConfirmation);
    }

    Ok(hashes)
}

/// Finds pairs of participants who share at least one message hash
pub(crate) fn slot_collisions(participants: &[Participant]) -> Vec<(PeerId, PeerId)> {
    let mut collisions = vec![];
    for (i, a) in participants.iter().enumerate() {
        let hashes: HashSet<Fp> = a.hashes.iter().copied().collect();
        for b in &participants[i + 1..] {
            if b.hashes.iter().any(|h| hashes.contains(h)) {
                collisions.push((a.id, b.id));
            }
        }
    }
    collisions
}
