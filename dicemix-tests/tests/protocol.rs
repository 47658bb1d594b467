use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use dicemix::messages::{PeerId, RequestCode, ResponseCode};
use dicemix::session::RunState;
use dicemix::simulation::{Behaviour, SimulatedPeer, Simulation};
use dicemix::{Hub, HubConfig};

fn simulation(config: HubConfig) -> Simulation {
    Simulation::new(Hub::new(config, ChaCha20Rng::seed_from_u64(42)))
}

fn connect_all(simulation: &mut Simulation, peers: Vec<SimulatedPeer>) -> Vec<PeerId> {
    peers.into_iter().map(|p| simulation.connect(p)).collect()
}

fn assert_published(simulation: &Simulation, winners: &[PeerId], losers: &[PeerId]) {
    let expected: usize = winners
        .iter()
        .map(|id| simulation.peer(*id).unwrap().messages().len())
        .sum();
    for id in winners {
        let peer = simulation.peer(*id).unwrap();
        assert!(peer.is_finished(), "peer {id} didn't finish");
        assert_eq!(peer.published().len(), expected);
        for winner in winners {
            for message in simulation.peer(*winner).unwrap().messages() {
                assert!(peer.published().contains(message));
            }
        }
    }
    for id in losers {
        assert!(!simulation.peer(*id).unwrap().is_finished());
        assert!(!simulation.hub().is_connected(*id));
    }
}

#[test]
fn honest_peers_publish_their_messages() {
    let mut simulation = simulation(HubConfig::default());
    let ids = connect_all(
        &mut simulation,
        vec![
            SimulatedPeer::new(["alice"], 1).unwrap(),
            SimulatedPeer::new(["bob"], 2).unwrap(),
            SimulatedPeer::new(["carol"], 3).unwrap(),
        ],
    );
    simulation.run_until_idle();

    assert_published(&simulation, &ids, &[]);
    assert_eq!(simulation.hub().runs().count(), 0);
    for id in &ids {
        assert!(!simulation.hub().is_connected(*id));
    }
}

#[test]
fn peers_may_publish_several_messages() {
    let mut simulation = simulation(HubConfig::default());
    let ids = connect_all(
        &mut simulation,
        vec![
            SimulatedPeer::new(["first", "second"], 1).unwrap(),
            SimulatedPeer::new(["third"], 2).unwrap(),
            SimulatedPeer::new(["fourth", "fifth", "sixth"], 3).unwrap(),
        ],
    );
    simulation.run_until_idle();
    assert_published(&simulation, &ids, &[]);
}

#[test]
fn run_starts_only_with_enough_peers() {
    let mut config = HubConfig::default();
    config.set_min_peers(4);
    let mut simulation = simulation(config);

    let mut ids = connect_all(
        &mut simulation,
        (0..3)
            .map(|i| SimulatedPeer::new([format!("message {i}")], i).unwrap())
            .collect(),
    );
    simulation.run_until_idle();
    assert_eq!(simulation.hub().runs().count(), 0);
    assert_eq!(simulation.hub().waiting_peers(), ids);

    ids.push(simulation.connect(SimulatedPeer::new(["late"], 3).unwrap()));
    simulation.run_until_idle();
    assert_published(&simulation, &ids, &[]);
    assert!(simulation.hub().waiting_peers().is_empty());
}

#[test]
fn peer_writing_into_foreign_slot_is_excluded() {
    let mut simulation = simulation(HubConfig::default());
    let ids = connect_all(
        &mut simulation,
        vec![
            SimulatedPeer::new(["alice"], 1).unwrap(),
            SimulatedPeer::new(["mallory"], 2).unwrap().with_behaviour(Behaviour::ExtraSlot),
            SimulatedPeer::new(["carol"], 3).unwrap(),
        ],
    );
    simulation.run_until_idle();

    assert_published(&simulation, &[ids[0], ids[2]], &[ids[1]]);
    assert_eq!(simulation.hub().runs().count(), 0);
}

#[test]
fn blamed_peer_is_excluded_and_run_restarts() {
    let mut simulation = simulation(HubConfig::default());
    let ids = connect_all(
        &mut simulation,
        vec![
            SimulatedPeer::new(["alice"], 1).unwrap(),
            SimulatedPeer::new(["mallory"], 2).unwrap().with_behaviour(Behaviour::ExtraSlot),
            SimulatedPeer::new(["carol"], 3).unwrap(),
        ],
    );

    let state = |simulation: &Simulation| simulation.hub().runs().next().map(|r| r.state());
    while state(&simulation) != Some(RunState::Confirmation) {
        assert!(simulation.step(), "run never reached confirmation");
    }
    assert_eq!(simulation.hub().runs().next().unwrap().run_number(), 0);

    // unconfirmed messages make the hub ask for secrets
    assert!(simulation.step());
    let run = simulation.hub().runs().next().unwrap();
    assert_eq!(run.state(), RunState::Blame);
    assert_eq!(run.run_number(), 1);
    assert_eq!(run.peer_ids(), ids);

    assert!(simulation.step());
    assert_eq!(simulation.sent().last(), Some(&(ResponseCode::KeskRequest, ids.clone())));
    // keys for the next run were announced with simple vectors, so peers go straight to the
    // exponential round
    let run = simulation.hub().runs().next().unwrap();
    assert_eq!(run.state(), RunState::DcExponential);
    assert_eq!(run.run_number(), 1);
    assert_eq!(run.peer_ids(), vec![ids[0], ids[2]]);

    assert!(simulation.step());
    assert_eq!(
        simulation.sent().last(),
        Some(&(ResponseCode::KeyExchange, vec![ids[0], ids[2]]))
    );
    assert!(!simulation.hub().is_connected(ids[1]));

    simulation.run_until_idle();
    assert_published(&simulation, &[ids[0], ids[2]], &[ids[1]]);
}

#[test]
fn peers_revealing_wrong_secret_are_excluded() {
    let mut config = HubConfig::default();
    config.set_min_peers(4);
    let mut simulation = simulation(config);
    let ids = connect_all(
        &mut simulation,
        vec![
            SimulatedPeer::new(["alice"], 1).unwrap(),
            SimulatedPeer::new(["mallory"], 2).unwrap().with_behaviour(Behaviour::ExtraSlot),
            SimulatedPeer::new(["oscar"], 3).unwrap().with_behaviour(Behaviour::WrongSecret),
            SimulatedPeer::new(["dave"], 4).unwrap(),
        ],
    );
    simulation.run_until_idle();

    assert_published(&simulation, &[ids[0], ids[3]], &[ids[1], ids[2]]);
}

#[test]
fn colliding_messages_tear_down_the_run() {
    let mut simulation = simulation(HubConfig::default());
    let ids = connect_all(
        &mut simulation,
        vec![
            SimulatedPeer::new(["same"], 1).unwrap(),
            SimulatedPeer::new(["same"], 2).unwrap(),
            SimulatedPeer::new(["other"], 3).unwrap(),
        ],
    );
    simulation.run_until_idle();

    // colliders are both excluded, a single peer can't continue
    assert_eq!(simulation.hub().runs().count(), 0);
    for id in &ids {
        assert!(!simulation.peer(*id).unwrap().is_finished());
        assert!(!simulation.hub().is_connected(*id));
    }
    let published = simulation.peer(ids[2]).unwrap().published();
    assert_eq!(published, simulation.peer(ids[2]).unwrap().messages());
}

#[test]
fn straggler_in_exponential_round_restarts_the_run() {
    let mut simulation = simulation(HubConfig::default());
    let ids = connect_all(
        &mut simulation,
        vec![
            SimulatedPeer::new(["alice"], 1).unwrap(),
            SimulatedPeer::new(["bob"], 2).unwrap(),
            SimulatedPeer::new(["carol"], 3).unwrap()
                .with_behaviour(Behaviour::SilentFrom(RequestCode::ExpDcVector)),
        ],
    );
    simulation.run_until_idle();

    let run = simulation.hub().runs().next().unwrap();
    assert_eq!(run.state(), RunState::DcExponential);
    assert_eq!(run.run_number(), 0);
    let submitted: Vec<_> = run
        .peers()
        .iter()
        .map(|p| (p.id(), p.has_submitted()))
        .collect();
    assert_eq!(
        submitted,
        vec![(ids[0], true), (ids[1], true), (ids[2], false)]
    );

    simulation.expire_timeouts();
    assert_published(&simulation, &ids[..2], &ids[2..]);
}

#[test]
fn straggler_in_key_exchange_is_dropped() {
    let mut simulation = simulation(HubConfig::default());
    let ids = connect_all(
        &mut simulation,
        vec![
            SimulatedPeer::new(["alice"], 1).unwrap()
                .with_behaviour(Behaviour::SilentFrom(RequestCode::KeyExchange)),
            SimulatedPeer::new(["bob"], 2).unwrap(),
            SimulatedPeer::new(["carol"], 3).unwrap(),
        ],
    );
    simulation.run_until_idle();
    let run = simulation.hub().runs().next().unwrap();
    assert_eq!(run.state(), RunState::KeyExchange);

    simulation.expire_timeouts();
    assert_published(&simulation, &ids[1..], &ids[..1]);
}

#[test]
fn run_is_torn_down_when_too_few_peers_remain() {
    let mut simulation = simulation(HubConfig::default());
    let ids = connect_all(
        &mut simulation,
        vec![
            SimulatedPeer::new(["alice"], 1).unwrap(),
            SimulatedPeer::new(["bob"], 2).unwrap()
                .with_behaviour(Behaviour::SilentFrom(RequestCode::TxConfirmation)),
            SimulatedPeer::new(["carol"], 3).unwrap()
                .with_behaviour(Behaviour::SilentFrom(RequestCode::TxConfirmation)),
        ],
    );
    simulation.run_until_idle();
    assert_eq!(
        simulation.hub().runs().next().unwrap().state(),
        RunState::Confirmation
    );

    simulation.expire_timeouts();
    assert_eq!(simulation.hub().runs().count(), 0);
    for id in &ids {
        assert!(!simulation.peer(*id).unwrap().is_finished());
        assert!(!simulation.hub().is_connected(*id));
    }
}
