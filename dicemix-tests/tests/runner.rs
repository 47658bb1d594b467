use std::collections::HashSet;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tokio::time::Instant;

use dicemix::messages::RequestCode;
use dicemix::simulation::{Behaviour, SimulatedPeer};
use dicemix::{Hub, HubConfig, HubHandle, HubRunner};

async fn drive(hub: HubHandle, mut peer: SimulatedPeer) -> SimulatedPeer {
    let (_id, mut outgoing) = hub.register().await.unwrap();
    while let Some(frame) = outgoing.recv().await {
        if let Some(reply) = peer.handle(&frame).unwrap() {
            hub.submit(reply).await.unwrap();
        }
        if peer.is_finished() {
            break;
        }
    }
    peer
}

async fn run_session(config: HubConfig, peers: Vec<SimulatedPeer>) -> (Vec<SimulatedPeer>, Hub) {
    let hub: Hub = Hub::new(config, ChaCha20Rng::seed_from_u64(5));
    let (runner, handle) = HubRunner::new(hub);
    let runner = tokio::spawn(runner.run());

    let tasks: Vec<_> = peers
        .into_iter()
        .map(|peer| tokio::spawn(drive(handle.clone(), peer)))
        .collect();
    drop(handle);

    let mut finished = vec![];
    for task in tasks {
        finished.push(task.await.unwrap());
    }
    (finished, runner.await.unwrap())
}

#[tokio::test(start_paused = true)]
async fn session_completes_with_broadcast_delays() {
    let start = Instant::now();
    let (peers, hub) = run_session(
        HubConfig::default(),
        vec![
            SimulatedPeer::new(["alice"], 1).unwrap(),
            SimulatedPeer::new(["bob"], 2).unwrap(),
            SimulatedPeer::new(["carol"], 3).unwrap(),
        ],
    )
    .await;

    assert!(peers.iter().all(|p| p.is_finished()));
    assert!(peers.iter().all(|p| p.published().len() == 3));
    assert_eq!(hub.runs().count(), 0);
    // start, key exchange, exponential, simple, success
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert!(start.elapsed() < HubConfig::default().response_wait() * 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_sessions_do_not_wait_for_each_other() {
    let start = Instant::now();
    let peers = (0..12)
        .map(|i| SimulatedPeer::new([format!("message {i}")], i).unwrap())
        .collect();
    let (peers, hub) = run_session(HubConfig::default(), peers).await;

    assert!(peers.iter().all(|p| p.is_finished()));
    assert!(peers.iter().all(|p| p.published().len() == 3));
    let sessions: HashSet<_> = peers.iter().map(|p| p.session_id()).collect();
    assert_eq!(sessions.len(), 4);
    assert_eq!(hub.runs().count(), 0);
    // same bounds as for a single session
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert!(start.elapsed() < HubConfig::default().response_wait() * 2);
}

#[tokio::test(start_paused = true)]
async fn straggler_is_excluded_once_response_wait_elapses() {
    let mut config = HubConfig::default();
    config.set_broadcast_delay(Duration::ZERO);
    config.set_response_wait(Duration::from_secs(30));

    let start = Instant::now();
    let (peers, hub) = run_session(
        config,
        vec![
            SimulatedPeer::new(["alice"], 1).unwrap(),
            SimulatedPeer::new(["bob"], 2).unwrap()
                .with_behaviour(Behaviour::SilentFrom(RequestCode::SimpleDcVector)),
            SimulatedPeer::new(["carol"], 3).unwrap(),
        ],
    )
    .await;

    assert!(start.elapsed() >= Duration::from_secs(30));
    assert!(peers[0].is_finished());
    assert!(!peers[1].is_finished());
    assert!(peers[2].is_finished());
    assert_eq!(peers[0].published().len(), 2);
    assert_eq!(hub.runs().count(), 0);
}
