use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use dicemix::simulation::SimulatedPeer;
use dicemix_server::dev::TestServer;

async fn drive(address: String, mut peer: SimulatedPeer) -> SimulatedPeer {
    let (mut websocket, _) = connect_async(address).await.unwrap();
    while let Some(message) = websocket.next().await {
        let frame = match message.unwrap() {
            Message::Binary(frame) => frame,
            Message::Close(_) => break,
            _ => continue,
        };
        if let Some(reply) = peer.handle(&frame).unwrap() {
            websocket.send(Message::Binary(reply)).await.unwrap();
        }
        if peer.is_finished() {
            break;
        }
    }
    peer
}

#[tokio::test(flavor = "multi_thread")]
async fn three_peers_complete_session() {
    let server = TestServer::launch().await.unwrap();

    let tasks: Vec<_> = ["alice", "bob", "carol"]
        .into_iter()
        .enumerate()
        .map(|(i, message)| {
            let peer = SimulatedPeer::new([message], i as u64).unwrap();
            tokio::spawn(drive(server.address(), peer))
        })
        .collect();

    for task in tasks {
        let peer = tokio::time::timeout(Duration::from_secs(30), task)
            .await
            .unwrap()
            .unwrap();
        assert!(peer.is_finished());
        assert_eq!(peer.published().len(), 3);
        assert!(peer.published().contains(&peer.messages()[0]));
    }
}

#[tokio::test]
async fn upgrade_at_wrong_path_is_rejected() {
    let server = TestServer::launch().await.unwrap();
    let address = format!("ws://{}/not-here", server.local_addr());
    match connect_async(address).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 404),
        Err(err) => panic!("unexpected error: {err}"),
        Ok(_) => panic!("upgrade must be rejected"),
    }
}

#[tokio::test]
async fn lonely_peer_waits_in_waiting_room() {
    let server = TestServer::launch().await.unwrap();
    let mut peer = SimulatedPeer::new([b"lonely"], 7).unwrap();
    let (mut websocket, _) = connect_async(server.address()).await.unwrap();

    let frame = match websocket.next().await.unwrap().unwrap() {
        Message::Binary(frame) => frame,
        message => panic!("unexpected message: {message:?}"),
    };
    let reply = peer.handle(&frame).unwrap().unwrap();
    assert_ne!(peer.id(), 0);
    websocket.send(Message::Binary(reply)).await.unwrap();

    let next = tokio::time::timeout(Duration::from_millis(500), websocket.next()).await;
    assert!(next.is_err(), "nothing is sent until enough peers join");
}
