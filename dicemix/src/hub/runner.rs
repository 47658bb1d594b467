use std::iter;
use std::time::Duration;

use rand::RngCore;
use rand_chacha::ChaCha20Rng;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::crypto::{CryptoSuite, DefaultSuite};
use crate::messages::PeerId;

use super::{Effect, Hub, HubError, RoundTimeout};

enum HubEvent {
    Register {
        reply: oneshot::Sender<(PeerId, mpsc::Receiver<Vec<u8>>)>,
    },
    Unregister(PeerId),
    Request(Vec<u8>),
    Timeout(RoundTimeout),
    Postponed(Vec<Effect>),
}

/// Executes [`Hub`] within tokio runtime
///
/// Events submitted through [`HubHandle`] are processed one at a time: the hub handles an
/// event, then the effects it produced are carried out before the next event is taken. Run
/// broadcasts are held back by the [broadcast delay](crate::HubConfig::set_broadcast_delay)
/// without blocking the runner, so runs don't wait for each other. Runner stops once every
/// handle is dropped.
pub struct HubRunner<C = DefaultSuite, R = ChaCha20Rng> {
    hub: Hub<C, R>,
    events: mpsc::Receiver<HubEvent>,
    delayed: mpsc::WeakSender<HubEvent>,
}

/// Cloneable handle submitting events to [`HubRunner`]
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
}

impl<C, R> HubRunner<C, R>
where
    C: CryptoSuite,
    R: RngCore,
{
    pub fn new(hub: Hub<C, R>) -> (Self, HubHandle) {
        let (sender, events) = mpsc::channel(hub.config().event_queue_capacity());
        let runner = Self {
            hub,
            events,
            delayed: sender.downgrade(),
        };
        (runner, HubHandle { events: sender })
    }

    /// Processes events until every [`HubHandle`] is dropped
    pub async fn run(mut self) -> Hub<C, R> {
        while let Some(event) = self.events.recv().await {
            match event {
                HubEvent::Register { reply } => {
                    let (id, outgoing) = self.hub.register();
                    if reply.send((id, outgoing)).is_err() {
                        debug!(peer = id, "connection closed before registration completed");
                        self.hub.disconnect(id);
                    }
                }
                HubEvent::Unregister(id) => self.hub.unregister(id),
                HubEvent::Request(frame) => self.hub.handle_frame(&frame),
                HubEvent::Timeout(timeout) => self.hub.handle_timeout(timeout),
                HubEvent::Postponed(effects) => self.carry_out(effects, true),
            }
            self.flush();
        }
        debug!("all handles dropped, hub stopped");
        self.hub
    }

    fn flush(&mut self) {
        let effects = self.hub.take_effects();
        self.carry_out(effects, false);
    }

    /// Carries out effects in order
    ///
    /// A run broadcast, along with every effect queued after it, is postponed by the broadcast
    /// delay unless `delay_elapsed` is set. Other runs keep going meanwhile.
    fn carry_out(&mut self, effects: Vec<Effect>, mut delay_elapsed: bool) {
        let delay = self.hub.config().broadcast_delay();
        let mut effects = effects.into_iter();
        while let Some(effect) = effects.next() {
            let is_broadcast =
                matches!(&effect, Effect::Send { code, .. } if code.is_broadcast());
            if is_broadcast && !delay_elapsed && !delay.is_zero() {
                let postponed = iter::once(effect).chain(effects).collect();
                self.schedule(delay, HubEvent::Postponed(postponed));
                return;
            }
            match effect {
                Effect::Send {
                    code,
                    recipients,
                    frame,
                } => {
                    trace!(?code, recipients = recipients.len(), "sending");
                    self.hub.deliver(&recipients, &frame);
                    delay_elapsed = false;
                }
                Effect::Disconnect(id) => self.hub.disconnect(id),
                Effect::ScheduleTimeout(timeout) => {
                    let wait = self.hub.config().response_wait();
                    self.schedule(wait, HubEvent::Timeout(timeout));
                }
            }
        }
    }

    /// Feeds the event back to the runner once `wait` elapses
    fn schedule(&self, wait: Duration, event: HubEvent) {
        let events = self.delayed.clone();
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(events) = events.upgrade() {
                let _ = events.send(event).await;
            }
        });
    }
}

impl HubHandle {
    /// Registers a new connection
    ///
    /// Returns id assigned to the peer and the queue of frames to be sent to it. Queue is closed
    /// once the hub drops the connection.
    pub async fn register(&self) -> Result<(PeerId, mpsc::Receiver<Vec<u8>>), HubError> {
        let (reply, registered) = oneshot::channel();
        self.events
            .send(HubEvent::Register { reply })
            .await
            .map_err(|_| HubError::Stopped)?;
        registered.await.map_err(|_| HubError::Stopped)
    }

    pub async fn unregister(&self, id: PeerId) -> Result<(), HubError> {
        self.events
            .send(HubEvent::Unregister(id))
            .await
            .map_err(|_| HubError::Stopped)
    }

    /// Submits a frame received from a peer
    pub async fn submit(&self, frame: Vec<u8>) -> Result<(), HubError> {
        self.events
            .send(HubEvent::Request(frame))
            .await
            .map_err(|_| HubError::Stopped)
    }
}
