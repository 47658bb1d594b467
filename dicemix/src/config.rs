use std::time::Duration;

use crate::serialization_backend::DEFAULT_SIZE_LIMIT;

/// Coordinator parameters
///
/// Defaults match what deployed clients expect: runs start with 3 peers, each round waits
/// 5 seconds for stragglers, and broadcasts are delayed by 1 second.
#[derive(Debug, Clone)]
pub struct HubConfig {
    min_peers: usize,
    min_active_peers: usize,
    response_wait: Duration,
    broadcast_delay: Duration,
    max_total_messages: u32,
    outgoing_queue_capacity: usize,
    event_queue_capacity: usize,
    message_size_limit: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            min_peers: 3,
            min_active_peers: 2,
            response_wait: Duration::from_secs(5),
            broadcast_delay: Duration::from_secs(1),
            max_total_messages: 256,
            outgoing_queue_capacity: 256,
            event_queue_capacity: 1024,
            message_size_limit: DEFAULT_SIZE_LIMIT,
        }
    }
}

impl HubConfig {
    /// Number of peers with announced long-term keys required to start a run
    ///
    /// Default value is 3.
    ///
    /// ## Panics
    /// Panics if `n < 2`
    pub fn set_min_peers(&mut self, n: usize) {
        assert!(n >= 2, "run needs at least two peers");
        self.min_peers = n;
    }

    /// A run is torn down once fewer peers than that remain in it
    ///
    /// Default value is 2.
    pub fn set_min_active_peers(&mut self, n: usize) {
        self.min_active_peers = n;
    }

    /// How long a round waits for submissions after broadcast
    ///
    /// Once it elapses, peers who didn't submit are excluded. Default value is 5 seconds.
    pub fn set_response_wait(&mut self, wait: Duration) {
        self.response_wait = wait;
    }

    /// Pause before every broadcast, gives peers time to get ready for the next round
    ///
    /// Default value is 1 second.
    pub fn set_broadcast_delay(&mut self, delay: Duration) {
        self.broadcast_delay = delay;
    }

    /// Upper bound on sum of messages announced by peers of a run
    ///
    /// Key exchange that makes the sum exceed this bound is rejected. Default value is 256.
    pub fn set_max_total_messages(&mut self, n: u32) {
        self.max_total_messages = n;
    }

    /// Capacity of a per-connection outgoing queue
    ///
    /// A peer whose queue is full at the time of broadcast gets disconnected. Default value is 256.
    pub fn set_outgoing_queue_capacity(&mut self, capacity: usize) {
        self.outgoing_queue_capacity = capacity.max(1);
    }

    /// Capacity of the coordinator event queue. Default value is 1024.
    pub fn set_event_queue_capacity(&mut self, capacity: usize) {
        self.event_queue_capacity = capacity.max(1);
    }

    /// Limits size of an encoded request. Default value is 16 MiB.
    pub fn set_message_size_limit(&mut self, limit: u64) {
        self.message_size_limit = limit;
    }

    pub fn min_peers(&self) -> usize {
        self.min_peers
    }
    pub fn min_active_peers(&self) -> usize {
        self.min_active_peers
    }
    pub fn response_wait(&self) -> Duration {
        self.response_wait
    }
    pub fn broadcast_delay(&self) -> Duration {
        self.broadcast_delay
    }
    pub fn max_total_messages(&self) -> u32 {
        self.max_total_messages
    }
    pub fn outgoing_queue_capacity(&self) -> usize {
        self.outgoing_queue_capacity
    }
    pub fn event_queue_capacity(&self) -> usize {
        self.event_queue_capacity
    }
    pub fn message_size_limit(&self) -> u64 {
        self.message_size_limit
    }
}
