/// An item popped from the queue. `Shutdown` is enqueued exactly once, behind every
/// message pushed before shutdown began.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum QueueItem {
    Message(Vec<u8>),
    Shutdown,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, serde::Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Never applies backpressure and never drops.
    #[default]
    Unbounded,
    /// Holds at most `capacity` messages, evicting the oldest on overflow.
    DropOldest { capacity: usize },
}

/// FIFO of encoded datagrams between fix producers and the single sender worker.
///
/// `push` never blocks on the consumer. Producers serialize on a short internal lock so
/// that nothing can be ordered behind the shutdown sentinel.
pub struct OutboundQueue {
    sender: crossbeam_channel::Sender<QueueItem>,
    receiver: crossbeam_channel::Receiver<QueueItem>,
    capacity: Option<usize>,
    closed: std::sync::Mutex<bool>,
}

impl OutboundQueue {
    #[must_use]
    pub fn new(policy: QueuePolicy) -> Self {
        let capacity = match policy {
            QueuePolicy::Unbounded => None,
            QueuePolicy::DropOldest { capacity } => Some(capacity.max(1)),
        };
        // One slot beyond `capacity` is kept free for the shutdown sentinel.
        let (sender, receiver) = match capacity {
            None => crossbeam_channel::unbounded(),
            Some(capacity) => crossbeam_channel::bounded(capacity + 1),
        };
        OutboundQueue {
            sender,
            receiver,
            capacity,
            closed: std::sync::Mutex::new(false),
        }
    }

    /// Enqueues a message. Messages pushed after `shutdown` are discarded.
    pub fn push(&self, bytes: Vec<u8>) {
        let closed = self.lock_closed();
        if *closed {
            log::debug!("OutboundQueue: Dropping message pushed after shutdown");
            return;
        }
        self.evict_to_capacity();
        self.enqueue(QueueItem::Message(bytes));
    }

    /// Blocks until an item is available.
    pub fn pop(&self) -> QueueItem {
        // The queue owns a sender, so the channel cannot disconnect while `self` is alive.
        self.receiver.recv().unwrap_or(QueueItem::Shutdown)
    }

    pub fn pop_timeout(&self, timeout: std::time::Duration) -> Option<QueueItem> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Enqueues the shutdown sentinel. Repeated calls have no further effect.
    pub fn shutdown(&self) {
        let mut closed = self.lock_closed();
        if *closed {
            return;
        }
        *closed = true;
        log::info!("OutboundQueue: Shutdown requested with {} pending", self.len());
        self.enqueue(QueueItem::Shutdown);
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        *self.lock_closed()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    // Caller holds the `closed` lock, so no other producer can refill the freed slots.
    fn evict_to_capacity(&self) {
        let Some(capacity) = self.capacity else {
            return;
        };
        while self.receiver.len() >= capacity {
            match self.receiver.try_recv() {
                Ok(QueueItem::Message(evicted)) => log::warn!(
                    "OutboundQueue: Full, evicted oldest message ({} bytes)",
                    evicted.len()
                ),
                Ok(QueueItem::Shutdown) | Err(_) => return,
            }
        }
    }

    // Never evicts: `push` makes room first and the sentinel owns the spare slot.
    fn enqueue(&self, item: QueueItem) {
        if let Err(err) = self.sender.try_send(item) {
            log::error!("OutboundQueue: Failed to enqueue: {err}");
        }
    }

    fn lock_closed(&self) -> std::sync::MutexGuard<'_, bool> {
        self.closed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        OutboundQueue::new(QueuePolicy::Unbounded)
    }
}
