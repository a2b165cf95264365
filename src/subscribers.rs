use crate::types::PositionUpdate;

pub trait PositionObserver: Send + Sync {
    fn on_position_update(&self, update: &PositionUpdate);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Observer list shared by the service façade and the receiver worker.
///
/// Only weak references are held: an observer that has been dropped by its owner simply
/// stops receiving updates and is pruned on the next delivery.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: std::sync::atomic::AtomicU64,
    observers: std::sync::RwLock<Vec<(SubscriptionHandle, std::sync::Weak<dyn PositionObserver>)>>,
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Self {
        SubscriberRegistry::default()
    }

    pub fn subscribe<O>(&self, observer: &std::sync::Arc<O>) -> SubscriptionHandle
    where
        O: PositionObserver + 'static,
    {
        let handle = SubscriptionHandle(
            self.next_id
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed),
        );
        let weak = std::sync::Arc::downgrade(observer);
        let weak: std::sync::Weak<dyn PositionObserver> = weak;
        self.write().push((handle, weak));
        handle
    }

    /// Returns `false` if the handle was not registered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut observers = self.write();
        let before = observers.len();
        observers.retain(|(registered, _)| *registered != handle);
        observers.len() != before
    }

    /// Calls every live observer in turn on the calling thread.
    ///
    /// The lock is released before any observer runs, so observers may subscribe or
    /// unsubscribe from inside the callback.
    pub fn notify(&self, update: &PositionUpdate) {
        let (live, has_dead) = {
            let observers = self
                .observers
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let live: Vec<std::sync::Arc<dyn PositionObserver>> = observers
                .iter()
                .filter_map(|(_, weak)| weak.upgrade())
                .collect();
            let has_dead = live.len() != observers.len();
            (live, has_dead)
        };

        if has_dead {
            self.write().retain(|(_, weak)| weak.strong_count() > 0);
        }

        for observer in live {
            observer.on_position_update(update);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, Vec<(SubscriptionHandle, std::sync::Weak<dyn PositionObserver>)>>
    {
        self.observers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Forwards each update into a channel, e.g. towards a UI thread.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: crossbeam_channel::Sender<PositionUpdate>,
}

impl ChannelObserver {
    #[must_use]
    pub fn new(sender: crossbeam_channel::Sender<PositionUpdate>) -> Self {
        ChannelObserver { sender }
    }
}

impl PositionObserver for ChannelObserver {
    fn on_position_update(&self, update: &PositionUpdate) {
        if let Err(err) = self.sender.send(update.clone()) {
            log::debug!("ChannelObserver: Receiver gone, dropping update: {err}");
        }
    }
}
