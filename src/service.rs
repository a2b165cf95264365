//! Service façade tying the codec, queue and workers to one UDP socket.
//!
//! Lifecycle is `Idle -> Running -> Stopped`. A stopped service cannot be restarted;
//! create a new one instead.
pub mod error;

pub use error::ServiceError;

use crate::codec::{self, DecodeMode, OutboundMessage};
use crate::config::{ApplicationConfig, ConfigurationSource, PeerAddressProvider};
use crate::error_sink::{ErrorSink, LogErrorSink};
use crate::outbound_queue::{OutboundQueue, QueuePolicy};
use crate::receiver::{DatagramReceiver, StateRequestHandler, StateRequestSlot};
use crate::sender::DatagramSender;
use crate::subscribers::{PositionObserver, SubscriberRegistry, SubscriptionHandle};
use crate::thread_manager::{TaskID, ThreadManager};
use crate::types::{Fix, LocalIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    /// Local bind address. Port 0 picks an ephemeral port.
    pub bind_address: std::net::SocketAddr,
    /// Used when the configured peer address carries no port.
    pub peer_port: u16,
    /// Upper bound on how long a stop request waits for the receiver.
    pub poll_interval: std::time::Duration,
    pub queue_policy: QueuePolicy,
    pub decode_mode: DecodeMode,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            bind_address: std::net::SocketAddr::from(([0, 0, 0, 0], 0)),
            peer_port: crate::config::DEFAULT_PEER_PORT,
            poll_interval: std::time::Duration::from_millis(200),
            queue_policy: QueuePolicy::Unbounded,
            decode_mode: DecodeMode::Strict,
        }
    }
}

impl From<&ApplicationConfig> for ServiceSettings {
    fn from(config: &ApplicationConfig) -> Self {
        ServiceSettings {
            peer_port: config.peer.port,
            poll_interval: std::time::Duration::from_millis(config.receiver.poll_interval_ms),
            queue_policy: config.queue,
            decode_mode: config.receiver.decode_mode(),
            ..ServiceSettings::default()
        }
    }
}

struct RunningService {
    identity: LocalIdentity,
    queue: std::sync::Arc<OutboundQueue>,
    threads: ThreadManager,
    sender_task: TaskID,
    receiver_task: TaskID,
    local_address: std::net::SocketAddr,
}

enum Lifecycle {
    Idle,
    Running(RunningService),
    Stopped,
}

pub struct SyncService {
    settings: ServiceSettings,
    lifecycle: std::sync::RwLock<Lifecycle>,
    subscribers: std::sync::Arc<SubscriberRegistry>,
    state_request_handler: std::sync::Arc<StateRequestSlot>,
    error_sink: std::sync::Arc<dyn ErrorSink>,
}

impl SyncService {
    #[must_use]
    pub fn new(settings: ServiceSettings) -> Self {
        SyncService::with_error_sink(settings, std::sync::Arc::new(LogErrorSink))
    }

    #[must_use]
    pub fn with_error_sink(
        settings: ServiceSettings,
        error_sink: std::sync::Arc<dyn ErrorSink>,
    ) -> Self {
        SyncService {
            settings,
            lifecycle: std::sync::RwLock::new(Lifecycle::Idle),
            subscribers: std::sync::Arc::new(SubscriberRegistry::new()),
            state_request_handler: std::sync::Arc::new(StateRequestSlot::default()),
            error_sink,
        }
    }

    /// Opens the socket, starts both workers and queues a `getall` request.
    ///
    /// # Errors
    ///
    /// `AlreadyStarted` unless the service is idle. `Socket` or `Spawn` if resources
    /// cannot be acquired; the service then stays idle.
    pub fn start(
        &self,
        identity: LocalIdentity,
        peer_address: std::sync::Arc<dyn PeerAddressProvider>,
    ) -> Result<(), ServiceError> {
        let mut lifecycle = self.write_lifecycle();
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return Err(ServiceError::AlreadyStarted);
        }

        let socket = std::net::UdpSocket::bind(self.settings.bind_address)
            .map_err(ServiceError::Socket)?;
        let poll_interval = self
            .settings
            .poll_interval
            .max(std::time::Duration::from_millis(1));
        socket
            .set_read_timeout(Some(poll_interval))
            .map_err(ServiceError::Socket)?;
        let local_address = socket.local_addr().map_err(ServiceError::Socket)?;
        let socket = std::sync::Arc::new(socket);

        let queue = std::sync::Arc::new(OutboundQueue::new(self.settings.queue_policy));
        let mut threads = ThreadManager::new();

        let sender = DatagramSender::new(
            socket.clone(),
            queue.clone(),
            peer_address,
            self.settings.peer_port,
            self.error_sink.clone(),
        );
        let sender_task = threads
            .add_task("possync-sender", sender, std::time::Duration::ZERO)
            .map_err(ServiceError::Spawn)?;

        let receiver = DatagramReceiver::new(
            socket,
            self.settings.decode_mode,
            self.subscribers.clone(),
            self.state_request_handler.clone(),
            queue.clone(),
            self.error_sink.clone(),
        );
        let receiver_task =
            match threads.add_task("possync-receiver", receiver, std::time::Duration::ZERO) {
                Ok(id) => id,
                Err(err) => {
                    queue.shutdown();
                    threads.wait_on_task_finish(sender_task);
                    return Err(ServiceError::Spawn(err));
                }
            };

        queue.push(codec::encode(&OutboundMessage::GetAll));

        log::info!(
            "SyncService: Running as '{}' on {local_address}",
            identity.callsign
        );
        *lifecycle = Lifecycle::Running(RunningService {
            identity,
            queue,
            threads,
            sender_task,
            receiver_task,
            local_address,
        });
        Ok(())
    }

    /// Reads the callsign once and keeps `config` as the live peer-address source.
    ///
    /// # Errors
    ///
    /// See [`SyncService::start`].
    pub fn start_with_configuration<C>(&self, config: std::sync::Arc<C>) -> Result<(), ServiceError>
    where
        C: ConfigurationSource + 'static,
    {
        let identity = LocalIdentity::new(config.local_callsign());
        self.start(identity, config)
    }

    /// Sends everything queued so far, then stops both workers and closes the socket.
    /// Calling it again once stopped does nothing. When called from an observer or
    /// handler callback, the receiver is signalled but not joined; it exits once the
    /// callback returns.
    ///
    /// # Errors
    ///
    /// `NotStarted` if the service was never started.
    pub fn stop(&self) -> Result<(), ServiceError> {
        let running = {
            let mut lifecycle = self.write_lifecycle();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(running) => running,
                Lifecycle::Stopped => return Ok(()),
                Lifecycle::Idle => {
                    *lifecycle = Lifecycle::Idle;
                    return Err(ServiceError::NotStarted);
                }
            }
        };

        let RunningService {
            queue,
            mut threads,
            sender_task,
            receiver_task,
            ..
        } = running;

        queue.shutdown();
        join_worker(&mut threads, sender_task);
        threads.stop_task(receiver_task);
        join_worker(&mut threads, receiver_task);
        log::info!("SyncService: Stopped");
        Ok(())
    }

    /// Queues a position report for the fix. Never touches the socket.
    ///
    /// # Errors
    ///
    /// `NotRunning` outside the running state; nothing is queued.
    pub fn on_fix_received(&self, fix: &Fix) -> Result<(), ServiceError> {
        let lifecycle = self.read_lifecycle();
        let Lifecycle::Running(running) = &*lifecycle else {
            log::debug!("SyncService: Fix ignored, service not running");
            return Err(ServiceError::NotRunning);
        };
        let message = OutboundMessage::pos_update(&running.identity, fix);
        running.queue.push(codec::encode(&message));
        Ok(())
    }

    pub fn subscribe<O>(&self, observer: &std::sync::Arc<O>) -> SubscriptionHandle
    where
        O: PositionObserver + 'static,
    {
        self.subscribers.subscribe(observer)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscribers.unsubscribe(handle)
    }

    /// Installs or clears the responder for inbound `getall` requests.
    pub fn set_state_request_handler(&self, handler: Option<std::sync::Arc<dyn StateRequestHandler>>) {
        *self
            .state_request_handler
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = handler;
    }

    #[must_use]
    pub fn state(&self) -> ServiceState {
        match &*self.read_lifecycle() {
            Lifecycle::Idle => ServiceState::Idle,
            Lifecycle::Running(_) => ServiceState::Running,
            Lifecycle::Stopped => ServiceState::Stopped,
        }
    }

    /// The bound socket address while running.
    #[must_use]
    pub fn local_address(&self) -> Option<std::net::SocketAddr> {
        match &*self.read_lifecycle() {
            Lifecycle::Running(running) => Some(running.local_address),
            Lifecycle::Idle | Lifecycle::Stopped => None,
        }
    }

    #[must_use]
    pub fn pending_messages(&self) -> usize {
        match &*self.read_lifecycle() {
            Lifecycle::Running(running) => running.queue.len(),
            Lifecycle::Idle | Lifecycle::Stopped => 0,
        }
    }

    fn read_lifecycle(&self) -> std::sync::RwLockReadGuard<'_, Lifecycle> {
        self.lifecycle
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_lifecycle(&self) -> std::sync::RwLockWriteGuard<'_, Lifecycle> {
        self.lifecycle
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Joins a worker unless the caller is that worker, as when an observer or error sink
/// stops the service from its own callback. That worker exits after the callback
/// returns, on its next stop check.
fn join_worker(threads: &mut ThreadManager, task_id: TaskID) {
    if threads.task_thread_id(task_id) == Some(std::thread::current().id()) {
        log::debug!("SyncService: Stop requested from worker {task_id}, leaving it detached");
        return;
    }
    threads.wait_on_task_finish(task_id);
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if self.state() == ServiceState::Running {
            let _ = self.stop();
        }
    }
}
