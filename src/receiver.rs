use crate::codec::{self, DecodeMode, InboundMessage};
use crate::error_sink::{ErrorSink, SyncError};
use crate::outbound_queue::OutboundQueue;
use crate::subscribers::SubscriberRegistry;
use crate::thread_manager::SteppableTask;
use crate::types::PositionUpdate;

/// Datagrams longer than this are truncated by the socket and will fail to decode.
pub const RECEIVE_BUFFER_SIZE: usize = 1024;

/// Pause after a failed receive so a persistent socket error cannot spin the worker.
pub const RECEIVE_ERROR_BACKOFF: std::time::Duration = std::time::Duration::from_millis(100);

/// Answers a peer's `getall` request. No responder is installed by default.
pub trait StateRequestHandler: Send + Sync {
    fn on_state_request(&self, from: std::net::SocketAddr, outbound: &OutboundQueue);
}

pub type StateRequestSlot = std::sync::RwLock<Option<std::sync::Arc<dyn StateRequestHandler>>>;

/// Reads datagrams from the shared socket and publishes decoded positions.
///
/// The socket must carry a read timeout: each step waits at most that long, which is what
/// lets the worker observe a stop request.
pub struct DatagramReceiver {
    socket: std::sync::Arc<std::net::UdpSocket>,
    buffer: Vec<u8>,
    decode_mode: DecodeMode,
    subscribers: std::sync::Arc<SubscriberRegistry>,
    state_request_handler: std::sync::Arc<StateRequestSlot>,
    outbound: std::sync::Arc<OutboundQueue>,
    error_sink: std::sync::Arc<dyn ErrorSink>,
}

impl DatagramReceiver {
    #[must_use]
    pub fn new(
        socket: std::sync::Arc<std::net::UdpSocket>,
        decode_mode: DecodeMode,
        subscribers: std::sync::Arc<SubscriberRegistry>,
        state_request_handler: std::sync::Arc<StateRequestSlot>,
        outbound: std::sync::Arc<OutboundQueue>,
        error_sink: std::sync::Arc<dyn ErrorSink>,
    ) -> Self {
        DatagramReceiver {
            socket,
            buffer: vec![0u8; RECEIVE_BUFFER_SIZE],
            decode_mode,
            subscribers,
            state_request_handler,
            outbound,
            error_sink,
        }
    }

    /// Decodes one datagram and dispatches it. Subscribers are notified before this returns.
    pub fn handle_datagram(
        &self,
        datagram: &[u8],
        from: std::net::SocketAddr,
        received_at: chrono::DateTime<chrono::Utc>,
    ) {
        match codec::decode_with_mode(datagram, self.decode_mode) {
            Ok(InboundMessage::PosUpdate {
                callsign,
                lat,
                lon,
                age,
            }) => {
                log::debug!("DatagramReceiver: {callsign} at {lat},{lon} (age {age}s) from {from}");
                let update = PositionUpdate::from_wire(callsign, lat, lon, age, received_at);
                self.subscribers.notify(&update);
            }
            Ok(InboundMessage::GetAll) => {
                let handler = self
                    .state_request_handler
                    .read()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .clone();
                match handler {
                    Some(handler) => handler.on_state_request(from, &self.outbound),
                    None => log::debug!("DatagramReceiver: Ignoring getall from {from}"),
                }
            }
            Err(source) => self.error_sink.report(&SyncError::Decode { from, source }),
        }
    }
}

impl SteppableTask for DatagramReceiver {
    fn step(&mut self) -> bool {
        let (len, from) = match self.socket.recv_from(&mut self.buffer) {
            Ok(received) => received,
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                return true;
            }
            Err(err) => {
                self.error_sink.report(&SyncError::Receive(err));
                std::thread::sleep(RECEIVE_ERROR_BACKOFF);
                return true;
            }
        };

        self.handle_datagram(&self.buffer[..len], from, chrono::Utc::now());
        true
    }
}
