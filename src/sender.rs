use crate::config::PeerAddressProvider;
use crate::error_sink::{ErrorSink, SyncError};
use crate::outbound_queue::{OutboundQueue, QueueItem};
use crate::thread_manager::SteppableTask;

/// Resolves a configured peer address. Accepts `ip`, `ip:port`, `host` and `host:port`;
/// without a port, `default_port` is used.
pub fn resolve_peer(address: &str, default_port: u16) -> std::io::Result<std::net::SocketAddr> {
    use std::net::ToSocketAddrs;

    let address = address.trim();
    if let Ok(socket_address) = address.parse::<std::net::SocketAddr>() {
        return Ok(socket_address);
    }
    if let Ok(ip) = address.parse::<std::net::IpAddr>() {
        return Ok(std::net::SocketAddr::new(ip, default_port));
    }

    let mut candidates = if address.contains(':') {
        address.to_socket_addrs()?
    } else {
        (address, default_port).to_socket_addrs()?
    };
    candidates.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no address found for '{address}'"),
        )
    })
}

/// Sole consumer of the outbound queue. Each step sends one datagram; the shutdown
/// sentinel ends the worker.
pub struct DatagramSender {
    socket: std::sync::Arc<std::net::UdpSocket>,
    queue: std::sync::Arc<OutboundQueue>,
    peer_address: std::sync::Arc<dyn PeerAddressProvider>,
    default_port: u16,
    error_sink: std::sync::Arc<dyn ErrorSink>,
}

impl DatagramSender {
    #[must_use]
    pub fn new(
        socket: std::sync::Arc<std::net::UdpSocket>,
        queue: std::sync::Arc<OutboundQueue>,
        peer_address: std::sync::Arc<dyn PeerAddressProvider>,
        default_port: u16,
        error_sink: std::sync::Arc<dyn ErrorSink>,
    ) -> Self {
        DatagramSender {
            socket,
            queue,
            peer_address,
            default_port,
            error_sink,
        }
    }

    fn send(&self, bytes: &[u8]) {
        // Re-read every time: the peer address may be reconfigured while running.
        let peer = self.peer_address.peer_address();
        let result = resolve_peer(&peer, self.default_port)
            .and_then(|address| self.socket.send_to(bytes, address));

        match result {
            Ok(sent) => log::debug!("DatagramSender: Sent {sent} bytes to '{peer}'"),
            Err(source) => self.error_sink.report(&SyncError::Send {
                peer,
                bytes: bytes.len(),
                source,
            }),
        }
    }
}

impl SteppableTask for DatagramSender {
    fn step(&mut self) -> bool {
        match self.queue.pop() {
            QueueItem::Message(bytes) => {
                self.send(&bytes);
                true
            }
            QueueItem::Shutdown => {
                log::info!("DatagramSender: Queue drained, exiting");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve_peer, DatagramSender};
    use crate::error_sink::ChannelErrorSink;
    use crate::outbound_queue::OutboundQueue;
    use crate::thread_manager::SteppableTask;

    fn loopback_socket() -> std::net::UdpSocket {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        socket
    }

    fn receive_all(peer: &std::net::UdpSocket, count: usize) -> Vec<Vec<u8>> {
        let mut buffer = [0u8; 1024];
        (0..count)
            .map(|_| {
                let (len, _) = peer.recv_from(&mut buffer).unwrap();
                buffer[..len].to_vec()
            })
            .collect()
    }

    #[test]
    fn when_resolving_bare_ip_then_default_port_is_used() {
        let address = resolve_peer("192.168.0.254", 5309).unwrap();
        assert_eq!(address, "192.168.0.254:5309".parse().unwrap());
    }

    #[test]
    fn when_resolving_ip_with_port_then_port_is_kept() {
        let address = resolve_peer(" 10.0.0.1:6000 ", 5309).unwrap();
        assert_eq!(address, "10.0.0.1:6000".parse().unwrap());
    }

    #[test]
    fn when_resolving_bare_ipv6_then_default_port_is_used() {
        let address = resolve_peer("::1", 5309).unwrap();
        assert_eq!(address, "[::1]:5309".parse().unwrap());
    }

    #[test]
    fn when_port_is_invalid_then_resolution_fails() {
        assert!(resolve_peer("127.0.0.1:notaport", 5309).is_err());
    }

    #[test]
    fn when_queue_is_drained_then_datagrams_arrive_in_push_order() {
        let peer = loopback_socket();
        let peer_address = peer.local_addr().unwrap().to_string();
        let queue = std::sync::Arc::new(OutboundQueue::default());
        let (error_sender, error_receiver) = crossbeam_channel::unbounded();
        let mut sender = DatagramSender::new(
            std::sync::Arc::new(loopback_socket()),
            queue.clone(),
            std::sync::Arc::new(move || peer_address.clone()),
            5309,
            std::sync::Arc::new(ChannelErrorSink::new(error_sender)),
        );

        queue.push(b"A".to_vec());
        queue.push(b"B".to_vec());
        queue.push(b"C".to_vec());
        queue.shutdown();

        let mut steps = 0;
        while sender.step() {
            steps += 1;
        }

        assert_eq!(steps, 3);
        assert_eq!(
            receive_all(&peer, 3),
            vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec()]
        );
        assert!(error_receiver.try_recv().is_err());
    }

    #[test]
    fn when_one_send_fails_then_error_is_reported_and_next_message_is_sent() {
        let peer = loopback_socket();
        let good_address = peer.local_addr().unwrap().to_string();
        let addresses = std::sync::Mutex::new(std::collections::VecDeque::from([
            String::from("127.0.0.1:notaport"),
            good_address,
        ]));
        let queue = std::sync::Arc::new(OutboundQueue::default());
        let (error_sender, error_receiver) = crossbeam_channel::unbounded();
        let mut sender = DatagramSender::new(
            std::sync::Arc::new(loopback_socket()),
            queue.clone(),
            std::sync::Arc::new(move || addresses.lock().unwrap().pop_front().unwrap_or_default()),
            5309,
            std::sync::Arc::new(ChannelErrorSink::new(error_sender)),
        );

        queue.push(b"lost".to_vec());
        queue.push(b"delivered".to_vec());
        queue.shutdown();
        while sender.step() {}

        let errors: Vec<String> = error_receiver.try_iter().collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("127.0.0.1:notaport"));
        assert_eq!(receive_all(&peer, 1), vec![b"delivered".to_vec()]);
    }
}
