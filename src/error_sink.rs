use crate::codec::DecodeError;

/// Per-message failures contained inside a worker. None of these stop a worker loop.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to send {bytes} bytes to peer '{peer}': {source}")]
    Send {
        peer: String,
        bytes: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("Undecodable datagram from {from}: {source}")]
    Decode {
        from: std::net::SocketAddr,
        #[source]
        source: DecodeError,
    },
    #[error("Socket receive failed: {0}")]
    Receive(#[source] std::io::Error),
}

pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &SyncError);
}

/// Default sink: routes worker failures into the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, error: &SyncError) {
        match error {
            SyncError::Decode { .. } => log::warn!("{error}"),
            SyncError::Send { .. } | SyncError::Receive(_) => log::error!("{error}"),
        }
    }
}

/// Forwards rendered errors to a channel, for hosts that surface them elsewhere.
#[derive(Debug, Clone)]
pub struct ChannelErrorSink {
    sender: crossbeam_channel::Sender<String>,
}

impl ChannelErrorSink {
    #[must_use]
    pub fn new(sender: crossbeam_channel::Sender<String>) -> Self {
        ChannelErrorSink { sender }
    }
}

impl ErrorSink for ChannelErrorSink {
    fn report(&self, error: &SyncError) {
        if self.sender.send(error.to_string()).is_err() {
            log::error!("{error}");
        }
    }
}
