#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Service has already been started")]
    AlreadyStarted,
    #[error("Service is not running")]
    NotRunning,
    #[error("Service was never started")]
    NotStarted,
    #[error("Failed to open UDP socket: {0}")]
    Socket(#[source] std::io::Error),
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
