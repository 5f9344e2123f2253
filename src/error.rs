use thiserror::Error;

/// Errors surfaced by a [`crate::session::Service`] while bringing up a session.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("chat script exited with status {0}")]
    ChatFailed(std::process::ExitStatus),

    #[error("failed to spawn chat script: {0}")]
    ChatSpawn(std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort the process before the event loop starts.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("interface {0:?} not found")]
    NoSuchInterface(String),

    #[error("failed to read MAC address of interface {0:?}: {1}")]
    HardwareAddress(String, std::io::Error),

    #[error("failed to create {0} socket: {1}")]
    Socket(&'static str, std::io::Error),

    #[error("failed to bind {0} socket: {1}")]
    Bind(&'static str, std::io::Error),

    #[error("duplicate service name {0:?}")]
    DuplicateService(String),
}
