//! Unified error types for the firewall proxy

use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FirewallError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Upstream connection failed: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FirewallError>;
