//! The connection capability the routers consume.
//!
//! The routing core never touches sockets. It addresses backends through
//! the [`NodeConnection`] trait and identifies them by the canonical id
//! derived from their parameters: the user-chosen alias when present,
//! otherwise `host:port`.

use cinder_protocol::{Command, Frame};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Errors surfaced by a backend connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server disconnected")]
    Disconnected,
}

/// Parameters describing one backend connection.
///
/// Recognized by the factory and carried immutably by every connection for
/// its lifetime. `alias` overrides the canonical id; `weight` only matters
/// to the client-side ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,

    /// Identity string chosen by the user; becomes the canonical id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Relative share of the client-side ring. Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<NonZeroU32>,

    /// Transport scheme the factory dispatches on.
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

fn default_scheme() -> String {
    "tcp".to_string()
}

impl ConnectionParams {
    /// Creates parameters for a plain `tcp` backend.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            alias: None,
            weight: None,
            scheme: default_scheme(),
        }
    }

    /// Sets the user-chosen alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets the ring weight. Zero is not a valid weight, which the
    /// `NonZeroU32` argument enforces at the call site.
    pub fn with_weight(mut self, weight: NonZeroU32) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Sets the transport scheme.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// The id the routers address this connection by: the alias when set,
    /// otherwise `host:port`.
    pub fn canonical_id(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => self.addr(),
        }
    }

    /// The `host:port` form of the address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The effective ring weight (default 1).
    pub fn weight(&self) -> u32 {
        self.weight.map(NonZeroU32::get).unwrap_or(1)
    }
}

/// A single backend connection, as seen by the routers.
///
/// Implementations own the transport, framing, timeouts, and reconnect
/// policy. The routers only sequence calls: within one router, commands
/// reach their target connection in call order.
pub trait NodeConnection: std::fmt::Debug {
    /// Opens the underlying transport.
    fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Closes the underlying transport. Idempotent.
    fn disconnect(&mut self);

    /// Whether the transport is currently open.
    fn is_connected(&self) -> bool;

    /// Writes a command without waiting for its reply.
    fn write_command(&mut self, cmd: &Command) -> Result<(), ConnectionError>;

    /// Reads the reply for a previously written command.
    fn read_response(&mut self, cmd: &Command) -> Result<Frame, ConnectionError>;

    /// Writes a command and reads its reply.
    fn execute_command(&mut self, cmd: &Command) -> Result<Frame, ConnectionError>;

    /// The immutable parameters this connection was created from.
    fn params(&self) -> &ConnectionParams;
}
