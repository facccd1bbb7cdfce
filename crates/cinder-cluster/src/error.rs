//! Error types for cluster routing.

use crate::connection::ConnectionError;
use crate::routing::RoutingError;
use crate::slot::SlotRangeError;

/// Errors that can occur while routing and dispatching commands.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The command cannot be routed (no descriptor, or no key arguments).
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// A multi-key command's keys hash to different slots.
    #[error("cross-slot keys not allowed (keys span slots {0} and {1})")]
    CrossSlot(u16, u16),

    /// A multi-key command's keys land on different ring nodes.
    #[error("cross-node keys not allowed (keys land on {0} and {1})")]
    CrossNode(String, String),

    /// No connection is registered under the given id.
    #[error("no connection registered under id {0:?}")]
    UnknownConnection(String),

    /// The connection pool has no members to route to.
    #[error("connection pool is empty")]
    EmptyPool,

    /// No initializer is defined for the requested connection scheme.
    #[error("no initializer defined for scheme {0:?}")]
    UnknownScheme(String),

    /// A redirection reply did not match `MOVED <slot> <host>:<port>` or
    /// `ASK <slot> <host>:<port>`.
    #[error("malformed redirection reply {0:?}")]
    MalformedRedirect(String),

    /// A command was redirected more times than the loop cap allows.
    #[error("redirection loop for slot {slot} (gave up after {depth} hops)")]
    RedirectLoop { slot: u16, depth: u32 },

    /// An invalid slot range was passed to a bulk slot assignment.
    #[error(transparent)]
    SlotRange(#[from] SlotRangeError),

    /// The underlying connection failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl ClusterError {
    /// Returns true if the command was refused locally as unroutable,
    /// as opposed to failing during dispatch.
    pub fn is_unroutable(&self) -> bool {
        matches!(
            self,
            ClusterError::Routing(_) | ClusterError::CrossSlot(..) | ClusterError::CrossNode(..)
        )
    }
}
