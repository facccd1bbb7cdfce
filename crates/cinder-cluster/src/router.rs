//! The dispatch surface shared by both cluster regimes.
//!
//! [`SlotCluster`](crate::SlotCluster) and [`RingCluster`](crate::RingCluster)
//! route with different state and different algorithms, but expose one
//! surface to callers and admin tooling. That surface is a trait with two
//! implementations; the regimes share no code through it.

use cinder_protocol::{Command, Frame};

use crate::connection::{ConnectionParams, NodeConnection};
use crate::error::ClusterError;

/// Uniform surface over a pool of routed backend connections.
pub trait ClusterRouter {
    /// Inserts a connection under its canonical id, replacing any previous
    /// connection with the same id (two connections never share an id).
    fn add(&mut self, conn: Box<dyn NodeConnection>);

    /// Removes and returns the connection registered under `id`.
    fn remove_by_id(&mut self, id: &str) -> Option<Box<dyn NodeConnection>>;

    /// Removes the connection that was created from the given parameters.
    fn remove(&mut self, params: &ConnectionParams) -> Option<Box<dyn NodeConnection>> {
        self.remove_by_id(&params.canonical_id())
    }

    /// Opens every pooled connection.
    fn connect(&mut self) -> Result<(), ClusterError>;

    /// Closes every pooled connection.
    fn disconnect(&mut self);

    /// True if at least one pooled connection is open.
    fn is_connected(&self) -> bool;

    /// Routes a command to its target connection, memoizing the routing
    /// hash on the command.
    fn connection_for(&mut self, cmd: &mut Command)
        -> Result<&mut dyn NodeConnection, ClusterError>;

    /// Looks up a pooled connection by canonical id.
    fn connection_by_id(&mut self, id: &str) -> Option<&mut (dyn NodeConnection + '_)>;

    /// Number of pooled connections.
    fn len(&self) -> usize;

    /// True if the pool is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical ids of the pooled connections, in this router's
    /// deterministic iteration order.
    fn ids(&self) -> Vec<String>;

    /// Routes and writes a command without waiting for its reply.
    fn write_command(&mut self, cmd: &mut Command) -> Result<(), ClusterError>;

    /// Routes a command and reads its pending reply.
    fn read_response(&mut self, cmd: &mut Command) -> Result<Frame, ClusterError>;

    /// Routes a command and executes it, returning the reply.
    fn execute_command(&mut self, cmd: &mut Command) -> Result<Frame, ClusterError>;
}
