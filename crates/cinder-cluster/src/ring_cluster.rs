//! Client-side cluster router.
//!
//! Placement here is decided entirely by the client: a consistent-hash
//! ring spreads keys over a pool of independent servers that do not
//! coordinate. There is no redirection protocol in this regime; a server
//! error is a reply value, never a routing signal.

use std::collections::HashMap;

use cinder_protocol::{Command, Frame};
use tracing::debug;

use crate::connection::{ConnectionParams, NodeConnection};
use crate::error::ClusterError;
use crate::ring::HashRing;
use crate::router::ClusterRouter;
use crate::routing::{hash_tag, routing_keys, RoutingError};

/// Router for a client-sharded pool of independent servers.
///
/// Connections are keyed by alias when one is set, otherwise by a numeric
/// index assigned at insertion. Iteration (and broadcast) follows insertion
/// order, which admin tooling relies on.
pub struct RingCluster {
    /// Canonical id → connection.
    pool: HashMap<String, Box<dyn NodeConnection>>,
    /// Ids in insertion order.
    order: Vec<String>,
    /// Keyspace placement; every pooled id is on the ring.
    ring: HashRing,
    /// Next id handed to an alias-less connection.
    next_index: usize,
}

impl RingCluster {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self {
            pool: HashMap::new(),
            order: Vec::new(),
            ring: HashRing::new(),
            next_index: 0,
        }
    }

    /// The id a connection will be pooled under.
    fn id_for(&mut self, conn: &dyn NodeConnection) -> String {
        match &conn.params().alias {
            Some(alias) => alias.clone(),
            None => {
                let id = self.next_index.to_string();
                self.next_index += 1;
                id
            }
        }
    }

    /// Routes a raw key to its owning connection.
    ///
    /// This is the public "which server holds this key" query; it applies
    /// the hash-tag rule and the ring's own hash function.
    pub fn connection_for_key(
        &mut self,
        key: &[u8],
    ) -> Result<&mut dyn NodeConnection, ClusterError> {
        let hash = HashRing::hash_key(hash_tag(key));
        let id = self
            .ring
            .get(hash)
            .ok_or(ClusterError::EmptyPool)?
            .to_string();
        let conn = self
            .pool
            .get_mut(&id)
            .ok_or(ClusterError::UnknownConnection(id))?;
        Ok(conn.as_mut())
    }

    /// Runs a command on every pooled connection, in insertion order,
    /// collecting one reply per connection.
    pub fn execute_on_all(&mut self, cmd: &Command) -> Result<Vec<Frame>, ClusterError> {
        let mut replies = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let conn = self
                .pool
                .get_mut(id)
                .ok_or_else(|| ClusterError::UnknownConnection(id.clone()))?;
            replies.push(conn.execute_command(cmd)?);
        }
        Ok(replies)
    }

    /// Resolves a command to the id of its ring node, memoizing the hash.
    fn target_for(&self, cmd: &mut Command) -> Result<String, ClusterError> {
        if let Some(hash) = cmd.hash() {
            let id = self.ring.get(hash).ok_or(ClusterError::EmptyPool)?;
            return Ok(id.to_string());
        }

        let (hash, id) = {
            let keys = routing_keys(cmd)?;
            let Some((first, rest)) = keys.split_first() else {
                return Err(RoutingError::MissingKeys(cmd.id().to_string()).into());
            };
            let hash = HashRing::hash_key(hash_tag(first));
            let id = self
                .ring
                .get(hash)
                .ok_or(ClusterError::EmptyPool)?
                .to_string();
            for key in rest {
                let other = self
                    .ring
                    .get(HashRing::hash_key(hash_tag(key)))
                    .ok_or(ClusterError::EmptyPool)?;
                if other != id {
                    return Err(ClusterError::CrossNode(id, other.to_string()));
                }
            }
            (hash, id)
        };

        cmd.set_hash(hash);
        Ok(id)
    }
}

impl Default for RingCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterRouter for RingCluster {
    fn add(&mut self, conn: Box<dyn NodeConnection>) {
        let id = self.id_for(conn.as_ref());
        let weight = conn.params().weight();
        debug!(node = %id, weight, "adding connection to the ring");

        if self.pool.insert(id.clone(), conn).is_none() {
            self.order.push(id.clone());
        }
        // HashRing::add replaces any previous points for the id
        self.ring.add(&id, weight);
    }

    fn remove_by_id(&mut self, id: &str) -> Option<Box<dyn NodeConnection>> {
        let conn = self.pool.remove(id)?;
        // the ring entry must go before any further routing can run
        self.ring.remove(id);
        self.order.retain(|existing| existing != id);
        debug!(node = %id, "removed connection from the ring");
        Some(conn)
    }

    /// Alias-less connections are pooled under numeric ids, so removal by
    /// parameters searches the pool instead of deriving the id.
    fn remove(&mut self, params: &ConnectionParams) -> Option<Box<dyn NodeConnection>> {
        let id = self
            .pool
            .iter()
            .find(|(_, conn)| conn.params() == params)
            .map(|(id, _)| id.clone())?;
        self.remove_by_id(&id)
    }

    fn connect(&mut self) -> Result<(), ClusterError> {
        for conn in self.pool.values_mut() {
            conn.connect()?;
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        for conn in self.pool.values_mut() {
            conn.disconnect();
        }
    }

    fn is_connected(&self) -> bool {
        self.pool.values().any(|conn| conn.is_connected())
    }

    fn connection_for(
        &mut self,
        cmd: &mut Command,
    ) -> Result<&mut dyn NodeConnection, ClusterError> {
        let id = self.target_for(cmd)?;
        let conn = self
            .pool
            .get_mut(&id)
            .ok_or(ClusterError::UnknownConnection(id))?;
        Ok(conn.as_mut())
    }

    fn connection_by_id(&mut self, id: &str) -> Option<&mut (dyn NodeConnection + '_)> {
        match self.pool.get_mut(id) {
            Some(conn) => Some(conn.as_mut()),
            None => None,
        }
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    fn write_command(&mut self, cmd: &mut Command) -> Result<(), ClusterError> {
        let conn = self.connection_for(cmd)?;
        conn.write_command(cmd)?;
        Ok(())
    }

    fn read_response(&mut self, cmd: &mut Command) -> Result<Frame, ClusterError> {
        let conn = self.connection_for(cmd)?;
        Ok(conn.read_response(cmd)?)
    }

    fn execute_command(&mut self, cmd: &mut Command) -> Result<Frame, ClusterError> {
        let conn = self.connection_for(cmd)?;
        Ok(conn.execute_command(cmd)?)
    }
}

impl std::fmt::Debug for RingCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingCluster")
            .field("connections", &self.order)
            .field("ring_points", &self.ring.len())
            .finish()
    }
}
