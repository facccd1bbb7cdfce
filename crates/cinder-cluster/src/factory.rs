//! Connection factory adapter.
//!
//! Maps transport schemes to initializers that materialize backend
//! connections from [`ConnectionParams`]. The server-authoritative router
//! uses this to bring up connections to hosts it first learns about from a
//! redirection reply; everything else is construction-time convenience.

use std::collections::HashMap;

use tracing::debug;

use crate::connection::{ConnectionParams, NodeConnection};
use crate::error::ClusterError;
use crate::ring_cluster::RingCluster;
use crate::router::ClusterRouter;
use crate::slot_cluster::SlotCluster;

/// Builds a connection for one transport scheme.
pub type Initializer = Box<dyn Fn(&ConnectionParams) -> Result<Box<dyn NodeConnection>, ClusterError>>;

/// Registry of scheme initializers.
///
/// Starts empty: the transport layer (or the test harness) registers the
/// schemes it provides. `create` dispatches on `params.scheme`.
#[derive(Default)]
pub struct ConnectionFactory {
    initializers: HashMap<String, Initializer>,
}

impl ConnectionFactory {
    /// Creates a factory with no schemes registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the initializer for a scheme.
    pub fn define<F>(&mut self, scheme: &str, initializer: F)
    where
        F: Fn(&ConnectionParams) -> Result<Box<dyn NodeConnection>, ClusterError> + 'static,
    {
        debug!(scheme, "registering connection initializer");
        self.initializers
            .insert(scheme.to_string(), Box::new(initializer));
    }

    /// Removes a scheme's initializer. Returns true if one was registered.
    pub fn undefine(&mut self, scheme: &str) -> bool {
        self.initializers.remove(scheme).is_some()
    }

    /// Returns true if the scheme has an initializer.
    pub fn supports(&self, scheme: &str) -> bool {
        self.initializers.contains_key(scheme)
    }

    /// Materializes a connection from its parameters.
    pub fn create(
        &self,
        params: &ConnectionParams,
    ) -> Result<Box<dyn NodeConnection>, ClusterError> {
        let initializer = self
            .initializers
            .get(&params.scheme)
            .ok_or_else(|| ClusterError::UnknownScheme(params.scheme.clone()))?;
        debug!(addr = %params.addr(), scheme = %params.scheme, "creating connection");
        initializer(params)
    }

    /// Builds a server-authoritative cluster router over the given backends.
    ///
    /// Consumes the factory: the router keeps it to materialize connections
    /// named by future redirects.
    pub fn into_slot_cluster(
        self,
        params: &[ConnectionParams],
    ) -> Result<SlotCluster, ClusterError> {
        let mut connections = Vec::with_capacity(params.len());
        for p in params {
            connections.push(self.create(p)?);
        }
        let mut cluster = SlotCluster::new(self);
        for conn in connections {
            cluster.add(conn);
        }
        Ok(cluster)
    }

    /// Builds a client-side cluster router over the given backends.
    pub fn into_ring_cluster(self, params: &[ConnectionParams]) -> Result<RingCluster, ClusterError> {
        let mut cluster = RingCluster::new();
        for p in params {
            cluster.add(self.create(p)?);
        }
        Ok(cluster)
    }
}

impl std::fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<_> = self.initializers.keys().collect();
        schemes.sort();
        f.debug_struct("ConnectionFactory")
            .field("schemes", &schemes)
            .finish()
    }
}
