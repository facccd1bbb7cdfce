//! cinder-cluster: routing core for sharded deployments.
//!
//! Given a stream of commands, this crate decides which backend connection
//! each one goes to and keeps that decision consistent as the sharding
//! topology changes. Two regimes are supported:
//!
//! - **Server-authoritative** ([`SlotCluster`]): the server owns a
//!   16384-slot partition of the keyspace and emits `MOVED`/`ASK`
//!   redirections when ownership changes; the router cooperates with that
//!   protocol and learns the slot map incrementally.
//! - **Client-side** ([`RingCluster`]): placement is decided locally with a
//!   weighted consistent-hash ring over servers that do not coordinate.
//!
//! Both implement the [`ClusterRouter`] dispatch surface. Transport is a
//! collaborator concern behind the [`NodeConnection`] trait; the
//! [`ConnectionFactory`] materializes connections for hosts the router
//! first hears about from a redirect.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use cinder_cluster::{ClusterRouter, ConnectionFactory, ConnectionParams};
//! use cinder_protocol::Command;
//!
//! let mut factory = ConnectionFactory::new();
//! factory.define("tcp", |params| Ok(transport::open(params)?));
//!
//! let mut cluster = factory.into_slot_cluster(&[
//!     ConnectionParams::new("10.0.0.1", 6379),
//!     ConnectionParams::new("10.0.0.2", 6379),
//! ])?;
//! cluster.assign_slots(0, 8191, "10.0.0.1:6379")?;
//! cluster.assign_slots(8192, 16383, "10.0.0.2:6379")?;
//!
//! let mut cmd = Command::new("GET").arg("user:1000");
//! let reply = cluster.execute_command(&mut cmd)?;
//! ```
//!
//! Routers are single-owner: all operations take `&mut self`, and a command
//! does not return until it has a reply or an error. Callers that share a
//! router across tasks serialize access around it.

mod connection;
mod error;
mod factory;
mod ring;
mod ring_cluster;
mod router;
mod routing;
mod slot;
mod slot_cluster;

pub use connection::{ConnectionError, ConnectionParams, NodeConnection};
pub use error::ClusterError;
pub use factory::{ConnectionFactory, Initializer};
pub use ring::HashRing;
pub use ring_cluster::RingCluster;
pub use router::ClusterRouter;
pub use routing::{hash_tag, pattern_for, routing_keys, KeyPattern, RoutingError};
pub use slot::{crc16, slot_of, SlotRange, SlotRangeError, SLOT_COUNT};
pub use slot_cluster::SlotCluster;
