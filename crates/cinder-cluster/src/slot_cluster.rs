//! Server-authoritative cluster router.
//!
//! The server partitions the keyspace into 16384 slots, each owned by one
//! node at a time. This router keeps a sparse picture of that ownership and
//! cooperates with the server's redirection protocol: a `MOVED` reply
//! permanently rewrites the local routing, an `ASK` reply diverts a single
//! command while a slot is mid-migration. The picture starts empty (or from
//! a preconfigured partial map) and sharpens with every redirect; there is
//! no periodic refresh.

use std::collections::HashMap;

use cinder_protocol::{Command, Frame};
use rand::prelude::IndexedRandom;
use tracing::{debug, warn};

use crate::connection::{ConnectionParams, NodeConnection};
use crate::error::ClusterError;
use crate::factory::ConnectionFactory;
use crate::router::ClusterRouter;
use crate::routing::{hash_tag, routing_keys, RoutingError};
use crate::slot::{slot_of, SlotRange, SLOT_COUNT};

/// Redirect chains longer than this surface [`ClusterError::RedirectLoop`].
/// A healthy cluster resolves a command in one or two hops; anything deeper
/// means the servers disagree about ownership.
const MAX_REDIRECTS: u32 = 16;

/// A parsed `MOVED`/`ASK` redirection reply.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Redirect {
    kind: RedirectKind,
    slot: u16,
    host: String,
    port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RedirectKind {
    Moved,
    Ask,
}

impl Redirect {
    /// Parses a server error message of the form `MOVED <slot> <host>:<port>`
    /// or `ASK <slot> <host>:<port>`.
    ///
    /// Returns `Ok(None)` for error replies that are not redirections (they
    /// are ordinary reply values to the caller). A reply that *is* a
    /// redirection but does not parse is a protocol anomaly.
    fn parse(message: &str) -> Result<Option<Redirect>, ClusterError> {
        let Some((kind, rest)) = message.split_once(' ') else {
            return Ok(None);
        };
        let kind = match kind {
            "MOVED" => RedirectKind::Moved,
            "ASK" => RedirectKind::Ask,
            _ => return Ok(None),
        };

        let malformed = || ClusterError::MalformedRedirect(message.to_string());

        let (slot, addr) = rest.split_once(' ').ok_or_else(malformed)?;
        let slot: u16 = slot.parse().ok().filter(|s| *s < SLOT_COUNT).ok_or_else(malformed)?;
        // rsplit so a future bracketed-IPv6 host keeps its colons
        let (host, port) = addr.rsplit_once(':').ok_or_else(malformed)?;
        if host.is_empty() {
            return Err(malformed());
        }
        let port: u16 = port.parse().map_err(|_| malformed())?;

        Ok(Some(Redirect {
            kind,
            slot,
            host: host.to_string(),
            port,
        }))
    }

    fn target_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Router for a server-authoritative (slot-based) cluster.
pub struct SlotCluster {
    /// Canonical id → connection.
    pool: HashMap<String, Box<dyn NodeConnection>>,
    /// Sparse slot → id assertions (preconfigured or learned out of band).
    slot_owners: HashMap<u16, String>,
    /// Slot → id memoization for the hot path; rewritten by MOVED replies.
    slot_cache: HashMap<u16, String>,
    /// Materializes connections for hosts first named by a redirect.
    factory: ConnectionFactory,
}

impl SlotCluster {
    /// Creates an empty router around a connection factory.
    pub fn new(factory: ConnectionFactory) -> Self {
        Self {
            pool: HashMap::new(),
            slot_owners: HashMap::new(),
            slot_cache: HashMap::new(),
            factory,
        }
    }

    /// Bulk-asserts that slots `[first, last]` are owned by `id`,
    /// overwriting any previous assertion for those slots.
    ///
    /// The connection does not have to be pooled yet; routing falls back to
    /// probing until it is.
    pub fn assign_slots(&mut self, first: u16, last: u16, id: &str) -> Result<(), ClusterError> {
        let range = SlotRange::new(first, last)?;
        debug!(%range, node = id, "asserting slot ownership");
        for slot in range.iter() {
            self.slot_owners.insert(slot, id.to_string());
        }
        Ok(())
    }

    /// Computes (or reuses) the slot a command routes to, memoizing the
    /// result on the command.
    ///
    /// Fails if the command is unroutable or its keys span slots.
    pub fn slot_for(&self, cmd: &mut Command) -> Result<u16, ClusterError> {
        if let Some(hash) = cmd.hash() {
            return Ok((hash % SLOT_COUNT as u32) as u16);
        }

        let slot = {
            let keys = routing_keys(cmd)?;
            let Some((first, rest)) = keys.split_first() else {
                return Err(RoutingError::MissingKeys(cmd.id().to_string()).into());
            };
            let slot = slot_of(hash_tag(first));
            for key in rest {
                let other = slot_of(hash_tag(key));
                if other != slot {
                    return Err(ClusterError::CrossSlot(slot, other));
                }
            }
            slot
        };

        cmd.set_hash(slot as u32);
        Ok(slot)
    }

    /// The memoized target for a slot, if routing has resolved it before.
    pub fn cached_target(&self, slot: u16) -> Option<&str> {
        self.slot_cache.get(&slot).map(String::as_str)
    }

    /// The asserted owner of a slot, if one was configured.
    pub fn assigned_owner(&self, slot: u16) -> Option<&str> {
        self.slot_owners.get(&slot).map(String::as_str)
    }

    /// Resolves a slot to a pooled connection id.
    ///
    /// Order: memoized target, then asserted owner, then a uniformly random
    /// pool member. The server corrects a wrong guess with a redirect; the
    /// guess is cached so the slot stays sticky until then.
    fn target_for_slot(&mut self, slot: u16) -> Result<String, ClusterError> {
        if let Some(id) = self.slot_cache.get(&slot) {
            if self.pool.contains_key(id) {
                return Ok(id.clone());
            }
            // the cached target left the pool; re-resolve below
        }

        if let Some(id) = self.slot_owners.get(&slot) {
            if self.pool.contains_key(id) {
                let id = id.clone();
                self.slot_cache.insert(slot, id.clone());
                return Ok(id);
            }
        }

        let ids: Vec<&String> = self.pool.keys().collect();
        let id = ids
            .choose(&mut rand::rng())
            .ok_or(ClusterError::EmptyPool)?
            .to_string();
        debug!(slot, node = %id, "slot owner unknown, probing a random connection");
        self.slot_cache.insert(slot, id.clone());
        Ok(id)
    }

    /// Ensures a MOVED target is pooled, materializing it on first sight.
    ///
    /// Only the MOVED path pools its target. ASK targets stay out of the
    /// pool: a slot mid-migration must keep routing to the old owner.
    fn ensure_pooled(&mut self, redirect: &Redirect) -> Result<String, ClusterError> {
        let id = redirect.target_id();
        if !self.pool.contains_key(&id) {
            let params = ConnectionParams::new(redirect.host.clone(), redirect.port);
            let conn = self.factory.create(&params)?;
            debug!(node = %id, "adding redirect target to the pool");
            self.pool.insert(id.clone(), conn);
        }
        Ok(id)
    }

    /// Sends `ASKING` and the redirected command in one write, then reads
    /// both replies. The `ASKING` acknowledgement is consumed and dropped.
    fn ask_on(conn: &mut dyn NodeConnection, cmd: &Command) -> Result<Frame, ClusterError> {
        let asking = Command::new("ASKING");
        conn.write_command(&asking)?;
        conn.write_command(cmd)?;
        let ack = conn.read_response(&asking)?;
        if let Some(message) = ack.as_error() {
            warn!(message, "redirect target refused ASKING");
        }
        Ok(conn.read_response(cmd)?)
    }
}

impl ClusterRouter for SlotCluster {
    fn add(&mut self, conn: Box<dyn NodeConnection>) {
        let id = conn.params().canonical_id();
        debug!(node = %id, "adding connection to the pool");
        self.pool.insert(id, conn);
    }

    fn remove_by_id(&mut self, id: &str) -> Option<Box<dyn NodeConnection>> {
        // slot assertions and cache entries pointing at the removed
        // connection stay; the next MOVED (or a fallback probe) corrects them
        self.pool.remove(id)
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
        let slot = self.slot_for(cmd)?;
        let id = self.target_for_slot(slot)?;
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
        let mut ids: Vec<String> = self.pool.keys().cloned().collect();
        ids.sort();
        ids
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
        // an ASK redirect pending for the next attempt only
        let mut ask: Option<Redirect> = None;
        let mut last_slot = 0u16;

        for _ in 0..=MAX_REDIRECTS {
            let reply = match ask.take() {
                Some(redirect) => {
                    let id = redirect.target_id();
                    match self.pool.get_mut(&id) {
                        Some(conn) => Self::ask_on(conn.as_mut(), cmd)?,
                        None => {
                            // one-shot target: use a transient connection and
                            // let it drop without joining the pool
                            let params =
                                ConnectionParams::new(redirect.host.clone(), redirect.port);
                            let mut conn = self.factory.create(&params)?;
                            Self::ask_on(conn.as_mut(), cmd)?
                        }
                    }
                }
                None => {
                    let conn = self.connection_for(cmd)?;
                    conn.execute_command(cmd)?
                }
            };

            let Some(message) = reply.as_error() else {
                return Ok(reply);
            };
            let Some(redirect) = Redirect::parse(message)? else {
                // ordinary server error: a reply value, not a routing signal
                return Ok(reply);
            };

            last_slot = redirect.slot;
            debug!(
                kind = ?redirect.kind,
                slot = redirect.slot,
                node = %redirect.target_id(),
                "server redirected command"
            );

            match redirect.kind {
                RedirectKind::Moved => {
                    // permanent: pool the target, rewrite the memoized
                    // routing, and re-enter dispatch so a chained redirect
                    // is followed
                    let id = self.ensure_pooled(&redirect)?;
                    self.slot_cache.insert(redirect.slot, id);
                }
                RedirectKind::Ask => {
                    // one-shot: no routing state changes
                    ask = Some(redirect);
                }
            }
        }

        Err(ClusterError::RedirectLoop {
            slot: last_slot,
            depth: MAX_REDIRECTS,
        })
    }
}

impl std::fmt::Debug for SlotCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotCluster")
            .field("connections", &self.ids())
            .field("asserted_slots", &self.slot_owners.len())
            .field("cached_slots", &self.slot_cache.len())
            .finish()
    }
}
