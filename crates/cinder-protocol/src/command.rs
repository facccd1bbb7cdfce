//! Routable command representation.
//!
//! A [`Command`] carries the canonical command identifier, its argument
//! list, and a routing-hash slot that the cluster layer fills in once the
//! command has been hashed. Memoizing the hash on the command keeps the
//! routing decision stable for the lifetime of one dispatch: re-routing the
//! same command (e.g. after a redirect) must not recompute it.

use bytes::Bytes;

/// A command ready for cluster dispatch.
#[derive(Debug, Clone)]
pub struct Command {
    id: String,
    args: Vec<Bytes>,
    hash: Option<u32>,
}

impl Command {
    /// Creates a command with no arguments.
    ///
    /// The identifier is canonicalized to uppercase so routing tables and
    /// logs agree on one spelling.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_ascii_uppercase(),
            args: Vec::new(),
            hash: None,
        }
    }

    /// Creates a command with a prepared argument list.
    pub fn with_args(id: &str, args: Vec<Bytes>) -> Self {
        Self {
            id: id.to_ascii_uppercase(),
            args,
            hash: None,
        }
    }

    /// Appends an argument (builder style).
    pub fn arg(mut self, arg: impl Into<Bytes>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The canonical (uppercase) command identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The ordered argument list.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// The memoized routing hash, if one has been computed.
    pub fn hash(&self) -> Option<u32> {
        self.hash
    }

    /// Records the routing hash for this command.
    ///
    /// Written by the router on first dispatch; subsequent routing of the
    /// same command reuses the stored value.
    pub fn set_hash(&mut self, hash: u32) {
        self.hash = Some(hash);
    }

    /// Clears the memoized hash, forcing the next dispatch to re-route.
    pub fn clear_hash(&mut self) {
        self.hash = None;
    }
}
