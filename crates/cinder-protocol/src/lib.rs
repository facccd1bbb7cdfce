//! cinder-protocol: command and reply model for the cinder client.
//!
//! Defines the two shapes the routing layer works with: [`Command`], a
//! routable request with a memoized routing hash, and [`Frame`], a parsed
//! server reply. Wire encoding and decoding live in the transport layer;
//! this crate only deals in the parsed forms.

pub mod command;
pub mod types;

pub use command::Command;
pub use types::Frame;
