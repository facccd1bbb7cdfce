//! Reply frame types.
//!
//! The [`Frame`] enum represents a single parsed server reply.
//! Bulk strings use `Bytes` for reference-counted storage that avoids
//! copies when replies move between the connection and the caller.

use bytes::Bytes;

/// A single parsed reply value.
///
/// Covers the reply shapes the store produces: status strings, errors,
/// integers, binary-safe bulk data, arrays, and null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Simple string reply, e.g. `OK`.
    Simple(String),

    /// Error reply, e.g. `ERR unknown command`.
    ///
    /// Redirection signals (`MOVED`, `ASK`) arrive as error replies and are
    /// intercepted by the routing layer before the caller sees them.
    Error(String),

    /// 64-bit signed integer reply.
    Integer(i64),

    /// Bulk (binary-safe) string reply.
    Bulk(Bytes),

    /// Ordered array of frames.
    Array(Vec<Frame>),

    /// Null reply.
    Null,
}

impl Frame {
    /// Returns `true` if this frame is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    /// Returns the error message if this frame is an error reply.
    pub fn as_error(&self) -> Option<&str> {
        match self {
            Frame::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Builds a bulk frame from a static byte string.
    pub fn bulk(data: &'static [u8]) -> Self {
        Frame::Bulk(Bytes::from_static(data))
    }
}
