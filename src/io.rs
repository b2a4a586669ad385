//! Transport contract for the session driver.
//!
//! The transport hides how bytes move: a production host wraps a socket
//! (or the server's own connection plumbing), tests use in-memory
//! scripts. It is only ever called from the session driver thread and
//! does not need to be thread-safe beyond `Send`.

use bytes::Bytes;

use crate::frame::Frame;

/// Result of one read attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStatus {
    /// Bytes were available; feed them to the codec.
    Data(Bytes),
    /// No data currently available (only possible for non-blocking reads).
    NoData,
    /// The peer closed the connection.
    Closed,
    /// Unrecoverable transport error.
    Error,
}

/// Result of writing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Success,
    /// The connection is gone; nothing further can be written.
    ConnectionClosed,
}

/// Byte transport for one SPDY connection.
pub trait SessionIo: Send {
    /// Whether the connection has been aborted externally (e.g. by the
    /// host server shutting down) and the session should stop.
    fn is_connection_aborted(&self) -> bool;

    /// Pull available input bytes from the connection. If none are
    /// available and `block` is true, wait until some arrive or the
    /// connection closes; otherwise return [`ReadStatus::NoData`].
    fn read_available(&mut self, block: bool) -> ReadStatus;

    /// Write a single frame to the peer as-is (no further compression),
    /// blocking until it has been flushed down the wire.
    fn send_frame_raw(&mut self, frame: &Frame) -> WriteStatus;
}
