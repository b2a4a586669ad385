//! Frame codec contract.
//!
//! The codec owns the wire byte layout and the header-block compression
//! context. The session feeds it raw transport bytes and drains decoded
//! frames one at a time, matching on the [`Frame`] enum.

use crate::frame::Frame;

/// Codec error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    /// Input bytes do not form a valid frame. Unrecoverable: the decode
    /// state is out of sync with the peer.
    #[error("malformed input: {0}")]
    Malformed(String),
    /// The peer spoke a protocol version this codec does not handle.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    /// Header-block compression or decompression failed.
    #[error("header compression failed: {0}")]
    Compression(String),
}

/// Decoder/encoder for SPDY frames.
///
/// Decoding is pull-based: the session pushes transport bytes in with
/// [`feed`](FrameCodec::feed) and then repeatedly calls
/// [`next_frame`](FrameCodec::next_frame) until it returns `Ok(None)`.
///
/// Stream payload is reported as [`Frame::Data`] chunks; an empty chunk
/// signals end-of-stream (the session re-flags it before delivery).
///
/// A decode error is fatal for the session's read side: the codec is not
/// required to resynchronize after returning `Err`.
pub trait FrameCodec: Send {
    /// Append raw transport bytes to the decode buffer.
    fn feed(&mut self, data: &[u8]);

    /// Decode the next complete frame, if any.
    fn next_frame(&mut self) -> Result<Option<Frame>, CodecError>;

    /// Whether `send` must route this frame through
    /// [`compress_control_frame`](FrameCodec::compress_control_frame).
    /// True for frames carrying a header block (SYN_STREAM, SYN_REPLY,
    /// HEADERS); never true for DATA frames.
    fn is_compressible(&self, frame: &Frame) -> bool;

    /// Compress the frame's header block using the session's shared
    /// compression context. Must only be called from the session driver
    /// thread; the compression context is stateful and ordered.
    fn compress_control_frame(&mut self, frame: Frame) -> Result<Frame, CodecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::Malformed("bad control frame header".to_string());
        assert_eq!(format!("{}", err), "malformed input: bad control frame header");

        let err = CodecError::UnsupportedVersion(3);
        assert_eq!(format!("{}", err), "unsupported protocol version 3");

        let err = CodecError::Compression("zlib stream ended".to_string());
        assert_eq!(format!("{}", err), "header compression failed: zlib stream ended");
    }

    #[test]
    fn test_codec_error_is_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<CodecError>();
    }
}
