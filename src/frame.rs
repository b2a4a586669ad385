//! SPDY frame type definitions.
//!
//! The session engine works entirely in terms of these typed frames; the
//! wire byte layout (and header-block compression state) is owned by the
//! [`FrameCodec`](crate::codec::FrameCodec) collaborator. Decoded frames
//! arrive as a closed enum and are matched exhaustively by the session
//! driver.

use bytes::Bytes;

/// Control frame flags (SPDY draft 2).
pub mod flags {
    /// Last frame on this stream.
    pub const FLAG_FIN: u8 = 0x01;
    /// SYN_STREAM: the stream is unidirectional.
    pub const FLAG_UNIDIRECTIONAL: u8 = 0x02;
}

/// Stream identifier (31 bits, high bit reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct StreamId(pub u32);

impl StreamId {
    /// Stream 0, used for frames that are not associated with any stream.
    pub const ZERO: StreamId = StreamId(0);

    /// Create a new stream ID, masking the reserved bit.
    #[inline]
    pub fn new(id: u32) -> Self {
        StreamId(id & 0x7FFF_FFFF)
    }

    /// Get the raw stream ID value.
    #[inline]
    pub fn value(self) -> u32 {
        self.0
    }

    /// Check if this is a client-initiated stream (odd numbers).
    #[inline]
    pub fn is_client_initiated(self) -> bool {
        self.0 % 2 == 1
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        StreamId::new(id)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RST_STREAM status codes (SPDY draft 2 section 2.7.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StatusCode {
    /// Generic protocol error.
    ProtocolError = 1,
    /// Frame received for a stream that is not active.
    InvalidStream = 2,
    /// Stream refused before any processing was done.
    RefusedStream = 3,
    /// The recipient does not support the indicated protocol version.
    UnsupportedVersion = 4,
    /// The stream is no longer needed.
    Cancel = 5,
    /// Implementation fault in the sender.
    InternalError = 6,
    /// Flow control violated.
    FlowControlError = 7,
}

impl StatusCode {
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1 => Some(StatusCode::ProtocolError),
            2 => Some(StatusCode::InvalidStream),
            3 => Some(StatusCode::RefusedStream),
            4 => Some(StatusCode::UnsupportedVersion),
            5 => Some(StatusCode::Cancel),
            6 => Some(StatusCode::InternalError),
            7 => Some(StatusCode::FlowControlError),
            _ => None,
        }
    }

    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::ProtocolError => write!(f, "PROTOCOL_ERROR"),
            StatusCode::InvalidStream => write!(f, "INVALID_STREAM"),
            StatusCode::RefusedStream => write!(f, "REFUSED_STREAM"),
            StatusCode::UnsupportedVersion => write!(f, "UNSUPPORTED_VERSION"),
            StatusCode::Cancel => write!(f, "CANCEL"),
            StatusCode::InternalError => write!(f, "INTERNAL_ERROR"),
            StatusCode::FlowControlError => write!(f, "FLOW_CONTROL_ERROR"),
        }
    }
}

/// Settings identifiers (SPDY draft 2 section 2.7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SettingId {
    UploadBandwidth = 1,
    DownloadBandwidth = 2,
    RoundTripTime = 3,
    MaxConcurrentStreams = 4,
    CurrentCwnd = 5,
}

/// A single settings entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    pub id: SettingId,
    pub value: u32,
}

/// DATA frame: payload bytes scoped to one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: StreamId,
    pub flags: u8,
    pub data: Bytes,
}

impl DataFrame {
    /// Check whether this frame ends the stream.
    pub fn is_fin(&self) -> bool {
        self.flags & flags::FLAG_FIN != 0
    }
}

/// SYN_STREAM frame: a request to open a new stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynStreamFrame {
    pub stream_id: StreamId,
    /// Parent stream for associated streams, `StreamId::ZERO` if none.
    pub associated_stream_id: StreamId,
    /// 0 is the highest priority.
    pub priority: u8,
    pub flags: u8,
    /// Name/value header block. Uncompressed in the typed model; the
    /// codec compresses it on the way out.
    pub headers: Vec<(Bytes, Bytes)>,
}

/// SYN_REPLY frame: response headers for a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynReplyFrame {
    pub stream_id: StreamId,
    pub flags: u8,
    pub headers: Vec<(Bytes, Bytes)>,
}

/// RST_STREAM frame: abnormal stream termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub stream_id: StreamId,
    pub flags: u8,
    pub status: StatusCode,
}

/// SETTINGS frame: session-wide configuration values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFrame {
    pub settings: Vec<Setting>,
}

/// PING frame: round-trip measurement. Client-initiated pings carry odd
/// ids and must be echoed; even ids belong to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    pub id: u32,
}

impl PingFrame {
    /// Check if this ping was initiated by the client.
    pub fn is_client_initiated(&self) -> bool {
        self.id % 2 == 1
    }
}

/// GOAWAY frame: no further streams will be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub last_accepted_stream_id: StreamId,
}

/// HEADERS frame: additional headers for an existing stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub stream_id: StreamId,
    pub flags: u8,
    pub headers: Vec<(Bytes, Bytes)>,
}

/// WINDOW_UPDATE frame. Not part of SPDY v2; receiving one indicates a
/// protocol version mismatch upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    pub stream_id: StreamId,
    pub delta_window_size: u32,
}

/// A decoded SPDY frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    SynStream(SynStreamFrame),
    SynReply(SynReplyFrame),
    RstStream(RstStreamFrame),
    Settings(SettingsFrame),
    Ping(PingFrame),
    GoAway(GoAwayFrame),
    Headers(HeadersFrame),
    WindowUpdate(WindowUpdateFrame),
}

impl Frame {
    /// Check if this is a control frame (anything but DATA).
    pub fn is_control_frame(&self) -> bool {
        !matches!(self, Frame::Data(_))
    }

    /// The stream this frame belongs to, if any.
    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            Frame::Data(f) => Some(f.stream_id),
            Frame::SynStream(f) => Some(f.stream_id),
            Frame::SynReply(f) => Some(f.stream_id),
            Frame::RstStream(f) => Some(f.stream_id),
            Frame::Headers(f) => Some(f.stream_id),
            Frame::WindowUpdate(f) => Some(f.stream_id),
            Frame::Settings(_) | Frame::Ping(_) | Frame::GoAway(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_masks_reserved_bit() {
        let id = StreamId::new(0xFFFF_FFFF);
        assert_eq!(id.value(), 0x7FFF_FFFF);
    }

    #[test]
    fn test_stream_id_client_initiated() {
        assert!(StreamId::new(1).is_client_initiated());
        assert!(StreamId::new(3).is_client_initiated());
        assert!(!StreamId::new(2).is_client_initiated());
        assert!(!StreamId::ZERO.is_client_initiated());
    }

    #[test]
    fn test_status_code_roundtrip() {
        let codes = [
            StatusCode::ProtocolError,
            StatusCode::InvalidStream,
            StatusCode::RefusedStream,
            StatusCode::UnsupportedVersion,
            StatusCode::Cancel,
            StatusCode::InternalError,
            StatusCode::FlowControlError,
        ];
        for code in codes {
            assert_eq!(StatusCode::from_u32(code.to_u32()), Some(code));
        }
        assert_eq!(StatusCode::from_u32(0), None);
        assert_eq!(StatusCode::from_u32(99), None);
    }

    #[test]
    fn test_status_code_display() {
        assert_eq!(format!("{}", StatusCode::InvalidStream), "INVALID_STREAM");
        assert_eq!(format!("{}", StatusCode::RefusedStream), "REFUSED_STREAM");
    }

    #[test]
    fn test_data_frame_fin() {
        let frame = DataFrame {
            stream_id: StreamId::new(1),
            flags: flags::FLAG_FIN,
            data: Bytes::new(),
        };
        assert!(frame.is_fin());

        let frame = DataFrame {
            stream_id: StreamId::new(1),
            flags: 0,
            data: Bytes::from_static(b"payload"),
        };
        assert!(!frame.is_fin());
    }

    #[test]
    fn test_ping_frame_parity() {
        assert!(PingFrame { id: 1 }.is_client_initiated());
        assert!(!PingFrame { id: 2 }.is_client_initiated());
    }

    #[test]
    fn test_frame_is_control() {
        let data = Frame::Data(DataFrame {
            stream_id: StreamId::new(1),
            flags: 0,
            data: Bytes::new(),
        });
        assert!(!data.is_control_frame());

        let ping = Frame::Ping(PingFrame { id: 1 });
        assert!(ping.is_control_frame());
    }

    #[test]
    fn test_frame_stream_id() {
        let rst = Frame::RstStream(RstStreamFrame {
            stream_id: StreamId::new(7),
            flags: 0,
            status: StatusCode::Cancel,
        });
        assert_eq!(rst.stream_id(), Some(StreamId::new(7)));

        let ping = Frame::Ping(PingFrame { id: 1 });
        assert_eq!(ping.stream_id(), None);
    }
}
