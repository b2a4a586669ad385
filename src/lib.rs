//! spdy-session - SPDY session engine for thread-per-connection servers.
//!
//! This crate multiplexes a single client connection into many
//! concurrent streams. A dedicated driver thread per connection decodes
//! frames off the transport, routes them to per-stream input queues,
//! and drains a shared output queue back to the wire, while per-stream
//! application tasks run on a worker-thread executor. It does not use
//! async/await or tokio.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `frame`: typed SPDY frames, stream ids, status codes
//! - `codec`: the wire encode/decode and compression contract
//! - `io`: the transport read/write contract
//! - `session`: the per-connection driver loop and frame dispatch
//! - `stream`: per-stream state shared between driver and task
//! - `queue`: the session-wide output queue
//! - `executor`: priority-ordered worker-thread task execution
//! - `task`: the application-side stream logic contract
//!
//! The host provides implementations of [`SessionIo`], [`FrameCodec`],
//! and [`StreamTaskFactory`], then calls [`SpdySession::run`] on the
//! connection's thread.

pub mod codec;
pub mod config;
pub mod executor;
pub mod frame;
pub mod io;
pub mod metrics;
pub mod queue;
pub mod session;
pub mod stream;
pub mod task;

// Re-export commonly used types
pub use codec::{CodecError, FrameCodec};
pub use config::SessionConfig;
pub use executor::{Executor, InlineExecutor, Task, ThreadPoolExecutor};
pub use frame::{
    DataFrame, Frame, GoAwayFrame, HeadersFrame, PingFrame, RstStreamFrame, Setting, SettingId,
    SettingsFrame, StatusCode, StreamId, SynReplyFrame, SynStreamFrame, WindowUpdateFrame,
};
pub use io::{ReadStatus, SessionIo, WriteStatus};
pub use queue::OutputQueue;
pub use session::SpdySession;
pub use stream::SpdyStream;
pub use task::{StreamTask, StreamTaskFactory};
