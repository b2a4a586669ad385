//! Application-side stream logic contract.
//!
//! The session knows nothing about what a stream does; it only creates
//! one task per admitted stream via the factory and hands it to the
//! executor. A typical task loops on
//! [`SpdyStream::get_input_frame`](crate::stream::SpdyStream::get_input_frame)
//! and pushes response frames with
//! [`SpdyStream::send_output_frame`](crate::stream::SpdyStream::send_output_frame).

use std::sync::Arc;

use crate::stream::SpdyStream;

/// Per-stream application logic.
///
/// `run` is called once on an executor worker; `cancel` may be called
/// from any thread while `run` is in progress and must only signal
/// (the stream's abort flag already covers the common case).
pub trait StreamTask: Send + Sync {
    fn run(&self);
    fn cancel(&self);
}

/// Creates the task for a newly admitted stream.
///
/// Only ever called from the session driver thread, during admission.
pub trait StreamTaskFactory: Send {
    fn new_stream_task(&self, stream: Arc<SpdyStream>) -> Box<dyn StreamTask>;
}
