//! Per-stream state.
//!
//! A `SpdyStream` is shared between the session driver (which posts
//! decoded input frames and signals aborts) and the stream task running
//! on an executor worker (which consumes input and produces output
//! frames). Its input queue is internally synchronized; the output side
//! goes through the session-wide [`OutputQueue`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::frame::{Frame, StreamId};
use crate::queue::OutputQueue;

/// One logical flow multiplexed over the shared connection.
pub struct SpdyStream {
    stream_id: StreamId,
    associated_stream_id: StreamId,
    priority: u8,
    input: Mutex<VecDeque<Frame>>,
    input_available: Condvar,
    aborted: AtomicBool,
    output: Arc<OutputQueue>,
}

impl SpdyStream {
    pub fn new(
        stream_id: StreamId,
        associated_stream_id: StreamId,
        priority: u8,
        output: Arc<OutputQueue>,
    ) -> Self {
        Self {
            stream_id,
            associated_stream_id,
            priority,
            input: Mutex::new(VecDeque::new()),
            input_available: Condvar::new(),
            aborted: AtomicBool::new(false),
            output,
        }
    }

    /// The immutable id assigned at admission.
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Parent stream id, `StreamId::ZERO` if this stream has no parent.
    pub fn associated_stream_id(&self) -> StreamId {
        self.associated_stream_id
    }

    /// SPDY priority; 0 is the most urgent.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Whether the stream has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Queue a decoded frame for the stream task. Called by the session
    /// driver; cheap and non-blocking.
    pub fn post_input_frame(&self, frame: Frame) {
        let mut input = self.input.lock().expect("stream input queue poisoned");
        input.push_back(frame);
        self.input_available.notify_one();
    }

    /// Take the next input frame. With `block` set, waits until a frame
    /// arrives or the stream is aborted; otherwise returns immediately.
    /// Returns `None` once the stream is aborted or (non-blocking) when
    /// the queue is empty.
    pub fn get_input_frame(&self, block: bool) -> Option<Frame> {
        let mut input = self.input.lock().expect("stream input queue poisoned");
        loop {
            if self.is_aborted() {
                return None;
            }
            if let Some(frame) = input.pop_front() {
                return Some(frame);
            }
            if !block {
                return None;
            }
            input = self
                .input_available
                .wait(input)
                .expect("stream input queue poisoned");
        }
    }

    /// Take the next input frame, waiting up to `timeout`.
    pub fn get_input_frame_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = std::time::Instant::now() + timeout;
        let mut input = self.input.lock().expect("stream input queue poisoned");
        loop {
            if self.is_aborted() {
                return None;
            }
            if let Some(frame) = input.pop_front() {
                return Some(frame);
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .input_available
                .wait_timeout(input, deadline - now)
                .expect("stream input queue poisoned");
            input = guard;
        }
    }

    /// Queue a response frame for the connection, at normal priority.
    pub fn send_output_frame(&self, frame: Frame) {
        self.output.push_back(frame);
    }

    /// Signal the stream task to stop. Wakes any blocked input pop.
    /// Idempotent; nothing is sent to the client.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.input_available.notify_all();
    }
}

impl std::fmt::Debug for SpdyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpdyStream")
            .field("stream_id", &self.stream_id)
            .field("priority", &self.priority)
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PingFrame;
    use std::thread;

    fn stream(id: u32) -> SpdyStream {
        SpdyStream::new(
            StreamId::new(id),
            StreamId::ZERO,
            0,
            Arc::new(OutputQueue::new()),
        )
    }

    fn ping(id: u32) -> Frame {
        Frame::Ping(PingFrame { id })
    }

    #[test]
    fn test_input_frames_delivered_in_order() {
        let stream = stream(1);
        stream.post_input_frame(ping(1));
        stream.post_input_frame(ping(2));

        assert_eq!(stream.get_input_frame(false), Some(ping(1)));
        assert_eq!(stream.get_input_frame(false), Some(ping(2)));
        assert_eq!(stream.get_input_frame(false), None);
    }

    #[test]
    fn test_abort_wakes_blocked_pop() {
        let stream = Arc::new(stream(1));
        let waiter = {
            let stream = stream.clone();
            thread::spawn(move || stream.get_input_frame(true))
        };

        thread::sleep(Duration::from_millis(10));
        stream.abort();

        assert_eq!(waiter.join().unwrap(), None);
        assert!(stream.is_aborted());
    }

    #[test]
    fn test_blocking_pop_receives_frame() {
        let stream = Arc::new(stream(1));
        let waiter = {
            let stream = stream.clone();
            thread::spawn(move || stream.get_input_frame(true))
        };

        thread::sleep(Duration::from_millis(10));
        stream.post_input_frame(ping(7));

        assert_eq!(waiter.join().unwrap(), Some(ping(7)));
    }

    #[test]
    fn test_aborted_stream_returns_none_even_with_input() {
        let stream = stream(1);
        stream.post_input_frame(ping(1));
        stream.abort();
        assert_eq!(stream.get_input_frame(false), None);
    }

    #[test]
    fn test_timeout_pop_expires() {
        let stream = stream(1);
        let got = stream.get_input_frame_timeout(Duration::from_millis(10));
        assert_eq!(got, None);
    }

    #[test]
    fn test_output_goes_to_shared_queue() {
        let output = Arc::new(OutputQueue::new());
        let stream = SpdyStream::new(StreamId::new(1), StreamId::ZERO, 0, output.clone());
        stream.send_output_frame(ping(5));
        assert_eq!(output.try_pop(), Some(ping(5)));
    }

    #[test]
    fn test_attributes() {
        let stream = SpdyStream::new(
            StreamId::new(3),
            StreamId::new(1),
            2,
            Arc::new(OutputQueue::new()),
        );
        assert_eq!(stream.stream_id(), StreamId::new(3));
        assert_eq!(stream.associated_stream_id(), StreamId::new(1));
        assert_eq!(stream.priority(), 2);
        assert!(!stream.is_aborted());
    }
}
