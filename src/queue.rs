//! Thread-safe FIFO of outbound frames.
//!
//! Shared between the session driver (the only consumer) and every
//! stream task (producers). Urgent control frames (RST_STREAM) are
//! prepended so they preempt queued normal traffic.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::frame::Frame;

/// FIFO of frames waiting to be sent on the connection.
///
/// `push_front` items are always dequeued before previously-enqueued
/// `push_back` items; `push_back` items preserve FIFO order among
/// themselves. No ordering is guaranteed between racing `push_front`
/// calls.
#[derive(Default)]
pub struct OutputQueue {
    queue: Mutex<VecDeque<Frame>>,
    available: Condvar,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Append a frame at normal priority.
    pub fn push_back(&self, frame: Frame) {
        let mut queue = self.queue.lock().expect("output queue poisoned");
        queue.push_back(frame);
        self.available.notify_one();
    }

    /// Prepend an urgent frame, to be sent before all queued frames.
    pub fn push_front(&self, frame: Frame) {
        let mut queue = self.queue.lock().expect("output queue poisoned");
        queue.push_front(frame);
        self.available.notify_one();
    }

    /// Dequeue the next frame without blocking.
    pub fn try_pop(&self) -> Option<Frame> {
        let mut queue = self.queue.lock().expect("output queue poisoned");
        queue.pop_front()
    }

    /// Dequeue the next frame, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let mut queue = self.queue.lock().expect("output queue poisoned");
        if let Some(frame) = queue.pop_front() {
            return Some(frame);
        }
        // Condvar wakeups can be spurious; re-check under a deadline.
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let now = std::time::Instant::now();
            if now >= deadline {
                return queue.pop_front();
            }
            let (guard, result) = self
                .available
                .wait_timeout(queue, deadline - now)
                .expect("output queue poisoned");
            queue = guard;
            if let Some(frame) = queue.pop_front() {
                return Some(frame);
            }
            if result.timed_out() {
                return None;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().expect("output queue poisoned").is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().expect("output queue poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PingFrame;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn ping(id: u32) -> Frame {
        Frame::Ping(PingFrame { id })
    }

    fn ping_id(frame: &Frame) -> u32 {
        match frame {
            Frame::Ping(f) => f.id,
            other => panic!("expected ping, got {:?}", other),
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = OutputQueue::new();
        queue.push_back(ping(1));
        queue.push_back(ping(2));
        queue.push_back(ping(3));

        assert_eq!(ping_id(&queue.try_pop().unwrap()), 1);
        assert_eq!(ping_id(&queue.try_pop().unwrap()), 2);
        assert_eq!(ping_id(&queue.try_pop().unwrap()), 3);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_push_front_preempts() {
        let queue = OutputQueue::new();
        queue.push_back(ping(1));
        queue.push_back(ping(2));
        queue.push_front(ping(99));

        assert_eq!(ping_id(&queue.try_pop().unwrap()), 99);
        assert_eq!(ping_id(&queue.try_pop().unwrap()), 1);
        assert_eq!(ping_id(&queue.try_pop().unwrap()), 2);
    }

    #[test]
    fn test_is_empty_and_len() {
        let queue = OutputQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);

        queue.push_back(ping(1));
        assert!(!queue.is_empty());
        assert_eq!(queue.len(), 1);

        queue.try_pop();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_timeout_times_out() {
        let queue = OutputQueue::new();
        let start = Instant::now();
        let frame = queue.pop_timeout(Duration::from_millis(20));
        assert!(frame.is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_pop_timeout_returns_immediately_when_nonempty() {
        let queue = OutputQueue::new();
        queue.push_back(ping(1));
        let start = Instant::now();
        let frame = queue.pop_timeout(Duration::from_secs(5));
        assert_eq!(ping_id(&frame.unwrap()), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_pop_timeout_wakes_on_cross_thread_push() {
        let queue = Arc::new(OutputQueue::new());
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                queue.push_back(ping(42));
            })
        };

        let frame = queue.pop_timeout(Duration::from_secs(5));
        assert_eq!(ping_id(&frame.unwrap()), 42);
        producer.join().unwrap();
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(OutputQueue::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let queue = queue.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    queue.push_back(ping(t * 1000 + i));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 400);
    }
}
