//! SPDY session driver.
//!
//! One `SpdySession` per connection. The driver loop runs on a single
//! dedicated thread and alternates between pulling input from the
//! transport (decoding frames and dispatching them to per-stream input
//! queues) and draining the shared output queue back to the transport.
//! Stream tasks run concurrently on the executor's worker threads; the
//! only cross-thread traffic is the stream input queues, the output
//! queue, and a completion channel over which finished tasks report
//! back so the driver can drop their map entries.
//!
//! It would be far nicer to block on "input or output ready" as a single
//! wait; the transport contract gives us no such primitive, so the loop
//! uses an exponential backoff on the output pop (1ms doubling to 30ms)
//! whenever neither side makes progress.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, trace, warn};

use crate::codec::{CodecError, FrameCodec};
use crate::config::SessionConfig;
use crate::executor::{Executor, Task};
use crate::frame::{
    flags, DataFrame, Frame, GoAwayFrame, HeadersFrame, PingFrame, RstStreamFrame, Setting,
    SettingId, SettingsFrame, StatusCode, StreamId, SynReplyFrame, SynStreamFrame,
    WindowUpdateFrame,
};
use crate::io::{ReadStatus, SessionIo, WriteStatus};
use crate::metrics::{
    FRAMES_RECEIVED, FRAMES_SENT, GOAWAY_SENT, PROTOCOL_ERRORS, RST_SENT, STREAMS_ACTIVE,
    STREAMS_OPENED, STREAMS_REFUSED,
};
use crate::queue::OutputQueue;
use crate::stream::SpdyStream;
use crate::task::{StreamTask, StreamTaskFactory};

/// Initial amount of time to block when waiting for output; doubled on
/// every starved iteration, reset whenever any I/O succeeds.
const INIT_OUTPUT_BLOCK_TIME: Duration = Duration::from_millis(1);
/// Maximum time to block when waiting for output.
const MAX_OUTPUT_BLOCK_TIME: Duration = Duration::from_millis(30);

/// Binds one stream to its running task for the executor.
///
/// Dropping the wrapper reports the stream id on the completion channel
/// exactly once; the executor drops it after `run` returns, after
/// cancelling it while still pending, or while draining during `stop`.
/// The driver reaps these messages and removes the map entries, so no
/// worker thread ever touches the stream map.
struct StreamTaskWrapper {
    stream: Arc<SpdyStream>,
    task: Box<dyn StreamTask>,
    finished_tx: Sender<StreamId>,
}

impl Task for StreamTaskWrapper {
    fn run(&self) {
        self.task.run();
    }

    fn cancel(&self) {
        self.task.cancel();
    }
}

impl Drop for StreamTaskWrapper {
    fn drop(&mut self) {
        let _ = self.finished_tx.send(self.stream.stream_id());
    }
}

/// Protocol driver for one multiplexed connection.
pub struct SpdySession {
    config: SessionConfig,
    codec: Box<dyn FrameCodec>,
    io: Box<dyn SessionIo>,
    task_factory: Box<dyn StreamTaskFactory>,
    executor: Arc<dyn Executor>,
    output_queue: Arc<OutputQueue>,
    /// Active streams. Only the driver thread reads or writes this map;
    /// workers report completion over `finished_tx` instead.
    streams: HashMap<StreamId, Arc<SpdyStream>>,
    finished_tx: Sender<StreamId>,
    finished_rx: Receiver<StreamId>,
    no_more_reading: bool,
    session_stopped: bool,
    already_sent_goaway: bool,
    /// Highest client stream id accepted so far; only ever increases.
    last_client_stream_id: StreamId,
}

impl SpdySession {
    pub fn new(
        config: SessionConfig,
        codec: Box<dyn FrameCodec>,
        io: Box<dyn SessionIo>,
        task_factory: Box<dyn StreamTaskFactory>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let (finished_tx, finished_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            codec,
            io,
            task_factory,
            executor,
            output_queue: Arc::new(OutputQueue::new()),
            streams: HashMap::new(),
            finished_tx,
            finished_rx,
            no_more_reading: false,
            session_stopped: false,
            already_sent_goaway: false,
            last_client_stream_id: StreamId::ZERO,
        }
    }

    /// Number of currently active streams (as seen by the driver).
    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    /// Whether the session has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.session_stopped
    }

    /// Whether a GOAWAY frame has been sent on this session.
    pub fn goaway_sent(&self) -> bool {
        self.already_sent_goaway
    }

    /// Drive the session until it stops.
    ///
    /// Returns only once every stream task has been joined and the
    /// stream map is empty.
    pub fn run(&mut self) {
        // Tell the client about our MAX_CONCURRENT_STREAMS limit as soon
        // as the connection opens.
        self.send_settings_frame();

        let mut output_block_time = INIT_OUTPUT_BLOCK_TIME;

        while !self.session_stopped {
            self.reap_finished_streams();

            if self.io.is_connection_aborted() {
                warn!("master connection was aborted");
                self.stop_session();
                break;
            }

            // Step 1: read input from the client. Block only if nothing
            // else in the session could make progress in the meantime.
            if !self.no_more_reading {
                let should_block = self.streams.is_empty() && self.output_queue.is_empty();
                match self.io.read_available(should_block) {
                    ReadStatus::Data(data) => {
                        self.process_input(&data);
                        output_block_time = INIT_OUTPUT_BLOCK_TIME;
                    }
                    ReadStatus::NoData => {}
                    ReadStatus::Closed | ReadStatus::Error => {
                        self.no_more_reading = true;
                    }
                }
            }

            // Step 2: send output to the client. With no active streams
            // no new output can appear, so don't wait for any.
            let no_active_streams = self.streams.is_empty();
            let popped = if no_active_streams {
                self.output_queue.try_pop()
            } else {
                self.output_queue.pop_timeout(output_block_time)
            };

            match popped {
                Some(frame) => {
                    // Flush every immediately-available frame before
                    // going back to the input side.
                    self.send_frame(frame);
                    while !self.session_stopped {
                        match self.output_queue.try_pop() {
                            Some(frame) => self.send_frame(frame),
                            None => break,
                        }
                    }
                    output_block_time = INIT_OUTPUT_BLOCK_TIME;
                }
                None => {
                    // The queue is empty; if no more streams can be
                    // created and none remain, the session is done.
                    if (self.already_sent_goaway || self.no_more_reading) && no_active_streams {
                        self.stop_session();
                    } else {
                        output_block_time =
                            std::cmp::min(MAX_OUTPUT_BLOCK_TIME, output_block_time * 2);
                    }
                }
            }
        }
    }

    /// Feed transport bytes to the codec and dispatch every decoded frame.
    fn process_input(&mut self, data: &[u8]) {
        self.codec.feed(data);
        while !self.session_stopped {
            match self.codec.next_frame() {
                Ok(Some(frame)) => {
                    FRAMES_RECEIVED.increment();
                    self.handle_frame(frame);
                }
                Ok(None) => break,
                Err(err) => {
                    self.on_codec_error(&err);
                    break;
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Data(frame) => self.on_data(frame),
            Frame::SynStream(frame) => self.on_syn_stream(frame),
            Frame::SynReply(frame) => self.on_syn_reply(frame),
            Frame::RstStream(frame) => self.on_rst_stream(frame),
            Frame::Settings(frame) => self.on_settings(frame),
            Frame::Ping(frame) => self.on_ping(frame),
            Frame::GoAway(frame) => self.on_goaway(frame),
            Frame::Headers(frame) => self.on_headers(frame),
            Frame::WindowUpdate(frame) => self.on_window_update(frame),
        }
    }

    /// A decode error leaves the read side out of sync with the peer;
    /// nothing further can be read.
    fn on_codec_error(&mut self, err: &CodecError) {
        PROTOCOL_ERRORS.increment();
        error!(error = %err, "session error");
        self.send_goaway_frame();
        self.no_more_reading = true;
    }

    fn on_data(&mut self, frame: DataFrame) {
        if let Some(stream) = self.streams.get(&frame.stream_id) {
            trace!(stream_id = %frame.stream_id, length = frame.data.len(), "received DATA");
            // Re-wrap the payload uncompressed; an empty payload is the
            // codec's way of signaling end-of-stream.
            let data_flags = if frame.data.is_empty() {
                flags::FLAG_FIN
            } else {
                0
            };
            stream.post_input_frame(Frame::Data(DataFrame {
                stream_id: frame.stream_id,
                flags: data_flags,
                data: frame.data,
            }));
            return;
        }

        // End-of-stream signaling for an already-closed stream is benign
        // (the FIN may have arrived on an earlier control frame).
        if frame.data.is_empty() {
            return;
        }

        PROTOCOL_ERRORS.increment();
        warn!(
            stream_id = %frame.stream_id,
            length = frame.data.len(),
            "client sent DATA for nonexistent stream"
        );
        self.send_rst_stream_frame(frame.stream_id, StatusCode::InvalidStream);
    }

    fn on_syn_stream(&mut self, frame: SynStreamFrame) {
        // New streams must be ignored entirely after a GOAWAY.
        if self.already_sent_goaway {
            return;
        }

        if frame.flags & !(flags::FLAG_FIN | flags::FLAG_UNIDIRECTIONAL) != 0 {
            PROTOCOL_ERRORS.increment();
            warn!(
                flags = frame.flags,
                "client sent SYN_STREAM with invalid flags; sending GOAWAY"
            );
            self.send_goaway_frame();
            return;
        }

        let stream_id = frame.stream_id;

        // Client stream ids must be odd-numbered.
        if !stream_id.is_client_initiated() {
            PROTOCOL_ERRORS.increment();
            warn!(%stream_id, "client sent SYN_STREAM for even stream id; sending GOAWAY");
            self.send_goaway_frame();
            return;
        }

        // Client stream ids must be strictly increasing. Older clients
        // get this wrong, so rejection is opt-in.
        if stream_id <= self.last_client_stream_id {
            PROTOCOL_ERRORS.increment();
            warn!(
                %stream_id,
                last = %self.last_client_stream_id,
                "client sent SYN_STREAM for non-increasing stream id"
            );
            if self.config.strict_stream_id_ordering {
                self.abort_stream(stream_id, StatusCode::ProtocolError);
                return;
            }
        }

        if self.streams.contains_key(&stream_id) {
            PROTOCOL_ERRORS.increment();
            warn!(%stream_id, "client sent SYN_STREAM for duplicate stream id; sending GOAWAY");
            self.send_goaway_frame();
            return;
        }

        // Limit the number of simultaneously open streams.
        if self.streams.len() >= self.config.max_streams_per_connection {
            STREAMS_REFUSED.increment();
            debug!(%stream_id, "refusing stream: too many active streams");
            self.send_rst_stream_frame(stream_id, StatusCode::RefusedStream);
            return;
        }

        // Initiate the stream.
        self.last_client_stream_id = std::cmp::max(self.last_client_stream_id, stream_id);
        let priority = frame.priority;
        let stream = Arc::new(SpdyStream::new(
            stream_id,
            frame.associated_stream_id,
            priority,
            self.output_queue.clone(),
        ));
        let task = self.task_factory.new_stream_task(stream.clone());
        self.streams.insert(stream_id, stream.clone());
        STREAMS_OPENED.increment();
        STREAMS_ACTIVE.increment();
        // The stream task sees the open request as its first input frame.
        stream.post_input_frame(Frame::SynStream(frame));

        debug!(%stream_id, "received SYN_STREAM; opening stream");
        // All session bookkeeping is done before submission: an inline
        // executor will run the task to completion right here.
        let wrapper = Arc::new(StreamTaskWrapper {
            stream,
            task,
            finished_tx: self.finished_tx.clone(),
        });
        self.executor.add_task(wrapper, priority);
    }

    fn on_syn_reply(&mut self, frame: SynReplyFrame) {
        // The server does not initiate streams, so there is nothing for
        // the client to reply to.
        debug!(stream_id = %frame.stream_id, "ignoring SYN_REPLY from client");
    }

    fn on_rst_stream(&mut self, frame: RstStreamFrame) {
        // RST_STREAM defines no flags. Tell the client to go away, but
        // still honor the reset itself.
        if frame.flags != 0 {
            PROTOCOL_ERRORS.increment();
            warn!(
                flags = frame.flags,
                "client sent RST_STREAM with invalid flags; sending GOAWAY"
            );
            self.send_goaway_frame();
        }

        let stream_id = frame.stream_id;
        match frame.status {
            // Totally benign reasons to abort a stream.
            StatusCode::RefusedStream | StatusCode::Cancel => {
                debug!(%stream_id, "client cancelled/refused stream");
                self.abort_stream_silently(stream_id);
            }
            // A protocol error means the session is probably beyond
            // saving.
            StatusCode::ProtocolError => {
                warn!(
                    %stream_id,
                    "client sent RST_STREAM with PROTOCOL_ERROR; aborting stream and sending GOAWAY"
                );
                self.abort_stream_silently(stream_id);
                self.send_goaway_frame();
            }
            status => {
                warn!(%stream_id, %status, "client sent RST_STREAM; aborting stream");
                self.abort_stream_silently(stream_id);
            }
        }
    }

    fn on_settings(&mut self, frame: SettingsFrame) {
        // The server does not yet act on client-advertised limits.
        for setting in &frame.settings {
            trace!(id = ?setting.id, value = setting.value, "received SETTING");
        }
    }

    fn on_ping(&mut self, frame: PingFrame) {
        trace!(id = frame.id, "received PING frame");
        // Odd-numbered pings were initiated by the client and are echoed
        // back verbatim; even-numbered pings would have to be answers to
        // pings we sent, which we never do.
        if frame.is_client_initiated() {
            self.send_frame_raw(&Frame::Ping(frame));
        }
    }

    fn on_goaway(&mut self, frame: GoAwayFrame) {
        // Without server push there is nothing to wind down on our side.
        trace!(
            last_accepted_stream_id = %frame.last_accepted_stream_id,
            "received GOAWAY frame"
        );
    }

    fn on_headers(&mut self, frame: HeadersFrame) {
        if let Some(stream) = self.streams.get(&frame.stream_id) {
            trace!(stream_id = %frame.stream_id, "received HEADERS frame");
            stream.post_input_frame(Frame::Headers(frame));
            return;
        }

        PROTOCOL_ERRORS.increment();
        warn!(stream_id = %frame.stream_id, "client sent HEADERS for nonexistent stream");
        self.send_rst_stream_frame(frame.stream_id, StatusCode::InvalidStream);
    }

    fn on_window_update(&mut self, frame: WindowUpdateFrame) {
        // WINDOW_UPDATE does not exist in this protocol version; seeing
        // one means the codec and session disagree about the version.
        error!(
            stream_id = %frame.stream_id,
            "got a WINDOW_UPDATE frame on a v2 session"
        );
    }

    /// Compress (if applicable) and send one frame.
    fn send_frame(&mut self, frame: Frame) {
        if self.codec.is_compressible(&frame) {
            debug_assert!(frame.is_control_frame());
            match self.codec.compress_control_frame(frame) {
                Ok(compressed) => self.send_frame_raw(&compressed),
                Err(err) => {
                    error!(error = %err, "frame compression failed");
                    self.stop_session();
                }
            }
        } else {
            self.send_frame_raw(&frame);
        }
    }

    fn send_frame_raw(&mut self, frame: &Frame) {
        match self.io.send_frame_raw(frame) {
            WriteStatus::Success => {
                FRAMES_SENT.increment();
            }
            WriteStatus::ConnectionClosed => {
                // Nothing can be written anymore; there's little point
                // in continuing the session.
                self.stop_session();
            }
        }
    }

    /// Send a GOAWAY frame, once per session; later triggers are no-ops.
    fn send_goaway_frame(&mut self) {
        if !self.already_sent_goaway {
            self.already_sent_goaway = true;
            GOAWAY_SENT.increment();
            let frame = Frame::GoAway(GoAwayFrame {
                last_accepted_stream_id: self.last_client_stream_id,
            });
            self.send_frame(frame);
        }
    }

    /// Queue an urgent RST_STREAM, ahead of all pending normal output.
    fn send_rst_stream_frame(&self, stream_id: StreamId, status: StatusCode) {
        RST_SENT.increment();
        self.output_queue.push_front(Frame::RstStream(RstStreamFrame {
            stream_id,
            flags: 0,
            status,
        }));
    }

    fn send_settings_frame(&mut self) {
        let frame = Frame::Settings(SettingsFrame {
            settings: vec![Setting {
                id: SettingId::MaxConcurrentStreams,
                value: self.config.max_streams_per_connection as u32,
            }],
        });
        self.send_frame(frame);
    }

    /// Stop the session: abort every live stream, then stop the executor,
    /// which blocks until all currently running stream tasks have exited.
    fn stop_session(&mut self) {
        self.session_stopped = true;
        for stream in self.streams.values() {
            stream.abort();
        }
        // Since we just aborted all streams, the join should be quick.
        self.executor.stop();
        // Every wrapper has been dropped by now; clear the map.
        self.reap_finished_streams();
    }

    /// Abort the stream without sending anything to the client.
    fn abort_stream_silently(&self, stream_id: StreamId) {
        if let Some(stream) = self.streams.get(&stream_id) {
            stream.abort();
        }
    }

    /// Send a RST_STREAM frame and then abort the stream.
    fn abort_stream(&self, stream_id: StreamId, status: StatusCode) {
        self.send_rst_stream_frame(stream_id, status);
        self.abort_stream_silently(stream_id);
    }

    /// Remove map entries for streams whose tasks have finished. This is
    /// the only way entries leave the map while the session runs.
    fn reap_finished_streams(&mut self) {
        while let Ok(stream_id) = self.finished_rx.try_recv() {
            debug!(%stream_id, "closing stream");
            if self.streams.remove(&stream_id).is_some() {
                STREAMS_ACTIVE.decrement();
            }
        }
    }
}
