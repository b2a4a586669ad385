//! Session engine metrics.

use metriken::{metric, Counter, Gauge};

#[metric(
    name = "streams_opened",
    description = "Total streams admitted on this process"
)]
pub static STREAMS_OPENED: Counter = Counter::new();

#[metric(
    name = "streams_refused",
    description = "Stream-open requests refused because the concurrency limit was reached"
)]
pub static STREAMS_REFUSED: Counter = Counter::new();

#[metric(
    name = "streams_active",
    description = "Number of currently active streams"
)]
pub static STREAMS_ACTIVE: Gauge = Gauge::new();

#[metric(
    name = "goaway_sent",
    description = "GOAWAY frames sent (at most one per session)"
)]
pub static GOAWAY_SENT: Counter = Counter::new();

#[metric(name = "rst_sent", description = "RST_STREAM frames queued for send")]
pub static RST_SENT: Counter = Counter::new();

#[metric(
    name = "protocol_errors",
    description = "Malformed or out-of-contract frames received"
)]
pub static PROTOCOL_ERRORS: Counter = Counter::new();

#[metric(name = "frames_sent", description = "Frames written to the transport")]
pub static FRAMES_SENT: Counter = Counter::new();

#[metric(name = "frames_received", description = "Frames decoded from the transport")]
pub static FRAMES_RECEIVED: Counter = Counter::new();
