//! Byte-stream transport beneath the protocol layer.
//!
//! [`StreamTransport`] owns one TCP-like connection's full lifecycle:
//! establishing it (with a one-shot redirect override), queueing outbound
//! writes, metering throughput, and tearing it down. The protocol layer
//! above implements [`StreamHandler`] and is driven through its lifecycle
//! hooks; it never touches the stream handle directly.
//!
//! The single most important contract here is the difference between
//! [`StreamTransport::disconnect`] (final: no close hook runs, nothing will
//! reconnect) and a deferred destroy (the close hook runs and the owner's
//! policy decides whether and when to resume).

use crate::config::Target;
use crate::error::{Result, StratumError};
use crate::events::{Notifier, SessionEvent};
use crate::timer::{TimerKind, TimerSet};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use std::collections::VecDeque;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

const READ_CHUNK: usize = 4096;

/// Minimum elapsed time between throughput samples; anything shorter is
/// skipped without updating the meter.
const SAMPLE_RESOLUTION: Duration = Duration::from_millis(110);

/// Byte stream the transport drives. `TcpStream` in production, in-memory
/// duplex pipes in tests.
pub trait Wire: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Wire for T {}

/// Establishes byte streams to a target. The seam that lets tests hand the
/// transport a scripted in-memory stream instead of a real socket.
#[async_trait]
pub trait Connector: Send {
    async fn connect(&mut self, target: &Target) -> io::Result<Box<dyn Wire>>;
}

/// Production connector: plain TCP with keep-alive and no-delay preferences.
pub struct TcpConnector {
    pub keepalive: bool,
    pub nodelay: bool,
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&mut self, target: &Target) -> io::Result<Box<dyn Wire>> {
        let stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
        if self.nodelay {
            stream.set_nodelay(true)?;
        }
        if self.keepalive {
            // tokio does not expose SO_KEEPALIVE
            socket2::SockRef::from(&stream).set_keepalive(true)?;
        }
        Ok(Box::new(stream))
    }
}

/// What the transport observed while waiting.
#[derive(Debug)]
pub enum TransportEvent {
    /// Bytes arrived on the stream.
    Data(Bytes),
    /// Remote host closed the connection.
    Eof,
    /// The stream failed.
    IoError(io::Error),
    /// A named timer fired.
    Timer(TimerKind),
}

/// Action queued for after the current callback finishes, so notification
/// delivery is never interleaved with socket teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    /// Tear the stream down and run the owner's close hook.
    Destroy { had_error: bool },
    /// Start a connection attempt.
    Connect,
}

/// Lifecycle hooks the protocol layer implements.
///
/// The defaults for `on_timeout` and `on_error` force-destroy the stream;
/// a handler that does not care must still never hang on a dead connection.
pub trait StreamHandler {
    /// Runs synchronously before a connection attempt; an error aborts the
    /// attempt without opening a socket.
    fn before_connect(&mut self, _transport: &mut StreamTransport) -> Result<()> {
        Ok(())
    }

    /// The stream is established.
    fn on_connect(&mut self, _transport: &mut StreamTransport) {}

    /// Bytes arrived.
    fn on_data(&mut self, transport: &mut StreamTransport, bytes: &[u8]);

    /// The remote host closed its end.
    fn on_end(&mut self, _transport: &mut StreamTransport) {}

    /// The stream is about to be torn down, final close or not. Runs before
    /// any disconnect notification is emitted.
    fn before_disconnect(&mut self, _transport: &mut StreamTransport) {}

    /// The stream is fully closed; decide whether to reconnect.
    fn on_close(&mut self, transport: &mut StreamTransport, had_error: bool);

    /// A timeout elapsed while the connection should have made progress.
    fn on_timeout(&mut self, transport: &mut StreamTransport) {
        transport.defer_destroy(true);
    }

    /// The stream reported an error.
    fn on_error(&mut self, transport: &mut StreamTransport, _err: &io::Error) {
        transport.defer_destroy(true);
    }

    /// A named timer owned by the protocol layer fired.
    fn on_timer(&mut self, _transport: &mut StreamTransport, _kind: TimerKind) {}
}

/// Smoothed up/down throughput plus lifetime totals.
#[derive(Debug)]
pub struct NetMeter {
    up_speed: u64,
    down_speed: u64,
    total_in: u64,
    total_out: u64,
    marked_in: u64,
    marked_out: u64,
    last_sample: Instant,
}

impl NetMeter {
    fn new() -> Self {
        Self {
            up_speed: 0,
            down_speed: 0,
            total_in: 0,
            total_out: 0,
            marked_in: 0,
            marked_out: 0,
            last_sample: Instant::now(),
        }
    }

    /// Begin a fresh measurement window (on connect).
    fn reset_window(&mut self) {
        self.marked_in = 0;
        self.marked_out = 0;
        self.last_sample = Instant::now();
    }

    /// Fold the byte counters since the last sample into the moving
    /// averages. Samples closer together than the resolution are skipped.
    fn sample(&mut self, connected: bool, bytes_in: u64, bytes_out: u64) {
        if !connected {
            self.up_speed = 0;
            self.down_speed = 0;
        }
        let now = Instant::now();
        let elapsed = now - self.last_sample;
        if elapsed < SAMPLE_RESOLUTION {
            return;
        }
        let secs = elapsed.as_secs_f64();
        let up = bytes_out.saturating_sub(self.marked_out);
        let down = bytes_in.saturating_sub(self.marked_in);

        self.up_speed = smooth(self.up_speed, up as f64 / secs);
        self.down_speed = smooth(self.down_speed, down as f64 / secs);
        self.marked_out = bytes_out;
        self.marked_in = bytes_in;
        self.total_out += up;
        self.total_in += down;
        self.last_sample = now;
    }

    /// Average upload speed in bytes/s.
    pub fn up_speed(&self) -> u64 {
        self.up_speed
    }

    /// Average download speed in bytes/s.
    pub fn down_speed(&self) -> u64 {
        self.down_speed
    }

    /// Total bytes received over the transport's lifetime.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Total bytes sent over the transport's lifetime.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }
}

/// Exponential moving average with factor 0.5; readings below 1 byte/s are
/// noise and floor to exactly 0.
fn smooth(previous: u64, instant: f64) -> u64 {
    let value = ((previous as f64 + instant) / 2.0) as u64;
    if value < 1 {
        0
    } else {
        value
    }
}

/// One TCP-like byte stream with lifecycle, write queue and telemetry.
pub struct StreamTransport {
    target: Target,
    redirect: Option<Target>,
    connector: Box<dyn Connector>,
    connect_timeout: Duration,
    sample_period: Duration,
    log_outgoing: bool,

    wire: Option<Box<dyn Wire>>,
    connected: bool,
    read_buf: BytesMut,
    outbox: VecDeque<String>,
    deferred: VecDeque<Deferred>,
    bytes_in: u64,
    bytes_out: u64,
    meter: NetMeter,

    /// Named timers shared with the protocol layer.
    pub timers: TimerSet,
    /// Status/error tracking and event delivery.
    pub notifier: Notifier,
}

impl StreamTransport {
    pub fn new(
        target: Target,
        connector: Box<dyn Connector>,
        notifier: Notifier,
        connect_timeout: Duration,
        sample_period: Duration,
        log_outgoing: bool,
    ) -> Self {
        Self {
            target,
            redirect: None,
            connector,
            connect_timeout,
            sample_period,
            log_outgoing,
            wire: None,
            connected: false,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            outbox: VecDeque::new(),
            deferred: VecDeque::new(),
            bytes_in: 0,
            bytes_out: 0,
            meter: NetMeter::new(),
            timers: TimerSet::new(),
            notifier,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn meter(&self) -> &NetMeter {
        &self.meter
    }

    /// Store a one-shot redirect target; consumed by the next connect.
    pub fn set_redirect(&mut self, target: Target) {
        self.redirect = Some(target);
    }

    pub fn redirect_pending(&self) -> bool {
        self.redirect.is_some()
    }

    /// Effective target for the next attempt. A pending redirect wins and is
    /// consumed here even if the attempt fails, so subsequent reconnects go
    /// back to the configured target.
    fn resolve_target(&mut self) -> Target {
        self.redirect.take().unwrap_or_else(|| self.target.clone())
    }

    /// Open the stream to the effective target. Emits `Connected`, cancels
    /// any pending reconnect timer and starts the throughput sampler.
    pub async fn establish(&mut self) -> io::Result<()> {
        let target = self.resolve_target();
        self.notifier
            .set_status(format!("Connecting to {}:{}", target.host, target.port));

        let wire = tokio::time::timeout(self.connect_timeout, self.connector.connect(&target))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;

        self.wire = Some(wire);
        self.connected = true;
        self.bytes_in = 0;
        self.bytes_out = 0;
        self.meter.reset_window();
        self.timers.cancel(TimerKind::Reconnect);
        if !self.sample_period.is_zero() {
            self.timers
                .arm_periodic(TimerKind::ThroughputSample, self.sample_period);
        }
        self.notifier.emit(SessionEvent::Connected);
        Ok(())
    }

    /// Serialize a payload to one CRLF-terminated line and queue it.
    pub fn send_json<T: Serialize>(&mut self, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(text) => self.enqueue(text + "\r\n"),
            Err(e) => self.notifier.set_error(StratumError::from(e).to_string()),
        }
    }

    /// Queue raw text as-is.
    pub fn send_raw(&mut self, payload: &str) {
        self.enqueue(payload.to_string());
    }

    fn enqueue(&mut self, line: String) {
        if !self.connected {
            self.notifier.set_error(
                StratumError::Connection("can not send data to closed connection".to_string())
                    .to_string(),
            );
            return;
        }
        if self.log_outgoing {
            debug!(tx = %line.trim_end(), "outgoing");
        }
        self.outbox.push_back(line);
    }

    /// Write out everything queued. Not part of the select loop, so it is
    /// never canceled mid-write.
    pub async fn flush(&mut self) -> io::Result<()> {
        while let Some(line) = self.outbox.front() {
            let Some(wire) = self.wire.as_mut() else {
                self.outbox.clear();
                return Ok(());
            };
            wire.write_all(line.as_bytes()).await?;
            self.bytes_out += line.len() as u64;
            self.outbox.pop_front();
        }
        if let Some(wire) = self.wire.as_mut() {
            wire.flush().await?;
        }
        Ok(())
    }

    /// Wait for the next thing to happen: inbound bytes, stream end or
    /// failure, or a timer firing. Pends forever when there is nothing to
    /// wait for (no stream, no timers); caller commands still interrupt it.
    pub async fn next_event(&mut self) -> TransportEvent {
        loop {
            if let Some(kind) = self.timers.fire_due(Instant::now()) {
                return TransportEvent::Timer(kind);
            }
            let deadline = self.timers.next_deadline();

            if let Some(wire) = self.wire.as_mut() {
                self.read_buf.reserve(READ_CHUNK);
                let read = match deadline {
                    Some(when) => tokio::select! {
                        read = wire.read_buf(&mut self.read_buf) => Some(read),
                        _ = tokio::time::sleep_until(when) => None,
                    },
                    None => Some(wire.read_buf(&mut self.read_buf).await),
                };
                match read {
                    None => continue, // a timer is due; picked up above
                    Some(Ok(0)) => return TransportEvent::Eof,
                    Some(Ok(n)) => {
                        self.bytes_in += n as u64;
                        return TransportEvent::Data(self.read_buf.split().freeze());
                    }
                    Some(Err(e)) => return TransportEvent::IoError(e),
                }
            } else if let Some(when) = deadline {
                tokio::time::sleep_until(when).await;
            } else {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Queue a destroy. Idempotent within one processing step: the first
    /// queued destroy (and its had-error flag) wins.
    pub fn defer_destroy(&mut self, had_error: bool) {
        if self
            .deferred
            .iter()
            .any(|d| matches!(d, Deferred::Destroy { .. }))
        {
            return;
        }
        self.deferred.push_back(Deferred::Destroy { had_error });
    }

    /// Queue an immediate connection attempt.
    pub fn defer_connect(&mut self) {
        self.deferred.push_back(Deferred::Connect);
    }

    pub fn take_deferred(&mut self) -> Option<Deferred> {
        self.deferred.pop_front()
    }

    /// Take a final throughput sample and stop the sampler.
    fn stop_sampler(&mut self) {
        if self.timers.is_armed(TimerKind::ThroughputSample) {
            self.timers.cancel(TimerKind::ThroughputSample);
            self.meter.sample(false, self.bytes_in, self.bytes_out);
        }
    }

    /// Drop the stream and emit `Disconnected`. The caller is expected to
    /// run the close hook afterwards; `disconnect()` is the variant that
    /// does not.
    pub fn teardown(&mut self) {
        self.wire = None;
        self.outbox.clear();
        self.stop_sampler();
        if self.connected {
            self.connected = false;
            self.notifier.emit(SessionEvent::Disconnected);
        }
    }

    /// Final close: cancel every timer, drop any queued actions, tear the
    /// stream down. No close hook runs, so nothing reconnects afterwards.
    /// A no-op when there is no active stream.
    pub fn disconnect(&mut self) {
        self.timers.cancel_all();
        self.deferred.clear();
        if self.wire.is_none() {
            return;
        }
        self.meter.sample(false, self.bytes_in, self.bytes_out);
        self.teardown();
        self.notifier.set_status("Disconnected");
    }

    /// Periodic sampler tick. Skips silently when the stream is gone.
    pub fn sample_throughput(&mut self) {
        if self.wire.is_none() {
            return;
        }
        self.meter.sample(self.connected, self.bytes_in, self.bytes_out);
    }
}
