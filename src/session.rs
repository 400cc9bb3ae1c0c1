//! The Stratum session actor: dialect negotiation, command dispatch and
//! reconnect policy on top of [`StreamTransport`].
//!
//! One spawned task owns all session state. Callers hold a [`SessionHandle`]
//! (commands in, snapshots out) and the event receiver returned by
//! [`StratumSession::spawn`]; nothing else touches the actor.

use crate::config::{Dialect, StratumConfig};
use crate::error::{Result, StratumError};
use crate::events::{Notifier, SessionEvent};
use crate::protocol::{
    self, ids, methods, ExtranonceOutcome, Share, WireMessage,
};
use crate::timer::TimerKind;
use crate::transport::{
    Connector, Deferred, StreamHandler, StreamTransport, TcpConnector, TransportEvent,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// A pool sending this many consecutive unrecognized or malformed commands
/// is not speaking our protocol.
const INVALID_COMMAND_LIMIT: u32 = 5;

/// Hard cap on buffered traffic without a line terminator.
const RECEIVE_BUFFER_CAP: usize = 8192;

/// Keep-alive ping interval, once the pool has confirmed ping support.
const PING_PERIOD: Duration = Duration::from_secs(60);

/// Commands a [`SessionHandle`] sends to the actor.
#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Submit { share: Share, id: u64 },
    Shutdown,
}

/// Snapshot state shared between the actor and its handles.
#[derive(Debug)]
struct SharedState {
    online: AtomicBool,
    modern: AtomicBool,
    accepted: AtomicU64,
    rejected: AtomicU64,
    next_share_id: AtomicU64,
    difficulty_bits: AtomicU64,
    extranonce: Mutex<String>,
    session_id: Mutex<String>,
}

impl SharedState {
    fn new(modern: bool) -> Self {
        Self {
            online: AtomicBool::new(false),
            modern: AtomicBool::new(modern),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            next_share_id: AtomicU64::new(ids::SUBMIT_BASE),
            difficulty_bits: AtomicU64::new(1.0f64.to_bits()),
            extranonce: Mutex::new(String::new()),
            session_id: Mutex::new(String::new()),
        }
    }
}

fn lock(m: &Mutex<String>) -> MutexGuard<'_, String> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Caller-side handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<SharedState>,
}

impl SessionHandle {
    /// Ask the actor to open (or reopen) the connection.
    pub fn connect(&self) -> Result<()> {
        self.send(Command::Connect)
    }

    /// Final disconnect: no reconnection follows.
    pub fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect)
    }

    /// Disconnect and stop the actor task.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    /// Submit a share, returning the id its accept/reject response will
    /// carry. Fails synchronously on incomplete shares and on the modern
    /// dialect, which has no submission shape here.
    pub fn submit(&self, share: Share) -> Result<u64> {
        if self.shared.modern.load(Ordering::Relaxed) {
            return Err(StratumError::NotImplemented(
                "share submission over the login dialect",
            ));
        }
        if !share.is_complete() {
            return Err(StratumError::InvalidShare(
                "job_id, nonce, nonce2 and ntime are all required".to_string(),
            ));
        }
        let id = self.shared.next_share_id.fetch_add(1, Ordering::Relaxed);
        self.commands
            .send(Command::Submit { share, id })
            .map_err(|_| StratumError::Shutdown)?;
        Ok(id)
    }

    /// True between a successful login/authorize and the next disconnect.
    pub fn is_online(&self) -> bool {
        self.shared.online.load(Ordering::Relaxed)
    }

    pub fn accepted(&self) -> u64 {
        self.shared.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.shared.rejected.load(Ordering::Relaxed)
    }

    /// Current pool difficulty (1.0 until the pool says otherwise).
    pub fn difficulty(&self) -> f64 {
        f64::from_bits(self.shared.difficulty_bits.load(Ordering::Relaxed))
    }

    /// Current normalized extranonce (empty until subscribed).
    pub fn extranonce(&self) -> String {
        lock(&self.shared.extranonce).clone()
    }

    /// Session id retained for resumption across reconnects.
    pub fn session_id(&self) -> String {
        lock(&self.shared.session_id).clone()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| StratumError::Shutdown)
    }
}

/// All protocol-level state, owned by the actor task.
struct ProtocolState {
    config: Arc<StratumConfig>,
    shared: Arc<SharedState>,

    dialect: Dialect,
    fell_back: bool,
    online: bool,
    difficulty: f64,
    extranonce: String,
    session_id: String,
    current_job: Option<(Value, DateTime<Utc>)>,
    supports_ping: bool,

    rcv_buffer: String,
    invalid_streak: u32,
    backoff_index: usize,

    disconnect_count: u64,
    connected_at: Option<DateTime<Utc>>,
    last_disconnect: Option<DateTime<Utc>>,
}

impl ProtocolState {
    fn new(config: Arc<StratumConfig>, shared: Arc<SharedState>) -> Self {
        let dialect = config.dialect;
        Self {
            config,
            shared,
            dialect,
            fell_back: false,
            online: false,
            difficulty: 1.0,
            extranonce: String::new(),
            session_id: String::new(),
            current_job: None,
            supports_ping: false,
            rcv_buffer: String::new(),
            invalid_streak: 0,
            backoff_index: 0,
            disconnect_count: 0,
            connected_at: None,
            last_disconnect: None,
        }
    }

    fn set_online(&mut self, online: bool) {
        self.online = online;
        self.shared.online.store(online, Ordering::Relaxed);
    }

    fn set_dialect(&mut self, dialect: Dialect) {
        self.dialect = dialect;
        self.shared
            .modern
            .store(dialect == Dialect::Modern, Ordering::Relaxed);
    }

    fn store_difficulty(&mut self, difficulty: f64) {
        self.difficulty = difficulty;
        self.shared
            .difficulty_bits
            .store(difficulty.to_bits(), Ordering::Relaxed);
    }

    fn store_extranonce(&mut self, extranonce: String) {
        *lock(&self.shared.extranonce) = extranonce.clone();
        self.extranonce = extranonce;
    }

    fn store_session_id(&mut self, session_id: String) {
        *lock(&self.shared.session_id) = session_id.clone();
        self.session_id = session_id;
    }

    /// Send the opening messages for the current dialect.
    fn do_handshake(&mut self, transport: &mut StreamTransport) {
        match self.dialect {
            Dialect::Modern => {
                transport.send_json(&WireMessage::login(
                    &self.config.username,
                    &self.config.password,
                    &self.config.user_agent,
                ));
            }
            Dialect::Legacy => {
                let resume = self.config.resume_session && !self.session_id.is_empty();
                let session = resume.then_some(self.session_id.as_str());
                transport.send_json(&WireMessage::subscribe(&self.config.user_agent, session));
                transport.send_json(&WireMessage::authorize(
                    &self.config.username,
                    &self.config.password,
                ));
                if self.config.enable_ping {
                    transport.send_json(&WireMessage::ping());
                }
            }
        }
    }

    /// Login or authorization accepted.
    fn logged_in(&mut self, transport: &mut StreamTransport) {
        transport.timers.cancel(TimerKind::LoginTimeout);
        self.set_online(true);
        self.invalid_streak = 0;
        self.backoff_index = 0;
        transport.notifier.clear_error();
        transport.notifier.emit(SessionEvent::Online);
        transport.notifier.set_status("Online");
    }

    fn on_command(&mut self, transport: &mut StreamTransport, msg: WireMessage) {
        if !msg.is_wellformed() {
            self.unrecognized(transport, &msg);
            return;
        }
        let processed = match msg.method.clone() {
            Some(method) => self.on_method(transport, &method, &msg),
            None => self.on_response(transport, &msg),
        };
        if processed {
            self.invalid_streak = 0;
        } else {
            self.unrecognized(transport, &msg);
        }
    }

    fn unrecognized(&mut self, transport: &mut StreamTransport, msg: &WireMessage) {
        self.invalid_streak += 1;
        let raw = serde_json::to_string(msg).unwrap_or_default();
        transport.notifier.set_error(
            StratumError::Protocol(format!("unknown command from pool: {raw}")).to_string(),
        );
        if self.invalid_streak >= INVALID_COMMAND_LIMIT {
            transport.notifier.set_error(
                StratumError::Protocol("pool is not speaking the stratum protocol".to_string())
                    .to_string(),
            );
            transport.defer_destroy(true);
        }
    }

    /// Server request or notification, dispatched by method name. This runs
    /// before any id-based dispatch so a server ping carrying a reserved id
    /// is still answered.
    fn on_method(
        &mut self,
        transport: &mut StreamTransport,
        method: &str,
        msg: &WireMessage,
    ) -> bool {
        match method {
            methods::PING => {
                transport.send_json(&WireMessage::pong(msg.id.clone()));
                true
            }
            methods::PONG => {
                self.confirm_ping_support(transport);
                true
            }
            methods::SET_DIFFICULTY => match protocol::parse_difficulty(msg.params.as_ref()) {
                Some(difficulty) => {
                    self.store_difficulty(difficulty);
                    transport
                        .notifier
                        .emit(SessionEvent::DifficultyChanged(difficulty));
                    true
                }
                None => false,
            },
            methods::NOTIFY => {
                // legacy notify is meaningful even with empty params
                let params = msg.params.clone().unwrap_or(Value::Null);
                self.on_job(transport, params);
                true
            }
            methods::JOB => match msg.params.clone() {
                Some(params) => {
                    self.on_job(transport, params);
                    true
                }
                None => false,
            },
            methods::SET_EXTRANONCE => self.on_set_extranonce(msg),
            methods::SHOW_MESSAGE => {
                match msg.params.as_ref().and_then(|p| p.as_array()?.first()) {
                    Some(text) => {
                        transport
                            .notifier
                            .set_status(format!("Message from pool: {}", protocol::value_text(text)));
                        true
                    }
                    None => false,
                }
            }
            methods::RECONNECT => self.on_reconnect(transport, msg),
            _ => false,
        }
    }

    /// Response to one of our requests, dispatched by id.
    fn on_response(&mut self, transport: &mut StreamTransport, msg: &WireMessage) -> bool {
        match msg.id_u64() {
            Some(ids::LOGIN) => self.on_login(transport, msg),
            Some(ids::SUBSCRIBE) => self.on_subscribe(transport, msg),
            Some(ids::AUTHORIZE) => self.on_authorize(transport, msg),
            Some(ids::PING) => {
                if msg.result_truthy() {
                    self.confirm_ping_support(transport);
                }
                true
            }
            Some(id) if id >= ids::SUBMIT_BASE => {
                self.on_share_result(transport, id, msg);
                true
            }
            _ => false,
        }
    }

    fn confirm_ping_support(&mut self, transport: &mut StreamTransport) {
        if !self.supports_ping {
            debug!("pool confirmed keep-alive ping support");
        }
        self.supports_ping = true;
        transport
            .timers
            .arm_periodic(TimerKind::PingKeepalive, PING_PERIOD);
    }

    fn on_login(&mut self, transport: &mut StreamTransport, msg: &WireMessage) -> bool {
        if !msg.result_truthy() {
            if self.fell_back {
                transport.notifier.set_error(
                    StratumError::AuthenticationFailed(format!(
                        "pool rejected login{}",
                        error_detail(msg)
                    ))
                    .to_string(),
                );
                transport.defer_destroy(true);
                return true;
            }
            // one fallback per connection attempt, never back up
            transport
                .notifier
                .set_status("Pool rejected login, retrying with mining.subscribe");
            self.set_dialect(Dialect::Legacy);
            self.fell_back = true;
            self.do_handshake(transport);
            return true;
        }

        // nonce management is embedded in modern jobs
        self.store_extranonce(String::new());
        self.logged_in(transport);
        if let Some(job) = msg.result.as_ref().and_then(|r| r.get("job")) {
            if !job.is_null() {
                self.on_job(transport, job.clone());
            }
        }
        true
    }

    fn on_subscribe(&mut self, transport: &mut StreamTransport, msg: &WireMessage) -> bool {
        self.store_difficulty(1.0);

        if protocol::truthy(msg.error.as_ref()) || !matches!(msg.result, Some(Value::Array(_))) {
            // authorize decides whether this connection is usable
            self.store_extranonce(String::new());
            return true;
        }
        let Some(result) = msg.result.as_ref() else {
            return true;
        };
        let info = protocol::scan_subscribe_result(result);

        if let Some(difficulty) = info.difficulty {
            self.store_difficulty(difficulty);
        }
        if let Some(session_id) = info.session_id {
            let resumed = self.config.resume_session
                && !self.session_id.is_empty()
                && session_id == self.session_id;
            if resumed {
                transport
                    .notifier
                    .set_status(format!("Resumed mining session {session_id}"));
            } else {
                transport
                    .notifier
                    .set_status(format!("Started mining session {session_id}"));
            }
            self.store_session_id(session_id);
        }
        if let ExtranonceOutcome::Updated(nonce) = protocol::parse_extranonce(&info.extranonce) {
            debug!(extranonce = %nonce, "extranonce assigned");
            self.store_extranonce(nonce);
        }
        true
    }

    fn on_authorize(&mut self, transport: &mut StreamTransport, msg: &WireMessage) -> bool {
        if msg.result_truthy() {
            self.set_dialect(Dialect::Legacy);
            self.logged_in(transport);
        } else {
            transport.notifier.set_error(
                StratumError::AuthenticationFailed(format!(
                    "pool rejected worker authorization{}",
                    error_detail(msg)
                ))
                .to_string(),
            );
            transport.defer_destroy(true);
        }
        true
    }

    fn on_set_extranonce(&mut self, msg: &WireMessage) -> bool {
        let Some(params) = msg.params.as_ref().and_then(Value::as_array) else {
            return false;
        };
        match protocol::parse_extranonce(params) {
            ExtranonceOutcome::Updated(nonce) => {
                debug!(extranonce = %nonce, "extranonce changed");
                self.store_extranonce(nonce);
                true
            }
            ExtranonceOutcome::Unchanged => true,
            ExtranonceOutcome::NotHex => false,
        }
    }

    fn on_job(&mut self, transport: &mut StreamTransport, params: Value) {
        let now = Utc::now();
        if let Some((_, received_at)) = self.current_job.replace((params.clone(), now)) {
            debug!(
                previous_job_secs = (now - received_at).num_seconds(),
                "new job"
            );
        }
        transport.notifier.emit(SessionEvent::JobReceived(params));
    }

    /// `client.reconnect`: one param is a URL, two are host and port.
    /// Anything else is unprocessed.
    fn on_reconnect(&mut self, transport: &mut StreamTransport, msg: &WireMessage) -> bool {
        let Some(params) = msg.params.as_ref().and_then(Value::as_array) else {
            return false;
        };
        let target = match params.len() {
            1 => protocol::value_text(&params[0]).parse().ok(),
            2 => {
                let host = params[0].as_str();
                let port = protocol::value_text(&params[1]).parse::<u16>().ok();
                match (host, port) {
                    (Some(host), Some(port)) => {
                        Some(crate::config::Target::from_host_port(host, port))
                    }
                    _ => None,
                }
            }
            _ => None,
        };
        let Some(target) = target else {
            return false;
        };

        self.set_online(false);
        transport
            .notifier
            .set_status(format!("Pool requested reconnection to {}:{}", target.host, target.port));
        transport.set_redirect(target.clone());
        transport.notifier.emit(SessionEvent::RedirectRequested(target));
        transport.defer_destroy(false);
        true
    }

    fn on_share_result(&mut self, transport: &mut StreamTransport, id: u64, msg: &WireMessage) {
        if msg.result_truthy() {
            self.shared.accepted.fetch_add(1, Ordering::Relaxed);
            transport.notifier.emit(SessionEvent::ShareAccepted(id));
        } else {
            self.shared.rejected.fetch_add(1, Ordering::Relaxed);
            transport
                .notifier
                .set_error(format!("Share {id} rejected{}", error_detail(msg)));
            transport.notifier.emit(SessionEvent::ShareRejected(id));
        }
    }

}

fn error_detail(msg: &WireMessage) -> String {
    match msg.error.as_ref() {
        Some(error) if protocol::truthy(Some(error)) => {
            format!(": {}", protocol::value_text(error))
        }
        _ => String::new(),
    }
}

impl StreamHandler for ProtocolState {
    fn before_connect(&mut self, _transport: &mut StreamTransport) -> Result<()> {
        if self.config.username.is_empty() {
            return Err(StratumError::Config(
                "stratum requires username to be set".to_string(),
            ));
        }
        self.rcv_buffer.clear();
        self.invalid_streak = 0;
        self.supports_ping = false;
        self.fell_back = false;
        self.set_dialect(self.config.dialect);
        Ok(())
    }

    fn on_connect(&mut self, transport: &mut StreamTransport) {
        let now = Utc::now();
        if let Some(at) = self.last_disconnect {
            debug!(offline_secs = (now - at).num_seconds(), "reconnected");
        }
        self.connected_at = Some(now);
        if !self.config.login_timeout.is_zero() {
            transport
                .timers
                .arm(TimerKind::LoginTimeout, self.config.login_timeout);
        }
        self.do_handshake(transport);
    }

    fn on_data(&mut self, transport: &mut StreamTransport, bytes: &[u8]) {
        self.rcv_buffer.push_str(&String::from_utf8_lossy(bytes));

        while let Some(pos) = self.rcv_buffer.find('\n') {
            let line: String = self.rcv_buffer.drain(..=pos).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if self.config.log_incoming {
                debug!(rx = %line, "incoming");
            }
            match serde_json::from_str::<WireMessage>(line) {
                Ok(msg) => self.on_command(transport, msg),
                Err(_) => {
                    transport.notifier.set_error(
                        StratumError::Protocol("pool sent non JSON-RPC traffic".to_string())
                            .to_string(),
                    );
                    transport.defer_destroy(true);
                    return;
                }
            }
        }

        if self.rcv_buffer.len() > RECEIVE_BUFFER_CAP {
            transport.notifier.set_error(
                StratumError::Protocol(
                    "pool traffic exceeded the receive buffer without a line break".to_string(),
                )
                .to_string(),
            );
            transport.defer_destroy(true);
        }
    }

    fn on_end(&mut self, transport: &mut StreamTransport) {
        self.set_online(false);
        transport
            .notifier
            .set_status("Remote host has closed the connection");
    }

    /// Shared cleanup for every close path, final or not. Runs before the
    /// stream is torn down, so handles never read online across a disconnect
    /// notification.
    fn before_disconnect(&mut self, transport: &mut StreamTransport) {
        transport.timers.cancel(TimerKind::LoginTimeout);
        transport.timers.cancel(TimerKind::PingKeepalive);
        self.rcv_buffer.clear();
        self.set_online(false);
        self.disconnect_count += 1;
        let now = Utc::now();
        if let Some(at) = self.connected_at.take() {
            debug!(
                disconnects = self.disconnect_count,
                uptime_secs = (now - at).num_seconds(),
                "stream closed"
            );
        }
        self.last_disconnect = Some(now);
    }

    fn on_close(&mut self, transport: &mut StreamTransport, _had_error: bool) {
        if transport.redirect_pending() {
            transport.defer_connect();
            return;
        }
        if !self.config.reconnect_on_error {
            return;
        }
        let schedule = &self.config.reconnect_schedule;
        let delay = schedule.delay_at(self.backoff_index);
        self.backoff_index = (self.backoff_index + 1).min(schedule.last_index());
        transport.timers.arm(TimerKind::Reconnect, delay);
        transport.notifier.set_status(format!(
            "Reconnecting to {} in {} second(s)...",
            self.config.url,
            delay.as_secs()
        ));
    }

    fn on_error(&mut self, transport: &mut StreamTransport, err: &std::io::Error) {
        transport
            .notifier
            .set_error(StratumError::Connection(err.to_string()).to_string());
        // refused means nobody is listening; skip the short retries
        if err.kind() == std::io::ErrorKind::ConnectionRefused
            && self.config.reconnect_schedule.is_schedule()
        {
            self.backoff_index = self.config.reconnect_schedule.last_index();
        }
        transport.defer_destroy(true);
    }

    fn on_timer(&mut self, transport: &mut StreamTransport, kind: TimerKind) {
        match kind {
            TimerKind::LoginTimeout => {
                if !self.online {
                    transport.notifier.set_error(
                        StratumError::Timeout("stratum login timeout reached".to_string())
                            .to_string(),
                    );
                    self.on_timeout(transport);
                }
            }
            TimerKind::PingKeepalive => {
                transport.send_json(&WireMessage::ping());
            }
            // handled by the actor loop
            TimerKind::Reconnect | TimerKind::ThroughputSample => {}
        }
    }
}

/// The session actor. Spawn it, then drive it through the returned handle.
pub struct StratumSession {
    transport: StreamTransport,
    proto: ProtocolState,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl StratumSession {
    /// Validate the configuration and spawn the actor task with a real TCP
    /// connector. Nothing connects until the handle asks.
    pub fn spawn(
        config: StratumConfig,
    ) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>)> {
        let connector = TcpConnector {
            keepalive: config.keepalive,
            nodelay: config.nodelay,
        };
        Self::spawn_with_connector(config, Box::new(connector))
    }

    /// Spawn with a custom connector (tests, alternate transports).
    pub fn spawn_with_connector(
        mut config: StratumConfig,
        connector: Box<dyn Connector>,
    ) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>)> {
        config.validate()?;
        let target = config.target()?;
        if config.id.is_empty() {
            config.id = config.identity();
        }
        let config = Arc::new(config);

        let (notifier, events) = Notifier::channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SharedState::new(config.dialect == Dialect::Modern));

        let transport = StreamTransport::new(
            target,
            connector,
            notifier,
            config.connect_timeout,
            config.sample_period,
            config.log_outgoing,
        );
        let proto = ProtocolState::new(config, shared.clone());
        let session = StratumSession {
            transport,
            proto,
            commands: cmd_rx,
        };
        tokio::spawn(session.run());

        Ok((
            SessionHandle {
                commands: cmd_tx,
                shared,
            },
            events,
        ))
    }

    async fn run(mut self) {
        loop {
            if let Err(e) = self.transport.flush().await {
                self.proto.on_error(&mut self.transport, &e);
            }
            if let Some(action) = self.transport.take_deferred() {
                match action {
                    Deferred::Destroy { had_error } => {
                        // offline must be observable before Disconnected goes out
                        self.proto.before_disconnect(&mut self.transport);
                        self.transport.teardown();
                        self.proto.on_close(&mut self.transport, had_error);
                    }
                    Deferred::Connect => self.connect().await,
                }
                continue;
            }

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Connect) => self.connect().await,
                    Some(Command::Disconnect) => self.disconnect(),
                    Some(Command::Submit { share, id }) => self.submit(&share, id),
                    Some(Command::Shutdown) | None => {
                        self.disconnect();
                        break;
                    }
                },
                event = self.transport.next_event() => match event {
                    TransportEvent::Data(bytes) => {
                        self.proto.on_data(&mut self.transport, &bytes);
                    }
                    TransportEvent::Eof => {
                        self.proto.on_end(&mut self.transport);
                        self.transport.defer_destroy(false);
                    }
                    TransportEvent::IoError(e) => {
                        self.proto.on_error(&mut self.transport, &e);
                    }
                    TransportEvent::Timer(TimerKind::ThroughputSample) => {
                        self.transport.sample_throughput();
                    }
                    TransportEvent::Timer(TimerKind::Reconnect) => self.connect().await,
                    TransportEvent::Timer(kind) => {
                        self.proto.on_timer(&mut self.transport, kind);
                    }
                },
            }
        }
    }

    async fn connect(&mut self) {
        if self.transport.is_connected() {
            self.proto.before_disconnect(&mut self.transport);
            self.transport.teardown();
        }
        if let Err(e) = self.proto.before_connect(&mut self.transport) {
            self.transport.notifier.set_error(e.to_string());
            return;
        }
        match self.transport.establish().await {
            Ok(()) => self.proto.on_connect(&mut self.transport),
            Err(e) => self.proto.on_error(&mut self.transport, &e),
        }
    }

    fn disconnect(&mut self) {
        if self.transport.is_connected() {
            self.proto.before_disconnect(&mut self.transport);
        }
        self.transport.disconnect();
    }

    fn submit(&mut self, share: &Share, id: u64) {
        let msg = WireMessage::submit(&self.proto.config.username, share, id);
        self.transport.send_json(&msg);
    }
}
