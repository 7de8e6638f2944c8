//! WebSocket session driver.
//!
//! `Session` is the shared handle; the driver task behind it owns the
//! [`SessionMachine`] and executes the actions it returns. Control commands
//! arrive on an unbounded channel, transport and timer inputs on a bounded
//! one, and the driver handles them strictly one at a time.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::machine::{RetryPolicy, SessionAction, SessionMachine, SessionState};
use crate::message::{SessionEvent, PING_TEXT, PONG_TEXT};
use bmx_core::Topic;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Close code: server is restarting.
const CLOSE_SERVICE_RESTART: u16 = 1012;
/// Close code: server overloaded, try again later.
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

const TRANSPORT_INPUT_BUFFER: usize = 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Disconnects tolerated before the session fails (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Fixed delay before each reconnect.
    pub reconnect_interval_ms: u64,
    /// Upper bound on a single connect attempt.
    pub connect_timeout_ms: u64,
    /// Quiet period before a keepalive ping.
    pub heartbeat_interval_ms: u64,
    /// Pong must arrive within this.
    pub heartbeat_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 3,
            reconnect_interval_ms: 10_000,
            connect_timeout_ms: 10_000,
            heartbeat_interval_ms: 5_000,
            heartbeat_timeout_ms: 10_000,
        }
    }
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_reconnect_attempts,
            interval: Duration::from_millis(self.reconnect_interval_ms),
        }
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Subscribe(Topic),
    Unsubscribe,
}

#[derive(Debug)]
enum TransportInput {
    Connected { attempt: u64 },
    Lost { attempt: u64, reason: String },
    ReconnectSuggested { attempt: u64 },
    Frame { attempt: u64, text: String },
    TimerFired { id: u64 },
}

/// Handle to a running session.
///
/// Cheap to share behind an `Arc`. Commands are queued to the driver task
/// and take effect in the order they were issued.
pub struct Session {
    command_tx: mpsc::UnboundedSender<Command>,
    state: Arc<RwLock<SessionState>>,
    shutdown_token: CancellationToken,
}

impl Session {
    /// Spawn the driver task. Events are delivered on `event_tx` in order.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: ConnectionConfig, event_tx: mpsc::Sender<SessionEvent>) -> Arc<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::channel(TRANSPORT_INPUT_BUFFER);
        let state = Arc::new(RwLock::new(SessionState::Disconnected));
        let shutdown_token = CancellationToken::new();

        let driver = SessionDriver {
            machine: SessionMachine::new(config.retry_policy()),
            config: Arc::new(config),
            state: state.clone(),
            event_tx,
            input_tx,
            transport: None,
            timer: None,
            shutdown_token: shutdown_token.clone(),
        };
        tokio::spawn(driver.run(command_rx, input_rx));

        Arc::new(Self {
            command_tx,
            state,
            shutdown_token,
        })
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Open the session (or retry now, if a reconnect is pending).
    pub fn connect(&self) -> WsResult<()> {
        self.send(Command::Connect)
    }

    /// Close the session. Pending reconnects are cancelled.
    pub fn disconnect(&self) -> WsResult<()> {
        self.send(Command::Disconnect)
    }

    /// Make `topic` the single active topic.
    pub fn subscribe(&self, topic: Topic) -> WsResult<()> {
        self.send(Command::Subscribe(topic))
    }

    /// Drop the active topic.
    pub fn unsubscribe(&self) -> WsResult<()> {
        self.send(Command::Unsubscribe)
    }

    /// Stop the driver task and every transport it owns.
    pub fn shutdown(&self) {
        info!("Session shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    fn send(&self, command: Command) -> WsResult<()> {
        self.command_tx
            .send(command)
            .map_err(|_| WsError::SessionClosed)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

struct TransportHandle {
    attempt: u64,
    cancel: CancellationToken,
    outbound_tx: mpsc::UnboundedSender<String>,
}

struct SessionDriver {
    config: Arc<ConnectionConfig>,
    machine: SessionMachine,
    state: Arc<RwLock<SessionState>>,
    event_tx: mpsc::Sender<SessionEvent>,
    input_tx: mpsc::Sender<TransportInput>,
    transport: Option<TransportHandle>,
    timer: Option<CancellationToken>,
    shutdown_token: CancellationToken,
}

impl SessionDriver {
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        mut input_rx: mpsc::Receiver<TransportInput>,
    ) {
        info!(url = %self.config.url, "Session driver started");

        loop {
            let actions = tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => break,

                command = command_rx.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },

                Some(input) = input_rx.recv() => self.on_input(input),
            };

            // Publish the new state before anything observes the actions.
            *self.state.write() = self.machine.state();
            self.execute(actions).await;
        }

        self.close_transport();
        self.cancel_timer();
        *self.state.write() = SessionState::Disconnected;
        info!("Session driver stopped");
    }

    fn on_command(&mut self, command: Command) -> Vec<SessionAction> {
        debug!(?command, "Session command");
        match command {
            Command::Connect => self.machine.connect(),
            Command::Disconnect => self.machine.disconnect(),
            Command::Subscribe(topic) => self.machine.subscribe(topic),
            Command::Unsubscribe => self.machine.unsubscribe(),
        }
    }

    fn on_input(&mut self, input: TransportInput) -> Vec<SessionAction> {
        match input {
            TransportInput::Connected { attempt } => self.machine.on_transport_connected(attempt),
            TransportInput::Lost { attempt, reason } => {
                self.machine.on_transport_lost(attempt, &reason)
            }
            TransportInput::ReconnectSuggested { attempt } => {
                if attempt == self.machine.current_attempt() {
                    self.machine.on_reconnect_suggested()
                } else {
                    Vec::new()
                }
            }
            TransportInput::Frame { attempt, text } => self.machine.on_text(attempt, text),
            TransportInput::TimerFired { id } => self.machine.on_timer_fired(id),
        }
    }

    async fn execute(&mut self, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::OpenTransport { attempt } => self.open_transport(attempt),
                SessionAction::CloseTransport => self.close_transport(),
                SessionAction::ArmTimer { id, delay } => self.arm_timer(id, delay),
                SessionAction::CancelTimer => self.cancel_timer(),
                SessionAction::Send(text) => self.send_text(text),
                SessionAction::Emit(event) => {
                    if self.event_tx.send(event).await.is_err() {
                        warn!("Session event receiver dropped");
                    }
                }
            }
        }
    }

    fn open_transport(&mut self, attempt: u64) {
        self.close_transport();

        let cancel = self.shutdown_token.child_token();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_transport(
            self.config.clone(),
            attempt,
            cancel.clone(),
            outbound_rx,
            self.input_tx.clone(),
        ));

        self.transport = Some(TransportHandle {
            attempt,
            cancel,
            outbound_tx,
        });
    }

    fn close_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            debug!(attempt = transport.attempt, "Closing transport");
            transport.cancel.cancel();
        }
    }

    fn arm_timer(&mut self, id: u64, delay: Duration) {
        self.cancel_timer();

        let cancel = self.shutdown_token.child_token();
        let input_tx = self.input_tx.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = input_tx.send(TransportInput::TimerFired { id }).await;
                }
            }
        });

        debug!(id, delay_ms = delay.as_millis() as u64, "Reconnect timer armed");
        self.timer = Some(cancel);
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    fn send_text(&self, text: String) {
        match &self.transport {
            Some(transport) => {
                if transport.outbound_tx.send(text).is_err() {
                    debug!(attempt = transport.attempt, "Transport gone, frame dropped");
                }
            }
            None => debug!("No transport, frame dropped"),
        }
    }
}

/// Transport task: one connect attempt and its message loop.
///
/// Reports `Lost` on every failure; a cancelled transport reports nothing.
async fn run_transport(
    config: Arc<ConnectionConfig>,
    attempt: u64,
    cancel: CancellationToken,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    input_tx: mpsc::Sender<TransportInput>,
) {
    if let Err(e) = drive_transport(&config, attempt, &cancel, outbound_rx, &input_tx).await {
        if cancel.is_cancelled() {
            return;
        }
        warn!(attempt, error = %e, "Transport lost");
        let _ = input_tx
            .send(TransportInput::Lost {
                attempt,
                reason: e.to_string(),
            })
            .await;
    }
}

async fn drive_transport(
    config: &ConnectionConfig,
    attempt: u64,
    cancel: &CancellationToken,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    input_tx: &mpsc::Sender<TransportInput>,
) -> WsResult<()> {
    info!(url = %config.url, attempt, "Connecting to WebSocket");

    let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
    // TCP_NODELAY for lower latency
    let connect = connect_async_tls_with_config(&config.url, None, true, None);
    let ws_stream = tokio::select! {
        () = cancel.cancelled() => return Ok(()),
        result = tokio::time::timeout(connect_timeout, connect) => match result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(WsError::ConnectTimeout(config.connect_timeout_ms)),
        },
    };
    let (mut write, mut read) = ws_stream.split();

    info!(attempt, "WebSocket connected");
    input_tx
        .send(TransportInput::Connected { attempt })
        .await
        .map_err(|_| WsError::SessionClosed)?;

    let mut heartbeat =
        HeartbeatManager::new(config.heartbeat_interval_ms, config.heartbeat_timeout_ms);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(attempt, "Transport cancelled");
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!(?e, "Failed to send Close frame");
                }
                return Ok(());
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        heartbeat.record_message();
                        if text == PONG_TEXT {
                            heartbeat.record_pong();
                            continue;
                        }
                        input_tx
                            .send(TransportInput::Frame { attempt, text })
                            .await
                            .map_err(|_| WsError::SessionClosed)?;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        heartbeat.record_message();
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        heartbeat.record_pong();
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (f.code.into(), f.reason.to_string()))
                            .unwrap_or((1000, "Normal close".to_string()));
                        warn!(attempt, code, %reason, "WebSocket closed by server");
                        if code == CLOSE_SERVICE_RESTART || code == CLOSE_TRY_AGAIN_LATER {
                            let _ = input_tx
                                .send(TransportInput::ReconnectSuggested { attempt })
                                .await;
                        }
                        return Err(WsError::ConnectionClosed { code, reason });
                    }
                    Some(Ok(_)) => {
                        heartbeat.record_message();
                    }
                    Some(Err(e)) => {
                        error!(attempt, ?e, "WebSocket read error");
                        return Err(e.into());
                    }
                    None => {
                        return Err(WsError::ConnectionClosed {
                            code: 1006,
                            reason: "Stream ended".to_string(),
                        });
                    }
                }
            }

            Some(text) = outbound_rx.recv() => {
                debug!(attempt, %text, "Sending control frame");
                write.send(Message::Text(text)).await?;
            }

            () = heartbeat.wait_for_check() => {
                if heartbeat.is_timed_out() {
                    error!(attempt, "Heartbeat timeout");
                    return Err(WsError::HeartbeatTimeout);
                }
                if heartbeat.should_send_ping() {
                    write.send(Message::Text(PING_TEXT.to_string())).await?;
                    heartbeat.record_ping();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_interval_ms, 10_000);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.interval, Duration::from_secs(10));
    }

    /// Local address with nothing listening on it.
    async fn refused_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn test_refused_connections_exhaust_retries() {
        let config = ConnectionConfig {
            reconnect_interval_ms: 20,
            connect_timeout_ms: 1_000,
            ..ConnectionConfig::new(refused_url().await)
        };
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let session = Session::spawn(config, event_tx);
        session.connect().unwrap();

        let mut events = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(5), event_rx.recv()).await
        {
            let done = matches!(event, SessionEvent::Disconnected { .. });
            events.push(event);
            if done {
                break;
            }
        }

        let reconnecting: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Reconnecting { attempt, .. } => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(reconnecting, vec![1, 2, 3]);
        assert_eq!(
            events.last(),
            Some(&SessionEvent::Disconnected {
                reason: crate::machine::RECONNECT_TIMEOUT_REASON.to_string()
            })
        );
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_disconnect_while_reconnecting() {
        let config = ConnectionConfig {
            reconnect_interval_ms: 60_000,
            ..ConnectionConfig::new(refused_url().await)
        };
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let session = Session::spawn(config, event_tx);
        session.connect().unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
            .await
            .unwrap();
        assert!(matches!(first, Some(SessionEvent::Reconnecting { attempt: 1, .. })));

        session.disconnect().unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
            .await
            .unwrap();
        assert_eq!(
            second,
            Some(SessionEvent::Disconnected {
                reason: crate::machine::CLIENT_DISCONNECT_REASON.to_string()
            })
        );
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_commands_fail_after_shutdown() {
        let (event_tx, _event_rx) = mpsc::channel(1);
        let session = Session::spawn(ConnectionConfig::new("ws://127.0.0.1:1"), event_tx);
        session.shutdown();
        assert!(session.is_shutdown());

        // Driver drops its receiver once it observes the cancellation.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(session.connect(), Err(WsError::SessionClosed)));
    }
}
