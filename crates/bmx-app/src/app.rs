//! Main application orchestration.
//!
//! Coordinates:
//! - The WebSocket session and its event channel
//! - The feed hub (route, decode, apply, publish)
//! - Metrics for every event
//! - Periodic view summaries

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::printer::{render_book, render_trades, ViewPrinter};
use bmx_core::{EntityKind, Topic};
use bmx_feed::{FeedHub, PayloadOutcome, ViewKind};
use bmx_telemetry::Metrics;
use bmx_ws::{Session, SessionEvent, CLIENT_DISCONNECT_REASON, RECONNECT_TIMEOUT_REASON};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What the event loop does after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The session stopped for good.
    Stop(String),
}

/// Main application.
pub struct Application {
    config: AppConfig,
    topic: Topic,
    hub: Arc<FeedHub>,
    printer: Arc<ViewPrinter>,
    shutdown_token: CancellationToken,
}

impl Application {
    /// Create a new application. Fails if the configuration is invalid.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        let topic = config.topic()?;

        let hub = Arc::new(FeedHub::new());
        let printer = Arc::new(ViewPrinter::new());
        hub.add_subscriber(printer.clone());

        Ok(Self {
            config,
            topic,
            hub,
            printer,
            shutdown_token: CancellationToken::new(),
        })
    }

    pub fn hub(&self) -> &Arc<FeedHub> {
        &self.hub
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn printer(&self) -> &Arc<ViewPrinter> {
        &self.printer
    }

    /// Token that stops [`Application::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Connect, subscribe and process events until shutdown.
    ///
    /// Returns [`AppError::SessionFailed`] if the session gives up
    /// reconnecting.
    pub async fn run(&self) -> AppResult<()> {
        info!(
            url = %self.config.websocket.url,
            topic = %self.topic,
            max_reconnect_attempts = self.config.websocket.max_reconnect_attempts,
            "Starting application"
        );

        let (event_tx, mut event_rx) = mpsc::channel(self.config.websocket.event_buffer);
        let session = Session::spawn(self.config.connection_config(), event_tx);

        self.hub.set_topic(Some(self.topic.clone()));
        session.subscribe(self.topic.clone())?;
        session.connect()?;
        Metrics::ws_state_set("connecting");

        let result = self.event_loop(&session, &mut event_rx).await;

        self.log_summary();
        info!(stats = ?self.hub.stats(), updates = self.printer.updates(), "Shutting down");
        session.shutdown();
        result
    }

    async fn event_loop(
        &self,
        session: &Session,
        event_rx: &mut mpsc::Receiver<SessionEvent>,
    ) -> AppResult<()> {
        info!("Entering main event loop");
        let summary_enabled = self.config.viewer.summary_interval_ms > 0;
        let mut summary_interval = tokio::time::interval(Duration::from_millis(
            self.config.viewer.summary_interval_ms.max(1),
        ));

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        warn!("Session event channel closed");
                        return Ok(());
                    };
                    if let Flow::Stop(reason) = self.handle_event(event) {
                        return Err(AppError::SessionFailed(reason));
                    }
                }

                _ = summary_interval.tick(), if summary_enabled => {
                    self.log_summary();
                }

                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested");
                    let _ = session.disconnect();
                    return Ok(());
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    let _ = session.disconnect();
                    return Ok(());
                }
            }
        }
    }

    /// Process one session event.
    pub fn handle_event(&self, event: SessionEvent) -> Flow {
        match event {
            SessionEvent::Connected => {
                info!(topic = %self.topic, "Session connected");
                Metrics::ws_connected();
                Metrics::ws_state_set("connected");
                self.hub.subscribers().notify_connected();
            }
            SessionEvent::Text(raw) => self.handle_payload(&raw),
            SessionEvent::Reconnecting { attempt, reason } => {
                warn!(attempt, reason = %reason, "Session reconnecting");
                Metrics::ws_disconnected();
                Metrics::ws_state_set("reconnecting");
                Metrics::ws_reconnect("scheduled");
                self.hub.subscribers().notify_disconnected(&reason);
            }
            SessionEvent::Disconnected { reason } => {
                Metrics::ws_disconnected();
                self.hub.subscribers().notify_disconnected(&reason);
                if reason == RECONNECT_TIMEOUT_REASON {
                    error!(reason = %reason, "Session failed");
                    Metrics::ws_state_set("failed");
                    Metrics::ws_reconnect("exhausted");
                    return Flow::Stop(reason);
                }
                Metrics::ws_state_set("disconnected");
                if reason == CLIENT_DISCONNECT_REASON {
                    info!("Session closed");
                } else {
                    warn!(reason = %reason, "Session disconnected");
                }
            }
            SessionEvent::Error(message) => {
                warn!(message = %message, "Session error");
                Metrics::ws_error();
                self.hub.subscribers().notify_error(&message);
            }
        }
        Flow::Continue
    }

    fn handle_payload(&self, raw: &str) {
        Metrics::frame_received();
        let started = Instant::now();

        match self.hub.handle_payload(raw) {
            Ok(PayloadOutcome::Applied { kind, action, .. }) => {
                Metrics::payload_routed("accepted");
                Metrics::diff_applied(kind.as_str(), action.as_str());
                Metrics::apply_latency(kind.as_str(), started.elapsed().as_micros() as f64);
            }
            Ok(PayloadOutcome::Ignored(reason)) => {
                debug!(reason = %reason, "Payload ignored");
                Metrics::payload_routed(reason.as_str());
            }
            Err(e) => {
                warn!(error = %e, "Payload dropped");
                Metrics::payload_routed("accepted");
                Metrics::decode_failed(e.kind());
            }
        }
    }

    /// Log the top of the active topic's views.
    pub fn log_summary(&self) {
        let levels = self.config.viewer.levels;
        let lines = match EntityKind::from_table(&self.topic.table) {
            Some(EntityKind::OrderBook) => self.hub.find_order_book(&self.topic).and_then(|e| {
                Some(render_book(
                    &*e.view(ViewKind::Bids)?,
                    &*e.view(ViewKind::Asks)?,
                    levels,
                ))
            }),
            Some(EntityKind::Trade) => self
                .hub
                .find_trade_tape(&self.topic)
                .and_then(|e| Some(render_trades(&*e.view(ViewKind::Trades)?, levels))),
            None => None,
        };

        match lines {
            Some(lines) => {
                info!(topic = %self.topic, "View summary");
                for line in lines {
                    info!("{}", line);
                }
            }
            None => debug!(topic = %self.topic, "No data yet"),
        }
    }
}
