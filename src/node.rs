//! The node: composition root and cooperative main loop.
//!
//! Each tick drains the ingestion queue, applies every completed line under
//! one write lock on [`SystemState`], refreshes uptime and evaluates alerts.
//! Delivery (notifiers, indicator flashes, live snapshots) happens after the
//! lock is released.

use crate::alerts::{Alert, AlertDispatcher, LogNotifier};
use crate::clock::SharedClock;
use crate::collab::{mqtt, ChatNotifier, MqttNotifier, NodeCommand, Outbox};
use crate::config::{ConfigHandle, NodeConfig};
use crate::indicator::{self, SharedIndicator};
use crate::ingest::{ApplyOutcome, IngestStats, Ingestor};
use crate::memory::MemoryGauge;
use crate::state::{NodeSnapshot, SensorReading, SystemState};
use crate::web::AppState;
use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// State shared between the loop (writer) and collaborators (readers).
pub type SharedState = Arc<RwLock<SystemState>>;

/// Buffered snapshots per live client before it starts lagging.
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 32;

const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Message attached to test alerts.
pub const TEST_ALERT_MESSAGE: &str = "Test alert";

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Chunks taken off the ingestion queue
    pub chunks: usize,
    pub outcomes: Vec<ApplyOutcome>,
    pub commands: Vec<NodeCommand>,
    /// Detection alert raised this tick
    pub alert: Option<Alert>,
    /// The byte source has gone away
    pub source_closed: bool,
    pub broadcast: bool,
    /// Loop interval in force for the next tick
    pub loop_interval_ms: u64,
}

pub struct Node {
    state: SharedState,
    config: ConfigHandle,
    ingestor: Ingestor,
    dispatcher: AlertDispatcher,
    indicator: SharedIndicator,
    memory: Arc<MemoryGauge>,
    outbox: Outbox,
    snapshots: broadcast::Sender<NodeSnapshot>,
    commands_tx: mpsc::Sender<NodeCommand>,
    commands_rx: mpsc::Receiver<NodeCommand>,
    websocket_clients: Arc<AtomicUsize>,
    last_blink_ms: u64,
    last_health_ms: u64,
    last_broadcast_ms: Option<u64>,
}

impl Node {
    /// Build a node from the current configuration.
    ///
    /// Alerts go to the log plus the MQTT and chat notifiers; the latter two
    /// check their enabled flags on every alert.
    pub async fn new(config: ConfigHandle, clock: SharedClock, outbox: Outbox) -> Self {
        let current = config.current().await;
        let mut state = SystemState::new(current.system.history_capacity, clock);
        state.set_connectivity(current.network.mode, current.network.signal_strength);

        let dispatcher = AlertDispatcher::new()
            .with_notifier(Arc::new(LogNotifier))
            .with_notifier(Arc::new(MqttNotifier::new(config.clone(), outbox.clone())))
            .with_notifier(Arc::new(ChatNotifier::new(config.clone(), outbox.clone())));

        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        Self {
            state: Arc::new(RwLock::new(state)),
            indicator: indicator::indicator_for_pin(current.system.status_led_pin),
            config,
            ingestor: Ingestor::new(),
            dispatcher,
            memory: Arc::new(MemoryGauge::new()),
            outbox,
            snapshots,
            commands_tx,
            commands_rx,
            websocket_clients: Arc::new(AtomicUsize::new(0)),
            last_blink_ms: 0,
            last_health_ms: 0,
            last_broadcast_ms: None,
        }
    }

    /// Replace the alert dispatcher.
    pub fn with_dispatcher(mut self, dispatcher: AlertDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Drive this indicator instead of the logging one.
    pub fn with_indicator(mut self, indicator: SharedIndicator) -> Self {
        self.indicator = indicator;
        self
    }

    /// Shared handle to the live state.
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Sender for commands handled on the next tick.
    pub fn command_sender(&self) -> mpsc::Sender<NodeCommand> {
        self.commands_tx.clone()
    }

    /// Receive every broadcast snapshot from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeSnapshot> {
        self.snapshots.subscribe()
    }

    /// Ingestion counters.
    pub fn stats(&self) -> IngestStats {
        self.ingestor.stats()
    }

    /// Handles for the web layer.
    pub fn app_state(&self) -> AppState {
        AppState {
            state: self.state.clone(),
            config: self.config.clone(),
            snapshots: self.snapshots.clone(),
            commands: self.commands_tx.clone(),
            memory: self.memory.clone(),
            websocket_clients: self.websocket_clients.clone(),
        }
    }

    /// Current snapshot under a read lock.
    pub async fn snapshot(&self) -> NodeSnapshot {
        let config = self.config.current().await;
        let state = self.state.read().await;
        state.snapshot(&config, self.memory.available_bytes())
    }

    /// Feed bytes straight into the state, bypassing the queue.
    pub async fn ingest_bytes(&mut self, bytes: &[u8]) -> Vec<ApplyOutcome> {
        let config = self.config.current().await;
        let mut state = self.state.write().await;
        state.set_history_capacity(config.system.history_capacity);
        let outcomes = self
            .ingestor
            .ingest(bytes, &mut state, config.system.distance_threshold_cm);
        state.update_uptime();
        outcomes
    }

    /// Flush a trailing line that never got its terminator. Only meaningful
    /// once the input is known to be complete, as in replay.
    pub async fn finish_ingest(&mut self) -> Option<ApplyOutcome> {
        let config = self.config.current().await;
        let mut state = self.state.write().await;
        let outcome = self
            .ingestor
            .finish(&mut state, config.system.distance_threshold_cm);
        state.update_uptime();
        outcome
    }

    /// Run one loop iteration.
    pub async fn tick(&mut self, inbound: &mut mpsc::Receiver<Vec<u8>>) -> TickReport {
        let config = self.config.current().await;
        let mut report = TickReport {
            loop_interval_ms: config.system.loop_interval_ms,
            ..Default::default()
        };

        let mut chunks = Vec::new();
        loop {
            match inbound.try_recv() {
                Ok(chunk) => chunks.push(chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    report.source_closed = true;
                    break;
                }
            }
        }
        report.chunks = chunks.len();

        while let Ok(command) = self.commands_rx.try_recv() {
            report.commands.push(command);
        }

        let threshold = config.system.distance_threshold_cm;
        let mut test_alerts = Vec::new();
        let mut status_publish: Option<(SensorReading, u64)> = None;
        let snapshot;
        {
            let mut state = self.state.write().await;
            state.set_history_capacity(config.system.history_capacity);

            for chunk in &chunks {
                report
                    .outcomes
                    .extend(self.ingestor.ingest(chunk, &mut state, threshold));
            }
            state.update_uptime();

            for command in &report.commands {
                match command {
                    NodeCommand::Restart => {
                        warn!("Restart requested, clearing readings");
                        state.reset_readings();
                    }
                    NodeCommand::TestAlert => {
                        let alert = Alert::with_message(&state, TEST_ALERT_MESSAGE, threshold);
                        test_alerts.push(alert.into_test());
                    }
                    NodeCommand::PublishStatus => {
                        status_publish =
                            Some((state.current_reading().clone(), state.uptime_seconds));
                    }
                    NodeCommand::Refresh => {}
                }
            }

            report.alert = self.dispatcher.evaluate(
                &mut state,
                threshold,
                config.system.alert_cooldown_ms,
            );

            let now = state.now_ms();
            let detected = state.current_reading().object_detected;
            if now.saturating_sub(self.last_blink_ms) > indicator::blink_interval_ms(detected) {
                self.indicator.toggle();
                self.last_blink_ms = now;
            }

            if now.saturating_sub(self.last_health_ms) > config.system.health_interval_ms {
                info!(
                    uptime = %state.formatted_uptime(),
                    free_memory = self.memory.available_bytes(),
                    peer_connected = state.is_peer_connected(config.peer.connection_timeout_ms),
                    distance = state.current_reading().distance,
                    history = state.history_count(),
                    "System health"
                );
                self.last_health_ms = now;
            }

            let refresh_ms = config.web.refresh_interval_ms();
            let changed = !chunks.is_empty() || !report.commands.is_empty();
            let due = self
                .last_broadcast_ms
                .map_or(true, |last| now.saturating_sub(last) >= refresh_ms);
            snapshot = if changed || due {
                self.last_broadcast_ms = Some(now);
                Some(state.snapshot(&config, self.memory.available_bytes()))
            } else {
                None
            };
        }

        let flash = Duration::from_millis(config.system.alert_flash_ms);
        let signalled = report
            .outcomes
            .iter()
            .any(|outcome| matches!(outcome, ApplyOutcome::AlertSignal(_)));
        if signalled || !test_alerts.is_empty() {
            indicator::flash(self.indicator.clone(), flash);
        }

        if let Some(alert) = &report.alert {
            self.dispatcher.dispatch(alert).await;
        }
        for alert in &test_alerts {
            self.dispatcher.dispatch(alert).await;
        }

        if let Some((reading, uptime)) = status_publish {
            if let Err(e) = mqtt::publish_data(
                &self.outbox,
                &config.mqtt.topic,
                &reading,
                uptime,
                self.memory.available_bytes(),
            )
            .await
            {
                warn!("Failed to publish status: {}", e);
            }
        }

        if let Some(snapshot) = snapshot {
            // no receivers is fine
            report.broadcast = self.snapshots.send(snapshot).is_ok();
        }

        report
    }

    /// Tick until `shutdown` resolves.
    pub async fn run<F>(mut self, mut inbound: mpsc::Receiver<Vec<u8>>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut loop_ms = self.config.current().await.system.loop_interval_ms;
        let mut interval = tokio::time::interval(Duration::from_millis(loop_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut source_warned = false;
        tokio::pin!(shutdown);

        info!(loop_interval_ms = loop_ms, "Node loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down node loop");
                    break;
                }
                _ = interval.tick() => {}
            }

            let report = self.tick(&mut inbound).await;
            if report.source_closed && !source_warned {
                warn!("Companion source closed; serving last known state");
                source_warned = true;
            }
            if report.loop_interval_ms != loop_ms {
                debug!(from = loop_ms, to = report.loop_interval_ms, "Loop interval changed");
                loop_ms = report.loop_interval_ms;
                interval = tokio::time::interval(Duration::from_millis(loop_ms));
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            }
        }
    }
}

/// Build a node with an in-memory configuration and no file backing.
pub async fn node_with_config(config: NodeConfig, clock: SharedClock, outbox: Outbox) -> Node {
    Node::new(ConfigHandle::new(config, None), clock, outbox).await
}
