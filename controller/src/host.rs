use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    ops::ControlFlow,
    path::PathBuf,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use climate_common::{
    entity_id_from_state_topic, service_topic, state_topic, status_topic, ClimateEntryConfig,
    ControllerConfig, ControllerRegistry, ControllerSnapshot, EntityState, Host, ServiceCall,
    TimerId, STATUS_ONLINE,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const EVENT_QUEUE_DEPTH: usize = 256;

/// Everything the dispatcher reacts to, delivered one at a time.
#[derive(Debug)]
enum HostEvent {
    Connected,
    Publish { topic: String, payload: Vec<u8> },
    SystemReady,
    Tick { entry_id: String, timer_id: TimerId },
    Shutdown,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    system_ready: bool,
    entries: Vec<ControllerSnapshot>,
}

#[derive(Clone)]
struct AppState {
    status: watch::Receiver<StatusView>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct ConfigStore {
    config_path: PathBuf,
}

/// Entity states mirrored from retained MQTT topics; service calls and
/// timers go back out through the broker and tokio.
struct MqttHost {
    mqtt: AsyncClient,
    prefix: String,
    states: HashMap<String, EntityState>,
    events: mpsc::Sender<HostEvent>,
    next_timer_id: TimerId,
}

#[derive(Debug)]
struct TickTask {
    id: TimerId,
    task: JoinHandle<()>,
}

struct Dispatcher {
    host: MqttHost,
    registry: ControllerRegistry<TickTask>,
    status: watch::Sender<StatusView>,
    ready_grace: Duration,
    grace_started: bool,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::new();
    let mut config = store.load().await.unwrap_or_else(|err| {
        warn!("failed to load controller config from store: {err:#}");
        ControllerConfig::default()
    });
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    let mut mqtt_options = MqttOptions::new(
        config.mqtt.client_id.clone(),
        config.mqtt.host.clone(),
        config.mqtt.port,
    );
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    if !config.mqtt.user.is_empty() {
        mqtt_options.set_credentials(config.mqtt.user.clone(), config.mqtt.pass.clone());
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let (status_tx, status_rx) = watch::channel(StatusView::default());

    let host = MqttHost::new(mqtt.clone(), config.topic_prefix.clone(), events_tx.clone());
    let mut dispatcher = Dispatcher::new(
        host,
        status_tx,
        Duration::from_secs(config.ready_grace_secs),
    );
    for entry in config.entries {
        dispatcher.setup_entry(entry);
    }
    if dispatcher.registry.is_empty() {
        warn!("no climate entries configured, nothing will be controlled");
    }
    dispatcher.publish_status();

    spawn_mqtt_loop(
        mqtt,
        eventloop,
        dispatcher.subscription_topics(),
        events_tx.clone(),
    );
    let dispatcher_task = tokio::spawn(dispatcher.run(events_rx));

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/entries/{entry_id}", get(handle_get_entry))
        .with_state(AppState { status: status_rx });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down, cancelling timers");
    let _ = events_tx.send(HostEvent::Shutdown).await;
    dispatcher_task.await.context("dispatcher task panicked")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}

fn spawn_mqtt_loop(
    mqtt: AsyncClient,
    mut eventloop: EventLoop,
    topics: Vec<String>,
    events: mpsc::Sender<HostEvent>,
) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    let event = HostEvent::Publish {
                        topic: message.topic,
                        payload: message.payload.to_vec(),
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    // Subscriptions do not survive a clean-session reconnect.
                    for topic in &topics {
                        if let Err(err) = mqtt.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                            warn!("mqtt subscribe to {topic} failed: {err}");
                        }
                    }
                    if events.send(HostEvent::Connected).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

impl MqttHost {
    fn new(mqtt: AsyncClient, prefix: String, events: mpsc::Sender<HostEvent>) -> Self {
        Self {
            mqtt,
            prefix,
            states: HashMap::new(),
            events,
            next_timer_id: 0,
        }
    }
}

impl Host for MqttHost {
    type Timer = TickTask;

    fn entity_state(&self, entity_id: &str) -> Option<EntityState> {
        self.states.get(entity_id).cloned()
    }

    fn call_service(&mut self, call: ServiceCall) {
        let topic = service_topic(&self.prefix, &call.domain, &call.service);
        let body = match serde_json::to_vec(&call.data) {
            Ok(body) => body,
            Err(err) => {
                warn!("service call serialization failed: {err}");
                return;
            }
        };

        debug!("service call {topic}: {:?}", call.data);
        if let Err(err) = self.mqtt.try_publish(topic, QoS::AtLeastOnce, false, body) {
            warn!(
                "service call {}.{} publish failed: {err}",
                call.domain, call.service
            );
        }
    }

    fn schedule_recurring(&mut self, entry_id: &str, interval: Duration) -> TickTask {
        self.next_timer_id += 1;
        let timer_id = self.next_timer_id;
        let events = self.events.clone();
        let entry_id = entry_id.to_string();
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let tick = HostEvent::Tick {
                    entry_id: entry_id.clone(),
                    timer_id,
                };
                if events.send(tick).await.is_err() {
                    break;
                }
            }
        });
        TickTask { id: timer_id, task }
    }

    fn timer_id(timer: &TickTask) -> TimerId {
        timer.id
    }

    fn cancel(&mut self, timer: TickTask) {
        timer.task.abort();
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl Dispatcher {
    fn new(host: MqttHost, status: watch::Sender<StatusView>, ready_grace: Duration) -> Self {
        Self {
            host,
            registry: ControllerRegistry::new(),
            status,
            ready_grace,
            grace_started: false,
        }
    }

    fn setup_entry(&mut self, entry: ClimateEntryConfig) {
        let entry_id = entry.entry_id.clone();
        if let Err(err) = self.registry.setup_entry(&mut self.host, entry) {
            warn!("skipping entry {entry_id}: {err}");
        }
    }

    /// State topic of every entity the entries read, then the status topic.
    /// The broker replays retained messages in this order, so the cache is
    /// seeded before a retained `online` triggers the startup check.
    fn subscription_topics(&self) -> Vec<String> {
        let prefix = &self.host.prefix;
        self.registry
            .referenced_entities()
            .into_iter()
            .filter_map(|entity_id| state_topic(prefix, entity_id))
            .chain(std::iter::once(status_topic(prefix)))
            .collect()
    }

    async fn run(mut self, mut events: mpsc::Receiver<HostEvent>) {
        while let Some(event) = events.recv().await {
            if self.handle(event).is_break() {
                break;
            }
        }
    }

    fn handle(&mut self, event: HostEvent) -> ControlFlow<()> {
        match event {
            HostEvent::Connected => self.start_ready_grace(),
            HostEvent::Publish { topic, payload } => {
                if let Err(err) = self.handle_publish(&topic, &payload) {
                    warn!("mqtt message handling error: {err:#}");
                }
            }
            HostEvent::SystemReady => self.registry.on_system_ready(&mut self.host),
            HostEvent::Tick { entry_id, timer_id } => {
                self.registry.on_tick(&mut self.host, &entry_id, timer_id)
            }
            HostEvent::Shutdown => {
                self.registry.shutdown(&mut self.host);
                self.publish_status();
                return ControlFlow::Break(());
            }
        }

        self.publish_status();
        ControlFlow::Continue(())
    }

    fn handle_publish(&mut self, topic: &str, payload: &[u8]) -> anyhow::Result<()> {
        if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
            warn!(
                "dropping oversized MQTT payload on topic {} ({} bytes)",
                topic,
                payload.len()
            );
            return Ok(());
        }

        let message = std::str::from_utf8(payload).context("non utf8 mqtt payload")?;
        let message = message.trim();

        if topic == status_topic(&self.host.prefix) {
            if message == STATUS_ONLINE {
                self.registry.on_system_ready(&mut self.host);
            }
            return Ok(());
        }

        let Some(entity_id) = entity_id_from_state_topic(&self.host.prefix, topic) else {
            debug!("ignoring message on {topic}");
            return Ok(());
        };

        // An empty retained payload means the entity is gone.
        let new = (!message.is_empty()).then(|| EntityState::new(message));
        let old = match &new {
            Some(state) => self.host.states.insert(entity_id.clone(), state.clone()),
            None => self.host.states.remove(&entity_id),
        };
        if old == new {
            return Ok(());
        }

        // Retained states replayed during startup only seed the cache.
        if !self.registry.is_system_ready() {
            debug!("cached {entity_id} = {message:?} before system ready");
            return Ok(());
        }

        self.registry
            .on_state_change(&mut self.host, &entity_id, old.as_ref(), new.as_ref());
        Ok(())
    }

    fn start_ready_grace(&mut self) {
        if self.grace_started || self.registry.is_system_ready() {
            return;
        }
        self.grace_started = true;

        let events = self.host.events.clone();
        let grace = self.ready_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = events.send(HostEvent::SystemReady).await;
        });
        debug!("system ready fallback in {}s", grace.as_secs());
    }

    fn publish_status(&self) {
        self.status.send_replace(StatusView {
            system_ready: self.registry.is_system_ready(),
            entries: self.registry.snapshots(),
        });
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status.borrow().clone();
    Json(status)
}

async fn handle_get_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> impl IntoResponse {
    let entry = state
        .status
        .borrow()
        .entries
        .iter()
        .find(|entry| entry.entry_id == entry_id)
        .cloned();

    match entry {
        Some(entry) => Json(entry).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Unknown entry"),
    }
}

impl ConfigStore {
    fn new() -> Self {
        let data_dir = std::env::var("CLIMATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.climate"));
        Self::at(data_dir)
    }

    fn at(data_dir: PathBuf) -> Self {
        Self {
            config_path: data_dir.join("config.json"),
        }
    }

    async fn load(&self) -> anyhow::Result<ControllerConfig> {
        match tokio::fs::read(&self.config_path).await {
            Ok(raw) => serde_json::from_slice::<ControllerConfig>(&raw)
                .with_context(|| format!("invalid config in {}", self.config_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(ControllerConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn apply_env_overrides(config: &mut ControllerConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("MQTT_HOST") {
        config.mqtt.host = host;
    }
    if let Some(port) = lookup("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
        config.mqtt.port = port;
    }
    if let Some(user) = lookup("MQTT_USER") {
        config.mqtt.user = user;
    }
    if let Some(pass) = lookup("MQTT_PASS") {
        config.mqtt.pass = pass;
    }
    if let Some(port) = lookup("CONTROLLER_HTTP_PORT").and_then(|value| value.parse::<u16>().ok())
    {
        config.http_port = port;
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
