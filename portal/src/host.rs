use std::{
    collections::{HashMap, VecDeque},
    io::ErrorKind,
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use rumqttc::{
    Client, ClientError, Connection, ConnectionError, Event, Incoming, MqttOptions, Outgoing, QoS,
    RecvTimeoutError, SubscribeReasonCode,
};
use tracing::{info, warn};

use pyportal_common::{
    sim::{ScriptedTouch, SimulatedSensors},
    EventHandler, InboundMessage, LogDisplay, LogEvents, Portal, PortalConfig, ShutdownSignal,
    Transport,
};

const REQUEST_CAPACITY: usize = 32;
const POLL_SLICE: Duration = Duration::from_millis(10);
const MAX_EVENTS_PER_SERVICE: usize = 64;
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const TOUCH_TOUR_IDLE_CYCLES: usize = 9;

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::new();
    let mut config = store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        PortalConfig::default()
    });
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.sanitize();
    config.validate().context("invalid runtime configuration")?;

    let shutdown = ShutdownSignal::new();
    spawn_signal_listener(shutdown.clone())?;

    // Hardware integration point: the device build swaps these for real drivers.
    let sensors = SimulatedSensors::default();
    let touch = ScriptedTouch::tour(&config.buttons, TOUCH_TOUR_IDLE_CYCLES);
    let transport = RumqttTransport::new(&config, LogEvents);

    let mut portal = Portal::new(config, sensors, touch, transport, LogDisplay::default())
        .context("failed to assemble portal")?;

    info!("portal node started");
    let cycles = portal.run(&shutdown).context("portal loop failed")?;
    info!(
        "portal node {} after {cycles} cycles",
        portal.state().as_str().to_lowercase()
    );
    Ok(())
}

fn spawn_signal_listener(shutdown: ShutdownSignal) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || match runtime.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => {
                info!("shutdown requested");
                shutdown.cancel();
            }
            Err(err) => warn!("failed to listen for ctrl-c: {err}"),
        })
        .context("failed to spawn signal thread")?;
    Ok(())
}

/// Environment variables win over the stored runtime config.
fn apply_env_overrides(config: &mut PortalConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("MQTT_HOST") {
        config.network.mqtt_host = host;
    }
    if let Some(port) = lookup("MQTT_PORT") {
        match port.parse::<u16>() {
            Ok(port) => config.network.mqtt_port = port,
            Err(err) => warn!("ignoring MQTT_PORT={port}: {err}"),
        }
    }
    if let Some(user) = lookup("MQTT_USER") {
        config.network.mqtt_user = user;
    }
    if let Some(pass) = lookup("MQTT_PASS") {
        config.network.mqtt_pass = pass;
    }
    if let Some(interval) = lookup("PYPORTAL_POLL_MS") {
        match interval.parse::<u64>() {
            Ok(interval) => config.poll_interval_ms = interval,
            Err(err) => warn!("ignoring PYPORTAL_POLL_MS={interval}: {err}"),
        }
    }
}

struct ConfigStore {
    runtime_path: PathBuf,
}

impl ConfigStore {
    fn new() -> Self {
        let data_dir = std::env::var("PYPORTAL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.pyportal"));
        Self::at(data_dir)
    }

    fn at(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: data_dir.join("runtime.json"),
        }
    }

    fn load_runtime_config(&self) -> anyhow::Result<PortalConfig> {
        match std::fs::read(&self.runtime_path) {
            Ok(raw) => Ok(PortalConfig::from_json(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(PortalConfig::default()),
            Err(err) => Err(err).with_context(|| {
                format!("failed to read {}", self.runtime_path.display())
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("mqtt request rejected: {0}")]
    Client(#[from] ClientError),
    #[error("mqtt connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("no connack from broker within {0:?}")]
    ConnectTimeout(Duration),
    #[error("mqtt event loop closed")]
    Closed,
}

/// Turns raw client events into handler callbacks and inbound messages.
///
/// rumqttc reports outgoing packets by id only, so topics are queued in
/// request order and matched up as their packets leave.
struct EventRouter<H> {
    handler: H,
    connected: bool,
    pending_publishes: VecDeque<String>,
    pending_subscribes: VecDeque<String>,
    subscribe_ids: HashMap<u16, String>,
}

impl<H: EventHandler> EventRouter<H> {
    fn new(handler: H) -> Self {
        Self {
            handler,
            connected: false,
            pending_publishes: VecDeque::new(),
            pending_subscribes: VecDeque::new(),
            subscribe_ids: HashMap::new(),
        }
    }

    fn route(&mut self, event: Event) -> Option<InboundMessage> {
        match event {
            Event::Incoming(Incoming::ConnAck(ack)) => {
                self.connected = true;
                self.handler.on_connect(ack.session_present);
                None
            }
            Event::Incoming(Incoming::Publish(message)) => Some(InboundMessage {
                topic: message.topic,
                payload: message.payload.to_vec(),
            }),
            Event::Incoming(Incoming::SubAck(ack)) => {
                let topic = self.subscribe_ids.remove(&ack.pkid).unwrap_or_default();
                let granted = ack.return_codes.first().and_then(|code| match code {
                    SubscribeReasonCode::Success(qos) => Some(*qos as u8),
                    SubscribeReasonCode::Failure => None,
                });
                self.handler.on_subscribe(&topic, granted);
                None
            }
            Event::Incoming(Incoming::Disconnect) | Event::Outgoing(Outgoing::Disconnect) => {
                self.lost();
                None
            }
            Event::Outgoing(Outgoing::Publish(pkid)) => {
                if let Some(topic) = self.pending_publishes.pop_front() {
                    self.handler.on_publish(&topic, u32::from(pkid));
                }
                None
            }
            Event::Outgoing(Outgoing::Subscribe(pkid)) => {
                if let Some(topic) = self.pending_subscribes.pop_front() {
                    self.subscribe_ids.insert(pkid, topic);
                }
                None
            }
            _ => None,
        }
    }

    fn lost(&mut self) {
        if self.connected {
            self.connected = false;
            self.handler.on_disconnect();
        }
    }
}

pub struct RumqttTransport<H> {
    client: Client,
    connection: Connection,
    router: EventRouter<H>,
    backlog: Vec<InboundMessage>,
    connect_timeout: Duration,
}

impl<H: EventHandler> RumqttTransport<H> {
    pub fn new(config: &PortalConfig, handler: H) -> Self {
        let network = &config.network;
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            network.mqtt_host.clone(),
            network.mqtt_port,
        );
        options.set_keep_alive(KEEP_ALIVE);
        if network.has_credentials() {
            options.set_credentials(network.mqtt_user.clone(), network.mqtt_pass.clone());
        }

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        Self {
            client,
            connection,
            router: EventRouter::new(handler),
            backlog: Vec::new(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<Event>, MqttError> {
        match self.connection.recv_timeout(timeout) {
            Ok(Ok(event)) => Ok(Some(event)),
            Ok(Err(err)) => Err(err.into()),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(MqttError::Closed),
        }
    }
}

impl<H: EventHandler> Transport for RumqttTransport<H> {
    type Error = MqttError;

    fn connect(&mut self) -> Result<(), MqttError> {
        let deadline = Instant::now() + self.connect_timeout;

        while !self.router.connected {
            let now = Instant::now();
            if now >= deadline {
                return Err(MqttError::ConnectTimeout(self.connect_timeout));
            }
            if let Some(event) = self.next_event(deadline - now)? {
                self.backlog.extend(self.router.route(event));
            }
        }
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        self.client.subscribe(topic, QoS::AtMostOnce)?;
        self.router.pending_subscribes.push_back(topic.to_string());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        self.client.publish(topic, QoS::AtMostOnce, false, payload.to_vec())?;
        self.router.pending_publishes.push_back(topic.to_string());
        Ok(())
    }

    fn service_once(&mut self) -> Result<Vec<InboundMessage>, MqttError> {
        let mut inbound = std::mem::take(&mut self.backlog);

        for _ in 0..MAX_EVENTS_PER_SERVICE {
            match self.next_event(POLL_SLICE) {
                Ok(Some(event)) => inbound.extend(self.router.route(event)),
                Ok(None) => break,
                Err(err) => {
                    self.router.lost();
                    return Err(err);
                }
            }
        }
        Ok(inbound)
    }

    fn disconnect(&mut self) -> Result<(), MqttError> {
        if !self.router.connected {
            return Ok(());
        }
        self.client.disconnect()?;

        let deadline = Instant::now() + DISCONNECT_GRACE;
        while self.router.connected && Instant::now() < deadline {
            match self.next_event(POLL_SLICE) {
                Ok(Some(event)) => {
                    self.router.route(event);
                }
                Ok(None) => {}
                Err(_) => self.router.lost(),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use pyportal_common::{TOPIC_FEED1, TOPIC_FEED2, TOPIC_LUX};
    use rumqttc::{ConnAck, ConnectReturnCode, Publish, SubAck};

    use super::*;

    #[derive(Default)]
    struct Recorded {
        events: Vec<String>,
    }

    impl EventHandler for Recorded {
        fn on_connect(&mut self, session_present: bool) {
            self.events.push(format!("connect {session_present}"));
        }

        fn on_disconnect(&mut self) {
            self.events.push("disconnect".to_string());
        }

        fn on_subscribe(&mut self, topic: &str, granted_qos: Option<u8>) {
            self.events.push(format!("subscribe {topic} {granted_qos:?}"));
        }

        fn on_publish(&mut self, topic: &str, packet_id: u32) {
            self.events.push(format!("publish {topic} {packet_id}"));
        }
    }

    fn connack() -> Event {
        Event::Incoming(Incoming::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
        }))
    }

    #[test]
    fn router_reports_lifecycle_in_order() {
        let mut router = EventRouter::new(Recorded::default());
        router.pending_subscribes.push_back(TOPIC_FEED1.to_string());
        router.pending_subscribes.push_back(TOPIC_FEED2.to_string());
        router.pending_publishes.push_back(TOPIC_LUX.to_string());

        router.route(connack());
        router.route(Event::Outgoing(Outgoing::Subscribe(1)));
        router.route(Event::Outgoing(Outgoing::Subscribe(2)));
        router.route(Event::Incoming(Incoming::SubAck(SubAck {
            pkid: 2,
            return_codes: vec![SubscribeReasonCode::Failure],
        })));
        router.route(Event::Incoming(Incoming::SubAck(SubAck {
            pkid: 1,
            return_codes: vec![SubscribeReasonCode::Success(QoS::AtMostOnce)],
        })));
        router.route(Event::Outgoing(Outgoing::Publish(0)));
        router.route(Event::Outgoing(Outgoing::Disconnect));

        assert_eq!(
            router.handler.events,
            vec![
                "connect false".to_string(),
                "subscribe pyportal/feed2 None".to_string(),
                "subscribe pyportal/feed1 Some(0)".to_string(),
                "publish pyportal/lux 0".to_string(),
                "disconnect".to_string(),
            ]
        );
        assert!(!router.connected);
        assert_eq!(router.subscribe_ids, HashMap::new());
    }

    #[test]
    fn router_returns_inbound_publishes() {
        let mut router = EventRouter::new(Recorded::default());

        let inbound = router.route(Event::Incoming(Incoming::Publish(Publish::new(
            TOPIC_FEED1,
            QoS::AtMostOnce,
            "hello",
        ))));

        assert_eq!(
            inbound,
            Some(InboundMessage {
                topic: TOPIC_FEED1.to_string(),
                payload: b"hello".to_vec(),
            })
        );
        assert!(router.handler.events.is_empty());
    }

    #[test]
    fn publish_packet_ids_reach_the_handler_unchanged() {
        let mut router = EventRouter::new(Recorded::default());
        router.pending_publishes.push_back(TOPIC_LUX.to_string());

        router.route(Event::Outgoing(Outgoing::Publish(u16::MAX)));

        assert_eq!(
            router.handler.events,
            vec![format!("publish pyportal/lux {}", u16::MAX)]
        );
    }

    #[test]
    fn disconnect_is_reported_once() {
        let mut router = EventRouter::new(Recorded::default());
        router.lost();
        router.route(connack());
        router.lost();
        router.lost();

        assert_eq!(
            router.handler.events,
            vec!["connect false".to_string(), "disconnect".to_string()]
        );
    }

    #[test]
    fn env_overrides_win_over_stored_config() {
        let env: HashMap<&str, &str> = [
            ("MQTT_HOST", "broker.lan"),
            ("MQTT_PORT", "8883"),
            ("MQTT_USER", "portal"),
            ("MQTT_PASS", "secret"),
            ("PYPORTAL_POLL_MS", "250"),
        ]
        .into_iter()
        .collect();
        let mut config = PortalConfig::default();

        apply_env_overrides(&mut config, |key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.network.mqtt_host, "broker.lan");
        assert_eq!(config.network.mqtt_port, 8883);
        assert_eq!(config.network.mqtt_user, "portal");
        assert_eq!(config.network.mqtt_pass, "secret");
        assert_eq!(config.poll_interval_ms, 250);
    }

    #[test]
    fn unparsable_env_values_are_ignored() {
        let mut config = PortalConfig::default();

        apply_env_overrides(&mut config, |key| match key {
            "MQTT_PORT" => Some("not-a-port".to_string()),
            "PYPORTAL_POLL_MS" => Some("-1".to_string()),
            _ => None,
        });

        assert_eq!(config.network.mqtt_port, 1883);
        assert_eq!(config.poll_interval_ms, 500);
    }

    #[test]
    fn missing_runtime_file_means_defaults() {
        let dir = std::env::temp_dir().join(format!("pyportal-missing-{}", std::process::id()));
        let config = ConfigStore::at(dir).load_runtime_config().unwrap();

        assert_eq!(config.network.mqtt_port, 1883);
        assert_eq!(config.buttons.len(), 3);
    }

    #[test]
    fn runtime_file_is_loaded_and_sanitized() {
        let dir = std::env::temp_dir().join(format!("pyportal-store-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut stored = PortalConfig::default();
        stored.network.mqtt_host = "10.0.0.5".to_string();
        stored.display.backlight = 4.0;
        std::fs::write(
            dir.join("runtime.json"),
            serde_json::to_vec_pretty(&stored).unwrap(),
        )
        .unwrap();

        let config = ConfigStore::at(dir.clone()).load_runtime_config().unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(config.network.mqtt_host, "10.0.0.5");
        assert_eq!(config.display.backlight, 1.0);
    }

    #[test]
    fn unreachable_broker_fails_to_connect() {
        let mut config = PortalConfig::default();
        config.network.mqtt_host = "127.0.0.1".to_string();
        config.network.mqtt_port = 1;
        config.connect_timeout_ms = 2_000;
        let mut transport = RumqttTransport::new(&config, Recorded::default());

        assert!(transport.connect().is_err());
        assert!(transport.router.handler.events.is_empty());
    }
}
