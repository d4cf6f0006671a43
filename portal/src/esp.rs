use core::convert::TryInto;
use std::{
    collections::HashMap,
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    mqtt::client::{Details, EventPayload, QoS},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    delay::BLOCK,
    gpio::{AnyInputPin, Gpio34, Input, InputPin, PinDriver},
    i2c::{I2cConfig, I2cDriver},
    units::FromValueType,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    log::EspLogger,
    mqtt::client::{EspMqttClient, EspMqttConnection, MqttClientConfiguration},
    nvs::{EspDefaultNvsPartition, EspNvs},
    sys::EspError,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use pyportal_common::{
    config::NetworkConfig, EventHandler, InboundMessage, LogDisplay, LogEvents, Portal,
    PortalConfig, SensorReader, ShutdownSignal, TouchPoint, TouchSampler, Transport,
};

const NVS_NAMESPACE: &str = "pyportal";
const NVS_RUNTIME_KEY: &str = "runtime_json";

const ADT7410_ADDR: u8 = 0x48;
const ADT7410_REG_TEMP: u8 = 0x00;
const ADT7410_REG_CONFIG: u8 = 0x03;
const ADT7410_16BIT: u8 = 0x80;

const TOUCH_ADDR: u8 = 0x38;
const TOUCH_REG_STATUS: u8 = 0x02;

const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut config = load_runtime_config(&nvs_partition).unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        PortalConfig::default()
    });
    config.sanitize();
    config.validate().context("invalid runtime configuration")?;

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    let temperature_bus = I2cDriver::new(
        peripherals.i2c0,
        pins.gpio21,
        pins.gpio22,
        &I2cConfig::new().baudrate(100.kHz().into()),
    )?;
    let touch_bus = I2cDriver::new(
        peripherals.i2c1,
        pins.gpio18,
        pins.gpio19,
        &I2cConfig::new().baudrate(400.kHz().into()),
    )?;

    let sensors = BoardSensors::new(
        temperature_bus,
        peripherals.adc1,
        pins.gpio34,
        pins.gpio27.downgrade_input(),
    )
    .context("failed to initialize sensors")?;
    let touch = CapacitiveTouch::new(touch_bus);

    let _wifi = connect_wifi(peripherals.modem, sys_loop, nvs_partition, &config.network)
        .context("wifi startup failed")?;

    let transport = EspMqttTransport::new(&config, LogEvents)?;
    let mut portal = Portal::new(config, sensors, touch, transport, LogDisplay::default())
        .context("failed to assemble portal")?;

    // Nothing cancels on the device; the loop only ends on error.
    let cycles = portal.run(&ShutdownSignal::new()).context("portal loop failed")?;
    info!("portal loop ended after {cycles} cycles");
    Ok(())
}

fn load_runtime_config(partition: &EspDefaultNvsPartition) -> anyhow::Result<PortalConfig> {
    let nvs = EspNvs::new(partition.clone(), NVS_NAMESPACE, true)?;
    let mut buffer = vec![0_u8; 4096];

    match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
        Some(value) => Ok(PortalConfig::from_json(value.as_bytes())?),
        None => Ok(PortalConfig::default()),
    }
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<BlockingWifi<EspWifi<'static>>> {
    if network.wifi_ssid.is_empty() {
        return Err(anyhow!("wifi ssid not configured"));
    }

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?,
        sys_loop,
    )?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("connecting to wifi `{}`", network.wifi_ssid);

    let mut attempt = 1;
    loop {
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected on attempt {attempt}");
                return Ok(wifi);
            }
            Err(err) if attempt < WIFI_CONNECT_ATTEMPTS => {
                warn!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS} failed: {err:#}");
                let _ = wifi.disconnect();
                thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
                attempt += 1;
            }
            Err(err) => {
                return Err(anyhow::Error::from(err).context(format!(
                    "all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed"
                )));
            }
        }
    }
}

/// ADT7410 on I2C, the light sensor on an ADC pin and the PIR on a GPIO.
struct BoardSensors {
    i2c: I2cDriver<'static>,
    light: AdcChannelDriver<'static, Gpio34, AdcDriver<'static, ADC1>>,
    motion: PinDriver<'static, AnyInputPin, Input>,
}

impl BoardSensors {
    fn new(
        mut i2c: I2cDriver<'static>,
        adc: ADC1,
        light_pin: Gpio34,
        motion_pin: AnyInputPin,
    ) -> anyhow::Result<Self> {
        i2c.write(ADT7410_ADDR, &[ADT7410_REG_CONFIG, ADT7410_16BIT], BLOCK)
            .context("ADT7410 did not acknowledge")?;

        let light = AdcChannelDriver::new(
            AdcDriver::new(adc)?,
            light_pin,
            &AdcChannelConfig {
                attenuation: DB_11,
                ..Default::default()
            },
        )?;
        let motion = PinDriver::input(motion_pin)?;

        Ok(Self { i2c, light, motion })
    }
}

impl SensorReader for BoardSensors {
    type Error = EspError;

    /// 12-bit ADC counts scaled up to the full `u16` range.
    fn read_light(&mut self) -> Result<u16, EspError> {
        let raw = self.light.read_raw()?;
        Ok(raw.min(0x0fff) << 4)
    }

    fn read_temperature(&mut self) -> Result<f32, EspError> {
        let mut buf = [0_u8; 2];
        self.i2c.write_read(ADT7410_ADDR, &[ADT7410_REG_TEMP], &mut buf, BLOCK)?;
        Ok(f32::from(i16::from_be_bytes(buf)) / 128.0)
    }

    fn read_motion(&mut self) -> Result<bool, EspError> {
        Ok(self.motion.is_high())
    }
}

/// FT6206-style capacitive controller; reports the first touch point only.
struct CapacitiveTouch {
    i2c: I2cDriver<'static>,
}

impl CapacitiveTouch {
    fn new(i2c: I2cDriver<'static>) -> Self {
        Self { i2c }
    }
}

impl TouchSampler for CapacitiveTouch {
    type Error = EspError;

    fn sample(&mut self) -> Result<Option<TouchPoint>, EspError> {
        let mut buf = [0_u8; 5];
        self.i2c.write_read(TOUCH_ADDR, &[TOUCH_REG_STATUS], &mut buf, BLOCK)?;

        let touches = buf[0] & 0x0f;
        if touches == 0 || touches > 2 {
            return Ok(None);
        }
        let x = (i32::from(buf[1] & 0x0f) << 8) | i32::from(buf[2]);
        let y = (i32::from(buf[3] & 0x0f) << 8) | i32::from(buf[4]);
        Ok(Some(TouchPoint::new(x, y)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EspMqttError {
    #[error("esp-idf error: {0}")]
    Esp(#[from] EspError),
    #[error("no connection to broker within {0:?}")]
    ConnectTimeout(Duration),
    #[error("mqtt event pump stopped")]
    Closed,
}

/// Owned copy of the connection events the loop thread cares about.
enum MqttEvent {
    Connected(bool),
    Disconnected,
    Subscribed(u32),
    Received(InboundMessage),
}

pub struct EspMqttTransport<H> {
    client: EspMqttClient<'static>,
    events: Receiver<MqttEvent>,
    handler: H,
    connected: bool,
    subscribe_ids: HashMap<u32, String>,
    connect_timeout: Duration,
}

impl<H: EventHandler> EspMqttTransport<H> {
    pub fn new(config: &PortalConfig, handler: H) -> anyhow::Result<Self> {
        let network = &config.network;
        let url = format!("mqtt://{}:{}", network.mqtt_host, network.mqtt_port);

        let conf = MqttClientConfiguration {
            client_id: Some(config.client_id.as_str()),
            username: if network.mqtt_user.is_empty() {
                None
            } else {
                Some(network.mqtt_user.as_str())
            },
            password: if network.mqtt_pass.is_empty() {
                None
            } else {
                Some(network.mqtt_pass.as_str())
            },
            ..Default::default()
        };

        let (client, conn) = EspMqttClient::new(&url, &conf)?;
        let (tx, events) = mpsc::channel();
        spawn_event_pump(conn, tx)?;

        Ok(Self {
            client,
            events,
            handler,
            connected: false,
            subscribe_ids: HashMap::new(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        })
    }

    fn route(&mut self, event: MqttEvent) -> Option<InboundMessage> {
        match event {
            MqttEvent::Connected(session_present) => {
                self.connected = true;
                self.handler.on_connect(session_present);
            }
            MqttEvent::Disconnected => {
                if self.connected {
                    self.connected = false;
                    self.handler.on_disconnect();
                }
            }
            MqttEvent::Subscribed(id) => {
                let topic = self.subscribe_ids.remove(&id).unwrap_or_default();
                self.handler.on_subscribe(&topic, Some(QoS::AtMostOnce as u8));
            }
            MqttEvent::Received(message) => return Some(message),
        }
        None
    }
}

fn spawn_event_pump(mut conn: EspMqttConnection, tx: Sender<MqttEvent>) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("mqtt-rx".into())
        .stack_size(8 * 1024)
        .spawn(move || {
            while let Ok(event) = conn.next() {
                let event = match event.payload() {
                    EventPayload::Connected(session_present) => {
                        MqttEvent::Connected(session_present)
                    }
                    EventPayload::Disconnected => MqttEvent::Disconnected,
                    EventPayload::Subscribed(id) => MqttEvent::Subscribed(id),
                    EventPayload::Received {
                        topic: Some(topic),
                        data,
                        details: Details::Complete,
                        ..
                    } => MqttEvent::Received(InboundMessage {
                        topic: topic.to_string(),
                        payload: data.to_vec(),
                    }),
                    EventPayload::Error(err) => {
                        warn!("mqtt connection error: {err:?}");
                        continue;
                    }
                    _ => continue,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            info!("mqtt event pump stopped");
        })
        .context("failed to spawn mqtt thread")?;
    Ok(())
}

impl<H: EventHandler> Transport for EspMqttTransport<H> {
    type Error = EspMqttError;

    fn connect(&mut self) -> Result<(), EspMqttError> {
        let deadline = Instant::now() + self.connect_timeout;

        while !self.connected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => {
                    if let Some(message) = self.route(event) {
                        warn!("dropping message on {} received before connect", message.topic);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(EspMqttError::ConnectTimeout(self.connect_timeout))
                }
                Err(RecvTimeoutError::Disconnected) => return Err(EspMqttError::Closed),
            }
        }
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), EspMqttError> {
        let id = self.client.subscribe(topic, QoS::AtMostOnce)?;
        self.subscribe_ids.insert(id, topic.to_string());
        Ok(())
    }

    /// QoS 0 publishes never get a broker ack, so the handler hears about
    /// them as soon as the client has queued them.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), EspMqttError> {
        let id = self.client.publish(topic, QoS::AtMostOnce, false, payload)?;
        self.handler.on_publish(topic, id);
        Ok(())
    }

    fn service_once(&mut self) -> Result<Vec<InboundMessage>, EspMqttError> {
        let mut inbound = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => inbound.extend(self.route(event)),
                Err(TryRecvError::Empty) => return Ok(inbound),
                Err(TryRecvError::Disconnected) => return Err(EspMqttError::Closed),
            }
        }
    }
}
