use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};

use log::{info, warn};

use crate::{
    config::PortalConfig,
    display::Display,
    error::{PortalError, TransportOp},
    feeds::FeedBoard,
    panel::ButtonPanel,
    sensors::{read_all, SensorReader, TouchSampler},
    telemetry::{TelemetryPublisher, Transport},
    topics::FEED_TOPICS,
    types::{Readings, TouchPoint},
};

/// Cloneable cancellation token shared between the loop and whoever stops it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `timeout` unless cancelled first. Returns true when cancelled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut cancelled = flag.lock().unwrap_or_else(PoisonError::into_inner);

        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            cancelled = condvar
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

impl LoopState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub readings: Readings,
    pub touch: Option<TouchPoint>,
    pub selected: Option<u8>,
    pub inbound: usize,
    pub published: usize,
}

/// Owns every collaborator and drives the polling cycle.
pub struct Portal<S, T, P, D> {
    config: PortalConfig,
    sensors: S,
    touch: T,
    publisher: TelemetryPublisher<P>,
    display: D,
    panel: ButtonPanel,
    feeds: FeedBoard,
    state: LoopState,
    cycles: u64,
}

impl<S, T, P, D> Portal<S, T, P, D>
where
    S: SensorReader,
    T: TouchSampler,
    P: Transport,
    D: Display,
{
    pub fn new(
        mut config: PortalConfig,
        sensors: S,
        touch: T,
        transport: P,
        display: D,
    ) -> Result<Self, PortalError> {
        config.sanitize();
        config.validate()?;
        let panel = ButtonPanel::new(&config.buttons, config.display.bounds())?;

        Ok(Self {
            config,
            sensors,
            touch,
            publisher: TelemetryPublisher::new(transport),
            display,
            panel,
            feeds: FeedBoard::new(FEED_TOPICS),
            state: LoopState::Idle,
            cycles: 0,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn panel(&self) -> &ButtonPanel {
        &self.panel
    }

    pub fn feeds(&self) -> &FeedBoard {
        &self.feeds
    }

    pub fn transport(&self) -> &P {
        self.publisher.transport()
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    /// Connects, subscribes to the feed topics and draws the initial screen.
    /// A stopped portal cannot be restarted.
    pub fn start(&mut self) -> Result<(), PortalError> {
        match self.state {
            LoopState::Idle => {}
            LoopState::Running => return Ok(()),
            LoopState::Stopped => return Err(PortalError::Stopped),
        }

        info!(
            "attempting to connect to {}:{}",
            self.config.network.mqtt_host, self.config.network.mqtt_port
        );
        let transport = self.publisher.transport_mut();
        transport
            .connect()
            .map_err(|err| PortalError::transport(TransportOp::Connect, err))?;

        for topic in FEED_TOPICS {
            info!("subscribing to {topic}");
            transport
                .subscribe(topic)
                .map_err(|err| PortalError::transport(TransportOp::Subscribe, err))?;
        }

        self.display
            .set_backlight(self.config.display.backlight)
            .map_err(PortalError::display)?;
        self.display
            .show_buttons(self.panel.buttons())
            .map_err(PortalError::display)?;

        self.state = LoopState::Running;
        Ok(())
    }

    /// One pass: service transport, read sensors, dispatch touch, publish.
    pub fn run_cycle(&mut self) -> Result<CycleReport, PortalError> {
        self.start()?;

        let inbound = self
            .publisher
            .transport_mut()
            .service_once()
            .map_err(|err| PortalError::transport(TransportOp::Service, err))?;
        for message in &inbound {
            if let Some(label) = self.feeds.apply(message) {
                self.display.show_feed(label).map_err(PortalError::display)?;
            }
        }

        let readings = read_all(&mut self.sensors)?;

        let touch = self.touch.sample().map_err(PortalError::touch)?;
        let outcome = self.panel.apply_touch(touch);
        if outcome.changed {
            self.display
                .show_buttons(self.panel.buttons())
                .map_err(PortalError::display)?;
        }

        let published = self.publisher.publish_cycle(&readings, &self.panel)?;
        self.cycles = self.cycles.saturating_add(1);

        Ok(CycleReport {
            readings,
            touch,
            selected: outcome.selected,
            inbound: inbound.len(),
            published,
        })
    }

    /// Cycles until `shutdown` is cancelled, then disconnects. Any cycle
    /// error stops the loop and is returned as-is.
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> Result<u64, PortalError> {
        if let Err(err) = self.start() {
            self.state = LoopState::Stopped;
            return Err(err);
        }
        let interval = self.poll_interval();
        info!("polling every {}ms", interval.as_millis());

        while !shutdown.is_cancelled() {
            if let Err(err) = self.run_cycle() {
                self.state = LoopState::Stopped;
                return Err(err);
            }
            if shutdown.wait(interval) {
                break;
            }
        }

        self.state = LoopState::Stopped;
        info!("stopping after {} cycles", self.cycles);
        if let Err(err) = self.publisher.transport_mut().disconnect() {
            warn!("disconnect failed: {err}");
        }
        Ok(self.cycles)
    }
}
