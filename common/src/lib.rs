pub mod config;
pub mod display;
pub mod error;
pub mod feeds;
pub mod panel;
pub mod portal;
pub mod sensors;
pub mod sim;
pub mod telemetry;
pub mod topics;
pub mod types;

pub use config::{ButtonSpec, DisplayConfig, NetworkConfig, PortalConfig};
pub use display::{Display, LogDisplay};
pub use error::{BoxError, PortalError, TransportOp};
pub use feeds::{FeedBoard, FeedLabel};
pub use panel::{dispatch, Button, ButtonPanel, TouchOutcome};
pub use portal::{CycleReport, LoopState, Portal, ShutdownSignal};
pub use sensors::{SensorReader, TouchSampler};
pub use telemetry::{EventHandler, LogEvents, TelemetryPublisher, Transport};
pub use topics::*;
pub use types::{
    ButtonStyle, InboundMessage, Payload, Reading, Readings, Rect, SensorKind, TelemetryMessage,
    TouchPoint,
};
