use std::fmt;

use serde::{Deserialize, Serialize};

use crate::topics::{TOPIC_LUX, TOPIC_PIR, TOPIC_TEMPERATURE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Light,
    Temperature,
    Motion,
}

impl SensorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "LIGHT",
            Self::Temperature => "TEMPERATURE",
            Self::Motion => "MOTION",
        }
    }

    /// Topic this sensor's reading is published on.
    pub fn topic(self) -> &'static str {
        match self {
            Self::Light => TOPIC_LUX,
            Self::Temperature => TOPIC_TEMPERATURE,
            Self::Motion => TOPIC_PIR,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Light(u16),
    /// Degrees Celsius, as reported by the driver.
    Temperature(f32),
    Motion(bool),
}

impl Reading {
    pub fn kind(&self) -> SensorKind {
        match self {
            Self::Light(_) => SensorKind::Light,
            Self::Temperature(_) => SensorKind::Temperature,
            Self::Motion(_) => SensorKind::Motion,
        }
    }

    pub fn payload(&self) -> Payload {
        match *self {
            Self::Light(value) => Payload::Int(i64::from(value)),
            Self::Temperature(value) => Payload::Float(value),
            Self::Motion(value) => Payload::Bool(value),
        }
    }
}

/// One snapshot of every sensor, taken fresh each cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub light: u16,
    pub temperature_c: f32,
    pub motion: bool,
}

impl Readings {
    pub fn iter(&self) -> impl Iterator<Item = Reading> {
        [
            Reading::Light(self.light),
            Reading::Temperature(self.temperature_c),
            Reading::Motion(self.motion),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Int(i64),
    Float(f32),
    Bool(bool),
    Text(String),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryMessage {
    pub topic: &'static str,
    pub payload: Payload,
}

impl TelemetryMessage {
    pub fn new(topic: &'static str, payload: Payload) -> Self {
        Self { topic, payload }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.payload.to_string().into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchPoint {
    pub x: i32,
    pub y: i32,
}

impl TouchPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, point: TouchPoint) -> bool {
        let (px, py) = (i64::from(point.x), i64::from(point.y));
        let (x, y) = (i64::from(self.x), i64::from(self.y));
        px >= x
            && px < x + i64::from(self.width)
            && py >= y
            && py < y + i64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Midpoint of the box, clamped into `i32` for boxes reaching past its range.
    pub fn center(&self) -> TouchPoint {
        let mid = |start: i32, len: u32| {
            let mid = i64::from(start) + i64::from(len / 2);
            mid.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
        };
        TouchPoint::new(mid(self.x, self.width), mid(self.y, self.height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ButtonStyle {
    #[default]
    Rect,
    RoundRect,
    ShadowRect,
}

impl ButtonStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rect => "RECT",
            Self::RoundRect => "ROUNDRECT",
            Self::ShadowRect => "SHADOWRECT",
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::topics::TELEMETRY_TOPICS;

    #[test]
    fn rect_edges_are_half_open() {
        let rect = Rect::new(10, 10, 100, 100);

        assert!(rect.contains(TouchPoint::new(10, 10)));
        assert!(rect.contains(TouchPoint::new(109, 109)));
        assert!(!rect.contains(TouchPoint::new(110, 50)));
        assert!(!rect.contains(TouchPoint::new(50, 110)));
        assert!(!rect.contains(TouchPoint::new(9, 50)));
    }

    #[test]
    fn rect_handles_extreme_coordinates() {
        let rect = Rect::new(i32::MAX - 1, 0, u32::MAX, 10);

        assert!(rect.contains(TouchPoint::new(i32::MAX, 5)));
        assert!(!rect.contains(TouchPoint::new(i32::MIN, 5)));
    }

    #[test]
    fn center_saturates_instead_of_overflowing() {
        assert_eq!(Rect::new(10, 20, 100, 40).center(), TouchPoint::new(60, 40));

        let far = Rect::new(i32::MAX - 10, 0, 100, 10);
        assert_eq!(far.center(), TouchPoint::new(i32::MAX, 5));
        assert!(far.contains(far.center()));
    }

    #[test]
    fn payloads_render_as_plain_text() {
        assert_eq!(Reading::Light(500).payload().to_string(), "500");
        assert_eq!(Reading::Temperature(21.5).payload().to_string(), "21.5");
        assert_eq!(Reading::Motion(false).payload().to_string(), "false");
        assert_eq!(Payload::Text("hi".into()).to_string(), "hi");
    }

    #[test]
    fn readings_iterate_in_publish_order() {
        let readings = Readings {
            light: 1,
            temperature_c: 2.0,
            motion: true,
        };
        let kinds: Vec<_> = readings.iter().map(|reading| reading.kind()).collect();

        assert_eq!(
            kinds,
            vec![SensorKind::Light, SensorKind::Temperature, SensorKind::Motion]
        );

        let topics: Vec<_> = kinds.iter().map(|kind| kind.topic()).collect();
        assert_eq!(topics, TELEMETRY_TOPICS[..3].to_vec());
    }
}
