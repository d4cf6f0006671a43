use serde::{Deserialize, Serialize};

use crate::{
    error::PortalError,
    types::{ButtonStyle, Rect},
};

pub const BUTTON_WIDTH: u32 = 80;
pub const BUTTON_HEIGHT: u32 = 40;
pub const BUTTON_MARGIN: i32 = 20;

const MIN_CONNECT_TIMEOUT_MS: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

impl NetworkConfig {
    pub fn has_credentials(&self) -> bool {
        !self.mqtt_user.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub backlight: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            backlight: 1.0,
        }
    }
}

impl DisplayConfig {
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonSpec {
    pub id: u8,
    pub bounds: Rect,
    pub label: String,
    #[serde(default)]
    pub style: ButtonStyle,
}

impl ButtonSpec {
    pub fn new(id: u8, bounds: Rect, label: impl Into<String>, style: ButtonStyle) -> Self {
        Self {
            id,
            bounds,
            label: label.into(),
            style,
        }
    }
}

/// Three buttons: one on the top row, two side by side on the second row.
pub fn default_layout() -> Vec<ButtonSpec> {
    vec![
        ButtonSpec::new(
            0,
            Rect::new(BUTTON_MARGIN, BUTTON_MARGIN, BUTTON_WIDTH, BUTTON_HEIGHT),
            "button0",
            ButtonStyle::Rect,
        ),
        ButtonSpec::new(
            1,
            Rect::new(
                BUTTON_MARGIN * 2 + BUTTON_WIDTH as i32,
                BUTTON_MARGIN * 2 + BUTTON_HEIGHT as i32,
                BUTTON_WIDTH,
                BUTTON_HEIGHT,
            ),
            "button1",
            ButtonStyle::RoundRect,
        ),
        ButtonSpec::new(
            2,
            Rect::new(
                BUTTON_MARGIN * 3 + BUTTON_WIDTH as i32 * 2,
                BUTTON_MARGIN * 2 + BUTTON_HEIGHT as i32,
                BUTTON_WIDTH,
                BUTTON_HEIGHT,
            ),
            "button2",
            ButtonStyle::ShadowRect,
        ),
    ]
}

/// Missing keys in a stored config fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub network: NetworkConfig,
    pub client_id: String,
    pub poll_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub display: DisplayConfig,
    pub buttons: Vec<ButtonSpec>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            client_id: "pyportal-node".to_string(),
            poll_interval_ms: 500,
            connect_timeout_ms: 10_000,
            display: DisplayConfig::default(),
            buttons: default_layout(),
        }
    }
}

impl PortalConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, PortalError> {
        let mut config: Self = serde_json::from_slice(raw)
            .map_err(|err| PortalError::Config(format!("malformed runtime config: {err}")))?;
        config.sanitize();
        Ok(config)
    }

    pub fn sanitize(&mut self) {
        self.display.backlight = if self.display.backlight.is_finite() {
            self.display.backlight.clamp(0.0, 1.0)
        } else {
            1.0
        };

        if self.connect_timeout_ms < MIN_CONNECT_TIMEOUT_MS {
            self.connect_timeout_ms = MIN_CONNECT_TIMEOUT_MS;
        }

        if self.client_id.trim().is_empty() {
            self.client_id = "pyportal-node".to_string();
        }
    }

    pub fn validate(&self) -> Result<(), PortalError> {
        if self.network.mqtt_host.trim().is_empty() {
            return Err(PortalError::Config("mqtt_host cannot be empty".to_string()));
        }
        if self.network.mqtt_port == 0 {
            return Err(PortalError::Config("mqtt_port must be between 1 and 65535".to_string()));
        }
        if self.display.width == 0 || self.display.height == 0 {
            return Err(PortalError::Config("display size must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_layout_matches_screen_positions() {
        let bounds: Vec<Rect> = default_layout().iter().map(|spec| spec.bounds).collect();

        assert_eq!(
            bounds,
            vec![
                Rect::new(20, 20, 80, 40),
                Rect::new(120, 80, 80, 40),
                Rect::new(220, 80, 80, 40),
            ]
        );
    }

    #[test]
    fn default_layout_fits_on_screen() {
        let screen = DisplayConfig::default();
        for spec in default_layout() {
            let right = spec.bounds.x as u32 + spec.bounds.width;
            let bottom = spec.bounds.y as u32 + spec.bounds.height;
            assert!(right <= screen.width, "{} overflows horizontally", spec.label);
            assert!(bottom <= screen.height, "{} overflows vertically", spec.label);
        }
    }

    #[test]
    fn sanitize_clamps_backlight_and_timeouts() {
        let mut config = PortalConfig::default();
        config.display.backlight = 3.0;
        config.connect_timeout_ms = 0;
        config.client_id = "  ".to_string();
        config.sanitize();

        assert_eq!(config.display.backlight, 1.0);
        assert_eq!(config.connect_timeout_ms, 100);
        assert_eq!(config.client_id, "pyportal-node");

        config.display.backlight = -0.5;
        config.sanitize();
        assert_eq!(config.display.backlight, 0.0);

        config.display.backlight = f32::NAN;
        config.sanitize();
        assert_eq!(config.display.backlight, 1.0);
    }

    #[test]
    fn validate_rejects_missing_broker() {
        let mut config = PortalConfig::default();
        config.network.mqtt_host = " ".to_string();
        assert!(matches!(config.validate(), Err(PortalError::Config(_))));

        let mut config = PortalConfig::default();
        config.network.mqtt_port = 0;
        assert!(matches!(config.validate(), Err(PortalError::Config(_))));

        assert!(PortalConfig::default().validate().is_ok());
    }

    #[test]
    fn from_json_fills_optional_sections() {
        let raw = br#"{
            "network": {
                "wifi_ssid": "lab",
                "wifi_pass": "secret",
                "mqtt_host": "broker.local",
                "mqtt_port": 8883,
                "mqtt_user": "portal",
                "mqtt_pass": "pw"
            },
            "client_id": "portal-7",
            "poll_interval_ms": 250,
            "connect_timeout_ms": 5000
        }"#;

        let config = PortalConfig::from_json(raw).unwrap();

        assert_eq!(config.network.mqtt_host, "broker.local");
        assert_eq!(config.network.mqtt_port, 8883);
        assert!(config.network.has_credentials());
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.display.width, 320);
        assert_eq!(config.buttons, default_layout());
    }

    #[test]
    fn from_json_accepts_partial_network_section() {
        let config = PortalConfig::from_json(br#"{"network": {"mqtt_host": "10.1.1.2"}}"#).unwrap();

        assert_eq!(config.network.mqtt_host, "10.1.1.2");
        assert_eq!(config.network.mqtt_port, 1883);
        assert_eq!(config.client_id, "pyportal-node");
        assert_eq!(config.poll_interval_ms, 500);
    }

    #[test]
    fn from_json_reports_malformed_input() {
        let err = PortalConfig::from_json(b"{ not json").unwrap_err();
        assert!(err.to_string().contains("malformed runtime config"));
    }
}
