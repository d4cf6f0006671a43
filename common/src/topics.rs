pub const TOPIC_LUX: &str = "pyportal/lux";
pub const TOPIC_TEMPERATURE: &str = "pyportal/temperature";
pub const TOPIC_PIR: &str = "pyportal/pir";
pub const TOPIC_BUTTON1: &str = "pyportal/button1";
pub const TOPIC_BUTTON2: &str = "pyportal/button2";

pub const TOPIC_FEED1: &str = "pyportal/feed1";
pub const TOPIC_FEED2: &str = "pyportal/feed2";

/// Published every cycle, in this order.
pub const TELEMETRY_TOPICS: [&str; 5] = [
    TOPIC_LUX,
    TOPIC_TEMPERATURE,
    TOPIC_PIR,
    TOPIC_BUTTON1,
    TOPIC_BUTTON2,
];

pub const FEED_TOPICS: [&str; 2] = [TOPIC_FEED1, TOPIC_FEED2];

/// Button ids whose state is reported on `TOPIC_BUTTON1` / `TOPIC_BUTTON2`.
pub const BUTTON1_ID: u8 = 1;
pub const BUTTON2_ID: u8 = 2;
