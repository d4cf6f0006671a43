use log::{info, warn};

use crate::types::InboundMessage;

pub const MAX_FEED_PAYLOAD_BYTES: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedLabel {
    pub topic: String,
    pub text: Option<String>,
}

/// Static display labels fed from subscribed topics. Payloads are shown
/// verbatim, never parsed.
#[derive(Debug, Clone)]
pub struct FeedBoard {
    labels: Vec<FeedLabel>,
}

impl FeedBoard {
    pub fn new<'a>(topics: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            labels: topics
                .into_iter()
                .map(|topic| FeedLabel {
                    topic: topic.to_string(),
                    text: None,
                })
                .collect(),
        }
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|label| label.topic.as_str())
    }

    pub fn labels(&self) -> &[FeedLabel] {
        &self.labels
    }

    pub fn text(&self, topic: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| label.topic == topic)
            .and_then(|label| label.text.as_deref())
    }

    /// Returns the label that changed, if any.
    pub fn apply(&mut self, message: &InboundMessage) -> Option<&FeedLabel> {
        let Some(index) = self
            .labels
            .iter()
            .position(|label| label.topic == message.topic)
        else {
            return None;
        };

        if message.payload.len() > MAX_FEED_PAYLOAD_BYTES {
            warn!(
                "dropping oversized feed payload on topic {} ({} bytes)",
                message.topic,
                message.payload.len()
            );
            return None;
        }

        let text = match std::str::from_utf8(&message.payload) {
            Ok(text) => text,
            Err(err) => {
                warn!("dropping non utf8 feed payload on topic {}: {err}", message.topic);
                return None;
            }
        };

        info!("feed {} -> {}", message.topic, text);

        let label = &mut self.labels[index];
        if label.text.as_deref() == Some(text) {
            return None;
        }
        label.text = Some(text.to_string());
        Some(&*label)
    }
}
