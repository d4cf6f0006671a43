use log::info;

use crate::{
    error::{PortalError, TransportOp},
    panel::ButtonPanel,
    topics::{BUTTON1_ID, BUTTON2_ID, TOPIC_BUTTON1, TOPIC_BUTTON2},
    types::{InboundMessage, Payload, Readings, TelemetryMessage},
};

/// Broker lifecycle notifications. Implementations are handed to the
/// transport when it is built and called from `connect`/`service_once`.
pub trait EventHandler {
    fn on_connect(&mut self, session_present: bool);
    fn on_disconnect(&mut self);
    fn on_subscribe(&mut self, topic: &str, granted_qos: Option<u8>);
    fn on_publish(&mut self, topic: &str, packet_id: u32);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

impl EventHandler for LogEvents {
    fn on_connect(&mut self, session_present: bool) {
        info!("connected to mqtt broker (session present: {session_present})");
    }

    fn on_disconnect(&mut self) {
        info!("disconnected from mqtt broker");
    }

    fn on_subscribe(&mut self, topic: &str, granted_qos: Option<u8>) {
        match granted_qos {
            Some(qos) => info!("subscribed to {topic} with qos {qos}"),
            None => info!("subscription to {topic} rejected by broker"),
        }
    }

    fn on_publish(&mut self, topic: &str, packet_id: u32) {
        info!("published to {topic} with pid {packet_id}");
    }
}

/// Publish/subscribe client. The broker connection and reconnect policy
/// belong entirely to the implementation.
pub trait Transport {
    type Error: std::error::Error + Send + Sync + 'static;

    fn connect(&mut self) -> Result<(), Self::Error>;

    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error>;

    /// Handles whatever inbound/outbound work is pending without waiting for
    /// more, returning the messages received on subscribed topics.
    fn service_once(&mut self) -> Result<Vec<InboundMessage>, Self::Error>;

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// The five messages sent every cycle, in publish order: the sensor
/// readings, then the two reported buttons.
pub fn cycle_messages(readings: &Readings, panel: &ButtonPanel) -> Vec<TelemetryMessage> {
    let buttons = [(TOPIC_BUTTON1, BUTTON1_ID), (TOPIC_BUTTON2, BUTTON2_ID)]
        .into_iter()
        .map(|(topic, id)| TelemetryMessage::new(topic, Payload::Int(i64::from(panel.state(id)))));

    readings
        .iter()
        .map(|reading| TelemetryMessage::new(reading.kind().topic(), reading.payload()))
        .chain(buttons)
        .collect()
}

pub struct TelemetryPublisher<P> {
    transport: P,
    sent: u64,
}

impl<P: Transport> TelemetryPublisher<P> {
    pub fn new(transport: P) -> Self {
        Self { transport, sent: 0 }
    }

    pub fn transport(&self) -> &P {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut P {
        &mut self.transport
    }

    pub fn into_transport(self) -> P {
        self.transport
    }

    /// Total messages handed to the transport so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn publish(&mut self, message: &TelemetryMessage) -> Result<(), PortalError> {
        info!("sending {} value: {}", message.topic, message.payload);
        self.transport
            .publish(message.topic, &message.encode())
            .map_err(|err| PortalError::transport(TransportOp::Publish, err))?;
        self.sent = self.sent.saturating_add(1);
        Ok(())
    }

    /// Publishes every cycle topic unconditionally; returns how many went out.
    pub fn publish_cycle(
        &mut self,
        readings: &Readings,
        panel: &ButtonPanel,
    ) -> Result<usize, PortalError> {
        let messages = cycle_messages(readings, panel);
        for message in &messages {
            self.publish(message)?;
        }
        Ok(messages.len())
    }
}
