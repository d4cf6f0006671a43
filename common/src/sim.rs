//! Deterministic stand-ins for the board hardware, used by the host build.

use std::convert::Infallible;

use crate::{
    config::ButtonSpec,
    sensors::{SensorReader, TouchSampler},
    types::TouchPoint,
};

/// Sensor values derived from a tick counter that advances on every light read.
#[derive(Debug, Default, Clone)]
pub struct SimulatedSensors {
    tick: u64,
}

impl SimulatedSensors {
    pub fn tick(&self) -> u64 {
        self.tick
    }
}

impl SensorReader for SimulatedSensors {
    type Error = Infallible;

    fn read_light(&mut self) -> Result<u16, Infallible> {
        self.tick = self.tick.saturating_add(1);
        Ok(400 + (self.tick % 10) as u16 * 25)
    }

    fn read_temperature(&mut self) -> Result<f32, Infallible> {
        Ok(21.0 + (self.tick % 8) as f32 * 0.25)
    }

    fn read_motion(&mut self) -> Result<bool, Infallible> {
        Ok(self.tick % 7 == 0)
    }
}

/// Replays a fixed list of samples, wrapping around at the end.
#[derive(Debug, Clone)]
pub struct ScriptedTouch {
    script: Vec<Option<TouchPoint>>,
    position: usize,
}

impl ScriptedTouch {
    pub fn new(script: Vec<Option<TouchPoint>>) -> Self {
        Self {
            script,
            position: 0,
        }
    }

    /// Presses each button's center once, separated by `idle` empty samples.
    pub fn tour(buttons: &[ButtonSpec], idle: usize) -> Self {
        let mut script = Vec::with_capacity(buttons.len() * (idle + 1));
        for button in buttons {
            script.extend(std::iter::repeat(None).take(idle));
            script.push(Some(button.bounds.center()));
        }
        Self::new(script)
    }
}

impl TouchSampler for ScriptedTouch {
    type Error = Infallible;

    fn sample(&mut self) -> Result<Option<TouchPoint>, Infallible> {
        if self.script.is_empty() {
            return Ok(None);
        }
        let sample = self.script[self.position % self.script.len()];
        self.position = self.position.wrapping_add(1);
        Ok(sample)
    }
}
