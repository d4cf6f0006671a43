use crate::{
    error::PortalError,
    types::{Readings, SensorKind, TouchPoint},
};

/// Blocking reads straight through to the drivers. No caching, no retries.
pub trait SensorReader {
    type Error: std::error::Error + Send + Sync + 'static;

    fn read_light(&mut self) -> Result<u16, Self::Error>;

    /// Degrees Celsius.
    fn read_temperature(&mut self) -> Result<f32, Self::Error>;

    fn read_motion(&mut self) -> Result<bool, Self::Error>;
}

pub trait TouchSampler {
    type Error: std::error::Error + Send + Sync + 'static;

    /// `None` when nothing is touching the panel.
    fn sample(&mut self) -> Result<Option<TouchPoint>, Self::Error>;
}

/// Reads light, temperature and motion in that order, stopping at the first failure.
pub fn read_all<S: SensorReader>(sensors: &mut S) -> Result<Readings, PortalError> {
    let light = sensors
        .read_light()
        .map_err(|err| PortalError::sensor(SensorKind::Light, err))?;
    let temperature_c = sensors
        .read_temperature()
        .map_err(|err| PortalError::sensor(SensorKind::Temperature, err))?;
    let motion = sensors
        .read_motion()
        .map_err(|err| PortalError::sensor(SensorKind::Motion, err))?;

    Ok(Readings {
        light,
        temperature_c,
        motion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("i2c nack")]
    struct Nack;

    struct FlakyTemperature {
        light_reads: u32,
    }

    impl SensorReader for FlakyTemperature {
        type Error = Nack;

        fn read_light(&mut self) -> Result<u16, Nack> {
            self.light_reads += 1;
            Ok(42)
        }

        fn read_temperature(&mut self) -> Result<f32, Nack> {
            Err(Nack)
        }

        fn read_motion(&mut self) -> Result<bool, Nack> {
            panic!("motion must not be read after a temperature failure");
        }
    }

    #[test]
    fn first_failure_is_tagged_with_its_sensor() {
        let mut sensors = FlakyTemperature { light_reads: 0 };

        let err = read_all(&mut sensors).unwrap_err();

        assert_eq!(sensors.light_reads, 1);
        assert!(matches!(
            err,
            PortalError::Sensor {
                kind: SensorKind::Temperature,
                ..
            }
        ));
        assert_eq!(err.to_string(), "TEMPERATURE sensor read failed: i2c nack");
    }
}
