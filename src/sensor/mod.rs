mod feed;
mod iio;
mod simulated;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::Pulse;

/// Largest count a 10-bit ADC can produce.
pub(crate) const ADC_MAX: u16 = 1023;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to read `{1}`: {0}")]
    Io(std::io::Error, String),
    #[error("invalid value `{1}` from `{0}`")]
    Parse(String, String),
    #[error("ADC count {0} from `{1}` exceeds {max}", max = ADC_MAX)]
    OutOfRange(u32, String),
}

/// Analog pressure pad under the mattress.
#[async_trait]
pub trait PressureSensor: Send + Sync {
    /// Raw ADC count, 0..=1023.
    async fn read_raw(&mut self) -> Result<u16, Error>;
}

/// Pulse oximeter, polled once per reporting period.
#[async_trait]
pub trait PulseOximeter: Send + Sync {
    /// Refresh the sensor and return the current measurement, if the sensor has one.
    async fn update(&mut self) -> Result<Option<Pulse>, Error>;
}

/// A reading strictly above the threshold means someone is lying on the bed.
#[inline]
pub fn is_occupied(raw: u16, threshold: u16) -> bool {
    raw > threshold
}

/// Parse an analog pin name such as `A0` into its channel number.
pub fn analog_channel(pin: &str) -> Option<u8> {
    pin.trim()
        .strip_prefix('A')
        .or_else(|| pin.trim().strip_prefix('a'))
        .and_then(|n| n.parse().ok())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum PressureConfig {
    Iio(iio::Config),
    Simulated(simulated::PressureConfig),
}

impl PressureConfig {
    pub async fn into_sensor(self, channel: u8) -> anyhow::Result<Box<dyn PressureSensor>> {
        match self {
            PressureConfig::Iio(config) => Ok(Box::new(
                iio::IioAdc::new(config, channel)
                    .await
                    .context("failed to open IIO pressure channel")?,
            )),
            PressureConfig::Simulated(config) => {
                Ok(Box::new(simulated::SimulatedPressure::new(config)))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum OximeterConfig {
    Feed(feed::Config),
    Simulated(simulated::OximeterConfig),
}

impl OximeterConfig {
    pub async fn into_oximeter(self) -> anyhow::Result<Box<dyn PulseOximeter>> {
        match self {
            OximeterConfig::Feed(config) => Ok(Box::new(
                feed::FeedOximeter::new(config)
                    .await
                    .context("failed to open oximeter feed")?,
            )),
            OximeterConfig::Simulated(config) => {
                Ok(Box::new(simulated::SimulatedOximeter::new(config)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_itself_is_unoccupied() {
        assert!(!is_occupied(500, 500));
        assert!(is_occupied(501, 500));
        assert!(!is_occupied(0, 500));
        assert!(is_occupied(ADC_MAX, 500));
    }

    #[test]
    fn parses_analog_pins() {
        assert_eq!(analog_channel("A0"), Some(0));
        assert_eq!(analog_channel(" a3 "), Some(3));
        assert_eq!(analog_channel("D4"), None);
        assert_eq!(analog_channel("A"), None);
    }

    #[test]
    fn sensor_config_from_yaml() {
        let config: PressureConfig =
            serde_yaml::from_str("Iio:\n  device: /sys/bus/iio/devices/iio:device1\n").unwrap();
        assert!(matches!(config, PressureConfig::Iio(_)));

        let config: OximeterConfig = serde_yaml::from_str("Simulated: {}\n").unwrap();
        assert!(matches!(config, OximeterConfig::Simulated(_)));
    }
}
