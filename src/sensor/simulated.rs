use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Error, PressureSensor, PulseOximeter, ADC_MAX};
use crate::message::Pulse;

#[inline]
fn default_occupied_probability() -> f64 {
    0.9
}
#[inline]
fn default_heart_rate() -> f32 {
    75.0
}
#[inline]
fn default_spo2() -> f32 {
    97.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PressureConfig {
    // Chance that a reading reports an occupied bed
    // optional, default: 0.9
    #[serde(default = "default_occupied_probability")]
    occupied_probability: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OximeterConfig {
    // Center of the simulated heart rate in BPM
    // optional, default: 75
    #[serde(default = "default_heart_rate")]
    heart_rate: f32,
    // Center of the simulated SpO2 in percent
    // optional, default: 97
    #[serde(default = "default_spo2")]
    spo2: f32,
}

pub struct SimulatedPressure {
    occupied_probability: f64,
    rng: StdRng,
}

impl SimulatedPressure {
    pub fn new(config: PressureConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    fn with_rng(config: PressureConfig, rng: StdRng) -> Self {
        Self {
            occupied_probability: config.occupied_probability.max(0.0).min(1.0),
            rng,
        }
    }
}

#[async_trait]
impl PressureSensor for SimulatedPressure {
    async fn read_raw(&mut self) -> Result<u16, Error> {
        let raw = if self.rng.gen_bool(self.occupied_probability) {
            self.rng.gen_range(600..=ADC_MAX)
        } else {
            self.rng.gen_range(0..=300)
        };
        Ok(raw)
    }
}

pub struct SimulatedOximeter {
    heart_rate: f32,
    spo2: f32,
    rng: StdRng,
}

impl SimulatedOximeter {
    pub fn new(config: OximeterConfig) -> Self {
        Self {
            heart_rate: config.heart_rate,
            spo2: config.spo2,
            rng: StdRng::from_entropy(),
        }
    }
}

#[async_trait]
impl PulseOximeter for SimulatedOximeter {
    async fn update(&mut self) -> Result<Option<Pulse>, Error> {
        let heart_rate = (self.heart_rate + self.rng.gen_range(-5.0..=5.0)).max(0.0);
        let spo2 = (self.spo2 + self.rng.gen_range(-1.5..=1.5)).max(0.0).min(100.0);
        Ok(Pulse::new(heart_rate, spo2))
    }
}
