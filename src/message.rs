use std::fmt;

use chrono::{DateTime, Local};

#[derive(Clone, PartialEq, Eq)]
pub(crate) struct DeviceIdentity {
    pub device_id: String,
    pub api_key: String,
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("device_id", &self.device_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Pulse {
    // beats per minute
    pub heart_rate: f32,
    // percent
    pub spo2: f32,
}

impl Pulse {
    /// The oximeter reports zeros until it has locked onto a pulse.
    pub fn new(heart_rate: f32, spo2: f32) -> Option<Self> {
        if heart_rate > 0.0 && spo2 > 0.0 {
            Some(Self { heart_rate, spo2 })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SensorReading {
    pub timestamp: DateTime<Local>,
    pub occupied: bool,
    // raw ADC count of the pressure pad
    pub pressure: u16,
    pub pulse: Option<Pulse>,
}

impl SensorReading {
    /// Bed status as the server encodes it: 0 empty, 1 occupied.
    pub fn bed_status(&self) -> u8 {
        self.occupied as u8
    }
}

#[derive(Debug, Clone)]
pub(crate) enum UpdateMessage {
    Vitals(SensorReading),
    Heartbeat(DateTime<Local>),
}
