mod console;
mod file;
mod postgres;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::{DeviceIdentity, UpdateMessage};

#[async_trait]
pub trait Sink: Send + Sync {
    async fn update(&mut self, message: &UpdateMessage) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum SinkConfig {
    Console,
    Postgres(postgres::Config),
    File(file::Config),
}

impl SinkConfig {
    pub async fn into_sink(self, identity: &DeviceIdentity) -> anyhow::Result<Box<dyn Sink>> {
        match self {
            SinkConfig::Console => Ok(Box::new(console::ConsoleSink::new(identity))),
            SinkConfig::Postgres(config) => Ok(Box::new(
                postgres::PostgresSink::new(config, identity)
                    .await
                    .context("failed to create postgres sink")?,
            )),
            SinkConfig::File(config) => Ok(Box::new(
                file::FileSink::new(config, identity)
                    .await
                    .context("failed to create file sink")?,
            )),
        }
    }
}

/// One-line human readable description shared by the text sinks.
pub(crate) fn describe(device_id: &str, message: &UpdateMessage) -> String {
    match message {
        UpdateMessage::Vitals(reading) => {
            let bed = if reading.occupied { "occupied" } else { "empty" };
            match reading.pulse {
                Some(pulse) => format!(
                    "[{}] {}: bed {} (pressure {}), heart rate {} bpm, SpO2 {}%",
                    reading.timestamp,
                    device_id,
                    bed,
                    reading.pressure,
                    pulse.heart_rate,
                    pulse.spo2
                ),
                None => format!(
                    "[{}] {}: bed {} (pressure {}), no pulse reading",
                    reading.timestamp, device_id, bed, reading.pressure
                ),
            }
        }
        UpdateMessage::Heartbeat(timestamp) => format!("[{}] {}: heartbeat", timestamp, device_id),
    }
}
