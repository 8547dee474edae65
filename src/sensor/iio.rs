use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::{Error, PressureSensor, ADC_MAX};

#[inline]
fn default_device() -> PathBuf {
    PathBuf::from("/sys/bus/iio/devices/iio:device0")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // sysfs directory of the IIO ADC device
    // optional, default: /sys/bus/iio/devices/iio:device0
    #[serde(default = "default_device")]
    device: PathBuf,
}

/// ADC channel exposed by the Linux Industrial I/O subsystem.
pub struct IioAdc {
    path: PathBuf,
}

impl IioAdc {
    pub async fn new(config: Config, channel: u8) -> anyhow::Result<Self> {
        let path = config.device.join(format!("in_voltage{}_raw", channel));
        fs::metadata(&path)
            .await
            .with_context(|| format!("ADC channel `{}` is not available", path.display()))?;
        debug!("reading pressure from `{}`", path.display());
        Ok(Self { path })
    }
}

fn parse_raw(text: &str, source: &Path) -> Result<u16, Error> {
    let value: u32 = text
        .trim()
        .parse()
        .map_err(|_| Error::Parse(source.display().to_string(), text.trim().to_string()))?;
    if value > ADC_MAX as u32 {
        return Err(Error::OutOfRange(value, source.display().to_string()));
    }
    Ok(value as u16)
}

#[async_trait]
impl PressureSensor for IioAdc {
    async fn read_raw(&mut self) -> Result<u16, Error> {
        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Io(e, self.path.display().to_string()))?;
        parse_raw(&text, &self.path)
    }
}
