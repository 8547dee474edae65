use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use thiserror::Error;

use crate::link::LinkConfig;
use crate::message::DeviceIdentity;
use crate::sensor::{analog_channel, OximeterConfig, PressureConfig, ADC_MAX};
use crate::sink::SinkConfig;

// Values shipped in the sample config that must be replaced per device
const PLACEHOLDER_MARKER: &str = "YOUR_";

#[inline]
fn default_data_interval() -> Duration {
    Duration::from_millis(5000)
}
#[inline]
fn default_heartbeat_interval() -> Duration {
    Duration::from_millis(10000)
}
#[inline]
fn default_wifi_retry_delay() -> Duration {
    Duration::from_millis(5000)
}
#[inline]
fn default_http_timeout() -> Duration {
    Duration::from_millis(5000)
}
#[inline]
fn default_reporting_period() -> Duration {
    Duration::from_millis(1000)
}
#[inline]
fn default_pressure_pin() -> String {
    "A0".to_string()
}
#[inline]
fn default_pressure_threshold() -> u16 {
    500
}

#[derive(Error, Debug, PartialEq)]
pub(crate) enum ConfigError {
    #[error("`{0}` must not be empty")]
    Empty(&'static str),
    #[error("`{0}` still holds the placeholder `{1}`")]
    Placeholder(&'static str, String),
    #[error("`{0}` must be a positive duration")]
    ZeroDuration(&'static str),
    #[error("pressure threshold {0} is outside the ADC range 0..={max}", max = ADC_MAX)]
    ThresholdOutOfRange(u16),
    #[error("`{0}` is not an analog pin")]
    InvalidPin(String),
    #[error("server URL scheme `{0}` is not supported")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct WifiConfig {
    // Network to associate with
    // required when the link is managed through nmcli
    #[serde(default)]
    pub ssid: String,
    // Passphrase, empty for open networks
    // optional, default: empty
    #[serde(default)]
    pub password: String,
    // How the link is brought up and checked
    // optional, default: Nmcli
    #[serde(default)]
    pub link: LinkConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct PressureSettings {
    // Analog pin of the FSR pad
    // optional, default: A0
    #[serde(default = "default_pressure_pin")]
    pub pin: String,
    // ADC count above which the bed is occupied
    // optional, default: 500
    #[serde(default = "default_pressure_threshold")]
    pub threshold: u16,
    // Where raw counts come from
    // required
    pub source: PressureConfig,
}

impl PressureSettings {
    pub fn channel(&self) -> Result<u8, ConfigError> {
        analog_channel(&self.pin).ok_or_else(|| ConfigError::InvalidPin(self.pin.clone()))
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct Config {
    // Network credentials and link management
    // required
    pub wifi: WifiConfig,
    // Base URL of the monitoring server
    // required
    #[serde_as(as = "DisplayFromStr")]
    pub server_url: Url,
    // Key issued by the server at device registration
    // required
    pub api_key: String,
    // Device identifier registered on the server, e.g. BED_ICU_01
    // required
    pub device_id: String,
    // Period between vitals uploads
    // optional, default: 5s
    #[serde(default = "default_data_interval", with = "humantime_serde")]
    pub data_interval: Duration,
    // Period between heartbeats
    // optional, default: 10s
    #[serde(default = "default_heartbeat_interval", with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    // Fixed delay before reconnecting the link
    // optional, default: 5s
    #[serde(default = "default_wifi_retry_delay", with = "humantime_serde")]
    pub wifi_retry_delay: Duration,
    // Requests without a response after this long are abandoned
    // optional, default: 5s
    #[serde(default = "default_http_timeout", with = "humantime_serde")]
    pub http_timeout: Duration,
    // Polling period of the pulse oximeter
    // optional, default: 1s
    #[serde(default = "default_reporting_period", with = "humantime_serde")]
    pub reporting_period: Duration,
    // Pulse samples older than this are not reported
    // optional, default: 3 reporting periods
    #[serde(default, with = "humantime_serde")]
    pub pulse_max_age: Option<Duration>,
    pub pressure: PressureSettings,
    pub oximeter: OximeterConfig,
    // Local outputs in addition to the server uplink
    // optional, default: none
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

fn check_identity_value(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Empty(key));
    }
    if value.to_ascii_uppercase().contains(PLACEHOLDER_MARKER) {
        return Err(ConfigError::Placeholder(key, value.to_string()));
    }
    Ok(())
}

impl Config {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            device_id: self.device_id.clone(),
            api_key: self.api_key.clone(),
        }
    }

    pub fn pulse_max_age(&self) -> Duration {
        self.pulse_max_age.unwrap_or(self.reporting_period * 3)
    }

    /// Reject configurations that were flashed without filling in per-device values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_identity_value("device_id", &self.device_id)?;
        check_identity_value("api_key", &self.api_key)?;
        check_identity_value("server_url", self.server_url.as_str())?;
        match self.server_url.scheme() {
            "http" | "https" => {}
            scheme => return Err(ConfigError::UnsupportedScheme(scheme.to_string())),
        }
        if let LinkConfig::Nmcli(_) = self.wifi.link {
            check_identity_value("wifi.ssid", &self.wifi.ssid)?;
            if self.wifi.password.to_ascii_uppercase().contains(PLACEHOLDER_MARKER) {
                return Err(ConfigError::Placeholder(
                    "wifi.password",
                    self.wifi.password.clone(),
                ));
            }
        }

        for (key, value) in [
            ("data_interval", self.data_interval),
            ("heartbeat_interval", self.heartbeat_interval),
            ("wifi_retry_delay", self.wifi_retry_delay),
            ("http_timeout", self.http_timeout),
            ("reporting_period", self.reporting_period),
            ("pulse_max_age", self.pulse_max_age()),
        ]
        .iter()
        {
            if value.as_nanos() == 0 {
                return Err(ConfigError::ZeroDuration(*key));
            }
        }

        if self.pressure.threshold > ADC_MAX {
            return Err(ConfigError::ThresholdOutOfRange(self.pressure.threshold));
        }
        self.pressure.channel()?;
        Ok(())
    }
}
