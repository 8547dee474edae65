mod nmcli;
mod probe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to run `{0}`: {1}")]
    Spawn(&'static str, std::io::Error),
    #[error("`{0}` did not finish within {1:?}")]
    Stalled(&'static str, std::time::Duration),
    #[error("`{0}` exited with {1}: {2}")]
    Command(&'static str, std::process::ExitStatus, String),
    #[error("network `{0}` is not active")]
    NotAssociated(String),
    #[error("server `{0}` is unreachable: {1}")]
    Unreachable(String, std::io::Error),
    #[error("connecting to `{0}` timed-out")]
    Timeout(String),
    #[error("server URL has no host")]
    NoHost,
}

/// Network link the uplink depends on.
#[async_trait]
pub trait Link: Send {
    /// Bring the link up.
    async fn connect(&mut self) -> Result<(), Error>;
    /// Verify a previously connected link is still usable.
    async fn check(&mut self) -> Result<(), Error>;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum LinkConfig {
    Nmcli(nmcli::Config),
    Probe,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig::Nmcli(nmcli::Config::default())
    }
}

impl LinkConfig {
    pub fn into_link(self, config: &Config) -> Result<Box<dyn Link>, Error> {
        match self {
            LinkConfig::Nmcli(nmcli) => Ok(Box::new(nmcli::NmcliLink::new(
                nmcli,
                config.wifi.ssid.clone(),
                config.wifi.password.clone(),
            ))),
            LinkConfig::Probe => Ok(Box::new(probe::ProbeLink::new(
                &config.server_url,
                config.http_timeout,
            )?)),
        }
    }
}
