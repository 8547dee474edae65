use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::{process::Command, time::timeout};

use super::{Error, Link};

const NMCLI: &str = "nmcli";

#[inline]
fn default_command_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Wireless interface to use, e.g. wlan0
    // optional, default: chosen by NetworkManager
    #[serde(default)]
    interface: Option<String>,
    // nmcli invocations still running after this long are killed
    // optional, default: 30s
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    command_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: None,
            command_timeout: default_command_timeout(),
        }
    }
}

/// WiFi association managed through the NetworkManager command line client.
pub struct NmcliLink {
    ssid: String,
    password: String,
    interface: Option<String>,
    command_timeout: Duration,
}

impl NmcliLink {
    pub fn new(config: Config, ssid: String, password: String) -> Self {
        Self {
            ssid,
            password,
            interface: config.interface,
            command_timeout: config.command_timeout,
        }
    }

    fn connect_args(&self) -> Vec<&str> {
        let mut args = vec!["device", "wifi", "connect", self.ssid.as_str()];
        if !self.password.is_empty() {
            args.extend(&["password", self.password.as_str()]);
        }
        if let Some(interface) = &self.interface {
            args.extend(&["ifname", interface.as_str()]);
        }
        args
    }
}

async fn run(program: &'static str, args: &[&str], limit: Duration) -> Result<String, Error> {
    let child = Command::new(program).args(args).kill_on_drop(true).output();
    let output = timeout(limit, child)
        .await
        .map_err(|_| Error::Stalled(program, limit))?
        .map_err(|e| Error::Spawn(program, e))?;
    if !output.status.success() {
        return Err(Error::Command(
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// SSID of the active network in `nmcli -t -f ACTIVE,SSID device wifi` output.
fn active_ssid(listing: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let ssid = line.strip_prefix("yes:")?;
        // terse mode escapes `:` and `\`
        Some(ssid.replace("\\:", ":").replace("\\\\", "\\"))
    })
}

#[async_trait]
impl Link for NmcliLink {
    async fn connect(&mut self) -> Result<(), Error> {
        debug!("associating with `{}`", self.ssid);
        let args = self.connect_args();
        run(NMCLI, &args, self.command_timeout).await?;
        info!("associated with `{}`", self.ssid);
        Ok(())
    }

    async fn check(&mut self) -> Result<(), Error> {
        let listing = run(
            NMCLI,
            &["-t", "-f", "ACTIVE,SSID", "device", "wifi"],
            self.command_timeout,
        )
        .await?;
        match active_ssid(&listing) {
            Some(ssid) if ssid == self.ssid => Ok(()),
            _ => Err(Error::NotAssociated(self.ssid.clone())),
        }
    }
}
