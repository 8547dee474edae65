use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Url;
use tokio::{net::TcpStream, time::timeout};

use super::{Error, Link};

/// Treats the link as up whenever the server accepts a TCP connection.
pub struct ProbeLink {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ProbeLink {
    pub fn new(server_url: &Url, timeout: Duration) -> Result<Self, Error> {
        let host = server_url.host_str().ok_or(Error::NoHost)?.to_string();
        let port = server_url.port_or_known_default().unwrap_or(80);
        Ok(Self {
            host,
            port,
            timeout,
        })
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn probe(&self) -> Result<(), Error> {
        let target = self.target();
        match timeout(self.timeout, TcpStream::connect((self.host.as_str(), self.port))).await {
            Ok(Ok(_)) => {
                debug!("server `{}` is reachable", target);
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Unreachable(target, e)),
            Err(_) => Err(Error::Timeout(target)),
        }
    }
}

#[async_trait]
impl Link for ProbeLink {
    async fn connect(&mut self) -> Result<(), Error> {
        self.probe().await
    }

    async fn check(&mut self) -> Result<(), Error> {
        self.probe().await
    }
}
