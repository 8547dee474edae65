use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    connectivity::ConnectionState,
    message::{DeviceIdentity, Pulse, SensorReading, UpdateMessage},
    sink::Sink,
};

const DATA_PATH: &str = "api/device/data";
const HEARTBEAT_PATH: &str = "api/device/heartbeat";
const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("request to `{0}` timed-out")]
    Timeout(Url),
    #[error("server rejected the API key of device `{0}`")]
    Unauthorized(String),
    #[error("API key does not belong to device `{0}`")]
    Forbidden(String),
    #[error("server responded {1} to `{0}`")]
    Status(Url, StatusCode),
    #[error("request to `{0}` failed: {1}")]
    Transport(Url, reqwest::Error),
}

#[derive(Debug, Serialize)]
struct VitalsReport<'a> {
    device_id: &'a str,
    heart_rate: f32,
    spo2: f32,
    bed_status: u8,
}

#[derive(Debug, Serialize)]
struct HeartbeatReport<'a> {
    device_id: &'a str,
}

/// HTTP client for the monitoring server's device endpoints.
pub(crate) struct Uplink {
    client: Client,
    identity: DeviceIdentity,
    data_url: Url,
    heartbeat_url: Url,
    link: watch::Receiver<ConnectionState>,
    // last bed status the server received, and a change it has not seen yet
    reported_bed_status: Option<u8>,
    unreported_bed_status: Option<u8>,
}

impl Uplink {
    pub fn new(
        server_url: &Url,
        identity: DeviceIdentity,
        timeout: Duration,
        link: watch::Receiver<ConnectionState>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        // keep any path prefix of the server URL when joining endpoints
        let mut base = server_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let data_url = base
            .join(DATA_PATH)
            .with_context(|| format!("invalid server URL `{}`", server_url))?;
        let heartbeat_url = base
            .join(HEARTBEAT_PATH)
            .with_context(|| format!("invalid server URL `{}`", server_url))?;

        Ok(Self {
            client,
            identity,
            data_url,
            heartbeat_url,
            link,
            reported_bed_status: None,
            unreported_bed_status: None,
        })
    }

    pub async fn send_vitals(&self, reading: &SensorReading, pulse: Pulse) -> Result<(), Error> {
        let report = VitalsReport {
            device_id: &self.identity.device_id,
            heart_rate: pulse.heart_rate,
            spo2: pulse.spo2,
            bed_status: reading.bed_status(),
        };
        self.post(&self.data_url, &report).await?;
        debug!("vitals uploaded: {:?}", report);
        Ok(())
    }

    pub async fn send_heartbeat(&self) -> Result<(), Error> {
        let report = HeartbeatReport {
            device_id: &self.identity.device_id,
        };
        self.post(&self.heartbeat_url, &report).await?;
        debug!("heartbeat sent");
        Ok(())
    }

    /// True the first time `bed_status` differs from what the server last received.
    fn note_unreported(&mut self, bed_status: u8) -> bool {
        let changed = self.reported_bed_status.map_or(false, |r| r != bed_status);
        if !changed {
            self.unreported_bed_status = None;
            false
        } else if self.unreported_bed_status == Some(bed_status) {
            false
        } else {
            self.unreported_bed_status = Some(bed_status);
            true
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &Url, body: &T) -> Result<(), Error> {
        let response = self
            .client
            .post(url.clone())
            .header(API_KEY_HEADER, self.identity.api_key.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(url.clone())
                } else {
                    Error::Transport(url.clone(), e)
                }
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(Error::Unauthorized(self.identity.device_id.clone())),
            StatusCode::FORBIDDEN => Err(Error::Forbidden(self.identity.device_id.clone())),
            status => Err(Error::Status(url.clone(), status)),
        }
    }
}

#[async_trait]
impl Sink for Uplink {
    async fn update(&mut self, message: &UpdateMessage) -> anyhow::Result<()> {
        let state = *self.link.borrow();
        if state != ConnectionState::Connected {
            debug!("link is {:?}, skipping upload", state);
            return Ok(());
        }

        match message {
            UpdateMessage::Vitals(reading) => match reading.pulse {
                Some(pulse) => {
                    self.send_vitals(reading, pulse)
                        .await
                        .context("failed to upload vitals")?;
                    self.reported_bed_status = Some(reading.bed_status());
                    self.unreported_bed_status = None;
                }
                None if self.note_unreported(reading.bed_status()) => warn!(
                    "bed is now {} but there is no pulse to upload, \
                     the server keeps the previous bed status",
                    if reading.occupied { "occupied" } else { "empty" }
                ),
                None => info!("no pulse reading, vitals not uploaded"),
            },
            UpdateMessage::Heartbeat(_) => self
                .send_heartbeat()
                .await
                .context("failed to send heartbeat")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Local;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        sync::oneshot,
        time::sleep,
    };

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            device_id: "BED_ICU_01".to_string(),
            api_key: "key-123".to_string(),
        }
    }

    fn reading(occupied: bool, pulse: Option<Pulse>) -> SensorReading {
        SensorReading {
            timestamp: Local::now(),
            occupied,
            pressure: if occupied { 800 } else { 100 },
            pulse,
        }
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buffer).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if name.eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if buffer.len() >= end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8(buffer).unwrap()
    }

    /// Accept one request, report it, and answer with `status_line` after `delay`.
    async fn serve_once(
        status_line: &'static str,
        delay: Duration,
    ) -> (Url, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let _ = sender.send(request);
            sleep(delay).await;
            let body = "{\"status\":\"ok\"}";
            let response = format!(
                "{}\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });
        (url, receiver)
    }

    fn make_uplink(url: &Url, timeout: Duration, state: ConnectionState) -> Uplink {
        let (_sender, receiver) = watch::channel(state);
        Uplink::new(url, identity(), timeout, receiver).unwrap()
    }

    fn body_of(request: &str) -> serde_json::Value {
        let start = request.find("\r\n\r\n").unwrap() + 4;
        serde_json::from_str(&request[start..]).unwrap()
    }

    #[test]
    fn endpoints_keep_path_prefix() {
        let (_sender, receiver) = watch::channel(ConnectionState::Connected);
        let uplink = Uplink::new(
            &Url::parse("http://10.0.0.5:8000/hospital").unwrap(),
            identity(),
            Duration::from_secs(5),
            receiver,
        )
        .unwrap();
        assert_eq!(
            uplink.data_url.as_str(),
            "http://10.0.0.5:8000/hospital/api/device/data"
        );
        assert_eq!(
            uplink.heartbeat_url.as_str(),
            "http://10.0.0.5:8000/hospital/api/device/heartbeat"
        );
    }

    #[tokio::test]
    async fn posts_vitals_with_api_key() {
        let (url, request) = serve_once("HTTP/1.1 200 OK", Duration::from_millis(0)).await;
        let mut uplink = make_uplink(&url, Duration::from_secs(5), ConnectionState::Connected);

        let message = UpdateMessage::Vitals(reading(true, Pulse::new(72.0, 97.5)));
        uplink.update(&message).await.unwrap();

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /api/device/data HTTP/1.1\r\n"));
        assert!(request.to_ascii_lowercase().contains("x-api-key: key-123\r\n"));
        let body = body_of(&request);
        assert_eq!(body["device_id"], "BED_ICU_01");
        assert_eq!(body["heart_rate"], 72.0);
        assert_eq!(body["spo2"], 97.5);
        assert_eq!(body["bed_status"], 1);
    }

    #[tokio::test]
    async fn posts_heartbeat() {
        let (url, request) = serve_once("HTTP/1.1 200 OK", Duration::from_millis(0)).await;
        let mut uplink = make_uplink(&url, Duration::from_secs(5), ConnectionState::Connected);

        uplink
            .update(&UpdateMessage::Heartbeat(Local::now()))
            .await
            .unwrap();

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /api/device/heartbeat HTTP/1.1\r\n"));
        assert_eq!(body_of(&request), serde_json::json!({"device_id": "BED_ICU_01"}));
    }

    #[tokio::test]
    async fn classifies_auth_failures() {
        let (url, _request) =
            serve_once("HTTP/1.1 401 Unauthorized", Duration::from_millis(0)).await;
        let uplink = make_uplink(&url, Duration::from_secs(5), ConnectionState::Connected);
        assert!(matches!(
            uplink.send_heartbeat().await,
            Err(Error::Unauthorized(device)) if device == "BED_ICU_01"
        ));

        let (url, _request) = serve_once("HTTP/1.1 403 Forbidden", Duration::from_millis(0)).await;
        let uplink = make_uplink(&url, Duration::from_secs(5), ConnectionState::Connected);
        assert!(matches!(
            uplink.send_heartbeat().await,
            Err(Error::Forbidden(_))
        ));

        let (url, _request) =
            serve_once("HTTP/1.1 500 Internal Server Error", Duration::from_millis(0)).await;
        let uplink = make_uplink(&url, Duration::from_secs(5), ConnectionState::Connected);
        assert!(matches!(
            uplink.send_heartbeat().await,
            Err(Error::Status(_, StatusCode::INTERNAL_SERVER_ERROR))
        ));
    }

    #[tokio::test]
    async fn abandons_slow_requests() {
        let (url, _request) = serve_once("HTTP/1.1 200 OK", Duration::from_secs(30)).await;
        let uplink = make_uplink(&url, Duration::from_millis(200), ConnectionState::Connected);
        let result = uplink
            .send_vitals(&reading(false, None), Pulse::new(70.0, 98.0).unwrap())
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn skips_uploads_while_disconnected() {
        // nothing listens here, any request would fail
        let url = Url::parse("http://127.0.0.1:9").unwrap();
        for state in [ConnectionState::Disconnected, ConnectionState::Connecting].iter() {
            let mut uplink = make_uplink(&url, Duration::from_millis(200), *state);
            uplink
                .update(&UpdateMessage::Heartbeat(Local::now()))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn skips_vitals_without_pulse() {
        let url = Url::parse("http://127.0.0.1:9").unwrap();
        let mut uplink = make_uplink(&url, Duration::from_millis(200), ConnectionState::Connected);
        uplink
            .update(&UpdateMessage::Vitals(reading(true, None)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn flags_bed_change_that_cannot_be_uploaded() {
        let (url, _request) = serve_once("HTTP/1.1 200 OK", Duration::from_millis(0)).await;
        let mut uplink = make_uplink(&url, Duration::from_secs(5), ConnectionState::Connected);
        uplink
            .update(&UpdateMessage::Vitals(reading(true, Pulse::new(72.0, 97.0))))
            .await
            .unwrap();
        assert_eq!(uplink.reported_bed_status, Some(1));

        // patient leaves, oximeter loses lock
        uplink
            .update(&UpdateMessage::Vitals(reading(false, None)))
            .await
            .unwrap();
        assert_eq!(uplink.unreported_bed_status, Some(0));
        assert!(!uplink.note_unreported(0));

        // back in bed clears the pending change
        assert!(!uplink.note_unreported(1));
        assert_eq!(uplink.unreported_bed_status, None);
        assert!(uplink.note_unreported(0));
    }
}
