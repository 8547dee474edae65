use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};

use super::{describe, Sink};
use crate::message::{DeviceIdentity, UpdateMessage};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    path: String,
}

pub struct FileSink {
    path: String,
    device_id: String,
    file: File,
}

impl FileSink {
    pub async fn new(config: Config, identity: &DeviceIdentity) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .await
            .with_context(|| format!("failed to open file {}", config.path))?;
        Ok(Self {
            file,
            path: config.path,
            device_id: identity.device_id.clone(),
        })
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn update(&mut self, message: &UpdateMessage) -> anyhow::Result<()> {
        let mut line = describe(&self.device_id, message);
        line.push('\n');

        self.file
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to append to file {}", self.path))?;
        self.file
            .flush()
            .await
            .with_context(|| format!("failed to flush file {}", self.path))?;
        Ok(())
    }
}
