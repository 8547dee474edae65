use async_trait::async_trait;

use super::{describe, Sink};
use crate::message::{DeviceIdentity, UpdateMessage};

pub struct ConsoleSink {
    device_id: String,
}

impl ConsoleSink {
    pub fn new(identity: &DeviceIdentity) -> Self {
        Self {
            device_id: identity.device_id.clone(),
        }
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    async fn update(&mut self, message: &UpdateMessage) -> anyhow::Result<()> {
        println!("{}", describe(&self.device_id, message));
        Ok(())
    }
}
