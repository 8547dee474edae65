use std::time::Duration;

use chrono::Local;
use log::{debug, error, info, warn};
use tokio::{
    sync::broadcast,
    time::{interval_at, Instant},
};

use crate::{
    message::UpdateMessage,
    sampler::Sampler,
    sink::Sink,
    vitals::{Assessor, Severity},
};

/// Drives the vitals and heartbeat schedule and fans messages out to every sink.
pub(crate) struct Reporter {
    sampler: Sampler,
    sinks: Vec<Box<dyn Sink>>,
    assessor: Assessor,
    data_interval: Duration,
    heartbeat_interval: Duration,
}

impl Reporter {
    pub fn new(
        sampler: Sampler,
        sinks: Vec<Box<dyn Sink>>,
        data_interval: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            sampler,
            sinks,
            assessor: Assessor::new(),
            data_interval,
            heartbeat_interval,
        }
    }

    pub async fn run(mut self, mut termination_receiver: broadcast::Receiver<()>) {
        let start = Instant::now();
        let mut data_ticker = interval_at(start + self.data_interval, self.data_interval);
        let mut heartbeat_ticker =
            interval_at(start + self.heartbeat_interval, self.heartbeat_interval);

        info!(
            "reporting vitals every {:?}, heartbeat every {:?}",
            self.data_interval, self.heartbeat_interval
        );
        loop {
            let message = tokio::select! {
                _ = termination_receiver.recv() => break,
                _ = data_ticker.tick() => match self.sampler.sample().await {
                    Ok(reading) => {
                        let assessor = &mut self.assessor;
                        if let Some(finding) = reading.pulse.and_then(|p| assessor.assess(p)) {
                            match finding.severity() {
                                Severity::Critical => warn!("CRITICAL: {}", finding),
                                Severity::High => warn!("{}", finding),
                            }
                        }
                        UpdateMessage::Vitals(reading)
                    }
                    Err(e) => {
                        warn!("failed to sample sensors: {}", e);
                        continue;
                    }
                },
                _ = heartbeat_ticker.tick() => UpdateMessage::Heartbeat(Local::now()),
            };
            self.dispatch(&message).await;
        }
        info!("reporter stopped");
    }

    async fn dispatch(&mut self, message: &UpdateMessage) {
        debug!("dispatching {:?}", message);
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.update(message).await {
                error!("{:#}", e);
            }
        }
    }
}
