use std::time::Duration;

use chrono::Local;
use futures::Future;
use log::{debug, info, warn};
use tokio::{
    sync::{broadcast, watch},
    time::{interval, Instant},
};

use crate::{
    message::{Pulse, SensorReading},
    sensor::{self, is_occupied, PressureSensor, PulseOximeter},
};

#[derive(Debug, Clone, Copy)]
struct PulseSample {
    pulse: Pulse,
    at: Instant,
}

/// Combines the on-demand pressure reading with the latest oximeter sample.
pub(crate) struct Sampler {
    pressure: Box<dyn PressureSensor>,
    threshold: u16,
    latest_pulse: watch::Receiver<Option<PulseSample>>,
    max_age: Duration,
}

impl Sampler {
    pub async fn sample(&mut self) -> Result<SensorReading, sensor::Error> {
        let pressure = self.pressure.read_raw().await?;
        let latest = *self.latest_pulse.borrow();
        let pulse = match latest {
            Some(sample) if sample.at.elapsed() <= self.max_age => Some(sample.pulse),
            Some(sample) => {
                debug!("pulse sample is {:?} old, ignoring", sample.at.elapsed());
                None
            }
            None => None,
        };
        Ok(SensorReading {
            timestamp: Local::now(),
            occupied: is_occupied(pressure, self.threshold),
            pressure,
            pulse,
        })
    }
}

async fn poll_oximeter(
    mut oximeter: Box<dyn PulseOximeter>,
    reporting_period: Duration,
    latest_pulse: watch::Sender<Option<PulseSample>>,
    mut termination_receiver: broadcast::Receiver<()>,
) {
    let mut ticker = interval(reporting_period);
    loop {
        tokio::select! {
            _ = termination_receiver.recv() => break,
            _ = ticker.tick() => {
                let sample = match oximeter.update().await {
                    Ok(Some(pulse)) => {
                        debug!("pulse: {} bpm, SpO2 {}%", pulse.heart_rate, pulse.spo2);
                        Some(PulseSample { pulse, at: Instant::now() })
                    }
                    Ok(None) => {
                        debug!("no pulse detected");
                        None
                    }
                    Err(e) => {
                        // keep the previous sample, it ages out on its own
                        warn!("failed to update oximeter: {}", e);
                        continue;
                    }
                };
                let _ = latest_pulse.send(sample);
            },
        }
    }
    info!("oximeter polling stopped");
}

pub(crate) fn create_sampler(
    pressure: Box<dyn PressureSensor>,
    threshold: u16,
    oximeter: Box<dyn PulseOximeter>,
    reporting_period: Duration,
    max_age: Duration,
    termination_receiver: broadcast::Receiver<()>,
) -> (Sampler, impl Future<Output = ()>) {
    let (sender, receiver) = watch::channel(None);
    (
        Sampler {
            pressure,
            threshold,
            latest_pulse: receiver,
            max_age,
        },
        poll_oximeter(oximeter, reporting_period, sender, termination_receiver),
    )
}


#[cfg(test)]
mod tests {
    use super::testing::{FixedPressure, ScriptedOximeter};
    use super::*;

    use tokio::time::{self, sleep};

    #[tokio::test]
    async fn reading_without_oximeter_sample() {
        let (_termination_sender, termination_receiver) = broadcast::channel(1);
        let (mut sampler, _poller) = create_sampler(
            Box::new(FixedPressure(812)),
            500,
            Box::new(ScriptedOximeter(vec![])),
            Duration::from_secs(1),
            Duration::from_secs(3),
            termination_receiver,
        );
        let reading = sampler.sample().await.unwrap();
        assert!(reading.occupied);
        assert_eq!(reading.pressure, 812);
        assert_eq!(reading.pulse, None);
    }

    #[tokio::test]
    async fn latest_pulse_is_reported_until_stale() {
        time::pause();
        let pulse = Pulse::new(68.0, 98.0);
        // one measurement, then the oximeter keeps failing to report
        struct OnceThenError(Option<Option<Pulse>>);
        #[async_trait::async_trait]
        impl PulseOximeter for OnceThenError {
            async fn update(&mut self) -> Result<Option<Pulse>, sensor::Error> {
                self.0
                    .take()
                    .ok_or_else(|| sensor::Error::Parse("feed".to_string(), "".to_string()))
            }
        }

        let (termination_sender, termination_receiver) = broadcast::channel(1);
        let (mut sampler, poller) = create_sampler(
            Box::new(FixedPressure(120)),
            500,
            Box::new(OnceThenError(Some(pulse))),
            Duration::from_secs(1),
            Duration::from_secs(3),
            termination_receiver,
        );
        let handle = tokio::spawn(poller);

        sleep(Duration::from_millis(1500)).await;
        let reading = sampler.sample().await.unwrap();
        assert!(!reading.occupied);
        assert_eq!(reading.pulse, pulse);

        sleep(Duration::from_secs(3)).await;
        assert_eq!(sampler.sample().await.unwrap().pulse, None);

        termination_sender.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn lost_pulse_clears_the_sample() {
        time::pause();
        let (termination_sender, termination_receiver) = broadcast::channel(1);
        let (mut sampler, poller) = create_sampler(
            Box::new(FixedPressure(700)),
            500,
            Box::new(ScriptedOximeter(vec![Pulse::new(72.0, 97.0), None])),
            Duration::from_secs(1),
            Duration::from_secs(10),
            termination_receiver,
        );
        let handle = tokio::spawn(poller);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(sampler.sample().await.unwrap().pulse, Pulse::new(72.0, 97.0));

        sleep(Duration::from_secs(1)).await;
        assert_eq!(sampler.sample().await.unwrap().pulse, None);

        termination_sender.send(()).unwrap();
        handle.await.unwrap();
    }
}
