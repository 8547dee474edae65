use std::time::Duration;

use log::{debug, info, warn};
use tokio::{
    sync::{broadcast, watch},
    time::sleep,
};

use crate::link::Link;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Keeps the link up, reconnecting after a fixed delay whenever it drops.
pub(crate) struct ConnectivityManager {
    link: Box<dyn Link>,
    retry_delay: Duration,
    state: watch::Sender<ConnectionState>,
}

pub(crate) fn create_connectivity(
    link: Box<dyn Link>,
    retry_delay: Duration,
) -> (watch::Receiver<ConnectionState>, ConnectivityManager) {
    let (state, receiver) = watch::channel(ConnectionState::Disconnected);
    (
        receiver,
        ConnectivityManager {
            link,
            retry_delay,
            state,
        },
    )
}

impl ConnectivityManager {
    fn publish(&self, state: ConnectionState) {
        debug!("link state: {:?}", state);
        // nobody listening is fine, the manager still keeps the link up
        let _ = self.state.send(state);
    }

    pub async fn run(mut self, mut termination_receiver: broadcast::Receiver<()>) {
        loop {
            self.publish(ConnectionState::Connecting);
            let attempt = tokio::select! {
                r = self.link.connect() => r,
                _ = termination_receiver.recv() => break,
            };

            match attempt {
                Ok(()) => {
                    self.publish(ConnectionState::Connected);
                    info!("link is up");
                    loop {
                        tokio::select! {
                            _ = sleep(self.retry_delay) => {},
                            _ = termination_receiver.recv() => {
                                self.publish(ConnectionState::Disconnected);
                                return;
                            },
                        }
                        let checked = tokio::select! {
                            r = self.link.check() => Some(r),
                            _ = termination_receiver.recv() => None,
                        };
                        match checked {
                            Some(Ok(())) => {}
                            Some(Err(e)) => {
                                warn!("link lost: {}", e);
                                break;
                            }
                            None => {
                                self.publish(ConnectionState::Disconnected);
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "failed to bring link up: {}, retrying in {:?}",
                        e, self.retry_delay
                    );
                }
            }

            self.publish(ConnectionState::Disconnected);
            tokio::select! {
                _ = sleep(self.retry_delay) => {},
                _ = termination_receiver.recv() => break,
            }
        }
        self.publish(ConnectionState::Disconnected);
        info!("connectivity manager stopped");
    }
}
