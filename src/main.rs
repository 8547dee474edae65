mod config;
mod connectivity;
mod link;
mod message;
mod reporter;
mod sampler;
mod sensor;
mod sink;
mod uplink;
mod util;
mod vitals;
use crate::config::Config;
use crate::reporter::Reporter;
use crate::sink::Sink;
use crate::uplink::Uplink;
use crate::util::AttachContext;

use std::{fs::File, io::BufReader};

use anyhow::Context;
use clap::{App, Arg};
use futures::future::join3;
use indoc::indoc;
use log::{info, warn};
use tokio::{
    sync,
    time::{sleep, Duration, Instant},
};

fn main() -> anyhow::Result<()> {
    let cmd = App::new("bed-monitor")
        .version("0.1")
        .author("Youmu")
        .about("Report bed occupancy and vitals to the ward monitoring server")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .help("Sets custom config file location")
                .long_help(indoc!(
                    "Sets custom config file location, default to read config.yaml
                    The custom config must be a file of YAML 1.2 format.
                    The following configuration keys are supported:
                    wifi: required, ssid/password of the ward network and the link type
                    server_url: required, base URL of the monitoring server
                    api_key: required, key issued when the device was registered
                    device_id: required, identifier of the bed, e.g. BED_ICU_01
                    data_interval: optional, default 5s, period between vitals uploads
                    heartbeat_interval: optional, default 10s, period between heartbeats
                    wifi_retry_delay: optional, default 5s, delay before reconnecting
                    http_timeout: optional, default 5s, requests are abandoned after this
                    reporting_period: optional, default 1s, oximeter polling period
                    pressure: required, pin (default A0), threshold (default 500) and source
                    oximeter: required, source of heart rate and SpO2 readings
                    sinks: optional, local outputs (Console, File, Postgres)
                    "
                ))
                .value_name("FILE")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("check")
                .long("check")
                .help("Validates the config file and exits"),
        )
        .get_matches();
    env_logger::init();

    let config_path = cmd.value_of("config").unwrap_or("config.yaml");
    info!("open and parse config file {}", config_path);
    let config_file =
        File::open(config_path).context(format!("failed to open file {}", config_path))?;
    let config_reader = BufReader::new(config_file);
    let config: Config = serde_yaml::from_reader(config_reader)
        .attach_context(format!("failed to parse config file {}", config_path))?;
    config
        .validate()
        .with_context(|| format!("invalid config file {}", config_path))?;
    if cmd.is_present("check") {
        println!("{}: config for device {} is valid", config_path, config.device_id);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    let (termination_sender, mut termination_receiver) = sync::broadcast::channel(1);
    let connectivity_termination = termination_sender.subscribe();
    let oximeter_termination = termination_sender.subscribe();
    let reporter_termination = termination_sender.subscribe();
    ctrlc::set_handler(move || {
        info!("signal received, terminating...");
        let _ = termination_sender.send(());
    })
    .attach_context("failed to set up signal handlers")?;

    let result = runtime.block_on(async move {
        let identity = config.identity();
        info!("starting monitor for device {}", identity.device_id);

        let link = config
            .wifi
            .link
            .clone()
            .into_link(&config)
            .context("failed to set up network link")?;
        let (link_state, connectivity) =
            connectivity::create_connectivity(link, config.wifi_retry_delay);

        let pressure = config
            .pressure
            .source
            .clone()
            .into_sensor(config.pressure.channel()?)
            .await?;
        let oximeter = config.oximeter.clone().into_oximeter().await?;
        let (sampler, oximeter_task) = sampler::create_sampler(
            pressure,
            config.pressure.threshold,
            oximeter,
            config.reporting_period,
            config.pulse_max_age(),
            oximeter_termination,
        );

        let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(Uplink::new(
            &config.server_url,
            identity.clone(),
            config.http_timeout,
            link_state,
        )?)];
        for sink in config.sinks.iter().cloned() {
            sinks.push(sink.into_sink(&identity).await?);
        }
        let reporter = Reporter::new(
            sampler,
            sinks,
            config.data_interval,
            config.heartbeat_interval,
        );

        let tasks = join3(
            connectivity.run(connectivity_termination),
            oximeter_task,
            reporter.run(reporter_termination),
        );
        let deadline = sleep(Duration::from_secs(30));
        let mut terminated = false;
        tokio::pin!(tasks);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = termination_receiver.recv(), if !terminated => {
                    terminated = true;
                    deadline.as_mut().reset(Instant::now() + Duration::from_secs(5));
                },
                _ = &mut deadline, if terminated => {
                    warn!("tasks didn't terminate in time, force exit in 1s");
                    return Ok(());
                },
                _ = &mut tasks => {
                    return Ok(());
                },
            }
        }
    });
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}
