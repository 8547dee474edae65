use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio_postgres::{types::Type as SQLType, Client, NoTls, Statement};

use super::Sink;
use crate::message::{DeviceIdentity, UpdateMessage};

#[inline]
fn default_tname() -> String {
    "sensor_data".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    host: String,
    port: Option<u16>,
    user: String,
    password: Option<String>,
    dbname: Option<String>,
    options: Option<String>,
    #[serde(default, with = "humantime_serde")]
    connect_timeout: Option<Duration>,
    keepalive: Option<bool>,
    #[serde(default, with = "humantime_serde")]
    keepalive_idle: Option<Duration>,

    #[serde(default = "default_tname")]
    tname: String,
}

/// Archives every vitals reading into a table shaped like the server's `sensor_data`.
pub struct PostgresSink {
    host: String,
    device_id: String,
    client: Client,
    insert_stmt: Statement,
}

impl PostgresSink {
    pub async fn new(config: Config, identity: &DeviceIdentity) -> anyhow::Result<Self> {
        let builder = Self::build(&config);

        debug!("connecting to database `{}`", config.host);
        let (client, connection) = builder
            .connect(NoTls)
            .await
            .with_context(|| format!("fail to connect to database `{}`", config.host))?;
        info!("connected to database {}", config.host);
        tokio::spawn({
            let host = config.host.clone();
            async move {
                if let Err(e) = connection.await {
                    error!("connection to `{}` error: {}", host, e);
                }
            }
        });
        debug!("initializing database `{}`", config.host);
        Self::init_table(&client, &config).await?;
        info!("initialized database `{}`", config.host);

        let insert_stmt = client
            .prepare_typed(
                &insert_sql(&config.tname),
                &[
                    SQLType::VARCHAR,
                    SQLType::FLOAT8,
                    SQLType::FLOAT8,
                    SQLType::INT2,
                    SQLType::INT2,
                    SQLType::TIMESTAMPTZ,
                ],
            )
            .await
            .with_context(|| {
                format!("fail to prepare SQL statement for table `{}`", config.tname)
            })?;

        Ok(Self {
            host: config.host,
            device_id: identity.device_id.clone(),
            client,
            insert_stmt,
        })
    }

    fn build(config: &Config) -> tokio_postgres::Config {
        let mut builder = tokio_postgres::Config::new();
        builder.user(&config.user).host(&config.host);
        config.port.map(|port| builder.port(port));
        config
            .password
            .as_ref()
            .map(|password| builder.password(password));
        config.dbname.as_ref().map(|dbname| builder.dbname(dbname));
        config
            .options
            .as_ref()
            .map(|options| builder.options(options));
        config
            .connect_timeout
            .map(|connect_timeout| builder.connect_timeout(connect_timeout));
        config
            .keepalive
            .map(|keepalive| builder.keepalives(keepalive));
        config
            .keepalive_idle
            .map(|keepalive_idle| builder.keepalives_idle(keepalive_idle));
        builder
    }

    async fn init_table(client: &Client, config: &Config) -> anyhow::Result<()> {
        debug!(
            "initializing table `{}` for database `{}`",
            config.tname, config.host
        );
        client
            .batch_execute(&init_table_sql(&config.tname))
            .await
            .with_context(|| {
                format!(
                    "fail to initialize table `{}` for database `{}`",
                    config.tname, config.host
                )
            })?;
        debug!(
            "initialized table `{}` for database `{}`",
            config.tname, config.host
        );

        Ok(())
    }
}

fn init_table_sql(tname: &str) -> String {
    format!(
        "
        CREATE TABLE IF NOT EXISTS {tname} (
            id          BIGSERIAL PRIMARY KEY,
            device_id   VARCHAR(50) NOT NULL,
            heart_rate  DOUBLE PRECISION,
            spo2        DOUBLE PRECISION,
            bed_status  SMALLINT NOT NULL DEFAULT 0,
            pressure    SMALLINT NOT NULL,
            timestamp   TIMESTAMPTZ NOT NULL
        );
        CREATE INDEX IF NOT EXISTS {tname}_device_id ON {tname} (device_id);
        CREATE INDEX IF NOT EXISTS {tname}_timestamp ON {tname} (timestamp);
    ",
        tname = tname
    )
}

fn insert_sql(tname: &str) -> String {
    format!(
        "INSERT INTO {} (device_id, heart_rate, spo2, bed_status, pressure, timestamp) \
         VALUES ($1, $2, $3, $4, $5, $6)",
        tname
    )
}

#[async_trait]
impl Sink for PostgresSink {
    async fn update(&mut self, message: &UpdateMessage) -> anyhow::Result<()> {
        let reading = match message {
            UpdateMessage::Vitals(reading) => reading,
            UpdateMessage::Heartbeat(_) => return Ok(()),
        };
        debug!(
            "submitting reading {:?} into database `{}`",
            reading, self.host
        );
        let heart_rate = reading.pulse.map(|p| p.heart_rate as f64);
        let spo2 = reading.pulse.map(|p| p.spo2 as f64);
        self.client
            .execute(
                &self.insert_stmt,
                &[
                    &self.device_id,
                    &heart_rate,
                    &spo2,
                    &(reading.bed_status() as i16),
                    &(reading.pressure as i16),
                    &reading.timestamp,
                ],
            )
            .await
            .with_context(|| {
                format!(
                    "failed to archive reading of `{}` in database `{}`",
                    self.device_id, self.host
                )
            })?;

        Ok(())
    }
}
