use std::{
    io::SeekFrom,
    path::{Path, PathBuf},
};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncSeekExt},
};

use super::{Error, PulseOximeter};
use crate::message::Pulse;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    path: PathBuf,
}

/// Oximeter driven by an external process that appends `<heart_rate> <spo2>`
/// lines to a file. Only bytes appended since the previous poll are read.
pub struct FeedOximeter {
    path: PathBuf,
    offset: u64,
    // unterminated tail of the feed, completed by a later append
    partial: String,
    latest: Option<String>,
}

impl FeedOximeter {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        fs::metadata(&config.path).await.with_context(|| {
            format!("oximeter feed `{}` is not available", config.path.display())
        })?;
        Ok(Self {
            path: config.path,
            offset: 0,
            partial: String::new(),
            latest: None,
        })
    }

    async fn read_appended(&mut self) -> std::io::Result<String> {
        let mut file = fs::File::open(&self.path).await?;
        let len = file.metadata().await?.len();
        if len < self.offset {
            // truncated, the driver started over
            self.offset = 0;
            self.partial.clear();
            self.latest = None;
        }
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut appended = Vec::new();
        file.read_to_end(&mut appended).await?;
        self.offset += appended.len() as u64;
        Ok(String::from_utf8_lossy(&appended).into_owned())
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

fn parse_line(line: &str, source: &Path) -> Result<Option<Pulse>, Error> {
    let invalid = || Error::Parse(source.display().to_string(), line.to_string());

    let mut fields = line.split_whitespace();
    let heart_rate: f32 = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(invalid)?;
    let spo2: f32 = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(invalid)?;
    if fields.next().is_some() || !heart_rate.is_finite() || !spo2.is_finite() {
        return Err(invalid());
    }
    Ok(Pulse::new(heart_rate, spo2))
}

#[async_trait]
impl PulseOximeter for FeedOximeter {
    async fn update(&mut self) -> Result<Option<Pulse>, Error> {
        let appended = self
            .read_appended()
            .await
            .map_err(|e| Error::Io(e, self.path.display().to_string()))?;
        self.partial.push_str(&appended);
        if let Some(end) = self.partial.rfind('\n') {
            let complete: String = self.partial.drain(..=end).collect();
            if let Some(line) = last_line(&complete) {
                self.latest = Some(line.to_string());
            }
        }
        match &self.latest {
            Some(line) => parse_line(line, &self.path),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::testing::scratch_path;

    use std::io::Write;

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn takes_latest_line() {
        let line = last_line("70 98\n74.5 96\n\n").unwrap();
        assert_eq!(
            parse_line(line, Path::new("feed")).unwrap(),
            Pulse::new(74.5, 96.0)
        );
        assert_eq!(last_line("\n  \n"), None);
    }

    #[test]
    fn zeros_mean_no_pulse() {
        assert_eq!(parse_line("0 0", Path::new("feed")).unwrap(), None);
    }

    #[test]
    fn malformed_lines_are_errors() {
        let source = Path::new("feed");
        assert!(parse_line("72", source).is_err());
        assert!(parse_line("72 ninety", source).is_err());
        assert!(parse_line("72 97 1", source).is_err());
    }

    #[tokio::test]
    async fn follows_the_feed_file() {
        let path = scratch_path("feed");
        std::fs::write(&path, "").unwrap();
        let mut oximeter = FeedOximeter::new(Config { path: path.clone() })
            .await
            .unwrap();
        assert_eq!(oximeter.update().await.unwrap(), None);

        std::fs::write(&path, "81 95\n").unwrap();
        assert_eq!(oximeter.update().await.unwrap(), Pulse::new(81.0, 95.0));
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn reads_only_appended_lines() {
        let path = scratch_path("feed");
        std::fs::write(&path, "70 98\n").unwrap();
        let mut oximeter = FeedOximeter::new(Config { path: path.clone() })
            .await
            .unwrap();
        assert_eq!(oximeter.update().await.unwrap(), Pulse::new(70.0, 98.0));
        assert_eq!(oximeter.offset, 6);

        // a half-written line is held back until it is terminated
        append(&path, "74 96\n7");
        assert_eq!(oximeter.update().await.unwrap(), Pulse::new(74.0, 96.0));
        assert_eq!(oximeter.offset, 13);
        append(&path, "5 95\n");
        assert_eq!(oximeter.update().await.unwrap(), Pulse::new(75.0, 95.0));

        // nothing new keeps the latest line
        assert_eq!(oximeter.update().await.unwrap(), Pulse::new(75.0, 95.0));
        assert_eq!(oximeter.offset, 18);

        std::fs::write(&path, "60 99\n").unwrap();
        assert_eq!(oximeter.update().await.unwrap(), Pulse::new(60.0, 99.0));
        assert_eq!(oximeter.offset, 6);
        std::fs::remove_file(&path).ok();
    }
}
