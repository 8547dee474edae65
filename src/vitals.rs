use std::{collections::VecDeque, fmt};

use crate::message::Pulse;

const HEART_RATE_LOW: f32 = 50.0;
const HEART_RATE_HIGH: f32 = 120.0;
const SPO2_CRITICAL: f32 = 90.0;
const SPO2_WARNING: f32 = 94.0;
// Trend checks look at this many consecutive pulse samples
const TREND_WINDOW: usize = 5;
const SPO2_DROP_LIMIT: f32 = 8.0;
const HEART_RATE_DEVIATION_LIMIT: f32 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Severity {
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Finding {
    LowSpo2(f32, Severity),
    HighHeartRate(f32),
    LowHeartRate(f32),
    SuddenSpo2Drop(f32),
    ErraticHeartRate(f32),
}

impl Finding {
    pub fn severity(&self) -> Severity {
        match self {
            Finding::LowSpo2(_, severity) => *severity,
            Finding::SuddenSpo2Drop(_) => Severity::Critical,
            Finding::HighHeartRate(_) | Finding::LowHeartRate(_) | Finding::ErraticHeartRate(_) => {
                Severity::High
            }
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::LowSpo2(spo2, Severity::Critical) => {
                write!(f, "SpO2 at {}% (below {}%)", spo2, SPO2_CRITICAL)
            }
            Finding::LowSpo2(spo2, Severity::High) => {
                write!(f, "SpO2 at {}% (below {}%)", spo2, SPO2_WARNING)
            }
            Finding::HighHeartRate(bpm) => {
                write!(f, "heart rate elevated: {} BPM (above {})", bpm, HEART_RATE_HIGH)
            }
            Finding::LowHeartRate(bpm) => {
                write!(f, "heart rate low: {} BPM (below {})", bpm, HEART_RATE_LOW)
            }
            Finding::SuddenSpo2Drop(drop) => write!(
                f,
                "sudden SpO2 drop: {:.1}% decrease in last {} readings",
                drop, TREND_WINDOW
            ),
            Finding::ErraticHeartRate(deviation) => {
                write!(f, "erratic heart rate: std dev = {:.1}", deviation)
            }
        }
    }
}

/// Check a pulse sample against the ward alert thresholds. The first match wins.
pub(crate) fn assess(pulse: &Pulse) -> Option<Finding> {
    if pulse.spo2 < SPO2_CRITICAL {
        Some(Finding::LowSpo2(pulse.spo2, Severity::Critical))
    } else if pulse.spo2 < SPO2_WARNING {
        Some(Finding::LowSpo2(pulse.spo2, Severity::High))
    } else if pulse.heart_rate > HEART_RATE_HIGH {
        Some(Finding::HighHeartRate(pulse.heart_rate))
    } else if pulse.heart_rate < HEART_RATE_LOW {
        Some(Finding::LowHeartRate(pulse.heart_rate))
    } else {
        None
    }
}

/// Population standard deviation.
fn std_dev(values: impl Iterator<Item = f32> + Clone) -> f32 {
    let count = values.clone().count() as f32;
    let mean = values.clone().sum::<f32>() / count;
    let variance = values.map(|v| (v - mean) * (v - mean)).sum::<f32>() / count;
    variance.sqrt()
}

/// Threshold checks plus trend checks over the last few pulse samples.
#[derive(Debug, Default)]
pub(crate) struct Assessor {
    recent: VecDeque<Pulse>,
}

impl Assessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `pulse` and check it. A sudden SpO2 drop is reported ahead of the
    /// SpO2 warning threshold, which would otherwise mask it.
    pub fn assess(&mut self, pulse: Pulse) -> Option<Finding> {
        if self.recent.len() == TREND_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(pulse);

        let threshold = assess(&pulse);
        if let Some(Finding::LowSpo2(_, Severity::Critical)) = threshold {
            return threshold;
        }
        if let Some(drop) = self.spo2_drop() {
            return Some(Finding::SuddenSpo2Drop(drop));
        }
        if threshold.is_some() {
            return threshold;
        }
        self.heart_rate_deviation().map(Finding::ErraticHeartRate)
    }

    fn full_window(&self) -> bool {
        self.recent.len() == TREND_WINDOW
    }

    fn spo2_drop(&self) -> Option<f32> {
        if !self.full_window() {
            return None;
        }
        let drop = self.recent.front()?.spo2 - self.recent.back()?.spo2;
        if drop > SPO2_DROP_LIMIT {
            Some(drop)
        } else {
            None
        }
    }

    fn heart_rate_deviation(&self) -> Option<f32> {
        if !self.full_window() {
            return None;
        }
        let deviation = std_dev(self.recent.iter().map(|p| p.heart_rate));
        if deviation > HEART_RATE_DEVIATION_LIMIT {
            Some(deviation)
        } else {
            None
        }
    }
}
